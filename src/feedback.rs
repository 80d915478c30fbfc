//! Decoder for the feedback channel: records the renderer writes back to us
//! when the user double-clicks a directory heading or sends a keystroke
//! through the display window.
//!
//! Grammar (one record per line): `file:<name>/\n`, `key:<char>\n`,
//! `xid:<decimal>\n`. `FeedbackDecoder` turns raw bytes into [`FeedbackRecord`]s;
//! [`escape_filename`] turns a `File` record into the bytes [`crate::shell_bridge`]
//! actually writes to the shell, including the smart-whitespace padding.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackRecord {
    /// A filename selected in the renderer, to be inserted at the cursor.
    File(Vec<u8>),
    /// A single keystroke to forward to the shell as if typed.
    Key(u8),
    /// The renderer window's X id, for focus-transfer requests.
    Xid(u64),
}

/// Line-buffering decoder: accumulate bytes until `\n`, then classify by
/// prefix. Tolerates being fed arbitrary chunk splits, same discipline as
/// the glob/command decoders.
#[derive(Default)]
pub struct FeedbackDecoder {
    line: Vec<u8>,
}

impl FeedbackDecoder {
    pub fn new() -> Self {
        FeedbackDecoder { line: Vec::new() }
    }

    /// Feed a chunk, returning every complete record found, in order.
    /// Unrecognized lines are silently dropped rather than erroring — a
    /// renderer from a future version may send records we don't understand.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<FeedbackRecord> {
        let mut out = Vec::new();
        for &b in chunk {
            if b == b'\n' {
                let line = std::mem::take(&mut self.line);
                if let Some(rec) = Self::classify(&line) {
                    out.push(rec);
                }
            } else {
                self.line.push(b);
            }
        }
        out
    }

    fn classify(line: &[u8]) -> Option<FeedbackRecord> {
        if let Some(rest) = line.strip_prefix(b"file:") {
            let name = rest.strip_suffix(b"/").unwrap_or(rest);
            Some(FeedbackRecord::File(name.to_vec()))
        } else if let Some(rest) = line.strip_prefix(b"key:") {
            rest.first().map(|&c| FeedbackRecord::Key(c))
        } else if let Some(rest) = line.strip_prefix(b"xid:") {
            std::str::from_utf8(rest)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(FeedbackRecord::Xid)
        } else {
            None
        }
    }
}

/// Shell metacharacters that must be backslash-escaped when a filename is
/// inserted directly into the command line (as opposed to passed through a
/// mechanism that's already quoting-aware).
fn is_shell_special(c: u8) -> bool {
    matches!(
        c,
        b'*' | b'?' | b'$' | b'|' | b'&' | b';' | b'(' | b')' | b'<' | b'>' | b' ' | b'\t'
            | b'\n' | b'[' | b']' | b'#' | b'\'' | b'"' | b'`' | b',' | b':' | b'{' | b'}'
            | b'~' | b'\\' | b'!'
    )
}

/// Escape `name` for insertion at the shell prompt, optionally padding with a
/// leading/trailing space when there isn't already whitespace on that side
/// (so a double-clicked filename doesn't fuse with adjacent text). Escaping
/// is skipped per-character when not at the prompt (mid-command-execution
/// paste) and smart insertion is disabled entirely by `smart_insert == false`.
pub fn escape_filename(
    name: &[u8],
    at_prompt: bool,
    smart_insert: bool,
    whitespace_left: bool,
    whitespace_right: bool,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 2);

    if at_prompt && smart_insert && !whitespace_left {
        out.push(b' ');
    }

    for &c in name {
        if is_shell_special(c) && (at_prompt || !smart_insert) {
            out.push(b'\\');
        }
        out.push(c);
    }

    if at_prompt && smart_insert && !whitespace_right {
        out.push(b' ');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_file_key_xid_records() {
        let mut dec = FeedbackDecoder::new();
        let recs = dec.feed(b"file:my dir/\nkey:j\nxid:4242\n");
        assert_eq!(
            recs,
            vec![
                FeedbackRecord::File(b"my dir".to_vec()),
                FeedbackRecord::Key(b'j'),
                FeedbackRecord::Xid(4242),
            ]
        );
    }

    #[test]
    fn split_across_chunks_still_decodes() {
        let mut dec = FeedbackDecoder::new();
        let mut recs = dec.feed(b"file:foo");
        recs.extend(dec.feed(b".txt/\n"));
        assert_eq!(recs, vec![FeedbackRecord::File(b"foo.txt".to_vec())]);
    }

    #[test]
    fn unknown_prefix_is_dropped_not_erroring() {
        let mut dec = FeedbackDecoder::new();
        let recs = dec.feed(b"bogus:whatever\n");
        assert!(recs.is_empty());
    }

    #[test]
    fn escape_adds_padding_and_backslashes_shell_metacharacters() {
        let escaped = escape_filename(b"has space.txt", true, true, false, false);
        assert_eq!(escaped, b" has\\ space.txt ");
    }

    #[test]
    fn escape_skips_padding_when_whitespace_already_adjacent() {
        let escaped = escape_filename(b"plain.txt", true, true, true, true);
        assert_eq!(escaped, b"plain.txt");
    }

    #[test]
    fn escape_skips_backslashes_when_smart_insert_disabled_and_not_at_prompt() {
        let escaped = escape_filename(b"a b", false, false, true, true);
        assert_eq!(escaped, b"a b");
    }
}
