//! Line-oriented FSM decoders for the glob channel and the command channel.
//!
//! Both decoders are fed arbitrary byte chunks — split at any point,
//! including mid-field — and must produce identical results regardless of
//! where the splits fall. Each keeps its own small holdover buffer of the
//! current in-progress field, distinct from [`Connection`](crate::connection::Connection)'s
//! holdover because protocol bytes are consumed entirely into the model;
//! none of them are ever passed through to another channel.

use crate::errors::ProtocolError;
use crate::model::file::{FileType, Selection};
use crate::model::DirectoryModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GlobState {
    Done,
    SelectedCount,
    FileCount,
    HiddenCount,
    DirName,
    Limbo,
    FileState,
    FileType,
    FileName,
}

/// Decodes the glob channel's `{ dir_record }+ "\n"` frames directly into a
/// [`DirectoryModel`].
pub struct GlobDecoder {
    state: GlobState,
    field: Vec<u8>,
    selected: Vec<u8>,
    total: Vec<u8>,
    hidden: Vec<u8>,
    dir_rank: i32,
    cur_dir_name: Vec<u8>,
    file_sel: u8,
    file_type_code: u8,
}

impl Default for GlobDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobDecoder {
    pub fn new() -> Self {
        GlobDecoder {
            state: GlobState::Done,
            field: Vec::new(),
            selected: Vec::new(),
            total: Vec::new(),
            hidden: Vec::new(),
            dir_rank: 0,
            cur_dir_name: Vec::new(),
            file_sel: b'-',
            file_type_code: b'r',
        }
    }

    /// Feed an arbitrarily-sized chunk, applying every complete token to
    /// `model` as it completes. Safe to call repeatedly with chunks split at
    /// any byte boundary.
    pub fn feed(&mut self, chunk: &[u8], model: &mut DirectoryModel) -> Result<(), ProtocolError> {
        for &b in chunk {
            self.feed_byte(b, model)?;
        }
        Ok(())
    }

    fn feed_byte(&mut self, byte: u8, model: &mut DirectoryModel) -> Result<(), ProtocolError> {
        let mut pending = Some(byte);
        while let Some(b) = pending.take() {
            pending = self.step(b, model)?;
        }
        Ok(())
    }

    /// Returns `Some(byte)` when `byte` must be reprocessed in the state
    /// this step transitioned into (the `Limbo` re-dispatch case).
    fn step(&mut self, byte: u8, model: &mut DirectoryModel) -> Result<Option<u8>, ProtocolError> {
        match self.state {
            GlobState::Done => {
                model.unmark_all();
                self.dir_rank = 0;
                self.state = GlobState::SelectedCount;
                Ok(Some(byte))
            }
            GlobState::SelectedCount => self.field_byte(byte, b' ', |d| &mut d.selected, GlobState::FileCount),
            GlobState::FileCount => self.field_byte(byte, b' ', |d| &mut d.total, GlobState::HiddenCount),
            GlobState::HiddenCount => self.field_byte(byte, b' ', |d| &mut d.hidden, GlobState::DirName),
            GlobState::DirName => {
                if byte == b'\n' {
                    self.dir_rank += 1;
                    self.cur_dir_name = std::mem::take(&mut self.field);
                    model.add(
                        &self.cur_dir_name,
                        self.dir_rank,
                        &self.selected,
                        &self.total,
                        &self.hidden,
                    );
                    self.selected.clear();
                    self.total.clear();
                    self.hidden.clear();
                    self.state = GlobState::Limbo;
                    Ok(None)
                } else {
                    self.field.push(byte);
                    Ok(None)
                }
            }
            GlobState::Limbo => match byte {
                b'\t' => {
                    self.state = GlobState::FileState;
                    Ok(None)
                }
                b'\n' => {
                    model.end_frame();
                    self.state = GlobState::Done;
                    Ok(None)
                }
                _ => {
                    self.state = GlobState::SelectedCount;
                    Ok(Some(byte))
                }
            },
            GlobState::FileState => {
                if byte == b' ' {
                    self.file_sel = *self.field.first().unwrap_or(&b'-');
                    self.field.clear();
                    self.state = GlobState::FileType;
                } else {
                    self.field.push(byte);
                }
                Ok(None)
            }
            GlobState::FileType => {
                if byte == b' ' {
                    self.file_type_code = *self.field.first().unwrap_or(&b'r');
                    self.field.clear();
                    self.state = GlobState::FileName;
                } else {
                    self.field.push(byte);
                }
                Ok(None)
            }
            GlobState::FileName => {
                if byte == b'\n' {
                    let name = std::mem::take(&mut self.field);
                    let sel = Selection::from_code(self.file_sel).ok_or_else(|| {
                        ProtocolError::Malformed(format!(
                            "bad selection code {:?}",
                            self.file_sel as char
                        ))
                    })?;
                    let ftype = FileType::from_code(self.file_type_code).ok_or_else(|| {
                        ProtocolError::Malformed(format!(
                            "bad file type code {:?}",
                            self.file_type_code as char
                        ))
                    })?;
                    if let Some(listing) = model.listing_mut_by_name(&self.cur_dir_name) {
                        listing.file_box.add(&name, ftype, sel);
                    }
                    self.state = GlobState::Limbo;
                    Ok(None)
                } else {
                    self.field.push(byte);
                    Ok(None)
                }
            }
        }
    }

    fn field_byte(
        &mut self,
        byte: u8,
        delim: u8,
        dest: impl FnOnce(&mut Self) -> &mut Vec<u8>,
        next: GlobState,
    ) -> Result<Option<u8>, ProtocolError> {
        if byte == delim {
            let field = std::mem::take(&mut self.field);
            *dest(self) = field;
            self.state = next;
            Ok(None)
        } else {
            self.field.push(byte);
            Ok(None)
        }
    }
}

/// Decodes the command channel's `("cmd"|"order") ":" payload "\n"` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdRecord {
    /// Replace the displayed command text.
    Cmd,
    /// Drive the renderer viewport: `lost`, `up`, `down`, `pgup`, `pgdown`.
    Order,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmdState {
    Keyword,
    Payload,
}

pub struct CmdDecoder {
    state: CmdState,
    keyword: Vec<u8>,
    payload: Vec<u8>,
}

impl Default for CmdDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CmdDecoder {
    pub fn new() -> Self {
        CmdDecoder {
            state: CmdState::Keyword,
            keyword: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Feed a chunk, returning every complete `(kind, payload)` record found.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<(CmdRecord, Vec<u8>)>, ProtocolError> {
        let mut out = Vec::new();
        for &b in chunk {
            if let Some(rec) = self.feed_byte(b)? {
                out.push(rec);
            }
        }
        Ok(out)
    }

    fn feed_byte(&mut self, byte: u8) -> Result<Option<(CmdRecord, Vec<u8>)>, ProtocolError> {
        match self.state {
            CmdState::Keyword => {
                if byte == b':' {
                    self.state = CmdState::Payload;
                    Ok(None)
                } else {
                    self.keyword.push(byte);
                    Ok(None)
                }
            }
            CmdState::Payload => {
                if byte == b'\n' {
                    let kind = match self.keyword.as_slice() {
                        b"cmd" => CmdRecord::Cmd,
                        b"order" => CmdRecord::Order,
                        other => {
                            let bad = String::from_utf8_lossy(other).into_owned();
                            self.keyword.clear();
                            self.payload.clear();
                            self.state = CmdState::Keyword;
                            return Err(ProtocolError::Malformed(format!("unknown keyword {bad:?}")));
                        }
                    };
                    let payload = std::mem::take(&mut self.payload);
                    self.keyword.clear();
                    self.state = CmdState::Keyword;
                    Ok(Some((kind, payload)))
                } else {
                    self.payload.push(byte);
                    Ok(None)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::file::Ordering;

    const FRAME: &[u8] = b"1 2 1 /tmp\n\t* d foo\n\t- r bar\n\n";

    #[test]
    fn protocol_frame_scenario() {
        let mut model = DirectoryModel::new(Ordering::Ls);
        let mut dec = GlobDecoder::new();
        dec.feed(FRAME, &mut model).unwrap();

        assert_eq!(model.listings().len(), 1);
        let l = &model.listings()[0];
        assert_eq!(l.name, b"/tmp");
        assert_eq!(l.rank, 1);
        assert_eq!(l.selected_count, b"1");
        assert_eq!(l.total_count, b"2");
        assert_eq!(l.hidden_count, b"1");
        let names: Vec<_> = l.file_box.entries().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec![b"bar".to_vec(), b"foo".to_vec()]);
    }

    #[test]
    fn holdover_split_scenario_matches_unsplit() {
        // Scenario 5: the same 40-byte frame split as 17 + 23 bytes.
        let (first, second) = FRAME.split_at(17);
        let mut model = DirectoryModel::new(Ordering::Ls);
        let mut dec = GlobDecoder::new();
        dec.feed(first, &mut model).unwrap();
        dec.feed(second, &mut model).unwrap();

        let mut whole_model = DirectoryModel::new(Ordering::Ls);
        let mut whole_dec = GlobDecoder::new();
        whole_dec.feed(FRAME, &mut whole_model).unwrap();

        assert_eq!(model.listings().len(), whole_model.listings().len());
        let a = &model.listings()[0];
        let b = &whole_model.listings()[0];
        assert_eq!(a.name, b.name);
        assert_eq!(a.rank, b.rank);
        assert_eq!(
            a.file_box.entries().iter().map(|e| e.name.clone()).collect::<Vec<_>>(),
            b.file_box.entries().iter().map(|e| e.name.clone()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn holdover_split_at_every_byte_boundary_agrees() {
        for split in 1..FRAME.len() {
            let (first, second) = FRAME.split_at(split);
            let mut model = DirectoryModel::new(Ordering::Ls);
            let mut dec = GlobDecoder::new();
            dec.feed(first, &mut model).unwrap();
            dec.feed(second, &mut model).unwrap();
            assert_eq!(model.listings().len(), 1, "split at {split}");
            assert_eq!(model.listings()[0].name, b"/tmp", "split at {split}");
        }
    }

    #[test]
    fn command_channel_order_up() {
        let mut dec = CmdDecoder::new();
        let recs = dec.feed(b"order:up\n").unwrap();
        assert_eq!(recs, vec![(CmdRecord::Order, b"up".to_vec())]);
    }

    #[test]
    fn command_channel_cmd_replace() {
        let mut dec = CmdDecoder::new();
        let recs = dec.feed(b"cmd:ls -la\n").unwrap();
        assert_eq!(recs, vec![(CmdRecord::Cmd, b"ls -la".to_vec())]);
    }
}
