//! The reconstructed command-line text buffer and its deferred-write queue.
//!
//! `CommandLine` is rebuilt purely from the shell's echo stream: every
//! operation here mirrors a terminal control effect (overwrite-at-cursor,
//! insert, delete, wipe bounded by `\r` "landmarks" left behind by terminal
//! line wrap), never a read of real terminal input.

use crate::errors::ModelError;

const CMD_STEP_SIZE: usize = 512;

/// A growable command-line text buffer with a cursor.
#[derive(Debug, Default)]
pub struct CommandLine {
    text: Vec<u8>,
    len: usize,
    pos: usize,
    pub rebuilding: bool,
}

impl CommandLine {
    pub fn new() -> Self {
        CommandLine {
            text: Vec::new(),
            len: 0,
            pos: 0,
            rebuilding: false,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.text[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Reset to empty, zeroing the backing storage (`cmd_clear`).
    pub fn clear(&mut self) {
        for b in self.text.iter_mut() {
            *b = 0;
        }
        self.len = 0;
        self.pos = 0;
    }

    fn grow_to(&mut self, needed: usize) {
        if needed <= self.text.len() {
            return;
        }
        let steps = needed.div_ceil(CMD_STEP_SIZE);
        self.text.resize(steps * CMD_STEP_SIZE, 0);
    }

    /// Write `c` at the cursor, extending `len` if at the end. If
    /// `preserve_cr`, any `\r` bytes at the cursor are skipped over (not
    /// overwritten) before writing.
    pub fn overwrite(&mut self, c: u8, preserve_cr: bool) {
        if preserve_cr {
            while self.pos < self.len && self.text[self.pos] == b'\r' {
                self.pos += 1;
            }
        }
        self.grow_to(self.pos + 1);
        self.text[self.pos] = c;
        if self.pos >= self.len {
            self.len = self.pos + 1;
        }
        self.pos += 1;
    }

    /// Insert `n` copies of `c` at the cursor, shifting the tail right.
    pub fn insert(&mut self, c: u8, n: usize) {
        if n == 0 {
            return;
        }
        self.grow_to(self.len + n);
        self.text.copy_within(self.pos..self.len, self.pos + n);
        for b in &mut self.text[self.pos..self.pos + n] {
            *b = c;
        }
        self.len += n;
    }

    /// Remove `n` bytes starting at the cursor.
    pub fn delete(&mut self, n: usize) -> Result<(), ModelError> {
        if self.pos + n > self.len {
            return Err(ModelError::Underflow);
        }
        self.text.copy_within(self.pos + n..self.len, self.pos);
        for b in &mut self.text[self.len - n..self.len] {
            *b = 0;
        }
        self.len -= n;
        Ok(())
    }

    pub fn move_cursor_forward(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.len);
    }

    /// Move the cursor forward by `n`, clamped to `len`. Returns how far
    /// past the end the move would have gone (0 if it fit), letting the
    /// caller decide what an overshoot means (e.g. a shell-specific
    /// right-prompt heuristic).
    pub fn move_cursor_forward_checked(&mut self, n: usize) -> usize {
        let target = self.pos + n;
        if target > self.len {
            let overflow = target - self.len;
            self.pos = self.len;
            overflow
        } else {
            self.pos = target;
            0
        }
    }

    /// Move up `n` wrapped lines, preserving column position within the
    /// line as closely as the nearest `\r` landmarks allow. Returns `false`
    /// (and resets `pos` to 0) when there aren't `n` landmarks above the
    /// cursor, signalling that the caller should fall back to a full
    /// rebuild rather than guess.
    pub fn cursor_up(&mut self, n: usize) -> bool {
        let crets: Vec<usize> = self.text[..self.len]
            .iter()
            .enumerate()
            .filter(|&(_, &b)| b == b'\r')
            .map(|(i, _)| i)
            .collect();
        let before: Vec<usize> = crets.into_iter().filter(|&i| i < self.pos).collect();
        if before.len() < n {
            self.pos = 0;
            return false;
        }
        let cur_line_start = before.last().map(|&i| i + 1).unwrap_or(0);
        let column = self.pos - cur_line_start;

        let boundary = before[before.len() - n];
        let target_start = if before.len() - n == 0 {
            0
        } else {
            before[before.len() - n - 1] + 1
        };
        let line_len = boundary - target_start;
        self.pos = target_start + column.min(line_len);
        true
    }

    pub fn move_cursor_backward(&mut self, n: usize) -> Result<(), ModelError> {
        if n > self.pos {
            return Err(ModelError::Underflow);
        }
        self.pos -= n;
        Ok(())
    }

    pub fn backspace(&mut self) -> Result<(), ModelError> {
        self.move_cursor_backward(1)
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.len);
    }

    fn find_prev_cret(&self, from: usize) -> Option<usize> {
        self.text[..from.min(self.len)]
            .iter()
            .rposition(|&b| b == b'\r')
    }

    fn find_next_cret(&self, from: usize) -> Option<usize> {
        self.text[from.min(self.len)..self.len]
            .iter()
            .position(|&b| b == b'\r')
            .map(|i| i + from)
    }

    /// `EraseInLine(0)`: wipe from cursor to the next `\r` landmark, or to
    /// end of buffer if there isn't one. If the cursor sat at the very start
    /// of its line the landmark `\r` itself is deleted too.
    pub fn wipe_right(&mut self) -> Result<(), ModelError> {
        match self.find_next_cret(self.pos) {
            Some(landmark) => {
                let mut end = landmark;
                if self.pos == 0 {
                    end += 1;
                }
                let n = end - self.pos;
                self.delete(n)
            }
            None => {
                let n = self.len - self.pos;
                self.delete(n)
            }
        }
    }

    /// `EraseInLine(1)`: wipe from the previous `\r` landmark (or buffer
    /// start) up to the cursor.
    pub fn wipe_left(&mut self) -> Result<(), ModelError> {
        let start = self
            .find_prev_cret(self.pos)
            .map(|i| i + 1)
            .unwrap_or(0);
        let n = self.pos - start;
        self.set_pos(start);
        self.delete(n)
    }

    /// `EraseInLine(2)`: wipe the whole current line, bounded by the nearest
    /// `\r` landmark on each side (or buffer edges if absent).
    pub fn wipe_all(&mut self) -> Result<(), ModelError> {
        let start = self
            .find_prev_cret(self.pos)
            .map(|i| i + 1)
            .unwrap_or(0);
        let end = self.find_next_cret(self.pos).unwrap_or(self.len);
        self.set_pos(start);
        let n = end - start;
        self.delete(n)
    }

    /// Position the cursor just after the nearest `\r` to its left. Returns
    /// `false` (cursor set to 0) if there is none, signalling a rebuild.
    pub fn seek_after_prev_cret(&mut self) -> bool {
        match self.find_prev_cret(self.pos) {
            Some(i) => {
                self.pos = i + 1;
                true
            }
            None => {
                self.pos = 0;
                false
            }
        }
    }

    pub fn has_cret_right_of_cursor(&self) -> bool {
        self.find_next_cret(self.pos).is_some()
    }

    /// Collapse trailing `\r` runs while the cursor sits outside them.
    pub fn trim_trailing_cr(&mut self) -> Result<(), ModelError> {
        while self.len > 0 && self.text[self.len - 1] == b'\r' && self.pos != self.len - 1 {
            let saved = self.pos;
            self.pos = self.len - 1;
            self.delete(1)?;
            self.pos = saved.min(self.len);
        }
        Ok(())
    }
}

/// A single deferred write: a byte plus whether `\r` should be preserved
/// (skipped rather than overwritten) when it's eventually flushed.
#[derive(Debug, Clone, Copy)]
pub struct QueuedWrite {
    pub byte: u8,
    pub preserve_cr: bool,
}

/// LIFO of writes deferred until a prompt has been positively identified.
/// Drained atomically (in LIFO order, oldest-enqueued last) once the
/// prompt-start delimiter fires.
#[derive(Debug, Default)]
pub struct OverwriteQueue {
    stack: Vec<QueuedWrite>,
}

impl OverwriteQueue {
    pub fn new() -> Self {
        OverwriteQueue { stack: Vec::new() }
    }

    pub fn enqueue(&mut self, byte: u8, preserve_cr: bool) {
        self.stack.push(QueuedWrite { byte, preserve_cr });
    }

    pub fn has_queued(&self) -> bool {
        !self.stack.is_empty()
    }

    /// Drain the queue onto `cmd`, applying each write in LIFO order, and
    /// clear it.
    pub fn flush_onto(&mut self, cmd: &mut CommandLine) {
        while let Some(w) = self.stack.pop() {
            cmd.overwrite(w.byte, w.preserve_cr);
        }
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_bound_invariant_holds_through_typing() {
        let mut cmd = CommandLine::new();
        for c in b"hello world" {
            cmd.overwrite(*c, false);
        }
        assert_eq!(cmd.as_bytes(), b"hello world");
        assert_eq!(cmd.pos(), 11);
        assert!(cmd.pos() <= cmd.len());
    }

    #[test]
    fn cursor_math_scenario() {
        // Scenario 2: "hello world", pos=11; CSI 5D then 'x' => pos 6 then 7,
        // text becomes "hellox world".
        let mut cmd = CommandLine::new();
        for c in b"hello world" {
            cmd.overwrite(*c, false);
        }
        cmd.move_cursor_backward(5).unwrap();
        assert_eq!(cmd.pos(), 6);
        cmd.overwrite(b'x', false);
        assert_eq!(cmd.pos(), 7);
        assert_eq!(cmd.as_bytes(), b"hellox world");
    }

    #[test]
    fn insert_then_delete_is_identity_on_text() {
        let mut cmd = CommandLine::new();
        for c in b"ab" {
            cmd.overwrite(*c, false);
        }
        let before = cmd.as_bytes().to_vec();
        cmd.set_pos(1);
        cmd.insert(b'z', 3);
        cmd.set_pos(1);
        cmd.delete(3).unwrap();
        assert_eq!(cmd.as_bytes(), before.as_slice());
    }

    #[test]
    fn delete_past_end_is_underflow() {
        let mut cmd = CommandLine::new();
        cmd.overwrite(b'a', false);
        cmd.set_pos(0);
        assert!(matches!(cmd.delete(5), Err(ModelError::Underflow)));
    }

    #[test]
    fn wipe_right_stops_at_landmark() {
        let mut cmd = CommandLine::new();
        for c in b"abc\rdef" {
            cmd.overwrite(*c, false);
        }
        cmd.set_pos(1);
        cmd.wipe_right().unwrap();
        assert_eq!(cmd.as_bytes(), b"a\rdef");
    }

    #[test]
    fn overwrite_queue_drains_lifo_onto_commandline() {
        let mut q = OverwriteQueue::new();
        q.enqueue(b'a', false);
        q.enqueue(b'b', false);
        q.enqueue(b'c', false);
        let mut cmd = CommandLine::new();
        q.flush_onto(&mut cmd);
        assert_eq!(cmd.as_bytes(), b"cba");
        assert!(!q.has_queued());
    }
}
