//! Newline splitting across chunk boundaries.

use bytes::{Bytes, BytesMut};

/// Longest line kept by [`LineBuffer::new`].
pub const DEFAULT_MAX_LINE: usize = 1024 * 1024;

/// Splits a byte stream into lines, carrying partial lines between chunks.
///
/// Lines are returned without their `\n` or `\r\n` terminator. Lines longer
/// than the limit are dropped and counted; the buffer never holds more than
/// one chunk beyond the limit.
#[derive(Debug)]
pub struct LineBuffer {
    pending: BytesMut,
    /// Prefix of `pending` already known to hold no newline.
    scanned: usize,
    max_line: usize,
    /// Inside an over-long line; bytes are dropped up to the next newline.
    discarding: bool,
    overlong: u64,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: BytesMut::new(),
            scanned: 0,
            max_line,
            discarding: false,
            overlong: 0,
        }
    }

    /// Append `chunk` and return every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(offset) = self.pending[self.scanned..].iter().position(|b| *b == b'\n') {
            let pos = self.scanned + offset;
            let mut line = self.pending.split_to(pos + 1);
            self.scanned = 0;

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if pos > self.max_line {
                self.overlong += 1;
                continue;
            }

            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }
            lines.push(line.freeze());
        }

        if self.pending.len() > self.max_line {
            if !self.discarding {
                self.discarding = true;
                self.overlong += 1;
            }
            self.pending.clear();
        }
        self.scanned = self.pending.len();
        lines
    }

    /// Take the unterminated tail, if any.
    pub fn finish(&mut self) -> Option<Bytes> {
        self.scanned = 0;
        if self.discarding {
            self.discarding = false;
            self.pending.clear();
            return None;
        }
        if self.pending.is_empty() {
            return None;
        }
        let mut line = self.pending.split();
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(line.freeze())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Over-long lines dropped since the last call.
    pub fn take_overlong(&mut self) -> u64 {
        std::mem::take(&mut self.overlong)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_lines() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"one\ntwo\r\nthree\n");
        assert_eq!(lines, vec![&b"one"[..], &b"two"[..], &b"three"[..]]);
        assert_eq!(buf.pending_len(), 0);
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"B1\t17").is_empty());
        assert!(buf.push(b"00\tabc").is_empty());
        let lines = buf.push(b"\tpayload\nB2");
        assert_eq!(lines, vec![&b"B1\t1700\tabc\tpayload"[..]]);
        assert_eq!(buf.finish().as_deref(), Some(&b"B2"[..]));
    }

    #[test]
    fn test_crlf_split_between_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"name\r").is_empty());
        assert_eq!(buf.push(b"\n"), vec![&b"name"[..]]);
    }

    #[test]
    fn test_empty_lines_are_kept() {
        let mut buf = LineBuffer::new();
        assert_eq!(buf.push(b"\n\nx\n").len(), 3);
    }

    #[test]
    fn test_unterminated_input_is_bounded() {
        let mut buf = LineBuffer::with_max_line(16);
        for _ in 0..100 {
            assert!(buf.push(&[b'x'; 10]).is_empty());
            assert!(buf.pending_len() <= 16 + 10);
        }
        assert_eq!(buf.take_overlong(), 1);

        // The rest of the long line is dropped; the next line survives.
        let lines = buf.push(b"xxxx\nB1\tts\tu\n");
        assert_eq!(lines, vec![&b"B1\tts\tu"[..]]);
        assert_eq!(buf.take_overlong(), 0);
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn test_overlong_complete_line_is_dropped() {
        let mut buf = LineBuffer::with_max_line(4);
        let lines = buf.push(b"ok\ntoo long\nfine\n");
        assert_eq!(lines, vec![&b"ok"[..], &b"fine"[..]]);
        assert_eq!(buf.take_overlong(), 1);
    }

    #[test]
    fn test_overlong_tail_not_returned_by_finish() {
        let mut buf = LineBuffer::with_max_line(4);
        assert!(buf.push(b"abcdefgh").is_empty());
        assert_eq!(buf.finish(), None);
        assert_eq!(buf.take_overlong(), 1);
        assert_eq!(buf.push(b"next\n"), vec![&b"next"[..]]);
    }

    #[test]
    fn test_many_small_chunks_before_newline() {
        let mut buf = LineBuffer::new();
        for byte in b"B1\t1700000000\tuuid\tdata" {
            assert!(buf.push(&[*byte]).is_empty());
        }
        assert_eq!(buf.push(b"\n"), vec![&b"B1\t1700000000\tuuid\tdata"[..]]);
    }
}
