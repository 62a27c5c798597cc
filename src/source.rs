use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};

/// A 1-based line/column position in the input.
///
/// Columns are counted in characters, not bytes; UTF-8 continuation bytes do
/// not advance the column. The default value `0:0` means "parsing has not
/// started yet".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    /// Line number, starting at 1.
    pub line: u64,
    /// Column number, starting at 1.
    pub column: u64,
}

impl Position {
    pub(crate) const START: Position = Position { line: 1, column: 1 };
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

const BUF_SIZE: usize = 16 * 1024;

/// The byte source feeding the tokenizer.
///
/// Wraps any `Read + Send` impl with a heap-allocated read buffer and a
/// line/column cursor. When passing `Read`-types in, no extra I/O buffering
/// is required; wrapping a `File` in a `std::io::BufReader` first is
/// wasteful.
pub struct ByteSource {
    buf: Box<[u8; BUF_SIZE]>,
    buf_offset: usize,
    buf_len: usize,
    pos: Position,
    reader: Box<dyn Read + Send>,
}

impl ByteSource {
    /// Construct a source from any type that implements `Read + Send`.
    pub fn new<R: Read + Send + 'static>(reader: R) -> Self {
        ByteSource {
            buf: Box::new([0; BUF_SIZE]),
            buf_offset: 0,
            buf_len: 0,
            pos: Position::START,
            reader: Box::new(reader),
        }
    }

    /// The position of the next unread character.
    pub fn position(&self) -> Position {
        self.pos
    }

    #[inline]
    fn prepare_buf(&mut self, min_len: usize) -> io::Result<()> {
        debug_assert!(min_len < BUF_SIZE);
        let mut len = self.buf_len - self.buf_offset;
        if len < min_len {
            let mut raw_buf = &mut self.buf[..];
            raw_buf.rotate_left(self.buf_offset);
            raw_buf = &mut raw_buf[len..];
            while len < min_len {
                let n = self.reader.read(raw_buf)?;
                if n == 0 {
                    break;
                }
                len += n;
                raw_buf = &mut raw_buf[n..];
            }
            self.buf_len = len;
            self.buf_offset = 0;
        }
        Ok(())
    }

    /// Look at the next byte without consuming it.
    pub fn peek(&mut self) -> io::Result<Option<u8>> {
        self.prepare_buf(1)?;
        Ok(self.buf.get(self.buf_offset).copied().filter(|_| self.buf_offset < self.buf_len))
    }

    /// Consume and return the next byte, advancing the cursor.
    pub fn next_byte(&mut self) -> io::Result<Option<u8>> {
        self.prepare_buf(1)?;
        if self.buf_offset == self.buf_len {
            return Ok(None);
        }
        let b = self.buf[self.buf_offset];
        self.buf_offset += 1;
        self.advance_pos(&[b]);
        Ok(Some(b))
    }

    /// If the next bytes equal `s`, consume them and return `true`; otherwise
    /// consume nothing and return `false`.
    pub fn try_read(&mut self, s: &[u8]) -> io::Result<bool> {
        debug_assert!(s.len() < BUF_SIZE);
        self.prepare_buf(s.len())?;
        let end = std::cmp::min(self.buf_offset + s.len(), self.buf_len);
        if &self.buf[self.buf_offset..end] == s {
            self.buf_offset += s.len();
            self.advance_pos(s);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consume a chunk of bytes not containing any byte from `needle`,
    /// appending it to `out`.
    ///
    /// Consumes nothing if the very next byte is a needle byte. Returns
    /// `false` at end of input. The chunk can be arbitrarily large or small;
    /// callers are expected to loop and re-check [`ByteSource::peek`].
    pub fn read_until(&mut self, needle: &[u8], out: &mut Vec<u8>) -> io::Result<bool> {
        self.prepare_buf(1)?;
        let buf = &self.buf[self.buf_offset..self.buf_len];
        if buf.is_empty() {
            return Ok(false);
        }
        let taken = match fast_find(needle, buf) {
            Some(0) => return Ok(true),
            Some(needle_pos) => &buf[..needle_pos],
            None => buf,
        };
        out.extend_from_slice(taken);
        self.buf_offset += taken.len();
        let (line, column) = advanced(self.pos, taken);
        self.pos = Position { line, column };
        Ok(true)
    }

    fn advance_pos(&mut self, bytes: &[u8]) {
        let (line, column) = advanced(self.pos, bytes);
        self.pos = Position { line, column };
    }
}

fn advanced(pos: Position, bytes: &[u8]) -> (u64, u64) {
    let (mut line, mut column) = (pos.line, pos.column);
    for &b in bytes {
        if b == b'\n' {
            line += 1;
            column = 1;
        } else if b & 0xC0 != 0x80 {
            // continuation bytes do not start a character
            column += 1;
        }
    }
    (line, column)
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSource")
            .field("pos", &self.pos)
            .field("buffered", &(self.buf_len - self.buf_offset))
            .finish()
    }
}

/// An object that can be converted into a [`ByteSource`].
///
/// In-memory inputs (`&str`, `String`, `Vec<u8>`) are copied or moved into
/// the source, because the source is handed off to the parse worker thread.
pub trait IntoSource {
    /// Convert self into a byte source.
    fn into_source(self) -> ByteSource;
}

impl IntoSource for ByteSource {
    fn into_source(self) -> ByteSource {
        self
    }
}

impl IntoSource for String {
    fn into_source(self) -> ByteSource {
        ByteSource::new(Cursor::new(self.into_bytes()))
    }
}

impl<'a> IntoSource for &'a str {
    fn into_source(self) -> ByteSource {
        ByteSource::new(Cursor::new(self.as_bytes().to_vec()))
    }
}

impl IntoSource for Vec<u8> {
    fn into_source(self) -> ByteSource {
        ByteSource::new(Cursor::new(self))
    }
}

impl<'a> IntoSource for &'a [u8] {
    fn into_source(self) -> ByteSource {
        ByteSource::new(Cursor::new(self.to_vec()))
    }
}

impl IntoSource for File {
    fn into_source(self) -> ByteSource {
        ByteSource::new(self)
    }
}

#[inline]
fn fast_find(needle: &[u8], haystack: &[u8]) -> Option<usize> {
    #[cfg(feature = "memchr")]
    {
        if needle.len() == 2 {
            return memchr::memchr2(needle[0], needle[1], haystack);
        } else if needle.len() == 1 {
            return memchr::memchr(needle[0], haystack);
        }
    }

    haystack.iter().position(|b| needle.contains(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_tracks_lines_and_columns() {
        let mut source = "ab\ncd".into_source();
        assert_eq!(source.position(), Position { line: 1, column: 1 });
        assert_eq!(source.next_byte().unwrap(), Some(b'a'));
        assert_eq!(source.position(), Position { line: 1, column: 2 });
        assert_eq!(source.next_byte().unwrap(), Some(b'b'));
        assert_eq!(source.next_byte().unwrap(), Some(b'\n'));
        assert_eq!(source.position(), Position { line: 2, column: 1 });
        assert_eq!(source.next_byte().unwrap(), Some(b'c'));
        assert_eq!(source.position(), Position { line: 2, column: 2 });
    }

    #[test]
    fn multibyte_chars_advance_one_column() {
        let mut source = "ä<".into_source();
        source.next_byte().unwrap();
        source.next_byte().unwrap();
        assert_eq!(source.position(), Position { line: 1, column: 2 });
        assert_eq!(source.peek().unwrap(), Some(b'<'));
    }

    #[test]
    fn read_until_stops_before_needle() {
        let mut source = "hello <b>".into_source();
        let mut out = Vec::new();
        while source.peek().unwrap().map_or(false, |b| b != b'<') {
            assert!(source.read_until(&[b'<', b'&'], &mut out).unwrap());
        }
        assert_eq!(out, b"hello ");
        assert_eq!(source.peek().unwrap(), Some(b'<'));
        assert_eq!(source.position(), Position { line: 1, column: 7 });
    }

    #[test]
    fn try_read_consumes_only_on_match() {
        let mut source = "<![CDATA[x".into_source();
        assert!(!source.try_read(b"<!--").unwrap());
        assert_eq!(source.position(), Position { line: 1, column: 1 });
        assert!(source.try_read(b"<![CDATA[").unwrap());
        assert_eq!(source.next_byte().unwrap(), Some(b'x'));
        assert_eq!(source.next_byte().unwrap(), None);
    }
}
