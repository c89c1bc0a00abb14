//! Stream module - versioned binary persistence primitives
//!
//! Every persisted entity writes an `i32` version tag, then its payload in a
//! fixed order, then a trailing `false` ("more data follows"). Readers branch on
//! the version and read-and-discard the trailing bool.
//!
//! All integers are big-endian. Strings are a `u32` byte length followed by
//! UTF-8. Arrays are an `i32` count followed by their items.
//!
//! Structural problems (early end of stream, a bad tag, a bool byte that is
//! neither 0 nor 1) are reported as [`StreamError::NoData`] or
//! [`StreamError::Mismatch`], never folded into [`StreamError::Io`].

use std::io::{self, Read, Write};

use quantro_types::{Offset, Piece};

use thiserror::Error;

/// Upper bound for a single string payload (grids are the largest).
const MAX_STRING_BYTES: u32 = 64 * 1024 * 1024;

/// Upper bound for array counts.
const MAX_ARRAY_LEN: i32 = 1 << 20;

/// Wire form of an absent piece.
pub const NULL_PIECE: &str = "null";

#[derive(Debug, Error)]
pub enum StreamError {
    /// The stream ended before the named field.
    #[error("no data: stream ended while reading {0}")]
    NoData(&'static str),
    /// The stream does not have the shape this reader expects.
    #[error("stream does not match: {0}")]
    Mismatch(String),
    #[error("stream i/o failed: {0}")]
    Io(#[source] io::Error),
}

impl StreamError {
    /// True for the "malformed stream" family, as opposed to transport errors.
    pub fn is_malformed(&self) -> bool {
        matches!(self, StreamError::NoData(_) | StreamError::Mismatch(_))
    }

    fn from_read(err: io::Error, field: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            StreamError::NoData(field)
        } else {
            StreamError::Io(err)
        }
    }
}

impl From<io::Error> for StreamError {
    fn from(err: io::Error) -> Self {
        StreamError::Io(err)
    }
}

pub type StreamResult<T> = Result<T, StreamError>;

/// Writer half of the protocol.
pub struct StreamWriter<W> {
    inner: W,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_i32(&mut self, v: i32) -> StreamResult<()> {
        self.inner.write_all(&v.to_be_bytes())?;
        Ok(())
    }

    pub fn write_i64(&mut self, v: i64) -> StreamResult<()> {
        self.inner.write_all(&v.to_be_bytes())?;
        Ok(())
    }

    pub fn write_f64(&mut self, v: f64) -> StreamResult<()> {
        self.inner.write_all(&v.to_bits().to_be_bytes())?;
        Ok(())
    }

    pub fn write_bool(&mut self, v: bool) -> StreamResult<()> {
        self.inner.write_all(&[v as u8])?;
        Ok(())
    }

    /// Booleans that older payloads stored as 0/1 integers.
    pub fn write_flag_i32(&mut self, v: bool) -> StreamResult<()> {
        self.write_i32(v as i32)
    }

    pub fn write_str(&mut self, s: &str) -> StreamResult<()> {
        let len = u32::try_from(s.len())
            .ok()
            .filter(|&n| n <= MAX_STRING_BYTES)
            .ok_or_else(|| StreamError::Mismatch(format!("string of {} bytes", s.len())))?;
        self.inner.write_all(&len.to_be_bytes())?;
        self.inner.write_all(s.as_bytes())?;
        Ok(())
    }

    pub fn write_offset(&mut self, o: Offset) -> StreamResult<()> {
        self.write_i32(o.x)?;
        self.write_i32(o.y)
    }

    pub fn write_piece(&mut self, piece: Option<&Piece>) -> StreamResult<()> {
        match piece {
            Some(p) => self.write_str(&p.to_string()),
            None => self.write_str(NULL_PIECE),
        }
    }

    pub fn write_i32_slice(&mut self, values: &[i32]) -> StreamResult<()> {
        self.write_len(values.len())?;
        for &v in values {
            self.write_i32(v)?;
        }
        Ok(())
    }

    pub fn write_bool_slice(&mut self, values: &[bool]) -> StreamResult<()> {
        self.write_len(values.len())?;
        for &v in values {
            self.write_bool(v)?;
        }
        Ok(())
    }

    pub fn write_len(&mut self, len: usize) -> StreamResult<()> {
        let n = i32::try_from(len)
            .ok()
            .filter(|&n| n <= MAX_ARRAY_LEN)
            .ok_or_else(|| StreamError::Mismatch(format!("array of {} entries", len)))?;
        self.write_i32(n)
    }

    /// Trailing "more data follows" marker. Always `false` for current writers.
    pub fn write_sentinel(&mut self) -> StreamResult<()> {
        self.write_bool(false)
    }

    pub fn flush(&mut self) -> StreamResult<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Reader half of the protocol.
pub struct StreamReader<R> {
    inner: R,
}

impl<R: Read> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_array<const N: usize>(&mut self, field: &'static str) -> StreamResult<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| StreamError::from_read(e, field))?;
        Ok(buf)
    }

    pub fn read_i32(&mut self, field: &'static str) -> StreamResult<i32> {
        Ok(i32::from_be_bytes(self.read_array(field)?))
    }

    pub fn read_i64(&mut self, field: &'static str) -> StreamResult<i64> {
        Ok(i64::from_be_bytes(self.read_array(field)?))
    }

    pub fn read_f64(&mut self, field: &'static str) -> StreamResult<f64> {
        Ok(f64::from_bits(u64::from_be_bytes(self.read_array(field)?)))
    }

    pub fn read_bool(&mut self, field: &'static str) -> StreamResult<bool> {
        let [b] = self.read_array::<1>(field)?;
        match b {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(StreamError::Mismatch(format!(
                "{}: expected bool byte, found {}",
                field, other
            ))),
        }
    }

    pub fn read_flag_i32(&mut self, field: &'static str) -> StreamResult<bool> {
        match self.read_i32(field)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(StreamError::Mismatch(format!(
                "{}: expected 0/1 flag, found {}",
                field, other
            ))),
        }
    }

    pub fn read_string(&mut self, field: &'static str) -> StreamResult<String> {
        let len = u32::from_be_bytes(self.read_array(field)?);
        if len > MAX_STRING_BYTES {
            return Err(StreamError::Mismatch(format!(
                "{}: string length {} out of range",
                field, len
            )));
        }
        let mut buf = Vec::new();
        (&mut self.inner)
            .take(u64::from(len))
            .read_to_end(&mut buf)
            .map_err(|e| StreamError::from_read(e, field))?;
        if buf.len() < len as usize {
            return Err(StreamError::NoData(field));
        }
        String::from_utf8(buf)
            .map_err(|_| StreamError::Mismatch(format!("{}: invalid utf-8", field)))
    }

    pub fn read_offset(&mut self, field: &'static str) -> StreamResult<Offset> {
        let x = self.read_i32(field)?;
        let y = self.read_i32(field)?;
        Ok(Offset::new(x, y))
    }

    pub fn read_piece(&mut self, field: &'static str) -> StreamResult<Option<Piece>> {
        let s = self.read_string(field)?;
        if s == NULL_PIECE {
            return Ok(None);
        }
        Piece::parse(&s)
            .map(Some)
            .ok_or_else(|| StreamError::Mismatch(format!("{}: bad piece encoding {:?}", field, s)))
    }

    pub fn read_len(&mut self, field: &'static str) -> StreamResult<usize> {
        let n = self.read_i32(field)?;
        if !(0..=MAX_ARRAY_LEN).contains(&n) {
            return Err(StreamError::Mismatch(format!(
                "{}: array length {} out of range",
                field, n
            )));
        }
        Ok(n as usize)
    }

    pub fn read_i32_vec(&mut self, field: &'static str) -> StreamResult<Vec<i32>> {
        let n = self.read_len(field)?;
        (0..n).map(|_| self.read_i32(field)).collect()
    }

    pub fn read_bool_vec(&mut self, field: &'static str) -> StreamResult<Vec<bool>> {
        let n = self.read_len(field)?;
        (0..n).map(|_| self.read_bool(field)).collect()
    }

    /// Reads and discards the trailing "more data follows" bool.
    pub fn read_sentinel(&mut self) -> StreamResult<()> {
        self.read_bool("trailing sentinel").map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(bytes: Vec<u8>) -> StreamReader<io::Cursor<Vec<u8>>> {
        StreamReader::new(io::Cursor::new(bytes))
    }

    #[test]
    fn primitives_are_big_endian() {
        let mut w = StreamWriter::new(Vec::new());
        w.write_i32(0x0102_0304).unwrap();
        w.write_bool(true).unwrap();
        assert_eq!(w.into_inner(), vec![1, 2, 3, 4, 1]);
    }

    #[test]
    fn primitives_read_back() {
        let mut w = StreamWriter::new(Vec::new());
        w.write_i32(-7).unwrap();
        w.write_i64(1 << 40).unwrap();
        w.write_f64(0.25).unwrap();
        w.write_str("quantro").unwrap();
        w.write_i32_slice(&[3, -1, 0]).unwrap();
        w.write_bool_slice(&[true, false]).unwrap();
        w.write_piece(None).unwrap();
        w.write_sentinel().unwrap();

        let mut r = reader(w.into_inner());
        assert_eq!(r.read_i32("a").unwrap(), -7);
        assert_eq!(r.read_i64("b").unwrap(), 1 << 40);
        assert_eq!(r.read_f64("c").unwrap(), 0.25);
        assert_eq!(r.read_string("d").unwrap(), "quantro");
        assert_eq!(r.read_i32_vec("e").unwrap(), vec![3, -1, 0]);
        assert_eq!(r.read_bool_vec("f").unwrap(), vec![true, false]);
        assert_eq!(r.read_piece("g").unwrap(), None);
        r.read_sentinel().unwrap();
    }

    #[test]
    fn early_end_is_no_data_not_io() {
        let mut r = reader(vec![0, 0]);
        let err = r.read_i32("rows").unwrap_err();
        assert!(matches!(err, StreamError::NoData("rows")));
        assert!(err.is_malformed());
    }

    #[test]
    fn bad_bool_byte_is_mismatch() {
        let mut r = reader(vec![7]);
        let err = r.read_bool("flag").unwrap_err();
        assert!(matches!(err, StreamError::Mismatch(_)));
    }

    #[test]
    fn negative_array_length_is_mismatch() {
        let mut r = reader((-3i32).to_be_bytes().to_vec());
        assert!(matches!(
            r.read_i32_vec("rows"),
            Err(StreamError::Mismatch(_))
        ));
    }

    #[test]
    fn bad_piece_string_is_mismatch() {
        let mut w = StreamWriter::new(Vec::new());
        w.write_str("not a piece").unwrap();
        let mut r = reader(w.into_inner());
        assert!(matches!(r.read_piece("piece"), Err(StreamError::Mismatch(_))));
    }

    #[test]
    fn short_string_body_is_no_data() {
        let mut bytes = 50_000_000u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"abc");
        let err = reader(bytes).read_string("name").unwrap_err();
        assert!(matches!(err, StreamError::NoData("name")));

        let mut bytes = 3u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"abc");
        assert_eq!(reader(bytes).read_string("name").unwrap(), "abc");
    }
}
