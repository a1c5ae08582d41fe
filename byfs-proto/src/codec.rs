//! Field codec over any `Read`/`Write` stream.
//!
//! Every integer is big-endian. A string is `[u32 length][bytes]` with no
//! terminator, a string array is `[u16 count][string]*`, and every response
//! that can fail opens with a one-byte status.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

/// Maximum accepted string payload (16 MiB).
pub const MAX_STRING: u32 = 16 * 1024 * 1024;

/// Status byte that marks success.
pub const STATUS_OK: u8 = 0;

/// Whether a failing status byte is followed by an error-message string.
///
/// Server revisions disagree on this, so it is chosen per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ErrorPayload {
    /// Every failure status carries a message string.
    #[default]
    Always,
    /// Failure statuses are a bare byte.
    Never,
}

/// A failure reported by the server through a nonzero status byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// The nonzero status byte.
    pub code: u8,
    /// Server-supplied message (empty under [`ErrorPayload::Never`]).
    pub message: String,
}

/// A decoded boolean-with-error header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Status byte was zero.
    Ok,
    /// Status byte was nonzero.
    Failed(Failure),
}

impl Status {
    /// Returns `true` for [`Status::Ok`].
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Converts into a `Result`, keeping the failure details.
    pub fn into_result(self) -> Result<(), Failure> {
        match self {
            Self::Ok => Ok(()),
            Self::Failed(f) => Err(f),
        }
    }
}

/// Decoding half of the codec, implemented for every [`Read`].
///
/// A stream that ends before a field is complete yields
/// [`io::ErrorKind::UnexpectedEof`]; it is never mistaken for an empty value.
pub trait WireRead: Read {
    /// Reads exactly `N` bytes.
    fn read_fixed<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads a `u8`.
    fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.read_fixed::<1>()?[0])
    }

    /// Reads a big-endian `u16`.
    fn read_u16(&mut self) -> io::Result<u16> {
        self.read_fixed().map(u16::from_be_bytes)
    }

    /// Reads a big-endian `u32`.
    fn read_u32(&mut self) -> io::Result<u32> {
        self.read_fixed().map(u32::from_be_bytes)
    }

    /// Reads a big-endian `u64` (high word first).
    fn read_u64(&mut self) -> io::Result<u64> {
        self.read_fixed().map(u64::from_be_bytes)
    }

    /// Reads an `i8`.
    fn read_i8(&mut self) -> io::Result<i8> {
        self.read_fixed().map(i8::from_be_bytes)
    }

    /// Reads a big-endian two's-complement `i16`.
    fn read_i16(&mut self) -> io::Result<i16> {
        self.read_fixed().map(i16::from_be_bytes)
    }

    /// Reads a big-endian two's-complement `i32`.
    fn read_i32(&mut self) -> io::Result<i32> {
        self.read_fixed().map(i32::from_be_bytes)
    }

    /// Reads a big-endian two's-complement `i64`.
    fn read_i64(&mut self) -> io::Result<i64> {
        self.read_fixed().map(i64::from_be_bytes)
    }

    /// Reads a length-prefixed byte string.
    fn read_bytes(&mut self) -> io::Result<Vec<u8>> {
        let len = self.read_u32()?;
        if len > MAX_STRING {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("string of {len} bytes exceeds 16 MiB limit"),
            ));
        }
        let mut buf = vec![0u8; len as usize];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads a length-prefixed UTF-8 string.
    fn read_string(&mut self) -> io::Result<String> {
        String::from_utf8(self.read_bytes()?)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Reads a `u16`-counted array of strings.
    fn read_strings(&mut self) -> io::Result<Vec<String>> {
        let count = self.read_u16()?;
        (0..count).map(|_| self.read_string()).collect()
    }

    /// Reads a boolean-with-error header.
    ///
    /// On failure the trailing message (if the deployment sends one) is
    /// drained so the next field starts on a clean boundary.
    fn read_status(&mut self, payload: ErrorPayload) -> io::Result<Status> {
        let code = self.read_u8()?;
        if code == STATUS_OK {
            return Ok(Status::Ok);
        }
        let message = match payload {
            ErrorPayload::Always => String::from_utf8_lossy(&self.read_bytes()?).into_owned(),
            ErrorPayload::Never => String::new(),
        };
        Ok(Status::Failed(Failure { code, message }))
    }
}

impl<R: Read + ?Sized> WireRead for R {}

/// Encoding half of the codec, implemented for every [`Write`].
pub trait WireWrite: Write {
    /// Writes a `u8`.
    fn write_u8(&mut self, v: u8) -> io::Result<()> {
        self.write_all(&[v])
    }

    /// Writes a big-endian `u16`.
    fn write_u16(&mut self, v: u16) -> io::Result<()> {
        self.write_all(&v.to_be_bytes())
    }

    /// Writes a big-endian `u32`.
    fn write_u32(&mut self, v: u32) -> io::Result<()> {
        self.write_all(&v.to_be_bytes())
    }

    /// Writes a big-endian `u64` (high word first).
    fn write_u64(&mut self, v: u64) -> io::Result<()> {
        self.write_all(&v.to_be_bytes())
    }

    /// Writes an `i8`.
    fn write_i8(&mut self, v: i8) -> io::Result<()> {
        self.write_all(&v.to_be_bytes())
    }

    /// Writes a big-endian two's-complement `i16`.
    fn write_i16(&mut self, v: i16) -> io::Result<()> {
        self.write_all(&v.to_be_bytes())
    }

    /// Writes a big-endian two's-complement `i32`.
    fn write_i32(&mut self, v: i32) -> io::Result<()> {
        self.write_all(&v.to_be_bytes())
    }

    /// Writes a big-endian two's-complement `i64`.
    fn write_i64(&mut self, v: i64) -> io::Result<()> {
        self.write_all(&v.to_be_bytes())
    }

    /// Writes a length-prefixed byte string.
    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        let len = u32::try_from(data.len())
            .ok()
            .filter(|len| *len <= MAX_STRING)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "string exceeds 16 MiB limit")
            })?;
        self.write_u32(len)?;
        self.write_all(data)
    }

    /// Writes a length-prefixed UTF-8 string.
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.write_bytes(s.as_bytes())
    }

    /// Writes a `u16`-counted array of strings.
    fn write_strings<S: AsRef<str>>(&mut self, items: &[S]) -> io::Result<()> {
        let count = u16::try_from(items.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "string array exceeds u16::MAX items")
        })?;
        self.write_u16(count)?;
        items.iter().try_for_each(|s| self.write_str(s.as_ref()))
    }

    /// Writes a boolean-with-error header.
    fn write_status(&mut self, status: &Status, payload: ErrorPayload) -> io::Result<()> {
        match status {
            Status::Ok => self.write_u8(STATUS_OK),
            Status::Failed(f) => {
                // A zero code would read back as success.
                self.write_u8(f.code.max(1))?;
                match payload {
                    ErrorPayload::Always => self.write_str(&f.message),
                    ErrorPayload::Never => Ok(()),
                }
            }
        }
    }
}

impl<W: Write + ?Sized> WireWrite for W {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn unsigned_boundaries_roundtrip() {
        let mut buf = Vec::new();
        for v in [0u8, 1, u8::MAX] {
            buf.write_u8(v).unwrap();
        }
        for v in [0u16, 1, u16::MAX] {
            buf.write_u16(v).unwrap();
        }
        for v in [0u32, 1, u32::MAX] {
            buf.write_u32(v).unwrap();
        }
        for v in [0u64, 1, u64::from(u32::MAX) + 1, u64::MAX] {
            buf.write_u64(v).unwrap();
        }

        let mut r = Cursor::new(buf);
        assert_eq!([r.read_u8().unwrap(), r.read_u8().unwrap(), r.read_u8().unwrap()], [0, 1, u8::MAX]);
        assert_eq!(r.read_u16().unwrap(), 0);
        assert_eq!(r.read_u16().unwrap(), 1);
        assert_eq!(r.read_u16().unwrap(), u16::MAX);
        assert_eq!(r.read_u32().unwrap(), 0);
        assert_eq!(r.read_u32().unwrap(), 1);
        assert_eq!(r.read_u32().unwrap(), u32::MAX);
        assert_eq!(r.read_u64().unwrap(), 0);
        assert_eq!(r.read_u64().unwrap(), 1);
        assert_eq!(r.read_u64().unwrap(), u64::from(u32::MAX) + 1);
        assert_eq!(r.read_u64().unwrap(), u64::MAX);
        assert!(r.read_u8().is_err());
    }

    #[test]
    fn u64_is_high_word_first() {
        let mut buf = Vec::new();
        buf.write_u64(0x0102_0304_0506_0708).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);

        let mut r = Cursor::new(&buf);
        let hi = r.read_u32().unwrap();
        let lo = r.read_u32().unwrap();
        assert_eq!((u64::from(hi) << 32) | u64::from(lo), 0x0102_0304_0506_0708);
    }

    #[test]
    fn signed_values_reinterpret_unsigned_encoding() {
        let mut buf = Vec::new();
        buf.write_i64(-1).unwrap();
        buf.write_i32(i32::MIN).unwrap();
        buf.write_i16(-2).unwrap();
        buf.write_i8(-128).unwrap();

        let mut r = Cursor::new(&buf);
        assert_eq!(r.read_u64().unwrap(), u64::MAX);
        assert_eq!(r.read_u32().unwrap(), 0x8000_0000);

        let mut r = Cursor::new(&buf);
        assert_eq!(r.read_i64().unwrap(), -1);
        assert_eq!(r.read_i32().unwrap(), i32::MIN);
        assert_eq!(r.read_i16().unwrap(), -2);
        assert_eq!(r.read_i8().unwrap(), -128);
    }

    #[test]
    fn string_layout_and_empty_string() {
        let mut buf = Vec::new();
        buf.write_str("héllo").unwrap();
        buf.write_str("").unwrap();
        assert_eq!(&buf[..4], &6u32.to_be_bytes());

        let mut r = Cursor::new(&buf);
        assert_eq!(r.read_string().unwrap(), "héllo");
        assert_eq!(r.read_string().unwrap(), "");
        assert_eq!(r.read_string().unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn short_string_is_an_error() {
        let mut buf = Vec::new();
        buf.write_u32(10).unwrap();
        buf.extend_from_slice(b"abc");
        let err = Cursor::new(&buf).read_bytes().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn rejects_oversized_string() {
        let header = (MAX_STRING + 1).to_be_bytes();
        let err = Cursor::new(&header[..]).read_bytes().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn invalid_utf8_name_is_rejected() {
        let mut buf = Vec::new();
        buf.write_bytes(&[0xff, 0xfe]).unwrap();
        let err = Cursor::new(&buf).read_string().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn string_array_roundtrip() {
        let names = ["a", "", "dir/with space"];
        let mut buf = Vec::new();
        buf.write_strings(&names).unwrap();
        assert_eq!(&buf[..2], &3u16.to_be_bytes());
        assert_eq!(Cursor::new(&buf).read_strings().unwrap(), names);

        let mut empty = Vec::new();
        empty.write_strings::<&str>(&[]).unwrap();
        assert!(Cursor::new(&empty).read_strings().unwrap().is_empty());
    }

    #[test]
    fn failed_status_drains_message() {
        let mut buf = Vec::new();
        let failed = Status::Failed(Failure {
            code: 1,
            message: "no such file".into(),
        });
        buf.write_status(&failed, ErrorPayload::Always).unwrap();
        buf.write_u32(42).unwrap();

        let mut r = Cursor::new(&buf);
        assert_eq!(r.read_status(ErrorPayload::Always).unwrap(), failed);
        assert_eq!(r.read_u32().unwrap(), 42);
    }

    #[test]
    fn bare_status_without_message() {
        let mut buf = Vec::new();
        buf.write_status(&Status::Ok, ErrorPayload::Never).unwrap();
        buf.write_u8(7).unwrap();
        buf.write_u32(42).unwrap();

        let mut r = Cursor::new(&buf);
        assert!(r.read_status(ErrorPayload::Never).unwrap().is_ok());
        let status = r.read_status(ErrorPayload::Never).unwrap();
        assert_eq!(
            status.into_result().unwrap_err(),
            Failure {
                code: 7,
                message: String::new()
            }
        );
        assert_eq!(r.read_u32().unwrap(), 42);
    }

    #[test]
    fn truncated_status_message_is_an_error() {
        let buf = [1u8, 0, 0];
        let err = Cursor::new(&buf[..])
            .read_status(ErrorPayload::Always)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
