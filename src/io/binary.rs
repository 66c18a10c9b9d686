//! Little-endian byte stream used by the binary network and results formats.
//!
//! Writing goes through [`ByteWriter`] on top of `byteorder`; reading uses
//! `nom` number parsers wrapped in [`ByteReader`], which tracks the offset for
//! error messages.
//!
//! Encoding rules:
//! - integers and floats: fixed width, little-endian
//! - `bool`: one byte, 0 or 1
//! - strings: `u32` byte length followed by UTF-8 bytes
//! - optional values: one presence byte, then the value when present

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use nom::bytes::complete::take;
use nom::number::complete::{le_f64, le_i32, le_i64, le_u32, le_u64, le_u8};
use nom::IResult;

use crate::error::{CoreError, Result};

/// Growable little-endian output buffer.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_u8(&mut self, v: u8) -> Result<()> {
        self.buf.write_u8(v)?;
        Ok(())
    }

    pub fn put_bool(&mut self, v: bool) -> Result<()> {
        self.put_u8(u8::from(v))
    }

    pub fn put_i32(&mut self, v: i32) -> Result<()> {
        self.buf.write_i32::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn put_u32(&mut self, v: u32) -> Result<()> {
        self.buf.write_u32::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn put_i64(&mut self, v: i64) -> Result<()> {
        self.buf.write_i64::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn put_u64(&mut self, v: u64) -> Result<()> {
        self.buf.write_u64::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn put_f64(&mut self, v: f64) -> Result<()> {
        self.buf.write_f64::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn put_str(&mut self, s: &str) -> Result<()> {
        let len = u32::try_from(s.len()).map_err(|_| {
            CoreError::InvalidState(format!("String of {} bytes is too long to encode", s.len()))
        })?;
        self.put_u32(len)?;
        self.buf.write_all(s.as_bytes())?;
        Ok(())
    }

    pub fn put_opt_f64(&mut self, v: Option<f64>) -> Result<()> {
        match v {
            Some(v) => {
                self.put_u8(1)?;
                self.put_f64(v)
            }
            None => self.put_u8(0),
        }
    }

    pub fn put_opt_str(&mut self, v: Option<&str>) -> Result<()> {
        match v {
            Some(s) => {
                self.put_u8(1)?;
                self.put_str(s)
            }
            None => self.put_u8(0),
        }
    }
}

/// Cursor over a little-endian byte slice.
pub struct ByteReader<'a> {
    input: &'a [u8],
    offset: usize,
    source: String,
}

type Parsed<'a, T> = IResult<&'a [u8], T, nom::error::Error<&'a [u8]>>;

impl<'a> ByteReader<'a> {
    /// `source` names the data in error messages (usually a file name).
    pub fn new(input: &'a [u8], source: impl Into<String>) -> Self {
        Self {
            input,
            offset: 0,
            source: source.into(),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.input.len()
    }

    fn step<T>(&mut self, what: &str, parsed: Parsed<'a, T>) -> Result<T> {
        match parsed {
            Ok((rest, value)) => {
                self.offset += self.input.len() - rest.len();
                self.input = rest;
                Ok(value)
            }
            Err(_) => Err(CoreError::Format {
                file: self.source.clone(),
                message: format!("Truncated data reading {} at byte {}", what, self.offset),
            }),
        }
    }

    pub fn u8(&mut self) -> Result<u8> {
        let parsed = le_u8(self.input);
        self.step("u8", parsed)
    }

    pub fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.invalid(format!("Invalid boolean byte [{}]", other))),
        }
    }

    pub fn i32(&mut self) -> Result<i32> {
        let parsed = le_i32(self.input);
        self.step("i32", parsed)
    }

    pub fn u32(&mut self) -> Result<u32> {
        let parsed = le_u32(self.input);
        self.step("u32", parsed)
    }

    pub fn i64(&mut self) -> Result<i64> {
        let parsed = le_i64(self.input);
        self.step("i64", parsed)
    }

    pub fn u64(&mut self) -> Result<u64> {
        let parsed = le_u64(self.input);
        self.step("u64", parsed)
    }

    pub fn f64(&mut self) -> Result<f64> {
        let parsed = le_f64(self.input);
        self.step("f64", parsed)
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let parsed = take(len)(self.input);
        self.step("bytes", parsed)
    }

    pub fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| self.invalid("Invalid UTF-8 string".to_string()))
    }

    pub fn opt_f64(&mut self) -> Result<Option<f64>> {
        if self.bool()? {
            Ok(Some(self.f64()?))
        } else {
            Ok(None)
        }
    }

    pub fn opt_string(&mut self) -> Result<Option<String>> {
        if self.bool()? {
            Ok(Some(self.string()?))
        } else {
            Ok(None)
        }
    }

    /// A format error tagged with this reader's source and offset.
    pub fn invalid(&self, message: String) -> CoreError {
        CoreError::Format {
            file: self.source.clone(),
            message: format!("{} at byte {}", message, self.offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_fields() {
        let mut w = ByteWriter::new();
        w.put_i32(-7).unwrap();
        w.put_f64(1.5).unwrap();
        w.put_str("MRO/CTX/1234").unwrap();
        w.put_opt_f64(None).unwrap();
        w.put_opt_f64(Some(2.25)).unwrap();
        w.put_bool(true).unwrap();
        let bytes = w.into_inner();

        let mut r = ByteReader::new(&bytes, "test");
        assert_eq!(r.i32().unwrap(), -7);
        assert_eq!(r.f64().unwrap(), 1.5);
        assert_eq!(r.string().unwrap(), "MRO/CTX/1234");
        assert_eq!(r.opt_f64().unwrap(), None);
        assert_eq!(r.opt_f64().unwrap(), Some(2.25));
        assert!(r.bool().unwrap());
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_little_endian_layout() {
        let mut w = ByteWriter::new();
        w.put_u32(1).unwrap();
        w.put_f64(1.0).unwrap();
        assert_eq!(w.into_inner(), vec![1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xf0, 0x3f]);
    }

    #[test]
    fn test_truncated_input_reports_offset() {
        let bytes = [1u8, 0, 0, 0, 9];
        let mut r = ByteReader::new(&bytes, "short.bin");
        r.u32().unwrap();
        let err = r.f64().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("byte 4"), "{}", msg);
        assert!(msg.contains("short.bin"), "{}", msg);
    }
}
