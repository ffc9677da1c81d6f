//! Versioned, named-field binary marshaling.
//!
//! All integers and floats are little-endian. Strings and arrays are
//! length-prefixed with a `u64` count. Every object starts with the magic
//! bytes, its name and a format version; every field is preceded by its
//! name, which the reader checks against the name it asks for. There is no
//! compression and no alignment padding.

use std::io::{Read, Write};

use crate::error::MarshalError;

/// Magic bytes at the start of every marshaled object.
pub const MAGIC: [u8; 4] = *b"OETA";

/// Longest string the reader accepts, guarding against corrupt lengths.
const MAX_STRING_LEN: u64 = 1 << 16;

/// Writes named fields to an underlying byte sink.
pub struct MarshalWriter<W> {
    inner: W,
}

impl<W: Write> MarshalWriter<W> {
    /// Wrap a byte sink.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Unwrap the byte sink.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Write an object header: magic, object name, version.
    pub fn begin_object(&mut self, name: &str, version: u8) -> Result<(), MarshalError> {
        self.inner.write_all(&MAGIC)?;
        self.put_str(name)?;
        self.inner.write_all(&[version])?;
        Ok(())
    }

    /// Write an object trailer, repeating the object name.
    pub fn end_object(&mut self, name: &str) -> Result<(), MarshalError> {
        self.put_str(name)
    }

    /// Write a named `bool`.
    pub fn write_bool(&mut self, name: &str, v: bool) -> Result<(), MarshalError> {
        self.put_str(name)?;
        self.inner.write_all(&[u8::from(v)])?;
        Ok(())
    }

    /// Write a named `u8`.
    pub fn write_u8(&mut self, name: &str, v: u8) -> Result<(), MarshalError> {
        self.put_str(name)?;
        self.inner.write_all(&[v])?;
        Ok(())
    }

    /// Write a named `u64`.
    pub fn write_u64(&mut self, name: &str, v: u64) -> Result<(), MarshalError> {
        self.put_str(name)?;
        self.inner.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    /// Write a named `usize`, stored as `u64`.
    pub fn write_usize(&mut self, name: &str, v: usize) -> Result<(), MarshalError> {
        self.write_u64(name, v as u64)
    }

    /// Write a named `f64`.
    pub fn write_f64(&mut self, name: &str, v: f64) -> Result<(), MarshalError> {
        self.put_str(name)?;
        self.inner.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    /// Write a named string.
    pub fn write_str(&mut self, name: &str, v: &str) -> Result<(), MarshalError> {
        self.put_str(name)?;
        self.put_str(v)
    }

    /// Write a named `f64` array.
    pub fn write_f64_array(&mut self, name: &str, v: &[f64]) -> Result<(), MarshalError> {
        self.put_str(name)?;
        self.put_len(v.len())?;
        for x in v {
            self.inner.write_all(&x.to_le_bytes())?;
        }
        Ok(())
    }

    /// Write a named `f32` array.
    pub fn write_f32_array(&mut self, name: &str, v: &[f32]) -> Result<(), MarshalError> {
        self.put_str(name)?;
        self.put_len(v.len())?;
        for x in v {
            self.inner.write_all(&x.to_le_bytes())?;
        }
        Ok(())
    }

    /// Write a named `i32` array.
    pub fn write_i32_array(&mut self, name: &str, v: &[i32]) -> Result<(), MarshalError> {
        self.put_str(name)?;
        self.put_len(v.len())?;
        for x in v {
            self.inner.write_all(&x.to_le_bytes())?;
        }
        Ok(())
    }

    /// Write a named `u64` array.
    pub fn write_u64_array(&mut self, name: &str, v: &[u64]) -> Result<(), MarshalError> {
        self.put_str(name)?;
        self.put_len(v.len())?;
        for x in v {
            self.inner.write_all(&x.to_le_bytes())?;
        }
        Ok(())
    }

    fn put_len(&mut self, len: usize) -> Result<(), MarshalError> {
        self.inner.write_all(&(len as u64).to_le_bytes())?;
        Ok(())
    }

    fn put_str(&mut self, s: &str) -> Result<(), MarshalError> {
        self.put_len(s.len())?;
        self.inner.write_all(s.as_bytes())?;
        Ok(())
    }
}

/// Reads named fields from an underlying byte source.
pub struct MarshalReader<R> {
    inner: R,
}

impl<R: Read> MarshalReader<R> {
    /// Wrap a byte source.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Unwrap the byte source.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read an object header and return its version.
    ///
    /// # Errors
    ///
    /// Fails on bad magic, a different object name, or a version above
    /// `max_version`.
    pub fn begin_object(&mut self, name: &str, max_version: u8) -> Result<u8, MarshalError> {
        let mut magic = [0u8; 4];
        self.inner.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(MarshalError::InvalidMagic);
        }
        let found = self.get_str()?;
        if found != name {
            return Err(MarshalError::ObjectMismatch {
                expected: name.to_string(),
                found,
            });
        }
        let version = self.get_u8()?;
        if version == 0 || version > max_version {
            return Err(MarshalError::UnsupportedVersion {
                object: name.to_string(),
                found: version,
            });
        }
        Ok(version)
    }

    /// Read an object trailer.
    pub fn end_object(&mut self, name: &str) -> Result<(), MarshalError> {
        self.expect_name(name)
    }

    /// Read a named `bool`.
    pub fn read_bool(&mut self, name: &str) -> Result<bool, MarshalError> {
        self.expect_name(name)?;
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(MarshalError::Malformed {
                detail: format!("field '{name}': invalid bool byte {other}"),
            }),
        }
    }

    /// Read a named `u8`.
    pub fn read_u8(&mut self, name: &str) -> Result<u8, MarshalError> {
        self.expect_name(name)?;
        self.get_u8()
    }

    /// Read a named `u64`.
    pub fn read_u64(&mut self, name: &str) -> Result<u64, MarshalError> {
        self.expect_name(name)?;
        self.get_u64()
    }

    /// Read a named `usize`.
    pub fn read_usize(&mut self, name: &str) -> Result<usize, MarshalError> {
        let v = self.read_u64(name)?;
        usize::try_from(v).map_err(|_| MarshalError::Malformed {
            detail: format!("field '{name}': {v} does not fit in usize"),
        })
    }

    /// Read a named `f64`.
    pub fn read_f64(&mut self, name: &str) -> Result<f64, MarshalError> {
        self.expect_name(name)?;
        let mut buf = [0u8; 8];
        self.inner.read_exact(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    /// Read a named string.
    pub fn read_str(&mut self, name: &str) -> Result<String, MarshalError> {
        self.expect_name(name)?;
        self.get_str()
    }

    /// Read a named `f64` array.
    pub fn read_f64_array(&mut self, name: &str) -> Result<Vec<f64>, MarshalError> {
        self.expect_name(name)?;
        let len = self.get_len()?;
        let mut out = Vec::with_capacity(len.min(1 << 20));
        let mut buf = [0u8; 8];
        for _ in 0..len {
            self.inner.read_exact(&mut buf)?;
            out.push(f64::from_le_bytes(buf));
        }
        Ok(out)
    }

    /// Read a named `f32` array.
    pub fn read_f32_array(&mut self, name: &str) -> Result<Vec<f32>, MarshalError> {
        self.expect_name(name)?;
        let len = self.get_len()?;
        let mut out = Vec::with_capacity(len.min(1 << 20));
        let mut buf = [0u8; 4];
        for _ in 0..len {
            self.inner.read_exact(&mut buf)?;
            out.push(f32::from_le_bytes(buf));
        }
        Ok(out)
    }

    /// Read a named `i32` array.
    pub fn read_i32_array(&mut self, name: &str) -> Result<Vec<i32>, MarshalError> {
        self.expect_name(name)?;
        let len = self.get_len()?;
        let mut out = Vec::with_capacity(len.min(1 << 20));
        let mut buf = [0u8; 4];
        for _ in 0..len {
            self.inner.read_exact(&mut buf)?;
            out.push(i32::from_le_bytes(buf));
        }
        Ok(out)
    }

    /// Read a named `u64` array.
    pub fn read_u64_array(&mut self, name: &str) -> Result<Vec<u64>, MarshalError> {
        self.expect_name(name)?;
        let len = self.get_len()?;
        let mut out = Vec::with_capacity(len.min(1 << 20));
        for _ in 0..len {
            out.push(self.get_u64()?);
        }
        Ok(out)
    }

    fn expect_name(&mut self, name: &str) -> Result<(), MarshalError> {
        let found = self.get_str()?;
        if found == name {
            Ok(())
        } else {
            Err(MarshalError::FieldMismatch {
                expected: name.to_string(),
                found,
            })
        }
    }

    fn get_u8(&mut self) -> Result<u8, MarshalError> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn get_u64(&mut self) -> Result<u64, MarshalError> {
        let mut buf = [0u8; 8];
        self.inner.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn get_len(&mut self) -> Result<usize, MarshalError> {
        let len = self.get_u64()?;
        usize::try_from(len).map_err(|_| MarshalError::Malformed {
            detail: format!("length {len} does not fit in usize"),
        })
    }

    fn get_str(&mut self) -> Result<String, MarshalError> {
        let len = self.get_u64()?;
        if len > MAX_STRING_LEN {
            return Err(MarshalError::Malformed {
                detail: format!("string length {len} exceeds {MAX_STRING_LEN}"),
            });
        }
        let mut buf = vec![0u8; len as usize];
        self.inner.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|e| MarshalError::Malformed {
            detail: format!("invalid UTF-8 string: {e}"),
        })
    }
}
