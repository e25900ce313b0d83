//! Endian-aware binary stream primitives
//!
//! PARC archives pick their byte order at parse time (header byte 5), so
//! the reader and writer carry a stream endianness instead of fixing one
//! at the type level. Both expose a position stack: `push_forward` saves
//! the current position and seeks, `pop_back` restores it. The writer uses
//! this for the two-pass layout where header slots are reserved, payloads
//! land at the end of the stream, and the headers are backpatched.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use sllz::Endianness;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::Result;

/// Buffered reader with a configurable byte order and a position stack.
#[derive(Debug)]
pub struct DataReader<R> {
    inner: R,
    endianness: Endianness,
    saved: Vec<u64>,
}

impl<R: Read + Seek> DataReader<R> {
    pub fn new(inner: R, endianness: Endianness) -> Self {
        Self {
            inner,
            endianness,
            saved: Vec::new(),
        }
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = endianness;
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Total stream length; the current position is preserved.
    pub fn stream_len(&mut self) -> Result<u64> {
        let pos = self.inner.stream_position()?;
        let len = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(len)
    }

    /// Save the current position and seek to `offset`.
    pub fn push_forward(&mut self, offset: u64) -> Result<()> {
        let pos = self.inner.stream_position()?;
        self.saved.push(pos);
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Restore the last saved position.
    pub fn pop_back(&mut self) -> Result<()> {
        if let Some(pos) = self.saved.pop() {
            self.inner.seek(SeekFrom::Start(pos))?;
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.inner.read_u8()?)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(match self.endianness {
            Endianness::Little => self.inner.read_u16::<LittleEndian>()?,
            Endianness::Big => self.inner.read_u16::<BigEndian>()?,
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(match self.endianness {
            Endianness::Little => self.inner.read_u32::<LittleEndian>()?,
            Endianness::Big => self.inner.read_u32::<BigEndian>()?,
        })
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(match self.endianness {
            Endianness::Little => self.inner.read_u64::<LittleEndian>()?,
            Endianness::Big => self.inner.read_u64::<BigEndian>()?,
        })
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read a fixed-width name field, stripping trailing NUL padding.
    pub fn read_padded_name(&mut self, width: usize) -> Result<String> {
        let raw = self.read_bytes(width)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}

/// Buffered writer with a configurable byte order and a position stack.
#[derive(Debug)]
pub struct DataWriter<W> {
    inner: W,
    endianness: Endianness,
    saved: Vec<u64>,
}

impl<W: Write + Seek> DataWriter<W> {
    pub fn new(inner: W, endianness: Endianness) -> Self {
        Self {
            inner,
            endianness,
            saved: Vec::new(),
        }
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Total stream length; the current position is preserved.
    pub fn stream_len(&mut self) -> Result<u64> {
        let pos = self.inner.stream_position()?;
        let len = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(len)
    }

    /// Save the current position and seek to `offset`.
    pub fn push_forward(&mut self, offset: u64) -> Result<()> {
        let pos = self.inner.stream_position()?;
        self.saved.push(pos);
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Save the current position and seek to the end of the stream.
    /// Returns the end position.
    pub fn push_forward_to_end(&mut self) -> Result<u64> {
        let pos = self.inner.stream_position()?;
        self.saved.push(pos);
        Ok(self.inner.seek(SeekFrom::End(0))?)
    }

    /// Restore the last saved position.
    pub fn pop_back(&mut self) -> Result<()> {
        if let Some(pos) = self.saved.pop() {
            self.inner.seek(SeekFrom::Start(pos))?;
        }
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        Ok(self.inner.write_u8(v)?)
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        Ok(match self.endianness {
            Endianness::Little => self.inner.write_u16::<LittleEndian>(v)?,
            Endianness::Big => self.inner.write_u16::<BigEndian>(v)?,
        })
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        Ok(match self.endianness {
            Endianness::Little => self.inner.write_u32::<LittleEndian>(v)?,
            Endianness::Big => self.inner.write_u32::<BigEndian>(v)?,
        })
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        Ok(match self.endianness {
            Endianness::Little => self.inner.write_u64::<LittleEndian>(v)?,
            Endianness::Big => self.inner.write_u64::<BigEndian>(v)?,
        })
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)?;
        Ok(())
    }

    pub fn write_zeros(&mut self, len: usize) -> Result<()> {
        // Chunked so large paddings don't allocate the whole run.
        const ZEROS: [u8; 4096] = [0; 4096];
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(ZEROS.len());
            self.inner.write_all(&ZEROS[..n])?;
            remaining -= n;
        }
        Ok(())
    }

    /// Write a name into a fixed-width field, NUL padded.
    pub fn write_padded_name(&mut self, name: &str, width: usize) -> Result<()> {
        let bytes = name.as_bytes();
        debug_assert!(bytes.len() < width);
        self.inner.write_all(bytes)?;
        self.write_zeros(width - bytes.len())?;
        Ok(())
    }

    /// Zero-fill the stream out to `offset` if it is shorter. The current
    /// position is left at `offset`.
    pub fn extend_to(&mut self, offset: u64) -> Result<()> {
        let len = self.inner.seek(SeekFrom::End(0))?;
        if len < offset {
            self.write_zeros((offset - len) as usize)?;
        } else {
            self.inner.seek(SeekFrom::Start(offset))?;
        }
        Ok(())
    }

    /// Zero-pad the stream length up to a multiple of `boundary`.
    /// Returns the padded length.
    pub fn pad_to(&mut self, boundary: u64) -> Result<u64> {
        let len = self.inner.seek(SeekFrom::End(0))?;
        let remainder = len % boundary;
        if remainder != 0 {
            self.write_zeros((boundary - remainder) as usize)?;
        }
        Ok(self.inner.stream_position()?)
    }
}
