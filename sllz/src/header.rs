//! SLLZ container header parsing and writing
//!
//! Every SLLZ payload starts with a fixed 16-byte header:
//!
//! | off | size | field |
//! |-----|------|-------|
//! | 0   | 4    | magic `SLLZ` |
//! | 4   | 1    | endianness tag (0 little, 1 big) |
//! | 5   | 1    | version (1 or 2) |
//! | 6   | 2    | data offset, always 0x0010 |
//! | 8   | 4    | decompressed size |
//! | 12  | 4    | total SLLZ size (header + body) |
//!
//! The magic is stored as raw bytes; the multi-byte fields follow the
//! endianness tag.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::{Endianness, Error, Result, SllzVersion, HEADER_SIZE, SLLZ_MAGIC};

/// Parsed SLLZ container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SllzHeader {
    /// Byte order of the multi-byte header fields.
    pub endianness: Endianness,
    /// Stream version the body was encoded with.
    pub version: SllzVersion,
    /// Size of the payload once decompressed.
    pub decompressed_size: u32,
    /// Total container size: header plus compressed body.
    pub total_size: u32,
}

impl SllzHeader {
    /// Parse an SLLZ header at the reader's current position.
    pub fn parse<R: Read>(f: &mut R) -> Result<Self> {
        let mut magic = [0; SLLZ_MAGIC.len()];
        f.read_exact(&mut magic)?;
        if magic != SLLZ_MAGIC {
            return Err(Error::InvalidMagic(magic));
        }

        let endian_tag = f.read_u8()?;
        let endianness =
            Endianness::from_byte(endian_tag).ok_or(Error::InvalidEndianness(endian_tag))?;

        let version_byte = f.read_u8()?;
        let version =
            SllzVersion::from_byte(version_byte).ok_or(Error::UnsupportedVersion(version_byte))?;

        let data_offset = read_u16(f, endianness)?;
        if data_offset as usize != HEADER_SIZE {
            return Err(Error::InvalidDataOffset(data_offset));
        }

        let decompressed_size = read_u32(f, endianness)?;
        let total_size = read_u32(f, endianness)?;

        Ok(Self {
            endianness,
            version,
            decompressed_size,
            total_size,
        })
    }

    /// Write the 16-byte header.
    pub fn write<W: Write>(&self, f: &mut W) -> Result<()> {
        f.write_all(&SLLZ_MAGIC)?;
        f.write_u8(self.endianness.as_byte())?;
        f.write_u8(self.version.as_byte())?;
        write_u16(f, self.endianness, HEADER_SIZE as u16)?;
        write_u32(f, self.endianness, self.decompressed_size)?;
        write_u32(f, self.endianness, self.total_size)?;
        Ok(())
    }
}

fn read_u16<R: Read>(f: &mut R, e: Endianness) -> std::io::Result<u16> {
    match e {
        Endianness::Little => f.read_u16::<LittleEndian>(),
        Endianness::Big => f.read_u16::<BigEndian>(),
    }
}

fn read_u32<R: Read>(f: &mut R, e: Endianness) -> std::io::Result<u32> {
    match e {
        Endianness::Little => f.read_u32::<LittleEndian>(),
        Endianness::Big => f.read_u32::<BigEndian>(),
    }
}

fn write_u16<W: Write>(f: &mut W, e: Endianness, v: u16) -> std::io::Result<()> {
    match e {
        Endianness::Little => f.write_u16::<LittleEndian>(v),
        Endianness::Big => f.write_u16::<BigEndian>(v),
    }
}

fn write_u32<W: Write>(f: &mut W, e: Endianness, v: u32) -> std::io::Result<()> {
    match e {
        Endianness::Little => f.write_u32::<LittleEndian>(v),
        Endianness::Big => f.write_u32::<BigEndian>(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_little_endian_header() {
        let data = [
            b'S', b'L', b'L', b'Z', // Magic
            0x00, // Little endian
            0x01, // Version 1
            0x10, 0x00, // Data offset
            0x0B, 0x00, 0x00, 0x00, // Decompressed size = 11
            0x1A, 0x00, 0x00, 0x00, // Total size = 26
        ];

        let header = SllzHeader::parse(&mut Cursor::new(&data)).unwrap();
        assert_eq!(header.endianness, Endianness::Little);
        assert_eq!(header.version, SllzVersion::V1);
        assert_eq!(header.decompressed_size, 11);
        assert_eq!(header.total_size, 26);
    }

    #[test]
    fn test_parse_big_endian_header() {
        let data = [
            b'S', b'L', b'L', b'Z', // Magic
            0x01, // Big endian
            0x02, // Version 2
            0x00, 0x10, // Data offset
            0x00, 0x01, 0x00, 0x00, // Decompressed size = 65536
            0x00, 0x00, 0x20, 0x00, // Total size = 8192
        ];

        let header = SllzHeader::parse(&mut Cursor::new(&data)).unwrap();
        assert_eq!(header.endianness, Endianness::Big);
        assert_eq!(header.version, SllzVersion::V2);
        assert_eq!(header.decompressed_size, 65536);
        assert_eq!(header.total_size, 8192);
    }

    #[test]
    fn test_write_roundtrip() {
        let header = SllzHeader {
            endianness: Endianness::Big,
            version: SllzVersion::V1,
            decompressed_size: 1234,
            total_size: 456,
        };

        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(&buf[..4], b"SLLZ");

        let parsed = SllzHeader::parse(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_invalid_magic() {
        let data = b"ZLLS\x00\x01\x10\x00\x00\x00\x00\x00\x00\x00\x00\x00";
        let err = SllzHeader::parse(&mut Cursor::new(&data[..])).unwrap_err();
        assert!(matches!(err, Error::InvalidMagic(_)));
    }

    #[test]
    fn test_bad_data_offset() {
        let data = [
            b'S', b'L', b'L', b'Z',
            0x00, 0x01,
            0x20, 0x00, // Wrong data offset
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
        ];
        let err = SllzHeader::parse(&mut Cursor::new(&data)).unwrap_err();
        assert!(matches!(err, Error::InvalidDataOffset(0x20)));
    }
}
