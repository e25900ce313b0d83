//! Archived file entries
//!
//! A file entry is a 0x20-byte record in the archive's file table plus a
//! payload in the data region. The entry name lives in the separate
//! 0x40-byte name table. Loaded payloads are kept in a bounded history so
//! a decode remembers the encoded bytes and a re-encode remembers the
//! plaintext.

use std::io::{Read, Seek, Write};
use tracing::{debug, warn};

use sllz::Endianness;

use crate::config::ArchiveOptions;
use crate::history::DataHistory;
use crate::ioutils::{DataReader, DataWriter};
use crate::{EntryEncoding, ParError, Result, ATTR_ARCHIVE};

/// Compression flag in the first header word.
const COMPRESSED_FLAG: u32 = 0x8000_0000;

/// Low offset word written when the true offset does not fit 32 bits.
const OFFSET_SENTINEL: u32 = 0xFFFF_FFFF;

/// The 0x20-byte on-disk file record.
///
/// | off | size | field |
/// |-----|------|-------|
/// | 0   | 4    | compression flag (`0x80000000` or 0) |
/// | 4   | 4    | declared uncompressed size |
/// | 8   | 4    | entry length (stored payload length) |
/// | 12  | 4    | data offset, low 32 bits (`0xFFFFFFFF` sentinel) |
/// | 16  | 4    | attributes bitmap |
/// | 20  | 4    | data offset, bits 32..56 in the low 24 bits |
/// | 24  | 8    | timestamp, seconds since the epoch |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileHeader {
    /// Payload in the archive is SLLZ-compressed.
    pub compressed: bool,
    /// Declared uncompressed size.
    pub size: u32,
    /// On-disk payload length. Equals `size` for uncompressed entries.
    pub entry_length: u32,
    /// Absolute payload offset within the archive.
    pub data_offset: u64,
    /// Opaque attributes bitmap.
    pub attributes: u32,
    /// Seconds since 1970-01-01 UTC.
    pub timestamp: u64,
}

impl FileHeader {
    /// Parse a file record at the reader's current position.
    pub fn parse<R: Read + Seek>(reader: &mut DataReader<R>) -> Result<Self> {
        let flags = reader.read_u32()?;
        let size = reader.read_u32()?;
        let entry_length = reader.read_u32()?;
        let offset_low = reader.read_u32()?;
        let attributes = reader.read_u32()?;
        let offset_high = reader.read_u32()?;
        let timestamp = reader.read_u64()?;

        let data_offset = (u64::from(offset_high & 0x00FF_FFFF) << 32) | u64::from(offset_low);

        Ok(Self {
            compressed: flags & COMPRESSED_FLAG != 0,
            size,
            entry_length,
            data_offset,
            attributes,
            timestamp,
        })
    }

    /// Write the 0x20-byte file record at the writer's current position.
    pub fn write<W: Write + Seek>(&self, writer: &mut DataWriter<W>) -> Result<()> {
        writer.write_u32(if self.compressed { COMPRESSED_FLAG } else { 0 })?;
        writer.write_u32(self.size)?;
        writer.write_u32(self.entry_length)?;

        let offset_low = if self.data_offset > u64::from(u32::MAX) {
            OFFSET_SENTINEL
        } else {
            self.data_offset as u32
        };
        writer.write_u32(offset_low)?;
        writer.write_u32(self.attributes)?;
        writer.write_u32(((self.data_offset >> 32) & 0x00FF_FFFF) as u32)?;
        writer.write_u64(self.timestamp)?;
        Ok(())
    }
}

/// A file held by the archive.
#[derive(Debug, Clone, Default)]
pub struct ParFile {
    /// Entry name, at most 63 bytes.
    pub name: String,
    /// The on-disk record. Placement fields are refreshed on emit.
    pub header: FileHeader,
    /// The payload was compressed before the most recent decode.
    pub was_compressed: bool,
    /// Index of the containing directory in the archive's flat array.
    pub parent: Option<usize>,
    history: DataHistory,
}

impl ParFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            header: FileHeader {
                attributes: ATTR_ARCHIVE,
                ..FileHeader::default()
            },
            ..Self::default()
        }
    }

    /// Whether a payload is present in memory.
    pub fn is_loaded(&self) -> bool {
        !self.history.is_empty()
    }

    /// Whether the current payload is SLLZ-compressed.
    pub fn is_compressed(&self) -> bool {
        self.history
            .current()
            .map(|r| r.is_compressed)
            .unwrap_or(false)
    }

    /// The current payload bytes, if loaded.
    pub fn data(&self) -> Option<&[u8]> {
        self.history.current().map(|r| r.data.as_slice())
    }

    /// Payload history accessor (undo/redo across codec operations).
    pub fn history(&self) -> &DataHistory {
        &self.history
    }

    /// Mutable history accessor: stepping back after a decode restores
    /// the encoded payload as current. Placement fields are refreshed on
    /// emit, so moving through history cannot desync the written header.
    pub fn history_mut(&mut self) -> &mut DataHistory {
        &mut self.history
    }

    /// Replace the current payload.
    ///
    /// Plaintext payloads refresh the declared size as well.
    pub fn set_data(&mut self, data: Vec<u8>, is_compressed: bool) {
        self.header.entry_length = data.len() as u32;
        if !is_compressed {
            self.header.size = data.len() as u32;
        }
        self.history.add(data, is_compressed);
    }

    /// Read this entry's payload from the archive stream.
    ///
    /// Seeks first when `offset` is given, otherwise reads from the
    /// current position. The loaded bytes keep the header's compression
    /// state.
    pub fn load_data<R: Read + Seek>(
        &mut self,
        reader: &mut DataReader<R>,
        offset: Option<u64>,
    ) -> Result<()> {
        if let Some(offset) = offset {
            reader.seek_to(offset)?;
        }
        let data = reader.read_bytes(self.header.entry_length as usize)?;
        self.history.add(data, self.header.compressed);
        Ok(())
    }

    /// Decode the current payload if it is compressed.
    ///
    /// The plaintext becomes the current history record. If the SLLZ
    /// header disagrees with the declared size, the actual decoded length
    /// wins.
    pub fn decode(&mut self, opts: &ArchiveOptions) -> Result<()> {
        let record = self
            .history
            .current()
            .ok_or_else(|| ParError::DataNotLoaded(self.name.clone()))?;

        if !record.is_compressed {
            if !opts.suppress_warnings {
                warn!("{}: decode requested but payload is not compressed", self.name);
            }
            return Ok(());
        }

        let decoded = sllz::decompress(&record.data)?;
        if decoded.len() != self.header.size as usize {
            if !opts.suppress_warnings {
                warn!(
                    "{}: declared size {} disagrees with decoded length {}; keeping the decoded length",
                    self.name,
                    self.header.size,
                    decoded.len()
                );
            }
            self.header.size = decoded.len() as u32;
        }

        self.history.add(decoded, false);
        self.was_compressed = true;
        Ok(())
    }

    /// Encode the current payload if it is plaintext.
    ///
    /// The encoding is kept only when it is shorter than the plaintext,
    /// unless `force` is set. Requesting [`EntryEncoding::Uncompressed`]
    /// is a no-op. Returns whether the payload changed.
    pub fn encode(
        &mut self,
        encoding: EntryEncoding,
        endianness: Endianness,
        force: bool,
        opts: &ArchiveOptions,
    ) -> Result<bool> {
        let Some(version) = encoding.version() else {
            return Ok(false);
        };

        let record = self
            .history
            .current()
            .ok_or_else(|| ParError::DataNotLoaded(self.name.clone()))?;

        if record.is_compressed {
            if !opts.suppress_warnings {
                warn!("{}: encode requested but payload is already compressed", self.name);
            }
            return Ok(false);
        }

        let plain_len = record.data.len();
        let encoded = match sllz::compress(&record.data, version, endianness) {
            Ok(encoded) => encoded,
            Err(sllz::Error::InputTooSmall { len, min }) if !force => {
                if !opts.suppress_warnings {
                    warn!("{}: {len} bytes is below the v2 minimum of {min}; leaving plain", self.name);
                }
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        if encoded.len() >= plain_len && !force {
            if !opts.suppress_warnings {
                warn!(
                    "{}: encoding would grow {plain_len} bytes to {}; leaving plain",
                    self.name,
                    encoded.len()
                );
            }
            return Ok(false);
        }

        debug!("{}: encoded {plain_len} bytes to {}", self.name, encoded.len());
        self.header.size = plain_len as u32;
        self.header.entry_length = encoded.len() as u32;
        self.history.add(encoded, true);
        Ok(true)
    }

    /// Serialize this entry into an archive being emitted.
    ///
    /// The writer must sit on this entry's header slot. The payload is
    /// appended at the end of the stream, padded up to `alignment` only
    /// when the slack before the next boundary is no larger than the
    /// payload, and the header is backpatched with the resulting offset.
    pub fn store_entry<W: Write + Seek>(
        &mut self,
        writer: &mut DataWriter<W>,
        alignment: u32,
        encoding: Option<EntryEncoding>,
        opts: &ArchiveOptions,
    ) -> Result<()> {
        if !self.is_loaded() {
            return Err(ParError::DataNotLoaded(self.name.clone()));
        }

        if let Some(encoding) = encoding {
            self.encode(encoding, writer.endianness(), false, opts)?;
        }

        let end = writer.push_forward_to_end()?;
        let payload_len = self
            .data()
            .ok_or_else(|| ParError::DataNotLoaded(self.name.clone()))?
            .len() as u64;

        let mut offset = end;
        let remainder = end % u64::from(alignment);
        if remainder != 0 {
            let slack = u64::from(alignment) - remainder;
            if slack <= payload_len {
                writer.write_zeros(slack as usize)?;
                offset = end + slack;
            }
        }

        self.header.data_offset = offset;
        self.header.entry_length = payload_len as u32;
        self.header.compressed = self.is_compressed();

        if let Some(record) = self.history.current() {
            writer.write_bytes(&record.data)?;
        }
        writer.pop_back()?;

        self.header.write(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn opts() -> ArchiveOptions {
        ArchiveOptions::default()
    }

    #[test]
    fn test_header_roundtrip() {
        let header = FileHeader {
            compressed: true,
            size: 1000,
            entry_length: 600,
            data_offset: 0x800,
            attributes: ATTR_ARCHIVE,
            timestamp: 1_700_000_000,
        };

        for endianness in [Endianness::Little, Endianness::Big] {
            let mut writer = DataWriter::new(Cursor::new(Vec::new()), endianness);
            header.write(&mut writer).unwrap();
            let buf = writer.into_inner().into_inner();
            assert_eq!(buf.len(), 0x20);

            let mut reader = DataReader::new(Cursor::new(&buf), endianness);
            assert_eq!(FileHeader::parse(&mut reader).unwrap(), header);
        }
    }

    #[test]
    fn test_header_offset_split() {
        let header = FileHeader {
            data_offset: 0x0000_0012_3456_7800,
            ..FileHeader::default()
        };

        let mut writer = DataWriter::new(Cursor::new(Vec::new()), Endianness::Little);
        header.write(&mut writer).unwrap();
        let buf = writer.into_inner().into_inner();

        // Low word carries the sentinel, high word bits 32..56.
        assert_eq!(&buf[12..16], &0xFFFF_FFFFu32.to_le_bytes());
        assert_eq!(&buf[20..24], &0x12u32.to_le_bytes());
    }

    #[test]
    fn test_decode_requires_loaded_data() {
        let mut file = ParFile::new("empty.bin");
        let err = file.decode(&opts()).unwrap_err();
        assert!(matches!(err, ParError::DataNotLoaded(_)));
    }

    #[test]
    fn test_encode_decode_cycle() {
        let payload = b"cycle cycle cycle cycle cycle cycle cycle".repeat(8);
        let mut file = ParFile::new("cycle.bin");
        file.set_data(payload.clone(), false);

        let changed = file
            .encode(EntryEncoding::SllzV1, Endianness::Little, false, &opts())
            .unwrap();
        assert!(changed);
        assert!(file.is_compressed());
        assert!((file.header.entry_length as usize) < payload.len());
        assert_eq!(file.header.size as usize, payload.len());

        file.decode(&opts()).unwrap();
        assert!(!file.is_compressed());
        assert!(file.was_compressed);
        assert_eq!(file.data().unwrap(), payload.as_slice());

        // The encoded payload is still one step back in history.
        assert_eq!(file.history().len(), 3);
    }

    #[test]
    fn test_encode_redundant_is_noop() {
        let payload = b"already compressed data data data data".repeat(4);
        let mut file = ParFile::new("again.bin");
        file.set_data(payload, false);
        file.encode(EntryEncoding::SllzV1, Endianness::Little, false, &opts())
            .unwrap();

        let before = file.header.entry_length;
        let changed = file
            .encode(EntryEncoding::SllzV1, Endianness::Little, false, &opts())
            .unwrap();
        assert!(!changed);
        assert_eq!(file.header.entry_length, before);
    }

    #[test]
    fn test_encode_uncompressed_is_noop() {
        let mut file = ParFile::new("plain.bin");
        file.set_data(b"some plain bytes".to_vec(), false);
        let changed = file
            .encode(EntryEncoding::Uncompressed, Endianness::Little, false, &opts())
            .unwrap();
        assert!(!changed);
        assert!(!file.is_compressed());
    }

    #[test]
    fn test_encode_expanding_input_is_noop() {
        // High-entropy bytes cannot shrink; without force the plaintext
        // stays current.
        let mut state = 0x1234_5678u32;
        let payload: Vec<u8> = (0..512)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 24) as u8
            })
            .collect();

        let mut file = ParFile::new("noise.bin");
        file.set_data(payload.clone(), false);
        let changed = file
            .encode(EntryEncoding::SllzV1, Endianness::Little, false, &opts())
            .unwrap();
        assert!(!changed);
        assert_eq!(file.data().unwrap(), payload.as_slice());
    }

    #[test]
    fn test_store_entry_alignment() {
        let mut writer = DataWriter::new(Cursor::new(Vec::new()), Endianness::Little);
        // Simulate a header region: table slot at 0, stream extended past it.
        writer.extend_to(0x30).unwrap();
        writer.seek_to(0).unwrap();

        let payload = vec![0xABu8; 0x100];
        let mut file = ParFile::new("aligned.bin");
        file.set_data(payload.clone(), false);
        file.store_entry(&mut writer, 0x40, None, &opts()).unwrap();

        // Slack to 0x40 was 0x10 <= 0x100, so the payload was aligned up.
        assert_eq!(file.header.data_offset, 0x40);
        let buf = writer.into_inner().into_inner();
        assert_eq!(&buf[0x40..0x140], payload.as_slice());

        // Header landed in the reserved slot.
        let mut reader = DataReader::new(Cursor::new(&buf), Endianness::Little);
        let header = FileHeader::parse(&mut reader).unwrap();
        assert_eq!(header.data_offset, 0x40);
        assert_eq!(header.entry_length, 0x100);
        assert!(!header.compressed);
    }

    #[test]
    fn test_store_entry_packs_into_slack() {
        let mut writer = DataWriter::new(Cursor::new(Vec::new()), Endianness::Little);
        writer.extend_to(0x30).unwrap();
        writer.seek_to(0).unwrap();

        // 0x10 bytes of slack, 4-byte payload: stays unaligned.
        let mut file = ParFile::new("packed.bin");
        file.set_data(vec![1, 2, 3, 4], false);
        file.store_entry(&mut writer, 0x40, None, &opts()).unwrap();

        assert_eq!(file.header.data_offset, 0x30);
    }

    #[test]
    fn test_store_entry_requires_data() {
        let mut writer = DataWriter::new(Cursor::new(Vec::new()), Endianness::Little);
        let mut file = ParFile::new("missing.bin");
        let err = file
            .store_entry(&mut writer, 0x800, None, &opts())
            .unwrap_err();
        assert!(matches!(err, ParError::DataNotLoaded(_)));
    }
}
