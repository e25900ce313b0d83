//! PARC binary parsing
//!
//! Parses the 0x20-byte header, the sequential name tables, the two entry
//! tables, and optionally the payload region, then wires up the directory
//! tree.

use std::io::Cursor;
use std::path::Path;
use tracing::{debug, trace};

use sllz::Endianness;

use crate::archive::{tree, Archive, Root};
use crate::directory::{DirectoryHeader, ParDirectory};
use crate::file::{FileHeader, ParFile};
use crate::ioutils::DataReader;
use crate::{
    ParError, Result, NAME_ENTRY_SIZE, PARC_HEADER_SIZE, PARC_MAGIC, TABLE_ENTRY_SIZE,
};

impl Archive {
    /// Parse an archive from its raw bytes.
    ///
    /// With `load_all_data` every entry payload is read into memory,
    /// leaving the archive ready to emit.
    pub fn from_bytes(name: impl Into<String>, data: &[u8], load_all_data: bool) -> Result<Self> {
        let name = name.into();

        if data.len() < PARC_HEADER_SIZE {
            return Err(ParError::TruncatedArchive {
                declared: PARC_HEADER_SIZE as u64,
                actual: data.len() as u64,
            });
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&data[..4]);
        if magic != PARC_MAGIC {
            return Err(ParError::InvalidMagic(magic));
        }

        let endianness =
            Endianness::from_byte(data[5]).ok_or(ParError::InvalidEndianness(data[5]))?;
        let mut reader = DataReader::new(Cursor::new(data), endianness);
        reader.seek_to(4)?;

        let platform = reader.read_u8()?;
        reader.read_u8()?; // endianness tag, decoded above
        let size_extended = reader.read_u8()? != 0;
        let relocated = reader.read_u8()? != 0;
        let file_size_mode = reader.read_u16()?;
        let unknown_a = reader.read_u16()?;
        let total_size = reader.read_u32()?;
        let dir_count = reader.read_u32()? as usize;
        let dir_table_offset = u64::from(reader.read_u32()?);
        let file_count = reader.read_u32()? as usize;
        let file_table_offset = u64::from(reader.read_u32()?);

        if file_size_mode == 1 && u64::from(total_size) > data.len() as u64 {
            return Err(ParError::TruncatedArchive {
                declared: u64::from(total_size),
                actual: data.len() as u64,
            });
        }

        debug!(
            "parsing {name:?}: {dir_count} directories, {file_count} files, {:?} endian",
            endianness
        );

        // Name tables follow the header back to back.
        reader.seek_to(PARC_HEADER_SIZE as u64)?;
        let mut dir_names = Vec::with_capacity(dir_count);
        for _ in 0..dir_count {
            dir_names.push(reader.read_padded_name(NAME_ENTRY_SIZE)?);
        }
        let mut file_names = Vec::with_capacity(file_count);
        for _ in 0..file_count {
            file_names.push(reader.read_padded_name(NAME_ENTRY_SIZE)?);
        }

        let mut directories = Vec::with_capacity(dir_count);
        for (i, dir_name) in dir_names.into_iter().enumerate() {
            reader.push_forward(dir_table_offset + (i * TABLE_ENTRY_SIZE) as u64)?;
            let header = DirectoryHeader::parse(&mut reader)?;
            reader.pop_back()?;
            trace!("directory {i}: {dir_name:?} {header:?}");

            directories.push(ParDirectory {
                name: dir_name,
                header,
                ..ParDirectory::default()
            });
        }

        let mut files = Vec::with_capacity(file_count);
        for (i, file_name) in file_names.into_iter().enumerate() {
            reader.push_forward(file_table_offset + (i * TABLE_ENTRY_SIZE) as u64)?;
            let header = FileHeader::parse(&mut reader)?;
            reader.pop_back()?;
            trace!("file {i}: {file_name:?} {header:?}");

            let mut file = ParFile::new(file_name);
            file.header = header;
            if load_all_data {
                file.load_data(&mut reader, Some(header.data_offset))?;
            }
            files.push(file);
        }

        let mut archive = Archive {
            name,
            platform,
            endianness,
            size_extended,
            relocated,
            file_size_mode,
            unknown_a,
            directories,
            files,
            root: Root::Synthesized(ParDirectory::new(".")),
            archive_initialized: true,
            file_tree_initialized: false,
            data_loaded: load_all_data || file_count == 0,
        };
        tree::wire_tree(&mut archive);
        Ok(archive)
    }

    /// Read and parse an archive file.
    ///
    /// The archive name is the file stem (`foo.par` yields `foo`).
    pub fn open(path: impl AsRef<Path>, load_all_data: bool) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ParError::NotFound(path.to_path_buf()));
        }

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let data = std::fs::read(path)?;
        Self::from_bytes(name, &data, load_all_data)
    }
}
