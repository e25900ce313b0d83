//! Archive directory entries
//!
//! A directory is a 0x20-byte record describing two slices of the
//! archive's flat arrays: its run of subdirectories and its run of files.
//! The flat arrays own the entries; a directory's child lists are index
//! views resolved after the flat pass, which keeps the two representations
//! from drifting apart.

use std::io::{Read, Seek, Write};

use crate::ioutils::{DataReader, DataWriter};
use crate::{Result, ATTR_DIRECTORY};

/// The 0x20-byte on-disk directory record.
///
/// | off | size | field |
/// |-----|------|-------|
/// | 0   | 4    | subdirectory count |
/// | 4   | 4    | first subdirectory index |
/// | 8   | 4    | file count |
/// | 12  | 4    | first file index |
/// | 16  | 4    | attributes bitmap |
/// | 20  | 12   | reserved, zero |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryHeader {
    /// Number of direct subdirectories.
    pub dir_count: u32,
    /// Index of the first subdirectory in the archive's flat array.
    ///
    /// Leaf directories carry the archive's total directory count as a
    /// sentinel.
    pub first_dir_index: u32,
    /// Number of files directly in this directory.
    pub file_count: u32,
    /// Index of the first file in the archive's flat array.
    pub first_file_index: u32,
    /// Opaque attributes bitmap.
    pub attributes: u32,
}

impl Default for DirectoryHeader {
    fn default() -> Self {
        Self {
            dir_count: 0,
            first_dir_index: 0,
            file_count: 0,
            first_file_index: 0,
            attributes: ATTR_DIRECTORY,
        }
    }
}

impl DirectoryHeader {
    /// Parse a directory record at the reader's current position.
    pub fn parse<R: Read + Seek>(reader: &mut DataReader<R>) -> Result<Self> {
        let dir_count = reader.read_u32()?;
        let first_dir_index = reader.read_u32()?;
        let file_count = reader.read_u32()?;
        let first_file_index = reader.read_u32()?;
        let attributes = reader.read_u32()?;
        reader.read_bytes(12)?;

        Ok(Self {
            dir_count,
            first_dir_index,
            file_count,
            first_file_index,
            attributes,
        })
    }

    /// Write the 0x20-byte directory record.
    pub fn write<W: Write + Seek>(&self, writer: &mut DataWriter<W>) -> Result<()> {
        writer.write_u32(self.dir_count)?;
        writer.write_u32(self.first_dir_index)?;
        writer.write_u32(self.file_count)?;
        writer.write_u32(self.first_file_index)?;
        writer.write_u32(self.attributes)?;
        writer.write_zeros(12)?;
        Ok(())
    }
}

/// A directory node of the archive tree.
#[derive(Debug, Clone, Default)]
pub struct ParDirectory {
    /// Directory name, at most 63 bytes. Empty or `"."` marks the root.
    pub name: String,
    /// The on-disk record.
    pub header: DirectoryHeader,
    /// Indices of subdirectories in the archive's flat directory array.
    pub subdirs: Vec<usize>,
    /// Indices of files in the archive's flat file array.
    pub files: Vec<usize>,
}

impl ParDirectory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Whether this directory's name marks it as the archive root.
    pub fn is_root(&self) -> bool {
        self.name.is_empty() || self.name == "."
    }
}
