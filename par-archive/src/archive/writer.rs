//! PARC binary emission
//!
//! Two-pass layout: the header region is pre-extended and filled in
//! place, then every file entry appends its payload at the end of the
//! stream and backpatches its own table record. The header's total-size
//! field is backpatched last.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::archive::Archive;
use crate::config::{ArchiveOptions, SizeMode};
use crate::ioutils::DataWriter;
use crate::manifest;
use crate::{
    ParError, Result, MAX_NAME_LEN, NAME_ENTRY_SIZE, PARC_HEADER_SIZE, PARC_MAGIC,
    TABLE_ENTRY_SIZE,
};

fn align_up(value: u64, boundary: u64) -> u64 {
    value.div_ceil(boundary) * boundary
}

impl Archive {
    /// Emit the archive as bytes.
    ///
    /// Entry placement updates each file's header offsets, so the archive
    /// reflects the emitted layout afterwards.
    pub fn to_bytes(&mut self, opts: &ArchiveOptions) -> Result<Vec<u8>> {
        if !self.archive_initialized {
            return Err(ParError::NotInitialized("entry tables not populated"));
        }
        if !self.file_tree_initialized {
            return Err(ParError::NotInitialized("file tree not wired"));
        }
        if !self.data_loaded {
            return Err(ParError::NotInitialized("entry payloads not loaded"));
        }

        let dir_count = self.directories.len();
        let file_count = self.files.len();
        let alignment = u64::from(opts.alignment);

        let dir_table_offset =
            (PARC_HEADER_SIZE + (dir_count + file_count) * NAME_ENTRY_SIZE) as u64;
        let file_table_offset = dir_table_offset + (dir_count * TABLE_ENTRY_SIZE) as u64;
        let end_of_headers = file_table_offset + (file_count * TABLE_ENTRY_SIZE) as u64;
        let end_of_headers = align_up(end_of_headers, alignment);

        debug!(
            "emitting {:?}: {dir_count} directories, {file_count} files, headers end at {end_of_headers:#x}",
            self.name
        );

        let mut writer = DataWriter::new(Cursor::new(Vec::new()), self.endianness);
        writer.extend_to(end_of_headers)?;
        writer.seek_to(0)?;

        writer.write_bytes(&PARC_MAGIC)?;
        writer.write_u8(self.platform)?;
        writer.write_u8(self.endianness.as_byte())?;
        writer.write_u8(self.size_extended as u8)?;
        writer.write_u8(self.relocated as u8)?;
        writer.write_u16(opts.size_mode.header_value())?;
        writer.write_u16(self.unknown_a)?;
        writer.write_u32(0)?; // total size, backpatched below
        writer.write_u32(dir_count as u32)?;
        writer.write_u32(dir_table_offset as u32)?;
        writer.write_u32(file_count as u32)?;
        writer.write_u32(file_table_offset as u32)?;

        for dir in &self.directories {
            if dir.name.len() > MAX_NAME_LEN {
                return Err(ParError::NameTooLong(dir.name.clone()));
            }
            writer.write_padded_name(&dir.name, NAME_ENTRY_SIZE)?;
        }
        for file in &self.files {
            if file.name.len() > MAX_NAME_LEN {
                return Err(ParError::NameTooLong(file.name.clone()));
            }
            writer.write_padded_name(&file.name, NAME_ENTRY_SIZE)?;
        }

        for dir in &self.directories {
            dir.header.write(&mut writer)?;
        }

        for i in 0..file_count {
            writer.seek_to(file_table_offset + (i * TABLE_ENTRY_SIZE) as u64)?;
            self.files[i].store_entry(&mut writer, opts.alignment, opts.encoding, opts)?;
        }

        if opts.size_mode != SizeMode::Skip {
            let mut total = writer.stream_len()?;
            if opts.size_mode == SizeMode::WriteAligned {
                total = align_up(total, alignment);
            }
            writer.push_forward(12)?;
            writer.write_u32(total as u32)?;
            writer.pop_back()?;
        }

        let final_len = writer.pad_to(alignment)?;
        debug!("emitted {:?}: {final_len:#x} bytes", self.name);

        Ok(writer.into_inner().into_inner())
    }

    /// Emit the archive to disk.
    ///
    /// A directory path gets `<name>.par` appended; any other path is
    /// used as given. With [`ArchiveOptions::generate_manifest`] set, a
    /// `.manifest` sidecar is written next to the archive. Returns the
    /// archive path.
    pub fn save(&mut self, path: impl AsRef<Path>, opts: &ArchiveOptions) -> Result<PathBuf> {
        let path = path.as_ref();
        let target = if path.is_dir() {
            path.join(format!("{}.par", self.name))
        } else {
            path.to_path_buf()
        };

        let bytes = self.to_bytes(opts)?;
        std::fs::write(&target, bytes)?;

        if opts.generate_manifest {
            let sidecar = target.with_file_name(manifest::manifest_file_name(self));
            std::fs::write(sidecar, manifest::write_manifest(self))?;
        }

        Ok(target)
    }
}
