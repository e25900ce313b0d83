//! Filesystem import and extraction
//!
//! Importing walks a real directory tree in pre-order with an explicit
//! base path (the working directory is never touched) and flattens it
//! into the archive's entry tables. Extraction recreates the tree on
//! disk, decoding compressed payloads and restoring per-entry
//! modification times.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

use sllz::Endianness;

use crate::archive::{Archive, TreeNode};
use crate::config::ArchiveOptions;
use crate::file::ParFile;
use crate::{ParError, Result, ATTR_ARCHIVE, ATTR_DIRECTORY};

/// Largest supported entry payload: sizes are 32-bit signed counts.
const MAX_FILE_SIZE: u64 = 0x8000_0000;

impl Archive {
    /// Build an archive from a directory on disk.
    ///
    /// Entries are collected in name order. With
    /// [`ArchiveOptions::write_root`] set (the default) a `"."` root entry
    /// leads the directory table.
    pub fn from_directory(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        opts: &ArchiveOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(ParError::NotFound(path.to_path_buf()));
        }

        let name = name.into();
        debug!("importing {path:?} as {name:?}");

        let tree = read_dir_tree(path)?;
        let mut archive = Archive::new(name, Endianness::Little);
        crate::archive::tree::flatten_into(&mut archive, tree, opts.write_root);

        debug!(
            "imported {} directories and {} files",
            archive.dir_count(),
            archive.file_count()
        );
        Ok(archive)
    }

    /// Extract the archive into `target`, decoding compressed payloads.
    pub fn extract_to(&mut self, target: impl AsRef<Path>, opts: &ArchiveOptions) -> Result<()> {
        let target = target.as_ref();
        fs::create_dir_all(target)?;

        // Resolve paths through the tree before touching payloads.
        let mut dir_paths: Vec<PathBuf> = Vec::new();
        let mut file_paths: Vec<(usize, PathBuf)> = Vec::new();
        collect_paths(self, self.root(), target, &mut dir_paths, &mut file_paths);

        for dir_path in &dir_paths {
            fs::create_dir_all(dir_path)?;
        }

        for (index, file_path) in file_paths {
            let file = &mut self.files[index];
            if !file.is_loaded() {
                return Err(ParError::DataNotLoaded(file.name.clone()));
            }
            if file.is_compressed() {
                file.decode(opts)?;
            }

            let Some(data) = file.data() else {
                return Err(ParError::DataNotLoaded(file.name.clone()));
            };
            trace!("extracting {:?} ({} bytes)", file_path, data.len());
            let mut handle = fs::File::create(&file_path)?;
            handle.write_all(data)?;

            if file.header.timestamp != 0 {
                let mtime = UNIX_EPOCH + Duration::from_secs(file.header.timestamp);
                handle.set_modified(mtime)?;
            }
        }

        Ok(())
    }
}

/// Recursively read a directory into a [`TreeNode`], children in name
/// order.
fn read_dir_tree(path: &Path) -> Result<TreeNode> {
    let mut entries: Vec<_> = fs::read_dir(path)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut node = TreeNode {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        attributes: ATTR_DIRECTORY,
        ..TreeNode::default()
    };

    for entry in entries {
        let entry_path = entry.path();
        if entry_path.is_dir() {
            node.children.push(read_dir_tree(&entry_path)?);
        } else {
            node.files.push(read_file(&entry_path)?);
        }
    }

    Ok(node)
}

/// Read one file's payload and metadata into an entry.
fn read_file(path: &Path) -> Result<ParFile> {
    let metadata = fs::metadata(path)?;
    if metadata.len() >= MAX_FILE_SIZE {
        return Err(ParError::SizeOverflow {
            size: metadata.len(),
        });
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut file = ParFile::new(name);
    file.header.attributes = ATTR_ARCHIVE;
    file.header.timestamp = metadata
        .modified()
        .ok()
        .and_then(|mtime| mtime.duration_since(UNIX_EPOCH).ok())
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or(0)
        });
    file.set_data(fs::read(path)?, false);

    Ok(file)
}

/// Walk the tree, collecting the on-disk path of every directory and
/// file.
fn collect_paths(
    archive: &Archive,
    dir: &crate::directory::ParDirectory,
    base: &Path,
    dir_paths: &mut Vec<PathBuf>,
    file_paths: &mut Vec<(usize, PathBuf)>,
) {
    for &f in &dir.files {
        file_paths.push((f, base.join(&archive.files[f].name)));
    }
    for &d in &dir.subdirs {
        let sub = &archive.directories[d];
        let sub_path = base.join(&sub.name);
        dir_paths.push(sub_path.clone());
        collect_paths(archive, sub, &sub_path, dir_paths, file_paths);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn build_source_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let base = temp.path();

        fs::create_dir_all(base.join("sub/inner")).unwrap();
        fs::write(base.join("top.txt"), b"top level file").unwrap();
        fs::write(base.join("sub/nested.bin"), vec![9u8; 64]).unwrap();
        fs::write(base.join("sub/inner/deep.dat"), b"deep payload").unwrap();

        temp
    }

    #[test]
    fn test_from_directory_builds_tree() {
        let temp = build_source_tree();
        let opts = ArchiveOptions::default();
        let archive = Archive::from_directory("imported", temp.path(), &opts).unwrap();

        // Root + sub + inner.
        assert_eq!(archive.dir_count(), 3);
        assert_eq!(archive.file_count(), 3);
        assert_eq!(archive.root_index(), Some(0));
        assert!(archive.is_data_loaded());

        let names: Vec<&str> = archive.directories.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec![".", "sub", "inner"]);

        let root = archive.root();
        assert_eq!(root.files.len(), 1);
        assert_eq!(archive.files[root.files[0]].name, "top.txt");

        for file in &archive.files {
            assert!(file.header.timestamp > 0);
            assert!(!file.is_compressed());
        }
    }

    #[test]
    fn test_from_directory_without_root_entry() {
        let temp = build_source_tree();
        let opts = ArchiveOptions::default().with_write_root(false);
        let archive = Archive::from_directory("rootless", temp.path(), &opts).unwrap();

        assert_eq!(archive.dir_count(), 2);
        assert_eq!(archive.root_index(), None);
        // The root-level file leads the flat array, unaccounted by any
        // directory slice.
        assert_eq!(archive.files[0].name, "top.txt");
        assert_eq!(archive.root().files, vec![0]);
    }

    #[test]
    fn test_from_directory_missing_path() {
        let opts = ArchiveOptions::default();
        let err = Archive::from_directory("nope", "/does/not/exist", &opts).unwrap_err();
        assert!(matches!(err, ParError::NotFound(_)));
    }

    #[test]
    fn test_extract_roundtrip() {
        let source = build_source_tree();
        let opts = ArchiveOptions::default();
        let mut archive = Archive::from_directory("extracted", source.path(), &opts).unwrap();

        let target = TempDir::new().unwrap();
        archive.extract_to(target.path(), &opts).unwrap();

        let top = fs::read(target.path().join("top.txt")).unwrap();
        assert_eq!(top, b"top level file");
        let deep = fs::read(target.path().join("sub/inner/deep.dat")).unwrap();
        assert_eq!(deep, b"deep payload");
    }

    #[test]
    fn test_extract_decodes_compressed_entries() {
        let source = build_source_tree();
        let opts = ArchiveOptions::default();
        let mut archive = Archive::from_directory("encoded", source.path(), &opts).unwrap();
        archive
            .encode_all(crate::EntryEncoding::SllzV1, &opts)
            .unwrap();

        let target = TempDir::new().unwrap();
        archive.extract_to(target.path(), &opts).unwrap();

        let nested = fs::read(target.path().join("sub/nested.bin")).unwrap();
        assert_eq!(nested, vec![9u8; 64]);
    }
}
