//! The archive owner type
//!
//! An [`Archive`] owns the flat directory and file arrays; the directory
//! tree is a set of index views over them. Parsing, emission and the
//! flat/tree conversions live in the submodules.

mod parser;
pub(crate) mod tree;
mod writer;

pub(crate) use tree::TreeNode;

use rayon::prelude::*;
use tracing::debug;

use sllz::Endianness;

use crate::config::ArchiveOptions;
use crate::directory::ParDirectory;
use crate::file::ParFile;
use crate::{EntryEncoding, ParError, Result};

/// Where the root directory lives.
#[derive(Debug, Clone)]
pub(crate) enum Root {
    /// The archive stored a root entry at this flat index.
    Stored(usize),
    /// No root entry was stored; this node aggregates the top level.
    Synthesized(ParDirectory),
}

/// A PARC archive, fully materialized in memory.
#[derive(Debug, Clone)]
pub struct Archive {
    /// Archive name. Not persisted in the binary; used for file and
    /// manifest naming.
    pub name: String,
    /// Opaque platform tag.
    pub platform: u8,
    /// Byte order of every multi-byte field.
    pub endianness: Endianness,
    /// Opaque passthrough flag from the header.
    pub size_extended: bool,
    /// Opaque passthrough flag from the header.
    pub relocated: bool,
    /// Raw file-size mode from the header (1 = size written, 2 = not).
    pub file_size_mode: u16,
    /// Opaque passthrough field from the header.
    pub unknown_a: u16,
    /// Flat pre-order directory array.
    pub directories: Vec<ParDirectory>,
    /// Flat pre-order file array.
    pub files: Vec<ParFile>,
    pub(crate) root: Root,
    pub(crate) archive_initialized: bool,
    pub(crate) file_tree_initialized: bool,
    pub(crate) data_loaded: bool,
}

impl Archive {
    /// Create an empty archive, ready to populate and emit.
    pub fn new(name: impl Into<String>, endianness: Endianness) -> Self {
        Self {
            name: name.into(),
            platform: 2,
            endianness,
            size_extended: false,
            relocated: false,
            file_size_mode: 1,
            unknown_a: 1,
            directories: Vec::new(),
            files: Vec::new(),
            root: Root::Synthesized(ParDirectory::new(".")),
            archive_initialized: true,
            file_tree_initialized: true,
            data_loaded: true,
        }
    }

    pub fn dir_count(&self) -> u32 {
        self.directories.len() as u32
    }

    pub fn file_count(&self) -> u32 {
        self.files.len() as u32
    }

    /// The root directory: a stored entry when the archive included one,
    /// otherwise a synthesized node over the top-level runs.
    pub fn root(&self) -> &ParDirectory {
        match &self.root {
            Root::Stored(index) => &self.directories[*index],
            Root::Synthesized(dir) => dir,
        }
    }

    /// Flat index of the stored root entry, if there is one.
    pub fn root_index(&self) -> Option<usize> {
        match &self.root {
            Root::Stored(index) => Some(*index),
            Root::Synthesized(_) => None,
        }
    }

    /// Whether every entry has its payload in memory.
    pub fn is_data_loaded(&self) -> bool {
        self.data_loaded
    }

    /// Load every entry payload from the archive bytes the entries were
    /// parsed from.
    pub fn load_all_data(&mut self, data: &[u8]) -> Result<()> {
        let mut reader = crate::ioutils::DataReader::new(std::io::Cursor::new(data), self.endianness);
        for file in &mut self.files {
            file.load_data(&mut reader, Some(file.header.data_offset))?;
        }
        self.data_loaded = true;
        Ok(())
    }

    /// Decode every compressed entry, one worker per file.
    pub fn decode_all(&mut self, opts: &ArchiveOptions) -> Result<()> {
        debug!("decoding {} entries", self.files.len());
        self.files
            .par_iter_mut()
            .filter(|file| file.is_compressed())
            .try_for_each(|file| file.decode(opts))
    }

    /// Encode every plaintext entry with `encoding`, one worker per file.
    pub fn encode_all(&mut self, encoding: EntryEncoding, opts: &ArchiveOptions) -> Result<()> {
        debug!("encoding {} entries", self.files.len());
        let endianness = self.endianness;
        self.files
            .par_iter_mut()
            .filter(|file| !file.is_compressed())
            .try_for_each(|file| file.encode(encoding, endianness, false, opts).map(|_| ()))
    }

    /// Whether `other` has the same shape: endianness, extension flags,
    /// counts, and an identical directory structure with matching file
    /// names.
    pub fn similar_to(&self, other: &Archive) -> bool {
        self.endianness == other.endianness
            && self.size_extended == other.size_extended
            && self.relocated == other.relocated
            && self.directories.len() == other.directories.len()
            && self.files.len() == other.files.len()
            && self.pair_with(other).is_some()
    }

    /// Copy metadata (and, where prescribed, encoding state) from a
    /// structurally identical archive without changing structure.
    pub fn flash_from(&mut self, other: &Archive, opts: &ArchiveOptions) -> Result<()> {
        if !self.similar_to(other) {
            return Err(ParError::StructureMismatch(format!(
                "cannot flash {:?} from {:?}",
                self.name, other.name
            )));
        }
        let Some((dir_pairs, file_pairs)) = self.pair_with(other) else {
            return Err(ParError::StructureMismatch(format!(
                "cannot flash {:?} from {:?}",
                self.name, other.name
            )));
        };

        self.platform = other.platform;
        self.unknown_a = other.unknown_a;

        for (own, theirs) in dir_pairs {
            let attributes = other.directories[theirs].header.attributes;
            self.directories[own].header.attributes = attributes;
        }

        let endianness = self.endianness;
        for (own, theirs) in file_pairs {
            let source = &other.files[theirs];
            let target = &mut self.files[own];
            target.header.attributes = source.header.attributes;
            target.header.timestamp = source.header.timestamp;

            // Re-encode or decode only when the prescribed state differs.
            let want_compressed = if source.is_loaded() {
                source.is_compressed()
            } else {
                source.header.compressed
            };
            if want_compressed && !target.is_compressed() {
                let encoding = source
                    .data()
                    .filter(|_| source.is_compressed())
                    .and_then(|data| {
                        sllz::SllzHeader::parse(&mut std::io::Cursor::new(data)).ok()
                    })
                    .map(|header| EntryEncoding::from_version(header.version))
                    .unwrap_or(EntryEncoding::SllzV1);
                target.encode(encoding, endianness, true, opts)?;
            } else if !want_compressed && target.is_compressed() {
                target.decode(opts)?;
            }
        }

        Ok(())
    }

    /// Pair this archive's tree with `other`'s, node by node.
    ///
    /// Returns flat-index pairs for directories and files, or `None` when
    /// the structures differ (names included).
    pub(crate) fn pair_with(&self, other: &Archive) -> Option<(Vec<(usize, usize)>, Vec<(usize, usize)>)> {
        let mut dir_pairs = Vec::new();
        let mut file_pairs = Vec::new();

        let own_root = self.root();
        let other_root = other.root();
        if let (Some(a), Some(b)) = (self.root_index(), other.root_index()) {
            dir_pairs.push((a, b));
        } else if self.root_index().is_some() != other.root_index().is_some() {
            return None;
        }

        self.pair_dirs(other, own_root, other_root, &mut dir_pairs, &mut file_pairs)?;
        Some((dir_pairs, file_pairs))
    }

    fn pair_dirs(
        &self,
        other: &Archive,
        own: &ParDirectory,
        theirs: &ParDirectory,
        dir_pairs: &mut Vec<(usize, usize)>,
        file_pairs: &mut Vec<(usize, usize)>,
    ) -> Option<()> {
        if own.subdirs.len() != theirs.subdirs.len() || own.files.len() != theirs.files.len() {
            return None;
        }

        for (&a, &b) in own.files.iter().zip(&theirs.files) {
            if self.files[a].name != other.files[b].name {
                return None;
            }
            file_pairs.push((a, b));
        }

        for (&a, &b) in own.subdirs.iter().zip(&theirs.subdirs) {
            if self.directories[a].name != other.directories[b].name {
                return None;
            }
            dir_pairs.push((a, b));
            self.pair_dirs(
                other,
                &self.directories[a],
                &other.directories[b],
                dir_pairs,
                file_pairs,
            )?;
        }

        Some(())
    }
}
