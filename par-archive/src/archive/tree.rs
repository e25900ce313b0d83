//! Flat/tree conversion
//!
//! The archive's flat arrays are the owning representation. Wiring builds
//! index views over them (and synthesizes a root when none was stored);
//! flattening turns an imported directory tree into the flat pre-order
//! layout where every node's children form a contiguous run.

use tracing::{debug, trace};

use crate::archive::{Archive, Root};
use crate::directory::ParDirectory;
use crate::file::ParFile;

/// An in-memory directory tree node used while importing from disk.
#[derive(Debug, Default)]
pub(crate) struct TreeNode {
    pub name: String,
    pub attributes: u32,
    pub files: Vec<ParFile>,
    pub children: Vec<TreeNode>,
}

/// Resolve every directory's child slices into index views and settle the
/// root.
///
/// Files left unaccounted by every directory slice are attached to the
/// root in index order.
pub(crate) fn wire_tree(archive: &mut Archive) {
    let dir_count = archive.directories.len();
    let file_count = archive.files.len();

    for d in 0..dir_count {
        let header = archive.directories[d].header;

        let subdirs: Vec<usize> = if (header.first_dir_index as usize) < dir_count {
            let start = header.first_dir_index as usize;
            let end = (start + header.dir_count as usize).min(dir_count);
            (start..end).collect()
        } else {
            // Leaf sentinel: first index past the flat array.
            Vec::new()
        };

        let files: Vec<usize> = if (header.first_file_index as usize) < file_count {
            let start = header.first_file_index as usize;
            let end = (start + header.file_count as usize).min(file_count);
            (start..end).collect()
        } else {
            Vec::new()
        };

        for &f in &files {
            archive.files[f].parent = Some(d);
        }
        archive.directories[d].subdirs = subdirs;
        archive.directories[d].files = files;
    }

    archive.root = match archive.directories.iter().position(|d| d.is_root()) {
        Some(index) => Root::Stored(index),
        None => {
            // Gather the top-level runs.
            let mut root = ParDirectory::new(".");
            let mut i = 0;
            while i < dir_count {
                root.subdirs.push(i);
                i += archive.directories[i].header.dir_count as usize + 1;
            }
            root.header.dir_count = root.subdirs.len() as u32;
            root.header.first_dir_index = if root.subdirs.is_empty() {
                dir_count as u32
            } else {
                0
            };
            trace!("synthesized root over {} top-level directories", root.subdirs.len());
            Root::Synthesized(root)
        }
    };

    let unaccounted: Vec<usize> = archive
        .files
        .iter()
        .enumerate()
        .filter(|(_, file)| file.parent.is_none())
        .map(|(i, _)| i)
        .collect();
    if !unaccounted.is_empty() {
        debug!("attaching {} unaccounted files to the root", unaccounted.len());
        match &mut archive.root {
            Root::Stored(index) => {
                let index = *index;
                for &f in &unaccounted {
                    archive.files[f].parent = Some(index);
                }
                archive.directories[index].files.extend(unaccounted);
            }
            Root::Synthesized(root) => {
                root.header.file_count += unaccounted.len() as u32;
                root.files.extend(unaccounted);
            }
        }
    }

    archive.file_tree_initialized = true;
}

/// Flatten an imported tree into the archive's flat arrays.
///
/// Directories land in pre-order runs: each node's children are appended
/// contiguously, then each child's subtree follows. File slices are
/// assigned in the same flat order, so leaf directories still receive a
/// valid first-file index.
pub(crate) fn flatten_into(archive: &mut Archive, mut root_node: TreeNode, write_root: bool) {
    let mut pending_files: Vec<Vec<ParFile>> = Vec::new();
    let mut root_files = std::mem::take(&mut root_node.files);
    let root_children = std::mem::take(&mut root_node.children);

    let top_run: Vec<usize>;
    if write_root {
        let mut root_dir = ParDirectory::new(".");
        if root_node.attributes != 0 {
            root_dir.header.attributes = root_node.attributes;
        }
        archive.directories.push(root_dir);
        pending_files.push(std::mem::take(&mut root_files));

        place_children(archive, &mut pending_files, root_children, Some(0));
        top_run = vec![0];
    } else {
        top_run = place_children(archive, &mut pending_files, root_children, None);
    }

    let dir_total = archive.directories.len() as u32;

    // Leaf directories point one past the end of the flat array.
    for dir in &mut archive.directories {
        if dir.subdirs.is_empty() {
            dir.header.first_dir_index = dir_total;
        }
    }

    // Without a stored root, the root's files lead the flat file array so
    // no directory slice accounts for them.
    let mut synthesized_root_files = Vec::new();
    if !write_root {
        for file in root_files {
            synthesized_root_files.push(archive.files.len());
            archive.files.push(file);
        }
    }

    // File runs follow the flat directory order.
    for d in 0..archive.directories.len() {
        let own_files = std::mem::take(&mut pending_files[d]);
        let first = archive.files.len() as u32;
        let count = own_files.len() as u32;

        let mut indices = Vec::with_capacity(own_files.len());
        for mut file in own_files {
            file.parent = Some(d);
            indices.push(archive.files.len());
            archive.files.push(file);
        }

        let dir = &mut archive.directories[d];
        dir.header.first_file_index = first;
        dir.header.file_count = count;
        dir.files = indices;
    }

    archive.root = if write_root {
        Root::Stored(0)
    } else {
        let mut root = ParDirectory::new(".");
        root.header.dir_count = top_run.len() as u32;
        root.header.first_dir_index = if top_run.is_empty() { dir_total } else { 0 };
        root.header.file_count = synthesized_root_files.len() as u32;
        root.subdirs = top_run;
        root.files = synthesized_root_files;
        Root::Synthesized(root)
    };

    archive.archive_initialized = true;
    archive.file_tree_initialized = true;
    archive.data_loaded = true;
}

/// Append `children` as a contiguous run, then each child's subtree.
/// Returns the run's flat indices.
fn place_children(
    archive: &mut Archive,
    pending_files: &mut Vec<Vec<ParFile>>,
    children: Vec<TreeNode>,
    parent: Option<usize>,
) -> Vec<usize> {
    let run_start = archive.directories.len();
    let run_len = children.len();

    let mut grandchildren = Vec::with_capacity(run_len);
    let mut run = Vec::with_capacity(run_len);
    for mut child in children {
        let index = archive.directories.len();
        let mut dir = ParDirectory::new(std::mem::take(&mut child.name));
        if child.attributes != 0 {
            dir.header.attributes = child.attributes;
        }
        archive.directories.push(dir);
        pending_files.push(std::mem::take(&mut child.files));
        run.push(index);
        grandchildren.push((index, std::mem::take(&mut child.children)));
    }

    if let Some(parent) = parent {
        archive.directories[parent].header.dir_count = run_len as u32;
        archive.directories[parent].header.first_dir_index = run_start as u32;
        archive.directories[parent].subdirs = run.clone();
    }

    for (index, nodes) in grandchildren {
        place_children(archive, pending_files, nodes, Some(index));
    }

    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DirectoryHeader;
    use sllz::Endianness;

    fn leaf(name: &str, file_names: &[&str]) -> TreeNode {
        TreeNode {
            name: name.into(),
            attributes: 0,
            files: file_names
                .iter()
                .map(|n| {
                    let mut f = ParFile::new(*n);
                    f.set_data(vec![0u8; 4], false);
                    f
                })
                .collect(),
            children: Vec::new(),
        }
    }

    #[test]
    fn test_flatten_pre_order_runs() {
        // root -> (a -> (c), b -> (d))
        let tree = TreeNode {
            name: ".".into(),
            attributes: 0,
            files: vec![],
            children: vec![
                TreeNode {
                    name: "a".into(),
                    attributes: 0,
                    files: vec![],
                    children: vec![leaf("c", &["c.bin"])],
                },
                TreeNode {
                    name: "b".into(),
                    attributes: 0,
                    files: vec![],
                    children: vec![leaf("d", &[])],
                },
            ],
        };

        let mut archive = Archive::new("flat", Endianness::Little);
        flatten_into(&mut archive, tree, true);

        let names: Vec<&str> = archive.directories.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec![".", "a", "b", "c", "d"]);

        // Sibling runs are contiguous, children come after their run.
        let root = &archive.directories[0].header;
        assert_eq!((root.dir_count, root.first_dir_index), (2, 1));
        let a = &archive.directories[1].header;
        assert_eq!((a.dir_count, a.first_dir_index), (1, 3));
        let b = &archive.directories[2].header;
        assert_eq!((b.dir_count, b.first_dir_index), (1, 4));

        // Leaves carry the sentinel.
        assert_eq!(archive.directories[3].header.first_dir_index, 5);
        assert_eq!(archive.directories[4].header.first_dir_index, 5);

        // The only file belongs to "c".
        assert_eq!(archive.files.len(), 1);
        assert_eq!(archive.files[0].parent, Some(3));
        let c = &archive.directories[3].header;
        assert_eq!((c.file_count, c.first_file_index), (1, 0));

        // Every directory has a valid first-file index.
        for dir in &archive.directories {
            assert!(dir.header.first_file_index <= archive.files.len() as u32);
        }
    }

    #[test]
    fn test_wire_tree_round_trips_flatten() {
        let tree = TreeNode {
            name: ".".into(),
            attributes: 0,
            files: vec![],
            children: vec![
                TreeNode {
                    name: "x".into(),
                    attributes: 0,
                    files: vec![],
                    children: vec![leaf("y", &["y1.bin", "y2.bin"])],
                },
                leaf("z", &["z1.bin"]),
            ],
        };

        let mut archive = Archive::new("wire", Endianness::Little);
        flatten_into(&mut archive, tree, true);

        let expected_subdirs: Vec<Vec<usize>> =
            archive.directories.iter().map(|d| d.subdirs.clone()).collect();
        let expected_files: Vec<Vec<usize>> =
            archive.directories.iter().map(|d| d.files.clone()).collect();

        // Re-wire from headers alone.
        for dir in &mut archive.directories {
            dir.subdirs.clear();
            dir.files.clear();
        }
        for file in &mut archive.files {
            file.parent = None;
        }
        wire_tree(&mut archive);

        let rewired_subdirs: Vec<Vec<usize>> =
            archive.directories.iter().map(|d| d.subdirs.clone()).collect();
        let rewired_files: Vec<Vec<usize>> =
            archive.directories.iter().map(|d| d.files.clone()).collect();

        assert_eq!(expected_subdirs, rewired_subdirs);
        assert_eq!(expected_files, rewired_files);
        assert_eq!(archive.root_index(), Some(0));
    }

    #[test]
    fn test_wire_tree_synthesizes_root() {
        let mut archive = Archive::new("rootless", Endianness::Little);
        let mut top = ParDirectory::new("top");
        top.header = DirectoryHeader {
            dir_count: 0,
            first_dir_index: 1,
            file_count: 0,
            first_file_index: 0,
            ..DirectoryHeader::default()
        };
        archive.directories.push(top);

        let mut stray = ParFile::new("stray.bin");
        stray.set_data(vec![1, 2, 3], false);
        archive.files.push(stray);

        wire_tree(&mut archive);

        assert_eq!(archive.root_index(), None);
        let root = archive.root();
        assert_eq!(root.subdirs, vec![0]);
        // The file is covered by no directory slice and lands on the root.
        assert_eq!(root.files, vec![0]);
    }
}
