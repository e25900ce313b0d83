//! Integration tests for the manifest sidecar

use par_archive::manifest::{apply_manifest, parse_manifest, write_manifest};
use par_archive::{Archive, ArchiveOptions, EntryEncoding};
use std::fs;
use tempfile::TempDir;

fn one_file_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("stage.dat"),
        b"stage payload stage payload stage payload".repeat(8),
    )
    .unwrap();
    temp
}

#[test]
fn test_manifest_roundtrip_restores_metadata() {
    let opts = ArchiveOptions::default();
    let source = one_file_tree();

    let mut original = Archive::from_directory("stage", source.path(), &opts).unwrap();
    original.files[0].header.attributes = 0x42;
    original.files[0].header.timestamp = 1_600_000_000;
    original.directories[0].header.attributes = 0x13;
    original.unknown_a = 9;

    let text = write_manifest(&original);

    // Rebuild the archive fresh from disk; all tuned metadata is gone.
    let mut rebuilt = Archive::from_directory("other-name", source.path(), &opts).unwrap();
    assert_ne!(rebuilt.files[0].header.attributes, 0x42);

    apply_manifest(&mut rebuilt, &text, &opts).unwrap();

    assert!(rebuilt.similar_to(&original));
    assert_eq!(rebuilt.name, "stage");
    assert_eq!(rebuilt.unknown_a, 9);
    assert_eq!(rebuilt.directories[0].header.attributes, 0x13);
    assert_eq!(rebuilt.files[0].header.attributes, 0x42);
    assert_eq!(rebuilt.files[0].header.timestamp, 1_600_000_000);
}

#[test]
fn test_manifest_prescribes_encoding() {
    let opts = ArchiveOptions::default();
    let source = one_file_tree();

    let mut original = Archive::from_directory("packed", source.path(), &opts).unwrap();
    original.encode_all(EntryEncoding::SllzV1, &opts).unwrap();
    assert!(original.files[0].is_compressed());

    let text = write_manifest(&original);
    let doc = parse_manifest(&text).unwrap();
    let entry = &doc.dirs[0].files[0];
    assert!(entry.compressed);
    assert_eq!(entry.version, Some(sllz::SllzVersion::V1));

    // Applying onto a plaintext rebuild re-encodes the matched file.
    let mut rebuilt = Archive::from_directory("packed", source.path(), &opts).unwrap();
    assert!(!rebuilt.files[0].is_compressed());
    apply_manifest(&mut rebuilt, &text, &opts).unwrap();
    assert!(rebuilt.files[0].is_compressed());
    assert!(sllz::is_sllz(rebuilt.files[0].data().unwrap()));
}

#[test]
fn test_manifest_rejects_structure_drift() {
    let opts = ArchiveOptions::default();
    let source = one_file_tree();
    let original = Archive::from_directory("drift", source.path(), &opts).unwrap();
    let text = write_manifest(&original);

    // A tree with a renamed file no longer matches.
    let other_source = TempDir::new().unwrap();
    fs::write(other_source.path().join("renamed.dat"), b"other").unwrap();
    let mut other = Archive::from_directory("drift", other_source.path(), &opts).unwrap();
    let err = apply_manifest(&mut other, &text, &opts).unwrap_err();
    assert!(matches!(err, par_archive::ParError::StructureMismatch(_)));
}

#[test]
fn test_manifest_rejects_count_drift() {
    let opts = ArchiveOptions::default();
    let source = one_file_tree();
    let original = Archive::from_directory("counts", source.path(), &opts).unwrap();
    let text = write_manifest(&original);

    // Two files on disk, one declared in the manifest.
    let other_source = TempDir::new().unwrap();
    fs::write(other_source.path().join("stage.dat"), b"one").unwrap();
    fs::write(other_source.path().join("extra.dat"), b"two").unwrap();
    let mut other = Archive::from_directory("counts", other_source.path(), &opts).unwrap();
    let err = apply_manifest(&mut other, &text, &opts).unwrap_err();
    assert!(matches!(err, par_archive::ParError::CountMismatch { .. }));
}

#[test]
fn test_generated_sidecar_on_save() {
    let opts = ArchiveOptions::default().with_generate_manifest(true);
    let source = one_file_tree();
    let target = TempDir::new().unwrap();

    let mut archive = Archive::from_directory("sidecar", source.path(), &opts).unwrap();
    archive.save(target.path(), &opts).unwrap();

    let sidecar = target.path().join("sidecar.par.manifest");
    let text = fs::read_to_string(sidecar).unwrap();
    let doc = parse_manifest(&text).unwrap();
    assert_eq!(doc.name, "sidecar");
    assert_eq!(doc.file_count, 1);
}
