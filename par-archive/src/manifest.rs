//! Plaintext manifest sidecar
//!
//! The manifest captures archive, directory and file metadata so a tree
//! extracted to disk can be rebuilt into an identical archive. It is
//! line-oriented: TAB-separated `Key\tValue` pairs inside XML-style
//! `<dir>`/`<file>` blocks nested to mirror the directory tree. The first
//! line is always `PXD ARCHIVE MANIFEST`.

use std::fmt::Write as _;
use std::io::Cursor;
use std::iter::Peekable;
use std::str::Lines;
use tracing::debug;

use sllz::{Endianness, SllzHeader, SllzVersion};

use crate::archive::Archive;
use crate::config::ArchiveOptions;
use crate::directory::ParDirectory;
use crate::file::ParFile;
use crate::{EntryEncoding, ParError, Result};

/// Mandatory first line of every manifest.
pub const MANIFEST_HEADER: &str = "PXD ARCHIVE MANIFEST";

/// Sidecar file name for an archive: `<name>.par.manifest`.
pub fn manifest_file_name(archive: &Archive) -> String {
    format!("{}.par.manifest", archive.name)
}

/// Parsed file block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
    pub name: String,
    pub compressed: bool,
    pub endianness: Option<Endianness>,
    pub version: Option<SllzVersion>,
    pub attributes: Option<u32>,
    pub timestamp: u64,
}

/// Parsed directory block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDir {
    pub name: String,
    pub dir_count: u32,
    pub first_dir_index: u32,
    pub file_count: u32,
    pub first_file_index: u32,
    pub attributes: Option<u32>,
    pub dirs: Vec<ManifestDir>,
    pub files: Vec<ManifestFile>,
}

/// Parsed manifest document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDoc {
    pub name: String,
    pub platform: u8,
    pub endianness: Endianness,
    pub size_extended: bool,
    pub relocated: bool,
    pub file_size_mode: u16,
    pub unknown_a: u16,
    pub dir_count: u32,
    pub file_count: u32,
    pub dirs: Vec<ManifestDir>,
    pub files: Vec<ManifestFile>,
}

/// Serialize an archive's metadata to manifest text.
pub fn write_manifest(archive: &Archive) -> String {
    let mut out = String::new();
    out.push_str(MANIFEST_HEADER);
    out.push('\n');

    kv(&mut out, "Name", &archive.name);
    kv(&mut out, "Plat", archive.platform);
    kv(&mut out, "Endi", endianness_tag(archive.endianness));
    kv(&mut out, "SExt", yes_no(archive.size_extended));
    kv(&mut out, "Relo", yes_no(archive.relocated));
    kv(&mut out, "FSM", archive.file_size_mode);
    kv(&mut out, "UnkA", archive.unknown_a);
    kv(&mut out, "DC", archive.dir_count());
    kv(&mut out, "FC", archive.file_count());

    if let Some(index) = archive.root_index() {
        write_dir(archive, &archive.directories[index], &mut out);
    } else {
        let root = archive.root();
        for &d in &root.subdirs {
            write_dir(archive, &archive.directories[d], &mut out);
        }
        for &f in &root.files {
            write_file(archive, &archive.files[f], &mut out);
        }
    }

    out
}

fn write_dir(archive: &Archive, dir: &ParDirectory, out: &mut String) {
    out.push_str("<dir>\n");
    kv(out, "Name", &dir.name);
    kv(out, "DC", dir.subdirs.len());
    kv(out, "FDI", dir.header.first_dir_index);
    kv(out, "FC", dir.files.len());
    kv(out, "FFI", dir.header.first_file_index);
    kv(out, "Attr", format_args!("{:X}", dir.header.attributes));

    for &d in &dir.subdirs {
        write_dir(archive, &archive.directories[d], out);
    }
    for &f in &dir.files {
        write_file(archive, &archive.files[f], out);
    }
    out.push_str("</dir>\n");
}

fn write_file(archive: &Archive, file: &ParFile, out: &mut String) {
    let compressed = if file.is_loaded() {
        file.is_compressed()
    } else {
        file.header.compressed
    };

    out.push_str("<file>\n");
    kv(out, "Name", &file.name);
    kv(out, "Comp", yes_no(compressed));
    if compressed {
        // Read the codec parameters off the payload when it is present.
        let header = file
            .data()
            .and_then(|data| SllzHeader::parse(&mut Cursor::new(data)).ok());
        let endianness = header
            .map(|h| h.endianness)
            .unwrap_or(archive.endianness);
        let version = header.map(|h| h.version).unwrap_or(SllzVersion::V1);
        kv(out, "Endi", endianness_tag(endianness));
        kv(out, "SLLZ", version.as_byte());
    }
    kv(out, "Attr", format_args!("{:X}", file.header.attributes));
    kv(out, "Time", file.header.timestamp);
    out.push_str("</file>\n");
}

fn kv(out: &mut String, key: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "{key}\t{value}");
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Y"
    } else {
        "N"
    }
}

fn endianness_tag(endianness: Endianness) -> &'static str {
    match endianness {
        Endianness::Little => "L",
        Endianness::Big => "B",
    }
}

/// Parse manifest text into a document, validating tag balance and the
/// per-scope child counts.
pub fn parse_manifest(text: &str) -> Result<ManifestDoc> {
    let mut lines = text.lines().peekable();

    match lines.next() {
        Some(line) if line.trim_end() == MANIFEST_HEADER => {}
        other => {
            return Err(ParError::MalformedManifest(format!(
                "expected {MANIFEST_HEADER:?} first, got {other:?}"
            )));
        }
    }

    let mut name = None;
    let mut platform = None;
    let mut endianness = None;
    let mut size_extended = None;
    let mut relocated = None;
    let mut file_size_mode = None;
    let mut unknown_a = None;
    let mut dir_count = None;
    let mut file_count = None;

    while let Some(line) = peek_content(&mut lines) {
        if line.starts_with('<') {
            break;
        }
        let (key, value) = split_kv(line)?;
        match key {
            "Name" => name = Some(value.to_string()),
            "Plat" => platform = Some(parse_num::<u8>(key, value)?),
            "Endi" => endianness = Some(parse_endianness(value)?),
            "SExt" => size_extended = Some(parse_yes_no(key, value)?),
            "Relo" => relocated = Some(parse_yes_no(key, value)?),
            "FSM" => file_size_mode = Some(parse_num::<u16>(key, value)?),
            "UnkA" => unknown_a = Some(parse_num::<u16>(key, value)?),
            "DC" => dir_count = Some(parse_num::<u32>(key, value)?),
            "FC" => file_count = Some(parse_num::<u32>(key, value)?),
            other => {
                return Err(ParError::MalformedManifest(format!(
                    "unknown archive key {other:?}"
                )));
            }
        }
        lines.next();
    }

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    while let Some(line) = peek_content(&mut lines) {
        match line {
            "<dir>" => {
                lines.next();
                dirs.push(parse_dir(&mut lines)?);
            }
            "<file>" => {
                lines.next();
                files.push(parse_file(&mut lines)?);
            }
            other => {
                return Err(ParError::MalformedManifest(format!(
                    "unexpected line {other:?}"
                )));
            }
        }
    }

    let doc = ManifestDoc {
        name: required(name, "Name")?,
        platform: required(platform, "Plat")?,
        endianness: required(endianness, "Endi")?,
        size_extended: required(size_extended, "SExt")?,
        relocated: required(relocated, "Relo")?,
        file_size_mode: required(file_size_mode, "FSM")?,
        unknown_a: required(unknown_a, "UnkA")?,
        dir_count: required(dir_count, "DC")?,
        file_count: required(file_count, "FC")?,
        dirs,
        files,
    };

    let total_dirs = doc.dirs.iter().map(count_dirs).sum::<u32>();
    if total_dirs != doc.dir_count {
        return Err(ParError::CountMismatch {
            scope: "archive directories",
            declared: doc.dir_count,
            actual: total_dirs,
        });
    }
    let total_files =
        doc.files.len() as u32 + doc.dirs.iter().map(count_files).sum::<u32>();
    if total_files != doc.file_count {
        return Err(ParError::CountMismatch {
            scope: "archive files",
            declared: doc.file_count,
            actual: total_files,
        });
    }

    Ok(doc)
}

fn parse_dir(lines: &mut Peekable<Lines>) -> Result<ManifestDir> {
    let mut dir = ManifestDir::default();
    let mut named = false;

    while let Some(line) = peek_content(lines) {
        if line.starts_with('<') {
            break;
        }
        let (key, value) = split_kv(line)?;
        match key {
            "Name" => {
                dir.name = value.to_string();
                named = true;
            }
            "DC" => dir.dir_count = parse_num(key, value)?,
            "FDI" => dir.first_dir_index = parse_num(key, value)?,
            "FC" => dir.file_count = parse_num(key, value)?,
            "FFI" => dir.first_file_index = parse_num(key, value)?,
            "Attr" => dir.attributes = Some(parse_hex(value)?),
            other => {
                return Err(ParError::MalformedManifest(format!(
                    "unknown directory key {other:?}"
                )));
            }
        }
        lines.next();
    }
    if !named {
        return Err(ParError::MalformedManifest("<dir> without Name".into()));
    }

    loop {
        match peek_content(lines) {
            Some("</dir>") => {
                lines.next();
                break;
            }
            Some("<dir>") => {
                lines.next();
                dir.dirs.push(parse_dir(lines)?);
            }
            Some("<file>") => {
                lines.next();
                dir.files.push(parse_file(lines)?);
            }
            Some(other) => {
                return Err(ParError::MalformedManifest(format!(
                    "unexpected line {other:?} inside <dir>"
                )));
            }
            None => {
                return Err(ParError::MalformedManifest("unterminated <dir>".into()));
            }
        }
    }

    if dir.dir_count != dir.dirs.len() as u32 {
        return Err(ParError::CountMismatch {
            scope: "directory subdirectories",
            declared: dir.dir_count,
            actual: dir.dirs.len() as u32,
        });
    }
    if dir.file_count != dir.files.len() as u32 {
        return Err(ParError::CountMismatch {
            scope: "directory files",
            declared: dir.file_count,
            actual: dir.files.len() as u32,
        });
    }

    Ok(dir)
}

fn parse_file(lines: &mut Peekable<Lines>) -> Result<ManifestFile> {
    let mut name = None;
    let mut compressed = None;
    let mut endianness = None;
    let mut version = None;
    let mut attributes = None;
    let mut timestamp = None;

    loop {
        match peek_content(lines) {
            Some("</file>") => {
                lines.next();
                break;
            }
            Some(line) if line.starts_with('<') => {
                return Err(ParError::MalformedManifest(format!(
                    "unexpected tag {line:?} inside <file>"
                )));
            }
            Some(line) => {
                let (key, value) = split_kv(line)?;
                match key {
                    "Name" => name = Some(value.to_string()),
                    "Comp" => compressed = Some(parse_yes_no(key, value)?),
                    "Endi" => endianness = Some(parse_endianness(value)?),
                    "SLLZ" => {
                        version = Some(SllzVersion::from_byte(parse_num::<u8>(key, value)?)
                            .ok_or_else(|| {
                                ParError::MalformedManifest(format!(
                                    "unknown SLLZ version {value:?}"
                                ))
                            })?);
                    }
                    "Attr" => attributes = Some(parse_hex(value)?),
                    "Time" => timestamp = Some(parse_num::<u64>(key, value)?),
                    other => {
                        return Err(ParError::MalformedManifest(format!(
                            "unknown file key {other:?}"
                        )));
                    }
                }
                lines.next();
            }
            None => {
                return Err(ParError::MalformedManifest("unterminated <file>".into()));
            }
        }
    }

    let compressed = required(compressed, "Comp")?;
    if compressed && (endianness.is_none() || version.is_none()) {
        return Err(ParError::MalformedManifest(
            "compressed file without Endi/SLLZ".into(),
        ));
    }

    Ok(ManifestFile {
        name: required(name, "Name")?,
        compressed,
        endianness,
        version,
        attributes,
        timestamp: required(timestamp, "Time")?,
    })
}

fn count_dirs(dir: &ManifestDir) -> u32 {
    1 + dir.dirs.iter().map(count_dirs).sum::<u32>()
}

fn count_files(dir: &ManifestDir) -> u32 {
    dir.files.len() as u32 + dir.dirs.iter().map(count_files).sum::<u32>()
}

/// Peek the next non-empty line, trimmed.
fn peek_content<'a>(lines: &mut Peekable<Lines<'a>>) -> Option<&'a str> {
    while let Some(&line) = lines.peek() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            lines.next();
            continue;
        }
        return Some(trimmed);
    }
    None
}

fn split_kv(line: &str) -> Result<(&str, &str)> {
    line.split_once('\t')
        .ok_or_else(|| ParError::MalformedManifest(format!("cannot parse line {line:?}")))
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ParError::MalformedManifest(format!("bad {key} value {value:?}")))
}

fn parse_hex(value: &str) -> Result<u32> {
    u32::from_str_radix(value, 16)
        .map_err(|_| ParError::MalformedManifest(format!("bad Attr value {value:?}")))
}

fn parse_yes_no(key: &str, value: &str) -> Result<bool> {
    match value {
        "Y" => Ok(true),
        "N" => Ok(false),
        other => Err(ParError::MalformedManifest(format!(
            "bad {key} value {other:?}"
        ))),
    }
}

fn parse_endianness(value: &str) -> Result<Endianness> {
    match value {
        "L" => Ok(Endianness::Little),
        "B" => Ok(Endianness::Big),
        other => Err(ParError::MalformedManifest(format!(
            "bad Endi value {other:?}"
        ))),
    }
}

fn required<T>(value: Option<T>, key: &str) -> Result<T> {
    value.ok_or_else(|| ParError::MalformedManifest(format!("missing {key} line")))
}

/// Apply a manifest onto a structurally matching archive.
///
/// Archive-level fields, directory attributes and file attributes and
/// timestamps are overwritten. Files whose manifest entry prescribes SLLZ
/// parameters are re-encoded with them. The archive keeps its own
/// first-index fields: they derive from the actual layout, and the
/// manifest's copies are declarations only.
pub fn apply_manifest(archive: &mut Archive, text: &str, opts: &ArchiveOptions) -> Result<()> {
    let doc = parse_manifest(text)?;

    if doc.dir_count != archive.dir_count() {
        return Err(ParError::CountMismatch {
            scope: "archive directories",
            declared: doc.dir_count,
            actual: archive.dir_count(),
        });
    }
    if doc.file_count != archive.file_count() {
        return Err(ParError::CountMismatch {
            scope: "archive files",
            declared: doc.file_count,
            actual: archive.file_count(),
        });
    }

    debug!("applying manifest {:?} onto {:?}", doc.name, archive.name);

    let (top_dirs, top_files) = match archive.root_index() {
        Some(index) => (vec![index], Vec::new()),
        None => {
            let root = archive.root();
            (root.subdirs.clone(), root.files.clone())
        }
    };
    apply_dirs(archive, &top_dirs, &top_files, &doc.dirs, &doc.files, opts)?;

    archive.name = doc.name;
    archive.platform = doc.platform;
    archive.endianness = doc.endianness;
    archive.size_extended = doc.size_extended;
    archive.relocated = doc.relocated;
    archive.file_size_mode = doc.file_size_mode;
    archive.unknown_a = doc.unknown_a;

    Ok(())
}

fn apply_dirs(
    archive: &mut Archive,
    dir_indices: &[usize],
    file_indices: &[usize],
    mdirs: &[ManifestDir],
    mfiles: &[ManifestFile],
    opts: &ArchiveOptions,
) -> Result<()> {
    if dir_indices.len() != mdirs.len() || file_indices.len() != mfiles.len() {
        return Err(ParError::StructureMismatch(format!(
            "manifest declares {} directories and {} files where the archive has {} and {}",
            mdirs.len(),
            mfiles.len(),
            dir_indices.len(),
            file_indices.len()
        )));
    }

    for (&index, mfile) in file_indices.iter().zip(mfiles) {
        apply_file(archive, index, mfile, opts)?;
    }

    for (&index, mdir) in dir_indices.iter().zip(mdirs) {
        let dir = &mut archive.directories[index];
        if dir.name != mdir.name {
            return Err(ParError::StructureMismatch(format!(
                "directory {:?} does not match manifest entry {:?}",
                dir.name, mdir.name
            )));
        }
        if let Some(attributes) = mdir.attributes {
            dir.header.attributes = attributes;
        }

        let subdirs = dir.subdirs.clone();
        let files = dir.files.clone();
        apply_dirs(archive, &subdirs, &files, &mdir.dirs, &mdir.files, opts)?;
    }

    Ok(())
}

fn apply_file(
    archive: &mut Archive,
    index: usize,
    mfile: &ManifestFile,
    opts: &ArchiveOptions,
) -> Result<()> {
    let endianness = archive.endianness;
    let file = &mut archive.files[index];
    if file.name != mfile.name {
        return Err(ParError::StructureMismatch(format!(
            "file {:?} does not match manifest entry {:?}",
            file.name, mfile.name
        )));
    }

    if let Some(attributes) = mfile.attributes {
        file.header.attributes = attributes;
    }
    file.header.timestamp = mfile.timestamp;

    if mfile.compressed && !file.is_compressed() {
        let encoding = mfile
            .version
            .map(EntryEncoding::from_version)
            .unwrap_or(EntryEncoding::SllzV1);
        file.encode(
            encoding,
            mfile.endianness.unwrap_or(endianness),
            true,
            opts,
        )?;
    } else if !mfile.compressed && file.is_loaded() && file.is_compressed() {
        file.decode(opts)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Archive;

    fn sample_manifest() -> String {
        let mut text = String::new();
        text.push_str("PXD ARCHIVE MANIFEST\n");
        text.push_str("Name\tsample\n");
        text.push_str("Plat\t2\n");
        text.push_str("Endi\tB\n");
        text.push_str("SExt\tN\n");
        text.push_str("Relo\tN\n");
        text.push_str("FSM\t1\n");
        text.push_str("UnkA\t1\n");
        text.push_str("DC\t1\n");
        text.push_str("FC\t1\n");
        text.push_str("<dir>\n");
        text.push_str("Name\t.\n");
        text.push_str("DC\t0\n");
        text.push_str("FDI\t1\n");
        text.push_str("FC\t1\n");
        text.push_str("FFI\t0\n");
        text.push_str("Attr\t10\n");
        text.push_str("<file>\n");
        text.push_str("Name\thello.txt\n");
        text.push_str("Comp\tN\n");
        text.push_str("Attr\t20\n");
        text.push_str("Time\t1700000000\n");
        text.push_str("</file>\n");
        text.push_str("</dir>\n");
        text
    }

    #[test]
    fn test_parse_sample() {
        let doc = parse_manifest(&sample_manifest()).unwrap();
        assert_eq!(doc.name, "sample");
        assert_eq!(doc.endianness, Endianness::Big);
        assert_eq!(doc.dir_count, 1);
        assert_eq!(doc.file_count, 1);

        let root = &doc.dirs[0];
        assert_eq!(root.name, ".");
        assert_eq!(root.attributes, Some(0x10));
        assert_eq!(root.files[0].name, "hello.txt");
        assert_eq!(root.files[0].timestamp, 1_700_000_000);
        assert!(!root.files[0].compressed);
    }

    #[test]
    fn test_parse_rejects_bad_header() {
        let err = parse_manifest("NOT A MANIFEST\n").unwrap_err();
        assert!(matches!(err, ParError::MalformedManifest(_)));
    }

    #[test]
    fn test_parse_rejects_unbalanced_dir() {
        let text = sample_manifest().replace("</dir>\n", "");
        let err = parse_manifest(&text).unwrap_err();
        assert!(matches!(err, ParError::MalformedManifest(_)));
    }

    #[test]
    fn test_parse_rejects_count_mismatch() {
        let text = sample_manifest().replace("DC\t0\n", "DC\t2\n");
        let err = parse_manifest(&text).unwrap_err();
        assert!(matches!(err, ParError::CountMismatch { .. }));
    }

    #[test]
    fn test_parse_rejects_missing_time() {
        let text = sample_manifest().replace("Time\t1700000000\n", "");
        let err = parse_manifest(&text).unwrap_err();
        assert!(matches!(err, ParError::MalformedManifest(_)));
    }

    #[test]
    fn test_parse_requires_codec_fields_when_compressed() {
        let text = sample_manifest().replace("Comp\tN\n", "Comp\tY\n");
        let err = parse_manifest(&text).unwrap_err();
        assert!(matches!(err, ParError::MalformedManifest(_)));
    }

    #[test]
    fn test_write_parse_roundtrip() {
        let archive = Archive::new("empty", Endianness::Big);
        let text = write_manifest(&archive);
        assert!(text.starts_with(MANIFEST_HEADER));

        let doc = parse_manifest(&text).unwrap();
        assert_eq!(doc.name, "empty");
        assert_eq!(doc.dir_count, 0);
        assert_eq!(doc.file_count, 0);
    }

    #[test]
    fn test_manifest_file_name() {
        let archive = Archive::new("stage", Endianness::Little);
        assert_eq!(manifest_file_name(&archive), "stage.par.manifest");
    }
}
