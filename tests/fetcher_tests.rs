//! Tests for layer staging: digest-derived filenames and ordered gzip-tar
//! extraction into a sandbox root.

use std::fs;
use std::io::Write;

use pullrun::{Error, blob_file_name, extract_layer};
use tempfile::TempDir;

/// Builds a gzip-compressed tar layer from (path, content) pairs.
fn gzip_layer(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }
    let tar_bytes = builder.into_inner().unwrap();

    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap()
}

// =============================================================================
// Blob Filenames
// =============================================================================

#[test]
fn test_blob_file_name_is_filesystem_safe() {
    assert_eq!(blob_file_name("sha256:deadbeef"), "sha256_deadbeef");
}

#[test]
fn test_blob_file_name_substitution_is_not_a_noop() {
    let digest = "sha256:deadbeef";
    let name = blob_file_name(digest);
    assert_ne!(name, digest);
    assert!(!name.contains(':'));
}

// =============================================================================
// Layer Extraction
// =============================================================================

#[test]
fn test_extract_single_layer() {
    let dest = TempDir::new().unwrap();
    let layer = gzip_layer(&[("bin/tool", "#!/bin/sh\n"), ("etc/conf", "key=value\n")]);

    extract_layer("sha256:one", &layer, dest.path()).unwrap();

    assert_eq!(
        fs::read_to_string(dest.path().join("bin/tool")).unwrap(),
        "#!/bin/sh\n"
    );
    assert_eq!(
        fs::read_to_string(dest.path().join("etc/conf")).unwrap(),
        "key=value\n"
    );
}

#[test]
fn test_later_layer_overwrites_earlier_files() {
    let dest = TempDir::new().unwrap();
    let base = gzip_layer(&[("etc/motd", "from base\n"), ("etc/keep", "kept\n")]);
    let top = gzip_layer(&[("etc/motd", "from top\n")]);

    // Ascending manifest order: base first, top second.
    extract_layer("sha256:base", &base, dest.path()).unwrap();
    extract_layer("sha256:top", &top, dest.path()).unwrap();

    assert_eq!(
        fs::read_to_string(dest.path().join("etc/motd")).unwrap(),
        "from top\n"
    );
    assert_eq!(
        fs::read_to_string(dest.path().join("etc/keep")).unwrap(),
        "kept\n"
    );
}

#[test]
fn test_double_extraction_is_idempotent() {
    let dest = TempDir::new().unwrap();
    let layer = gzip_layer(&[("data/file", "contents\n")]);

    extract_layer("sha256:dup", &layer, dest.path()).unwrap();
    extract_layer("sha256:dup", &layer, dest.path()).unwrap();

    assert_eq!(
        fs::read_to_string(dest.path().join("data/file")).unwrap(),
        "contents\n"
    );
    // Exactly the one entry; extraction twice added nothing.
    let entries: Vec<_> = fs::read_dir(dest.path().join("data")).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_path_traversal_entry_rejected() {
    let dest = TempDir::new().unwrap();

    // tar::Builder refuses to write `..` paths, so a hostile archive is
    // forged by setting the raw name field directly.
    let content = b"escape\n";
    let mut header = tar::Header::new_gnu();
    let name = b"../evil.txt";
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append(&header, content.as_slice()).unwrap();
    let tar_bytes = builder.into_inner().unwrap();
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    let layer = encoder.finish().unwrap();

    let err = extract_layer("sha256:evil", &layer, dest.path()).unwrap_err();
    assert!(matches!(err, Error::PathTraversal { .. }));
    assert!(!dest.path().parent().unwrap().join("evil.txt").exists());
}

#[test]
fn test_dotdot_inside_a_name_is_not_traversal() {
    let dest = TempDir::new().unwrap();
    // `..` as a substring of a component is a legal filename; only a
    // standalone parent component escapes the root.
    let layer = gzip_layer(&[("opt/a..b/rollup..js", "legit\n")]);

    extract_layer("sha256:benign", &layer, dest.path()).unwrap();

    assert_eq!(
        fs::read_to_string(dest.path().join("opt/a..b/rollup..js")).unwrap(),
        "legit\n"
    );
}

#[test]
fn test_corrupt_blob_fails_and_stages_nothing() {
    let dest = TempDir::new().unwrap();

    let err = extract_layer("sha256:junk", b"not a gzip stream", dest.path()).unwrap_err();

    match err {
        Error::Layer { digest, .. } => assert_eq!(digest, "sha256:junk"),
        other => panic!("expected layer error, got {other:?}"),
    }
    assert!(
        fs::read_dir(dest.path()).unwrap().next().is_none(),
        "failed extraction must leave the root untouched"
    );
}

#[test]
fn test_truncated_layer_is_not_success() {
    let dest = TempDir::new().unwrap();
    let mut layer = gzip_layer(&[("usr/share/doc", "some documentation text\n")]);
    layer.truncate(layer.len() / 2);

    assert!(extract_layer("sha256:cut", &layer, dest.path()).is_err());
}
