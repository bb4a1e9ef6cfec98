use std::fs;
use std::io::Write;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_taxonomy::error::KiraError;
use kira_taxonomy::fs_util::{extract_members, validate_zip};
use kira_taxonomy::store::{Metadata, Store};

fn utf8(path: std::path::PathBuf) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path).unwrap()
}

#[test]
fn metadata_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new_with_paths(
        utf8(dir.path().join("project")),
        utf8(dir.path().join("cache")),
    );
    let path = store.taxonomy_metadata_path();
    assert_eq!(Store::read_metadata(&path).unwrap(), None);

    let metadata = Metadata {
        source: "https://ftp.ncbi.nlm.nih.gov/pub/taxonomy/taxdmp.zip".to_string(),
        dataset_type: "taxonomy".to_string(),
        downloaded_at: "2026-01-01T00:00:00Z".to_string(),
        tool: "kira-tax/0.1.0".to_string(),
        resolved_path: store.taxonomy_dir().to_string(),
        files: vec!["nodes.dmp".to_string()],
    };
    Store::write_metadata(&path, &metadata).unwrap();
    assert_eq!(Store::read_metadata(&path).unwrap(), Some(metadata));
}

#[test]
fn metadata_without_file_list_still_reads() {
    let dir = tempfile::tempdir().unwrap();
    let path = utf8(dir.path().join("taxonomy.json"));
    fs::write(
        &path,
        r#"{"source":"s","dataset_type":"taxonomy","downloaded_at":"t","tool":"x","resolved_path":"p"}"#,
    )
    .unwrap();
    let metadata = Store::read_metadata(&path).unwrap().unwrap();
    assert!(metadata.files.is_empty());
}

#[test]
fn replace_file_overwrites_destination() {
    let dir = tempfile::tempdir().unwrap();
    let source = utf8(dir.path().join("staging/nodes.dmp"));
    let dest = utf8(dir.path().join("taxonomy/nodes.dmp"));
    Store::write_bytes_atomic(&dest, b"old").unwrap();
    Store::write_bytes_atomic(&source, b"new").unwrap();

    Store::replace_file(&source, &dest).unwrap();
    assert_eq!(fs::read(&dest).unwrap(), b"new");
    assert!(!source.as_std_path().exists());
}

fn write_zip(path: &std::path::Path, members: &[(&str, &str)]) {
    let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
    for (name, content) in members {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn nested_members_are_extracted_by_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let zip_path = dir.path().join("taxdmp.zip");
    write_zip(
        &zip_path,
        &[
            ("taxdump/nodes.dmp", "1\t|\t1\t|\tno rank\t|\n"),
            ("taxdump/names.dmp", "1\t|\troot\t|\t\t|\tscientific name\t|\n"),
            ("gc.prt", "genetic codes"),
        ],
    );

    let names = validate_zip(&zip_path).unwrap();
    assert_eq!(names.len(), 3);

    let target = dir.path().join("out");
    extract_members(&zip_path, &target, &["nodes.dmp", "names.dmp"]).unwrap();
    assert!(target.join("nodes.dmp").is_file());
    assert!(target.join("names.dmp").is_file());
    assert!(!target.join("gc.prt").exists());
}

#[test]
fn missing_member_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let zip_path = dir.path().join("taxdmp.zip");
    write_zip(&zip_path, &[("nodes.dmp", "1\t|\t1\t|\tno rank\t|\n")]);
    let result = extract_members(&zip_path, &dir.path().join("out"), &["nodes.dmp", "names.dmp"]);
    assert_matches!(result, Err(KiraError::IncompleteTaxdump(name)) if name == "names.dmp");
}

#[test]
fn corrupt_archive_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let zip_path = dir.path().join("taxdmp.zip");
    fs::write(&zip_path, b"not a zip").unwrap();
    assert_matches!(validate_zip(&zip_path), Err(KiraError::Filesystem(_)));
}
