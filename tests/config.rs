use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_taxonomy::config::ConfigLoader;
use kira_taxonomy::domain::ScorePolicy;
use kira_taxonomy::error::KiraError;
use kira_taxonomy::store::Store;
use kira_taxonomy::taxonomy::SearchSettings;

fn store() -> Store {
    Store::new_with_paths(
        Utf8PathBuf::from("/work/.kira-tax"),
        Utf8PathBuf::from("/cache/kira-taxonomy"),
    )
}

fn write_config(content: &str) -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kira-tax.json");
    fs::write(&path, content).unwrap();
    let path = path.to_string_lossy().into_owned();
    (dir, path)
}

#[test]
fn explicit_missing_file_is_an_error() {
    let result = ConfigLoader::resolve(Some("/definitely/not/here.json"), &store());
    assert_matches!(result, Err(KiraError::ConfigRead(_)));
}

#[test]
fn malformed_json_is_reported() {
    let (_dir, path) = write_config("{ \"search\": ");
    let result = ConfigLoader::resolve(Some(&path), &store());
    assert_matches!(result, Err(KiraError::ConfigParse(_)));
}

#[test]
fn search_and_score_overrides() {
    let (_dir, path) = write_config(
        r#"{
            "schema_version": 1,
            "search": { "backtrack_bytes": 4096, "max_depth": 64 },
            "score": "length"
        }"#,
    );
    let resolved = ConfigLoader::resolve(Some(&path), &store()).unwrap();
    let defaults = SearchSettings::default();
    assert_eq!(resolved.search.backtrack_bytes, 4096);
    assert_eq!(resolved.search.max_depth, 64);
    assert_eq!(resolved.search.forward_lines, defaults.forward_lines);
    assert_eq!(resolved.score, ScorePolicy::Length);
    assert!(resolved.idmapping_file.is_none());
}

#[test]
fn zero_forward_lines_is_rejected() {
    let (_dir, path) = write_config(r#"{ "search": { "forward_lines": 0 } }"#);
    let result = ConfigLoader::resolve(Some(&path), &store());
    assert_matches!(result, Err(KiraError::InvalidSearchSettings(_)));
}

#[test]
fn taxonomy_dir_moves_both_files() {
    let (_dir, path) = write_config(
        r#"{
            "taxonomy_dir": "/data/taxdump",
            "names_file": "/elsewhere/names.dmp",
            "idmapping_file": "/data/idmapping.dat.gz"
        }"#,
    );
    let resolved = ConfigLoader::resolve(Some(&path), &store()).unwrap();
    assert_eq!(resolved.nodes_file, Utf8PathBuf::from("/data/taxdump/nodes.dmp"));
    assert_eq!(resolved.names_file, Utf8PathBuf::from("/elsewhere/names.dmp"));
    assert_eq!(
        resolved.idmapping_file,
        Some(Utf8PathBuf::from("/data/idmapping.dat.gz"))
    );
    assert_eq!(resolved.score, ScorePolicy::Rank);
}

#[test]
fn unknown_score_policy_is_a_parse_error() {
    let (_dir, path) = write_config(r#"{ "score": "hamming" }"#);
    let result = ConfigLoader::resolve(Some(&path), &store());
    assert_matches!(result, Err(KiraError::ConfigParse(_)));
}
