use assert_matches::assert_matches;

use kira_taxonomy::domain::{ScorePolicy, TaxId, UniprotId, normalize_organism_name};
use kira_taxonomy::error::KiraError;

#[test]
fn organism_names_normalize_to_binomials() {
    for (raw, expected) in [
        ("escherichia_coli", "Escherichia coli"),
        ("Escherichia_coli_str_K12", "Escherichia coli"),
        ("  HOMO   SAPIENS ", "Homo sapiens"),
        ("Salmonella enterica subsp. enterica", "Salmonella enterica"),
        ("Bacteria", "Bacteria"),
        ("", ""),
    ] {
        assert_eq!(normalize_organism_name(raw), expected, "{raw:?}");
    }
}

#[test]
fn uniprot_accessions_are_uppercased_and_checked() {
    let id: UniprotId = " p0a7v8 ".parse().unwrap();
    assert_eq!(id.as_str(), "P0A7V8");
    assert!("A0A023GPI8".parse::<UniprotId>().is_ok());
    assert_matches!("12345".parse::<UniprotId>(), Err(KiraError::InvalidUniprotId(_)));
}

#[test]
fn taxid_display_round_trips() {
    let id: TaxId = "9606".parse().unwrap();
    assert_eq!(id.to_string(), "9606");
    assert!(TaxId::ROOT.is_root());
    assert_matches!(TaxId::new(0), Err(KiraError::InvalidTaxId(_)));
}

#[test]
fn score_policy_names() {
    assert_eq!(ScorePolicy::default(), ScorePolicy::Rank);
    assert_eq!(serde_json::to_string(&ScorePolicy::Length).unwrap(), "\"length\"");
    let parsed: ScorePolicy = serde_json::from_str("\"rank\"").unwrap();
    assert_eq!(parsed, ScorePolicy::Rank);
    assert_eq!(ScorePolicy::Length.to_string(), "length");
}
