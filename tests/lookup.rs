use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Write;

use assert_matches::assert_matches;
use flate2::Compression;
use flate2::write::GzEncoder;

use kira_taxonomy::domain::{TaxId, UniprotId};
use kira_taxonomy::error::KiraError;
use kira_taxonomy::lookup::{DelimitedFile, KeyLookup, lookup_values};
use kira_taxonomy::uniprot::{UniprotClient, UniprotEntry, UniprotTaxidLookup, parse_entries_tsv};

fn keys(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[test]
fn gzipped_idmapping_is_read_transparently() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idmapping.dat.gz");
    let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    encoder
        .write_all(b"P0A7V8\tNCBI_TaxID\t562\nP69905\tGene_Name\tHBA1\nP69905\tNCBI_TaxID\t9606\n")
        .unwrap();
    encoder.finish().unwrap();

    let table = DelimitedFile::tsv(&path)
        .with_columns(0, 2)
        .with_filter(1, "NCBI_TaxID");
    let found = lookup_values::<TaxId>(&table, &keys(&["P0A7V8", "P69905", "Q9XYZ1"])).unwrap();
    assert_eq!(found["P0A7V8"], Some(TaxId::new(562).unwrap()));
    assert_eq!(found["P69905"], Some(TaxId::new(9606).unwrap()));
    assert_eq!(found["Q9XYZ1"], None);
}

#[test]
fn last_matching_row_wins() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "Escherichia coli,6.5").unwrap();
    writeln!(file, "Escherichia coli,7.0").unwrap();
    let table = DelimitedFile::tsv(file.path()).with_delimiter(',');
    let found = lookup_values::<f64>(&table, &keys(&["Escherichia coli"])).unwrap();
    assert_eq!(found["Escherichia coli"], Some(7.0));
}

#[test]
fn reverse_lookup_collects_every_accession_of_a_taxid() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "P0A7V8\tNCBI_TaxID\t562\n\
         P0A7V8\tGene_Name\trpsD\n\
         P69905\tNCBI_TaxID\t9606\n\
         P0AES4\tNCBI_TaxID\t562\n\
         Q9XYZ1\tGene_Name\t562\n"
    )
    .unwrap();
    let table = DelimitedFile::tsv(file.path())
        .with_columns(2, 0)
        .with_filter(1, "NCBI_TaxID");
    let found = table.lookup_all(&keys(&["562", "9606", "4932"])).unwrap();
    assert_eq!(found["562"], vec!["P0A7V8".to_string(), "P0AES4".to_string()]);
    assert_eq!(found["9606"], vec!["P69905".to_string()]);
    assert!(found["4932"].is_empty());
}

#[test]
fn unparsable_value_is_an_invalid_record() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "Escherichia coli\tneutral").unwrap();
    let table = DelimitedFile::tsv(file.path());
    let result = lookup_values::<f64>(&table, &keys(&["Escherichia coli"]));
    assert_matches!(result, Err(KiraError::InvalidRecord { .. }));
}

#[test]
fn missing_table_is_a_filesystem_error() {
    let dir = tempfile::tempdir().unwrap();
    let table = DelimitedFile::tsv(dir.path().join("absent.tsv"));
    assert_matches!(
        table.lookup(&keys(&["x"])),
        Err(KiraError::Filesystem(_))
    );
}

#[test]
fn uniprot_tsv_columns_are_found_by_header() {
    let body = "Organism (ID)\tEntry\tPfam\n\
                562\tP0A7V8\tPF00163;PF01479;\n\
                9606\tP69905\t\n\
                83333\tnot an accession\tPF00001;\n";
    let entries = parse_entries_tsv(body).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].accession.as_str(), "P0A7V8");
    assert_eq!(entries[0].taxid, Some(TaxId::new(562).unwrap()));
    assert_eq!(entries[0].pfam, vec!["PF00163", "PF01479"]);
    assert!(entries[1].pfam.is_empty());

    assert_matches!(
        parse_entries_tsv("Accession\tTaxon\n"),
        Err(KiraError::UniprotHttp(_))
    );
    assert!(parse_entries_tsv("").unwrap().is_empty());
}

struct StaticUniprot;

impl UniprotClient for StaticUniprot {
    fn fetch_entries(
        &self,
        ids: &[UniprotId],
    ) -> Result<BTreeMap<UniprotId, UniprotEntry>, KiraError> {
        Ok(ids
            .iter()
            .filter(|id| id.as_str() == "P0A7V8")
            .map(|id| {
                (
                    id.clone(),
                    UniprotEntry {
                        accession: id.clone(),
                        taxid: Some(TaxId::new(562).unwrap()),
                        pfam: Vec::new(),
                    },
                )
            })
            .collect())
    }
}

#[test]
fn uniprot_lookup_maps_accessions_to_taxids() {
    let client = StaticUniprot;
    let lookup = UniprotTaxidLookup::new(&client);
    let found = lookup_values::<TaxId>(&lookup, &keys(&["P0A7V8", "Q9XYZ1", "garbage"])).unwrap();
    assert_eq!(found.len(), 3);
    assert_eq!(found["P0A7V8"], Some(TaxId::new(562).unwrap()));
    assert_eq!(found["Q9XYZ1"], None);
    assert_eq!(found["garbage"], None);
    assert_eq!(lookup.source(), "UniProt");

    let entries = lookup.into_entries();
    assert_eq!(entries.len(), 1);
    assert!(entries.contains_key(&"P0A7V8".parse::<UniprotId>().unwrap()));
}
