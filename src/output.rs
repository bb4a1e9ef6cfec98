use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{
    AccessionsResult, AnnotationRecord, AnnotationResult, DistanceReport, DomainsResult, FetchResult,
    LineagesResult, ProgressEvent, ProgressSink,
};
use crate::taxonomy::DistanceResult;

pub const MISSING: &str = "NA";
const LIST_SEPARATOR: &str = ", ";

pub const ANNOTATION_HEADER: [&str; 10] = [
    "uid",
    "taxid",
    "organism",
    "superkingdom",
    "ph",
    "temperature",
    "pfam",
    "lineage_identifiers",
    "lineage_ranks",
    "lineage_names",
];

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_lineages(result: &LineagesResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_domains(result: &DomainsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_distance(result: &DistanceReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_annotation(result: &AnnotationResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_accessions(result: &AccessionsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress to the log.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_fetch<W: Write>(out: &mut W, result: &FetchResult) -> io::Result<()> {
        writeln!(out, "taxonomy: {}", result.action)?;
        writeln!(out, "  nodes: {}", result.nodes_path)?;
        writeln!(out, "  names: {}", result.names_path)?;
        if let Some(bytes) = result.bytes {
            writeln!(out, "  downloaded: {bytes} bytes")?;
        }
        Ok(())
    }

    pub fn print_lineages<W: Write>(out: &mut W, result: &LineagesResult) -> io::Result<()> {
        for report in &result.lineages {
            let path = report
                .lineage
                .entries()
                .iter()
                .map(|entry| format!("{} ({})", entry.name, entry.rank))
                .collect::<Vec<_>>()
                .join(" > ");
            writeln!(out, "{} [{:?}]", report.identifier, report.status)?;
            writeln!(out, "  {path}")?;
        }
        Ok(())
    }

    pub fn print_domains<W: Write>(out: &mut W, result: &DomainsResult) -> io::Result<()> {
        for report in &result.domains {
            writeln!(out, "{}\t{}", report.identifier, report.domain)?;
        }
        Ok(())
    }

    pub fn print_distance<W: Write>(out: &mut W, report: &DistanceReport) -> io::Result<()> {
        match report {
            DistanceReport::Pair {
                first,
                second,
                result,
                ..
            } => writeln!(out, "{first}\t{second}\t{}", describe(result)),
            DistanceReport::All { distances, .. } => {
                for (first, row) in distances {
                    for (second, result) in row.iter().filter(|(second, _)| *second > first) {
                        writeln!(out, "{first}\t{second}\t{}", describe(result))?;
                    }
                }
                Ok(())
            }
            DistanceReport::Best { extreme, best, .. } => {
                let score = best
                    .score
                    .map(|score| score.to_string())
                    .unwrap_or_else(|| MISSING.to_string());
                writeln!(out, "{extreme}: {score}")?;
                for (first, second) in &best.pairs {
                    writeln!(out, "  {first}\t{second}")?;
                }
                Ok(())
            }
        }
    }

    pub fn print_annotation<W: Write>(out: &mut W, result: &AnnotationResult) -> io::Result<()> {
        for record in &result.records {
            writeln!(
                out,
                "{}\t{}\t{}",
                record.uid,
                field(record.organism.as_ref()),
                field(record.superkingdom.as_ref())
            )?;
        }
        if let Some(path) = &result.output {
            writeln!(out, "written to {path}")?;
        }
        Ok(())
    }

    pub fn print_accessions<W: Write>(out: &mut W, result: &AccessionsResult) -> io::Result<()> {
        for report in &result.reports {
            let accessions = (!report.accessions.is_empty())
                .then(|| report.accessions.join(LIST_SEPARATOR));
            writeln!(out, "{}\t{}", report.taxid, field(accessions))?;
        }
        Ok(())
    }
}

fn describe(result: &DistanceResult) -> String {
    let score = result
        .score
        .map(|score| score.to_string())
        .unwrap_or_else(|| MISSING.to_string());
    format!(
        "{score}\t{} ({}, {})",
        result.common_name, result.common_rank, result.common_node
    )
}

fn field<T: ToString>(value: Option<T>) -> String {
    value
        .map(|value| value.to_string())
        .unwrap_or_else(|| MISSING.to_string())
}

/// Writes annotation records as a tab separated flat file with a header row.
/// Missing values are written as `NA`; list values are joined with `", "`.
pub fn write_annotation_tsv<W: Write>(out: &mut W, records: &[AnnotationRecord]) -> io::Result<()> {
    writeln!(out, "{}", ANNOTATION_HEADER.join("\t"))?;
    for record in records {
        let pfam = record
            .pfam
            .as_ref()
            .filter(|pfam| !pfam.is_empty())
            .map(|pfam| pfam.join(LIST_SEPARATOR));
        let (identifiers, ranks, names) = match &record.lineage {
            Some(lineage) => (
                Some(
                    lineage
                        .nodes()
                        .map(|node| node.to_string())
                        .collect::<Vec<_>>()
                        .join(LIST_SEPARATOR),
                ),
                Some(lineage.ranks().collect::<Vec<_>>().join(LIST_SEPARATOR)),
                Some(lineage.names().collect::<Vec<_>>().join(LIST_SEPARATOR)),
            ),
            None => (None, None, None),
        };
        let row = [
            record.uid.clone(),
            field(record.taxid),
            field(record.organism.as_ref()),
            field(record.superkingdom.as_ref()),
            field(record.ph),
            field(record.temperature),
            field(pfam),
            field(identifiers),
            field(ranks),
            field(names),
        ];
        writeln!(out, "{}", row.join("\t"))?;
    }
    Ok(())
}
