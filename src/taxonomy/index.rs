//! Divide-and-conquer lookup over a node file sorted by node id.
//!
//! Rows are variable length, so every step normalizes an arbitrary byte offset
//! to the start of the row that contains it before parsing. A row below the
//! target moves the range past its end, so every step shrinks the range. A
//! repeated candidate or an exhausted step budget only happens on unsorted
//! input; the search then falls back to a bounded scan of the neighbouring
//! rows and gives up.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::TaxId;
use crate::error::KiraError;

pub const DEFAULT_BACKTRACK_BYTES: u64 = 200;
pub const DEFAULT_FORWARD_LINES: usize = 4;
pub const DEFAULT_MAX_DEPTH: usize = 256;

const REVERSE_CHUNK: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// How far before a stalled row the fallback scan starts.
    pub backtrack_bytes: u64,
    /// Rows after a stalled row the fallback scan inspects.
    pub forward_lines: usize,
    /// Longest parent walk before a lineage is cut short.
    pub max_depth: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            backtrack_bytes: DEFAULT_BACKTRACK_BYTES,
            forward_lines: DEFAULT_FORWARD_LINES,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl SearchSettings {
    pub fn validate(&self) -> Result<(), KiraError> {
        if self.forward_lines == 0 {
            return Err(KiraError::InvalidSearchSettings(
                "forward_lines must be at least 1".to_string(),
            ));
        }
        if self.max_depth == 0 {
            return Err(KiraError::InvalidSearchSettings(
                "max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// One `node_id | parent_id | rank | ...` row of the node file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRecord {
    pub id: TaxId,
    pub parent: TaxId,
    pub rank: String,
}

impl NodeRecord {
    /// Parses a pipe-delimited row (NCBI `nodes.dmp` style, fields padded with
    /// tabs) or, failing that, a plain tab-delimited row. Trailing fields are
    /// ignored.
    pub fn parse(line: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches(['\n', '\r']);
        let delimiter = if text.contains('|') { '|' } else { '\t' };
        let mut fields = text.split(delimiter).map(str::trim);
        let id = fields.next()?.parse::<TaxId>().ok()?;
        let parent = fields.next()?.parse::<TaxId>().ok()?;
        let rank = fields.next()?.to_string();
        Some(Self { id, parent, rank })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub lookups: u64,
    pub seeks: u64,
    pub fallback_scans: u64,
}

pub struct NodeFileIndex<R> {
    reader: R,
    len: u64,
    settings: SearchSettings,
    stats: IndexStats,
    line: Vec<u8>,
}

impl NodeFileIndex<BufReader<File>> {
    pub fn open(path: &Path, settings: SearchSettings) -> Result<Self, KiraError> {
        if !path.exists() {
            return Err(KiraError::MissingTaxonomyFile(path.to_path_buf()));
        }
        let file = File::open(path)
            .map_err(|err| KiraError::Filesystem(format!("open {}: {err}", path.display())))?;
        Self::from_reader(BufReader::new(file), settings)
    }
}

impl<R: BufRead + Seek> NodeFileIndex<R> {
    pub fn from_reader(mut reader: R, settings: SearchSettings) -> Result<Self, KiraError> {
        settings.validate()?;
        let len = reader
            .seek(SeekFrom::End(0))
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(Self {
            reader,
            len,
            settings,
            stats: IndexStats::default(),
            line: Vec::new(),
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn settings(&self) -> SearchSettings {
        self.settings
    }

    pub fn stats(&self) -> IndexStats {
        self.stats
    }

    pub fn find_parent(&mut self, target: TaxId) -> Result<Option<NodeRecord>, KiraError> {
        self.find_parent_in(target, 0..self.len)
    }

    /// Looks `target` up within `range`. `Ok(None)` means the node is not in the
    /// file; errors are reserved for I/O failures.
    pub fn find_parent_in(
        &mut self,
        target: TaxId,
        range: Range<u64>,
    ) -> Result<Option<NodeRecord>, KiraError> {
        self.stats.lookups += 1;
        let mut end = range.end.min(self.len);
        if range.start >= end {
            return Ok(None);
        }
        let mut start = self.line_start_containing(range.start)?;

        // Every step on sorted input shrinks the range, so this budget is only
        // reached on inputs that violate the sort order.
        let mut budget = 2 * (u64::BITS - self.len.leading_zeros()) as usize + 4;
        let mut last_seen: Option<TaxId> = None;
        let mut anchor = start;

        while start < end {
            if budget == 0 {
                return self.scan_near(target, anchor);
            }
            budget -= 1;

            let mid = start + (end - start) / 2;
            let line_start = self.line_start_containing(mid)?;
            anchor = line_start;

            let Some(record) = self.read_record_at(line_start)? else {
                warn!(
                    offset = line_start,
                    %target,
                    "malformed taxonomy row, treating node as missing"
                );
                return Ok(None);
            };
            let row_end = line_start + self.line.len() as u64;

            if record.id == target {
                return Ok(Some(record));
            }
            if last_seen == Some(record.id) {
                return self.scan_near(target, line_start);
            }
            last_seen = Some(record.id);

            if record.id < target {
                start = row_end;
            } else {
                end = line_start;
            }
        }

        if last_seen.is_none() {
            return Ok(None);
        }
        self.scan_near(target, anchor)
    }

    /// Bounded linear scan around a row the bisection keeps returning to.
    fn scan_near(&mut self, target: TaxId, anchor: u64) -> Result<Option<NodeRecord>, KiraError> {
        self.stats.fallback_scans += 1;
        debug!(%target, anchor, "bisection stalled, scanning neighbouring rows");

        let window_start =
            self.line_start_containing(anchor.saturating_sub(self.settings.backtrack_bytes))?;
        self.seek_to(window_start)?;

        let mut offset = window_start;
        let mut past_anchor = 0usize;
        loop {
            self.line.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.line)
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
            if read == 0 {
                break;
            }
            let line_offset = offset;
            offset += read as u64;
            if line_offset > anchor {
                past_anchor += 1;
            }

            if let Some(record) = NodeRecord::parse(&self.line) {
                if record.id == target {
                    return Ok(Some(record));
                }
                if record.id > target {
                    break;
                }
            }
            if past_anchor >= self.settings.forward_lines {
                break;
            }
        }

        debug!(%target, "node not present in taxonomy file");
        Ok(None)
    }

    /// Offset of the first byte of the row containing `offset`.
    fn line_start_containing(&mut self, offset: u64) -> Result<u64, KiraError> {
        let mut buf = [0u8; REVERSE_CHUNK];
        let mut cursor = offset.min(self.len);
        while cursor > 0 {
            let chunk_start = cursor.saturating_sub(REVERSE_CHUNK as u64);
            let chunk_len = (cursor - chunk_start) as usize;
            self.seek_to(chunk_start)?;
            self.reader
                .read_exact(&mut buf[..chunk_len])
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
            if let Some(pos) = buf[..chunk_len].iter().rposition(|&byte| byte == b'\n') {
                return Ok(chunk_start + pos as u64 + 1);
            }
            cursor = chunk_start;
        }
        Ok(0)
    }

    fn read_record_at(&mut self, line_start: u64) -> Result<Option<NodeRecord>, KiraError> {
        self.seek_to(line_start)?;
        self.line.clear();
        self.reader
            .read_until(b'\n', &mut self.line)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(NodeRecord::parse(&self.line))
    }

    fn seek_to(&mut self, offset: u64) -> Result<(), KiraError> {
        self.stats.seeks += 1;
        self.reader
            .seek(SeekFrom::Start(offset))
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn index(content: &str) -> NodeFileIndex<Cursor<Vec<u8>>> {
        NodeFileIndex::from_reader(
            Cursor::new(content.as_bytes().to_vec()),
            SearchSettings::default(),
        )
        .unwrap()
    }

    fn taxid(value: u64) -> TaxId {
        TaxId::new(value).unwrap()
    }

    const TREE: &str = "1\t|\t1\t|\tno rank\t|\t\t|\n\
                        2\t|\t1\t|\tsuperkingdom\t|\t\t|\n\
                        10\t|\t2\t|\tphylum\t|\t\t|\n\
                        100\t|\t10\t|\tspecies\t|\t\t|\n\
                        200\t|\t10\t|\tspecies\t|\t\t|\n";

    #[test]
    fn parse_ncbi_row() {
        let record = NodeRecord::parse(b"562\t|\t561\t|\tspecies\t|\tEC\t|\t0\t|\n").unwrap();
        assert_eq!(record.id, taxid(562));
        assert_eq!(record.parent, taxid(561));
        assert_eq!(record.rank, "species");
    }

    #[test]
    fn parse_tab_row() {
        let record = NodeRecord::parse(b"9606\t9605\tspecies\r\n").unwrap();
        assert_eq!(record.parent, taxid(9605));
        assert_eq!(record.rank, "species");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(NodeRecord::parse(b"").is_none());
        assert!(NodeRecord::parse(b"abc|1|species\n").is_none());
        assert!(NodeRecord::parse(b"5\n").is_none());
    }

    #[test]
    fn every_row_is_found() {
        let mut index = index(TREE);
        for (id, parent, rank) in [
            (1, 1, "no rank"),
            (2, 1, "superkingdom"),
            (10, 2, "phylum"),
            (100, 10, "species"),
            (200, 10, "species"),
        ] {
            let record = index.find_parent(taxid(id)).unwrap().unwrap();
            assert_eq!(record.parent, taxid(parent));
            assert_eq!(record.rank, rank);
        }
    }

    #[test]
    fn absent_ids_terminate_as_not_found() {
        let mut index = index(TREE);
        for id in [3, 50, 150, 201, 99_999] {
            assert_eq!(index.find_parent(taxid(id)).unwrap(), None);
        }
    }

    #[test]
    fn single_row_root_needs_no_fallback() {
        let mut index = index("1\t|\t1\t|\tno rank\t|\n");
        let record = index.find_parent(TaxId::ROOT).unwrap().unwrap();
        assert_eq!(record.id, TaxId::ROOT);
        assert_eq!(index.stats().fallback_scans, 0);
        assert_eq!(index.stats().lookups, 1);
    }

    #[test]
    fn long_row_followed_by_short_rows_is_searched_exactly() {
        // The first row is longer than everything after it, so the midpoint of
        // early steps lands inside it.
        let mut content = format!("1|1|no rank|{}\n", "x".repeat(300));
        for id in 2..=30 {
            content.push_str(&format!("{id}|1|r\n"));
        }
        let mut index = index(&content);
        for id in 1..=30 {
            let record = index.find_parent(taxid(id)).unwrap();
            assert_eq!(record.map(|r| r.id), Some(taxid(id)), "node {id}");
        }
        assert_eq!(index.stats().fallback_scans, 0);
        assert_eq!(index.find_parent(taxid(31)).unwrap(), None);
    }

    #[test]
    fn unsorted_rows_fall_back_to_a_bounded_scan() {
        let mut index = index("5|1|genus\n3|5|species\n9|1|genus\n");
        assert_eq!(index.find_parent(taxid(4)).unwrap(), None);
        assert!(index.stats().fallback_scans >= 1);
    }

    #[test]
    fn empty_file_finds_nothing() {
        let mut index = index("");
        assert!(index.is_empty());
        assert_eq!(index.find_parent(TaxId::ROOT).unwrap(), None);
    }

    #[test]
    fn zero_forward_lines_is_rejected() {
        let settings = SearchSettings {
            forward_lines: 0,
            ..SearchSettings::default()
        };
        let result = NodeFileIndex::from_reader(Cursor::new(Vec::new()), settings);
        assert!(matches!(result, Err(KiraError::InvalidSearchSettings(_))));
    }
}
