//! Tabular search-hit records (BLAST `-outfmt 6`).
//!
//! Reading happens in two passes. [`index_hits`] scans a hit file once and
//! records, per query identifier, the byte runs holding that query's lines.
//! Workers later seek straight to their runs with [`read_run`] and parse the
//! lines with [`HitRecord::parse_line`], so no pass ever holds the full result
//! set in memory.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column order of the standard tabular output
pub const HIT_COLUMNS: [&str; 12] = [
    "qseqid", "sseqid", "pident", "length", "mismatch", "gapopen", "qstart", "qend", "sstart",
    "send", "evalue", "bitscore",
];

/// A row that could not be parsed. Recorded and counted, never propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{}{}: {}", .file, fmt_line(.line), .message)]
pub struct RecordError {
    pub file: String,
    pub line: Option<u64>,
    pub message: String,
}

fn fmt_line(line: &Option<u64>) -> String {
    line.map(|l| format!(":{}", l)).unwrap_or_default()
}

impl RecordError {
    pub fn new(file: impl Into<String>, line: Option<u64>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitRecord {
    pub query_id: String,
    pub subject_id: String,
    pub identity: f32,
    pub alignment_length: usize,
    pub mismatches: usize,
    pub gap_opens: usize,
    pub query_start: usize,
    pub query_end: usize,
    pub subject_start: usize,
    pub subject_end: usize,
    pub e_value: f64,
    pub bit_score: f32,
    /// 1-based line number in the source file
    pub line_number: u64,
}

fn field<T: std::str::FromStr>(parts: &[&str], idx: usize) -> Result<T, String> {
    parts[idx]
        .trim()
        .parse::<T>()
        .map_err(|_| format!("invalid {} value '{}'", HIT_COLUMNS[idx], parts[idx]))
}

impl HitRecord {
    /// Parse one tab-separated line. The error is the reason only; callers
    /// attach file and line when recording it.
    pub fn parse_line(line: &str, line_number: u64) -> Result<Self, String> {
        let line = line.trim_end_matches(['\n', '\r']);
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() != HIT_COLUMNS.len() {
            return Err(format!(
                "expected {} fields, found {}",
                HIT_COLUMNS.len(),
                parts.len()
            ));
        }

        let query_id = parts[0].trim();
        let subject_id = parts[1].trim();
        if query_id.is_empty() || subject_id.is_empty() {
            return Err("empty query or subject identifier".to_string());
        }

        Ok(Self {
            query_id: query_id.to_string(),
            subject_id: subject_id.to_string(),
            identity: field(&parts, 2)?,
            alignment_length: field(&parts, 3)?,
            mismatches: field(&parts, 4)?,
            gap_opens: field(&parts, 5)?,
            query_start: field(&parts, 6)?,
            query_end: field(&parts, 7)?,
            subject_start: field(&parts, 8)?,
            subject_end: field(&parts, 9)?,
            e_value: field(&parts, 10)?,
            bit_score: field(&parts, 11)?,
            line_number,
        })
    }
}

/// Consecutive lines of one query in a hit file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRun {
    pub offset: u64,
    pub len: u64,
    pub first_line: u64,
}

impl LineRun {
    fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Byte-run index of a hit file, keyed by query identifier in first-seen order
#[derive(Debug, Clone, Default)]
pub struct HitIndex {
    pub path: PathBuf,
    pub queries: IndexMap<String, Vec<LineRun>>,
    pub data_lines: u64,
}

impl HitIndex {
    pub fn runs(&self, query_id: &str) -> &[LineRun] {
        self.queries.get(query_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Scan a hit file and group its data lines by query identifier.
///
/// Blank lines and `#` comments are skipped. A line's query is whatever
/// precedes its first tab, so malformed lines still land in a run and are
/// reported by the worker that parses them.
pub fn index_hits<P: AsRef<Path>>(path: P) -> std::io::Result<HitIndex> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let mut index = HitIndex {
        path: path.to_path_buf(),
        ..Default::default()
    };

    let mut buf = Vec::new();
    let mut offset = 0u64;
    let mut line_number = 0u64;
    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf)?;
        if read == 0 {
            break;
        }
        line_number += 1;
        let line_offset = offset;
        offset += read as u64;

        let content = trim_line_end(&buf);
        if content.iter().all(|c| c.is_ascii_whitespace()) || content.first() == Some(&b'#') {
            continue;
        }

        let key_end = content.iter().position(|&c| c == b'\t').unwrap_or(content.len());
        let query = String::from_utf8_lossy(&content[..key_end]).trim().to_string();

        let runs = index.queries.entry(query).or_default();
        match runs.last_mut() {
            Some(run) if run.end() == line_offset => run.len += read as u64,
            _ => runs.push(LineRun {
                offset: line_offset,
                len: read as u64,
                first_line: line_number,
            }),
        }
        index.data_lines += 1;
    }

    Ok(index)
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

/// Read the raw lines of a run, paired with their line numbers.
pub fn read_run(file: &mut File, run: &LineRun) -> std::io::Result<Vec<(u64, String)>> {
    file.seek(SeekFrom::Start(run.offset))?;
    let mut bytes = vec![0u8; run.len as usize];
    file.read_exact(&mut bytes)?;

    Ok(bytes
        .split(|&c| c == b'\n')
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| {
            (
                run.first_line + i as u64,
                String::from_utf8_lossy(trim_line_end(line)).into_owned(),
            )
        })
        .collect())
}
