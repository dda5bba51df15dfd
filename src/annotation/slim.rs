//! Per-term annotation lists
//!
//! Splits a mart export into one CSV per grouping label under
//! `<out>/go_csvs/`, keeping every column of the original rows. The lists
//! can be fed back to the loader with [`GroupingKey::FileStem`].

use crate::annotation::loader::{csv_error, delimiter_for, open_reader};
use crate::annotation::GroupingKey;
use crate::core::config::AnnotationConfig;
use crate::core::layout::PartitionLayout;
use crate::{MashtError, Result};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const TERM_LIST_DIR: &str = "go_csvs";

fn write_list(path: &Path, headers: &csv::StringRecord, rows: &[csv::StringRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    writer.write_record(headers).map_err(|e| csv_error(path, e))?;
    for row in rows {
        writer.write_record(row).map_err(|e| csv_error(path, e))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write one comma-separated list per grouping label and return the paths, sorted
pub fn write_term_lists(
    mart: &Path,
    out_dir: &Path,
    config: &AnnotationConfig,
) -> Result<Vec<PathBuf>> {
    config.validate()?;
    let mut reader = open_reader(mart, delimiter_for(mart, config.delimiter))?;
    let headers = reader.headers().map_err(|e| csv_error(mart, e))?.clone();
    if headers.is_empty() {
        return Err(MashtError::MalformedAnnotation {
            path: mart.to_path_buf(),
            reason: "missing header row".to_string(),
        });
    }

    let group = match &config.grouping {
        GroupingKey::LastColumn => headers.len() - 1,
        GroupingKey::Column(name) => headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| MashtError::MalformedAnnotation {
                path: mart.to_path_buf(),
                reason: format!("missing column '{}'", name),
            })?,
        GroupingKey::FileStem => {
            return Err(MashtError::Config(
                "term lists need a grouping column, not the file stem".to_string(),
            ))
        }
    };

    let mut groups: BTreeMap<String, Vec<csv::StringRecord>> = BTreeMap::new();
    let mut ungrouped = 0usize;
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(mart, e))?;
        match record.get(group).map(str::trim) {
            Some(label) if !label.is_empty() => {
                groups.entry(label.to_string()).or_default().push(record)
            }
            _ => ungrouped += 1,
        }
    }
    if ungrouped > 0 {
        warn!("{} rows of {:?} have no '{}' value", ungrouped, mart, &headers[group]);
    }

    let list_dir = out_dir.join(TERM_LIST_DIR);
    fs::create_dir_all(&list_dir)?;
    let layout = PartitionLayout::from_labels(groups.keys().map(String::as_str));

    let mut paths = groups
        .par_iter()
        .map(|(label, rows)| {
            let name = layout.term_dir(label).unwrap_or(label.as_str());
            let path = list_dir.join(format!("{}.csv", name));
            write_list(&path, &headers, rows)?;
            Ok(path)
        })
        .collect::<Result<Vec<_>>>()?;
    paths.sort();

    info!("Wrote {} term lists to {:?}", paths.len(), list_dir);
    Ok(paths)
}
