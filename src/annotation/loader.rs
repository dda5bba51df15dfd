use crate::annotation::{AnnotationMapping, GoTerm, GroupingKey};
use crate::core::config::AnnotationConfig;
use crate::{MashtError, Result};
use std::path::Path;
use tracing::{debug, info, warn};

/// Reads annotation sources into an [`AnnotationMapping`]
pub struct AnnotationLoader {
    config: AnnotationConfig,
}

/// Column layout of one annotation file, resolved from its header
struct Columns {
    id: Vec<usize>,
    group: Option<usize>,
    key: String,
}

pub(crate) fn delimiter_for(path: &Path, configured: Option<char>) -> u8 {
    match configured {
        Some(c) => c as u8,
        None if path.extension().and_then(|e| e.to_str()) == Some("csv") => b',',
        None => b'\t',
    }
}

pub(crate) fn open_reader(path: &Path, delimiter: u8) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))
}

pub(crate) fn csv_error(path: &Path, err: csv::Error) -> MashtError {
    if err.is_io_error() {
        if let csv::ErrorKind::Io(io) = err.into_kind() {
            return MashtError::Io(io);
        }
        return MashtError::Parse(format!("unreadable annotation source {:?}", path));
    }
    MashtError::MalformedAnnotation {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn malformed(path: &Path, reason: impl Into<String>) -> MashtError {
    MashtError::MalformedAnnotation {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

impl AnnotationLoader {
    pub fn new(config: AnnotationConfig) -> Self {
        Self { config }
    }

    /// Load every source into one mapping. Labels from later files are
    /// appended to identifiers already seen.
    pub fn load<P: AsRef<Path>>(&self, paths: &[P]) -> Result<AnnotationMapping> {
        self.config.validate()?;
        let mut mapping = AnnotationMapping::new();
        for path in paths {
            self.load_file(path.as_ref(), &mut mapping)?;
        }

        info!(
            "Loaded annotations for {} identifiers across {} terms",
            mapping.len(),
            mapping.labels().len()
        );
        Ok(mapping)
    }

    fn resolve_columns(&self, path: &Path, headers: &csv::StringRecord) -> Result<Columns> {
        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err(malformed(path, "missing header row"));
        }
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);

        let id = if self.config.id_columns.is_empty() {
            vec![0]
        } else {
            self.config
                .id_columns
                .iter()
                .map(|name| {
                    find(name).ok_or_else(|| malformed(path, format!("missing column '{}'", name)))
                })
                .collect::<Result<Vec<_>>>()?
        };

        let (group, key) = match &self.config.grouping {
            GroupingKey::Column(name) => {
                let idx =
                    find(name).ok_or_else(|| malformed(path, format!("missing column '{}'", name)))?;
                (Some(idx), name.clone())
            }
            GroupingKey::LastColumn => {
                let idx = headers.len() - 1;
                if id.contains(&idx) {
                    return Err(malformed(
                        path,
                        "last column is an identifier column, no grouping column left",
                    ));
                }
                (Some(idx), headers[idx].trim().to_string())
            }
            GroupingKey::FileStem => (None, "file".to_string()),
        };

        Ok(Columns { id, group, key })
    }

    fn load_file(&self, path: &Path, mapping: &mut AnnotationMapping) -> Result<()> {
        let mut reader = open_reader(path, delimiter_for(path, self.config.delimiter))?;
        let headers = reader.headers().map_err(|e| csv_error(path, e))?.clone();
        let columns = self.resolve_columns(path, &headers)?;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let mut rows = 0usize;
        let mut skipped = 0usize;
        let mut ungrouped = 0usize;

        for record in reader.records() {
            let record = record.map_err(|e| csv_error(path, e))?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            rows += 1;

            let parts: Vec<&str> = columns
                .id
                .iter()
                .map(|&i| record.get(i).unwrap_or("").trim())
                .collect();
            if parts.iter().any(|p| p.is_empty()) {
                warn!("{:?}:{}: row without identifier skipped", path, line);
                skipped += 1;
                continue;
            }
            let id = parts.join("|");

            let labels: Vec<String> = match columns.group {
                None => vec![stem.clone()],
                Some(idx) => {
                    let cell = record.get(idx).unwrap_or("");
                    match self.config.value_separator {
                        Some(sep) => cell
                            .split(sep)
                            .map(str::trim)
                            .filter(|l| !l.is_empty())
                            .map(String::from)
                            .collect(),
                        None => Some(cell.trim())
                            .filter(|l| !l.is_empty())
                            .map(|l| vec![l.to_string()])
                            .unwrap_or_default(),
                    }
                }
            };

            if labels.is_empty() {
                if self.config.strict_grouping {
                    return Err(malformed(
                        path,
                        format!("line {}: no '{}' value for '{}'", line, columns.key, id),
                    ));
                }
                ungrouped += 1;
                mapping.ensure(&id);
                continue;
            }

            for label in labels {
                mapping.insert(&id, GoTerm::new(label, columns.key.as_str()));
            }
        }

        debug!(
            "{:?}: {} rows, {} without identifier, {} without '{}' value",
            path, rows, skipped, ungrouped, columns.key
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn labels(mapping: &AnnotationMapping, id: &str) -> Vec<String> {
        mapping
            .terms(id)
            .map(|t| t.iter().map(|t| t.label.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_last_column_grouping_from_mart_export() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "mart.txt",
            "Gene stable ID\tTranscript stable ID\tGOSlim GOA Accession(s)\n\
             G1\tT1\tGO:0008150\n\
             G1\tT1\tGO:0003674\n\
             G2\tT2\t\n\
             G3\tT3\tGO:0008150\n",
        );

        let config = AnnotationConfig {
            id_columns: vec!["Gene stable ID".into(), "Transcript stable ID".into()],
            ..Default::default()
        };
        let mapping = AnnotationLoader::new(config).load(&[path]).unwrap();

        assert_eq!(labels(&mapping, "G1|T1"), vec!["GO:0008150", "GO:0003674"]);
        assert!(labels(&mapping, "G2|T2").is_empty());
        assert_eq!(mapping.len(), 3);
        let term = mapping.terms("G3|T3").unwrap().first().unwrap();
        assert_eq!(term.key, "GOSlim GOA Accession(s)");
    }

    #[test]
    fn test_missing_column_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "go.csv", "id,term\nA,GO:1\n");
        let config = AnnotationConfig {
            grouping: GroupingKey::Column("GO term accession".into()),
            ..Default::default()
        };

        let err = AnnotationLoader::new(config).load(&[path]).unwrap_err();
        match err {
            MashtError::MalformedAnnotation { reason, .. } => {
                assert!(reason.contains("GO term accession"))
            }
            other => panic!("Expected MalformedAnnotation, got {:?}", other),
        }
    }

    #[test]
    fn test_strict_grouping_rejects_empty_value() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "go.csv", "id,term\nA,GO:1\nB,\n");
        let config = AnnotationConfig {
            strict_grouping: true,
            ..Default::default()
        };
        assert!(matches!(
            AnnotationLoader::new(config).load(&[path]),
            Err(MashtError::MalformedAnnotation { .. })
        ));
    }

    #[test]
    fn test_file_stem_grouping_across_files() {
        let dir = TempDir::new().unwrap();
        let first = write(&dir, "GO_0008150.csv", "id\nA\nB\n");
        let second = write(&dir, "GO_0003674.csv", "id\nB\n");
        let config = AnnotationConfig {
            grouping: GroupingKey::FileStem,
            ..Default::default()
        };

        let mapping = AnnotationLoader::new(config).load(&[first, second]).unwrap();
        assert_eq!(labels(&mapping, "A"), vec!["GO_0008150"]);
        assert_eq!(labels(&mapping, "B"), vec!["GO_0008150", "GO_0003674"]);
    }

    #[test]
    fn test_value_separator_and_short_rows() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "go.tsv", "id\tterms\nA\tGO:1; GO:2;\nB\n");
        let config = AnnotationConfig {
            grouping: GroupingKey::Column("terms".into()),
            value_separator: Some(';'),
            ..Default::default()
        };

        let mapping = AnnotationLoader::new(config).load(&[path]).unwrap();
        assert_eq!(labels(&mapping, "A"), vec!["GO:1", "GO:2"]);
        assert!(!mapping.contains("B"));
    }
}
