//! Run configuration
//!
//! Every behavioral switch is a tagged enum resolved once when the
//! configuration is built. Workers receive the resolved values and never
//! consult flags per record.

use crate::annotation::GroupingKey;
use crate::MashtError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub partition: PartitionConfig,
    #[serde(default)]
    pub annotation: AnnotationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Which identifier of a hit is looked up in the annotation mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoutingKey {
    /// The matched reference entity (`sseqid`)
    #[default]
    Subject,
    /// The query sequence (`qseqid`)
    Query,
}

impl std::str::FromStr for RoutingKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "subject" | "sseqid" => Ok(RoutingKey::Subject),
            "query" | "qseqid" => Ok(RoutingKey::Query),
            _ => Err(format!("Unknown routing key: {}", s)),
        }
    }
}

/// Which hits of a query are routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HitSelection {
    #[default]
    All,
    /// Only the hits sharing the highest percent identity of their query
    BestIdentity,
}

/// How an identifier carrying several labels of the active grouping key is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MultiLabel {
    /// Into every label's partition
    #[default]
    Duplicate,
    /// Into the partition of the first label seen for the identifier
    Primary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartitionConfig {
    /// Worker count (0 = all available cores)
    #[serde(default = "default_n_jobs")]
    pub n_jobs: usize,
    /// Target number of identifiers per chunk; `None` means one chunk per worker
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub routing: RoutingKey,
    #[serde(default)]
    pub hit_selection: HitSelection,
    #[serde(default)]
    pub multi_label: MultiLabel,
    /// Bytes buffered per partial file before appending to disk
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnnotationConfig {
    /// Columns joined with `|` to form the identifier; empty means the first column
    #[serde(default = "default_id_columns")]
    pub id_columns: Vec<String>,
    #[serde(default)]
    pub grouping: GroupingKey,
    /// Field delimiter; inferred from the extension when unset
    #[serde(default)]
    pub delimiter: Option<char>,
    /// Splits one cell into several labels
    #[serde(default)]
    pub value_separator: Option<char>,
    /// Treat a row without a grouping value as malformed instead of unassigned
    #[serde(default)]
    pub strict_grouping: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    /// Worker scratch location; defaults to a hidden directory under the output root
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub progress: bool,
    #[serde(default = "default_write_summary")]
    pub write_summary: bool,
}

fn default_n_jobs() -> usize {
    0
}

fn default_flush_threshold() -> usize {
    64 * 1024
}

fn default_id_columns() -> Vec<String> {
    Vec::new()
}

fn default_output_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_write_summary() -> bool {
    true
}

pub const SCRATCH_DIR_NAME: &str = ".masht_partials";

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            n_jobs: default_n_jobs(),
            chunk_size: None,
            routing: RoutingKey::default(),
            hit_selection: HitSelection::default(),
            multi_label: MultiLabel::default(),
            flush_threshold: default_flush_threshold(),
        }
    }
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            id_columns: default_id_columns(),
            grouping: GroupingKey::default(),
            delimiter: None,
            value_separator: None,
            strict_grouping: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            scratch_dir: None,
            verbose: false,
            progress: false,
            write_summary: default_write_summary(),
        }
    }
}

impl PartitionConfig {
    /// Worker count with 0 resolved to the number of cores
    pub fn effective_jobs(&self) -> usize {
        if self.n_jobs == 0 {
            num_cpus::get()
        } else {
            self.n_jobs
        }
    }
}

impl OutputConfig {
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| self.output_root.join(SCRATCH_DIR_NAME))
    }
}

impl AnnotationConfig {
    /// Delimiters are single bytes; reject characters that are not
    pub fn validate(&self) -> Result<(), MashtError> {
        for (name, value) in [
            ("delimiter", self.delimiter),
            ("value_separator", self.value_separator),
        ] {
            if let Some(c) = value.filter(|c| !c.is_ascii()) {
                return Err(MashtError::Config(format!(
                    "{} must be an ASCII character, got '{}'",
                    name, c
                )));
            }
        }
        Ok(())
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), MashtError> {
        if self.partition.chunk_size == Some(0) {
            return Err(MashtError::Config("chunk_size must be greater than 0".to_string()));
        }
        if self.partition.flush_threshold == 0 {
            return Err(MashtError::Config(
                "flush_threshold must be greater than 0".to_string(),
            ));
        }
        if let GroupingKey::Column(name) = &self.annotation.grouping {
            if name.trim().is_empty() {
                return Err(MashtError::Config("grouping column name is empty".to_string()));
            }
        }
        self.annotation.validate()
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, MashtError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| MashtError::Config(format!("Failed to parse config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(path: P, config: &Config) -> Result<(), MashtError> {
    let contents = toml::to_string_pretty(config)
        .map_err(|e| MashtError::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [partition]
            n_jobs = 4
            hit_selection = "best_identity"

            [annotation]
            id_columns = ["Gene stable ID", "Transcript stable ID"]
            grouping = { kind = "column", column = "GOSlim GOA Accession(s)" }
            "#,
        )
        .unwrap();

        assert_eq!(config.partition.n_jobs, 4);
        assert_eq!(config.partition.hit_selection, HitSelection::BestIdentity);
        assert_eq!(config.partition.routing, RoutingKey::Subject);
        assert_eq!(config.partition.flush_threshold, 64 * 1024);
        assert_eq!(
            config.annotation.grouping,
            GroupingKey::Column("GOSlim GOA Accession(s)".to_string())
        );
        assert_eq!(config.output.output_root, PathBuf::from("."));
        assert!(config.output.write_summary);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("masht.toml");

        let mut config = Config::default();
        config.partition.chunk_size = Some(500);
        config.partition.multi_label = MultiLabel::Primary;
        config.annotation.grouping = GroupingKey::FileStem;
        config.annotation.value_separator = Some(';');
        save_config(&path, &config).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let mut config = Config::default();
        config.partition.chunk_size = Some(0);
        assert!(matches!(config.validate(), Err(MashtError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_non_ascii_delimiter() {
        let mut config = Config::default();
        config.annotation.delimiter = Some('§');
        assert!(matches!(config.validate(), Err(MashtError::Config(ref m)) if m.contains("delimiter")));

        config.annotation.delimiter = Some(';');
        config.annotation.value_separator = Some('→');
        assert!(matches!(config.validate(), Err(MashtError::Config(_))));

        config.annotation.value_separator = Some('|');
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scratch_root_defaults_under_output() {
        let output = OutputConfig {
            output_root: PathBuf::from("/data/out"),
            ..Default::default()
        };
        assert_eq!(output.scratch_root(), PathBuf::from("/data/out/.masht_partials"));
    }

    #[test]
    fn test_routing_key_from_str() {
        assert_eq!("sseqid".parse::<RoutingKey>(), Ok(RoutingKey::Subject));
        assert_eq!("Query".parse::<RoutingKey>(), Ok(RoutingKey::Query));
        assert!("evalue".parse::<RoutingKey>().is_err());
    }
}
