use crate::annotation::GroupingKey;
use crate::cli::DegradedRun;
use crate::core::config::{load_config, save_config, Config, HitSelection, MultiLabel, RoutingKey};
use crate::core::orchestrator::{clear_scratch, Orchestrator, PartitionRequest, RunReport};
use crate::utils::files::resolve_all;
use crate::RunStatus;
use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Tabular BLAST hit files: files, directories or `.txt` lists of paths
    #[arg(short = 'b', long = "hits", value_name = "PATH", required = true, num_args = 1..)]
    pub hits: Vec<PathBuf>,

    /// FASTA files holding the query sequences, paired with hit files by name
    #[arg(short = 's', long = "sequences", value_name = "PATH", num_args = 1..)]
    pub sequences: Vec<PathBuf>,

    /// Annotation tables mapping identifiers to terms
    #[arg(short = 'g', long = "annotations", value_name = "PATH", required = true, num_args = 1..)]
    pub annotations: Vec<PathBuf>,

    /// Output root for the partition directories
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Grouping column name, `@last` for the last column or `@file` for the file stem
    #[arg(long, value_name = "KEY")]
    pub grouping: Option<GroupingKey>,

    /// Identifier column; repeat to join several columns with '|'
    #[arg(long = "id-column", value_name = "COLUMN")]
    pub id_columns: Vec<String>,

    /// Hit identifier looked up in the annotations (subject or query)
    #[arg(long)]
    pub routing: Option<RoutingKey>,

    /// Route only the hits with the highest percent identity of each query
    #[arg(long)]
    pub best_identity: bool,

    /// Route identifiers with several labels into their first label only
    #[arg(long)]
    pub primary_label: bool,

    /// Identifiers per chunk (default: one chunk per worker)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Directory for worker scratch files
    #[arg(long, value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Fail on annotation rows without a grouping value
    #[arg(long)]
    pub strict: bool,

    /// Annotation field delimiter (default: ',' for .csv, tab otherwise)
    #[arg(long)]
    pub delimiter: Option<char>,

    /// Separator between several labels inside one annotation field
    #[arg(long)]
    pub value_separator: Option<char>,

    /// Show a progress bar
    #[arg(long)]
    pub progress: bool,

    /// Do not write run_summary.json
    #[arg(long)]
    pub no_summary: bool,

    /// Remove scratch left by an earlier run before starting
    #[arg(long)]
    pub clean_scratch: bool,

    /// Write the effective configuration to this file
    #[arg(long, value_name = "FILE")]
    pub save_config: Option<PathBuf>,

    /// Number of threads (passed from global)
    #[arg(skip)]
    pub threads: usize,

    /// Per-chunk reporting (passed from global)
    #[arg(skip)]
    pub verbose: bool,
}

impl SplitArgs {
    /// Configuration file values with the command-line flags applied on top
    pub fn to_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("Failed to load configuration {:?}", path))?,
            None => Config::default(),
        };

        if self.threads > 0 {
            config.partition.n_jobs = self.threads;
        }
        if self.chunk_size.is_some() {
            config.partition.chunk_size = self.chunk_size;
        }
        if let Some(routing) = self.routing {
            config.partition.routing = routing;
        }
        if self.best_identity {
            config.partition.hit_selection = HitSelection::BestIdentity;
        }
        if self.primary_label {
            config.partition.multi_label = MultiLabel::Primary;
        }

        if let Some(grouping) = &self.grouping {
            config.annotation.grouping = grouping.clone();
        }
        if !self.id_columns.is_empty() {
            config.annotation.id_columns = self.id_columns.clone();
        }
        if self.delimiter.is_some() {
            config.annotation.delimiter = self.delimiter;
        }
        if self.value_separator.is_some() {
            config.annotation.value_separator = self.value_separator;
        }
        if self.strict {
            config.annotation.strict_grouping = true;
        }

        if let Some(output) = &self.output {
            config.output.output_root = output.clone();
        }
        if self.scratch_dir.is_some() {
            config.output.scratch_dir = self.scratch_dir.clone();
        }
        if self.verbose {
            config.output.verbose = true;
        }
        if self.progress {
            config.output.progress = true;
        }
        if self.no_summary {
            config.output.write_summary = false;
        }

        config.validate()?;
        Ok(config)
    }
}

fn print_report(report: &RunReport) {
    let totals = &report.totals;
    println!(
        "{} {} hits and {} sequences into {} partitions ({} chunks, {} workers)",
        "✓".green().bold(),
        totals.hits_processed,
        totals.sequences_processed,
        report.partitions.len(),
        report.chunks,
        report.workers
    );
    if totals.hits_unassigned + totals.sequences_unassigned > 0 {
        println!(
            "  {} hits and {} sequences unassigned",
            totals.hits_unassigned, totals.sequences_unassigned
        );
    }
    if totals.hits_filtered > 0 {
        println!("  {} hits below the best identity of their query", totals.hits_filtered);
    }
    if totals.parse_errors > 0 {
        println!("  {} {} malformed records skipped", "!".yellow(), totals.parse_errors);
    }
    if totals.missing_sequences > 0 {
        println!(
            "  {} {} queries without a sequence record",
            "!".yellow(),
            totals.missing_sequences
        );
    }
    if let RunStatus::Degraded { failed } = &report.status {
        for failure in failed {
            println!(
                "  {} chunk {} [{}..{}): {}",
                "✗".red(),
                failure.chunk,
                failure.start,
                failure.end,
                failure.cause
            );
        }
    }
}

pub fn run(args: SplitArgs, cancel: Arc<AtomicBool>) -> Result<()> {
    let config = args.to_config()?;
    if let Some(path) = &args.save_config {
        save_config(path, &config)?;
        info!("Saved configuration to {:?}", path);
    }
    if args.clean_scratch {
        clear_scratch(&config.output.scratch_root())?;
    }

    let request = PartitionRequest {
        hit_files: resolve_all(&args.hits)?,
        sequence_files: resolve_all(&args.sequences)?,
        annotation_files: resolve_all(&args.annotations)?,
    };
    info!(
        "{} hit files, {} sequence files, {} annotation files",
        request.hit_files.len(),
        request.sequence_files.len(),
        request.annotation_files.len()
    );

    let orchestrator = Orchestrator::new(config)?.with_cancel_flag(cancel);
    let report = orchestrator.run(&request)?;
    print_report(&report);

    match &report.status {
        RunStatus::Complete => Ok(()),
        RunStatus::Degraded { failed } => Err(DegradedRun {
            failed: failed.len(),
            chunks: report.chunks,
            output: report.output_root.clone(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    fn split_args(extra: &[&str]) -> SplitArgs {
        let mut argv = vec!["masht", "split", "--hits", "h.blast", "--annotations", "go.csv"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Split(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("masht.toml");
        fs::write(
            &path,
            "[partition]\nn_jobs = 2\nchunk_size = 50\n\n[annotation]\nid_columns = [\"Gene stable ID\"]\n",
        )
        .unwrap();

        let config = split_args(&[
            "-c",
            path.to_str().unwrap(),
            "--chunk-size",
            "10",
            "--routing",
            "query",
            "--primary-label",
            "--grouping",
            "GOSlim GOA Accession(s)",
            "-o",
            "out",
        ])
        .to_config()
        .unwrap();

        assert_eq!(config.partition.n_jobs, 2);
        assert_eq!(config.partition.chunk_size, Some(10));
        assert_eq!(config.partition.routing, RoutingKey::Query);
        assert_eq!(config.partition.multi_label, MultiLabel::Primary);
        assert_eq!(config.annotation.id_columns, vec!["Gene stable ID".to_string()]);
        assert_eq!(
            config.annotation.grouping,
            GroupingKey::Column("GOSlim GOA Accession(s)".to_string())
        );
        assert_eq!(config.output.output_root, PathBuf::from("out"));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(split_args(&["--chunk-size", "0"]).to_config().is_err());
    }
}
