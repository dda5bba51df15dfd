use crate::annotation::{write_term_lists, GroupingKey};
use crate::core::config::AnnotationConfig;
use crate::utils::parallel::build_worker_pool;
use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct GoSlimArgs {
    /// GO mart export (tab-separated unless it ends in .csv)
    #[arg(value_name = "MART")]
    pub mart: PathBuf,

    /// Output directory; lists are written to <DIR>/go_csvs/
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output: PathBuf,

    /// Grouping column name, or `@last` for the last column
    #[arg(long, value_name = "KEY", default_value = "@last")]
    pub grouping: GroupingKey,

    /// Field delimiter of the mart export
    #[arg(long)]
    pub delimiter: Option<char>,

    /// Number of threads (passed from global)
    #[arg(skip)]
    pub threads: usize,
}

pub fn run(args: GoSlimArgs) -> Result<()> {
    let config = AnnotationConfig {
        grouping: args.grouping.clone(),
        delimiter: args.delimiter,
        ..Default::default()
    };
    let pool = build_worker_pool(args.threads).context("Failed to build worker pool")?;
    let lists = pool.install(|| write_term_lists(&args.mart, &args.output, &config))?;

    println!(
        "{} Wrote {} term lists from {:?}",
        "✓".green().bold(),
        lists.len(),
        args.mart
    );
    for path in &lists {
        tracing::debug!("{}", path.display());
    }
    Ok(())
}
