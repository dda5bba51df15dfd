use super::run_command;
use super::traits::SearchTool;
use crate::utils::files::file_stem;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BlastProgram {
    #[default]
    Blastn,
    Blastp,
    Blastx,
    Tblastn,
    Tblastx,
}

impl BlastProgram {
    pub fn binary(&self) -> &'static str {
        match self {
            BlastProgram::Blastn => "blastn",
            BlastProgram::Blastp => "blastp",
            BlastProgram::Blastx => "blastx",
            BlastProgram::Tblastn => "tblastn",
            BlastProgram::Tblastx => "tblastx",
        }
    }

    /// Database type the program searches against
    pub fn db_type(&self) -> &'static str {
        match self {
            BlastProgram::Blastn | BlastProgram::Tblastn | BlastProgram::Tblastx => "nucl",
            BlastProgram::Blastp | BlastProgram::Blastx => "prot",
        }
    }
}

impl fmt::Display for BlastProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

impl std::str::FromStr for BlastProgram {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "blastn" => Ok(BlastProgram::Blastn),
            "blastp" => Ok(BlastProgram::Blastp),
            "blastx" => Ok(BlastProgram::Blastx),
            "tblastn" => Ok(BlastProgram::Tblastn),
            "tblastx" => Ok(BlastProgram::Tblastx),
            _ => anyhow::bail!("Unknown BLAST program: {}", s),
        }
    }
}

/// BLAST+ invoked as child processes
#[derive(Debug, Clone)]
pub struct BlastSearch {
    /// Directory holding the BLAST+ binaries; `None` searches `PATH`
    pub bin_dir: Option<PathBuf>,
    pub program: BlastProgram,
    pub evalue: f64,
    pub threads: usize,
    pub parse_seqids: bool,
}

impl Default for BlastSearch {
    fn default() -> Self {
        Self {
            bin_dir: None,
            program: BlastProgram::default(),
            evalue: 1e-49,
            threads: 4,
            parse_seqids: false,
        }
    }
}

impl BlastSearch {
    pub fn new(program: BlastProgram) -> Self {
        Self {
            program,
            ..Default::default()
        }
    }

    fn binary(&self, name: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    pub(crate) fn index_command(&self, fasta: &Path, name: &str) -> Command {
        let mut cmd = Command::new(self.binary("makeblastdb"));
        cmd.arg("-in")
            .arg(fasta.file_name().unwrap_or(fasta.as_os_str()))
            .arg("-dbtype")
            .arg(self.program.db_type())
            .arg("-title")
            .arg(name)
            .arg("-out")
            .arg(name)
            .arg("-blastdb_version")
            .arg("5");
        if self.parse_seqids {
            cmd.arg("-parse_seqids");
        }
        if let Some(parent) = fasta.parent().filter(|p| !p.as_os_str().is_empty()) {
            cmd.current_dir(parent);
        }
        cmd
    }

    pub(crate) fn search_command(&self, query: &Path, db: &str, db_dir: &Path, out: &Path) -> Command {
        let mut cmd = Command::new(self.binary(self.program.binary()));
        cmd.arg("-query")
            .arg(query)
            .arg("-db")
            .arg(db)
            .arg("-out")
            .arg(out)
            .arg("-evalue")
            .arg(format!("{:e}", self.evalue))
            .arg("-num_threads")
            .arg(self.threads.to_string())
            .arg("-outfmt")
            .arg("6")
            .current_dir(db_dir);
        cmd
    }
}

impl SearchTool for BlastSearch {
    fn name(&self) -> &str {
        self.program.binary()
    }

    fn create_index(&self, fasta: &Path, name: &str) -> Result<PathBuf> {
        info!("Creating BLAST database '{}' from {:?}", name, fasta);
        let output = run_command(&mut self.index_command(fasta, name), "makeblastdb")?;
        debug!("{}", String::from_utf8_lossy(&output.stdout).trim());

        Ok(match fasta.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        })
    }

    fn run(&self, query: &Path, db: &str, db_dir: &Path, out_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create output directory {:?}", out_dir))?;
        // The search runs inside the database directory.
        let query = fs::canonicalize(query)
            .with_context(|| format!("Query file {:?} not found", query))?;
        let out = fs::canonicalize(out_dir)?.join(format!("{}.blast", file_stem(&query)));

        info!("Searching {:?} against '{}' with {}", query, db, self.program);
        run_command(&mut self.search_command(&query, db, db_dir, &out), self.program.binary())?;
        Ok(out)
    }

    fn verify_installation(&self) -> Result<()> {
        run_command(
            Command::new(self.binary(self.program.binary())).arg("-version"),
            self.program.binary(),
        )
        .map(|_| ())
    }
}
