use super::run_command;
use super::traits::DistanceTool;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

pub const DISTANCE_FILE: &str = "distances.tsv";
pub const DISTANCE_HEADER: &str = "seq_A,seq_B,mash_dist,p_val,matching_hashes";
pub const SKETCH_EXTENSION: &str = "msh";

/// The `mash` binary
#[derive(Debug, Clone)]
pub struct MashTool {
    pub binary: PathBuf,
}

impl Default for MashTool {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("mash"),
        }
    }
}

/// Report name prefix: the file name up to its first dot
fn report_stem(sketch: &Path) -> String {
    sketch
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .unwrap_or_default()
        .to_string()
}

fn is_sketch(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(SKETCH_EXTENSION)
}

impl MashTool {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub(crate) fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(subcommand);
        cmd
    }

    fn stdout(&self, cmd: &mut Command, subcommand: &str) -> Result<String> {
        let output = run_command(cmd, &format!("mash {}", subcommand))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a report subcommand on every sketch, writing `<out>/<stem>_<cmd>.txt`
    fn per_sketch_report(
        &self,
        subcommand: &str,
        sketches: &[PathBuf],
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create output directory {:?}", out_dir))?;

        let mut reports = Vec::new();
        for sketch in sketches.iter().filter(|s| is_sketch(s)) {
            let text = self.stdout(self.command(subcommand).arg(sketch), subcommand)?;
            let path = out_dir.join(format!("{}_{}.txt", report_stem(sketch), subcommand));
            fs::write(&path, text).with_context(|| format!("Failed to write {:?}", path))?;
            debug!("Wrote {} report {:?}", subcommand, path);
            reports.push(path);
        }
        Ok(reports)
    }
}

impl DistanceTool for MashTool {
    fn sketch(&self, inputs: &[PathBuf], out_dir: &Path, name: &str) -> Result<PathBuf> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create output directory {:?}", out_dir))?;
        let prefix = out_dir.join(name);

        info!("Sketching {} files into {:?}", inputs.len(), prefix);
        run_command(
            self.command("sketch").args(inputs).arg("-o").arg(&prefix),
            "mash sketch",
        )?;
        Ok(prefix.with_extension(SKETCH_EXTENSION))
    }

    fn dist(&self, inputs: &[PathBuf], out_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create output directory {:?}", out_dir))?;

        info!("Calculating distances between {} files", inputs.len());
        let text = self.stdout(self.command("dist").args(inputs), "dist")?;

        let path = out_dir.join(DISTANCE_FILE);
        let mut file =
            fs::File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
        writeln!(file, "{}", DISTANCE_HEADER)?;
        file.write_all(text.as_bytes())?;
        Ok(path)
    }

    fn triangle(&self, sketches: &[PathBuf], out_dir: &Path) -> Result<Vec<PathBuf>> {
        self.per_sketch_report("triangle", sketches, out_dir)
    }

    fn bounds(&self, sketches: &[PathBuf], out_dir: &Path) -> Result<Vec<PathBuf>> {
        self.per_sketch_report("bounds", sketches, out_dir)
    }

    fn info(&self, sketch: &Path) -> Result<String> {
        self.stdout(self.command("info").arg(sketch), "info")
    }

    fn paste(&self, inputs: &[PathBuf], out_path: &Path) -> Result<PathBuf> {
        let sketches: Vec<&PathBuf> = inputs.iter().filter(|p| is_sketch(p)).collect();
        if sketches.is_empty() {
            anyhow::bail!("No .{} files to paste", SKETCH_EXTENSION);
        }
        let prefix = if is_sketch(out_path) {
            out_path.with_extension("")
        } else {
            out_path.to_path_buf()
        };

        run_command(
            self.command("paste").arg(&prefix).args(&sketches),
            "mash paste",
        )?;
        Ok(prefix.with_extension(SKETCH_EXTENSION))
    }

    fn screen(&self, sketch: &Path, queries: &[PathBuf]) -> Result<String> {
        self.stdout(self.command("screen").arg(sketch).args(queries), "screen")
    }
}
