use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Expand an input argument into the files it names.
///
/// - a directory yields its regular files, sorted by name
/// - a `.txt` or `.list` file yields the whitespace-separated paths it lists
/// - any other file is the single input
pub fn resolve_inputs(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_dir() {
        let mut files = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("Failed to list {:?}", path))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        return Ok(files);
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some("txt") | Some("list") => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read input list {:?}", path))?;
            Ok(contents.split_whitespace().map(PathBuf::from).collect())
        }
        _ => {
            if !path.exists() {
                anyhow::bail!("Input {:?} does not exist", path);
            }
            Ok(vec![path.to_path_buf()])
        }
    }
}

/// Resolve several arguments, keeping argument order
pub fn resolve_all(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        files.extend(resolve_inputs(path)?);
    }
    Ok(files)
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}
