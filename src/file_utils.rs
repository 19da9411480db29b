//! Filesystem helpers shared by the preprocessors and the deployer.

use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Reads a file to a string, tolerating a UTF-8 byte-order mark.
pub fn read_file(path: &Path) -> io::Result<String> {
    let content = fs::read_to_string(path)?;
    Ok(content.strip_prefix('\u{feff}').unwrap_or(&content).to_string())
}

/// Writes `content` to `path`, creating parent directories as needed.
pub fn write_file(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    debug!(path = %path.display(), bytes = content.len(), "Wrote file");
    Ok(())
}

/// Copies `src` to `dst`, creating parent directories as needed.
pub fn copy_file(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dst)?;
    debug!(src = %src.display(), dst = %dst.display(), "Copied file");
    Ok(())
}

/// Copies `src` to `dst` only when `dst` does not exist yet.
/// Returns whether a copy took place.
pub fn copy_if_missing(src: &Path, dst: &Path) -> io::Result<bool> {
    if dst.exists() {
        debug!(dst = %dst.display(), "Destination exists, not clobbering");
        return Ok(false);
    }
    copy_file(src, dst)?;
    Ok(true)
}

/// Sorted names of the sub-directories directly under `dir`.
/// Missing directories read as empty.
pub fn sorted_dir_names(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                if let Ok(name) = entry.file_name().into_string() {
                    names.push(name);
                }
            }
        }
    }
    names.sort();
    names
}

/// Sorted names of the plain files directly under `dir`.
/// Missing directories read as empty.
pub fn sorted_file_names(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            if entry.path().is_file() {
                if let Ok(name) = entry.file_name().into_string() {
                    names.push(name);
                }
            }
        }
    }
    names.sort();
    names
}

/// Sorted names of files under `dir` carrying the given extension (no dot).
pub fn sorted_files_with_ext(dir: &Path, ext: &str) -> Vec<String> {
    sorted_file_names(dir)
        .into_iter()
        .filter(|name| Path::new(name).extension().and_then(|e| e.to_str()) == Some(ext))
        .collect()
}
