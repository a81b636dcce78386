//! Command history kept across runs in `~/.trainsh/history`.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::config::USER_CONF_DIR;

/// Default history location, if a home directory is known.
#[must_use]
pub fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(USER_CONF_DIR).join("history"))
}

/// Read saved entries, oldest first. A missing file is an empty history.
///
/// # Errors
/// Returns an error if the file exists but cannot be read.
pub fn load(path: &Path) -> Result<Vec<String>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read history {}", path.display()));
        }
    };
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Replace the saved history, creating the directory if needed.
///
/// # Errors
/// Returns an error if the directory or file cannot be written.
pub fn save(path: &Path, entries: &[String]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let mut contents = entries.join("\n");
    contents.push('\n');
    fs::write(path, contents)
        .with_context(|| format!("Failed to write history {}", path.display()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("history")).unwrap().is_empty());
    }

    #[test]
    fn test_save_creates_directory_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(USER_CONF_DIR).join("history");
        let entries = vec!["cd /tmp".to_string(), "!sessions".to_string()];

        save(&path, &entries).unwrap();
        assert_eq!(load(&path).unwrap(), entries);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history");
        fs::write(&path, "ls\n\n  pwd  \n").unwrap();
        assert_eq!(load(&path).unwrap(), vec!["ls", "pwd"]);
    }
}
