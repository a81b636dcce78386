//! Shell program selection and executable lookup.

use std::path::{Path, PathBuf};

use trainsh_core::TransportError;

/// Program and arguments that make a shell read its script from stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdinShell {
    pub program: String,
    pub args: Vec<String>,
}

impl StdinShell {
    /// POSIX `sh` reading from stdin.
    #[must_use]
    pub fn posix() -> Self {
        Self {
            program: "sh".to_string(),
            args: vec!["-s".to_string()],
        }
    }

    /// PowerShell reading commands from stdin.
    #[must_use]
    pub fn powershell() -> Self {
        Self {
            program: "powershell".to_string(),
            args: ["-NoProfile", "-NonInteractive", "-Command", "-"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    /// Shell for scripts run on this machine.
    #[must_use]
    pub fn local() -> Self {
        if cfg!(windows) {
            Self::powershell()
        } else {
            Self::posix()
        }
    }

    /// The shell as trailing arguments of a wrapper command (`docker exec`, `ssh`).
    #[must_use]
    pub fn into_args(self) -> Vec<String> {
        std::iter::once(self.program).chain(self.args).collect()
    }
}

/// Resolve an executable by name.
///
/// The search order is:
/// 1. Explicit absolute paths.
/// 2. The current process PATH via `which`.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() && path.is_file() {
        return Some(path.to_path_buf());
    }

    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}

/// Like `resolve_executable_path`, failing with `ConnectFailed`.
///
/// # Errors
/// Returns `ConnectFailed` if the executable is not installed.
pub async fn require_executable(executable: &str) -> Result<PathBuf, TransportError> {
    let resolved = resolve_executable_path(executable)
        .await
        .ok_or_else(|| TransportError::ConnectFailed(format!("Executable not found: {executable}")))?;
    tracing::debug!(executable, path = %resolved.display(), "Resolved executable");
    Ok(resolved)
}

/// Quote a single word for a POSIX shell.
#[must_use]
pub fn quote(word: &str) -> String {
    // try_quote only rejects NUL bytes, which cannot appear in paths anyway
    shlex::try_quote(word).map_or_else(|_| format!("'{word}'"), |q| q.into_owned())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_into_args() {
        assert_eq!(StdinShell::posix().into_args(), vec!["sh", "-s"]);
        assert_eq!(
            StdinShell::powershell().into_args(),
            vec!["powershell", "-NoProfile", "-NonInteractive", "-Command", "-"]
        );
    }

    #[tokio::test]
    async fn test_resolve_rejects_blank() {
        assert!(resolve_executable_path("  ").await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolves_sh() {
        assert!(resolve_executable_path("sh").await.is_some());
        assert!(
            require_executable("definitely-not-installed-trainsh")
                .await
                .is_err()
        );
    }

    #[test]
    fn test_quote_round_trips() {
        let quoted = quote("/srv/with space/it's");
        assert_eq!(
            shlex::split(&quoted).unwrap(),
            vec!["/srv/with space/it's"]
        );
    }
}
