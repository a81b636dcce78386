//! Platform-conditional instruction text.

use std::{borrow::Cow, fmt};

use thiserror::Error;
use trainsh_core::{EXIT_STATUS_VAR, Platform};

/// A capability the dialect has no instruction for.
#[derive(Debug, Error)]
pub enum DialectError {
    #[error("{operation} is not supported on {dialect} targets")]
    Unsupported {
        operation: &'static str,
        dialect: ShellDialect,
    },
}

/// Shell flavor the session phrases its synthetic instructions in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellDialect {
    Posix,
    PowerShell,
}

impl fmt::Display for ShellDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Posix => f.write_str("POSIX"),
            Self::PowerShell => f.write_str("PowerShell"),
        }
    }
}

impl ShellDialect {
    /// Pick the dialect for a connected platform.
    #[must_use]
    pub const fn for_platform(platform: &Platform) -> Self {
        if platform.is_windows_like() {
            Self::PowerShell
        } else {
            Self::Posix
        }
    }

    /// Instruction that does nothing.
    #[must_use]
    pub const fn noop(self) -> &'static str {
        "#"
    }

    #[must_use]
    pub const fn query_host(self) -> &'static str {
        match self {
            // `hostname` is not installed on every minimal image
            Self::Posix => "uname -n",
            Self::PowerShell => "hostname",
        }
    }

    #[must_use]
    pub const fn query_working_directory(self) -> &'static str {
        match self {
            Self::Posix => "pwd",
            Self::PowerShell => "(Get-Location).Path",
        }
    }

    #[must_use]
    pub fn set_working_directory(self, path: &str) -> String {
        match self {
            Self::Posix => {
                // try_quote only fails on NUL bytes, which no `pwd` prints
                let quoted = shlex::try_quote(path).unwrap_or(Cow::Borrowed(path));
                format!("cd {quoted}")
            }
            Self::PowerShell => format!("Set-Location '{}'", path.replace('\'', "''")),
        }
    }

    /// Save the status of the instruction that just ran.
    #[must_use]
    pub fn capture_exit_status(self) -> String {
        match self {
            Self::Posix => format!("export {EXIT_STATUS_VAR}=$?"),
            Self::PowerShell => format!("${EXIT_STATUS_VAR}=$LastExitCode"),
        }
    }

    #[must_use]
    pub fn query_exit_status(self) -> String {
        format!("echo ${EXIT_STATUS_VAR}")
    }

    /// Instruction listing the environment in a replayable form.
    ///
    /// # Errors
    /// Returns `Unsupported` for PowerShell targets.
    pub const fn query_environment(self) -> Result<&'static str, DialectError> {
        match self {
            Self::Posix => Ok("export"),
            Self::PowerShell => Err(DialectError::Unsupported {
                operation: "environment capture",
                dialect: self,
            }),
        }
    }

    /// Instruction re-establishing a snapshot taken with `query_environment`.
    ///
    /// # Errors
    /// Returns `Unsupported` for PowerShell targets.
    pub fn restore_environment(self, snapshot: &str) -> Result<String, DialectError> {
        match self {
            Self::Posix => Ok(snapshot.to_string()),
            Self::PowerShell => Err(DialectError::Unsupported {
                operation: "environment restore",
                dialect: self,
            }),
        }
    }
}
