//! Core traits for transports and their connections.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::TargetDescriptor;

/// Platform family of a connected target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformFamily {
    /// POSIX-like shells (`sh`, `bash`, ...).
    Unix,
    /// PowerShell on Windows-like targets.
    Windows,
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unix => "unix",
            Self::Windows => "windows",
        })
    }
}

/// Platform descriptor reported by a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Platform family, decides which instruction dialect is used.
    pub family: PlatformFamily,
    /// Operating system name, e.g. `Linux`.
    pub name: String,
    /// Operating system release.
    pub release: String,
    /// CPU architecture.
    pub arch: String,
}

impl Platform {
    /// Create a descriptor for the given family with unknown details.
    #[must_use]
    pub fn new(family: PlatformFamily) -> Self {
        Self {
            family,
            name: "unknown".to_string(),
            release: "unknown".to_string(),
            arch: "unknown".to_string(),
        }
    }

    /// Whether instructions must be phrased for PowerShell.
    #[must_use]
    pub const fn is_windows_like(&self) -> bool {
        matches!(self.family, PlatformFamily::Windows)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.name, self.release, self.arch)
    }
}

/// Combined result of one script execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit status as reported by the transport, i.e. of the last instruction.
    pub exit_status: i32,
}

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No transport found for scheme: {0}")]
    PluginNotFound(String),
    #[error("Invalid target: {0}")]
    InvalidTarget(String),
    #[error("Connection failed: {0}")]
    ConnectFailed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Operation not supported by this transport: {0}")]
    Unsupported(&'static str),
    #[error("Remote command failed: {0}")]
    CommandFailed(String),
}

/// An open connection to a target.
///
/// Each `run_command` call is independent: no shell process, working
/// directory or environment survives between calls.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a whole script as one unit.
    async fn run_command(&self, script: &str) -> Result<CommandOutput, TransportError>;

    /// Platform of the connected target.
    fn platform(&self) -> &Platform;

    /// Release the connection.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Read a remote file.
    async fn read_file(&self, _path: &str) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::Unsupported("read_file"))
    }

    /// Replace the content of a remote file.
    async fn write_file(&self, _path: &str, _content: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("write_file"))
    }
}

/// A connection factory for one URL scheme.
#[async_trait]
pub trait Transport: Send + Sync {
    /// URL scheme this transport handles, e.g. `ssh`.
    fn scheme(&self) -> &'static str;

    /// Open a connection to the target.
    async fn connect(&self, target: &TargetDescriptor)
    -> Result<Box<dyn Connection>, TransportError>;
}
