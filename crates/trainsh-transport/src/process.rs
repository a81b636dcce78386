//! Connections that pipe each script into a fresh child process.

use std::{path::PathBuf, process::Stdio};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use tokio::{io::AsyncWriteExt, process::Command};
use trainsh_core::{CommandOutput, Connection, Platform, PlatformFamily, TransportError};

use crate::shell::quote;

/// OS name, version and CPU architecture, one per line.
const POWERSHELL_PROBE: &str = "[Environment]::OSVersion.Platform.ToString()\n\
[Environment]::OSVersion.Version.ToString()\n\
$env:PROCESSOR_ARCHITECTURE\n";

/// Build a platform from probe output lines: name, release, arch.
fn platform_from_probe(family: PlatformFamily, stdout: &str) -> Platform {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
    let mut next = || lines.next().unwrap_or("unknown").to_string();
    Platform {
        family,
        name: next(),
        release: next(),
        arch: next(),
    }
}

/// Runs `program args...` once per script, with the script on stdin.
#[derive(Debug, Clone)]
pub struct ProcessConnection {
    program: PathBuf,
    args: Vec<String>,
    platform: Platform,
}

impl ProcessConnection {
    /// Create a connection with a placeholder platform; call `detect_platform`
    /// to fill it in.
    #[must_use]
    pub fn new(program: PathBuf, args: Vec<String>, family: PlatformFamily) -> Self {
        Self {
            program,
            args,
            platform: Platform::new(family),
        }
    }

    /// Replace the platform descriptor.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Probe a POSIX target with `uname`. Doubles as a readiness check.
    ///
    /// # Errors
    /// Returns `ConnectFailed` if the probe does not succeed.
    pub async fn detect_platform(self) -> Result<Self, TransportError> {
        self.probe(PlatformFamily::Unix, "uname -s\nuname -r\nuname -m\n")
            .await
    }

    /// Probe a PowerShell target for its OS and architecture. Doubles as a
    /// readiness check.
    ///
    /// # Errors
    /// Returns `ConnectFailed` if the probe does not succeed.
    pub async fn detect_windows_platform(self) -> Result<Self, TransportError> {
        self.probe(PlatformFamily::Windows, POWERSHELL_PROBE).await
    }

    async fn probe(mut self, family: PlatformFamily, script: &str) -> Result<Self, TransportError> {
        let output = self
            .spawn_with_stdin(script.as_bytes().to_vec())
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        if output.exit_status != 0 || output.stdout.trim().is_empty() {
            let reason = output.stderr.trim();
            return Err(TransportError::ConnectFailed(if reason.is_empty() {
                format!("Platform probe exited with {}", output.exit_status)
            } else {
                reason.to_string()
            }));
        }

        self.platform = platform_from_probe(family, &output.stdout);
        tracing::debug!(platform = %self.platform, "Detected platform");
        Ok(self)
    }

    async fn spawn_with_stdin(&self, input: Vec<u8>) -> Result<CommandOutput, TransportError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Feed stdin concurrently so a chatty script cannot fill the stdout
        // pipe while we are still writing.
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                stdin.write_all(&input).await?;
                stdin.shutdown().await
            })
        });

        let output = child.wait_with_output().await?;
        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                // The shell may exit before reading everything, e.g. on `exit`.
                Ok(Err(e)) => tracing::debug!(error = %e, "Script not fully consumed"),
                Err(e) => tracing::warn!(error = %e, "Stdin writer task failed"),
            }
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_status: output.status.code().unwrap_or(-1),
        })
    }

    fn require_posix(&self, operation: &'static str) -> Result<(), TransportError> {
        if self.platform.is_windows_like() {
            Err(TransportError::Unsupported(operation))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Connection for ProcessConnection {
    async fn run_command(&self, script: &str) -> Result<CommandOutput, TransportError> {
        let mut input = script.as_bytes().to_vec();
        input.push(b'\n');
        self.spawn_with_stdin(input).await
    }

    fn platform(&self) -> &Platform {
        &self.platform
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // Nothing persistent to tear down: every call is its own process.
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        self.require_posix("read_file")?;
        let output = self.run_command(&format!("base64 < {}", quote(path))).await?;
        if output.exit_status != 0 {
            return Err(TransportError::CommandFailed(output.stderr.trim().to_string()));
        }
        let encoded: String = output.stdout.split_whitespace().collect();
        BASE64
            .decode(encoded)
            .map_err(|e| TransportError::CommandFailed(format!("Invalid file encoding: {e}")))
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), TransportError> {
        self.require_posix("write_file")?;
        let script = format!(
            "printf '%s' '{}' | base64 -d > {}",
            BASE64.encode(content),
            quote(path)
        );
        let output = self.run_command(&script).await?;
        if output.exit_status != 0 {
            return Err(TransportError::CommandFailed(output.stderr.trim().to_string()));
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::shell::{StdinShell, require_executable};

    async fn sh() -> ProcessConnection {
        let shell = StdinShell::posix();
        let program = require_executable(&shell.program).await.unwrap();
        ProcessConnection::new(program, shell.args, PlatformFamily::Unix)
    }

    #[tokio::test]
    async fn test_runs_script_from_stdin() {
        let conn = sh().await;
        let output = conn.run_command("echo one\necho two >&2\nexit 3").await.unwrap();
        assert_eq!(output.stdout, "one\n");
        assert_eq!(output.stderr, "two\n");
        assert_eq!(output.exit_status, 3);
    }

    #[tokio::test]
    async fn test_detect_platform() {
        let conn = sh().await.detect_platform().await.unwrap();
        assert!(!conn.platform().is_windows_like());
        assert_ne!(conn.platform().name, "unknown");
    }

    #[test]
    fn test_platform_from_probe() {
        let platform =
            platform_from_probe(PlatformFamily::Windows, "Win32NT\r\n10.0.17763.0\r\nAMD64\r\n");
        assert_eq!(platform.name, "Win32NT");
        assert_eq!(platform.release, "10.0.17763.0");
        assert_eq!(platform.arch, "AMD64");
        assert!(platform.is_windows_like());

        let partial = platform_from_probe(PlatformFamily::Unix, "Linux\n");
        assert_eq!(partial.release, "unknown");
    }

    #[tokio::test]
    async fn test_windows_probe_fills_platform() {
        let program = require_executable("sh").await.unwrap();
        let args = vec![
            "-c".to_string(),
            "printf 'Win32NT\\n10.0.17763.0\\nAMD64\\n'".to_string(),
        ];
        let conn = ProcessConnection::new(program, args, PlatformFamily::Windows)
            .detect_windows_platform()
            .await
            .unwrap();
        assert_eq!(conn.platform().to_string(), "Win32NT 10.0.17763.0 (AMD64)");
    }

    #[tokio::test]
    async fn test_windows_probe_on_dead_target_fails_to_connect() {
        // A POSIX shell cannot run the PowerShell probe, like an unreachable host.
        let err = sh().await.detect_windows_platform().await.err().unwrap();
        assert!(matches!(err, TransportError::ConnectFailed(_)), "{err}");
    }

    #[tokio::test]
    async fn test_file_round_trip_through_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note with space.txt");
        let path = path.to_str().unwrap();
        let conn = sh().await;

        conn.write_file(path, b"line one\nline two\n").await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"line one\nline two\n");
        assert_eq!(conn.read_file(path).await.unwrap(), b"line one\nline two\n");
    }

    #[tokio::test]
    async fn test_missing_file_is_command_failure() {
        let conn = sh().await;
        let err = conn.read_file("/definitely/not/here").await.unwrap_err();
        assert!(matches!(err, TransportError::CommandFailed(_)));
    }

    #[tokio::test]
    async fn test_windows_platform_rejects_file_access() {
        let conn = sh()
            .await
            .with_platform(Platform::new(PlatformFamily::Windows));
        assert!(matches!(
            conn.read_file("/etc/hostname").await,
            Err(TransportError::Unsupported(_))
        ));
    }
}
