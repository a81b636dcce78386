//! `local://` transport.

use async_trait::async_trait;
use trainsh_core::{
    CommandOutput, Connection, Platform, PlatformFamily, TargetDescriptor, Transport,
    TransportError,
};

use crate::{
    process::ProcessConnection,
    shell::{StdinShell, require_executable},
};

/// Runs scripts on this machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransport;

#[async_trait]
impl Transport for LocalTransport {
    fn scheme(&self) -> &'static str {
        "local"
    }

    async fn connect(
        &self,
        _target: &TargetDescriptor,
    ) -> Result<Box<dyn Connection>, TransportError> {
        let shell = StdinShell::local();
        let program = require_executable(&shell.program).await?;

        let inner = if cfg!(windows) {
            let platform = Platform {
                family: PlatformFamily::Windows,
                name: std::env::consts::OS.to_string(),
                release: "unknown".to_string(),
                arch: std::env::consts::ARCH.to_string(),
            };
            ProcessConnection::new(program, shell.args, PlatformFamily::Windows)
                .with_platform(platform)
        } else {
            ProcessConnection::new(program, shell.args, PlatformFamily::Unix)
                .detect_platform()
                .await?
        };

        Ok(Box::new(LocalConnection { inner }))
    }
}

/// Local connection; file access goes straight to the filesystem.
#[derive(Debug)]
pub struct LocalConnection {
    inner: ProcessConnection,
}

#[async_trait]
impl Connection for LocalConnection {
    async fn run_command(&self, script: &str) -> Result<CommandOutput, TransportError> {
        self.inner.run_command(script).await
    }

    fn platform(&self) -> &Platform {
        self.inner.platform()
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner.close().await
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        Ok(tokio::fs::read(path).await?)
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), TransportError> {
        Ok(tokio::fs::write(path, content).await?)
    }
}
