//! `docker://<container>` transport.

use async_trait::async_trait;
use trainsh_core::{Connection, PlatformFamily, TargetDescriptor, Transport, TransportError};

use crate::{
    process::ProcessConnection,
    shell::{StdinShell, require_executable},
};

/// Runs scripts inside a running container via `docker exec`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DockerTransport;

impl DockerTransport {
    /// Arguments passed to `docker`, ending with the in-container shell.
    ///
    /// # Errors
    /// Returns `InvalidTarget` when no container is named.
    pub fn exec_args(target: &TargetDescriptor) -> Result<Vec<String>, TransportError> {
        let container = target.host().ok_or_else(|| {
            TransportError::InvalidTarget(format!(
                "{target}: expected a container, e.g. docker://d9443b195d16"
            ))
        })?;

        let mut args = vec!["exec".to_string(), "-i".to_string()];
        if let Some(user) = target.user() {
            args.push("-u".to_string());
            args.push(user.to_string());
        }
        args.push(container.to_string());
        args.extend(StdinShell::posix().into_args());
        Ok(args)
    }
}

#[async_trait]
impl Transport for DockerTransport {
    fn scheme(&self) -> &'static str {
        "docker"
    }

    async fn connect(
        &self,
        target: &TargetDescriptor,
    ) -> Result<Box<dyn Connection>, TransportError> {
        let args = Self::exec_args(target)?;
        let program = require_executable("docker").await?;
        let connection = ProcessConnection::new(program, args, PlatformFamily::Unix)
            .detect_platform()
            .await?;
        Ok(Box::new(connection))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_exec_args() {
        let target = TargetDescriptor::parse("docker://d9443b195d16").unwrap();
        assert_eq!(
            DockerTransport::exec_args(&target).unwrap(),
            vec!["exec", "-i", "d9443b195d16", "sh", "-s"]
        );
    }

    #[test]
    fn test_exec_args_with_user() {
        let target = TargetDescriptor::parse("docker://postgres@db").unwrap();
        assert_eq!(
            DockerTransport::exec_args(&target).unwrap(),
            vec!["exec", "-i", "-u", "postgres", "db", "sh", "-s"]
        );
    }

    #[tokio::test]
    async fn test_container_required() {
        let target = TargetDescriptor::parse("docker://").unwrap();
        let err = DockerTransport.connect(&target).await.err().unwrap();
        assert!(matches!(err, TransportError::InvalidTarget(_)));
    }
}
