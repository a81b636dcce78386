//! Process-backed transports for trainsh.
//!
//! Every script is piped into a freshly spawned shell:
//! - `local://` - `sh -s` on this machine (PowerShell on Windows)
//! - `docker://<container>` - `docker exec -i <container> sh -s`
//! - `ssh://[user@]host[:port]` - the system `ssh` client

pub mod docker;
pub mod local;
pub mod process;
pub mod shell;
pub mod ssh;

pub use docker::DockerTransport;
pub use local::LocalTransport;
pub use process::ProcessConnection;
pub use shell::resolve_executable_path;
pub use ssh::SshTransport;

use trainsh_core::TransportRegistry;

/// Registry with every transport this crate provides.
#[must_use]
pub fn default_registry() -> TransportRegistry {
    TransportRegistry::new()
        .with(LocalTransport)
        .with(DockerTransport)
        .with(SshTransport)
}
