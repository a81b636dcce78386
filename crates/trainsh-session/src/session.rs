//! Stateful shell session over a stateless transport.
//!
//! Every logical command becomes one aggregated script: prefixes restore the
//! cached working directory and environment (and probe the host while it is
//! unknown), postfixes capture the primary instruction's exit status, the new
//! working directory and the new environment.

use std::{
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::{Duration, Instant},
};

use tokio::{runtime::Handle, sync::Mutex};
use trainsh_core::{
    CommandOutput, Connection, Platform, TargetDescriptor, TransportError, TransportRegistry,
};
use trainsh_executor::{AggregateError, Batch, ShellDialect};

/// Exit status reported when the captured value is not a number.
const UNKNOWN_EXIT_STATUS: i32 = -1;

/// Session error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport could not be established.
    #[error("Connection error: {0}")]
    Connection(#[source] TransportError),
    #[error(transparent)]
    Aggregation(#[from] AggregateError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Session is busy running another command")]
    Busy,
    #[error("Session is not connected")]
    Disconnected,
}

/// Cached knowledge about the remote side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Host identity. Survives reconnects.
    pub host: Option<String>,
    pub working_directory: Option<String>,
    /// Opaque, replayable environment listing.
    pub environment: Option<String>,
    pub last_exit_status: Option<i32>,
    pub last_latency: Option<Duration>,
}

impl SessionState {
    /// Whether the next command should probe the host name.
    #[must_use]
    pub const fn needs_host_discovery(&self) -> bool {
        self.host.is_none()
    }

    /// Forget everything tied to the remote process rather than the target.
    fn reset_process_state(&mut self) {
        self.working_directory = None;
        self.environment = None;
        self.last_exit_status = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Affixes {
    /// Restore and capture directory, environment and exit status.
    Full,
    /// Only discovery probes, for idle round trips.
    Discovery,
}

/// Raw outputs collected by the capture callbacks of one batch.
#[derive(Debug, Default)]
struct Captured {
    host: Option<String>,
    working_directory: Option<String>,
    environment: Option<String>,
    exit_status: Option<String>,
}

/// A shell-like session bound to one transport connection.
pub struct Session {
    target: TargetDescriptor,
    transports: TransportRegistry,
    /// Held for the whole of every remote call.
    connection: Mutex<Option<Box<dyn Connection>>>,
    state: RwLock<SessionState>,
}

impl Session {
    /// Connect to a target.
    ///
    /// # Errors
    /// Returns `Connection` if the descriptor is invalid, no transport
    /// handles its scheme, or the transport fails to connect.
    pub async fn connect(target: &str, transports: TransportRegistry) -> Result<Self, SessionError> {
        let target = TargetDescriptor::parse(target).map_err(SessionError::Connection)?;
        let connection = transports
            .connect(&target)
            .await
            .map_err(SessionError::Connection)?;
        tracing::info!(url = %target, "Connected");

        let state = SessionState {
            host: target.host().map(str::to_string),
            ..SessionState::default()
        };

        Ok(Self {
            target,
            transports,
            connection: Mutex::new(Some(connection)),
            state: RwLock::new(state),
        })
    }

    /// Run an instruction as if in a persistent shell.
    ///
    /// # Errors
    /// Returns `Busy` if another call is in flight, `Disconnected` after
    /// `disconnect`, `Aggregation` if the call or its framing failed. Cached
    /// state is left untouched on error.
    pub async fn run(&self, instruction: &str) -> Result<CommandOutput, SessionError> {
        let guard = self.connection.try_lock().map_err(|_| SessionError::Busy)?;
        let connection = guard.as_deref().ok_or(SessionError::Disconnected)?;
        self.execute(connection, instruction, Affixes::Full).await
    }

    /// Round-trip a no-op to trigger discovery and measure latency.
    ///
    /// # Errors
    /// Same as `run`.
    pub async fn run_idle(&self) -> Result<Duration, SessionError> {
        let guard = self.connection.try_lock().map_err(|_| SessionError::Busy)?;
        let connection = guard.as_deref().ok_or(SessionError::Disconnected)?;

        let noop = ShellDialect::for_platform(connection.platform()).noop();
        let started = Instant::now();
        self.execute(connection, noop, Affixes::Discovery).await?;
        let elapsed = started.elapsed();

        self.state_mut().last_latency = Some(elapsed);
        tracing::debug!(latency_ms = elapsed.as_millis(), "Measured round trip");
        Ok(elapsed)
    }

    /// Close the connection and open a new one to the same target.
    ///
    /// Working directory, environment and exit status are cleared; host and
    /// target are kept.
    ///
    /// # Errors
    /// Returns `Busy` if a call is in flight, `Connection` if the new
    /// connection fails (the session then stays disconnected).
    pub async fn reconnect(&self) -> Result<(), SessionError> {
        let mut guard = self.connection.try_lock().map_err(|_| SessionError::Busy)?;
        if let Some(connection) = guard.take() {
            self.close_connection(connection).await;
        }
        self.state_mut().reset_process_state();

        let connection = self
            .transports
            .connect(&self.target)
            .await
            .map_err(SessionError::Connection)?;
        *guard = Some(connection);
        tracing::info!(url = %self.target, "Reconnected");
        Ok(())
    }

    /// Release the connection. Safe only between commands.
    ///
    /// # Errors
    /// Returns `Busy` if a call is in flight.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let mut guard = self.connection.try_lock().map_err(|_| SessionError::Busy)?;
        if let Some(connection) = guard.take() {
            self.close_connection(connection).await;
        }
        Ok(())
    }

    async fn close_connection(&self, mut connection: Box<dyn Connection>) {
        tracing::info!(url = %self.target, "Closing session");
        if let Err(e) = connection.close().await {
            tracing::warn!(url = %self.target, error = %e, "Failed to close connection");
        }
    }

    /// Whether a connection is currently held.
    ///
    /// # Errors
    /// Returns `Busy` if a call is in flight.
    pub fn is_connected(&self) -> Result<bool, SessionError> {
        let guard = self.connection.try_lock().map_err(|_| SessionError::Busy)?;
        Ok(guard.is_some())
    }

    /// Platform descriptor of the current connection.
    ///
    /// # Errors
    /// Returns `Busy` or `Disconnected`.
    pub fn platform(&self) -> Result<Platform, SessionError> {
        let guard = self.connection.try_lock().map_err(|_| SessionError::Busy)?;
        let connection = guard.as_deref().ok_or(SessionError::Disconnected)?;
        Ok(connection.platform().clone())
    }

    /// Read a remote file through the transport.
    ///
    /// # Errors
    /// Returns `Busy`, `Disconnected`, or the transport's error, e.g.
    /// `Unsupported` for backends without file access.
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>, SessionError> {
        let guard = self.connection.try_lock().map_err(|_| SessionError::Busy)?;
        let connection = guard.as_deref().ok_or(SessionError::Disconnected)?;
        Ok(connection.read_file(path).await?)
    }

    /// Write a remote file through the transport.
    ///
    /// # Errors
    /// Same as `read_file`.
    pub async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), SessionError> {
        let guard = self.connection.try_lock().map_err(|_| SessionError::Busy)?;
        let connection = guard.as_deref().ok_or(SessionError::Disconnected)?;
        Ok(connection.write_file(path, content).await?)
    }

    async fn execute(
        &self,
        connection: &dyn Connection,
        instruction: &str,
        affixes: Affixes,
    ) -> Result<CommandOutput, SessionError> {
        let dialect = ShellDialect::for_platform(connection.platform());
        let known = self.state();

        let mut captured = Captured::default();
        let Captured {
            host,
            working_directory,
            environment,
            exit_status,
        } = &mut captured;

        let mut batch = Batch::new(instruction);

        if affixes == Affixes::Full {
            if let Some(dir) = &known.working_directory {
                batch.prefix(dialect.set_working_directory(dir));
            }
            if let Some(snapshot) = &known.environment {
                match dialect.restore_environment(snapshot) {
                    Ok(restore) => {
                        batch.prefix(restore);
                    }
                    Err(e) => tracing::debug!(error = %e, "Skipping environment restore"),
                }
            }
        }

        if known.needs_host_discovery() {
            batch.prefix_with(dialect.query_host(), move |out| *host = Some(out));
        }

        if affixes == Affixes::Full {
            batch
                .capture_exit_status(dialect.capture_exit_status())
                .postfix_with(dialect.query_exit_status(), move |out| {
                    *exit_status = Some(out);
                })
                .postfix_with(dialect.query_working_directory(), move |out| {
                    *working_directory = Some(out);
                });
            match dialect.query_environment() {
                Ok(query) => {
                    batch.postfix_with(query, move |out| *environment = Some(out));
                }
                Err(e) => tracing::debug!(error = %e, "Skipping environment capture"),
            }
        }

        let output = batch.run(connection).await?;
        let exit_status = self.apply(captured, affixes);

        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_status: exit_status.unwrap_or(0),
        })
    }

    /// Fold one batch's captures into the cached state.
    fn apply(&self, captured: Captured, affixes: Affixes) -> Option<i32> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        let mut state = self.state_mut();

        if let Some(host) = non_empty(captured.host) {
            tracing::debug!(%host, "Discovered host");
            state.host = Some(host);
        }
        if affixes == Affixes::Discovery {
            return None;
        }

        let exit_status = captured.exit_status.map(|raw| parse_exit_status(&raw));
        state.last_exit_status = exit_status;
        if let Some(dir) = non_empty(captured.working_directory) {
            state.working_directory = Some(dir);
        }
        if let Some(env) = non_empty(captured.environment) {
            state.environment = Some(env);
        }
        exit_status
    }

    fn state_ref(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the cached state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state_ref().clone()
    }

    #[must_use]
    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    /// Target with credentials removed.
    #[must_use]
    pub fn url(&self) -> String {
        self.target.redacted()
    }

    /// Transport flavor, i.e. the target's scheme.
    #[must_use]
    pub fn backend(&self) -> &str {
        self.target.scheme()
    }

    #[must_use]
    pub fn host(&self) -> Option<String> {
        self.state_ref().host.clone()
    }

    #[must_use]
    pub fn working_directory(&self) -> Option<String> {
        self.state_ref().working_directory.clone()
    }

    #[must_use]
    pub fn environment(&self) -> Option<String> {
        self.state_ref().environment.clone()
    }

    #[must_use]
    pub fn last_exit_status(&self) -> Option<i32> {
        self.state_ref().last_exit_status
    }

    /// Override the displayed exit status, e.g. after a failed built-in.
    pub fn set_last_exit_status(&self, status: i32) {
        self.state_mut().last_exit_status = Some(status);
    }

    #[must_use]
    pub fn last_latency(&self) -> Option<Duration> {
        self.state_ref().last_latency
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.url())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let Some(mut connection) = self.connection.get_mut().take() else {
            return;
        };
        let url = self.target.redacted();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tracing::info!(%url, "Closing session");
                    if let Err(e) = connection.close().await {
                        tracing::warn!(%url, error = %e, "Failed to close connection");
                    }
                });
            }
            Err(_) => tracing::debug!(%url, "No runtime left to close connection"),
        }
    }
}

/// An empty value means no native program has set a status yet.
fn parse_exit_status(raw: &str) -> i32 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!(raw, "Unparseable exit status");
        UNKNOWN_EXIT_STATUS
    })
}
