//! Read-eval loop over a `SessionRegistry`.

use std::{
    future::Future,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow, bail};
use owo_colors::OwoColorize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use trainsh_core::TransportError;
use trainsh_session::{RegistryError, Session, SessionError, SessionId, SessionRegistry};

use crate::{
    Config,
    builtins::{self, Builtin},
    history,
    input::{self, Input},
    prompt,
};

/// Status recorded on the current session when a built-in fails.
pub const BUILTIN_FAILURE_STATUS: i32 = -1;

/// Whether the loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Get the local shell and its "run this string" flag.
fn local_shell_command() -> (&'static str, &'static str) {
    if cfg!(windows) {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    }
}

/// Interactive shell state. Output goes to `out` so the loop can be driven in tests.
pub struct Shell<W> {
    registry: SessionRegistry,
    config: Config,
    history: Vec<String>,
    history_file: Option<PathBuf>,
    out: W,
    color: bool,
}

impl<W: Write> Shell<W> {
    #[must_use]
    pub const fn new(registry: SessionRegistry, config: Config, out: W) -> Self {
        Self {
            registry,
            config,
            history: Vec::new(),
            history_file: None,
            out,
            color: true,
        }
    }

    /// Disable ANSI colors in prompts and messages.
    #[must_use]
    pub const fn without_color(mut self) -> Self {
        self.color = false;
        self
    }

    /// Load history from `path` and save it back there when the loop ends.
    #[must_use]
    pub fn with_history_file(mut self, path: PathBuf) -> Self {
        match history::load(&path) {
            Ok(entries) => self.history = entries,
            Err(e) => tracing::warn!(error = %format!("{e:#}"), "Ignoring saved history"),
        }
        self.history_file = Some(path);
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.history
    }

    #[must_use]
    pub fn into_output(self) -> W {
        self.out
    }

    /// Current prompt.
    #[must_use]
    pub fn prompt(&self) -> String {
        match (self.registry.current_id(), self.registry.current()) {
            (Some(id), Some(session)) => prompt::for_session(id, &session, self.color),
            _ => prompt::disconnected(),
        }
    }

    fn error(&mut self, message: &str) -> Result<()> {
        if self.color {
            writeln!(self.out, "{}", message.red())?;
        } else {
            writeln!(self.out, "{message}")?;
        }
        Ok(())
    }

    fn current(&self) -> Result<(SessionId, Arc<Session>)> {
        match (self.registry.current_id(), self.registry.current()) {
            (Some(id), Some(session)) => Ok((id, session)),
            _ => bail!("No active session, use `!connect <url>` first"),
        }
    }

    /// Open or switch to the session for `url`.
    ///
    /// # Errors
    /// Returns the connection error.
    pub async fn connect(&mut self, url: &str) -> Result<SessionId> {
        let id = self.registry.use_session(url).await?;
        let session = self.registry.get(id)?;
        writeln!(self.out, "Connected to {} as session @{id}", session.url())?;
        Ok(id)
    }

    /// Print the platform and latency of the current session.
    ///
    /// # Errors
    /// Returns an error when no session is open or the probe fails.
    pub async fn detect(&mut self) -> Result<()> {
        let (_, session) = self.current()?;
        let platform = session.platform()?;
        writeln!(self.out, "Platform: {platform}")?;
        writeln!(self.out, "Family: {}", platform.family)?;
        writeln!(self.out, "Measuring ping over connection...")?;
        self.ping().await
    }

    async fn ping(&mut self) -> Result<()> {
        let (_, session) = self.current()?;
        let latency = session.run_idle().await?;
        writeln!(self.out, "Ping: {}ms", latency.as_millis())?;
        Ok(())
    }

    /// Read lines from `input` until EOF, an exit command or Ctrl-C, then close every session.
    ///
    /// # Errors
    /// Returns an error when reading input or writing output fails.
    pub async fn run_loop<R: AsyncBufRead + Unpin>(&mut self, input: R) -> Result<()> {
        self.run_loop_until(input, ctrl_c).await
    }

    /// `run_loop` with a custom interrupt source.
    ///
    /// An interrupt while waiting for input ends the loop. An interrupt while
    /// a command runs abandons that command and returns to the prompt.
    ///
    /// # Errors
    /// Returns an error when reading input or writing output fails.
    pub async fn run_loop_until<R, F, Fut>(&mut self, input: R, mut interrupt: F) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut lines = input.lines();
        loop {
            write!(self.out, "{}", self.prompt())?;
            self.out.flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line.context("Failed to read input")?,
                () = interrupt() => {
                    writeln!(self.out)?;
                    break;
                }
            };
            let Some(line) = line else {
                writeln!(self.out)?;
                break;
            };

            let flow = tokio::select! {
                flow = self.execute(&line) => flow?,
                () = interrupt() => {
                    writeln!(self.out)?;
                    self.error("Interrupted; the command may have partly run")?;
                    Flow::Continue
                }
            };
            if flow == Flow::Exit {
                break;
            }
        }

        for (_, session) in self.registry.iter() {
            writeln!(self.out, "Closing session {}", session.url())?;
        }
        self.registry.close_all().await;
        self.save_history();
        Ok(())
    }

    fn save_history(&self) {
        let Some(path) = &self.history_file else {
            return;
        };
        if let Err(e) = history::save(path, &self.history) {
            tracing::warn!(error = %format!("{e:#}"), "Failed to save history");
        }
    }

    /// Handle one typed line.
    ///
    /// Errors from the remote side are printed, not returned.
    ///
    /// # Errors
    /// Returns an error only when writing output fails.
    pub async fn execute(&mut self, line: &str) -> Result<Flow> {
        let trimmed = line.trim();
        if !trimmed.is_empty() && trimmed != "!history" {
            self.history.push(trimmed.to_string());
        }

        match Input::parse(line) {
            Input::Empty => {}
            Input::Exit => return Ok(Flow::Exit),
            Input::Help => write!(self.out, "{}", builtins::help_text())?,
            Input::Local(command) => self.execute_local(&command).await?,
            Input::Builtin { name, args } => self.execute_builtin(&name, &args).await?,
            Input::Via { session, command } => self.execute_via(&session, &command).await?,
            Input::Remote(command) => match self.current() {
                Ok((_, session)) => self.execute_remote(&session, &command).await?,
                Err(e) => self.error(&e.to_string())?,
            },
        }
        Ok(Flow::Continue)
    }

    async fn execute_local(&mut self, command: &str) -> Result<()> {
        let (shell, flag) = local_shell_command();
        let output = tokio::process::Command::new(shell)
            .arg(flag)
            .arg(command)
            .kill_on_drop(true)
            .output()
            .await;
        match output {
            Ok(output) => {
                self.out.write_all(&output.stdout)?;
                if !output.stderr.is_empty() {
                    self.error(String::from_utf8_lossy(&output.stderr).trim_end())?;
                }
            }
            Err(e) => self.error(&format!("Failed to run local command: {e}"))?,
        }
        Ok(())
    }

    async fn execute_via(&mut self, id: &str, command: &str) -> Result<()> {
        let session = match self.registry.parse_id(id).and_then(|id| self.registry.get(id)) {
            Ok(session) => session,
            Err(e) => {
                self.error(&e.to_string())?;
                return self.list_sessions();
            }
        };
        if command.is_empty() {
            return self.error("Expecting a command after the session id, e.g. `@1 hostname`");
        }
        self.execute_remote(&session, command).await
    }

    async fn execute_remote(&mut self, session: &Session, command: &str) -> Result<()> {
        if input::is_interactive(command) {
            return self.error("Cannot execute interactive commands on non-tty sessions");
        }

        match session.run(command).await {
            Ok(output) => {
                if !output.stdout.is_empty() {
                    writeln!(self.out, "{}", output.stdout)?;
                }
                if !output.stderr.is_empty() {
                    self.error(&output.stderr)?;
                }
            }
            Err(e @ SessionError::Aggregation(_)) => {
                self.error(&format!("{e}; the command may have run, it was not retried"))?;
            }
            Err(e) => self.error(&e.to_string())?,
        }
        Ok(())
    }

    async fn execute_builtin(&mut self, name: &str, args: &[String]) -> Result<()> {
        let builtin = match name.parse::<Builtin>() {
            Ok(builtin) => builtin,
            Err(e) => {
                self.error(&format!("{e}, see `!help`"))?;
                self.mark_failed();
                return Ok(());
            }
        };

        tracing::debug!(%builtin, ?args, "Running built-in");
        if let Err(e) = self.run_builtin(builtin, args).await {
            self.error(&describe_failure(&e))?;
            self.mark_failed();
            let bad_id = matches!(
                e.downcast_ref::<RegistryError>(),
                Some(RegistryError::InvalidId(_) | RegistryError::NotFound(_))
            );
            if bad_id {
                self.list_sessions()?;
            }
        }
        Ok(())
    }

    fn mark_failed(&self) {
        if let Some(session) = self.registry.current() {
            session.set_last_exit_status(BUILTIN_FAILURE_STATUS);
        }
    }

    async fn run_builtin(&mut self, builtin: Builtin, args: &[String]) -> Result<()> {
        match builtin {
            Builtin::ClearHistory => self.history.clear(),
            Builtin::Connect => {
                let url = args.first().ok_or_else(|| {
                    anyhow!("Expecting session url, e.g. `!connect docker://d9443b195d16`")
                })?;
                self.connect(url).await?;
            }
            Builtin::Detect => self.detect().await?,
            Builtin::Download => {
                let [remote, local] = args else {
                    bail!("Usage: !download <remote> <local>");
                };
                self.download(remote, Path::new(local)).await?;
            }
            Builtin::Edit => {
                let remote = args.first().ok_or_else(|| anyhow!("Usage: !edit <remote>"))?;
                self.edit(remote).await?;
            }
            Builtin::Env => {
                let (_, session) = self.current()?;
                let env = session
                    .environment()
                    .unwrap_or_else(|| "(environment not captured)".to_string());
                writeln!(self.out, "{env}")?;
            }
            Builtin::Help => write!(self.out, "{}", builtins::help_text())?,
            Builtin::History => {
                for (index, line) in self.history.iter().enumerate() {
                    writeln!(self.out, "{index:>5}  {line}")?;
                }
            }
            Builtin::Host => {
                let (_, session) = self.current()?;
                let host = session.host().unwrap_or_else(|| "unknown".to_string());
                writeln!(self.out, "{host}")?;
            }
            Builtin::Ping => self.ping().await?,
            Builtin::Pwd => {
                let (_, session) = self.current()?;
                let cwd = session
                    .working_directory()
                    .unwrap_or_else(|| "(working directory not captured)".to_string());
                writeln!(self.out, "{cwd}")?;
            }
            Builtin::Read => {
                let remote = args.first().ok_or_else(|| anyhow!("Usage: !read <remote>"))?;
                self.read(remote).await?;
            }
            Builtin::Reconnect => {
                let (id, session) = self.current()?;
                session.reconnect().await?;
                writeln!(self.out, "Reconnected session @{id}")?;
            }
            Builtin::Session => {
                let id = args
                    .first()
                    .ok_or_else(|| anyhow!("Expecting valid session id, e.g. `!session 2`"))?;
                let id = self.registry.parse_id(id)?;
                self.registry.set_current(id)?;
            }
            Builtin::Sessions => self.list_sessions()?,
            Builtin::Upload => {
                let [local, remote] = args else {
                    bail!("Usage: !upload <local> <remote>");
                };
                self.upload(Path::new(local), remote).await?;
            }
        }
        Ok(())
    }

    fn list_sessions(&mut self) -> Result<()> {
        writeln!(self.out, "Active sessions:")?;
        let current = self.registry.current_id();
        let lines: Vec<String> = self
            .registry
            .iter()
            .map(|(id, session)| {
                let marker = if Some(id) == current { '*' } else { ' ' };
                format!("{marker} [{id}] {}", session.url())
            })
            .collect();
        for line in lines {
            writeln!(self.out, "{line}")?;
        }
        Ok(())
    }

    async fn download(&mut self, remote: &str, local: &Path) -> Result<()> {
        let (_, session) = self.current()?;
        let content = session.read_file(remote).await?;

        let destination = if local.is_dir() {
            let name = Path::new(remote)
                .file_name()
                .ok_or_else(|| anyhow!("Cannot derive a file name from {remote}"))?;
            local.join(name)
        } else {
            local.to_path_buf()
        };
        tokio::fs::write(&destination, &content)
            .await
            .with_context(|| format!("Failed to write {}", destination.display()))?;
        writeln!(
            self.out,
            "Downloaded {remote} to {} ({} bytes)",
            destination.display(),
            content.len()
        )?;
        Ok(())
    }

    async fn upload(&mut self, local: &Path, remote: &str) -> Result<()> {
        let (_, session) = self.current()?;
        let content = match tokio::fs::read(local).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                bail!("Local file '{}' does not exist", local.display())
            }
            Err(e) => return Err(e).context(format!("Failed to read {}", local.display())),
        };
        session.write_file(remote, &content).await?;
        writeln!(
            self.out,
            "Uploaded {} to {remote} ({} bytes)",
            local.display(),
            content.len()
        )?;
        Ok(())
    }

    async fn read(&mut self, remote: &str) -> Result<()> {
        let (_, session) = self.current()?;
        let content = session.read_file(remote).await?;
        let copy = local_copy(remote, &content)?;
        let pager = self.config.pager.clone();
        spawn_local_program(&pager, copy.path()).await
    }

    async fn edit(&mut self, remote: &str) -> Result<()> {
        let (_, session) = self.current()?;
        let content = session.read_file(remote).await?;
        let copy = local_copy(remote, &content)?;

        let editor = self.config.editor.clone();
        spawn_local_program(&editor, copy.path()).await?;

        let edited = tokio::fs::read(copy.path()).await?;
        if edited == content {
            writeln!(self.out, "No changes to {remote}")?;
            return Ok(());
        }
        session.write_file(remote, &edited).await?;
        writeln!(self.out, "Saved {remote} ({} bytes)", edited.len())?;
        Ok(())
    }
}

impl<W> std::fmt::Debug for Shell<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("registry", &self.registry)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

/// Tokio's Ctrl-C listener. Never fires when the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Ctrl-C handling unavailable");
        std::future::pending::<()>().await;
    }
}

/// Message for a failed built-in.
fn describe_failure(error: &anyhow::Error) -> String {
    let unsupported = error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<SessionError>(),
            Some(SessionError::Transport(TransportError::Unsupported(_)))
        ) || matches!(
            cause.downcast_ref::<RegistryError>(),
            Some(RegistryError::Session(SessionError::Transport(
                TransportError::Unsupported(_)
            )))
        )
    });
    if unsupported {
        format!("The backend of this session does not support it: {error}")
    } else {
        format!("Error: {error:#}")
    }
}

/// Write `content` to a temp file named after the remote file.
fn local_copy(remote: &str, content: &[u8]) -> Result<tempfile::NamedTempFile> {
    let suffix = Path::new(remote)
        .file_name()
        .map(|name| format!("-{}", name.to_string_lossy()))
        .unwrap_or_default();
    let mut file = tempfile::Builder::new()
        .prefix("trainsh")
        .suffix(&suffix)
        .tempfile()?;
    file.write_all(content)?;
    file.flush()?;
    Ok(file)
}

/// Run a configured program (which may carry arguments) on a local path and wait for it.
async fn spawn_local_program(command: &str, path: &Path) -> Result<()> {
    let mut words = command.split_whitespace();
    let program = words
        .next()
        .ok_or_else(|| anyhow!("No program configured"))?;
    let status = tokio::process::Command::new(program)
        .args(words)
        .arg(path)
        .status()
        .await
        .with_context(|| format!("Failed to start {program}"))?;
    if !status.success() {
        bail!("{program} exited with {status}");
    }
    Ok(())
}
