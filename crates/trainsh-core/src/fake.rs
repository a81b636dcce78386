//! Scripted in-memory transport for tests.
//!
//! `FakeTransport` behaves like a target whose shell forgets everything
//! between calls: every `run_command` starts in `/` (or `C:\` for the
//! PowerShell flavor) with the base environment. It understands the small
//! instruction vocabulary sessions emit, plus `true`, `false`, `echo` and
//! comments. Unknown commands fail with status 127.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;

use crate::{
    CommandOutput, Connection, Platform, PlatformFamily, TargetDescriptor, Transport,
    TransportError,
};

/// Exit status the fake reports for every script, unrelated to any instruction.
pub const REPORTED_EXIT_STATUS: i32 = 42;

#[derive(Debug, Default)]
struct Shared {
    scripts: Vec<String>,
    connects: usize,
    closes: usize,
    refuse_connect: bool,
}

/// Inspection handle shared by a fake transport and its connections.
#[derive(Debug, Clone, Default)]
pub struct FakeHandle {
    shared: Arc<Mutex<Shared>>,
}

impl FakeHandle {
    fn with<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut shared)
    }

    /// Every script submitted so far, in order.
    #[must_use]
    pub fn scripts(&self) -> Vec<String> {
        self.with(|s| s.scripts.clone())
    }

    /// The most recent script.
    #[must_use]
    pub fn last_script(&self) -> Option<String> {
        self.with(|s| s.scripts.last().cloned())
    }

    #[must_use]
    pub fn connects(&self) -> usize {
        self.with(|s| s.connects)
    }

    #[must_use]
    pub fn closes(&self) -> usize {
        self.with(|s| s.closes)
    }

    /// Make subsequent connects fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.with(|s| s.refuse_connect = refuse);
    }
}

/// Transport for the `fake` scheme.
#[derive(Debug, Clone)]
pub struct FakeTransport {
    family: PlatformFamily,
    hostname: String,
    env: BTreeMap<String, String>,
    handle: FakeHandle,
}

impl FakeTransport {
    /// A POSIX-like target.
    #[must_use]
    pub fn posix() -> Self {
        Self::new(PlatformFamily::Unix)
    }

    /// A Windows-like target speaking PowerShell.
    #[must_use]
    pub fn windows() -> Self {
        Self::new(PlatformFamily::Windows)
    }

    fn new(family: PlatformFamily) -> Self {
        let env = [("HOME", "/root"), ("PATH", "/usr/bin:/bin")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            family,
            hostname: "fakehost".to_string(),
            env,
            handle: FakeHandle::default(),
        }
    }

    /// Override the name returned by `hostname`.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    #[must_use]
    pub fn handle(&self) -> FakeHandle {
        self.handle.clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn scheme(&self) -> &'static str {
        "fake"
    }

    async fn connect(
        &self,
        target: &TargetDescriptor,
    ) -> Result<Box<dyn Connection>, TransportError> {
        if self.handle.with(|s| s.refuse_connect) {
            return Err(TransportError::ConnectFailed(target.redacted()));
        }
        self.handle.with(|s| s.connects += 1);
        Ok(Box::new(FakeConnection {
            platform: Platform {
                family: self.family,
                name: "FakeOS".to_string(),
                release: "1.0".to_string(),
                arch: "x86_64".to_string(),
            },
            hostname: self.hostname.clone(),
            env: self.env.clone(),
            handle: self.handle.clone(),
        }))
    }
}

/// Connection produced by `FakeTransport`.
#[derive(Debug)]
pub struct FakeConnection {
    platform: Platform,
    hostname: String,
    env: BTreeMap<String, String>,
    handle: FakeHandle,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn run_command(&self, script: &str) -> Result<CommandOutput, TransportError> {
        self.handle.with(|s| s.scripts.push(script.to_string()));

        let mut shell = Interpreter {
            cwd: if self.platform.is_windows_like() { r"C:\" } else { "/" }.to_string(),
            env: self.env.clone(),
            vars: BTreeMap::new(),
            status: 0,
            stdout: String::new(),
            stderr: String::new(),
        };
        for line in script.lines() {
            shell.execute(line, &self.hostname);
        }

        Ok(CommandOutput {
            stdout: shell.stdout,
            stderr: shell.stderr,
            exit_status: REPORTED_EXIT_STATUS,
        })
    }

    fn platform(&self) -> &Platform {
        &self.platform
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.handle.with(|s| s.closes += 1);
        Ok(())
    }
}

struct Interpreter {
    cwd: String,
    env: BTreeMap<String, String>,
    // PowerShell-style `$NAME=` assignments
    vars: BTreeMap<String, String>,
    status: i32,
    stdout: String,
    stderr: String,
}

impl Interpreter {
    fn execute(&mut self, line: &str, hostname: &str) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return;
        }

        if line == "(Get-Location).Path" {
            let cwd = self.cwd.clone();
            return self.print(&cwd);
        }
        if let Some(assignment) = line.strip_prefix('$') {
            if let Some((name, value)) = assignment.split_once('=') {
                let value = if value == "$LastExitCode" {
                    self.status.to_string()
                } else {
                    value.to_string()
                };
                self.vars.insert(name.to_string(), value);
                return;
            }
        }

        let Some(words) = shlex::split(line) else {
            return self.fail(2, &format!("syntax error: {line}"));
        };
        let Some((program, args)) = words.split_first() else {
            return;
        };

        match program.as_str() {
            "true" => self.status = 0,
            "false" => self.status = 1,
            "hostname" => self.print(hostname),
            "uname" if args.iter().any(|a| a == "-n") => self.print(hostname),
            "pwd" => {
                let cwd = self.cwd.clone();
                self.print(&cwd);
            }
            "cd" | "Set-Location" => match args.first() {
                Some(path) => {
                    self.cwd.clone_from(path);
                    self.status = 0;
                }
                None => self.fail(1, "cd: missing operand"),
            },
            "echo" => {
                // shlex already dropped quotes, so `$?` arrives literally
                let text = args
                    .iter()
                    .map(|arg| self.expand(arg))
                    .collect::<Vec<_>>()
                    .join(" ");
                self.print(&text);
            }
            "export" if args.is_empty() => {
                let listing = self
                    .env
                    .iter()
                    .map(|(k, v)| format!("export {k}='{v}'"))
                    .collect::<Vec<_>>()
                    .join("\n");
                self.print(&listing);
            }
            "export" => {
                for arg in args {
                    if let Some((name, value)) = arg.split_once('=') {
                        let value = self.expand(value);
                        self.env.insert(name.to_string(), value);
                    }
                }
                self.status = 0;
            }
            other => self.fail(127, &format!("{other}: command not found")),
        }
    }

    fn expand(&self, word: &str) -> String {
        match word.strip_prefix('$') {
            Some("?") => self.status.to_string(),
            Some(name) => self
                .env
                .get(name)
                .or_else(|| self.vars.get(name))
                .cloned()
                .unwrap_or_default(),
            None => word.to_string(),
        }
    }

    fn print(&mut self, text: &str) {
        self.stdout.push_str(text);
        self.stdout.push('\n');
        self.status = 0;
    }

    fn fail(&mut self, status: i32, message: &str) {
        self.stderr.push_str(message);
        self.stderr.push('\n');
        self.status = status;
    }
}
