//! Packing several instructions into one transport call.
//!
//! The transport only knows "run this script, return its output". To observe
//! N instructions separately, they are joined into one script with an echoed
//! sentinel between them, and the combined stdout is split on that sentinel.
//!
//! Execution order is: prefixes in reverse registration order, the primary
//! instruction (followed by the exit-status capture, in the same segment),
//! then postfixes in registration order. Captures always receive their
//! segment in registration order.

use std::borrow::Cow;

use thiserror::Error;
use trainsh_core::{CommandOutput, Connection, SENTINEL, TransportError};

/// Callback receiving the trimmed output of one instruction.
pub type Capture<'a> = Box<dyn FnOnce(String) + Send + 'a>;

/// Aggregation error.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The sentinel showed up in real output, or the transport dropped lines.
    #[error("Framing mismatch: expected {expected} output segments, found {found}")]
    Framing { expected: usize, found: usize },
}

/// Demultiplexed result of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutput {
    /// Standard output of the primary instruction.
    pub stdout: String,
    /// Combined standard error, passed through unframed.
    pub stderr: String,
    /// Exit status reported by the transport. This belongs to the last
    /// instruction of the script, not to the primary one.
    pub transport_exit_status: i32,
}

struct Affix<'a> {
    command: String,
    capture: Option<Capture<'a>>,
}

/// One primary instruction plus its prefixes and postfixes.
pub struct Batch<'a> {
    primary: String,
    exit_capture: Option<String>,
    prefixes: Vec<Affix<'a>>,
    postfixes: Vec<Affix<'a>>,
    sentinel: Cow<'static, str>,
}

impl<'a> Batch<'a> {
    /// Create a batch around the primary instruction.
    #[must_use]
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            exit_capture: None,
            prefixes: Vec::new(),
            postfixes: Vec::new(),
            sentinel: Cow::Borrowed(SENTINEL),
        }
    }

    /// Use a different separator token.
    #[must_use]
    pub fn with_sentinel(mut self, sentinel: impl Into<Cow<'static, str>>) -> Self {
        self.sentinel = sentinel.into();
        self
    }

    /// Instruction run directly after the primary one, in its segment,
    /// to save `$?` before any postfix can clobber it.
    pub fn capture_exit_status(&mut self, instruction: impl Into<String>) -> &mut Self {
        self.exit_capture = Some(instruction.into());
        self
    }

    /// Register a prefix whose output is discarded.
    pub fn prefix(&mut self, command: impl Into<String>) -> &mut Self {
        self.push_prefix(command.into(), None)
    }

    /// Register a prefix whose output is handed to `capture`.
    pub fn prefix_with(
        &mut self,
        command: impl Into<String>,
        capture: impl FnOnce(String) + Send + 'a,
    ) -> &mut Self {
        self.push_prefix(command.into(), Some(Box::new(capture)))
    }

    /// Register a postfix whose output is discarded.
    pub fn postfix(&mut self, command: impl Into<String>) -> &mut Self {
        self.push_postfix(command.into(), None)
    }

    /// Register a postfix whose output is handed to `capture`.
    pub fn postfix_with(
        &mut self,
        command: impl Into<String>,
        capture: impl FnOnce(String) + Send + 'a,
    ) -> &mut Self {
        self.push_postfix(command.into(), Some(Box::new(capture)))
    }

    fn push_prefix(&mut self, command: String, capture: Option<Capture<'a>>) -> &mut Self {
        self.prefixes.push(Affix { command, capture });
        self
    }

    fn push_postfix(&mut self, command: String, capture: Option<Capture<'a>>) -> &mut Self {
        self.postfixes.push(Affix { command, capture });
        self
    }

    /// Number of output segments a well-formed response splits into.
    #[must_use]
    pub fn expected_segments(&self) -> usize {
        self.prefixes.len() + 1 + self.postfixes.len()
    }

    /// The joined script, in execution order.
    #[must_use]
    pub fn script(&self) -> String {
        let separator = format!("\necho {}\n", self.sentinel);

        let mut primary = self.primary.clone();
        if let Some(capture) = &self.exit_capture {
            primary.push('\n');
            primary.push_str(capture);
        }

        self.prefixes
            .iter()
            .rev()
            .map(|affix| affix.command.as_str())
            .chain(std::iter::once(primary.as_str()))
            .chain(self.postfixes.iter().map(|affix| affix.command.as_str()))
            .collect::<Vec<_>>()
            .join(&separator)
    }

    /// Submit the script once and distribute the results.
    ///
    /// # Errors
    /// Returns `Transport` if the call fails, `Framing` if the output does
    /// not split into exactly one segment per instruction. No capture runs
    /// in either case.
    pub async fn run(self, connection: &dyn Connection) -> Result<BatchOutput, AggregateError> {
        let script = self.script();
        tracing::debug!(
            prefixes = self.prefixes.len(),
            postfixes = self.postfixes.len(),
            bytes = script.len(),
            "Running aggregated script"
        );
        let output = connection.run_command(&script).await?;
        self.distribute(output)
    }

    /// Split a combined response and hand each segment to its capture.
    ///
    /// # Errors
    /// Returns `Framing` if the segment count is off.
    pub fn distribute(self, output: CommandOutput) -> Result<BatchOutput, AggregateError> {
        let mut segments = split_segments(&output.stdout, &self.sentinel);

        let expected = self.expected_segments();
        if segments.len() != expected {
            tracing::warn!(expected, found = segments.len(), "Output framing mismatch");
            return Err(AggregateError::Framing {
                expected,
                found: segments.len(),
            });
        }

        let prefix_count = self.prefixes.len();
        let postfix_outputs = segments.split_off(prefix_count + 1);
        let stdout = segments.pop().unwrap_or_default();

        // Prefix segments arrive in execution order, which is reversed.
        for (affix, segment) in self.prefixes.into_iter().zip(segments.into_iter().rev()) {
            if let Some(capture) = affix.capture {
                capture(segment);
            }
        }
        for (affix, segment) in self.postfixes.into_iter().zip(postfix_outputs) {
            if let Some(capture) = affix.capture {
                capture(segment);
            }
        }

        Ok(BatchOutput {
            stdout,
            stderr: output.stderr,
            transport_exit_status: output.exit_status,
        })
    }
}

/// Normalize line endings, strip trailing padding from every line, then
/// split on the sentinel and trim each segment.
#[must_use]
pub fn split_segments(stdout: &str, sentinel: &str) -> Vec<String> {
    let normalized = stdout
        .replace("\r\n", "\n")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");

    normalized
        .split(sentinel)
        .map(|segment| segment.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tokio_test::block_on;
    use trainsh_core::{
        Platform, PlatformFamily, TargetDescriptor, Transport,
        fake::{FakeTransport, REPORTED_EXIT_STATUS},
    };

    use super::*;

    fn connect(transport: &FakeTransport) -> Box<dyn Connection> {
        let target = TargetDescriptor::parse("fake://").unwrap();
        block_on(transport.connect(&target)).unwrap()
    }

    struct CannedConnection {
        stdout: &'static str,
        platform: Platform,
    }

    impl CannedConnection {
        fn new(stdout: &'static str) -> Self {
            Self {
                stdout,
                platform: Platform::new(PlatformFamily::Unix),
            }
        }
    }

    #[async_trait]
    impl Connection for CannedConnection {
        async fn run_command(&self, _script: &str) -> Result<CommandOutput, TransportError> {
            Ok(CommandOutput {
                stdout: self.stdout.to_string(),
                stderr: String::new(),
                exit_status: 0,
            })
        }

        fn platform(&self) -> &Platform {
            &self.platform
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct FailingConnection(Platform);

    #[async_trait]
    impl Connection for FailingConnection {
        async fn run_command(&self, _script: &str) -> Result<CommandOutput, TransportError> {
            Err(TransportError::CommandFailed("connection reset".to_string()))
        }

        fn platform(&self) -> &Platform {
            &self.0
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[test]
    fn test_prefixes_run_reversed_but_deliver_in_registration_order() {
        let transport = FakeTransport::posix();
        let handle = transport.handle();
        let conn = connect(&transport);

        let received = Mutex::new(Vec::new());
        let mut batch = Batch::new("echo MID").with_sentinel("S");
        batch
            .prefix_with("echo A", |out| received.lock().unwrap().push(("P1", out)))
            .prefix_with("echo B", |out| received.lock().unwrap().push(("P2", out)))
            .postfix_with("echo C", |out| received.lock().unwrap().push(("Q1", out)))
            .postfix_with("echo D", |out| received.lock().unwrap().push(("Q2", out)));

        let output = block_on(batch.run(conn.as_ref())).unwrap();

        assert_eq!(
            handle.last_script().unwrap(),
            "echo B\necho S\necho A\necho S\necho MID\necho S\necho C\necho S\necho D"
        );
        assert_eq!(output.stdout, "MID");
        let mut received = received.into_inner().unwrap();
        received.sort();
        assert_eq!(
            received,
            vec![
                ("P1", "A".to_string()),
                ("P2", "B".to_string()),
                ("Q1", "C".to_string()),
                ("Q2", "D".to_string()),
            ]
        );
    }

    #[test]
    fn test_recovers_every_segment_for_small_batches() {
        let conn = connect(&FakeTransport::posix());

        for prefixes in 0..=5 {
            for postfixes in 0..=5 {
                let received = Mutex::new(Vec::new());
                let mut batch = Batch::new("echo primary");
                for i in 0..prefixes {
                    let received = &received;
                    batch.prefix_with(format!("echo prefix-{i}"), move |out| {
                        received.lock().unwrap().push((format!("prefix-{i}"), out));
                    });
                }
                for i in 0..postfixes {
                    let received = &received;
                    batch.postfix_with(format!("echo postfix-{i}"), move |out| {
                        received.lock().unwrap().push((format!("postfix-{i}"), out));
                    });
                }

                let output = block_on(batch.run(conn.as_ref())).unwrap();
                assert_eq!(output.stdout, "primary");

                let received = received.into_inner().unwrap();
                assert_eq!(received.len(), prefixes + postfixes);
                for (label, out) in received {
                    assert_eq!(label, out, "P={prefixes} Q={postfixes}");
                }
            }
        }
    }

    #[test]
    fn test_captures_receive_all_expected_callbacks() {
        let conn = connect(&FakeTransport::posix());
        let count = Mutex::new(0);
        let mut batch = Batch::new("true");
        for _ in 0..3 {
            batch.prefix_with("echo x", |_| *count.lock().unwrap() += 1);
            batch.postfix_with("echo y", |_| *count.lock().unwrap() += 1);
        }
        batch.prefix("echo ignored");

        block_on(batch.run(conn.as_ref())).unwrap();
        assert_eq!(count.into_inner().unwrap(), 6);
    }

    #[test]
    fn test_sentinel_in_output_is_a_framing_error() {
        let conn = connect(&FakeTransport::posix());
        let called = Mutex::new(false);
        let mut batch = Batch::new(format!("echo {SENTINEL}"));
        batch
            .prefix_with("echo before", |_| *called.lock().unwrap() = true)
            .postfix_with("echo after", |_| *called.lock().unwrap() = true);

        let err = block_on(batch.run(conn.as_ref())).unwrap_err();
        assert!(matches!(
            err,
            AggregateError::Framing {
                expected: 3,
                found: 4
            }
        ));
        assert!(!called.into_inner().unwrap(), "captures must not run");
    }

    #[test]
    fn test_missing_segments_is_a_framing_error() {
        let conn = CannedConnection::new("only one segment");
        let mut batch = Batch::new("true");
        batch.postfix("pwd");

        let err = block_on(batch.run(&conn)).unwrap_err();
        assert!(matches!(
            err,
            AggregateError::Framing {
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn test_tolerates_crlf_and_padding() {
        let conn = CannedConnection::new("alpha   \r\nS  \r\n  line one  \r\nline two\t\r\nS\r\nomega \r\n");
        let prefix = Mutex::new(String::new());
        let postfix = Mutex::new(String::new());
        let mut batch = Batch::new("ignored").with_sentinel("S");
        batch
            .prefix_with("ignored", |out| *prefix.lock().unwrap() = out)
            .postfix_with("ignored", |out| *postfix.lock().unwrap() = out);

        let output = block_on(batch.run(&conn)).unwrap();
        assert_eq!(output.stdout, "line one\nline two");
        assert_eq!(prefix.into_inner().unwrap(), "alpha");
        assert_eq!(postfix.into_inner().unwrap(), "omega");
    }

    #[test]
    fn test_exit_capture_shares_the_primary_segment() {
        let transport = FakeTransport::posix();
        let handle = transport.handle();
        let conn = connect(&transport);

        let status = Mutex::new(String::new());
        let mut batch = Batch::new("false");
        batch
            .capture_exit_status("export CMD_EXIT=$?")
            .prefix("cd /srv")
            .postfix_with("echo $CMD_EXIT", |out| *status.lock().unwrap() = out);

        let output = block_on(batch.run(conn.as_ref())).unwrap();

        assert_eq!(
            handle.last_script().unwrap(),
            format!("cd /srv\necho {SENTINEL}\nfalse\nexport CMD_EXIT=$?\necho {SENTINEL}\necho $CMD_EXIT")
        );
        assert_eq!(status.into_inner().unwrap(), "1");
        assert_eq!(output.transport_exit_status, REPORTED_EXIT_STATUS);
    }

    #[test]
    fn test_transport_failure_propagates() {
        let conn = FailingConnection(Platform::new(PlatformFamily::Unix));
        let err = block_on(Batch::new("true").run(&conn)).unwrap_err();
        assert!(matches!(
            err,
            AggregateError::Transport(TransportError::CommandFailed(_))
        ));
    }

    #[test]
    fn test_split_keeps_empty_trailing_segments() {
        let segments = split_segments("a\nS\n\nS\n", "S");
        assert_eq!(segments, vec!["a", "", ""]);
    }
}
