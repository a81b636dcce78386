//! Classification of typed input lines.

/// Lines that end the interactive loop.
pub const EXIT_COMMANDS: [&str; 5] = ["!!!", "exit", "quit", "logout", "disconnect"];

/// Programs that need a terminal and cannot run over a script transport.
pub const INTERACTIVE_COMMANDS: [&str; 5] = ["more", "less", "vi", "vim", "nano"];

/// What a typed line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Blank line.
    Empty,
    /// Leave the shell.
    Exit,
    /// `?`
    Help,
    /// `.cmd` - run on this machine.
    Local(String),
    /// `!name args...`
    Builtin { name: String, args: Vec<String> },
    /// `@N cmd` - run on session N instead of the current one.
    Via { session: String, command: String },
    /// Anything else - run on the current session.
    Remote(String),
}

impl Input {
    /// Classify a line.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if EXIT_COMMANDS.contains(&line) {
            return Self::Exit;
        }
        if line == "?" {
            return Self::Help;
        }

        if let Some(rest) = line.strip_prefix('.') {
            return Self::Local(rest.to_string());
        }
        if let Some(rest) = line.strip_prefix('!') {
            let mut words = rest.split_whitespace().map(str::to_string);
            let name = words.next().unwrap_or_default();
            return Self::Builtin {
                name,
                args: words.collect(),
            };
        }
        if let Some(rest) = line.strip_prefix('@') {
            let (session, command) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            return Self::Via {
                session: session.to_string(),
                command: command.trim().to_string(),
            };
        }

        Self::Remote(line.to_string())
    }
}

/// Whether a remote command would start an interactive program.
#[must_use]
pub fn is_interactive(command: &str) -> bool {
    let program = command.split_whitespace().next().unwrap_or_default();
    INTERACTIVE_COMMANDS.contains(&program)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_prefixes() {
        assert_eq!(Input::parse("  "), Input::Empty);
        assert_eq!(Input::parse("?"), Input::Help);
        assert_eq!(Input::parse(".ls -la"), Input::Local("ls -la".to_string()));
        assert_eq!(
            Input::parse("!download /etc/passwd /tmp"),
            Input::Builtin {
                name: "download".to_string(),
                args: vec!["/etc/passwd".to_string(), "/tmp".to_string()],
            }
        );
        assert_eq!(
            Input::parse("@1 uname -a"),
            Input::Via {
                session: "1".to_string(),
                command: "uname -a".to_string(),
            }
        );
        assert_eq!(Input::parse("ls /"), Input::Remote("ls /".to_string()));
    }

    #[test]
    fn test_exit_commands() {
        for line in EXIT_COMMANDS {
            assert_eq!(Input::parse(line), Input::Exit);
        }
        assert_eq!(
            Input::parse("exit 3 && true"),
            Input::Remote("exit 3 && true".to_string())
        );
    }

    #[test]
    fn test_via_without_command() {
        assert_eq!(
            Input::parse("@2"),
            Input::Via {
                session: "2".to_string(),
                command: String::new(),
            }
        );
    }

    #[test]
    fn test_interactive_detection() {
        assert!(is_interactive("vim /etc/hosts"));
        assert!(is_interactive("less"));
        assert!(!is_interactive("lessecho foo"));
        assert!(!is_interactive("cat /etc/hosts"));
    }
}
