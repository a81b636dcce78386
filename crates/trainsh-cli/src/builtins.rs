//! The `!`-prefixed built-in command table.

use std::{fmt, str::FromStr};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown built-in command: !{0}")]
pub struct UnknownBuiltin(pub String);

/// Commands handled by the shell itself rather than the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Builtin {
    ClearHistory,
    Connect,
    Detect,
    Download,
    Edit,
    Env,
    Help,
    History,
    Host,
    Ping,
    Pwd,
    Read,
    Reconnect,
    Session,
    Sessions,
    Upload,
}

impl Builtin {
    pub const ALL: [Self; 16] = [
        Self::ClearHistory,
        Self::Connect,
        Self::Detect,
        Self::Download,
        Self::Edit,
        Self::Env,
        Self::Help,
        Self::History,
        Self::Host,
        Self::Ping,
        Self::Pwd,
        Self::Read,
        Self::Reconnect,
        Self::Session,
        Self::Sessions,
        Self::Upload,
    ];

    /// Name as typed after `!`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ClearHistory => "clear-history",
            Self::Connect => "connect",
            Self::Detect => "detect",
            Self::Download => "download",
            Self::Edit => "edit",
            Self::Env => "env",
            Self::Help => "help",
            Self::History => "history",
            Self::Host => "host",
            Self::Ping => "ping",
            Self::Pwd => "pwd",
            Self::Read => "read",
            Self::Reconnect => "reconnect",
            Self::Session => "session",
            Self::Sessions => "sessions",
            Self::Upload => "upload",
        }
    }

    /// Argument synopsis.
    #[must_use]
    pub const fn synopsis(self) -> &'static str {
        match self {
            Self::Connect => "<url>",
            Self::Download => "<remote> <local>",
            Self::Edit | Self::Read => "<remote>",
            Self::Session => "<id>",
            Self::Upload => "<local> <remote>",
            _ => "",
        }
    }

    /// One-line description.
    #[must_use]
    pub const fn summary(self) -> &'static str {
        match self {
            Self::ClearHistory => "Forget the command history",
            Self::Connect => "Open (or switch to) a session for a target url",
            Self::Detect => "Show the remote platform and measure latency",
            Self::Download => "Copy a remote file to this machine",
            Self::Edit => "Edit a remote file with the local editor",
            Self::Env => "Show the captured remote environment",
            Self::Help => "Show this help",
            Self::History => "Show the command history",
            Self::Host => "Show the remote host name",
            Self::Ping => "Measure round-trip latency of an empty command",
            Self::Pwd => "Show the remote working directory",
            Self::Read => "View a remote file with the local pager",
            Self::Reconnect => "Reopen the connection and forget cached state",
            Self::Session => "Switch to another session",
            Self::Sessions => "List open sessions",
            Self::Upload => "Copy a local file to the remote side",
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Builtin {
    type Err = UnknownBuiltin;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|b| b.name() == normalized)
            .ok_or_else(|| UnknownBuiltin(s.to_string()))
    }
}

/// Help text for the whole shell.
#[must_use]
pub fn help_text() -> String {
    let mut text = String::from(
        "Commands are run on the current session; working directory and \
         environment carry over between commands.\n\n\
         Prefixes:\n  \
         ?            this help\n  \
         .<cmd>       run <cmd> on this machine\n  \
         @<id> <cmd>  run <cmd> on session <id>\n  \
         !<builtin>   run a built-in command\n\n\
         Built-ins:\n",
    );
    for builtin in Builtin::ALL {
        let usage = format!("!{} {}", builtin.name(), builtin.synopsis());
        text.push_str(&format!("  {:<28} {}\n", usage.trim_end(), builtin.summary()));
    }
    text.push_str("\nLeave with exit, quit, logout, disconnect or !!!\n");
    text
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_names_round_trip_through_from_str() {
        for builtin in Builtin::ALL {
            assert_eq!(builtin.name().parse::<Builtin>().unwrap(), builtin);
        }
    }

    #[test]
    fn test_underscore_alias() {
        assert_eq!(
            "clear_history".parse::<Builtin>().unwrap(),
            Builtin::ClearHistory
        );
    }

    #[test]
    fn test_unknown() {
        assert_eq!(
            "frobnicate".parse::<Builtin>().unwrap_err(),
            UnknownBuiltin("frobnicate".to_string())
        );
    }

    #[test]
    fn test_help_lists_every_builtin() {
        let help = help_text();
        for builtin in Builtin::ALL {
            assert!(help.contains(&format!("!{}", builtin.name())), "{builtin}");
        }
        assert!(help.contains("!download <remote> <local>"));
    }
}
