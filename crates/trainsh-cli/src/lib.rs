//! Interactive front end for trainsh.
//!
//! Provides:
//! - `Config` - Optional TOML settings file
//! - `Input` - Classification of a typed line
//! - `Builtin` - The `!`-prefixed command table
//! - `history` - Command history persisted between runs
//! - `Shell` - The read-eval loop driving a `SessionRegistry`

pub mod builtins;
pub mod config;
pub mod history;
pub mod input;
pub mod prompt;
pub mod shell;

pub use builtins::Builtin;
pub use config::{Config, ConfigError};
pub use input::Input;
pub use shell::{Flow, Shell};

/// Product name shown in messages.
pub const PRODUCT: &str = "trainsh";
