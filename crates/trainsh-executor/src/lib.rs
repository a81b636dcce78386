//! Command aggregation for trainsh sessions.
//!
//! Provides:
//! - `Batch` - Pack prefixes, a primary instruction and postfixes into one
//!   script and split the combined output back apart
//! - `ShellDialect` - Platform-conditional instruction text

pub mod aggregate;
pub mod dialect;

pub use aggregate::{AggregateError, Batch, BatchOutput};
pub use dialect::{DialectError, ShellDialect};
