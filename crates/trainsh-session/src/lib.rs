//! Stateful shell sessions for trainsh.
//!
//! Provides:
//! - `Session` - Working directory, environment, exit status and host
//!   persistence over a stateless transport
//! - `SessionRegistry` - Caller-owned collection of sessions addressed by index

pub mod registry;
pub mod session;

pub use registry::{RegistryError, SessionId, SessionRegistry};
pub use session::{Session, SessionError, SessionState};
