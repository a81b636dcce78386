//! Core abstractions for trainsh sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `Transport` / `Connection` - The single "run this script" primitive
//! - `TargetDescriptor` - URL-like connection descriptors with redaction
//! - `TransportRegistry` - Scheme to backend resolution
//! - `fake` - Scripted in-memory transport (feature: test-util)

pub mod registry;
pub mod target;
pub mod traits;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use registry::TransportRegistry;
pub use target::TargetDescriptor;
pub use traits::{CommandOutput, Connection, Platform, PlatformFamily, Transport, TransportError};

/// Marker echoed between instructions of one aggregated script.
pub const SENTINEL: &str = "mVDK6afaqa6fb7kcMqTpR2aoUFbYsRt889G4eGoI";

/// Remote variable holding the exit status of the primary instruction.
pub const EXIT_STATUS_VAR: &str = "CMD_EXIT";
