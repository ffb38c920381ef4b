//! Instrumentation layer: per-page collectors and the bounded event buffer
//!
//! Collectors attach before navigation so the first document load is
//! observed. Every captured event carries a monotonic sequence number that
//! totally orders the buffer across event kinds; timestamps are advisory.

pub mod buffer;
pub mod collectors;
pub mod redact;

pub use buffer::{ConsoleEvent, ConsoleKind, EventBuffer, NetworkEvent};
pub use collectors::Collectors;
