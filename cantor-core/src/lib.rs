//! # cantor-core
//!
//! Session-level wiring for cantor: configuration loading, the
//! `AudioSession` that owns the voice bank and its worker threads, and the
//! feed that turns platform interruptions into suspend-tree updates.

pub mod config;
pub mod interrupts;
pub mod session;

pub use config::Config;
pub use interrupts::{InterruptEvent, InterruptSender};
pub use session::AudioSession;
