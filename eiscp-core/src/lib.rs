//! # eiscp-core
//!
//! Control session for AV receivers speaking eISCP (ASCII commands in a
//! 16-byte `ISCP` envelope over TCP).
//!
//! This crate contains:
//! - **Framing**: `FrameHeader`, `encode`/`decode` and `EiscpCodec` for
//!   `tokio_util` framed reads
//! - **Commands**: `CommandTable` resolving symbolic names to opcodes,
//!   templates and macros
//! - **State**: `StateStore` turning notifications into a `DeviceState`
//! - **Observers**: `ObserverRegistry`, re-entrant snapshot fan-out
//! - **Network**: `Session` with a supervised reader and a queued writer
//! - **Navigation**: `Navigator`, confirmed and deadline-bounded macro steps
//! - **Client**: `Client`, resolve-and-dispatch on top of all of the above
//! - **Error**: `EiscpError`, one `thiserror` enum for every failure

pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod header;
pub mod navigation;
pub mod network;
pub mod observer;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::{Client, Outcome, REFRESH_COMMANDS};
pub use codec::{EiscpCodec, decode, encode, encode_notification};
pub use command::{CommandDescriptor, CommandTable, Resolved};
pub use config::{DEFAULT_PORT, SessionConfig};
pub use error::EiscpError;
pub use header::{FrameHeader, HEADER_SIZE};
pub use navigation::{Expectation, MacroPlan, MacroReport, Navigator, PlannedStep, Remote, Step};
pub use network::{ConnectionInfo, Session, SessionEvent, SessionEvents};
pub use observer::{ObserverId, ObserverRegistry, StateObserver};
pub use state::{DeviceState, StateStore, Update};
