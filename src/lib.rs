//! line-reactor: a multi-client line server engine.
//!
//! Accepts many TCP connections on one port, polls them from a single
//! thread, frames input on LF, CR or ^D, and hands a small set of events
//! to an application supplied [`Handler`]:
//! - `ClientConnect`, `ClientData`, `ClientEnd`, `ClientError`
//! - `ClientOverflow` when a message outgrows the slot buffer
//! - `ClientTimeout` after too many idle clock ticks
//! - `TimerExpired` once per tick, whether or not anyone is connected
//!
//! Configuration via CLI arguments or TOML file.

pub mod config;
pub mod error;
pub mod protocols;
pub mod runtime;

pub use config::Config;
pub use error::ReactorError;
pub use runtime::{ClientId, ClientSlot, Control, Event, EventKind, Handler, Server};
