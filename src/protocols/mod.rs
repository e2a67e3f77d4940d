//! Protocol implementations.
//!
//! Each protocol supplies a `Handler` for the reactor in `runtime`.
//!
//! - `greeter`: telnet-friendly demo service (hello / path / goodby)

pub mod greeter;
