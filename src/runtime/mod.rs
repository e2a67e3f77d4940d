//! Single-threaded reactor for line-oriented TCP clients.
//!
//! Pieces, leaves first:
//! - `BufferPool`: per-slot input buffers, allocated once and recycled
//! - `ClientTable`: fixed-capacity slot registry with first-fit reuse
//! - `framer`: terminator scanning (LF, CR, ^D)
//! - `TimeoutClock`: interval-aligned ticks that age idle clients
//! - `Event` / `Handler` / `Control`: the callback boundary
//! - `Server`: the mio poll loop tying it all together

mod buffer;
mod client;
mod clock;
mod event;
mod event_loop;
pub mod framer;

pub use buffer::BufferPool;
pub use client::{ClientId, ClientSlot, ClientTable};
pub use clock::{unix_now, TimeoutClock};
pub use event::{Control, Event, EventKind, Handler};
pub use event_loop::Server;

use crate::config::Config;

/// Bind a server for `config` and run it with `handler`.
pub fn run<H: Handler>(config: &Config, handler: &mut H) -> crate::error::Result<()> {
    let mut server = Server::bind(config)?;
    server.run(handler)
}
