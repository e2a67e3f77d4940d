//! Greeter protocol implementation.
//!
//! A tiny interactive service meant to be driven with `telnet`:
//! - On connect the server sends `Greetings\n> `
//! - `hello` gets `Hello\n> `
//! - `path` gets the server's `PATH` followed by `\n> `
//! - `goodby` closes the connection
//! - anything else gets `Huh?\n> `
//!
//! Commands are matched on their prefix, case-sensitively, so `hello there`
//! is a `hello`.
//!
//! ## Protocol Format
//!
//! ```text
//! Server:   Greetings\n>
//! Client:   hello\r\n
//! Server:   Hello\n>
//! Client:   goodby\r\n
//! (connection closed)
//! ```

pub mod handler;
pub mod parser;

pub use handler::Greeter;
