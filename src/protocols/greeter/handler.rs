//! Greeter protocol handler for the line reactor.

use bytes::BytesMut;
use tracing::{debug, info};

use super::parser::{self, Command};
use crate::runtime::{ClientSlot, Control, Event, Handler};

/// Handler answering `hello`, `path` and `goodby`.
#[derive(Debug, Default)]
pub struct Greeter;

impl Greeter {
    pub fn new() -> Self {
        Greeter
    }
}

impl Handler for Greeter {
    fn handle(&mut self, event: Event<'_>, ctl: &mut Control) {
        match event {
            Event::ClientConnect(client) => {
                info!(client = %client.id(), peer = ?client.peer_addr(), "Client connect");
                reply(client, parser::response_greeting());
            }
            Event::ClientEnd(client) | Event::ClientError(client) | Event::ClientTimeout(client) => {
                info!(client = %client.id(), "Client dropped");
            }
            Event::ClientData(client, line) => match parser::parse(line) {
                Command::Hello => reply(client, parser::response_hello()),
                Command::Path => {
                    let path = std::env::var_os("PATH").unwrap_or_default();
                    let path = path.to_string_lossy();
                    let mut resp = BytesMut::with_capacity(path.len() + 3);
                    resp.extend_from_slice(path.as_bytes());
                    resp.extend_from_slice(parser::prompt());
                    reply(client, &resp);
                }
                Command::Goodby => {
                    info!(client = %client.id(), "Client said goodby");
                    ctl.drop_client(client.id());
                }
                Command::Unknown => reply(client, parser::response_unknown()),
            },
            Event::ClientOverflow(..) | Event::TimerExpired => {}
        }
    }
}

fn reply(client: &ClientSlot, msg: &[u8]) {
    if let Err(e) = client.send(msg) {
        debug!(client = %client.id(), error = %e, "Reply failed");
    }
}
