//! Events delivered to the embedding application.
//!
//! The reactor calls [`Handler::handle`] synchronously on the loop thread.
//! Anything the handler wants the reactor to do in return (drop a client,
//! stop) goes through [`Control`] and is applied as soon as the handler
//! returns.

use crate::runtime::client::{ClientId, ClientSlot};
use std::fmt;

/// A state change reported by the reactor.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// A clock tick elapsed. Fires regardless of connected clients.
    TimerExpired,
    /// A client connected and may be sent a greeting.
    ClientConnect(&'a ClientSlot),
    /// A framed message, terminator excluded.
    ///
    /// When the message was ended by ^D the client has already been dropped
    /// and replies will fail.
    ClientData(&'a ClientSlot, &'a [u8]),
    /// The client sent ^D. Already dropped.
    ClientEnd(&'a ClientSlot),
    /// The peer closed the connection or a receive failed. Already dropped.
    ClientError(&'a ClientSlot),
    /// The buffer filled without a terminator. Carries the full buffer, which
    /// is discarded once the handler returns. The client stays connected.
    ClientOverflow(&'a ClientSlot, &'a [u8]),
    /// The client was idle for too long. Dropped once the handler returns.
    ClientTimeout(&'a ClientSlot),
}

impl<'a> Event<'a> {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::TimerExpired => EventKind::TimerExpired,
            Event::ClientConnect(_) => EventKind::ClientConnect,
            Event::ClientData(..) => EventKind::ClientData,
            Event::ClientEnd(_) => EventKind::ClientEnd,
            Event::ClientError(_) => EventKind::ClientError,
            Event::ClientOverflow(..) => EventKind::ClientOverflow,
            Event::ClientTimeout(_) => EventKind::ClientTimeout,
        }
    }

    /// The client this event concerns, if any.
    pub fn client(&self) -> Option<&'a ClientSlot> {
        match *self {
            Event::TimerExpired => None,
            Event::ClientConnect(c)
            | Event::ClientData(c, _)
            | Event::ClientEnd(c)
            | Event::ClientError(c)
            | Event::ClientOverflow(c, _)
            | Event::ClientTimeout(c) => Some(c),
        }
    }
}

/// Tag-only view of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TimerExpired,
    ClientConnect,
    ClientData,
    ClientEnd,
    ClientError,
    ClientOverflow,
    ClientTimeout,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::TimerExpired => "timer_expired",
            EventKind::ClientConnect => "client_connect",
            EventKind::ClientData => "client_data",
            EventKind::ClientEnd => "client_end",
            EventKind::ClientError => "client_error",
            EventKind::ClientOverflow => "client_overflow",
            EventKind::ClientTimeout => "client_timeout",
        };
        f.write_str(name)
    }
}

/// Requests a handler makes of the reactor.
#[derive(Debug, Default)]
pub struct Control {
    drops: Vec<ClientId>,
    stop: bool,
}

impl Control {
    /// Drop a client once the handler returns. Dropping a client that is
    /// already gone is a no-op.
    pub fn drop_client(&mut self, id: ClientId) {
        self.drops.push(id);
    }

    /// Stop the reactor at the end of the current loop iteration.
    pub fn stop(&mut self) {
        self.stop = true;
    }

    pub fn is_stopping(&self) -> bool {
        self.stop
    }

    pub(crate) fn take_drops(&mut self) -> Vec<ClientId> {
        std::mem::take(&mut self.drops)
    }
}

/// The embedding application's side of the reactor.
pub trait Handler {
    fn handle(&mut self, event: Event<'_>, ctl: &mut Control);
}

impl<F> Handler for F
where
    F: FnMut(Event<'_>, &mut Control),
{
    fn handle(&mut self, event: Event<'_>, ctl: &mut Control) {
        self(event, ctl)
    }
}
