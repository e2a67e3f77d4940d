//! mio event loop implementation.
//!
//! Readiness-based model: poll tells us when sockets are ready,
//! then we perform non-blocking accept/read syscalls.
//! Uses epoll on Linux, kqueue on macOS.
//!
//! ## Readiness latching
//!
//! mio reports readiness edge-triggered. Each slot latches the edge and
//! keeps it until a read returns `WouldBlock`, which lets a slot that
//! skipped its read (overflow) or did not drain the socket be serviced on
//! the next iteration. While anything is latched the poll does not block.

use crate::config::Config;
use crate::error::{ReactorError, Result};
use crate::runtime::client::{ClientTable, Received};
use crate::runtime::clock::{unix_now, TimeoutClock};
use crate::runtime::event::{Control, Event, Handler};
use crate::runtime::framer::{self, Frame};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);

/// A single-threaded line server.
///
/// Owns the listener, the poll instance and the client table. Everything
/// happens on the thread that calls [`Server::run`].
pub struct Server {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    local_addr: SocketAddr,
    table: ClientTable,
    clock: TimeoutClock,
    control: Control,
    poll_interval: Duration,
    idle_limit: u32,
    /// Latched listener readiness; cleared once accept would block.
    listener_ready: bool,
    shut_down: bool,
}

impl Server {
    /// Bind the listening socket and set up an empty client table.
    pub fn bind(config: &Config) -> Result<Self> {
        let addr = config.listen_addr()?;

        let listener = create_listener(addr, config.backlog)?;
        let mut listener = TcpListener::from_std(listener);
        let local_addr = listener.local_addr().map_err(ReactorError::Socket)?;

        let poll = Poll::new().map_err(ReactorError::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(ReactorError::Register)?;

        let tick_interval = config.tick_interval.max(Duration::from_secs(1));

        info!(
            addr = %local_addr,
            max_clients = config.max_clients,
            buffer_size = config.buffer_size,
            tick_secs = tick_interval.as_secs(),
            idle_limit = config.idle_limit,
            "Listening"
        );

        Ok(Self {
            poll,
            events: Events::with_capacity(config.max_clients + 1),
            listener,
            local_addr,
            table: ClientTable::new(config.max_clients, config.buffer_size),
            clock: TimeoutClock::new(tick_interval, unix_now()),
            control: Control::default(),
            poll_interval: config.poll_interval,
            idle_limit: config.idle_limit,
            listener_ready: false,
            shut_down: false,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connected clients.
    pub fn connected(&self) -> usize {
        self.table.len()
    }

    pub fn table(&self) -> &ClientTable {
        &self.table
    }

    /// Run until the handler calls [`Control::stop`] or a fatal error occurs.
    ///
    /// The server is shut down before this returns either way.
    pub fn run<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        self.control = Control::default();

        let result = loop {
            match self.run_once(handler) {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        self.shutdown();
        result
    }

    /// One loop iteration: poll, tick the clock, accept, read.
    ///
    /// Returns `false` once the handler has asked the reactor to stop.
    pub fn run_once<H: Handler>(&mut self, handler: &mut H) -> Result<bool> {
        let timeout = if self.listener_ready || self.table.has_pending() {
            Duration::ZERO
        } else {
            self.poll_interval
        };

        if let Err(e) = self.poll.poll(&mut self.events, Some(timeout)) {
            if e.kind() != io::ErrorKind::Interrupted {
                return Err(ReactorError::Poll(e));
            }
            self.events.clear();
        }

        for event in self.events.iter() {
            match event.token() {
                LISTENER_TOKEN => self.listener_ready = true,
                Token(idx) if idx < self.table.capacity() => {
                    self.table.slot_mut(idx).set_readable(true);
                }
                Token(idx) => debug!(token = idx, "Event for unknown token"),
            }
        }

        if self.clock.poll(unix_now()) {
            self.tick(handler);
        }

        if self.listener_ready {
            self.accept_clients(handler)?;
        }

        for idx in 0..self.table.capacity() {
            if self.table.slot(idx).is_readable() {
                self.read_client(idx, handler)?;
            }
        }

        Ok(!self.control.is_stopping())
    }

    /// Age all clients, time out the idle ones, then report the tick.
    fn tick<H: Handler>(&mut self, handler: &mut H) {
        for idx in self.table.age(self.idle_limit) {
            // An earlier timeout handler may have dropped this one already
            if !self.table.slot(idx).is_connected() {
                continue;
            }

            debug!(
                client = %self.table.slot(idx).id(),
                idle_ticks = self.table.slot(idx).idle_ticks(),
                "Client timed out"
            );
            handler.handle(Event::ClientTimeout(self.table.slot(idx)), &mut self.control);
            self.apply_control();
            self.drop_slot(idx);
        }

        trace!(connected = self.table.len(), "Timer expired");
        handler.handle(Event::TimerExpired, &mut self.control);
        self.apply_control();
    }

    fn accept_clients<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(pair) => pair,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.listener_ready = false;
                    break;
                }
                Err(ref e) if is_transient_accept_error(e) => {
                    debug!(error = %e, "Transient accept error, retrying");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Accept error");
                    self.listener_ready = false;
                    break;
                }
            };

            let Some(idx) = self.table.first_free() else {
                warn!(
                    peer = %peer,
                    max_clients = self.table.capacity(),
                    "Max clients exceeded, rejecting connection"
                );
                let _ = stream.shutdown(Shutdown::Both);
                continue;
            };

            match self.table.claim(idx, stream, peer, self.poll.registry()) {
                Ok(slot) => debug!(client = %slot.id(), peer = %peer, "Client connected"),
                Err(ReactorError::Register(e)) => {
                    warn!(peer = %peer, error = %e, "Failed to register client");
                    continue;
                }
                Err(e) => return Err(e),
            }

            handler.handle(Event::ClientConnect(self.table.slot(idx)), &mut self.control);
            self.apply_control();
        }

        Ok(())
    }

    fn read_client<H: Handler>(&mut self, idx: usize, handler: &mut H) -> Result<()> {
        if self.table.buffers().get(idx).is_none() {
            return Err(ReactorError::MissingBuffer { slot: idx });
        }

        let id = self.table.slot(idx).id();

        // Full buffer with no terminator: report and discard, read next time
        let used = self.table.slot(idx).used();
        if used >= self.table.buffers().buffer_size() {
            debug!(client = %id, used, "Client buffer overflow");
            self.table.slot_mut(idx).set_terminator(None);
            handler.handle(
                Event::ClientOverflow(self.table.slot(idx), self.table.contents(idx, used)),
                &mut self.control,
            );
            self.apply_control();
            self.table.slot_mut(idx).clear();
            return Ok(());
        }

        match self.table.receive(idx)? {
            Received::Data(n) => trace!(client = %id, bytes = n, "Received"),
            Received::WouldBlock => return Ok(()),
            Received::Closed => {
                self.drop_slot(idx);
                debug!(client = %id, "Client closed connection");
                handler.handle(Event::ClientError(self.table.slot(idx)), &mut self.control);
                self.apply_control();
                return Ok(());
            }
            Received::Failed(e) => {
                self.drop_slot(idx);
                warn!(client = %id, error = %e, "Read error");
                handler.handle(Event::ClientError(self.table.slot(idx)), &mut self.control);
                self.apply_control();
                return Ok(());
            }
        }

        let used = self.table.slot(idx).used();
        let Frame::Complete { offset, terminator } = framer::scan(self.table.contents(idx, used))
        else {
            return Ok(());
        };
        self.table.slot_mut(idx).set_terminator(Some(offset));

        if terminator.is_end() {
            // The connection goes first; the handler sees the final data on
            // an already closed client.
            self.drop_slot(idx);
            debug!(client = %id, "Client sent end of transmission");

            if offset > 0 {
                handler.handle(
                    Event::ClientData(self.table.slot(idx), self.table.contents(idx, offset)),
                    &mut self.control,
                );
                self.apply_control();
            }
            handler.handle(Event::ClientEnd(self.table.slot(idx)), &mut self.control);
            self.apply_control();
        } else {
            trace!(client = %id, len = offset, "Client message");
            handler.handle(
                Event::ClientData(self.table.slot(idx), self.table.contents(idx, offset)),
                &mut self.control,
            );
            self.apply_control();
        }

        // Anything after the terminator in this read is discarded
        self.table.slot_mut(idx).clear();
        Ok(())
    }

    /// Carry out drop requests the handler just made.
    fn apply_control(&mut self) {
        for id in self.control.take_drops() {
            if self.table.get(id).is_some() && self.drop_slot(id.index()) {
                debug!(client = %id, "Client dropped by handler");
            }
        }
    }

    fn drop_slot(&mut self, idx: usize) -> bool {
        self.table.release(idx, self.poll.registry())
    }

    /// Drop every client and free every buffer. Runs at most once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let (dropped, freed) = self.table.shutdown(self.poll.registry());
        let _ = self.poll.registry().deregister(&mut self.listener);
        info!(dropped, freed, "Server shut down");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Accept failures that concern a single pending connection. The listener
/// stays latched so connections queued behind it are still taken.
fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
    )
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr, backlog: i32) -> Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )
    .map_err(ReactorError::Socket)?;

    socket
        .set_reuse_address(true)
        .map_err(ReactorError::Socket)?;
    socket.set_nonblocking(true).map_err(ReactorError::Socket)?;
    socket
        .bind(&addr.into())
        .map_err(|source| ReactorError::Bind { addr, source })?;
    socket
        .listen(backlog)
        .map_err(|source| ReactorError::Listen { addr, source })?;

    Ok(socket.into())
}
