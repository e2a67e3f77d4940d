//! Fixed-capacity client table.
//!
//! Each slot holds at most one live connection. A slot is free exactly when
//! it has no stream; new connections take the lowest free index, so slot
//! numbers (and client ids) are reused as clients come and go.

use crate::error::{ReactorError, Result};
use crate::runtime::buffer::BufferPool;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};

/// Identity of a slot's current occupant (slot index + 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(usize);

impl ClientId {
    pub(crate) fn from_index(idx: usize) -> Self {
        ClientId(idx + 1)
    }

    /// Slot index this id refers to.
    pub fn index(self) -> usize {
        self.0 - 1
    }

    /// Numeric id as shown to users.
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single client slot.
///
/// Handlers only ever see `&ClientSlot`. After a drop the id and peer
/// address are kept so the event reporting the drop can still name the
/// client.
#[derive(Debug)]
pub struct ClientSlot {
    id: ClientId,
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
    /// Valid bytes in the slot buffer.
    used: usize,
    /// Offset of the last terminator found.
    terminator: Option<usize>,
    idle_ticks: u32,
    /// Latched readiness; cleared once a read would block.
    readable: bool,
}

impl ClientSlot {
    fn new(idx: usize) -> Self {
        Self {
            id: ClientId::from_index(idx),
            stream: None,
            peer: None,
            used: 0,
            terminator: None,
            idle_ticks: 0,
            readable: false,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Peer address captured at accept time.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Whether the slot currently owns a live connection.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Bytes currently buffered.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Offset of the terminator that produced the current event, if any.
    pub fn terminator(&self) -> Option<usize> {
        self.terminator
    }

    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    /// Send bytes straight to the client socket.
    ///
    /// No buffering: a short write or `WouldBlock` is returned to the caller
    /// as is. Fails with `NotConnected` once the slot has been dropped.
    pub fn send(&self, data: &[u8]) -> io::Result<usize> {
        match &self.stream {
            Some(stream) => {
                let mut stream = stream;
                stream.write(data)
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "client has been dropped",
            )),
        }
    }

    pub(crate) fn is_readable(&self) -> bool {
        self.stream.is_some() && self.readable
    }

    pub(crate) fn set_readable(&mut self, readable: bool) {
        self.readable = readable;
    }

    /// Account for `n` freshly received bytes.
    pub(crate) fn received(&mut self, n: usize) {
        self.used += n;
        self.idle_ticks = 0;
    }

    pub(crate) fn set_terminator(&mut self, offset: Option<usize>) {
        self.terminator = offset;
    }

    /// Discard buffered input.
    pub(crate) fn clear(&mut self) {
        self.used = 0;
    }
}

/// Outcome of one receive on a client socket.
#[derive(Debug)]
pub(crate) enum Received {
    /// Bytes were appended to the slot buffer.
    Data(usize),
    /// Nothing to read right now; the readiness latch was cleared.
    WouldBlock,
    /// The peer closed the connection.
    Closed,
    /// The receive failed.
    Failed(io::Error),
}

/// Client slots plus their pooled input buffers.
pub struct ClientTable {
    slots: Vec<ClientSlot>,
    buffers: BufferPool,
}

impl ClientTable {
    /// Create a table of `capacity` slots with `buffer_size`-byte buffers.
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        Self {
            slots: (0..capacity).map(ClientSlot::new).collect(),
            buffers: BufferPool::new(capacity, buffer_size),
        }
    }

    /// Maximum number of clients.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_connected()).count()
    }

    /// Check if there are no clients.
    pub fn is_empty(&self) -> bool {
        !self.slots.iter().any(|s| s.is_connected())
    }

    /// Lowest free slot index.
    pub fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(|s| !s.is_connected())
    }

    /// Get a slot by index.
    ///
    /// # Panics
    /// Panics if `idx` is out of bounds.
    pub fn slot(&self, idx: usize) -> &ClientSlot {
        &self.slots[idx]
    }

    pub(crate) fn slot_mut(&mut self, idx: usize) -> &mut ClientSlot {
        &mut self.slots[idx]
    }

    /// Get a slot by client id, if the id is in range.
    pub fn get(&self, id: ClientId) -> Option<&ClientSlot> {
        self.slots.get(id.index())
    }

    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    /// Iterate over occupied slots.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &ClientSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_connected())
    }

    /// Whether any occupied slot still has unread input latched.
    pub fn has_pending(&self) -> bool {
        self.slots.iter().any(|s| s.is_readable())
    }

    /// Buffered bytes `[0, len)` of slot `idx`.
    pub fn contents(&self, idx: usize, len: usize) -> &[u8] {
        self.buffers.get(idx).map_or(&[][..], |buf| &buf[..len])
    }

    /// Receive into the free tail of slot `idx`'s buffer.
    ///
    /// The caller must make sure the buffer is not already full.
    pub(crate) fn receive(&mut self, idx: usize) -> Result<Received> {
        let slot = &mut self.slots[idx];
        let buf = self
            .buffers
            .get_mut(idx)
            .ok_or(ReactorError::MissingBuffer { slot: idx })?;
        let Some(stream) = slot.stream.as_mut() else {
            return Ok(Received::WouldBlock);
        };

        loop {
            match stream.read(&mut buf[slot.used..]) {
                Ok(0) => return Ok(Received::Closed),
                Ok(n) => {
                    slot.received(n);
                    return Ok(Received::Data(n));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    slot.readable = false;
                    return Ok(Received::WouldBlock);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Ok(Received::Failed(e)),
            }
        }
    }

    /// Bind a freshly accepted stream to slot `idx`.
    ///
    /// Allocates the slot buffer on first use and registers the stream for
    /// readable events under `Token(idx)`. If registration fails the stream
    /// is closed and the slot stays free.
    pub fn claim(
        &mut self,
        idx: usize,
        mut stream: TcpStream,
        peer: SocketAddr,
        registry: &Registry,
    ) -> Result<&ClientSlot> {
        debug_assert!(!self.slots[idx].is_connected(), "slot already occupied");

        self.buffers.ensure(idx)?;
        registry
            .register(&mut stream, Token(idx), Interest::READABLE)
            .map_err(ReactorError::Register)?;

        let slot = &mut self.slots[idx];
        slot.id = ClientId::from_index(idx);
        slot.stream = Some(stream);
        slot.peer = Some(peer);
        slot.used = 0;
        slot.terminator = None;
        slot.idle_ticks = 0;
        slot.readable = false;
        Ok(slot)
    }

    /// Drop the connection in slot `idx`.
    ///
    /// Deregisters, shuts down and closes the stream. The buffer stays with
    /// the slot. Returns `false` if the slot was already free.
    pub fn release(&mut self, idx: usize, registry: &Registry) -> bool {
        let slot = &mut self.slots[idx];
        let Some(mut stream) = slot.stream.take() else {
            return false;
        };
        slot.readable = false;

        let _ = registry.deregister(&mut stream);
        let _ = stream.shutdown(Shutdown::Both);
        true
    }

    /// Age every occupied slot by one tick.
    ///
    /// Returns the indices whose idle count now exceeds `idle_limit`.
    pub fn age(&mut self, idle_limit: u32) -> Vec<usize> {
        let mut expired = Vec::new();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if !slot.is_connected() {
                continue;
            }
            slot.idle_ticks += 1;
            if slot.idle_ticks > idle_limit {
                expired.push(idx);
            }
        }
        expired
    }

    /// Drop every live connection and free every buffer.
    ///
    /// Returns `(dropped, freed)`.
    pub fn shutdown(&mut self, registry: &Registry) -> (usize, usize) {
        let freed = self.buffers.release_all();
        let dropped = (0..self.slots.len())
            .filter(|&idx| self.release(idx, registry))
            .count();
        (dropped, freed)
    }
}
