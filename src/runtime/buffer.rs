//! Per-slot input buffer pool.
//!
//! One fixed-size buffer per client slot, addressed by slot index. Buffers
//! are allocated the first time a slot is claimed and then recycled for
//! every later connection on that slot; they are only released when the
//! server shuts down.

use crate::error::{ReactorError, Result};

/// Index-addressed pool of lazily allocated fixed-size buffers.
pub struct BufferPool {
    /// Buffer storage, `None` until the slot is first used.
    buffers: Vec<Option<Box<[u8]>>>,
    /// Size of each buffer.
    buffer_size: usize,
}

impl BufferPool {
    /// Create a pool with room for `count` buffers of `size` bytes.
    ///
    /// Nothing is allocated up front.
    pub fn new(count: usize, size: usize) -> Self {
        let mut buffers = Vec::with_capacity(count);
        buffers.resize_with(count, || None);

        Self {
            buffers,
            buffer_size: size,
        }
    }

    /// Make sure the buffer for `idx` exists, allocating it on first use.
    ///
    /// Returns `true` if this call performed the allocation.
    pub fn ensure(&mut self, idx: usize) -> Result<bool> {
        if self.buffers[idx].is_some() {
            return Ok(false);
        }

        let mut buf: Vec<u8> = Vec::new();
        buf.try_reserve_exact(self.buffer_size)
            .map_err(|source| ReactorError::BufferAlloc { slot: idx, source })?;
        buf.resize(self.buffer_size, 0u8);
        self.buffers[idx] = Some(buf.into_boxed_slice());
        Ok(true)
    }

    /// Get an immutable reference to a buffer, if allocated.
    ///
    /// # Panics
    /// Panics if `idx` is out of bounds.
    pub fn get(&self, idx: usize) -> Option<&[u8]> {
        self.buffers[idx].as_deref()
    }

    /// Get a mutable reference to a buffer, if allocated.
    ///
    /// # Panics
    /// Panics if `idx` is out of bounds.
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut [u8]> {
        self.buffers[idx].as_deref_mut()
    }

    /// Get the size of each buffer.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Get the number of buffer slots.
    pub fn capacity(&self) -> usize {
        self.buffers.len()
    }

    /// Get the number of buffers currently allocated.
    pub fn allocated(&self) -> usize {
        self.buffers.iter().filter(|b| b.is_some()).count()
    }

    /// Release every allocated buffer. Returns how many were freed.
    pub fn release_all(&mut self) -> usize {
        self.buffers
            .iter_mut()
            .filter_map(|b| b.take())
            .count()
    }
}
