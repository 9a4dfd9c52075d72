use crate::error::BufferError;

pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Growable byte region with separate read and write cursors.
///
/// `rpos <= wpos <= capacity` holds at all times. Bytes between the two cursors are the "active"
/// (unread) part of the buffer.
#[derive(Debug, Clone)]
pub struct MessageBuffer {
    storage: Vec<u8>,
    wpos: usize,
    rpos: usize,
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }
}

impl MessageBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity],
            wpos: 0,
            rpos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn active_size(&self) -> usize {
        self.wpos - self.rpos
    }

    pub fn remaining_space(&self) -> usize {
        self.storage.len() - self.wpos
    }

    pub fn is_empty(&self) -> bool {
        self.active_size() == 0
    }

    pub fn read_pos(&self) -> usize {
        self.rpos
    }

    pub fn write_pos(&self) -> usize {
        self.wpos
    }

    /// The unread bytes.
    pub fn read_slice(&self) -> &[u8] {
        &self.storage[self.rpos..self.wpos]
    }

    /// Free space after the write cursor; pair with `write_completed` after filling it.
    pub fn write_slice(&mut self) -> &mut [u8] {
        &mut self.storage[self.wpos..]
    }

    pub fn read_completed(&mut self, bytes: usize) {
        self.rpos = (self.rpos + bytes).min(self.wpos);
    }

    pub fn write_completed(&mut self, bytes: usize) {
        self.wpos = (self.wpos + bytes).min(self.storage.len());
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        let remaining = self.remaining_space();
        if bytes.len() > remaining {
            return Err(BufferError::InsufficientSpace {
                requested: bytes.len(),
                remaining,
            });
        }

        self.storage[self.wpos..self.wpos + bytes.len()].copy_from_slice(bytes);
        self.wpos += bytes.len();
        Ok(())
    }

    pub fn reset(&mut self) {
        self.wpos = 0;
        self.rpos = 0;
    }

    /// Changes capacity, compacting unread bytes to offset zero first. Never drops unread bytes,
    /// so the resulting capacity is at least `active_size()`.
    pub fn resize(&mut self, capacity: usize) {
        self.normalize();
        self.storage.resize(capacity.max(self.wpos), 0);
    }

    /// Moves unread bytes to the start of the buffer.
    pub fn normalize(&mut self) {
        if self.rpos == 0 {
            return;
        }

        if self.rpos != self.wpos {
            self.storage.copy_within(self.rpos..self.wpos, 0);
        }
        self.wpos -= self.rpos;
        self.rpos = 0;
    }

    /// Grows by half when there is no room left to read into.
    pub fn ensure_free_space(&mut self) {
        if self.remaining_space() == 0 {
            let capacity = self.capacity();
            self.storage.resize((capacity + capacity / 2).max(DEFAULT_BUFFER_SIZE), 0);
        }
    }

    /// Consumes the buffer, keeping only the unread bytes. No copy when nothing was read yet.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.storage.truncate(self.wpos);
        if self.rpos > 0 {
            self.storage.drain(..self.rpos);
        }
        self.storage
    }
}
