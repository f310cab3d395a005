// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::collections::VecDeque;

/// Fixed-capacity byte FIFO backing the RX/TX paths of the serial models.
///
/// A push onto a full FIFO is rejected and leaves the contents untouched;
/// the caller decides whether that is backpressure or a dropped byte.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ByteFifo {
    buf: VecDeque<u8>,
    capacity: usize,
}

impl ByteFifo {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns `false` when the byte was dropped because the FIFO is full.
    pub fn push(&mut self, value: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.buf.push_back(value);
        true
    }

    /// Oldest byte first. Callers are expected to check `is_empty` before popping.
    pub fn pop(&mut self) -> Option<u8> {
        self.buf.pop_front()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    /// Occupancy is at least `capacity / 2`.
    pub fn is_half_full(&self) -> bool {
        self.buf.len() >= self.capacity / 2
    }

    /// log2 of the capacity, rounded down. Hardware advertises this in CTRL.
    pub fn log2_capacity(&self) -> u32 {
        if self.capacity == 0 {
            0
        } else {
            usize::BITS - 1 - self.capacity.leading_zeros()
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.buf.iter().copied().collect()
    }

    /// Replaces the contents, oldest byte first. Bytes beyond capacity are rejected.
    pub fn load(&mut self, bytes: &[u8]) -> Result<(), usize> {
        if bytes.len() > self.capacity {
            return Err(bytes.len());
        }
        self.buf.clear();
        self.buf.extend(bytes.iter().copied());
        Ok(())
    }
}
