// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::fifo::ByteFifo;

/// Occupancy predicates of one FIFO, sampled at a single instant.
///
/// Every read-only status bit of the serial models is a pure function of
/// these values, so the devices never store status independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FifoStatus {
    pub len: usize,
    pub empty: bool,
    pub full: bool,
    pub half_full: bool,
}

impl FifoStatus {
    pub fn of(fifo: &ByteFifo) -> Self {
        Self {
            len: fifo.len(),
            empty: fifo.is_empty(),
            full: fifo.is_full(),
            half_full: fifo.is_half_full(),
        }
    }

    /// Status of a path with no buffering: always drained.
    pub fn unbuffered() -> Self {
        Self {
            len: 0,
            empty: true,
            full: false,
            half_full: false,
        }
    }
}

/// Sets `mask` in `word` when `cond` holds.
#[inline]
pub fn flag(word: &mut u32, mask: u32, cond: bool) {
    if cond {
        *word |= mask;
    } else {
        *word &= !mask;
    }
}
