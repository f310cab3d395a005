// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::{DigitalLevel, SignalSink};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

/// Trait representing a generic interrupt controller.
///
/// Device models only ever drive levels; what the controller does with them
/// (priorities, claim/complete) belongs to the host platform.
pub trait InterruptController: Debug + Send + Sync {
    /// Signal the controller that an interrupt line has changed.
    fn set_interrupt_pending(&self, irq: u32, pending: bool);

    /// Check if a specific interrupt line is currently asserted.
    fn is_interrupt_active(&self, irq: u32) -> bool;

    /// Lowest-numbered asserted line, if any.
    fn acknowledge_interrupt(&self) -> Option<u32>;

    /// Complete an interrupt, usually called by the CPU after an ISR finishes.
    fn complete_interrupt(&self, irq: u32);
}

/// Level-sensitive controller: a line is active exactly while its source holds it high.
#[derive(Debug, Default)]
pub struct IrqLatch {
    asserted: Mutex<BTreeSet<u32>>,
}

impl IrqLatch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pending(&self) -> Vec<u32> {
        match self.asserted.lock() {
            Ok(guard) => guard.iter().copied().collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl InterruptController for IrqLatch {
    fn set_interrupt_pending(&self, irq: u32, pending: bool) {
        if let Ok(mut guard) = self.asserted.lock() {
            if pending {
                guard.insert(irq);
            } else {
                guard.remove(&irq);
            }
        }
    }

    fn is_interrupt_active(&self, irq: u32) -> bool {
        self.asserted
            .lock()
            .map(|guard| guard.contains(&irq))
            .unwrap_or(false)
    }

    fn acknowledge_interrupt(&self) -> Option<u32> {
        self.asserted
            .lock()
            .ok()
            .and_then(|guard| guard.iter().next().copied())
    }

    fn complete_interrupt(&self, _irq: u32) {
        // Level-triggered: the source keeps the line asserted until its condition clears.
    }
}

/// Bridges a device's interrupt output to one controller input.
#[derive(Debug)]
pub struct IrqRoute {
    controller: Arc<dyn InterruptController>,
    irq: u32,
}

impl IrqRoute {
    pub fn new(controller: Arc<dyn InterruptController>, irq: u32) -> Arc<Self> {
        Arc::new(Self { controller, irq })
    }
}

impl SignalSink for IrqRoute {
    fn set_level(&self, level: DigitalLevel) {
        self.controller
            .set_interrupt_pending(self.irq, level == DigitalLevel::High);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::OutputLine;

    #[test]
    fn test_route_follows_line_level() {
        let latch = IrqLatch::new();
        let mut line = OutputLine::default();
        line.connect(IrqRoute::new(latch.clone(), 3));
        assert!(!latch.is_interrupt_active(3));

        line.drive(DigitalLevel::High);
        assert!(latch.is_interrupt_active(3));
        assert_eq!(latch.acknowledge_interrupt(), Some(3));

        latch.complete_interrupt(3);
        assert!(latch.is_interrupt_active(3));

        line.drive(DigitalLevel::Low);
        assert!(latch.pending().is_empty());
    }

    #[test]
    fn test_acknowledge_picks_lowest_line() {
        let latch = IrqLatch::new();
        latch.set_interrupt_pending(9, true);
        latch.set_interrupt_pending(2, true);
        assert_eq!(latch.acknowledge_interrupt(), Some(2));
        assert_eq!(latch.pending(), vec![2, 9]);
    }
}
