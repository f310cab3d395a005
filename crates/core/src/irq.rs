// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::{DigitalLevel, OutputLine, SignalSink};
use bitflags::Flags;
use std::sync::Arc;

/// Derives a device's single interrupt output from (enable, condition) pairs.
///
/// Causes are a bitflags set; the line is high iff some cause is both enabled
/// and currently true. The output is re-driven on every evaluation.
#[derive(Debug, Clone, Default)]
pub struct IrqEngine {
    line: OutputLine,
}

impl IrqEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, sink: Arc<dyn SignalSink>) {
        self.line.connect(sink);
    }

    pub fn update<F: Flags + Copy>(&mut self, enabled: F, pending: F) -> bool {
        let level = enabled.intersects(pending);
        if level != self.line.is_high() {
            tracing::debug!("irq {}", if level { "raised" } else { "lowered" });
        }
        self.line.drive(DigitalLevel::from(level));
        level
    }

    pub fn lower(&mut self) {
        self.line.drive(DigitalLevel::Low);
    }

    pub fn level(&self) -> bool {
        self.line.is_high()
    }
}
