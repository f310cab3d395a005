// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod bus;
pub mod chip_select;
pub mod config;
pub mod fifo;
pub mod interrupt;
pub mod irq;
pub mod peripherals;
pub mod register;
pub mod signals;
pub mod snapshot;
pub mod status;
pub mod transport;

use signals::SignalSink;
use std::any::Any;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Trait representing a memory-mapped peripheral.
///
/// Accesses never fail: a device answers a malformed guest access with a
/// benign value and a diagnostic, so a misbehaving guest cannot stop the host.
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&mut self, offset: u64, size: u8) -> u32;
    fn write(&mut self, offset: u64, size: u8, value: u32);

    /// Guest- or system-triggered reset back to the power-on state.
    fn reset(&mut self);

    fn irq_level(&self) -> bool {
        false
    }
    fn connect_irq(&mut self, _sink: Arc<dyn SignalSink>) {}

    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
    fn restore(&mut self, _state: serde_json::Value) -> SimResult<()> {
        Ok(())
    }
}
