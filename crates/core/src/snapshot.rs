// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Saved state of every peripheral on a bus, keyed by instance name.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct BusSnapshot {
    pub peripherals: HashMap<String, serde_json::Value>,
}

/// Minimal UART state needed to resume identical guest-visible behaviour.
/// Interrupt enables live in the configuration bits of `control`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UartSnapshot {
    pub control: u32,
    pub rx_fifo: Vec<u8>,
    #[serde(default)]
    pub rx_overrun: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SpiSnapshot {
    pub control: u32,
    pub tx_fifo: Vec<u8>,
    pub rx_fifo: Vec<u8>,
}
