// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UartConfig {
    /// Depth of the receive FIFO.
    pub rx_fifo_capacity: usize,
    /// Echo transmitted bytes to the host stdout.
    pub echo_stdout: bool,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            rx_fifo_capacity: 32,
            echo_stdout: true,
        }
    }
}

/// Downstream endpoint wired to an SPI controller when built from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpiBusKind {
    #[default]
    Loopback,
    Null,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiConfig {
    /// Depth of each of the TX and RX FIFOs; must be a power of two.
    pub fifo_capacity: usize,
    /// Number of chip-select outputs.
    pub num_cs: u32,
    pub bus: SpiBusKind,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            fifo_capacity: 8,
            num_cs: 1,
            bus: SpiBusKind::Loopback,
        }
    }
}
