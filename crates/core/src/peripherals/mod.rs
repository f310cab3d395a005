// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod spi;
pub mod uart;

use crate::config::{SpiConfig, UartConfig};
use crate::{SimResult, SimulationError};
use spi::Spi;
use uart::Uart;

pub fn create_uart(config: &UartConfig) -> SimResult<Uart> {
    if config.rx_fifo_capacity == 0 {
        return Err(SimulationError::InvalidConfig(
            "UART RX FIFO capacity must be non-zero".to_string(),
        ));
    }
    Ok(Uart::with_config(config))
}

pub fn create_spi(config: &SpiConfig) -> SimResult<Spi> {
    Spi::with_config(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factories_apply_config() {
        let uart = create_uart(&UartConfig {
            rx_fifo_capacity: 4,
            echo_stdout: false,
        })
        .unwrap();
        assert_eq!(uart.rx_len(), 0);

        let spi = create_spi(&SpiConfig {
            num_cs: 3,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(spi.num_chip_selects(), 3);
    }

    #[test]
    fn test_factories_reject_bad_config() {
        let uart = create_uart(&UartConfig {
            rx_fifo_capacity: 0,
            echo_stdout: false,
        });
        assert!(matches!(uart, Err(SimulationError::InvalidConfig(_))));

        let spi = create_spi(&SpiConfig {
            num_cs: 0,
            ..Default::default()
        });
        assert!(matches!(spi, Err(SimulationError::InvalidConfig(_))));
    }
}
