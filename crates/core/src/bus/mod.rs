// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::config::{SpiConfig, UartConfig};
use crate::interrupt::{InterruptController, IrqLatch, IrqRoute};
use crate::peripherals::uart::Uart;
use crate::peripherals::{create_spi, create_uart};
use crate::register::ACCESS_SIZE;
use crate::snapshot::BusSnapshot;
use crate::transport::InputQueue;
use crate::{Peripheral, SimResult, SimulationError};
use anyhow::Context;
use rvperiph_config::BenchManifest;
use std::any::Any;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub struct PeripheralEntry {
    pub name: String,
    pub base: u64,
    pub size: u64,
    pub irq: Option<u32>,
    pub dev: Box<dyn Peripheral>,
}

impl PeripheralEntry {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.size
    }
}

/// Named address windows in front of a set of devices, plus the latch their
/// interrupt outputs feed.
#[derive(Debug)]
pub struct PeripheralBus {
    pub peripherals: Vec<PeripheralEntry>,
    pub irq_latch: Arc<IrqLatch>,
}

impl Default for PeripheralBus {
    fn default() -> Self {
        Self::new()
    }
}

impl PeripheralBus {
    pub fn new() -> Self {
        Self {
            peripherals: Vec::new(),
            irq_latch: IrqLatch::new(),
        }
    }

    /// Maps a device. Its interrupt output is routed to the latch when `irq` is set.
    pub fn attach(&mut self, mut entry: PeripheralEntry) -> SimResult<()> {
        if entry.size == 0 {
            return Err(SimulationError::InvalidConfig(format!(
                "peripheral '{}' has an empty window",
                entry.name
            )));
        }
        if let Some(existing) = self.peripherals.iter().find(|p| {
            p.name == entry.name
                || (entry.base < p.base.saturating_add(p.size)
                    && p.base < entry.base.saturating_add(entry.size))
        }) {
            return Err(SimulationError::InvalidConfig(format!(
                "peripheral '{}' at {:#x} conflicts with '{}'",
                entry.name, entry.base, existing.name
            )));
        }

        if let Some(irq) = entry.irq {
            let controller: Arc<dyn InterruptController> = self.irq_latch.clone();
            entry.dev.connect_irq(IrqRoute::new(controller, irq));
        }
        tracing::debug!(
            "mapped {} at {:#x}..{:#x} irq={:?}",
            entry.name,
            entry.base,
            entry.base.saturating_add(entry.size),
            entry.irq
        );
        self.peripherals.push(entry);
        Ok(())
    }

    pub fn from_config(manifest: &BenchManifest) -> anyhow::Result<Self> {
        let mut bus = Self::new();

        for p_cfg in &manifest.peripherals {
            let dev: Box<dyn Peripheral> = match p_cfg.r#type.as_str() {
                "uart" => {
                    let cfg: UartConfig = p_cfg.device_config()?;
                    Box::new(
                        create_uart(&cfg)
                            .with_context(|| format!("Failed to create UART '{}'", p_cfg.id))?,
                    )
                }
                "spi" => {
                    let cfg: SpiConfig = p_cfg.device_config()?;
                    Box::new(
                        create_spi(&cfg)
                            .with_context(|| format!("Failed to create SPI '{}'", p_cfg.id))?,
                    )
                }
                other => {
                    tracing::warn!(
                        "Unsupported peripheral type '{}' for id '{}'; skipping",
                        other,
                        p_cfg.id
                    );
                    continue;
                }
            };

            bus.attach(PeripheralEntry {
                name: p_cfg.id.clone(),
                base: p_cfg.base_address,
                size: p_cfg.window_size()?,
                irq: p_cfg.irq,
                dev,
            })?;
        }

        tracing::info!(
            "Bench '{}': {} peripheral(s) mapped",
            manifest.name,
            bus.peripherals.len()
        );
        Ok(bus)
    }

    fn locate(&mut self, addr: u64) -> SimResult<(&mut PeripheralEntry, u64)> {
        self.peripherals
            .iter_mut()
            .find(|p| p.contains(addr))
            .map(|p| {
                let offset = addr - p.base;
                (p, offset)
            })
            .ok_or(SimulationError::MemoryViolation(addr))
    }

    pub fn read(&mut self, addr: u64, size: u8) -> SimResult<u32> {
        let (entry, offset) = self.locate(addr)?;
        let value = entry.dev.read(offset, size);
        tracing::debug!("{} read  +{:#x} -> {:#010x}", entry.name, offset, value);
        Ok(value)
    }

    pub fn write(&mut self, addr: u64, size: u8, value: u32) -> SimResult<()> {
        let (entry, offset) = self.locate(addr)?;
        tracing::debug!("{} write +{:#x} <- {:#010x}", entry.name, offset, value);
        entry.dev.write(offset, size, value);
        Ok(())
    }

    pub fn read_u32(&mut self, addr: u64) -> SimResult<u32> {
        self.read(addr, ACCESS_SIZE)
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) -> SimResult<()> {
        self.write(addr, ACCESS_SIZE, value)
    }

    pub fn entry(&self, name: &str) -> Option<&PeripheralEntry> {
        self.peripherals.iter().find(|p| p.name == name)
    }

    pub fn find<T: Any>(&self, name: &str) -> Option<&T> {
        self.entry(name)?.dev.as_any()?.downcast_ref::<T>()
    }

    pub fn find_mut<T: Any>(&mut self, name: &str) -> Option<&mut T> {
        self.peripherals
            .iter_mut()
            .find(|p| p.name == name)?
            .dev
            .as_any_mut()?
            .downcast_mut::<T>()
    }

    /// Attach a UART TX capture sink to any UART peripherals on this bus.
    ///
    /// When `echo_stdout` is false, UART writes will no longer be printed to stdout.
    pub fn attach_uart_tx_sink(&mut self, sink: Arc<Mutex<Vec<u8>>>, echo_stdout: bool) {
        for p in &mut self.peripherals {
            let Some(any) = p.dev.as_any_mut() else {
                continue;
            };
            let Some(uart) = any.downcast_mut::<Uart>() else {
                continue;
            };
            uart.set_sink(Some(sink.clone()), echo_stdout);
        }
    }

    /// Host-side delivery of inbound bytes to a named UART, honouring its
    /// flow control. Bytes the UART cannot take stay in `queue`.
    pub fn pump_uart(&mut self, name: &str, queue: &mut InputQueue) -> SimResult<usize> {
        let uart = self.find_mut::<Uart>(name).ok_or_else(|| {
            SimulationError::InvalidConfig(format!("no UART named '{}' on the bus", name))
        })?;
        Ok(queue.pump(uart))
    }

    pub fn reset_all(&mut self) {
        for p in &mut self.peripherals {
            p.dev.reset();
        }
    }

    pub fn snapshot(&self) -> BusSnapshot {
        BusSnapshot {
            peripherals: self
                .peripherals
                .iter()
                .map(|p| (p.name.clone(), p.dev.snapshot()))
                .collect(),
        }
    }

    /// Restores every peripheral named in `snapshot`; peripherals it does not
    /// mention keep their current state.
    ///
    /// All or nothing: if any device rejects its state, the devices already
    /// restored are put back the way they were.
    pub fn restore(&mut self, snapshot: &BusSnapshot) -> SimResult<()> {
        let mut plan = Vec::with_capacity(snapshot.peripherals.len());
        for (name, state) in &snapshot.peripherals {
            let index = self
                .peripherals
                .iter()
                .position(|p| &p.name == name)
                .ok_or_else(|| {
                    SimulationError::Snapshot(format!("no peripheral named '{}' on the bus", name))
                })?;
            plan.push((index, state));
        }
        plan.sort_by_key(|(index, _)| *index);

        let mut applied: Vec<(usize, serde_json::Value)> = Vec::with_capacity(plan.len());
        for (index, state) in plan {
            let entry = &mut self.peripherals[index];
            let previous = entry.dev.snapshot();
            if let Err(e) = entry.dev.restore(state.clone()) {
                for (undo, saved) in applied.into_iter().rev() {
                    let entry = &mut self.peripherals[undo];
                    if let Err(undo_err) = entry.dev.restore(saved) {
                        tracing::error!("failed to roll back {}: {}", entry.name, undo_err);
                    }
                }
                return Err(e);
            }
            applied.push((index, previous));
        }
        Ok(())
    }

    /// Interrupt lines currently held high, lowest first.
    pub fn pending_irqs(&self) -> Vec<u32> {
        self.irq_latch.pending()
    }

    pub fn irq_level(&self, irq: u32) -> bool {
        self.irq_latch.is_interrupt_active(irq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripherals::spi::Spi;

    fn bench() -> BenchManifest {
        BenchManifest::from_yaml(
            r#"
name: "unit"
peripherals:
  - id: "uart0"
    type: "uart"
    base_address: 0x1000
    size: "8B"
    irq: 4
    config:
      echo_stdout: false
  - id: "spi0"
    type: "spi"
    base_address: 0x2000
    size: "8B"
    config:
      num_cs: 2
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_bus_from_config() {
        let bus = PeripheralBus::from_config(&bench()).expect("Failed to create bus from config");
        assert_eq!(bus.peripherals.len(), 2);
        let spi = bus.find::<Spi>("spi0").expect("spi0 not found");
        assert_eq!(spi.num_chip_selects(), 2);
        assert!(bus.find::<Uart>("spi0").is_none());
        assert_eq!(bus.entry("uart0").unwrap().irq, Some(4));
    }

    #[test]
    fn test_unmapped_access_is_violation() {
        let mut bus = PeripheralBus::from_config(&bench()).unwrap();
        assert!(matches!(
            bus.read_u32(0x1008),
            Err(SimulationError::MemoryViolation(0x1008))
        ));
        assert!(matches!(
            bus.write_u32(0x0, 1),
            Err(SimulationError::MemoryViolation(0x0))
        ));
        assert!(bus.read_u32(0x1004).is_ok());
    }

    #[test]
    fn test_attach_rejects_overlap() {
        let mut bus = PeripheralBus::new();
        bus.attach(PeripheralEntry {
            name: "a".to_string(),
            base: 0x100,
            size: 8,
            irq: None,
            dev: Box::new(Spi::new().unwrap()),
        })
        .unwrap();
        let err = bus.attach(PeripheralEntry {
            name: "b".to_string(),
            base: 0x104,
            size: 8,
            irq: None,
            dev: Box::new(Spi::new().unwrap()),
        });
        assert!(matches!(err, Err(SimulationError::InvalidConfig(_))));
    }

    #[test]
    fn test_irq_routed_to_latch() {
        let mut bus = PeripheralBus::from_config(&bench()).unwrap();
        // IRQ_RX_NEMPTY enable
        bus.write_u32(0x1000, 1 << 22).unwrap();
        assert!(bus.pending_irqs().is_empty());

        let mut queue = InputQueue::new();
        queue.extend(b"A");
        assert_eq!(bus.pump_uart("uart0", &mut queue).unwrap(), 1);
        assert_eq!(bus.pending_irqs(), vec![4]);

        assert_eq!(bus.read_u32(0x1004).unwrap(), 0x41);
        assert!(!bus.irq_level(4));
    }

    #[test]
    fn test_pump_unknown_uart() {
        let mut bus = PeripheralBus::from_config(&bench()).unwrap();
        let mut queue = InputQueue::new();
        queue.extend(b"x");
        assert!(bus.pump_uart("spi0", &mut queue).is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_failed_restore_rolls_back_every_device() {
        let mut bus = PeripheralBus::from_config(&bench()).unwrap();
        bus.write_u32(0x2004, 0x11).unwrap();
        let uart_ctrl = bus.read_u32(0x1000).unwrap();
        let spi_ctrl = bus.read_u32(0x2000).unwrap();

        let mut snap = bus.snapshot();
        snap.peripherals.insert(
            "uart0".to_string(),
            serde_json::json!({ "control": 1 << 22, "rx_fifo": [0x41, 0x42] }),
        );
        snap.peripherals.insert(
            "spi0".to_string(),
            serde_json::json!({ "control": 0, "tx_fifo": [], "rx_fifo": vec![0u8; 9] }),
        );
        assert!(matches!(
            bus.restore(&snap),
            Err(SimulationError::Snapshot(_))
        ));

        assert_eq!(bus.read_u32(0x1000).unwrap(), uart_ctrl);
        assert_eq!(bus.find::<Uart>("uart0").unwrap().rx_len(), 0);
        assert!(bus.pending_irqs().is_empty());
        assert_eq!(bus.read_u32(0x2000).unwrap(), spi_ctrl);
        assert_eq!(bus.find::<Spi>("spi0").unwrap().tx_len(), 1);
    }

    #[test]
    fn test_restore_unknown_name_fails() {
        let mut bus = PeripheralBus::from_config(&bench()).unwrap();
        let mut snap = bus.snapshot();
        assert_eq!(snap.peripherals.len(), 2);
        snap.peripherals
            .insert("ghost".to_string(), serde_json::Value::Null);
        assert!(matches!(
            bus.restore(&snap),
            Err(SimulationError::Snapshot(_))
        ));
    }
}
