// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::chip_select::ChipSelectRouter;
use crate::config::{SpiBusKind, SpiConfig};
use crate::fifo::ByteFifo;
use crate::irq::IrqEngine;
use crate::register::{self, ControlRegister, GuestError, Register};
use crate::signals::{DigitalLevel, SignalSink};
use crate::snapshot::SpiSnapshot;
use crate::status::{flag, FifoStatus};
use crate::transport::{Loopback, NullBus, SpiBus};
use crate::{SimResult, SimulationError};
use std::sync::Arc;

bitflags::bitflags! {
    /// CTRL register layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SpiCtrl: u32 {
        const EN           = 1 << 0;
        const CPHA         = 1 << 1;
        const CPOL         = 1 << 2;
        const CS_SEL0      = 1 << 3;
        const CS_SEL1      = 1 << 4;
        const CS_SEL2      = 1 << 5;
        const CS_EN        = 1 << 6;
        const PRSC         = 0b111 << 7;
        const CDIV         = 0xF << 10;

        const RX_AVAIL     = 1 << 16;
        const TX_EMPTY     = 1 << 17;
        const TX_NHALF     = 1 << 18;
        const TX_FULL      = 1 << 19;

        const IRQ_RX_AVAIL = 1 << 20;
        const IRQ_TX_EMPTY = 1 << 21;
        const IRQ_TX_HALF  = 1 << 22;

        const FIFO_SIZE    = 0xF << 23;

        const BUSY         = 1 << 31;
    }
}

bitflags::bitflags! {
    /// Interrupt causes, in the same order as the `IRQ_*` enable bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SpiIrq: u8 {
        const RX_AVAIL = 1 << 0;
        const TX_EMPTY = 1 << 1;
        /// TX FIFO below half full.
        const TX_HALF  = 1 << 2;
    }
}

const IRQ_ENABLE_SHIFT: u32 = 20;
const FIFO_SIZE_SHIFT: u32 = 23;
const CS_SEL_SHIFT: u32 = 3;

const WRITABLE: u32 = SpiCtrl::EN.bits()
    | SpiCtrl::CPHA.bits()
    | SpiCtrl::CPOL.bits()
    | SpiCtrl::CS_SEL0.bits()
    | SpiCtrl::CS_SEL1.bits()
    | SpiCtrl::CS_SEL2.bits()
    | SpiCtrl::CS_EN.bits()
    | SpiCtrl::PRSC.bits()
    | SpiCtrl::CDIV.bits()
    | SpiCtrl::IRQ_RX_AVAIL.bits()
    | SpiCtrl::IRQ_TX_EMPTY.bits()
    | SpiCtrl::IRQ_TX_HALF.bits();

/// SPI host controller with TX/RX FIFOs and N chip-select outputs.
///
/// Transfers are instantaneous: a byte queued while the unit is enabled is
/// shifted out through the bus before the DATA write returns, and the byte
/// clocked back lands in the RX FIFO. BUSY is only observable while the unit
/// is disabled with bytes still queued.
#[derive(Debug)]
pub struct Spi {
    ctrl: ControlRegister,
    tx: ByteFifo,
    rx: ByteFifo,
    chip_select: ChipSelectRouter,
    irq: IrqEngine,
    bus: Box<dyn SpiBus>,
}

impl Spi {
    /// Default configuration: 8-deep FIFOs, one chip-select line, loopback bus.
    pub fn new() -> SimResult<Self> {
        Self::with_config(&SpiConfig::default())
    }

    pub fn with_config(config: &SpiConfig) -> SimResult<Self> {
        let cap = config.fifo_capacity;
        if cap < 2 || !cap.is_power_of_two() || cap.trailing_zeros() > 0xF {
            return Err(SimulationError::InvalidConfig(format!(
                "SPI FIFO capacity must be a power of two between 2 and 32768, got {}",
                cap
            )));
        }
        let bus: Box<dyn SpiBus> = match config.bus {
            SpiBusKind::Loopback => Box::new(Loopback),
            SpiBusKind::Null => Box::new(NullBus),
        };
        Ok(Self {
            ctrl: ControlRegister::new(WRITABLE),
            tx: ByteFifo::new(cap),
            rx: ByteFifo::new(cap),
            chip_select: ChipSelectRouter::new(config.num_cs)?,
            irq: IrqEngine::new(),
            bus,
        }
        .settled())
    }

    fn settled(mut self) -> Self {
        self.update_chip_select();
        self.recompute();
        self
    }

    pub fn set_bus(&mut self, bus: Box<dyn SpiBus>) {
        self.bus = bus;
        self.update_chip_select();
    }

    pub fn attach_chip_select(&mut self, line: usize, sink: Arc<dyn SignalSink>) -> SimResult<()> {
        self.chip_select.attach(line, sink)
    }

    pub fn enabled(&self) -> bool {
        self.ctrl.bit(SpiCtrl::EN.bits())
    }

    pub fn clock_phase(&self) -> bool {
        self.ctrl.bit(SpiCtrl::CPHA.bits())
    }

    pub fn clock_polarity(&self) -> bool {
        self.ctrl.bit(SpiCtrl::CPOL.bits())
    }

    pub fn prescaler(&self) -> u32 {
        self.ctrl.field(7, 3)
    }

    pub fn clock_divider(&self) -> u32 {
        self.ctrl.field(10, 4)
    }

    pub fn interrupt_enable(&self) -> SpiIrq {
        SpiIrq::from_bits_truncate((self.ctrl.config() >> IRQ_ENABLE_SHIFT) as u8)
    }

    pub fn chip_select_level(&self, line: usize) -> Option<DigitalLevel> {
        self.chip_select.level(line)
    }

    pub fn active_chip_select(&self) -> Option<usize> {
        self.chip_select.active()
    }

    pub fn num_chip_selects(&self) -> usize {
        self.chip_select.len()
    }

    pub fn tx_len(&self) -> usize {
        self.tx.len()
    }

    pub fn rx_len(&self) -> usize {
        self.rx.len()
    }

    fn pending(&self) -> SpiIrq {
        let rx = FifoStatus::of(&self.rx);
        let tx = FifoStatus::of(&self.tx);
        let mut pending = SpiIrq::empty();
        pending.set(SpiIrq::RX_AVAIL, !rx.empty);
        pending.set(SpiIrq::TX_EMPTY, tx.empty);
        pending.set(SpiIrq::TX_HALF, !tx.half_full);
        pending
    }

    fn project_status(&self) -> u32 {
        let rx = FifoStatus::of(&self.rx);
        let tx = FifoStatus::of(&self.tx);
        let mut status = self.tx.log2_capacity() << FIFO_SIZE_SHIFT;
        flag(&mut status, SpiCtrl::RX_AVAIL.bits(), !rx.empty);
        flag(&mut status, SpiCtrl::TX_EMPTY.bits(), tx.empty);
        flag(&mut status, SpiCtrl::TX_NHALF.bits(), !tx.half_full);
        flag(&mut status, SpiCtrl::TX_FULL.bits(), tx.full);
        flag(&mut status, SpiCtrl::BUSY.bits(), !tx.empty);
        status
    }

    /// Refreshes the derived CTRL bits and re-drives the interrupt line.
    fn recompute(&mut self) {
        self.ctrl.set_status(self.project_status());
        let (enabled, pending) = (self.interrupt_enable(), self.pending());
        self.irq.update(enabled, pending);
    }

    fn update_chip_select(&mut self) {
        let select = self.ctrl.field(CS_SEL_SHIFT, 3) as u8;
        let enable = self.ctrl.bit(SpiCtrl::CS_EN.bits());
        self.chip_select.update(select, enable);
        self.mirror_chip_select();
    }

    fn mirror_chip_select(&mut self) {
        for line in 0..self.chip_select.len() {
            let level = self
                .chip_select
                .level(line)
                .unwrap_or(DigitalLevel::High);
            self.bus.set_chip_select(line, level);
        }
    }

    /// Shifts every queued TX byte through the bus, collecting one RX byte per TX byte.
    fn drain_tx(&mut self) {
        if !self.enabled() {
            return;
        }
        while let Some(tx) = self.tx.pop() {
            let rx = self.bus.transfer(tx);
            tracing::trace!("spi {:#04x} -> {:#04x}", tx, rx);
            if !self.rx.push(rx) {
                tracing::warn!("spi RX FIFO full, dropped {:#04x}", rx);
            }
        }
    }

    fn write_ctrl(&mut self, value: u32) {
        self.ctrl.write(value);
        tracing::debug!("spi CTRL <- {:#010x}", self.ctrl.config());
        self.update_chip_select();
        self.drain_tx();
    }

    fn write_data(&mut self, value: u32) {
        if !self.tx.push(value as u8) {
            register::log_guest_error("spi", &GuestError::TxFull { value });
            return;
        }
        self.drain_tx();
    }

    fn read_data(&mut self) -> u32 {
        match self.rx.pop() {
            Some(byte) => byte as u32,
            None => {
                tracing::debug!("spi DATA read with empty RX FIFO");
                0
            }
        }
    }
}

impl crate::Peripheral for Spi {
    fn read(&mut self, offset: u64, size: u8) -> u32 {
        let value = match register::decode(offset, size) {
            Ok(Register::Ctrl) => {
                self.recompute();
                return self.ctrl.value();
            }
            Ok(Register::Data) => self.read_data(),
            Err(e) => {
                register::log_guest_error("spi", &e);
                0
            }
        };
        self.recompute();
        value
    }

    fn write(&mut self, offset: u64, size: u8, value: u32) {
        match register::decode(offset, size) {
            Ok(Register::Ctrl) => self.write_ctrl(value),
            Ok(Register::Data) => self.write_data(value),
            Err(e) => {
                register::log_guest_error("spi", &e);
                return;
            }
        }
        self.recompute();
    }

    fn reset(&mut self) {
        self.tx.clear();
        self.rx.clear();
        self.ctrl.clear();
        self.chip_select.release_all();
        self.mirror_chip_select();
        self.irq.lower();
        self.recompute();
    }

    fn irq_level(&self) -> bool {
        self.irq.level()
    }

    fn connect_irq(&mut self, sink: Arc<dyn SignalSink>) {
        self.irq.connect(sink);
    }

    fn as_any(&self) -> Option<&dyn std::any::Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn std::any::Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        let state = SpiSnapshot {
            control: self.ctrl.value(),
            tx_fifo: self.tx.to_vec(),
            rx_fifo: self.rx.to_vec(),
        };
        serde_json::to_value(state).unwrap_or(serde_json::Value::Null)
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        let state: SpiSnapshot = serde_json::from_value(state)
            .map_err(|e| SimulationError::Snapshot(format!("spi: {}", e)))?;
        let capacity = self.tx.capacity();
        let oversized = |len: usize| {
            SimulationError::Snapshot(format!(
                "spi: {} bytes exceed FIFO capacity {}",
                len, capacity
            ))
        };
        // Both FIFOs are loaded aside so a rejected snapshot leaves the device untouched.
        let mut tx = ByteFifo::new(capacity);
        let mut rx = ByteFifo::new(self.rx.capacity());
        tx.load(&state.tx_fifo).map_err(oversized)?;
        rx.load(&state.rx_fifo).map_err(oversized)?;
        self.tx = tx;
        self.rx = rx;
        self.ctrl.write(state.control);
        self.update_chip_select();
        self.recompute();
        Ok(())
    }
}
