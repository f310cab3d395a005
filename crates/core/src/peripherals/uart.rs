// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::config::UartConfig;
use crate::fifo::ByteFifo;
use crate::irq::IrqEngine;
use crate::register::{self, ControlRegister, GuestError, Register};
use crate::signals::SignalSink;
use crate::snapshot::UartSnapshot;
use crate::status::{flag, FifoStatus};
use crate::transport::{CaptureSink, NullSink, RxPort, SerialBackend, StdoutSink};
use crate::{SimResult, SimulationError};
use std::sync::{Arc, Mutex};

bitflags::bitflags! {
    /// CTRL register layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UartCtrl: u32 {
        const EN            = 1 << 0;
        const SIM_MODE      = 1 << 1;
        const HWFC_EN       = 1 << 2;
        const PRSC          = 0b111 << 3;
        const BAUD          = 0x3FF << 6;

        const RX_NEMPTY     = 1 << 16;
        const RX_HALF       = 1 << 17;
        const RX_FULL       = 1 << 18;
        const TX_EMPTY      = 1 << 19;
        const TX_NHALF      = 1 << 20;
        const TX_FULL       = 1 << 21;

        const IRQ_RX_NEMPTY = 1 << 22;
        const IRQ_RX_HALF   = 1 << 23;
        const IRQ_RX_FULL   = 1 << 24;
        const IRQ_TX_EMPTY  = 1 << 25;
        const IRQ_TX_NHALF  = 1 << 26;

        const RX_OVER       = 1 << 30;
        const TX_BUSY       = 1 << 31;
    }
}

bitflags::bitflags! {
    /// Interrupt causes, in the same order as the `IRQ_*` enable bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UartIrq: u8 {
        const RX_NEMPTY = 1 << 0;
        const RX_HALF   = 1 << 1;
        const RX_FULL   = 1 << 2;
        const TX_EMPTY  = 1 << 3;
        const TX_NHALF  = 1 << 4;
    }
}

const IRQ_ENABLE_SHIFT: u32 = 22;

const WRITABLE: u32 = UartCtrl::EN.bits()
    | UartCtrl::SIM_MODE.bits()
    | UartCtrl::HWFC_EN.bits()
    | UartCtrl::PRSC.bits()
    | UartCtrl::BAUD.bits()
    | UartCtrl::IRQ_RX_NEMPTY.bits()
    | UartCtrl::IRQ_RX_HALF.bits()
    | UartCtrl::IRQ_RX_FULL.bits()
    | UartCtrl::IRQ_TX_EMPTY.bits()
    | UartCtrl::IRQ_TX_NHALF.bits();

/// Serial console with a receive FIFO and unbuffered transmit.
///
/// A DATA write goes straight to the backend, so the TX side always reports
/// empty and never busy. The TX watermark interrupts therefore fire whenever
/// they are enabled.
#[derive(Debug)]
pub struct Uart {
    ctrl: ControlRegister,
    rx: ByteFifo,
    rx_overrun: bool,
    irq: IrqEngine,
    backend: Box<dyn SerialBackend>,
}

impl Default for Uart {
    fn default() -> Self {
        Self::new()
    }
}

impl Uart {
    pub fn new() -> Self {
        Self::with_config(&UartConfig::default())
    }

    pub fn with_config(config: &UartConfig) -> Self {
        let backend: Box<dyn SerialBackend> = if config.echo_stdout {
            Box::new(StdoutSink)
        } else {
            Box::new(NullSink)
        };
        let mut uart = Self {
            ctrl: ControlRegister::new(WRITABLE),
            rx: ByteFifo::new(config.rx_fifo_capacity),
            rx_overrun: false,
            irq: IrqEngine::new(),
            backend,
        };
        uart.recompute();
        uart
    }

    pub fn set_backend(&mut self, backend: Box<dyn SerialBackend>) {
        self.backend = backend;
    }

    /// Route transmitted bytes into `sink`; with no sink, either echo to stdout or drop.
    pub fn set_sink(&mut self, sink: Option<Arc<Mutex<Vec<u8>>>>, echo_stdout: bool) {
        self.backend = match sink {
            Some(buffer) => Box::new(CaptureSink::new(buffer, echo_stdout)),
            None if echo_stdout => Box::new(StdoutSink),
            None => Box::new(NullSink),
        };
    }

    pub fn enabled(&self) -> bool {
        self.ctrl.bit(UartCtrl::EN.bits())
    }

    pub fn sim_mode(&self) -> bool {
        self.ctrl.bit(UartCtrl::SIM_MODE.bits())
    }

    /// log2 of the RX FIFO depth. Not reported through DATA reads.
    pub fn rx_fifo_size_log2(&self) -> u32 {
        self.rx.log2_capacity()
    }

    pub fn flow_control(&self) -> bool {
        self.ctrl.bit(UartCtrl::HWFC_EN.bits())
    }

    pub fn prescaler(&self) -> u32 {
        self.ctrl.field(3, 3)
    }

    pub fn baud_divisor(&self) -> u32 {
        self.ctrl.field(6, 10)
    }

    pub fn interrupt_enable(&self) -> UartIrq {
        UartIrq::from_bits_truncate((self.ctrl.config() >> IRQ_ENABLE_SHIFT) as u8)
    }

    pub fn rx_len(&self) -> usize {
        self.rx.len()
    }

    pub fn rx_overrun(&self) -> bool {
        self.rx_overrun
    }

    fn pending(&self) -> UartIrq {
        let rx = FifoStatus::of(&self.rx);
        let mut pending = UartIrq::TX_EMPTY | UartIrq::TX_NHALF;
        pending.set(UartIrq::RX_NEMPTY, !rx.empty);
        pending.set(UartIrq::RX_HALF, rx.half_full);
        pending.set(UartIrq::RX_FULL, rx.full);
        pending
    }

    fn project_status(&self) -> u32 {
        let rx = FifoStatus::of(&self.rx);
        let tx = FifoStatus::unbuffered();
        let mut status = 0;
        flag(&mut status, UartCtrl::RX_NEMPTY.bits(), !rx.empty);
        flag(&mut status, UartCtrl::RX_HALF.bits(), rx.half_full);
        flag(&mut status, UartCtrl::RX_FULL.bits(), rx.full);
        flag(&mut status, UartCtrl::TX_EMPTY.bits(), tx.empty);
        flag(&mut status, UartCtrl::TX_NHALF.bits(), !tx.half_full);
        flag(&mut status, UartCtrl::TX_FULL.bits(), tx.full);
        flag(&mut status, UartCtrl::RX_OVER.bits(), self.rx_overrun);
        flag(&mut status, UartCtrl::TX_BUSY.bits(), !tx.empty);
        status
    }

    /// Refreshes the derived CTRL bits and re-drives the interrupt line.
    fn recompute(&mut self) {
        self.ctrl.set_status(self.project_status());
        let (enabled, pending) = (self.interrupt_enable(), self.pending());
        self.irq.update(enabled, pending);
    }

    fn write_ctrl(&mut self, value: u32) {
        self.ctrl.write(value);
        if !self.enabled() {
            self.rx_overrun = false;
        }
        tracing::debug!("uart CTRL <- {:#010x}", self.ctrl.config());
    }

    fn read_data(&mut self) -> u32 {
        match self.rx.pop() {
            Some(byte) => byte as u32,
            None => {
                register::log_guest_error("uart", &GuestError::RxEmpty);
                0
            }
        }
    }
}

impl RxPort for Uart {
    fn can_receive(&self) -> bool {
        !self.rx.is_full()
    }

    fn receive(&mut self, byte: u8) -> bool {
        let stored = self.rx.push(byte);
        if !stored {
            self.rx_overrun = true;
            tracing::warn!("uart RX FIFO full, dropped {:#04x}", byte);
        }
        self.recompute();
        stored
    }
}

impl crate::Peripheral for Uart {
    fn read(&mut self, offset: u64, size: u8) -> u32 {
        let value = match register::decode(offset, size) {
            Ok(Register::Ctrl) => {
                self.recompute();
                return self.ctrl.value();
            }
            Ok(Register::Data) => self.read_data(),
            Err(e) => {
                register::log_guest_error("uart", &e);
                0
            }
        };
        self.recompute();
        value
    }

    fn write(&mut self, offset: u64, size: u8, value: u32) {
        match register::decode(offset, size) {
            Ok(Register::Ctrl) => self.write_ctrl(value),
            Ok(Register::Data) => self.backend.transmit(value as u8),
            Err(e) => {
                register::log_guest_error("uart", &e);
                return;
            }
        }
        self.recompute();
    }

    fn reset(&mut self) {
        self.rx.clear();
        self.rx_overrun = false;
        self.ctrl.clear();
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
        let state = UartSnapshot {
            control: self.ctrl.value(),
            rx_fifo: self.rx.to_vec(),
            rx_overrun: self.rx_overrun,
        };
        serde_json::to_value(state).unwrap_or(serde_json::Value::Null)
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        let state: UartSnapshot = serde_json::from_value(state)
            .map_err(|e| SimulationError::Snapshot(format!("uart: {}", e)))?;
        self.rx.load(&state.rx_fifo).map_err(|len| {
            SimulationError::Snapshot(format!(
                "uart: {} RX bytes exceed FIFO capacity {}",
                len,
                self.rx.capacity()
            ))
        })?;
        self.ctrl.write(state.control);
        self.rx_overrun = state.rx_overrun;
        self.recompute();
        Ok(())
    }
}
