// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Byte-stream endpoints the serial models talk to.
//!
//! UART: the host side delivers inbound bytes through [`RxPort`] and receives
//! transmitted bytes through a [`SerialBackend`]. SPI: every TX byte is
//! exchanged for one RX byte through a [`SpiBus`].

use crate::signals::DigitalLevel;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Receives bytes the guest transmits on a serial console.
pub trait SerialBackend: Debug + Send {
    fn transmit(&mut self, byte: u8);
}

/// Inbound side of a serial device, as seen by the host endpoint.
pub trait RxPort {
    /// Whether another byte would be stored rather than dropped.
    fn can_receive(&self) -> bool;

    /// Delivers one byte. Returns `false` when it had to be dropped.
    fn receive(&mut self, byte: u8) -> bool;
}

/// Captures transmitted bytes into a shared buffer, optionally echoing to stdout.
#[derive(Debug, Clone)]
pub struct CaptureSink {
    buffer: Arc<Mutex<Vec<u8>>>,
    echo_stdout: bool,
}

impl CaptureSink {
    pub fn new(buffer: Arc<Mutex<Vec<u8>>>, echo_stdout: bool) -> Self {
        Self {
            buffer,
            echo_stdout,
        }
    }

    pub fn buffer(&self) -> Arc<Mutex<Vec<u8>>> {
        self.buffer.clone()
    }
}

impl SerialBackend for CaptureSink {
    fn transmit(&mut self, byte: u8) {
        if let Ok(mut guard) = self.buffer.lock() {
            guard.push(byte);
        }
        if self.echo_stdout {
            StdoutSink.transmit(byte);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl SerialBackend for StdoutSink {
    fn transmit(&mut self, byte: u8) {
        #[allow(unused_must_use)]
        {
            print!("{}", byte as char);
            io::stdout().flush();
        }
    }
}

/// Discards transmitted bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl SerialBackend for NullSink {
    fn transmit(&mut self, _byte: u8) {}
}

/// Host-side input buffer that honours the device's flow control: bytes are
/// handed over only while the port reports room for them.
#[derive(Debug, Clone, Default)]
pub struct InputQueue {
    pending: VecDeque<u8>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes.iter().copied());
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Moves as many bytes as the port accepts. Returns the number delivered.
    pub fn pump(&mut self, port: &mut dyn RxPort) -> usize {
        let mut delivered = 0;
        while port.can_receive() {
            let Some(byte) = self.pending.pop_front() else {
                break;
            };
            port.receive(byte);
            delivered += 1;
        }
        delivered
    }
}

/// Downstream side of an SPI controller: one blocking full-duplex byte exchange.
pub trait SpiBus: Debug + Send {
    fn transfer(&mut self, tx: u8) -> u8;

    /// Mirrors the controller's chip-select outputs onto the bus.
    fn set_chip_select(&mut self, _line: usize, _level: DigitalLevel) {}
}

/// A peripheral attached to one chip-select line of an [`SsiBus`].
pub trait SpiDevice: Debug + Send {
    fn transfer(&mut self, tx: u8) -> u8;

    /// Chip-select edge: `true` when the line went low.
    fn select(&mut self, _selected: bool) {}
}

/// Echoes every byte back. Usable as a whole bus or as a single device.
#[derive(Debug, Clone, Copy, Default)]
pub struct Loopback;

impl SpiBus for Loopback {
    fn transfer(&mut self, tx: u8) -> u8 {
        tx
    }
}

impl SpiDevice for Loopback {
    fn transfer(&mut self, tx: u8) -> u8 {
        tx
    }
}

/// Nothing attached: MISO floats high.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBus;

impl SpiBus for NullBus {
    fn transfer(&mut self, _tx: u8) -> u8 {
        0xFF
    }
}

/// Bus with devices hung off individual chip-select lines.
///
/// Only devices whose line is low take part in a transfer; their replies are
/// wire-ORed. With nothing selected the transfer returns 0.
#[derive(Debug, Default)]
pub struct SsiBus {
    slots: Vec<Option<Box<dyn SpiDevice>>>,
    levels: Vec<DigitalLevel>,
}

impl SsiBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, line: usize, device: Box<dyn SpiDevice>) {
        if self.slots.len() <= line {
            self.slots.resize_with(line + 1, || None);
            self.levels.resize(line + 1, DigitalLevel::High);
        }
        self.slots[line] = Some(device);
    }

    pub fn is_selected(&self, line: usize) -> bool {
        self.levels.get(line) == Some(&DigitalLevel::Low)
    }
}

impl SpiBus for SsiBus {
    fn transfer(&mut self, tx: u8) -> u8 {
        let mut rx = 0u8;
        for (slot, level) in self.slots.iter_mut().zip(&self.levels) {
            if *level != DigitalLevel::Low {
                continue;
            }
            if let Some(dev) = slot {
                rx |= dev.transfer(tx);
            }
        }
        tracing::trace!("ssi transfer {:#04x} -> {:#04x}", tx, rx);
        rx
    }

    fn set_chip_select(&mut self, line: usize, level: DigitalLevel) {
        if self.levels.len() <= line {
            self.slots.resize_with(line + 1, || None);
            self.levels.resize(line + 1, DigitalLevel::High);
        }
        let previous = std::mem::replace(&mut self.levels[line], level);
        if previous != level {
            if let Some(dev) = &mut self.slots[line] {
                dev.select(level == DigitalLevel::Low);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Counter {
        accepted: usize,
        room: usize,
    }

    impl RxPort for Counter {
        fn can_receive(&self) -> bool {
            self.accepted < self.room
        }

        fn receive(&mut self, _byte: u8) -> bool {
            self.accepted += 1;
            true
        }
    }

    #[derive(Debug)]
    struct Fixed(u8);

    impl SpiDevice for Fixed {
        fn transfer(&mut self, _tx: u8) -> u8 {
            self.0
        }
    }

    #[test]
    fn test_input_queue_respects_backpressure() {
        let mut queue = InputQueue::new();
        queue.extend(b"hello");
        let mut port = Counter {
            accepted: 0,
            room: 3,
        };
        assert_eq!(queue.pump(&mut port), 3);
        assert_eq!(queue.len(), 2);

        port.room = 10;
        assert_eq!(queue.pump(&mut port), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_capture_sink_collects() {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let mut sink = CaptureSink::new(buf.clone(), false);
        sink.transmit(b'o');
        sink.transmit(b'k');
        assert_eq!(buf.lock().unwrap().as_slice(), b"ok");
    }

    #[test]
    fn test_ssi_bus_only_selected_devices_answer() {
        let mut bus = SsiBus::new();
        bus.attach(0, Box::new(Fixed(0x0F)));
        bus.attach(1, Box::new(Fixed(0xA0)));

        assert_eq!(bus.transfer(0x55), 0x00);

        bus.set_chip_select(1, DigitalLevel::Low);
        assert!(bus.is_selected(1));
        assert_eq!(bus.transfer(0x55), 0xA0);

        bus.set_chip_select(0, DigitalLevel::Low);
        assert_eq!(bus.transfer(0x55), 0xAF);
    }

    #[test]
    fn test_loopback_and_null_bus() {
        assert_eq!(SpiBus::transfer(&mut Loopback, 0x10), 0x10);
        assert_eq!(NullBus.transfer(0x10), 0xFF);
    }
}
