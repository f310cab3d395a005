// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl From<bool> for DigitalLevel {
    fn from(b: bool) -> Self {
        if b {
            DigitalLevel::High
        } else {
            DigitalLevel::Low
        }
    }
}

impl From<DigitalLevel> for bool {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => true,
            DigitalLevel::Low => false,
        }
    }
}

/// Receiving end of an output line (interrupt controller input, CS pin of a
/// downstream device, test probe).
pub trait SignalSink: Debug + Send + Sync {
    fn set_level(&self, level: DigitalLevel);
}

/// An output pin owned by a device model.
///
/// Every `drive` is forwarded to the sink, even when the level is unchanged,
/// so sinks always see the level of the latest recomputation.
#[derive(Debug, Clone, Default)]
pub struct OutputLine {
    level: DigitalLevel,
    sink: Option<Arc<dyn SignalSink>>,
}

impl OutputLine {
    pub fn new(level: DigitalLevel) -> Self {
        Self { level, sink: None }
    }

    pub fn connect(&mut self, sink: Arc<dyn SignalSink>) {
        sink.set_level(self.level);
        self.sink = Some(sink);
    }

    pub fn disconnect(&mut self) {
        self.sink = None;
    }

    pub fn drive(&mut self, level: DigitalLevel) {
        self.level = level;
        if let Some(sink) = &self.sink {
            sink.set_level(level);
        }
    }

    pub fn get(&self) -> DigitalLevel {
        self.level
    }

    pub fn is_high(&self) -> bool {
        self.level == DigitalLevel::High
    }
}

/// Shared probe that remembers the last level and counts drives.
#[derive(Debug, Default)]
pub struct LevelProbe {
    high: AtomicBool,
    drives: AtomicU32,
}

impl LevelProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn level(&self) -> DigitalLevel {
        self.high.load(Ordering::SeqCst).into()
    }

    pub fn is_high(&self) -> bool {
        self.high.load(Ordering::SeqCst)
    }

    pub fn drive_count(&self) -> u32 {
        self.drives.load(Ordering::SeqCst)
    }
}

impl SignalSink for LevelProbe {
    fn set_level(&self, level: DigitalLevel) {
        self.high.store(level.into(), Ordering::SeqCst);
        self.drives.fetch_add(1, Ordering::SeqCst);
    }
}
