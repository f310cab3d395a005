// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::{DigitalLevel, OutputLine, SignalSink};
use crate::{SimResult, SimulationError};
use std::sync::Arc;

/// Drives N active-low chip-select outputs from a 3-bit select field and an enable bit.
///
/// At most one line is ever low. Only select bits 1 and 2 move the index:
/// when several are set the highest one wins (bit 2 over bit 1, bit 0 never
/// changes the result). This priority is a modelling choice; a real decoder
/// given such a pattern is undefined.
#[derive(Debug, Clone)]
pub struct ChipSelectRouter {
    lines: Vec<OutputLine>,
    active: Option<usize>,
}

impl ChipSelectRouter {
    pub fn new(count: u32) -> SimResult<Self> {
        if count == 0 {
            return Err(SimulationError::InvalidConfig(
                "SPI controller needs at least one chip-select line".to_string(),
            ));
        }
        Ok(Self {
            lines: (0..count)
                .map(|_| OutputLine::new(DigitalLevel::High))
                .collect(),
            active: None,
        })
    }

    pub fn decode_index(select: u8) -> usize {
        if select & 0b100 != 0 {
            2
        } else if select & 0b010 != 0 {
            1
        } else {
            0
        }
    }

    /// Deasserts every line, then asserts the selected one if `enable` is set
    /// and the index exists. Returns the asserted line.
    pub fn update(&mut self, select: u8, enable: bool) -> Option<usize> {
        for line in &mut self.lines {
            line.drive(DigitalLevel::High);
        }

        let index = Self::decode_index(select);
        let active = if enable && index < self.lines.len() {
            self.lines[index].drive(DigitalLevel::Low);
            Some(index)
        } else {
            if enable {
                tracing::debug!(
                    "chip-select {} requested but only {} line(s) exist",
                    index,
                    self.lines.len()
                );
            }
            None
        };

        if active != self.active {
            tracing::debug!("chip-select {:?} -> {:?}", self.active, active);
        }
        self.active = active;
        active
    }

    pub fn release_all(&mut self) {
        for line in &mut self.lines {
            line.drive(DigitalLevel::High);
        }
        self.active = None;
    }

    pub fn attach(&mut self, index: usize, sink: Arc<dyn SignalSink>) -> SimResult<()> {
        let count = self.lines.len();
        let line = self.lines.get_mut(index).ok_or_else(|| {
            SimulationError::InvalidConfig(format!(
                "chip-select line {} out of range (controller has {})",
                index, count
            ))
        })?;
        line.connect(sink);
        Ok(())
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn level(&self, index: usize) -> Option<DigitalLevel> {
        self.lines.get(index).map(OutputLine::get)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn low_lines(router: &ChipSelectRouter) -> Vec<usize> {
        (0..router.len())
            .filter(|&i| router.level(i) == Some(DigitalLevel::Low))
            .collect()
    }

    #[test]
    fn test_zero_lines_rejected() {
        assert!(matches!(
            ChipSelectRouter::new(0),
            Err(SimulationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_default_none_asserted() {
        let router = ChipSelectRouter::new(4).unwrap();
        assert!(low_lines(&router).is_empty());
        assert_eq!(router.active(), None);
    }

    #[test]
    fn test_select_requires_enable() {
        let mut router = ChipSelectRouter::new(4).unwrap();
        assert_eq!(router.update(0b010, false), None);
        assert!(low_lines(&router).is_empty());

        assert_eq!(router.update(0b010, true), Some(1));
        assert_eq!(low_lines(&router), vec![1]);
    }

    #[test]
    fn test_highest_select_bit_wins() {
        assert_eq!(ChipSelectRouter::decode_index(0b110), 2);
        assert_eq!(ChipSelectRouter::decode_index(0b111), 2);
        assert_eq!(ChipSelectRouter::decode_index(0b011), 1);
        assert_eq!(ChipSelectRouter::decode_index(0b001), 0);
        assert_eq!(ChipSelectRouter::decode_index(0b000), 0);
    }

    #[test]
    fn test_reselect_moves_single_active_line() {
        let mut router = ChipSelectRouter::new(3).unwrap();
        router.update(0b010, true);
        router.update(0b100, true);
        assert_eq!(low_lines(&router), vec![2]);

        router.release_all();
        assert!(low_lines(&router).is_empty());
    }

    #[test]
    fn test_out_of_range_index_asserts_nothing() {
        let mut router = ChipSelectRouter::new(1).unwrap();
        assert_eq!(router.update(0b100, true), None);
        assert!(low_lines(&router).is_empty());
    }
}
