// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use rvperiph_config::Step;
use rvperiph_core::bus::PeripheralBus;
use rvperiph_core::transport::InputQueue;
use rvperiph_core::SimulationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepFailure {
    pub step: usize,
    pub op: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct BenchRun {
    pub steps_executed: u64,
    pub failures: Vec<StepFailure>,
}

/// A step the bench could not execute at all, as opposed to a failed expectation.
#[derive(Debug, thiserror::Error)]
#[error("step {step} ({op}): {source}")]
pub struct RuntimeFailure {
    pub step: usize,
    pub op: &'static str,
    #[source]
    pub source: SimulationError,
}

/// Executes scripted steps against a bench.
///
/// Inbound bytes are queued per UART and handed over only while the UART has
/// room, so a script can deliver more than one FIFO's worth at once; the rest
/// follows as the guest drains.
pub struct BenchRunner<'a> {
    bus: &'a mut PeripheralBus,
    uart_tx: Arc<Mutex<Vec<u8>>>,
    inbound: BTreeMap<String, InputQueue>,
}

impl<'a> BenchRunner<'a> {
    pub fn new(bus: &'a mut PeripheralBus, uart_tx: Arc<Mutex<Vec<u8>>>) -> Self {
        Self {
            bus,
            uart_tx,
            inbound: BTreeMap::new(),
        }
    }

    pub fn run(&mut self, steps: &[Step]) -> Result<BenchRun, RuntimeFailure> {
        let mut run = BenchRun::default();
        for (index, step) in steps.iter().enumerate() {
            let outcome = self.execute(step).map_err(|source| RuntimeFailure {
                step: index,
                op: step.name(),
                source,
            })?;
            run.steps_executed += 1;
            if let Err(message) = outcome {
                tracing::error!("step {} ({}) failed: {}", index, step.name(), message);
                run.failures.push(StepFailure {
                    step: index,
                    op: step.name().to_string(),
                    message,
                });
            }
        }

        for (name, queue) in &self.inbound {
            if !queue.is_empty() {
                tracing::warn!("{} inbound byte(s) never delivered to {}", queue.len(), name);
            }
        }
        Ok(run)
    }

    fn pump_inbound(&mut self) -> Result<(), SimulationError> {
        for (name, queue) in self.inbound.iter_mut() {
            if !queue.is_empty() {
                self.bus.pump_uart(name, queue)?;
            }
        }
        Ok(())
    }

    /// Outer error: the step could not run. Inner error: an expectation failed.
    fn execute(&mut self, step: &Step) -> Result<Result<(), String>, SimulationError> {
        self.pump_inbound()?;

        let outcome = match step {
            Step::Write { address, value } => {
                self.bus.write_u32(*address, *value)?;
                Ok(())
            }
            Step::Read {
                address,
                expect,
                mask,
            } => {
                let value = self.bus.read_u32(*address)?;
                tracing::info!("read {:#010x} -> {:#010x}", address, value);
                match expect {
                    Some(expected) => {
                        let mask = mask.unwrap_or(u32::MAX);
                        if value & mask == expected & mask {
                            Ok(())
                        } else {
                            Err(format!(
                                "read {:#010x}: expected {:#010x} (mask {:#010x}), got {:#010x}",
                                address, expected, mask, value
                            ))
                        }
                    }
                    None => Ok(()),
                }
            }
            Step::Receive { peripheral, .. } => {
                let queue = self.inbound.entry(peripheral.clone()).or_default();
                queue.extend(&step.payload());
                let delivered = self.bus.pump_uart(peripheral, queue)?;
                tracing::debug!("delivered {} byte(s) to {}", delivered, peripheral);
                Ok(())
            }
            Step::ExpectIrq { irq, level } => {
                let actual = self.bus.irq_level(*irq);
                if actual == *level {
                    Ok(())
                } else {
                    Err(format!("irq {}: expected level {}, got {}", irq, level, actual))
                }
            }
            Step::ExpectUart { contains } => {
                let tx = self.uart_tx_text();
                if tx.contains(contains.as_str()) {
                    Ok(())
                } else {
                    Err(format!("UART output does not contain {:?}", contains))
                }
            }
            Step::Reset => {
                self.bus.reset_all();
                self.inbound.clear();
                Ok(())
            }
        };
        Ok(outcome)
    }

    pub fn uart_tx_text(&self) -> String {
        self.uart_tx
            .lock()
            .map(|tx| String::from_utf8_lossy(&tx).into_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rvperiph_config::BenchManifest;

    fn bus() -> (PeripheralBus, Arc<Mutex<Vec<u8>>>) {
        let manifest = BenchManifest::from_yaml(
            r#"
name: "runner"
peripherals:
  - id: "uart0"
    type: "uart"
    base_address: 0x1000
    size: "8B"
    irq: 1
    config:
      rx_fifo_capacity: 2
"#,
        )
        .unwrap();
        let mut bus = PeripheralBus::from_config(&manifest).unwrap();
        let tx = Arc::new(Mutex::new(Vec::new()));
        bus.attach_uart_tx_sink(tx.clone(), false);
        (bus, tx)
    }

    #[test]
    fn test_runner_collects_failures_and_continues() {
        let (mut bus, tx) = bus();
        let steps = vec![
            Step::Write {
                address: 0x1004,
                value: u32::from(b'o'),
            },
            Step::ExpectUart {
                contains: "o".to_string(),
            },
            Step::ExpectIrq {
                irq: 1,
                level: true,
            },
            Step::Read {
                address: 0x1004,
                expect: Some(0x55),
                mask: None,
            },
        ];
        let run = BenchRunner::new(&mut bus, tx).run(&steps).unwrap();
        assert_eq!(run.steps_executed, 4);
        assert_eq!(run.failures.len(), 2);
        assert_eq!(run.failures[0].op, "expect_irq");
        assert_eq!(run.failures[1].step, 3);
    }

    #[test]
    fn test_runner_holds_bytes_until_room() {
        let (mut bus, tx) = bus();
        let steps = vec![
            Step::Receive {
                peripheral: "uart0".to_string(),
                bytes: vec![1, 2, 3],
                text: None,
            },
            Step::Read {
                address: 0x1004,
                expect: Some(1),
                mask: None,
            },
            Step::Read {
                address: 0x1004,
                expect: Some(2),
                mask: None,
            },
            Step::Read {
                address: 0x1004,
                expect: Some(3),
                mask: None,
            },
        ];
        let run = BenchRunner::new(&mut bus, tx).run(&steps).unwrap();
        assert!(run.failures.is_empty(), "{:?}", run.failures);
    }

    #[test]
    fn test_runner_unmapped_access_is_runtime_failure() {
        let (mut bus, tx) = bus();
        let steps = vec![
            Step::Reset,
            Step::Read {
                address: 0xdead_0000,
                expect: None,
                mask: None,
            },
        ];
        let err = BenchRunner::new(&mut bus, tx).run(&steps).unwrap_err();
        assert_eq!(err.step, 1);
        assert!(matches!(err.source, SimulationError::MemoryViolation(_)));
    }
}
