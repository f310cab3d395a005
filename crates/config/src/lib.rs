// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

const SUPPORTED_SCHEMA: &str = "1.0";

/// Window size used when a peripheral entry omits `size`.
pub const DEFAULT_WINDOW_SIZE: u64 = 0x1000;

/// Peripheral types a bench can instantiate.
pub const PERIPHERAL_TYPES: &[&str] = &["uart", "spi"];

fn check_schema(kind: &str, version: &str) -> Result<()> {
    if version != SUPPORTED_SCHEMA {
        anyhow::bail!(
            "Unsupported {} schema_version '{}'. Supported versions: '{}'",
            kind,
            version,
            SUPPORTED_SCHEMA
        );
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PeripheralConfig {
    pub id: String,
    pub r#type: String, // "uart" or "spi"
    pub base_address: u64,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub irq: Option<u32>,
    #[serde(default)]
    pub config: HashMap<String, serde_yaml::Value>,
}

impl PeripheralConfig {
    pub fn window_size(&self) -> Result<u64> {
        match &self.size {
            Some(size) => parse_size(size)
                .with_context(|| format!("Invalid size for peripheral '{}'", self.id)),
            None => Ok(DEFAULT_WINDOW_SIZE),
        }
    }

    /// Decodes the free-form `config` map into a device-specific settings type.
    pub fn device_config<T: DeserializeOwned>(&self) -> Result<T> {
        let map: serde_yaml::Mapping = self
            .config
            .iter()
            .map(|(k, v)| (serde_yaml::Value::String(k.clone()), v.clone()))
            .collect();
        serde_yaml::from_value(serde_yaml::Value::Mapping(map))
            .with_context(|| format!("Invalid config for peripheral '{}'", self.id))
    }
}

/// The set of device instances on one bench.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BenchManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    pub peripherals: Vec<PeripheralConfig>,
}

impl BenchManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read bench manifest at {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Bench Manifest YAML")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        check_schema("manifest", &self.schema_version)?;

        if self.peripherals.is_empty() {
            anyhow::bail!("Manifest '{}' declares no peripherals", self.name);
        }

        let mut ids = HashSet::new();
        let mut irqs = HashSet::new();
        let mut windows: Vec<(u64, u64, &str)> = Vec::new();
        for p in &self.peripherals {
            if p.id.trim().is_empty() {
                anyhow::bail!("Peripheral id cannot be empty");
            }
            if !ids.insert(p.id.as_str()) {
                anyhow::bail!("Duplicate peripheral id '{}'", p.id);
            }
            if !PERIPHERAL_TYPES.contains(&p.r#type.as_str()) {
                anyhow::bail!(
                    "Unknown peripheral type '{}' for '{}'. Supported types: {}",
                    p.r#type,
                    p.id,
                    PERIPHERAL_TYPES.join(", ")
                );
            }

            if let Some(irq) = p.irq {
                if !irqs.insert(irq) {
                    anyhow::bail!("Peripheral '{}' reuses interrupt line {}", p.id, irq);
                }
            }

            let size = p.window_size()?;
            if size == 0 {
                anyhow::bail!("Peripheral '{}' has an empty address window", p.id);
            }
            let end = p.base_address.checked_add(size).ok_or_else(|| {
                anyhow::anyhow!("Peripheral '{}' window wraps the address space", p.id)
            })?;

            if let Some((_, _, other)) = windows
                .iter()
                .find(|(base, other_end, _)| p.base_address < *other_end && *base < end)
            {
                anyhow::bail!(
                    "Peripheral '{}' at {:#x} overlaps '{}'",
                    p.id,
                    p.base_address,
                    other
                );
            }
            windows.push((p.base_address, end, p.id.as_str()));
        }

        Ok(())
    }

    pub fn peripheral(&self, id: &str) -> Option<&PeripheralConfig> {
        self.peripherals.iter().find(|p| p.id == id)
    }
}

/// Where a script gets its bench from: a manifest file (relative paths are
/// resolved against the script's directory) or an inline manifest.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum ManifestSource {
    Path(String),
    Inline(BenchManifest),
}

/// One scripted action against a bench.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// 32-bit register write.
    Write { address: u64, value: u32 },
    /// 32-bit register read, optionally compared under `mask`.
    Read {
        address: u64,
        #[serde(default)]
        expect: Option<u32>,
        #[serde(default)]
        mask: Option<u32>,
    },
    /// Host-side delivery of inbound bytes to a serial peripheral.
    Receive {
        peripheral: String,
        #[serde(default)]
        bytes: Vec<u8>,
        #[serde(default)]
        text: Option<String>,
    },
    ExpectIrq { irq: u32, level: bool },
    /// Checks that everything the guest transmitted so far contains `contains`.
    ExpectUart { contains: String },
    Reset,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Write { .. } => "write",
            Step::Read { .. } => "read",
            Step::Receive { .. } => "receive",
            Step::ExpectIrq { .. } => "expect_irq",
            Step::ExpectUart { .. } => "expect_uart",
            Step::Reset => "reset",
        }
    }

    /// Inbound payload of a `receive` step: `bytes` followed by `text`.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Step::Receive { bytes, text, .. } => {
                let mut out = bytes.clone();
                if let Some(text) = text {
                    out.extend_from_slice(text.as_bytes());
                }
                out
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BenchScript {
    pub schema_version: String,
    pub manifest: ManifestSource,
    pub steps: Vec<Step>,
}

impl BenchScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to open bench script at {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let script: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Bench Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        check_schema("script", &self.schema_version)?;

        if self.steps.is_empty() {
            anyhow::bail!("Script has no steps");
        }

        for (i, step) in self.steps.iter().enumerate() {
            match step {
                Step::Receive { peripheral, .. } => {
                    if peripheral.trim().is_empty() {
                        anyhow::bail!("Step {} (receive): 'peripheral' cannot be empty", i);
                    }
                    if step.payload().is_empty() {
                        anyhow::bail!("Step {} (receive): needs 'bytes' or 'text'", i);
                    }
                }
                Step::Read {
                    expect: None,
                    mask: Some(_),
                    ..
                } => {
                    anyhow::bail!("Step {} (read): 'mask' given without 'expect'", i);
                }
                _ => {}
            }
        }

        if let ManifestSource::Inline(manifest) = &self.manifest {
            manifest.validate()?;
        }

        Ok(())
    }

    /// Loads and validates the bench this script runs against.
    pub fn resolve_manifest(&self, script_dir: Option<&Path>) -> Result<BenchManifest> {
        match &self.manifest {
            ManifestSource::Inline(manifest) => Ok(manifest.clone()),
            ManifestSource::Path(path) => {
                let mut full = PathBuf::from(path);
                if full.is_relative() {
                    if let Some(dir) = script_dir {
                        full = dir.join(full);
                    }
                }
                BenchManifest::from_file(&full)
            }
        }
    }
}

/// Reads a script and the manifest it names.
pub fn load_bench<P: AsRef<Path>>(script_path: P) -> Result<(BenchScript, BenchManifest)> {
    let script_path = script_path.as_ref();
    let script = BenchScript::from_file(script_path)?;
    let manifest = script
        .resolve_manifest(script_path.parent())
        .with_context(|| format!("Failed to load manifest for script {:?}", script_path))?;
    Ok((script, manifest))
}

/// Parses a window size such as `"8B"` or `"4KiB"`.
///
/// Follows `human-size`: `kB` is 1000 bytes, while `KB` and `KiB` are 1024.
pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
