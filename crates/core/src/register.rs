// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Register decoding shared by the CTRL/DATA serial models.

pub const CTRL_OFFSET: u64 = 0x00;
pub const DATA_OFFSET: u64 = 0x04;
/// Both models expose an 8-byte window.
pub const REGISTER_WINDOW: u64 = 0x08;
pub const ACCESS_SIZE: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Ctrl,
    Data,
}

/// Misbehaviour by guest software. Always answered benignly, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuestError {
    #[error("access to unmapped offset {offset:#x}")]
    BadOffset { offset: u64 },
    #[error("{size}-byte access at offset {offset:#x}; only 4-byte accesses are supported")]
    BadWidth { offset: u64, size: u8 },
    #[error("DATA read with empty RX FIFO")]
    RxEmpty,
    #[error("TX FIFO full, dropped write of {value:#x}")]
    TxFull { value: u32 },
}

/// Maps a guest access onto one of the two registers.
pub fn decode(offset: u64, size: u8) -> Result<Register, GuestError> {
    let reg = match offset {
        CTRL_OFFSET => Register::Ctrl,
        DATA_OFFSET => Register::Data,
        _ => return Err(GuestError::BadOffset { offset }),
    };
    if size != ACCESS_SIZE {
        return Err(GuestError::BadWidth { offset, size });
    }
    Ok(reg)
}

/// Reports a guest error through the `guest_error` log target.
pub fn log_guest_error(device: &str, err: &GuestError) {
    tracing::warn!(target: "guest_error", "{}: {}", device, err);
}

/// A CTRL register whose guest-writable configuration bits and derived
/// read-only bits are stored separately and merged only at the access boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRegister {
    config: u32,
    status: u32,
    writable: u32,
}

impl ControlRegister {
    pub const fn new(writable: u32) -> Self {
        Self {
            config: 0,
            status: 0,
            writable,
        }
    }

    /// Guest-visible value.
    pub fn value(&self) -> u32 {
        (self.config & self.writable) | (self.status & !self.writable)
    }

    /// Guest write: only the writable bits are taken, read-only bits keep their state.
    pub fn write(&mut self, value: u32) {
        self.config = value & self.writable;
    }

    pub fn config(&self) -> u32 {
        self.config
    }

    pub fn writable_mask(&self) -> u32 {
        self.writable
    }

    /// Replaces every derived bit.
    pub fn set_status(&mut self, status: u32) {
        self.status = status & !self.writable;
    }

    pub fn status(&self) -> u32 {
        self.status
    }

    pub fn bit(&self, mask: u32) -> bool {
        self.value() & mask != 0
    }

    /// Extracts `width` config bits starting at `lsb`.
    pub fn field(&self, lsb: u32, width: u32) -> u32 {
        (self.config >> lsb) & ((1 << width) - 1)
    }

    pub fn clear(&mut self) {
        self.config = 0;
        self.status = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_registers() {
        assert_eq!(decode(0x0, 4), Ok(Register::Ctrl));
        assert_eq!(decode(0x4, 4), Ok(Register::Data));
    }

    #[test]
    fn test_decode_rejects_bad_offset_and_width() {
        assert_eq!(decode(0x8, 4), Err(GuestError::BadOffset { offset: 0x8 }));
        assert_eq!(decode(0x2, 4), Err(GuestError::BadOffset { offset: 0x2 }));
        assert_eq!(
            decode(0x4, 1),
            Err(GuestError::BadWidth { offset: 0x4, size: 1 })
        );
    }

    #[test]
    fn test_control_register_preserves_read_only_bits() {
        let mut ctrl = ControlRegister::new(0x0000_FFFF);
        ctrl.set_status(0x8001_0000);
        ctrl.write(0xFFFF_FFFF);
        assert_eq!(ctrl.value(), 0x8001_FFFF);

        ctrl.write(0x0000_0000);
        assert_eq!(ctrl.value(), 0x8001_0000);
    }

    #[test]
    fn test_control_register_field_extract() {
        let mut ctrl = ControlRegister::new(0xFFFF);
        ctrl.write(0b1011_1000);
        assert_eq!(ctrl.field(3, 3), 0b111);
        assert_eq!(ctrl.field(6, 2), 0b10);
    }
}
