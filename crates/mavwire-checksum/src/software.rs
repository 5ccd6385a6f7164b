use crate::{Crc16, CRC_INIT};

/// Nibble-based CRC-16/MCRF4XX, bit-identical to `checksum.h` in the
/// MAVLink C library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftwareChecksum {
    acc: u16,
}

impl SoftwareChecksum {
    /// Create an accumulator in its initial state.
    pub const fn new() -> Self {
        Self { acc: CRC_INIT }
    }

    /// Fold `bytes` into the accumulator.
    pub fn accumulate(&mut self, bytes: &[u8]) {
        let mut acc = self.acc;
        for &byte in bytes {
            let mut tmp = byte ^ (acc & 0xFF) as u8;
            tmp ^= tmp << 4;
            let tmp = u16::from(tmp);
            acc = (acc >> 8) ^ (tmp << 8) ^ (tmp << 3) ^ (tmp >> 4);
        }
        self.acc = acc;
    }

    /// Current checksum value.
    pub const fn value(&self) -> u16 {
        self.acc
    }

    /// Return to the initial state.
    pub fn reset(&mut self) {
        self.acc = CRC_INIT;
    }
}

impl Default for SoftwareChecksum {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc16 for SoftwareChecksum {
    fn accumulate(&mut self, bytes: &[u8]) {
        SoftwareChecksum::accumulate(self, bytes);
    }

    fn value(&self) -> u16 {
        SoftwareChecksum::value(self)
    }

    fn reset(&mut self) {
        SoftwareChecksum::reset(self);
    }
}
