//! CRC-16/MCRF4XX checksum used by MAVLink frames.
//!
//! Every frame carries a 16-bit checksum computed over the header (minus the
//! start marker), the payload, and one trailing `crc_extra` seed byte that is
//! specific to the message type.
//!
//! Two accumulators implement the same [`Crc16`] interface:
//! - [`SoftwareChecksum`]: the nibble-based recurrence from the MAVLink C
//!   library, always available
//! - [`TableChecksum`]: table-driven, backed by the `crc` crate (behind the
//!   default `table` feature)
//!
//! [`Checksum`] names whichever one the build selected. Both produce
//! bit-identical output.

pub mod software;
#[cfg(feature = "table")]
pub mod table;

pub use software::SoftwareChecksum;
#[cfg(feature = "table")]
pub use table::TableChecksum;

/// Accumulator value before any byte has been folded in.
pub const CRC_INIT: u16 = 0xFFFF;

/// The accumulator selected at build time.
#[cfg(feature = "table")]
pub type Checksum = TableChecksum;

/// The accumulator selected at build time.
#[cfg(not(feature = "table"))]
pub type Checksum = SoftwareChecksum;

/// Incremental CRC-16/MCRF4XX accumulator.
pub trait Crc16: Clone + Default {
    /// Fold `bytes` into the accumulator.
    fn accumulate(&mut self, bytes: &[u8]);

    /// Current checksum value.
    fn value(&self) -> u16;

    /// Return to the initial state.
    fn reset(&mut self);

    /// Fold a single byte into the accumulator.
    fn accumulate_byte(&mut self, byte: u8) {
        self.accumulate(&[byte]);
    }
}

/// Checksum of a complete byte sequence.
pub fn checksum(bytes: &[u8]) -> u16 {
    let mut crc = Checksum::default();
    crc.accumulate(bytes);
    crc.value()
}

/// Checksum of a frame body followed by its `crc_extra` seed.
///
/// `body` is everything after the start marker up to and including the
/// last payload byte.
pub fn frame_checksum(body: &[u8], crc_extra: u8) -> u16 {
    let mut crc = Checksum::default();
    crc.accumulate(body);
    crc.accumulate_byte(crc_extra);
    crc.value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value_matches_catalogue() {
        // CRC-16/MCRF4XX check value from the CRC catalogue.
        assert_eq!(checksum(b"123456789"), 0x6F91);
    }

    #[test]
    fn empty_input_is_init() {
        assert_eq!(checksum(&[]), CRC_INIT);
    }

    #[test]
    fn frame_checksum_appends_seed() {
        let body = [0x09, 0x00, 0x01, 0x01, 0x00];
        let mut expected = Checksum::default();
        expected.accumulate(&body);
        expected.accumulate(&[50]);
        assert_eq!(frame_checksum(&body, 50), expected.value());
    }
}
