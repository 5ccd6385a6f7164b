use crc::{Crc, CRC_16_MCRF4XX};

use crate::{Crc16, CRC_INIT};

static MCRF4XX: Crc<u16> = Crc::<u16>::new(&CRC_16_MCRF4XX);

/// Table-driven CRC-16/MCRF4XX backed by the `crc` crate.
///
/// Only the running value is stored, so the accumulator stays `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableChecksum {
    acc: u16,
}

impl TableChecksum {
    /// Create an accumulator in its initial state.
    pub const fn new() -> Self {
        Self { acc: CRC_INIT }
    }

    /// Fold `bytes` into the accumulator.
    pub fn accumulate(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        // MCRF4XX is reflected on input, and `digest_with_initial` reflects the
        // supplied seed, so the running value is handed over bit-reversed.
        let mut digest = MCRF4XX.digest_with_initial(self.acc.reverse_bits());
        digest.update(bytes);
        self.acc = digest.finalize();
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

impl Default for TableChecksum {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc16 for TableChecksum {
    fn accumulate(&mut self, bytes: &[u8]) {
        TableChecksum::accumulate(self, bytes);
    }

    fn value(&self) -> u16 {
        TableChecksum::value(self)
    }

    fn reset(&mut self) {
        TableChecksum::reset(self);
    }
}
