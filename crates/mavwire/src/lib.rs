//! MAVLink packet codec.
//!
//! mavwire turns raw MAVLink byte streams into verified, decoded messages and
//! back: legacy and extended framing, CRC-16/MCRF4XX checksums, payload
//! trimming, packet signing and a data-driven dialect registry.
//!
//! # Crate Structure
//!
//! - [`checksum`]: CRC-16/MCRF4XX accumulator
//! - [`registry`]: dialects, message descriptors and field values
//! - [`frame`]: headers, pack/unpack, signing and the streaming parser
//! - [`link`]: per-connection sequencing, signing and counters

/// Re-export checksum types.
pub mod checksum {
    pub use mavwire_checksum::*;
}

/// Re-export registry types.
pub mod registry {
    pub use mavwire_registry::*;
}

/// Re-export frame types.
pub mod frame {
    pub use mavwire_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use mavwire_link::*;
}

pub use mavwire_frame::{FrameParser, Packet, ParseEvent};
pub use mavwire_link::{Link, LinkConfig};
pub use mavwire_registry::{Dialect, Message, Registry, Value};
