//! Connection-level MAVLink state.
//!
//! A [`Link`] stamps outgoing frames with its source ids and a wrapping
//! sequence number, signs them when a key is configured, and parses the
//! incoming byte stream with the same signing context. With the `async`
//! feature, [`LinkCodec`] plugs a link into `tokio_util::codec::Framed`.

#[cfg(feature = "async")]
pub mod codec;
pub mod config;
pub mod error;
pub mod link;

#[cfg(feature = "async")]
pub use codec::LinkCodec;
pub use config::LinkConfig;
pub use error::{LinkError, Result};
pub use link::{Link, LinkStats};
