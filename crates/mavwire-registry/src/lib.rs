//! MAVLink message registry: dialects, message descriptors and field values.
//!
//! A dialect is a named set of message definitions. Each definition becomes a
//! [`MessageDescriptor`] that knows its field layout in wire order, its
//! `crc_extra` checksum seed and how to turn payload bytes into [`Value`]s
//! and back.
//!
//! Descriptors are data. Dialects load from JSON documents, either the
//! built-in `minimal` and `common` sets or files on disk.

pub mod config;
pub mod descriptor;
pub mod dialect;
pub mod error;
pub mod message;
pub mod registry;
pub mod types;
pub mod value;

pub use config::RegistryConfig;
pub use descriptor::{
    compute_crc_extra, FieldDescriptor, MessageDescriptor, MAX_MESSAGE_ID, MAX_PAYLOAD_LEN,
};
pub use dialect::{Dialect, DialectDocument, FieldDefinition, MessageDefinition, MessageKey};
pub use error::{RegistryError, Result};
pub use message::Message;
pub use registry::{Registry, BUILTIN_DIALECTS};
pub use types::{parse_type_spec, FieldType, UnknownFieldType};
pub use value::Value;
