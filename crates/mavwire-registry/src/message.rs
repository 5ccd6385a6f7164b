use std::sync::Arc;

use bytes::BufMut;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::descriptor::MessageDescriptor;
use crate::error::{RegistryError, Result};
use crate::value::Value;

/// A message instance: a descriptor plus one value per field.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    descriptor: Arc<MessageDescriptor>,
    values: Vec<Value>,
}

impl Message {
    /// A message with every field set to zero.
    pub fn new(descriptor: Arc<MessageDescriptor>) -> Self {
        let values = descriptor.default_values();
        Self { descriptor, values }
    }

    /// Build a message from named values. Fields not named stay zero.
    pub fn from_values<I, K, V>(descriptor: Arc<MessageDescriptor>, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut message = Self::new(descriptor);
        for (name, value) in values {
            message.set(name.as_ref(), value)?;
        }
        Ok(message)
    }

    /// Decode an untrimmed payload.
    pub fn decode(descriptor: Arc<MessageDescriptor>, payload: &[u8]) -> Result<Self> {
        let values = descriptor.decode_payload(payload)?;
        Ok(Self { descriptor, values })
    }

    /// Decode a payload as received, zero-filling trimmed bytes.
    pub fn from_wire(descriptor: Arc<MessageDescriptor>, payload: &[u8]) -> Self {
        let values = descriptor.decode_wire(payload);
        Self { descriptor, values }
    }

    /// Set a field, checking the value against its wire type.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let index = self
            .descriptor
            .field_index(name)
            .ok_or_else(|| RegistryError::UnknownField {
                message: self.descriptor.name().to_string(),
                field: name.to_string(),
            })?;
        let value = self.descriptor.fields()[index].coerce(value.into())?;
        self.values[index] = value;
        Ok(())
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.descriptor
            .field_index(name)
            .map(|index| &self.values[index])
    }

    pub fn id(&self) -> u32 {
        self.descriptor.id()
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn crc_extra(&self) -> u8 {
        self.descriptor.crc_extra()
    }

    pub fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    /// Values in wire order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// `(name, value)` pairs in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.descriptor
            .declaration_order()
            .iter()
            .map(|&index| (self.descriptor.fields()[index].name.as_str(), &self.values[index]))
    }

    /// Append the untrimmed payload to `dst`.
    pub fn encode_payload(&self, dst: &mut impl BufMut) {
        self.descriptor.encode_payload(&self.values, dst);
    }

    /// JSON object keyed by field name, with the message name under
    /// `mavpackettype`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert(
            "mavpackettype".to_string(),
            serde_json::Value::String(self.name().to_string()),
        );
        for (name, value) in self.fields() {
            let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
            map.insert(name.to_string(), value);
        }
        serde_json::Value::Object(map)
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 1))?;
        map.serialize_entry("mavpackettype", self.name())?;
        for (name, value) in self.fields() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
