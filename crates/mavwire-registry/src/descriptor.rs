use std::collections::HashSet;

use bytes::{Buf, BufMut};
use mavwire_checksum::{Checksum, Crc16};

use crate::error::{RegistryError, Result};
use crate::types::{char_value, FieldType};
use crate::value::Value;

/// Largest payload a frame can carry.
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Largest message id representable in an extended header.
pub const MAX_MESSAGE_ID: u32 = 0x00FF_FFFF;

/// One field of a message, positioned in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: FieldType,
    /// Number of elements; `0` for a scalar.
    pub array_length: usize,
    /// Extension fields follow all base fields and may be absent on the wire.
    pub extension: bool,
    /// Byte offset in the untrimmed payload.
    pub offset: usize,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: FieldType, array_length: usize) -> Self {
        Self {
            name: name.into(),
            ty,
            array_length,
            extension: false,
            offset: 0,
        }
    }

    /// Mark this field as an extension.
    pub fn extension(mut self) -> Self {
        self.extension = true;
        self
    }

    /// Bytes this field occupies in the payload.
    pub fn wire_len(&self) -> usize {
        self.ty.size() * self.array_length.max(1)
    }

    pub fn is_array(&self) -> bool {
        self.array_length > 0
    }

    /// Definition-style type name, e.g. `char[16]`.
    pub fn type_name(&self) -> String {
        if self.is_array() {
            format!("{}[{}]", self.ty, self.array_length)
        } else {
            self.ty.to_string()
        }
    }

    /// Value a freshly constructed message holds for this field.
    pub fn default_value(&self) -> Value {
        match (self.ty, self.array_length) {
            (FieldType::Char, _) | (_, 0) => self.ty.zero(),
            (ty, len) => Value::Array(vec![ty.zero(); len]),
        }
    }

    /// Check `value` against this field and normalize it to the field's type.
    ///
    /// Numeric arrays shorter than the field are zero-padded. Text for a
    /// `char` field must not contain NUL; raw bytes may.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        let mismatch = || RegistryError::ValueMismatch {
            field: self.name.clone(),
            expected: self.type_name(),
        };

        if self.ty == FieldType::Char {
            let raw = match value {
                Value::Text(text) if text.contains('\0') => return Err(mismatch()),
                Value::Text(text) => text.into_bytes(),
                Value::Bytes(bytes) => bytes,
                other => {
                    let byte = self.ty.coerce_scalar(&other).ok_or_else(mismatch)?;
                    vec![byte.as_u64().ok_or_else(mismatch)? as u8]
                }
            };
            if raw.len() > self.array_length.max(1) {
                return Err(mismatch());
            }
            return Ok(char_value(&raw));
        }

        if !self.is_array() {
            return self.ty.coerce_scalar(&value).ok_or_else(mismatch);
        }

        let Value::Array(items) = value else {
            return Err(mismatch());
        };
        if items.len() > self.array_length {
            return Err(mismatch());
        }
        let mut out = Vec::with_capacity(self.array_length);
        for item in &items {
            out.push(self.ty.coerce_scalar(item).ok_or_else(mismatch)?);
        }
        out.resize(self.array_length, self.ty.zero());
        Ok(Value::Array(out))
    }

    fn put(&self, value: &Value, dst: &mut impl BufMut) {
        match (self.ty, value) {
            (FieldType::Char, Value::Text(_) | Value::Bytes(_)) => {
                let len = self.array_length.max(1);
                let bytes = value.as_bytes().unwrap_or_default();
                let used = bytes.len().min(len);
                dst.put_slice(&bytes[..used]);
                dst.put_bytes(0, len - used);
            }
            (ty, Value::Array(items)) if self.is_array() => {
                for index in 0..self.array_length {
                    match items.get(index) {
                        Some(item) => ty.put(item, dst),
                        None => dst.put_bytes(0, ty.size()),
                    }
                }
            }
            (ty, value) if !self.is_array() => ty.put(value, dst),
            _ => dst.put_bytes(0, self.wire_len()),
        }
    }

    fn get(&self, src: &mut impl Buf) -> Value {
        if self.ty == FieldType::Char {
            let len = self.array_length.max(1);
            let mut raw = vec![0u8; len];
            src.copy_to_slice(&mut raw);
            return char_value(&raw);
        }
        if !self.is_array() {
            return self.ty.get(src);
        }
        Value::Array((0..self.array_length).map(|_| self.ty.get(src)).collect())
    }
}

/// Wire descriptor for one message type.
///
/// Fields are held in wire order. The order they were declared in is kept
/// alongside for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    id: u32,
    name: String,
    crc_extra: u8,
    fields: Vec<FieldDescriptor>,
    declaration_order: Vec<usize>,
    encoded_len: usize,
    base_len: usize,
}

impl MessageDescriptor {
    /// Build a descriptor from fields in declaration order.
    ///
    /// When `crc_extra` is `None` it is derived from the definition.
    pub fn new(
        id: u32,
        name: impl Into<String>,
        declared: Vec<FieldDescriptor>,
        crc_extra: Option<u8>,
    ) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: String| RegistryError::InvalidDescriptor {
            message: name.clone(),
            reason,
        };

        if id > MAX_MESSAGE_ID {
            return Err(invalid(format!("message id {id} exceeds 24 bits")));
        }
        if name.is_empty() {
            return Err(invalid("message name is empty".to_string()));
        }
        if declared.is_empty() {
            return Err(invalid("message has no fields".to_string()));
        }

        let mut seen = HashSet::new();
        let mut in_extensions = false;
        for field in &declared {
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field '{}'", field.name)));
            }
            if field.array_length > MAX_PAYLOAD_LEN {
                return Err(invalid(format!("field '{}' array too long", field.name)));
            }
            if in_extensions && !field.extension {
                return Err(invalid(format!(
                    "base field '{}' declared after extensions",
                    field.name
                )));
            }
            in_extensions |= field.extension;
        }

        // Base fields are stably sorted by element size, largest first.
        // Extensions keep declaration order after them.
        let mut order: Vec<usize> = (0..declared.len()).collect();
        let base_count = declared.iter().filter(|f| !f.extension).count();
        order[..base_count].sort_by_key(|&i| std::cmp::Reverse(declared[i].ty.size()));

        let mut fields = Vec::with_capacity(declared.len());
        let mut declaration_order = vec![0; declared.len()];
        let mut offset = 0;
        let mut base_len = 0;
        for (wire_index, &declared_index) in order.iter().enumerate() {
            let mut field = declared[declared_index].clone();
            field.offset = offset;
            offset += field.wire_len();
            if !field.extension {
                base_len = offset;
            }
            declaration_order[declared_index] = wire_index;
            fields.push(field);
        }

        if offset > MAX_PAYLOAD_LEN {
            return Err(invalid(format!(
                "payload length {offset} exceeds {MAX_PAYLOAD_LEN}"
            )));
        }

        let mut descriptor = Self {
            id,
            name,
            crc_extra: 0,
            fields,
            declaration_order,
            encoded_len: offset,
            base_len,
        };
        descriptor.crc_extra = crc_extra.unwrap_or_else(|| compute_crc_extra(&descriptor));
        Ok(descriptor)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn crc_extra(&self) -> u8 {
        self.crc_extra
    }

    /// Untrimmed payload length, extensions included.
    pub fn encoded_len(&self) -> usize {
        self.encoded_len
    }

    /// Payload length of the base fields alone.
    pub fn base_len(&self) -> usize {
        self.base_len
    }

    /// Fields in wire order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Fields in declaration order.
    pub fn declared_fields(&self) -> impl Iterator<Item = &FieldDescriptor> + '_ {
        self.declaration_order.iter().map(|&i| &self.fields[i])
    }

    /// Wire-order positions of fields, listed in declaration order.
    pub fn declaration_order(&self) -> &[usize] {
        &self.declaration_order
    }

    /// Wire-order index of the field called `name`.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Zero values for every field, in wire order.
    pub fn default_values(&self) -> Vec<Value> {
        self.fields.iter().map(FieldDescriptor::default_value).collect()
    }

    /// Serialize `values` (wire order) into an untrimmed payload.
    pub fn encode_payload(&self, values: &[Value], dst: &mut impl BufMut) {
        for (index, field) in self.fields.iter().enumerate() {
            match values.get(index) {
                Some(value) => field.put(value, dst),
                None => dst.put_bytes(0, field.wire_len()),
            }
        }
    }

    /// Deserialize an untrimmed payload into values in wire order.
    ///
    /// Bytes past [`encoded_len`](Self::encoded_len) are ignored.
    pub fn decode_payload(&self, payload: &[u8]) -> Result<Vec<Value>> {
        if payload.len() < self.encoded_len {
            return Err(RegistryError::PayloadTooShort {
                message: self.name.clone(),
                expected: self.encoded_len,
                actual: payload.len(),
            });
        }

        Ok(self.decode_wire(payload))
    }

    /// Deserialize a payload as it appeared on the wire.
    ///
    /// A trimmed payload is zero-filled up to the encoded length, which also
    /// covers senders that omit extension fields. Extra bytes are ignored.
    pub fn decode_wire(&self, payload: &[u8]) -> Vec<Value> {
        let mut padded = [0u8; MAX_PAYLOAD_LEN];
        let used = payload.len().min(self.encoded_len);
        padded[..used].copy_from_slice(&payload[..used]);

        let mut src = &padded[..self.encoded_len];
        self.fields.iter().map(|field| field.get(&mut src)).collect()
    }
}

/// Derive the `crc_extra` seed from a message definition.
///
/// The seed is a checksum over the message name and, for each base field in
/// wire order, its C type, its name and (for arrays) its length byte, folded
/// to eight bits.
pub fn compute_crc_extra(descriptor: &MessageDescriptor) -> u8 {
    let mut crc = Checksum::default();
    crc.accumulate(descriptor.name.as_bytes());
    crc.accumulate(b" ");
    for field in descriptor.fields.iter().filter(|f| !f.extension) {
        crc.accumulate(field.ty.c_name().as_bytes());
        crc.accumulate(b" ");
        crc.accumulate(field.name.as_bytes());
        crc.accumulate(b" ");
        if field.is_array() {
            crc.accumulate_byte(field.array_length as u8);
        }
    }
    let value = crc.value();
    ((value & 0xFF) ^ (value >> 8)) as u8
}
