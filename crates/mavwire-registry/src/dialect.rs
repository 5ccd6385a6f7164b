use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Deserialize;

use crate::config::RegistryConfig;
use crate::descriptor::{compute_crc_extra, FieldDescriptor, MessageDescriptor};
use crate::error::{RegistryError, Result};
use crate::types::parse_type_spec;

/// Key used to look a message up in a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey<'a> {
    Id(u32),
    /// Matched case-insensitively.
    Name(&'a str),
}

impl From<u32> for MessageKey<'_> {
    fn from(id: u32) -> Self {
        MessageKey::Id(id)
    }
}

impl<'a> From<&'a str> for MessageKey<'a> {
    fn from(name: &'a str) -> Self {
        MessageKey::Name(name)
    }
}

impl std::fmt::Display for MessageKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKey::Id(id) => write!(f, "#{id}"),
            MessageKey::Name(name) => f.write_str(name),
        }
    }
}

/// A named set of message descriptors.
#[derive(Debug, Clone)]
pub struct Dialect {
    name: String,
    legacy_only: bool,
    by_id: BTreeMap<u32, Arc<MessageDescriptor>>,
    by_name: HashMap<String, Arc<MessageDescriptor>>,
}

impl Dialect {
    /// Empty dialect. Names are stored lowercase.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            legacy_only: false,
            by_id: BTreeMap::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True for dialects that only speak the legacy header.
    pub fn legacy_only(&self) -> bool {
        self.legacy_only
    }

    pub fn set_legacy_only(&mut self, legacy_only: bool) {
        self.legacy_only = legacy_only;
    }

    /// Add or replace a message. Returns the descriptor registered under the
    /// same id, if any.
    ///
    /// A message registered under the same name with another id is removed,
    /// so lookups by id and by name always agree.
    pub fn insert(&mut self, descriptor: MessageDescriptor) -> Option<Arc<MessageDescriptor>> {
        self.insert_shared(Arc::new(descriptor))
    }

    fn insert_shared(
        &mut self,
        descriptor: Arc<MessageDescriptor>,
    ) -> Option<Arc<MessageDescriptor>> {
        let key = descriptor.name().to_ascii_lowercase();
        if let Some(same_name) = self.by_name.get(&key) {
            if same_name.id() != descriptor.id() {
                tracing::debug!(
                    dialect = %self.name,
                    name = descriptor.name(),
                    old_id = same_name.id(),
                    new_id = descriptor.id(),
                    "message name moved to a new id"
                );
                self.by_id.remove(&same_name.id());
            }
        }

        let previous = self.by_id.insert(descriptor.id(), Arc::clone(&descriptor));
        if let Some(previous) = &previous {
            self.by_name.remove(&previous.name().to_ascii_lowercase());
        }
        self.by_name.insert(key, descriptor);
        previous
    }

    pub fn lookup<'a>(&self, key: impl Into<MessageKey<'a>>) -> Option<&Arc<MessageDescriptor>> {
        match key.into() {
            MessageKey::Id(id) => self.by_id.get(&id),
            MessageKey::Name(name) => self.by_name.get(&name.to_ascii_lowercase()),
        }
    }

    /// Like [`lookup`](Self::lookup), with a descriptive error on failure.
    pub fn message<'a>(&self, key: impl Into<MessageKey<'a>>) -> Result<Arc<MessageDescriptor>> {
        let key = key.into();
        self.lookup(key)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownMessage {
                dialect: self.name.clone(),
                message: key.to_string(),
            })
    }

    pub fn contains(&self, id: u32) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Descriptors ordered by message id.
    pub fn messages(&self) -> impl Iterator<Item = &Arc<MessageDescriptor>> + '_ {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Build a dialect from a parsed document. Messages of `includes` are
    /// merged first; the document's own messages replace them on id clash.
    pub fn from_document(
        document: &DialectDocument,
        includes: &[&Dialect],
        config: &RegistryConfig,
    ) -> Result<Self> {
        let mut dialect = Dialect::new(&document.name);
        dialect.legacy_only = document.legacy_only;

        for included in includes {
            for descriptor in included.messages() {
                dialect.insert_shared(Arc::clone(descriptor));
            }
        }

        let mut own_ids = std::collections::HashSet::new();
        let mut own_names = std::collections::HashSet::new();
        for definition in &document.messages {
            if !own_ids.insert(definition.id) {
                return Err(RegistryError::InvalidDescriptor {
                    message: definition.name.clone(),
                    reason: format!("duplicate message id {}", definition.id),
                });
            }
            if !own_names.insert(definition.name.to_ascii_lowercase()) {
                return Err(RegistryError::InvalidDescriptor {
                    message: definition.name.clone(),
                    reason: "duplicate message name".to_string(),
                });
            }
            let descriptor = definition.to_descriptor(config)?;
            if let Some(replaced) = dialect.insert(descriptor) {
                tracing::debug!(
                    dialect = %dialect.name,
                    id = replaced.id(),
                    name = replaced.name(),
                    "dialect overrides included message"
                );
            }
        }

        Ok(dialect)
    }
}

/// Serialized dialect definition.
///
/// ```json
/// {
///   "name": "common",
///   "include": ["minimal"],
///   "messages": [
///     { "id": 4, "name": "PING", "crc_extra": 237, "fields": [
///       { "name": "time_usec", "type": "uint64_t" },
///       { "name": "seq", "type": "uint32_t" }
///     ]}
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DialectDocument {
    pub name: String,
    #[serde(default)]
    pub legacy_only: bool,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub messages: Vec<MessageDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageDefinition {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub crc_extra: Option<u8>,
    pub fields: Vec<FieldDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub extension: bool,
}

impl MessageDefinition {
    /// Resolve types, derive wire order and settle `crc_extra`.
    pub fn to_descriptor(&self, config: &RegistryConfig) -> Result<MessageDescriptor> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for definition in &self.fields {
            let (ty, array_length) =
                parse_type_spec(&definition.ty).map_err(|err| RegistryError::InvalidDescriptor {
                    message: self.name.clone(),
                    reason: format!("field '{}': {err}", definition.name),
                })?;
            let mut field = FieldDescriptor::new(definition.name.clone(), ty, array_length);
            field.extension = definition.extension;
            fields.push(field);
        }

        let descriptor =
            MessageDescriptor::new(self.id, self.name.clone(), fields, self.crc_extra)?;
        if config.verify_crc_extra {
            let derived = compute_crc_extra(&descriptor);
            if derived != descriptor.crc_extra() {
                return Err(RegistryError::InvalidDescriptor {
                    message: self.name.clone(),
                    reason: format!(
                        "declared crc_extra {} does not match derived {derived}",
                        descriptor.crc_extra()
                    ),
                });
            }
        }
        Ok(descriptor)
    }
}
