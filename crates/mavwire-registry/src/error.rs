/// Errors raised while loading dialects or resolving message descriptors.
///
/// These are lookup and construction failures. They never describe a
/// malformed frame; wire-level problems live in `mavwire-frame`.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No dialect with this name has been registered.
    #[error("unknown dialect '{0}'")]
    UnknownDialect(String),

    /// The dialect has no message with this id or name.
    #[error("dialect '{dialect}' has no message '{message}'")]
    UnknownMessage { dialect: String, message: String },

    /// The message has no field with this name.
    #[error("message {message} has no field '{field}'")]
    UnknownField { message: String, field: String },

    /// A dialect document could not be loaded.
    #[error("failed to load dialect: {0}")]
    LoadFailed(String),

    /// A message definition is inconsistent.
    #[error("invalid descriptor for {message}: {reason}")]
    InvalidDescriptor { message: String, reason: String },

    /// A field value does not fit the field's wire type.
    #[error("value for field '{field}' does not fit {expected}")]
    ValueMismatch { field: String, expected: String },

    /// A payload is shorter than the descriptor's encoded length.
    #[error("payload for {message} is {actual} bytes, need {expected}")]
    PayloadTooShort {
        message: String,
        expected: usize,
        actual: usize,
    },

    /// The dialect document is not valid JSON.
    #[error("dialect document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
