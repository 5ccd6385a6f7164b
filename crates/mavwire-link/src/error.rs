/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Frame-level I/O error.
    #[error("frame error: {0}")]
    Frame(#[from] mavwire_frame::FrameError),

    #[error("pack error: {0}")]
    Pack(#[from] mavwire_frame::PackError),

    #[error("decode error: {0}")]
    Decode(#[from] mavwire_frame::DecodeError),

    #[error("registry error: {0}")]
    Registry(#[from] mavwire_registry::RegistryError),

    /// The message was not built from a descriptor of the link's dialect.
    #[error("message {name} (id {id}) is not part of dialect {dialect}")]
    NotInDialect {
        id: u32,
        name: String,
        dialect: String,
    },

    #[error("invalid secret key: {0}")]
    InvalidSecretKey(#[from] mavwire_frame::KeyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
