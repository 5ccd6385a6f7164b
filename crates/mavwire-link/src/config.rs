use mavwire_frame::{ParserConfig, SecretKey, SigningConfig};

use crate::error::Result;

/// Configuration for a [`Link`](crate::Link).
#[derive(Debug, Clone, Default)]
pub struct LinkConfig {
    /// Source system id stamped on outgoing frames.
    pub system_id: u8,
    /// Source component id stamped on outgoing frames.
    pub component_id: u8,
    /// Send legacy frames even when the dialect allows extended ones.
    pub force_legacy: bool,
    pub parser: ParserConfig,
    /// Signing is disabled when `None`.
    pub signing: Option<SigningConfig>,
}

impl LinkConfig {
    pub fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            system_id,
            component_id,
            ..Self::default()
        }
    }

    /// Enable signing with a key given as 64 hex digits.
    pub fn with_secret_key_hex(mut self, hex: &str) -> Result<Self> {
        let key = SecretKey::from_hex(hex)?;
        let signing = self.signing.take().unwrap_or_default();
        self.signing = Some(SigningConfig {
            secret_key: Some(key),
            ..signing
        });
        Ok(self)
    }
}
