/// Controls how dialect documents are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// When true, a declared `crc_extra` must match the value derived from
    /// the message definition.
    pub verify_crc_extra: bool,
    /// Maximum number of dialect documents loaded from a directory.
    pub max_dialects_from_directory: usize,
    /// Maximum bytes allowed per dialect document loaded from a directory.
    pub max_dialect_file_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            verify_crc_extra: false,
            max_dialects_from_directory: 64,
            max_dialect_file_size: 4 * 1024 * 1024,
        }
    }
}
