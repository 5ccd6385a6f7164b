use crate::parser::ParserConfig;

/// Default size of one read from the underlying stream.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

/// Configuration for [`FrameReader`](crate::FrameReader).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Bytes requested from the stream per read call. Zero is treated as one.
    pub read_chunk_size: usize,
    pub parser: ParserConfig,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            parser: ParserConfig::default(),
        }
    }
}
