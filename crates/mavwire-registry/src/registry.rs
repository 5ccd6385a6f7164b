use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::config::RegistryConfig;
use crate::descriptor::MessageDescriptor;
use crate::dialect::{Dialect, DialectDocument, MessageKey};
use crate::error::{RegistryError, Result};

/// Dialect documents compiled into the crate.
pub const BUILTIN_DIALECTS: &[&str] = &[
    include_str!("../dialects/minimal.dialect.json"),
    include_str!("../dialects/common.dialect.json"),
];

const DIALECT_FILE_SUFFIX: &str = ".dialect.json";

/// Dialect-keyed collection of message descriptors.
///
/// Built once and then shared read-only, typically behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Registry {
    dialects: HashMap<String, Arc<Dialect>>,
    config: RegistryConfig,
}

impl Registry {
    /// Create an empty registry with default config.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with explicit config.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            dialects: HashMap::new(),
            config,
        }
    }

    /// Registry holding the built-in `minimal` and `common` dialects.
    pub fn builtin() -> Result<Self> {
        Self::from_embedded(BUILTIN_DIALECTS)
    }

    /// Register a dialect from a JSON document. Included dialects must
    /// already be registered.
    pub fn register_json(&mut self, json: &str) -> Result<Arc<Dialect>> {
        let document: DialectDocument = serde_json::from_str(json)?;
        self.register_document(&document)
    }

    /// Register a parsed dialect document.
    pub fn register_document(&mut self, document: &DialectDocument) -> Result<Arc<Dialect>> {
        let includes = document
            .include
            .iter()
            .map(|name| self.dialect(name))
            .collect::<Result<Vec<_>>>()?;
        let include_refs: Vec<&Dialect> = includes.iter().map(Arc::as_ref).collect();

        let dialect = Dialect::from_document(document, &include_refs, &self.config)?;
        Ok(self.register_dialect(dialect))
    }

    /// Register an already built dialect, replacing one of the same name.
    pub fn register_dialect(&mut self, dialect: Dialect) -> Arc<Dialect> {
        let dialect = Arc::new(dialect);
        tracing::debug!(
            dialect = dialect.name(),
            messages = dialect.len(),
            "registered dialect"
        );
        self.dialects
            .insert(dialect.name().to_string(), Arc::clone(&dialect));
        dialect
    }

    /// Load dialects from a directory of `*.dialect.json` files.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, RegistryConfig::default())
    }

    /// Load dialects from a directory with explicit config.
    ///
    /// Symlinked dialect files are refused. Includes may refer to any file in
    /// the same directory regardless of listing order.
    pub fn from_directory_with_config(path: &Path, config: RegistryConfig) -> Result<Self> {
        let mut registry = Self::with_config(config);
        let mut documents = Vec::new();

        let entries = std::fs::read_dir(path)
            .map_err(|err| RegistryError::LoadFailed(format!("{}: {err}", path.display())))?;

        for entry in entries {
            let entry = entry.map_err(|err| RegistryError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if !file_name.to_ascii_lowercase().ends_with(DIALECT_FILE_SUFFIX) {
                continue;
            }

            let entry_path = entry.path();
            let path_metadata = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| RegistryError::LoadFailed(err.to_string()))?;
            let file_type = path_metadata.file_type();
            if file_type.is_symlink() {
                tracing::warn!(file = %file_name, "refusing dialect symlink");
                return Err(RegistryError::LoadFailed(format!(
                    "refusing to load dialect symlink: {file_name}"
                )));
            }
            if !file_type.is_file() {
                continue;
            }

            if documents.len() >= registry.config.max_dialects_from_directory {
                return Err(RegistryError::LoadFailed(format!(
                    "dialect count exceeds configured max ({})",
                    registry.config.max_dialects_from_directory
                )));
            }

            let file = std::fs::File::open(&entry_path).map_err(|err| {
                RegistryError::LoadFailed(format!(
                    "failed opening dialect {}: {err}",
                    entry_path.display()
                ))
            })?;
            let opened_metadata = file
                .metadata()
                .map_err(|err| RegistryError::LoadFailed(err.to_string()))?;

            #[cfg(unix)]
            {
                if !same_file_identity(&path_metadata, &opened_metadata) {
                    return Err(RegistryError::LoadFailed(format!(
                        "dialect file changed during load: {file_name}"
                    )));
                }
            }

            let max_bytes = registry.config.max_dialect_file_size;
            if opened_metadata.len() > max_bytes as u64 {
                tracing::warn!(
                    file = %file_name,
                    size = opened_metadata.len(),
                    "dialect file too large"
                );
                return Err(RegistryError::LoadFailed(format!(
                    "dialect file too large ({} bytes): {file_name}",
                    opened_metadata.len()
                )));
            }

            let read_limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
            let mut content = String::new();
            file.take(read_limit)
                .read_to_string(&mut content)
                .map_err(|err| {
                    RegistryError::LoadFailed(format!(
                        "failed reading dialect {}: {err}",
                        entry_path.display()
                    ))
                })?;
            if content.len() > max_bytes {
                return Err(RegistryError::LoadFailed(format!(
                    "dialect file too large while reading: {file_name}"
                )));
            }

            let document: DialectDocument = serde_json::from_str(&content)?;
            tracing::debug!(file = %file_name, dialect = %document.name, "read dialect file");
            documents.push(document);
        }

        registry.register_all(documents)?;
        Ok(registry)
    }

    /// Load from embedded JSON documents, resolving includes in any order.
    pub fn from_embedded(documents: &[&str]) -> Result<Self> {
        let mut registry = Self::new();
        let parsed = documents
            .iter()
            .map(|json| serde_json::from_str::<DialectDocument>(json))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        registry.register_all(parsed)?;
        Ok(registry)
    }

    fn register_all(&mut self, mut pending: Vec<DialectDocument>) -> Result<()> {
        while !pending.is_empty() {
            let before = pending.len();
            let mut waiting = Vec::new();
            for document in pending {
                let ready = document
                    .include
                    .iter()
                    .all(|name| self.contains(name));
                if ready {
                    self.register_document(&document)?;
                } else {
                    waiting.push(document);
                }
            }

            if waiting.len() == before {
                let names: Vec<&str> = waiting.iter().map(|d| d.name.as_str()).collect();
                return Err(RegistryError::LoadFailed(format!(
                    "unresolved or circular includes in dialects: {}",
                    names.join(", ")
                )));
            }
            pending = waiting;
        }
        Ok(())
    }

    /// Dialect by case-insensitive name.
    pub fn dialect(&self, name: &str) -> Result<Arc<Dialect>> {
        self.dialects
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| RegistryError::UnknownDialect(name.to_string()))
    }

    /// Descriptor for `(dialect, id or name)`.
    pub fn lookup<'a>(
        &self,
        dialect: &str,
        key: impl Into<MessageKey<'a>>,
    ) -> Result<Arc<MessageDescriptor>> {
        self.dialect(dialect)?.message(key)
    }

    pub fn contains(&self, dialect: &str) -> bool {
        self.dialects.contains_key(&dialect.to_ascii_lowercase())
    }

    /// Registered dialect names, sorted.
    pub fn dialects(&self) -> Vec<String> {
        let mut names: Vec<String> = self.dialects.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Get registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn same_file_identity(
    path_metadata: &std::fs::Metadata,
    opened_metadata: &std::fs::Metadata,
) -> bool {
    use std::os::unix::fs::MetadataExt;
    path_metadata.dev() == opened_metadata.dev() && path_metadata.ino() == opened_metadata.ino()
}
