//! Embedding-model registry.
//!
//! Stored vectors are only comparable to query vectors produced by the same
//! embedding model version, so the version a request runs against must be
//! explicit. The registry tracks every known client version under the model
//! id the client itself reports and resolves `model` or `model@version`
//! references; an unpinned reference gets the newest registered version.

use crate::embedding::EmbeddingClient;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no embedding model registered under id: {0}")]
    UnknownModel(String),
    #[error("embedding model {model_id} has no version {version}")]
    UnknownVersion { model_id: String, version: String },
    #[error("embedding model {model_id} version {version} is already registered")]
    DuplicateVersion { model_id: String, version: String },
}

/// Parsed `model` or `model@version` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub model_id: String,
    pub version: Option<String>,
}

impl ModelRef {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some(at) = trimmed.find('@') {
            let model_id = &trimmed[..at];
            let version = &trimmed[at + 1..];
            if !model_id.is_empty() && !version.is_empty() {
                return Self {
                    model_id: model_id.to_string(),
                    version: Some(version.to_string()),
                };
            }
        }

        Self {
            model_id: trimmed.to_string(),
            version: None,
        }
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.model_id, version),
            None => write!(f, "{}", self.model_id),
        }
    }
}

struct VersionEntry {
    version: String,
    client: Arc<dyn EmbeddingClient>,
}

/// Versioned embedding clients, keyed by the id each client reports.
#[derive(Default)]
pub struct EmbedderRegistry {
    models: HashMap<String, Vec<VersionEntry>>,
}

impl EmbedderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client version. The model id comes from the client
    /// itself; a version may only be registered once per model, and the
    /// newest registration serves unpinned lookups.
    pub fn register(
        &mut self,
        version: impl Into<String>,
        client: Arc<dyn EmbeddingClient>,
    ) -> Result<(), RegistryError> {
        let version = version.into();
        let model_id = client.model_id().to_string();

        let entries = self.models.entry(model_id.clone()).or_default();
        if entries.iter().any(|entry| entry.version == version) {
            return Err(RegistryError::DuplicateVersion { model_id, version });
        }

        tracing::debug!(model = %model_id, version = %version, "embedding model registered");
        entries.push(VersionEntry { version, client });
        Ok(())
    }

    /// Resolve a `model` or `model@version` reference to a client.
    pub fn resolve(&self, reference: &str) -> Result<Arc<dyn EmbeddingClient>, RegistryError> {
        let reference = ModelRef::parse(reference);

        let entries = self
            .models
            .get(&reference.model_id)
            .ok_or_else(|| RegistryError::UnknownModel(reference.model_id.clone()))?;

        let entry = match &reference.version {
            Some(version) => entries
                .iter()
                .find(|entry| entry.version == *version)
                .ok_or_else(|| RegistryError::UnknownVersion {
                    model_id: reference.model_id.clone(),
                    version: version.clone(),
                })?,
            None => entries
                .last()
                .ok_or_else(|| RegistryError::UnknownModel(reference.model_id.clone()))?,
        };

        Ok(entry.client.clone())
    }

    /// The version an unpinned reference to `model_id` would resolve to.
    pub fn current_version(&self, model_id: &str) -> Option<&str> {
        self.models
            .get(model_id)
            .and_then(|entries| entries.last())
            .map(|entry| entry.version.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DeterministicEmbedder;

    fn client(model_id: &str) -> Arc<dyn EmbeddingClient> {
        Arc::new(DeterministicEmbedder::new(model_id, 8))
    }

    #[test]
    fn parse_handles_pins_bare_ids_and_dangling_separators() {
        let pinned = ModelRef::parse("embed-small@2.1.0");
        assert_eq!(pinned.model_id, "embed-small");
        assert_eq!(pinned.version.as_deref(), Some("2.1.0"));
        assert_eq!(pinned.to_string(), "embed-small@2.1.0");

        let bare = ModelRef::parse("  embed-small ");
        assert_eq!(bare.model_id, "embed-small");
        assert!(bare.version.is_none());

        // A dangling separator is not a version pin.
        let dangling = ModelRef::parse("embed-small@");
        assert!(dangling.version.is_none());
    }

    #[test]
    fn duplicate_version_is_rejected() {
        let mut registry = EmbedderRegistry::new();
        registry.register("1.0.0", client("embed-small")).unwrap();

        let err = registry
            .register("1.0.0", client("embed-small"))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateVersion {
                model_id: "embed-small".to_string(),
                version: "1.0.0".to_string(),
            }
        );
    }

    #[test]
    fn unpinned_reference_resolves_newest_version() {
        let mut registry = EmbedderRegistry::new();
        registry.register("1.0.0", client("embed-small")).unwrap();
        registry.register("1.1.0", client("embed-small")).unwrap();

        assert_eq!(registry.current_version("embed-small"), Some("1.1.0"));
        assert_eq!(
            registry.resolve("embed-small").unwrap().model_id(),
            "embed-small"
        );
    }

    #[test]
    fn pinned_reference_resolves_exact_version_or_errors() {
        let mut registry = EmbedderRegistry::new();
        registry.register("1.0.0", client("embed-small")).unwrap();

        assert!(registry.resolve("embed-small@1.0.0").is_ok());
        assert!(matches!(
            registry.resolve("embed-small@9.9.9"),
            Err(RegistryError::UnknownVersion { .. })
        ));
        assert!(matches!(
            registry.resolve("embed-large"),
            Err(RegistryError::UnknownModel(_))
        ));
    }
}
