// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Provider Store - durable, non-secret provider configuration
//
// One JSON document: { "default_provider": ..., "providers": [...] }.
// A missing file reads as an empty document.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::provider::{ProviderDescriptor, ProvidersDocument};

#[derive(Debug, thiserror::Error)]
pub enum ProviderStoreError {
    #[error("Failed to access provider config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid provider config {path:?}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ProviderStore {
    path: PathBuf,
}

impl ProviderStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<ProvidersDocument, ProviderStoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "No provider config yet");
                return Ok(ProvidersDocument::default());
            }
            Err(source) => {
                return Err(ProviderStoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(ProvidersDocument::default());
        }
        serde_json::from_str(&content).map_err(|source| ProviderStoreError::Format {
            path: self.path.clone(),
            source,
        })
    }

    /// Write through a sibling temp file so readers never see a torn document
    pub fn save(&self, document: &ProvidersDocument) -> Result<(), ProviderStoreError> {
        let io_err = |source| ProviderStoreError::Io {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_string_pretty(document).map_err(|source| {
            ProviderStoreError::Format {
                path: self.path.clone(),
                source,
            }
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        debug!(path = ?self.path, providers = document.providers.len(), "Provider config saved");
        Ok(())
    }

    /// Insert or replace one descriptor by name
    pub fn upsert(
        &self,
        descriptor: ProviderDescriptor,
        make_default: bool,
    ) -> Result<(), ProviderStoreError> {
        let mut document = self.load()?;
        let name = descriptor.name.clone();
        match document.providers.iter_mut().find(|p| p.name == name) {
            Some(existing) => *existing = descriptor,
            None => document.providers.push(descriptor),
        }
        if make_default || document.default_provider.is_none() {
            document.default_provider = Some(name);
        }
        self.save(&document)
    }

    pub fn remove(&self, name: &str, new_default: Option<&str>) -> Result<(), ProviderStoreError> {
        let mut document = self.load()?;
        document.providers.retain(|p| p.name != name);
        document.default_provider = new_default.map(str::to_string);
        self.save(&document)
    }

    pub fn set_default(&self, name: Option<&str>) -> Result<(), ProviderStoreError> {
        let mut document = self.load()?;
        document.default_provider = name.map(str::to_string);
        self.save(&document)
    }
}
