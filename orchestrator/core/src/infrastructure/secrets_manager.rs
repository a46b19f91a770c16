// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Secrets Manager
//!
//! In-process implementation of the `SecretStore` port. Keys are held in
//! memory only; the registry falls back to vendor environment variables for
//! anything not set here (see `domain::secrets::resolve_api_key`).
//!
//! An external vault can be plugged in by implementing `SecretStore`.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::domain::provider::ProviderType;
use crate::domain::secrets::SecretStore;

#[derive(Default)]
pub struct SecretsManager {
    keys: RwLock<HashMap<ProviderType, String>>,
}

impl SecretsManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(self, vendor: ProviderType, api_key: impl Into<String>) -> Self {
        self.set_secret(vendor, api_key);
        self
    }

    pub fn set_secret(&self, vendor: ProviderType, api_key: impl Into<String>) {
        self.keys.write().insert(vendor, api_key.into());
    }

    pub fn remove_secret(&self, vendor: ProviderType) -> bool {
        self.keys.write().remove(&vendor).is_some()
    }
}

impl SecretStore for SecretsManager {
    fn get_secret_for_vendor(&self, vendor: ProviderType) -> Option<String> {
        self.keys.read().get(&vendor).cloned()
    }
}

impl std::fmt::Debug for SecretsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Vendors only, never key material
        let vendors: Vec<ProviderType> = self.keys.read().keys().copied().collect();
        f.debug_struct("SecretsManager").field("vendors", &vendors).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::secrets::resolve_api_key;

    #[test]
    fn test_store_and_remove() {
        let secrets = SecretsManager::new().with_secret(ProviderType::Anthropic, "ant-key");
        assert_eq!(
            secrets.get_secret_for_vendor(ProviderType::Anthropic).as_deref(),
            Some("ant-key")
        );
        assert!(secrets.remove_secret(ProviderType::Anthropic));
        assert!(secrets.get_secret_for_vendor(ProviderType::Anthropic).is_none());
    }

    #[test]
    fn test_manager_wins_over_environment() {
        let secrets = SecretsManager::new().with_secret(ProviderType::OpenAI, "from-manager");
        assert_eq!(
            resolve_api_key(&secrets, ProviderType::OpenAI).as_deref(),
            Some("from-manager")
        );
        // Local models never need a key
        assert!(resolve_api_key(&secrets, ProviderType::Ollama).is_none());
    }

    #[test]
    fn test_debug_hides_keys() {
        let secrets = SecretsManager::new().with_secret(ProviderType::Google, "g-secret");
        assert!(!format!("{:?}", secrets).contains("g-secret"));
    }
}
