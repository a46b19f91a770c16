// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Secret Manager port. Keys are looked up per vendor family and are never
// persisted next to provider descriptors.

use crate::domain::provider::ProviderType;

pub trait SecretStore: Send + Sync {
    /// API key for a vendor family, `None` when absent
    fn get_secret_for_vendor(&self, vendor: ProviderType) -> Option<String>;
}

/// Secret manager first, then the vendor's environment variables in order.
/// Empty values count as absent.
pub fn resolve_api_key(secrets: &dyn SecretStore, vendor: ProviderType) -> Option<String> {
    secrets
        .get_secret_for_vendor(vendor)
        .filter(|key| !key.trim().is_empty())
        .or_else(|| {
            vendor
                .api_key_env_vars()
                .iter()
                .filter_map(|var| std::env::var(var).ok())
                .find(|key| !key.trim().is_empty())
        })
}
