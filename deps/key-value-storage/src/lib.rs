// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Byte-oriented key-value backends.
//!
//! Attestation scheme stores keep endorsement and trust anchor material
//! here. Backends never interpret values: whatever bytes are set for a key
//! are returned unchanged by `get`.

use async_trait::async_trait;
use serde::Deserialize;
use strum::Display;

use std::sync::Arc;

pub mod error;
pub use error::{KeyValueStorageError, Result};

pub mod local_fs;
pub mod local_json;
pub mod memory;

#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// Set a value for a key, replacing any previous value.
    /// Returns the replaced value if there was one.
    async fn set(&self, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Get the value of a key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// List all keys starting with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete a key. Returns the deleted value if it existed.
    async fn delete(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Display)]
#[serde(tag = "type")]
pub enum KeyValueStorageConfig {
    #[serde(alias = "memory")]
    #[default]
    Memory,

    #[serde(alias = "local_fs")]
    LocalFs(local_fs::Config),

    #[serde(alias = "local_json")]
    LocalJson(local_json::Config),
}

impl KeyValueStorageConfig {
    pub fn to_key_value_storage(&self) -> Result<Arc<dyn KeyValueStorage>> {
        log::info!("Using `{self}` key-value storage backend");
        match self {
            KeyValueStorageConfig::Memory => Ok(Arc::new(memory::MemoryKeyValueStorage::default())),
            KeyValueStorageConfig::LocalFs(config) => {
                Ok(Arc::new(local_fs::LocalFs::new(config.clone())?))
            }
            KeyValueStorageConfig::LocalJson(config) => {
                Ok(Arc::new(local_json::LocalJson::new(config.clone())?))
            }
        }
    }
}

/// Check that the key is non-empty and only contains ASCII alphanumeric
/// characters or one of `-`, `_`, `.`, `/`, `:`, `@`.
pub(crate) fn check_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '@'));

    if !valid {
        return Err(KeyValueStorageError::InvalidKey {
            key: key.to_string(),
        });
    }

    Ok(())
}
