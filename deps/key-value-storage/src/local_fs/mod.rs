// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Local file system backend, an embedded sled database under `dir_path`.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

use crate::{check_key, KeyValueStorage, KeyValueStorageError, Result};

/// Default directory of the sled database.
const DEFAULT_DIR_PATH: &str = "/opt/confidential-containers/attestation-handler/storage";

fn default_dir_path() -> String {
    DEFAULT_DIR_PATH.to_string()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_dir_path")]
    pub dir_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir_path: default_dir_path(),
        }
    }
}

pub struct LocalFs {
    engine: sled::Db,
}

impl LocalFs {
    pub fn new(config: Config) -> Result<Self> {
        let engine = sled::open(&config.dir_path)
            .with_context(|| format!("open sled database at {}", config.dir_path))
            .map_err(|source| KeyValueStorageError::InitializeBackendFailed { source })?;
        Ok(Self { engine })
    }
}

#[async_trait]
impl KeyValueStorage for LocalFs {
    #[instrument(skip_all, name = "LocalFs::set", fields(key = key))]
    async fn set(&self, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        let previous = self
            .engine
            .insert(key, value)
            .context("insert into sled")
            .map_err(|source| KeyValueStorageError::SetKeyFailed {
                source,
                key: key.to_string(),
            })?;

        self.engine
            .flush_async()
            .await
            .context("flush sled")
            .map_err(|source| KeyValueStorageError::SetKeyFailed {
                source,
                key: key.to_string(),
            })?;

        Ok(previous.map(|v| v.to_vec()))
    }

    #[instrument(skip_all, name = "LocalFs::get", fields(key = key))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        let value = self
            .engine
            .get(key)
            .context("read from sled")
            .map_err(|source| KeyValueStorageError::GetKeyFailed {
                source,
                key: key.to_string(),
            })?;
        Ok(value.map(|v| v.to_vec()))
    }

    #[instrument(skip_all, name = "LocalFs::list")]
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for item in self.engine.scan_prefix(prefix) {
            let (key, _) = item
                .context("scan sled")
                .map_err(|source| KeyValueStorageError::ListKeysFailed { source })?;
            let key = String::from_utf8(key.to_vec())
                .context("sled key is not UTF-8")
                .map_err(|source| KeyValueStorageError::MalformedValue { source })?;
            keys.push(key);
        }
        Ok(keys)
    }

    #[instrument(skip_all, name = "LocalFs::delete", fields(key = key))]
    async fn delete(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        let removed = self
            .engine
            .remove(key)
            .context("remove from sled")
            .map_err(|source| KeyValueStorageError::DeleteKeyFailed {
                source,
                key: key.to_string(),
            })?;
        Ok(removed.map(|v| v.to_vec()))
    }
}
