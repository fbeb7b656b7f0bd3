// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Local file of JSON format for the key-value storage.
//!
//! All key-value pairs are stored in a single JSON object, values encoded
//! as base64 strings.

use std::{collections::BTreeMap, fs, path::PathBuf};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::{check_key, KeyValueStorage, KeyValueStorageError, Result};

/// Default file path for the local JSON file.
const FILE_PATH: &str = "/opt/confidential-containers/attestation-handler/key_value.json";

#[serde_as]
#[derive(Serialize, Deserialize, Default)]
struct Items(#[serde_as(as = "BTreeMap<_, Base64>")] BTreeMap<String, Vec<u8>>);

pub struct LocalJson {
    file_path: PathBuf,
    lock: RwLock<()>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub file_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file_path: FILE_PATH.to_string(),
        }
    }
}

impl LocalJson {
    pub fn new(config: Config) -> Result<Self> {
        let path = PathBuf::from(&config.file_path);

        let parent_dir =
            path.parent()
                .ok_or_else(|| KeyValueStorageError::InitializeBackendFailed {
                    source: anyhow!(
                        "Illegal `file_path` for LocalJson's config without a parent dir."
                    ),
                })?;
        debug!(path =? parent_dir, "create file path for LocalJson backend");
        fs::create_dir_all(parent_dir)
            .map_err(|e| KeyValueStorageError::InitializeBackendFailed { source: e.into() })?;

        if !path.exists() {
            debug!(path =? path, "creating empty file for LocalJson backend");
            fs::write(&path, "{}")
                .map_err(|e| KeyValueStorageError::InitializeBackendFailed { source: e.into() })?;
        }

        Ok(Self {
            file_path: path,
            lock: RwLock::new(()),
        })
    }

    async fn load(&self) -> Result<Items> {
        let file = tokio::fs::read(&self.file_path)
            .await
            .context("read LocalJson file")
            .map_err(|source| KeyValueStorageError::MalformedValue { source })?;
        serde_json::from_slice(&file)
            .context("deserialize LocalJson file")
            .map_err(|source| KeyValueStorageError::MalformedValue { source })
    }

    async fn save(&self, items: &Items) -> anyhow::Result<()> {
        let contents = serde_json::to_vec(items)?;
        tokio::fs::write(&self.file_path, contents).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStorage for LocalJson {
    #[instrument(skip_all, name = "LocalJson::set", fields(key = key))]
    async fn set(&self, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        let _guard = self.lock.write().await;
        let mut items = self.load().await?;
        let previous = items.0.insert(key.to_string(), value.to_vec());
        self.save(&items)
            .await
            .map_err(|source| KeyValueStorageError::SetKeyFailed {
                source,
                key: key.to_string(),
            })?;
        Ok(previous)
    }

    #[instrument(skip_all, name = "LocalJson::get", fields(key = key))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        let _guard = self.lock.read().await;
        let mut items = self.load().await?;
        Ok(items.0.remove(key))
    }

    #[instrument(skip_all, name = "LocalJson::list")]
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let _guard = self.lock.read().await;
        let items = self.load().await?;
        Ok(items
            .0
            .into_keys()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    #[instrument(skip_all, name = "LocalJson::delete", fields(key = key))]
    async fn delete(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        let _guard = self.lock.write().await;
        let mut items = self.load().await?;
        let removed = items.0.remove(key);
        if removed.is_some() {
            self.save(&items)
                .await
                .map_err(|source| KeyValueStorageError::DeleteKeyFailed {
                    source,
                    key: key.to_string(),
                })?;
        }
        Ok(removed)
    }
}
