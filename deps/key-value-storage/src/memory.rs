// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! In-memory backend. Content is lost when the process exits.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{check_key, KeyValueStorage, Result};
use std::collections::HashMap;
use tracing::instrument;

#[derive(Default)]
pub struct MemoryKeyValueStorage {
    items: RwLock<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl KeyValueStorage for MemoryKeyValueStorage {
    #[instrument(skip_all, name = "MemoryKeyValueStorage::set", fields(key = key))]
    async fn set(&self, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        let previous = self
            .items
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(previous)
    }

    #[instrument(skip_all, name = "MemoryKeyValueStorage::get", fields(key = key))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        Ok(self.items.read().await.get(key).cloned())
    }

    #[instrument(skip_all, name = "MemoryKeyValueStorage::list")]
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .items
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    #[instrument(skip_all, name = "MemoryKeyValueStorage::delete", fields(key = key))]
    async fn delete(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        Ok(self.items.write().await.remove(key))
    }
}
