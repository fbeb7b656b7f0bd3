// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use key_value_storage::KeyValueStorage;
use log::debug;

use super::{StoreError, StoreHandler};
use crate::RequestContext;

/// [`StoreHandler`] over any key-value backend.
///
/// Keys are namespaced by scheme (`<scheme>/<key>`), so several schemes can
/// share one backend without seeing each other's material. The caller's key
/// is stored URL-safe base64 encoded, so any non-empty string is a valid
/// key whatever characters the backend accepts.
pub struct KvStoreHandler {
    scheme: String,
    storage: Arc<dyn KeyValueStorage>,
}

impl KvStoreHandler {
    pub fn new(scheme: &str, storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            scheme: scheme.to_string(),
            storage,
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}/{}", self.scheme, URL_SAFE_NO_PAD.encode(key))
    }
}

#[async_trait]
impl StoreHandler for KvStoreHandler {
    async fn store(&self, ctx: &RequestContext, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::KeyRequired);
        }

        let key = self.namespaced(key);
        if ctx.run(self.storage.set(&key, value)).await??.is_some() {
            debug!("replaced value of `{key}`");
        }
        Ok(())
    }

    async fn get(&self, ctx: &RequestContext, key: &str) -> Result<Vec<u8>, StoreError> {
        if key.is_empty() {
            return Err(StoreError::KeyRequired);
        }

        ctx.run(self.storage.get(&self.namespaced(key)))
            .await??
            .ok_or_else(|| StoreError::KeyNotFound {
                key: key.to_string(),
            })
    }

    fn attestation_scheme(&self) -> &str {
        &self.scheme
    }
}
