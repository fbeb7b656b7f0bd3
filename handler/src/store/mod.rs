// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Store handlers persist endorsement and trust anchor material for one
//! attestation scheme.

use async_trait::async_trait;
use key_value_storage::KeyValueStorageError;
use thiserror::Error;

use crate::{AttestationToken, RequestContext};

pub mod kv;
pub use kv::KvStoreHandler;

const TRUST_ANCHOR_PREFIX: &str = "trust-anchor";
const REFERENCE_VALUE_PREFIX: &str = "reference-value";

#[derive(Error, Debug)]
pub enum StoreError {
    /// The caller passed an empty key.
    #[error("key required")]
    KeyRequired,

    /// Nothing was provisioned under the key.
    #[error("key not found: `{key}`")]
    KeyNotFound { key: String },

    #[error("store operation cancelled")]
    Cancelled,

    #[error("store operation deadline exceeded")]
    DeadlineExceeded,

    #[error("storage backend failed: {source}")]
    Backend {
        #[from]
        source: KeyValueStorageError,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::KeyNotFound { .. })
    }

    /// Whether the operation was abandoned because its context was
    /// cancelled or timed out.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StoreError::Cancelled | StoreError::DeadlineExceeded)
    }
}

/// Key under which a tenant's trust anchors are kept.
pub fn trust_anchor_key(tenant_id: &str) -> String {
    format!("{TRUST_ANCHOR_PREFIX}/{tenant_id}")
}

/// Key under which a tenant's reference values are kept.
pub fn reference_value_key(tenant_id: &str) -> String {
    format!("{REFERENCE_VALUE_PREFIX}/{tenant_id}")
}

#[async_trait]
pub trait StoreHandler: Send + Sync {
    /// Persist `value` under `key`. A later `get` of the same key returns
    /// the most recently stored value.
    async fn store(&self, ctx: &RequestContext, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Return exactly the bytes last stored under `key`.
    async fn get(&self, ctx: &RequestContext, key: &str) -> Result<Vec<u8>, StoreError>;

    /// The scheme served by this handler. Constant for its lifetime.
    fn attestation_scheme(&self) -> &str;

    /// Keys of the trust anchors that may apply to `token`.
    fn trust_anchor_ids(&self, token: &AttestationToken) -> Vec<String> {
        vec![trust_anchor_key(&token.tenant_id)]
    }
}
