// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

/// Scheme-neutral projection of evidence content. Scheme handlers define
/// the key space.
pub type Claims = serde_json::Map<String, serde_json::Value>;

/// Evidence submitted for verification. Handlers only ever borrow it.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AttestationToken {
    /// Owning tenant, scopes every store lookup.
    pub tenant_id: String,

    /// Selects the scheme whose handlers process `data`.
    pub media_type: String,

    /// Raw evidence in the scheme's native wire format.
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,

    /// Freshness challenge the evidence is expected to be bound to.
    #[serde_as(as = "Option<Base64>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Vec<u8>>,
}

impl AttestationToken {
    pub fn new(tenant_id: &str, media_type: &str, data: Vec<u8>) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            media_type: media_type.to_string(),
            data,
            nonce: None,
        }
    }

    pub fn with_nonce(mut self, nonce: Vec<u8>) -> Self {
        self.nonce = Some(nonce);
        self
    }
}
