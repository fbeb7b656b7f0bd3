// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Capability contracts every attestation scheme implements.
//!
//! A scheme provides one [`EvidenceHandler`], one [`EndorsementHandler`] and
//! one [`StoreHandler`](crate::StoreHandler). Handlers are initialized with
//! `&mut self` before they are registered, and are only ever shared
//! immutably afterwards, so `extract_claims`, `validate_evidence_integrity`
//! and `decode` may run concurrently for different inputs.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::{AttestationToken, Claims, Endorsement, EndorsementHandlerResponse};

/// Options handed to a handler's `init`. Handlers pick the keys they
/// recognize and reject values of the wrong shape.
pub type HandlerParams = HashMap<String, Value>;

/// Read an optional boolean option, falling back to `default` when unset.
pub fn bool_param(params: &HandlerParams, key: &str, default: bool) -> Result<bool> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(value)) => Ok(*value),
        Some(other) => bail!("option `{key}` must be a boolean, got `{other}`"),
    }
}

/// Identity shared by all handler kinds.
pub trait Pluggable: Send + Sync {
    /// Name of the implementation, used in logs and registry errors.
    fn name(&self) -> &str;

    /// The attestation scheme this handler serves.
    fn attestation_scheme(&self) -> &str;

    /// Media types this handler accepts.
    fn supported_media_types(&self) -> Vec<String>;
}

#[async_trait]
pub trait EvidenceHandler: Pluggable {
    /// One-time setup. Fails when a recognized option is missing or
    /// malformed.
    fn init(&mut self, params: &HandlerParams) -> Result<()>;

    /// Release what `init` acquired. Must tolerate a failed or partial
    /// `init`.
    fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Parse `token.data` into claims. Structurally invalid evidence yields
    /// a bad-evidence error. Does not verify signatures.
    async fn extract_claims(
        &self,
        token: &AttestationToken,
        trust_anchors: &[Endorsement],
    ) -> crate::Result<Claims>;

    /// Verify the evidence against the resolved trust anchors. Evidence that
    /// fails the check yields a bad-evidence error; missing or unusable
    /// anchor material yields a system error.
    async fn validate_evidence_integrity(
        &self,
        token: &AttestationToken,
        trust_anchors: &[Endorsement],
    ) -> crate::Result<()>;
}

pub trait EndorsementHandler: Pluggable {
    fn init(&mut self, params: &HandlerParams) -> Result<()>;

    fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Decode one endorsement document of `media_type`. `ca_cert_pool` holds
    /// the material signed documents are checked against; it may be empty
    /// for unsigned formats.
    ///
    /// Every input entry yields one output entry. A document that decodes
    /// but holds nothing returns an empty response.
    fn decode(
        &self,
        data: &[u8],
        media_type: &str,
        ca_cert_pool: &[u8],
    ) -> crate::Result<EndorsementHandlerResponse>;
}
