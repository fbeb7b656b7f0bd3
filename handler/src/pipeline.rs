// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Scheme-agnostic verification and endorsement ingestion.
//!
//! Verification of one token walks
//! `Received -> SchemeResolved -> TrustAnchorsFetched -> IntegrityValidated
//! -> ClaimsExtracted -> Done`, stopping at the first failure. Claims are
//! only extracted from evidence whose integrity was validated.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{debug, info, warn};
use strum::Display;
use tokio::sync::Mutex;

use crate::store::{reference_value_key, trust_anchor_key, StoreError};
use crate::{
    AttestationToken, Claims, Endorsement, EndorsementHandlerResponse, EndorsementType, Error,
    ErrorClass, RequestContext, Result, SchemeHandlers, SchemeRegistry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Received,
    SchemeResolved,
    TrustAnchorsFetched,
    IntegrityValidated,
    ClaimsExtracted,
    Done,
    Failed,
}

fn advance(stage: &mut Stage, next: Stage, token: &AttestationToken) {
    debug!(
        "evidence of tenant `{}` ({}): {stage} -> {next}",
        token.tenant_id, token.media_type
    );
    *stage = next;
}

fn log_failure(operation: &str, err: &Error) {
    match err.class() {
        ErrorClass::Evidence => info!("{operation} rejected: {err}"),
        ErrorClass::System => warn!("{operation} failed: {err:#}"),
    }
}

fn decode_list(key: &str, value: &[u8]) -> Result<Vec<Endorsement>> {
    serde_json::from_slice(value)
        .with_context(|| format!("endorsements stored under `{key}` are corrupt"))
        .map_err(Error::internal)
}

pub struct Pipeline {
    registry: Arc<SchemeRegistry>,
    store_timeout: Option<Duration>,

    /// Serializes the read-modify-write of endorsement lists.
    ingest_lock: Mutex<()>,
}

impl Pipeline {
    pub fn new(registry: Arc<SchemeRegistry>) -> Self {
        Self {
            registry,
            store_timeout: None,
            ingest_lock: Mutex::new(()),
        }
    }

    /// Bound every store operation issued by this pipeline.
    pub fn with_store_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &SchemeRegistry {
        &self.registry
    }

    fn store_context(&self, ctx: &RequestContext) -> RequestContext {
        match self.store_timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx.clone(),
        }
    }

    /// Verify `token` and return the claims extracted from it.
    ///
    /// Evidence-caused failures come back as [`Error::BadEvidence`]; every
    /// other error is a system failure.
    pub async fn verify(&self, ctx: &RequestContext, token: &AttestationToken) -> Result<Claims> {
        let mut stage = Stage::Received;
        let res = self.verify_stages(ctx, token, &mut stage).await;

        match &res {
            Ok(_) => advance(&mut stage, Stage::Done, token),
            Err(e) => {
                log_failure(&format!("verification after `{stage}`"), e);
                advance(&mut stage, Stage::Failed, token);
            }
        }
        res
    }

    async fn verify_stages(
        &self,
        ctx: &RequestContext,
        token: &AttestationToken,
        stage: &mut Stage,
    ) -> Result<Claims> {
        let handlers = self.registry.for_evidence(&token.media_type)?;
        advance(stage, Stage::SchemeResolved, token);

        let trust_anchors = self.fetch_trust_anchors(ctx, handlers, token).await?;
        advance(stage, Stage::TrustAnchorsFetched, token);

        handlers
            .evidence
            .validate_evidence_integrity(token, &trust_anchors)
            .await?;
        advance(stage, Stage::IntegrityValidated, token);

        let claims = handlers
            .evidence
            .extract_claims(token, &trust_anchors)
            .await?;
        advance(stage, Stage::ClaimsExtracted, token);

        Ok(claims)
    }

    async fn fetch_trust_anchors(
        &self,
        ctx: &RequestContext,
        handlers: &SchemeHandlers,
        token: &AttestationToken,
    ) -> Result<Vec<Endorsement>> {
        let ctx = self.store_context(ctx);
        let keys = handlers.store.trust_anchor_ids(token);

        let mut trust_anchors = Vec::new();
        for key in &keys {
            match handlers.store.get(&ctx, key).await {
                Ok(value) => trust_anchors.extend(decode_list(key, &value)?),
                Err(StoreError::KeyNotFound { .. }) => {
                    debug!("no trust anchors under `{key}`");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if trust_anchors.is_empty() {
            return Err(Error::TrustAnchorsNotProvisioned {
                scheme: handlers.scheme().to_string(),
                key: keys.join(", "),
            });
        }
        Ok(trust_anchors)
    }

    /// Decode an endorsement document and append its entries to the
    /// tenant's stored reference values and trust anchors.
    ///
    /// Every entry is checked before anything is written, so a document
    /// that fails to decode or holds an invalid entry leaves the store
    /// untouched.
    ///
    /// Reference values and trust anchors live under separate keys and are
    /// written one after the other, reference values first. The two writes
    /// are not atomic: if the trust anchor write fails (a backend error,
    /// cancellation or the store timeout), the reference values stay
    /// appended and the error is returned. Retrying the same document then
    /// appends its reference values a second time.
    pub async fn ingest_endorsements(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        data: &[u8],
        media_type: &str,
        ca_cert_pool: &[u8],
    ) -> Result<EndorsementHandlerResponse> {
        let res = self
            .ingest_inner(ctx, tenant_id, data, media_type, ca_cert_pool)
            .await;
        if let Err(e) = &res {
            log_failure("endorsement ingestion", e);
        }
        res
    }

    async fn ingest_inner(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        data: &[u8],
        media_type: &str,
        ca_cert_pool: &[u8],
    ) -> Result<EndorsementHandlerResponse> {
        let handlers = self.registry.for_endorsement(media_type)?;
        let scheme = handlers.scheme();
        let response = handlers.endorsement.decode(data, media_type, ca_cert_pool)?;

        let mut reference_values = Vec::new();
        let mut trust_anchors = Vec::new();
        for endorsement in response.endorsements() {
            let invalid = |reason: String| Error::InvalidEndorsement {
                scheme: scheme.to_string(),
                reason,
            };
            endorsement.check().map_err(invalid)?;
            if endorsement.scheme != scheme {
                return Err(invalid(format!(
                    "endorsement is tagged with scheme `{}`",
                    endorsement.scheme
                )));
            }

            match endorsement.r#type {
                EndorsementType::ReferenceValue => reference_values.push(endorsement.clone()),
                EndorsementType::VerificationKey => trust_anchors.push(endorsement.clone()),
                EndorsementType::Unspecified => {}
            }
        }

        let ctx = self.store_context(ctx);
        let _guard = self.ingest_lock.lock().await;
        for (key, entries) in [
            (reference_value_key(tenant_id), reference_values),
            (trust_anchor_key(tenant_id), trust_anchors),
        ] {
            if entries.is_empty() {
                continue;
            }
            let count = entries.len();
            let mut stored = self.load(&ctx, handlers, &key).await?;
            stored.extend(entries);

            let value = serde_json::to_vec(&stored)
                .context("serialize endorsements")
                .map_err(Error::internal)?;
            handlers.store.store(&ctx, &key, &value).await?;
            info!("{count} endorsements appended to `{scheme}/{key}`");
        }

        Ok(response)
    }

    async fn load(
        &self,
        ctx: &RequestContext,
        handlers: &SchemeHandlers,
        key: &str,
    ) -> Result<Vec<Endorsement>> {
        match handlers.store.get(ctx, key).await {
            Ok(value) => decode_list(key, &value),
            Err(StoreError::KeyNotFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reference values stored for `tenant_id` under `scheme`. Empty when
    /// none were ingested.
    pub async fn reference_values(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        scheme: &str,
    ) -> Result<Vec<Endorsement>> {
        let handlers = self.registry.get(scheme)?;
        self.load(&self.store_context(ctx), handlers, &reference_value_key(tenant_id))
            .await
    }

    /// Trust anchors stored for `tenant_id` under `scheme`. Empty when none
    /// were ingested.
    pub async fn trust_anchors(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        scheme: &str,
    ) -> Result<Vec<Endorsement>> {
        let handlers = self.registry.get(scheme)?;
        self.load(&self.store_context(ctx), handlers, &trust_anchor_key(tenant_id))
            .await
    }
}
