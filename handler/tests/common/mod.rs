// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Mock handlers shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use attestation_handler::{
    AttestationToken, Claims, Endorsement, EndorsementHandler, EndorsementHandlerResponse, Error,
    EvidenceHandler, HandlerParams, Pluggable, RequestContext, Result, SchemeHandlers,
    StoreError, StoreHandler,
};
use serde_json::{json, Value};

pub const SCHEME: &str = "mock";
pub const EVIDENCE_MEDIA_TYPE: &str = "application/vnd.mock-evidence";
pub const ENDORSEMENT_MEDIA_TYPE: &str = "application/vnd.mock-endorsements";

/// What a scripted handler operation returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    BadEvidence,
    SystemError,
}

impl Outcome {
    fn result(self, what: &str) -> Result<()> {
        match self {
            Outcome::Ok => Ok(()),
            Outcome::BadEvidence => Err(Error::bad_evidence(format!("{what} rejected"))),
            Outcome::SystemError => Err(Error::internal(anyhow::anyhow!("{what} unavailable"))),
        }
    }
}

pub fn claims() -> Claims {
    let Value::Object(claims) = json!({"key1": "value1", "key2": 42}) else {
        unreachable!()
    };
    claims
}

/// Evidence handler that records the order of its calls.
pub struct RecordingEvidenceHandler {
    pub calls: Arc<Mutex<Vec<&'static str>>>,
    pub integrity: Outcome,
    pub extraction: Outcome,
    pub claims: Claims,
}

impl RecordingEvidenceHandler {
    pub fn new(integrity: Outcome) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            integrity,
            extraction: Outcome::Ok,
            claims: claims(),
        }
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Pluggable for RecordingEvidenceHandler {
    fn name(&self) -> &str {
        "recording-evidence-handler"
    }

    fn attestation_scheme(&self) -> &str {
        SCHEME
    }

    fn supported_media_types(&self) -> Vec<String> {
        vec![EVIDENCE_MEDIA_TYPE.to_string()]
    }
}

#[async_trait]
impl EvidenceHandler for RecordingEvidenceHandler {
    fn init(&mut self, _params: &HandlerParams) -> anyhow::Result<()> {
        Ok(())
    }

    async fn extract_claims(
        &self,
        _token: &AttestationToken,
        _trust_anchors: &[Endorsement],
    ) -> Result<Claims> {
        self.record("extract_claims");
        self.extraction.result("extraction")?;
        Ok(self.claims.clone())
    }

    async fn validate_evidence_integrity(
        &self,
        _token: &AttestationToken,
        trust_anchors: &[Endorsement],
    ) -> Result<()> {
        self.record("validate_evidence_integrity");
        assert!(!trust_anchors.is_empty());
        self.integrity.result("integrity check")
    }
}

/// Endorsement handler returning a fixed response, or a bad-evidence error
/// when none is set.
pub struct StaticEndorsementHandler {
    pub response: Option<EndorsementHandlerResponse>,
}

impl Pluggable for StaticEndorsementHandler {
    fn name(&self) -> &str {
        "static-endorsement-handler"
    }

    fn attestation_scheme(&self) -> &str {
        SCHEME
    }

    fn supported_media_types(&self) -> Vec<String> {
        vec![ENDORSEMENT_MEDIA_TYPE.to_string()]
    }
}

impl EndorsementHandler for StaticEndorsementHandler {
    fn init(&mut self, _params: &HandlerParams) -> anyhow::Result<()> {
        Ok(())
    }

    fn decode(
        &self,
        _data: &[u8],
        _media_type: &str,
        _ca_cert_pool: &[u8],
    ) -> Result<EndorsementHandlerResponse> {
        self.response
            .clone()
            .ok_or_else(|| Error::bad_evidence("undecodable endorsements"))
    }
}

/// In-memory store whose availability can be switched off and which counts
/// writes. Operations on keys under a stalled prefix hang until their
/// context gives up.
#[derive(Default)]
pub struct ScriptedStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
    stalled_prefix: Mutex<Option<String>>,
    pub writes: AtomicUsize,
    pub unavailable: AtomicBool,
}

impl ScriptedStore {
    pub fn seed(&self, key: &str, value: Vec<u8>) {
        self.values.lock().unwrap().insert(key.to_string(), value);
    }

    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        self.values.lock().unwrap().get(key).cloned()
    }

    /// Stall every operation on a key starting with `prefix`.
    pub fn stall(&self, prefix: &str) {
        *self.stalled_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    async fn hang_if_stalled(&self, key: &str) {
        let stalled = self
            .stalled_prefix
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|prefix| key.starts_with(prefix));
        if stalled {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    }
}

#[async_trait]
impl StoreHandler for ScriptedStore {
    async fn store(
        &self,
        ctx: &RequestContext,
        key: &str,
        value: &[u8],
    ) -> std::result::Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::KeyRequired);
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::DeadlineExceeded);
        }
        ctx.run(async {
            self.hang_if_stalled(key).await;
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_vec());
        })
        .await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, ctx: &RequestContext, key: &str) -> std::result::Result<Vec<u8>, StoreError> {
        if key.is_empty() {
            return Err(StoreError::KeyRequired);
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::DeadlineExceeded);
        }
        ctx.run(async {
            self.hang_if_stalled(key).await;
            self.value(key)
        })
            .await?
            .ok_or_else(|| StoreError::KeyNotFound {
                key: key.to_string(),
            })
    }

    fn attestation_scheme(&self) -> &str {
        SCHEME
    }
}

pub fn trust_anchor() -> Endorsement {
    Endorsement::trust_anchor(SCHEME).with_attributes(json!({"key": "mock-key"}))
}

pub fn reference_value(digest: &str) -> Endorsement {
    Endorsement::reference_value(SCHEME)
        .with_sub_type("component")
        .with_attributes(json!({ "digest": digest }))
}

/// A mock scheme: its handlers plus direct access to the mocks.
pub struct MockScheme {
    pub handlers: SchemeHandlers,
    pub calls: Arc<Mutex<Vec<&'static str>>>,
    pub store: Arc<ScriptedStore>,
}

pub fn mock_scheme(
    evidence: RecordingEvidenceHandler,
    response: Option<EndorsementHandlerResponse>,
) -> MockScheme {
    let calls = evidence.calls.clone();
    let store = Arc::new(ScriptedStore::default());
    MockScheme {
        handlers: SchemeHandlers {
            evidence: Arc::new(evidence),
            endorsement: Arc::new(StaticEndorsementHandler { response }),
            store: store.clone(),
        },
        calls,
        store,
    }
}
