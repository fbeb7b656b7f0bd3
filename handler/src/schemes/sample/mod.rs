// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The `sample` scheme: JSON evidence signed with ECDSA P-256.
//!
//! Evidence is a JSON object
//!
//! ```json
//! {"scheme": "sample", "svn": "1.0.0", "report_data": "<b64>",
//!  "claims": {...}, "signature": "<b64>"}
//! ```
//!
//! where `signature` covers the compact JSON encoding of the same object
//! with `signature` removed and keys in lexicographic order. Trust anchors
//! are verification-key endorsements whose attributes carry the SEC1
//! encoded public key under `public-key`.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use log::debug;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use serde_with::{base64::Base64, serde_as};

use crate::{
    bool_param, AttestationToken, BadEvidenceError, Claims, Endorsement, EndorsementType, Error,
    EvidenceHandler, HandlerParams, Pluggable, Result,
};

mod endorsement;
pub use endorsement::{SampleEndorsementHandler, SignedEnvelope};

pub const SCHEME: &str = "sample";

pub const EVIDENCE_MEDIA_TYPE: &str = "application/vnd.sample-evidence+json";

/// Plain endorsement document.
pub const ENDORSEMENTS_MEDIA_TYPE: &str = "application/vnd.sample-endorsements+json";

/// Endorsement document wrapped in a [`SignedEnvelope`].
pub const SIGNED_ENDORSEMENTS_MEDIA_TYPE: &str = "application/vnd.sample-endorsements.signed+json";

const SIGNATURE_FIELD: &str = "signature";
const SVN_CLAIM: &str = "svn";
const REPORT_DATA_CLAIM: &str = "report_data";

/// Attributes of a `sample` trust anchor.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KeyAttributes {
    #[serde(rename = "public-key")]
    #[serde_as(as = "Base64")]
    pub public_key: Vec<u8>,
}

impl KeyAttributes {
    pub fn new(key: &VerifyingKey) -> Self {
        Self {
            public_key: key.to_encoded_point(false).as_bytes().to_vec(),
        }
    }

    pub fn verifying_key(&self) -> anyhow::Result<VerifyingKey> {
        VerifyingKey::from_sec1_bytes(&self.public_key).context("invalid P-256 public key")
    }
}

/// Build a trust anchor endorsement for `key`.
pub fn trust_anchor(key: &VerifyingKey) -> Endorsement {
    let public_key = STANDARD.encode(KeyAttributes::new(key).public_key);
    Endorsement::trust_anchor(SCHEME)
        .with_sub_type("verification-key")
        .with_attributes(json!({ "public-key": public_key }))
}

/// Body of `sample` evidence.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SampleEvidence {
    pub scheme: String,

    /// Security version of the attested component.
    pub svn: String,

    #[serde_as(as = "Base64")]
    pub report_data: Vec<u8>,

    #[serde(default)]
    pub claims: Claims,
}

impl SampleEvidence {
    pub fn new(svn: &str, report_data: Vec<u8>, claims: Claims) -> Self {
        Self {
            scheme: SCHEME.to_string(),
            svn: svn.to_string(),
            report_data,
            claims,
        }
    }

    /// Serialize and sign, producing the evidence wire bytes.
    pub fn sign(&self, key: &SigningKey) -> anyhow::Result<Vec<u8>> {
        let Value::Object(mut object) = serde_json::to_value(self)? else {
            return Err(anyhow!("evidence must serialize to a JSON object"));
        };

        let signature: Signature = key.sign(&serde_json::to_vec(&object)?);
        object.insert(
            SIGNATURE_FIELD.to_string(),
            Value::String(STANDARD.encode(signature.to_bytes())),
        );
        Ok(serde_json::to_vec(&object)?)
    }
}

/// Evidence split into its body, the exact bytes that were signed and the
/// signature.
struct ParsedEvidence {
    evidence: SampleEvidence,
    signed: Vec<u8>,
    signature: Vec<u8>,
}

fn malformed(err: impl Into<anyhow::Error>) -> Error {
    Error::BadEvidence(BadEvidenceError::wrap(
        err.into().context("malformed sample evidence"),
    ))
}

fn parse_evidence(data: &[u8]) -> Result<ParsedEvidence> {
    let mut object: Map<String, Value> = serde_json::from_slice(data).map_err(malformed)?;

    let signature = match object.remove(SIGNATURE_FIELD) {
        Some(Value::String(signature)) => STANDARD.decode(signature).map_err(malformed)?,
        Some(_) => return Err(malformed(anyhow!("`signature` must be a base64 string"))),
        None => return Err(malformed(anyhow!("`signature` is missing"))),
    };
    let signed = serde_json::to_vec(&object).map_err(Error::internal)?;
    let evidence: SampleEvidence =
        serde_json::from_value(Value::Object(object)).map_err(malformed)?;

    if evidence.scheme != SCHEME {
        return Err(Error::bad_evidence(format!(
            "evidence is tagged with scheme `{}`, expected `{SCHEME}`",
            evidence.scheme
        )));
    }

    // Extraction adds these next to the evidence's own claims.
    if let Some(claim) = [SVN_CLAIM, REPORT_DATA_CLAIM]
        .into_iter()
        .find(|claim| evidence.claims.contains_key(*claim))
    {
        return Err(Error::bad_evidence(format!(
            "evidence claims must not set the reserved claim `{claim}`"
        )));
    }

    Ok(ParsedEvidence {
        evidence,
        signed,
        signature,
    })
}

/// Verification keys usable for this scheme. Missing or unreadable anchor
/// material is a system error.
fn verification_keys(trust_anchors: &[Endorsement]) -> Result<Vec<VerifyingKey>> {
    let keys = trust_anchors
        .iter()
        .filter(|ta| ta.scheme == SCHEME && ta.r#type == EndorsementType::VerificationKey)
        .map(|ta| {
            ta.attributes_as::<KeyAttributes>()?
                .verifying_key()
        })
        .collect::<anyhow::Result<Vec<_>>>()
        .context("unusable sample trust anchor")
        .map_err(Error::internal)?;

    if keys.is_empty() {
        return Err(Error::internal(anyhow!(
            "no sample verification key among {} trust anchors",
            trust_anchors.len()
        )));
    }
    Ok(keys)
}

#[derive(Debug, Default)]
pub struct SampleEvidenceHandler {
    require_nonce: bool,
}

impl Pluggable for SampleEvidenceHandler {
    fn name(&self) -> &str {
        "sample-evidence-handler"
    }

    fn attestation_scheme(&self) -> &str {
        SCHEME
    }

    fn supported_media_types(&self) -> Vec<String> {
        vec![EVIDENCE_MEDIA_TYPE.to_string()]
    }
}

#[async_trait]
impl EvidenceHandler for SampleEvidenceHandler {
    fn init(&mut self, params: &HandlerParams) -> anyhow::Result<()> {
        self.require_nonce = bool_param(params, "require_nonce", false)?;
        Ok(())
    }

    async fn extract_claims(
        &self,
        token: &AttestationToken,
        _trust_anchors: &[Endorsement],
    ) -> Result<Claims> {
        let SampleEvidence {
            svn,
            report_data,
            claims: mut extracted,
            ..
        } = parse_evidence(&token.data)?.evidence;

        extracted.insert(SVN_CLAIM.into(), Value::String(svn));
        extracted.insert(
            REPORT_DATA_CLAIM.into(),
            Value::String(STANDARD.encode(report_data)),
        );
        Ok(extracted)
    }

    async fn validate_evidence_integrity(
        &self,
        token: &AttestationToken,
        trust_anchors: &[Endorsement],
    ) -> Result<()> {
        let keys = verification_keys(trust_anchors)?;
        let parsed = parse_evidence(&token.data)?;

        match &token.nonce {
            Some(nonce) if *nonce != parsed.evidence.report_data => {
                return Err(Error::bad_evidence("report data does not match the nonce"));
            }
            None if self.require_nonce => {
                return Err(Error::bad_evidence("a nonce is required but none was supplied"));
            }
            _ => {}
        }

        let signature = Signature::from_slice(&parsed.signature).map_err(malformed)?;
        if !keys
            .iter()
            .any(|key| key.verify(&parsed.signed, &signature).is_ok())
        {
            return Err(Error::bad_evidence(
                "signature does not verify against any trust anchor",
            ));
        }

        debug!(
            "sample evidence of tenant `{}` verified against {} keys",
            token.tenant_id,
            keys.len()
        );
        Ok(())
    }
}
