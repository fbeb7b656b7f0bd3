// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;
use std::collections::BTreeMap;

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{base64::Base64, serde_as};

use super::{KeyAttributes, ENDORSEMENTS_MEDIA_TYPE, SCHEME, SIGNED_ENDORSEMENTS_MEDIA_TYPE};
use crate::{
    bool_param, BadEvidenceError, Endorsement, EndorsementHandler, EndorsementHandlerResponse,
    Error, HandlerParams, Pluggable, Result,
};

/// Endorsement document wrapper. `signature` is ECDSA P-256 over the raw
/// `payload` bytes.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    #[serde_as(as = "Base64")]
    pub payload: Vec<u8>,

    #[serde_as(as = "Base64")]
    pub signature: Vec<u8>,
}

impl SignedEnvelope {
    pub fn sign(payload: Vec<u8>, key: &SigningKey) -> Self {
        let signature: Signature = key.sign(&payload);
        Self {
            payload,
            signature: signature.to_bytes().to_vec(),
        }
    }

    fn open(&self, key: &VerifyingKey) -> Result<&[u8]> {
        let signature = Signature::from_slice(&self.signature).map_err(|e| {
            Error::BadEvidence(BadEvidenceError::wrap(
                anyhow::Error::from(e).context("malformed endorsement signature"),
            ))
        })?;
        key.verify(&self.payload, &signature).map_err(|e| {
            Error::BadEvidence(BadEvidenceError::wrap(
                anyhow::Error::from(e).context("endorsement signature does not verify"),
            ))
        })?;
        Ok(&self.payload)
    }
}

#[derive(Deserialize, Debug)]
struct Document {
    scheme: String,

    #[serde(default)]
    signer: BTreeMap<String, String>,

    #[serde(rename = "reference-values", default)]
    reference_values: Vec<Entry>,

    #[serde(rename = "trust-anchors", default)]
    trust_anchors: Vec<Entry>,
}

#[derive(Deserialize, Debug)]
struct Entry {
    #[serde(default)]
    subtype: String,

    attributes: Value,
}

fn undecodable(err: impl Into<anyhow::Error>) -> Error {
    Error::BadEvidence(BadEvidenceError::wrap(
        err.into().context("malformed sample endorsements"),
    ))
}

#[derive(Debug, Default)]
pub struct SampleEndorsementHandler {
    require_signature: bool,
}

impl Pluggable for SampleEndorsementHandler {
    fn name(&self) -> &str {
        "sample-endorsement-handler"
    }

    fn attestation_scheme(&self) -> &str {
        SCHEME
    }

    fn supported_media_types(&self) -> Vec<String> {
        vec![
            ENDORSEMENTS_MEDIA_TYPE.to_string(),
            SIGNED_ENDORSEMENTS_MEDIA_TYPE.to_string(),
        ]
    }
}

impl EndorsementHandler for SampleEndorsementHandler {
    fn init(&mut self, params: &HandlerParams) -> anyhow::Result<()> {
        self.require_signature = bool_param(params, "require_signature", false)?;
        Ok(())
    }

    fn decode(
        &self,
        data: &[u8],
        media_type: &str,
        ca_cert_pool: &[u8],
    ) -> Result<EndorsementHandlerResponse> {
        let mut signer_info = BTreeMap::new();

        let payload: Cow<'_, [u8]> = match media_type {
            SIGNED_ENDORSEMENTS_MEDIA_TYPE => {
                let key = VerifyingKey::from_sec1_bytes(ca_cert_pool)
                    .context("CA pool does not hold a P-256 public key")
                    .map_err(Error::internal)?;
                let envelope: SignedEnvelope =
                    serde_json::from_slice(data).map_err(undecodable)?;
                signer_info.insert(
                    "verified-by".to_string(),
                    STANDARD.encode(KeyAttributes::new(&key).public_key),
                );
                Cow::Owned(envelope.open(&key)?.to_vec())
            }
            ENDORSEMENTS_MEDIA_TYPE if self.require_signature => {
                return Err(Error::bad_evidence(
                    "unsigned sample endorsements are not accepted",
                ));
            }
            ENDORSEMENTS_MEDIA_TYPE => Cow::Borrowed(data),
            other => {
                return Err(Error::UnsupportedMediaType {
                    media_type: other.to_string(),
                })
            }
        };

        let document: Document = serde_json::from_slice(&payload).map_err(undecodable)?;
        if document.scheme != SCHEME {
            return Err(Error::bad_evidence(format!(
                "endorsements are tagged with scheme `{}`, expected `{SCHEME}`",
                document.scheme
            )));
        }

        let reference_values = document
            .reference_values
            .into_iter()
            .map(|entry| {
                Endorsement::reference_value(SCHEME)
                    .with_sub_type(&entry.subtype)
                    .with_attributes(entry.attributes)
            })
            .collect();

        let trust_anchors = document
            .trust_anchors
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                let ta = Endorsement::trust_anchor(SCHEME)
                    .with_sub_type(&entry.subtype)
                    .with_attributes(entry.attributes);
                ta.attributes_as::<KeyAttributes>()
                    .and_then(|attributes| attributes.verifying_key())
                    .with_context(|| format!("trust anchor #{i}"))
                    .map_err(undecodable)?;
                Ok(ta)
            })
            .collect::<Result<Vec<_>>>()?;

        signer_info.extend(document.signer);

        Ok(EndorsementHandlerResponse {
            reference_values,
            trust_anchors,
            signer_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    use super::super::tests::signing_key;
    use super::*;
    use crate::ErrorClass;

    fn document() -> Value {
        let key = signing_key(1);
        let public_key = STANDARD.encode(KeyAttributes::new(key.verifying_key()).public_key);
        json!({
            "scheme": "sample",
            "signer": {"issuer": "acme"},
            "reference-values": [
                {"subtype": "firmware", "attributes": {"digest": "AAEC"}},
                {"subtype": "firmware", "attributes": {"digest": "AAEC"}},
                {"subtype": "kernel", "attributes": {"digest": "AwQF"}}
            ],
            "trust-anchors": [
                {"subtype": "verification-key", "attributes": {"public-key": public_key}}
            ]
        })
    }

    fn ca_pool(seed: u8) -> Vec<u8> {
        KeyAttributes::new(signing_key(seed).verifying_key()).public_key
    }

    #[test]
    fn plain_document() {
        let handler = SampleEndorsementHandler::default();
        let data = serde_json::to_vec(&document()).unwrap();

        let response = handler
            .decode(&data, ENDORSEMENTS_MEDIA_TYPE, &[])
            .unwrap();

        // duplicates are kept, order is preserved
        assert_eq!(response.reference_values.len(), 3);
        assert_eq!(response.reference_values[0], response.reference_values[1]);
        assert_eq!(response.reference_values[2].sub_type, "kernel");
        assert_eq!(response.trust_anchors.len(), 1);
        assert_json_eq!(
            serde_json::to_value(&response.signer_info).unwrap(),
            json!({"issuer": "acme"})
        );
        assert!(response.endorsements().all(|e| e.check().is_ok()));
    }

    #[test]
    fn empty_document() {
        let handler = SampleEndorsementHandler::default();
        let response = handler
            .decode(br#"{"scheme":"sample"}"#, ENDORSEMENTS_MEDIA_TYPE, &[])
            .unwrap();
        assert_eq!(response, EndorsementHandlerResponse::default());
    }

    #[test]
    fn signed_document() {
        let handler = SampleEndorsementHandler::default();
        let payload = serde_json::to_vec(&document()).unwrap();
        let envelope = SignedEnvelope::sign(payload, &signing_key(9));
        let data = serde_json::to_vec(&envelope).unwrap();

        let response = handler
            .decode(&data, SIGNED_ENDORSEMENTS_MEDIA_TYPE, &ca_pool(9))
            .unwrap();
        assert_eq!(response.reference_values.len(), 3);
        assert_eq!(
            response.signer_info.get("verified-by"),
            Some(&STANDARD.encode(ca_pool(9)))
        );

        let err = handler
            .decode(&data, SIGNED_ENDORSEMENTS_MEDIA_TYPE, &ca_pool(8))
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Evidence);

        let err = handler
            .decode(&data, SIGNED_ENDORSEMENTS_MEDIA_TYPE, b"not a key")
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::System);
    }

    #[test]
    fn signature_required() {
        let mut handler = SampleEndorsementHandler::default();
        handler
            .init(&HandlerParams::from([(
                "require_signature".to_string(),
                json!(true),
            )]))
            .unwrap();

        let data = serde_json::to_vec(&document()).unwrap();
        let err = handler
            .decode(&data, ENDORSEMENTS_MEDIA_TYPE, &[])
            .unwrap_err();
        assert!(err.is_bad_evidence());
    }

    #[test]
    fn rejects_bad_documents() {
        let handler = SampleEndorsementHandler::default();

        for data in [
            b"{".to_vec(),
            br#"{"scheme":"other"}"#.to_vec(),
            br#"{"scheme":"sample","reference-values":[{"subtype":"x"}]}"#.to_vec(),
            br#"{"scheme":"sample","trust-anchors":[{"attributes":{"public-key":"AAAA"}}]}"#
                .to_vec(),
        ] {
            let err = handler
                .decode(&data, ENDORSEMENTS_MEDIA_TYPE, &[])
                .unwrap_err();
            assert!(err.is_bad_evidence(), "{err}");
        }

        let err = handler
            .decode(b"{}", "application/json", &[])
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedMediaType { .. }));
    }
}
