// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Endorsement model shared by every attestation scheme.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Semantic role of an [`Endorsement`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EndorsementType {
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified,

    /// An expected-good measurement.
    #[serde(rename = "reference value")]
    ReferenceValue,

    /// Key or certificate material used to check evidence signatures.
    #[serde(rename = "trust anchor")]
    VerificationKey,
}

impl EndorsementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndorsementType::Unspecified => "unspecified",
            EndorsementType::ReferenceValue => "reference value",
            EndorsementType::VerificationKey => "trust anchor",
        }
    }
}

impl fmt::Display for EndorsementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single unit of endorsement material.
///
/// `attributes` is owned by the scheme. It is never inspected here, only
/// carried through serialization unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Endorsement {
    #[serde(rename = "Scheme")]
    pub scheme: String,

    #[serde(rename = "Type")]
    pub r#type: EndorsementType,

    #[serde(rename = "SubType", default)]
    pub sub_type: String,

    #[serde(rename = "Attributes", default)]
    pub attributes: Option<Value>,
}

impl Endorsement {
    pub fn new(scheme: &str, r#type: EndorsementType) -> Self {
        Self {
            scheme: scheme.to_string(),
            r#type,
            sub_type: String::new(),
            attributes: None,
        }
    }

    pub fn reference_value(scheme: &str) -> Self {
        Self::new(scheme, EndorsementType::ReferenceValue)
    }

    pub fn trust_anchor(scheme: &str) -> Self {
        Self::new(scheme, EndorsementType::VerificationKey)
    }

    pub fn with_sub_type(mut self, sub_type: &str) -> Self {
        self.sub_type = sub_type.to_string();
        self
    }

    pub fn with_attributes(mut self, attributes: Value) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Deserialize the scheme-specific attributes.
    pub fn attributes_as<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        let attributes = self
            .attributes
            .clone()
            .context("endorsement carries no attributes")?;
        serde_json::from_value(attributes).context("unexpected endorsement attributes")
    }

    /// Check the fields that must be set before an endorsement is persisted
    /// or returned.
    pub fn check(&self) -> Result<(), String> {
        if self.scheme.is_empty() {
            return Err("endorsement scheme is empty".into());
        }
        if self.r#type == EndorsementType::Unspecified {
            return Err(format!(
                "endorsement type of `{}` endorsement is unspecified",
                self.scheme
            ));
        }
        Ok(())
    }
}

/// Result of decoding one endorsement document.
///
/// A decode that ran but found nothing has empty sequences and an empty
/// `signer_info`, which serialize as `[]` and `{}`, never `null`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct EndorsementHandlerResponse {
    #[serde(rename = "ReferenceValues", default)]
    pub reference_values: Vec<Endorsement>,

    #[serde(rename = "TrustAnchors", default)]
    pub trust_anchors: Vec<Endorsement>,

    #[serde(rename = "SignerInfo", default)]
    pub signer_info: BTreeMap<String, String>,
}

impl EndorsementHandlerResponse {
    pub fn is_empty(&self) -> bool {
        self.reference_values.is_empty() && self.trust_anchors.is_empty()
    }

    /// All endorsements in the response, reference values first.
    pub fn endorsements(&self) -> impl Iterator<Item = &Endorsement> {
        self.reference_values.iter().chain(self.trust_anchors.iter())
    }
}
