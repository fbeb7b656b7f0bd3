// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Error classification shared by every handler.
//!
//! Failures are split into two classes. Evidence-caused failures are
//! carried by [`BadEvidenceError`] and mean the caller should reject the
//! input. Everything else is a system failure that monitoring and retry
//! logic treat as an operational incident. The class is decided where the
//! failure is detected and survives any number of wrapping layers.

use std::error::Error as StdError;
use std::fmt;

use anyhow::anyhow;
use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use strum::{AsRefStr, Display};
use thiserror::Error;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

/// Marker carried in the `error` field of the wire format.
pub const BAD_EVIDENCE: &str = "bad evidence";

/// Payload of a [`BadEvidenceError`].
#[derive(Debug)]
pub enum Detail {
    Text(String),
    Error(anyhow::Error),
    Other(Value),
}

impl From<&str> for Detail {
    fn from(value: &str) -> Self {
        Detail::Text(value.to_string())
    }
}

impl From<String> for Detail {
    fn from(value: String) -> Self {
        Detail::Text(value)
    }
}

impl From<anyhow::Error> for Detail {
    fn from(value: anyhow::Error) -> Self {
        Detail::Error(value)
    }
}

impl From<Value> for Detail {
    fn from(value: Value) -> Self {
        Detail::Other(value)
    }
}

impl fmt::Display for Detail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Detail::Text(text) => f.write_str(text),
            Detail::Error(err) => write!(f, "{err:#}"),
            Detail::Other(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum DetailType {
    String,
    Error,
    Other,
}

/// The evidence (or endorsement document) is structurally or
/// cryptographically invalid.
///
/// Two `BadEvidenceError`s always compare equal: equality is the error
/// kind, not the payload, so callers can test for a bad-evidence failure
/// without matching a specific message.
#[derive(Debug)]
pub struct BadEvidenceError {
    detail: Detail,
}

impl BadEvidenceError {
    pub fn new(detail: impl Into<Detail>) -> Self {
        Self {
            detail: detail.into(),
        }
    }

    /// Wrap an error. Its whole chain is kept for serialization.
    pub fn wrap(err: impl Into<anyhow::Error>) -> Self {
        Self {
            detail: Detail::Error(err.into()),
        }
    }

    /// Carry an arbitrary structured value as the detail.
    pub fn other(value: impl Into<Value>) -> Self {
        Self {
            detail: Detail::Other(value.into()),
        }
    }

    pub fn detail(&self) -> &Detail {
        &self.detail
    }

    /// The wrapped error if the detail is an error, `None` otherwise.
    pub fn detail_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match &self.detail {
            Detail::Error(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Whether a bad-evidence error appears anywhere in the chain of `err`.
    pub fn is_in(err: &anyhow::Error) -> bool {
        err.chain().any(|e| e.is::<BadEvidenceError>())
    }
}

impl fmt::Display for BadEvidenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{BAD_EVIDENCE}: {}", self.detail)
    }
}

impl StdError for BadEvidenceError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.detail {
            Detail::Error(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl PartialEq for BadEvidenceError {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Serialize for BadEvidenceError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("BadEvidenceError", 3)?;
        state.serialize_field("error", BAD_EVIDENCE)?;
        match &self.detail {
            Detail::Text(text) => {
                state.serialize_field("detail-type", &DetailType::String)?;
                state.serialize_field("detail", text)?;
            }
            Detail::Error(err) => {
                let chain: Vec<String> = err.chain().map(|e| e.to_string()).collect();
                state.serialize_field("detail-type", &DetailType::Error)?;
                state.serialize_field("detail", &chain)?;
            }
            Detail::Other(value) => {
                state.serialize_field("detail-type", &DetailType::Other)?;
                state.serialize_field("detail", value)?;
            }
        }
        state.end()
    }
}

#[derive(Deserialize)]
struct BadEvidenceWire {
    error: String,
    #[serde(rename = "detail-type")]
    detail_type: DetailType,
    detail: Value,
}

impl<'de> Deserialize<'de> for BadEvidenceError {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = BadEvidenceWire::deserialize(deserializer)?;
        if wire.error != BAD_EVIDENCE {
            return Err(D::Error::custom(format!(
                "expected error `{BAD_EVIDENCE}`, got `{}`",
                wire.error
            )));
        }

        let detail = match wire.detail_type {
            DetailType::String => match wire.detail {
                Value::String(text) => Detail::Text(text),
                other => return Err(D::Error::custom(format!("string detail expected, got {other}"))),
            },
            DetailType::Error => {
                let chain: Vec<String> =
                    serde_json::from_value(wire.detail).map_err(D::Error::custom)?;
                // Rebuild the chain innermost first so that it iterates in
                // the same order it was serialized.
                let mut messages = chain.into_iter().rev();
                let innermost = messages
                    .next()
                    .ok_or_else(|| D::Error::custom("empty error chain"))?;
                let err = messages.fold(anyhow!(innermost), |err, message| err.context(message));
                Detail::Error(err)
            }
            DetailType::Other => Detail::Other(wire.detail),
        };

        Ok(Self { detail })
    }
}

/// Whether a [`BadEvidenceError`] appears anywhere in the `source()` chain
/// of `err`, `err` included.
pub fn is_bad_evidence(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<BadEvidenceError>() {
            return true;
        }
        current = e.source();
    }
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorClass {
    /// The input is invalid. Reject it, do not retry.
    Evidence,
    /// The system could not complete the operation.
    System,
}

#[derive(Error, AsRefStr, Debug)]
pub enum Error {
    #[error("{0}")]
    BadEvidence(#[from] BadEvidenceError),

    #[error("unsupported media type `{media_type}`")]
    UnsupportedMediaType { media_type: String },

    #[error("no handlers registered for attestation scheme `{scheme}`")]
    SchemeNotFound { scheme: String },

    #[error("no trust anchors provisioned under `{key}` for attestation scheme `{scheme}`")]
    TrustAnchorsNotProvisioned { scheme: String, key: String },

    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    #[error("`{scheme}` handler produced an invalid endorsement: {reason}")]
    InvalidEndorsement { scheme: String, reason: String },

    #[error("failed to initialize handler `{name}`: {source}")]
    HandlerInit {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid scheme registry: {message}")]
    Registry { message: String },

    #[error("internal error: {source}")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        if self.is_bad_evidence() {
            ErrorClass::Evidence
        } else {
            ErrorClass::System
        }
    }

    pub fn is_bad_evidence(&self) -> bool {
        is_bad_evidence(self)
    }

    /// Shorthand for a bad-evidence error with a text detail.
    pub fn bad_evidence(detail: impl Into<Detail>) -> Self {
        Error::BadEvidence(BadEvidenceError::new(detail))
    }

    pub fn internal(source: impl Into<anyhow::Error>) -> Self {
        Error::Internal {
            source: source.into(),
        }
    }
}
