// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use key_value_storage::KeyValueStorage;
use log::{info, warn};
use serde::Deserialize;

use crate::schemes::sample;
use crate::{
    EndorsementHandler, Error, EvidenceHandler, HandlerParams, KvStoreHandler, Result, StoreHandler,
};

/// Options for one scheme's handlers, handed to their `init`.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SchemeParams {
    #[serde(default)]
    pub evidence: HandlerParams,

    #[serde(default)]
    pub endorsement: HandlerParams,
}

/// One entry per built-in scheme to enable.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "name")]
pub enum SchemeConfig {
    #[serde(alias = "sample")]
    Sample(SchemeParams),
}

impl Display for SchemeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemeConfig::Sample(_) => f.write_str(sample::SCHEME),
        }
    }
}

/// The three handlers serving one scheme.
#[derive(Clone)]
pub struct SchemeHandlers {
    pub evidence: Arc<dyn EvidenceHandler>,
    pub endorsement: Arc<dyn EndorsementHandler>,
    pub store: Arc<dyn StoreHandler>,
}

impl SchemeHandlers {
    pub fn scheme(&self) -> &str {
        self.store.attestation_scheme()
    }

    /// Close the evidence and endorsement handlers, logging failures.
    fn close(&self) {
        log_close("evidence", self.evidence.name(), self.evidence.close());
        log_close("endorsement", self.endorsement.name(), self.endorsement.close());
    }
}

/// Scheme identifier to handlers, plus media type indexes used to route
/// evidence and endorsement documents.
///
/// Built once at startup and read-only afterwards.
#[derive(Default)]
pub struct SchemeRegistry {
    schemes: HashMap<String, SchemeHandlers>,
    evidence_media_types: HashMap<String, String>,
    endorsement_media_types: HashMap<String, String>,
}

fn log_close(kind: &str, name: &str, closed: anyhow::Result<()>) {
    if let Err(e) = closed {
        warn!("Failed to close {kind} handler `{name}`: {e:#}");
    }
}

fn registry_error(message: String) -> Error {
    Error::Registry { message }
}

fn index_media_types(
    index: &mut HashMap<String, String>,
    name: &str,
    media_types: Vec<String>,
    scheme: &str,
) -> Result<()> {
    for media_type in media_types {
        if let Some(owner) = index.get(&media_type) {
            return Err(registry_error(format!(
                "media type `{media_type}` of `{name}` is already claimed by scheme `{owner}`"
            )));
        }
        index.insert(media_type, scheme.to_string());
    }
    Ok(())
}

fn check_scheme(name: &str, served: &str, scheme: &str) -> Result<()> {
    if served != scheme {
        return Err(registry_error(format!(
            "handler `{name}` serves scheme `{served}`, not `{scheme}`"
        )));
    }
    Ok(())
}

impl SchemeRegistry {
    /// Instantiate, initialize and register the built-in schemes named in
    /// `configs`. All store handlers share `storage`.
    pub fn from_config(configs: &[SchemeConfig], storage: Arc<dyn KeyValueStorage>) -> Result<Self> {
        Self::from_handlers(configs.iter().map(|config| match config {
            SchemeConfig::Sample(params) => {
                let mut evidence = sample::SampleEvidenceHandler::default();
                let mut endorsement = sample::SampleEndorsementHandler::default();
                init_pair(&mut evidence, &mut endorsement, params)?;

                Ok(SchemeHandlers {
                    evidence: Arc::new(evidence),
                    endorsement: Arc::new(endorsement),
                    store: Arc::new(KvStoreHandler::new(sample::SCHEME, storage.clone())),
                })
            }
        }))
    }

    /// Register initialized handlers in order. `schemes` is consumed lazily,
    /// so nothing after the first failure is created. On failure every
    /// handler already initialized is closed, the rejected one included.
    pub fn from_handlers(schemes: impl IntoIterator<Item = Result<SchemeHandlers>>) -> Result<Self> {
        let mut registry = Self::default();

        for handlers in schemes {
            let registered = handlers.and_then(|handlers| {
                registry.register(handlers.clone()).inspect_err(|_| handlers.close())?;
                Ok(handlers.scheme().to_string())
            });

            match registered {
                Ok(scheme) => info!("Attestation scheme `{scheme}` registered"),
                Err(e) => {
                    registry.close();
                    return Err(e);
                }
            }
        }

        Ok(registry)
    }

    /// Add a scheme. The store handler's scheme is the registration key; the
    /// evidence and endorsement handlers must serve the same scheme and must
    /// not claim media types owned by another scheme.
    pub fn register(&mut self, handlers: SchemeHandlers) -> Result<()> {
        let scheme = handlers.scheme().to_string();
        if scheme.is_empty() {
            return Err(registry_error("attestation scheme must not be empty".into()));
        }
        if self.schemes.contains_key(&scheme) {
            return Err(registry_error(format!(
                "attestation scheme `{scheme}` is already registered"
            )));
        }

        let (evidence, endorsement) = (&handlers.evidence, &handlers.endorsement);
        check_scheme(evidence.name(), evidence.attestation_scheme(), &scheme)?;
        check_scheme(endorsement.name(), endorsement.attestation_scheme(), &scheme)?;

        // Index into copies so a rejected scheme leaves no partial entries.
        let mut evidence_media_types = self.evidence_media_types.clone();
        let mut endorsement_media_types = self.endorsement_media_types.clone();
        index_media_types(
            &mut evidence_media_types,
            evidence.name(),
            evidence.supported_media_types(),
            &scheme,
        )?;
        index_media_types(
            &mut endorsement_media_types,
            endorsement.name(),
            endorsement.supported_media_types(),
            &scheme,
        )?;

        self.evidence_media_types = evidence_media_types;
        self.endorsement_media_types = endorsement_media_types;
        self.schemes.insert(scheme, handlers);
        Ok(())
    }

    pub fn get(&self, scheme: &str) -> Result<&SchemeHandlers> {
        self.schemes.get(scheme).ok_or_else(|| Error::SchemeNotFound {
            scheme: scheme.to_string(),
        })
    }

    /// Handlers for evidence of `media_type`.
    pub fn for_evidence(&self, media_type: &str) -> Result<&SchemeHandlers> {
        let scheme = self
            .evidence_media_types
            .get(media_type)
            .ok_or_else(|| Error::UnsupportedMediaType {
                media_type: media_type.to_string(),
            })?;
        self.get(scheme)
    }

    /// Handlers for endorsement documents of `media_type`.
    pub fn for_endorsement(&self, media_type: &str) -> Result<&SchemeHandlers> {
        let scheme = self
            .endorsement_media_types
            .get(media_type)
            .ok_or_else(|| Error::UnsupportedMediaType {
                media_type: media_type.to_string(),
            })?;
        self.get(scheme)
    }

    /// Registered scheme identifiers, sorted.
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.schemes.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }

    /// Close every evidence and endorsement handler. Call once, after the
    /// last request has drained. Failures are logged and do not stop the
    /// remaining handlers from closing.
    pub fn close(&self) {
        for scheme in self.schemes() {
            self.schemes[scheme].close();
        }
    }
}

/// Initialize both handlers of a scheme. If either init fails, every handler
/// whose init was called is closed before the error is returned.
fn init_pair(
    evidence: &mut dyn EvidenceHandler,
    endorsement: &mut dyn EndorsementHandler,
    params: &SchemeParams,
) -> Result<()> {
    if let Err(source) = evidence.init(&params.evidence) {
        log_close("evidence", evidence.name(), evidence.close());
        return Err(Error::HandlerInit {
            name: evidence.name().to_string(),
            source,
        });
    }

    if let Err(source) = endorsement.init(&params.endorsement) {
        log_close("endorsement", endorsement.name(), endorsement.close());
        log_close("evidence", evidence.name(), evidence.close());
        return Err(Error::HandlerInit {
            name: endorsement.name().to_string(),
            source,
        });
    }

    Ok(())
}
