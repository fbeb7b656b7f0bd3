// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Scheme-agnostic handling of attestation evidence and endorsements.
//!
//! Each attestation scheme plugs in an [`EvidenceHandler`], an
//! [`EndorsementHandler`] and a [`StoreHandler`]. A [`SchemeRegistry`] maps
//! schemes and media types to those handlers, and the [`Pipeline`] composes
//! them into verification and endorsement ingestion flows. Failures caused
//! by the input are reported as [`BadEvidenceError`] and kept apart from
//! system failures.

pub mod config;
pub mod context;
pub mod endorsement;
pub mod error;
pub mod pipeline;
pub mod plugin;
pub mod registry;
pub mod schemes;
pub mod store;
pub mod token;

pub use crate::config::Config;
pub use context::RequestContext;
pub use endorsement::{Endorsement, EndorsementHandlerResponse, EndorsementType};
pub use error::{
    is_bad_evidence, BadEvidenceError, Detail, Error, ErrorClass, Result, BAD_EVIDENCE,
};
pub use pipeline::{Pipeline, Stage};
pub use plugin::{
    bool_param, EndorsementHandler, EvidenceHandler, HandlerParams, Pluggable,
};
pub use registry::{SchemeConfig, SchemeHandlers, SchemeParams, SchemeRegistry};
pub use store::{KvStoreHandler, StoreError, StoreHandler};
pub use token::{AttestationToken, Claims};
