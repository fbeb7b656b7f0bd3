// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Provision endorsements and verify evidence from the command line.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use attestation_handler::{
    AttestationToken, Config, Error, Pipeline, RequestContext, SchemeRegistry,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use clap::{Args, Parser, Subcommand};
use log::info;

/// Exit code reported when the input itself was rejected.
const EXIT_BAD_EVIDENCE: u8 = 2;

#[derive(Parser)]
#[command(name = "attestation-handler")]
#[command(bin_name = "attestation-handler")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a config file. Supported formats: TOML, YAML, JSON and
    /// possibly other formats supported by the `config` crate.
    #[arg(short, long, env = "ATTESTATION_HANDLER_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode an endorsement document and store its contents
    Provision(ProvisionArgs),

    /// Verify evidence and print the extracted claims
    Verify(VerifyArgs),
}

#[derive(Args)]
struct ProvisionArgs {
    /// Tenant the endorsements belong to
    #[arg(short, long)]
    tenant: String,

    /// Media type of the endorsement document
    #[arg(short, long)]
    media_type: String,

    /// Path to the endorsement document
    #[arg(short, long)]
    path: PathBuf,

    /// Path to the material signed documents are checked against
    #[arg(long)]
    ca_cert: Option<PathBuf>,
}

#[derive(Args)]
struct VerifyArgs {
    /// Tenant the evidence belongs to
    #[arg(short, long)]
    tenant: String,

    /// Media type of the evidence
    #[arg(short, long)]
    media_type: String,

    /// Path to the evidence
    #[arg(short, long)]
    path: PathBuf,

    /// Base64 encoded nonce the evidence must be bound to
    #[arg(short, long)]
    nonce: Option<String>,
}

/// Print the wire form of a rejected input and map it to the exit code.
fn rejected(err: Error) -> Result<ExitCode> {
    match err {
        Error::BadEvidence(bad) => {
            println!("{}", serde_json::to_string_pretty(&bad)?);
            Ok(ExitCode::from(EXIT_BAD_EVIDENCE))
        }
        other => Err(other.into()),
    }
}

async fn provision(pipeline: &Pipeline, ctx: &RequestContext, args: ProvisionArgs) -> Result<ExitCode> {
    let data = tokio::fs::read(&args.path)
        .await
        .with_context(|| format!("read endorsements {}", args.path.display()))?;
    let ca_cert_pool = match &args.ca_cert {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("read CA material {}", path.display()))?,
        None => Vec::new(),
    };

    match pipeline
        .ingest_endorsements(ctx, &args.tenant, &data, &args.media_type, &ca_cert_pool)
        .await
    {
        Ok(response) => {
            info!(
                "Provisioned {} reference values and {} trust anchors for tenant `{}`",
                response.reference_values.len(),
                response.trust_anchors.len(),
                args.tenant
            );
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => rejected(e),
    }
}

async fn verify(pipeline: &Pipeline, ctx: &RequestContext, args: VerifyArgs) -> Result<ExitCode> {
    let data = tokio::fs::read(&args.path)
        .await
        .with_context(|| format!("read evidence {}", args.path.display()))?;

    let mut token = AttestationToken::new(&args.tenant, &args.media_type, data);
    if let Some(nonce) = &args.nonce {
        token = token.with_nonce(STANDARD.decode(nonce).context("decode nonce")?);
    }

    match pipeline.verify(ctx, &token).await {
        Ok(claims) => {
            println!("{}", serde_json::to_string_pretty(&claims)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => rejected(e),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::try_from(cli.config.as_path())?;

    let storage = config
        .storage
        .to_key_value_storage()
        .context("initialize storage")?;
    let registry = Arc::new(SchemeRegistry::from_config(&config.schemes, storage)?);
    info!("Schemes enabled: {:?}", registry.schemes());

    let pipeline = Pipeline::new(registry.clone()).with_store_timeout(config.store_timeout());

    let ctx = RequestContext::background();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let res = match cli.command {
        Command::Provision(args) => provision(&pipeline, &ctx, args).await,
        Command::Verify(args) => verify(&pipeline, &ctx, args).await,
    };

    registry.close();
    res
}
