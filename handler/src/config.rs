// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context};
use config::File;
use key_value_storage::KeyValueStorageConfig;
use serde::Deserialize;

use crate::SchemeConfig;

const DEFAULT_STORAGE_TYPE: &str = "Memory";

/// Everything needed to build a [`SchemeRegistry`](crate::SchemeRegistry)
/// and the [`Pipeline`](crate::Pipeline) over it.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Config {
    /// Backend shared by the store handlers of all schemes.
    #[serde(default)]
    pub storage: KeyValueStorageConfig,

    /// Schemes to enable.
    #[serde(default)]
    pub schemes: Vec<SchemeConfig>,

    /// Upper bound on every store operation. No bound when unset.
    #[serde(default)]
    pub store_timeout_secs: Option<u64>,
}

impl Config {
    pub fn store_timeout(&self) -> Option<Duration> {
        self.store_timeout_secs.map(Duration::from_secs)
    }
}

impl TryFrom<&Path> for Config {
    type Error = anyhow::Error;

    /// Load `Config` from a configuration file. Supported formats are all
    /// formats supported by the `config` crate.
    fn try_from(config_path: &Path) -> Result<Self, Self::Error> {
        let path = config_path
            .to_str()
            .with_context(|| format!("config path {config_path:?} is not valid UTF-8"))?;

        let c = config::Config::builder()
            .set_default("storage.type", DEFAULT_STORAGE_TYPE)?
            .set_default("schemes", Vec::<&str>::new())?
            .add_source(File::with_name(path))
            .build()?;

        c.try_deserialize()
            .map_err(|e| anyhow!("invalid config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use key_value_storage::{local_fs, local_json, KeyValueStorageConfig};
    use rstest::rstest;
    use serde_json::json;

    use super::Config;
    use crate::{HandlerParams, SchemeConfig, SchemeParams};

    #[rstest]
    #[case("test_data/configs/memory.toml", Config::default())]
    #[case("test_data/configs/local-json.toml", Config {
        storage: KeyValueStorageConfig::LocalJson(local_json::Config {
            file_path: "/var/lib/attestation-handler/store.json".into(),
        }),
        schemes: vec![SchemeConfig::Sample(SchemeParams {
            evidence: HandlerParams::from([("require_nonce".into(), json!(true))]),
            endorsement: HandlerParams::from([("require_signature".into(), json!(false))]),
        })],
        store_timeout_secs: Some(5),
    })]
    #[case("test_data/configs/local-fs.json", Config {
        storage: KeyValueStorageConfig::LocalFs(local_fs::Config {
            dir_path: "/var/lib/attestation-handler/db".into(),
        }),
        schemes: vec![SchemeConfig::Sample(SchemeParams::default())],
        store_timeout_secs: None,
    })]
    fn read_config(#[case] config_path: &str, #[case] expected: Config) {
        let config = Config::try_from(Path::new(config_path)).unwrap();
        assert_eq!(config, expected);
    }

    #[rstest]
    #[case("test_data/configs/unknown-scheme.toml")]
    #[case("test_data/configs/missing.toml")]
    fn bad_config(#[case] config_path: &str) {
        assert!(Config::try_from(Path::new(config_path)).is_err());
    }

    #[test]
    fn timeout() {
        let config = Config {
            store_timeout_secs: Some(3),
            ..Default::default()
        };
        assert_eq!(config.store_timeout(), Some(std::time::Duration::from_secs(3)));
        assert_eq!(Config::default().store_timeout(), None);
    }
}
