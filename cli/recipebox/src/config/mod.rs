use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use std::{env, fs};

use anyhow::{Context, Result};
use config::{Config as HierarchicalConfig, Environment};
use recipebox_catalog::{DEFAULT_CATALOG_URL, TransportConfig};
use recipebox_sdk::models::catalog::{DEFAULT_LIMIT, DEFAULT_SEARCH_DEBOUNCE, TagLookup};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Name of recipebox managed directories (config, data)
pub const RECIPEBOX_DIR_NAME: &str = "recipebox";
pub const RECIPEBOX_CONFIG_DIR_VAR: &str = "RECIPEBOX_CONFIG_DIR";
pub const RECIPEBOX_CONFIG_FILE: &str = "recipebox.toml";
const ENV_PREFIX: &str = "RECIPEBOX_";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Describes the configuration of the recipebox CLI
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// The URL of the recipe catalog
    // Using a URL here adds an extra trailing slash,
    // so just use a String.
    pub catalog_url: String,
    /// Directory where sessions and likes are stored (default:
    /// `$XDG_DATA_HOME/recipebox`)
    pub data_dir: PathBuf,
    /// Directory the configuration file is loaded from (default:
    /// `$XDG_CONFIG_HOME/recipebox`)
    pub config_dir: PathBuf,
    /// How many recipes a page shows, 0 shows all
    pub page_size: u32,
    /// How long search input has to settle before it is sent
    pub search_debounce_ms: u64,
    /// How recipes for a tag are looked up
    pub tag_lookup: TagLookup,
    pub request_timeout_secs: u64,
    /// Replay catalog responses from this file instead of contacting the
    /// catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_mock: Option<PathBuf>,
}

impl Config {
    fn read_raw_config() -> Result<HierarchicalConfig> {
        let data_dir = dirs::data_dir()
            .context("Could not determine the data directory")?
            .join(RECIPEBOX_DIR_NAME);

        let config_dir = match env::var(RECIPEBOX_CONFIG_DIR_VAR) {
            Ok(v) => {
                debug!("`${RECIPEBOX_CONFIG_DIR_VAR}` set: {v}");
                PathBuf::from(v)
            },
            Err(_) => {
                let config_dir = dirs::config_dir()
                    .context("Could not determine the config directory")?
                    .join(RECIPEBOX_DIR_NAME);
                debug!("`${RECIPEBOX_CONFIG_DIR_VAR}` not set, using {config_dir:?}");
                config_dir
            },
        };
        fs::create_dir_all(&config_dir)
            .context(format!("Could not create config directory: {config_dir:?}"))?;

        let builder = HierarchicalConfig::builder()
            .set_default("catalog_url", DEFAULT_CATALOG_URL)?
            .set_default("data_dir", data_dir.to_string_lossy().as_ref())?
            .set_default("page_size", DEFAULT_LIMIT)?
            .set_default(
                "search_debounce_ms",
                DEFAULT_SEARCH_DEBOUNCE.as_millis() as u64,
            )?
            .set_default("tag_lookup", TagLookup::default().to_string())?
            .set_default("request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS)?
            // Config dir is added to the config for completeness;
            // the config file cannot change the config dir.
            .set_override("config_dir", config_dir.to_string_lossy().as_ref())?
            // read from /etc
            .add_source(
                config::File::from(
                    PathBuf::from("/etc")
                        .join(RECIPEBOX_DIR_NAME)
                        .join(RECIPEBOX_CONFIG_FILE),
                )
                .format(config::FileFormat::Toml)
                .required(false),
            )
            // the user's config file
            .add_source(
                config::File::from(config_dir.join(RECIPEBOX_CONFIG_FILE))
                    .format(config::FileFormat::Toml)
                    .required(false),
            );

        // override via env variables
        let recipebox_envs = env::vars()
            .filter_map(|(k, v)| {
                k.strip_prefix(ENV_PREFIX)
                    .filter(|k| *k != "CONFIG_DIR")
                    .map(|k| (k.to_lowercase(), v))
            })
            .collect::<HashMap<_, _>>();

        let builder = builder.add_source(
            Environment::default()
                .source(Some(recipebox_envs))
                .try_parsing(true),
        );

        Ok(builder.build()?)
    }

    /// Creates a [Config] from the environment and config file
    pub fn parse() -> Result<Config> {
        let raw_config = Self::read_raw_config()?;
        let config: Config = raw_config
            .try_deserialize()
            .context("Could not parse config")?;
        Ok(config)
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            base_url: self.catalog_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..Default::default()
        }
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    /// The configuration as TOML, for human consumption
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Could not serialize config")
    }
}
