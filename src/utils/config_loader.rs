use crate::core::config::BuildConfig;
use crate::utils::{ConfigError, Logger};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "typack.config.json";

/// Configuration file format (typack.config.json)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypackConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub production: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_maps: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub minify: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alias: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsx_factory: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsx_fragment_factory: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerate_asset_errors: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_assets: Option<usize>,
}

/// Values given on the command line; `None` means "not given"
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub out_dir: Option<String>,
    pub public_url: Option<String>,
    pub production: Option<bool>,
    pub source_maps: Option<bool>,
    pub minify: Option<bool>,
    pub extensions: Option<Vec<String>>,
    pub global_name: Option<String>,
    pub tolerate_asset_errors: Option<bool>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load typack.config.json from the project root if present
    pub fn load_from_file(root: &Path) -> Result<Option<TypackConfig>, ConfigError> {
        let config_path = root.join(CONFIG_FILE_NAME);

        if !config_path.is_file() {
            Logger::debug(&format!("No {} found, using defaults", CONFIG_FILE_NAME));
            return Ok(None);
        }

        Logger::debug(&format!("Loading config from {}", config_path.display()));

        let content = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Unreadable {
            path: config_path.clone(),
            message: e.to_string(),
        })?;

        let config: TypackConfig = serde_json::from_str(&content).map_err(|e| ConfigError::Malformed {
            path: config_path.clone(),
            message: e.to_string(),
        })?;

        Ok(Some(config))
    }

    /// Merge file config with CLI arguments (CLI > file > defaults)
    pub fn merge_with_cli(
        file_config: Option<TypackConfig>,
        root: PathBuf,
        cli: CliOverrides,
    ) -> BuildConfig {
        let base = file_config.unwrap_or_default();
        let mut config = BuildConfig::new(root);

        if let Some(out_dir) = cli.out_dir.or(base.out_dir) {
            config.out_dir = PathBuf::from(out_dir);
        }
        if let Some(public_url) = cli.public_url.or(base.public_url) {
            config.public_url = public_url;
        }
        if let Some(extensions) = cli.extensions.or(base.extensions) {
            config.extensions = extensions.into_iter().map(normalize_extension).collect();
        }
        if let Some(concurrency) = base.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(max_assets) = base.max_assets {
            config.max_assets = max_assets;
        }

        config.production = cli.production.or(base.production).unwrap_or(false);
        config.source_maps = cli.source_maps.or(base.source_maps);
        config.minify = cli.minify.or(base.minify);
        config.alias = base.alias;
        config.external = base.external;
        config.jsx_factory = base.jsx_factory;
        config.jsx_fragment_factory = base.jsx_fragment_factory;
        config.global_name = cli.global_name.or(base.global_name);
        config.tolerate_asset_errors = cli
            .tolerate_asset_errors
            .or(base.tolerate_asset_errors)
            .unwrap_or(false);

        config
    }
}

fn normalize_extension(ext: String) -> String {
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}
