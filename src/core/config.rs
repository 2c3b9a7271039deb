use crate::utils::{hashing, ConfigError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Immutable configuration for one bundling run.
///
/// Resolved once (defaults, then `typack.config.json`, then CLI flags) and
/// threaded explicitly through the resolver, transformers, graph builder,
/// splitter and packager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    #[serde(default = "default_public_url")]
    pub public_url: String,
    #[serde(default)]
    pub production: bool,
    /// Defaults to `production` when unset
    #[serde(default)]
    pub source_maps: Option<bool>,
    /// Defaults to `production` when unset
    #[serde(default)]
    pub minify: Option<bool>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub alias: BTreeMap<String, String>,
    #[serde(default)]
    pub external: Vec<String>,
    #[serde(default)]
    pub jsx_factory: Option<String>,
    #[serde(default)]
    pub jsx_fragment_factory: Option<String>,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub tolerate_asset_errors: bool,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_assets")]
    pub max_assets: usize,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_public_url() -> String {
    "/".to_string()
}

pub fn default_extensions() -> Vec<String> {
    [".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".json"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_concurrency() -> usize {
    num_cpus::get().max(1)
}

fn default_max_assets() -> usize {
    100_000
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            out_dir: default_out_dir(),
            public_url: default_public_url(),
            production: false,
            source_maps: None,
            minify: None,
            extensions: default_extensions(),
            alias: BTreeMap::new(),
            external: Vec::new(),
            jsx_factory: None,
            jsx_fragment_factory: None,
            global_name: None,
            tolerate_asset_errors: false,
            concurrency: default_concurrency(),
            max_assets: default_max_assets(),
            env: BTreeMap::new(),
        }
    }
}

impl BuildConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn mode(&self) -> &'static str {
        if self.production {
            "production"
        } else {
            "development"
        }
    }

    pub fn emit_source_maps(&self) -> bool {
        self.source_maps.unwrap_or(self.production)
    }

    pub fn should_minify(&self) -> bool {
        self.minify.unwrap_or(self.production)
    }

    /// Output directory, relative paths taken against `root`
    pub fn out_dir_path(&self) -> PathBuf {
        if self.out_dir.is_absolute() {
            self.out_dir.clone()
        } else {
            self.root.join(&self.out_dir)
        }
    }

    /// Public URL of an emitted file name
    pub fn public_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.public_url.trim_end_matches('/'), file_name)
    }

    pub fn is_external(&self, specifier: &str) -> bool {
        self.external.iter().any(|ext| {
            specifier == ext
                || specifier
                    .strip_prefix(ext.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Digest of the whole configuration, keying run-scoped caches
    pub fn fingerprint(&self) -> String {
        let serialized = serde_json::to_vec(self).unwrap_or_default();
        hashing::short_hash(&serialized, 16)
    }

    /// Digest of the options that shape emitted bytes.
    ///
    /// Machine-dependent settings (root, concurrency, limits) and the env
    /// snapshot are left out, so identical sources give identical output anywhere.
    pub fn output_fingerprint(&self) -> String {
        let options = serde_json::json!({
            "publicUrl": self.public_url,
            "production": self.production,
            "sourceMaps": self.emit_source_maps(),
            "minify": self.should_minify(),
            "extensions": self.extensions,
            "alias": self.alias,
            "external": self.external,
            "jsxFactory": self.jsx_factory,
            "jsxFragmentFactory": self.jsx_fragment_factory,
            "globalName": self.global_name,
        });
        hashing::short_hash(options.to_string().as_bytes(), 16)
    }

    /// Root made absolute against the current directory
    pub fn absolute_root(&self) -> PathBuf {
        absolutize(&self.root)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extensions.is_empty() {
            return Err(ConfigError::Invalid("at least one extension is required".into()));
        }
        if let Some(bad) = self.extensions.iter().find(|ext| !ext.starts_with('.') || ext.len() < 2) {
            return Err(ConfigError::Invalid(format!(
                "extension '{}' must start with a dot",
                bad
            )));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.max_assets == 0 {
            return Err(ConfigError::Invalid("maxAssets must be at least 1".into()));
        }
        if let Some(name) = &self.global_name {
            if !crate::infrastructure::is_valid_identifier(name) {
                return Err(ConfigError::Invalid(format!(
                    "global name '{}' is not a valid identifier",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Make `path` absolute and drop `.`/`..` components lexically
pub fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };
    normalize_path(&joined)
}

pub fn normalize_path(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
