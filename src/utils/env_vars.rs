use crate::utils::{ConfigError, Logger};
use std::collections::BTreeMap;
use std::path::Path;

/// Build-time environment snapshot used to inline `process.env.NAME`
#[derive(Debug, Clone, Default)]
pub struct EnvVarsManager {
    variables: BTreeMap<String, String>,
}

impl EnvVarsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `.env` files for `mode`, then the process environment, then `NODE_ENV`
    pub fn load(root: &Path, mode: &str) -> Result<Self, ConfigError> {
        Self::load_with(root, mode, std::env::vars())
    }

    pub fn load_with(
        root: &Path,
        mode: &str,
        process_env: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigError> {
        let mut manager = Self::new();

        // Later files override earlier ones
        let env_files = [
            root.join(".env"),
            root.join(".env.local"),
            root.join(format!(".env.{}", mode)),
            root.join(format!(".env.{}.local", mode)),
        ];

        for env_file in &env_files {
            if env_file.is_file() {
                manager.load_env_file(env_file)?;
            }
        }

        for (key, value) in process_env {
            manager.variables.insert(key, value);
        }

        manager
            .variables
            .entry("NODE_ENV".to_string())
            .or_insert_with(|| mode.to_string());

        Logger::debug(&format!("Loaded {} environment variables", manager.variables.len()));
        Ok(manager)
    }

    fn load_env_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Logger::debug(&format!("Loading env file: {}", path.display()));

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match parse_env_line(line) {
                Some((key, value)) => {
                    self.variables.insert(key, value);
                }
                None => Logger::warn(&format!(
                    "Invalid env line in {} at line {}: {}",
                    path.display(),
                    line_num + 1,
                    line
                )),
            }
        }

        Ok(())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.variables.get(key)
    }

    pub fn into_snapshot(self) -> BTreeMap<String, String> {
        self.variables
    }
}

/// Parse `KEY=VALUE`, with an optional `export ` prefix and quoted values
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim();

    let first = key.chars().next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }

    let value = if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        &value[1..value.len() - 1]
    } else {
        value
    };

    Some((key.to_string(), value.to_string()))
}
