use crate::core::config::normalize_path;
use crate::infrastructure::path_aliases::{path_mapping_candidates, sort_path_mappings, PathMapping};
use crate::utils::{ConfigError, Logger};
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const PROJECT_CONFIG_FILE: &str = "tsconfig.json";

/// Compiler options of the nearest `tsconfig.json`, with `extends` applied
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectConfig {
    pub path: Option<PathBuf>,
    pub base_url: Option<PathBuf>,
    pub paths: Vec<PathMapping>,
    /// Directory `paths` targets are relative to when `baseUrl` is unset
    pub paths_dir: Option<PathBuf>,
    pub remove_comments: bool,
    pub es_module_interop: bool,
    pub jsx_factory: Option<String>,
    pub jsx_fragment_factory: Option<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            path: None,
            base_url: None,
            paths: Vec::new(),
            paths_dir: None,
            remove_comments: false,
            es_module_interop: true,
            jsx_factory: None,
            jsx_fragment_factory: None,
        }
    }
}

impl ProjectConfig {
    /// Candidate files for a bare specifier from `paths` rules
    pub fn path_candidates(&self, specifier: &str) -> Vec<PathBuf> {
        match self.base_url.as_ref().or(self.paths_dir.as_ref()) {
            Some(base) if !self.paths.is_empty() => {
                path_mapping_candidates(&self.paths, base, specifier)
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProjectConfig {
    #[serde(default)]
    extends: Option<Extends>,
    #[serde(default)]
    compiler_options: RawCompilerOptions,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Extends {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCompilerOptions {
    base_url: Option<String>,
    paths: Option<BTreeMap<String, Vec<String>>>,
    remove_comments: Option<bool>,
    es_module_interop: Option<bool>,
    jsx_factory: Option<String>,
    jsx_fragment_factory: Option<String>,
}

/// Options of one file in an `extends` chain; `None` inherits
#[derive(Debug, Default)]
struct Layer {
    base_url: Option<PathBuf>,
    paths: Option<(Vec<PathMapping>, PathBuf)>,
    remove_comments: Option<bool>,
    es_module_interop: Option<bool>,
    jsx_factory: Option<String>,
    jsx_fragment_factory: Option<String>,
}

impl Layer {
    fn from_raw(options: RawCompilerOptions, dir: &Path) -> Self {
        Self {
            base_url: options.base_url.map(|base| normalize_path(&dir.join(base))),
            paths: options.paths.map(|paths| {
                let mut mappings: Vec<PathMapping> = paths
                    .into_iter()
                    .map(|(pattern, targets)| PathMapping::parse(&pattern, targets))
                    .collect();
                sort_path_mappings(&mut mappings);
                (mappings, normalize_path(dir))
            }),
            remove_comments: options.remove_comments,
            es_module_interop: options.es_module_interop,
            jsx_factory: options.jsx_factory,
            jsx_fragment_factory: options.jsx_fragment_factory,
        }
    }

    fn apply(&mut self, child: Layer) {
        if child.base_url.is_some() {
            self.base_url = child.base_url;
        }
        if child.paths.is_some() {
            self.paths = child.paths;
        }
        if child.remove_comments.is_some() {
            self.remove_comments = child.remove_comments;
        }
        if child.es_module_interop.is_some() {
            self.es_module_interop = child.es_module_interop;
        }
        if child.jsx_factory.is_some() {
            self.jsx_factory = child.jsx_factory;
        }
        if child.jsx_fragment_factory.is_some() {
            self.jsx_fragment_factory = child.jsx_fragment_factory;
        }
    }

    fn into_config(self, path: PathBuf) -> ProjectConfig {
        let defaults = ProjectConfig::default();
        let (paths, paths_dir) = match self.paths {
            Some((paths, dir)) => (paths, Some(dir)),
            None => (Vec::new(), None),
        };
        ProjectConfig {
            path: Some(path),
            base_url: self.base_url,
            paths,
            paths_dir,
            remove_comments: self.remove_comments.unwrap_or(defaults.remove_comments),
            es_module_interop: self.es_module_interop.unwrap_or(defaults.es_module_interop),
            jsx_factory: self.jsx_factory,
            jsx_fragment_factory: self.jsx_fragment_factory,
        }
    }
}

/// Discovers and caches project configuration for the duration of one run
#[derive(Default)]
pub struct ProjectConfigLoader {
    by_dir: DashMap<PathBuf, Arc<ProjectConfig>>,
}

impl ProjectConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration governing `file`, found by ancestor search from its directory
    pub fn for_file(&self, file: &Path) -> Result<Arc<ProjectConfig>, ConfigError> {
        match file.parent() {
            Some(dir) => self.for_dir(dir),
            None => Ok(Arc::new(ProjectConfig::default())),
        }
    }

    pub fn for_dir(&self, dir: &Path) -> Result<Arc<ProjectConfig>, ConfigError> {
        if let Some(cached) = self.by_dir.get(dir) {
            return Ok(cached.clone());
        }

        let config = match find_project_config(dir) {
            Some(path) => Arc::new(load_project_config(&path)?),
            None => Arc::new(ProjectConfig::default()),
        };

        self.by_dir.insert(dir.to_path_buf(), config.clone());
        Ok(config)
    }
}

/// Nearest tsconfig.json walking up from `dir`; package boundaries stop the search
fn find_project_config(dir: &Path) -> Option<PathBuf> {
    for ancestor in dir.ancestors() {
        if ancestor.file_name().is_some_and(|name| name == "node_modules") {
            return None;
        }
        let candidate = ancestor.join(PROJECT_CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Load one tsconfig file with its whole `extends` chain
pub fn load_project_config(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let mut chain = Vec::new();
    let layer = load_layer(path, &mut chain)?;
    Logger::debug(&format!("Loaded project config {}", path.display()));
    Ok(layer.into_config(path.to_path_buf()))
}

fn load_layer(path: &Path, chain: &mut Vec<PathBuf>) -> Result<Layer, ConfigError> {
    if chain.iter().any(|seen| seen == path) {
        return Err(ConfigError::ExtendsCycle {
            path: path.to_path_buf(),
        });
    }
    chain.push(path.to_path_buf());

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let raw: RawProjectConfig = parse_jsonc(&content).map_err(|e| ConfigError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let dir = path.parent().unwrap_or(Path::new("/"));
    let mut layer = Layer::default();

    let parents = match raw.extends {
        Some(Extends::One(spec)) => vec![spec],
        Some(Extends::Many(specs)) => specs,
        None => Vec::new(),
    };
    for spec in parents {
        let parent_path = resolve_extends(dir, &spec).ok_or_else(|| ConfigError::Unreadable {
            path: dir.join(&spec),
            message: format!("cannot find base configuration '{}'", spec),
        })?;
        layer.apply(load_layer(&parent_path, chain)?);
    }

    layer.apply(Layer::from_raw(raw.compiler_options, dir));
    chain.pop();
    Ok(layer)
}

fn resolve_extends(dir: &Path, spec: &str) -> Option<PathBuf> {
    let with_json = |path: PathBuf| -> Option<PathBuf> {
        if path.is_file() {
            return Some(path);
        }
        let json = PathBuf::from(format!("{}.json", path.display()));
        if json.is_file() {
            return Some(json);
        }
        let nested = path.join(PROJECT_CONFIG_FILE);
        nested.is_file().then_some(nested)
    };

    if spec.starts_with('.') || Path::new(spec).is_absolute() {
        return with_json(dir.join(spec));
    }

    dir.ancestors()
        .find_map(|ancestor| with_json(ancestor.join("node_modules").join(spec)))
}

/// Parse JSON that may contain comments and trailing commas
pub fn parse_jsonc<T: serde::de::DeserializeOwned>(content: &str) -> serde_json::Result<T> {
    serde_json::from_str(&strip_trailing_commas(&strip_jsonc_comments(content)))
}

pub fn strip_jsonc_comments(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            result.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match (c, chars.peek()) {
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        result.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    if next == '\n' {
                        result.push('\n');
                    }
                    prev = next;
                }
            }
            ('"', _) => {
                in_string = true;
                result.push(c);
            }
            _ => result.push(c),
        }
    }

    result
}

fn strip_trailing_commas(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    let mut result = String::with_capacity(content.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            result.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        result.push(c);
    }

    result
}
