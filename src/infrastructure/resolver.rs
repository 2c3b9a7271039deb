use crate::core::config::{normalize_path, BuildConfig};
use crate::infrastructure::path_aliases::{AliasTarget, PathAliasResolver};
use crate::infrastructure::project_config::ProjectConfigLoader;
use crate::utils::{Logger, ResolutionError, Result};
use dashmap::DashMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Outcome of resolving one specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    File(PathBuf),
    /// Left to the host `require` at runtime
    External(String),
}

/// The entry-point fields of a package manifest; everything else is ignored
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub browser: Option<BrowserField>,
    #[serde(default)]
    pub main: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BrowserField {
    String(String),
    Object(serde_json::Map<String, serde_json::Value>),
}

impl PackageManifest {
    /// Entry fields in priority order: `module`, string `browser`, `main`
    pub fn entry_fields(&self) -> Vec<&str> {
        let browser = match &self.browser {
            Some(BrowserField::String(path)) => Some(path.as_str()),
            _ => None,
        };
        [self.module.as_deref(), browser, self.main.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Node-style module resolution extended with aliases and tsconfig `paths`.
///
/// Resolution depends only on the specifier, the importing file, the run's
/// configuration and the files on disk.
pub struct Resolver {
    config: Arc<BuildConfig>,
    fingerprint: String,
    aliases: PathAliasResolver,
    projects: Arc<ProjectConfigLoader>,
    manifests: DashMap<PathBuf, Arc<PackageManifest>>,
}

impl Resolver {
    pub fn new(config: Arc<BuildConfig>, projects: Arc<ProjectConfigLoader>) -> Self {
        let root = config.absolute_root();
        Self {
            fingerprint: config.fingerprint(),
            aliases: PathAliasResolver::new(&config.alias, root),
            config,
            projects,
            manifests: DashMap::new(),
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn resolve(&self, specifier: &str, from: &Path) -> Result<Resolution> {
        let mut chain = Vec::new();
        self.resolve_inner(specifier, from, &mut chain)
    }

    fn resolve_inner(&self, specifier: &str, from: &Path, chain: &mut Vec<String>) -> Result<Resolution> {
        if chain.iter().any(|seen| seen == specifier) {
            chain.push(specifier.to_string());
            return Err(ResolutionError::Cycle {
                specifier: chain[0].clone(),
                from: from.to_path_buf(),
                chain: chain.clone(),
            }
            .into());
        }
        chain.push(specifier.to_string());

        let requested = chain[0].clone();
        let not_found = || ResolutionError::NotFound {
            specifier: requested.clone(),
            from: from.to_path_buf(),
        };

        if is_path_specifier(specifier) {
            let base = if Path::new(specifier).is_absolute() {
                PathBuf::from(specifier)
            } else {
                from.parent().unwrap_or(Path::new("/")).join(specifier)
            };
            return match self.resolve_path(&normalize_path(&base))? {
                Some(path) => Ok(Resolution::File(path)),
                None => Err(not_found().into()),
            };
        }

        if self.config.is_external(specifier) {
            return Ok(Resolution::External(specifier.to_string()));
        }

        if let Some(target) = self.aliases.resolve(specifier) {
            return match target {
                AliasTarget::Path(path) => match self.resolve_path(&normalize_path(&path))? {
                    Some(path) => Ok(Resolution::File(path)),
                    None => Err(not_found().into()),
                },
                AliasTarget::Specifier(next) => self.resolve_inner(&next, from, chain),
            };
        }

        let project = self.projects.for_file(from)?;
        for candidate in project.path_candidates(specifier) {
            if let Some(path) = self.resolve_path(&normalize_path(&candidate))? {
                return Ok(Resolution::File(path));
            }
        }
        if let Some(base_url) = &project.base_url {
            if let Some(path) = self.resolve_path(&normalize_path(&base_url.join(specifier)))? {
                return Ok(Resolution::File(path));
            }
        }

        match self.resolve_package(specifier, from)? {
            Some(path) => Ok(Resolution::File(path)),
            None => Err(not_found().into()),
        }
    }

    /// File, then directory
    fn resolve_path(&self, path: &Path) -> Result<Option<PathBuf>> {
        if let Some(file) = self.resolve_file(path) {
            return Ok(Some(file));
        }
        if path.is_dir() {
            return self.resolve_directory(path);
        }
        Ok(None)
    }

    /// Literal file, then each configured extension appended, then `.js` → `.ts` swap
    fn resolve_file(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }

        for ext in &self.config.extensions {
            let candidate = append_extension(path, ext);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        let swaps: &[&str] = match path.extension().and_then(|ext| ext.to_str()) {
            Some("js") => &["ts", "tsx"],
            Some("jsx") => &["tsx"],
            Some("mjs") => &["mts"],
            Some("cjs") => &["cts"],
            _ => &[],
        };
        swaps
            .iter()
            .map(|ext| path.with_extension(ext))
            .find(|candidate| candidate.is_file())
    }

    fn resolve_directory(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let manifest_path = dir.join("package.json");
        if manifest_path.is_file() {
            let manifest = self.read_manifest(&manifest_path)?;
            for field in manifest.entry_fields() {
                let entry = normalize_path(&dir.join(field));
                // Entries never recurse into another manifest
                if let Some(file) = self.resolve_file(&entry).or_else(|| self.resolve_index(&entry)) {
                    return Ok(Some(file));
                }
            }
        }
        Ok(self.resolve_index(dir))
    }

    fn resolve_index(&self, dir: &Path) -> Option<PathBuf> {
        self.config
            .extensions
            .iter()
            .map(|ext| dir.join(format!("index{}", ext)))
            .find(|candidate| candidate.is_file())
    }

    /// Search ancestor `node_modules` directories for the package
    fn resolve_package(&self, specifier: &str, from: &Path) -> Result<Option<PathBuf>> {
        let (package_name, subpath) = parse_package_specifier(specifier);
        let start = from.parent().unwrap_or(Path::new("/"));

        for ancestor in start.ancestors() {
            if ancestor.file_name().is_some_and(|name| name == "node_modules") {
                continue;
            }
            let package_dir = ancestor.join("node_modules").join(package_name);
            if !package_dir.is_dir() {
                continue;
            }

            let resolved = match subpath {
                Some(subpath) => self.resolve_path(&package_dir.join(subpath))?,
                None => self.resolve_directory(&package_dir)?,
            };
            if resolved.is_some() {
                Logger::debug(&format!("📦 {} → {}", specifier, package_dir.display()));
                return Ok(resolved);
            }
        }

        Ok(None)
    }

    fn read_manifest(&self, path: &Path) -> Result<Arc<PackageManifest>> {
        if let Some(cached) = self.manifests.get(path) {
            return Ok(cached.clone());
        }

        let invalid = |message: String| ResolutionError::InvalidManifest {
            path: path.to_path_buf(),
            message,
        };
        let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let manifest: PackageManifest =
            serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;

        let manifest = Arc::new(manifest);
        self.manifests.insert(path.to_path_buf(), manifest.clone());
        Ok(manifest)
    }
}

/// Run-scoped memo of successful resolutions keyed by `(specifier, from, fingerprint)`
#[derive(Default)]
pub struct ResolutionCache {
    entries: DashMap<(String, PathBuf, String), Resolution>,
    hits: AtomicUsize,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, resolver: &Resolver, specifier: &str, from: &Path) -> Result<Resolution> {
        let key = (
            specifier.to_string(),
            from.to_path_buf(),
            resolver.fingerprint().to_string(),
        );
        if let Some(hit) = self.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit.clone());
        }

        let resolution = resolver.resolve(specifier, from)?;
        self.entries.insert(key, resolution.clone());
        Ok(resolution)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }
}

pub fn is_path_specifier(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier == "."
        || specifier == ".."
        || Path::new(specifier).is_absolute()
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(ext);
    PathBuf::from(os)
}

/// Split `@scope/name/sub/path` into package name and optional subpath
fn parse_package_specifier(specifier: &str) -> (&str, Option<&str>) {
    let name_end = if specifier.starts_with('@') {
        specifier
            .match_indices('/')
            .nth(1)
            .map(|(pos, _)| pos)
    } else {
        specifier.find('/')
    };

    match name_end {
        Some(pos) => (&specifier[..pos], Some(&specifier[pos + 1..])),
        None => (specifier, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::BundlerError;
    use tempfile::{tempdir, TempDir};

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    fn resolver_for(dir: &TempDir, configure: impl FnOnce(&mut BuildConfig)) -> Resolver {
        let mut config = BuildConfig::new(dir.path());
        configure(&mut config);
        Resolver::new(Arc::new(config), Arc::new(ProjectConfigLoader::new()))
    }

    fn file(resolution: Resolution) -> PathBuf {
        match resolution {
            Resolution::File(path) => path,
            other => panic!("expected file, got {:?}", other),
        }
    }

    #[test]
    fn test_relative_with_extension_order() {
        let dir = tempdir().unwrap();
        let from = write(dir.path(), "src/index.ts", "");
        let ts = write(dir.path(), "src/util.ts", "");
        write(dir.path(), "src/util.js", "");

        let resolver = resolver_for(&dir, |_| {});
        assert_eq!(file(resolver.resolve("./util", &from).unwrap()), ts);
    }

    #[test]
    fn test_literal_file_wins_and_js_maps_to_ts() {
        let dir = tempdir().unwrap();
        let from = write(dir.path(), "index.ts", "");
        let json = write(dir.path(), "data.json", "{}");
        let ts = write(dir.path(), "lib.ts", "");

        let resolver = resolver_for(&dir, |_| {});
        assert_eq!(file(resolver.resolve("./data.json", &from).unwrap()), json);
        assert_eq!(file(resolver.resolve("./lib.js", &from).unwrap()), ts);
    }

    #[test]
    fn test_extension_is_appended_not_replaced() {
        let dir = tempdir().unwrap();
        let from = write(dir.path(), "index.ts", "");
        let config = write(dir.path(), "app.config.ts", "");

        let resolver = resolver_for(&dir, |_| {});
        assert_eq!(file(resolver.resolve("./app.config", &from).unwrap()), config);
    }

    #[test]
    fn test_directory_index_and_manifest() {
        let dir = tempdir().unwrap();
        let from = write(dir.path(), "index.ts", "");
        let index = write(dir.path(), "components/index.tsx", "");
        write(dir.path(), "lib/package.json", r#"{"main": "./main.js", "module": "./esm"}"#);
        let esm = write(dir.path(), "lib/esm/index.js", "");

        let resolver = resolver_for(&dir, |_| {});
        assert_eq!(file(resolver.resolve("./components", &from).unwrap()), index);
        assert_eq!(file(resolver.resolve("./lib", &from).unwrap()), esm);
    }

    #[test]
    fn test_node_modules_priority_and_scopes() {
        let dir = tempdir().unwrap();
        let from = write(dir.path(), "src/app/index.ts", "");
        write(
            dir.path(),
            "node_modules/pkg/package.json",
            r#"{"name": "pkg", "main": "main.js", "browser": "browser.js"}"#,
        );
        write(dir.path(), "node_modules/pkg/main.js", "");
        let browser = write(dir.path(), "node_modules/pkg/browser.js", "");
        let sub = write(dir.path(), "node_modules/pkg/lib/sub.js", "");
        let scoped = write(dir.path(), "node_modules/@scope/tool/index.js", "");

        let resolver = resolver_for(&dir, |_| {});
        assert_eq!(file(resolver.resolve("pkg", &from).unwrap()), browser);
        assert_eq!(file(resolver.resolve("pkg/lib/sub", &from).unwrap()), sub);
        assert_eq!(file(resolver.resolve("@scope/tool", &from).unwrap()), scoped);
    }

    #[test]
    fn test_tsconfig_paths_and_base_url() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "tsconfig.json",
            r#"{"compilerOptions": {"baseUrl": "./src", "paths": {"~/*": ["shared/*"]}}}"#,
        );
        let from = write(dir.path(), "src/index.ts", "");
        let shared = write(dir.path(), "src/shared/math.ts", "");
        let direct = write(dir.path(), "src/utils/strings.ts", "");

        let resolver = resolver_for(&dir, |_| {});
        assert_eq!(file(resolver.resolve("~/math", &from).unwrap()), shared);
        assert_eq!(file(resolver.resolve("utils/strings", &from).unwrap()), direct);
    }

    #[test]
    fn test_aliases_externals_and_cycles() {
        let dir = tempdir().unwrap();
        let from = write(dir.path(), "index.ts", "");
        let target = write(dir.path(), "src/button.tsx", "");

        let resolver = resolver_for(&dir, |config| {
            config.alias.insert("@".into(), "./src".into());
            config.alias.insert("ping".into(), "pong".into());
            config.alias.insert("pong".into(), "ping".into());
            config.external.push("fs".into());
        });

        assert_eq!(file(resolver.resolve("@/button", &from).unwrap()), target);
        assert_eq!(
            resolver.resolve("fs", &from).unwrap(),
            Resolution::External("fs".into())
        );
        assert!(matches!(
            resolver.resolve("ping", &from),
            Err(BundlerError::Resolution(ResolutionError::Cycle { .. }))
        ));
    }

    #[test]
    fn test_not_found() {
        let dir = tempdir().unwrap();
        let from = write(dir.path(), "index.ts", "");

        let resolver = resolver_for(&dir, |_| {});
        match resolver.resolve("./missing", &from) {
            Err(BundlerError::Resolution(ResolutionError::NotFound { specifier, .. })) => {
                assert_eq!(specifier, "./missing");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(resolver.resolve("left-pad", &from).is_err());
    }

    #[test]
    fn test_resolution_cache_memoizes() {
        let dir = tempdir().unwrap();
        let from = write(dir.path(), "index.ts", "");
        write(dir.path(), "a.ts", "");

        let resolver = resolver_for(&dir, |_| {});
        let cache = ResolutionCache::new();
        let first = cache.resolve(&resolver, "./a", &from).unwrap();
        let second = cache.resolve(&resolver, "./a", &from).unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn test_parse_package_specifier() {
        assert_eq!(parse_package_specifier("react"), ("react", None));
        assert_eq!(parse_package_specifier("react/jsx"), ("react", Some("jsx")));
        assert_eq!(parse_package_specifier("@babel/core"), ("@babel/core", None));
        assert_eq!(
            parse_package_specifier("@babel/core/lib/x"),
            ("@babel/core", Some("lib/x"))
        );
    }
}
