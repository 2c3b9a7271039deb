//! Asset graph: arena storage plus the concurrent builder that fills it.
//!
//! Assets live in a `Vec` and edges are `AssetIdx` values, so dependency cycles
//! need no reference counting. The builder runs resolution and transformation as
//! tokio tasks bounded by a semaphore; a single coordinator owns the graph and is
//! the only writer, coalescing concurrent requests for the same asset id.

use crate::core::config::BuildConfig;
use crate::core::interfaces::{FileSystemService, TransformContext};
use crate::core::models::{
    Asset, AssetId, AssetIdx, AssetVariant, Dependency, DependencyKind, TransformedAsset,
};
use crate::infrastructure::processors::{TransformerRegistry, TypeTag};
use crate::infrastructure::{ProjectConfigLoader, Resolution, ResolutionCache, Resolver, TokioFileSystemService};
use crate::utils::{AssetError, BuildError, BundlerError, Logger, Result, Timer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Prefix forcing a reference-only dependency on the raw file
pub const URL_PREFIX: &str = "url:";

/// All assets of one run; immutable once the builder returns it
#[derive(Debug, Default)]
pub struct AssetGraph {
    assets: Vec<Asset>,
    index: HashMap<AssetId, AssetIdx>,
    entries: Vec<AssetIdx>,
    errors: Vec<AssetError>,
}

impl AssetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an asset, returning the existing index when the id is already present
    pub fn insert(&mut self, asset: Asset) -> AssetIdx {
        if let Some(idx) = self.index.get(&asset.id) {
            return *idx;
        }
        let idx = AssetIdx(self.assets.len());
        self.index.insert(asset.id.clone(), idx);
        self.assets.push(asset);
        idx
    }

    pub fn get(&self, idx: AssetIdx) -> &Asset {
        &self.assets[idx.0]
    }

    pub fn find(&self, id: &AssetId) -> Option<AssetIdx> {
        self.index.get(id).copied()
    }

    pub fn find_by_path(&self, path: &Path) -> Option<AssetIdx> {
        self.assets
            .iter()
            .position(|asset| asset.file_path == path)
            .map(AssetIdx)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AssetIdx, &Asset)> {
        self.assets.iter().enumerate().map(|(i, asset)| (AssetIdx(i), asset))
    }

    pub fn entries(&self) -> &[AssetIdx] {
        &self.entries
    }

    /// Asset failures tolerated by the run
    pub fn errors(&self) -> &[AssetError] {
        &self.errors
    }

    /// Resolved edges of `idx` in declaration order
    pub fn edges(&self, idx: AssetIdx) -> impl Iterator<Item = (&Dependency, AssetIdx)> {
        self.get(idx)
            .dependencies
            .iter()
            .filter_map(|dep| dep.resolved.map(|target| (dep, target)))
    }

    fn add_entry(&mut self, idx: AssetIdx) {
        if !self.entries.contains(&idx) {
            self.entries.push(idx);
        }
    }

    /// Point a dependency at its target; raw targets are always reference-only
    fn link(&mut self, from: AssetIdx, dep: usize, to: AssetIdx) {
        let raw = self.get(to).variant == AssetVariant::Raw;
        if let Some(dependency) = self.assets[from.0].dependencies.get_mut(dep) {
            dependency.resolved = Some(to);
            if raw {
                dependency.kind = DependencyKind::Url;
            }
        }
    }
}

/// Shared switch that stops a running build
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where a resolved request is attached
#[derive(Debug, Clone, Copy)]
enum Origin {
    /// Position in the entry list
    Entry(usize),
    Dependency(AssetIdx, usize),
}

enum Event {
    Resolved {
        origin: Origin,
        specifier: String,
        outcome: Result<Option<(PathBuf, AssetVariant)>>,
    },
    Transformed {
        id: AssetId,
        path: PathBuf,
        variant: AssetVariant,
        outcome: Result<(TransformedAsset, &'static str)>,
    },
}

pub struct AssetGraphBuilder {
    config: Arc<BuildConfig>,
    root: PathBuf,
    resolver: Arc<Resolver>,
    cache: Arc<ResolutionCache>,
    projects: Arc<ProjectConfigLoader>,
    registry: Arc<TransformerRegistry>,
    fs: Arc<dyn FileSystemService>,
    permits: Arc<Semaphore>,
    cancel: CancellationFlag,
}

impl AssetGraphBuilder {
    pub fn new(config: Arc<BuildConfig>, registry: Arc<TransformerRegistry>) -> Self {
        let projects = Arc::new(ProjectConfigLoader::new());
        Self {
            root: config.absolute_root(),
            resolver: Arc::new(Resolver::new(config.clone(), projects.clone())),
            cache: Arc::new(ResolutionCache::new()),
            permits: Arc::new(Semaphore::new(config.concurrency.max(1))),
            projects,
            registry,
            fs: Arc::new(TokioFileSystemService),
            cancel: CancellationFlag::new(),
            config,
        }
    }

    pub fn with_file_system(mut self, fs: Arc<dyn FileSystemService>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn resolution_cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Expand `entries` until every dependency is resolved, built or failed
    pub async fn build(&self, entries: &[String]) -> Result<AssetGraph> {
        let _timer = Timer::start("Building asset graph");

        // Malformed project configuration must surface before any transform
        self.projects.for_dir(&self.root)?;

        let mut run = Run {
            builder: self,
            graph: AssetGraph::new(),
            tasks: JoinSet::new(),
            in_flight: HashMap::new(),
            entry_ids: HashMap::new(),
            entry_positions: HashMap::new(),
            entries,
            errors: Vec::new(),
        };

        let from = self.root.join("index");
        for (position, entry) in entries.iter().enumerate() {
            let specifier = entry_specifier(&self.root, entry);
            run.spawn_resolve(Origin::Entry(position), from.clone(), specifier);
        }

        let result = run.drive().await;
        if result.is_err() {
            run.tasks.abort_all();
        }
        result?;

        let Run { mut graph, mut errors, entry_positions, .. } = run;
        graph
            .entries
            .sort_by_key(|idx| entry_positions.get(idx).copied().unwrap_or(usize::MAX));
        errors.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        if !errors.is_empty() && !self.config.tolerate_asset_errors {
            return Err(BuildError::Failed(errors).into());
        }
        for error in &errors {
            Logger::warn(&error.to_string());
        }
        graph.errors = errors;
        Ok(graph)
    }
}

/// Coordinator state for one `build` call
struct Run<'b> {
    builder: &'b AssetGraphBuilder,
    graph: AssetGraph,
    tasks: JoinSet<Event>,
    /// Ids being transformed, with the dependencies waiting on them
    in_flight: HashMap<AssetId, Vec<Origin>>,
    /// Entry as given on the command line, for each entry id
    entry_ids: HashMap<AssetId, String>,
    entry_positions: HashMap<AssetIdx, usize>,
    entries: &'b [String],
    errors: Vec<AssetError>,
}

impl Run<'_> {
    async fn drive(&mut self) -> Result<()> {
        while let Some(joined) = self.tasks.join_next().await {
            if self.builder.cancel.is_cancelled() {
                return Err(BuildError::Cancelled.into());
            }

            match joined? {
                Event::Resolved { origin, specifier, outcome } => {
                    self.on_resolved(origin, specifier, outcome)?
                }
                Event::Transformed { id, path, variant, outcome } => {
                    self.on_transformed(id, path, variant, outcome)?
                }
            }
        }

        if self.builder.cancel.is_cancelled() {
            return Err(BuildError::Cancelled.into());
        }
        Ok(())
    }

    fn on_resolved(
        &mut self,
        origin: Origin,
        specifier: String,
        outcome: Result<Option<(PathBuf, AssetVariant)>>,
    ) -> Result<()> {
        let (path, variant) = match outcome {
            Ok(Some(target)) => target,
            // Externals stay unresolved and load through the host `require`
            Ok(None) => return Ok(()),
            Err(error) => {
                return match origin {
                    Origin::Entry(position) => Err(BuildError::Entry {
                        entry: self.entries.get(position).cloned().unwrap_or(specifier),
                        cause: Box::new(error),
                    }
                    .into()),
                    Origin::Dependency(importer, _) => {
                        let asset = self.graph.get(importer);
                        let (file_path, asset_id) = (asset.file_path.clone(), asset.id.to_string());
                        self.fail(file_path, Some(asset_id), error)
                    }
                };
            }
        };

        let id = AssetId::derive(&self.builder.root, &path, variant);
        if let Some(idx) = self.graph.find(&id) {
            self.attach(origin, idx);
            return Ok(());
        }
        if let Origin::Entry(position) = origin {
            let entry = self.entries.get(position).cloned().unwrap_or(specifier);
            self.entry_ids.insert(id.clone(), entry);
        }
        if let Some(waiters) = self.in_flight.get_mut(&id) {
            waiters.push(origin);
            return Ok(());
        }

        if self.graph.len() + self.in_flight.len() >= self.builder.config.max_assets {
            return Err(BuildError::ResourceLimit(format!(
                "more than {} assets reachable from the entries",
                self.builder.config.max_assets
            ))
            .into());
        }
        self.in_flight.insert(id.clone(), vec![origin]);
        self.spawn_transform(id, path, variant);
        Ok(())
    }

    fn on_transformed(
        &mut self,
        id: AssetId,
        path: PathBuf,
        variant: AssetVariant,
        outcome: Result<(TransformedAsset, &'static str)>,
    ) -> Result<()> {
        let waiters = self.in_flight.remove(&id).unwrap_or_default();
        let (transformed, transformer) = match outcome {
            Ok(done) => done,
            Err(error) => {
                if let Some(entry) = self.entry_ids.get(&id) {
                    return Err(BuildError::Entry {
                        entry: entry.clone(),
                        cause: Box::new(error),
                    }
                    .into());
                }
                Logger::asset_failed(&path.display().to_string(), &error.to_string());
                return self.fail(path, Some(id.to_string()), error);
            }
        };
        Logger::asset_transformed(&self.display_path(&path), transformer);

        let requests = transformed.dependencies.clone();
        let idx = self.graph.insert(Asset {
            id,
            file_path: path.clone(),
            kind: transformed.kind,
            variant,
            content: transformed.content,
            dependencies: transformed
                .dependencies
                .into_iter()
                .map(|request| Dependency {
                    specifier: request.specifier,
                    kind: request.kind,
                    resolved: None,
                })
                .collect(),
            source_map: transformed.source_map,
        });

        for origin in waiters {
            self.attach(origin, idx);
        }
        for (dep, request) in requests.into_iter().enumerate() {
            self.spawn_resolve(Origin::Dependency(idx, dep), path.clone(), request.specifier);
        }
        Ok(())
    }

    fn attach(&mut self, origin: Origin, idx: AssetIdx) {
        match origin {
            Origin::Dependency(from, dep) => self.graph.link(from, dep, idx),
            Origin::Entry(position) => {
                self.entry_positions.entry(idx).or_insert(position);
                self.graph.add_entry(idx);
            }
        }
    }

    /// Record a non-entry failure; fatal errors end the run
    fn fail(&mut self, file_path: PathBuf, asset_id: Option<String>, error: BundlerError) -> Result<()> {
        if error.is_fatal() {
            return Err(error);
        }
        self.errors.push(AssetError {
            file_path,
            asset_id,
            cause: Box::new(error),
        });
        Ok(())
    }

    fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.builder.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    fn spawn_resolve(&mut self, origin: Origin, from: PathBuf, specifier: String) {
        if self.builder.cancel.is_cancelled() {
            return;
        }
        let resolver = self.builder.resolver.clone();
        let cache = self.builder.cache.clone();
        let permits = self.builder.permits.clone();

        self.tasks.spawn(async move {
            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => {
                    let spec = specifier.clone();
                    tokio::task::spawn_blocking(move || resolve_request(&resolver, &cache, &spec, &from))
                        .await
                        .map_err(BundlerError::from)
                        .and_then(|outcome| outcome)
                }
                Err(e) => Err(BuildError::Task(e.to_string()).into()),
            };
            Event::Resolved { origin, specifier, outcome }
        });
    }

    fn spawn_transform(&mut self, id: AssetId, path: PathBuf, variant: AssetVariant) {
        if self.builder.cancel.is_cancelled() {
            return;
        }
        let fs = self.builder.fs.clone();
        let projects = self.builder.projects.clone();
        let registry = self.builder.registry.clone();
        let config = self.builder.config.clone();
        let permits = self.builder.permits.clone();

        self.tasks.spawn(async move {
            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => match fs.read_bytes(&path).await {
                    Ok(bytes) => {
                        let file = path.clone();
                        tokio::task::spawn_blocking(move || {
                            transform_file(&registry, &projects, &config, &file, &bytes, variant)
                        })
                        .await
                        .map_err(BundlerError::from)
                        .and_then(|outcome| outcome)
                    }
                    Err(e) => Err(e),
                },
                Err(e) => Err(BuildError::Task(e.to_string()).into()),
            };
            Event::Transformed { id, path, variant, outcome }
        });
    }
}

/// Resolve one request; the `url:` prefix selects the raw variant
fn resolve_request(
    resolver: &Resolver,
    cache: &ResolutionCache,
    specifier: &str,
    from: &Path,
) -> Result<Option<(PathBuf, AssetVariant)>> {
    let (specifier, forced_raw) = match specifier.strip_prefix(URL_PREFIX) {
        Some(rest) => (rest, true),
        None => (specifier, false),
    };

    match cache.resolve(resolver, specifier, from)? {
        Resolution::External(_) => Ok(None),
        Resolution::File(path) => {
            let variant = if forced_raw {
                AssetVariant::Raw
            } else {
                TypeTag::from_path(&path).variant()
            };
            Ok(Some((path, variant)))
        }
    }
}

fn transform_file(
    registry: &TransformerRegistry,
    projects: &ProjectConfigLoader,
    config: &BuildConfig,
    path: &Path,
    bytes: &[u8],
    variant: AssetVariant,
) -> Result<(TransformedAsset, &'static str)> {
    let project = projects.for_file(path)?;
    let ctx = TransformContext {
        file_path: path,
        bytes,
        project: &project,
        config,
    };
    Ok(registry.transform(TypeTag::for_variant(path, variant), &ctx)?)
}

/// Entries are paths relative to the root unless already absolute
fn entry_specifier(root: &Path, entry: &str) -> String {
    if Path::new(entry).is_absolute() {
        entry.to_string()
    } else {
        root.join(entry).to_string_lossy().into_owned()
    }
}
