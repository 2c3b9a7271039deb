use crate::core::config::BuildConfig;
use crate::core::graph::AssetGraph;
use crate::core::models::{
    AssetIdx, AssetKind, Bundle, BundleId, BundleReport, BundleType, DependencyKind,
};
use crate::utils::hashing;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

/// Every bundle of a run, in creation order, plus lookups used by the packager
#[derive(Debug, Default)]
pub struct BundleSet {
    bundles: Vec<Bundle>,
    roots: Vec<BundleId>,
    async_bundles: HashMap<AssetIdx, BundleId>,
    raw_bundles: HashMap<AssetIdx, BundleId>,
    map_bundles: HashMap<BundleId, BundleId>,
}

impl BundleSet {
    pub fn get(&self, id: BundleId) -> &Bundle {
        &self.bundles[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bundle> {
        self.bundles.iter()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Top-level bundles, one per entry
    pub fn roots(&self) -> impl Iterator<Item = &Bundle> {
        self.roots.iter().map(|id| self.get(*id))
    }

    /// Child bundle loaded by `import()` of `asset`
    pub fn async_bundle(&self, asset: AssetIdx) -> Option<&Bundle> {
        self.async_bundles.get(&asset).map(|id| self.get(*id))
    }

    /// Standalone bundle holding the raw `asset`
    pub fn raw_bundle(&self, asset: AssetIdx) -> Option<&Bundle> {
        self.raw_bundles.get(&asset).map(|id| self.get(*id))
    }

    pub fn map_bundle(&self, script: BundleId) -> Option<&Bundle> {
        self.map_bundles.get(&script).map(|id| self.get(*id))
    }

    pub fn find(&self, name: &str) -> Option<&Bundle> {
        self.bundles.iter().find(|bundle| bundle.name == name)
    }

    /// Reported tree of bundles, rooted at the entry bundles
    pub fn report(&self, graph: &AssetGraph, root: &Path) -> Vec<BundleReport> {
        self.roots
            .iter()
            .map(|id| self.report_bundle(*id, graph, root, &mut Vec::new()))
            .collect()
    }

    fn report_bundle(
        &self,
        id: BundleId,
        graph: &AssetGraph,
        root: &Path,
        path: &mut Vec<BundleId>,
    ) -> BundleReport {
        let bundle = self.get(id);
        path.push(id);
        let child_bundles = bundle
            .child_bundles
            .iter()
            .filter(|child| !path.contains(child))
            .copied()
            .collect::<Vec<_>>()
            .into_iter()
            .map(|child| self.report_bundle(child, graph, root, path))
            .collect();
        path.pop();

        let relative = |idx: AssetIdx| {
            let file = &graph.get(idx).file_path;
            file.strip_prefix(root)
                .unwrap_or(file)
                .to_string_lossy()
                .replace('\\', "/")
        };

        BundleReport {
            name: bundle.name.clone(),
            bundle_type: bundle.bundle_type.to_string(),
            entry: Some(graph.get(bundle.entry).file_path.clone()),
            assets: bundle.assets.iter().map(|idx| relative(*idx)).collect(),
            child_bundles,
        }
    }

    fn push(&mut self, mut bundle: Bundle) -> BundleId {
        let id = BundleId(self.bundles.len());
        bundle.id = id;
        if let Some(parent) = bundle.parent {
            self.link_child(parent, id);
        }
        self.bundles.push(bundle);
        id
    }

    fn link_child(&mut self, parent: BundleId, child: BundleId) {
        let children = &mut self.bundles[parent.0].child_bundles;
        if !children.contains(&child) {
            children.push(child);
        }
    }
}

/// Partitions the finished graph into bundles
pub struct BundleSplitter<'a> {
    config: &'a BuildConfig,
}

impl<'a> BundleSplitter<'a> {
    pub fn new(config: &'a BuildConfig) -> Self {
        Self { config }
    }

    pub fn split(&self, graph: &AssetGraph) -> BundleSet {
        let mut set = BundleSet::default();
        let mut queue = VecDeque::new();
        let mut names = HashSet::new();

        for &entry in graph.entries() {
            let asset = graph.get(entry);
            let id = if asset.kind.is_executable() {
                let stem = asset.file_stem();
                let name = if names.insert(format!("{}.js", stem)) {
                    format!("{}.js", stem)
                } else {
                    format!("{}.{}.js", stem, hashing::short_hash(asset.id.as_str().as_bytes(), 8))
                };
                let id = set.push(script_bundle(entry, name, None));
                queue.push_back(id);
                id
            } else {
                self.raw_bundle(&mut set, graph, entry, None)
            };
            set.roots.push(id);
        }

        while let Some(id) = queue.pop_front() {
            let entry = set.get(id).entry;
            let assets = collect_sync(graph, entry);

            for &idx in &assets {
                for (dep, target) in graph.edges(idx) {
                    match dep.kind {
                        DependencyKind::Sync => {}
                        DependencyKind::Async => {
                            if let Some(child) = set.async_bundles.get(&target).copied() {
                                set.link_child(id, child);
                                continue;
                            }
                            let asset = graph.get(target);
                            let name = format!(
                                "{}.{}.js",
                                asset.file_stem(),
                                hashing::short_hash(asset.id.as_str().as_bytes(), 8)
                            );
                            let child = set.push(script_bundle(target, name, Some(id)));
                            set.async_bundles.insert(target, child);
                            queue.push_back(child);
                        }
                        DependencyKind::Url => {
                            match set.raw_bundles.get(&target).copied() {
                                Some(child) => set.link_child(id, child),
                                None => {
                                    self.raw_bundle(&mut set, graph, target, Some(id));
                                }
                            }
                        }
                    }
                }
            }
            set.bundles[id.0].assets = assets;

            if self.config.emit_source_maps() {
                let name = format!("{}.map", set.get(id).name);
                let map = set.push(Bundle {
                    id: BundleId(0),
                    entry,
                    bundle_type: BundleType::Map,
                    assets: Vec::new(),
                    child_bundles: Vec::new(),
                    parent: Some(id),
                    name,
                });
                set.map_bundles.insert(id, map);
            }
        }

        set
    }

    fn raw_bundle(
        &self,
        set: &mut BundleSet,
        graph: &AssetGraph,
        idx: AssetIdx,
        parent: Option<BundleId>,
    ) -> BundleId {
        let asset = graph.get(idx);
        let ext = asset.extension();
        let name = format!("{}.{}", hashing::content_hash(asset.content.as_bytes()), ext);
        let id = set.push(Bundle {
            id: BundleId(0),
            entry: idx,
            bundle_type: BundleType::Raw(ext),
            assets: vec![idx],
            child_bundles: Vec::new(),
            parent,
            name,
        });
        set.raw_bundles.insert(idx, id);
        id
    }
}

fn script_bundle(entry: AssetIdx, name: String, parent: Option<BundleId>) -> Bundle {
    Bundle {
        id: BundleId(0),
        entry,
        bundle_type: BundleType::Js,
        assets: Vec::new(),
        child_bundles: Vec::new(),
        parent,
        name,
    }
}

/// Executable assets reachable from `entry` through sync edges, depth-first pre-order
fn collect_sync(graph: &AssetGraph, entry: AssetIdx) -> Vec<AssetIdx> {
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![entry];

    while let Some(idx) = stack.pop() {
        if !seen.insert(idx) || graph.get(idx).kind == AssetKind::Raw {
            continue;
        }
        order.push(idx);

        let children: Vec<AssetIdx> = graph
            .edges(idx)
            .filter(|(dep, _)| dep.kind == DependencyKind::Sync)
            .map(|(_, target)| target)
            .collect();
        stack.extend(children.into_iter().rev());
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::AssetGraphBuilder;
    use crate::infrastructure::processors::TransformerRegistry;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn split(files: &[(&str, &str)], production: bool) -> (TempDir, AssetGraph, BundleSet) {
        let dir = TempDir::new().unwrap();
        for (name, contents) in files {
            fs::write(dir.path().join(name), contents).unwrap();
        }
        let mut config = BuildConfig::new(dir.path());
        config.production = production;

        let graph = AssetGraphBuilder::new(Arc::new(config.clone()), Arc::new(TransformerRegistry::with_defaults()))
            .build(&["index.ts".to_string()])
            .await
            .unwrap();
        let set = BundleSplitter::new(&config).split(&graph);
        (dir, graph, set)
    }

    #[tokio::test]
    async fn test_sync_dependencies_are_inlined_once() {
        let (dir, graph, set) = split(
            &[
                ("index.ts", "import { a } from './a';\nimport { b } from './b';\nexport const sum = a + b;\n"),
                ("a.ts", "import { one } from './shared';\nexport const a = one;\n"),
                ("b.ts", "import { one } from './shared';\nexport const b = one + 1;\n"),
                ("shared.ts", "export const one = 1;\n"),
            ],
            false,
        )
        .await;

        assert_eq!(set.len(), 1);
        let reports = set.report(&graph, dir.path());
        assert_eq!(reports[0].name, "index.js");
        assert_eq!(reports[0].bundle_type, "js");
        assert_eq!(reports[0].assets, vec!["index.ts", "a.ts", "shared.ts", "b.ts"]);
        assert!(reports[0].child_bundles.is_empty());
    }

    #[tokio::test]
    async fn test_async_import_creates_child_bundle() {
        let (dir, graph, set) = split(
            &[
                ("index.ts", "import { util } from './util';\nexport const load = () => import('./lazy');\nexport { util };\n"),
                ("lazy.ts", "import { util } from './util';\nexport const value = util + 1;\n"),
                ("util.ts", "export const util = 1;\n"),
            ],
            false,
        )
        .await;

        let reports = set.report(&graph, dir.path());
        let root = &reports[0];
        assert_eq!(root.assets, vec!["index.ts", "util.ts"]);
        assert_eq!(root.child_bundles.len(), 1);

        let child = &root.child_bundles[0];
        assert!(child.name.starts_with("lazy.") && child.name.ends_with(".js"));
        // Shared sync dependency is duplicated into the async bundle
        assert_eq!(child.assets, vec!["lazy.ts", "util.ts"]);
        assert!(set.find(&child.name).unwrap().parent.is_some());
    }

    #[tokio::test]
    async fn test_url_dependency_is_standalone_raw_bundle() {
        let (dir, graph, set) = split(
            &[
                ("index.ts", "export const file = require('./test.txt');\n"),
                ("test.txt", "hello"),
            ],
            false,
        )
        .await;

        let reports = set.report(&graph, dir.path());
        let root = &reports[0];
        assert_eq!(root.assets, vec!["index.ts"]);
        assert_eq!(root.child_bundles.len(), 1);

        let raw = &root.child_bundles[0];
        assert_eq!(raw.bundle_type, "txt");
        assert_eq!(raw.assets, vec!["test.txt"]);
        assert_eq!(raw.name, format!("{}.txt", hashing::content_hash(b"hello")));
    }

    #[tokio::test]
    async fn test_production_attaches_map_bundle() {
        let (_dir, _graph, set) = split(&[("index.ts", "export const x: number = 1;\n")], true).await;

        let root = set.roots().next().unwrap();
        let map = set.map_bundle(root.id).unwrap();
        assert_eq!(map.bundle_type, BundleType::Map);
        assert_eq!(map.name, "index.js.map");
        assert!(root.child_bundles.contains(&map.id));
    }

    #[tokio::test]
    async fn test_async_cycle_report_terminates() {
        let (dir, graph, set) = split(
            &[
                ("index.ts", "export const a = () => import('./b');\n"),
                ("b.ts", "export const b = () => import('./c');\n"),
                ("c.ts", "export const c = () => import('./b');\n"),
            ],
            false,
        )
        .await;

        let reports = set.report(&graph, dir.path());
        let b = &reports[0].child_bundles[0];
        let c = &b.child_bundles[0];
        assert!(c.child_bundles.is_empty());
        assert_eq!(set.len(), 3);
    }
}
