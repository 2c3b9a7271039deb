//! Serializes bundles into output files.
//!
//! A script bundle is one IIFE holding the interop helpers, the module loader and
//! a registry of module factories keyed by asset id:
//!
//! ```text
//! (function (registryName, globalName) {
//!   <helpers> <loader>
//!   boot({ "<id>": [function (require, module, exports) { ... }, {sync}, {async}] }, ["<entry>"]);
//! })("__typack_<fingerprint>", null);
//! ```
//!
//! Sync tables map a specifier to a module id, or to `{url}` for raw files;
//! async tables map a specifier to `[bundleUrl, id]`.

use crate::core::config::BuildConfig;
use crate::core::graph::AssetGraph;
use crate::core::models::{
    AssetIdx, Bundle, BundleType, DependencyKind, ModuleSourceMap, OutputArtifact,
};
use crate::core::splitter::BundleSet;
use crate::infrastructure::processors::common::js_string;
use crate::infrastructure::processors::minifier::Optimizer;
use crate::utils::{BundlerError, Logger, Result, Timer};
use serde_json::{json, Map, Value};
use sourcemap::{SourceMap, SourceMapBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const HELPERS: &str = include_str!("runtime/helpers.js");
const LOADER: &str = include_str!("runtime/loader.js");

/// Where a sync specifier points at runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepTarget {
    Module(String),
    Url(String),
}

/// One registry entry, ready to be rendered
#[derive(Debug, Clone)]
pub struct PackagedModule {
    pub id: String,
    /// Root-relative source path, used as the source map `sources` entry
    pub source_name: String,
    pub code: String,
    pub sync_deps: BTreeMap<String, DepTarget>,
    /// specifier → (child bundle URL, module id)
    pub async_deps: BTreeMap<String, (String, String)>,
    pub source_map: Option<ModuleSourceMap>,
}

#[derive(Debug)]
pub struct RenderedBundle {
    pub code: String,
    pub map: Option<SourceMap>,
}

pub struct Packager<'a> {
    graph: &'a AssetGraph,
    bundles: &'a BundleSet,
    config: &'a BuildConfig,
    root: PathBuf,
    optimizer: Option<Optimizer>,
}

impl<'a> Packager<'a> {
    pub fn new(graph: &'a AssetGraph, bundles: &'a BundleSet, config: &'a BuildConfig) -> Self {
        Self {
            graph,
            bundles,
            config,
            root: config.absolute_root(),
            optimizer: config
                .should_minify()
                .then(|| Optimizer::new(config.emit_source_maps())),
        }
    }

    /// Render every bundle in memory; nothing touches the disk here
    pub fn package_all(&self) -> Result<Vec<OutputArtifact>> {
        let _timer = Timer::start("Packaging bundles");
        let mut artifacts = Vec::new();
        for bundle in self.bundles.iter() {
            artifacts.extend(self.package(bundle)?);
        }
        Ok(artifacts)
    }

    /// Artifacts of one bundle; a script bundle also yields its map bundle
    pub fn package(&self, bundle: &Bundle) -> Result<Vec<OutputArtifact>> {
        match &bundle.bundle_type {
            BundleType::Js => self.package_script(bundle),
            BundleType::Raw(_) => Ok(vec![OutputArtifact {
                bundle: bundle.id,
                path: self.output_path(&bundle.name),
                contents: self.graph.get(bundle.entry).content.as_bytes().to_vec(),
            }]),
            // Rendered together with the script it describes
            BundleType::Map => Ok(Vec::new()),
        }
    }

    fn package_script(&self, bundle: &Bundle) -> Result<Vec<OutputArtifact>> {
        let entry_id = self.graph.get(bundle.entry).id.to_string();
        let mut modules = self.modules(bundle);
        if let Some(optimizer) = &self.optimizer {
            modules = optimizer.optimize_modules(modules, &entry_id)?;
        }

        let mut rendered = self.render(bundle, &modules)?;
        if let Some(optimizer) = &self.optimizer {
            rendered = optimizer.minify_bundle(rendered, &bundle.name)?;
        }

        let mut artifacts = Vec::new();
        let mut code = rendered.code;
        if let (Some(map_bundle), Some(map)) = (self.bundles.map_bundle(bundle.id), rendered.map) {
            if !code.ends_with('\n') {
                code.push('\n');
            }
            code.push_str(&format!("//# sourceMappingURL={}\n", map_bundle.name));

            let mut contents = Vec::new();
            map.to_writer(&mut contents)
                .map_err(|e| BundlerError::source_map(e.to_string()))?;
            artifacts.push(OutputArtifact {
                bundle: map_bundle.id,
                path: self.output_path(&map_bundle.name),
                contents,
            });
        }

        artifacts.insert(
            0,
            OutputArtifact {
                bundle: bundle.id,
                path: self.output_path(&bundle.name),
                contents: code.into_bytes(),
            },
        );
        Ok(artifacts)
    }

    /// Registry entries of a script bundle in bundle order
    pub fn modules(&self, bundle: &Bundle) -> Vec<PackagedModule> {
        bundle
            .assets
            .iter()
            .filter_map(|idx| self.module(*idx))
            .collect()
    }

    fn module(&self, idx: AssetIdx) -> Option<PackagedModule> {
        let asset = self.graph.get(idx);
        let code = asset.content.as_code()?;

        let mut sync_deps = BTreeMap::new();
        let mut async_deps = BTreeMap::new();
        for (dep, target) in self.graph.edges(idx) {
            let target_id = self.graph.get(target).id.to_string();
            match dep.kind {
                DependencyKind::Sync => {
                    sync_deps.insert(dep.specifier.clone(), DepTarget::Module(target_id));
                }
                DependencyKind::Async => {
                    if let Some(child) = self.bundles.async_bundle(target) {
                        let url = self.config.public_path(&child.name);
                        async_deps.insert(dep.specifier.clone(), (url, target_id));
                    }
                }
                DependencyKind::Url => {
                    if let Some(raw) = self.bundles.raw_bundle(target) {
                        let url = self.config.public_path(&raw.name);
                        sync_deps.insert(dep.specifier.clone(), DepTarget::Url(url));
                    }
                }
            }
        }

        Some(PackagedModule {
            id: asset.id.to_string(),
            source_name: source_name(&self.root, &asset.file_path),
            code: code.to_string(),
            sync_deps,
            async_deps,
            source_map: asset.source_map.clone(),
        })
    }

    fn render(&self, bundle: &Bundle, modules: &[PackagedModule]) -> Result<RenderedBundle> {
        let mut out = LineWriter::default();
        out.push("(function (registryName, globalName) {\n");
        out.push(HELPERS);
        out.push(LOADER);
        out.push("boot({\n");

        let mut map = self
            .config
            .emit_source_maps()
            .then(|| SourceMapBuilder::new(Some(&bundle.name)));

        for (i, module) in modules.iter().enumerate() {
            out.push(&format!("{}: [function (require, module, exports) {{\n", js_string(&module.id)));

            if let (Some(builder), Some(module_map)) = (map.as_mut(), &module.source_map) {
                let source = builder.add_source(&module.source_name);
                builder.set_source_contents(source, Some(&module_map.source_contents));
                for m in &module_map.mappings {
                    builder.add_raw(out.line + m.gen_line, m.gen_col, m.src_line, m.src_col, Some(source), None, false);
                }
            }

            out.push(&module.code);
            if !module.code.ends_with('\n') {
                out.push("\n");
            }
            out.push(&format!(
                "}}, {}, {}]{}\n",
                sync_table(&module.sync_deps),
                async_table(&module.async_deps),
                if i + 1 < modules.len() { "," } else { "" }
            ));
        }

        let entries = if bundle.parent.is_none() {
            format!("[{}]", js_string(&self.graph.get(bundle.entry).id.to_string()))
        } else {
            "[]".to_string()
        };
        out.push(&format!("}}, {});\n", entries));

        let global_name = match &self.config.global_name {
            Some(name) => js_string(name),
            None => "null".to_string(),
        };
        out.push(&format!("}})({}, {});\n", js_string(&self.registry_name()), global_name));

        Logger::debug(&format!("📦 Rendered {} ({} modules)", bundle.name, modules.len()));
        Ok(RenderedBundle {
            code: out.text,
            map: map.map(SourceMapBuilder::into_sourcemap),
        })
    }

    /// Global registry shared by the bundles of one output configuration
    fn registry_name(&self) -> String {
        let fingerprint: String = self.config.output_fingerprint().chars().take(8).collect();
        format!("__typack_{}", fingerprint)
    }

    fn output_path(&self, name: &str) -> PathBuf {
        self.config.out_dir_path().join(name)
    }
}

/// Appends text while counting lines
#[derive(Default)]
struct LineWriter {
    text: String,
    line: u32,
}

impl LineWriter {
    fn push(&mut self, text: &str) {
        self.line += text.matches('\n').count() as u32;
        self.text.push_str(text);
    }
}

fn sync_table(deps: &BTreeMap<String, DepTarget>) -> String {
    let table: Map<String, Value> = deps
        .iter()
        .map(|(specifier, target)| {
            let value = match target {
                DepTarget::Module(id) => Value::String(id.clone()),
                DepTarget::Url(url) => json!({ "url": url }),
            };
            (specifier.clone(), value)
        })
        .collect();
    Value::Object(table).to_string()
}

fn async_table(deps: &BTreeMap<String, (String, String)>) -> String {
    let table: Map<String, Value> = deps
        .iter()
        .map(|(specifier, (url, id))| (specifier.clone(), json!([url, id])))
        .collect();
    Value::Object(table).to_string()
}

fn source_name(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/")
}
