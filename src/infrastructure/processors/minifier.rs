use crate::core::models::{LineMapping, ModuleSourceMap};
use crate::infrastructure::packager::{PackagedModule, RenderedBundle};
use crate::infrastructure::processors::common::describe_diagnostics;
use crate::utils::{BundlerError, Logger, Result, TransformError};
use oxc_allocator::Allocator;
use crate::infrastructure::processors::module_lowering::argument_string;
use oxc_ast::ast::{CallExpression, Expression};
use oxc_ast_visit::{walk, Visit};
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_semantic::{Scoping, SemanticBuilder};
use oxc_span::SourceType;
use rayon::prelude::*;
use sourcemap::{SourceMap, SourceMapBuilder};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

/// JavaScript minification using oxc
pub struct OxcMinifier {
    options: MinifierOptions,
}

pub struct MinifiedCode {
    pub code: String,
    /// Minified positions mapped back to the input text
    pub map: Option<SourceMap>,
}

impl OxcMinifier {
    pub fn new() -> Self {
        Self::with_top_level(false)
    }

    /// Also mangle top-level bindings; used for module bodies that run inside a factory
    pub fn with_top_level(top_level: bool) -> Self {
        Self {
            options: MinifierOptions {
                mangle: Some(MangleOptions {
                    top_level,
                    ..MangleOptions::default()
                }),
                compress: Some(CompressOptions::default()),
            },
        }
    }

    /// Minify a script; `filename` only labels errors and the map
    pub fn minify(&self, source_code: &str, filename: &str, with_map: bool) -> Result<MinifiedCode> {
        let allocator = Allocator::default();
        let parse_result = Parser::new(&allocator, source_code, SourceType::cjs()).parse();

        if parse_result.panicked || !parse_result.errors.is_empty() {
            return Err(TransformError::new(filename, describe_diagnostics(&parse_result.errors)).into());
        }

        let mut program = parse_result.program;
        let minifier = Minifier::new(self.options.clone());
        let minified = minifier.minify(&allocator, &mut program);

        let codegen_options = CodegenOptions {
            minify: true,
            source_map_path: with_map.then(|| Path::new(filename).to_path_buf()),
            ..CodegenOptions::default()
        };
        let generated = Codegen::new()
            .with_options(codegen_options)
            .with_scoping(minified.scoping)
            .build(&program);

        let map = match generated.map {
            Some(map) => Some(
                SourceMap::from_slice(map.to_json_string().as_bytes())
                    .map_err(|e| BundlerError::source_map(e.to_string()))?,
            ),
            None => None,
        };

        Ok(MinifiedCode {
            code: generated.code,
            map,
        })
    }

    /// Estimate size reduction percentage
    pub fn calculate_reduction(&self, original: &str, minified: &str) -> f64 {
        let original_size = original.len() as f64;
        let minified_size = minified.len() as f64;

        if original_size == 0.0 {
            return 0.0;
        }

        ((original_size - minified_size) / original_size) * 100.0
    }
}

impl Default for OxcMinifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Production pass over a script bundle.
///
/// Module bodies are minified one by one with top-level mangling, their surviving
/// `require`/`require.load` calls re-collected, and modules no longer reachable
/// from the bundle root dropped. The rendered bundle is then minified as a whole.
pub struct Optimizer {
    module_minifier: OxcMinifier,
    bundle_minifier: OxcMinifier,
    emit_maps: bool,
}

impl Optimizer {
    pub fn new(emit_maps: bool) -> Self {
        Self {
            module_minifier: OxcMinifier::with_top_level(true),
            bundle_minifier: OxcMinifier::new(),
            emit_maps,
        }
    }

    pub fn optimize_modules(&self, modules: Vec<PackagedModule>, root_id: &str) -> Result<Vec<PackagedModule>> {
        let minified = modules
            .into_par_iter()
            .map(|module| self.minify_module(module))
            .collect::<Result<Vec<_>>>()?;

        let reachable = reachable_modules(&minified, root_id);
        let before = minified.len();
        let kept: Vec<PackagedModule> = minified
            .into_iter()
            .filter(|module| reachable.contains(&module.id))
            .collect();
        if kept.len() < before {
            Logger::debug(&format!("🌲 Dropped {} unreachable module(s)", before - kept.len()));
        }
        Ok(kept)
    }

    fn minify_module(&self, mut module: PackagedModule) -> Result<PackagedModule> {
        let with_map = self.emit_maps && module.source_map.is_some();
        let minified = self.module_minifier.minify(&module.code, &module.source_name, with_map)?;

        let used = collect_requires(&minified.code, &module.source_name)?;
        module.sync_deps.retain(|specifier, _| used.sync.contains(specifier));
        module.async_deps.retain(|specifier, _| used.asynchronous.contains(specifier));

        if let (Some(original), Some(map)) = (module.source_map.take(), minified.map.as_ref()) {
            module.source_map = Some(compose_module_map(&original, map));
        }
        module.code = minified.code;
        Ok(module)
    }

    pub fn minify_bundle(&self, rendered: RenderedBundle, name: &str) -> Result<RenderedBundle> {
        let with_map = self.emit_maps && rendered.map.is_some();
        let minified = self.bundle_minifier.minify(&rendered.code, name, with_map)?;
        Logger::debug(&MinificationStats::new(&self.bundle_minifier, &rendered.code, &minified.code).to_string());

        let map = match (rendered.map, minified.map) {
            (Some(bundle_map), Some(minified_map)) => Some(compose_bundle_map(&bundle_map, &minified_map, name)),
            _ => None,
        };
        Ok(RenderedBundle {
            code: minified.code,
            map,
        })
    }
}

/// Module ids reachable from `root_id` through the remaining dependency tables
fn reachable_modules(modules: &[PackagedModule], root_id: &str) -> HashSet<String> {
    use crate::infrastructure::packager::DepTarget;

    let by_id: HashMap<&str, &PackagedModule> = modules.iter().map(|m| (m.id.as_str(), m)).collect();
    let mut seen = HashSet::new();
    let mut stack = vec![root_id.to_string()];

    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        let Some(module) = by_id.get(id.as_str()) else {
            continue;
        };
        for target in module.sync_deps.values() {
            if let DepTarget::Module(next) = target {
                stack.push(next.clone());
            }
        }
        // Async targets already loaded into this bundle stay reachable
        for (_, next) in module.async_deps.values() {
            stack.push(next.clone());
        }
    }
    seen
}

#[derive(Debug, Default)]
struct RequireCalls {
    sync: BTreeSet<String>,
    asynchronous: BTreeSet<String>,
}

/// Literal `require(...)` and `require.load(...)` calls still present in minified code
fn collect_requires(code: &str, filename: &str) -> Result<RequireCalls> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, code, SourceType::cjs()).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        return Err(TransformError::new(filename, describe_diagnostics(&parsed.errors)).into());
    }
    let scoping = SemanticBuilder::new().build(&parsed.program).semantic.into_scoping();

    let mut collector = RequireCollector {
        scoping: &scoping,
        calls: RequireCalls::default(),
    };
    collector.visit_program(&parsed.program);
    Ok(collector.calls)
}

struct RequireCollector<'s> {
    scoping: &'s Scoping,
    calls: RequireCalls,
}

impl RequireCollector<'_> {
    fn is_global_require(&self, expression: &Expression<'_>) -> bool {
        let Expression::Identifier(ident) = expression else {
            return false;
        };
        ident.name.as_str() == "require"
            && ident.reference_id.get().map_or(true, |reference_id| {
                self.scoping.get_reference(reference_id).symbol_id().is_none()
            })
    }
}

impl<'a> Visit<'a> for RequireCollector<'_> {
    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        // The minifier prints plain strings as template literals
        let specifier = call.arguments.first().and_then(argument_string);
        if let Some(specifier) = specifier {
            if self.is_global_require(&call.callee) {
                self.calls.sync.insert(specifier);
            } else if let Expression::StaticMemberExpression(member) = &call.callee {
                if member.property.name.as_str() == "load" && self.is_global_require(&member.object) {
                    self.calls.asynchronous.insert(specifier);
                }
            }
        }
        walk::walk_call_expression(self, call);
    }
}

/// Minified module positions → original source, through the module's own map
fn compose_module_map(original: &ModuleSourceMap, minified: &SourceMap) -> ModuleSourceMap {
    let mut by_line: HashMap<u32, Vec<&LineMapping>> = HashMap::new();
    for mapping in &original.mappings {
        by_line.entry(mapping.gen_line).or_default().push(mapping);
    }

    let mappings = minified
        .tokens()
        .filter_map(|token| {
            let candidates = by_line.get(&token.get_src_line())?;
            let col = token.get_src_col();
            let best = candidates
                .iter()
                .filter(|m| m.gen_col <= col)
                .max_by_key(|m| m.gen_col)
                .or_else(|| candidates.first())?;
            Some(LineMapping {
                gen_line: token.get_dst_line(),
                gen_col: token.get_dst_col(),
                src_line: best.src_line,
                src_col: best.src_col,
            })
        })
        .collect();

    ModuleSourceMap {
        source_contents: original.source_contents.clone(),
        mappings,
    }
}

/// Minified bundle positions → original sources, through the bundle map
fn compose_bundle_map(bundle_map: &SourceMap, minified: &SourceMap, name: &str) -> SourceMap {
    let mut builder = SourceMapBuilder::new(Some(name));
    for (i, source) in bundle_map.sources().enumerate() {
        let id = builder.add_source(source);
        builder.set_source_contents(id, bundle_map.get_source_contents(i as u32));
    }

    for token in minified.tokens() {
        let Some(original) = bundle_map.lookup_token(token.get_src_line(), token.get_src_col()) else {
            continue;
        };
        if original.get_dst_line() != token.get_src_line() || !original.has_source() {
            continue;
        }
        builder.add_raw(
            token.get_dst_line(),
            token.get_dst_col(),
            original.get_src_line(),
            original.get_src_col(),
            Some(original.get_src_id()),
            None,
            false,
        );
    }
    builder.into_sourcemap()
}

#[derive(Debug, Clone)]
pub struct MinificationStats {
    pub original_size: usize,
    pub minified_size: usize,
    pub reduction_percentage: f64,
    pub saved_bytes: usize,
}

impl MinificationStats {
    pub fn new(minifier: &OxcMinifier, original: &str, minified: &str) -> Self {
        Self {
            original_size: original.len(),
            minified_size: minified.len(),
            reduction_percentage: minifier.calculate_reduction(original, minified),
            saved_bytes: original.len().saturating_sub(minified.len()),
        }
    }
}

impl std::fmt::Display for MinificationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Minification: {:.1}% reduction ({} → {} bytes, saved {})",
            self.reduction_percentage,
            self.original_size,
            self.minified_size,
            self.saved_bytes
        )
    }
}
