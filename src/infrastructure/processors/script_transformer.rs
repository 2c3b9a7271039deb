use crate::core::interfaces::{AssetTransformer, TransformContext};
use crate::core::models::{AssetContent, AssetKind, LineMapping, ModuleSourceMap, TransformedAsset};
use crate::infrastructure::processors::common::{describe_diagnostics, is_legal_comment};
use crate::infrastructure::processors::module_lowering::{lower_module, LoweringOptions};
use crate::utils::TransformError;
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{JsxOptions, JsxRuntime, TransformOptions, Transformer};
use std::path::Path;

const DEFAULT_JSX_FACTORY: &str = "React.createElement";
const DEFAULT_JSX_FRAGMENT: &str = "React.Fragment";

/// TypeScript, TSX, JavaScript and JSX through oxc, lowered to CommonJS
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptTransformer;

/// Output of the strip/lower step before module lowering
struct Compiled {
    code: String,
    map: Option<String>,
}

impl ScriptTransformer {
    pub fn new() -> Self {
        Self
    }

    fn compile(&self, ctx: &TransformContext<'_>, source: &str) -> Result<Compiled, TransformError> {
        let path = ctx.file_path;
        let allocator = Allocator::default();
        let source_type = SourceType::from_path(path).unwrap_or_else(|_| SourceType::mjs());

        let mut parsed = Parser::new(&allocator, source, source_type).parse();
        if (parsed.panicked || !parsed.errors.is_empty()) && !source_type.is_typescript() {
            // Plain scripts may use sloppy-mode syntax
            let script = Parser::new(&allocator, source, source_type.with_script(true)).parse();
            if !script.panicked && script.errors.is_empty() {
                parsed = script;
            }
        }
        if parsed.panicked || !parsed.errors.is_empty() {
            return Err(TransformError::new(path, describe_diagnostics(&parsed.errors)));
        }

        let mut program = parsed.program;
        if ctx.project.remove_comments {
            program
                .comments
                .retain(|comment| is_legal_comment(comment.span.source_text(source)));
        }

        let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
        let options = TransformOptions {
            jsx: self.jsx_options(ctx),
            ..TransformOptions::default()
        };
        let transformed = Transformer::new(&allocator, path, &options).build_with_scoping(scoping, &mut program);
        if !transformed.errors.is_empty() {
            return Err(TransformError::new(path, describe_diagnostics(&transformed.errors)));
        }

        let generated = Codegen::new()
            .with_options(CodegenOptions {
                source_map_path: ctx.config.emit_source_maps().then(|| path.to_path_buf()),
                ..CodegenOptions::default()
            })
            .build(&program);

        Ok(Compiled {
            code: generated.code,
            map: generated.map.map(|map| map.to_json_string()),
        })
    }

    fn jsx_options(&self, ctx: &TransformContext<'_>) -> JsxOptions {
        let pragma = ctx
            .config
            .jsx_factory
            .clone()
            .or_else(|| ctx.project.jsx_factory.clone())
            .unwrap_or_else(|| DEFAULT_JSX_FACTORY.to_string());
        let pragma_frag = ctx
            .config
            .jsx_fragment_factory
            .clone()
            .or_else(|| ctx.project.jsx_fragment_factory.clone())
            .unwrap_or_else(|| DEFAULT_JSX_FRAGMENT.to_string());

        JsxOptions {
            runtime: JsxRuntime::Classic,
            pragma: Some(pragma),
            pragma_frag: Some(pragma_frag),
            ..JsxOptions::default()
        }
    }
}

impl AssetTransformer for ScriptTransformer {
    fn name(&self) -> &'static str {
        "script"
    }

    fn transform(&self, ctx: &TransformContext<'_>) -> Result<TransformedAsset, TransformError> {
        let source = std::str::from_utf8(ctx.bytes)
            .map_err(|e| TransformError::new(ctx.file_path, format!("not valid UTF-8: {}", e)))?;
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);

        let compiled = self.compile(ctx, source)?;
        let lowered = lower_module(
            &compiled.code,
            ctx.file_path,
            &LoweringOptions {
                interop: ctx.project.es_module_interop,
                env: &ctx.config.env,
            },
        )?;

        let source_map = match compiled.map {
            Some(json) => Some(ModuleSourceMap {
                source_contents: source.to_string(),
                mappings: line_mappings(ctx.file_path, &json, lowered.line_offset)?,
            }),
            None => None,
        };

        Ok(TransformedAsset {
            kind: AssetKind::Script,
            content: AssetContent::Code(lowered.code),
            dependencies: lowered.dependencies,
            source_map,
        })
    }
}

/// Codegen map tokens, shifted below the lowering prologue
fn line_mappings(path: &Path, json: &str, line_offset: u32) -> Result<Vec<LineMapping>, TransformError> {
    let map = sourcemap::SourceMap::from_slice(json.as_bytes())
        .map_err(|e| TransformError::new(path, format!("invalid source map: {}", e)))?;

    Ok(map
        .tokens()
        .map(|token| LineMapping {
            gen_line: token.get_dst_line() + line_offset,
            gen_col: token.get_dst_col(),
            src_line: token.get_src_line(),
            src_col: token.get_src_col(),
        })
        .collect())
}
