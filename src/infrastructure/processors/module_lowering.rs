//! Lowers ECMAScript module syntax to the CommonJS shape the bundle loader runs.
//!
//! The pass works on plain JavaScript (types and JSX already removed) and
//! rewrites the source text through span edits:
//!
//! - `import` declarations become `var _x = require("x")` in a one-line prologue,
//!   and every reference to an imported binding becomes a live member access
//!   (`_x.name`), called as `(0, _x.name)(...)` to keep `this` undefined.
//! - named exports become getters registered with `__export` ahead of any
//!   `require`, so cyclic imports observe live bindings.
//! - `export *` goes through `__exportStar`, `export default <expr>` assigns
//!   `exports.default`.
//! - `require("x")` calls are sync dependencies, `import("x")` becomes
//!   `require.load("x")` and an async dependency.
//! - `process.env.NAME` is inlined when the build environment defines `NAME`.
//!
//! Removed regions keep their newlines so every body line stays on the line
//! the code generator put it, one line below the prologue.

use crate::core::models::{DependencyKind, DependencyRequest};
use crate::infrastructure::processors::common::{
    describe_diagnostics, js_string, member_access, sanitize_identifier,
};
use crate::utils::TransformError;
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_semantic::{Scoping, SemanticBuilder, SymbolId};
use oxc_span::{GetSpan, SourceType, Span};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

pub struct LoweringOptions<'a> {
    /// Wrap imports of CommonJS modules with `__importDefault` / `__importStar`
    pub interop: bool,
    pub env: &'a BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct LoweredModule {
    pub code: String,
    pub dependencies: Vec<DependencyRequest>,
    /// Lines inserted above the original body
    pub line_offset: u32,
}

#[derive(Debug)]
struct Edit {
    start: u32,
    end: u32,
    text: String,
}

pub fn lower_module(
    source: &str,
    file_path: &Path,
    options: &LoweringOptions<'_>,
) -> Result<LoweredModule, TransformError> {
    let allocator = Allocator::default();
    let mut parsed = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        // CommonJS sources may rely on sloppy-mode syntax
        let script = Parser::new(&allocator, source, SourceType::cjs()).parse();
        if script.panicked || !script.errors.is_empty() {
            return Err(TransformError::new(file_path, describe_diagnostics(&parsed.errors)));
        }
        parsed = script;
    }

    let program = parsed.program;
    let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();

    let mut lowering = Lowering::new(source, &scoping, options);
    lowering.collect_module_syntax(&program);
    lowering.rewrite_body(&program);
    Ok(lowering.finish())
}

struct Lowering<'s> {
    source: &'s str,
    scoping: &'s Scoping,
    interop: bool,
    env: &'s BTreeMap<String, String>,
    edits: Vec<Edit>,
    requires: Vec<String>,
    getters: Vec<(String, String)>,
    imports: HashMap<SymbolId, String>,
    dependencies: Vec<(u32, DependencyRequest)>,
    used_names: HashSet<String>,
    rewritten: HashSet<u32>,
    in_assignment_target: bool,
    is_es_module: bool,
}

impl<'s> Lowering<'s> {
    fn new(source: &'s str, scoping: &'s Scoping, options: &LoweringOptions<'s>) -> Self {
        Self {
            source,
            scoping,
            interop: options.interop,
            env: options.env,
            edits: Vec::new(),
            requires: Vec::new(),
            getters: Vec::new(),
            imports: HashMap::new(),
            dependencies: Vec::new(),
            used_names: HashSet::new(),
            rewritten: HashSet::new(),
            in_assignment_target: false,
            is_es_module: false,
        }
    }

    fn collect_module_syntax(&mut self, program: &Program<'_>) {
        for stmt in &program.body {
            let Some(decl) = stmt.as_module_declaration() else {
                continue;
            };
            match decl {
                ModuleDeclaration::ImportDeclaration(import) => self.lower_import(import),
                ModuleDeclaration::ExportNamedDeclaration(export) => self.lower_export_named(export),
                ModuleDeclaration::ExportDefaultDeclaration(export) => {
                    self.lower_export_default(export)
                }
                ModuleDeclaration::ExportAllDeclaration(export) => self.lower_export_all(export),
                ModuleDeclaration::TSExportAssignment(assign) => {
                    self.replace_range(
                        assign.span.start,
                        assign.expression.span().start,
                        "module.exports = ".to_string(),
                    );
                }
                other => self.remove(other.span()),
            }
        }
    }

    fn lower_import(&mut self, import: &ImportDeclaration<'_>) {
        self.remove(import.span);
        if import.import_kind.is_type() {
            return;
        }
        self.is_es_module = true;

        let specifier = import.source.value.as_str();
        self.add_dependency(import.span.start, specifier, DependencyKind::Sync);
        let require = format!("require({})", js_string(specifier));

        let mut default_local = None;
        let mut namespace_local = None;
        let mut named = Vec::new();
        for spec in import.specifiers.iter().flatten() {
            match spec {
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => default_local = Some(&s.local),
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                    namespace_local = Some(&s.local)
                }
                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                    if !s.import_kind.is_type() {
                        named.push((s.imported.name().to_string(), &s.local));
                    }
                }
            }
        }

        if default_local.is_none() && namespace_local.is_none() && named.is_empty() {
            self.requires.push(format!("{};", require));
            return;
        }

        let wants_default =
            default_local.is_some() || named.iter().any(|(imported, _)| imported == "default");
        let wants_named = named.iter().any(|(imported, _)| imported != "default");
        let init = if !self.interop {
            require
        } else if namespace_local.is_some() || (wants_default && wants_named) {
            format!("__importStar({})", require)
        } else if wants_default {
            format!("__importDefault({})", require)
        } else {
            require
        };

        let binding = match namespace_local {
            Some(local) => {
                self.used_names.insert(local.name.to_string());
                local.name.to_string()
            }
            None => self.unique_name(specifier),
        };
        self.requires.push(format!("var {} = {};", binding, init));

        if let Some(local) = default_local {
            self.bind_import(local, format!("{}.default", binding));
        }
        for (imported, local) in named {
            self.bind_import(local, member_access(&binding, &imported));
        }
    }

    fn lower_export_named(&mut self, export: &ExportNamedDeclaration<'_>) {
        if export.export_kind.is_type() {
            self.remove(export.span);
            return;
        }
        self.is_es_module = true;

        if let Some(source) = &export.source {
            self.remove(export.span);
            let specifier = source.value.as_str();
            self.add_dependency(export.span.start, specifier, DependencyKind::Sync);
            let require = format!("require({})", js_string(specifier));

            let names: Vec<(String, String)> = export
                .specifiers
                .iter()
                .filter(|s| !s.export_kind.is_type())
                .map(|s| (s.local.name().to_string(), s.exported.name().to_string()))
                .collect();
            if names.is_empty() {
                self.requires.push(format!("{};", require));
                return;
            }

            let wants_default = names.iter().any(|(local, _)| local == "default");
            let only_default = names.iter().all(|(local, _)| local == "default");
            let init = match (self.interop && wants_default, only_default) {
                (true, true) => format!("__importDefault({})", require),
                (true, false) => format!("__importStar({})", require),
                _ => require,
            };

            let binding = self.unique_name(specifier);
            self.requires.push(format!("var {} = {};", binding, init));
            for (local, exported) in names {
                self.getters.push((exported, member_access(&binding, &local)));
            }
        } else if let Some(declaration) = &export.declaration {
            self.replace_range(export.span.start, declaration.span().start, String::new());
            for name in declared_names(declaration) {
                self.getters.push((name.clone(), name));
            }
        } else {
            self.remove(export.span);
            for spec in export.specifiers.iter().filter(|s| !s.export_kind.is_type()) {
                let value = match &spec.local {
                    ModuleExportName::IdentifierReference(ident) => self
                        .import_replacement(ident)
                        .unwrap_or_else(|| ident.name.to_string()),
                    other => other.name().to_string(),
                };
                self.getters.push((spec.exported.name().to_string(), value));
            }
        }
    }

    fn lower_export_default(&mut self, export: &ExportDefaultDeclaration<'_>) {
        self.is_es_module = true;
        match &export.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(func) if func.id.is_some() => {
                self.replace_range(export.span.start, func.span.start, String::new());
                if let Some(id) = &func.id {
                    self.getters.push(("default".to_string(), id.name.to_string()));
                }
            }
            ExportDefaultDeclarationKind::ClassDeclaration(class) if class.id.is_some() => {
                self.replace_range(export.span.start, class.span.start, String::new());
                if let Some(id) = &class.id {
                    self.getters.push(("default".to_string(), id.name.to_string()));
                }
            }
            ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => self.remove(export.span),
            kind @ (ExportDefaultDeclarationKind::FunctionDeclaration(_)
            | ExportDefaultDeclarationKind::ClassDeclaration(_)) => {
                // Anonymous declarations become expressions and need a terminator
                self.replace_range(export.span.start, kind.span().start, "exports.default = ".to_string());
                self.replace_range(export.span.end, export.span.end, ";".to_string());
            }
            kind => {
                self.replace_range(export.span.start, kind.span().start, "exports.default = ".to_string());
            }
        }
    }

    fn lower_export_all(&mut self, export: &ExportAllDeclaration<'_>) {
        self.remove(export.span);
        if export.export_kind.is_type() {
            return;
        }
        self.is_es_module = true;

        let specifier = export.source.value.as_str();
        self.add_dependency(export.span.start, specifier, DependencyKind::Sync);
        let require = format!("require({})", js_string(specifier));

        match &export.exported {
            Some(exported) => {
                let binding = self.unique_name(specifier);
                let init = if self.interop {
                    format!("__importStar({})", require)
                } else {
                    require
                };
                self.requires.push(format!("var {} = {};", binding, init));
                self.getters.push((exported.name().to_string(), binding));
            }
            None => self.requires.push(format!("__exportStar({}, exports);", require)),
        }
    }

    /// Visit everything except the module declarations already lowered
    fn rewrite_body(&mut self, program: &Program<'_>) {
        for stmt in &program.body {
            match stmt.as_module_declaration() {
                Some(ModuleDeclaration::ExportNamedDeclaration(export)) => {
                    if export.source.is_none() {
                        if let Some(declaration) = &export.declaration {
                            self.visit_declaration(declaration);
                        }
                    }
                }
                Some(ModuleDeclaration::ExportDefaultDeclaration(export)) => {
                    self.visit_export_default_declaration_kind(&export.declaration);
                }
                Some(ModuleDeclaration::TSExportAssignment(assign)) => {
                    self.visit_expression(&assign.expression);
                }
                Some(_) => {}
                None => self.visit_statement(stmt),
            }
        }
    }

    fn finish(mut self) -> LoweredModule {
        let mut edits = std::mem::take(&mut self.edits);
        edits.sort_by_key(|edit| (edit.start, edit.end));

        let mut body = String::with_capacity(self.source.len() + 256);
        let mut cursor = 0usize;
        for edit in edits {
            let (start, end) = (edit.start as usize, edit.end as usize);
            if start < cursor {
                continue;
            }
            body.push_str(&self.source[cursor..start]);
            body.push_str(&edit.text);
            cursor = end;
        }
        body.push_str(&self.source[cursor..]);

        let mut prologue = Vec::new();
        if self.is_es_module {
            prologue.push("\"use strict\";".to_string());
            prologue.push("Object.defineProperty(exports, \"__esModule\", { value: true });".to_string());
        }
        if !self.getters.is_empty() {
            let mut seen = HashSet::new();
            let entries: Vec<String> = self
                .getters
                .iter()
                .filter(|(name, _)| seen.insert(name.clone()))
                .map(|(name, value)| format!("{}: function () {{ return {}; }}", js_string(name), value))
                .collect();
            prologue.push(format!("__export(exports, {{ {} }});", entries.join(", ")));
        }
        prologue.append(&mut self.requires);

        let mut dependencies = std::mem::take(&mut self.dependencies);
        dependencies.sort_by_key(|(pos, _)| *pos);
        let mut seen = HashSet::new();
        let dependencies = dependencies
            .into_iter()
            .map(|(_, dep)| dep)
            .filter(|dep| seen.insert((dep.specifier.clone(), dep.kind)))
            .collect();

        let (code, line_offset) = if prologue.is_empty() {
            (body, 0)
        } else {
            (format!("{}\n{}", prologue.join(" "), body), 1)
        };

        LoweredModule {
            code,
            dependencies,
            line_offset,
        }
    }

    fn add_dependency(&mut self, position: u32, specifier: &str, kind: DependencyKind) {
        self.dependencies
            .push((position, DependencyRequest::new(specifier, kind)));
    }

    fn bind_import(&mut self, local: &BindingIdentifier<'_>, replacement: String) {
        if let Some(symbol_id) = local.symbol_id.get() {
            self.imports.insert(symbol_id, replacement);
        }
    }

    fn import_replacement(&self, ident: &IdentifierReference<'_>) -> Option<String> {
        let reference_id = ident.reference_id.get()?;
        let symbol_id = self.scoping.get_reference(reference_id).symbol_id()?;
        self.imports.get(&symbol_id).cloned()
    }

    fn is_global(&self, ident: &IdentifierReference<'_>) -> bool {
        ident.reference_id.get().map_or(true, |reference_id| {
            self.scoping.get_reference(reference_id).symbol_id().is_none()
        })
    }

    /// `process.env.NAME` with `NAME` defined in the build environment
    fn env_value(&self, member: &StaticMemberExpression<'_>) -> Option<String> {
        let Expression::StaticMemberExpression(inner) = &member.object else {
            return None;
        };
        let Expression::Identifier(object) = &inner.object else {
            return None;
        };
        if object.name.as_str() != "process" || inner.property.name.as_str() != "env" || !self.is_global(object) {
            return None;
        }
        self.env.get(member.property.name.as_str()).cloned()
    }

    /// Binding name for a required module that collides with nothing in the source
    fn unique_name(&mut self, specifier: &str) -> String {
        let base = format!("_{}", sanitize_identifier(specifier));
        let mut candidate = base.clone();
        let mut counter = 2;
        while self.source.contains(candidate.as_str()) || !self.used_names.insert(candidate.clone()) {
            candidate = format!("{}{}", base, counter);
            counter += 1;
        }
        candidate
    }

    fn replace(&mut self, span: Span, text: String) {
        self.replace_range(span.start, span.end, text);
    }

    fn replace_range(&mut self, start: u32, end: u32, text: String) {
        self.edits.push(Edit { start, end, text });
    }

    /// Drop a region but keep its line breaks
    fn remove(&mut self, span: Span) {
        let removed = &self.source[span.start as usize..span.end as usize];
        let newlines = "\n".repeat(removed.matches('\n').count());
        self.replace(span, newlines);
    }
}

impl<'a> Visit<'a> for Lowering<'_> {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if self.rewritten.contains(&ident.span.start) {
            return;
        }
        if let Some(replacement) = self.import_replacement(ident) {
            self.replace(ident.span, replacement);
        }
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Expression::Identifier(callee) = &call.callee {
            if callee.name.as_str() == "require" && self.is_global(callee) {
                if let (1, Some(specifier)) = (call.arguments.len(), call.arguments.first().and_then(argument_string)) {
                    self.add_dependency(call.span.start, &specifier, DependencyKind::Sync);
                }
            } else if let Some(replacement) = self.import_replacement(callee) {
                self.rewritten.insert(callee.span.start);
                self.replace(callee.span, format!("(0, {})", replacement));
            }
        }
        walk::walk_call_expression(self, call);
    }

    fn visit_import_expression(&mut self, expr: &ImportExpression<'a>) {
        if let Some(specifier) = expression_string(&expr.source) {
            self.add_dependency(expr.span.start, &specifier, DependencyKind::Async);
            let mut text = format!("require.load({})", js_string(&specifier));
            if self.interop {
                text.push_str(".then(__importStar)");
            }
            self.replace(expr.span, text);
            return;
        }
        walk::walk_import_expression(self, expr);
    }

    fn visit_static_member_expression(&mut self, member: &StaticMemberExpression<'a>) {
        if !self.in_assignment_target {
            if let Some(value) = self.env_value(member) {
                self.replace(member.span, js_string(&value));
                return;
            }
        }
        walk::walk_static_member_expression(self, member);
    }

    fn visit_simple_assignment_target(&mut self, target: &SimpleAssignmentTarget<'a>) {
        let outer = std::mem::replace(&mut self.in_assignment_target, true);
        walk::walk_simple_assignment_target(self, target);
        self.in_assignment_target = outer;
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.shorthand {
            if let Expression::Identifier(ident) = &prop.value {
                if let Some(replacement) = self.import_replacement(ident) {
                    self.rewritten.insert(ident.span.start);
                    self.replace(prop.span, format!("{}: {}", ident.name, replacement));
                }
            }
        }
        walk::walk_object_property(self, prop);
    }
}

/// String literal or expression-free template literal argument
pub(crate) fn argument_string(argument: &Argument<'_>) -> Option<String> {
    match argument {
        Argument::StringLiteral(lit) => Some(lit.value.to_string()),
        Argument::TemplateLiteral(tpl) if tpl.expressions.is_empty() => tpl
            .quasis
            .first()
            .and_then(|quasi| quasi.value.cooked.as_ref())
            .map(|cooked| cooked.to_string()),
        _ => None,
    }
}

fn expression_string(expression: &Expression<'_>) -> Option<String> {
    match expression {
        Expression::StringLiteral(lit) => Some(lit.value.to_string()),
        Expression::TemplateLiteral(tpl) if tpl.expressions.is_empty() => tpl
            .quasis
            .first()
            .and_then(|quasi| quasi.value.cooked.as_ref())
            .map(|cooked| cooked.to_string()),
        _ => None,
    }
}

fn declared_names(declaration: &Declaration<'_>) -> Vec<String> {
    let mut names = Vec::new();
    match declaration {
        Declaration::VariableDeclaration(var) => {
            for declarator in &var.declarations {
                collect_binding_names(&declarator.id, &mut names);
            }
        }
        Declaration::FunctionDeclaration(func) => {
            if let Some(id) = &func.id {
                names.push(id.name.to_string());
            }
        }
        Declaration::ClassDeclaration(class) => {
            if let Some(id) = &class.id {
                names.push(id.name.to_string());
            }
        }
        _ => {}
    }
    names
}

fn collect_binding_names(pattern: &BindingPattern<'_>, names: &mut Vec<String>) {
    match &pattern.kind {
        BindingPatternKind::BindingIdentifier(ident) => names.push(ident.name.to_string()),
        BindingPatternKind::ObjectPattern(object) => {
            for property in &object.properties {
                collect_binding_names(&property.value, names);
            }
            if let Some(rest) = &object.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPatternKind::ArrayPattern(array) => {
            for element in array.elements.iter().flatten() {
                collect_binding_names(element, names);
            }
            if let Some(rest) = &array.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPatternKind::AssignmentPattern(assignment) => {
            collect_binding_names(&assignment.left, names)
        }
    }
}
