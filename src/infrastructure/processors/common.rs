//! Small helpers shared by the script transformer, lowering pass and packager.

use once_cell::sync::Lazy;
use oxc_diagnostics::OxcDiagnostic;
use std::collections::HashSet;

static RESERVED_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
        "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for",
        "function", "if", "implements", "import", "in", "instanceof", "interface", "let", "new",
        "null", "package", "private", "protected", "public", "return", "static", "super",
        "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with",
        "yield",
    ]
    .into_iter()
    .collect()
});

/// JavaScript string literal for `value`
pub fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Usable as a property name after a dot
pub fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Usable as a binding name
pub fn is_valid_identifier(name: &str) -> bool {
    is_identifier_name(name) && !RESERVED_WORDS.contains(name)
}

/// `object.name`, or `object["name"]` when `name` is not an identifier
pub fn member_access(object: &str, name: &str) -> String {
    if is_identifier_name(name) {
        format!("{}.{}", object, name)
    } else {
        format!("{}[{}]", object, js_string(name))
    }
}

/// Identifier-safe name derived from the last segment of a specifier
pub fn sanitize_identifier(specifier: &str) -> String {
    let segment = specifier
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(specifier);
    let stem = match segment.find('.') {
        Some(0) | None => segment,
        Some(pos) => &segment[..pos],
    };

    let sanitized: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
        .collect();

    if sanitized.trim_matches('_').is_empty() {
        "module".to_string()
    } else {
        sanitized
    }
}

pub fn describe_diagnostics(errors: &[OxcDiagnostic]) -> String {
    errors
        .iter()
        .map(|error| error.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// `/*! ... */` and `//! ...` comments survive comment removal
pub fn is_legal_comment(text: &str) -> bool {
    let body = text
        .strip_prefix("/*")
        .or_else(|| text.strip_prefix("//"))
        .unwrap_or(text);
    body.starts_with('!') || body.contains("@license") || body.contains("@preserve")
}
