use crate::core::interfaces::{AssetTransformer, TransformContext};
use crate::core::models::{AssetContent, AssetKind, TransformedAsset};
use crate::infrastructure::processors::common::js_string;
use crate::utils::TransformError;

/// JSON files become a module whose sole export is the parsed value
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonTransformer;

impl AssetTransformer for JsonTransformer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn transform(&self, ctx: &TransformContext<'_>) -> Result<TransformedAsset, TransformError> {
        let text = std::str::from_utf8(ctx.bytes)
            .map_err(|e| TransformError::new(ctx.file_path, format!("not valid UTF-8: {}", e)))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text).trim();

        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| TransformError::new(ctx.file_path, format!("invalid JSON: {}", e)))?;

        // An object literal would treat "__proto__" as the prototype setter
        let code = if has_proto_key(&value) {
            format!("module.exports = JSON.parse({});", js_string(text))
        } else {
            format!("module.exports = {};", text)
        };

        Ok(TransformedAsset {
            kind: AssetKind::Json,
            content: AssetContent::Code(code),
            dependencies: Vec::new(),
            source_map: None,
        })
    }
}

fn has_proto_key(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Object(map) => {
            map.contains_key("__proto__") || map.values().any(has_proto_key)
        }
        serde_json::Value::Array(items) => items.iter().any(has_proto_key),
        _ => false,
    }
}

/// Everything else is copied verbatim under a content-hash name
#[derive(Debug, Default, Clone, Copy)]
pub struct RawTransformer;

impl AssetTransformer for RawTransformer {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn transform(&self, ctx: &TransformContext<'_>) -> Result<TransformedAsset, TransformError> {
        Ok(TransformedAsset {
            kind: AssetKind::Raw,
            content: AssetContent::Bytes(ctx.bytes.to_vec()),
            dependencies: Vec::new(),
            source_map: None,
        })
    }
}
