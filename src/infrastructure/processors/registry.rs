use crate::core::interfaces::{AssetTransformer, TransformContext};
use crate::core::models::{AssetVariant, TransformedAsset};
use crate::infrastructure::processors::asset_processor::{JsonTransformer, RawTransformer};
use crate::infrastructure::processors::script_transformer::ScriptTransformer;
use crate::utils::TransformError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Finite set of file types the registry dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    TypeScript,
    Tsx,
    JavaScript,
    Jsx,
    Json,
    Raw,
}

impl TypeTag {
    pub const ALL: [TypeTag; 6] = [
        TypeTag::TypeScript,
        TypeTag::Tsx,
        TypeTag::JavaScript,
        TypeTag::Jsx,
        TypeTag::Json,
        TypeTag::Raw,
    ];

    /// Tag for a compiled file; anything unknown is raw
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "ts" | "mts" | "cts" => TypeTag::TypeScript,
            "tsx" => TypeTag::Tsx,
            "js" | "mjs" | "cjs" => TypeTag::JavaScript,
            "jsx" => TypeTag::Jsx,
            "json" => TypeTag::Json,
            _ => TypeTag::Raw,
        }
    }

    /// `url:` requests are always raw, whatever the extension
    pub fn for_variant(path: &Path, variant: AssetVariant) -> Self {
        match variant {
            AssetVariant::Raw => TypeTag::Raw,
            AssetVariant::Compiled => Self::from_path(path),
        }
    }

    pub fn variant(&self) -> AssetVariant {
        match self {
            TypeTag::Raw => AssetVariant::Raw,
            _ => AssetVariant::Compiled,
        }
    }
}

/// Type tag → transform capability
pub struct TransformerRegistry {
    transformers: HashMap<TypeTag, Arc<dyn AssetTransformer>>,
}

impl TransformerRegistry {
    pub fn empty() -> Self {
        Self {
            transformers: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let script: Arc<dyn AssetTransformer> = Arc::new(ScriptTransformer::new());

        let mut registry = Self::empty();
        for tag in [TypeTag::TypeScript, TypeTag::Tsx, TypeTag::JavaScript, TypeTag::Jsx] {
            registry.register(tag, script.clone());
        }
        registry.register(TypeTag::Json, Arc::new(JsonTransformer));
        registry.register(TypeTag::Raw, Arc::new(RawTransformer));
        registry
    }

    /// Replace the transformer for `tag`
    pub fn register(&mut self, tag: TypeTag, transformer: Arc<dyn AssetTransformer>) {
        self.transformers.insert(tag, transformer);
    }

    pub fn get(&self, tag: TypeTag) -> Option<&Arc<dyn AssetTransformer>> {
        self.transformers.get(&tag)
    }

    pub fn transform(
        &self,
        tag: TypeTag,
        ctx: &TransformContext<'_>,
    ) -> Result<(TransformedAsset, &'static str), TransformError> {
        let transformer = self.get(tag).ok_or_else(|| {
            TransformError::new(ctx.file_path, format!("no transformer registered for {:?}", tag))
        })?;
        let asset = transformer.transform(ctx)?;
        Ok((asset, transformer.name()))
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
