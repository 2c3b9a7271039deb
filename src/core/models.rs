use crate::utils::hashing;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable asset identifier: digest of the root-relative path plus variant
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AssetId(String);

impl AssetId {
    pub fn derive(root: &Path, file_path: &Path, variant: AssetVariant) -> Self {
        let relative = file_path.strip_prefix(root).unwrap_or(file_path);
        let relative = relative.to_string_lossy().replace('\\', "/");
        Self(hashing::hash_parts(
            &[relative.as_bytes(), variant.as_str().as_bytes()],
            12,
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Index of an asset in the graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetIdx(pub usize);

/// How a file is turned into an asset; the same path may exist in both variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetVariant {
    Compiled,
    Raw,
}

impl AssetVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetVariant::Compiled => "compiled",
            AssetVariant::Raw => "raw",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Script,
    Json,
    Raw,
}

impl AssetKind {
    pub fn is_executable(&self) -> bool {
        !matches!(self, AssetKind::Raw)
    }
}

#[derive(Debug, Clone)]
pub enum AssetContent {
    /// CommonJS-shaped module body
    Code(String),
    /// Verbatim bytes of a raw asset
    Bytes(Vec<u8>),
}

impl AssetContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AssetContent::Code(code) => code.as_bytes(),
            AssetContent::Bytes(bytes) => bytes,
        }
    }

    pub fn as_code(&self) -> Option<&str> {
        match self {
            AssetContent::Code(code) => Some(code),
            AssetContent::Bytes(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Inlined into the importer's bundle
    Sync,
    /// Root of a child bundle loaded on demand
    Async,
    /// Reference-only; the importer receives the emitted file's URL
    Url,
}

/// A dependency as declared by a transformer, before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRequest {
    pub specifier: String,
    pub kind: DependencyKind,
}

impl DependencyRequest {
    pub fn new(specifier: impl Into<String>, kind: DependencyKind) -> Self {
        Self {
            specifier: specifier.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dependency {
    pub specifier: String,
    pub kind: DependencyKind,
    /// Filled in once resolution succeeds; stays `None` for externals and failures
    pub resolved: Option<AssetIdx>,
}

/// One generated position mapped back to the original source (0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMapping {
    pub gen_line: u32,
    pub gen_col: u32,
    pub src_line: u32,
    pub src_col: u32,
}

/// Mapping from a module body back to its original file
#[derive(Debug, Clone, Default)]
pub struct ModuleSourceMap {
    pub source_contents: String,
    pub mappings: Vec<LineMapping>,
}

/// Result of running a transformer over one file
#[derive(Debug, Clone)]
pub struct TransformedAsset {
    pub kind: AssetKind,
    pub content: AssetContent,
    pub dependencies: Vec<DependencyRequest>,
    pub source_map: Option<ModuleSourceMap>,
}

#[derive(Debug, Clone)]
pub struct Asset {
    pub id: AssetId,
    pub file_path: PathBuf,
    pub kind: AssetKind,
    pub variant: AssetVariant,
    pub content: AssetContent,
    pub dependencies: Vec<Dependency>,
    pub source_map: Option<ModuleSourceMap>,
}

impl Asset {
    pub fn extension(&self) -> String {
        self.file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_else(|| "bin".to_string())
    }

    pub fn file_stem(&self) -> String {
        self.file_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("index")
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BundleType {
    Js,
    Map,
    /// Raw file bundle, named by its extension (e.g. `txt`)
    Raw(String),
}

impl fmt::Display for BundleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleType::Js => f.write_str("js"),
            BundleType::Map => f.write_str("map"),
            BundleType::Raw(ext) => f.write_str(ext),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bundle {
    pub id: BundleId,
    pub entry: AssetIdx,
    pub bundle_type: BundleType,
    /// Member assets in deterministic depth-first order, deduplicated
    pub assets: Vec<AssetIdx>,
    pub child_bundles: Vec<BundleId>,
    pub parent: Option<BundleId>,
    /// Output file name relative to the output directory
    pub name: String,
}

/// A rendered file waiting to be written under the output directory
#[derive(Debug, Clone)]
pub struct OutputArtifact {
    pub bundle: BundleId,
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl OutputArtifact {
    pub fn size(&self) -> usize {
        self.contents.len()
    }
}

/// The reported structure of a run, as inspected by tooling and tests
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub total_assets: usize,
    pub bundles: Vec<BundleReport>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleReport {
    pub name: String,
    #[serde(rename = "type")]
    pub bundle_type: String,
    pub entry: Option<PathBuf>,
    /// File names of member assets, in bundle order
    pub assets: Vec<String>,
    pub child_bundles: Vec<BundleReport>,
}

impl BundleReport {
    /// Depth-first search for a bundle by output name
    pub fn find(&self, name: &str) -> Option<&BundleReport> {
        if self.name == name {
            return Some(self);
        }
        self.child_bundles.iter().find_map(|child| child.find(name))
    }
}
