// Per-type transformers, module lowering and minification
pub mod asset_processor;
pub mod common;
pub mod minifier;
pub mod module_lowering;
pub mod registry;
pub mod script_transformer;

pub use asset_processor::*;
pub use common::is_valid_identifier;
pub use minifier::*;
pub use registry::*;
pub use script_transformer::*;
