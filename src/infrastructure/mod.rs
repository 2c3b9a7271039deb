// Infrastructure layer
pub mod file_system;
pub mod packager;
pub mod path_aliases;
pub mod processors;
pub mod project_config;
pub mod resolver;

pub use file_system::*;
pub use packager::*;
pub use processors::*;
pub use project_config::*;
pub use resolver::*;
