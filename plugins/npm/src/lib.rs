pub mod detector;
pub mod parser;
pub mod registry;
pub mod plugin;

pub use plugin::NpmPlugin;
pub use registry::NpmRegistryClient;
