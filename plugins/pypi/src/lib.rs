pub mod detector;
pub mod requirement;
pub mod pyproject;
pub mod uv;
pub mod pylock;
pub mod requirements;
pub mod registry;
pub mod plugin;

pub use plugin::PyPiPlugin;
pub use registry::PyPiClient;
