//! Configuration loading (§6, §0.3).

pub mod loader;
pub mod types;

pub use loader::{load_config, user_class_directory};
pub use types::{Config, ControllerConfig, OutputMapping, ParameterMapping, SensorMapping};
