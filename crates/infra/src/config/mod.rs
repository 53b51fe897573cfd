//! Configuration loading: env-first, TOML-file fallback.

pub mod loader;

pub use loader::{load, probe_config_paths};
