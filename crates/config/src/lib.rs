//! Configuration loading, validation and env substitution.
//!
//! Config files: `cloudmon.toml`, `cloudmon.yaml`, or `cloudmon.json`
//! Searched in `./` then `~/.config/cloudmon/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in all
//! string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        apply_env_overrides, clear_config_dir, config_dir, discover_and_load, find_config_file,
        load_config, set_config_dir,
    },
    schema::{BackendConfig, CloudmonConfig, ReporterConfig, ResourceConfig},
    validate::{Diagnostic, Severity, ValidationResult},
};
