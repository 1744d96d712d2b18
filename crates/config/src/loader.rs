use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::CloudmonConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "cloudmon.toml",
    "cloudmon.yaml",
    "cloudmon.yml",
    "cloudmon.json",
];

/// Env vars consulted for the project id, first match wins.
const PROJECT_ENV_VARS: &[&str] = &["CLOUDMON_PROJECT", "GOOGLE_CLOUD_PROJECT"];

const ACCESS_TOKEN_ENV_VAR: &str = "CLOUDMON_ACCESS_TOKEN";

/// Overrides the user-global config directory (set by `--config-dir`).
static CONFIG_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Use `dir` instead of `~/.config/cloudmon/` for config discovery.
pub fn set_config_dir(dir: PathBuf) {
    let mut guard = CONFIG_DIR_OVERRIDE
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    *guard = Some(dir);
}

/// Drop a directory set with [`set_config_dir`].
pub fn clear_config_dir() {
    let mut guard = CONFIG_DIR_OVERRIDE
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    *guard = None;
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<CloudmonConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply env
/// overrides.
///
/// Search order:
/// 1. `./cloudmon.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/cloudmon/cloudmon.{toml,yaml,yml,json}` (user-global, or the
///    directory given to [`set_config_dir`])
///
/// Falls back to `CloudmonConfig::default()` if no file is found or it fails
/// to parse.
pub fn discover_and_load() -> CloudmonConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                CloudmonConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            CloudmonConfig::default()
        },
    };
    apply_env_overrides(&mut config);
    config
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/cloudmon/`).
pub fn config_dir() -> Option<PathBuf> {
    let guard = CONFIG_DIR_OVERRIDE
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(dir) = guard.as_ref() {
        return Some(dir.clone());
    }
    directories::ProjectDirs::from("", "", "cloudmon").map(|d| d.config_dir().to_path_buf())
}

/// Fill settings from the environment.
///
/// `CLOUDMON_PROJECT` (then `GOOGLE_CLOUD_PROJECT`) only applies when the
/// file left `project` empty. `CLOUDMON_ACCESS_TOKEN` always wins over the
/// file.
pub fn apply_env_overrides(config: &mut CloudmonConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut CloudmonConfig, lookup: impl Fn(&str) -> Option<String>) {
    if config.reporter.project.is_empty()
        && let Some(project) = PROJECT_ENV_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .find(|v| !v.is_empty())
    {
        config.reporter.project = project;
    }

    if let Some(token) = lookup(ACCESS_TOKEN_ENV_VAR).filter(|v| !v.is_empty()) {
        config.backend.access_token = Some(Secret::new(token));
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<CloudmonConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
