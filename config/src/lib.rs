//! Load configuration from XDG `config.toml` and the project `.env`, then apply it to the
//! process environment with priority: **existing env > .env > XDG**.
//!
//! The same `config.toml` may carry an `[improve]` table with defaults for the
//! `reformat improve` flags; see [`load_improve_settings`].

mod env_file;
mod xdg_toml;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub use xdg_toml::config_path;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("xdg config path: {0}")]
    XdgPath(String),
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    Dotenv(String),
}

/// Defaults for `reformat improve`, from the `[improve]` table. Every key is optional and
/// command-line flags take precedence.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImproveSettings {
    pub model: Option<String>,
    pub judge_model: Option<String>,
    pub candidates: Option<usize>,
    pub iterations: Option<usize>,
    pub temperature: Option<f64>,
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub synonym_db: Option<PathBuf>,
    pub lexicon: Option<PathBuf>,
}

/// Loads `config.toml` `[env]` and the project `.env`, then sets environment variables only
/// for keys that are **not** already set.
///
/// When a key is missing from the process environment:
/// 1. the value from the project `.env` (current directory, or `override_dir`) is used,
/// 2. else the value from `$XDG_CONFIG_HOME/<app_name>/config.toml` `[env]`.
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let xdg_map = xdg_toml::load(app_name)?.env;
    let dotenv_map = env_file::load_env_map(override_dir)?;

    let mut keys: HashSet<&String> = xdg_map.keys().collect();
    keys.extend(dotenv_map.keys());

    for key in keys {
        if std::env::var_os(key).is_some() {
            continue;
        }
        if let Some(v) = dotenv_map.get(key).or_else(|| xdg_map.get(key)) {
            std::env::set_var(key, v);
        }
    }
    Ok(())
}

/// Reads the `[improve]` table; missing file or table yields all-`None` settings.
pub fn load_improve_settings(app_name: &str) -> Result<ImproveSettings, LoadError> {
    Ok(xdg_toml::load(app_name)?.improve)
}
