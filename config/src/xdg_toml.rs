//! `$XDG_CONFIG_HOME/<app>/config.toml`: the `[env]` table and the `[improve]` defaults.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::{ImproveSettings, LoadError};

/// Config directory: `$XDG_CONFIG_HOME` when set, else the platform default.
fn config_home() -> Result<PathBuf, LoadError> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir().ok_or_else(|| LoadError::XdgPath("no config directory for this platform".into()))
}

/// Path of the app's `config.toml`, whether or not it exists.
pub fn config_path(app_name: &str) -> Result<PathBuf, LoadError> {
    Ok(config_home()?.join(app_name).join("config.toml"))
}

#[derive(Deserialize, Default)]
pub(crate) struct ConfigFile {
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub improve: ImproveSettings,
}

/// Parsed config file; a missing file is an empty config.
pub(crate) fn load(app_name: &str) -> Result<ConfigFile, LoadError> {
    let path = config_path(app_name)?;
    if !path.is_file() {
        return Ok(ConfigFile::default());
    }
    let content = std::fs::read_to_string(&path).map_err(LoadError::XdgRead)?;
    Ok(toml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_env_and_improve_tables() {
        let file: ConfigFile = toml::from_str(
            r#"
[env]
GROQ_API_KEY = "gsk-from-toml"

[improve]
model = "gpt-4o-mini"
candidates = 6
temperature = 0.3
synonym_db = "/var/lib/reformat/synonyms.db"
"#,
        )
        .unwrap();
        assert_eq!(file.env.get("GROQ_API_KEY").map(String::as_str), Some("gsk-from-toml"));
        assert_eq!(file.improve.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(file.improve.candidates, Some(6));
        assert_eq!(file.improve.temperature, Some(0.3));
        assert_eq!(file.improve.iterations, None);
        assert_eq!(
            file.improve.synonym_db,
            Some(PathBuf::from("/var/lib/reformat/synonyms.db"))
        );
    }

    #[test]
    fn other_tables_are_ignored() {
        let file: ConfigFile = toml::from_str("[other]\nkey = \"ignored\"\n").unwrap();
        assert!(file.env.is_empty());
        assert_eq!(file.improve, ImproveSettings::default());
    }

    #[test]
    fn unknown_improve_key_is_rejected() {
        let result: Result<ConfigFile, _> = toml::from_str("[improve]\ncandidate = 3\n");
        assert!(result.is_err());
    }
}
