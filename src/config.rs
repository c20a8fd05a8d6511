use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const API_KEY_VAR: &str = "LASTFM_API_KEY";
pub const API_SECRET_VAR: &str = "LASTFM_API_SECRET";
pub const SESSION_KEY_VAR: &str = "LASTFM_SESSION_KEY";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
}

/// Everything needed to scrobble on a user's behalf.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub session_key: String,
}

impl Config {
    /// Replaces file values with the `LASTFM_*` variables that are set.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(value) = lookup(API_KEY_VAR) {
            self.api_key = value;
        }
        if let Some(value) = lookup(API_SECRET_VAR) {
            self.api_secret = value;
        }
        if let Some(value) = lookup(SESSION_KEY_VAR) {
            self.session_key = Some(value);
        }
        self
    }

    pub fn require_keys(&self) -> Result<()> {
        if self.api_key.is_empty() || self.api_secret.is_empty() {
            bail!(
                "Please set {API_KEY_VAR} and {API_SECRET_VAR}, or run `npoleon set-keys`, before continuing."
            );
        }
        Ok(())
    }

    pub fn credentials(&self) -> Result<Credentials> {
        self.require_keys()?;
        let Some(session_key) = self.session_key.clone().filter(|key| !key.is_empty()) else {
            bail!("You are not authenticated, make sure you run `npoleon login` first.");
        };
        Ok(Credentials {
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
            session_key,
        })
    }
}

/// `~/.npoleon`, holding the config file and the scrobble ledger.
pub fn default_app_dir() -> PathBuf {
    let fallback = PathBuf::from(".npoleon");
    dirs::home_dir().map_or(fallback, |home| home.join(".npoleon"))
}

pub fn config_path(app_dir: &Path) -> PathBuf {
    app_dir.join("config.json")
}

/// Reads the config file. A file that does not exist yet is an empty config.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Config::default()),
        Err(err) => {
            return Err(err).with_context(|| format!("Failed reading config at {}", path.display()));
        }
    };
    serde_json::from_str(&raw).with_context(|| format!("Failed parsing config at {}", path.display()))
}

/// Writes the config as pretty JSON, creating the app directory on first use.
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed creating {}", dir.display()))?;
    }
    let mut serialized = serde_json::to_string_pretty(config).context("Failed serializing config")?;
    serialized.push('\n');
    fs::write(path, serialized).with_context(|| format!("Failed writing config at {}", path.display()))
}
