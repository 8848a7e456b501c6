// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// --- env defaults & names ---
pub const DEFAULT_CONFIG_PATH: &str = "config/news.toml";
pub const DEFAULT_FEED_URL: &str = "https://feed.qgis.org/";
/// Keys at or above this are reserved for injected entries.
pub const DEFAULT_PK_OFFSET: i64 = 10_000_000;

pub const ENV_CONFIG_PATH: &str = "NEWS_CONFIG_PATH";
pub const ENV_FEED_URL: &str = "NEWS_FEED_URL";
pub const ENV_PK_OFFSET: &str = "NEWS_PK_OFFSET";
pub const ENV_STATE_PATH: &str = "NEWS_STATE_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    /// The feed key for durable state is derived from this.
    pub feed_url: String,
    pub pk_offset: i64,
    /// JSON state file; in-memory state when unset.
    pub state_path: Option<PathBuf>,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            pk_offset: DEFAULT_PK_OFFSET,
            state_path: None,
        }
    }
}

impl NewsConfig {
    /// Load from an explicit TOML file. Missing keys fall back to defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading news config from {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("parsing news config in {}", path.display()))
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $NEWS_CONFIG_PATH
    /// 2) config/news.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("NEWS_CONFIG_PATH points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from(&default_p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var(ENV_FEED_URL) {
            if !url.trim().is_empty() {
                self.feed_url = url.trim().to_string();
            }
        }
        if let Ok(raw) = std::env::var(ENV_PK_OFFSET) {
            self.pk_offset = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_PK_OFFSET} is not an integer: {raw:?}"))?;
        }
        if let Ok(p) = std::env::var(ENV_STATE_PATH) {
            self.state_path = (!p.trim().is_empty()).then(|| PathBuf::from(p.trim()));
        }
        Ok(())
    }
}
