use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Fallback backend address when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Environment override for the backend address.
pub const BASE_URL_ENV: &str = "LIGHTBOX_API_BASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub server_url: Option<String>,
    pub token: Option<String>,
}

impl Config {
    pub fn config_path() -> anyhow::Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "lightbox", "lightbox")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Backend address: environment, then config file, then the local default.
    pub fn base_url(&self) -> String {
        resolve_base_url(std::env::var(BASE_URL_ENV).ok(), self.server_url.as_deref())
    }
}

pub fn resolve_base_url(from_env: Option<String>, configured: Option<&str>) -> String {
    let url = from_env
        .filter(|u| !u.trim().is_empty())
        .or_else(|| configured.filter(|u| !u.trim().is_empty()).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    url.trim().trim_end_matches('/').to_string()
}
