use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use gatekeeper_db::StorePaths;
use serde::{Deserialize, Serialize};

const DEFAULT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub bot_token: String,
    pub panel: PanelConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Panel base URL including any web base path, e.g. `https://vpn.example.com:2053/xui`.
    pub api_url: String,
    pub login: String,
    pub password: String,
    /// Certificates are not checked unless this is set.
    #[serde(default)]
    pub verify_tls: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl PanelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Host name clients connect to, taken from `api_url`.
    pub fn host(&self) -> Result<String> {
        let url = url::Url::parse(&self.api_url)
            .with_context(|| format!("API_URL is not a valid URL: {}", self.api_url))?;
        url.host_str()
            .map(str::to_string)
            .with_context(|| format!("API_URL has no host: {}", self.api_url))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub approved_users_file: PathBuf,
    pub approval_requests_file: PathBuf,
    pub admin_ids_file: PathBuf,
}

impl StorageConfig {
    pub fn paths(&self) -> StorePaths {
        StorePaths {
            pending: self.approval_requests_file.clone(),
            approved: self.approved_users_file.clone(),
            admins: self.admin_ids_file.clone(),
        }
    }
}

impl BotConfig {
    pub fn load() -> Result<Self> {
        let mut config_paths: Vec<PathBuf> = Vec::new();
        if let Ok(path) = env::var("GATEKEEPER_CONFIG") {
            config_paths.push(path.into());
        }
        config_paths.push("/etc/gatekeeper/bot.toml".into());
        config_paths.push("./gatekeeper.toml".into());

        for path in config_paths {
            if let Ok(contents) = fs::read_to_string(&path) {
                tracing::info!("Loading config from {}", path.display());
                return Self::from_toml(&contents)
                    .with_context(|| format!("Invalid config file {}", path.display()));
            }
        }

        tracing::info!("Loading config from environment");
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.panel.timeout_secs == 0 {
            anyhow::bail!("panel timeout must be at least one second");
        }
        Ok(())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .with_context(|| format!("{} is not set", key))
        };

        let timeout_secs = match lookup("PANEL_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("PANEL_TIMEOUT_SECS is not a number: {}", raw))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let config = Self {
            bot_token: required("BOT_TOKEN")?,
            panel: PanelConfig {
                api_url: required("API_URL")?,
                login: required("API_AUTH_LOGIN")?,
                password: required("API_AUTH_PASSWORD")?,
                verify_tls: lookup("VERIFY_TLS").is_some_and(|v| parse_flag(&v)),
                timeout_secs,
            },
            storage: StorageConfig {
                approved_users_file: required("APPROVED_USERS_FILE")?.into(),
                approval_requests_file: required("APPROVAL_REQUESTS_FILE")?.into(),
                admin_ids_file: required("ADMIN_IDS_FILE")?.into(),
            },
        };
        config.validate()?;
        Ok(config)
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
