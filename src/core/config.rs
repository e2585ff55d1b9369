use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fs, path::PathBuf};
use tracing::{debug, warn};

/// One linked institution connection.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ItemConfig {
    pub name: String,
    pub token: String,
    /// Transaction-eligible account IDs to display names
    #[serde(default)]
    pub transactions: BTreeMap<String, String>,
    /// Investment-eligible account IDs to display names
    #[serde(default)]
    pub investments: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EnvironmentConfig {
    pub client_id: String,
    pub secret: String,
    /// Overrides `https://{environment}.plaid.com`
    #[serde(default)]
    pub base_url: Option<String>,
    /// Item IDs to item configuration
    #[serde(default)]
    pub items: BTreeMap<String, ItemConfig>,
}

impl EnvironmentConfig {
    fn validate(&self, environment: &str) -> Result<()> {
        if self.client_id.trim().is_empty() {
            bail!("Environment {environment:?} has no client_id");
        }
        if self.secret.trim().is_empty() {
            bail!("Environment {environment:?} has no secret");
        }
        if self.items.is_empty() {
            bail!("Environment {environment:?} has no items");
        }
        for (item_id, item) in &self.items {
            if item.name.trim().is_empty() {
                bail!("Item {item_id:?} in environment {environment:?} has no name");
            }
            if item.token.trim().is_empty() {
                bail!("Item {item_id:?} in environment {environment:?} has no token");
            }
            if item.transactions.is_empty() && item.investments.is_empty() {
                warn!(
                    item = %item_id,
                    "Item has no accounts configured, nothing will be requested"
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(transparent)]
pub struct AppConfig {
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "plaid2csv", "plaid2csv")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Selects and validates one environment.
    pub fn environment(&self, name: &str) -> Result<&EnvironmentConfig> {
        let env = self
            .environments
            .get(name)
            .ok_or_else(|| anyhow!("Unknown environment: {name:?}"))?;
        env.validate(name)?;
        Ok(env)
    }
}
