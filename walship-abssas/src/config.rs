use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::access::AccessScope;
use crate::client::SasReplicaClient;
use crate::handle::{SasConnector, DEFAULT_TIMEOUT};
use crate::sas::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE};

/// Environment variable that replaces `url` from the config file.
pub const URL_ENV: &str = "WALSHIP_REPLICA_URL";

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaConfig {
    /// Capability URL: container, key prefix and access grant in one.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    #[serde(default)]
    pub page_size: Option<u32>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

impl ReplicaConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let mut config: ReplicaConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        config.apply_overrides(std::env::var(URL_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Configuration from the environment alone, for running without a file.
    pub fn from_env() -> anyhow::Result<Self> {
        let Some(url) = std::env::var(URL_ENV).ok() else {
            anyhow::bail!("{} is not set and no config file was given", URL_ENV);
        };
        let config = Self::with_url(url);
        config.validate()?;
        Ok(config)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_secs: default_timeout_secs(),
            block_size: default_block_size(),
            page_size: None,
        }
    }

    fn apply_overrides(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|u| !u.is_empty()) {
            self.url = url;
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.url.is_empty() {
            anyhow::bail!("url must not be empty (set it in the config file or {})", URL_ENV);
        }
        // Error messages never echo the URL: its query string is a credential.
        let url = Url::parse(&self.url).map_err(|e| anyhow::anyhow!("url is not valid: {}", e))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            anyhow::bail!("url must use http or https, got {}", url.scheme());
        }
        if url.host_str().is_none() {
            anyhow::bail!("url must include a host");
        }
        AccessScope::parse(&self.url)?;

        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than zero");
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            anyhow::bail!(
                "block_size must be between 1 and {} bytes, got {}",
                MAX_BLOCK_SIZE,
                self.block_size
            );
        }
        if self.page_size == Some(0) {
            anyhow::bail!("page_size must be greater than zero");
        }
        Ok(())
    }

    pub fn connector(&self) -> SasConnector {
        SasConnector {
            timeout: Duration::from_secs(self.timeout_secs),
            block_size: self.block_size,
            page_size: self.page_size,
        }
    }

    pub fn build_client(&self) -> anyhow::Result<SasReplicaClient> {
        Ok(SasReplicaClient::with_connector(
            &self.url,
            Box::new(self.connector()),
        )?)
    }
}
