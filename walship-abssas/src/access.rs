//! Capability URL parsing.
//!
//! A replica URL looks like
//! `https://account.blob.core.windows.net/{container}/{path...}?{sas-token}`.
//! The first path segment names the container; the rest is the key prefix
//! under which every replica object lives. The query string carries the
//! access grant and is kept verbatim.

use url::Url;
use walship_common::{ReplicaError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessScope {
    pub container: String,
    /// Key prefix inside the container, without leading or trailing slash.
    pub path: String,
    raw_url: String,
}

impl AccessScope {
    pub fn parse(raw_url: &str) -> Result<Self> {
        let url = Url::parse(raw_url).map_err(|e| ReplicaError::InvalidUrl(e.to_string()))?;

        let segments: Vec<String> = url
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                urlencoding::decode(s)
                    .map(|d| d.into_owned())
                    .map_err(|e| ReplicaError::InvalidUrl(e.to_string()))
            })
            .collect::<Result<_>>()?;

        let Some((container, rest)) = segments.split_first() else {
            return Err(ReplicaError::InvalidUrl(
                "missing container name in URL path".to_string(),
            ));
        };

        Ok(Self {
            container: container.clone(),
            path: rest.join("/"),
            raw_url: raw_url.to_string(),
        })
    }

    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    /// URL addressing the container itself, with the original query intact.
    pub fn container_url(&self) -> Result<Url> {
        let mut url =
            Url::parse(&self.raw_url).map_err(|e| ReplicaError::InvalidUrl(e.to_string()))?;
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(ReplicaError::InvalidUrl(format!(
                "URL has no host: {}",
                redact(&self.raw_url)
            )));
        }
        url.set_path(&format!("/{}", self.container));
        url.set_fragment(None);
        Ok(url)
    }
}

/// Strip the query string so access tokens never reach logs.
pub fn redact(raw_url: &str) -> &str {
    raw_url.split('?').next().unwrap_or(raw_url)
}
