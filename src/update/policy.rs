//! Host allow-list applied to every outbound URL
//!
//! Both the release feed and the artifact download go through the same
//! check, including every hop of an HTTP redirect chain.

use super::error::{Result, UpdateError};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Hosts the updater is permitted to contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAllowList {
    hosts: Vec<String>,
    /// Permit plain `http` for loopback hosts (local test servers)
    #[serde(default)]
    allow_insecure_loopback: bool,
}

impl HostAllowList {
    /// Create an allow-list from exact host names
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.into().trim().trim_end_matches('.').to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
            allow_insecure_loopback: false,
        }
    }

    /// Allow `http://` for loopback hosts that are also on the list
    pub fn with_insecure_loopback(mut self, allow: bool) -> Self {
        self.allow_insecure_loopback = allow;
        self
    }

    /// Allowed host names
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Whether the URL may be requested
    pub fn permits(&self, url: &Url) -> bool {
        self.check(url).is_ok()
    }

    /// Validate a URL against scheme and host rules
    pub fn check(&self, url: &Url) -> Result<()> {
        if !url.username().is_empty() || url.password().is_some() {
            return Err(UpdateError::UrlRejected(format!(
                "credentials in URL are not allowed: {}",
                url.host_str().unwrap_or_default()
            )));
        }

        let host = url
            .host_str()
            .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
            .ok_or_else(|| UpdateError::UrlRejected(format!("URL has no host: {}", url)))?;

        // Exact match only; substring matching would admit look-alike domains
        if !self.hosts.iter().any(|allowed| *allowed == host) {
            return Err(UpdateError::UrlRejected(format!(
                "host {} is not on the allow-list",
                host
            )));
        }

        match url.scheme() {
            "https" => Ok(()),
            "http" if self.allow_insecure_loopback && is_loopback(&host) => Ok(()),
            scheme => Err(UpdateError::UrlRejected(format!(
                "scheme {} is not allowed for {}",
                scheme, url
            ))),
        }
    }

    /// Parse a raw URL string and validate it
    pub fn parse_and_check(&self, raw: &str) -> Result<Url> {
        let url = Url::parse(raw.trim())
            .map_err(|e| UpdateError::UrlRejected(format!("invalid URL {:?}: {}", raw, e)))?;
        self.check(&url)?;
        Ok(url)
    }
}

fn is_loopback(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1")
}

impl Default for HostAllowList {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_HOSTS.iter().copied())
    }
}

/// GitHub API and the hosts GitHub redirects release assets to
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &[
    "api.github.com",
    "github.com",
    "objects.githubusercontent.com",
    "release-assets.githubusercontent.com",
];
