//! Release fetcher - one GET of the release feed

use super::config::UpdaterConfig;
use super::error::{Result, UpdateError};
use super::policy::HostAllowList;
use super::release::{parse_release_payload, VersionInfo};
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_LENGTH};
use reqwest::Url;
use std::time::Duration;
use tracing::{debug, info};

/// Release metadata is small; anything larger is not a release feed
const MAX_METADATA_BYTES: usize = 1024 * 1024;

/// Redirect hops followed before giving up
const MAX_REDIRECTS: usize = 5;

/// Build an HTTP client whose redirect policy re-checks every hop.
///
/// `timeout` bounds the whole request; `None` leaves the body unbounded so
/// the caller can apply a per-read timeout instead.
pub(crate) fn build_client(
    policy: &HostAllowList,
    timeout: Option<Duration>,
    connect_timeout: Duration,
    user_agent: &str,
) -> Result<reqwest::Client> {
    let redirect_policy = policy.clone();
    let redirect = reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error(format!("more than {} redirects", MAX_REDIRECTS))
        } else if let Err(e) = redirect_policy.check(attempt.url()) {
            attempt.error(e.to_string())
        } else {
            attempt.follow()
        }
    });

    let mut builder = reqwest::Client::builder()
        .user_agent(user_agent)
        .connect_timeout(connect_timeout)
        .redirect(redirect)
        .https_only(false);

    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }

    builder
        .build()
        .map_err(|e| UpdateError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// User-Agent sent with every request
pub fn user_agent(local_version: &str) -> String {
    format!("BashAndDash-Updater/{}", local_version)
}

/// Fetches the latest release from the configured endpoint
pub struct ReleaseFetcher {
    client: reqwest::Client,
    endpoint: Url,
    policy: HostAllowList,
    asset_suffix: String,
}

impl ReleaseFetcher {
    /// Create a fetcher; the endpoint itself must pass the allow-list
    pub fn new(config: &UpdaterConfig, local_version: &str) -> Result<Self> {
        let policy = config.policy();
        let endpoint = policy.parse_and_check(&config.endpoint)?;
        let client = build_client(
            &policy,
            Some(config.request_timeout),
            config.connect_timeout,
            &user_agent(local_version),
        )?;

        Ok(Self {
            client,
            endpoint,
            policy,
            asset_suffix: config.asset_suffix.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Fetch and parse the latest release metadata
    pub async fn fetch_latest(&self) -> Result<VersionInfo> {
        info!("Checking for updates at: {}", self.endpoint);

        let response = self
            .client
            .get(self.endpoint.clone())
            .header(ACCEPT, "application/json, text/plain")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Network(format!(
                "Server returned status: {}",
                status
            )));
        }

        if let Some(length) = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok())
        {
            if length > MAX_METADATA_BYTES {
                return Err(UpdateError::MalformedResponse(format!(
                    "release metadata too large: {} bytes",
                    length
                )));
            }
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > MAX_METADATA_BYTES {
                return Err(UpdateError::MalformedResponse(format!(
                    "release metadata exceeds {} bytes",
                    MAX_METADATA_BYTES
                )));
            }
            body.extend_from_slice(&chunk);
        }

        debug!(bytes = body.len(), "Release metadata received");

        let info = parse_release_payload(&body, &self.policy, &self.asset_suffix)?;
        info!(
            version = %info.version(),
            url = %info.download_url(),
            has_checksum = info.expected_hash().is_some(),
            "Latest release resolved"
        );
        Ok(info)
    }
}
