//! Release asset downloads through the GitHub REST API.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use relshim_core::{ByteStream, CancellationToken, Error, Fetcher, ReleaseTag, Result, cancel};
use reqwest::{Client, RequestBuilder, StatusCode, header};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

/// API host of github.com.
pub const GITHUB_API: &str = "https://api.github.com";

const GITHUB_COM: &str = "https://github.com";
const API_VERSION: &str = "2022-11-28";

/// Release metadata from the API.
#[derive(Debug, Deserialize)]
struct Release {
    assets: Vec<Asset>,
}

/// Release asset.
#[derive(Debug, Deserialize)]
struct Asset {
    id: u64,
    name: String,
}

/// [`Fetcher`] that downloads release assets from GitHub or GitHub
/// Enterprise Server.
///
/// Looks the release up by tag, finds the asset by exact name, then streams
/// it from the assets endpoint (following the redirect to storage).
pub struct GitHubReleaseFetcher {
    client: Client,
    api_base: String,
    token: Option<SecretString>,
}

impl std::fmt::Debug for GitHubReleaseFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubReleaseFetcher")
            .field("api_base", &self.api_base)
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl GitHubReleaseFetcher {
    /// Fetcher for repositories on `server_url`, authenticating with `token`
    /// when given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the HTTP client cannot be built.
    pub fn new(server_url: &str, token: Option<SecretString>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("relshim/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base_for(server_url),
            token,
        })
    }

    /// Override the API base URL.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// API base URL in use.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self
            .client
            .get(url)
            .header("X-GitHub-Api-Version", API_VERSION);
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn fetch_release(&self, repository: &str, tag: &str) -> Result<Release> {
        let url = format!("{}/repos/{}/releases/tags/{}", self.api_base, repository, tag);
        debug!(%url, "Fetching GitHub release");

        let response = self
            .get(&url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| Error::remote_unreachable(&url, e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(Error::asset_not_found(repository, tag, "", Vec::new())),
            status if !status.is_success() => Err(Error::remote_unreachable(
                &url,
                format!("release lookup returned HTTP {status}"),
            )),
            _ => response
                .json()
                .await
                .map_err(|e| Error::remote_unreachable(&url, format!("invalid release JSON: {e}"))),
        }
    }

    async fn open_asset(&self, repository: &str, tag: &str, asset: &str) -> Result<ByteStream> {
        let release = self
            .fetch_release(repository, tag)
            .await
            .map_err(|e| match e {
                Error::AssetNotFound { .. } => {
                    Error::asset_not_found(repository, tag, asset, Vec::new())
                }
                other => other,
            })?;

        let Some(found) = release.assets.iter().find(|a| a.name == asset) else {
            let available = release.assets.into_iter().map(|a| a.name).collect();
            return Err(Error::asset_not_found(repository, tag, asset, available));
        };

        let url = format!("{}/repos/{}/releases/assets/{}", self.api_base, repository, found.id);
        debug!(%url, %asset, "Downloading GitHub asset");

        let response = self
            .get(&url)
            .header(header::ACCEPT, "application/octet-stream")
            .send()
            .await
            .map_err(|e| Error::remote_unreachable(&url, e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(Error::asset_not_found(repository, tag, asset, Vec::new())),
            status if !status.is_success() => Err(Error::remote_unreachable(
                &url,
                format!("asset download returned HTTP {status}"),
            )),
            _ => Ok(response
                .bytes_stream()
                .map_err(std::io::Error::other)
                .boxed()),
        }
    }
}

#[async_trait]
impl Fetcher for GitHubReleaseFetcher {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        repository: &str,
        tag: &ReleaseTag,
        asset: &str,
    ) -> Result<ByteStream> {
        let tag = tag.render();
        cancel::run(
            cancel,
            "fetching release asset",
            self.open_asset(repository, &tag, asset),
        )
        .await
    }
}

/// REST API base for a server URL.
///
/// github.com uses `api.github.com`; Enterprise Server exposes the API under
/// `/api/v3` on the same host.
#[must_use]
pub fn api_base_for(server_url: &str) -> String {
    let server = server_url.trim_end_matches('/');
    if server.is_empty() || server == GITHUB_COM {
        GITHUB_API.to_string()
    } else {
        format!("{server}/api/v3")
    }
}
