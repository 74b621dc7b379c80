//! Resolve, fetch, verify and run.

use std::sync::Arc;

use relshim_cache::{ArtifactCache, ArtifactRequest, AssetTemplate, CacheStatus, CachedArtifact};
use relshim_core::{CancellationToken, Config, Platform, ReleaseTag, Result};
use relshim_tools_github::{GhAttestationVerifier, GitHubReleaseFetcher};
use relshim_vcs::{GitRemoteRefIndex, RefResolver, TagLatestResolver};
use tracing::{info, instrument};

use crate::exec;

/// Result of [`Shim::acquire`].
#[derive(Debug, Clone)]
pub struct Acquired {
    /// The release tag the ref resolved to.
    pub tag: ReleaseTag,
    /// The cached executable.
    pub artifact: CachedArtifact,
}

/// One configured shim invocation.
pub struct Shim {
    repository: String,
    reference: String,
    platform: Platform,
    template: AssetTemplate,
    resolver: RefResolver,
    cache: ArtifactCache,
}

impl std::fmt::Debug for Shim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shim")
            .field("repository", &self.repository)
            .field("reference", &self.reference)
            .field("platform", &self.platform)
            .field("pattern", &self.template.pattern())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Shim {
    /// Wire up the production collaborators: `git ls-remote`, the GitHub
    /// Releases API and, when enabled, `gh attestation verify`.
    ///
    /// # Errors
    ///
    /// Fails on an invalid asset pattern, an unsupported host platform or an
    /// HTTP client that cannot be built.
    pub fn from_config(config: Config) -> Result<Self> {
        let index = Arc::new(GitRemoteRefIndex::new());
        let latest = Arc::new(TagLatestResolver::new(index.clone()));
        let resolver = RefResolver::new(config.server_url.clone(), index, latest);

        let fetcher = Arc::new(GitHubReleaseFetcher::new(
            &config.server_url,
            config.github_token.clone(),
        )?);
        let mut cache = ArtifactCache::new(config.cache_dir.clone(), fetcher);
        if config.validate_attestations {
            let verifier = GhAttestationVerifier::new(config.github_token.clone())
                .with_server(&config.server_url);
            cache = cache.with_attestation(Arc::new(verifier), config.attestation_failure);
        }

        Self::with_parts(&config, Platform::current()?, resolver, cache)
    }

    /// Assemble a shim from already-built parts.
    ///
    /// # Errors
    ///
    /// Fails when the configured asset pattern is invalid.
    pub fn with_parts(
        config: &Config,
        platform: Platform,
        resolver: RefResolver,
        cache: ArtifactCache,
    ) -> Result<Self> {
        Ok(Self {
            repository: config.repository.clone(),
            reference: config.reference.clone(),
            platform,
            template: AssetTemplate::parse(&config.pattern)?,
            resolver,
            cache,
        })
    }

    /// Resolve the configured ref and make sure its binary is cached.
    ///
    /// # Errors
    ///
    /// Any resolution, download, verification or cancellation error.
    #[instrument(name = "acquire", skip_all, fields(repository = %self.repository, reference = %self.reference))]
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Acquired> {
        let tag = self
            .resolver
            .resolve(cancel, &self.repository, &self.reference)
            .await?;

        let request = ArtifactRequest {
            repository: self.repository.clone(),
            tag: tag.clone(),
            platform: self.platform,
            asset: self.template.render(&self.repository, &tag, self.platform),
        };
        let artifact = self.cache.get(cancel, &request).await?;

        match artifact.status {
            CacheStatus::Hit => info!(%tag, path = %artifact.path.display(), "Using cached binary"),
            CacheStatus::Downloaded => {
                info!(%tag, path = %artifact.path.display(), "Downloaded binary");
            }
        }

        Ok(Acquired { tag, artifact })
    }

    /// Acquire the binary and run it with `args`, returning its exit code.
    ///
    /// # Errors
    ///
    /// Errors from [`Shim::acquire`] and [`exec::run_binary`].
    pub async fn run(&self, cancel: &CancellationToken, args: &[String]) -> Result<i32> {
        let acquired = self.acquire(cancel).await?;
        exec::run_binary(cancel, &acquired.artifact.path, args).await
    }
}
