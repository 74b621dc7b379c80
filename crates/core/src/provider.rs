//! Collaborator traits the resolver and the cache depend on.
//!
//! Each network or subprocess capability the pipeline needs sits behind one
//! narrow trait so that it can be replaced (an in-process attestation
//! verifier, a mirror instead of GitHub, fakes in tests) without touching
//! resolution or caching logic.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::version::ReleaseTag;
use crate::{Error, Result};

/// A streamed artifact body.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Selection criteria for the latest-version resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCriteria {
    requirement: semver::VersionReq,
}

impl VersionCriteria {
    /// Unconstrained selection (`*`), which skips prereleases.
    #[must_use]
    pub const fn any() -> Self {
        Self {
            requirement: semver::VersionReq::STAR,
        }
    }

    /// Parse a constraint such as `^1.2` or `>=2, <3`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid constraint.
    pub fn parse(constraint: &str) -> Result<Self> {
        semver::VersionReq::parse(constraint)
            .map(|requirement| Self { requirement })
            .map_err(|e| Error::configuration(format!("invalid version constraint '{constraint}': {e}")))
    }

    /// Whether `tag` satisfies the criteria.
    #[must_use]
    pub fn matches(&self, tag: &ReleaseTag) -> bool {
        self.requirement.matches(tag.version())
    }
}

impl Default for VersionCriteria {
    fn default() -> Self {
        Self::any()
    }
}

impl std::fmt::Display for VersionCriteria {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.requirement)
    }
}

/// Resolves the newest release of a repository.
#[async_trait]
pub trait LatestResolver: Send + Sync {
    /// Return the greatest release tag of `repository_url` matching `criteria`.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote cannot be listed or no tag matches.
    async fn resolve(
        &self,
        cancel: &CancellationToken,
        repository_url: &str,
        criteria: &VersionCriteria,
    ) -> Result<ReleaseTag>;
}

/// Retrieves a named asset from a tagged release.
///
/// Implementations are constructed with the server they talk to, so callers
/// pass only the `owner/name` repository.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Short name for logs (e.g., "github").
    fn name(&self) -> &'static str;

    /// Open a stream over the bytes of `asset` in release `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssetNotFound`] when the release or asset does not
    /// exist and [`Error::RemoteUnreachable`] for transport failures.
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        repository: &str,
        tag: &ReleaseTag,
        asset: &str,
    ) -> Result<ByteStream>;
}

/// Pass/fail provenance check run on a freshly downloaded artifact.
#[async_trait]
pub trait AttestationGate: Send + Sync {
    /// Verify that `path` was built by `repository`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AttestationFailed`] carrying the verifier's diagnostics.
    async fn verify(&self, cancel: &CancellationToken, path: &Path, repository: &str) -> Result<()>;
}
