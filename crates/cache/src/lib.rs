//! Release artifact cache for relshim.
//!
//! Artifacts are keyed by repository, tag and platform (see [`CacheKey`]).
//! A present file is a hit and is returned without touching the network or
//! re-verifying it. A miss is downloaded through a [`Fetcher`], installed
//! atomically, and optionally checked by an [`AttestationGate`].
//!
//! There is no lock file: two processes missing at once may both download,
//! and the atomic rename guarantees whoever wins leaves a complete file.

pub mod asset;
pub mod install;
pub mod layout;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use relshim_core::{
    AttestationFailurePolicy, AttestationGate, CancellationToken, Error, Fetcher, Platform,
    ReleaseTag, Result,
};
use tracing::{debug, info, warn};

pub use asset::AssetTemplate;
pub use layout::CacheKey;

/// What to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRequest {
    /// Repository as `owner/name`.
    pub repository: String,
    /// Resolved release tag.
    pub tag: ReleaseTag,
    /// Target platform.
    pub platform: Platform,
    /// Release asset name to download on a miss.
    pub asset: String,
}

impl ArtifactRequest {
    /// Cache key of this request.
    #[must_use]
    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.repository.clone(), self.tag.clone(), self.platform)
    }
}

/// How a lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// The file was already present.
    Hit,
    /// The file was downloaded by this call.
    Downloaded,
}

/// A cached, executable artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    /// Final path of the artifact.
    pub path: PathBuf,
    /// Hit or fresh download.
    pub status: CacheStatus,
    /// Bytes downloaded, when this call downloaded.
    pub downloaded_bytes: Option<u64>,
}

/// Cache of release binaries on local disk.
pub struct ArtifactCache {
    root: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    gate: Option<Arc<dyn AttestationGate>>,
    on_attestation_failure: AttestationFailurePolicy,
}

impl std::fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCache")
            .field("root", &self.root)
            .field("fetcher", &self.fetcher.name())
            .field("attestation", &self.gate.is_some())
            .field("on_attestation_failure", &self.on_attestation_failure)
            .finish()
    }
}

impl ArtifactCache {
    /// Cache rooted at `root`, downloading through `fetcher`, with no
    /// attestation gate.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            root: root.into(),
            fetcher,
            gate: None,
            on_attestation_failure: AttestationFailurePolicy::default(),
        }
    }

    /// Verify every fresh download with `gate`, handling failures per `policy`.
    #[must_use]
    pub fn with_attestation(
        mut self,
        gate: Arc<dyn AttestationGate>,
        policy: AttestationFailurePolicy,
    ) -> Self {
        self.gate = Some(gate);
        self.on_attestation_failure = policy;
        self
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `request` lives in the cache, whether or not it is present.
    #[must_use]
    pub fn path_for(&self, request: &ArtifactRequest) -> PathBuf {
        request.key().path_in(&self.root)
    }

    /// Return the artifact for `request`, downloading it on a miss.
    ///
    /// # Errors
    ///
    /// Fetch errors ([`Error::AssetNotFound`], [`Error::RemoteUnreachable`]),
    /// [`Error::Io`] for disk failures, [`Error::AttestationFailed`] when the
    /// gate rejects a download, and [`Error::Cancelled`].
    pub async fn get(
        &self,
        cancel: &CancellationToken,
        request: &ArtifactRequest,
    ) -> Result<CachedArtifact> {
        let path = self.path_for(request);

        if is_present(&path).await? {
            debug!(path = %path.display(), "Cache hit");
            return Ok(CachedArtifact {
                path,
                status: CacheStatus::Hit,
                downloaded_bytes: None,
            });
        }

        info!(
            fetcher = self.fetcher.name(),
            repository = %request.repository,
            tag = %request.tag,
            asset = %request.asset,
            "Downloading release asset"
        );
        let body = self
            .fetcher
            .fetch(cancel, &request.repository, &request.tag, &request.asset)
            .await?;
        let bytes = install::install(cancel, body, &path).await?;
        debug!(path = %path.display(), bytes, "Installed artifact");

        if let Some(gate) = &self.gate {
            self.attest(gate.as_ref(), cancel, &path, &request.repository)
                .await?;
        }

        Ok(CachedArtifact {
            path,
            status: CacheStatus::Downloaded,
            downloaded_bytes: Some(bytes),
        })
    }

    async fn attest(
        &self,
        gate: &dyn AttestationGate,
        cancel: &CancellationToken,
        path: &Path,
        repository: &str,
    ) -> Result<()> {
        let Err(err) = gate.verify(cancel, path, repository).await else {
            info!(path = %path.display(), "Attestation verified");
            return Ok(());
        };

        // Keep applies to rejections only. A check that did not complete
        // never leaves the file behind.
        let rejected = matches!(err, Error::AttestationFailed { .. });
        if !rejected || self.on_attestation_failure == AttestationFailurePolicy::Evict {
            match tokio::fs::remove_file(path).await {
                Ok(()) => info!(path = %path.display(), "Evicted unverified artifact"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to evict unverified artifact"),
            }
        }
        Err(err)
    }
}

async fn is_present(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(e, path, "stat")),
    }
}
