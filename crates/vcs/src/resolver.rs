//! Turning a caller-supplied ref into a canonical release tag.

use std::sync::Arc;

use relshim_core::{
    CancellationToken, Error, LatestResolver, ReleaseTag, Result, VersionCriteria,
};
use tracing::{debug, info};

use crate::remote::{HEAD_PREFIX, RemoteRef, RemoteRefIndex, TAG_PREFIX};

/// The ref that asks for the newest release.
pub const LATEST: &str = "latest";

/// Resolves refs (`latest`, a version tag, a branch or a commit) to the
/// highest semantic-version tag they stand for.
pub struct RefResolver {
    server_url: String,
    index: Arc<dyn RemoteRefIndex>,
    latest: Arc<dyn LatestResolver>,
}

impl RefResolver {
    /// Create a resolver for repositories hosted on `server_url`.
    #[must_use]
    pub fn new(
        server_url: impl Into<String>,
        index: Arc<dyn RemoteRefIndex>,
        latest: Arc<dyn LatestResolver>,
    ) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            index,
            latest,
        }
    }

    /// URL of `repository` (`owner/name`) on the configured server.
    #[must_use]
    pub fn repository_url(&self, repository: &str) -> String {
        format!("{}/{}", self.server_url, repository)
    }

    /// Resolve `reference` for `repository`.
    ///
    /// 1. `latest` is delegated to the latest resolver.
    /// 2. A valid semantic version is returned as-is, without asking the
    ///    remote whether it exists.
    /// 3. Anything else is looked up in the remote listing (see
    ///    [`select_tag`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoLatest`] when `latest` cannot be resolved,
    /// [`Error::RemoteUnreachable`] when the listing fails, and
    /// [`Error::NoTagForCommit`] when nothing tagged matches.
    pub async fn resolve(
        &self,
        cancel: &CancellationToken,
        repository: &str,
        reference: &str,
    ) -> Result<ReleaseTag> {
        let url = self.repository_url(repository);

        if reference == LATEST {
            let tag = self
                .latest
                .resolve(cancel, &url, &VersionCriteria::any())
                .await
                .map_err(|e| match e {
                    Error::Cancelled { .. } => e,
                    Error::NoLatest { message, .. } => Error::no_latest(repository, message),
                    other => Error::no_latest(repository, other.to_string()),
                })?;
            info!(%repository, %tag, "Resolved latest release");
            return Ok(tag);
        }

        if let Ok(tag) = ReleaseTag::parse(reference) {
            debug!(%reference, %tag, "Ref is already a version tag");
            return Ok(tag);
        }

        let refs = self.index.list(cancel, &url).await?;
        let tag = select_tag(&refs, reference)?;
        info!(%repository, %reference, %tag, "Resolved ref to release tag");
        Ok(tag)
    }
}

/// The commit `reference` points at in `refs`.
///
/// The first entry named `refs/tags/<reference>` or `refs/heads/<reference>`
/// wins, so when a tag and a branch share a name the listing order decides.
/// With no match the reference is taken to be a commit id itself.
#[must_use]
pub fn target_commit<'a>(refs: &'a [RemoteRef], reference: &'a str) -> &'a str {
    refs.iter()
        .find(|r| {
            r.name.strip_prefix(TAG_PREFIX) == Some(reference)
                || r.name.strip_prefix(HEAD_PREFIX) == Some(reference)
        })
        .map_or(reference, |r| r.commit.as_str())
}

/// Highest version tag pointing at the commit `reference` resolves to.
///
/// Tag names that are not semantic versions are skipped.
///
/// # Errors
///
/// Returns [`Error::NoTagForCommit`] when no version tag points at the commit.
pub fn select_tag(refs: &[RemoteRef], reference: &str) -> Result<ReleaseTag> {
    let commit = target_commit(refs, reference);

    let tags = refs
        .iter()
        .filter(|r| r.commit == commit)
        .filter_map(RemoteRef::tag_name)
        .filter_map(|name| match ReleaseTag::parse(name) {
            Ok(tag) => Some(tag),
            Err(_) => {
                debug!(tag = name, %commit, "Skipping non-semver tag");
                None
            }
        });

    ReleaseTag::greatest(tags).ok_or_else(|| Error::no_tag_for_commit(reference, commit))
}
