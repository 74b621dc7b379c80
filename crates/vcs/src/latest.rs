//! Latest-version resolution by scanning remote tags.

use std::sync::Arc;

use async_trait::async_trait;
use relshim_core::{CancellationToken, Error, LatestResolver, ReleaseTag, Result, VersionCriteria};
use tracing::debug;

use crate::remote::RemoteRefIndex;

/// [`LatestResolver`] that picks the greatest matching tag of the remote.
///
/// With [`VersionCriteria::any`] prereleases are skipped, so `latest` means
/// the newest stable release.
pub struct TagLatestResolver {
    index: Arc<dyn RemoteRefIndex>,
}

impl TagLatestResolver {
    /// Create a resolver over `index`.
    #[must_use]
    pub fn new(index: Arc<dyn RemoteRefIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl LatestResolver for TagLatestResolver {
    async fn resolve(
        &self,
        cancel: &CancellationToken,
        repository_url: &str,
        criteria: &VersionCriteria,
    ) -> Result<ReleaseTag> {
        let refs = self.index.list(cancel, repository_url).await?;

        let candidates = refs
            .iter()
            .filter_map(|r| r.tag_name())
            .filter_map(|name| ReleaseTag::parse(name).ok())
            .filter(|tag| criteria.matches(tag));

        let latest = ReleaseTag::greatest(candidates).ok_or_else(|| {
            Error::no_latest(
                repository_url,
                format!("no release tag matches '{criteria}'"),
            )
        })?;

        debug!(%repository_url, %criteria, tag = %latest, "Resolved latest release");
        Ok(latest)
    }
}
