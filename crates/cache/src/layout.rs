//! Where cached artifacts live.
//!
//! ```text
//! <root>/
//! └── <owner>--<repo>/
//!     └── <tag>/
//!         └── <repo>-<os>-<arch>[.exe]
//! ```
//!
//! The layout is a pure function of the key, so a hit never needs the
//! network.

use std::path::{Path, PathBuf};

use relshim_core::{Platform, ReleaseTag};

/// Separator replacing `/` in the repository directory name.
const OWNER_SEPARATOR: &str = "--";

/// Identity of one cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    repository: String,
    tag: ReleaseTag,
    platform: Platform,
}

impl CacheKey {
    /// Key for `repository` (`owner/name`) at `tag` on `platform`.
    #[must_use]
    pub fn new(repository: impl Into<String>, tag: ReleaseTag, platform: Platform) -> Self {
        Self {
            repository: repository.into(),
            tag,
            platform,
        }
    }

    /// Repository as `owner/name`.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Release tag.
    #[must_use]
    pub const fn tag(&self) -> &ReleaseTag {
        &self.tag
    }

    /// Target platform.
    #[must_use]
    pub const fn platform(&self) -> Platform {
        self.platform
    }

    /// Repository name without its owner.
    #[must_use]
    pub fn repo_name(&self) -> &str {
        self.repository
            .split_once('/')
            .map_or(self.repository.as_str(), |(_, name)| name)
    }

    /// Directory holding every version of the repository.
    #[must_use]
    pub fn repository_dir_name(&self) -> String {
        self.repository.replace('/', OWNER_SEPARATOR)
    }

    /// File name of the cached executable.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{}{}",
            self.repo_name(),
            self.platform.os,
            self.platform.arch,
            self.platform.executable_suffix()
        )
    }

    /// Path relative to the cache root.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.repository_dir_name())
            .join(self.tag.render())
            .join(self.file_name())
    }

    /// Absolute path under `root`.
    #[must_use]
    pub fn path_in(&self, root: &Path) -> PathBuf {
        root.join(self.relative_path())
    }
}
