//! Canonical release tags.
//!
//! Release tags are semantic versions rendered with a leading `v`. Input may
//! carry the prefix or not (`v1.2.3` and `1.2.3` are the same tag); output
//! always has it.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// A normalized semantic-version release tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseTag {
    version: semver::Version,
}

impl ReleaseTag {
    /// Parse a tag, accepting one optional leading `v`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSemver`] when the remainder is not
    /// `major.minor.patch[-prerelease][+build]`.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.strip_prefix('v').unwrap_or(input);
        semver::Version::parse(trimmed)
            .map(Self::new)
            .map_err(|source| Error::NotSemver {
                input: input.to_string(),
                source,
            })
    }

    /// Wrap an already parsed version.
    #[must_use]
    pub const fn new(version: semver::Version) -> Self {
        Self { version }
    }

    /// The underlying version.
    #[must_use]
    pub const fn version(&self) -> &semver::Version {
        &self.version
    }

    /// Canonical `v`-prefixed rendering.
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Whether the tag carries a prerelease component.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.version.pre.is_empty()
    }

    /// Semantic-version precedence: numeric core, then prerelease.
    ///
    /// A release outranks every prerelease of the same core. Build metadata
    /// does not take part, so `v1.0.0+a` and `v1.0.0+b` are `Equal` here.
    #[must_use]
    pub fn precedence(&self, other: &Self) -> Ordering {
        let (a, b) = (&self.version, &other.version);
        (a.major, a.minor, a.patch)
            .cmp(&(b.major, b.minor, b.patch))
            .then_with(|| a.pre.cmp(&b.pre))
    }

    /// Keep the greatest tag by precedence; the first one wins on ties.
    pub fn greatest<I>(tags: I) -> Option<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        tags.into_iter().fold(None, |best, tag| match best {
            Some(current) if tag.precedence(&current) != Ordering::Greater => Some(current),
            _ => Some(tag),
        })
    }
}

impl Ord for ReleaseTag {
    fn cmp(&self, other: &Self) -> Ordering {
        // Build metadata only breaks ties so that Ord stays consistent with Eq.
        self.precedence(other)
            .then_with(|| self.version.build.cmp(&other.version.build))
    }
}

impl PartialOrd for ReleaseTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for ReleaseTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ReleaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.version)
    }
}
