//! Release asset name templates.

use std::fmt::Write as _;

use relshim_core::{Error, Platform, ReleaseTag, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
    Repo,
    RepoName,
    Tag,
    Version,
    Os,
    Arch,
    Ext,
}

impl Placeholder {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "repo" => Some(Self::Repo),
            "repo_name" => Some(Self::RepoName),
            "tag" => Some(Self::Tag),
            "version" => Some(Self::Version),
            "os" => Some(Self::Os),
            "arch" => Some(Self::Arch),
            "ext" => Some(Self::Ext),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// A parsed asset name pattern such as `{repo_name}-{os}-{arch}{ext}`.
///
/// Placeholders: `{repo}` (`owner/name`), `{repo_name}`, `{tag}` (with `v`),
/// `{version}` (without `v`), `{os}`, `{arch}`, `{ext}` (`.exe` on windows).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetTemplate {
    pattern: String,
    segments: Vec<Segment>,
}

impl AssetTemplate {
    /// Parse `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown or unterminated
    /// placeholder.
    pub fn parse(pattern: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = pattern;

        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| {
                Error::configuration_with_help(
                    format!("unterminated placeholder in asset pattern '{pattern}'"),
                    "Close every '{' with a matching '}'",
                )
            })?;
            let name = &after[..close];
            let placeholder = Placeholder::parse(name).ok_or_else(|| {
                Error::configuration_with_help(
                    format!("unknown placeholder '{{{name}}}' in asset pattern '{pattern}'"),
                    "Available placeholders: {repo}, {repo_name}, {tag}, {version}, {os}, {arch}, {ext}",
                )
            })?;
            segments.push(Segment::Placeholder(placeholder));
            rest = &after[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
        })
    }

    /// The pattern as written.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Asset name for `repository` at `tag` on `platform`.
    #[must_use]
    pub fn render(&self, repository: &str, tag: &ReleaseTag, platform: Platform) -> String {
        let repo_name = repository
            .split_once('/')
            .map_or(repository, |(_, name)| name);

        let mut out = String::with_capacity(self.pattern.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(Placeholder::Repo) => out.push_str(repository),
                Segment::Placeholder(Placeholder::RepoName) => out.push_str(repo_name),
                Segment::Placeholder(Placeholder::Tag) => out.push_str(&tag.render()),
                Segment::Placeholder(Placeholder::Version) => {
                    let _ = write!(out, "{}", tag.version());
                }
                Segment::Placeholder(Placeholder::Os) => {
                    let _ = write!(out, "{}", platform.os);
                }
                Segment::Placeholder(Placeholder::Arch) => {
                    let _ = write!(out, "{}", platform.arch);
                }
                Segment::Placeholder(Placeholder::Ext) => {
                    out.push_str(platform.executable_suffix());
                }
            }
        }
        out
    }
}

impl std::str::FromStr for AssetTemplate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
