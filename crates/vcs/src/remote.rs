//! Listing a remote repository's tags and branches.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use relshim_core::{CancellationToken, Error, Result, cancel};
use tokio::process::Command;
use tracing::debug;

/// Prefix of tag refs.
pub const TAG_PREFIX: &str = "refs/tags/";
/// Prefix of branch refs.
pub const HEAD_PREFIX: &str = "refs/heads/";
/// Suffix `git ls-remote` appends to the peeled commit of an annotated tag.
const PEELED_SUFFIX: &str = "^{}";

/// One entry of a remote's ref namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    /// Commit the ref points at.
    pub commit: String,
    /// Full symbolic name, e.g. `refs/tags/v1.2.3`.
    pub name: String,
}

impl RemoteRef {
    /// Create a new ref entry.
    #[must_use]
    pub fn new(commit: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            commit: commit.into(),
            name: name.into(),
        }
    }

    /// Tag name when this is a tag ref.
    #[must_use]
    pub fn tag_name(&self) -> Option<&str> {
        self.name.strip_prefix(TAG_PREFIX)
    }

    /// Branch name when this is a branch ref.
    #[must_use]
    pub fn branch_name(&self) -> Option<&str> {
        self.name.strip_prefix(HEAD_PREFIX)
    }
}

/// Fetches a snapshot of every tag and branch of a remote.
#[async_trait]
pub trait RemoteRefIndex: Send + Sync {
    /// List the refs of `repository_url` with one remote call.
    ///
    /// Ordering follows the remote's listing; callers must not depend on it
    /// except where documented.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteUnreachable`] on network or auth failure.
    async fn list(&self, cancel: &CancellationToken, repository_url: &str) -> Result<Vec<RemoteRef>>;
}

/// [`RemoteRefIndex`] backed by `git ls-remote`.
#[derive(Debug, Clone)]
pub struct GitRemoteRefIndex {
    program: String,
}

impl Default for GitRemoteRefIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl GitRemoteRefIndex {
    /// Use the `git` found on `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("git")
    }

    /// Use a specific git executable.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl RemoteRefIndex for GitRemoteRefIndex {
    async fn list(&self, cancel: &CancellationToken, repository_url: &str) -> Result<Vec<RemoteRef>> {
        debug!(program = %self.program, %repository_url, "Listing remote refs");

        let mut command = Command::new(&self.program);
        command
            .args(["ls-remote", "--tags", "--heads", repository_url])
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cancel::run(cancel, "listing remote refs", async {
            command.output().await.map_err(|e| {
                Error::remote_unreachable(repository_url, format!("failed to run {}: {e}", self.program))
            })
        })
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::remote_unreachable(
                repository_url,
                format!("git ls-remote exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let refs = parse_ls_remote(&String::from_utf8_lossy(&output.stdout));
        debug!(count = refs.len(), "Listed remote refs");
        Ok(refs)
    }
}

/// Parse `git ls-remote` output (`<commit>\t<ref>` per line).
///
/// An annotated tag shows up twice: once for the tag object and once, with a
/// `^{}` suffix, for the commit it peels to. The peeled commit replaces the
/// tag object in the original entry, so each tag maps to its commit and
/// listing order is kept.
#[must_use]
pub fn parse_ls_remote(output: &str) -> Vec<RemoteRef> {
    let mut refs: Vec<RemoteRef> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for line in output.lines() {
        let Some((commit, name)) = line.split_once('\t') else {
            continue;
        };
        let (commit, name) = (commit.trim(), name.trim());
        if commit.is_empty() || name.is_empty() {
            continue;
        }

        if let Some(tag) = name.strip_suffix(PEELED_SUFFIX) {
            match positions.get(tag) {
                Some(&index) => refs[index].commit = commit.to_string(),
                None => {
                    positions.insert(tag.to_string(), refs.len());
                    refs.push(RemoteRef::new(commit, tag));
                }
            }
            continue;
        }

        positions.insert(name.to_string(), refs.len());
        refs.push(RemoteRef::new(commit, name));
    }

    refs
}
