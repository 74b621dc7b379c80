//! Error types shared by every relshim crate.

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Errors produced while resolving, fetching, verifying or running a release.
///
/// Nothing in the pipeline retries on any of these; each one is wrapped with
/// the stage and identifiers involved and surfaced to the binary, which is
/// the only place that turns it into a message and an exit code.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A string that was expected to be a semantic version is not one.
    #[error("'{input}' is not a semantic version: {source}")]
    #[diagnostic(
        code(relshim::version::not_semver),
        help("Expected major.minor.patch[-prerelease][+build] with an optional leading 'v'")
    )]
    NotSemver {
        /// The rejected input.
        input: String,
        /// Parser failure.
        #[source]
        source: semver::Error,
    },

    /// The remote could not be reached or refused the request.
    #[error("Remote {remote} is unreachable: {message}")]
    #[diagnostic(
        code(relshim::remote::unreachable),
        help("Check network access and credentials for the repository")
    )]
    RemoteUnreachable {
        /// Remote URL or API endpoint.
        remote: String,
        /// What went wrong.
        message: String,
    },

    /// The latest-version resolver produced nothing usable.
    #[error("Failed to resolve the latest version of {repository}: {message}")]
    #[diagnostic(code(relshim::resolve::no_latest))]
    NoLatest {
        /// Repository being resolved.
        repository: String,
        /// Resolver failure.
        message: String,
    },

    /// No semantic-version tag points at the commit a ref resolved to.
    #[error("No semantic version tag found for '{reference}' (commit {commit})")]
    #[diagnostic(
        code(relshim::resolve::no_tag_for_commit),
        help("Tag the commit with a release version, or pass a version tag directly")
    )]
    NoTagForCommit {
        /// The ref supplied by the caller.
        reference: String,
        /// The commit the ref was resolved to.
        commit: String,
    },

    /// The release or the requested asset does not exist.
    #[error("Asset '{asset}' not found in release {repository}@{tag}{}", available_suffix(.available))]
    #[diagnostic(
        code(relshim::fetch::asset_not_found),
        help("Check the asset pattern against the files published on the release")
    )]
    AssetNotFound {
        /// Repository in owner/name form.
        repository: String,
        /// Release tag.
        tag: String,
        /// Asset name that was looked up.
        asset: String,
        /// Asset names the release does publish, when known.
        available: Vec<String>,
    },

    /// The attestation verifier rejected a downloaded artifact.
    #[error("Attestation verification failed for {}: {stderr}", path.display())]
    #[diagnostic(
        code(relshim::attestation::failed),
        help("The artifact could not be proven to come from the repository's build")
    )]
    AttestationFailed {
        /// Artifact that was checked.
        path: Box<Path>,
        /// Diagnostic output captured from the verifier.
        stderr: String,
    },

    /// Invalid or missing configuration.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(relshim::config))]
    Configuration {
        /// What is wrong.
        message: String,
        /// Optional hint for the user.
        #[help]
        help: Option<String>,
    },

    /// The host platform has no release mapping.
    #[error("Unsupported platform: {message}")]
    #[diagnostic(code(relshim::platform))]
    Platform {
        /// Description of the platform.
        message: String,
    },

    /// I/O error with path context.
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(relshim::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available.
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "create", "rename").
        operation: String,
    },

    /// A subprocess could not be started or waited on.
    #[error("Failed to execute {command}: {message}")]
    #[diagnostic(code(relshim::exec))]
    Execution {
        /// Program that was run.
        command: String,
        /// What went wrong.
        message: String,
    },

    /// The operation was interrupted by a signal.
    #[error("Cancelled while {operation}")]
    #[diagnostic(code(relshim::cancelled))]
    Cancelled {
        /// The stage that was in flight.
        operation: String,
    },

    /// Anything that should not happen.
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(relshim::internal),
        help("Run with RUST_LOG=debug for more information")
    )]
    Internal {
        /// Diagnostic text.
        message: String,
    },
}

fn available_suffix(available: &[String]) -> String {
    if available.is_empty() {
        String::new()
    } else {
        format!(" (available: {})", available.join(", "))
    }
}

impl Error {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: None,
        }
    }

    /// Create a configuration error with help text.
    #[must_use]
    pub fn configuration_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a remote-unreachable error.
    #[must_use]
    pub fn remote_unreachable(remote: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteUnreachable {
            remote: remote.into(),
            message: message.into(),
        }
    }

    /// Create a no-latest error.
    #[must_use]
    pub fn no_latest(repository: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NoLatest {
            repository: repository.into(),
            message: message.into(),
        }
    }

    /// Create a no-tag-for-commit error.
    #[must_use]
    pub fn no_tag_for_commit(reference: impl Into<String>, commit: impl Into<String>) -> Self {
        Self::NoTagForCommit {
            reference: reference.into(),
            commit: commit.into(),
        }
    }

    /// Create an asset-not-found error.
    #[must_use]
    pub fn asset_not_found(
        repository: impl Into<String>,
        tag: impl Into<String>,
        asset: impl Into<String>,
        available: Vec<String>,
    ) -> Self {
        Self::AssetNotFound {
            repository: repository.into(),
            tag: tag.into(),
            asset: asset.into(),
            available,
        }
    }

    /// Create an attestation failure.
    #[must_use]
    pub fn attestation_failed(path: impl AsRef<Path>, stderr: impl Into<String>) -> Self {
        Self::AttestationFailed {
            path: path.as_ref().into(),
            stderr: stderr.into(),
        }
    }

    /// Create a platform error.
    #[must_use]
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
        }
    }

    /// Create an I/O error with path context.
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context.
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Create an execution error.
    #[must_use]
    pub fn execution(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a cancellation error.
    #[must_use]
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error came from a cancellation signal.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result type for relshim operations.
pub type Result<T> = std::result::Result<T, Error>;
