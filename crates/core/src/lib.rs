//! Core types for relshim.
//!
//! relshim resolves a human-supplied ref (tag, branch, commit or `latest`)
//! to a canonical release tag, downloads the matching release binary into a
//! local cache, and runs it. This crate holds what every other crate shares:
//!
//! - [`ReleaseTag`] - canonical `v`-prefixed semantic-version tags
//! - [`Platform`], [`Os`], [`Arch`] - release platform naming
//! - [`Error`] / [`Result`] - the error kinds of the pipeline
//! - [`provider`] - collaborator traits ([`Fetcher`], [`LatestResolver`],
//!   [`AttestationGate`])
//! - [`config`] - layered configuration loading
//! - [`cancel`] - racing work against the shutdown token

pub mod cancel;
pub mod config;
mod error;
pub mod platform;
pub mod provider;
pub mod version;

pub use config::{AttestationFailurePolicy, Config, EnvSource, PartialConfig, ProcessEnv};
pub use error::{Error, Result};
pub use platform::{Arch, Os, Platform};
pub use provider::{AttestationGate, ByteStream, Fetcher, LatestResolver, VersionCriteria};
pub use version::ReleaseTag;

/// Re-exported so downstream crates share one token type.
pub use tokio_util::sync::CancellationToken;
