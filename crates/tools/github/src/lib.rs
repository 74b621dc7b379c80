//! GitHub integrations for relshim.
//!
//! - [`GitHubReleaseFetcher`] downloads release assets through the REST API
//! - [`GhAttestationVerifier`] checks build provenance with `gh attestation verify`

pub mod attestation;
pub mod fetch;

pub use attestation::GhAttestationVerifier;
pub use fetch::{GITHUB_API, GitHubReleaseFetcher, api_base_for};
