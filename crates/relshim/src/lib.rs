//! relshim: run a repository's release binary for a ref.
//!
//! The binary resolves the configured ref to a release tag
//! ([`relshim_vcs`]), makes sure the matching asset is in the local cache
//! ([`relshim_cache`], downloading through [`relshim_tools_github`]), and then
//! executes it, exiting with its exit code. This library holds the pieces the
//! binary is assembled from so they can be tested directly.

pub mod cli;
pub mod exec;
pub mod pipeline;
pub mod shutdown;
pub mod tracing;

pub use pipeline::{Acquired, Shim};
