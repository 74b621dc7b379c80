//! Remote ref listing and ref-to-release-tag resolution.
//!
//! [`RefResolver`] answers "which release does this ref mean?" by consulting
//! a [`RemoteRefIndex`] (one `git ls-remote` per resolution) and, for
//! `latest`, a [`LatestResolver`](relshim_core::LatestResolver).

pub mod latest;
pub mod remote;
pub mod resolver;

pub use latest::TagLatestResolver;
pub use remote::{GitRemoteRefIndex, RemoteRef, RemoteRefIndex, parse_ls_remote};
pub use resolver::{LATEST, RefResolver, select_tag, target_commit};
