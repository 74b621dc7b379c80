//! The full resolve, fetch and run pipeline over in-memory collaborators.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use relshim::Shim;
use relshim_cache::{ArtifactCache, CacheStatus};
use relshim_core::{
    Arch, AttestationFailurePolicy, ByteStream, CancellationToken, Config, Error, Fetcher,
    LatestResolver, Os, Platform, ReleaseTag, Result, VersionCriteria,
};
use relshim_vcs::{RefResolver, RemoteRef, RemoteRefIndex};

struct Listing(Vec<RemoteRef>);

#[async_trait]
impl RemoteRefIndex for Listing {
    async fn list(&self, _cancel: &CancellationToken, _url: &str) -> Result<Vec<RemoteRef>> {
        Ok(self.0.clone())
    }
}

struct FixedLatest(&'static str);

#[async_trait]
impl LatestResolver for FixedLatest {
    async fn resolve(
        &self,
        _cancel: &CancellationToken,
        _url: &str,
        _criteria: &VersionCriteria,
    ) -> Result<ReleaseTag> {
        ReleaseTag::parse(self.0)
    }
}

/// Serves a shell script for the expected asset name only.
struct ScriptFetcher {
    expected_asset: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl Fetcher for ScriptFetcher {
    fn name(&self) -> &'static str {
        "script"
    }

    async fn fetch(
        &self,
        _cancel: &CancellationToken,
        repository: &str,
        tag: &ReleaseTag,
        asset: &str,
    ) -> Result<ByteStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if asset != self.expected_asset {
            return Err(Error::asset_not_found(
                repository,
                tag.render(),
                asset,
                vec![self.expected_asset.to_string()],
            ));
        }
        let script = format!("#!/bin/sh\necho {}\nexit 3\n", tag.render());
        Ok(futures::stream::iter(vec![Ok(Bytes::from(script))]).boxed())
    }
}

fn config(reference: &str, cache_dir: PathBuf, pattern: &str) -> Config {
    Config {
        repository: "acme/widget".to_string(),
        reference: reference.to_string(),
        cache_dir,
        pattern: pattern.to_string(),
        validate_attestations: false,
        github_token: None,
        server_url: "https://github.com".to_string(),
        attestation_failure: AttestationFailurePolicy::Keep,
    }
}

fn shim(reference: &str, cache_dir: PathBuf, fetcher: Arc<ScriptFetcher>) -> Shim {
    let listing = Arc::new(Listing(vec![
        RemoteRef::new("c1", "refs/heads/main"),
        RemoteRef::new("c1", "refs/tags/v1.0.0"),
        RemoteRef::new("c1", "refs/tags/v1.1.0"),
        RemoteRef::new("c0", "refs/tags/v0.9.0"),
    ]));
    let resolver = RefResolver::new("https://github.com", listing, Arc::new(FixedLatest("v2.0.0")));
    let cache = ArtifactCache::new(cache_dir.clone(), fetcher);
    Shim::with_parts(
        &config(reference, cache_dir, "{repo_name}_{version}_{os}_{arch}"),
        Platform::new(Os::Linux, Arch::Amd64),
        resolver,
        cache,
    )
    .unwrap()
}

fn fetcher(expected_asset: &'static str) -> Arc<ScriptFetcher> {
    Arc::new(ScriptFetcher {
        expected_asset,
        calls: AtomicUsize::new(0),
    })
}

#[tokio::test]
async fn branch_is_resolved_downloaded_then_cached() {
    let cache = tempfile::tempdir().unwrap();
    let fetcher = fetcher("widget_1.1.0_linux_amd64");
    let shim = shim("main", cache.path().to_path_buf(), fetcher.clone());
    let cancel = CancellationToken::new();

    let first = shim.acquire(&cancel).await.unwrap();
    assert_eq!(first.tag.render(), "v1.1.0");
    assert_eq!(first.artifact.status, CacheStatus::Downloaded);
    assert_eq!(
        first.artifact.path,
        cache.path().join("acme--widget/v1.1.0/widget-linux-amd64")
    );

    let second = shim.acquire(&cancel).await.unwrap();
    assert_eq!(second.artifact.status, CacheStatus::Hit);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn latest_uses_the_latest_resolver() {
    let cache = tempfile::tempdir().unwrap();
    let shim = shim("latest", cache.path().to_path_buf(), fetcher("widget_2.0.0_linux_amd64"));

    let acquired = shim.acquire(&CancellationToken::new()).await.unwrap();
    assert_eq!(acquired.tag.render(), "v2.0.0");
}

#[tokio::test]
async fn wrong_asset_name_reports_available_assets() {
    let cache = tempfile::tempdir().unwrap();
    let shim = shim("v1.0.0", cache.path().to_path_buf(), fetcher("something-else"));

    let err = shim.acquire(&CancellationToken::new()).await.unwrap_err();
    assert!(err.to_string().contains("available: something-else"), "{err}");
}

#[tokio::test]
async fn untagged_commit_fails_before_fetching() {
    let cache = tempfile::tempdir().unwrap();
    let fetcher = fetcher("unused");
    let shim = shim("deadbeef", cache.path().to_path_buf(), fetcher.clone());

    let err = shim.acquire(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::NoTagForCommit { .. }), "got {err:?}");
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_pattern_is_rejected_up_front() {
    let cache = tempfile::tempdir().unwrap();
    let resolver = RefResolver::new(
        "https://github.com",
        Arc::new(Listing(Vec::new())),
        Arc::new(FixedLatest("v1.0.0")),
    );
    let err = Shim::with_parts(
        &config("main", cache.path().to_path_buf(), "{repo_name}-{goarch}"),
        Platform::new(Os::Linux, Arch::Amd64),
        resolver,
        ArtifactCache::new(cache.path(), fetcher("unused")),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn run_executes_the_artifact_and_returns_its_code() {
    let cache = tempfile::tempdir().unwrap();
    let shim = shim("v1.0.0", cache.path().to_path_buf(), fetcher("widget_1.0.0_linux_amd64"));

    let code = shim.run(&CancellationToken::new(), &[]).await.unwrap();
    assert_eq!(code, 3);
}
