//! Artifact cache behavior against in-memory collaborators.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use relshim_cache::{ArtifactCache, ArtifactRequest, CacheStatus};
use relshim_core::{
    Arch, AttestationFailurePolicy, AttestationGate, ByteStream, CancellationToken, Error,
    Fetcher, Os, Platform, ReleaseTag, Result,
};

/// Serves fixed content, optionally breaking the stream on the first call.
struct FakeFetcher {
    content: &'static str,
    calls: AtomicUsize,
    break_first: bool,
}

impl FakeFetcher {
    fn new(content: &'static str) -> Arc<Self> {
        Arc::new(Self {
            content,
            calls: AtomicUsize::new(0),
            break_first: false,
        })
    }

    fn flaky(content: &'static str) -> Arc<Self> {
        Arc::new(Self {
            content,
            calls: AtomicUsize::new(0),
            break_first: true,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch(
        &self,
        _cancel: &CancellationToken,
        repository: &str,
        tag: &ReleaseTag,
        asset: &str,
    ) -> Result<ByteStream> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if asset == "missing" {
            return Err(Error::asset_not_found(repository, tag.render(), asset, Vec::new()));
        }

        let (head, tail) = self.content.split_at(self.content.len() / 2);
        if self.break_first && call == 0 {
            let chunks = vec![
                Ok(Bytes::from_static(head.as_bytes())),
                Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )),
            ];
            return Ok(stream::iter(chunks).boxed());
        }
        let chunks = vec![
            Ok(Bytes::from_static(head.as_bytes())),
            Ok(Bytes::from_static(tail.as_bytes())),
        ];
        Ok(stream::iter(chunks).boxed())
    }
}

/// What [`FakeGate`] answers.
#[derive(Clone, Copy)]
enum Verdict {
    Accept,
    Reject,
    /// The verifier itself could not run.
    Broken,
    Cancelled,
}

/// Answers every check with a fixed verdict and counts checks.
struct FakeGate {
    verdict: Verdict,
    checks: AtomicUsize,
}

impl FakeGate {
    fn new(accept: bool) -> Arc<Self> {
        Self::answering(if accept { Verdict::Accept } else { Verdict::Reject })
    }

    fn answering(verdict: Verdict) -> Arc<Self> {
        Arc::new(Self {
            verdict,
            checks: AtomicUsize::new(0),
        })
    }

    fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttestationGate for FakeGate {
    async fn verify(&self, _cancel: &CancellationToken, path: &Path, repository: &str) -> Result<()> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        assert!(path.exists(), "gate must see the finalized file");
        assert_eq!(repository, "acme/widget");
        match self.verdict {
            Verdict::Accept => Ok(()),
            Verdict::Reject => Err(Error::attestation_failed(path, "no matching attestations found")),
            Verdict::Broken => Err(Error::execution("gh", "failed to start: No such file or directory")),
            Verdict::Cancelled => Err(Error::cancelled("verifying attestation")),
        }
    }
}

/// Serves `chunks` copies of a 16-byte block, yielding to the scheduler
/// before each one.
struct InterleavingFetcher {
    chunks: usize,
    calls: AtomicUsize,
}

const BLOCK: &str = "0123456789abcdef";

#[async_trait]
impl Fetcher for InterleavingFetcher {
    fn name(&self) -> &'static str {
        "interleaving"
    }

    async fn fetch(
        &self,
        _cancel: &CancellationToken,
        _repository: &str,
        _tag: &ReleaseTag,
        _asset: &str,
    ) -> Result<ByteStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = stream::iter(0..self.chunks).then(|_| async {
            tokio::task::yield_now().await;
            Ok::<_, std::io::Error>(Bytes::from_static(BLOCK.as_bytes()))
        });
        Ok(body.boxed())
    }
}

fn request(asset: &str) -> ArtifactRequest {
    ArtifactRequest {
        repository: "acme/widget".to_string(),
        tag: ReleaseTag::parse("v1.2.3").unwrap(),
        platform: Platform::new(Os::Linux, Arch::Amd64),
        asset: asset.to_string(),
    }
}

#[tokio::test]
async fn miss_downloads_to_layout_path() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::new("binary-content");
    let cache = ArtifactCache::new(root.path(), fetcher.clone());

    let artifact = cache
        .get(&CancellationToken::new(), &request("widget-linux-amd64"))
        .await
        .unwrap();

    assert_eq!(artifact.status, CacheStatus::Downloaded);
    assert_eq!(artifact.downloaded_bytes, Some(14));
    assert_eq!(
        artifact.path,
        root.path().join("acme--widget/v1.2.3/widget-linux-amd64")
    );
    assert_eq!(std::fs::read_to_string(&artifact.path).unwrap(), "binary-content");
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn second_get_is_a_hit_without_fetching() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::new("binary-content");
    let gate = FakeGate::new(true);
    let cache = ArtifactCache::new(root.path(), fetcher.clone())
        .with_attestation(gate.clone(), AttestationFailurePolicy::Keep);
    let cancel = CancellationToken::new();

    let first = cache.get(&cancel, &request("widget-linux-amd64")).await.unwrap();
    let second = cache.get(&cancel, &request("widget-linux-amd64")).await.unwrap();

    assert_eq!(second.status, CacheStatus::Hit);
    assert_eq!(second.path, first.path);
    assert_eq!(second.downloaded_bytes, None);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(gate.checks(), 1);
}

#[tokio::test]
async fn truncated_download_leaves_nothing_and_retries() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::flaky("binary-content");
    let cache = ArtifactCache::new(root.path(), fetcher.clone());
    let cancel = CancellationToken::new();
    let req = request("widget-linux-amd64");

    let err = cache.get(&cancel, &req).await.unwrap_err();
    assert!(matches!(err, Error::Io { .. }), "got {err:?}");

    let path = cache.path_for(&req);
    assert!(!path.exists());
    let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap()).unwrap().collect();
    assert!(leftovers.is_empty(), "temporary files left behind");

    let artifact = cache.get(&cancel, &req).await.unwrap();
    assert_eq!(artifact.status, CacheStatus::Downloaded);
    assert_eq!(std::fs::read_to_string(&artifact.path).unwrap(), "binary-content");
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn missing_asset_propagates() {
    let root = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(root.path(), FakeFetcher::new("x"));

    let err = cache
        .get(&CancellationToken::new(), &request("missing"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::AssetNotFound { .. }), "got {err:?}");
}

#[tokio::test]
async fn failed_attestation_keeps_file_by_default() {
    let root = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(root.path(), FakeFetcher::new("unsigned"))
        .with_attestation(FakeGate::new(false), AttestationFailurePolicy::Keep);
    let req = request("widget-linux-amd64");

    let err = cache.get(&CancellationToken::new(), &req).await.unwrap_err();

    match err {
        Error::AttestationFailed { stderr, .. } => {
            assert!(stderr.contains("no matching attestations"));
        }
        other => panic!("expected AttestationFailed, got {other:?}"),
    }
    assert!(cache.path_for(&req).exists());
}

#[tokio::test]
async fn failed_attestation_evicts_when_configured() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::new("unsigned");
    let cache = ArtifactCache::new(root.path(), fetcher.clone())
        .with_attestation(FakeGate::new(false), AttestationFailurePolicy::Evict);
    let cancel = CancellationToken::new();
    let req = request("widget-linux-amd64");

    assert!(cache.get(&cancel, &req).await.is_err());
    assert!(!cache.path_for(&req).exists());

    // Evicted, so the next attempt downloads and checks again.
    assert!(cache.get(&cancel, &req).await.is_err());
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn broken_verifier_with_evict_never_leaves_unverified_file() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::new("unverified");
    let gate = FakeGate::answering(Verdict::Broken);
    let cache = ArtifactCache::new(root.path(), fetcher.clone())
        .with_attestation(gate.clone(), AttestationFailurePolicy::Evict);
    let cancel = CancellationToken::new();
    let req = request("widget-linux-amd64");

    let err = cache.get(&cancel, &req).await.unwrap_err();
    assert!(matches!(err, Error::Execution { .. }), "got {err:?}");
    assert!(!cache.path_for(&req).exists());

    // No hit on the next run: it downloads and asks the verifier again.
    assert!(cache.get(&cancel, &req).await.is_err());
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(gate.checks(), 2);
}

#[tokio::test]
async fn incomplete_check_evicts_even_with_keep() {
    for verdict in [Verdict::Broken, Verdict::Cancelled] {
        let root = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(root.path(), FakeFetcher::new("unverified"))
            .with_attestation(FakeGate::answering(verdict), AttestationFailurePolicy::Keep);
        let req = request("widget-linux-amd64");

        assert!(cache.get(&CancellationToken::new(), &req).await.is_err());
        assert!(!cache.path_for(&req).exists());
    }
}

#[tokio::test]
async fn concurrent_misses_leave_one_complete_file() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(InterleavingFetcher {
        chunks: 64,
        calls: AtomicUsize::new(0),
    });
    let cache = ArtifactCache::new(root.path(), fetcher.clone());
    let cancel = CancellationToken::new();
    let req = request("widget-linux-amd64");

    let (first, second) = tokio::join!(cache.get(&cancel, &req), cache.get(&cancel, &req));
    let first = first.unwrap();
    let second = second.unwrap();

    assert_eq!(first.path, second.path);
    assert!(fetcher.calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(std::fs::read_to_string(&first.path).unwrap(), BLOCK.repeat(64));

    let entries: Vec<String> = std::fs::read_dir(first.path.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec!["widget-linux-amd64".to_string()]);
}

#[cfg(unix)]
#[tokio::test]
async fn downloaded_artifact_is_executable() {
    use std::os::unix::fs::PermissionsExt;

    let root = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(root.path(), FakeFetcher::new("#!/bin/sh\n"));

    let artifact = cache
        .get(&CancellationToken::new(), &request("widget-linux-amd64"))
        .await
        .unwrap();

    let mode = std::fs::metadata(&artifact.path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}
