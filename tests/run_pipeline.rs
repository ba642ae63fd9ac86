//! Run Pipeline Integration Tests
//!
//! Drives the orchestrator end to end with real subprocesses, the tarball
//! packager, and in-process packager/uploader doubles.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use flate2::read::GzDecoder;
use gather::config::ExecutionConfig;
use gather::{
    CollectError, CollectorDefinition, DefinitionStore, Executor, Packager, PackagingError,
    RunError, RunOptions, RunOrchestrator, RunStage, RunStateCache, StateError, TarGzPackager,
    UploadError, Uploader,
};
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

struct Fixture {
    root: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        for dir in ["collectors.d", "collections", "cache"] {
            std::fs::create_dir(root.path().join(dir)).unwrap();
        }
        Self { root }
    }

    fn collections(&self) -> PathBuf {
        self.root.path().join("collections")
    }

    fn state(&self) -> RunStateCache {
        RunStateCache::new(self.root.path().join("cache"))
    }

    fn executor(&self) -> Executor {
        Executor::new(self.collections(), ExecutionConfig::default(), self.state())
    }

    fn orchestrator<P: Packager, U: Uploader>(&self, packager: P, uploader: U) -> RunOrchestrator<P, U> {
        RunOrchestrator::new(self.executor(), packager, uploader)
    }

    /// Definition running a shell script that writes into its output directory.
    fn collector(&self, id: &str, body: &str) -> CollectorDefinition {
        let path = self.root.path().join(format!("{}.sh", id));
        std::fs::write(&path, body).unwrap();
        CollectorDefinition::new(id, format!("sh {}", path.display()))
            .with_content_type("application/vnd.redhat.mock+tgz")
    }

    fn writing_collector(&self, id: &str) -> CollectorDefinition {
        self.collector(
            id,
            "echo '{\"ok\": true}' > \"$COLLECTION_DIRECTORY/data.json\"\n",
        )
    }

    /// Entries left in the collections directory.
    fn leftovers(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.collections())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
struct Upload {
    artifact: PathBuf,
    content_type: String,
    entries: Vec<String>,
}

/// Accepts every artifact and records what it saw while the artifact existed.
#[derive(Debug, Clone, Default)]
struct RecordingUploader {
    uploads: Arc<Mutex<Vec<Upload>>>,
}

#[async_trait::async_trait]
impl Uploader for RecordingUploader {
    async fn upload(&self, artifact: &Path, content_type: &str) -> Result<(), UploadError> {
        let mut entries = Vec::new();
        if let Ok(file) = File::open(artifact) {
            let mut archive = tar::Archive::new(GzDecoder::new(file));
            for entry in archive.entries().unwrap() {
                entries.push(entry.unwrap().path().unwrap().to_string_lossy().into_owned());
            }
        }
        self.uploads.lock().unwrap().push(Upload {
            artifact: artifact.to_path_buf(),
            content_type: content_type.to_string(),
            entries,
        });
        Ok(())
    }
}

/// Rejects every artifact.
#[derive(Debug, Clone, Default)]
struct FailingUploader {
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Uploader for FailingUploader {
    async fn upload(&self, artifact: &Path, _content_type: &str) -> Result<(), UploadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        Err(UploadError::UploadFailed {
            artifact: artifact.to_path_buf(),
            reason: "HTTP status 503 Service Unavailable".to_string(),
        })
    }
}

/// Accepts the artifact and removes it, leaving nothing for cleanup.
struct ConsumingUploader;

#[async_trait::async_trait]
impl Uploader for ConsumingUploader {
    async fn upload(&self, artifact: &Path, _content_type: &str) -> Result<(), UploadError> {
        std::fs::remove_file(artifact).map_err(|e| UploadError::UploadFailed {
            artifact: artifact.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Fails without producing an artifact.
struct FailingPackager;

#[async_trait::async_trait]
impl Packager for FailingPackager {
    async fn pack(&self, directory: &Path) -> Result<PathBuf, PackagingError> {
        Err(PackagingError::PackagingFailed {
            directory: directory.to_path_buf(),
            reason: "no space left on device".to_string(),
        })
    }
}

// =============================================================================
// Successful Runs
// =============================================================================

#[tokio::test]
async fn test_run_uploads_and_cleans_up() {
    let fx = Fixture::new();
    let uploader = RecordingUploader::default();
    let orchestrator = fx.orchestrator(TarGzPackager::new(), uploader.clone());
    let def = fx.writing_collector("mock");

    let before = Utc::now().timestamp();
    let outcome = orchestrator.run(&def, RunOptions::default()).await;
    let after = Utc::now().timestamp();

    assert!(outcome.is_success(), "{:?}", outcome.error());
    let summary = &outcome.summary;
    assert!(summary.uploaded);
    assert!(!summary.kept);
    assert!(summary.kept_path.is_none());
    assert!(summary.upload_duration.is_some());
    assert!(summary.failed_stage.is_none());
    assert!(summary.cleanup_warnings.is_empty());
    assert_eq!(summary.collector.id, "mock");

    let uploads = uploader.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].content_type, "application/vnd.redhat.mock+tgz");
    assert!(uploads[0].entries.iter().any(|e| e.ends_with("/data.json")));
    assert!(!uploads[0].artifact.exists());

    assert!(fx.leftovers().is_empty());

    let last = fx.state().last_run("mock").unwrap().timestamp();
    assert!(before <= last && last <= after);
}

#[tokio::test]
async fn test_echo_scenario_from_definition_file() {
    let fx = Fixture::new();
    std::fs::write(
        fx.root.path().join("collectors.d").join("mock.toml"),
        "[meta]\nname = \"Mock\"\n\n[exec]\ncommand = \"echo hi\"\n",
    )
    .unwrap();
    let store = DefinitionStore::new(fx.root.path().join("collectors.d"));
    let def = store.load_one("mock").unwrap();

    let orchestrator = fx.orchestrator(TarGzPackager::new(), RecordingUploader::default());
    let before = Utc::now().timestamp();
    let outcome = orchestrator.run(&def, RunOptions::default()).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.summary.collector.name, "Mock");
    let last = fx.state().last_run("mock").unwrap().timestamp();
    assert!(last >= before && last <= Utc::now().timestamp());
}

#[tokio::test]
async fn test_keep_without_upload() {
    let fx = Fixture::new();
    let uploader = RecordingUploader::default();
    let orchestrator = fx.orchestrator(TarGzPackager::new(), uploader.clone());
    let def = fx.writing_collector("mock");

    let outcome = orchestrator
        .run(&def, RunOptions { keep: true, upload: false })
        .await;

    assert!(outcome.is_success());
    let summary = &outcome.summary;
    assert!(summary.kept);
    assert!(!summary.uploaded);
    assert!(summary.upload_duration.is_none());

    let kept = summary.kept_path.clone().unwrap();
    assert!(kept.join("data.json").is_file());
    assert_eq!(fx.leftovers(), vec![kept]);
    assert!(uploader.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_no_upload_without_keep_removes_directory() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(TarGzPackager::new(), RecordingUploader::default());
    let def = fx.writing_collector("mock");

    let outcome = orchestrator
        .run(&def, RunOptions { keep: false, upload: false })
        .await;

    assert!(outcome.is_success());
    assert!(!outcome.summary.kept);
    assert!(fx.leftovers().is_empty());
}

#[tokio::test]
async fn test_keep_with_upload_preserves_directory_only() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(TarGzPackager::new(), RecordingUploader::default());
    let def = fx.writing_collector("mock");

    let outcome = orchestrator
        .run(&def, RunOptions { keep: true, upload: true })
        .await;

    assert!(outcome.is_success());
    let kept = outcome.summary.kept_path.clone().unwrap();
    assert!(outcome.summary.uploaded);
    // The artifact is removed even when the directory is kept
    assert_eq!(fx.leftovers(), vec![kept]);
}

#[tokio::test]
async fn test_unusable_cache_dir_does_not_fail_run() {
    let fx = Fixture::new();
    let cache = fx.root.path().join("cache.file");
    std::fs::write(&cache, "").unwrap();
    let executor = Executor::new(
        fx.collections(),
        ExecutionConfig::default(),
        RunStateCache::new(&cache),
    );
    let orchestrator =
        RunOrchestrator::new(executor, TarGzPackager::new(), RecordingUploader::default());
    let def = CollectorDefinition::new("mock", "echo hi");

    let outcome = orchestrator.run(&def, RunOptions::default()).await;

    assert!(outcome.is_success(), "{:?}", outcome.error());
    assert!(outcome.summary.uploaded);
    assert!(fx.leftovers().is_empty());
    assert!(RunStateCache::new(&cache).last_run("mock").is_err());
}

#[tokio::test]
async fn test_cleanup_failure_is_a_warning() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(TarGzPackager::new(), ConsumingUploader);
    let def = fx.writing_collector("mock");

    let outcome = orchestrator.run(&def, RunOptions::default()).await;

    assert!(outcome.is_success(), "{:?}", outcome.error());
    assert!(outcome.summary.uploaded);
    assert_eq!(outcome.summary.cleanup_warnings.len(), 1);
    assert!(outcome.summary.cleanup_warnings[0].contains(".tar.gz"));
    assert!(fx.leftovers().is_empty());

    let json = serde_json::to_value(&outcome.summary).unwrap();
    assert_eq!(json["cleanup-warnings"].as_array().unwrap().len(), 1);
}

// =============================================================================
// Failed Runs
// =============================================================================

#[tokio::test]
async fn test_upload_failure_cleans_up() {
    let fx = Fixture::new();
    let uploader = FailingUploader::default();
    let orchestrator = fx.orchestrator(TarGzPackager::new(), uploader.clone());
    let def = fx.writing_collector("mock");

    let outcome = orchestrator.run(&def, RunOptions::default()).await;

    assert!(matches!(outcome.error(), Some(RunError::Upload(_))));
    assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);

    let summary = &outcome.summary;
    assert!(!summary.uploaded);
    assert_eq!(summary.failed_stage, Some(RunStage::Uploading));
    assert!(summary.collect_duration > Duration::ZERO);
    assert!(summary.upload_duration.unwrap() >= Duration::from_millis(5));
    assert!(fx.leftovers().is_empty());

    // Collection itself succeeded
    assert!(fx.state().last_run("mock").is_ok());
}

#[tokio::test]
async fn test_packaging_failure_skips_upload() {
    let fx = Fixture::new();
    let uploader = RecordingUploader::default();
    let orchestrator = fx.orchestrator(FailingPackager, uploader.clone());
    let def = fx.writing_collector("mock");

    let outcome = orchestrator.run(&def, RunOptions::default()).await;

    assert!(matches!(outcome.error(), Some(RunError::Packaging(_))));
    assert_eq!(outcome.summary.failed_stage, Some(RunStage::Packaging));
    assert!(outcome.summary.upload_duration.is_none());
    assert!(uploader.uploads.lock().unwrap().is_empty());
    assert!(fx.leftovers().is_empty());
}

#[tokio::test]
async fn test_collect_failure_reports_stderr() {
    let fx = Fixture::new();
    let uploader = RecordingUploader::default();
    let orchestrator = fx.orchestrator(TarGzPackager::new(), uploader.clone());
    let def = fx.collector(
        "failing",
        "echo partial > \"$COLLECTION_DIRECTORY/partial.txt\"\necho 'disk not mounted' >&2\nexit 3\n",
    );

    let outcome = orchestrator.run(&def, RunOptions::default()).await;

    match outcome.error() {
        Some(RunError::Collect(e @ CollectError::ExecutionFailed { .. })) => {
            assert!(e.stderr().unwrap().contains("disk not mounted"));
        }
        other => panic!("expected ExecutionFailed, got {:?}", other),
    }
    assert_eq!(outcome.summary.failed_stage, Some(RunStage::Collecting));
    assert!(uploader.uploads.lock().unwrap().is_empty());
    assert!(fx.leftovers().is_empty());
    assert!(matches!(
        fx.state().last_run("failing"),
        Err(StateError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_collect_failure_with_keep_preserves_directory() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(TarGzPackager::new(), RecordingUploader::default());
    let def = fx.collector(
        "failing",
        "echo partial > \"$COLLECTION_DIRECTORY/partial.txt\"\nexit 1\n",
    );

    let outcome = orchestrator
        .run(&def, RunOptions { keep: true, upload: true })
        .await;

    assert!(!outcome.is_success());
    let kept = outcome.summary.kept_path.clone().unwrap();
    assert!(kept.join("partial.txt").is_file());
}

#[tokio::test]
async fn test_concurrent_run_already_running() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(TarGzPackager::new(), RecordingUploader::default());
    let def = fx.writing_collector("mock");

    let _held = orchestrator.executor().lock(&def).unwrap();
    let outcome = orchestrator.run(&def, RunOptions::default()).await;

    assert!(matches!(
        outcome.error(),
        Some(RunError::Collect(CollectError::AlreadyRunning { .. }))
    ));
    assert!(fx.leftovers().is_empty());
}

#[tokio::test]
async fn test_timeout_fails_run() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(TarGzPackager::new(), RecordingUploader::default());
    let def = CollectorDefinition::new("slow", "sleep 30").with_timeout(Duration::from_millis(200));

    let outcome = orchestrator.run(&def, RunOptions::default()).await;

    assert!(matches!(
        outcome.error(),
        Some(RunError::Collect(CollectError::Timeout { .. }))
    ));
    assert!(outcome.summary.collect_duration < Duration::from_secs(10));
    assert!(fx.leftovers().is_empty());
}

#[tokio::test]
async fn test_summary_json_shape() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator(TarGzPackager::new(), RecordingUploader::default());
    let def = fx.writing_collector("mock");

    let outcome = orchestrator
        .run(&def, RunOptions { keep: true, upload: false })
        .await;
    let json = serde_json::to_value(&outcome.summary).unwrap();

    assert_eq!(json["collector"]["id"], "mock");
    assert!(json["collect-duration"].as_f64().unwrap() > 0.0);
    assert_eq!(json["archive-kept"], true);
    assert_eq!(json["archive-uploaded"], false);
    assert!(json["archive-path"].as_str().unwrap().contains("mock-"));
    assert!(json.get("upload-duration").is_none());
}
