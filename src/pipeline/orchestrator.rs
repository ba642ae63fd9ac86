//! Run orchestration: collect, package, upload, clean up.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::collector::Executor;
use crate::definition::{CollectorDefinition, CollectorInfo};

use super::cleanup::ScopedPath;
use super::packager::Packager;
use super::summary::{RunError, RunOutcome, RunStage, RunSummary};
use super::uploader::Uploader;

/// Caller choices for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Preserve the output directory after the run.
    pub keep: bool,
    /// Package and upload the output directory.
    pub upload: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            keep: false,
            upload: true,
        }
    }
}

/// In-flight bookkeeping of one run.
struct CollectionRun<'a> {
    definition: &'a CollectorDefinition,
    stage: RunStage,
    collect_duration: Duration,
    upload_duration: Option<Duration>,
    kept_path: Option<PathBuf>,
    uploaded: bool,
    warnings: Vec<String>,
}

impl<'a> CollectionRun<'a> {
    fn new(definition: &'a CollectorDefinition) -> Self {
        Self {
            definition,
            stage: RunStage::Start,
            collect_duration: Duration::ZERO,
            upload_duration: None,
            kept_path: None,
            uploaded: false,
            warnings: Vec::new(),
        }
    }

    fn advance(&mut self, stage: RunStage) {
        tracing::debug!(collector = %self.definition.id, from = %self.stage, to = %stage, "Run stage");
        self.stage = stage;
    }

    fn clean_up(&mut self, guard: ScopedPath) {
        if guard.is_kept() {
            self.kept_path = Some(guard.path().to_path_buf());
        }
        self.warnings.extend(guard.release());
    }

    fn finish(mut self, result: Result<(), RunError>) -> RunOutcome {
        self.advance(RunStage::Done);

        if let Err(e) = &result {
            tracing::error!(collector = %self.definition.id, stage = %e.stage(), error = %e, "Run failed");
        }

        let summary = RunSummary {
            collector: CollectorInfo::from(self.definition),
            collect_duration: self.collect_duration,
            upload_duration: self.upload_duration,
            kept: self.kept_path.is_some(),
            kept_path: self.kept_path,
            uploaded: self.uploaded,
            failed_stage: result.as_ref().err().map(RunError::stage),
            cleanup_warnings: self.warnings,
        };
        RunOutcome { summary, result }
    }
}

/// Sequences one collector run through the pipeline.
///
/// Each stage's failure ends the forward stages. Removal of the output
/// directory (unless kept) and of the artifact is attempted on every path and
/// never changes the outcome.
pub struct RunOrchestrator<P, U> {
    executor: Executor,
    packager: P,
    uploader: U,
}

impl<P: Packager, U: Uploader> RunOrchestrator<P, U> {
    /// Create an orchestrator.
    pub fn new(executor: Executor, packager: P, uploader: U) -> Self {
        Self {
            executor,
            packager,
            uploader,
        }
    }

    /// Executor used for the collect stage.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Run `definition` end to end.
    ///
    /// Always returns a summary; `RunOutcome::result` carries the terminal
    /// failure of the collect, package or upload stage.
    pub async fn run(&self, definition: &CollectorDefinition, options: RunOptions) -> RunOutcome {
        let mut run = CollectionRun::new(definition);
        tracing::info!(collector = %definition.id, keep = options.keep, upload = options.upload, "Starting run");

        run.advance(RunStage::Collecting);
        let started = Instant::now();
        let lock = match self.executor.try_lock(definition) {
            Ok(lock) => lock,
            Err(e) => return run.finish(Err(e.into())),
        };
        let directory = match self.executor.create_output_directory(definition) {
            Ok(path) => ScopedPath::directory(path, options.keep),
            Err(e) => {
                run.collect_duration = started.elapsed();
                return run.finish(Err(e.into()));
            }
        };
        let collected = self
            .executor
            .collect_into(definition, directory.path(), lock.as_ref())
            .await;
        drop(lock);
        run.collect_duration = started.elapsed();
        tracing::debug!(collector = %definition.id, seconds = run.collect_duration.as_secs_f64(), "Execution finished");

        if let Err(e) = collected {
            // Best-effort removal of whatever the failed command left behind
            run.clean_up(directory);
            return run.finish(Err(e.into()));
        }
        run.advance(RunStage::Collected);

        let result = if options.upload {
            self.ship(&mut run, directory.path()).await
        } else {
            Ok(())
        };

        run.advance(RunStage::CleaningUp);
        run.clean_up(directory);
        run.finish(result)
    }

    async fn ship(&self, run: &mut CollectionRun<'_>, directory: &Path) -> Result<(), RunError> {
        run.advance(RunStage::Packaging);
        let artifact = ScopedPath::file(self.packager.pack(directory).await?);
        run.advance(RunStage::Packaged);

        run.advance(RunStage::Uploading);
        let started = Instant::now();
        let uploaded = self
            .uploader
            .upload(artifact.path(), &run.definition.content_type)
            .await;
        run.upload_duration = Some(started.elapsed());

        run.clean_up(artifact);
        uploaded?;

        run.uploaded = true;
        run.advance(RunStage::Uploaded);
        Ok(())
    }
}
