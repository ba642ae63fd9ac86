//! Run Pipeline
//!
//! Drives one collector run through
//! `Start → Collecting → Collected → [Packaging → Packaged → Uploading → Uploaded] → CleaningUp → Done`.
//!
//! # Components
//!
//! - [`RunOrchestrator`]: Stage sequencing and summary assembly
//! - [`Packager`] / [`TarGzPackager`]: Output directory to artifact
//! - [`Uploader`] / [`IngressUploader`]: Artifact to ingress endpoint
//! - [`ScopedPath`]: Removal of run outputs on every exit path
//! - [`RunSummary`]: Reported facts of a run

mod cleanup;
mod orchestrator;
mod packager;
mod summary;
mod uploader;

pub use cleanup::ScopedPath;
pub use orchestrator::{RunOptions, RunOrchestrator};
pub use packager::{Packager, PackagingError, TarGzPackager};
pub use summary::{RunError, RunOutcome, RunStage, RunSummary};
pub use uploader::{FALLBACK_CONTENT_TYPE, IngressUploader, UploadError, Uploader};
