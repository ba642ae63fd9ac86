//! Run stages, errors and the summary record.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Serialize, Serializer};
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

use crate::collector::CollectError;
use crate::definition::CollectorInfo;

use super::packager::PackagingError;
use super::uploader::UploadError;

/// Position of a run in the collect → package → upload → cleanup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RunStage {
    Start,
    Collecting,
    Collected,
    Packaging,
    Packaged,
    Uploading,
    Uploaded,
    CleaningUp,
    Done,
}

/// Terminal failure of a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// The collect step failed.
    #[error(transparent)]
    Collect(#[from] CollectError),

    /// The output directory could not be packaged.
    #[error(transparent)]
    Packaging(#[from] PackagingError),

    /// The artifact could not be uploaded.
    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl RunError {
    /// Stage at which the run failed.
    pub fn stage(&self) -> RunStage {
        match self {
            Self::Collect(_) => RunStage::Collecting,
            Self::Packaging(_) => RunStage::Packaging,
            Self::Upload(_) => RunStage::Uploading,
        }
    }
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

fn as_opt_secs<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&d.as_secs_f64()),
        None => s.serialize_none(),
    }
}

/// Outcome facts of one run, reported on success and failure alike.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunSummary {
    /// Collector that ran.
    pub collector: CollectorInfo,

    /// Time spent collecting.
    #[serde(serialize_with = "as_secs")]
    pub collect_duration: Duration,

    /// Time spent uploading; `None` when upload was not attempted.
    #[serde(
        serialize_with = "as_opt_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub upload_duration: Option<Duration>,

    /// Whether the output directory survives the run.
    #[serde(rename = "archive-kept")]
    pub kept: bool,

    /// Location of the kept output directory.
    #[serde(rename = "archive-path", skip_serializing_if = "Option::is_none")]
    pub kept_path: Option<PathBuf>,

    /// Whether the artifact was accepted by the uploader.
    #[serde(rename = "archive-uploaded")]
    pub uploaded: bool,

    /// Stage that failed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<RunStage>,

    /// Cleanup problems; never affect the outcome.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cleanup_warnings: Vec<String>,
}

impl RunSummary {
    /// Upload time in seconds, zero when upload was skipped.
    pub fn upload_secs(&self) -> f64 {
        self.upload_duration.map_or(0.0, |d| d.as_secs_f64())
    }
}

/// Summary plus the run's terminal result.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub result: Result<(), RunError>,
}

impl RunOutcome {
    /// Whether collect, package and upload all succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Terminal error, if the run failed.
    pub fn error(&self) -> Option<&RunError> {
        self.result.as_ref().err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::CollectorDefinition;

    fn summary() -> RunSummary {
        RunSummary {
            collector: CollectorInfo::from(&CollectorDefinition::new("mock", "echo hi")),
            collect_duration: Duration::from_millis(1500),
            upload_duration: None,
            kept: false,
            kept_path: None,
            uploaded: false,
            failed_stage: None,
            cleanup_warnings: Vec::new(),
        }
    }

    #[test]
    fn test_summary_json_without_upload() {
        let json = serde_json::to_value(summary()).unwrap();
        assert_eq!(json["collector"]["id"], "mock");
        assert_eq!(json["collect-duration"], 1.5);
        assert_eq!(json["archive-kept"], false);
        assert_eq!(json["archive-uploaded"], false);
        assert!(json.get("upload-duration").is_none());
        assert!(json.get("archive-path").is_none());
        assert!(json.get("cleanup-warnings").is_none());
    }

    #[test]
    fn test_summary_json_with_upload_and_keep() {
        let mut s = summary();
        s.upload_duration = Some(Duration::from_millis(250));
        s.kept = true;
        s.kept_path = Some(PathBuf::from("/tmp/mock-1700000000-abcd1234"));
        s.failed_stage = Some(RunStage::Uploading);

        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["upload-duration"], 0.25);
        assert_eq!(json["archive-path"], "/tmp/mock-1700000000-abcd1234");
        assert_eq!(json["failed-stage"], "uploading");
        assert_eq!(s.upload_secs(), 0.25);
    }

    #[test]
    fn test_upload_secs_zero_when_skipped() {
        assert_eq!(summary().upload_secs(), 0.0);
    }

    #[test]
    fn test_stage_display_matches_serde() {
        for stage in [RunStage::CleaningUp, RunStage::Packaged, RunStage::Done] {
            let json = serde_json::to_value(stage).unwrap();
            assert_eq!(json, stage.to_string());
            assert_eq!(stage.as_ref(), stage.to_string());
        }
        assert_eq!(RunStage::CleaningUp.to_string(), "cleaning-up");
    }
}
