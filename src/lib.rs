//! Gather - Host Data Collection Agent
//!
//! Runs collector programs declared in TOML definition files. Each run gets a
//! private output directory, its contents are packaged and shipped to an
//! ingestion endpoint, and the run's outputs are cleaned up afterwards.
//!
//! # Architecture
//!
//! - **Definitions**: TOML collector definitions loaded from one directory
//! - **Collector**: Isolated subprocess execution into a fresh output directory
//! - **State**: Last successful run per collector
//! - **Pipeline**: Collect, package, upload and cleanup orchestration
//! - **Report**: Human and JSON rendering for the CLI
//!
//! # Example
//!
//! ```rust,no_run
//! use gather::{
//!     AppConfig, DefinitionStore, Executor, IngressUploader, RunOptions, RunOrchestrator,
//!     TarGzPackager,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load_or_default("/etc/gather/config.yaml")?;
//! let definition = DefinitionStore::from_config(&config.paths).load_one("mock")?;
//!
//! let orchestrator = RunOrchestrator::new(
//!     Executor::from_config(&config),
//!     TarGzPackager::new(),
//!     IngressUploader::from_config(&config.ingress)?,
//! );
//! let outcome = orchestrator.run(&definition, RunOptions::default()).await;
//! println!("uploaded: {}", outcome.summary.uploaded);
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod definition;
pub mod pipeline;
pub mod report;
pub mod state;

pub use collector::{CollectError, Executor, RunLock};
pub use config::{AppConfig, ConfigError};
pub use definition::{CollectorDefinition, CollectorInfo, DefinitionError, DefinitionStore};
pub use pipeline::{
    IngressUploader, Packager, PackagingError, RunError, RunOptions, RunOrchestrator, RunOutcome,
    RunStage, RunSummary, TarGzPackager, UploadError, Uploader,
};
pub use state::{RunStateCache, StateError};
