//! Isolated Executor
//!
//! Runs one collector definition as a subprocess that writes its artifacts
//! into a private, freshly created output directory.
//!
//! # Components
//!
//! - [`Executor`]: Output directory creation, subprocess execution, last-run update
//! - [`RunLock`]: Advisory lock keeping one execution per collector id at a time
//! - [`CollectError`]: Collection failure taxonomy
//!
//! # Example
//!
//! ```rust,no_run
//! use gather::{AppConfig, DefinitionStore, Executor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let definition = DefinitionStore::from_config(&config.paths).load_one("mock")?;
//! let directory = Executor::from_config(&config).run(&definition).await?;
//! println!("collected into {}", directory.display());
//! # Ok(())
//! # }
//! ```

mod error;
mod executor;
mod lock;

pub use error::CollectError;
pub use executor::{Executor, MAX_STDERR_BYTES};
pub use lock::RunLock;
