//! Definition Store
//!
//! Collector definitions are TOML files named `<id>.toml` in one directory.
//! Each file declares the command to run, the payload content type, an
//! advisory identity and the associated systemd units:
//!
//! ```toml
//! [meta]
//! name = "Mock collector"
//! feature = "testing"
//!
//! [exec]
//! command = "/usr/libexec/mock-collector --verbose"
//! content_type = "application/vnd.redhat.mock+tgz"
//! timeout = "5m"
//!
//! [systemd]
//! service = "mock-collector.service"
//! timer = "mock-collector.timer"
//! ```

mod error;
mod model;
mod store;

pub use error::DefinitionError;
pub use model::{CollectorDefinition, CollectorInfo};
pub use store::{DEFINITION_EXTENSION, DefinitionStore};
