pub mod loader;
pub mod record;
pub mod node;
pub mod cycle_check;
pub mod config;
mod guard;
pub mod executor;
pub mod stage;

pub use loader::Loader;
pub use record::{Item, ItemHandle, RecordBatch};
pub use config::{GraphConfig, PanicPolicy, StageConfig, StageErrorPolicy};
pub use executor::LoaderGraph;
pub use stage::{Stage, StageRunner, run_stages};
pub use cycle_check::has_cycle;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub type BoxLoader = Arc<dyn Loader>;

#[derive(Error, Debug)]
pub enum LoadcuterError {
    #[error("Load failed: {0}")]
    Load(String),
    #[error("Load aborted: {0}")]
    Aborted(String),
    #[error("Loader not registered: {0}")]
    UnregisteredLoader(String),
    #[error("Loader registered twice: {0}")]
    DuplicateLoader(String),
    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),
    #[error("Context cancelled: {0}")]
    ContextCancelled(String),
    #[error("Loader {loader} panicked: {message}")]
    LoaderPanicked { loader: String, message: String },
    #[error("Circular dependency detected")]
    CircularDependency,
}
