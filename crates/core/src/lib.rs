#![allow(clippy::should_implement_trait)]
pub mod error;
pub mod outcome;
pub mod ports;
pub mod types;

pub use error::{JobFailure, JobWarning, PersistenceError, PipelineError, StorageError};
pub use outcome::StageOutcome;
pub use types::{
    CatalogRecord, FrameSize, JobStage, Locator, QualityTier, Rendition, RenditionSummary,
    TechnicalMetadata,
};
