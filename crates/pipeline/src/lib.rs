pub mod cleanup;
pub mod config;
pub mod events;
pub mod job;
pub mod orchestrator;
pub mod recorder;
pub mod recovery;
pub mod uploader;
pub mod workspace;

pub use config::{ConfigError, PipelineConfig};
pub use events::PipelineEvent;
pub use job::JobId;
pub use orchestrator::{IngestRequest, JobReport, Pipeline};
