pub mod jobs;
pub mod videos;
