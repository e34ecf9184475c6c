pub mod json_repair;
pub mod pipeline;
pub mod prompts;

pub use pipeline::{EnrichmentPipeline, EnrichmentResult};
