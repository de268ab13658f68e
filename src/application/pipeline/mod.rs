pub mod analysis;
pub mod runner;

pub use runner::{PipelineRunner, RunnerSettings};
