// Application Layer - Process Handle and Batch Runner

pub mod batch;
pub mod run;

// Re-exports
pub use batch::{BatchConfig, BatchRunner, BatchStream};
pub use run::{ToolRun, ToolRunner};
