// Port Layer - Interfaces for external dependencies

pub mod file_classifier;
pub mod time_provider;
pub mod tool_locator;
pub mod tool_spawner;

// Re-exports
pub use file_classifier::{BinaryKind, FileClassifier};
pub use time_provider::TimeProvider;
pub use tool_locator::{conventional_binary_name, ToolLocator, TOOL_PATH_ENV};
pub use tool_spawner::{ExecutionError, SpawnedTool, ToolSpawner, WaitOutcome};
