// Domain Layer - Pure entities, no IO

pub mod error;
pub mod invocation;
pub mod outcome;

// Re-exports
pub use error::DomainError;
pub use invocation::{InvocationTemplate, ToolBitness, ToolInvocation, ToolMode};
pub use outcome::{BatchOutcome, RunStatus, RunVerdict, SPAWN_RETURNCODE, TIMEOUT_RETURNCODE};
