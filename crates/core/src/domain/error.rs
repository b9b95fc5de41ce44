// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Script file not found: {0}")]
    ScriptNotFound(String),

    #[error("Invalid script option (expected 'key:value'): {0}")]
    InvalidScriptOption(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
