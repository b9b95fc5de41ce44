// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Tool not found: no '{name}' binary in {searched}")]
    ToolNotFound { name: String, searched: String },
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
