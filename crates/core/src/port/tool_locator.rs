// Tool Locator Port
// Resolves the external tool's installation path once per process lifetime;
// the resolved path is passed explicitly into invocations afterwards.

use std::path::PathBuf;

use crate::domain::{ToolBitness, ToolMode};
use crate::error::AppError;

/// Environment variable naming the tool's installation directory
pub const TOOL_PATH_ENV: &str = "IDA_PATH";

/// Conventional binary name: `ida[64][c]`, trailing `c` for the
/// headless/console variant, platform exe suffix appended
pub fn conventional_binary_name(bitness: ToolBitness, mode: ToolMode) -> String {
    format!(
        "ida{}{}{}",
        match bitness {
            ToolBitness::B32 => "",
            ToolBitness::B64 => "64",
        },
        match mode {
            ToolMode::Gui => "",
            ToolMode::Headless => "c",
        },
        std::env::consts::EXE_SUFFIX,
    )
}

/// Tool Locator trait (pure lookup, no side effects)
pub trait ToolLocator: Send + Sync {
    /// Resolve the installation path of the tool variant
    ///
    /// # Errors
    /// - AppError::ToolNotFound when neither the override directory nor the
    ///   process PATH yields an existing, executable file
    fn locate(&self, bitness: ToolBitness, mode: ToolMode) -> Result<PathBuf, AppError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;

    /// Locator that always resolves to a fixed path
    pub struct FixedToolLocator {
        path: PathBuf,
    }

    impl FixedToolLocator {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }
    }

    impl ToolLocator for FixedToolLocator {
        fn locate(&self, _bitness: ToolBitness, _mode: ToolMode) -> Result<PathBuf, AppError> {
            Ok(self.path.clone())
        }
    }
}
