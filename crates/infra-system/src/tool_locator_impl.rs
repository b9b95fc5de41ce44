// Tool locator
// Resolves the disassembler's installation path from an override directory,
// the IDA_PATH environment variable, or the process PATH, in that order.

use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

use idascript_core::domain::{ToolBitness, ToolMode};
use idascript_core::error::AppError;
use idascript_core::port::{conventional_binary_name, ToolLocator, TOOL_PATH_ENV};

/// Locator over the real environment and PATH
pub struct SystemToolLocator {
    override_dir: Option<PathBuf>,
}

impl SystemToolLocator {
    /// `override_dir` (typically a CLI flag) takes precedence over the
    /// `IDA_PATH` environment variable
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        Self { override_dir }
    }

    fn install_dir(&self) -> Option<PathBuf> {
        self.override_dir
            .clone()
            .or_else(|| env::var_os(TOOL_PATH_ENV).map(PathBuf::from))
    }
}

impl ToolLocator for SystemToolLocator {
    fn locate(&self, bitness: ToolBitness, mode: ToolMode) -> Result<PathBuf, AppError> {
        let name = conventional_binary_name(bitness, mode);
        let mut searched = Vec::new();

        if let Some(dir) = self.install_dir() {
            let candidate = dir.join(&name);
            if is_executable(&candidate) {
                debug!(path = %candidate.display(), "Resolved tool in install directory");
                return Ok(candidate);
            }
            searched.push(dir.display().to_string());
        }

        if let Ok(path) = which::which(&name) {
            debug!(path = %path.display(), "Resolved tool on PATH");
            return Ok(path);
        }
        searched.push("PATH".to_string());

        Err(AppError::ToolNotFound {
            name,
            searched: searched.join(", "),
        })
    }
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.is_file()
            && path
                .metadata()
                .map(|m| m.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
