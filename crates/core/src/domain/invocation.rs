// Tool Invocation Domain Model
//
// A ToolInvocation fully determines the command line and environment overlay
// of one external-tool run. Immutable once constructed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::error::{DomainError, Result};

/// Headless auto-analysis flag, always passed first
pub const AUTO_ANALYSIS_FLAG: &str = "-A";

/// Bitness variant of the external tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolBitness {
    B32,
    B64,
}

impl std::fmt::Display for ToolBitness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolBitness::B32 => write!(f, "32"),
            ToolBitness::B64 => write!(f, "64"),
        }
    }
}

/// Invocation mode of the external tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolMode {
    Gui,
    Headless,
}

impl std::fmt::Display for ToolMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolMode::Gui => write!(f, "GUI"),
            ToolMode::Headless => write!(f, "HEADLESS"),
        }
    }
}

/// One external-tool run on one target file
///
/// Two flavours, matching the tool's own CLI:
/// - script mode: a script is auto-run on the target, `script_args` are
///   forwarded to the script
/// - direct mode (`script == None`): `script_args` are raw `key:value`
///   tool options, passed as `-Okey:value`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub executable: PathBuf,
    pub target: PathBuf,
    pub script: Option<PathBuf>,
    pub script_args: Vec<String>,
    pub mode: ToolMode,
    pub bitness: ToolBitness,
    pub extra_env: HashMap<String, String>,
}

impl ToolInvocation {
    /// Argument vector handed to the spawned process (executable excluded)
    ///
    /// Fixed order required by the tool's CLI parsing:
    /// `-A -S<script> <script_args...> <target>` in script mode,
    /// `-A <script_args...> <target>` in direct mode (args pre-formatted as
    /// `-O` options at template construction).
    pub fn command_args(&self) -> Vec<String> {
        let mut args = vec![AUTO_ANALYSIS_FLAG.to_string()];

        if let Some(script) = &self.script {
            args.push(format!("-S{}", script.display()));
        }
        args.extend(self.script_args.iter().cloned());
        args.push(self.target.display().to_string());
        args
    }

    /// Environment overlay merged over the parent process environment
    ///
    /// Headless batch runs force `TVHEADLESS=1` and `TERM=xterm` so the tool
    /// never tries to bring up a display. `extra_env` wins on conflict.
    pub fn environment_overlay(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if self.mode == ToolMode::Headless {
            env.insert("TVHEADLESS".to_string(), "1".to_string());
            env.insert("TERM".to_string(), "xterm".to_string());
        }
        env.extend(self.extra_env.clone());
        env
    }
}

/// An invocation minus its target: one resolved tool path and script serve a
/// whole batch, stamped per file via [`InvocationTemplate::for_target`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationTemplate {
    executable: PathBuf,
    script: Option<PathBuf>,
    script_args: Vec<String>,
    mode: ToolMode,
    bitness: ToolBitness,
    extra_env: HashMap<String, String>,
}

impl InvocationTemplate {
    /// Template auto-running a script on every target
    pub fn script_mode(
        executable: impl Into<PathBuf>,
        bitness: ToolBitness,
        mode: ToolMode,
        script: impl Into<PathBuf>,
        script_args: Vec<String>,
    ) -> Self {
        Self {
            executable: executable.into(),
            script: Some(script.into()),
            script_args,
            mode,
            bitness,
            extra_env: HashMap::new(),
        }
    }

    /// Template passing raw `key:value` tool options, no script
    ///
    /// # Errors
    /// `DomainError::InvalidScriptOption` when an option lacks the `:`
    pub fn direct_mode(
        executable: impl Into<PathBuf>,
        bitness: ToolBitness,
        mode: ToolMode,
        options: Vec<String>,
    ) -> Result<Self> {
        let mut script_args = Vec::with_capacity(options.len());
        for option in options {
            if !option.contains(':') {
                return Err(DomainError::InvalidScriptOption(option));
            }
            script_args.push(format!("-O{}", option));
        }

        Ok(Self {
            executable: executable.into(),
            script: None,
            script_args,
            mode,
            bitness,
            extra_env: HashMap::new(),
        })
    }

    /// Add environment entries layered over the parent environment
    pub fn with_extra_env(mut self, extra_env: HashMap<String, String>) -> Self {
        self.extra_env = extra_env;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Stamp out the concrete invocation for one target file
    pub fn for_target(&self, target: impl Into<PathBuf>) -> ToolInvocation {
        ToolInvocation {
            executable: self.executable.clone(),
            target: target.into(),
            script: self.script.clone(),
            script_args: self.script_args.clone(),
            mode: self.mode,
            bitness: self.bitness,
            extra_env: self.extra_env.clone(),
        }
    }
}
