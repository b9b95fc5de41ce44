// File Classifier Port
// Content-based classification of candidate files; the Binary Locator only
// yields paths whose classification lands in the executable allow-list.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Executable binary formats accepted for analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BinaryKind {
    PeExecutable,
    ElfExecutable,
    ElfSharedObject,
    MachBinary,
}

impl BinaryKind {
    /// MIME-style name of the format (matches libmagic's vocabulary)
    pub fn mime_type(&self) -> &'static str {
        match self {
            BinaryKind::PeExecutable => "application/x-dosexec",
            BinaryKind::ElfExecutable => "application/x-executable",
            BinaryKind::ElfSharedObject => "application/x-sharedlib",
            BinaryKind::MachBinary => "application/x-mach-binary",
        }
    }
}

/// File Classifier trait
///
/// Returns `None` for anything that is not an accepted executable format,
/// including unreadable files: classification failures during a directory
/// walk are skipped per file, never fatal.
pub trait FileClassifier: Send + Sync {
    fn classify(&self, path: &Path) -> Option<BinaryKind>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;

    /// Classifier keying off the file extension instead of content
    pub struct ExtensionClassifier;

    impl FileClassifier for ExtensionClassifier {
        fn classify(&self, path: &Path) -> Option<BinaryKind> {
            match path.extension().and_then(|e| e.to_str()) {
                Some("elf") => Some(BinaryKind::ElfExecutable),
                Some("so") => Some(BinaryKind::ElfSharedObject),
                Some("exe") => Some(BinaryKind::PeExecutable),
                Some("macho") => Some(BinaryKind::MachBinary),
                _ => None,
            }
        }
    }
}
