// Binary discovery
// Walks a file-or-directory root and lazily yields paths classified as
// executable binaries.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

use idascript_core::port::FileClassifier;

/// Discovers executable binaries under a root path
pub struct BinaryWalker {
    classifier: Arc<dyn FileClassifier>,
}

impl BinaryWalker {
    pub fn new(classifier: Arc<dyn FileClassifier>) -> Self {
        Self { classifier }
    }

    /// Lazy, single-pass sequence of classified binaries under `root`
    ///
    /// A file root yields itself when it classifies; a directory root is
    /// walked recursively (symlinks not followed). Unreadable entries and
    /// classification failures are skipped per file, never fatal.
    /// Re-iterating requires a fresh call.
    pub fn iter_binaries(&self, root: &Path) -> impl Iterator<Item = PathBuf> + Send + 'static {
        let classifier = Arc::clone(&self.classifier);

        WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(move |path| classifier.classify(path).is_some())
    }
}
