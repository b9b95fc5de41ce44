// idascript Infrastructure - System Adapters
// Implements: ToolSpawner, ToolLocator, FileClassifier + binary discovery

pub mod binary_walker;
pub mod file_classifier_impl;
pub mod process_tree;
pub mod tool_locator_impl;
pub mod tool_process;

pub use binary_walker::BinaryWalker;
pub use file_classifier_impl::ObjectFileClassifier;
pub use tool_locator_impl::SystemToolLocator;
pub use tool_process::SystemToolSpawner;
