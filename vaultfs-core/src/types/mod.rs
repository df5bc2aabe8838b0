// Module declarations
pub mod entry;
pub mod path;

// Re-export all types from submodules
pub use entry::{DirListing, FileContent, FileInfo};
pub use path::VaultPath;
