//! Store configuration.
//!
//! Records live in `<root>/<folder>/`. The root is either given explicitly or
//! resolved per application from the platform data directory:
//! - Linux: ~/.local/share/<app>/
//! - macOS: ~/Library/Application Support/<qualifier>.<org>.<app>/
//! - Windows: %APPDATA%/<org>/<app>/data/

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Subdirectory of the application root that holds all records.
pub const DEFAULT_FOLDER: &str = "GameData";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Per-application writable root.
    pub root: PathBuf,
    pub folder: String,
    /// LZ4-compress record payloads.
    pub compression: bool,
    /// Write through a temp file and rename over the target.
    pub atomic_writes: bool,
}

impl StoreConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            folder: DEFAULT_FOLDER.to_string(),
            compression: true,
            atomic_writes: true,
        }
    }

    /// Resolves the platform data directory for the application.
    ///
    /// Returns `None` if the platform-specific directory cannot be determined.
    pub fn for_app(qualifier: &str, organization: &str, application: &str) -> Option<Self> {
        ProjectDirs::from(qualifier, organization, application)
            .map(|dirs| Self::with_root(dirs.data_dir()))
    }

    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    pub fn atomic_writes(mut self, enabled: bool) -> Self {
        self.atomic_writes = enabled;
        self
    }

    /// Directory that holds the records.
    pub fn directory(&self) -> PathBuf {
        self.root.join(&self.folder)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::with_root("/tmp/game");
        assert_eq!(config.folder, DEFAULT_FOLDER);
        assert!(config.compression);
        assert!(config.atomic_writes);
        assert_eq!(config.directory(), PathBuf::from("/tmp/game").join("GameData"));
    }

    #[test]
    fn test_builder_setters() {
        let config = StoreConfig::with_root("/tmp/game")
            .folder("Saves")
            .compression(false)
            .atomic_writes(false);
        assert_eq!(config.directory(), PathBuf::from("/tmp/game/Saves"));
        assert!(!config.compression);
        assert!(!config.atomic_writes);
    }
}
