// Binary store
// One record file per data bucket under <root>/GameData, written atomically

pub mod config;
pub mod error;

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::format::{decode_record, encode_record, RecordOptions};
use crate::schema::{self, EligibilityError, Persist};

pub use config::{StoreConfig, DEFAULT_FOLDER};
pub use error::StoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Suffix of the temp file used by atomic writes. Names ending in it are reserved.
const TEMP_SUFFIX: &str = ".tmp";

/// What [`BinaryStore::save`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Written { path: PathBuf, bytes: usize },
    /// The type failed the eligibility check; nothing was touched on disk.
    Skipped(EligibilityError),
}

impl SaveOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, SaveOutcome::Written { .. })
    }
}

#[derive(Debug, Clone)]
pub struct BinaryStore {
    config: StoreConfig,
}

impl BinaryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Store rooted in the platform data directory of the application.
    pub fn for_app(qualifier: &str, organization: &str, application: &str) -> Result<Self> {
        StoreConfig::for_app(qualifier, organization, application)
            .map(Self::new)
            .ok_or(StoreError::NoDataDirectory)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn directory(&self) -> PathBuf {
        self.config.directory()
    }

    /// Full path of the record named `filename`.
    pub fn file_path(&self, filename: &str) -> Result<PathBuf> {
        Self::validate_name(filename)?;
        Ok(self.directory().join(filename))
    }

    /// Writes `data` to `filename`, replacing any previous record of that name.
    pub fn save<T>(&self, data: &T, filename: &str) -> Result<SaveOutcome>
    where
        T: Persist + Serialize + 'static,
    {
        let path = self.file_path(filename)?;

        // Eligibility short-circuits before any I/O
        if let Err(err) = schema::check::<T>() {
            log::error!("Refusing to save {}: {}", filename, err);
            return Ok(SaveOutcome::Skipped(err));
        }

        let options = RecordOptions { compress: self.config.compression };
        let data = encode_record(data, options)
            .map_err(|source| StoreError::Encode { path: path.clone(), source })?;

        let directory = self.directory();
        fs::create_dir_all(&directory)
            .map_err(|source| StoreError::io("create directory", &directory, source))?;

        if self.config.atomic_writes {
            Self::write_atomic(&path, &data)?;
        } else {
            fs::write(&path, &data).map_err(|source| StoreError::io("write", &path, source))?;
        }

        log::debug!("Saved {} bytes to {:?}", data.len(), path);
        Ok(SaveOutcome::Written { path, bytes: data.len() })
    }

    /// Reads the record named `filename`.
    ///
    /// A missing record, or a type that fails the eligibility check, yields
    /// `T::default()`. A record that exists but cannot be decoded is an error.
    pub fn load<T>(&self, filename: &str) -> Result<T>
    where
        T: Persist + DeserializeOwned + Default + 'static,
    {
        let path = self.file_path(filename)?;

        if let Err(err) = schema::check::<T>() {
            log::error!("Refusing to load {}: {}", filename, err);
            return Ok(T::default());
        }

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::debug!("No record at {:?}, using defaults", path);
                return Ok(T::default());
            }
            Err(source) => return Err(StoreError::io("read", &path, source)),
        };

        let value = decode_record(&data)
            .map_err(|source| StoreError::Format { path: path.clone(), source })?;

        log::debug!("Loaded {} bytes from {:?}", data.len(), path);
        Ok(value)
    }

    /// Whether a record named `filename` exists. Invalid names never exist.
    pub fn has_saved(&self, filename: &str) -> bool {
        self.file_path(filename).map(|path| path.is_file()).unwrap_or(false)
    }

    /// Removes the record named `filename`. Returns whether one existed.
    pub fn delete(&self, filename: &str) -> Result<bool> {
        let path = self.file_path(filename)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                log::info!("Deleted record {:?}", path);
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::io("delete", &path, source)),
        }
    }

    fn validate_name(filename: &str) -> Result<()> {
        let invalid = filename.is_empty()
            || filename == "."
            || filename == ".."
            || filename.contains(['/', '\\', '\0'])
            || filename.ends_with(TEMP_SUFFIX);
        if invalid {
            return Err(StoreError::InvalidFileName { name: filename.to_string() });
        }
        Ok(())
    }

    fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
        // Write to temp file, then rename
        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(TEMP_SUFFIX);
        let temp_path = PathBuf::from(temp_name);

        let written = (|| -> std::io::Result<()> {
            let mut file = File::create(&temp_path)?;
            file.write_all(data)?;
            file.flush()?;

            // sync_all ensures data is written to disk (portable fsync)
            file.sync_all()
        })();

        if let Err(source) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::io("write", &temp_path, source));
        }

        if let Err(source) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::io("replace", path, source));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(temp_dir: &TempDir) -> BinaryStore {
        BinaryStore::new(StoreConfig::with_root(temp_dir.path()))
    }

    #[test]
    fn test_file_name_validation() {
        assert!(BinaryStore::validate_name("player-data.txt").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b", "slot.tmp"] {
            assert!(
                matches!(BinaryStore::validate_name(bad), Err(StoreError::InvalidFileName { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_atomic_save_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);

        let outcome = store.save(&vec![1i32, 2, 3], "numbers.dat").unwrap();
        assert!(outcome.is_written());

        let path = store.file_path("numbers.dat").unwrap();
        assert!(path.exists());
        assert!(!store.directory().join("numbers.dat.tmp").exists());
    }

    #[test]
    fn test_non_atomic_save() {
        let temp_dir = TempDir::new().unwrap();
        let store = BinaryStore::new(
            StoreConfig::with_root(temp_dir.path()).atomic_writes(false).compression(false),
        );

        store.save(&String::from("hello"), "greeting").unwrap();
        let loaded: String = store.load("greeting").unwrap();
        assert_eq!(loaded, "hello");
    }

    #[test]
    fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);

        assert!(!store.delete("gone.dat").unwrap());
        store.save(&7u8, "gone.dat").unwrap();
        assert!(store.has_saved("gone.dat"));
        assert!(store.delete("gone.dat").unwrap());
        assert!(!store.has_saved("gone.dat"));
    }

    #[test]
    fn test_has_saved_rejects_invalid_names() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        assert!(!store.has_saved("../escape"));
        assert!(!store.has_saved(""));
    }

    #[test]
    fn test_directory_is_a_file_reports_io_error() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(DEFAULT_FOLDER), b"not a directory").unwrap();
        let store = store_in(&temp_dir);

        let result = store.save(&1i32, "blocked.dat");
        assert!(matches!(result, Err(StoreError::Io { .. })));
        assert!(result.unwrap_err().is_recoverable());
    }
}
