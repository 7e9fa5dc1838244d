//! JSON persistence of machine records inside the machine's directory.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

use super::MachineRecord;

/// File name of the persisted record within a machine directory.
pub const RECORD_FILE_NAME: &str = "machine.json";

/// Errors raised while reading or writing machine records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the record cannot be encoded or decoded.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path of the record file.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when no record exists for the machine.
    #[error("no machine record at {path}")]
    NotFound {
        /// Path that was expected to hold the record.
        path: Utf8PathBuf,
    },
}

/// Reads and writes `machine.json` in a single machine directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineStore {
    root: Utf8PathBuf,
}

impl MachineStore {
    /// Builds a store rooted at the machine's directory.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the record and the key file.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Location of the record file.
    #[must_use]
    pub fn record_path(&self) -> Utf8PathBuf {
        self.root.join(RECORD_FILE_NAME)
    }

    /// Reports whether a record has been saved.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the directory exists but cannot be
    /// inspected.
    pub fn exists(&self) -> Result<bool, StoreError> {
        match Dir::open_ambient_dir(&self.root, ambient_authority()) {
            Ok(dir) => dir
                .try_exists(RECORD_FILE_NAME)
                .map_err(|err| io_error(&self.record_path(), &err)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_error(&self.root, &err)),
        }
    }

    /// Loads the saved record. The API token is not part of the file and
    /// comes back empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when nothing was saved,
    /// [`StoreError::Parse`] for malformed content and [`StoreError::Io`] for
    /// other access failures.
    pub fn load(&self) -> Result<MachineRecord, StoreError> {
        let path = self.record_path();
        let dir = match Dir::open_ambient_dir(&self.root, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { path });
            }
            Err(err) => return Err(io_error(&self.root, &err)),
        };
        let contents = match dir.read_to_string(RECORD_FILE_NAME) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { path });
            }
            Err(err) => return Err(io_error(&path, &err)),
        };
        serde_json::from_str(&contents).map_err(|err| StoreError::Parse {
            path,
            message: err.to_string(),
        })
    }

    /// Writes the record, creating the directory when needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the directory or file cannot be
    /// written.
    pub fn save(&self, record: &MachineRecord) -> Result<(), StoreError> {
        let path = self.record_path();
        let rendered = serde_json::to_string_pretty(record).map_err(|err| StoreError::Parse {
            path: path.clone(),
            message: err.to_string(),
        })?;
        Dir::create_ambient_dir_all(&self.root, ambient_authority())
            .map_err(|err| io_error(&self.root, &err))?;
        let dir = Dir::open_ambient_dir(&self.root, ambient_authority())
            .map_err(|err| io_error(&self.root, &err))?;
        dir.write(RECORD_FILE_NAME, rendered)
            .map_err(|err| io_error(&path, &err))
    }

    /// Deletes the record file. A missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the file exists but cannot be removed.
    pub fn remove(&self) -> Result<(), StoreError> {
        let dir = match Dir::open_ambient_dir(&self.root, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(io_error(&self.root, &err)),
        };
        match dir.remove_file(RECORD_FILE_NAME) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&self.record_path(), &err)),
        }
    }
}

fn io_error(path: &Utf8Path, err: &io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Phase;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct StoreFixture {
        _tmp: TempDir,
        store: MachineStore,
    }

    #[fixture]
    fn store_fixture() -> StoreFixture {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let root = Utf8PathBuf::from_path_buf(tmp.path().join("node-1"))
            .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()));
        StoreFixture {
            _tmp: tmp,
            store: MachineStore::new(root),
        }
    }

    #[rstest]
    fn save_then_load_preserves_record(store_fixture: StoreFixture) {
        let StoreFixture { store, .. } = store_fixture;
        let mut record = MachineRecord::new("node-1", store.root());
        record.server_id = Some(42);
        record.ssh_key_id = Some(7);
        record.ip_address = Some("203.0.113.5".parse().unwrap_or_else(|err| panic!("{err}")));
        record.phase = Phase::Addressable;

        store
            .save(&record)
            .unwrap_or_else(|err| panic!("save record: {err}"));
        assert!(store.exists().unwrap_or_else(|err| panic!("exists: {err}")));

        let loaded = store.load().unwrap_or_else(|err| panic!("load record: {err}"));
        assert_eq!(loaded, record);
    }

    #[rstest]
    fn load_without_record_is_not_found(store_fixture: StoreFixture) {
        let StoreFixture { store, .. } = store_fixture;
        let err = store.load().expect_err("missing record should fail");
        assert!(matches!(err, StoreError::NotFound { .. }), "got {err:?}");
        assert!(!store.exists().unwrap_or_else(|err| panic!("exists: {err}")));
    }

    #[rstest]
    fn malformed_record_is_a_parse_error(store_fixture: StoreFixture) {
        let StoreFixture { store, .. } = store_fixture;
        std::fs::create_dir_all(store.root()).unwrap_or_else(|err| panic!("mkdir: {err}"));
        std::fs::write(store.record_path(), "{not json")
            .unwrap_or_else(|err| panic!("write: {err}"));

        let err = store.load().expect_err("malformed record should fail");
        assert!(matches!(err, StoreError::Parse { .. }), "got {err:?}");
    }

    #[rstest]
    fn remove_is_idempotent(store_fixture: StoreFixture) {
        let StoreFixture { store, .. } = store_fixture;
        store
            .save(&MachineRecord::new("node-1", store.root()))
            .unwrap_or_else(|err| panic!("save record: {err}"));

        store.remove().unwrap_or_else(|err| panic!("first remove: {err}"));
        store.remove().unwrap_or_else(|err| panic!("second remove: {err}"));
        assert!(!store.exists().unwrap_or_else(|err| panic!("exists: {err}")));
    }
}
