//! Filesystem storage keyed by access code.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{FALLBACK_FILENAME, MAX_FILENAME_LENGTH};
use crate::relay::{BackingStore, StoredItem};
use crate::{RelayError, Result};

/// Location and size of a stored upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Full path of the file.
    pub path: PathBuf,
    /// Filename presented to downloaders.
    pub file_name: String,
    /// Size in bytes.
    pub size: u64,
}

/// File storage for relayed uploads.
///
/// Files are stored one per code directory:
/// ```text
/// {base_path}/
/// ├── 0421/
/// │   └── report.pdf
/// ├── 7730/
/// │   └── photo.jpg
/// └── ...
/// ```
#[derive(Debug, Clone)]
pub struct FileStorage {
    /// Base directory for file storage.
    base_path: PathBuf,
}

impl FileStorage {
    /// Create a new FileStorage with the given base path.
    ///
    /// The base directory will be created if it doesn't exist.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        Ok(Self { base_path })
    }

    /// Get the base path of this storage.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Directory for `code`, or `None` if `code` is not a plain digit string.
    pub fn code_dir(&self, code: &str) -> Option<PathBuf> {
        is_code_like(code).then(|| self.base_path.join(code))
    }

    /// Save `content` under `code`, replacing anything stored there before.
    ///
    /// Returns the path of the written file.
    pub fn save(&self, code: &str, original_name: &str, content: &[u8]) -> Result<PathBuf> {
        let dir = self.code_dir(code).ok_or_else(|| {
            RelayError::Validation(format!("not a storable code: {code:?}"))
        })?;

        match fs::remove_dir_all(&dir) {
            Ok(()) => tracing::warn!(code = %code, "Replaced stale upload directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&dir)?;

        let file_path = dir.join(sanitize_filename(original_name));
        fs::write(&file_path, content)?;

        Ok(file_path)
    }

    /// Find the file stored under `code`.
    pub fn locate(&self, code: &str) -> Result<StoredFile> {
        let dir = self.code_dir(code).ok_or(RelayError::InvalidCode)?;

        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if metadata.is_file() {
                return Ok(StoredFile {
                    path: entry.path(),
                    file_name: entry.file_name().to_string_lossy().into_owned(),
                    size: metadata.len(),
                });
            }
        }

        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no file stored for code {code}"),
        )
        .into())
    }

    /// Delete everything stored under `code`.
    ///
    /// Returns `true` if the directory was deleted, `false` if it didn't exist.
    pub fn delete(&self, code: &str) -> Result<bool> {
        let Some(dir) = self.code_dir(code) else {
            return Ok(false);
        };

        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Check if anything is stored under `code`.
    pub fn exists(&self, code: &str) -> bool {
        self.code_dir(code).is_some_and(|dir| dir.is_dir())
    }

    /// List every code directory with its modification time.
    ///
    /// Entries that are not code directories are ignored.
    pub fn list_codes(&self) -> Result<Vec<StoredItem>> {
        let mut items = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_code_like(&name) {
                continue;
            }

            let metadata = entry.metadata()?;
            if !metadata.is_dir() {
                continue;
            }

            items.push(StoredItem {
                code: name,
                modified: DateTime::<Utc>::from(metadata.modified()?),
            });
        }

        items.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(items)
    }
}

impl BackingStore for FileStorage {
    fn remove(&self, code: &str) -> Result<bool> {
        self.delete(code)
    }

    fn list(&self) -> Result<Vec<StoredItem>> {
        self.list_codes()
    }
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Directory parts (either separator) and control characters are dropped;
/// an empty result falls back to [`FALLBACK_FILENAME`].
pub fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or("");

    let cleaned: String = last
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILENAME_LENGTH)
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        FALLBACK_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}

fn is_code_like(code: &str) -> bool {
    !code.is_empty() && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_storage() -> (TempDir, FileStorage) {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();
        (temp_dir, storage)
    }

    #[test]
    fn test_new_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let storage_path = temp_dir.path().join("relay");

        assert!(!storage_path.exists());

        let storage = FileStorage::new(&storage_path).unwrap();

        assert!(storage_path.exists());
        assert_eq!(storage.base_path(), storage_path);
    }

    #[test]
    fn test_save_and_locate() {
        let (_temp_dir, storage) = setup_storage();

        let path = storage.save("0421", "notes.txt", b"0123456789").unwrap();
        assert_eq!(path, storage.base_path().join("0421").join("notes.txt"));

        let stored = storage.locate("0421").unwrap();
        assert_eq!(stored.file_name, "notes.txt");
        assert_eq!(stored.size, 10);
        assert_eq!(fs::read(&stored.path).unwrap(), b"0123456789");
    }

    #[test]
    fn test_save_replaces_stale_directory() {
        let (_temp_dir, storage) = setup_storage();

        storage.save("0001", "old.txt", b"old").unwrap();
        storage.save("0001", "new.txt", b"new").unwrap();

        let files: Vec<_> = fs::read_dir(storage.base_path().join("0001"))
            .unwrap()
            .collect();
        assert_eq!(files.len(), 1);
        assert_eq!(storage.locate("0001").unwrap().file_name, "new.txt");
    }

    #[test]
    fn test_save_rejects_non_code() {
        let (_temp_dir, storage) = setup_storage();

        let result = storage.save("../escape", "x.txt", b"data");
        assert!(matches!(result, Err(RelayError::Validation(_))));
    }

    #[test]
    fn test_locate_missing() {
        let (_temp_dir, storage) = setup_storage();

        assert!(matches!(storage.locate("9999"), Err(RelayError::Storage(_))));
        assert!(matches!(storage.locate("abc"), Err(RelayError::InvalidCode)));
    }

    #[test]
    fn test_delete() {
        let (_temp_dir, storage) = setup_storage();

        storage.save("1234", "a.bin", b"data").unwrap();
        assert!(storage.exists("1234"));

        assert!(storage.delete("1234").unwrap());
        assert!(!storage.exists("1234"));
        assert!(!storage.delete("1234").unwrap());
        assert!(!storage.delete("..").unwrap());
    }

    #[test]
    fn test_list_codes_skips_foreign_entries() {
        let (_temp_dir, storage) = setup_storage();

        storage.save("0002", "b.txt", b"b").unwrap();
        storage.save("0001", "a.txt", b"a").unwrap();
        fs::create_dir_all(storage.base_path().join("lost+found")).unwrap();
        fs::write(storage.base_path().join("1111"), b"plain file").unwrap();

        let codes: Vec<String> = storage
            .list_codes()
            .unwrap()
            .into_iter()
            .map(|i| i.code)
            .collect();
        assert_eq!(codes, vec!["0001", "0002"]);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\photo.jpg"), "photo.jpg");
        assert_eq!(sanitize_filename("bad\r\nname.txt"), "badname.txt");
        assert_eq!(sanitize_filename("dir/"), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename(".."), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename(""), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("資料.txt"), "資料.txt");
    }
}
