//! Directory-backed storage backend.
//!
//! Each key is stored in its own file. File names are the key with every byte
//! outside `[A-Za-z0-9_.~-]` percent-encoded, so arbitrary lock keys and
//! identities map to valid, collision-free names. A leading `.` is encoded
//! too: dot-prefixed names are reserved for in-flight temporary files.

use super::{Storage, StorageError, StorageResult};
use crate::fs::atomic_write;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Storage rooted at a directory shared by every participating process.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory.
    pub fn open<P: AsRef<Path>>(root: P) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    /// The storage directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(encode_key(key))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(io_error(key, source)),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        atomic_write(self.path_for(key), value.as_bytes()).map_err(|e| io_error(key, e))
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(io_error(key, source)),
        }
    }

    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| io_error(prefix, e))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error(prefix, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            // Temporary files from atomic writes
            if name.starts_with('.') {
                continue;
            }

            if let Some(key) = decode_key(name)
                && key.starts_with(prefix)
            {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }
}

fn io_error(key: &str, source: std::io::Error) -> StorageError {
    StorageError::Io {
        key: key.to_string(),
        source,
    }
}

fn encode_key(key: &str) -> String {
    let encoded = urlencoding::encode(key);
    match encoded.strip_prefix('.') {
        Some(rest) => format!("%2E{}", rest),
        None => encoded.into_owned(),
    }
}

fn decode_key(name: &str) -> Option<String> {
    urlencoding::decode(name).ok().map(|key| key.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn key_encoding_roundtrips_awkward_keys() {
        for key in ["plain", "k:ticket:a/b", ".hidden", "sp ace%", "ünï"] {
            let encoded = encode_key(key);
            assert!(!encoded.starts_with('.'));
            assert!(!encoded.contains('/'));
            assert_eq!(decode_key(&encoded).as_deref(), Some(key));
        }
    }

    #[test]
    fn leading_dot_is_escaped() {
        assert_eq!(encode_key(".hidden"), "%2Ehidden");
        assert_eq!(encode_key("a.b"), "a.b");
        assert_eq!(encode_key("k:ticket:x"), "k%3Aticket%3Ax");
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        assert_eq!(decode_key("bad%FF"), None);
    }

    #[test]
    fn set_get_remove() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::open(temp_dir.path()).unwrap();

        assert_eq!(storage.get("k:ticket:a").unwrap(), None);

        storage.set("k:ticket:a", "{\"number\":1}").unwrap();
        assert_eq!(
            storage.get("k:ticket:a").unwrap().as_deref(),
            Some("{\"number\":1}")
        );

        storage.remove("k:ticket:a").unwrap();
        assert_eq!(storage.get("k:ticket:a").unwrap(), None);

        // Removing twice is fine
        storage.remove("k:ticket:a").unwrap();
    }

    #[test]
    fn keys_lists_prefix_and_skips_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::open(temp_dir.path()).unwrap();

        storage.set("k:ticket:b", "2").unwrap();
        storage.set("k:ticket:a", "1").unwrap();
        storage.set("k:entering:a", "x").unwrap();
        fs::write(temp_dir.path().join(".k%3Aticket%3Ac.1.0.tmp"), "junk").unwrap();

        let keys = storage.keys("k:ticket:").unwrap();
        assert_eq!(keys, vec!["k:ticket:a", "k:ticket:b"]);
    }

    #[test]
    fn two_handles_on_one_directory_share_state() {
        let temp_dir = TempDir::new().unwrap();
        let a = FileStorage::open(temp_dir.path()).unwrap();
        let b = FileStorage::open(temp_dir.path()).unwrap();

        a.set("shared", "value").unwrap();
        assert_eq!(b.get("shared").unwrap().as_deref(), Some("value"));
    }

    #[test]
    fn open_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("nested").join("store");

        let storage = FileStorage::open(&root).unwrap();

        assert!(root.is_dir());
        assert_eq!(storage.root(), root.as_path());
    }
}
