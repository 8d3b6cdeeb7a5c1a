//! A filesystem store.

use crate::{
    byte_range::{ByteOffset, ByteRange, InvalidByteRangeError},
    storage::{
        ReadableStorageTraits, ReadableWritableStorageTraits, StorageError, StoreKey,
        StoreKeyStartValue, StorePrefix, WritableStorageTraits,
    },
};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

/// A synchronous file system store.
///
/// Each key maps to a file below the base path, with `/` separated key components mapping to directories.
#[derive(Debug)]
pub struct FilesystemStore {
    base_path: PathBuf,
    readonly: bool,
    files: Mutex<HashMap<StoreKey, Arc<RwLock<()>>>>,
}

/// A filesystem store creation error.
#[derive(Debug, Error)]
pub enum FilesystemStoreCreateError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// The path is not valid on this system.
    #[error("base path {0} is not valid")]
    InvalidBasePath(PathBuf),
}

impl FilesystemStore {
    /// Create a new file system store at a given `base_path`.
    ///
    /// The base directory is created on the first write if it does not exist.
    ///
    /// # Errors
    /// Returns a [`FilesystemStoreCreateError`] if `base_path`:
    ///   - is not valid, or
    ///   - it points to an existing file rather than a directory.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, FilesystemStoreCreateError> {
        let base_path = base_path.as_ref().to_path_buf();
        if base_path.to_str().is_none() || base_path.is_file() {
            return Err(FilesystemStoreCreateError::InvalidBasePath(base_path));
        }

        let readonly = if base_path.exists() {
            // the path already exists, check if it is read only
            let md = std::fs::metadata(&base_path)?;
            md.permissions().readonly()
        } else {
            false
        };

        Ok(Self {
            base_path,
            readonly,
            files: Mutex::default(),
        })
    }

    /// Return the base path of the store.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Maps a [`StoreKey`] to a filesystem [`PathBuf`].
    #[must_use]
    pub fn key_to_fspath(&self, key: &StoreKey) -> PathBuf {
        let mut path = self.base_path.clone();
        path.extend(key.as_str().split('/'));
        path
    }

    /// Maps a store [`StorePrefix`] to a filesystem [`PathBuf`].
    #[must_use]
    pub fn prefix_to_fs_path(&self, prefix: &StorePrefix) -> PathBuf {
        let mut path = self.base_path.clone();
        path.extend(prefix.as_str().split('/').filter(|c| !c.is_empty()));
        path
    }

    fn get_file_mutex(&self, key: &StoreKey) -> Arc<RwLock<()>> {
        let mut files = self.files.lock();
        let file = files
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::default()))
            .clone();
        drop(files);
        file
    }

    fn set_impl(
        &self,
        key: &StoreKey,
        value: &[u8],
        offset: Option<ByteOffset>,
        truncate: bool,
    ) -> Result<(), StorageError> {
        if self.readonly {
            return Err(StorageError::ReadOnly);
        }

        let file = self.get_file_mutex(key);
        let _lock = file.write();

        // Create directories
        let key_path = self.key_to_fspath(key);
        if let Some(parent) = key_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(truncate)
            .open(key_path)?;

        // Write
        if let Some(offset) = offset {
            file.seek(SeekFrom::Start(offset))?;
        }
        file.write_all(value)?;
        file.flush()?;

        Ok(())
    }
}

impl ReadableStorageTraits for FilesystemStore {
    fn get_partial_values_key(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> Result<Option<Vec<Vec<u8>>>, StorageError> {
        let file = self.get_file_mutex(key);
        let _lock = file.read();

        let mut file = match File::open(self.key_to_fspath(key)) {
            Ok(file) => file,
            Err(err) => {
                if err.kind() == std::io::ErrorKind::NotFound {
                    return Ok(None);
                }
                return Err(err.into());
            }
        };
        let size = file.metadata()?.len();

        let mut out = Vec::with_capacity(byte_ranges.len());
        for byte_range in byte_ranges {
            if !byte_range.is_within(size) {
                return Err(InvalidByteRangeError::new(*byte_range, size).into());
            }
            file.seek(SeekFrom::Start(byte_range.start(size)))?;
            let length = usize::try_from(byte_range.length(size)).map_err(|_| {
                StorageError::Other(format!("byte range {byte_range} exceeds usize::MAX"))
            })?;
            let mut buffer = vec![0; length];
            file.read_exact(&mut buffer)?;
            out.push(buffer);
        }

        Ok(Some(out))
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        let key_path = self.key_to_fspath(key);
        match std::fs::metadata(key_path) {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl WritableStorageTraits for FilesystemStore {
    fn set(&self, key: &StoreKey, value: &[u8]) -> Result<(), StorageError> {
        self.set_impl(key, value, None, true)
    }

    fn set_partial_values(
        &self,
        key_start_values: &[StoreKeyStartValue],
    ) -> Result<(), StorageError> {
        for key_start_value in key_start_values {
            self.set_impl(
                &key_start_value.key,
                key_start_value.value,
                Some(key_start_value.start),
                false,
            )?;
        }
        Ok(())
    }

    fn erase(&self, key: &StoreKey) -> Result<bool, StorageError> {
        if self.readonly {
            return Err(StorageError::ReadOnly);
        }

        let file = self.get_file_mutex(key);
        let _lock = file.write();

        let key_path = self.key_to_fspath(key);
        match std::fs::remove_file(key_path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<bool, StorageError> {
        if self.readonly {
            return Err(StorageError::ReadOnly);
        }

        let _lock = self.files.lock(); // lock all operations

        let prefix_path = self.prefix_to_fs_path(prefix);
        match std::fs::remove_dir_all(prefix_path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

impl ReadableWritableStorageTraits for FilesystemStore {}
