//! An in-memory store.

use parking_lot::{Mutex, RwLock};

use crate::{
    byte_range::{ByteOffset, ByteRange, InvalidByteRangeError},
    storage::{
        MaybeBytes, ReadableStorageTraits, ReadableWritableStorageTraits, StorageError, StoreKey,
        StoreKeyStartValue, StorePrefix, WritableStorageTraits,
    },
};

use std::{collections::BTreeMap, sync::Arc};

/// An in-memory store.
#[derive(Debug)]
pub struct MemoryStore {
    data_map: Mutex<BTreeMap<StoreKey, Arc<RwLock<Vec<u8>>>>>,
}

impl MemoryStore {
    /// Create a new, empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data_map: Mutex::default(),
        }
    }

    /// Return the number of keys in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data_map.lock().len()
    }

    /// Returns true if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data_map.lock().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    fn set_impl(
        &self,
        key: &StoreKey,
        value: &[u8],
        offset: Option<ByteOffset>,
        truncate: bool,
    ) -> Result<(), StorageError> {
        let mut data_map = self.data_map.lock();
        let data = data_map
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::default()))
            .clone();
        drop(data_map);
        let mut data = data.write();

        let offset = usize::try_from(offset.unwrap_or(0))
            .map_err(|_| StorageError::Other(format!("offset for {key} exceeds usize::MAX")))?;
        if truncate {
            data.truncate(offset);
        }
        let length = offset + value.len();
        if data.len() < length {
            data.resize(length, 0);
        }
        data[offset..length].copy_from_slice(value);
        Ok(())
    }
}

impl ReadableStorageTraits for MemoryStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        let data_map = self.data_map.lock();
        let data = data_map.get(key).cloned();
        drop(data_map);
        Ok(data.map(|data| data.read().clone()))
    }

    fn get_partial_values_key(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> Result<Option<Vec<Vec<u8>>>, StorageError> {
        let data_map = self.data_map.lock();
        let data = data_map.get(key).cloned();
        drop(data_map);
        if let Some(data) = data {
            let data = data.read();
            let size = data.len() as u64;
            let mut out = Vec::with_capacity(byte_ranges.len());
            for byte_range in byte_ranges {
                if !byte_range.is_within(size) {
                    return Err(InvalidByteRangeError::new(*byte_range, size).into());
                }
                out.push(data[byte_range.to_range_usize(size)].to_vec());
            }
            Ok(Some(out))
        } else {
            Ok(None)
        }
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        let data_map = self.data_map.lock();
        Ok(data_map.get(key).map(|entry| entry.read().len() as u64))
    }
}

impl WritableStorageTraits for MemoryStore {
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
        let mut data_map = self.data_map.lock();
        Ok(data_map.remove(key).is_some())
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<bool, StorageError> {
        let mut data_map = self.data_map.lock();
        let length_before = data_map.len();
        data_map.retain(|key, _| !key.has_prefix(prefix));
        Ok(data_map.len() != length_before)
    }
}

impl ReadableWritableStorageTraits for MemoryStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn memory_set() -> Result<(), Box<dyn Error>> {
        let store = MemoryStore::new();
        let key = "a/b".try_into()?;
        store.set(&key, &[0, 1, 2])?;
        assert_eq!(store.get(&key)?.unwrap(), &[0, 1, 2]);
        store.set_partial_values(&[StoreKeyStartValue::new(key.clone(), 1, &[3, 4])])?;
        assert_eq!(store.get(&key)?.unwrap(), &[0, 3, 4]);
        store.set_partial_values(&[StoreKeyStartValue::new(key.clone(), 5, &[9])])?;
        assert_eq!(store.get(&key)?.unwrap(), &[0, 3, 4, 0, 0, 9]);
        store.set(&key, &[7])?;
        assert_eq!(store.get(&key)?.unwrap(), &[7]);
        assert_eq!(store.size_key(&key)?, Some(1));
        Ok(())
    }

    #[test]
    fn memory_get_partial() -> Result<(), Box<dyn Error>> {
        let store = MemoryStore::new();
        let key = "a/b".try_into()?;
        store.set(&key, &[0, 1, 2, 3])?;
        assert_eq!(
            store
                .get_partial_values_key(&key, &[ByteRange::FromStart(1, None)])?
                .unwrap()
                .first()
                .unwrap(),
            &[1, 2, 3]
        );
        assert!(store
            .get_partial_values_key(&key, &[ByteRange::FromStart(3, Some(2))])
            .is_err());
        assert!(store
            .get_partial_values_key(&"a/b/c".try_into()?, &[ByteRange::FromStart(1, None)])?
            .is_none());
        Ok(())
    }

    #[test]
    fn memory_erase() -> Result<(), Box<dyn Error>> {
        let store = MemoryStore::new();
        store.set(&"c/0/0".try_into()?, &[0])?;
        store.set(&"c/0/1".try_into()?, &[1])?;
        store.set(&"array.json".try_into()?, &[2])?;
        assert_eq!(store.len(), 3);
        assert!(store.erase(&"c/0/0".try_into()?)?);
        assert!(!store.erase(&"c/0/0".try_into()?)?);
        assert!(store.erase_prefix(&"c/".try_into()?)?);
        assert!(!store.erase_prefix(&"c/".try_into()?)?);
        assert_eq!(store.len(), 1);
        Ok(())
    }
}
