//! `ndstore` global configuration options.

use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global configuration options for the `ndstore` crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// # Miscellaneous Configuration Options
///
/// ## Validate Metadata On Open
///  > default: [`true`]
///
/// If enabled, [`Array::open`](crate::array::Array::open) validates the stored shapes, item size and fill value exactly as array creation does.
/// Otherwise stored metadata is trusted.
///
/// ## Concurrency Configuration Options
/// ## Default Codec Concurrent Target
/// > default: [`std::thread::available_parallelism`]`()`
///
/// The default concurrent target of a slice read, write, append or resize.
/// It is split between chunks processed in parallel and the blocks of each chunk processed in parallel.
/// Limiting concurrency can reduce memory usage and improve performance.
/// The concurrent target is disabled if set to zero.
///
/// Note that the default codec concurrent target can be overridden for any operation with [`SliceOptions`](crate::array::SliceOptions).
///
/// ## Default Chunk Concurrency Minimum
/// > default: `4`
///
/// For slice operations involving multiple chunks, this is the preferred minimum number of chunks processed in parallel.
/// The remainder of the concurrent target goes to the blocks within each chunk.

#[derive(Debug)]
pub struct Config {
    validate_metadata_on_open: bool,
    codec_concurrent_target: usize,
    chunk_concurrent_minimum: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            validate_metadata_on_open: true,
            codec_concurrent_target: std::thread::available_parallelism()
                .map_or(1, std::num::NonZeroUsize::get),
            chunk_concurrent_minimum: 4,
        }
    }
}

impl Config {
    /// Get the [validate metadata on open](#validate-metadata-on-open) configuration.
    #[must_use]
    pub fn validate_metadata_on_open(&self) -> bool {
        self.validate_metadata_on_open
    }

    /// Set the [validate metadata on open](#validate-metadata-on-open) configuration.
    pub fn set_validate_metadata_on_open(&mut self, validate_metadata_on_open: bool) {
        self.validate_metadata_on_open = validate_metadata_on_open;
    }

    /// Get the [default codec concurrent target](#default-codec-concurrent-target) configuration.
    #[must_use]
    pub fn codec_concurrent_target(&self) -> usize {
        self.codec_concurrent_target
    }

    /// Set the [default codec concurrent target](#default-codec-concurrent-target) configuration.
    pub fn set_codec_concurrent_target(&mut self, concurrent_target: usize) {
        self.codec_concurrent_target = concurrent_target;
    }

    /// Get the [default chunk concurrent minimum](#default-chunk-concurrency-minimum) configuration.
    #[must_use]
    pub fn chunk_concurrent_minimum(&self) -> usize {
        self.chunk_concurrent_minimum
    }

    /// Set the [default chunk concurrent minimum](#default-chunk-concurrency-minimum) configuration.
    pub fn set_chunk_concurrent_minimum(&mut self, concurrent_minimum: usize) {
        self.chunk_concurrent_minimum = concurrent_minimum;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global `ndstore` configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap()
}

/// Returns a mutable reference to the global `ndstore` configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap()
}
