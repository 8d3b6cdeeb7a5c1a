//! Options for slice operations.

use crate::config::global_config;

/// Options for slice reads, writes, appends and resizes.
#[derive(Debug, Clone)]
pub struct SliceOptions {
    concurrent_target: usize,
}

impl Default for SliceOptions {
    fn default() -> Self {
        Self {
            concurrent_target: global_config().codec_concurrent_target(),
        }
    }
}

impl SliceOptions {
    /// Create new slice options with a concurrent target.
    ///
    /// A zero concurrent target places no limit on concurrency.
    #[must_use]
    pub fn new(concurrent_target: usize) -> Self {
        Self { concurrent_target }
    }

    /// Return the concurrent target.
    #[must_use]
    pub fn concurrent_target(&self) -> usize {
        self.concurrent_target
    }

    /// Set the concurrent target.
    pub fn set_concurrent_target(&mut self, concurrent_target: usize) {
        self.concurrent_target = concurrent_target;
    }
}
