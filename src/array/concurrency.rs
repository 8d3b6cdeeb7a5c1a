//! Concurrency utilities for slice operations.
//!
//! Slice operations process chunks concurrently (outer) and the compression blocks of each chunk concurrently (inner).

use crate::config::global_config;

/// The recommended concurrency of an operation, expressed as a range from the most efficient to the maximum concurrency.
#[derive(Debug, Clone)]
pub struct RecommendedConcurrency {
    /// The range is just used for its constructor and start/end, no iteration
    range: std::ops::Range<usize>,
}

impl RecommendedConcurrency {
    /// Create a new recommended concurrency struct with an explicit concurrency range.
    #[must_use]
    pub fn new(range: std::ops::Range<usize>) -> Self {
        let range = std::cmp::max(1, range.start)..std::cmp::max(1, range.end);
        Self { range }
    }

    /// Create a new recommended concurrency struct with a specified maximum concurrency.
    #[must_use]
    pub fn new_maximum(maximum: usize) -> Self {
        Self::new(1..maximum)
    }

    /// Return the minimum concurrency.
    #[must_use]
    pub fn min(&self) -> usize {
        self.range.start
    }

    /// Return the maximum concurrency.
    #[must_use]
    pub fn max(&self) -> usize {
        self.range.end
    }
}

/// Calculate the outer and inner concurrent limits given a concurrency target and their recommended concurrency.
///
/// Return is (outer, inner).
#[must_use]
pub fn calc_concurrency_outer_inner(
    concurrency_target: usize,
    recommended_concurrency_outer: &RecommendedConcurrency,
    recommended_concurrency_inner: &RecommendedConcurrency,
) -> (usize, usize) {
    let mut concurrency_inner = recommended_concurrency_inner.min();
    let mut concurrency_outer = recommended_concurrency_outer.min();

    if concurrency_inner * concurrency_outer < concurrency_target {
        // Try increasing inner
        concurrency_inner = std::cmp::min(
            concurrency_target.div_ceil(concurrency_outer),
            recommended_concurrency_inner.max(),
        );
    }

    if concurrency_inner * concurrency_outer < concurrency_target {
        // Try increasing outer
        concurrency_outer = std::cmp::min(
            concurrency_target.div_ceil(concurrency_inner),
            recommended_concurrency_outer.max(),
        );
    }

    (concurrency_outer, concurrency_inner)
}

/// Calculate the chunk and block concurrent limits of a slice operation touching `num_chunks` chunks of `num_blocks` blocks.
///
/// A zero `concurrency_target` places no limit on either.
/// Return is (chunks, blocks).
#[must_use]
pub(crate) fn concurrency_chunks_and_blocks(
    concurrency_target: usize,
    num_chunks: usize,
    num_blocks: usize,
) -> (usize, usize) {
    if concurrency_target == 0 {
        return (std::cmp::max(1, num_chunks), std::cmp::max(1, num_blocks));
    }
    let chunk_concurrent_minimum = global_config().chunk_concurrent_minimum();
    let min_concurrent_chunks = std::cmp::min(chunk_concurrent_minimum, num_chunks);
    let max_concurrent_chunks = std::cmp::max(chunk_concurrent_minimum, num_chunks);
    calc_concurrency_outer_inner(
        concurrency_target,
        &RecommendedConcurrency::new(min_concurrent_chunks..max_concurrent_chunks),
        &RecommendedConcurrency::new_maximum(num_blocks),
    )
}
