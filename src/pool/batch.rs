//! Fixed-size batch execution of remote calls.
//!
//! Requests inside a batch are in flight together and joined; batches run
//! strictly one after another to bound concurrent load on the API. The first
//! failure inside a batch fails the whole run.

use crate::models::{OaiftError, Result};
use futures::future::try_join_all;
use std::future::Future;
use tracing::{debug, info};

/// Default number of requests in flight per batch.
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Sequential batches of concurrent calls.
#[derive(Debug, Clone, Copy)]
pub struct BatchExecutor {
    batch_size: usize,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl BatchExecutor {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Sizes of the batches `total` items are split into.
    pub fn plan(&self, total: usize) -> Vec<usize> {
        (0..total)
            .step_by(self.batch_size)
            .map(|start| (total - start).min(self.batch_size))
            .collect()
    }

    /// Run `send` over all items and return results in input order.
    ///
    /// `on_batch` sees each batch's results (and its 1-based number) as soon
    /// as the batch joins, before the next batch is dispatched.
    pub async fn run<T, R, F, Fut, C>(&self, items: Vec<T>, send: F, mut on_batch: C) -> Result<Vec<R>>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R>>,
        C: FnMut(usize, &[R]) -> Result<()>,
    {
        let total = items.len();
        let batches = self.plan(total).len();
        let mut results = Vec::with_capacity(total);
        let mut pending = items.into_iter();

        for number in 1..=batches {
            let batch: Vec<T> = pending.by_ref().take(self.batch_size).collect();
            info!(
                batch = number,
                batches = batches,
                size = batch.len(),
                "Processing batch"
            );

            let outputs = try_join_all(batch.into_iter().map(&send)).await?;
            on_batch(number, &outputs)?;
            results.extend(outputs);

            debug!(batch = number, completed = results.len(), "Batch joined");
        }

        if results.len() != total {
            return Err(OaiftError::Internal(format!(
                "batch executor produced {} results for {} items",
                results.len(),
                total
            )));
        }

        Ok(results)
    }
}
