//! Bounded-concurrency batch execution.

use futures::future::try_join_all;
use std::future::Future;

/// Runs jobs in consecutive fixed-size groups.
///
/// Jobs inside a group run concurrently; the next group starts only after the
/// whole previous group finished. Results come back in input order. The first
/// failing job fails the whole call, so best-effort callers should map item
/// failures to a sentinel inside the worker.
#[derive(Debug, Clone, Copy)]
pub struct BatchFetcher {
  batch_size: usize,
}

impl Default for BatchFetcher {
  fn default() -> Self {
    Self { batch_size: 5 }
  }
}

impl BatchFetcher {
  /// A zero size is treated as one.
  pub fn new(batch_size: usize) -> Self {
    Self {
      batch_size: batch_size.max(1),
    }
  }

  pub fn batch_size(&self) -> usize {
    self.batch_size
  }

  pub async fn run<I, T, E, F, Fut>(&self, items: I, mut worker: F) -> Result<Vec<T>, E>
  where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    let mut items = items.into_iter().peekable();
    let mut results = Vec::new();

    while items.peek().is_some() {
      let group: Vec<Fut> = items.by_ref().take(self.batch_size).map(&mut worker).collect();
      results.extend(try_join_all(group).await?);
    }

    Ok(results)
  }
}
