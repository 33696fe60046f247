//! Compress or decompress independent blocks on a worker pool,
//! returning the results in the order of the input.

use crate::error::Result;
use crate::file::Threads;


/// An optional thread pool. Without a pool, all work runs on the calling thread.
#[derive(Debug)]
pub struct BlockPool {
    #[cfg(feature = "rayon")]
    pool: Option<rayon_core::ThreadPool>,
}

impl BlockPool {

    /// Create a pool for the requested threads.
    /// Falls back to the calling thread if a pool cannot be created.
    pub fn new(threads: Threads, name: &'static str) -> Self {
        #[cfg(feature = "rayon")] {
            let pool = threads.worker_count().and_then(|count| {
                let built = rayon_core::ThreadPoolBuilder::new()
                    .num_threads(count)
                    .thread_name(move |index| format!("{} #{}", name, index))
                    .build();

                // in case thread pool creation fails (for example on wasm),
                // we revert to sequential processing
                match built {
                    Ok(pool) => Some(pool),
                    Err(error) => {
                        tracing::warn!(%error, "cannot create thread pool, processing blocks sequentially");
                        None
                    }
                }
            });

            BlockPool { pool }
        }

        #[cfg(not(feature = "rayon"))] {
            let _ = (threads, name);
            BlockPool { }
        }
    }

    /// A pool that processes everything on the calling thread.
    pub fn sequential() -> Self {
        Self::new(Threads::Sequential, "")
    }

    /// Whether blocks are processed on worker threads.
    pub fn is_parallel(&self) -> bool {
        #[cfg(feature = "rayon")] { self.pool.is_some() }
        #[cfg(not(feature = "rayon"))] { false }
    }

    /// Apply the function to all items and return the results in input order.
    /// Stops at the first error, in input order.
    pub fn map_ordered<T, R>(&self, items: Vec<T>, function: impl Fn(T) -> Result<R> + Send + Sync + 'static) -> Result<Vec<R>>
        where T: Send + 'static, R: Send + 'static
    {
        #[cfg(feature = "rayon")] {
            if let Some(pool) = &self.pool {
                if items.len() > 1 {
                    return map_parallel(pool, items, function);
                }
            }
        }

        items.into_iter().map(function).collect()
    }
}

#[cfg(feature = "rayon")]
fn map_parallel<T, R>(pool: &rayon_core::ThreadPool, items: Vec<T>, function: impl Fn(T) -> Result<R> + Send + Sync + 'static) -> Result<Vec<R>>
    where T: Send + 'static, R: Send + 'static
{
    use std::collections::BTreeMap;
    use std::sync::Arc;

    let count = items.len();
    let function = Arc::new(function);
    let (sender, receiver) = flume::unbounded();

    for (index, item) in items.into_iter().enumerate() {
        let sender = sender.clone();
        let function = function.clone();

        pool.spawn_fifo(move || {
            // by now, another block could have failed,
            // and the result would not be received anymore
            let _ = sender.send((index, function(item)));
        });
    }

    // the results arrive in any order and are sorted by their index
    let mut results = BTreeMap::new();

    for _ in 0 .. count {
        let (index, result) = receiver.recv()
            .expect("block worker thread panicked");

        results.insert(index, result);
    }

    results.into_values().collect()
}
