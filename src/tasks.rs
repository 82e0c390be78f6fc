// src/tasks.rs
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinSet;
use tracing::warn;

/// Registry for fire-and-forget work (cache writes and backfills).
///
/// Spawned tasks outlive the request that started them. They are aborted
/// only when the last handle is dropped, so the process keeps one handle for
/// its whole lifetime and calls [`BackgroundTasks::wait_idle`] before exit.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.lock();
        while let Some(finished) = set.try_join_next() {
            if let Err(e) = finished {
                warn!("Background task failed: {}", e);
            }
        }
        set.spawn(future);
    }

    /// Number of tasks not yet reaped.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until every outstanding task, including tasks spawned while
    /// waiting, has settled.
    pub async fn wait_idle(&self) {
        loop {
            let mut set = std::mem::take(&mut *self.lock());
            if set.is_empty() {
                return;
            }
            while let Some(finished) = set.join_next().await {
                if let Err(e) = finished {
                    warn!("Background task failed: {}", e);
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for BackgroundTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTasks")
            .field("pending", &self.len())
            .finish()
    }
}
