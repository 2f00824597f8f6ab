use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

use super::{Task, TaskProcessor};

/// Runs tasks on rayon: the global pool, or a dedicated one so tile
/// decoding does not compete with the host's own parallel work.
#[derive(Debug, Clone, Default)]
pub struct RayonTaskProcessor {
    pool: Option<Arc<ThreadPool>>,
}

impl RayonTaskProcessor {
    /// Use rayon's global pool.
    pub fn global() -> Self {
        Self { pool: None }
    }

    /// Build a dedicated pool with `threads` workers.
    pub fn with_threads(threads: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("tile-loader-{i}"))
            .build()?;
        Ok(Self {
            pool: Some(Arc::new(pool)),
        })
    }

    pub(crate) fn spawn(&self, task: impl FnOnce() + Send + 'static) {
        match &self.pool {
            Some(pool) => pool.spawn(task),
            None => rayon::spawn(task),
        }
    }
}

impl TaskProcessor for RayonTaskProcessor {
    fn start_task(&self, task: Task) {
        self.spawn(task);
    }
}

/// Runs each task inline on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateTaskProcessor;

impl TaskProcessor for ImmediateTaskProcessor {
    fn start_task(&self, task: Task) {
        task();
    }
}
