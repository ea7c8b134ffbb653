use std::future::Future;

use tokio_util::task::TaskTracker;
use tracing::{debug_span, trace, warn, Instrument};

use super::error::Result;

/// Runs follow-up work after a write has committed, detached from the request
/// that caused it. A failing task is logged and dropped; nothing is reported
/// back to the caller.
#[derive(Clone, Default)]
pub struct PostCommit {
    tracker: TaskTracker,
}

impl PostCommit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let span = debug_span!("post_commit", task = name);
        self.tracker.spawn(
            async move {
                match task.await {
                    Ok(()) => trace!("done"),
                    Err(error) => warn!(%error, "post-commit task failed"),
                }
            }
            .instrument(span),
        );
    }

    /// Waits until no task is running, including tasks dispatched by other
    /// tasks while waiting.
    pub async fn idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Number of tasks still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::social::error::Error;

    #[tokio::test]
    async fn idle_waits_for_nested_tasks() {
        let tasks = PostCommit::new();
        let done = Arc::new(AtomicUsize::new(0));

        let (inner_tasks, inner_done) = (tasks.clone(), done.clone());
        tasks.dispatch("outer", async move {
            tokio::task::yield_now().await;
            let done = inner_done.clone();
            inner_tasks.dispatch("inner", async move {
                tokio::task::yield_now().await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            inner_done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        tasks.idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn failures_stay_inside_the_task() {
        let tasks = PostCommit::new();
        tasks.dispatch("failing", async { Err(Error::Internal("boom".into())) });
        tasks.idle().await;

        // still usable afterwards
        let ran = Arc::new(AtomicUsize::new(0));
        let flag = ran.clone();
        tasks.dispatch("after", async move {
            flag.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        tasks.idle().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
