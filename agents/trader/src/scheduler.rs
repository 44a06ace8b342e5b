use std::{any::Any, future::Future, panic::AssertUnwindSafe, time::Duration};

use derive_new::new;
use futures_util::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// How one scheduled task ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotOutcome<T> {
    Finished(T),
    /// Cancelled after exceeding the task timeout.
    TimedOut,
    Panicked(String),
}

/// Runs one task per item with at most `max_concurrency` tasks in flight.
///
/// A slot is refilled from the backlog as soon as its task ends, so the pool
/// stays full until the backlog is drained. Every task is cancelled once it
/// exceeds `task_timeout`.
#[derive(Clone, Debug, new)]
pub struct WorkerPool {
    max_concurrency: usize,
    task_timeout: Duration,
}

impl WorkerPool {
    /// Runs `make_task(index, item)` for every item and returns the outcomes
    /// ordered by item index. Completes only once every task has ended.
    pub async fn run_round<I, F, Fut, T>(
        &self,
        items: I,
        mut make_task: F,
    ) -> Vec<(usize, SlotOutcome<T>)>
    where
        I: IntoIterator,
        F: FnMut(usize, I::Item) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let limit = self.max_concurrency.max(1);
        let mut backlog = items.into_iter().enumerate();
        let mut running = JoinSet::new();
        let mut outcomes = Vec::new();

        loop {
            while running.len() < limit {
                let Some((index, item)) = backlog.next() else {
                    break;
                };
                let task = make_task(index, item);
                let timeout = self.task_timeout;
                debug!(index, active = running.len() + 1, "Starting task");
                running.spawn(async move {
                    let outcome =
                        match tokio::time::timeout(timeout, AssertUnwindSafe(task).catch_unwind())
                            .await
                        {
                            Ok(Ok(value)) => SlotOutcome::Finished(value),
                            Ok(Err(panic)) => SlotOutcome::Panicked(panic_message(panic)),
                            Err(_) => SlotOutcome::TimedOut,
                        };
                    (index, outcome)
                });
            }

            match running.join_next().await {
                Some(Ok((index, outcome))) => {
                    match &outcome {
                        SlotOutcome::TimedOut => {
                            warn!(index, timeout = ?self.task_timeout, "Task timed out and was cancelled")
                        }
                        SlotOutcome::Panicked(message) => {
                            error!(index, %message, "Task panicked")
                        }
                        SlotOutcome::Finished(_) => debug!(index, "Task finished"),
                    }
                    outcomes.push((index, outcome));
                }
                // panics are caught inside the task and nothing aborts the set
                Some(Err(err)) => error!(?err, "Failed to join task"),
                None => break,
            }
        }

        outcomes.sort_by_key(|(index, _)| *index);
        outcomes
    }
}

pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use tokio::time::{sleep, Instant};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_concurrency_bound() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(3, Duration::from_secs(60));

        let outcomes = pool
            .run_round(0..10u64, |_, item| {
                let active = active.clone();
                let peak = peak.clone();
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(100 * (item % 4 + 1))).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    item * 2
                }
            })
            .await;

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(active.load(Ordering::SeqCst), 0);
        let expected = (0..10u64)
            .map(|i| (i as usize, SlotOutcome::Finished(i * 2)))
            .collect::<Vec<_>>();
        assert_eq!(outcomes, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn refills_slots_immediately() {
        let pool = WorkerPool::new(2, Duration::from_secs(60));
        let started = Instant::now();

        // a long task keeps one slot busy while short tasks cycle through the other
        let outcomes = pool
            .run_round([10u64, 1, 1, 1, 1], |_, secs| async move {
                sleep(Duration::from_secs(secs)).await;
            })
            .await;

        assert_eq!(outcomes.len(), 5);
        assert_eq!(Instant::now() - started, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_task_is_cancelled_and_its_slot_reclaimed() {
        let pool = WorkerPool::new(1, Duration::from_secs(20 * 60));
        let started = Instant::now();

        let outcomes = pool
            .run_round([30 * 60u64, 1], |_, secs| async move {
                sleep(Duration::from_secs(secs)).await;
                secs
            })
            .await;

        assert_eq!(
            outcomes,
            vec![(0, SlotOutcome::TimedOut), (1, SlotOutcome::Finished(1))]
        );
        assert_eq!(Instant::now() - started, Duration::from_secs(20 * 60 + 1));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_task_does_not_affect_siblings() {
        let pool = WorkerPool::new(2, Duration::from_secs(60));

        let outcomes = pool
            .run_round([false, true, false], |_, explode| async move {
                if explode {
                    panic!("boom");
                }
                "ok"
            })
            .await;

        assert_eq!(
            outcomes,
            vec![
                (0, SlotOutcome::Finished("ok")),
                (1, SlotOutcome::Panicked("boom".to_owned())),
                (2, SlotOutcome::Finished("ok")),
            ]
        );
    }

    #[tokio::test]
    async fn empty_backlog_completes_immediately() {
        let pool = WorkerPool::new(4, Duration::from_secs(1));
        let outcomes = pool
            .run_round(Vec::<u8>::new(), |_, _| async {})
            .await;
        assert!(outcomes.is_empty());
    }
}
