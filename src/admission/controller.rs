//! Admission controller — per-category concurrency ceilings, single-flight
//! keys, FIFO queueing, and cooperative cancellation.
//!
//! The controller owns admission bookkeeping only. It never interprets the
//! outcome of submitted work: success and failure pass through untouched,
//! and the only error it raises on its own behalf is cancellation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::{oneshot, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::admission::{CategoryStatus, OperationCategory};
use crate::config::ConcurrencyLimits;
use crate::error::{AdmissionError, Result};

/// Type-erased unit of queued work. Runs the caller's closure and delivers
/// the typed result through a channel captured inside the box.
type ErasedJob = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, ()> + Send>;

/// A queued operation, waiting for a slot.
struct QueuedOperation {
    id: Uuid,
    key: String,
    run: ErasedJob,
    cancel: CancellationToken,
    enqueued_at: DateTime<Utc>,
}

/// An operation currently holding a slot, keyed by resource key.
struct ActiveOperation {
    id: Uuid,
    cancel: CancellationToken,
    /// Dropped when the record is removed, waking same-key waiters.
    done_tx: watch::Sender<()>,
}

#[derive(Default)]
struct CategoryState {
    active: HashMap<String, ActiveOperation>,
    queue: VecDeque<QueuedOperation>,
}

/// Outcome of one pass through the admission decision.
enum Decision {
    /// A slot was claimed; run the job.
    Run {
        id: Uuid,
        token: CancellationToken,
        job: ErasedJob,
    },
    /// Same key already in flight; wait for it to settle, then re-admit.
    Wait {
        done: watch::Receiver<()>,
        job: ErasedJob,
    },
    /// Ceiling reached; the job was enqueued.
    Queued,
}

/// Bounds concurrent work per category and deduplicates concurrent work on
/// the same resource key.
///
/// One instance per process, passed by reference (`Clone` is shallow —
/// clones share bookkeeping). Tests construct isolated instances with their
/// own limits.
#[derive(Clone)]
pub struct AdmissionController {
    limits: ConcurrencyLimits,
    state: Arc<Mutex<HashMap<OperationCategory, CategoryState>>>,
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(ConcurrencyLimits::default())
    }
}

impl AdmissionController {
    /// Create a controller with the given per-category ceilings.
    pub fn new(limits: ConcurrencyLimits) -> Self {
        Self {
            limits,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Submit work for admission.
    ///
    /// - If an operation for `(category, key)` is already in flight, this
    ///   call waits for it to settle (ignoring its outcome, success or
    ///   failure) and then goes through admission again as a fresh
    ///   execution. Callers never share a result object — this is
    ///   wait-then-retry coalescing, not shared-result fan-out.
    /// - Otherwise, if the category has a free slot, the work starts
    ///   immediately.
    /// - Otherwise it is queued FIFO and starts when a later drain reaches
    ///   it.
    ///
    /// The work receives a [`CancellationToken`] scoped to this execution
    /// attempt. Cancellation is cooperative: the token is signalled and the
    /// work is expected to observe it and unwind voluntarily.
    pub async fn submit<T, F, Fut>(
        &self,
        category: OperationCategory,
        key: &str,
        work: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<T>>();

        let result_category = category;
        let result_key = key.to_string();
        let mut job: ErasedJob = Box::new(move |token: CancellationToken| {
            Box::pin(async move {
                let result = work(token.clone()).await;
                let result = if token.is_cancelled() {
                    Err(AdmissionError::Cancelled {
                        category: result_category,
                        key: result_key,
                    }
                    .into())
                } else {
                    result
                };
                let _ = tx.send(result);
            })
        });

        loop {
            let decision = {
                let mut state = self.state.lock().await;
                let cat = state.entry(category).or_default();

                if let Some(active) = cat.active.get(key) {
                    Decision::Wait {
                        done: active.done_tx.subscribe(),
                        job,
                    }
                } else if cat.active.len() < self.limits.ceiling(category) {
                    let id = Uuid::new_v4();
                    let token = CancellationToken::new();
                    let (done_tx, _) = watch::channel(());
                    cat.active.insert(
                        key.to_string(),
                        ActiveOperation {
                            id,
                            cancel: token.clone(),
                            done_tx,
                        },
                    );
                    Decision::Run { id, token, job }
                } else {
                    let record = QueuedOperation {
                        id: Uuid::new_v4(),
                        key: key.to_string(),
                        run: job,
                        cancel: CancellationToken::new(),
                        enqueued_at: Utc::now(),
                    };
                    debug!(
                        %category,
                        key,
                        queue_len = cat.queue.len() + 1,
                        "ceiling reached, operation queued"
                    );
                    cat.queue.push_back(record);
                    Decision::Queued
                }
            };

            match decision {
                Decision::Wait { mut done, job: j } => {
                    debug!(%category, key, "key in flight, waiting before resubmitting");
                    let _ = done.changed().await;
                    job = j;
                }
                Decision::Run { id, token, job } => {
                    self.spawn_job(category, key.to_string(), id, token, job);
                    break;
                }
                Decision::Queued => break,
            }
        }

        match rx.await {
            Ok(result) => result,
            // Sender dropped without running: the queued record was spliced
            // out by cancel()/cancel_all().
            Err(_) => Err(AdmissionError::Cancelled {
                category,
                key: key.to_string(),
            }
            .into()),
        }
    }

    /// Cancel the operation for `(category, key)`.
    ///
    /// Active: signals the cancellation token and detaches the record
    /// immediately so the slot is free — the running work is expected to
    /// observe the token and unwind on its own. Queued: splices the record
    /// out and rejects the submitter with a cancellation error; the work
    /// never runs. Returns whether anything was cancelled.
    pub async fn cancel(&self, category: OperationCategory, key: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(cat) = state.get_mut(&category) else {
            return false;
        };

        if let Some(active) = cat.active.remove(key) {
            active.cancel.cancel();
            info!(%category, key, "cancelled active operation, slot detached");
            // Dropping the record drops its done sender, waking key waiters.
            drop(active);
            self.drain(category, cat);
            return true;
        }

        if let Some(pos) = cat.queue.iter().position(|q| q.key == key) {
            if let Some(record) = cat.queue.remove(pos) {
                record.cancel.cancel();
                info!(%category, key, "cancelled queued operation before it ran");
            }
            return true;
        }

        false
    }

    /// Cancel every active and queued operation in a category.
    pub async fn cancel_all(&self, category: OperationCategory) {
        let mut state = self.state.lock().await;
        let Some(cat) = state.get_mut(&category) else {
            return;
        };

        let active = cat.active.len();
        let queued = cat.queue.len();
        for (_, record) in cat.active.drain() {
            record.cancel.cancel();
        }
        for record in cat.queue.drain(..) {
            record.cancel.cancel();
        }
        if active + queued > 0 {
            info!(%category, active, queued, "cancelled all operations in category");
        }
    }

    /// Number of operations currently executing in a category.
    pub async fn active_count(&self, category: OperationCategory) -> usize {
        let state = self.state.lock().await;
        state.get(&category).map_or(0, |cat| cat.active.len())
    }

    /// Number of operations queued in a category.
    pub async fn queue_length(&self, category: OperationCategory) -> usize {
        let state = self.state.lock().await;
        state.get(&category).map_or(0, |cat| cat.queue.len())
    }

    /// Whether an operation for `(category, key)` is currently executing.
    pub async fn is_running(&self, category: OperationCategory, key: &str) -> bool {
        let state = self.state.lock().await;
        state
            .get(&category)
            .is_some_and(|cat| cat.active.contains_key(key))
    }

    /// Per-category `{active, queued}` snapshot, covering every category.
    pub async fn status(&self) -> HashMap<OperationCategory, CategoryStatus> {
        let state = self.state.lock().await;
        OperationCategory::ALL
            .iter()
            .map(|&category| {
                let status = state
                    .get(&category)
                    .map(|cat| CategoryStatus {
                        active: cat.active.len(),
                        queued: cat.queue.len(),
                    })
                    .unwrap_or_default();
                (category, status)
            })
            .collect()
    }

    /// Run a job in a background task and settle bookkeeping afterwards.
    fn spawn_job(
        &self,
        category: OperationCategory,
        key: String,
        id: Uuid,
        token: CancellationToken,
        job: ErasedJob,
    ) {
        let controller = self.clone();
        tokio::spawn(async move {
            job(token).await;
            controller.finish(category, &key, id).await;
        });
    }

    /// Remove the active record for a completed execution and drain.
    ///
    /// Matched by id: if `cancel()` already detached the record (and a new
    /// record for the same key may have taken its place), there is nothing
    /// left to settle here.
    async fn finish(&self, category: OperationCategory, key: &str, id: Uuid) {
        let mut state = self.state.lock().await;
        let Some(cat) = state.get_mut(&category) else {
            return;
        };

        let owns_record = matches!(cat.active.get(key), Some(active) if active.id == id);
        if !owns_record {
            return;
        }
        cat.active.remove(key);

        self.drain(category, cat);
    }

    /// Start queued operations until the ceiling is reached.
    ///
    /// Pops front-to-back; an item whose key collides with a freshly active
    /// record is requeued at the tail (best-effort fairness, not a hard
    /// ordering guarantee). Each queue item is considered at most once per
    /// drain.
    fn drain(&self, category: OperationCategory, cat: &mut CategoryState) {
        let ceiling = self.limits.ceiling(category);
        let mut passes = cat.queue.len();

        while cat.active.len() < ceiling && passes > 0 {
            passes -= 1;
            let Some(record) = cat.queue.pop_front() else {
                break;
            };

            if cat.active.contains_key(&record.key) {
                cat.queue.push_back(record);
                continue;
            }

            let waited_ms = (Utc::now() - record.enqueued_at).num_milliseconds();
            debug!(%category, key = %record.key, waited_ms, "starting queued operation");

            let (done_tx, _) = watch::channel(());
            cat.active.insert(
                record.key.clone(),
                ActiveOperation {
                    id: record.id,
                    cancel: record.cancel.clone(),
                    done_tx,
                },
            );
            self.spawn_job(category, record.key, record.id, record.cancel, record.run);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::error::Error;

    fn limits(query: usize) -> ConcurrencyLimits {
        ConcurrencyLimits {
            query,
            indexing: 3,
            summarization: 2,
        }
    }

    /// Tracks how many executions overlap, and the high-water mark.
    #[derive(Default)]
    struct Overlap {
        current: AtomicUsize,
        max: AtomicUsize,
    }

    impl Overlap {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn runs_immediately_under_ceiling() {
        let controller = AdmissionController::default();
        let result = controller
            .submit(OperationCategory::Query, "doc-1", |_token| async { Ok(42) })
            .await
            .unwrap();
        assert_eq!(result, 42);

        // Bookkeeping settles after the result is delivered.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(controller.active_count(OperationCategory::Query).await, 0);
    }

    #[tokio::test]
    async fn ceiling_never_exceeded() {
        let controller = AdmissionController::new(limits(2));
        let overlap = Arc::new(Overlap::default());

        let mut handles = Vec::new();
        for i in 0..6 {
            let controller = controller.clone();
            let overlap = overlap.clone();
            handles.push(tokio::spawn(async move {
                controller
                    .submit(OperationCategory::Query, &format!("doc-{i}"), {
                        let overlap = overlap.clone();
                        move |_token| async move {
                            overlap.enter();
                            tokio::time::sleep(Duration::from_millis(30)).await;
                            overlap.exit();
                            Ok(())
                        }
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(overlap.max.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn same_key_never_runs_concurrently() {
        let controller = AdmissionController::default();
        let overlap = Arc::new(Overlap::default());
        let executions = Arc::new(AtomicUsize::new(0));

        let submit = |controller: AdmissionController,
                      overlap: Arc<Overlap>,
                      executions: Arc<AtomicUsize>| async move {
            controller
                .submit(OperationCategory::Summarization, "doc-1", move |_token| {
                    async move {
                        overlap.enter();
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        overlap.exit();
                        Ok(())
                    }
                })
                .await
        };

        let (a, b) = tokio::join!(
            submit(controller.clone(), overlap.clone(), executions.clone()),
            submit(controller.clone(), overlap.clone(), executions.clone()),
        );
        a.unwrap();
        b.unwrap();

        // Wait-then-retry: the second submission re-executes after the
        // first settles, never alongside it.
        assert_eq!(executions.load(Ordering::SeqCst), 2);
        assert_eq!(overlap.max.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn queued_operation_runs_after_slot_frees() {
        let controller = AdmissionController::new(limits(1));
        let order = Arc::new(Mutex::new(Vec::new()));

        let submit = |controller: AdmissionController,
                      order: Arc<Mutex<Vec<&'static str>>>,
                      key: &'static str| async move {
            controller
                .submit(OperationCategory::Query, key, move |_token| async move {
                    order.lock().await.push(key);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(())
                })
                .await
        };

        let first = tokio::spawn(submit(controller.clone(), order.clone(), "doc-a"));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(controller.is_running(OperationCategory::Query, "doc-a").await);

        let second = tokio::spawn(submit(controller.clone(), order.clone(), "doc-b"));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(controller.queue_length(OperationCategory::Query).await, 1);

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(*order.lock().await, vec!["doc-a", "doc-b"]);
    }

    #[tokio::test]
    async fn cancelling_queued_rejects_without_running() {
        let controller = AdmissionController::new(limits(1));
        let ran = Arc::new(AtomicUsize::new(0));

        let blocker = {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .submit(OperationCategory::Query, "doc-a", |_token| async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let queued = {
            let controller = controller.clone();
            let ran = ran.clone();
            tokio::spawn(async move {
                controller
                    .submit(OperationCategory::Query, "doc-b", move |_token| async move {
                        ran.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(controller.queue_length(OperationCategory::Query).await, 1);

        assert!(controller.cancel(OperationCategory::Query, "doc-b").await);

        let result = queued.await.unwrap();
        assert!(matches!(
            result,
            Err(Error::Admission(AdmissionError::Cancelled { .. }))
        ));
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        blocker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancelling_active_frees_slot_and_promotes_next() {
        let controller = AdmissionController::new(limits(1));

        let cancelled = {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .submit(OperationCategory::Query, "doc-a", |token| async move {
                        // Cooperative: poll the token and unwind when asked.
                        for _ in 0..100 {
                            if token.is_cancelled() {
                                break;
                            }
                            tokio::time::sleep(Duration::from_millis(5)).await;
                        }
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let queued = {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .submit(OperationCategory::Query, "doc-b", |_token| async { Ok(7) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(controller.queue_length(OperationCategory::Query).await, 1);

        assert!(controller.cancel(OperationCategory::Query, "doc-a").await);

        // The queued operation gets the freed slot.
        assert_eq!(queued.await.unwrap().unwrap(), 7);

        // The cancelled caller sees a cancellation error once its work
        // observes the token and returns.
        let result = cancelled.await.unwrap();
        assert!(matches!(
            result,
            Err(Error::Admission(AdmissionError::Cancelled { .. }))
        ));
    }

    #[tokio::test]
    async fn cancel_unknown_key_returns_false() {
        let controller = AdmissionController::default();
        assert!(!controller.cancel(OperationCategory::Indexing, "nope").await);
    }

    #[tokio::test]
    async fn cancel_all_clears_active_and_queued() {
        let controller = AdmissionController::new(limits(1));

        let active = {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .submit(OperationCategory::Query, "doc-a", |token| async move {
                        token.cancelled().await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let queued = {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .submit(OperationCategory::Query, "doc-b", |_token| async { Ok(()) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        controller.cancel_all(OperationCategory::Query).await;

        assert!(matches!(
            active.await.unwrap(),
            Err(Error::Admission(AdmissionError::Cancelled { .. }))
        ));
        assert!(matches!(
            queued.await.unwrap(),
            Err(Error::Admission(AdmissionError::Cancelled { .. }))
        ));
        assert_eq!(controller.active_count(OperationCategory::Query).await, 0);
        assert_eq!(controller.queue_length(OperationCategory::Query).await, 0);
    }

    #[tokio::test]
    async fn status_covers_all_categories() {
        let controller = AdmissionController::default();
        let status = controller.status().await;
        assert_eq!(status.len(), 3);
        for category in OperationCategory::ALL {
            assert_eq!(status[&category], CategoryStatus::default());
        }
    }

    #[tokio::test]
    async fn colliding_drained_key_requeued_at_tail() {
        let controller = AdmissionController::new(limits(2));
        let starts = Arc::new(Mutex::new(Vec::new()));
        let (release_x, hold_x) = oneshot::channel::<()>();
        let (release_y, hold_y) = oneshot::channel::<()>();

        // Fill both slots with held work.
        let x = {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .submit(OperationCategory::Query, "x", move |_token| async move {
                        let _ = hold_x.await;
                        Ok(())
                    })
                    .await
            })
        };
        let y = {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .submit(OperationCategory::Query, "y", move |_token| async move {
                        let _ = hold_y.await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Queue a1, a2 (same key), b — none of these keys is active, so all
        // three sit in the FIFO queue.
        let submit = |key: &'static str, label: &'static str, hold_ms: u64| {
            let controller = controller.clone();
            let starts = starts.clone();
            tokio::spawn(async move {
                controller
                    .submit(OperationCategory::Query, key, move |_token| async move {
                        starts.lock().await.push(label);
                        tokio::time::sleep(Duration::from_millis(hold_ms)).await;
                        Ok(())
                    })
                    .await
            })
        };
        let a1 = submit("a", "a1", 100);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let a2 = submit("a", "a2", 10);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let b = submit("b", "b", 10);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(controller.queue_length(OperationCategory::Query).await, 3);

        // First slot frees: drain starts a1 and stops at the ceiling.
        release_x.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Second slot frees while a1 still runs: the drain pops a2, which
        // now collides with a1, requeues it at the tail, and starts b.
        release_y.send(()).unwrap();

        x.await.unwrap().unwrap();
        y.await.unwrap().unwrap();
        a1.await.unwrap().unwrap();
        a2.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let starts = starts.lock().await;
        let pos = |label| starts.iter().position(|s| *s == label).unwrap();
        assert!(pos("b") > pos("a1"));
        assert!(pos("a2") > pos("b"), "colliding item should run after b: {starts:?}");
    }
}
