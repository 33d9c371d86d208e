use crate::config_validator::ConfigValidator;
use crate::error::QueueError;
use crate::queue::config::QueueConfig;
use crate::queue::job::{Job, TaskHandle, TaskJob};
use std::collections::{HashMap, HashSet, VecDeque};
use std::convert::Infallible;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Task,
    /// Runs concurrently with the contiguous points queued after it
    Point,
}

struct QueueEntry {
    id: Option<String>,
    kind: EntryKind,
    delay: Option<Duration>,
    job: Box<dyn Job>,
}

enum Batch {
    Single(QueueEntry),
    Group(Vec<QueueEntry>),
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<QueueEntry>,
    running: bool,
    /// Ids whose next dequeued entry is rejected instead of run
    blacklist: HashSet<String>,
    /// Wakes the delay of the entry with this id early
    pending_delays: HashMap<String, oneshot::Sender<()>>,
}

struct Inner {
    config: QueueConfig,
    state: Mutex<QueueState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume a blacklist mark for `id`, if there is one.
    fn take_blacklisted(&self, id: Option<&str>) -> bool {
        id.is_some_and(|id| self.lock().blacklist.remove(id))
    }

    async fn run_single(&self, entry: QueueEntry) {
        let QueueEntry { id, delay, job, .. } = entry;

        if self.take_blacklisted(id.as_deref()) {
            debug!(id = ?id, "Rejecting cancelled task");
            job.cancel();
            return;
        }

        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            self.wait_delay(id.as_deref(), delay).await;

            if self.take_blacklisted(id.as_deref()) {
                debug!(id = ?id, "Rejecting task cancelled during its delay");
                job.cancel();
                return;
            }
        }

        debug!(id = ?id, "Running task");
        if let Err(err) = tokio::spawn(job.run()).await {
            warn!(id = ?id, error = %err, "Task aborted before settling");
        }
    }

    async fn wait_delay(&self, id: Option<&str>, delay: Duration) {
        let Some(id) = id else {
            tokio::time::sleep(delay).await;
            return;
        };

        let (tx, rx) = oneshot::channel();
        self.lock().pending_delays.insert(id.to_string(), tx);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = rx => debug!(id = %id, "Delay interrupted"),
        }

        self.lock().pending_delays.remove(id);
    }

    async fn run_group(&self, entries: Vec<QueueEntry>) {
        debug!(size = entries.len(), "Running point group");

        let mut group = JoinSet::new();
        for entry in entries {
            if self.take_blacklisted(entry.id.as_deref()) {
                entry.job.cancel();
                continue;
            }
            group.spawn(entry.job.run());
        }

        while let Some(joined) = group.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "Point task aborted before settling");
            }
        }
    }
}

async fn drain(inner: Arc<Inner>) {
    loop {
        let batch = {
            let mut state = inner.lock();
            match state.entries.pop_front() {
                None => {
                    state.running = false;
                    return;
                }
                Some(head) if head.kind == EntryKind::Point => {
                    let mut group = vec![head];
                    while state
                        .entries
                        .front()
                        .is_some_and(|next| next.kind == EntryKind::Point)
                    {
                        group.extend(state.entries.pop_front());
                    }
                    Batch::Group(group)
                }
                Some(head) => Batch::Single(head),
            }
        };

        match batch {
            Batch::Single(entry) => inner.run_single(entry).await,
            Batch::Group(entries) => inner.run_group(entries).await,
        }
    }
}

/// Runs submitted async tasks one at a time, in submission order.
///
/// Contiguous runs of point entries form a group whose members run concurrently;
/// the group as a whole is still serial with respect to everything else.
/// Cloning yields another handle to the same queue. Submitting requires a tokio
/// runtime.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                config: QueueConfig::default(),
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    pub fn with_config(config: QueueConfig) -> Result<Self, QueueError<Infallible>> {
        ConfigValidator::validate_queue(&config).map_err(QueueError::BadArgument)?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(QueueState::default()),
            }),
        })
    }

    /// Append an ordinary task.
    ///
    /// `delay` elapses after the entry reaches the head of the queue and before
    /// the task is invoked.
    pub fn enqueue<F, Fut, T, E>(&self, task: F, delay: Option<Duration>, id: Option<&str>) -> TaskHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.push(EntryKind::Task, task, delay, id)
    }

    /// Append a fan-out point. When the queue is idle the task starts at once
    /// without being queued.
    pub fn enqueue_point<F, Fut, T, E>(&self, task: F, id: Option<&str>) -> TaskHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let idle = {
            let state = self.inner.lock();
            !state.running && state.entries.is_empty()
        };
        if !idle {
            return self.push(EntryKind::Point, task, None, id);
        }

        if let Err(err) = id.map_or(Ok(()), ConfigValidator::validate_task_id) {
            return TaskHandle::rejected(QueueError::BadArgument(err));
        }
        debug!(id = ?id, "Queue idle, running point task immediately");
        let (job, handle) = TaskJob::new(task);
        tokio::spawn(Box::new(job).run());
        handle
    }

    fn push<F, Fut, T, E>(&self, kind: EntryKind, task: F, delay: Option<Duration>, id: Option<&str>) -> TaskHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        if let Err(err) = id.map_or(Ok(()), ConfigValidator::validate_task_id) {
            return TaskHandle::rejected(QueueError::BadArgument(err));
        }

        let mut state = self.inner.lock();
        if let Some(limit) = self.inner.config.max_pending {
            if state.entries.len() >= limit {
                warn!(limit, id = ?id, "Queue full, rejecting task");
                return TaskHandle::rejected(QueueError::Full { limit });
            }
        }

        let (job, handle) = TaskJob::new(task);
        state.entries.push_back(QueueEntry {
            id: id.map(str::to_string),
            kind,
            delay,
            job: Box::new(job),
        });
        debug!(id = ?id, kind = ?kind, pending = state.entries.len(), "Task enqueued");

        if !state.running {
            state.running = true;
            tokio::spawn(drain(self.inner.clone()));
        }
        handle
    }

    /// Best-effort cancellation of the entry with `id`.
    ///
    /// Interrupts a pending delay and removes and rejects the first queued entry
    /// with `id`. The id is always blacklisted as well, so the next entry with
    /// this id that is dequeued (or is finishing its delay) is rejected instead
    /// of run. A task body that already started is never interrupted.
    /// Returns whether a delay was interrupted or an entry removed.
    pub fn cancel_task(&self, id: &str) -> bool {
        let (interrupted, removed) = {
            let mut state = self.inner.lock();

            let interrupted = match state.pending_delays.remove(id) {
                Some(wake) => {
                    let _ = wake.send(());
                    true
                }
                None => false,
            };

            let removed = state
                .entries
                .iter()
                .position(|entry| entry.id.as_deref() == Some(id))
                .and_then(|index| state.entries.remove(index));

            state.blacklist.insert(id.to_string());
            (interrupted, removed)
        };

        let applied = interrupted || removed.is_some();
        if let Some(entry) = removed {
            entry.job.cancel();
        }
        debug!(id = %id, interrupted, applied, "Cancel requested");
        applied
    }

    pub fn get_index_by_id(&self, id: &str) -> Option<usize> {
        self.inner
            .lock()
            .entries
            .iter()
            .position(|entry| entry.id.as_deref() == Some(id))
    }

    /// Ids of queued entries in queue order; entries without an id show as `None`.
    pub fn get_queued_ids(&self) -> Vec<Option<String>> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|entry| entry.id.clone())
            .collect()
    }

    /// Move the queued entry at `from` to `to`. Out-of-range indices do nothing.
    pub fn reorder_queue(&self, from: usize, to: usize) -> bool {
        let mut state = self.inner.lock();
        let len = state.entries.len();
        if from >= len || to >= len {
            return false;
        }
        if let Some(entry) = state.entries.remove(from) {
            state.entries.insert(to, entry);
        }
        true
    }

    /// True while an entry or a point group is being processed.
    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    /// Number of queued entries that have not started.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Ids whose delay is currently elapsing.
    pub fn pending_delays(&self) -> Vec<String> {
        self.inner.lock().pending_delays.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CANCELLED_MESSAGE;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::{sleep, Instant};

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(log: &Log, event: impl Into<String>) {
        log.lock().unwrap().push(event.into());
    }

    fn events(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_run_in_order() {
        let queue = TaskQueue::new();
        let log: Log = Arc::default();

        let mut handles = Vec::new();
        for (name, work) in [("a", 30), ("b", 10), ("c", 20)] {
            let log = log.clone();
            handles.push(queue.enqueue(
                move || async move {
                    record(&log, format!("start {}", name));
                    sleep(Duration::from_millis(work)).await;
                    record(&log, format!("end {}", name));
                    Ok::<_, String>(name)
                },
                None,
                Some(name),
            ));
        }

        for (handle, name) in handles.into_iter().zip(["a", "b", "c"]) {
            assert_eq!(handle.await, Ok(name));
        }
        assert_eq!(
            events(&log),
            vec!["start a", "end a", "start b", "end b", "start c", "end c"]
        );
        assert!(!queue.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_starts_after_previous_settles() {
        let queue = TaskQueue::new();
        let a_done: Arc<Mutex<Option<Instant>>> = Arc::default();
        let b_start: Arc<Mutex<Option<Instant>>> = Arc::default();

        let done = a_done.clone();
        let a = queue.enqueue(
            move || async move {
                sleep(Duration::from_millis(5)).await;
                *done.lock().unwrap() = Some(Instant::now());
                Ok::<_, ()>(())
            },
            Some(Duration::ZERO),
            Some("a"),
        );
        let start = b_start.clone();
        let b = queue.enqueue(
            move || async move {
                *start.lock().unwrap() = Some(Instant::now());
                Ok::<_, ()>(())
            },
            Some(Duration::from_millis(50)),
            Some("b"),
        );
        let c = queue.enqueue(|| async { Ok::<_, ()>(()) }, None, Some("c"));

        assert!(a.await.is_ok());
        assert!(b.await.is_ok());
        assert!(c.await.is_ok());

        let a_done = a_done.lock().unwrap().unwrap();
        let b_start = b_start.lock().unwrap().unwrap();
        assert!(b_start.duration_since(a_done) >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_delay() {
        let queue = TaskQueue::new();
        let ran = Arc::new(AtomicBool::new(false));

        let flag = ran.clone();
        let handle = queue.enqueue(
            move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, String>(())
            },
            Some(Duration::from_millis(200)),
            Some("a"),
        );

        sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.pending_delays(), vec!["a".to_string()]);
        assert!(queue.cancel_task("a"));

        let err = handle.await.unwrap_err();
        assert_eq!(err.to_string(), CANCELLED_MESSAGE);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_queued_entry() {
        let queue = TaskQueue::new();
        let ran = Arc::new(AtomicBool::new(false));

        let first = queue.enqueue(
            || async {
                sleep(Duration::from_millis(100)).await;
                Ok::<_, String>(1)
            },
            None,
            Some("first"),
        );
        let flag = ran.clone();
        let second = queue.enqueue(
            move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, String>(2)
            },
            None,
            Some("second"),
        );

        sleep(Duration::from_millis(1)).await;
        assert_eq!(queue.get_index_by_id("second"), Some(0));
        assert!(queue.cancel_task("second"));
        assert_eq!(queue.get_index_by_id("second"), None);

        assert_eq!(second.await, Err(QueueError::Cancelled));
        assert_eq!(first.await, Ok(1));
        assert!(!ran.load(Ordering::SeqCst));

        // The blacklist mark outlives the removal and rejects the next entry once.
        let blocked = queue.enqueue(|| async { Ok::<_, String>(3) }, None, Some("second"));
        assert_eq!(blocked.await, Err(QueueError::Cancelled));
        let again = queue.enqueue(|| async { Ok::<_, String>(4) }, None, Some("second"));
        assert_eq!(again.await, Ok(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_rejects_every_queued_entry_sharing_the_id() {
        let queue = TaskQueue::new();
        let ran = Arc::new(AtomicBool::new(false));

        let gate = queue.enqueue(
            || async {
                sleep(Duration::from_millis(50)).await;
                Ok::<_, String>(0)
            },
            None,
            Some("gate"),
        );
        let first = queue.enqueue(|| async { Ok::<_, String>(1) }, None, Some("x"));
        let flag = ran.clone();
        let second = queue.enqueue(
            move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, String>(2)
            },
            None,
            Some("x"),
        );

        sleep(Duration::from_millis(1)).await;
        assert!(queue.cancel_task("x"));

        assert_eq!(first.await, Err(QueueError::Cancelled));
        assert_eq!(second.await, Err(QueueError::Cancelled));
        assert_eq!(gate.await, Ok(0));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_unknown_id_blacklists_next_entry() {
        let queue = TaskQueue::new();
        assert!(!queue.cancel_task("later"));

        let handle = queue.enqueue(|| async { Ok::<_, String>(()) }, None, Some("later"));
        assert_eq!(handle.await, Err(QueueError::Cancelled));

        let handle = queue.enqueue(|| async { Ok::<_, String>(()) }, None, Some("later"));
        assert_eq!(handle.await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_stop_queue() {
        let queue = TaskQueue::new();
        let failed = queue.enqueue(|| async { Err::<(), _>("boom") }, None, None);
        let next = queue.enqueue(|| async { Ok::<_, &str>("next") }, None, None);

        assert_eq!(failed.await, Err(QueueError::Task("boom")));
        assert_eq!(next.await, Ok("next"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_task_closes_only_its_handle() {
        let queue = TaskQueue::new();
        let panicking = queue.enqueue(
            || async {
                if true {
                    panic!("task panicked");
                }
                Ok::<(), String>(())
            },
            None,
            None,
        );
        let next = queue.enqueue(|| async { Ok::<_, String>(5) }, None, None);

        assert_eq!(panicking.await, Err(QueueError::Closed));
        assert_eq!(next.await, Ok(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_points_run_concurrently_before_later_tasks() {
        let queue = TaskQueue::new();
        let log: Log = Arc::default();

        let blocker_log = log.clone();
        let blocker = queue.enqueue(
            move || async move {
                sleep(Duration::from_millis(10)).await;
                record(&blocker_log, "blocker done");
                Ok::<_, ()>(())
            },
            None,
            None,
        );

        let mut points = Vec::new();
        for name in ["p1", "p2", "p3"] {
            let log = log.clone();
            points.push(queue.enqueue_point(
                move || async move {
                    record(&log, format!("start {}", name));
                    sleep(Duration::from_millis(20)).await;
                    record(&log, format!("end {}", name));
                    Ok::<_, ()>(())
                },
                Some(name),
            ));
        }

        let tail_log = log.clone();
        let tail = queue.enqueue(
            move || async move {
                record(&tail_log, "tail");
                Ok::<_, ()>(())
            },
            None,
            None,
        );

        assert!(blocker.await.is_ok());
        for point in points {
            assert!(point.await.is_ok());
        }
        assert!(tail.await.is_ok());

        let events = events(&log);
        assert_eq!(events[0], "blocker done");
        let starts: Vec<usize> = ["start p1", "start p2", "start p3"]
            .iter()
            .map(|e| events.iter().position(|x| x == e).unwrap())
            .collect();
        let first_end = events.iter().position(|x| x.starts_with("end ")).unwrap();
        assert!(starts.iter().all(|&s| s < first_end));
        assert_eq!(events.last().map(String::as_str), Some("tail"));
    }

    #[tokio::test]
    async fn test_point_on_idle_queue_runs_immediately() {
        let queue = TaskQueue::new();
        let handle = queue.enqueue_point(|| async { Ok::<_, ()>("now") }, None);
        assert!(!queue.is_running());
        assert_eq!(handle.await, Ok("now"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inspection_and_reorder() {
        let queue = TaskQueue::new();
        let log: Log = Arc::default();

        let gate = queue.enqueue(
            || async {
                sleep(Duration::from_millis(10)).await;
                Ok::<_, ()>(())
            },
            None,
            Some("gate"),
        );
        let mut handles = Vec::new();
        for name in ["x", "y", "z"] {
            let log = log.clone();
            handles.push(queue.enqueue(
                move || async move {
                    record(&log, name);
                    Ok::<_, ()>(())
                },
                None,
                Some(name),
            ));
        }
        let anonymous = queue.enqueue(|| async { Ok::<_, ()>(()) }, None, None);

        // Let the gate task leave the queue and start running.
        sleep(Duration::from_millis(1)).await;
        assert!(queue.is_running());
        assert_eq!(
            queue.get_queued_ids(),
            vec![Some("x".into()), Some("y".into()), Some("z".into()), None]
        );
        assert!(queue.reorder_queue(2, 0));
        assert!(!queue.reorder_queue(0, 9));
        assert_eq!(queue.get_index_by_id("z"), Some(0));
        assert_eq!(queue.len(), 4);

        assert!(gate.await.is_ok());
        for handle in handles {
            assert!(handle.await.is_ok());
        }
        assert!(anonymous.await.is_ok());
        assert_eq!(events(&log), vec!["z", "x", "y"]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_bad_arguments() {
        let queue = TaskQueue::new();
        let handle = queue.enqueue(|| async { Ok::<_, ()>(()) }, None, Some(""));
        assert!(matches!(handle.await, Err(QueueError::BadArgument(_))));

        assert!(TaskQueue::with_config(QueueConfig::bounded(0)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_queue_rejects_when_full() {
        let queue = TaskQueue::with_config(QueueConfig::bounded(1)).unwrap();
        let running = queue.enqueue(
            || async {
                sleep(Duration::from_millis(10)).await;
                Ok::<_, ()>(())
            },
            None,
            None,
        );
        // The first entry leaves the queue once it starts running.
        sleep(Duration::from_millis(1)).await;

        let queued = queue.enqueue(|| async { Ok::<_, ()>(()) }, None, None);
        let rejected = queue.enqueue(|| async { Ok::<_, ()>(()) }, None, None);

        assert_eq!(rejected.await, Err(QueueError::Full { limit: 1 }));
        assert!(running.await.is_ok());
        assert!(queued.await.is_ok());
    }
}
