use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// Quiet period after the last push (or pop) before an idle flush fires.
pub const DEFAULT_QUEUE_TTL: Duration = Duration::from_millis(4000);

type IdleCallback = Arc<dyn Fn() + Send + Sync>;

/// Records and the idle task together behind the single mutex, so a pop and
/// its timer restart are one critical section.
struct QueueState<T> {
    records: Vec<T>,
    idle_task: Option<JoinHandle<()>>,
    /// Bumped on every reschedule. A woken task whose generation is stale
    /// lost the race to a newer push or pop and must not fire.
    generation: u64,
}

/// Append-only buffer with a debounced idle flush.
///
/// Every `push*`, `pop_all` and `init` cancels the outstanding idle task and
/// schedules a new one `ttl` from now. When that task fires with records
/// still buffered it calls `on_idle`; with nothing buffered it does nothing
/// and is not rescheduled. The callback is expected to `pop_all` and deliver.
///
/// The buffer is unbounded. A burst that never pauses for `ttl` grows it
/// until a forced pop.
///
/// Uses `std::sync::Mutex` (not tokio) because the lock is never held across
/// `.await` or across `on_idle`.
pub struct EventQueue<T> {
    state: Arc<Mutex<QueueState<T>>>,
    ttl: Duration,
    on_idle: IdleCallback,
}

impl<T: Send + 'static> EventQueue<T> {
    pub fn new<F>(ttl: Duration, on_idle: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                records: Vec::new(),
                idle_task: None,
                generation: 0,
            })),
            ttl,
            on_idle: Arc::new(on_idle),
        }
    }

    pub fn push(&self, record: T) {
        let mut guard = self.state.lock().unwrap();
        guard.records.push(record);
        self.reschedule(&mut guard);
    }

    /// Append `records` in order. Restarts the idle window once, even for an
    /// empty batch.
    pub fn push_all<I>(&self, records: I)
    where
        I: IntoIterator<Item = T>,
    {
        let mut guard = self.state.lock().unwrap();
        guard.records.extend(records);
        self.reschedule(&mut guard);
    }

    /// Take every buffered record, leaving the queue empty, and start a fresh
    /// idle window.
    pub fn pop_all(&self) -> Vec<T> {
        let mut guard = self.state.lock().unwrap();
        let records = std::mem::take(&mut guard.records);
        self.reschedule(&mut guard);
        records
    }

    /// (Re)start the idle window without touching the buffer.
    pub fn init(&self) {
        let mut guard = self.state.lock().unwrap();
        self.reschedule(&mut guard);
    }

    pub fn reset(&self) {
        self.init();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().records.is_empty()
    }

    /// Whether an idle task is currently scheduled.
    pub fn has_idle_task(&self) -> bool {
        self.state.lock().unwrap().idle_task.is_some()
    }

    /// Cancel the outstanding idle task and spawn its replacement, with the
    /// lock already held.
    fn reschedule(&self, state: &mut QueueState<T>) {
        if let Some(handle) = state.idle_task.take() {
            handle.abort();
        }
        state.generation = state.generation.wrapping_add(1);

        let generation = state.generation;
        let deadline = Instant::now() + self.ttl;
        let weak = Arc::downgrade(&self.state);
        let on_idle = Arc::clone(&self.on_idle);

        state.idle_task = Some(tokio::spawn(async move {
            time::sleep_until(deadline).await;
            if fire(&weak, generation) {
                on_idle();
            }
        }));
    }
}

impl<T: Clone + Send + 'static> EventQueue<T> {
    /// Snapshot of the buffer. Diagnostics only: delivery goes through `pop_all`.
    pub fn peek_all(&self) -> Vec<T> {
        self.state.lock().unwrap().records.clone()
    }
}

/// Retire the idle task for `generation`. Returns `true` when it is still
/// current and there is something to flush.
fn fire<T>(state: &Weak<Mutex<QueueState<T>>>, generation: u64) -> bool {
    let Some(state) = state.upgrade() else {
        return false;
    };
    let mut guard = state.lock().unwrap();
    if guard.generation != generation {
        return false;
    }
    guard.idle_task = None;
    !guard.records.is_empty()
}

impl<T> Drop for EventQueue<T> {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.state.lock()
            && let Some(handle) = guard.idle_task.take()
        {
            handle.abort();
        }
    }
}
