use parking_lot::Mutex;
use sluice_core::{Context, Error, Failure, Result, send_value};
use std::{
    any::Any,
    collections::HashMap,
    fmt::{self, Debug},
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Weak},
};
use tokio::{runtime, task::spawn_blocking};

type Job = Box<dyn FnOnce() + Send + 'static>;
type Completion = Box<dyn FnOnce() + Send + 'static>;

/// Serial queue of the dispatcher.
///
/// Operations on the same lane run and complete in submission order, different lanes are
/// independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    /// Session level operations: open, close and transactions.
    Connection(u32),
    Statement(u32, u32),
    /// Runs as soon as a blocking thread is free, without waiting for or delaying other work.
    Detached,
}

/// The host's single threaded completion queue.
///
/// Completion callbacks are never invoked on a background thread, they are queued here and
/// run by whoever drains the context.
#[derive(Clone)]
pub struct DispatchContext {
    tx: flume::Sender<Completion>,
    rx: flume::Receiver<Completion>,
}

impl DispatchContext {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    fn post(&self, completion: Completion) {
        let tx = &self.tx;
        send_value!(tx, completion);
    }

    /// Completions waiting to be run.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Run every completion already queued, returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        while let Ok(completion) = self.rx.try_recv() {
            completion();
            count += 1;
        }
        count
    }

    /// Wait for the next completion and run it.
    pub async fn run_next(&self) -> bool {
        match self.rx.recv_async().await {
            Ok(completion) => {
                completion();
                true
            }
            Err(..) => false,
        }
    }
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for DispatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchContext")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Queue of one lane. A retired queue stays registered until its jobs drain, new work on
/// the same lane joins it again.
struct LaneQueue {
    tx: flume::Sender<Job>,
    queued: usize,
    retired: bool,
}

type Lanes = Mutex<HashMap<Lane, LaneQueue>>;

/// Runs blocking operations on the tokio blocking pool, one lane at a time.
pub struct Dispatcher {
    runtime: runtime::Handle,
    context: DispatchContext,
    lanes: Arc<Lanes>,
}

impl Dispatcher {
    /// Dispatcher bound to the current tokio runtime.
    pub fn new(context: DispatchContext) -> Result<Self> {
        let runtime = runtime::Handle::try_current()
            .context("While creating the dispatcher, it must be created inside a tokio runtime")
            .inspect_err(|e| log::error!("{:#}", e))?;
        Ok(Self::with_runtime(runtime, context))
    }

    pub fn with_runtime(runtime: runtime::Handle, context: DispatchContext) -> Self {
        Self {
            runtime,
            context,
            lanes: Default::default(),
        }
    }

    pub fn context(&self) -> &DispatchContext {
        &self.context
    }

    /// Lanes currently alive, retired lanes still draining are not counted.
    pub fn lanes(&self) -> usize {
        self.lanes.lock().values().filter(|v| !v.retired).count()
    }

    fn enqueue(&self, lane: Lane, job: Job) {
        if lane == Lane::Detached {
            self.runtime.spawn_blocking(job);
            return;
        }
        let mut lanes = self.lanes.lock();
        let queue = lanes.entry(lane).or_insert_with(|| {
            let (tx, rx) = flume::unbounded::<Job>();
            let registry = Arc::downgrade(&self.lanes);
            self.runtime.spawn(async move {
                while let Ok(job) = rx.recv_async().await {
                    if let Err(e) = spawn_blocking(job).await {
                        let error = Error::new(e).context("While running a dispatched job");
                        log::error!("{:#}", error);
                    }
                    job_done(&registry, lane);
                }
                log::trace!("Lane {lane:?} retired");
            });
            LaneQueue {
                tx,
                queued: 0,
                retired: false,
            }
        });
        queue.queued += 1;
        queue.retired = false;
        let tx = &queue.tx;
        send_value!(tx, job);
    }

    /// Run `operation` on a background thread, `on_complete` receives its result on the
    /// dispatch context exactly once.
    pub fn schedule<T, F, C>(&self, lane: Lane, operation: F, on_complete: C)
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
        C: FnOnce(Result<T>) + Send + 'static,
    {
        let context = self.context.clone();
        self.enqueue(
            lane,
            Box::new(move || {
                let result = catch(operation);
                context.post(Box::new(move || on_complete(result)));
            }),
        );
    }

    /// Future form of [`Dispatcher::schedule`], resolved with the result of `operation`.
    pub fn run<T, F>(
        &self,
        lane: Lane,
        operation: F,
    ) -> impl Future<Output = Result<T>> + use<T, F>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = flume::bounded::<Result<T>>(1);
        self.enqueue(
            lane,
            Box::new(move || {
                let result = catch(operation);
                send_value!(tx, result);
            }),
        );
        async move {
            match rx.recv_async().await {
                Ok(result) => result,
                Err(..) => {
                    let error = Error::new(Failure::Unknown(
                        "the dispatched operation was dropped before completing".into(),
                    ));
                    log::error!("{:#}", error);
                    Err(error)
                }
            }
        }
    }

    /// Release `lane` once the operations queued on it have run. Work submitted to the same
    /// lane before that joins the queue again, after them. False when unknown.
    pub fn retire(&self, lane: Lane) -> bool {
        let mut lanes = self.lanes.lock();
        retire_queue(&mut lanes, lane)
    }

    /// Retire every lane of `connection_id`, returns how many were alive.
    pub fn retire_connection(&self, connection_id: u32) -> usize {
        let mut lanes = self.lanes.lock();
        let owned = lanes
            .keys()
            .filter(|lane| match lane {
                Lane::Connection(id) | Lane::Statement(id, _) => *id == connection_id,
                Lane::Detached => false,
            })
            .copied()
            .collect::<Vec<_>>();
        owned
            .into_iter()
            .filter(|lane| retire_queue(&mut lanes, *lane))
            .count()
    }
}

fn retire_queue(lanes: &mut HashMap<Lane, LaneQueue>, lane: Lane) -> bool {
    let Some(queue) = lanes.get_mut(&lane) else {
        return false;
    };
    if queue.retired {
        return false;
    }
    queue.retired = true;
    if queue.queued == 0 {
        lanes.remove(&lane);
    }
    true
}

/// A job of `lane` finished, drop the queue when it was retired and nothing is left.
fn job_done(registry: &Weak<Lanes>, lane: Lane) {
    let Some(lanes) = registry.upgrade() else {
        return;
    };
    let mut lanes = lanes.lock();
    let drained = match lanes.get_mut(&lane) {
        Some(queue) => {
            queue.queued = queue.queued.saturating_sub(1);
            queue.retired && queue.queued == 0
        }
        None => false,
    };
    if drained {
        lanes.remove(&lane);
    }
}

impl Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("lanes", &self.lanes())
            .field("context", &self.context)
            .finish()
    }
}

/// Run `operation`, a panic becomes a [`Failure::Unknown`].
fn catch<T>(operation: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(operation)) {
        Ok(result) => result,
        Err(payload) => {
            let error = Error::new(Failure::Unknown(format!(
                "the operation panicked: {}",
                panic_message(payload.as_ref())
            )));
            log::error!("{:#}", error);
            Err(error)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(v) = payload.downcast_ref::<&str>() {
        *v
    } else if let Some(v) = payload.downcast_ref::<String>() {
        v.as_str()
    } else {
        "unknown panic payload"
    }
}
