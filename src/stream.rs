// stream.rs — Ordered asynchronous work queues.
//
// Each `Stream` owns one worker thread fed by a crossbeam channel. Work runs
// in FIFO order on that thread; different streams run concurrently.
//
//   host thread                         worker thread
//   ───────────                         ─────────────
//   enqueue(job)  ──pending += 1──▶    job()  ──pending -= 1──▶ notify
//   wait_for_completion() ◀──────────── (pending == 0)
//
// ERROR POLICY:
// The first failing job records its error. Jobs dequeued after that are
// skipped without running until `wait_for_completion` hands the error back
// to the caller; the stream is then clean again.
//
// A job that panics is reported as `Error::Stream`; the worker survives.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::{Error, Result};
use crate::mat::Mat;

pub(crate) type Job = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

#[derive(Default)]
struct State {
    pending: usize,
    error: Option<Error>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    idle: Condvar,
}

static NEXT_STREAM_ID: AtomicUsize = AtomicUsize::new(0);

/// An ordered command queue.
///
/// Passing a stream to an `*_async` call (or `Some(&stream)` to a free
/// function) enqueues the work and returns immediately. Results are only
/// valid after [`Stream::wait_for_completion`].
pub struct Stream {
    id: usize,
    device: Device,
    sender: Option<Sender<Job>>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Stream {
    /// A stream on the default device.
    pub fn new() -> Result<Self> {
        Self::on(&Device::default_device())
    }

    /// A stream associated with `device`.
    ///
    /// # Errors
    /// `Error::Stream` if the worker thread cannot be spawned.
    pub fn on(device: &Device) -> Result<Self> {
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = channel::unbounded::<Job>();
        let shared = Arc::new(Shared::default());

        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name(format!("gpu-imgproc-stream-{id}"))
            .spawn(move || worker_loop(receiver, worker_shared))
            .map_err(|e| Error::Stream(format!("failed to spawn stream worker: {e}")))?;

        debug!(stream = id, "stream created");
        Ok(Stream {
            id,
            device: device.clone(),
            sender: Some(sender),
            shared,
            worker: Some(worker),
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Append a job. The job's error is reported by the next wait.
    pub(crate) fn enqueue(&self, job: Job) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::Stream("stream is shutting down".into()))?;
        self.shared.state.lock().pending += 1;
        if sender.send(job).is_err() {
            // Worker is gone; undo the bookkeeping so waits don't hang.
            let mut state = self.shared.state.lock();
            state.pending -= 1;
            if state.pending == 0 {
                self.shared.idle.notify_all();
            }
            return Err(Error::Stream(format!("stream {} worker has stopped", self.id)));
        }
        Ok(())
    }

    /// Block until every job enqueued so far has finished.
    ///
    /// Returns the first error raised by that work. An idle stream returns
    /// `Ok(())` immediately.
    pub fn wait_for_completion(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        while state.pending > 0 {
            self.shared.idle.wait(&mut state);
        }
        match state.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// True when no work is outstanding. Never blocks.
    pub fn query(&self) -> bool {
        self.shared.state.lock().pending == 0
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain the queue and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(stream = self.id, "stream worker panicked");
            }
        }
        if let Some(e) = self.shared.state.lock().error.take() {
            warn!(stream = self.id, error = %e, "stream dropped with an unobserved error");
        }
        debug!(stream = self.id, "stream destroyed");
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("idle", &self.query())
            .finish()
    }
}

fn worker_loop(receiver: Receiver<Job>, shared: Arc<Shared>) {
    for job in receiver.iter() {
        let skip = shared.state.lock().error.is_some();
        let result = if skip {
            drop(job);
            Ok(())
        } else {
            catch_unwind(AssertUnwindSafe(job))
                .unwrap_or_else(|_| Err(Error::Stream("stream job panicked".into())))
        };

        let mut state = shared.state.lock();
        if let Err(e) = result {
            debug!(error = %e, "stream job failed");
            state.error.get_or_insert(e);
        }
        state.pending -= 1;
        if state.pending == 0 {
            shared.idle.notify_all();
        }
    }
}

/// Run `job` inline, or enqueue it when a stream is given.
pub(crate) fn launch<F>(stream: Option<&Stream>, job: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    match stream {
        None => job(),
        Some(s) => s.enqueue(Box::new(job)),
    }
}

// ---------------------------------------------------------------------------
// PendingDownload
// ---------------------------------------------------------------------------

/// A device → host transfer enqueued on a stream.
///
/// The host image only exists once the transfer finished, so it can only be
/// obtained through [`PendingDownload::wait`].
#[must_use = "the downloaded image is only available through wait()"]
pub struct PendingDownload {
    receiver: Receiver<Result<Mat>>,
}

impl PendingDownload {
    pub(crate) fn channel() -> (DownloadSlot, PendingDownload) {
        let (sender, receiver) = channel::bounded(1);
        (DownloadSlot { sender: Some(sender) }, PendingDownload { receiver })
    }

    /// A download that already has its outcome.
    pub(crate) fn resolved(result: Result<Mat>) -> PendingDownload {
        let (slot, pending) = Self::channel();
        slot.complete(result);
        pending
    }

    /// Block until the transfer finished and return the host image.
    pub fn wait(self) -> Result<Mat> {
        self.receiver
            .recv()
            .map_err(|_| Error::Stream("download result was lost".into()))?
    }

    /// True once `wait` would return without blocking.
    pub fn is_ready(&self) -> bool {
        !self.receiver.is_empty()
    }
}

/// Sending half of a `PendingDownload`.
///
/// Dropped without completing (the job was skipped after an earlier failure,
/// or panicked), it resolves the download with an error instead of leaving
/// `wait` hanging. The cause is reported by `wait_for_completion`.
pub(crate) struct DownloadSlot {
    sender: Option<Sender<Result<Mat>>>,
}

impl DownloadSlot {
    pub(crate) fn complete(mut self, result: Result<Mat>) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(result);
        }
    }
}

impl Drop for DownloadSlot {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Err(Error::Stream("download job did not complete on the stream".into())));
        }
    }
}
