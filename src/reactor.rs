//! The worker-pool reactor (design §4.6): a small typed-actor queue per task
//! kind, N workers apiece sharing one execute closure, wired together by
//! [`QueueControllerCollection`] with the document-queue producer coupling
//! and shutdown ordering the design calls for.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use log::debug;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::errors::CoreError;
use crate::types::NodeId;
use crate::url::ResourceUrl;

/// A hand-rolled cancellation context (no `tokio-util` in the teacher's
/// dependency set): an `AtomicBool` flag plus a `Notify` so `.cancelled()`
/// can be awaited instead of polled.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

pub type ExecuteFn<T> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<(), CoreError>> + Send + Sync>;

/// A bounded mpsc channel plus N workers that compete for its single
/// receiver (wrapped in an async mutex so only one worker holds it at a
/// time). `Stop` drops the sender half so `recv` returns `None` once every
/// in-flight task has drained, rather than the workers polling a flag.
pub struct Queue<T: Send + 'static> {
    sender: Mutex<Option<mpsc::Sender<T>>>,
    receiver: Arc<AsyncMutex<mpsc::Receiver<T>>>,
    workers: AsyncMutex<Vec<JoinHandle<()>>>,
    errors: Mutex<Vec<String>>,
    processed: AtomicUsize,
    cancel: CancelToken,
    fail_fast: bool,
}

impl<T: Send + 'static> Queue<T> {
    pub fn new(capacity: usize, cancel: CancelToken, fail_fast: bool) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Arc::new(Self {
            sender: Mutex::new(Some(tx)),
            receiver: Arc::new(AsyncMutex::new(rx)),
            workers: AsyncMutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            processed: AtomicUsize::new(0),
            cancel,
            fail_fast,
        })
    }

    /// `AddTask`: blocks (applying back-pressure) until the channel has
    /// room, or returns `Cancelled` if the queue has already been stopped.
    pub async fn add_task(&self, task: T) -> Result<(), CoreError> {
        let sender = self.sender.lock().expect("queue sender mutex poisoned").clone();
        match sender {
            Some(s) => s.send(task).await.map_err(|_| CoreError::Cancelled),
            None => Err(CoreError::Cancelled),
        }
    }

    /// `Start`: spawns `worker_count` tasks, each looping on the shared
    /// receiver until the channel closes or cancellation is observed.
    pub async fn start(self: &Arc<Self>, worker_count: usize, execute: ExecuteFn<T>) {
        let mut workers = self.workers.lock().await;
        for _ in 0..worker_count.max(1) {
            let queue = Arc::clone(self);
            let execute = Arc::clone(&execute);
            workers.push(tokio::spawn(async move {
                queue.worker_loop(execute).await;
            }));
        }
    }

    async fn worker_loop(self: Arc<Self>, execute: ExecuteFn<T>) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            let task = {
                let mut rx = self.receiver.lock().await;
                rx.recv().await
            };
            let Some(task) = task else {
                return;
            };

            if self.cancel.is_cancelled() {
                continue;
            }

            let result = execute(task).await;
            self.processed.fetch_add(1, Ordering::SeqCst);
            if let Err(err) = result {
                self.record_error(err);
            }
        }
    }

    /// A `Cancelled` error reaching here means the task was abandoned after
    /// fail-fast cancellation kicked in elsewhere; it's demoted to a debug
    /// log rather than counted as a run failure.
    fn record_error(&self, err: CoreError) {
        if err.is_cancelled() {
            debug!("task abandoned after cancellation: {err}");
            return;
        }
        if self.fail_fast {
            self.cancel.cancel();
        }
        self.errors
            .lock()
            .expect("queue error list mutex poisoned")
            .push(err.to_string());
    }

    /// `Stop`: closes the queue to new tasks by dropping the sender. Safe to
    /// call once all producers are done enqueueing onto this queue.
    pub fn stop(&self) {
        self.sender.lock().expect("queue sender mutex poisoned").take();
    }

    /// `Wait`: joins every worker, returning once all in-flight tasks have
    /// finished executing (or been abandoned by cancellation).
    pub async fn wait(&self) {
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
    }

    pub fn get_error_list(&self) -> Vec<String> {
        self.errors.lock().expect("queue error list mutex poisoned").clone()
    }

    pub fn processed_count(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }
}

pub struct DocumentTask {
    pub node: NodeId,
}

pub struct DownloadTask {
    pub url: ResourceUrl,
    pub destination: PathBuf,
}

pub struct ValidateTask {
    pub url: String,
    pub source_node: NodeId,
}

pub struct GitInfoTask {
    pub node: NodeId,
}

/// Fans a single shared [`CancelToken`] out across the four queues the
/// document worker drives (design §4.6): downloads and link validations and
/// git-info lookups are all produced *by* documents as they're rendered, so
/// those three queues must be accepting tasks before the document queue
/// starts, and must only be stopped after the document queue has fully
/// drained (otherwise a document worker's `add_task` could land on a closed
/// channel).
pub struct QueueControllerCollection {
    pub document: Arc<Queue<DocumentTask>>,
    pub download: Arc<Queue<DownloadTask>>,
    pub validate: Arc<Queue<ValidateTask>>,
    pub gitinfo: Arc<Queue<GitInfoTask>>,
    pub cancel: CancelToken,
}

impl QueueControllerCollection {
    pub fn new(config: &Config) -> Self {
        let cancel = CancelToken::new();
        let backpressure = |workers: usize| workers.max(1) * 2;
        Self {
            document: Queue::new(backpressure(config.document_workers), cancel.clone(), config.fail_fast),
            download: Queue::new(backpressure(config.download_workers), cancel.clone(), config.fail_fast),
            validate: Queue::new(backpressure(config.validation_workers), cancel.clone(), config.fail_fast),
            gitinfo: Queue::new(backpressure(config.document_workers), cancel.clone(), config.fail_fast),
            cancel,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn start(
        &self,
        config: &Config,
        document_exec: ExecuteFn<DocumentTask>,
        download_exec: ExecuteFn<DownloadTask>,
        validate_exec: ExecuteFn<ValidateTask>,
        gitinfo_exec: ExecuteFn<GitInfoTask>,
    ) {
        self.download.start(config.download_workers, download_exec).await;
        self.validate.start(config.validation_workers, validate_exec).await;
        self.gitinfo.start(config.document_workers, gitinfo_exec).await;
        self.document.start(config.document_workers, document_exec).await;
    }

    /// Stops and drains the document queue first (the sole producer into
    /// the other three), then stops and drains download/validate/gitinfo,
    /// returning the aggregated non-cancelled error list from all four.
    pub async fn stop_and_wait(&self) -> Vec<String> {
        self.document.stop();
        self.document.wait().await;

        self.download.stop();
        self.validate.stop();
        self.gitinfo.stop();
        self.download.wait().await;
        self.validate.wait().await;
        self.gitinfo.wait().await;

        let mut errors = self.document.get_error_list();
        errors.extend(self.download.get_error_list());
        errors.extend(self.validate.get_error_list());
        errors.extend(self.gitinfo.get_error_list());
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    #[tokio::test]
    async fn queue_runs_tasks_and_collects_errors() {
        let cancel = CancelToken::new();
        let queue: Arc<Queue<u32>> = Queue::new(4, cancel, false);
        let counter = Arc::new(StdAtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let execute: ExecuteFn<u32> = Arc::new(move |n: u32| -> BoxFuture<'static, Result<(), CoreError>> {
            let counter = Arc::clone(&counter_clone);
            Box::pin(async move {
                if n == 0 {
                    return Err(CoreError::NotFound("zero".to_string()));
                }
                counter.fetch_add(n as usize, Ordering::SeqCst);
                Ok(())
            })
        });

        queue.start(2, execute).await;
        for n in [1, 2, 3, 0] {
            queue.add_task(n).await.unwrap();
        }
        queue.stop();
        queue.wait().await;

        assert_eq!(counter.load(Ordering::SeqCst), 6);
        assert_eq!(queue.processed_count(), 4);
        assert_eq!(queue.get_error_list().len(), 1);
    }

    #[tokio::test]
    async fn cancel_token_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }
}
