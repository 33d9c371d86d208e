use crate::error::QueueError;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

type Settle<T, E> = oneshot::Sender<Result<T, QueueError<E>>>;

/// A type-erased task plus the channel that settles its handle.
pub(crate) trait Job: Send {
    /// Future that runs the task body and settles the handle with its result.
    fn run(self: Box<Self>) -> BoxFuture;

    /// Settle the handle as cancelled without running the body.
    fn cancel(self: Box<Self>);
}

pub(crate) struct TaskJob<F, T, E> {
    task: F,
    tx: Settle<T, E>,
}

impl<F, T, E> TaskJob<F, T, E> {
    pub(crate) fn new(task: F) -> (Self, TaskHandle<T, E>) {
        let (tx, rx) = oneshot::channel();
        (Self { task, tx }, TaskHandle { rx })
    }
}

impl<F, Fut, T, E> Job for TaskJob<F, T, E>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    fn run(self: Box<Self>) -> BoxFuture {
        let TaskJob { task, tx } = *self;
        Box::pin(async move {
            let result = task().await.map_err(QueueError::Task);
            // The caller may have dropped its handle; nothing to report then.
            let _ = tx.send(result);
        })
    }

    fn cancel(self: Box<Self>) {
        let _ = self.tx.send(Err(QueueError::Cancelled));
    }
}

/// Resolves with the task's result once the queue has settled it.
///
/// Dropping the handle does not cancel the task.
#[must_use = "the handle is the only way to observe the task's result"]
pub struct TaskHandle<T, E> {
    rx: oneshot::Receiver<Result<T, QueueError<E>>>,
}

impl<T, E> TaskHandle<T, E> {
    /// A handle that is already settled with `err`.
    pub(crate) fn rejected(err: QueueError<E>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self { rx }
    }
}

impl<T, E> Future for TaskHandle<T, E> {
    type Output = Result<T, QueueError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|settled| settled.unwrap_or(Err(QueueError::Closed)))
    }
}
