// SPDX-License-Identifier: CEPL-1.0
//! One-shot background task with cooperative cancellation.
//!
//! The owner polls the task from its event loop. The body receives a
//! [`CancelToken`] and is expected to call [`CancelToken::checkpoint`] between
//! steps; once cancellation is observed the body unwinds through `?` and
//! releases whatever it built so far.

use portable_atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Returns `Err(TaskError::Cancelled)` once cancellation has been requested.
    pub fn checkpoint<E>(&self) -> Result<(), TaskError<E>> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Why a task body stopped without a value.
#[derive(Debug, thiserror::Error)]
pub enum TaskError<E> {
    #[error("task cancelled")]
    Cancelled,
    #[error("task failed: {0}")]
    Failed(E),
}

impl<E> From<E> for TaskError<E> {
    fn from(e: E) -> Self {
        TaskError::Failed(e)
    }
}

pub enum TaskPoll<T, E> {
    Running(InitTask<T, E>),
    Completed(T),
    Failed(E),
    Cancelled,
    /// The body panicked; no value was produced.
    Panicked,
}

type Outcome<T, E> = Result<T, TaskError<E>>;

pub struct InitTask<T, E> {
    name: &'static str,
    token: CancelToken,
    rx: Option<mpsc::Receiver<Outcome<T, E>>>,
    handle: Option<JoinHandle<()>>,
}

impl<T, E> InitTask<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn spawn<F>(name: &'static str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(CancelToken) -> Outcome<T, E> + Send + 'static,
    {
        let token = CancelToken::new();
        let (tx, rx) = mpsc::channel();
        let body_token = token.clone();
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                let _ = tx.send(body(body_token));
            })?;
        debug!(target: "prism::task", task = name, "spawned");
        Ok(Self {
            name,
            token,
            rx: Some(rx),
            handle: Some(handle),
        })
    }
}

impl<T, E> InitTask<T, E> {
    pub fn cancel(&self) {
        debug!(target: "prism::task", task = self.name, "cancel requested");
        self.token.cancel();
    }

    /// Non-blocking. Hands the task back while it is still running.
    pub fn poll(mut self) -> TaskPoll<T, E> {
        let received = match self.rx.as_ref() {
            Some(rx) => rx.try_recv(),
            None => Err(mpsc::TryRecvError::Disconnected),
        };
        match received {
            Ok(outcome) => self.finish(Some(outcome)),
            Err(mpsc::TryRecvError::Empty) => TaskPoll::Running(self),
            Err(mpsc::TryRecvError::Disconnected) => self.finish(None),
        }
    }

    /// Blocks until the body returns.
    pub fn join(mut self) -> TaskPoll<T, E> {
        let outcome = self.rx.as_ref().and_then(|rx| rx.recv().ok());
        self.finish(outcome)
    }

    fn finish(&mut self, outcome: Option<Outcome<T, E>>) -> TaskPoll<T, E> {
        self.rx = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(target: "prism::task", task = self.name, "task thread panicked");
            }
        }
        match outcome {
            Some(Ok(value)) => TaskPoll::Completed(value),
            Some(Err(TaskError::Cancelled)) => TaskPoll::Cancelled,
            Some(Err(TaskError::Failed(e))) => TaskPoll::Failed(e),
            None => TaskPoll::Panicked,
        }
    }
}

impl<T, E> Drop for InitTask<T, E> {
    // The body may still hold handles the owner is about to destroy.
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.token.cancel();
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    fn wait<T, E>(mut task: InitTask<T, E>) -> TaskPoll<T, E> {
        loop {
            match task.poll() {
                TaskPoll::Running(t) => {
                    task = t;
                    thread::sleep(Duration::from_millis(1));
                }
                other => return other,
            }
        }
    }

    #[test]
    fn completed_value_is_returned() {
        let task = InitTask::<u32, String>::spawn("ok", |_| Ok(7)).unwrap();
        assert!(matches!(wait(task), TaskPoll::Completed(7)));
    }

    #[test]
    fn failure_is_returned() {
        let task = InitTask::<u32, String>::spawn("fail", |_| Err("boom".to_owned().into())).unwrap();
        match wait(task) {
            TaskPoll::Failed(e) => assert_eq!(e, "boom"),
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn cancel_is_observed_at_checkpoint() {
        let (go_tx, go_rx) = channel::<()>();
        let (steps_tx, steps_rx) = channel::<u32>();
        let task = InitTask::<u32, String>::spawn("cancel", move |token| {
            steps_tx.send(1).unwrap();
            go_rx.recv().unwrap();
            token.checkpoint()?;
            steps_tx.send(2).unwrap();
            Ok(2)
        })
        .unwrap();

        assert_eq!(steps_rx.recv().unwrap(), 1);
        task.cancel();
        go_tx.send(()).unwrap();

        assert!(matches!(task.join(), TaskPoll::Cancelled));
        assert!(steps_rx.try_recv().is_err());
    }

    #[test]
    fn error_messages() {
        assert_eq!(TaskError::<String>::Cancelled.to_string(), "task cancelled");
        assert_eq!(
            TaskError::Failed("no device".to_owned()).to_string(),
            "task failed: no device"
        );
    }

    #[test]
    fn panicking_body_reports_panicked() {
        let task = InitTask::<u32, String>::spawn("panic", |_| panic!("bad")).unwrap();
        assert!(matches!(task.join(), TaskPoll::Panicked));
    }

    #[test]
    fn drop_cancels_and_joins() {
        let (done_tx, done_rx) = channel::<bool>();
        let task = InitTask::<(), String>::spawn("drop", move |token| {
            while !token.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            done_tx.send(true).unwrap();
            Err(TaskError::Cancelled)
        })
        .unwrap();
        drop(task);
        assert_eq!(done_rx.try_recv(), Ok(true));
    }
}
