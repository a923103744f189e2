// src/arbiter/timer.rs
//! Single-flight failover timer

use crate::{
    error::{LocationError, Result},
    provider::Message,
};
use std::time::Duration;
use tokio::{runtime::Handle, sync::mpsc::UnboundedSender, task::JoinHandle};

/// Fires one scheduled failover back into the arbiter's queue.
#[derive(Debug, Clone)]
pub struct TimerSink {
    tx: UnboundedSender<Message>,
    ticket: u64,
}

impl TimerSink {
    pub(crate) fn new(tx: UnboundedSender<Message>, ticket: u64) -> Self {
        Self { tx, ticket }
    }

    /// Returns false once the arbiter is gone.
    pub fn fire(self) -> bool {
        self.tx.send(Message::FailoverElapsed { ticket: self.ticket }).is_ok()
    }
}

/// Schedules the delayed failover callback. The arbiter keeps at most one
/// outstanding schedule and calls `cancel` before it could schedule again.
pub trait FailoverTimer: Send {
    fn schedule(&mut self, delay: Duration, sink: TimerSink) -> Result<()>;
    fn cancel(&mut self);
}

/// Failover timer backed by a sleeping tokio task.
#[derive(Debug)]
pub struct TokioTimer {
    runtime: Handle,
    task: Option<JoinHandle<()>>,
}

impl TokioTimer {
    /// Binds the timer to the current tokio runtime. Fails outside one.
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| LocationError::Other(format!("failover timer needs a tokio runtime: {}", e)))?;
        Ok(Self::with_runtime(runtime))
    }

    pub fn with_runtime(runtime: Handle) -> Self {
        Self { runtime, task: None }
    }
}

impl FailoverTimer for TokioTimer {
    fn schedule(&mut self, delay: Duration, sink: TimerSink) -> Result<()> {
        self.cancel();
        self.task = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            sink.fire();
        }));
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = TokioTimer::new().unwrap();
        timer.schedule(Duration::from_millis(5000), TimerSink::new(tx, 3)).unwrap();

        tokio::time::sleep(Duration::from_millis(4999)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(matches!(rx.try_recv(), Ok(Message::FailoverElapsed { ticket: 3 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = TokioTimer::new().unwrap();
        timer.schedule(Duration::from_millis(100), TimerSink::new(tx, 1)).unwrap();
        timer.cancel();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_new_without_runtime_fails() {
        assert!(TokioTimer::new().is_err());
    }

    #[test]
    fn test_runtime_handle_outlives_entered_context() {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
        let mut timer = TokioTimer::with_runtime(runtime.handle().clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        // scheduled from a plain thread, driven once the runtime runs
        timer.schedule(Duration::from_millis(10), TimerSink::new(tx, 4)).unwrap();
        let message = runtime.block_on(rx.recv());
        assert!(matches!(message, Some(Message::FailoverElapsed { ticket: 4 })));
    }
}
