// src/arbiter/handle.rs
//! Runs an arbiter on its own task and talks to it through commands

use super::{Arbiter, ArbiterState, LocationListener};
use crate::error::{LocationError, Result};
use crate::provider::Message;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::debug;

enum Command {
    Start,
    Stop(oneshot::Sender<()>),
    RegisterListener(Box<dyn LocationListener>, oneshot::Sender<bool>),
    UnregisterListener,
    State(oneshot::Sender<ArbiterState>),
    Shutdown(oneshot::Sender<()>),
}

enum Next {
    Command(Option<Command>),
    Message(Message),
}

/// Handle to an arbiter running as a tokio task.
///
/// Commands and provider events are handled one at a time on that task, so
/// the arbiter is never touched concurrently.
pub struct ArbiterHandle {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl ArbiterHandle {
    /// Moves `arbiter` onto a new task. Must be called inside a tokio runtime.
    pub fn spawn(arbiter: Arbiter) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(arbiter, command_rx));
        Self { commands, task }
    }

    pub fn start(&self) -> Result<()> {
        self.send(Command::Start)
    }

    /// Returns once both providers are unsubscribed and the failover timer
    /// is cancelled.
    pub async fn stop(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Stop(tx))?;
        rx.await.map_err(|_| closed())
    }

    pub async fn register_listener<L>(&self, listener: L) -> Result<bool>
    where
        L: LocationListener + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.send(Command::RegisterListener(Box::new(listener), tx))?;
        rx.await.map_err(|_| closed())
    }

    pub fn unregister_listener(&self) -> Result<()> {
        self.send(Command::UnregisterListener)
    }

    pub async fn state(&self) -> Result<ArbiterState> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::State(tx))?;
        rx.await.map_err(|_| closed())
    }

    /// Stops the arbiter and ends its task.
    pub async fn shutdown(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx))?;
        rx.await.map_err(|_| closed())?;
        self.task
            .await
            .map_err(|e| LocationError::Other(format!("arbiter task failed: {}", e)))
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| closed())
    }
}

fn closed() -> LocationError {
    LocationError::Other("arbiter task has stopped".to_string())
}

async fn run(mut arbiter: Arbiter, mut commands: mpsc::UnboundedReceiver<Command>) {
    loop {
        let next = tokio::select! {
            // commands first so a stop is never overtaken by queued fixes
            biased;
            command = commands.recv() => Next::Command(command),
            message = arbiter.next_message() => Next::Message(message),
        };

        match next {
            Next::Message(message) => arbiter.handle(message),
            Next::Command(Some(Command::Start)) => arbiter.start(),
            Next::Command(Some(Command::Stop(ack))) => {
                arbiter.stop();
                let _ = ack.send(());
            }
            Next::Command(Some(Command::RegisterListener(listener, ack))) => {
                let _ = ack.send(arbiter.register_boxed_listener(listener));
            }
            Next::Command(Some(Command::UnregisterListener)) => arbiter.unregister_listener(),
            Next::Command(Some(Command::State(reply))) => {
                let _ = reply.send(arbiter.state());
            }
            Next::Command(Some(Command::Shutdown(ack))) => {
                arbiter.stop();
                let _ = ack.send(());
                break;
            }
            Next::Command(None) => {
                debug!("all arbiter handles dropped");
                arbiter.stop();
                break;
            }
        }
    }
}
