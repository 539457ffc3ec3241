//! Command dispatcher runner.
//!
//! Inbound adapters never touch the store directly. They hand a parsed
//! command to a [`DispatcherHandle`], which queues it on a bounded channel
//! together with a one-shot reply sender. A single consumer drains the queue
//! in order, so read-modify-write cycles on the two files never interleave.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::commands::{AdminCommand, CommandHandler, CommandResult};

/// Messages that can be sent to the dispatcher.
#[derive(Debug)]
pub enum DispatchMessage {
    /// Run a command and send the result back.
    Execute {
        command: AdminCommand,
        reply: oneshot::Sender<CommandResult>,
    },
    /// Stop the dispatcher.
    Shutdown,
}

/// Errors returned to command submitters.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Command queue is closed")]
    Closed,

    #[error("Command was dropped before it completed")]
    Dropped,
}

/// Single consumer of the command queue.
pub struct CommandDispatcher {
    handler: Arc<CommandHandler>,
    rx: mpsc::Receiver<DispatchMessage>,
}

/// Cloneable sending side of the command queue.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<DispatchMessage>,
}

impl CommandDispatcher {
    /// Creates a dispatcher with a queue of `capacity` pending commands.
    #[must_use]
    pub fn new(handler: Arc<CommandHandler>, capacity: usize) -> (Self, DispatcherHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { handler, rx }, DispatcherHandle { tx })
    }

    /// Runs the dispatcher loop until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        info!("Command dispatcher started");

        while let Some(msg) = self.rx.recv().await {
            match msg {
                DispatchMessage::Execute { command, reply } => {
                    let result = self.run_command(command).await;
                    if reply.send(result).is_err() {
                        debug!("Submitter went away before the reply was sent");
                    }
                }
                DispatchMessage::Shutdown => {
                    info!("Dispatcher shutting down");
                    break;
                }
            }
        }
    }

    /// Runs one command on the blocking pool, since the store does file I/O.
    async fn run_command(&self, command: AdminCommand) -> CommandResult {
        let handler = Arc::clone(&self.handler);

        match tokio::task::spawn_blocking(move || handler.execute(command)).await {
            Ok(result) => result,
            Err(e) => {
                error!("Command task failed: {}", e);
                CommandResult::error("✗ Internal error while running the command.")
            }
        }
    }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

impl DispatcherHandle {
    /// Queues a command and waits for its result.
    pub async fn submit(&self, command: AdminCommand) -> Result<CommandResult, DispatchError> {
        let (reply, rx) = oneshot::channel();

        self.tx
            .send(DispatchMessage::Execute { command, reply })
            .await
            .map_err(|_| DispatchError::Closed)?;

        rx.await.map_err(|_| DispatchError::Dropped)
    }

    /// Asks the dispatcher to stop after the commands already queued.
    pub async fn shutdown(&self) {
        if self.tx.send(DispatchMessage::Shutdown).await.is_err() {
            debug!("Dispatcher already stopped");
        }
    }

    /// Whether the consumer has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
