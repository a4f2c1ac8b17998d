//! Per-connection command intake
//!
//! Network tasks push decoded commands through a [`CommandSender`]; the tick
//! loop owns the matching [`IntakeQueue`] and drains it once per tick. The
//! backing channel is an unbounded MPSC queue, so producers never block and
//! the consumer observes a single arrival order for all of them.

use log::debug;
use shared::Command;
use tokio::sync::mpsc;

/// A decoded command together with the time the network layer received it
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedCommand {
    pub command: Command,
    /// Receive time in milliseconds, stamped by the producer
    pub received_at: u64,
}

/// Producer half handed to network tasks
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<QueuedCommand>,
}

impl CommandSender {
    /// Queues a command for the owner's next tick
    ///
    /// Never blocks. Returns false only once the owner has logged out, in
    /// which case the command is discarded.
    pub fn enqueue(&self, command: Command, received_at: u64) -> bool {
        match self.tx.send(QueuedCommand {
            command,
            received_at,
        }) {
            Ok(()) => true,
            Err(rejected) => {
                debug!(
                    "Discarding opcode {} for a closed intake queue",
                    rejected.0.command.opcode()
                );
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by the player on the scheduler side
#[derive(Debug)]
pub struct IntakeQueue {
    tx: mpsc::UnboundedSender<QueuedCommand>,
    rx: mpsc::UnboundedReceiver<QueuedCommand>,
}

impl IntakeQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Returns a new producer handle for this queue
    pub fn sender(&self) -> CommandSender {
        CommandSender {
            tx: self.tx.clone(),
        }
    }

    /// Removes every command queued at the moment of the call, in arrival order
    ///
    /// Commands pushed while the drain is running stay queued for the next
    /// call, so nothing is executed twice or lost between ticks.
    pub fn drain_all(&mut self) -> Vec<QueuedCommand> {
        let pending = self.rx.len();
        let mut drained = Vec::with_capacity(pending);

        while drained.len() < pending {
            match self.rx.try_recv() {
                Ok(queued) => drained.push(queued),
                Err(_) => break,
            }
        }

        drained
    }

    /// Discards all queued commands without executing them
    ///
    /// Returns how many commands were dropped.
    pub fn clear(&mut self) -> usize {
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }

    /// Stops accepting new commands; later enqueues are rejected
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for IntakeQueue {
    fn default() -> Self {
        Self::new()
    }
}
