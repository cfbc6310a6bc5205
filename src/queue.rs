//! Command Queue
//!
//! Bounded FIFO of validated commands between the producers (trigger
//! sequencer, presentation layer) and the device driver. Commands are
//! validated on the way in, so the queue only ever holds [`Command`]s.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;

use crate::config::COMMAND_QUEUE_DEPTH;
use crate::error::CommandError;
use crate::types::{Command, ControlCommand};

/// Multi-producer, single-consumer command queue
pub struct CommandQueue<M: RawMutex> {
    channel: Channel<M, Command, COMMAND_QUEUE_DEPTH>,
}

impl<M: RawMutex> CommandQueue<M> {
    /// Create an empty queue
    #[must_use]
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Validate and append a command, waiting for free capacity
    ///
    /// # Errors
    ///
    /// Returns the validation error; the command is not queued.
    pub async fn enqueue(&self, command: ControlCommand) -> Result<(), CommandError> {
        let validated = Self::validate(command)?;
        self.channel.send(validated).await;
        debug!("queued {:?}", validated);
        Ok(())
    }

    /// Validate and append a command without waiting
    ///
    /// # Errors
    ///
    /// Returns the validation error, or `CommandError::QueueFull`.
    pub fn try_enqueue(&self, command: ControlCommand) -> Result<(), CommandError> {
        let validated = Self::validate(command)?;
        self.channel.try_send(validated).map_err(|_| {
            warn!("queue full, dropped {:?}", validated);
            CommandError::QueueFull
        })?;
        debug!("queued {:?}", validated);
        Ok(())
    }

    fn validate(command: ControlCommand) -> Result<Command, CommandError> {
        command.validate().inspect_err(|e| {
            warn!("rejected {} {}: {:?}", command.action.name(), command.value, e);
        })
    }

    /// Wait for the next command
    pub async fn dequeue(&self) -> Command {
        self.channel.receive().await
    }

    /// Take the next command if one is pending
    pub fn try_dequeue(&self) -> Option<Command> {
        self.channel.try_receive().ok()
    }

    /// Discard all pending commands
    pub fn reset(&self) {
        let dropped = self.channel.len();
        self.channel.clear();
        if dropped > 0 {
            info!("discarded {} pending commands", dropped);
        }
    }

    /// Number of pending commands
    #[must_use]
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    /// Check for pending commands
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

impl<M: RawMutex> Default for CommandQueue<M> {
    fn default() -> Self {
        Self::new()
    }
}
