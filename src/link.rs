//! Amplifier Link
//!
//! Shared handle between the device driver, the trigger sequencer and any
//! external consumer. Bundles the state cache, the command queue, the
//! connection flag and the state-changed signal.
//!
//! Consumers must re-read [`AmpLink::get_state`] after every notification:
//! several changes before a wait collapse into a single pending signal.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;

use crate::error::CommandError;
use crate::protocol::Packet;
use crate::queue::CommandQueue;
use crate::state::StateCache;
use crate::types::{ControlCommand, DecodedState, FilterName};

/// Shared amplifier link
pub struct AmpLink<M: RawMutex> {
    cache: StateCache<M>,
    queue: CommandQueue<M>,
    connected: AtomicBool,
    epoch: AtomicU32,
    changed: Signal<M, ()>,
}

impl<M: RawMutex> AmpLink<M> {
    /// Create a disconnected link
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cache: StateCache::new(),
            queue: CommandQueue::new(),
            connected: AtomicBool::new(false),
            epoch: AtomicU32::new(0),
            changed: Signal::new(),
        }
    }

    /// Validate and queue a command, waiting for capacity
    ///
    /// # Errors
    ///
    /// Returns the validation error when the value is out of range.
    pub async fn enqueue_command(&self, command: ControlCommand) -> Result<(), CommandError> {
        self.queue.enqueue(command).await
    }

    /// Validate and queue a command without waiting
    ///
    /// # Errors
    ///
    /// Returns the validation error or `CommandError::QueueFull`.
    pub fn try_enqueue_command(&self, command: ControlCommand) -> Result<(), CommandError> {
        self.queue.try_enqueue(command)
    }

    /// Snapshot of the decoded device state
    #[must_use]
    pub fn get_state(&self) -> DecodedState {
        self.cache.decoded()
    }

    /// Snapshot of the filter name
    #[must_use]
    pub fn get_filter_name(&self) -> FilterName {
        self.cache.filter_name()
    }

    /// Check whether an amplifier is open
    #[must_use]
    pub fn is_device_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Number of successful device opens so far
    #[must_use]
    pub fn connection_epoch(&self) -> u32 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Wait for the next state change (or a device close)
    pub async fn wait_state_changed(&self) {
        self.changed.wait().await;
    }

    /// Check for an undelivered state change without consuming it
    #[must_use]
    pub fn state_changed_pending(&self) -> bool {
        self.changed.signaled()
    }

    /// State cache
    #[must_use]
    pub const fn cache(&self) -> &StateCache<M> {
        &self.cache
    }

    /// Command queue
    #[must_use]
    pub const fn queue(&self) -> &CommandQueue<M> {
        &self.queue
    }

    /// Store an inbound status packet, notifying on change
    pub fn ingest_status(&self, packet: &Packet) -> bool {
        let changed = self.cache.update_if_changed(packet);
        if changed {
            debug!("state changed: {:?}", self.cache.decoded());
            self.changed.signal(());
        }
        changed
    }

    /// Store an inbound filter name, notifying on change
    pub fn ingest_filter_name(&self, packet: &Packet) -> bool {
        let changed = self.cache.set_filter_name(packet);
        if changed {
            info!("filter name: {}", self.cache.filter_name().as_str());
            self.changed.signal(());
        }
        changed
    }

    /// Record a successful device open, returning its connection epoch
    pub fn mark_connected(&self) -> u32 {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        self.connected.store(true, Ordering::Release);
        debug!("connection epoch {}", epoch);
        epoch
    }

    /// Record a device close: drop pending commands, clear the cache, notify
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
        self.queue.reset();
        self.cache.clear();
        self.changed.signal(());
    }
}

impl<M: RawMutex> Default for AmpLink<M> {
    fn default() -> Self {
        Self::new()
    }
}
