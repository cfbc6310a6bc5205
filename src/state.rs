//! State Cache
//!
//! Last status packet and filter name reported by the amplifier.
//! Each field sits behind its own blocking mutex so readers never see a
//! partially written packet.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::protocol::{self, Packet};
use crate::types::{DecodedState, FilterName};

/// Cached device state
pub struct StateCache<M: RawMutex> {
    status: Mutex<M, RefCell<Packet>>,
    filter_name: Mutex<M, RefCell<FilterName>>,
}

impl<M: RawMutex> StateCache<M> {
    /// Create an empty cache
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: Mutex::new(RefCell::new(Packet::zeroed())),
            filter_name: Mutex::new(RefCell::new(FilterName::new())),
        }
    }

    /// Store a status packet if it differs from the cached one
    ///
    /// Returns `true` when the packet was replaced.
    pub fn update_if_changed(&self, packet: &Packet) -> bool {
        self.status.lock(|status| {
            let mut status = status.borrow_mut();
            if *status == *packet {
                false
            } else {
                *status = *packet;
                true
            }
        })
    }

    /// Sanitized copy of the cached status, used as the base of a write
    #[must_use]
    pub fn snapshot_for_write(&self) -> Packet {
        self.status.lock(|status| protocol::sanitize(&status.borrow()))
    }

    /// Decoded view of the cached status
    #[must_use]
    pub fn decoded(&self) -> DecodedState {
        self.status.lock(|status| protocol::decode_status(&status.borrow()))
    }

    /// Raw cached status packet
    #[must_use]
    pub fn raw(&self) -> Packet {
        self.status.lock(|status| *status.borrow())
    }

    /// Store the name carried by a filter-name packet
    ///
    /// Returns `true` when the name changed.
    pub fn set_filter_name(&self, packet: &Packet) -> bool {
        let name = protocol::decode_filter_name(packet);
        self.filter_name.lock(|current| {
            let mut current = current.borrow_mut();
            if *current == name {
                false
            } else {
                *current = name;
                true
            }
        })
    }

    /// Last reported filter name
    #[must_use]
    pub fn filter_name(&self) -> FilterName {
        self.filter_name.lock(|name| name.borrow().clone())
    }

    /// Forget everything (device closed)
    pub fn clear(&self) {
        self.status.lock(|status| *status.borrow_mut() = Packet::zeroed());
        self.filter_name.lock(|name| name.borrow_mut().clear());
    }
}

impl<M: RawMutex> Default for StateCache<M> {
    fn default() -> Self {
        Self::new()
    }
}
