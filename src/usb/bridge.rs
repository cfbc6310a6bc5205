//! Host Bridge
//!
//! Message-passing adapter between the platform USB host driver and the
//! device driver task. The platform side runs in interrupt or driver
//! context: it only pushes events with non-blocking sends and drains the
//! requests the device driver queued.
//!
//! IN completions bypass the event channel. Only one status poll is ever
//! outstanding, so a single [`Signal`] slot holds its completion and a burst
//! of other events cannot crowd it out.
//!
//! ```text
//! ┌──────────────┐  HostEvent    ┌───────────────┐
//! │ host driver  │──────────────▶│ device driver │
//! │ (platform)   │◀──────────────│ (BridgePort)  │
//! └──────────────┘  HostRequest  └───────────────┘
//! ```

use core::cell::Cell;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use crate::config::{BRIDGE_EVENT_DEPTH, BRIDGE_REQUEST_DEPTH, PACKET_SIZE};
use crate::error::{HostError, TransferStatus};
use crate::protocol::Packet;
use crate::usb::host::{HostEvent, InCompletion, OutCompletion, UsbHost};

/// Work the platform host driver must carry out
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostRequest {
    /// Claim an interface
    Claim {
        /// Device address
        address: u8,
        /// Interface number
        interface: u8,
    },
    /// Release an interface
    Release {
        /// Device address
        address: u8,
        /// Interface number
        interface: u8,
    },
    /// Close the device
    Close {
        /// Device address
        address: u8,
    },
    /// Write a packet to an OUT endpoint
    Out {
        /// Device address
        address: u8,
        /// Endpoint address
        endpoint: u8,
        /// Data to send
        packet: Packet,
    },
    /// Read a packet from an IN endpoint
    In {
        /// Device address
        address: u8,
        /// Endpoint address
        endpoint: u8,
        /// Tag to report back with the completion
        tag: u32,
    },
}

/// Channel-backed transport shared by the platform and the device driver
pub struct HostBridge<M: RawMutex> {
    events: Channel<M, HostEvent, BRIDGE_EVENT_DEPTH>,
    requests: Channel<M, HostRequest, BRIDGE_REQUEST_DEPTH>,
    in_done: Signal<M, InCompletion>,
    attached: Mutex<M, Cell<Option<u8>>>,
    /// Tag of the outstanding IN request
    poll_tag: Mutex<M, Cell<Option<u32>>>,
}

impl<M: RawMutex> HostBridge<M> {
    /// Create an idle bridge
    #[must_use]
    pub const fn new() -> Self {
        Self {
            events: Channel::new(),
            requests: Channel::new(),
            in_done: Signal::new(),
            attached: Mutex::new(Cell::new(None)),
            poll_tag: Mutex::new(Cell::new(None)),
        }
    }

    /// Transport handle for the device driver
    #[must_use]
    pub const fn port(&self) -> BridgePort<'_, M> {
        BridgePort { bridge: self }
    }

    /// Address of the attached device
    #[must_use]
    pub fn attached(&self) -> Option<u8> {
        self.attached.lock(Cell::get)
    }

    /// Platform: a device finished enumeration
    pub fn device_attached(&self, address: u8) -> bool {
        self.attached.lock(|a| a.set(Some(address)));
        self.push(HostEvent::Attached { address })
    }

    /// Platform: the device disconnected
    ///
    /// Undelivered events belong to the old device and are dropped.
    pub fn device_gone(&self) -> bool {
        self.attached.lock(|a| a.set(None));
        self.poll_tag.lock(|t| t.set(None));
        self.events.clear();
        self.in_done.reset();
        self.push(HostEvent::Detached)
    }

    /// Platform: an IN transfer finished
    ///
    /// `tag` is the one carried by the [`HostRequest::In`]. A completion for
    /// a request that is no longer outstanding is dropped.
    pub fn in_transfer_done(&self, tag: u32, status: TransferStatus, data: &[u8]) -> bool {
        let outstanding = self.poll_tag.lock(|t| {
            if t.get() == Some(tag) {
                t.set(None);
                true
            } else {
                false
            }
        });
        if !outstanding {
            debug!("IN completion {} not outstanding, dropped", tag);
            return false;
        }

        let completion = if status.is_ok() {
            InCompletion::completed(tag, data)
        } else {
            InCompletion::failed(tag, status)
        };
        self.in_done.signal(completion);
        true
    }

    /// Platform: an OUT transfer finished
    pub fn out_transfer_done(&self, status: TransferStatus, len: usize) -> bool {
        self.push(HostEvent::OutComplete(OutCompletion {
            status,
            len: len.min(PACKET_SIZE),
        }))
    }

    fn push(&self, event: HostEvent) -> bool {
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(_) => {
                warn!("host event dropped: {:?}", event);
                false
            }
        }
    }

    /// Platform: wait for the next request
    pub async fn next_request(&self) -> HostRequest {
        self.requests.receive().await
    }

    /// Platform: take the next request if one is pending
    pub fn try_next_request(&self) -> Option<HostRequest> {
        self.requests.try_receive().ok()
    }

    fn request(&self, request: HostRequest) -> Result<(), HostError> {
        self.requests.try_send(request).map_err(|_| HostError::Busy)
    }

    fn check_attached(&self, address: u8) -> Result<(), HostError> {
        if self.attached() == Some(address) {
            Ok(())
        } else {
            Err(HostError::NoDevice)
        }
    }
}

impl<M: RawMutex> Default for HostBridge<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Device opened through the bridge
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BridgeDevice {
    address: u8,
}

impl BridgeDevice {
    /// Get the bus address
    #[must_use]
    pub const fn address(&self) -> u8 {
        self.address
    }
}

/// Driver-side view of a [`HostBridge`]
pub struct BridgePort<'a, M: RawMutex> {
    bridge: &'a HostBridge<M>,
}

impl<M: RawMutex> UsbHost for BridgePort<'_, M> {
    type Device = BridgeDevice;

    async fn wait_event(&mut self) -> HostEvent {
        match select(self.bridge.events.receive(), self.bridge.in_done.wait()).await {
            Either::First(event) => event,
            Either::Second(completion) => HostEvent::InComplete(completion),
        }
    }

    fn open(&mut self, address: u8) -> Result<BridgeDevice, HostError> {
        self.bridge.check_attached(address)?;
        Ok(BridgeDevice { address })
    }

    fn claim_interface(&mut self, device: &BridgeDevice, interface: u8) -> Result<(), HostError> {
        self.bridge.check_attached(device.address)?;
        self.bridge
            .request(HostRequest::Claim {
                address: device.address,
                interface,
            })
            .map_err(|_| HostError::ClaimFailed)
    }

    fn release_interface(&mut self, device: &BridgeDevice, interface: u8) -> Result<(), HostError> {
        self.bridge.request(HostRequest::Release {
            address: device.address,
            interface,
        })
    }

    fn close(&mut self, device: BridgeDevice) -> Result<(), HostError> {
        self.bridge.request(HostRequest::Close {
            address: device.address,
        })
    }

    fn submit_out(&mut self, device: &BridgeDevice, endpoint: u8, packet: &Packet) -> Result<(), HostError> {
        self.bridge.check_attached(device.address)?;
        self.bridge.request(HostRequest::Out {
            address: device.address,
            endpoint,
            packet: *packet,
        })
    }

    fn submit_in(&mut self, device: &BridgeDevice, endpoint: u8, tag: u32) -> Result<(), HostError> {
        self.bridge.check_attached(device.address)?;
        // Set before the request so an immediate completion is recognised
        self.bridge.poll_tag.lock(|t| t.set(Some(tag)));
        self.bridge
            .request(HostRequest::In {
                address: device.address,
                endpoint,
                tag,
            })
            .inspect_err(|_| self.bridge.poll_tag.lock(|t| t.set(None)))
    }
}
