//! USB Host Transport Boundary
//!
//! The driver talks to the USB host stack only through [`UsbHost`].
//! Submissions return immediately; their completions come back later as
//! [`HostEvent`]s from [`UsbHost::wait_event`], on the driver's own task.
//!
//! Every IN submission carries a tag that the transport hands back in its
//! [`InCompletion`], so the driver can tell a completion for the current
//! connection from a late one for a device that is already gone.

use crate::config::PACKET_SIZE;
use crate::error::{HostError, TransferStatus};
use crate::protocol::Packet;

/// Completed inbound (IN endpoint) transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InCompletion {
    /// Tag passed to [`UsbHost::submit_in`]
    pub tag: u32,
    /// Transfer outcome
    pub status: TransferStatus,
    /// Received data, zero-filled past `len`
    pub packet: Packet,
    /// Number of bytes actually received
    pub len: usize,
}

impl InCompletion {
    /// Successful transfer carrying `data`
    #[must_use]
    pub fn completed(tag: u32, data: &[u8]) -> Self {
        Self {
            tag,
            status: TransferStatus::Completed,
            packet: Packet::from_slice(data),
            len: data.len().min(PACKET_SIZE),
        }
    }

    /// Failed transfer without data
    #[must_use]
    pub const fn failed(tag: u32, status: TransferStatus) -> Self {
        Self {
            tag,
            status,
            packet: Packet::zeroed(),
            len: 0,
        }
    }
}

/// Completed outbound (OUT endpoint) transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutCompletion {
    /// Transfer outcome
    pub status: TransferStatus,
    /// Number of bytes actually sent
    pub len: usize,
}

/// Event delivered by the transport
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostEvent {
    /// A device was enumerated at `address`
    Attached {
        /// Bus address
        address: u8,
    },
    /// The device went away
    Detached,
    /// An inbound transfer finished
    InComplete(InCompletion),
    /// An outbound transfer finished
    OutComplete(OutCompletion),
}

/// Asynchronous USB host transport
///
/// None of the synchronous methods may block: they queue work for the host
/// stack and report only whether it was accepted.
#[allow(async_fn_in_trait)]
pub trait UsbHost {
    /// Open device handle
    type Device;

    /// Wait for the next attach, detach or transfer completion
    async fn wait_event(&mut self) -> HostEvent;

    /// Open the device at `address`
    ///
    /// # Errors
    ///
    /// `HostError::NoDevice` if nothing is attached there, `HostError::OpenFailed` otherwise.
    fn open(&mut self, address: u8) -> Result<Self::Device, HostError>;

    /// Claim an interface of an open device
    ///
    /// # Errors
    ///
    /// `HostError::ClaimFailed` when the interface is unavailable.
    fn claim_interface(&mut self, device: &Self::Device, interface: u8) -> Result<(), HostError>;

    /// Release a claimed interface
    ///
    /// # Errors
    ///
    /// Transport specific.
    fn release_interface(&mut self, device: &Self::Device, interface: u8) -> Result<(), HostError>;

    /// Close the device handle
    ///
    /// # Errors
    ///
    /// Transport specific.
    fn close(&mut self, device: Self::Device) -> Result<(), HostError>;

    /// Submit a 64-byte write to an OUT endpoint
    ///
    /// # Errors
    ///
    /// `HostError::Busy` or `HostError::SubmitFailed` when the write was not accepted.
    fn submit_out(&mut self, device: &Self::Device, endpoint: u8, packet: &Packet) -> Result<(), HostError>;

    /// Submit a 64-byte read from an IN endpoint
    ///
    /// The completion must be reported with the same `tag`.
    ///
    /// # Errors
    ///
    /// `HostError::Busy` or `HostError::SubmitFailed` when the read was not accepted.
    fn submit_in(&mut self, device: &Self::Device, endpoint: u8, tag: u32) -> Result<(), HostError>;
}
