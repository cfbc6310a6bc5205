//! Error types
//!
//! Errors are handled where they are detected and logged there; these types
//! carry the failure back to the caller of a single operation. Nothing here
//! crosses a task boundary.

use core::fmt;

/// Rejected control command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Preset outside 1..=3
    InvalidPreset(i8),
    /// Volume outside -99..=18 dB
    InvalidVolume(i8),
    /// Source code outside {0, 1, 2, 4, 5, 6, 7}
    InvalidSource(i8),
    /// Non-blocking enqueue found the queue full
    QueueFull,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPreset(v) => write!(f, "invalid preset {v}, must be between 1 and 3"),
            Self::InvalidVolume(v) => write!(f, "invalid volume {v} dB, must be between -99 and 18"),
            Self::InvalidSource(v) => write!(f, "invalid source {v}"),
            Self::QueueFull => write!(f, "command queue full"),
        }
    }
}

impl core::error::Error for CommandError {}

/// Failure reported synchronously by the USB host transport
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostError {
    /// No device at the requested address
    NoDevice,
    /// Device could not be opened
    OpenFailed,
    /// Interface could not be claimed
    ClaimFailed,
    /// Transport cannot accept another request right now
    Busy,
    /// Transfer submission rejected
    SubmitFailed,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDevice => write!(f, "no device at address"),
            Self::OpenFailed => write!(f, "device open failed"),
            Self::ClaimFailed => write!(f, "interface claim failed"),
            Self::Busy => write!(f, "transport busy"),
            Self::SubmitFailed => write!(f, "transfer submit failed"),
        }
    }
}

impl core::error::Error for HostError {}

/// Outbound submission failure in the device driver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceError {
    /// No amplifier is open
    NotConnected,
    /// Transport rejected the transfer
    Host(HostError),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::Host(e) => write!(f, "host: {e}"),
        }
    }
}

impl core::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Host(e) => Some(e),
            Self::NotConnected => None,
        }
    }
}

impl From<HostError> for DeviceError {
    fn from(e: HostError) -> Self {
        Self::Host(e)
    }
}

/// Completion status of a USB transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferStatus {
    /// Transfer finished
    Completed,
    /// Generic bus error
    Error,
    /// Device did not answer in time
    Timeout,
    /// Endpoint stalled
    Stall,
    /// Device went away
    NoDevice,
    /// Transfer cancelled by the host
    Cancelled,
    /// Device sent more data than requested
    Overflow,
}

impl TransferStatus {
    /// Check for success
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Completed)
    }
}
