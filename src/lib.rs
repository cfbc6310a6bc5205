//! Amplifier Link Firmware Library
//!
//! Core of a controller board that switches a power amplifier's mains
//! relay from three preset trigger inputs and drives the amplifier over
//! its USB control endpoint (64-byte vendor protocol).
//!
//! # Architecture
//!
//! Two tasks share an [`link::AmpLink`]:
//!
//! ```text
//! ┌────────────────────┐  ControlCommand  ┌─────────────────┐  UsbHost  ┌───────────┐
//! │  PowerSequencer    │─────────────────▶│  DeviceDriver   │──────────▶│ amplifier │
//! │  triggers → relay  │   CommandQueue   │  lifecycle FSM  │◀──────────│           │
//! └────────────────────┘                  └─────────────────┘ HostEvent └───────────┘
//!                                                │ StateCache
//!                                                ▼
//!                                 get_state() / wait_state_changed()
//! ```
//!
//! # Design Principles
//!
//! - **Type-driven design**: commands are validated into [`types::Command`]
//!   before they can enter the queue
//! - **Functional core, imperative shell**: [`protocol`] and
//!   [`power::TriggerSequencer`] are pure; the tasks apply their results
//! - **Message passing**: transfer completions arrive as events on the
//!   driver's own task
//! - **Explicit error handling**: fallible operations return `Result`

#![cfg_attr(feature = "embedded", no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Must come first so the logging macros are visible in every module
#[macro_use]
mod fmt;

// Re-export dependencies needed by applications (only in embedded mode)
#[cfg(feature = "embedded")]
pub use embassy_executor;
#[cfg(feature = "embedded")]
pub use embassy_stm32;
pub use embassy_sync;
pub use embassy_time;

/// Hardware Abstraction Layer
///
/// Trigger inputs, power relay, status LED and deadlines.
pub mod hal;

/// Power Management
///
/// Trigger-driven amplifier power sequencing.
pub mod power;

/// USB Subsystem
///
/// Host transport boundary and the amplifier device driver.
pub mod usb;

/// Amplifier Control Protocol
///
/// 64-byte packet encoding and decoding.
pub mod protocol;

/// State cache of the last reported device state
pub mod state;

/// Bounded queue of validated commands
pub mod queue;

/// Shared handle between the tasks
pub mod link;

/// Error types
pub mod error;

/// Shared types used across modules
pub mod types;

/// System configuration and constants
pub mod config;

/// Prelude module for common imports
pub mod prelude {
    //! Convenient re-exports for common types and traits.

    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::link::AmpLink;
    pub use crate::types::*;

    // Embassy
    pub use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    pub use embassy_time::{Duration, Instant, Timer};

    // Error handling
    pub use core::result::Result;
}
