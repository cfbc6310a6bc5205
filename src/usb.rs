//! USB Subsystem
//!
//! The controller acts as USB host for the amplifier:
//! - `host`: transport boundary (trait and completion events)
//! - `bridge`: channel-based transport adapter for the platform host driver
//! - `driver`: device lifecycle state machine

pub mod bridge;
pub mod driver;
pub mod host;
