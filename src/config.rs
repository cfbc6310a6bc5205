//! System configuration and hardware constants
//!
//! This module defines compile-time constants for the amplifier link.
//! Protocol sizes, timing, USB endpoints and pin mappings are centralized here.
//! Runtime-tunable settings (`DriverConfig`, `SequencerConfig`) take their
//! defaults from these values.

use embassy_time::Duration;

use crate::types::Volume;

/// Size of every USB transfer in both directions
pub const PACKET_SIZE: usize = 64;

/// Number of leading status bytes the amplifier accepts back in a write
pub const STATE_PAYLOAD_LEN: usize = 32;

/// Pending control commands held before producers have to wait
pub const COMMAND_QUEUE_DEPTH: usize = 10;

/// Lowest volume accepted in a command (dB)
pub const MIN_VOLUME_DB: i8 = -99;

/// Highest volume accepted in a command (dB)
pub const MAX_VOLUME_DB: i8 = 18;

/// Volume forced on every preset change, `None` keeps the current volume
pub const PRESET_CHANGE_RESET_VOLUME: Option<Volume> = Some(Volume::from_centi_db(-300));

/// Filter name capacity in bytes (the device sends at most 62)
pub const FILTER_NAME_CAPACITY: usize = 63;

/// USB interface claimed on the amplifier
pub const USB_INTERFACE: u8 = 0;

/// Bulk OUT endpoint (commands)
pub const USB_OUT_ENDPOINT: u8 = 0x01;

/// Bulk IN endpoint (status polling)
pub const USB_IN_ENDPOINT: u8 = 0x81;

/// Maximum wait for a host event before the driver services its state
pub const HOST_EVENT_TIMEOUT_MS: u64 = 100;

/// Host bridge event channel depth
pub const BRIDGE_EVENT_DEPTH: usize = 8;

/// Host bridge request channel depth
pub const BRIDGE_REQUEST_DEPTH: usize = 8;

/// Trigger input sampling period
pub const TRIGGER_POLL_MS: u64 = 100;

/// Continuous time without any trigger before the amplifier is switched off
pub const POWER_OFF_DELAY_MS: u64 = 10_000;

/// Minimum time after a power-off before the relay may close again
pub const POWER_ON_COOLDOWN_MS: u64 = 10_000;

/// Maximum wait for the amplifier to enumerate after power-on
pub const DEVICE_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Polling period while waiting for the amplifier to enumerate
pub const DEVICE_CONNECT_POLL_MS: u64 = 100;

/// Heartbeat blink period while the amplifier is connected
pub const HEARTBEAT_CONNECTED_MS: u64 = 1_000;

/// Heartbeat blink period while no amplifier is connected
pub const HEARTBEAT_ABSENT_MS: u64 = 200;

/// Pin assignments for GPIO
pub mod pins {
    //! GPIO pin assignments matching the controller board

    /// Status LED
    pub const LED_STATUS: &str = "PA5";

    /// Trigger input for preset 1 (active low)
    pub const TRIGGER_PRESET_1: &str = "PC0";

    /// Trigger input for preset 2 (active low)
    pub const TRIGGER_PRESET_2: &str = "PC1";

    /// Trigger input for preset 3 (active low)
    pub const TRIGGER_PRESET_3: &str = "PC2";

    /// Amplifier mains relay (high = powered)
    pub const POWER_RELAY: &str = "PB0";

    /// USB OTG FS D+ (handled by the host controller)
    pub const USB_DP: &str = "PA12";

    /// USB OTG FS D- (handled by the host controller)
    pub const USB_DM: &str = "PA11";
}

/// Device driver settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverConfig {
    /// Interface claimed after open
    pub interface: u8,
    /// Endpoint for command writes
    pub out_endpoint: u8,
    /// Endpoint for status polls
    pub in_endpoint: u8,
    /// Longest wait for a host event per loop iteration
    pub event_timeout: Duration,
    /// Volume forced when a preset is selected
    pub preset_volume_reset: Option<Volume>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            interface: USB_INTERFACE,
            out_endpoint: USB_OUT_ENDPOINT,
            in_endpoint: USB_IN_ENDPOINT,
            event_timeout: Duration::from_millis(HOST_EVENT_TIMEOUT_MS),
            preset_volume_reset: PRESET_CHANGE_RESET_VOLUME,
        }
    }
}

/// Trigger power sequencer settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequencerConfig {
    /// Trigger sampling period
    pub poll_period: Duration,
    /// No-trigger time before power-off
    pub power_off_delay: Duration,
    /// Minimum off time before power-on
    pub power_on_cooldown: Duration,
    /// Longest wait for the amplifier to enumerate
    pub connect_timeout: Duration,
    /// Polling period of that wait
    pub connect_poll: Duration,
    /// Re-send the active preset when the amplifier reconnects on its own
    pub reassert_on_reconnect: bool,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_millis(TRIGGER_POLL_MS),
            power_off_delay: Duration::from_millis(POWER_OFF_DELAY_MS),
            power_on_cooldown: Duration::from_millis(POWER_ON_COOLDOWN_MS),
            connect_timeout: Duration::from_millis(DEVICE_CONNECT_TIMEOUT_MS),
            connect_poll: Duration::from_millis(DEVICE_CONNECT_POLL_MS),
            reassert_on_reconnect: true,
        }
    }
}
