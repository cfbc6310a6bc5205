//! Trigger Sequencer
//!
//! Decides, once per trigger sample, whether the amplifier should change
//! preset, power on or power off. Time is passed in as monotonic
//! [`Instant`]s so the decisions can be checked without a clock.
//!
//! The sequencer state is independent of the USB connection: a device
//! close does not reset it.

use embassy_time::Instant;

use crate::config::SequencerConfig;
use crate::types::{preset_number, Preset};

/// Outcome of one sequencer update
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequencerAction {
    /// Nothing to do
    Idle,
    /// Amplifier found unpowered while a preset was active; state reset to off
    Resynced,
    /// Triggers released, waiting out the no-trigger delay
    PowerOffPending,
    /// No-trigger delay elapsed: open the relay
    PowerOff,
    /// Power-on refused, amplifier switched off too recently
    CooldownActive,
    /// Close the relay, wait for the amplifier, then select the preset
    PowerOnAndSelect(Preset),
    /// Amplifier already powered: select the preset
    Select(Preset),
}

/// Trigger power sequencer decision core
#[derive(Clone, Debug)]
pub struct TriggerSequencer {
    config: SequencerConfig,
    /// Preset the amplifier was last told to use, `None` = off
    active: Option<Preset>,
    /// Start of the current no-trigger period
    released_since: Option<Instant>,
    /// Time of the last power-off
    last_power_off: Option<Instant>,
    /// Last connection epoch accounted for
    seen_epoch: u32,
}

impl TriggerSequencer {
    /// Create a sequencer with the amplifier off
    #[must_use]
    pub const fn new(config: SequencerConfig) -> Self {
        Self {
            config,
            active: None,
            released_since: None,
            last_power_off: None,
            seen_epoch: 0,
        }
    }

    /// Get the configuration
    #[must_use]
    pub const fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Get the active preset (`None` = amplifier off)
    #[must_use]
    pub const fn active_preset(&self) -> Option<Preset> {
        self.active
    }

    /// Get the time of the last power-off
    #[must_use]
    pub const fn last_power_off(&self) -> Option<Instant> {
        self.last_power_off
    }

    /// Check whether a power-off is pending
    #[must_use]
    pub const fn power_off_pending(&self) -> bool {
        self.released_since.is_some()
    }

    /// Process one trigger sample
    ///
    /// `observed` is the asserted trigger, `powered` the relay read-back.
    pub fn update(&mut self, observed: Option<Preset>, powered: bool, now: Instant) -> SequencerAction {
        if observed == self.active {
            self.released_since = None;
            return SequencerAction::Idle;
        }

        match observed {
            None => self.on_released(powered, now),
            Some(preset) => self.on_triggered(preset, powered, now),
        }
    }

    fn on_released(&mut self, powered: bool, now: Instant) -> SequencerAction {
        if !powered {
            warn!("preset {} active but amplifier unpowered, resync", preset_number(self.active));
            self.active = None;
            self.released_since = None;
            return SequencerAction::Resynced;
        }

        let since = *self.released_since.get_or_insert(now);
        if now.saturating_duration_since(since) >= self.config.power_off_delay {
            info!("no trigger for {} ms, power off", now.saturating_duration_since(since).as_millis());
            self.active = None;
            self.released_since = None;
            self.last_power_off = Some(now);
            SequencerAction::PowerOff
        } else {
            SequencerAction::PowerOffPending
        }
    }

    fn on_triggered(&mut self, preset: Preset, powered: bool, now: Instant) -> SequencerAction {
        self.released_since = None;

        if powered {
            info!("trigger {} -> {}", preset_number(self.active), preset.number());
            self.active = Some(preset);
            return SequencerAction::Select(preset);
        }

        if let Some(off) = self.last_power_off {
            if now.saturating_duration_since(off) < self.config.power_on_cooldown {
                return SequencerAction::CooldownActive;
            }
        }

        info!("trigger {}, power on", preset.number());
        self.active = Some(preset);
        SequencerAction::PowerOnAndSelect(preset)
    }

    /// Check a connection epoch for an amplifier that reconnected on its own
    ///
    /// Returns the preset to re-assert the first time a new epoch is seen
    /// while a preset is active.
    pub fn on_connection(&mut self, epoch: u32) -> Option<Preset> {
        if epoch == self.seen_epoch {
            return None;
        }
        self.seen_epoch = epoch;
        if self.config.reassert_on_reconnect {
            self.active
        } else {
            None
        }
    }

    /// Mark a connection epoch as handled
    pub fn acknowledge_connection(&mut self, epoch: u32) {
        self.seen_epoch = epoch;
    }

    /// Mark the connection following `epoch` as handled in advance
    ///
    /// For a preset queued while the amplifier is absent: the queued command
    /// is delivered on that connection, so it must not be re-asserted.
    pub fn expect_connection(&mut self, epoch: u32) {
        self.seen_epoch = epoch.wrapping_add(1);
    }
}

impl Default for TriggerSequencer {
    fn default() -> Self {
        Self::new(SequencerConfig::default())
    }
}
