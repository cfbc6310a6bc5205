//! Shared types used across the amplifier link
//!
//! This module defines domain-specific types that enforce invariants
//! at construction time and provide type safety throughout the codebase.

use core::fmt;

use crate::config::{FILTER_NAME_CAPACITY, MAX_VOLUME_DB, MIN_VOLUME_DB};
use crate::error::CommandError;

/// Filter name reported by the amplifier
pub type FilterName = heapless::String<FILTER_NAME_CAPACITY>;

/// One of the three stored amplifier configurations
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Preset {
    /// Preset 1
    One = 1,
    /// Preset 2
    Two = 2,
    /// Preset 3
    Three = 3,
}

impl Preset {
    /// All presets in order
    pub const ALL: [Self; 3] = [Self::One, Self::Two, Self::Three];

    /// Create from the preset number (1..=3)
    #[must_use]
    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            _ => None,
        }
    }

    /// Get the preset number (1..=3)
    #[must_use]
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// Zero-based index for per-preset arrays
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize - 1
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Preset {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "P{}", self.number());
    }
}

/// Number of a sequencer preset slot, `0` when the amplifier is off
#[must_use]
pub const fn preset_number(preset: Option<Preset>) -> u8 {
    match preset {
        Some(p) => p.number(),
        None => 0,
    }
}

/// Volume in hundredths of a dB (wire representation)
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Volume(i16);

impl Volume {
    /// Lowest volume accepted in a command
    pub const MIN: Self = Self(MIN_VOLUME_DB as i16 * 100);

    /// Highest volume accepted in a command
    pub const MAX: Self = Self(MAX_VOLUME_DB as i16 * 100);

    /// Create from whole dB, returns None if outside the accepted range
    #[must_use]
    pub const fn from_db(db: i8) -> Option<Self> {
        if db >= MIN_VOLUME_DB && db <= MAX_VOLUME_DB {
            Some(Self(db as i16 * 100))
        } else {
            None
        }
    }

    /// Create from the raw wire value (no range check, decoded values may lie outside)
    #[must_use]
    pub const fn from_centi_db(centi_db: i16) -> Self {
        Self(centi_db)
    }

    /// Get the raw wire value
    #[must_use]
    pub const fn centi_db(self) -> i16 {
        self.0
    }

    /// Get the volume in dB
    #[must_use]
    pub fn as_db(self) -> f32 {
        f32::from(self.0) / 100.0
    }
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "Volume({sign}{}.{:02} dB)", abs / 100, abs % 100)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Volume {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=i16} cdB", self.0);
    }
}

/// Amplifier input source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Source {
    /// Automatic input scan
    #[default]
    Scan,
    /// Balanced analog
    Xlr,
    /// Unbalanced analog
    Rca,
    /// Coaxial digital
    Spdif,
    /// AES/EBU digital
    Aes,
    /// Optical digital
    Optical,
    /// External module
    Ext,
    /// Code the amplifier reported that has no known meaning
    Unknown(u8),
}

impl Source {
    /// Decode a wire code (never fails)
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Scan,
            1 => Self::Xlr,
            2 => Self::Rca,
            4 => Self::Spdif,
            5 => Self::Aes,
            6 => Self::Optical,
            7 => Self::Ext,
            other => Self::Unknown(other),
        }
    }

    /// Parse a command value, rejecting codes without a defined source
    #[must_use]
    pub const fn from_command_value(value: i8) -> Option<Self> {
        if value < 0 {
            return None;
        }
        match Self::from_code(value as u8) {
            Self::Unknown(_) => None,
            source => Some(source),
        }
    }

    /// Get the wire code
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Scan => 0,
            Self::Xlr => 1,
            Self::Rca => 2,
            Self::Spdif => 4,
            Self::Aes => 5,
            Self::Optical => 6,
            Self::Ext => 7,
            Self::Unknown(code) => code,
        }
    }
}

/// Kind of control request produced by the sequencer or the presentation layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlAction {
    /// Select the active preset (value 1..=3)
    SetPreset,
    /// Set the master volume (value in dB, -99..=18)
    SetVolume,
    /// Set the input source of a preset (value = source code)
    SetSource(Preset),
    /// Mute or unmute (non-zero = muted)
    SetMute,
    /// Enable or disable the EQ of a preset (non-zero = enabled)
    SetEq(Preset),
}

impl ControlAction {
    /// Look up an action by its wire name (e.g. `set_source_p2`)
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let action = match name {
            "set_preset" => Self::SetPreset,
            "set_volume" => Self::SetVolume,
            "set_mute" => Self::SetMute,
            "set_source_p1" => Self::SetSource(Preset::One),
            "set_source_p2" => Self::SetSource(Preset::Two),
            "set_source_p3" => Self::SetSource(Preset::Three),
            "set_eq_p1" => Self::SetEq(Preset::One),
            "set_eq_p2" => Self::SetEq(Preset::Two),
            "set_eq_p3" => Self::SetEq(Preset::Three),
            _ => return None,
        };
        Some(action)
    }

    /// Wire name of the action
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SetPreset => "set_preset",
            Self::SetVolume => "set_volume",
            Self::SetMute => "set_mute",
            Self::SetSource(Preset::One) => "set_source_p1",
            Self::SetSource(Preset::Two) => "set_source_p2",
            Self::SetSource(Preset::Three) => "set_source_p3",
            Self::SetEq(Preset::One) => "set_eq_p1",
            Self::SetEq(Preset::Two) => "set_eq_p2",
            Self::SetEq(Preset::Three) => "set_eq_p3",
        }
    }
}

/// Unvalidated control request as submitted by a producer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlCommand {
    /// What to change
    pub action: ControlAction,
    /// Raw argument
    pub value: i8,
}

impl ControlCommand {
    /// Create a command
    #[must_use]
    pub const fn new(action: ControlAction, value: i8) -> Self {
        Self { action, value }
    }

    /// Preset selection command
    #[must_use]
    pub const fn set_preset(preset: Preset) -> Self {
        Self::new(ControlAction::SetPreset, preset.number() as i8)
    }

    /// Validate the argument against the action's range
    ///
    /// # Errors
    ///
    /// Returns the matching `CommandError::Invalid*` variant when the value is out of range.
    pub fn validate(self) -> Result<Command, CommandError> {
        let value = self.value;
        match self.action {
            ControlAction::SetPreset => u8::try_from(value)
                .ok()
                .and_then(Preset::from_number)
                .map(Command::SetPreset)
                .ok_or(CommandError::InvalidPreset(value)),
            ControlAction::SetVolume => Volume::from_db(value)
                .map(Command::SetVolume)
                .ok_or(CommandError::InvalidVolume(value)),
            ControlAction::SetSource(preset) => Source::from_command_value(value)
                .map(|source| Command::SetSource(preset, source))
                .ok_or(CommandError::InvalidSource(value)),
            ControlAction::SetMute => Ok(Command::SetMute(value != 0)),
            ControlAction::SetEq(preset) => Ok(Command::SetEq(preset, value != 0)),
        }
    }
}

/// Validated command, the only form that enters the command queue
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Select a preset
    SetPreset(Preset),
    /// Set master volume
    SetVolume(Volume),
    /// Set a preset's input source
    SetSource(Preset, Source),
    /// Mute (true) or unmute
    SetMute(bool),
    /// Enable (true) or disable a preset's EQ
    SetEq(Preset, bool),
}

impl TryFrom<ControlCommand> for Command {
    type Error = CommandError;

    fn try_from(command: ControlCommand) -> Result<Self, Self::Error> {
        command.validate()
    }
}

/// Decoded view of the amplifier's status packet
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DecodedState {
    /// Active preset, `None` while no status has been received
    pub preset: Option<Preset>,
    /// Master volume
    pub volume: Volume,
    /// Output muted
    pub is_muted: bool,
    /// Source currently playing
    pub current_source: Source,
    /// Configured source per preset
    pub preset_source: [Source; 3],
    /// EQ enabled per preset
    pub is_eq_on: [bool; 3],
}

impl DecodedState {
    /// Volume in dB
    #[must_use]
    pub fn volume_db(&self) -> f32 {
        self.volume.as_db()
    }

    /// Configured source of a preset
    #[must_use]
    pub const fn source_of(&self, preset: Preset) -> Source {
        self.preset_source[preset.index()]
    }

    /// EQ state of a preset
    #[must_use]
    pub const fn eq_of(&self, preset: Preset) -> bool {
        self.is_eq_on[preset.index()]
    }
}
