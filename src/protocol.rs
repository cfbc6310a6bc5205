//! Amplifier Control Protocol
//!
//! Encoding and decoding of the amplifier's 64-byte USB packets.
//! Pure transformations, no state.
//!
//! # Packet layout
//!
//! ```text
//! offset  meaning
//! 0       type: 0x05 status, 0x03 filter name, 0x06 state request
//! 1       sub-type / request marker (zero on writes)
//! 2       active preset (1..3), start of the name on filter-name packets
//! 3..=4   volume, i16 little endian, dB x 100
//! 5       reserved (zero on writes)
//! 6       bit 7 = mute
//! 12..=14 per preset: low nibble = source, bit 4 = EQ enabled
//! 23, 26  reserved (zero on writes)
//! 50      source currently playing
//! ```
//!
//! Writes are built from the last status the amplifier sent so that fields a
//! command does not touch are sent back unchanged.

use crate::config::{PACKET_SIZE, STATE_PAYLOAD_LEN};
use crate::types::{Command, DecodedState, FilterName, Preset, Source, Volume};

/// Packet type of a status response
pub const TYPE_STATUS: u8 = 0x05;

/// Packet type of a filter name response (and request)
pub const TYPE_FILTER_NAME: u8 = 0x03;

/// Packet type of a state request
pub const TYPE_STATE_REQUEST: u8 = 0x06;

/// Request marker of the initial state request
pub const REQUEST_INITIAL_STATE: u8 = 0x02;

/// Request marker of the filter name request
pub const REQUEST_FILTER_NAME: u8 = 0x08;

/// Byte offsets inside a packet
pub mod offset {
    //! Field offsets of the status packet

    /// Packet type
    pub const TYPE: usize = 0;
    /// Sub-type / request marker
    pub const SUBTYPE: usize = 1;
    /// Active preset
    pub const PRESET: usize = 2;
    /// Volume low byte
    pub const VOLUME: usize = 3;
    /// Mute flag byte
    pub const MUTE: usize = 6;
    /// Settings byte of preset 1 (presets 2 and 3 follow)
    pub const PRESET_SETTINGS: usize = 12;
    /// Source currently playing
    pub const CURRENT_SOURCE: usize = 50;
    /// First byte of the filter name
    pub const FILTER_NAME: usize = 2;
    /// Bytes that must be zero in every write
    pub const FORCED_ZERO: [usize; 4] = [1, 5, 23, 26];
}

const MUTE_BIT: u8 = 1 << 7;
const EQ_BIT: u8 = 1 << 4;
const SOURCE_MASK: u8 = 0x0F;

/// Raw 64-byte USB packet
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet([u8; PACKET_SIZE]);

impl Packet {
    /// All-zero packet
    #[must_use]
    pub const fn zeroed() -> Self {
        Self([0; PACKET_SIZE])
    }

    /// Wrap a full buffer
    #[must_use]
    pub const fn from_bytes(bytes: [u8; PACKET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Copy up to 64 bytes from a transfer buffer, zero-filling the rest
    #[must_use]
    pub fn from_slice(data: &[u8]) -> Self {
        let mut packet = Self::zeroed();
        let len = data.len().min(PACKET_SIZE);
        packet.0[..len].copy_from_slice(&data[..len]);
        packet
    }

    /// Packet bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PACKET_SIZE] {
        &self.0
    }

    /// Mutable packet bytes
    pub fn as_bytes_mut(&mut self) -> &mut [u8; PACKET_SIZE] {
        &mut self.0
    }

    /// Packet type byte
    #[must_use]
    pub const fn packet_type(&self) -> u8 {
        self.0[offset::TYPE]
    }

    /// Read a byte
    #[must_use]
    pub const fn get(&self, index: usize) -> u8 {
        self.0[index]
    }

    /// Write a byte
    pub fn set(&mut self, index: usize, value: u8) {
        self.0[index] = value;
    }

    fn set_bit(&mut self, index: usize, mask: u8, on: bool) {
        if on {
            self.0[index] |= mask;
        } else {
            self.0[index] &= !mask;
        }
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl core::fmt::Debug for Packet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Packet(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// Kind of an inbound packet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketKind {
    /// Status response
    Status,
    /// Filter name response
    FilterName,
    /// Anything else (carries the type byte)
    Unknown(u8),
}

/// Dispatch on the packet type byte
#[must_use]
pub const fn classify(packet: &Packet) -> PacketKind {
    match packet.packet_type() {
        TYPE_STATUS => PacketKind::Status,
        TYPE_FILTER_NAME => PacketKind::FilterName,
        other => PacketKind::Unknown(other),
    }
}

/// Reduce a cached status to a valid write base
///
/// Only the first 32 bytes are settings the amplifier accepts back; the
/// bytes it echoes but rejects in a write are cleared.
#[must_use]
pub fn sanitize(status: &Packet) -> Packet {
    let mut base = Packet::zeroed();
    base.0[..STATE_PAYLOAD_LEN].copy_from_slice(&status.0[..STATE_PAYLOAD_LEN]);
    for index in offset::FORCED_ZERO {
        base.0[index] = 0;
    }
    base
}

fn write_volume(packet: &mut Packet, volume: Volume) {
    let [lo, hi] = volume.centi_db().to_le_bytes();
    packet.0[offset::VOLUME] = lo;
    packet.0[offset::VOLUME + 1] = hi;
}

fn settings_offset(preset: Preset) -> usize {
    offset::PRESET_SETTINGS + preset.index()
}

/// Select a preset, optionally forcing the volume
#[must_use]
pub fn encode_set_preset(base: &Packet, preset: Preset, reset_volume: Option<Volume>) -> Packet {
    let mut packet = *base;
    packet.0[offset::PRESET] = preset.number();
    if let Some(volume) = reset_volume {
        write_volume(&mut packet, volume);
    }
    packet
}

/// Set the master volume
#[must_use]
pub fn encode_set_volume(base: &Packet, volume: Volume) -> Packet {
    let mut packet = *base;
    write_volume(&mut packet, volume);
    packet
}

/// Set or clear the mute bit
#[must_use]
pub fn encode_set_mute(base: &Packet, muted: bool) -> Packet {
    let mut packet = *base;
    packet.set_bit(offset::MUTE, MUTE_BIT, muted);
    packet
}

/// Set a preset's source, keeping the high nibble (EQ flag)
#[must_use]
pub fn encode_set_source(base: &Packet, preset: Preset, source: Source) -> Packet {
    let mut packet = *base;
    let index = settings_offset(preset);
    packet.0[index] = (packet.0[index] & !SOURCE_MASK) | (source.code() & SOURCE_MASK);
    packet
}

/// Enable or disable a preset's EQ
#[must_use]
pub fn encode_set_eq(base: &Packet, preset: Preset, enabled: bool) -> Packet {
    let mut packet = *base;
    packet.set_bit(settings_offset(preset), EQ_BIT, enabled);
    packet
}

/// Ask the amplifier for its full status
#[must_use]
pub fn encode_request_initial_state() -> Packet {
    let mut packet = Packet::zeroed();
    packet.0[offset::TYPE] = TYPE_STATE_REQUEST;
    packet.0[offset::SUBTYPE] = REQUEST_INITIAL_STATE;
    packet
}

/// Ask the amplifier for the loaded filter's name
#[must_use]
pub fn encode_request_filter_name() -> Packet {
    let mut packet = Packet::zeroed();
    packet.0[offset::TYPE] = TYPE_FILTER_NAME;
    packet.0[offset::SUBTYPE] = REQUEST_FILTER_NAME;
    packet
}

/// Render a validated command against a write base
#[must_use]
pub fn encode_command(base: &Packet, command: Command, preset_volume_reset: Option<Volume>) -> Packet {
    match command {
        Command::SetPreset(preset) => encode_set_preset(base, preset, preset_volume_reset),
        Command::SetVolume(volume) => encode_set_volume(base, volume),
        Command::SetSource(preset, source) => encode_set_source(base, preset, source),
        Command::SetMute(muted) => encode_set_mute(base, muted),
        Command::SetEq(preset, enabled) => encode_set_eq(base, preset, enabled),
    }
}

/// Interpret a status packet
#[must_use]
pub fn decode_status(packet: &Packet) -> DecodedState {
    let bytes = &packet.0;
    let volume = i16::from_le_bytes([bytes[offset::VOLUME], bytes[offset::VOLUME + 1]]);
    let settings = |preset: Preset| bytes[settings_offset(preset)];

    DecodedState {
        preset: Preset::from_number(bytes[offset::PRESET]),
        volume: Volume::from_centi_db(volume),
        is_muted: bytes[offset::MUTE] & MUTE_BIT != 0,
        current_source: Source::from_code(bytes[offset::CURRENT_SOURCE]),
        preset_source: Preset::ALL.map(|p| Source::from_code(settings(p) & SOURCE_MASK)),
        is_eq_on: Preset::ALL.map(|p| settings(p) & EQ_BIT != 0),
    }
}

/// Extract the filter name from a filter-name packet
///
/// Stops at the first NUL; invalid UTF-8 ends the name at the last valid character.
#[must_use]
pub fn decode_filter_name(packet: &Packet) -> FilterName {
    let raw = &packet.0[offset::FILTER_NAME..];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let raw = &raw[..end];
    let text = match core::str::from_utf8(raw) {
        Ok(text) => text,
        // valid_up_to() marks a char boundary, so the prefix is valid UTF-8
        Err(e) => core::str::from_utf8(&raw[..e.valid_up_to()]).unwrap_or_default(),
    };

    let mut name = FilterName::new();
    for c in text.chars() {
        if name.push(c).is_err() {
            break;
        }
    }
    name
}
