//! Datagram wire format: a fixed 20-byte header followed by a fixed-layout
//! payload per packet type.
//!
//! The header carries a magic constant, a float timestamp, the packet type,
//! a sequence number and the explicit payload length, all little-endian.
//! Payloads are plain structs serialized with bincode's legacy fixed-int
//! config, so both peers agree on the byte layout statically; the codec does
//! not self-describe payload shape.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const MAGIC_NUMBER: u32 = 0xDEAD_BEEF;
/// magic + timestamp + type + sequence + payload length, 4 bytes each.
pub const HEADER_SIZE: usize = 20;
/// Fixed width of the display-name field in CONNECT payloads.
pub const NAME_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("packet too short: {0} bytes, header needs {HEADER_SIZE}")]
    TooShort(usize),
    #[error("magic number mismatch: {0:#010x}")]
    BadMagic(u32),
    #[error("declared payload length {declared} but only {present} bytes present")]
    LengthMismatch { declared: usize, present: usize },
    #[error("malformed payload")]
    BadPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PacketType {
    Connect = 1,
    Disconnect = 2,
    Onboard = 3,
    Score = 4,
    Coordinates = 5,
    Shoot = 6,
    Update = 7,
    Hit = 8,
    LifecycleChange = 9,
    ForceMove = 10,
    Ready = 11,
}

impl PacketType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Connect),
            2 => Some(Self::Disconnect),
            3 => Some(Self::Onboard),
            4 => Some(Self::Score),
            5 => Some(Self::Coordinates),
            6 => Some(Self::Shoot),
            7 => Some(Self::Update),
            8 => Some(Self::Hit),
            9 => Some(Self::LifecycleChange),
            10 => Some(Self::ForceMove),
            11 => Some(Self::Ready),
            _ => None,
        }
    }
}

/// A decoded datagram. `packet_type` is kept raw so that unknown types
/// survive decoding and can be ignored by the dispatcher instead of
/// poisoning the receive loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub packet_type: u32,
    pub timestamp: f32,
    pub sequence: u32,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(packet_type: PacketType, sequence: u32, payload: Vec<u8>) -> Self {
        Self {
            packet_type: packet_type as u32,
            timestamp: unix_now_f32(),
            sequence,
            payload,
        }
    }

    /// Typed view of the raw packet type, if it is one we know.
    pub fn kind(&self) -> Option<PacketType> {
        PacketType::from_u32(self.packet_type)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&MAGIC_NUMBER.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.packet_type.to_le_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < HEADER_SIZE {
            return Err(ProtocolError::TooShort(data.len()));
        }

        let magic = read_u32(data, 0);
        if magic != MAGIC_NUMBER {
            return Err(ProtocolError::BadMagic(magic));
        }

        let timestamp = f32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let packet_type = read_u32(data, 8);
        let sequence = read_u32(data, 12);
        let declared = read_u32(data, 16) as usize;

        let present = data.len() - HEADER_SIZE;
        if declared > present {
            return Err(ProtocolError::LengthMismatch { declared, present });
        }

        // Trailing bytes beyond the declared length are ignored.
        let payload = data[HEADER_SIZE..HEADER_SIZE + declared].to_vec();

        Ok(Self {
            packet_type,
            timestamp,
            sequence,
            payload,
        })
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn unix_now_f32() -> f32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f32()
}

/// Fixed-layout payload, convertible to and from its agreed byte form.
pub trait Payload: Serialize + DeserializeOwned {
    fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("fixed-layout payload serializes infallibly")
    }

    fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        bincode::deserialize(data).map_err(|_| ProtocolError::BadPayload)
    }
}

/// CONNECT: a NUL-padded display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectPayload {
    pub name: [u8; NAME_LEN],
}

impl ConnectPayload {
    pub fn from_name(name: &str) -> Self {
        let mut buf = [0u8; NAME_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_LEN);
        buf[..len].copy_from_slice(&bytes[..len]);
        Self { name: buf }
    }

    pub fn name(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

impl Payload for ConnectPayload {}

/// DISCONNECT: the id of the departing player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectPayload {
    pub player_id: u32,
}

impl Payload for DisconnectPayload {}

/// ONBOARD: `kind` is an OnboardKind; `value` is the assigned player id for
/// PLAY, or the current arena index for SPECTATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardPayload {
    pub kind: u32,
    pub value: u32,
}

impl Payload for OnboardPayload {}

/// SCORE: defined for protocol completeness; the server folds scores into
/// UPDATE records instead of emitting this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorePayload {
    pub player_id: u32,
    pub score: u32,
}

impl Payload for ScorePayload {}

/// COORDINATES and FORCE_MOVE share this layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinatesPayload {
    pub player_id: u32,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub barrel_rotation: f32,
}

impl Payload for CoordinatesPayload {}

/// SHOOT: sent by a client with `projectile_id` and `sender_id` zeroed,
/// rebroadcast by the server with both filled in. For lobbed kinds the
/// `vx`/`vy` pair carries the target point instead of a velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShootPayload {
    pub projectile_id: u32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub kind: u32,
    pub sender_id: u32,
}

impl Payload for ShootPayload {}

/// One per-player record inside an UPDATE snapshot. Records are concatenated
/// back to back; the count is inferred from the payload length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub player_id: u32,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub barrel_rotation: f32,
    pub score: u32,
    pub ready: bool,
    pub has_won: bool,
}

impl UpdateRecord {
    /// Serialized size: five u32/f32 fields plus two single-byte bools.
    pub const SIZE: usize = 26;

    pub fn encode_all(records: &[UpdateRecord]) -> Vec<u8> {
        let mut out = Vec::with_capacity(records.len() * Self::SIZE);
        for record in records {
            out.extend_from_slice(&record.to_bytes());
        }
        out
    }

    /// Decodes as many whole records as the payload holds; a trailing
    /// partial record is dropped.
    pub fn decode_all(payload: &[u8]) -> Result<Vec<UpdateRecord>, ProtocolError> {
        payload
            .chunks_exact(Self::SIZE)
            .map(UpdateRecord::from_bytes)
            .collect()
    }
}

impl Payload for UpdateRecord {}

/// HIT: which projectile removed which player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitPayload {
    pub projectile_id: u32,
    pub victim_id: u32,
}

impl Payload for HitPayload {}

/// LIFECYCLE_CHANGE: new state plus its phase-dependent context value
/// (deadline timestamp, connection count, winner id or arena index).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LifecyclePayload {
    pub state: u32,
    pub context: f64,
}

impl Payload for LifecyclePayload {}

/// READY: lobby ready toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub ready: bool,
}

impl Payload for ReadyPayload {}
