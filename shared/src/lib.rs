use serde::{Deserialize, Serialize};

pub mod protocol;

pub use protocol::{
    ConnectPayload, CoordinatesPayload, DisconnectPayload, HitPayload, LifecyclePayload,
    OnboardPayload, Packet, PacketType, Payload, ProtocolError, ReadyPayload, ScorePayload,
    ShootPayload, UpdateRecord, HEADER_SIZE, MAGIC_NUMBER, NAME_LEN,
};

pub const WORLD_WIDTH: f32 = 1080.0;
pub const WORLD_HEIGHT: f32 = 720.0;
pub const PLAYER_SIZE: f32 = 16.0;
pub const PROJECTILE_SIZE: f32 = 8.0;
pub const PROJECTILE_BASE_SPEED: f32 = 200.0;
pub const GRACE_PERIOD: f32 = 0.15;
pub const BUFF_SIZE: usize = 1024;

/// Match phase as carried in LIFECYCLE_CHANGE packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum LifecycleState {
    Starting = 1,
    Playing = 2,
    WaitingRoom = 3,
    NewRound = 4,
    Done = 5,
}

impl LifecycleState {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Starting),
            2 => Some(Self::Playing),
            3 => Some(Self::WaitingRoom),
            4 => Some(Self::NewRound),
            5 => Some(Self::Done),
            _ => None,
        }
    }

    /// Phases in which a hit does not kill the victim.
    pub fn is_non_lethal(self) -> bool {
        matches!(self, Self::WaitingRoom | Self::Starting)
    }
}

/// Weapon/projectile family. The discriminants are wire values shared with
/// the client and with interactable map tiles (digit characters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum ProjectileKind {
    Laser = 1,
    Bullet = 2,
    Shockwave = 3,
    Sniper = 4,
    Cluster = 5,
}

impl ProjectileKind {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Laser),
            2 => Some(Self::Bullet),
            3 => Some(Self::Shockwave),
            4 => Some(Self::Sniper),
            5 => Some(Self::Cluster),
            _ => None,
        }
    }

    pub fn speed(self) -> f32 {
        match self {
            Self::Laser | Self::Shockwave => PROJECTILE_BASE_SPEED * 2.0,
            Self::Sniper => PROJECTILE_BASE_SPEED * 3.0,
            Self::Bullet | Self::Cluster => PROJECTILE_BASE_SPEED,
        }
    }

    pub fn initial_bounces(self) -> i32 {
        match self {
            Self::Laser => 2,
            Self::Bullet => 3,
            Self::Sniper => 4,
            // Lobbed shots never bounce; the single "bounce" is spent on arrival.
            Self::Shockwave | Self::Cluster => 1,
        }
    }

    pub fn is_lobbed(self) -> bool {
        matches!(self, Self::Shockwave | Self::Cluster)
    }

    pub fn radius(self) -> f32 {
        match self {
            Self::Shockwave | Self::Cluster => 64.0,
            _ => 0.0,
        }
    }

    pub fn hurts(self) -> bool {
        !matches!(self, Self::Shockwave)
    }
}

/// How the server answered a CONNECT request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum OnboardKind {
    Play = 1,
    Spectate = 2,
}

impl OnboardKind {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Play),
            2 => Some(Self::Spectate),
            _ => None,
        }
    }
}

pub fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// AABB overlap test on `(x, y, w, h)` rectangles. Edges that merely touch
/// do not count as overlapping.
pub fn rects_overlap(a: (f32, f32, f32, f32), b: (f32, f32, f32, f32)) -> bool {
    let (x1, y1, w1, h1) = a;
    let (x2, y2, w2, h2) = b;

    let overlap_x = x1 < x2 + w2 && x2 < x1 + w1;
    let overlap_y = y1 < y2 + h2 && y2 < y1 + h1;
    overlap_x && overlap_y
}
