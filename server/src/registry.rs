//! Session registry: endpoint identity to player session mapping.
//!
//! Owns onboarding (monotonic player ids), liveness tracking and eviction,
//! plus the spectator queue for peers that connect while the match is
//! closed to new players. Ordinary traffic counts as liveness; there is no
//! dedicated heartbeat packet.

use log::info;
use shared::{ConnectPayload, ProjectileKind};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// How long a connection may stay silent before the sweep evicts it.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5);

/// A playable session. Owned exclusively by the registry; mutated only by
/// the protocol handlers and the lifecycle state machine.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: u32,
    pub addr: SocketAddr,
    pub name: String,
    pub position: (f32, f32),
    pub rotation: f32,
    pub barrel_rotation: f32,
    pub score: u32,
    pub alive: bool,
    pub ready: bool,
    pub wins: u32,
    /// Active weapon slot; swapped by interactable-tile pickups.
    pub weapon: ProjectileKind,
    pub last_seen: Instant,
}

impl Connection {
    pub fn new(id: u32, addr: SocketAddr, name: String) -> Self {
        Self {
            id,
            addr,
            name,
            position: (0.0, 0.0),
            rotation: 0.0,
            barrel_rotation: 0.0,
            score: 0,
            alive: true,
            ready: false,
            wins: 0,
            weapon: ProjectileKind::Bullet,
            last_seen: Instant::now(),
        }
    }

    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    /// Resolves which projectile kind a SHOOT intent actually fires. A
    /// converted weapon slot overrides the requested kind for one shot,
    /// then reverts to the default.
    pub fn fire_weapon(&mut self, requested: ProjectileKind) -> ProjectileKind {
        if self.weapon == ProjectileKind::Bullet {
            requested
        } else {
            std::mem::replace(&mut self.weapon, ProjectileKind::Bullet)
        }
    }
}

/// A connected peer awaiting admission, kept with its original CONNECT
/// payload so it can be onboarded unchanged when the lobby reopens.
#[derive(Debug, Clone)]
pub struct Spectator {
    pub payload: ConnectPayload,
    pub addr: SocketAddr,
}

pub struct SessionRegistry {
    connections: HashMap<SocketAddr, Connection>,
    spectators: Vec<Spectator>,
    next_player_id: u32,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            spectators: Vec::new(),
            next_player_id: 1,
        }
    }

    /// Admits a peer as a playable session and returns its id. Ids increase
    /// monotonically from 1 and are never reused; a duplicate CONNECT from
    /// an already-admitted address re-onboards it under a fresh id.
    pub fn onboard(&mut self, addr: SocketAddr, payload: &ConnectPayload) -> u32 {
        let id = self.next_player_id;
        self.next_player_id += 1;

        let name = payload.name();
        info!("player {} ({}) onboarded from {}", id, name, addr);
        self.connections
            .insert(addr, Connection::new(id, addr, name));
        id
    }

    pub fn queue_spectator(&mut self, payload: ConnectPayload, addr: SocketAddr) {
        info!("queueing spectator from {}", addr);
        self.spectators.push(Spectator { payload, addr });
    }

    /// Removes a connection, returning its id for the disconnect broadcast.
    pub fn evict(&mut self, addr: SocketAddr) -> Option<u32> {
        self.connections.remove(&addr).map(|conn| {
            info!("player {} disconnected", conn.id);
            conn.id
        })
    }

    pub fn remove_spectator(&mut self, addr: SocketAddr) -> bool {
        let before = self.spectators.len();
        self.spectators.retain(|spectator| spectator.addr != addr);
        self.spectators.len() != before
    }

    /// Marks the peer as alive. Returns false for unknown endpoints so the
    /// caller can drop the datagram.
    pub fn touch(&mut self, addr: SocketAddr) -> bool {
        if let Some(conn) = self.connections.get_mut(&addr) {
            conn.last_seen = Instant::now();
            true
        } else {
            false
        }
    }

    pub fn get_mut(&mut self, addr: SocketAddr) -> Option<&mut Connection> {
        self.connections.get_mut(&addr)
    }

    pub fn get(&self, addr: SocketAddr) -> Option<&Connection> {
        self.connections.get(&addr)
    }

    pub fn by_id_mut(&mut self, player_id: u32) -> Option<&mut Connection> {
        self.connections
            .values_mut()
            .find(|conn| conn.id == player_id)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn connections_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.values_mut()
    }

    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.connections.keys().copied().collect()
    }

    pub fn spectator_addrs(&self) -> Vec<SocketAddr> {
        self.spectators.iter().map(|s| s.addr).collect()
    }

    pub fn drain_spectators(&mut self) -> Vec<Spectator> {
        std::mem::take(&mut self.spectators)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn spectator_count(&self) -> usize {
        self.spectators.len()
    }

    pub fn all_ready(&self) -> bool {
        self.connections.values().all(|conn| conn.ready)
    }

    pub fn alive_count(&self) -> usize {
        self.connections.values().filter(|conn| conn.alive).count()
    }

    pub fn resurrect_all(&mut self) {
        for conn in self.connections.values_mut() {
            conn.alive = true;
        }
    }

    pub fn reset_scores(&mut self) {
        for conn in self.connections.values_mut() {
            conn.score = 0;
        }
    }

    /// Evicts every connection whose last traffic is older than `timeout`
    /// and returns their ids so disconnects can be broadcast.
    pub fn sweep_stale(&mut self, timeout: Duration) -> Vec<u32> {
        let stale: Vec<SocketAddr> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.is_stale(timeout))
            .map(|(addr, _)| *addr)
            .collect();

        stale
            .into_iter()
            .filter_map(|addr| self.evict(addr))
            .collect()
    }
}
