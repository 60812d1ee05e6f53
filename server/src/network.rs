//! UDP transport, packet handling and the two periodic server loops.

use crate::arena::ArenaSet;
use crate::engine::Engine;
use crate::lifecycle::Lifecycle;
use crate::registry::{SessionRegistry, CLEANUP_INTERVAL};
use crate::util::{normalize, now_secs};
use log::{debug, error, info, warn};
use shared::{
    ConnectPayload, CoordinatesPayload, DisconnectPayload, HitPayload, LifecyclePayload,
    OnboardKind, OnboardPayload, Packet, PacketType, Payload, ProjectileKind, ReadyPayload,
    ShootPayload, UpdateRecord, BUFF_SIZE,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

/// Messages sent from network tasks to the main server loop.
#[derive(Debug)]
pub enum ServerMessage {
    Datagram {
        packet: Packet,
        addr: SocketAddr,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages queued by the main loop for the sender task. Broadcasts carry
/// their own recipient list so the sender never touches the registry.
#[derive(Debug)]
pub enum OutboundMessage {
    Send {
        data: Vec<u8>,
        addr: SocketAddr,
    },
    Broadcast {
        data: Vec<u8>,
        addrs: Vec<SocketAddr>,
    },
}

/// Authoritative game server. All mutable state (registry, projectile
/// engine, lifecycle, arena selection) is owned by the main loop; network
/// tasks only move bytes through channels.
pub struct Server {
    socket: Arc<UdpSocket>,
    registry: SessionRegistry,
    engine: Engine,
    lifecycle: Lifecycle,
    arenas: ArenaSet,
    network_tick: Duration,
    physics_tick: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        arenas: ArenaSet,
        network_rate: u32,
        physics_rate: u32,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            registry: SessionRegistry::new(),
            engine: Engine::new(),
            lifecycle: Lifecycle::new(),
            arenas,
            network_tick: Duration::from_secs_f64(1.0 / f64::from(network_rate)),
            physics_tick: Duration::from_secs_f64(1.0 / f64::from(physics_rate)),
            server_tx,
            server_rx,
            outbound_tx,
            outbound_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }

    /// Spawns the task that listens for inbound datagrams and decodes them.
    /// Malformed datagrams are logged and dropped; the loop never dies on
    /// peer input.
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; BUFF_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Packet::decode(&buffer[..len]) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::Datagram { packet, addr })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("dropping datagram from {}: {}", addr, e);
                        }
                    },
                    Err(e) => {
                        error!("error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that drains the outbound queue onto the socket.
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut outbound_rx = std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match message {
                    OutboundMessage::Send { data, addr } => {
                        if let Err(e) = socket.send_to(&data, addr).await {
                            error!("failed to send to {}: {}", addr, e);
                        }
                    }
                    OutboundMessage::Broadcast { data, addrs } => {
                        for addr in addrs {
                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("failed to send to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    fn send_to(&self, packet: &Packet, addr: SocketAddr) {
        if let Err(e) = self.outbound_tx.send(OutboundMessage::Send {
            data: packet.encode(),
            addr,
        }) {
            error!("failed to queue packet: {}", e);
        }
    }

    /// Queues a packet for every connection and every waiting spectator.
    fn broadcast(&self, packet: &Packet) {
        let mut addrs = self.registry.addrs();
        addrs.extend(self.registry.spectator_addrs());

        if let Err(e) = self.outbound_tx.send(OutboundMessage::Broadcast {
            data: packet.encode(),
            addrs,
        }) {
            error!("failed to queue broadcast: {}", e);
        }
    }

    /// Applies one decoded packet to the game state. Unknown packet types
    /// and undecodable payloads are ignored.
    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        let kind = match packet.kind() {
            Some(kind) => kind,
            None => {
                debug!("unknown packet type {} from {}", packet.packet_type, addr);
                return;
            }
        };

        match kind {
            PacketType::Connect => {
                let payload = match ConnectPayload::from_bytes(&packet.payload) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("bad CONNECT payload from {}: {}", addr, e);
                        return;
                    }
                };

                if self.lifecycle.allows_join() {
                    self.onboard_player(payload, addr);
                } else {
                    self.registry.queue_spectator(payload, addr);
                    let reply = Packet::new(
                        PacketType::Onboard,
                        1,
                        OnboardPayload {
                            kind: OnboardKind::Spectate as u32,
                            value: self.arenas.current_index() as u32,
                        }
                        .to_bytes(),
                    );
                    self.send_to(&reply, addr);
                }
                return;
            }
            PacketType::Disconnect => {
                if let Some(player_id) = self.registry.evict(addr) {
                    let notice = Packet::new(
                        PacketType::Disconnect,
                        0,
                        DisconnectPayload { player_id }.to_bytes(),
                    );
                    self.broadcast(&notice);
                } else {
                    self.registry.remove_spectator(addr);
                }
                return;
            }
            _ => {}
        }

        // Everything below requires an admitted session; traffic from an
        // admitted address also counts as liveness.
        if !self.registry.touch(addr) {
            return;
        }

        match kind {
            PacketType::Coordinates => {
                if let Ok(payload) = CoordinatesPayload::from_bytes(&packet.payload) {
                    if let Some(conn) = self.registry.get_mut(addr) {
                        conn.position = (payload.x, payload.y);
                        conn.rotation = payload.rotation;
                        conn.barrel_rotation = payload.barrel_rotation;
                    }
                }
            }
            PacketType::Ready => {
                if let Ok(payload) = ReadyPayload::from_bytes(&packet.payload) {
                    if let Some(conn) = self.registry.get_mut(addr) {
                        conn.ready = payload.ready;
                    }
                }
            }
            PacketType::Shoot => {
                if let Ok(payload) = ShootPayload::from_bytes(&packet.payload) {
                    self.handle_shoot(payload, addr);
                }
            }
            _ => {}
        }
    }

    fn onboard_player(&mut self, payload: ConnectPayload, addr: SocketAddr) {
        let player_id = self.registry.onboard(addr, &payload);
        let reply = Packet::new(
            PacketType::Onboard,
            1,
            OnboardPayload {
                kind: OnboardKind::Play as u32,
                value: player_id,
            }
            .to_bytes(),
        );
        self.send_to(&reply, addr);
    }

    /// Spawns the projectile server-side and rebroadcasts the intent with
    /// the authoritative projectile id, kind and sender id filled in.
    fn handle_shoot(&mut self, payload: ShootPayload, addr: SocketAddr) {
        let requested = match ProjectileKind::from_u32(payload.kind) {
            Some(kind) => kind,
            None => {
                debug!("ignoring shot with unknown kind {} from {}", payload.kind, addr);
                return;
            }
        };

        let (kind, sender_id) = match self.registry.get_mut(addr) {
            Some(conn) => (conn.fire_weapon(requested), conn.id),
            None => return,
        };

        // For lobbed kinds the vector is a target point; for direct kinds
        // it must be a unit velocity, which peers don't get to fudge.
        let (vx, vy) = if kind.is_lobbed() {
            (payload.vx, payload.vy)
        } else {
            normalize(payload.vx, payload.vy)
        };

        let projectile_id = self
            .engine
            .spawn(kind, (payload.x, payload.y), (vx, vy), sender_id);

        let announce = Packet::new(
            PacketType::Shoot,
            0,
            ShootPayload {
                projectile_id,
                x: payload.x,
                y: payload.y,
                vx,
                vy,
                kind: kind as u32,
                sender_id,
            }
            .to_bytes(),
        );
        self.broadcast(&announce);
    }

    /// One network tick: state snapshot, lifecycle evaluation, liveness
    /// sweep.
    fn network_tick(&mut self) {
        self.broadcast_update();
        self.check_lifecycle();
        self.sweep_stale_connections();
    }

    /// Broadcasts the periodic UPDATE snapshot, one fixed-size record per
    /// connection in registry iteration order.
    fn broadcast_update(&mut self) {
        let records: Vec<UpdateRecord> = self
            .registry
            .connections()
            .map(|conn| UpdateRecord {
                player_id: conn.id,
                x: conn.position.0,
                y: conn.position.1,
                rotation: conn.rotation,
                barrel_rotation: conn.barrel_rotation,
                score: conn.score,
                ready: conn.ready,
                has_won: conn.wins > 0,
            })
            .collect();

        let packet = Packet::new(PacketType::Update, 0, UpdateRecord::encode_all(&records));
        self.broadcast(&packet);
    }

    /// Re-evaluates the lifecycle and runs the transition side effects:
    /// broadcast the change, respawn everyone on round start, flush the
    /// spectator queue when the lobby reopens.
    fn check_lifecycle(&mut self) {
        let new_state =
            match self
                .lifecycle
                .evaluate(&mut self.registry, &mut self.arenas, now_secs())
            {
                Some(state) => state,
                None => return,
            };

        let notice = Packet::new(
            PacketType::LifecycleChange,
            0,
            LifecyclePayload {
                state: new_state as u32,
                context: self.lifecycle.context(),
            }
            .to_bytes(),
        );
        self.broadcast(&notice);

        use shared::LifecycleState::*;
        match new_state {
            Playing | Done => {
                self.engine.clear();
                self.registry.resurrect_all();
                self.move_players_to_spawns();
            }
            WaitingRoom => {
                self.registry.reset_scores();
                for spectator in self.registry.drain_spectators() {
                    info!("promoting spectator from {}", spectator.addr);
                    self.onboard_player(spectator.payload, spectator.addr);
                }
            }
            _ => {}
        }
    }

    /// Round-robin over the arena's spawn points, wrapping so the player
    /// count may exceed the number of slots.
    fn move_players_to_spawns(&mut self) {
        let spawns = self.arenas.current().spawn_positions.clone();
        if spawns.is_empty() {
            return;
        }

        let mut moves = Vec::new();
        for (i, conn) in self.registry.connections_mut().enumerate() {
            let position = spawns[i % spawns.len()];
            conn.position = position;
            moves.push((conn.id, conn.addr, position));
        }

        for (player_id, addr, position) in moves {
            let packet = Packet::new(
                PacketType::ForceMove,
                0,
                CoordinatesPayload {
                    player_id,
                    x: position.0,
                    y: position.1,
                    rotation: 0.0,
                    barrel_rotation: 0.0,
                }
                .to_bytes(),
            );
            self.send_to(&packet, addr);
        }
    }

    /// Evicts connections that have gone silent and tells everyone else.
    fn sweep_stale_connections(&mut self) {
        for player_id in self.registry.sweep_stale(CLEANUP_INTERVAL) {
            info!("player {} timed out", player_id);
            let notice = Packet::new(
                PacketType::Disconnect,
                0,
                DisconnectPayload { player_id }.to_bytes(),
            );
            self.broadcast(&notice);
        }
    }

    /// One physics tick: advance projectiles and broadcast any hits.
    fn physics_tick(&mut self, dt: f32) {
        let events = self.engine.step(
            &mut self.registry,
            self.arenas.current(),
            self.lifecycle.state(),
            dt,
        );

        for event in events {
            let packet = Packet::new(
                PacketType::Hit,
                0,
                HitPayload {
                    projectile_id: event.projectile_id,
                    victim_id: event.victim_id,
                }
                .to_bytes(),
            );
            self.broadcast(&packet);
        }
    }

    /// Main server loop. Inbound packets and both periodic ticks are
    /// serialized through this single task, so state access needs no locks.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();

        let mut network_interval = interval(self.network_tick);
        let mut physics_interval = interval(self.physics_tick);
        let mut last_physics = Instant::now();

        info!("server started");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::Datagram { packet, addr }) => {
                            self.handle_packet(packet, addr);
                        }
                        Some(ServerMessage::Shutdown) | None => {
                            info!("server shutting down");
                            break;
                        }
                    }
                },

                _ = network_interval.tick() => {
                    self.network_tick();
                },

                _ = physics_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_physics).as_secs_f32();
                    last_physics = now;
                    self.physics_tick(dt);
                },
            }
        }

        Ok(())
    }
}
