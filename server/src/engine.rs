//! Projectile simulation engine.
//!
//! Advances every in-flight projectile each physics tick, resolves
//! collisions against the active arena and against players, and reports hit
//! events for broadcast. Direct projectiles travel along a velocity vector
//! and bounce off walls; lobbed projectiles fly toward a fixed target point
//! and resolve an area effect on arrival.

use crate::arena::Arena;
use crate::registry::SessionRegistry;
use log::debug;
use shared::{
    distance, rects_overlap, LifecycleState, ProjectileKind, GRACE_PERIOD, PLAYER_SIZE,
    PROJECTILE_BASE_SPEED, PROJECTILE_SIZE, WORLD_HEIGHT, WORLD_WIDTH,
};
use std::collections::{HashMap, HashSet};

/// How a projectile moves. The wire protocol overloads one float pair for
/// both cases; the tagged variant keeps the two meanings apart in the
/// simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    Direct { velocity: (f32, f32) },
    Lobbed { target: (f32, f32) },
}

#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: u32,
    pub kind: ProjectileKind,
    pub position: (f32, f32),
    pub motion: Motion,
    pub speed: f32,
    pub remaining_bounces: i32,
    pub grace_period: f32,
    pub sender_id: u32,
    pub radius: f32,
    pub hurts: bool,
}

impl Projectile {
    pub fn new(
        id: u32,
        kind: ProjectileKind,
        position: (f32, f32),
        aim: (f32, f32),
        sender_id: u32,
    ) -> Self {
        let motion = if kind.is_lobbed() {
            Motion::Lobbed { target: aim }
        } else {
            Motion::Direct { velocity: aim }
        };

        Self {
            id,
            kind,
            position,
            motion,
            speed: kind.speed(),
            remaining_bounces: kind.initial_bounces(),
            grace_period: GRACE_PERIOD,
            sender_id,
            radius: kind.radius(),
            hurts: kind.hurts(),
        }
    }

    fn rect(&self) -> (f32, f32, f32, f32) {
        (
            self.position.0,
            self.position.1,
            PROJECTILE_SIZE,
            PROJECTILE_SIZE,
        )
    }

    /// Stale cleanup: far enough outside the world that it can never come
    /// back (no colliders out there to bounce off).
    fn is_out_of_scope(&self) -> bool {
        let (x, y) = self.position;
        x < -WORLD_WIDTH || x > 2.0 * WORLD_WIDTH || y < -WORLD_HEIGHT || y > 2.0 * WORLD_HEIGHT
    }
}

/// A projectile striking a player, for the HIT broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitEvent {
    pub projectile_id: u32,
    pub victim_id: u32,
}

#[derive(Default)]
pub struct Engine {
    projectiles: HashMap<u32, Projectile>,
    next_projectile_id: u32,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a projectile from a SHOOT intent and returns its id. For
    /// lobbed kinds `aim` is the destination point, otherwise a unit
    /// velocity vector.
    pub fn spawn(
        &mut self,
        kind: ProjectileKind,
        position: (f32, f32),
        aim: (f32, f32),
        sender_id: u32,
    ) -> u32 {
        let id = self.next_projectile_id;
        self.next_projectile_id += 1;

        self.projectiles
            .insert(id, Projectile::new(id, kind, position, aim, sender_id));
        id
    }

    pub fn len(&self) -> usize {
        self.projectiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projectiles.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&Projectile> {
        self.projectiles.get(&id)
    }

    pub fn clear(&mut self) {
        self.projectiles.clear();
    }

    /// One physics tick: integrate motion, bounce, resolve arrivals and
    /// player hits. Returned events have already been applied to the
    /// registry (victims marked dead unless the phase is non-lethal).
    pub fn step(
        &mut self,
        registry: &mut SessionRegistry,
        arena: &Arena,
        state: LifecycleState,
        dt: f32,
    ) -> Vec<HitEvent> {
        let mut events = self.advance_projectiles(registry, arena, state, dt);
        events.extend(self.resolve_direct_hits(registry, state));
        events
    }

    fn advance_projectiles(
        &mut self,
        registry: &mut SessionRegistry,
        arena: &Arena,
        state: LifecycleState,
        dt: f32,
    ) -> Vec<HitEvent> {
        let colliders: Vec<(f32, f32, f32, f32)> =
            arena.colliders().map(|tile| tile.rect()).collect();

        let mut events = Vec::new();
        let mut arrivals = Vec::new();
        let mut to_remove = HashSet::new();

        let ids: Vec<u32> = self.projectiles.keys().copied().collect();
        for id in ids {
            let proj = match self.projectiles.get_mut(&id) {
                Some(proj) => proj,
                None => continue,
            };

            proj.grace_period = (proj.grace_period - dt).max(0.0);

            match proj.motion {
                Motion::Lobbed { target } => {
                    if advance_lobbed(proj, target, dt) {
                        arrivals.push(id);
                    }
                }
                Motion::Direct { velocity } => {
                    advance_direct(proj, velocity, &colliders, dt);
                    if let Some(kind) = interactable_contact(arena, proj.rect()) {
                        convert_weapon(registry, proj.sender_id, kind);
                        proj.remaining_bounces = 0;
                    }
                }
            }

            if proj.is_out_of_scope() {
                debug!("projectile {} left the world, dropping", id);
                to_remove.insert(id);
            }
        }

        for id in arrivals {
            events.extend(self.resolve_arrival(registry, arena, state, id, &mut to_remove));
        }

        self.projectiles
            .retain(|id, proj| proj.remaining_bounces > 0 && !to_remove.contains(id));

        events
    }

    /// Area resolution for a lobbed projectile that reached its target.
    fn resolve_arrival(
        &mut self,
        registry: &mut SessionRegistry,
        arena: &Arena,
        state: LifecycleState,
        id: u32,
        to_remove: &mut HashSet<u32>,
    ) -> Vec<HitEvent> {
        let (kind, target, radius, hurts, sender_id, grace_period) =
            match self.projectiles.get(&id) {
                Some(proj) => (
                    proj.kind,
                    proj.position,
                    proj.radius,
                    proj.hurts,
                    proj.sender_id,
                    proj.grace_period,
                ),
                None => return Vec::new(),
            };

        let size = PROJECTILE_SIZE;
        if let Some(pickup) = interactable_contact(arena, (target.0, target.1, size, size)) {
            convert_weapon(registry, sender_id, pickup);
        }

        if kind == ProjectileKind::Shockwave {
            for other in self.projectiles.values() {
                // Weapon pickups convert to sniper shots; those outlive the
                // blast.
                if other.id != id
                    && other.kind != ProjectileKind::Sniper
                    && distance(other.position, target) < radius
                {
                    to_remove.insert(other.id);
                }
            }
        }

        let mut events = Vec::new();
        if hurts {
            let non_lethal = state.is_non_lethal();
            for conn in registry.connections_mut().filter(|conn| conn.alive) {
                if conn.id == sender_id && grace_period > 0.0 {
                    continue;
                }

                // Matches the client's sprite anchor: reported positions sit
                // one player-box below and right of the visual center.
                let center = (conn.position.0 - PLAYER_SIZE, conn.position.1 - PLAYER_SIZE);
                if distance(center, target) < radius {
                    conn.alive = non_lethal;
                    events.push(HitEvent {
                        projectile_id: id,
                        victim_id: conn.id,
                    });
                }
            }
        }

        events
    }

    /// AABB hit test of every direct projectile against every alive player.
    fn resolve_direct_hits(
        &mut self,
        registry: &mut SessionRegistry,
        state: LifecycleState,
    ) -> Vec<HitEvent> {
        let non_lethal = state.is_non_lethal();
        let mut events = Vec::new();
        let mut hit_projectiles = Vec::new();

        for proj in self
            .projectiles
            .values()
            .filter(|proj| matches!(proj.motion, Motion::Direct { .. }))
        {
            for conn in registry.connections_mut().filter(|conn| conn.alive) {
                if conn.id == proj.sender_id && proj.grace_period > 0.0 {
                    continue;
                }

                let player_rect = (conn.position.0, conn.position.1, PLAYER_SIZE, PLAYER_SIZE);
                if rects_overlap(proj.rect(), player_rect) {
                    hit_projectiles.push(proj.id);
                    conn.alive = non_lethal;
                    events.push(HitEvent {
                        projectile_id: proj.id,
                        victim_id: conn.id,
                    });
                }
            }
        }

        for id in hit_projectiles {
            self.projectiles.remove(&id);
        }

        events
    }
}

/// Moves a lobbed projectile straight toward its target. Returns true on
/// arrival (remaining distance coverable within this tick), consuming the
/// projectile's single bounce.
fn advance_lobbed(proj: &mut Projectile, target: (f32, f32), dt: f32) -> bool {
    let dist = distance(proj.position, target);
    let magnitude = proj.speed * dt;

    if dist < magnitude {
        proj.position = target;
        proj.remaining_bounces -= 1;
        return true;
    }

    let direction = ((target.0 - proj.position.0) / dist, (target.1 - proj.position.1) / dist);
    proj.position = (
        proj.position.0 + direction.0 * magnitude,
        proj.position.1 + direction.1 * magnitude,
    );
    false
}

/// Integrates a direct projectile with axis-separated wall reflection. A
/// reflected axis recomputes its step at the base speed constant rather
/// than the projectile's own speed, faithfully to the original tuning, and
/// a colliding tick consumes one bounce.
fn advance_direct(
    proj: &mut Projectile,
    velocity: (f32, f32),
    colliders: &[(f32, f32, f32, f32)],
    dt: f32,
) {
    let (x, y) = proj.position;
    let (mut vx, mut vy) = velocity;
    let size = PROJECTILE_SIZE;

    let mut new_x = x + vx * dt * proj.speed;
    let mut new_y = y + vy * dt * proj.speed;
    let mut collided = false;

    if colliders
        .iter()
        .any(|rect| rects_overlap((x, new_y, size, size), *rect))
    {
        collided = true;
        vy = -vy;
        new_y = y + vy * dt * PROJECTILE_BASE_SPEED;
    }

    if colliders
        .iter()
        .any(|rect| rects_overlap((new_x, y, size, size), *rect))
    {
        collided = true;
        vx = -vx;
        new_x = x + vx * dt * PROJECTILE_BASE_SPEED;
    }

    proj.motion = Motion::Direct { velocity: (vx, vy) };
    proj.position = (new_x, new_y);

    if collided {
        proj.remaining_bounces -= 1;
    }
}

fn interactable_contact(arena: &Arena, rect: (f32, f32, f32, f32)) -> Option<ProjectileKind> {
    arena
        .interactables()
        .find(|tile| rects_overlap(rect, tile.rect()))
        .and_then(|tile| tile.interactable)
}

fn convert_weapon(registry: &mut SessionRegistry, player_id: u32, kind: ProjectileKind) {
    if let Some(conn) = registry.by_id_mut(player_id) {
        debug!("player {} weapon converted to {:?}", player_id, kind);
        conn.weapon = kind;
    }
}
