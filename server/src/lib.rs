//! # Arena Server Library
//!
//! Authoritative simulation server for the tank arena game. The server owns
//! the single source of truth for player positions, projectile state and
//! match progression, and streams state snapshots to every connected client
//! over UDP.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Projectile physics, hit detection and match lifecycle decisions are all
//! made here. Clients render optimistically and reconcile against the
//! server's snapshots and event broadcasts.
//!
//! ### Session Management
//! Handles the full lifetime of a player session:
//! - Admission while the lobby is open, spectator queueing while a match
//!   is running
//! - Position, aim and ready-state updates from ordinary traffic
//! - Explicit disconnects and liveness timeouts
//!
//! ### State Broadcasting
//! A 20 Hz network loop broadcasts a fixed-layout UPDATE snapshot of every
//! session, re-evaluates the match lifecycle, and sweeps stale connections.
//! A separate 60 Hz physics loop integrates projectiles and broadcasts hit
//! events as they happen.
//!
//! ## Architecture
//!
//! All mutable game state is owned by a single event loop; network tasks
//! decode inbound datagrams and drain the outbound queue, communicating
//! with the loop over channels. State access therefore needs no locks.
//!
//! ## Module Organization
//!
//! - [`arena`]: textual tile-grid maps, collider and spawn-point extraction,
//!   random arena selection
//! - [`registry`]: session registry with spectator queue and liveness sweep
//! - [`lifecycle`]: the match state machine (waiting room, countdown,
//!   rounds, decisive win)
//! - [`engine`]: projectile integration, wall bounces, lobbed arrivals and
//!   hit detection
//! - [`network`]: UDP transport, packet handling and the two periodic loops

pub mod arena;
pub mod engine;
pub mod lifecycle;
pub mod network;
pub mod registry;
pub mod util;
