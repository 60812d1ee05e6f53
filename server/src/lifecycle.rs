//! Match lifecycle state machine.
//!
//! The sole writer of the global match phase. Evaluated once per network
//! tick against a snapshot of the registry; transition side effects that
//! touch the network (broadcasts, force moves, spectator flush) are applied
//! by the server loop when `evaluate` reports a change.
//!
//! `context` is phase-dependent: a unix-seconds deadline during STARTING and
//! NEW_ROUND, the connection count in WAITING_ROOM, the winner's player id
//! in DONE, and the chosen arena index on entry into PLAYING.

use crate::arena::ArenaSet;
use crate::registry::SessionRegistry;
use log::info;
use shared::LifecycleState;

/// Countdown before a match starts once everyone is ready.
pub const WAITING_TIME: f64 = 5.0;
/// Pause between rounds.
pub const ROUND_INTERVAL: f64 = 5.0;
/// How long the DONE screen holds before the lobby reopens.
pub const GAME_INTERVAL: f64 = 10.0;
/// First score to reach this wins the game.
pub const DECISIVE_SCORE: u32 = 5;

pub struct Lifecycle {
    state: LifecycleState,
    context: f64,
    new_game_deadline: f64,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::WaitingRoom,
            context: 0.0,
            new_game_deadline: 0.0,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn context(&self) -> f64 {
        self.context
    }

    /// New players are admitted directly only while the match has not begun;
    /// everyone else waits in the spectator queue.
    pub fn allows_join(&self) -> bool {
        matches!(
            self.state,
            LifecycleState::WaitingRoom | LifecycleState::Starting
        )
    }

    /// Runs one evaluation pass and reports the new state if it changed.
    pub fn evaluate(
        &mut self,
        registry: &mut SessionRegistry,
        arenas: &mut ArenaSet,
        now: f64,
    ) -> Option<LifecycleState> {
        let old = self.state;
        self.advance(registry, arenas, now);

        if self.state != old {
            info!(
                "lifecycle {:?} -> {:?} (context {})",
                old, self.state, self.context
            );
            Some(self.state)
        } else {
            None
        }
    }

    fn advance(&mut self, registry: &mut SessionRegistry, arenas: &mut ArenaSet, now: f64) {
        if self.state == LifecycleState::WaitingRoom {
            if !registry.is_empty() && registry.all_ready() {
                self.state = LifecycleState::Starting;
                self.context = now + WAITING_TIME;
            }
            return;
        }

        // An empty registry, or anyone backing out of ready, collapses every
        // other phase back to the lobby. This outranks score and alive-count
        // driven transitions.
        if registry.is_empty() || !registry.all_ready() {
            self.enter_waiting_room(registry, arenas);
            return;
        }

        match self.state {
            LifecycleState::Playing => {
                let alive = registry.alive_count();
                if alive == 1 {
                    if let Some(survivor) = registry.connections_mut().find(|conn| conn.alive) {
                        survivor.score += 1;
                    }
                    self.state = LifecycleState::NewRound;
                    self.context = now + ROUND_INTERVAL;
                } else if alive == 0 {
                    // Mutual destruction: new round, nobody scores.
                    self.state = LifecycleState::NewRound;
                    self.context = now + ROUND_INTERVAL;
                    return;
                }

                if let Some(winner) = registry
                    .connections_mut()
                    .find(|conn| conn.score >= DECISIVE_SCORE)
                {
                    winner.wins += 1;
                    let winner_id = winner.id;
                    arenas.reset_to_waiting_room();
                    self.state = LifecycleState::Done;
                    self.context = winner_id as f64;
                    self.new_game_deadline = now + GAME_INTERVAL;
                }
            }
            LifecycleState::Done => {
                if now >= self.new_game_deadline {
                    self.enter_waiting_room(registry, arenas);
                }
            }
            LifecycleState::Starting | LifecycleState::NewRound => {
                if now >= self.context {
                    self.state = LifecycleState::Playing;
                    let arena_index = arenas.choose_for(registry.len());
                    self.context = arena_index as f64;
                }
            }
            LifecycleState::WaitingRoom => unreachable!("handled above"),
        }
    }

    fn enter_waiting_room(&mut self, registry: &SessionRegistry, arenas: &mut ArenaSet) {
        self.state = LifecycleState::WaitingRoom;
        self.context = registry.len() as f64;
        arenas.reset_to_waiting_room();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{Arena, WAITING_ROOM_ID};
    use shared::ConnectPayload;
    use std::net::SocketAddr;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn arenas() -> ArenaSet {
        let waiting_room = Arena::parse("@@@@@@@@").unwrap();
        let battle = Arena::parse("#@@@@#").unwrap();
        ArenaSet::new(vec![waiting_room, battle]).unwrap()
    }

    fn registry_with(count: u16, ready: bool) -> SessionRegistry {
        let mut registry = SessionRegistry::new();
        for port in 0..count {
            registry.onboard(addr(5000 + port), &ConnectPayload::from_name("p"));
        }
        if ready {
            for conn in registry.connections_mut() {
                conn.ready = true;
            }
        }
        registry
    }

    #[test]
    fn test_empty_lobby_does_not_start() {
        let mut lifecycle = Lifecycle::new();
        let mut registry = SessionRegistry::new();
        let mut arenas = arenas();

        assert_eq!(lifecycle.evaluate(&mut registry, &mut arenas, 100.0), None);
        assert_eq!(lifecycle.state(), LifecycleState::WaitingRoom);
    }

    #[test]
    fn test_all_ready_starts_countdown() {
        let mut lifecycle = Lifecycle::new();
        let mut registry = registry_with(2, true);
        let mut arenas = arenas();

        let changed = lifecycle.evaluate(&mut registry, &mut arenas, 100.0);
        assert_eq!(changed, Some(LifecycleState::Starting));
        assert_eq!(lifecycle.context(), 100.0 + WAITING_TIME);
    }

    #[test]
    fn test_unready_player_blocks_start() {
        let mut lifecycle = Lifecycle::new();
        let mut registry = registry_with(2, false);
        let mut arenas = arenas();

        assert_eq!(lifecycle.evaluate(&mut registry, &mut arenas, 100.0), None);
        assert_eq!(lifecycle.state(), LifecycleState::WaitingRoom);
    }

    #[test]
    fn test_countdown_elapses_into_playing() {
        let mut lifecycle = Lifecycle::new();
        let mut registry = registry_with(2, true);
        let mut arenas = arenas();

        lifecycle.evaluate(&mut registry, &mut arenas, 100.0);
        // Before the deadline nothing moves.
        assert_eq!(lifecycle.evaluate(&mut registry, &mut arenas, 102.0), None);

        let changed = lifecycle.evaluate(&mut registry, &mut arenas, 100.0 + WAITING_TIME);
        assert_eq!(changed, Some(LifecycleState::Playing));

        // Chosen arena must seat everyone and never be the waiting room.
        let index = lifecycle.context() as usize;
        assert_ne!(index, WAITING_ROOM_ID);
        assert_eq!(index, arenas.current_index());
        assert!(arenas.current().max_players() >= registry.len());
    }

    #[test]
    fn test_unready_collapses_countdown() {
        let mut lifecycle = Lifecycle::new();
        let mut registry = registry_with(2, true);
        let mut arenas = arenas();

        lifecycle.evaluate(&mut registry, &mut arenas, 100.0);
        registry.connections_mut().next().unwrap().ready = false;

        let changed = lifecycle.evaluate(&mut registry, &mut arenas, 101.0);
        assert_eq!(changed, Some(LifecycleState::WaitingRoom));
        assert_eq!(lifecycle.context(), 2.0);
    }

    fn playing_lifecycle(registry: &mut SessionRegistry, arenas: &mut ArenaSet) -> Lifecycle {
        let mut lifecycle = Lifecycle::new();
        lifecycle.evaluate(registry, arenas, 100.0);
        lifecycle.evaluate(registry, arenas, 100.0 + WAITING_TIME);
        assert_eq!(lifecycle.state(), LifecycleState::Playing);
        lifecycle
    }

    #[test]
    fn test_lone_survivor_scores_and_new_round() {
        let mut registry = registry_with(2, true);
        let mut arenas = arenas();
        let mut lifecycle = playing_lifecycle(&mut registry, &mut arenas);

        registry.connections_mut().next().unwrap().alive = false;

        let now = 200.0;
        let changed = lifecycle.evaluate(&mut registry, &mut arenas, now);
        assert_eq!(changed, Some(LifecycleState::NewRound));
        assert_eq!(lifecycle.context(), now + ROUND_INTERVAL);

        let survivor_score: u32 = registry
            .connections()
            .filter(|conn| conn.alive)
            .map(|conn| conn.score)
            .sum();
        assert_eq!(survivor_score, 1);
    }

    #[test]
    fn test_mutual_destruction_scores_nobody() {
        let mut registry = registry_with(2, true);
        let mut arenas = arenas();
        let mut lifecycle = playing_lifecycle(&mut registry, &mut arenas);

        for conn in registry.connections_mut() {
            conn.alive = false;
        }

        let changed = lifecycle.evaluate(&mut registry, &mut arenas, 200.0);
        assert_eq!(changed, Some(LifecycleState::NewRound));
        assert!(registry.connections().all(|conn| conn.score == 0));
    }

    #[test]
    fn test_decisive_score_ends_game() {
        let mut registry = registry_with(2, true);
        let mut arenas = arenas();
        let mut lifecycle = playing_lifecycle(&mut registry, &mut arenas);

        let winner_id = {
            let conn = registry.connections_mut().next().unwrap();
            conn.score = DECISIVE_SCORE;
            conn.id
        };

        let changed = lifecycle.evaluate(&mut registry, &mut arenas, 200.0);
        assert_eq!(changed, Some(LifecycleState::Done));
        assert_eq!(lifecycle.context(), winner_id as f64);
        assert_eq!(arenas.current_index(), WAITING_ROOM_ID);

        let winner = registry.by_id_mut(winner_id).unwrap();
        assert_eq!(winner.wins, 1);
    }

    #[test]
    fn test_final_round_win_outranks_new_round() {
        // The survivor's round point is also the decisive one; the match
        // must end in DONE, not linger in NEW_ROUND.
        let mut registry = registry_with(2, true);
        let mut arenas = arenas();
        let mut lifecycle = playing_lifecycle(&mut registry, &mut arenas);

        let mut ids = Vec::new();
        for conn in registry.connections_mut() {
            ids.push(conn.id);
            conn.score = DECISIVE_SCORE - 1;
        }
        let loser_id = ids[0];
        registry.by_id_mut(loser_id).unwrap().alive = false;

        let changed = lifecycle.evaluate(&mut registry, &mut arenas, 200.0);
        assert_eq!(changed, Some(LifecycleState::Done));
        assert_ne!(lifecycle.context() as u32, loser_id);
    }

    #[test]
    fn test_done_holds_until_game_interval() {
        let mut registry = registry_with(2, true);
        let mut arenas = arenas();
        let mut lifecycle = playing_lifecycle(&mut registry, &mut arenas);

        registry.connections_mut().next().unwrap().score = DECISIVE_SCORE;
        lifecycle.evaluate(&mut registry, &mut arenas, 200.0);
        assert_eq!(lifecycle.state(), LifecycleState::Done);

        assert_eq!(lifecycle.evaluate(&mut registry, &mut arenas, 205.0), None);

        let changed = lifecycle.evaluate(&mut registry, &mut arenas, 200.0 + GAME_INTERVAL);
        assert_eq!(changed, Some(LifecycleState::WaitingRoom));
    }

    #[test]
    fn test_empty_registry_collapses_from_any_phase() {
        for setup in [
            LifecycleState::Starting,
            LifecycleState::Playing,
            LifecycleState::NewRound,
            LifecycleState::Done,
        ] {
            let mut registry = registry_with(2, true);
            let mut arenas = arenas();
            let mut lifecycle = Lifecycle::new();

            lifecycle.evaluate(&mut registry, &mut arenas, 100.0);
            if setup != LifecycleState::Starting {
                lifecycle.evaluate(&mut registry, &mut arenas, 100.0 + WAITING_TIME);
            }
            if setup == LifecycleState::NewRound {
                for conn in registry.connections_mut() {
                    conn.alive = false;
                }
                lifecycle.evaluate(&mut registry, &mut arenas, 110.0);
            }
            if setup == LifecycleState::Done {
                registry.connections_mut().next().unwrap().score = DECISIVE_SCORE;
                lifecycle.evaluate(&mut registry, &mut arenas, 110.0);
            }
            assert_eq!(lifecycle.state(), setup);

            let mut empty = SessionRegistry::new();
            let changed = lifecycle.evaluate(&mut empty, &mut arenas, 111.0);
            assert_eq!(changed, Some(LifecycleState::WaitingRoom), "from {:?}", setup);
            assert_eq!(lifecycle.context(), 0.0);
            assert_eq!(arenas.current_index(), WAITING_ROOM_ID);
        }
    }

    #[test]
    fn test_allows_join_only_before_match() {
        let mut lifecycle = Lifecycle::new();
        assert!(lifecycle.allows_join());

        let mut registry = registry_with(1, true);
        let mut arenas = arenas();
        lifecycle.evaluate(&mut registry, &mut arenas, 100.0);
        assert!(lifecycle.allows_join());

        lifecycle.evaluate(&mut registry, &mut arenas, 100.0 + WAITING_TIME);
        assert_eq!(lifecycle.state(), LifecycleState::Playing);
        assert!(!lifecycle.allows_join());
    }
}
