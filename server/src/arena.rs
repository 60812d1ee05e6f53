//! Arena model: immutable tile grids loaded once at startup.
//!
//! Maps are textual grids where each character is one tile: `#` is a wall,
//! `@` a spawn marker, digits `1`-`5` are weapon-pickup (interactable) tiles
//! carrying the projectile kind of that wire value, anything else is floor.
//! Tiles are stretched so every map fills the fixed world dimensions.

use log::info;
use rand::seq::SliceRandom;
use shared::{ProjectileKind, WORLD_HEIGHT, WORLD_WIDTH};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Index of the dedicated waiting-room map (first file in sorted order).
/// It must have spawn points and no colliders.
pub const WAITING_ROOM_ID: usize = 0;

#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("arena map is empty")]
    EmptyMap,
    #[error("arena directory {0} contains no maps")]
    NoArenas(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub has_collision: bool,
    pub interactable: Option<ProjectileKind>,
}

impl Tile {
    pub fn rect(&self) -> (f32, f32, f32, f32) {
        (self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Clone)]
pub struct Arena {
    /// Grid width in tiles.
    pub width: usize,
    /// Grid height in tiles.
    pub height: usize,
    pub tiles: Vec<Tile>,
    pub spawn_positions: Vec<(f32, f32)>,
}

impl Arena {
    pub fn parse(text: &str) -> Result<Self, ArenaError> {
        let rows: Vec<&str> = text.lines().map(str::trim_end).filter(|l| !l.is_empty()).collect();
        if rows.is_empty() {
            return Err(ArenaError::EmptyMap);
        }

        let grid_height = rows.len();
        let grid_width = rows[0].chars().count();
        if grid_width == 0 {
            return Err(ArenaError::EmptyMap);
        }

        let tile_width = WORLD_WIDTH / grid_width as f32;
        let tile_height = WORLD_HEIGHT / grid_height as f32;

        let mut tiles = Vec::with_capacity(grid_width * grid_height);
        let mut spawn_positions = Vec::new();

        for (row_index, row) in rows.iter().enumerate() {
            for (col_index, symbol) in row.chars().enumerate() {
                let x = tile_width * col_index as f32;
                let y = tile_height * row_index as f32;

                if symbol == '@' {
                    spawn_positions.push((x, y));
                }

                tiles.push(Tile {
                    x,
                    y,
                    width: tile_width,
                    height: tile_height,
                    has_collision: symbol == '#',
                    interactable: symbol
                        .to_digit(10)
                        .and_then(ProjectileKind::from_u32),
                });
            }
        }

        Ok(Self {
            width: grid_width,
            height: grid_height,
            tiles,
            spawn_positions,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ArenaError> {
        let text = fs::read_to_string(path).map_err(|source| ArenaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn colliders(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter().filter(|tile| tile.has_collision)
    }

    pub fn interactables(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter().filter(|tile| tile.interactable.is_some())
    }

    /// Spawn-point capacity; how many players this arena can seat.
    pub fn max_players(&self) -> usize {
        self.spawn_positions.len()
    }
}

/// All loaded arenas plus the index of the active one. The active arena is
/// only changed by the lifecycle state machine.
#[derive(Debug, Clone)]
pub struct ArenaSet {
    arenas: Vec<Arena>,
    current: usize,
}

impl ArenaSet {
    pub fn new(arenas: Vec<Arena>) -> Result<Self, ArenaError> {
        if arenas.is_empty() {
            return Err(ArenaError::NoArenas(String::from("<memory>")));
        }
        Ok(Self {
            arenas,
            current: WAITING_ROOM_ID,
        })
    }

    /// Loads every map in `dir`, sorted by filename so indices are stable.
    pub fn load_dir(dir: &Path) -> Result<Self, ArenaError> {
        let entries = fs::read_dir(dir).map_err(|source| ArenaError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        let mut arenas = Vec::with_capacity(paths.len());
        for path in &paths {
            arenas.push(Arena::load(path)?);
        }

        if arenas.is_empty() {
            return Err(ArenaError::NoArenas(dir.display().to_string()));
        }

        info!("loaded {} arenas from {}", arenas.len(), dir.display());
        Self::new(arenas)
    }

    pub fn current(&self) -> &Arena {
        &self.arenas[self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.arenas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arenas.is_empty()
    }

    pub fn reset_to_waiting_room(&mut self) {
        self.current = WAITING_ROOM_ID;
    }

    /// Picks a random arena whose spawn capacity covers `player_count`,
    /// never the waiting room. Falls back to the roomiest map when no arena
    /// is large enough.
    pub fn choose_for(&mut self, player_count: usize) -> usize {
        let eligible: Vec<usize> = self
            .arenas
            .iter()
            .enumerate()
            .filter(|(index, arena)| {
                *index != WAITING_ROOM_ID && arena.max_players() >= player_count
            })
            .map(|(index, _)| index)
            .collect();

        let chosen = eligible
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or_else(|| self.roomiest_arena());

        self.current = chosen;
        chosen
    }

    fn roomiest_arena(&self) -> usize {
        self.arenas
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != WAITING_ROOM_ID)
            .max_by_key(|(_, arena)| arena.max_players())
            .map(|(index, _)| index)
            .unwrap_or(WAITING_ROOM_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const MAP: &str = "\
####
#@1#
#@.#
####";

    fn arena() -> Arena {
        Arena::parse(MAP).unwrap()
    }

    #[test]
    fn test_parse_dimensions() {
        let arena = arena();
        assert_eq!(arena.width, 4);
        assert_eq!(arena.height, 4);
        assert_eq!(arena.tiles.len(), 16);
    }

    #[test]
    fn test_tile_size_fills_world() {
        let arena = arena();
        let tile = &arena.tiles[0];
        assert_approx_eq!(tile.width, WORLD_WIDTH / 4.0, 0.001);
        assert_approx_eq!(tile.height, WORLD_HEIGHT / 4.0, 0.001);
    }

    #[test]
    fn test_colliders_and_spawns() {
        let arena = arena();
        assert_eq!(arena.colliders().count(), 12);
        assert_eq!(arena.spawn_positions.len(), 2);
        assert_eq!(arena.max_players(), 2);

        let tile_w = WORLD_WIDTH / 4.0;
        let tile_h = WORLD_HEIGHT / 4.0;
        assert_approx_eq!(arena.spawn_positions[0].0, tile_w, 0.001);
        assert_approx_eq!(arena.spawn_positions[0].1, tile_h, 0.001);
    }

    #[test]
    fn test_interactable_tile_kind() {
        let arena = arena();
        let pickups: Vec<_> = arena.interactables().collect();
        assert_eq!(pickups.len(), 1);
        assert_eq!(pickups[0].interactable, Some(ProjectileKind::Laser));
        assert!(!pickups[0].has_collision);
    }

    #[test]
    fn test_unmapped_digit_is_floor() {
        let arena = Arena::parse("@9@").unwrap();
        assert_eq!(arena.interactables().count(), 0);
        assert_eq!(arena.colliders().count(), 0);
    }

    #[test]
    fn test_parse_empty_map() {
        assert!(matches!(Arena::parse(""), Err(ArenaError::EmptyMap)));
        assert!(matches!(Arena::parse("\n\n"), Err(ArenaError::EmptyMap)));
    }

    #[test]
    fn test_arena_set_selection_respects_capacity() {
        let waiting_room = Arena::parse("@@@@@@@@").unwrap();
        let small = Arena::parse("#@@#").unwrap();
        let large = Arena::parse("#@@@@#").unwrap();
        let mut set = ArenaSet::new(vec![waiting_room, small, large]).unwrap();

        // Four players only fit in the large arena (index 2).
        for _ in 0..10 {
            assert_eq!(set.choose_for(4), 2);
        }
        assert_eq!(set.current_index(), 2);
    }

    #[test]
    fn test_arena_set_never_picks_waiting_room() {
        let waiting_room = Arena::parse("@@@@@@@@").unwrap();
        let small = Arena::parse("#@@#").unwrap();
        let mut set = ArenaSet::new(vec![waiting_room, small]).unwrap();

        for _ in 0..10 {
            assert_ne!(set.choose_for(2), WAITING_ROOM_ID);
        }
    }

    #[test]
    fn test_arena_set_overflow_falls_back_to_roomiest() {
        let waiting_room = Arena::parse("@@@@@@@@").unwrap();
        let small = Arena::parse("#@@#").unwrap();
        let large = Arena::parse("#@@@@#").unwrap();
        let mut set = ArenaSet::new(vec![waiting_room, small, large]).unwrap();

        assert_eq!(set.choose_for(100), 2);
    }

    #[test]
    fn test_reset_to_waiting_room() {
        let waiting_room = Arena::parse("@@@@@@@@").unwrap();
        let small = Arena::parse("#@@#").unwrap();
        let mut set = ArenaSet::new(vec![waiting_room, small]).unwrap();

        set.choose_for(1);
        assert_ne!(set.current_index(), WAITING_ROOM_ID);
        set.reset_to_waiting_room();
        assert_eq!(set.current_index(), WAITING_ROOM_ID);
    }

    #[test]
    fn test_shipped_arenas_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../arenas");
        let set = ArenaSet::load_dir(&dir).unwrap();

        assert!(set.len() >= 2);
        // The waiting room must be harmless: spawns, no walls.
        let waiting_room = set.current();
        assert_eq!(set.current_index(), WAITING_ROOM_ID);
        assert!(waiting_room.max_players() >= 2);
        assert_eq!(waiting_room.colliders().count(), 0);
    }
}
