//! End-to-end scenarios for the viewport grid.
//!
//! Drives `GridRenderer` and `MapSession` against an in-memory region store
//! and the headless backend, the way the frame loop does.
//!
//! Run with: `cargo test --test grid_scenarios`

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use worldmap::config::{GridConfig, MapConfig};
use worldmap::coord::{MapType, TileKey, TilePosition, WorldId};
use worldmap::region::RegionImageStore;
use worldmap::render::{DrawStepCache, GridRenderer, MapContext, RenderContext};
use worldmap::session::MapSession;
use worldmap::texture::HeadlessBackend;

// ============================================================================
// Test Helpers
// ============================================================================

const WORLD: WorldId = WorldId(7);

fn grid(size: u32) -> GridRenderer {
    let store = Arc::new(RegionImageStore::in_memory(WORLD));
    let ctx = RenderContext::new(store, &MapConfig::default()).unwrap();
    let steps = Arc::new(DrawStepCache::new(ctx, Duration::from_secs(30)));
    let config = GridConfig {
        size,
        ..GridConfig::default()
    };
    GridRenderer::new(steps, &config)
}

fn day() -> MapContext {
    MapContext::new(WORLD, MapType::day(0))
}

fn serials(grid: &GridRenderer) -> HashMap<TilePosition, (TileKey, u64)> {
    grid.tiles()
        .map(|(position, tile)| (position, (tile.key(), tile.serial())))
        .collect()
}

// ============================================================================
// Grid Layout
// ============================================================================

#[test]
fn test_grid_of_five_covers_twenty_five_tiles() {
    let mut grid = grid(5);
    assert!(grid.recenter(0, 0, 0, day()).unwrap());

    let tiles: Vec<_> = grid.tiles().collect();
    assert_eq!(tiles.len(), 25);

    let keys: HashSet<TileKey> = tiles.iter().map(|(_, tile)| tile.key()).collect();
    assert_eq!(keys.len(), 25);

    for (position, tile) in &tiles {
        assert!((-2..=2).contains(&position.delta_x));
        assert!((-2..=2).contains(&position.delta_z));
        assert_eq!(
            tile.key(),
            TileKey::new(position.delta_x, position.delta_z, 0)
        );
    }

    let center = grid.tile_at(TilePosition::new(0, 0)).unwrap();
    assert!(TilePosition::new(0, 0).is_center());
    assert_eq!(center.key(), TileKey::new(0, 0, 0));
    assert_eq!(grid.center_key(), Some(TileKey::new(0, 0, 0)));
}

#[test]
fn test_negative_center_tile() {
    let mut grid = grid(3);
    grid.recenter(-1, -513, 2, day()).unwrap();
    assert_eq!(grid.center_key(), Some(TileKey::new(-1, -5, 2)));
    assert_eq!(
        grid.tile_at(TilePosition::new(1, -1)).unwrap().key(),
        TileKey::new(0, -6, 2)
    );
}

// ============================================================================
// Recentering
// ============================================================================

#[test]
fn test_recenter_same_center_keeps_tile_identity() {
    let mut grid = grid(5);
    grid.recenter(100, -40, 1, day()).unwrap();
    let before = serials(&grid);

    assert!(!grid.recenter(100, -40, 1, day()).unwrap());
    assert!(!grid.recenter(100, -40, 1, day()).unwrap());
    assert_eq!(serials(&grid), before);
}

#[test]
fn test_recenter_by_one_tile_shifts_and_reuses() {
    let mut grid = grid(5);
    grid.recenter(0, 0, 0, day()).unwrap();
    let before: HashMap<TileKey, u64> = serials(&grid).into_values().collect();

    assert!(grid.recenter(512, 0, 0, day()).unwrap());
    let after: HashMap<TileKey, u64> = serials(&grid).into_values().collect();

    let kept = after
        .iter()
        .filter(|(key, serial)| before.get(key) == Some(serial))
        .count();
    assert_eq!(kept, 20);
    assert_eq!(
        grid.tile_at(TilePosition::new(0, 0)).unwrap().key(),
        TileKey::new(1, 0, 0)
    );
}

#[test]
fn test_zoom_change_rebuilds_tiles() {
    let mut grid = grid(3);
    grid.recenter(0, 0, 0, day()).unwrap();
    assert!(grid.recenter(0, 0, 1, day()).unwrap());
    assert!(grid.tiles().all(|(_, tile)| tile.key().zoom == 1));
}

#[test]
fn test_world_switch_never_reuses_tiles() {
    let mut grid = grid(3);
    grid.recenter(0, 0, 0, day()).unwrap();
    let before: HashSet<u64> = serials(&grid).into_values().map(|(_, s)| s).collect();

    let other = MapContext::new(WorldId(8), MapType::day(0));
    assert!(grid.recenter(0, 0, 0, other).unwrap());
    assert!(grid
        .tiles()
        .all(|(_, tile)| tile.world() == WorldId(8) && !before.contains(&tile.serial())));
}

// ============================================================================
// Frame Loop
// ============================================================================

#[test]
fn test_session_frames_converge_to_textured_grid() {
    let store = Arc::new(RegionImageStore::in_memory(WORLD));
    let config = MapConfig::default().with_grid_size(3).unwrap();
    let mut session = MapSession::new(store, config).unwrap();
    let mut backend = HeadlessBackend::new(1024, 768);
    session.recenter(0, 0, 0, day()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut report = session.frame(&mut backend, MapType::day(0), 1024, 768, 1.0);
    while report.placeholders > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
        backend.begin_frame();
        report = session.frame(&mut backend, MapType::day(0), 1024, 768, 1.0);
    }

    // Block (0, 0) sits mid screen, so the bottom row falls below the screen.
    assert_eq!(session.grid().center_pixel_offset(), (512, 384));
    assert_eq!(report.placeholders, 0);
    assert_eq!(report.visible, 6);
    assert_eq!(report.offscreen, 3);
    assert_eq!(report.drawn, 6);
    assert!(!session.grid().has_unloaded_tile());
}

#[test]
fn test_purge_drops_cached_steps() {
    let store = Arc::new(RegionImageStore::in_memory(WORLD));
    let mut session = MapSession::new(store, MapConfig::default()).unwrap();
    let mut backend = HeadlessBackend::new(800, 600);
    session.recenter(0, 0, 0, day()).unwrap();
    session.frame(&mut backend, MapType::day(0), 800, 600, 1.0);
    assert!(!session.steps().is_empty());

    session.purge();
    assert!(session.steps().is_empty());
    assert_eq!(session.grid().tiles().count(), 0);
}
