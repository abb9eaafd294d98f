//! WorldService – lifecycle, startup loading and the public query surface
//! handed to gameplay managers.
//!
//! ```text
//! load()  ──►  Initialized  ──load_heightmaps()──►  Ready  ──shutdown()──►  Stopped
//! ```
//!
//! Topology and table failures during `load` are fatal. Heightmap problems
//! only log a warning; the affected world keeps zero heights.

use crate::data::{DataLayout, TableSource};
use crate::error::WorldError;
use crate::object::{Category, GameObject, ObjId, Transform};
use crate::protocol::GamePacket;
use crate::query::ProximityQuery;
use crate::registry::ObjectRegistry;
use crate::shape::AreaShape;
use crate::terrain::HeightGrid;
use crate::topology::{Region, Topology, World};
use crate::types::{Vec3, WorldId, WorldServiceConfig, WorldStats, ZoneId};
use crate::visibility::{VisibilityChanges, VisibilityTracker};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Lifecycle & lookups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    /// Topology and tables loaded, heightmaps not yet.
    Initialized,
    /// Accepting spawns, moves and queries.
    Ready,
    Stopped,
}

/// Group a world-interaction id belongs to (`wi_group_wis`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldInteractionGroup(pub u32);

/// Outcome of a height lookup. Keeps "heightmaps are off" apart from
/// "heightmaps are on but had nothing for this point".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeightLookup {
    Sampled(f32),
    Disabled,
    Unavailable,
}

/// What a character should be re-shown after its client dropped its view
/// (for example when leaving a cutscene).
#[derive(Debug, Default, Clone)]
pub struct VisibleObjects {
    pub units: Vec<Arc<GameObject>>,
    pub doodads: Vec<Arc<GameObject>>,
}

impl VisibleObjects {
    /// Doodads split into packet-sized batches of at most `per_packet`.
    pub fn doodad_batches(&self, per_packet: usize) -> std::slice::Chunks<'_, Arc<GameObject>> {
        self.doodads.chunks(per_packet.max(1))
    }
}

/// Radius used when re-sending a character's surroundings.
pub const RESEND_RADIUS: f32 = 1000.0;

impl HeightLookup {
    pub fn or(self, fallback: f32) -> f32 {
        match self {
            HeightLookup::Sampled(h) => h,
            HeightLookup::Disabled | HeightLookup::Unavailable => fallback,
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct WorldService {
    config: WorldServiceConfig,
    layout: DataLayout,
    state: RwLock<ServiceState>,
    topology: Arc<Topology>,
    registry: ObjectRegistry,
    tracker: VisibilityTracker,
    query: ProximityQuery,
    interaction_groups: HashMap<u32, WorldInteractionGroup>,
    area_shapes: HashMap<u32, AreaShape>,
    snowing: AtomicBool,
}

impl std::fmt::Debug for WorldService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WorldService {
    /// Read `worlds.json`, every world's `zones.json` and the startup tables.
    pub fn load(config: WorldServiceConfig, tables: &dyn TableSource) -> Result<Self, WorldError> {
        info!("Loading world data from {}", config.data_dir.display());
        let layout = DataLayout::new(config.data_dir.clone());

        let defs = layout.load_worlds()?;
        let topology = Topology::build(defs, |def| layout.load_zones(&def.name))?;
        Self::from_topology(config, topology, tables)
    }

    /// Assemble a service around an already built topology.
    pub fn from_topology(
        config: WorldServiceConfig,
        topology: Topology,
        tables: &dyn TableSource,
    ) -> Result<Self, WorldError> {
        let mut interaction_groups = HashMap::new();
        for row in tables.world_interaction_groups()? {
            if interaction_groups
                .insert(row.wi_id, WorldInteractionGroup(row.wi_group_id))
                .is_some()
            {
                return Err(WorldError::Table {
                    table: "wi_group_wis",
                    message: format!("duplicate wi_id {}", row.wi_id),
                });
            }
        }

        let mut area_shapes = HashMap::new();
        for row in tables.area_shapes()? {
            area_shapes.entry(row.id).or_insert_with(|| AreaShape::from(row));
        }

        let topology = Arc::new(topology);
        info!(
            "Loaded {} worlds, {} zones, {} interaction groups, {} area shapes",
            topology.world_count(),
            topology.zone_count(),
            interaction_groups.len(),
            area_shapes.len()
        );

        Ok(Self {
            layout: DataLayout::new(config.data_dir.clone()),
            snowing: AtomicBool::new(config.snowing),
            config,
            state: RwLock::new(ServiceState::Initialized),
            tracker: VisibilityTracker::new(topology.clone()),
            query: ProximityQuery::new(topology.clone()),
            topology,
            registry: ObjectRegistry::new(),
            interaction_groups,
            area_shapes,
        })
    }

    /// Read each world's `hmap.dat` (when enabled) and move to `Ready`.
    ///
    /// Returns the number of worlds that got a heightmap.
    pub fn load_heightmaps(&self) -> Result<usize, WorldError> {
        self.expect_state(ServiceState::Initialized)?;

        let mut loaded = 0;
        if self.config.heightmaps_enabled {
            info!("Loading heightmaps...");
            for world in self.topology.worlds() {
                let path = self.layout.heightmap_file(&world.name);
                if !path.exists() {
                    warn!("Heightmap for {} doesn't exist at {}", world.name, path.display());
                    continue;
                }
                match HeightGrid::load(&path, world.cell_x, world.cell_y, world.max_height) {
                    Ok(grid) => {
                        if world.install_heights(grid) {
                            info!("Heightmap {} loaded", world.name);
                            loaded += 1;
                        }
                    }
                    Err(e) => warn!("{}: heightmap skipped: {}", world.name, e),
                }
            }
            info!("Heightmaps loaded ({}/{})", loaded, self.topology.world_count());
        } else {
            debug!("Heightmaps disabled, skipping");
        }

        *self.state.write() = ServiceState::Ready;
        Ok(loaded)
    }

    /// Pull every registered entity out of the grid and drop the registry.
    pub fn shutdown(&self) {
        let mut state = self.state.write();
        if *state == ServiceState::Stopped {
            return;
        }
        for obj in self.registry.all(Category::Object) {
            self.tracker.remove_visible_object(Some(&obj));
        }
        self.registry.clear();
        *state = ServiceState::Stopped;
        info!("World service stopped");
    }

    pub fn state(&self) -> ServiceState {
        *self.state.read()
    }

    fn expect_state(&self, expected: ServiceState) -> Result<(), WorldError> {
        let actual = self.state();
        if actual == expected {
            Ok(())
        } else {
            Err(WorldError::InvalidState { expected, actual })
        }
    }

    pub fn config(&self) -> &WorldServiceConfig {
        &self.config
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &VisibilityTracker {
        &self.tracker
    }

    pub fn query(&self) -> &ProximityQuery {
        &self.query
    }

    // -----------------------------------------------------------------------
    // World / zone lookups
    // -----------------------------------------------------------------------

    pub fn world(&self, world_id: WorldId) -> Option<Arc<World>> {
        self.topology.world(world_id).cloned()
    }

    pub fn worlds(&self) -> Vec<Arc<World>> {
        self.topology.worlds().cloned().collect()
    }

    pub fn world_by_zone(&self, zone_id: ZoneId) -> Option<Arc<World>> {
        self.topology.world_by_zone(zone_id).cloned()
    }

    pub fn zone_id(&self, world_id: WorldId, x: f32, y: f32) -> ZoneId {
        self.topology.zone_id(world_id, x, y)
    }

    pub fn valid_region(&self, world_id: WorldId, x: i32, y: i32) -> bool {
        self.topology.valid_region(world_id, x, y)
    }

    pub fn neighbors(&self, world_id: WorldId, x: i32, y: i32) -> Vec<Arc<Region>> {
        self.topology.neighbors(world_id, x, y)
    }

    /// Region under `obj`'s root ancestor.
    pub fn region_of(&self, obj: &Arc<GameObject>) -> Option<Arc<Region>> {
        self.tracker.region_for(obj)
    }

    pub fn world_interaction_group(&self, wi_id: u32) -> Option<WorldInteractionGroup> {
        self.interaction_groups.get(&wi_id).copied()
    }

    pub fn area_shape(&self, shape_id: u32) -> Option<AreaShape> {
        self.area_shapes.get(&shape_id).copied()
    }

    // -----------------------------------------------------------------------
    // Heights
    // -----------------------------------------------------------------------

    pub fn lookup_height(&self, world_id: WorldId, x: f32, y: f32) -> HeightLookup {
        if !self.config.heightmaps_enabled {
            return HeightLookup::Disabled;
        }
        match self.topology.world(world_id).and_then(|w| w.height_at(x, y)) {
            Some(h) => HeightLookup::Sampled(h),
            None => HeightLookup::Unavailable,
        }
    }

    /// Height at a point of the world owning `zone_id`; 0 when it can't be
    /// answered for any reason.
    pub fn height_by_zone(&self, zone_id: ZoneId, x: f32, y: f32) -> f32 {
        let Some(world) = self.topology.world_by_zone(zone_id) else {
            return 0.0;
        };
        self.lookup_height(world.id, x, y).or(0.0)
    }

    /// Ground height under a placement. Falls back to the placement's own z
    /// when heightmaps are off, and to 0 when they are on but the point has
    /// no sample.
    pub fn height_for_transform(&self, transform: &Transform) -> f32 {
        let position = transform.position;
        match self.lookup_height(transform.world_id, position.x, position.y) {
            HeightLookup::Sampled(h) => h,
            HeightLookup::Disabled => position.z,
            HeightLookup::Unavailable => 0.0,
        }
    }

    /// Ground height under an entity's world position.
    pub fn height_for(&self, obj: &Arc<GameObject>) -> f32 {
        self.height_for_transform(&obj.world_transform())
    }

    // -----------------------------------------------------------------------
    // Entity lifecycle
    // -----------------------------------------------------------------------

    /// See [`ObjectRegistry::add_object`]: the first registration of an id
    /// wins.
    pub fn add_object(&self, obj: Option<Arc<GameObject>>) -> bool {
        self.registry.add_object(obj)
    }

    pub fn remove_object(&self, obj: Option<&GameObject>) {
        self.registry.remove_object(obj);
    }

    pub fn add_visible_object(&self, obj: Option<&Arc<GameObject>>) -> VisibilityChanges {
        self.tracker.add_visible_object(obj)
    }

    pub fn remove_visible_object(&self, obj: Option<&Arc<GameObject>>) -> VisibilityChanges {
        self.tracker.remove_visible_object(obj)
    }

    /// Register and place a new entity.
    pub fn spawn(&self, obj: &Arc<GameObject>) -> Result<VisibilityChanges, WorldError> {
        self.expect_state(ServiceState::Ready)?;
        self.registry.add_object(Some(Arc::clone(obj)));
        Ok(self.tracker.add_visible_object(Some(obj)))
    }

    /// Reposition an entity and propagate any Region crossing.
    pub fn move_object(
        &self,
        obj: &Arc<GameObject>,
        position: Vec3,
    ) -> Result<VisibilityChanges, WorldError> {
        self.expect_state(ServiceState::Ready)?;
        obj.set_position(position);
        Ok(self.tracker.add_visible_object(Some(obj)))
    }

    /// Take an entity out of the grid and the registry.
    pub fn despawn(&self, obj: &Arc<GameObject>) -> Result<VisibilityChanges, WorldError> {
        self.expect_state(ServiceState::Ready)?;
        let changes = self.tracker.remove_visible_object(Some(obj));
        self.registry.remove_object(Some(obj));
        Ok(changes)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn around(&self, obj: &GameObject, category: Category) -> Vec<Arc<GameObject>> {
        self.query.around(obj, category)
    }

    pub fn around_radius(
        &self,
        obj: &Arc<GameObject>,
        category: Category,
        radius: f32,
        use_model_size: bool,
    ) -> Vec<Arc<GameObject>> {
        self.query.around_radius(obj, category, radius, use_model_size)
    }

    pub fn around_by_shape(
        &self,
        obj: &Arc<GameObject>,
        category: Category,
        shape: &AreaShape,
    ) -> Result<Vec<Arc<GameObject>>, WorldError> {
        self.query.around_by_shape(obj, category, shape)
    }

    pub fn in_cell(
        &self,
        world_id: WorldId,
        category: Category,
        x: i32,
        y: i32,
    ) -> Vec<Arc<GameObject>> {
        self.query.in_cell(world_id, category, x, y)
    }

    /// Units and doodads within [`RESEND_RADIUS`] of `character`, to be shown
    /// to it again. Empty while `character` is unplaced.
    pub fn resend_visible_objects(&self, character: &Arc<GameObject>) -> VisibleObjects {
        let units = self
            .query
            .around_radius(character, Category::Unit, RESEND_RADIUS, false);
        let doodads = self
            .query
            .around_radius(character, Category::Doodad, RESEND_RADIUS, false);
        debug!(
            "Re-sent {} units and {} doodads to {}",
            units.len(),
            doodads.len(),
            character.obj_id
        );
        VisibleObjects { units, doodads }
    }

    pub fn character_by_name(&self, name: &str) -> Option<Arc<GameObject>> {
        self.registry.character_by_name(name)
    }

    pub fn objects_by_owner(&self, owner_id: u32) -> Vec<Arc<GameObject>> {
        self.registry.objects_by_owner(owner_id)
    }

    pub fn object(&self, obj_id: ObjId) -> Option<Arc<GameObject>> {
        self.registry.object(obj_id)
    }

    // -----------------------------------------------------------------------
    // Broadcasts
    // -----------------------------------------------------------------------

    fn broadcast(&self, packet: &GamePacket, keep: impl Fn(&GameObject) -> bool) -> usize {
        self.registry
            .filter(Category::Character, keep)
            .iter()
            .filter(|c| c.send_packet(packet))
            .count()
    }

    /// Characters born on the same continent as `race`. Returns the number
    /// of deliveries.
    pub fn broadcast_to_nation(&self, packet: &GamePacket, race: u8) -> usize {
        let continent = nation_of(race);
        self.broadcast(packet, |c| nation_of(c.race) == continent)
    }

    pub fn broadcast_to_faction(&self, packet: &GamePacket, faction_mother_id: u32) -> usize {
        self.broadcast(packet, |c| c.faction_mother_id == faction_mother_id)
    }

    /// Characters standing in any of `zone_keys` (a zone group).
    pub fn broadcast_to_zones(&self, packet: &GamePacket, zone_keys: &HashSet<ZoneId>) -> usize {
        self.broadcast(packet, |c| zone_keys.contains(&c.transform().zone_id))
    }

    pub fn broadcast_to_server(&self, packet: &GamePacket) -> usize {
        self.broadcast(packet, |_| true)
    }

    // -----------------------------------------------------------------------
    // Weather
    // -----------------------------------------------------------------------

    pub fn is_snowing(&self) -> bool {
        self.snowing.load(Ordering::Relaxed)
    }

    pub fn set_snowing(&self, snowing: bool) {
        self.snowing.store(snowing, Ordering::Relaxed);
    }

    /// Greet a character entering the world with the current weather.
    pub fn on_player_join(&self, character: &GameObject) {
        if !character.send_packet(&GamePacket::snow(self.is_snowing())) {
            error!("Character {} joined without a packet sink", character.obj_id);
        }
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> WorldStats {
        WorldStats {
            worlds: self.topology.world_count(),
            zones: self.topology.zone_count(),
            regions: self.topology.worlds().map(|w| w.region_count()).sum(),
            heightmaps_loaded: self.topology.worlds().filter(|w| w.has_heightmap()).count(),
            objects: self.registry.len(),
            characters: self.registry.count(Category::Character),
            npcs: self.registry.count(Category::Npc),
            doodads: self.registry.count(Category::Doodad),
            area_shapes: self.area_shapes.len(),
        }
    }
}

/// Birth-continent id of a race.
fn nation_of(race: u8) -> u8 {
    race.wrapping_sub(1) & 0xFC
}
