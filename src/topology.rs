//! World topology: the per-world Region and zone-id grids, built once at
//! startup and read-only afterwards, plus the [`Region`] membership sets
//! the visibility tracker mutates.
//!
//! Only sectors declared by some zone get a Region; every other grid slot
//! stays empty. Each populated slot owns exactly one `Arc<Region>`, and
//! Regions compare by `(world, x, y)` so independently computed neighbor
//! lists agree on "the same cell".

use crate::data::{WorldDef, ZoneDef};
use crate::error::WorldError;
use crate::object::{Category, GameObject, ObjId};
use crate::terrain::HeightGrid;
use crate::types::{
    RegionCoord, Vec3, WorldId, ZoneId, CELL_SIZE, REGION_NEIGHBORHOOD_SIZE,
};
use log::{debug, error, warn};
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Region
// ---------------------------------------------------------------------------

/// One REGION_SIZE square of a world.
///
/// `members` are the entities whose current Region this is. `observers` are
/// the entities registered as visible from here: everything whose Region
/// lies within the neighborhood.
pub struct Region {
    coord: RegionCoord,
    members: RwLock<HashMap<ObjId, Arc<GameObject>>>,
    observers: RwLock<HashMap<ObjId, Arc<GameObject>>>,
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.coord == other.coord
    }
}

impl Eq for Region {}

impl Hash for Region {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.coord.hash(state);
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("coord", &self.coord)
            .field("members", &self.member_count())
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl Region {
    pub fn new(coord: RegionCoord) -> Self {
        Self {
            coord,
            members: RwLock::new(HashMap::new()),
            observers: RwLock::new(HashMap::new()),
        }
    }

    pub fn coord(&self) -> RegionCoord {
        self.coord
    }

    pub fn world_id(&self) -> WorldId {
        self.coord.world_id
    }

    pub fn x(&self) -> i32 {
        self.coord.x
    }

    pub fn y(&self) -> i32 {
        self.coord.y
    }

    // -----------------------------------------------------------------------
    // Members
    // -----------------------------------------------------------------------

    pub fn add_member(&self, obj: Arc<GameObject>) {
        self.members.write().insert(obj.obj_id, obj);
    }

    pub fn remove_member(&self, obj_id: ObjId) -> bool {
        self.members.write().remove(&obj_id).is_some()
    }

    pub fn is_member(&self, obj_id: ObjId) -> bool {
        self.members.read().contains_key(&obj_id)
    }

    pub fn member_count(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    pub fn members(&self) -> Vec<Arc<GameObject>> {
        self.members.read().values().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------------

    /// Returns `true` when `obj` was not registered yet.
    pub fn add_observer(&self, obj: &Arc<GameObject>) -> bool {
        match self.observers.write().entry(obj.obj_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(Arc::clone(obj));
                true
            }
        }
    }

    pub fn remove_observer(&self, obj_id: ObjId) -> bool {
        self.observers.write().remove(&obj_id).is_some()
    }

    pub fn has_observer(&self, obj_id: ObjId) -> bool {
        self.observers.read().contains_key(&obj_id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    pub fn observers(&self) -> Vec<Arc<GameObject>> {
        self.observers.read().values().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Collection
    // -----------------------------------------------------------------------

    /// Append every member of `category` except `exclude`.
    pub fn collect(&self, out: &mut Vec<Arc<GameObject>>, exclude: ObjId, category: Category) {
        out.extend(
            self.members
                .read()
                .values()
                .filter(|o| o.obj_id != exclude && o.is(category))
                .cloned(),
        );
    }

    /// Like [`collect`](Self::collect), keeping only members within `radius`
    /// of `center` on the ground plane. With `use_model_size` each member's
    /// own model size extends the reach.
    pub fn collect_within(
        &self,
        out: &mut Vec<Arc<GameObject>>,
        exclude: ObjId,
        category: Category,
        center: Vec3,
        radius: f32,
        use_model_size: bool,
    ) {
        let members = self.members.read();
        for obj in members.values() {
            if obj.obj_id == exclude || !obj.is(category) {
                continue;
            }
            let reach = if use_model_size {
                radius + obj.model_size
            } else {
                radius
            };
            if obj.world_position().distance_sq_2d(&center) <= reach * reach {
                out.push(Arc::clone(obj));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// One simulated map: Region grid, zone-id grid and height grid.
pub struct World {
    pub id: WorldId,
    pub name: String,
    pub cell_x: i32,
    pub cell_y: i32,
    pub max_height: f64,
    width: i32,
    height: i32,
    regions: Vec<Option<Arc<Region>>>,
    zone_ids: Vec<ZoneId>,
    heights: RwLock<HeightGrid>,
    heightmap_loaded: AtomicBool,
    /// High-water mark of (model size + attachment offset) over every
    /// entity ever placed in this world, stored as f32 bits.
    member_reach: AtomicU32,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("cell_x", &self.cell_x)
            .field("cell_y", &self.cell_y)
            .field("regions", &self.region_count())
            .finish()
    }
}

impl World {
    pub fn new(def: &WorldDef) -> Self {
        let width = def.cell_x.max(0) * CELL_SIZE;
        let height = def.cell_y.max(0) * CELL_SIZE;
        let slots = (width * height) as usize;
        Self {
            id: def.id,
            name: def.name.clone(),
            cell_x: def.cell_x,
            cell_y: def.cell_y,
            max_height: def.max_height,
            width,
            height,
            regions: vec![None; slots],
            zone_ids: vec![0; slots],
            heights: RwLock::new(HeightGrid::new(def.cell_x, def.cell_y, def.max_height)),
            heightmap_loaded: AtomicBool::new(false),
            member_reach: AtomicU32::new(0f32.to_bits()),
        }
    }

    /// Stamp a zone's sectors onto the grids. Returns the sector count.
    pub fn add_zone(&mut self, zone: &ZoneDef) -> Result<usize, WorldError> {
        let mut sectors = 0;
        for cell in &zone.cells {
            let base_x = cell.x * CELL_SIZE;
            let base_y = cell.y * CELL_SIZE;
            for sector in &cell.sectors {
                let sx = base_x + sector.x;
                let sy = base_y + sector.y;
                let Some(i) = self.index(sx, sy) else {
                    return Err(WorldError::SectorOutOfBounds {
                        world_id: self.id,
                        zone_id: zone.id,
                        x: sx,
                        y: sy,
                    });
                };

                let previous = self.zone_ids[i];
                if previous != 0 && previous != zone.id {
                    warn!(
                        "{}: sector ({}, {}) claimed by zone {} and zone {}",
                        self.name, sx, sy, previous, zone.id
                    );
                }
                self.zone_ids[i] = zone.id;
                let world_id = self.id;
                self.regions[i]
                    .get_or_insert_with(|| Arc::new(Region::new(RegionCoord::new(world_id, sx, sy))));
                sectors += 1;
            }
        }
        Ok(sectors)
    }

    /// Regions along x.
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Regions along y.
    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn valid_region(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        self.valid_region(x, y)
            .then(|| (x * self.height + y) as usize)
    }

    pub fn region(&self, x: i32, y: i32) -> Option<&Arc<Region>> {
        self.index(x, y).and_then(|i| self.regions[i].as_ref())
    }

    /// Region containing a world-space point.
    pub fn region_at_position(&self, x: f32, y: f32) -> Option<&Arc<Region>> {
        let coord = RegionCoord::from_position(self.id, x, y)?;
        self.region(coord.x, coord.y)
    }

    /// Zone of a grid slot; `Some(0)` for an unpopulated in-bounds slot.
    pub fn zone_id(&self, x: i32, y: i32) -> Option<ZoneId> {
        self.index(x, y).map(|i| self.zone_ids[i])
    }

    pub fn zone_id_at_position(&self, x: f32, y: f32) -> Option<ZoneId> {
        let coord = RegionCoord::from_position(self.id, x, y)?;
        self.zone_id(coord.x, coord.y)
    }

    /// Every populated Region within [`REGION_NEIGHBORHOOD_SIZE`] of
    /// `(x, y)`, center included, clipped to the grid.
    pub fn neighbors(&self, x: i32, y: i32) -> Vec<Arc<Region>> {
        let r = REGION_NEIGHBORHOOD_SIZE;
        let mut result = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
        let xs = x.saturating_sub(r).max(0)..=x.saturating_add(r).min(self.width - 1);
        for a in xs {
            for b in y.saturating_sub(r).max(0)..=y.saturating_add(r).min(self.height - 1) {
                if let Some(region) = self.region(a, b) {
                    result.push(Arc::clone(region));
                }
            }
        }
        result
    }

    /// Every populated Region of the CELL_SIZE x CELL_SIZE block of cell
    /// `(cell_x, cell_y)`.
    pub fn cell_regions(&self, cell_x: i32, cell_y: i32) -> Vec<Arc<Region>> {
        let mut result = Vec::new();
        let (Some(x0), Some(y0)) = (
            cell_x.checked_mul(CELL_SIZE),
            cell_y.checked_mul(CELL_SIZE),
        ) else {
            return result;
        };
        for a in x0.max(0)..x0.saturating_add(CELL_SIZE).min(self.width) {
            for b in y0.max(0)..y0.saturating_add(CELL_SIZE).min(self.height) {
                if let Some(region) = self.region(a, b) {
                    result.push(Arc::clone(region));
                }
            }
        }
        result
    }

    pub fn regions(&self) -> impl Iterator<Item = &Arc<Region>> {
        self.regions.iter().flatten()
    }

    pub fn region_count(&self) -> usize {
        self.regions().count()
    }

    // -----------------------------------------------------------------------
    // Heights
    // -----------------------------------------------------------------------

    /// Terrain height at a world-space point, `None` outside the grid.
    pub fn height_at(&self, x: f32, y: f32) -> Option<f32> {
        self.heights.read().sample_height(x, y)
    }

    pub fn heights(&self) -> RwLockReadGuard<'_, HeightGrid> {
        self.heights.read()
    }

    /// Swap in a decoded grid. Rejects grids sized for another world.
    pub fn install_heights(&self, grid: HeightGrid) -> bool {
        if grid.cell_x() != self.cell_x || grid.cell_y() != self.cell_y {
            error!(
                "{}: refusing {}x{} height grid for {}x{} world",
                self.name,
                grid.cell_x(),
                grid.cell_y(),
                self.cell_x,
                self.cell_y
            );
            return false;
        }
        *self.heights.write() = grid;
        self.heightmap_loaded.store(true, Ordering::Release);
        true
    }

    pub fn has_heightmap(&self) -> bool {
        self.heightmap_loaded.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Member reach
    // -----------------------------------------------------------------------

    pub(crate) fn note_member_reach(&self, reach: f32) {
        if reach.is_finite() && reach > 0.0 {
            // Non-negative f32 bit patterns order like the values.
            self.member_reach.fetch_max(reach.to_bits(), Ordering::AcqRel);
        }
    }

    /// Largest distance any member has ever extended past its Region
    /// anchor (model size plus attachment offset).
    pub fn member_reach(&self) -> f32 {
        f32::from_bits(self.member_reach.load(Ordering::Acquire))
    }
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

/// Every loaded world plus the zone → world index.
#[derive(Debug, Default)]
pub struct Topology {
    worlds: HashMap<WorldId, Arc<World>>,
    world_by_zone: HashMap<ZoneId, WorldId>,
}

impl Topology {
    /// Build all worlds. `zones_for` supplies each world's zone list.
    ///
    /// Duplicate world ids, duplicate zone ids and out-of-grid sectors are
    /// fatal.
    pub fn build<F>(defs: Vec<WorldDef>, mut zones_for: F) -> Result<Self, WorldError>
    where
        F: FnMut(&WorldDef) -> Result<Vec<ZoneDef>, WorldError>,
    {
        let mut pending: Vec<(WorldDef, World)> = Vec::with_capacity(defs.len());
        for def in defs {
            if pending.iter().any(|(d, _)| d.id == def.id) {
                return Err(WorldError::DuplicateWorld { world_id: def.id });
            }
            let world = World::new(&def);
            pending.push((def, world));
        }

        let mut topology = Topology::default();
        for (def, mut world) in pending {
            let zones = zones_for(&def)?;
            let mut sectors = 0;
            for zone in &zones {
                if let Some(&first) = topology.world_by_zone.get(&zone.id) {
                    return Err(WorldError::DuplicateZone {
                        zone_id: zone.id,
                        first,
                        second: def.id,
                    });
                }
                topology.world_by_zone.insert(zone.id, def.id);
                sectors += world.add_zone(zone)?;
            }
            debug!(
                "World {} ({}): {} zones, {} sectors, {} regions",
                def.id,
                def.name,
                zones.len(),
                sectors,
                world.region_count()
            );
            topology.worlds.insert(def.id, Arc::new(world));
        }

        Ok(topology)
    }

    /// Build from in-memory definitions.
    pub fn from_defs(worlds: Vec<(WorldDef, Vec<ZoneDef>)>) -> Result<Self, WorldError> {
        let mut zones: HashMap<WorldId, Vec<ZoneDef>> = HashMap::new();
        let mut defs = Vec::with_capacity(worlds.len());
        for (def, world_zones) in worlds {
            zones.entry(def.id).or_default().extend(world_zones);
            defs.push(def);
        }
        Self::build(defs, |def| Ok(zones.remove(&def.id).unwrap_or_default()))
    }

    /// Look up a world; an unknown id is logged.
    pub fn world(&self, world_id: WorldId) -> Option<&Arc<World>> {
        let world = self.worlds.get(&world_id);
        if world.is_none() {
            error!("No such world id {}", world_id);
        }
        world
    }

    pub fn world_by_zone(&self, zone_id: ZoneId) -> Option<&Arc<World>> {
        match self.world_by_zone.get(&zone_id) {
            Some(world_id) => self.world(*world_id),
            None => {
                error!("No world defined for zone id {}", zone_id);
                None
            }
        }
    }

    pub fn worlds(&self) -> impl Iterator<Item = &Arc<World>> {
        self.worlds.values()
    }

    pub fn world_count(&self) -> usize {
        self.worlds.len()
    }

    pub fn zone_count(&self) -> usize {
        self.world_by_zone.len()
    }

    /// Zone id at a world-space point; 0 for unknown worlds and
    /// out-of-bounds coordinates.
    pub fn zone_id(&self, world_id: WorldId, x: f32, y: f32) -> ZoneId {
        let Some(world) = self.world(world_id) else {
            return 0;
        };
        match world.zone_id_at_position(x, y) {
            Some(zone_id) => zone_id,
            None => {
                error!(
                    "Coordinates out of bounds for world {}: x={:.1} y={:.1}",
                    world_id, x, y
                );
                0
            }
        }
    }

    pub fn valid_region(&self, world_id: WorldId, x: i32, y: i32) -> bool {
        self.world(world_id)
            .is_some_and(|world| world.valid_region(x, y))
    }

    /// Canonical Region instance for a coordinate.
    pub fn region(&self, coord: RegionCoord) -> Option<Arc<Region>> {
        self.worlds
            .get(&coord.world_id)
            .and_then(|world| world.region(coord.x, coord.y))
            .cloned()
    }

    pub fn neighbors(&self, world_id: WorldId, x: i32, y: i32) -> Vec<Arc<Region>> {
        self.world(world_id)
            .map(|world| world.neighbors(x, y))
            .unwrap_or_default()
    }

    pub fn neighbors_of(&self, coord: RegionCoord) -> Vec<Arc<Region>> {
        self.neighbors(coord.world_id, coord.x, coord.y)
    }
}
