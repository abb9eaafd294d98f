//! Core world types shared across all modules.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Grid constants
// ---------------------------------------------------------------------------

/// Width/height of a single Region in world units.
pub const REGION_SIZE: i32 = 64;

/// Number of Regions along one side of a Cell (a 1024-unit map block).
pub const CELL_SIZE: i32 = 1024 / REGION_SIZE;

/// Chebyshev radius, in Regions, of the visibility neighborhood.
///
/// Anything past 5 is overkill: the client can't target that far anyway.
pub const REGION_NEIGHBORHOOD_SIZE: i32 = 2;

/// Height samples along one side of a Cell.
pub const HEIGHT_SAMPLES_PER_CELL: usize = 512;

/// World units covered by one height sample.
pub const HEIGHT_SAMPLE_SPACING: f32 = (CELL_SIZE * REGION_SIZE) as f32 / HEIGHT_SAMPLES_PER_CELL as f32;

pub type WorldId = u32;
pub type ZoneId = u32;

// ---------------------------------------------------------------------------
// Basic math
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Squared distance on the ground plane (z ignored).
    pub fn distance_sq_2d(&self, other: &Vec3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Rotate around the z axis by `yaw` radians.
    pub fn rotated_z(&self, yaw: f32) -> Vec3 {
        if yaw == 0.0 {
            return *self;
        }
        let (sin, cos) = yaw.sin_cos();
        Vec3::new(
            self.x * cos - self.y * sin,
            self.x * sin + self.y * cos,
            self.z,
        )
    }
}

impl std::ops::Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Region addressing
// ---------------------------------------------------------------------------

/// Structural identity of a Region: world plus grid coordinates.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RegionCoord {
    pub world_id: WorldId,
    pub x: i32,
    pub y: i32,
}

impl RegionCoord {
    pub fn new(world_id: WorldId, x: i32, y: i32) -> Self {
        Self { world_id, x, y }
    }

    /// Region grid coordinates containing a world-space point, floored.
    /// `None` for NaN or infinite input.
    pub fn from_position(world_id: WorldId, x: f32, y: f32) -> Option<Self> {
        if !(x.is_finite() && y.is_finite()) {
            return None;
        }
        Some(Self::new(
            world_id,
            (x / REGION_SIZE as f32).floor() as i32,
            (y / REGION_SIZE as f32).floor() as i32,
        ))
    }

    /// World-space origin (lowest corner) of the Region.
    pub fn origin(&self) -> (f32, f32) {
        let size = REGION_SIZE as f32;
        (self.x as f32 * size, self.y as f32 * size)
    }
}

impl std::fmt::Display for RegionCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:[{},{}]", self.world_id, self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Stats & config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorldStats {
    pub worlds: usize,
    pub zones: usize,
    pub regions: usize,
    pub heightmaps_loaded: usize,
    pub objects: usize,
    pub characters: usize,
    pub npcs: usize,
    pub doodads: usize,
    pub area_shapes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldServiceConfig {
    /// Root of the data tree (`worlds.json`, `Worlds/<name>/…`, `tables/`).
    pub data_dir: PathBuf,
    /// Read `hmap.dat` files at startup and answer height queries from them.
    pub heightmaps_enabled: bool,
    /// Initial weather flag sent to joining players.
    pub snowing: bool,
}

impl Default for WorldServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("Data"),
            heightmaps_enabled: true,
            snowing: false,
        }
    }
}

impl WorldServiceConfig {
    /// Layer defaults, an optional TOML/JSON file and `WORLD_*` env vars.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        let mut builder = config::Config::builder()
            .set_default("data_dir", defaults.data_dir.to_string_lossy().into_owned())?
            .set_default("heightmaps_enabled", defaults.heightmaps_enabled)?
            .set_default("snowing", defaults.snowing)?;

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder
            .add_source(config::Environment::with_prefix("WORLD"))
            .build()?
            .try_deserialize()
    }
}
