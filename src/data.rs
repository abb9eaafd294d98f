//! Static data sources: world and zone definition files, and the
//! relational tables read once at startup.
//!
//! ## Data tree
//!
//! ```text
//! <data_dir>/worlds.json
//! <data_dir>/Worlds/<world name>/zones.json
//! <data_dir>/Worlds/<world name>/hmap.dat
//! <data_dir>/tables/wi_group_wis.json
//! <data_dir>/tables/aoe_shapes.json
//! ```

use crate::error::WorldError;
use crate::types::{WorldId, ZoneId};
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// One entry of `worlds.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldDef {
    #[serde(alias = "Id")]
    pub id: WorldId,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "CellX")]
    pub cell_x: i32,
    #[serde(alias = "CellY")]
    pub cell_y: i32,
    #[serde(alias = "MaxHeight")]
    pub max_height: f64,
}

/// One entry of a world's `zones.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDef {
    #[serde(alias = "Id")]
    pub id: ZoneId,
    #[serde(default, alias = "Cells")]
    pub cells: Vec<ZoneCellDef>,
}

/// A Cell covered (partly) by a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneCellDef {
    #[serde(alias = "X")]
    pub x: i32,
    #[serde(alias = "Y")]
    pub y: i32,
    #[serde(default, alias = "Sectors")]
    pub sectors: Vec<SectorDef>,
}

/// A Region inside its Cell (`0..CELL_SIZE` on each axis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorDef {
    #[serde(alias = "X")]
    pub x: i32,
    #[serde(alias = "Y")]
    pub y: i32,
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Paths inside a data directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn worlds_file(&self) -> PathBuf {
        self.root.join("worlds.json")
    }

    pub fn world_dir(&self, world_name: &str) -> PathBuf {
        self.root.join("Worlds").join(world_name)
    }

    pub fn zones_file(&self, world_name: &str) -> PathBuf {
        self.world_dir(world_name).join("zones.json")
    }

    pub fn heightmap_file(&self, world_name: &str) -> PathBuf {
        self.world_dir(world_name).join("hmap.dat")
    }

    pub fn tables_dir(&self) -> PathBuf {
        self.root.join("tables")
    }

    pub fn load_worlds(&self) -> Result<Vec<WorldDef>, WorldError> {
        read_json(&self.worlds_file())
    }

    pub fn load_zones(&self, world_name: &str) -> Result<Vec<ZoneDef>, WorldError> {
        read_json(&self.zones_file(world_name))
    }
}

/// Read a JSON document; a missing or blank file is an error.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, WorldError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(WorldError::EmptyFile {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(WorldError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if contents.trim().is_empty() {
        return Err(WorldError::EmptyFile {
            path: path.to_path_buf(),
        });
    }

    serde_json::from_str(&contents).map_err(|source| WorldError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Relational tables
// ---------------------------------------------------------------------------

/// Row of `wi_group_wis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldInteractionGroupRow {
    pub wi_id: u32,
    pub wi_group_id: u32,
}

/// Row of `aoe_shapes`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaShapeRow {
    pub id: u32,
    pub kind_id: u32,
    pub value1: f32,
    pub value2: f32,
    pub value3: f32,
}

/// Source of the startup tables. Read once, fully, before the service is
/// ready.
pub trait TableSource {
    fn world_interaction_groups(&self) -> Result<Vec<WorldInteractionGroupRow>, WorldError>;
    fn area_shapes(&self) -> Result<Vec<AreaShapeRow>, WorldError>;
}

/// Tables exported as JSON arrays under `<data_dir>/tables/`.
///
/// A missing table file reads as empty (with a warning); a malformed one is
/// fatal.
#[derive(Debug, Clone)]
pub struct JsonTables {
    dir: PathBuf,
}

impl JsonTables {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn rows<T: DeserializeOwned>(&self, table: &'static str) -> Result<Vec<T>, WorldError> {
        let path = self.dir.join(format!("{}.json", table));
        if !path.exists() {
            warn!("Table {} not found at {}, using no rows", table, path.display());
            return Ok(Vec::new());
        }
        read_json(&path).map_err(|e| WorldError::Table {
            table,
            message: e.to_string(),
        })
    }
}

impl TableSource for JsonTables {
    fn world_interaction_groups(&self) -> Result<Vec<WorldInteractionGroupRow>, WorldError> {
        self.rows("wi_group_wis")
    }

    fn area_shapes(&self) -> Result<Vec<AreaShapeRow>, WorldError> {
        self.rows("aoe_shapes")
    }
}

/// Tables held in memory (embedding, tests).
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    pub world_interaction_groups: Vec<WorldInteractionGroupRow>,
    pub area_shapes: Vec<AreaShapeRow>,
}

impl TableSource for MemoryTables {
    fn world_interaction_groups(&self) -> Result<Vec<WorldInteractionGroupRow>, WorldError> {
        Ok(self.world_interaction_groups.clone())
    }

    fn area_shapes(&self) -> Result<Vec<AreaShapeRow>, WorldError> {
        Ok(self.area_shapes.clone())
    }
}
