//! Error types for world loading, heightmap decoding and shape queries.

use crate::types::{WorldId, ZoneId};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} doesn't exist or is empty")]
    EmptyFile { path: PathBuf },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate world id {world_id}")]
    DuplicateWorld { world_id: WorldId },

    #[error("zone {zone_id} is declared by world {first} and again by world {second}")]
    DuplicateZone {
        zone_id: ZoneId,
        first: WorldId,
        second: WorldId,
    },

    #[error("zone {zone_id} declares sector ({x}, {y}) outside world {world_id}")]
    SectorOutOfBounds {
        world_id: WorldId,
        zone_id: ZoneId,
        x: i32,
        y: i32,
    },

    #[error("table `{table}`: {message}")]
    Table { table: &'static str, message: String },

    #[error("area shape {shape_id} has unknown kind {kind}")]
    UnknownShapeKind { shape_id: u32, kind: u32 },

    #[error("object {obj_id} has a cyclic parent chain or one deeper than {max_depth}")]
    MalformedHierarchy { obj_id: u32, max_depth: usize },

    #[error("world service is {actual:?}, operation needs {expected:?}")]
    InvalidState {
        expected: crate::service::ServiceState,
        actual: crate::service::ServiceState,
    },
}

#[derive(Debug, Error)]
pub enum HeightmapError {
    #[error("heightmap i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported heightmap version {0}")]
    UnsupportedVersion(i32),

    #[error("heightmap declares {found_x}x{found_y} cells, world has {expected_x}x{expected_y}")]
    DimensionMismatch {
        expected_x: i32,
        expected_y: i32,
        found_x: i32,
        found_y: i32,
    },
}
