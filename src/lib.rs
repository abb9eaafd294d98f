//! World Grid
//!
//! Spatial partitioning and visibility propagation for a multiplayer world
//! server: which Region every live entity occupies, who can see it, and
//! what is near a point.
//!
//! ## Architecture
//!
//! ```text
//! WorldService  (service.rs)      ← lifecycle, public query surface
//!   ├── Topology  (topology.rs)   ← worlds, Region / zone-id grids
//!   │     └── HeightGrid  (terrain.rs)
//!   ├── ObjectRegistry  (registry.rs)     ← id / category indices
//!   ├── VisibilityTracker  (visibility.rs) ← Region membership + observers
//!   └── ProximityQuery  (query.rs)        ← radius / shape / cell queries
//! ```
//!
//! Topology and heightmaps are loaded once, synchronously, before the
//! service is ready. The registry is safe for concurrent use from any
//! thread; the visibility tracker expects one writer per world tick.

pub mod data;
pub mod error;
pub mod object;
pub mod protocol;
pub mod query;
pub mod registry;
pub mod service;
pub mod shape;
pub mod terrain;
pub mod topology;
pub mod types;
pub mod visibility;

pub use data::{DataLayout, JsonTables, MemoryTables, TableSource, WorldDef, ZoneDef};
pub use error::{HeightmapError, WorldError};
pub use object::{Category, GameObject, ObjId, ObjectKind, Transform};
pub use protocol::{GamePacket, PacketSink};
pub use query::ProximityQuery;
pub use registry::ObjectRegistry;
pub use service::{HeightLookup, ServiceState, VisibleObjects, WorldInteractionGroup, WorldService};
pub use shape::{AreaShape, AreaShapeKind};
pub use terrain::{HeightGrid, TerrainSource};
pub use topology::{Region, Topology, World};
pub use types::{
    RegionCoord, Vec3, WorldServiceConfig, WorldStats, CELL_SIZE, REGION_NEIGHBORHOOD_SIZE,
    REGION_SIZE,
};
pub use visibility::{RegionTransition, VisibilityChanges, VisibilityTracker};
