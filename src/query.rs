//! Proximity queries over the Region grid: neighborhood, radius, shape and
//! cell-wide lookups.
//!
//! All queries are bounded, synchronous and lock only the Regions they
//! read; they run inside the tick budget.

use crate::error::WorldError;
use crate::object::{Category, GameObject, ObjId};
use crate::shape::{AreaShape, AreaShapeKind};
use crate::topology::Topology;
use crate::types::{RegionCoord, Vec3, WorldId, REGION_SIZE};
use log::{error, warn};
use std::sync::Arc;

pub struct ProximityQuery {
    topology: Arc<Topology>,
}

impl ProximityQuery {
    pub fn new(topology: Arc<Topology>) -> Self {
        Self { topology }
    }

    /// Everything of `category` in the neighborhood of `obj`'s Region,
    /// `obj` itself excluded. Empty when `obj` has no Region.
    pub fn around(&self, obj: &GameObject, category: Category) -> Vec<Arc<GameObject>> {
        let mut result = Vec::new();
        let Some(coord) = obj.region() else {
            return result;
        };
        for neighbor in self.topology.neighbors_of(coord) {
            neighbor.collect(&mut result, obj.obj_id, category);
        }
        result
    }

    /// Everything of `category` within `radius` of `obj` on the ground plane.
    ///
    /// With `use_model_size` the radius grows by `obj`'s model size and each
    /// candidate's own model size extends its reach. When the whole search
    /// disc sits strictly inside `obj`'s Region only that Region is scanned;
    /// the result is the same as the neighborhood scan either way.
    pub fn around_radius(
        &self,
        obj: &Arc<GameObject>,
        category: Category,
        radius: f32,
        use_model_size: bool,
    ) -> Vec<Arc<GameObject>> {
        let Some(coord) = obj.region() else {
            return Vec::new();
        };

        let mut radius = radius.max(0.0);
        if use_model_size {
            radius += obj.model_size;
        }
        let center = obj.world_position();

        if radius > 0.0 && self.fits_region(coord, center, radius) {
            let mut result = Vec::new();
            if let Some(region) = self.topology.region(coord) {
                region.collect_within(
                    &mut result,
                    obj.obj_id,
                    category,
                    center,
                    radius,
                    use_model_size,
                );
            }
            result
        } else {
            self.scan_neighborhood(coord, obj.obj_id, category, center, radius, use_model_size)
        }
    }

    pub(crate) fn scan_neighborhood(
        &self,
        coord: RegionCoord,
        exclude: ObjId,
        category: Category,
        center: Vec3,
        radius: f32,
        use_model_size: bool,
    ) -> Vec<Arc<GameObject>> {
        let mut result = Vec::new();
        for neighbor in self.topology.neighbors_of(coord) {
            neighbor.collect_within(
                &mut result,
                exclude,
                category,
                center,
                radius,
                use_model_size,
            );
        }
        result
    }

    /// Does the disc around `center`, padded by the world's member reach,
    /// stay strictly inside Region `coord`?
    fn fits_region(&self, coord: RegionCoord, center: Vec3, radius: f32) -> bool {
        let Some(world) = self.topology.world(coord.world_id) else {
            return false;
        };
        let reach = radius + world.member_reach();
        let (origin_x, origin_y) = coord.origin();
        let size = REGION_SIZE as f32;

        let local_x = center.x - origin_x;
        if local_x - reach <= 0.0 || local_x + reach >= size {
            return false;
        }
        let local_y = center.y - origin_y;
        if local_y - reach <= 0.0 || local_y + reach >= size {
            return false;
        }
        true
    }

    /// Everything of `category` inside `shape` around `obj`.
    ///
    /// Spheres are a model-size-inflated radius query. Cuboids query their
    /// circumscribing radius, then keep what the shape's own oriented-box
    /// test accepts. Unknown shape kinds are an error.
    pub fn around_by_shape(
        &self,
        obj: &Arc<GameObject>,
        category: Category,
        shape: &AreaShape,
    ) -> Result<Vec<Arc<GameObject>>, WorldError> {
        if shape.is_degenerate() {
            warn!("Area shape {} with no size values was used", shape.id);
        }

        match shape.kind {
            AreaShapeKind::Sphere => Ok(self.around_radius(obj, category, shape.value1, true)),
            AreaShapeKind::Cuboid => {
                let candidates =
                    self.around_radius(obj, category, shape.circumscribed_radius(), true);
                Ok(shape.compute_cuboid(obj, candidates))
            }
            AreaShapeKind::Unknown(kind) => {
                error!("Area shape {} had impossible kind {}", shape.id, kind);
                Err(WorldError::UnknownShapeKind {
                    shape_id: shape.id,
                    kind,
                })
            }
        }
    }

    /// Every member of `category` in the CELL_SIZE x CELL_SIZE block of cell
    /// `(x, y)`, regardless of distance. For cell-wide broadcasts.
    pub fn in_cell(
        &self,
        world_id: WorldId,
        category: Category,
        x: i32,
        y: i32,
    ) -> Vec<Arc<GameObject>> {
        let mut result = Vec::new();
        let Some(world) = self.topology.world(world_id) else {
            return result;
        };
        for region in world.cell_regions(x, y) {
            region.collect(&mut result, 0, category);
        }
        result
    }
}
