//! Area shapes: declarative area-of-effect volumes loaded from `aoe_shapes`.

use crate::data::AreaShapeRow;
use crate::object::GameObject;
use crate::types::Vec3;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shape kind. Ids the server doesn't know are kept so the query that
/// uses them can fail loudly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AreaShapeKind {
    /// `value1` radius, `value2` height.
    Sphere,
    /// `value1` length along the origin's heading, `value2` width,
    /// `value3` height.
    Cuboid,
    Unknown(u32),
}

impl AreaShapeKind {
    pub fn from_id(kind_id: u32) -> Self {
        match kind_id {
            1 => AreaShapeKind::Sphere,
            2 => AreaShapeKind::Cuboid,
            other => AreaShapeKind::Unknown(other),
        }
    }

    pub fn id(self) -> u32 {
        match self {
            AreaShapeKind::Sphere => 1,
            AreaShapeKind::Cuboid => 2,
            AreaShapeKind::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaShape {
    pub id: u32,
    pub kind: AreaShapeKind,
    pub value1: f32,
    pub value2: f32,
    pub value3: f32,
}

impl From<AreaShapeRow> for AreaShape {
    fn from(row: AreaShapeRow) -> Self {
        Self {
            id: row.id,
            kind: AreaShapeKind::from_id(row.kind_id),
            value1: row.value1,
            value2: row.value2,
            value3: row.value3,
        }
    }
}

impl AreaShape {
    pub fn sphere(id: u32, radius: f32) -> Self {
        Self {
            id,
            kind: AreaShapeKind::Sphere,
            value1: radius,
            value2: 0.0,
            value3: 0.0,
        }
    }

    pub fn cuboid(id: u32, length: f32, width: f32, height: f32) -> Self {
        Self {
            id,
            kind: AreaShapeKind::Cuboid,
            value1: length,
            value2: width,
            value3: height,
        }
    }

    /// All three size values are zero.
    pub fn is_degenerate(&self) -> bool {
        self.value1 == 0.0 && self.value2 == 0.0 && self.value3 == 0.0
    }

    /// Candidate radius for a cuboid query, `sqrt(v1² + v2²)`. Covers the
    /// whole footprint (twice its half-diagonal).
    pub fn circumscribed_radius(&self) -> f32 {
        (self.value1 * self.value1 + self.value2 * self.value2).sqrt()
    }

    /// Oriented-box test: is `point` inside the cuboid centered on `origin`
    /// and turned by `yaw`? A zero height ignores z.
    pub fn cuboid_contains(&self, origin: Vec3, yaw: f32, point: Vec3) -> bool {
        let local = (point - origin).rotated_z(-yaw);
        let half_length = self.value1 / 2.0;
        let half_width = self.value2 / 2.0;
        let half_height = self.value3 / 2.0;

        local.x.abs() <= half_length
            && local.y.abs() <= half_width
            && (self.value3 <= 0.0 || local.z.abs() <= half_height)
    }

    /// Keep the candidates inside this cuboid around `origin`.
    pub fn compute_cuboid(
        &self,
        origin: &Arc<GameObject>,
        candidates: Vec<Arc<GameObject>>,
    ) -> Vec<Arc<GameObject>> {
        let placement = origin.world_transform();
        candidates
            .into_iter()
            .filter(|c| self.cuboid_contains(placement.position, placement.yaw, c.world_position()))
            .collect()
    }
}
