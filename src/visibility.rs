//! Visibility tracker: keeps each visible entity in exactly one Region and
//! registers it as an observer of that Region's neighborhood.
//!
//! When an entity crosses a Region boundary only the symmetric difference
//! of the old and new neighborhoods is touched; Regions common to both
//! keep their registration.
//!
//! The tracker expects a single logical writer per world tick. Region sets
//! carry their own locks so concurrent readers (queries, broadcasts) stay
//! safe, but two writers moving the same entity at once may interleave.

use crate::object::{GameObject, ObjId};
use crate::topology::{Region, Topology};
use crate::types::RegionCoord;
use log::{error, trace};
use std::collections::HashSet;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Change log
// ---------------------------------------------------------------------------

/// Membership move of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionTransition {
    pub obj_id: ObjId,
    pub from: Option<RegionCoord>,
    pub to: Option<RegionCoord>,
}

/// Every observer registration change performed by one tracker call.
///
/// Callers (typically the network layer) turn these into spawn/despawn
/// packets for the occupants of each Region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityChanges {
    pub registered: Vec<(RegionCoord, ObjId)>,
    pub deregistered: Vec<(RegionCoord, ObjId)>,
    pub transitions: Vec<RegionTransition>,
}

impl VisibilityChanges {
    pub fn is_empty(&self) -> bool {
        self.registered.is_empty() && self.deregistered.is_empty() && self.transitions.is_empty()
    }

    /// Regions touched by any registration change.
    pub fn touched_regions(&self) -> HashSet<RegionCoord> {
        self.registered
            .iter()
            .chain(self.deregistered.iter())
            .map(|(coord, _)| *coord)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

pub struct VisibilityTracker {
    topology: Arc<Topology>,
}

impl VisibilityTracker {
    pub fn new(topology: Arc<Topology>) -> Self {
        Self { topology }
    }

    /// Region that `obj` belongs in: the one under its root ancestor.
    ///
    /// `None` for a malformed hierarchy, unknown world or unpopulated cell.
    pub fn region_for(&self, obj: &Arc<GameObject>) -> Option<Arc<Region>> {
        let root = match obj.root() {
            Ok(root) => root,
            Err(e) => {
                error!("{}", e);
                return None;
            }
        };
        let transform = root.world_transform();
        let world = self.topology.world(transform.world_id)?;
        world
            .region_at_position(transform.position.x, transform.position.y)
            .cloned()
    }

    /// Place `obj` (and its attached children) in the Region under its root
    /// and update observer registrations.
    pub fn add_visible_object(&self, obj: Option<&Arc<GameObject>>) -> VisibilityChanges {
        let mut changes = VisibilityChanges::default();
        let mut visited = HashSet::new();
        if let Some(obj) = obj {
            self.add_recursive(obj, &mut changes, &mut visited);
        }
        changes
    }

    fn add_recursive(
        &self,
        obj: &Arc<GameObject>,
        changes: &mut VisibilityChanges,
        visited: &mut HashSet<ObjId>,
    ) {
        if !visited.insert(obj.obj_id) || !obj.is_visible() {
            return;
        }

        let Some(region) = self.region_for(obj) else {
            return;
        };
        // Offsets of attached children can change without a Region change.
        self.note_reach(obj, &region);

        let current = obj.region().and_then(|coord| self.topology.region(coord));
        match current {
            None => self.enter(obj, &region, changes),
            Some(current) if current != region => self.cross(obj, &current, &region, changes),
            Some(_) => {}
        }

        for child in obj.children() {
            self.add_recursive(&child, changes, visited);
        }
    }

    /// New spawn: register everywhere in the neighborhood.
    fn enter(&self, obj: &Arc<GameObject>, region: &Arc<Region>, changes: &mut VisibilityChanges) {
        for neighbor in self.topology.neighbors_of(region.coord()) {
            if neighbor.add_observer(obj) {
                changes.registered.push((neighbor.coord(), obj.obj_id));
            }
        }

        self.place(obj, region);
        changes.transitions.push(RegionTransition {
            obj_id: obj.obj_id,
            from: None,
            to: Some(region.coord()),
        });
    }

    /// Boundary crossing: touch only the symmetric difference.
    fn cross(
        &self,
        obj: &Arc<GameObject>,
        from: &Arc<Region>,
        to: &Arc<Region>,
        changes: &mut VisibilityChanges,
    ) {
        let old_neighbors = self.topology.neighbors_of(from.coord());
        let new_neighbors = self.topology.neighbors_of(to.coord());
        let old_set: HashSet<RegionCoord> = old_neighbors.iter().map(|r| r.coord()).collect();
        let new_set: HashSet<RegionCoord> = new_neighbors.iter().map(|r| r.coord()).collect();

        for neighbor in old_neighbors.iter().filter(|r| !new_set.contains(&r.coord())) {
            if neighbor.remove_observer(obj.obj_id) {
                changes.deregistered.push((neighbor.coord(), obj.obj_id));
            }
        }

        for neighbor in new_neighbors.iter().filter(|r| !old_set.contains(&r.coord())) {
            if neighbor.add_observer(obj) {
                changes.registered.push((neighbor.coord(), obj.obj_id));
            }
        }

        self.place(obj, to);
        from.remove_member(obj.obj_id);

        trace!("Object {} moved {} -> {}", obj.obj_id, from.coord(), to.coord());
        changes.transitions.push(RegionTransition {
            obj_id: obj.obj_id,
            from: Some(from.coord()),
            to: Some(to.coord()),
        });
    }

    fn place(&self, obj: &Arc<GameObject>, region: &Arc<Region>) {
        region.add_member(Arc::clone(obj));
        obj.set_region(Some(region.coord()));
    }

    /// Widen the world's member reach to cover `obj`'s model size plus its
    /// distance from the root it is anchored to.
    fn note_reach(&self, obj: &Arc<GameObject>, region: &Region) {
        let Some(world) = self.topology.world(region.world_id()) else {
            return;
        };
        let anchor = obj
            .root()
            .map(|root| root.world_position())
            .unwrap_or_else(|_| obj.world_position());
        let offset = obj.world_position().distance_sq_2d(&anchor).sqrt();
        world.note_member_reach(obj.model_size + offset);
    }

    /// Take `obj` (and its attached children) out of its Region and every
    /// neighbor's observer set.
    pub fn remove_visible_object(&self, obj: Option<&Arc<GameObject>>) -> VisibilityChanges {
        let mut changes = VisibilityChanges::default();
        let mut visited = HashSet::new();
        if let Some(obj) = obj {
            self.remove_recursive(obj, &mut changes, &mut visited);
        }
        changes
    }

    fn remove_recursive(
        &self,
        obj: &Arc<GameObject>,
        changes: &mut VisibilityChanges,
        visited: &mut HashSet<ObjId>,
    ) {
        if !visited.insert(obj.obj_id) {
            return;
        }
        let Some(coord) = obj.region() else {
            return;
        };

        if let Some(region) = self.topology.region(coord) {
            region.remove_member(obj.obj_id);
        }
        for neighbor in self.topology.neighbors_of(coord) {
            if neighbor.remove_observer(obj.obj_id) {
                changes.deregistered.push((neighbor.coord(), obj.obj_id));
            }
        }
        obj.set_region(None);
        changes.transitions.push(RegionTransition {
            obj_id: obj.obj_id,
            from: Some(coord),
            to: None,
        });

        for child in obj.children() {
            self.remove_recursive(&child, changes, visited);
        }
    }
}
