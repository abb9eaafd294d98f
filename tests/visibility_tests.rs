//! VisibilityTracker unit tests

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use world_grid::data::{SectorDef, WorldDef, ZoneCellDef, ZoneDef};
    use world_grid::{
        GameObject, ObjectKind, RegionCoord, Topology, Transform, Vec3, VisibilityTracker,
        REGION_SIZE,
    };

    fn full_topology() -> Arc<Topology> {
        let def = WorldDef {
            id: 1,
            name: "main".into(),
            cell_x: 1,
            cell_y: 1,
            max_height: 1024.0,
        };
        let sectors = (0..16)
            .flat_map(|x| (0..16).map(move |y| SectorDef { x, y }))
            .collect();
        let zone = ZoneDef {
            id: 100,
            cells: vec![ZoneCellDef {
                x: 0,
                y: 0,
                sectors,
            }],
        };
        Arc::new(Topology::from_defs(vec![(def, vec![zone])]).unwrap())
    }

    /// Center of Region `(x, y)` in world space.
    fn center_of(x: i32, y: i32) -> Vec3 {
        let size = REGION_SIZE as f32;
        Vec3::new(x as f32 * size + size / 2.0, y as f32 * size + size / 2.0, 0.0)
    }

    fn coords_around(x: i32, y: i32) -> HashSet<RegionCoord> {
        let mut set = HashSet::new();
        for a in (x - 2).max(0)..=(x + 2).min(15) {
            for b in (y - 2).max(0)..=(y + 2).min(15) {
                set.insert(RegionCoord::new(1, a, b));
            }
        }
        set
    }

    fn observed_by(topology: &Topology, obj: &GameObject) -> HashSet<RegionCoord> {
        topology
            .world(1)
            .unwrap()
            .regions()
            .filter(|r| r.has_observer(obj.obj_id))
            .map(|r| r.coord())
            .collect()
    }

    fn member_of(topology: &Topology, obj: &GameObject) -> Vec<RegionCoord> {
        topology
            .world(1)
            .unwrap()
            .regions()
            .filter(|r| r.is_member(obj.obj_id))
            .map(|r| r.coord())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Spawn / despawn
    // -----------------------------------------------------------------------

    #[test]
    fn spawn_registers_whole_neighborhood() {
        let topology = full_topology();
        let tracker = VisibilityTracker::new(topology.clone());
        let obj = GameObject::builder(1, ObjectKind::Npc)
            .at(1, 100, center_of(8, 8))
            .build();

        let changes = tracker.add_visible_object(Some(&obj));
        assert_eq!(changes.registered.len(), 25);
        assert!(changes.deregistered.is_empty());
        assert_eq!(changes.transitions.len(), 1);
        assert_eq!(changes.transitions[0].to, Some(RegionCoord::new(1, 8, 8)));

        assert_eq!(obj.region(), Some(RegionCoord::new(1, 8, 8)));
        assert_eq!(member_of(&topology, &obj), vec![RegionCoord::new(1, 8, 8)]);
        assert_eq!(observed_by(&topology, &obj), coords_around(8, 8));
    }

    #[test]
    fn spawn_at_corner_is_clipped() {
        let topology = full_topology();
        let tracker = VisibilityTracker::new(topology.clone());
        let obj = GameObject::builder(1, ObjectKind::Npc)
            .at(1, 100, center_of(0, 0))
            .build();

        let changes = tracker.add_visible_object(Some(&obj));
        assert_eq!(changes.registered.len(), 9);
        assert_eq!(observed_by(&topology, &obj), coords_around(0, 0));
    }

    #[test]
    fn invisible_or_missing_object_is_ignored() {
        let topology = full_topology();
        let tracker = VisibilityTracker::new(topology.clone());
        let hidden = GameObject::builder(1, ObjectKind::Npc)
            .visible(false)
            .at(1, 100, center_of(4, 4))
            .build();

        assert!(tracker.add_visible_object(Some(&hidden)).is_empty());
        assert!(tracker.add_visible_object(None).is_empty());
        assert!(tracker.remove_visible_object(None).is_empty());
        assert!(hidden.region().is_none());
        assert!(observed_by(&topology, &hidden).is_empty());
    }

    #[test]
    fn object_outside_any_sector_stays_unplaced() {
        let def = WorldDef {
            id: 1,
            name: "sparse".into(),
            cell_x: 1,
            cell_y: 1,
            max_height: 1024.0,
        };
        let zone = ZoneDef {
            id: 100,
            cells: vec![ZoneCellDef {
                x: 0,
                y: 0,
                sectors: vec![SectorDef { x: 0, y: 0 }],
            }],
        };
        let topology = Arc::new(Topology::from_defs(vec![(def, vec![zone])]).unwrap());
        let tracker = VisibilityTracker::new(topology);

        let obj = GameObject::builder(1, ObjectKind::Npc)
            .at(1, 100, center_of(5, 5))
            .build();
        assert!(tracker.add_visible_object(Some(&obj)).is_empty());
        assert!(obj.region().is_none());

        let stray = GameObject::builder(2, ObjectKind::Npc)
            .at(9, 100, center_of(0, 0))
            .build();
        assert!(tracker.add_visible_object(Some(&stray)).is_empty());
    }

    #[test]
    fn non_finite_position_stays_unplaced() {
        let topology = full_topology();
        let tracker = VisibilityTracker::new(topology.clone());

        let lost = GameObject::builder(1, ObjectKind::Npc)
            .at(1, 100, Vec3::new(f32::NAN, f32::NAN, 0.0))
            .build();
        assert!(tracker.add_visible_object(Some(&lost)).is_empty());
        assert!(lost.region().is_none());
        assert!(observed_by(&topology, &lost).is_empty());
        assert!(member_of(&topology, &lost).is_empty());

        // Region (0, 0) must not pick it up either.
        let near_origin = GameObject::builder(2, ObjectKind::Character)
            .at(1, 100, center_of(0, 0))
            .build();
        tracker.add_visible_object(Some(&near_origin));
        let region = topology.region(RegionCoord::new(1, 0, 0)).unwrap();
        assert!(!region.is_member(lost.obj_id));

        let far = GameObject::builder(3, ObjectKind::Npc)
            .at(1, 100, Vec3::new(f32::INFINITY, 10.0, 0.0))
            .build();
        assert!(tracker.add_visible_object(Some(&far)).is_empty());
        assert!(far.region().is_none());
    }

    #[test]
    fn remove_clears_membership_and_observers() {
        let topology = full_topology();
        let tracker = VisibilityTracker::new(topology.clone());
        let obj = GameObject::builder(1, ObjectKind::Character)
            .at(1, 100, center_of(3, 12))
            .build();

        tracker.add_visible_object(Some(&obj));
        let changes = tracker.remove_visible_object(Some(&obj));

        assert_eq!(changes.deregistered.len(), coords_around(3, 12).len());
        assert_eq!(changes.transitions[0].to, None);
        assert!(obj.region().is_none());
        assert!(member_of(&topology, &obj).is_empty());
        assert!(observed_by(&topology, &obj).is_empty());

        // Second removal has nothing to do.
        assert!(tracker.remove_visible_object(Some(&obj)).is_empty());
    }

    // -----------------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------------

    #[test]
    fn move_within_region_changes_nothing() {
        let topology = full_topology();
        let tracker = VisibilityTracker::new(topology);
        let obj = GameObject::builder(1, ObjectKind::Npc)
            .at(1, 100, center_of(8, 8))
            .build();
        tracker.add_visible_object(Some(&obj));

        obj.set_position(center_of(8, 8) + Vec3::new(20.0, -20.0, 5.0));
        assert!(tracker.add_visible_object(Some(&obj)).is_empty());
    }

    #[test]
    fn crossing_touches_only_symmetric_difference() {
        let topology = full_topology();
        let tracker = VisibilityTracker::new(topology.clone());
        let obj = GameObject::builder(1, ObjectKind::Npc)
            .at(1, 100, center_of(8, 8))
            .build();
        tracker.add_visible_object(Some(&obj));

        let old = coords_around(8, 8);
        let new = coords_around(9, 8);
        obj.set_position(center_of(9, 8));
        let changes = tracker.add_visible_object(Some(&obj));

        let registered: HashSet<_> = changes.registered.iter().map(|(c, _)| *c).collect();
        let deregistered: HashSet<_> = changes.deregistered.iter().map(|(c, _)| *c).collect();
        assert_eq!(registered, new.difference(&old).copied().collect());
        assert_eq!(deregistered, old.difference(&new).copied().collect());
        assert_eq!(registered.len(), 5);
        assert_eq!(deregistered.len(), 5);

        let common: HashSet<_> = old.intersection(&new).copied().collect();
        assert!(changes.touched_regions().is_disjoint(&common));

        assert_eq!(obj.region(), Some(RegionCoord::new(1, 9, 8)));
        assert_eq!(member_of(&topology, &obj), vec![RegionCoord::new(1, 9, 8)]);
        assert_eq!(observed_by(&topology, &obj), new);
    }

    #[test]
    fn diagonal_crossing_near_edge() {
        let topology = full_topology();
        let tracker = VisibilityTracker::new(topology.clone());
        let obj = GameObject::builder(1, ObjectKind::Npc)
            .at(1, 100, center_of(1, 1))
            .build();
        tracker.add_visible_object(Some(&obj));

        obj.set_position(center_of(2, 2));
        let changes = tracker.add_visible_object(Some(&obj));

        let old = coords_around(1, 1);
        let new = coords_around(2, 2);
        assert_eq!(changes.registered.len(), new.difference(&old).count());
        assert!(changes.deregistered.is_empty());
        assert_eq!(observed_by(&topology, &obj), new);
    }

    #[test]
    fn long_jump_swaps_whole_neighborhood() {
        let topology = full_topology();
        let tracker = VisibilityTracker::new(topology.clone());
        let obj = GameObject::builder(1, ObjectKind::Npc)
            .at(1, 100, center_of(3, 3))
            .build();
        tracker.add_visible_object(Some(&obj));

        obj.set_position(center_of(12, 12));
        let changes = tracker.add_visible_object(Some(&obj));
        assert_eq!(changes.registered.len(), 25);
        assert_eq!(changes.deregistered.len(), 25);
        assert_eq!(observed_by(&topology, &obj), coords_around(12, 12));
    }

    // -----------------------------------------------------------------------
    // Attached children
    // -----------------------------------------------------------------------

    #[test]
    fn children_follow_parent() {
        let topology = full_topology();
        let tracker = VisibilityTracker::new(topology.clone());
        let ship = GameObject::builder(1, ObjectKind::Transfer)
            .model_size(4.0)
            .at(1, 100, center_of(6, 6))
            .build();
        let passenger = GameObject::builder(2, ObjectKind::Character)
            .transform(Transform::new(1, 100, Vec3::new(3.0, 0.0, 2.0)))
            .build();
        GameObject::attach(&ship, &passenger).unwrap();

        tracker.add_visible_object(Some(&ship));
        assert_eq!(passenger.region(), Some(RegionCoord::new(1, 6, 6)));
        assert_eq!(observed_by(&topology, &passenger), coords_around(6, 6));

        ship.set_position(center_of(7, 6));
        let changes = tracker.add_visible_object(Some(&ship));
        assert_eq!(passenger.region(), Some(RegionCoord::new(1, 7, 6)));
        assert_eq!(changes.transitions.len(), 2);

        tracker.remove_visible_object(Some(&ship));
        assert!(passenger.region().is_none());
        assert!(observed_by(&topology, &passenger).is_empty());
    }

    #[test]
    fn child_region_comes_from_root() {
        let topology = full_topology();
        let tracker = VisibilityTracker::new(topology.clone());
        let parent = GameObject::builder(1, ObjectKind::Transfer)
            .at(1, 100, center_of(4, 4))
            .build();
        // Offset would land the child two Regions over on its own.
        let child = GameObject::builder(2, ObjectKind::Doodad)
            .transform(Transform::new(1, 100, Vec3::new(130.0, 0.0, 0.0)))
            .build();
        GameObject::attach(&parent, &child).unwrap();

        let region = tracker.region_for(&child).unwrap();
        assert_eq!(region.coord(), RegionCoord::new(1, 4, 4));
    }
}
