//! ObjectRegistry unit tests

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use world_grid::{Category, GameObject, ObjId, ObjectKind, ObjectRegistry};

    fn sorted(mut ids: Vec<ObjId>) -> Vec<ObjId> {
        ids.sort_unstable();
        ids
    }

    fn kind_for(id: ObjId) -> ObjectKind {
        match id % 5 {
            0 => ObjectKind::Character,
            1 => ObjectKind::Npc,
            2 => ObjectKind::Doodad,
            3 => ObjectKind::Gimmick,
            _ => ObjectKind::Object,
        }
    }

    // -----------------------------------------------------------------------
    // Category fan-out
    // -----------------------------------------------------------------------

    #[test]
    fn character_lands_in_every_parent_category() {
        let registry = ObjectRegistry::new();
        let character = GameObject::builder(7, ObjectKind::Character)
            .name("Aria")
            .build();
        registry.add_object(Some(character));

        assert!(registry.object(7).is_some());
        assert!(registry.base_unit(7).is_some());
        assert!(registry.unit(7).is_some());
        assert!(registry.character(7).is_some());
        assert!(registry.npc(7).is_none());
        assert!(registry.doodad(7).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn doodad_is_base_unit_but_not_unit() {
        let registry = ObjectRegistry::new();
        registry.add_object(Some(GameObject::builder(3, ObjectKind::Doodad).build()));

        assert!(registry.contains(Category::BaseUnit, 3));
        assert!(registry.contains(Category::Doodad, 3));
        assert!(!registry.contains(Category::Unit, 3));
    }

    #[test]
    fn plain_object_only_in_primary_map() {
        let registry = ObjectRegistry::new();
        registry.add_object(Some(GameObject::builder(9, ObjectKind::Object).build()));

        assert!(registry.object(9).is_some());
        for category in Category::INDEXED {
            assert_eq!(registry.count(category), 0, "{:?}", category);
        }
    }

    #[test]
    fn first_registration_of_an_id_wins() {
        let registry = ObjectRegistry::new();
        let first = GameObject::builder(7, ObjectKind::Character)
            .name("Aria")
            .build();
        let second = GameObject::builder(7, ObjectKind::Character)
            .name("Bryn")
            .build();

        assert!(registry.add_object(Some(Arc::clone(&first))));
        assert!(!registry.add_object(Some(second)));

        assert!(Arc::ptr_eq(&registry.object(7).unwrap(), &first));
        assert!(Arc::ptr_eq(&registry.character(7).unwrap(), &first));
        assert!(Arc::ptr_eq(&registry.unit(7).unwrap(), &first));
        assert_eq!(registry.character_by_name("aria").unwrap().name, "Aria");
        assert!(registry.character_by_name("bryn").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reregistering_fills_only_missing_indexes() {
        let registry = ObjectRegistry::new();
        let plain = GameObject::builder(4, ObjectKind::Object).build();
        let npc = GameObject::builder(4, ObjectKind::Npc).build();

        assert!(registry.add_object(Some(Arc::clone(&plain))));
        assert!(!registry.add_object(Some(Arc::clone(&npc))));

        assert!(Arc::ptr_eq(&registry.object(4).unwrap(), &plain));
        assert!(Arc::ptr_eq(&registry.npc(4).unwrap(), &npc));
    }

    #[test]
    fn none_is_a_no_op() {
        let registry = ObjectRegistry::new();
        assert!(!registry.add_object(None));
        registry.remove_object(None);
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_clears_every_index() {
        let registry = ObjectRegistry::new();
        let npc = GameObject::builder(11, ObjectKind::Npc).build();
        registry.add_object(Some(Arc::clone(&npc)));
        registry.remove_object(Some(&npc));

        assert!(registry.object(11).is_none());
        assert!(registry.base_unit(11).is_none());
        assert!(registry.unit(11).is_none());
        assert!(registry.npc(11).is_none());

        // Removing again touches nothing.
        registry.remove_object(Some(&npc));
        assert!(registry.is_empty());
    }

    // -----------------------------------------------------------------------
    // Attribute lookups
    // -----------------------------------------------------------------------

    #[test]
    fn character_by_name_ignores_case() {
        let registry = ObjectRegistry::new();
        registry.add_object(Some(
            GameObject::builder(1, ObjectKind::Character)
                .name("Morgan")
                .db_id(501)
                .build(),
        ));
        registry.add_object(Some(
            GameObject::builder(2, ObjectKind::Npc).name("Guard").build(),
        ));

        assert_eq!(registry.character_by_name("morgan").unwrap().obj_id, 1);
        assert_eq!(registry.character_by_name("MORGAN").unwrap().obj_id, 1);
        assert!(registry.character_by_name("guard").is_none());
        assert_eq!(registry.character_by_db_id(501).unwrap().obj_id, 1);
    }

    #[test]
    fn house_and_owner_scans() {
        let registry = ObjectRegistry::new();
        for id in 1..=4 {
            registry.add_object(Some(
                GameObject::builder(id, ObjectKind::Doodad)
                    .db_id(1000 + id)
                    .house_db_id(if id <= 3 { 77 } else { 78 })
                    .owner_id(if id % 2 == 0 { 5 } else { 6 })
                    .build(),
            ));
        }

        assert_eq!(registry.doodad_by_db_id(1002).unwrap().obj_id, 2);
        let house: BTreeSet<_> = registry
            .doodads_by_house_db_id(77)
            .iter()
            .map(|o| o.obj_id)
            .collect();
        assert_eq!(house, BTreeSet::from([1, 2, 3]));
        let owned: BTreeSet<_> = registry
            .objects_by_owner(5)
            .iter()
            .map(|o| o.obj_id)
            .collect();
        assert_eq!(owned, BTreeSet::from([2, 4]));
    }

    #[test]
    fn target_or_self_resolution_order() {
        let registry = ObjectRegistry::new();
        let caller = GameObject::builder(1, ObjectKind::Character)
            .name("Caller")
            .build();
        let named = GameObject::builder(2, ObjectKind::Character)
            .name("Named")
            .build();
        let target = GameObject::builder(3, ObjectKind::Character).build();
        let npc = GameObject::builder(4, ObjectKind::Npc).build();
        registry.add_object(Some(Arc::clone(&caller)));
        registry.add_object(Some(Arc::clone(&named)));

        let (found, by_name) = registry.target_or_self(&caller, Some("named"), Some(&target));
        assert_eq!((found.obj_id, by_name), (2, true));

        let (found, by_name) = registry.target_or_self(&caller, Some("nobody"), Some(&target));
        assert_eq!((found.obj_id, by_name), (3, false));

        let (found, by_name) = registry.target_or_self(&caller, None, Some(&npc));
        assert_eq!((found.obj_id, by_name), (1, false));

        let (found, _) = registry.target_or_self(&caller, Some(""), None);
        assert_eq!(found.obj_id, 1);
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_add_then_remove_half() {
        let registry = ObjectRegistry::new();
        let objects: Vec<_> = (1..=1000)
            .map(|id| GameObject::builder(id, kind_for(id)).build())
            .collect();

        std::thread::scope(|scope| {
            for chunk in objects.chunks(125) {
                let registry = &registry;
                scope.spawn(move || {
                    for obj in chunk {
                        registry.add_object(Some(Arc::clone(obj)));
                    }
                });
            }
        });
        assert_eq!(registry.len(), 1000);

        std::thread::scope(|scope| {
            for chunk in objects.chunks(125) {
                let registry = &registry;
                scope.spawn(move || {
                    for obj in chunk.iter().filter(|o| o.obj_id % 2 == 0) {
                        registry.remove_object(Some(obj));
                    }
                });
            }
        });

        let survivors: Vec<_> = objects.iter().filter(|o| o.obj_id % 2 == 1).collect();
        assert_eq!(registry.len(), survivors.len());

        for category in Category::INDEXED {
            let expected: Vec<_> = survivors
                .iter()
                .filter(|o| o.is(category))
                .map(|o| o.obj_id)
                .collect();
            assert_eq!(
                sorted(registry.ids(category)),
                sorted(expected),
                "{:?}",
                category
            );
        }
        assert_eq!(
            sorted(registry.ids(Category::Object)),
            sorted(survivors.iter().map(|o| o.obj_id).collect())
        );
    }
}
