//! Object registry: concurrent multi-index store of every live entity.
//!
//! One primary `ObjId → GameObject` map plus one map per indexed
//! [`Category`]. Each single-map operation is atomic (`DashMap` shards), but
//! the fan-out across maps is not: a reader racing a registration may see
//! the entity in the primary map and not yet in its category maps, or the
//! reverse during removal.

use crate::object::{Category, GameObject, ObjId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::warn;
use std::sync::Arc;

pub struct ObjectRegistry {
    objects: DashMap<ObjId, Arc<GameObject>>,
    by_category: [DashMap<ObjId, Arc<GameObject>>; Category::INDEXED.len()],
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            by_category: std::array::from_fn(|_| DashMap::new()),
        }
    }

    fn index(&self, category: Category) -> &DashMap<ObjId, Arc<GameObject>> {
        match category.index() {
            Some(i) => &self.by_category[i],
            None => &self.objects,
        }
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Register an entity in the primary map and every category it belongs
    /// to. `None` is ignored.
    ///
    /// Each map keeps the first entity registered under an id; a later
    /// registration of the same id leaves existing entries alone. Returns
    /// whether the primary map took `obj`.
    pub fn add_object(&self, obj: Option<Arc<GameObject>>) -> bool {
        let Some(obj) = obj else {
            return false;
        };

        let added = try_add(&self.objects, &obj);
        if !added {
            warn!("Object {} is already registered", obj.obj_id);
        }
        for &category in obj.kind.categories() {
            try_add(self.index(category), &obj);
        }
        added
    }

    /// Drop an entity from every map. Maps it was never in are untouched.
    pub fn remove_object(&self, obj: Option<&GameObject>) {
        let Some(obj) = obj else {
            return;
        };

        self.objects.remove(&obj.obj_id);
        for map in &self.by_category {
            map.remove(&obj.obj_id);
        }
    }

    pub fn clear(&self) {
        self.objects.clear();
        for map in &self.by_category {
            map.clear();
        }
    }

    // -----------------------------------------------------------------------
    // Id lookups
    // -----------------------------------------------------------------------

    pub fn get(&self, category: Category, obj_id: ObjId) -> Option<Arc<GameObject>> {
        self.index(category).get(&obj_id).map(|e| Arc::clone(e.value()))
    }

    pub fn object(&self, obj_id: ObjId) -> Option<Arc<GameObject>> {
        self.get(Category::Object, obj_id)
    }

    pub fn base_unit(&self, obj_id: ObjId) -> Option<Arc<GameObject>> {
        self.get(Category::BaseUnit, obj_id)
    }

    pub fn unit(&self, obj_id: ObjId) -> Option<Arc<GameObject>> {
        self.get(Category::Unit, obj_id)
    }

    pub fn doodad(&self, obj_id: ObjId) -> Option<Arc<GameObject>> {
        self.get(Category::Doodad, obj_id)
    }

    pub fn npc(&self, obj_id: ObjId) -> Option<Arc<GameObject>> {
        self.get(Category::Npc, obj_id)
    }

    pub fn character(&self, obj_id: ObjId) -> Option<Arc<GameObject>> {
        self.get(Category::Character, obj_id)
    }

    pub fn transfer(&self, obj_id: ObjId) -> Option<Arc<GameObject>> {
        self.get(Category::Transfer, obj_id)
    }

    pub fn gimmick(&self, obj_id: ObjId) -> Option<Arc<GameObject>> {
        self.get(Category::Gimmick, obj_id)
    }

    pub fn contains(&self, category: Category, obj_id: ObjId) -> bool {
        self.index(category).contains_key(&obj_id)
    }

    // -----------------------------------------------------------------------
    // Scans
    // -----------------------------------------------------------------------

    /// First entity of `category` matching `predicate`.
    pub fn find(
        &self,
        category: Category,
        predicate: impl Fn(&GameObject) -> bool,
    ) -> Option<Arc<GameObject>> {
        self.index(category)
            .iter()
            .find(|e| predicate(e.value()))
            .map(|e| Arc::clone(e.value()))
    }

    /// Every entity of `category` matching `predicate`.
    pub fn filter(
        &self,
        category: Category,
        predicate: impl Fn(&GameObject) -> bool,
    ) -> Vec<Arc<GameObject>> {
        self.index(category)
            .iter()
            .filter(|e| predicate(e.value()))
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    pub fn all(&self, category: Category) -> Vec<Arc<GameObject>> {
        self.filter(category, |_| true)
    }

    /// Online character by name, ignoring case.
    pub fn character_by_name(&self, name: &str) -> Option<Arc<GameObject>> {
        let wanted = name.to_lowercase();
        self.find(Category::Character, |c| c.name.to_lowercase() == wanted)
    }

    /// Online character by persisted character id.
    pub fn character_by_db_id(&self, db_id: u32) -> Option<Arc<GameObject>> {
        self.find(Category::Character, |c| c.db_id == db_id)
    }

    pub fn doodad_by_db_id(&self, db_id: u32) -> Option<Arc<GameObject>> {
        self.find(Category::Doodad, |d| d.db_id == db_id)
    }

    pub fn doodads_by_house_db_id(&self, house_db_id: u32) -> Vec<Arc<GameObject>> {
        self.filter(Category::Doodad, |d| d.house_db_id == house_db_id)
    }

    pub fn objects_by_owner(&self, owner_id: u32) -> Vec<Arc<GameObject>> {
        self.filter(Category::Object, |o| o.owner_id == owner_id)
    }

    pub fn all_characters(&self) -> Vec<Arc<GameObject>> {
        self.all(Category::Character)
    }

    pub fn all_npcs(&self) -> Vec<Arc<GameObject>> {
        self.all(Category::Npc)
    }

    /// Resolve a command target: the online character called `name`, else
    /// `current_target` if it is a character, else `caller`.
    ///
    /// The flag is `true` when `name` resolved.
    pub fn target_or_self(
        &self,
        caller: &Arc<GameObject>,
        name: Option<&str>,
        current_target: Option<&Arc<GameObject>>,
    ) -> (Arc<GameObject>, bool) {
        if let Some(found) = name
            .filter(|n| !n.is_empty())
            .and_then(|n| self.character_by_name(n))
        {
            return (found, true);
        }
        match current_target {
            Some(target) if target.is(Category::Character) => (Arc::clone(target), false),
            _ => (Arc::clone(caller), false),
        }
    }

    // -----------------------------------------------------------------------
    // Counts
    // -----------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn count(&self, category: Category) -> usize {
        self.index(category).len()
    }

    pub fn ids(&self, category: Category) -> Vec<ObjId> {
        self.index(category).iter().map(|e| *e.key()).collect()
    }
}

/// Insert `obj` under its id unless the slot is taken.
fn try_add(map: &DashMap<ObjId, Arc<GameObject>>, obj: &Arc<GameObject>) -> bool {
    match map.entry(obj.obj_id) {
        Entry::Occupied(_) => false,
        Entry::Vacant(slot) => {
            slot.insert(Arc::clone(obj));
            true
        }
    }
}
