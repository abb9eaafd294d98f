//! Live entities: [`GameObject`], its closed category set and the
//! attachment hierarchy.
//!
//! Every entity is shared as `Arc<GameObject>` between the registry, the
//! Regions it occupies/observes and whatever gameplay code holds it.
//! Identity fields are immutable after construction; transform, hierarchy
//! and Region back-reference live behind a `parking_lot::RwLock`.

use crate::error::WorldError;
use crate::protocol::{GamePacket, PacketSink};
use crate::types::{RegionCoord, Vec3, WorldId, ZoneId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

pub type ObjId = u32;

/// Parent chains longer than this are treated as malformed.
pub const MAX_HIERARCHY_DEPTH: usize = 32;

// ---------------------------------------------------------------------------
// Kinds & categories
// ---------------------------------------------------------------------------

/// Concrete kind of an entity, fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Plain object (shipyard, effect anchor, …).
    Object,
    Doodad,
    /// Generic unit (mounts, slaves, houses).
    Unit,
    Npc,
    Character,
    Transfer,
    Gimmick,
}

/// Query/index category. `Object` matches every entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Object,
    BaseUnit,
    Unit,
    Doodad,
    Npc,
    Character,
    Transfer,
    Gimmick,
}

impl Category {
    /// Categories with their own registry index.
    pub const INDEXED: [Category; 7] = [
        Category::BaseUnit,
        Category::Unit,
        Category::Doodad,
        Category::Npc,
        Category::Character,
        Category::Transfer,
        Category::Gimmick,
    ];

    pub(crate) fn index(self) -> Option<usize> {
        match self {
            Category::Object => None,
            Category::BaseUnit => Some(0),
            Category::Unit => Some(1),
            Category::Doodad => Some(2),
            Category::Npc => Some(3),
            Category::Character => Some(4),
            Category::Transfer => Some(5),
            Category::Gimmick => Some(6),
        }
    }
}

impl ObjectKind {
    /// Indexed categories an entity of this kind belongs to.
    pub fn categories(self) -> &'static [Category] {
        use Category::*;
        match self {
            ObjectKind::Object => &[],
            ObjectKind::Doodad => &[BaseUnit, Doodad],
            ObjectKind::Unit => &[BaseUnit, Unit],
            ObjectKind::Npc => &[BaseUnit, Unit, Npc],
            ObjectKind::Character => &[BaseUnit, Unit, Character],
            ObjectKind::Transfer => &[BaseUnit, Unit, Transfer],
            ObjectKind::Gimmick => &[BaseUnit, Unit, Gimmick],
        }
    }

    pub fn is(self, category: Category) -> bool {
        category == Category::Object || self.categories().contains(&category)
    }
}

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// Placement of an entity. For attached entities `position` and `yaw` are
/// relative to the parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub world_id: WorldId,
    pub zone_id: ZoneId,
    pub position: Vec3,
    /// Heading around the z axis, radians.
    pub yaw: f32,
}

impl Transform {
    pub fn new(world_id: WorldId, zone_id: ZoneId, position: Vec3) -> Self {
        Self {
            world_id,
            zone_id,
            position,
            yaw: 0.0,
        }
    }

    pub fn with_yaw(mut self, yaw: f32) -> Self {
        self.yaw = yaw;
        self
    }
}

// ---------------------------------------------------------------------------
// GameObject
// ---------------------------------------------------------------------------

struct ObjectState {
    transform: Transform,
    parent: Option<Weak<GameObject>>,
    children: Vec<Arc<GameObject>>,
    region: Option<RegionCoord>,
}

pub struct GameObject {
    pub obj_id: ObjId,
    pub kind: ObjectKind,
    pub name: String,
    /// Persisted id (character id, doodad db id), 0 when transient.
    pub db_id: u32,
    pub owner_id: u32,
    pub house_db_id: u32,
    pub race: u8,
    pub faction_mother_id: u32,
    /// Collision radius used to inflate proximity queries.
    pub model_size: f32,
    visible: AtomicBool,
    state: RwLock<ObjectState>,
    sink: Option<Arc<dyn PacketSink>>,
}

impl std::fmt::Debug for GameObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameObject")
            .field("obj_id", &self.obj_id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("region", &self.region())
            .finish()
    }
}

impl GameObject {
    pub fn builder(obj_id: ObjId, kind: ObjectKind) -> GameObjectBuilder {
        GameObjectBuilder::new(obj_id, kind)
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Release);
    }

    pub fn is(&self, category: Category) -> bool {
        self.kind.is(category)
    }

    // -----------------------------------------------------------------------
    // Transform
    // -----------------------------------------------------------------------

    pub fn transform(&self) -> Transform {
        self.state.read().transform
    }

    pub fn set_transform(&self, transform: Transform) {
        self.state.write().transform = transform;
    }

    pub fn set_position(&self, position: Vec3) {
        self.state.write().transform.position = position;
    }

    /// Absolute placement, composing every ancestor's offset and heading.
    ///
    /// A malformed parent chain falls back to the local transform.
    pub fn world_transform(self: &Arc<Self>) -> Transform {
        let lineage = match self.lineage() {
            Ok(lineage) => lineage,
            Err(e) => {
                log::error!("{}", e);
                return self.transform();
            }
        };

        let mut chain = lineage.iter().rev();
        let Some(root) = chain.next() else {
            return self.transform();
        };

        let mut world = root.transform();
        for link in chain {
            let local = link.transform();
            world.position = world.position + local.position.rotated_z(world.yaw);
            world.yaw += local.yaw;
            world.zone_id = local.zone_id;
        }
        world
    }

    pub fn world_position(self: &Arc<Self>) -> Vec3 {
        self.world_transform().position
    }

    // -----------------------------------------------------------------------
    // Region back-reference
    // -----------------------------------------------------------------------

    pub fn region(&self) -> Option<RegionCoord> {
        self.state.read().region
    }

    pub(crate) fn set_region(&self, region: Option<RegionCoord>) {
        self.state.write().region = region;
    }

    // -----------------------------------------------------------------------
    // Hierarchy
    // -----------------------------------------------------------------------

    pub fn parent(&self) -> Option<Arc<GameObject>> {
        self.state.read().parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn children(&self) -> Vec<Arc<GameObject>> {
        self.state.read().children.clone()
    }

    /// `[self, parent, …, root]`, bounded by [`MAX_HIERARCHY_DEPTH`].
    pub fn lineage(self: &Arc<Self>) -> Result<Vec<Arc<GameObject>>, WorldError> {
        let malformed = || WorldError::MalformedHierarchy {
            obj_id: self.obj_id,
            max_depth: MAX_HIERARCHY_DEPTH,
        };

        let mut seen = HashSet::from([self.obj_id]);
        let mut lineage = vec![Arc::clone(self)];
        for _ in 0..MAX_HIERARCHY_DEPTH {
            let Some(parent) = lineage.last().and_then(|link| link.parent()) else {
                return Ok(lineage);
            };
            if !seen.insert(parent.obj_id) {
                return Err(malformed());
            }
            lineage.push(parent);
        }
        Err(malformed())
    }

    /// The ancestor with no parent (the object itself when unattached).
    pub fn root(self: &Arc<Self>) -> Result<Arc<GameObject>, WorldError> {
        let mut lineage = self.lineage()?;
        Ok(lineage.pop().unwrap_or_else(|| Arc::clone(self)))
    }

    /// Attach `child` under `parent`, detaching it from any previous parent.
    ///
    /// Refuses links that would close a cycle.
    pub fn attach(parent: &Arc<GameObject>, child: &Arc<GameObject>) -> Result<(), WorldError> {
        let lineage = parent.lineage()?;
        if lineage.iter().any(|link| link.obj_id == child.obj_id) {
            return Err(WorldError::MalformedHierarchy {
                obj_id: child.obj_id,
                max_depth: MAX_HIERARCHY_DEPTH,
            });
        }

        Self::detach(child);
        child.state.write().parent = Some(Arc::downgrade(parent));
        parent.state.write().children.push(Arc::clone(child));
        Ok(())
    }

    pub fn detach(child: &Arc<GameObject>) {
        if let Some(parent) = child.parent() {
            parent
                .state
                .write()
                .children
                .retain(|c| c.obj_id != child.obj_id);
        }
        child.state.write().parent = None;
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Hand a packet to this entity's sink. Returns `false` when it has none.
    pub fn send_packet(&self, packet: &GamePacket) -> bool {
        match &self.sink {
            Some(sink) => {
                sink.send_packet(packet);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
impl GameObject {
    /// Wire a parent link without the cycle check.
    pub(crate) fn force_parent(child: &Arc<GameObject>, parent: &Arc<GameObject>) {
        child.state.write().parent = Some(Arc::downgrade(parent));
        parent.state.write().children.push(Arc::clone(child));
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct GameObjectBuilder {
    obj_id: ObjId,
    kind: ObjectKind,
    name: String,
    db_id: u32,
    owner_id: u32,
    house_db_id: u32,
    race: u8,
    faction_mother_id: u32,
    model_size: f32,
    visible: bool,
    transform: Transform,
    sink: Option<Arc<dyn PacketSink>>,
}

impl GameObjectBuilder {
    fn new(obj_id: ObjId, kind: ObjectKind) -> Self {
        Self {
            obj_id,
            kind,
            name: String::new(),
            db_id: 0,
            owner_id: 0,
            house_db_id: 0,
            race: 0,
            faction_mother_id: 0,
            model_size: 0.0,
            visible: true,
            transform: Transform::default(),
            sink: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn db_id(mut self, db_id: u32) -> Self {
        self.db_id = db_id;
        self
    }

    pub fn owner_id(mut self, owner_id: u32) -> Self {
        self.owner_id = owner_id;
        self
    }

    pub fn house_db_id(mut self, house_db_id: u32) -> Self {
        self.house_db_id = house_db_id;
        self
    }

    pub fn race(mut self, race: u8) -> Self {
        self.race = race;
        self
    }

    pub fn faction_mother_id(mut self, faction_mother_id: u32) -> Self {
        self.faction_mother_id = faction_mother_id;
        self
    }

    pub fn model_size(mut self, model_size: f32) -> Self {
        self.model_size = model_size.max(0.0);
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Shorthand for an unrotated transform.
    pub fn at(self, world_id: WorldId, zone_id: ZoneId, position: Vec3) -> Self {
        self.transform(Transform::new(world_id, zone_id, position))
    }

    pub fn sink(mut self, sink: Arc<dyn PacketSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Arc<GameObject> {
        Arc::new(GameObject {
            obj_id: self.obj_id,
            kind: self.kind,
            name: self.name,
            db_id: self.db_id,
            owner_id: self.owner_id,
            house_db_id: self.house_db_id,
            race: self.race,
            faction_mother_id: self.faction_mother_id,
            model_size: self.model_size,
            visible: AtomicBool::new(self.visible),
            state: RwLock::new(ObjectState {
                transform: self.transform,
                parent: None,
                children: Vec::new(),
                region: None,
            }),
            sink: self.sink,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(id: ObjId, x: f32, y: f32) -> Arc<GameObject> {
        GameObject::builder(id, ObjectKind::Object)
            .at(1, 10, Vec3::new(x, y, 0.0))
            .build()
    }

    #[test]
    fn character_belongs_to_unit_categories() {
        let kind = ObjectKind::Character;
        assert!(kind.is(Category::Object));
        assert!(kind.is(Category::BaseUnit));
        assert!(kind.is(Category::Unit));
        assert!(kind.is(Category::Character));
        assert!(!kind.is(Category::Npc));
        assert!(!kind.is(Category::Doodad));
    }

    #[test]
    fn doodad_is_base_unit_but_not_unit() {
        assert!(ObjectKind::Doodad.is(Category::BaseUnit));
        assert!(!ObjectKind::Doodad.is(Category::Unit));
    }

    #[test]
    fn child_world_position_follows_parent_heading() {
        let ship = obj(1, 100.0, 100.0);
        ship.set_transform(
            Transform::new(1, 10, Vec3::new(100.0, 100.0, 0.0))
                .with_yaw(std::f32::consts::FRAC_PI_2),
        );
        let cannon = obj(2, 10.0, 0.0);
        GameObject::attach(&ship, &cannon).unwrap();

        let pos = cannon.world_position();
        assert!((pos.x - 100.0).abs() < 1e-3, "{}", pos);
        assert!((pos.y - 110.0).abs() < 1e-3, "{}", pos);
        assert_eq!(cannon.root().unwrap().obj_id, 1);
    }

    #[test]
    fn attach_rejects_cycles() {
        let a = obj(1, 0.0, 0.0);
        let b = obj(2, 0.0, 0.0);
        GameObject::attach(&a, &b).unwrap();
        assert!(matches!(
            GameObject::attach(&b, &a),
            Err(WorldError::MalformedHierarchy { obj_id: 1, .. })
        ));
        assert!(GameObject::attach(&a, &a).is_err());
    }

    #[test]
    fn root_walk_detects_forced_cycle() {
        let a = obj(1, 0.0, 0.0);
        let b = obj(2, 0.0, 0.0);
        GameObject::force_parent(&a, &b);
        GameObject::force_parent(&b, &a);
        assert!(a.root().is_err());
        // Falls back to the local transform instead of looping.
        assert_eq!(a.world_position(), Vec3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn detach_clears_both_sides() {
        let a = obj(1, 0.0, 0.0);
        let b = obj(2, 0.0, 0.0);
        GameObject::attach(&a, &b).unwrap();
        GameObject::detach(&b);
        assert!(b.parent().is_none());
        assert!(a.children().is_empty());
    }
}
