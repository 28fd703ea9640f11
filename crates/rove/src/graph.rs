//! The graph store: arena-allocated nodes, edges, walkers, and graph roots.
//!
//! Nodes and edges form a cyclic object graph, so entities are arena records
//! keyed by [`EntityId`] and every cross-reference is an id, never an owning
//! handle. The store owns the arena; the interpreter holds ids and goes
//! through the store for every read or mutation.

use std::{fmt, str::FromStr};

use ahash::AHashMap;
use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{
    action::Action,
    diag::{RtError, RtResult},
    heap::Heap,
    value::{value_to_json, Value},
};

/// Globally unique entity identity, rendered as a `urn:uuid:` string.
///
/// The jid is the stable name an entity keeps across serialization; contexts
/// that round-trip through documents store jids as strings and are upgraded
/// back to live handles on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Jid(Uuid);

impl Jid {
    fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "urn:uuid:{}", self.0)
    }
}

impl FromStr for Jid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("urn:uuid:").unwrap_or(s);
        Uuid::parse_str(raw).map(Self)
    }
}

/// Arena index of an entity within the graph store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(u32);

impl EntityId {
    fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("entity id overflow"))
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// The declared kind of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    Node,
    Edge,
    Walker,
    Graph,
}

impl EntityKind {
    /// Anchors are meaningful where an entity can stand in for a result.
    pub fn supports_anchor(self) -> bool {
        matches!(self, Self::Node | Self::Walker)
    }
}

type EdgeList = SmallVec<[EntityId; 4]>;

/// An entity record: a node, edge, walker, or graph root.
///
/// The `context` mapping is the sole source of truth for user-visible
/// attributes. `_private` is a reserved context key holding the list of
/// attribute names declared private.
#[derive(Debug)]
pub struct Entity {
    pub jid: Jid,
    /// Architype name.
    pub name: String,
    pub kind: EntityKind,
    pub context: IndexMap<String, Value>,
    /// Designated result attribute; immutable once set.
    pub anchor: Option<String>,
    pub entry_actions: Vec<Action>,
    pub exit_actions: Vec<Action>,
    pub activity_actions: Vec<Action>,
    // node side
    pub inbound: EdgeList,
    pub outbound: EdgeList,
    pub bidirected: EdgeList,
    // edge side
    pub from_node: Option<EntityId>,
    pub to_node: Option<EntityId>,
}

impl Entity {
    fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            jid: Jid::fresh(),
            name: name.into(),
            kind,
            context: IndexMap::new(),
            anchor: None,
            entry_actions: vec![],
            exit_actions: vec![],
            activity_actions: vec![],
            inbound: SmallVec::new(),
            outbound: SmallVec::new(),
            bidirected: SmallVec::new(),
            from_node: None,
            to_node: None,
        }
    }
}

/// An ordered, duplicate-free collection of entity handles.
///
/// This is the language's first-class collection over graph entities;
/// insertion order is preserved and repeated adds are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySet {
    ids: IndexSet<EntityId, ahash::RandomState>,
}

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(id: EntityId) -> Self {
        let mut set = Self::new();
        set.add(id);
        set
    }

    /// Adds a handle, returning whether it was newly inserted.
    pub fn add(&mut self, id: EntityId) -> bool {
        self.ids.insert(id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.ids.iter().copied()
    }

    pub fn union_with(&mut self, other: &Self) {
        for id in other.iter() {
            self.add(id);
        }
    }

    /// Members of `self` also present in `other`, in `self`'s order.
    pub fn intersect(&self, other: &Self) -> Self {
        let mut out = Self::new();
        for id in self.iter() {
            if other.contains(id) {
                out.add(id);
            }
        }
        out
    }
}

impl FromIterator<EntityId> for EntitySet {
    fn from_iter<T: IntoIterator<Item = EntityId>>(iter: T) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.add(id);
        }
        set
    }
}

/// Owner of all entity records for one machine.
///
/// Slots are tombstoned on destroy so ids stay stable; accessors filter out
/// dead ids, which also covers edge lists that still mention a destroyed
/// edge.
#[derive(Debug, Default)]
pub struct GraphStore {
    slots: Vec<Option<Entity>>,
    by_jid: AHashMap<Jid, EntityId>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, kind: EntityKind, name: impl Into<String>) -> EntityId {
        let entity = Entity::new(kind, name);
        let id = EntityId::new(self.slots.len());
        self.by_jid.insert(entity.jid, id);
        log::trace!("create {} {} ({})", entity.kind, entity.name, entity.jid);
        self.slots.push(Some(entity));
        id
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Iterates every live entity with its id.
    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|e| (EntityId::new(i), e)))
    }

    pub fn lookup_jid(&self, jid: &Jid) -> Option<EntityId> {
        self.by_jid.get(jid).copied().filter(|id| self.get(*id).is_some())
    }

    /// Removes an entity. Destroying a node also destroys its incident
    /// edges; destroying an edge unlinks it from both endpoints.
    pub fn destroy(&mut self, id: EntityId) {
        let Some(entity) = self.slots.get_mut(id.index()).and_then(Option::take) else {
            return;
        };
        self.by_jid.remove(&entity.jid);
        match entity.kind {
            EntityKind::Edge => {
                for end in [entity.from_node, entity.to_node].into_iter().flatten() {
                    if let Some(node) = self.get_mut(end) {
                        node.inbound.retain(|e| *e != id);
                        node.outbound.retain(|e| *e != id);
                        node.bidirected.retain(|e| *e != id);
                    }
                }
            }
            _ => {
                let incident: Vec<EntityId> = entity
                    .inbound
                    .iter()
                    .chain(entity.outbound.iter())
                    .chain(entity.bidirected.iter())
                    .copied()
                    .collect();
                for edge in incident {
                    self.destroy(edge);
                }
            }
        }
    }

    fn live_edges(&self, ids: &EdgeList) -> Vec<EntityId> {
        ids.iter().copied().filter(|id| self.get(*id).is_some()).collect()
    }

    pub fn outbound_edges(&self, node: EntityId) -> Vec<EntityId> {
        self.get(node).map(|n| self.live_edges(&n.outbound)).unwrap_or_default()
    }

    pub fn inbound_edges(&self, node: EntityId) -> Vec<EntityId> {
        self.get(node).map(|n| self.live_edges(&n.inbound)).unwrap_or_default()
    }

    pub fn bidirected_edges(&self, node: EntityId) -> Vec<EntityId> {
        self.get(node)
            .map(|n| self.live_edges(&n.bidirected))
            .unwrap_or_default()
    }

    /// Every edge incident to `node`, regardless of direction.
    pub fn attached_edges(&self, node: EntityId) -> Vec<EntityId> {
        let mut out = self.outbound_edges(node);
        out.extend(self.inbound_edges(node));
        out.extend(self.bidirected_edges(node));
        out
    }

    /// Edges linking `a` and `b` in either direction.
    pub fn attached_edges_between(&self, a: EntityId, b: EntityId) -> Vec<EntityId> {
        self.attached_edges(a)
            .into_iter()
            .filter(|edge| self.edge_links(*edge, a, b))
            .collect()
    }

    fn edge_links(&self, edge: EntityId, a: EntityId, b: EntityId) -> bool {
        self.get(edge).is_some_and(|e| {
            (e.from_node == Some(a) && e.to_node == Some(b)) || (e.from_node == Some(b) && e.to_node == Some(a))
        })
    }

    /// Attaches `edge` pointing from `src` to `dst`.
    pub fn attach_outbound(&mut self, src: EntityId, dst: EntityId, edge: EntityId) {
        if let Some(e) = self.get_mut(edge) {
            e.from_node = Some(src);
            e.to_node = Some(dst);
        }
        if let Some(n) = self.get_mut(src) {
            n.outbound.push(edge);
        }
        if let Some(n) = self.get_mut(dst) {
            n.inbound.push(edge);
        }
    }

    /// Attaches `edge` pointing from `dst` to `src`.
    pub fn attach_inbound(&mut self, src: EntityId, dst: EntityId, edge: EntityId) {
        self.attach_outbound(dst, src, edge);
    }

    /// Attaches `edge` between `a` and `b` without a direction.
    pub fn attach_bidirected(&mut self, a: EntityId, b: EntityId, edge: EntityId) {
        if let Some(e) = self.get_mut(edge) {
            e.from_node = Some(a);
            e.to_node = Some(b);
        }
        if let Some(n) = self.get_mut(a) {
            n.bidirected.push(edge);
        }
        if let Some(n) = self.get_mut(b) {
            n.bidirected.push(edge);
        }
    }

    /// Detaches (and destroys) every candidate edge that links `a` and `b`.
    /// Returns how many edges were removed.
    pub fn detach_edges(&mut self, a: EntityId, b: EntityId, candidates: &[EntityId]) -> usize {
        let mut removed = 0;
        for edge in candidates {
            if self.edge_links(*edge, a, b) {
                self.destroy(*edge);
                removed += 1;
            }
        }
        removed
    }

    /// The endpoint(s) of `edge` on the far side of `relative_to`.
    ///
    /// An edge not incident to `relative_to` contributes both endpoints.
    pub fn far_end(&self, edge: EntityId, relative_to: EntityId) -> Vec<EntityId> {
        let Some(e) = self.get(edge) else { return vec![] };
        if e.from_node == Some(relative_to) {
            e.to_node.into_iter().collect()
        } else if e.to_node == Some(relative_to) {
            e.from_node.into_iter().collect()
        } else {
            [e.from_node, e.to_node].into_iter().flatten().collect()
        }
    }

    /// The value of the entity's anchor attribute, `Null` when unset.
    pub fn anchor_value(&self, id: EntityId) -> Value {
        self.get(id)
            .and_then(|e| e.anchor.as_ref().and_then(|a| e.context.get(a)).cloned())
            .unwrap_or(Value::Null)
    }

    /// Serializes an entity to a JSON document.
    ///
    /// The basic form carries jid, name, kind, and the context (entities
    /// inside the context are rendered as jid strings). The detailed form
    /// adds the anchor and, per kind, edge lists or endpoints.
    pub fn entity_doc(&self, id: EntityId, detailed: bool, heap: &Heap) -> RtResult<serde_json::Value> {
        let entity = self
            .get(id)
            .ok_or_else(|| RtError::not_serializable("entity no longer exists"))?;
        let mut doc = serde_json::Map::new();
        doc.insert("jid".into(), serde_json::Value::String(entity.jid.to_string()));
        doc.insert("name".into(), serde_json::Value::String(entity.name.clone()));
        doc.insert("kind".into(), serde_json::Value::String(entity.kind.to_string()));
        let mut ctx = serde_json::Map::new();
        for (key, value) in &entity.context {
            ctx.insert(key.clone(), value_to_json(value, heap, self)?);
        }
        doc.insert("context".into(), serde_json::Value::Object(ctx));
        if detailed {
            doc.insert(
                "anchor".into(),
                entity
                    .anchor
                    .clone()
                    .map_or(serde_json::Value::Null, serde_json::Value::String),
            );
            match entity.kind {
                EntityKind::Edge => {
                    for (label, end) in [("from", entity.from_node), ("to", entity.to_node)] {
                        let jid = end
                            .and_then(|n| self.get(n))
                            .map_or(serde_json::Value::Null, |n| serde_json::Value::String(n.jid.to_string()));
                        doc.insert(label.into(), jid);
                    }
                }
                _ => {
                    let edge_jids: Vec<serde_json::Value> = self
                        .attached_edges(id)
                        .into_iter()
                        .filter_map(|e| self.get(e))
                        .map(|e| serde_json::Value::String(e.jid.to_string()))
                        .collect();
                    doc.insert("edges".into(), serde_json::Value::Array(edge_jids));
                }
            }
        }
        Ok(serde_json::Value::Object(doc))
    }
}
