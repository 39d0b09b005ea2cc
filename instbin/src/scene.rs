//! Host scene graph: an arena of nodes with a parent/child hierarchy.
//!
//! The serializer does not own nodes; it reads and writes them through a
//! [`SceneGraph`]. Each slot holds the boxed [`Node`] plus the host-level
//! state every node shares: a name, an `archivable` flag, its parent and its
//! ordered children. Parent and children are kept consistent by
//! [`SceneGraph::set_parent`].
//!
//! # Example
//!
//! ```ignore
//! let mut graph = SceneGraph::new();
//! let model = graph.spawn_named("Model", Folder::default());
//! let part = graph.spawn_child(model, "Part", Part::default())?;
//! assert_eq!(graph.children(model), &[part]);
//! ```

use std::any::TypeId;
use std::collections::HashMap;

use crate::error::HierarchyError;
use crate::node::{self, HookContext, Node, NodeType};

/// Generational handle to a node in a [`SceneGraph`].
///
/// A despawned slot bumps its generation, so stale handles never alias a
/// node spawned later into the same slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Returns the slot index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Returns the slot generation.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({}v{})", self.index, self.generation)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct NodeEntry {
    /// `None` only while a hook runs on the node.
    object: Option<Box<dyn Node>>,
    name: String,
    archivable: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

struct Slot {
    generation: u32,
    entry: Option<NodeEntry>,
}

/// Arena of nodes with hierarchy, names and archivable flags.
#[derive(Default)]
pub struct SceneGraph {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    singletons: HashMap<TypeId, NodeId>,
    count: usize,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns `true` if `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.entry(id).is_some()
    }

    /// Iterates over all live node ids in slot order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|_| NodeId {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    // -- Spawning -----------------------------------------------------------

    /// Spawns a detached node with an empty name.
    pub fn spawn<N: Node>(&mut self, node: N) -> NodeId {
        self.spawn_boxed(String::new(), Box::new(node))
    }

    /// Spawns a detached node with the given name.
    pub fn spawn_named<N: Node>(&mut self, name: impl Into<String>, node: N) -> NodeId {
        self.spawn_boxed(name.into(), Box::new(node))
    }

    /// Spawns a named node as the last child of `parent`.
    pub fn spawn_child<N: Node>(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        node: N,
    ) -> Result<NodeId, HierarchyError> {
        if !self.contains(parent) {
            return Err(HierarchyError::UnknownNode(parent));
        }
        let id = self.spawn_named(name, node);
        self.set_parent(id, Some(parent))?;
        Ok(id)
    }

    pub(crate) fn spawn_boxed(&mut self, name: String, object: Box<dyn Node>) -> NodeId {
        let entry = NodeEntry {
            object: Some(object),
            name,
            archivable: true,
            parent: None,
            children: Vec::new(),
        };
        self.count += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                entry: Some(entry),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    /// Returns the graph's instance of singleton type `N`, spawning it on first use.
    pub fn singleton<N: NodeType>(&mut self) -> NodeId {
        let key = TypeId::of::<N>();
        if let Some(&id) = self.singletons.get(&key)
            && self.contains(id)
        {
            return id;
        }
        let id = self.spawn_named(N::NAME, N::default());
        self.singletons.insert(key, id);
        id
    }

    /// Returns the existing instance of singleton type `N`, if one was created.
    pub fn singleton_id<N: NodeType>(&self) -> Option<NodeId> {
        self.singletons
            .get(&TypeId::of::<N>())
            .copied()
            .filter(|&id| self.contains(id))
    }

    /// Despawns a node and all of its descendants.
    ///
    /// Returns `false` if the node does not exist.
    pub fn despawn_recursive(&mut self, id: NodeId) -> bool {
        if !self.contains(id) {
            return false;
        }
        if let Some(parent) = self.parent(id)
            && let Some(entry) = self.entry_mut(parent)
        {
            entry.children.retain(|&c| c != id);
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let slot = &mut self.slots[current.index as usize];
            if let Some(entry) = slot.entry.take() {
                stack.extend(entry.children);
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(current.index);
                self.count -= 1;
            }
        }
        self.singletons.retain(|_, singleton| *singleton != id && {
            let slot = &self.slots[singleton.index as usize];
            slot.generation == singleton.generation && slot.entry.is_some()
        });
        true
    }

    // -- Node access ----------------------------------------------------------

    /// Returns the node object, or `None` if it does not exist.
    pub fn node(&self, id: NodeId) -> Option<&dyn Node> {
        self.entry(id)?.object.as_deref()
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut dyn Node> {
        self.entry_mut(id)?.object.as_deref_mut()
    }

    /// Returns the node downcast to `T`.
    pub fn get<T: Node>(&self, id: NodeId) -> Option<&T> {
        node::downcast_ref::<T>(self.node(id)?)
    }

    pub fn get_mut<T: Node>(&mut self, id: NodeId) -> Option<&mut T> {
        node::downcast_mut::<T>(self.node_mut(id)?)
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.entry(id).map(|e| e.name.as_str())
    }

    /// Renames a node. Returns `false` if the node does not exist.
    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.name = name.into();
                true
            }
            None => false,
        }
    }

    /// Whether the node is persisted. Missing nodes are not archivable.
    pub fn archivable(&self, id: NodeId) -> bool {
        self.entry(id).is_some_and(|e| e.archivable)
    }

    pub fn set_archivable(&mut self, id: NodeId, archivable: bool) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.archivable = archivable;
                true
            }
            None => false,
        }
    }

    // -- Hierarchy ------------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.entry(id)?.parent
    }

    /// Ordered children of a node. Empty for missing nodes.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.entry(id).map_or(&[], |e| e.children.as_slice())
    }

    /// Returns `true` if `ancestor` is a strict ancestor of `id`.
    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.parent(id);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.parent(p);
        }
        false
    }

    /// Moves `child` under `parent` (appended last), or detaches it with `None`.
    ///
    /// Keeps the old parent's children, the new parent's children and the
    /// child's parent consistent, then fires [`Node::on_parent_changed`].
    /// Re-parenting to the current parent is a no-op.
    pub fn set_parent(
        &mut self,
        child: NodeId,
        parent: Option<NodeId>,
    ) -> Result<(), HierarchyError> {
        if !self.contains(child) {
            return Err(HierarchyError::UnknownNode(child));
        }
        if let Some(p) = parent {
            if !self.contains(p) {
                return Err(HierarchyError::UnknownNode(p));
            }
            if p == child {
                return Err(HierarchyError::SelfParent(child));
            }
            // A leaf cannot be an ancestor of `p`.
            if !self.children(child).is_empty() && self.is_descendant_of(p, child) {
                return Err(HierarchyError::Cycle { child, parent: p });
            }
        }

        let old_parent = self.parent(child);
        if old_parent == parent {
            return Ok(());
        }
        if let Some(old) = old_parent
            && let Some(entry) = self.entry_mut(old)
        {
            entry.children.retain(|&c| c != child);
        }
        if let Some(p) = parent
            && let Some(entry) = self.entry_mut(p)
        {
            entry.children.push(child);
        }
        if let Some(entry) = self.entry_mut(child) {
            entry.parent = parent;
        }

        self.with_detached(child, |node, graph| {
            node.on_parent_changed(child, parent, graph)
        });
        Ok(())
    }

    /// Runs `f` with the node taken out of its slot, so the hook can read the
    /// rest of the graph while mutating the node.
    pub(crate) fn with_detached<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut dyn Node, &SceneGraph) -> R,
    ) -> Option<R> {
        let mut object = self.entry_mut(id)?.object.take()?;
        let result = f(&mut *object, self);
        if let Some(entry) = self.entry_mut(id) {
            entry.object = Some(object);
        }
        Some(result)
    }

    /// Runs a lifecycle hook on a node.
    pub(crate) fn run_hook(
        &mut self,
        id: NodeId,
        clone: bool,
        hook: impl FnOnce(&mut dyn Node, &HookContext, &SceneGraph),
    ) {
        let ctx = HookContext { node: id, clone };
        self.with_detached(id, |node, graph| hook(node, &ctx, graph));
    }

    fn entry(&self, id: NodeId) -> Option<&NodeEntry> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, id: NodeId) -> Option<&mut NodeEntry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }
}

impl std::fmt::Debug for SceneGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneGraph")
            .field("nodes", &self.count)
            .field("singletons", &self.singletons.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::TypeBuilder;

    #[derive(Default)]
    struct Folder;
    impl Node for Folder {}

    #[derive(Default)]
    struct Lighting;
    impl Node for Lighting {}
    impl NodeType for Lighting {
        const NAME: &'static str = "Lighting";
        const TYPE_ID: Option<u16> = Some(40);
        const SINGLETON: bool = true;
        fn describe(_builder: &mut TypeBuilder<Self>) {}
    }

    /// Records every parent change it observes.
    #[derive(Default)]
    struct Tracker {
        seen: Vec<Option<NodeId>>,
    }
    impl Node for Tracker {
        fn on_parent_changed(&mut self, node: NodeId, parent: Option<NodeId>, graph: &SceneGraph) {
            // The node itself is detached while the hook runs.
            assert!(graph.node(node).is_none());
            self.seen.push(parent);
        }
    }

    #[test]
    fn spawn_and_lookup() {
        let mut graph = SceneGraph::new();
        let a = graph.spawn_named("A", Folder);
        assert!(graph.contains(a));
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.name(a), Some("A"));
        assert!(graph.archivable(a));
        assert!(graph.get::<Folder>(a).is_some());
        assert!(graph.get::<Tracker>(a).is_none());
    }

    #[test]
    fn set_parent_creates_relationship() {
        let mut graph = SceneGraph::new();
        let parent = graph.spawn(Folder);
        let child = graph.spawn(Folder);
        graph.set_parent(child, Some(parent)).unwrap();
        assert_eq!(graph.parent(child), Some(parent));
        assert_eq!(graph.children(parent), &[child]);
    }

    #[test]
    fn set_parent_reparents() {
        let mut graph = SceneGraph::new();
        let p1 = graph.spawn(Folder);
        let p2 = graph.spawn(Folder);
        let child = graph.spawn_child(p1, "c", Folder).unwrap();
        graph.set_parent(child, Some(p2)).unwrap();
        assert!(graph.children(p1).is_empty());
        assert_eq!(graph.children(p2), &[child]);
        graph.set_parent(child, None).unwrap();
        assert!(graph.children(p2).is_empty());
        assert_eq!(graph.parent(child), None);
    }

    #[test]
    fn set_parent_rejects_cycles() {
        let mut graph = SceneGraph::new();
        let a = graph.spawn(Folder);
        let b = graph.spawn_child(a, "b", Folder).unwrap();
        let c = graph.spawn_child(b, "c", Folder).unwrap();
        assert_eq!(
            graph.set_parent(a, Some(c)),
            Err(HierarchyError::Cycle { child: a, parent: c })
        );
        assert_eq!(graph.set_parent(a, Some(a)), Err(HierarchyError::SelfParent(a)));
        assert!(graph.is_descendant_of(c, a));
        assert!(!graph.is_descendant_of(a, c));
    }

    #[test]
    fn parent_hook_fires_once_per_change() {
        let mut graph = SceneGraph::new();
        let parent = graph.spawn(Folder);
        let child = graph.spawn(Tracker::default());
        graph.set_parent(child, Some(parent)).unwrap();
        graph.set_parent(child, Some(parent)).unwrap();
        graph.set_parent(child, None).unwrap();
        assert_eq!(
            graph.get::<Tracker>(child).unwrap().seen,
            vec![Some(parent), None]
        );
    }

    #[test]
    fn despawn_recursive_removes_subtree_and_invalidates_ids() {
        let mut graph = SceneGraph::new();
        let root = graph.spawn(Folder);
        let a = graph.spawn_child(root, "a", Folder).unwrap();
        let b = graph.spawn_child(a, "b", Folder).unwrap();
        assert!(graph.despawn_recursive(a));
        assert_eq!(graph.len(), 1);
        assert!(!graph.contains(a));
        assert!(!graph.contains(b));
        assert!(graph.children(root).is_empty());

        // Reused slot gets a new generation.
        let fresh = graph.spawn(Folder);
        assert!(!graph.contains(a) || fresh != a);
        assert!(!graph.despawn_recursive(a));
    }

    #[test]
    fn singleton_is_created_once() {
        let mut graph = SceneGraph::new();
        assert_eq!(graph.singleton_id::<Lighting>(), None);
        let first = graph.singleton::<Lighting>();
        let second = graph.singleton::<Lighting>();
        assert_eq!(first, second);
        assert_eq!(graph.name(first), Some("Lighting"));
        graph.despawn_recursive(first);
        assert_eq!(graph.singleton_id::<Lighting>(), None);
        assert_ne!(graph.singleton::<Lighting>(), first);
    }

    #[test]
    fn iter_lists_live_nodes() {
        let mut graph = SceneGraph::new();
        let a = graph.spawn(Folder);
        let b = graph.spawn(Folder);
        graph.despawn_recursive(a);
        assert_eq!(graph.iter().collect::<Vec<_>>(), vec![b]);
    }
}
