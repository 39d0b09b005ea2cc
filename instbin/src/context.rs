//! Session state for one serialize call.
//!
//! [`WriteContext::build`] walks the graph from the root and records every
//! persisted node in a [`TypeRecord`] of its type. Type records keep
//! first-visit order; referents are dense and assigned in visit order.

use std::collections::{HashMap, VecDeque};

use crate::error::{InstbinError, Result};
use crate::node::Node;
use crate::registry::{CachedType, Registry};
use crate::scene::{NodeId, SceneGraph};
use crate::value::{DataType, Value};

/// Session-scoped id of a node inside one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Referent(pub i32);

/// Inputs that shape the traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Passed to lifecycle hooks; set by clone calls.
    pub clone: bool,
    /// Also persist subtrees rooted at excludable node types.
    pub include_excludable: bool,
}

/// All nodes of one type within a session.
pub(crate) struct TypeRecord<'r> {
    pub cached: &'r CachedType,
    pub referents: Vec<Referent>,
    pub nodes: Vec<NodeId>,
}

pub(crate) struct WriteContext<'r> {
    registry: &'r Registry,
    root: NodeId,
    options: SerializeOptions,
    records: Vec<TypeRecord<'r>>,
    record_index: HashMap<u16, usize>,
    referents: HashMap<NodeId, Referent>,
    /// Visited nodes in referent order.
    visited: Vec<NodeId>,
    /// Referenced descendants waiting for a visit once the children walk is done.
    pending: VecDeque<NodeId>,
}

impl<'r> WriteContext<'r> {
    /// Walks the subtree under `root` and runs `before_serialize` on every
    /// visited node.
    pub fn build(
        registry: &'r Registry,
        graph: &mut SceneGraph,
        root: NodeId,
        options: SerializeOptions,
    ) -> Result<Self> {
        let node = graph.node(root).ok_or(InstbinError::UnknownNode(root))?;
        if registry.type_of(node).is_none() {
            return Err(InstbinError::UnregisteredType { node: root });
        }

        let mut ctx = Self {
            registry,
            root,
            options,
            records: Vec::new(),
            record_index: HashMap::new(),
            referents: HashMap::new(),
            visited: Vec::new(),
            pending: VecDeque::new(),
        };

        ctx.walk(graph, root);
        while let Some(target) = ctx.pending.pop_front() {
            if ctx.is_reachable(graph, target) {
                ctx.walk(graph, target);
            }
        }

        if ctx.visited.is_empty() {
            log::warn!("Root {root} is not archivable; the stream will be empty");
        }
        log::trace!(
            "Traversal from {root}: {} types, {} objects",
            ctx.records.len(),
            ctx.visited.len()
        );
        Ok(ctx)
    }

    /// Pre-order walk of the subtree under `start`.
    fn walk(&mut self, graph: &mut SceneGraph, start: NodeId) {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if self.record(graph, id) {
                stack.extend(graph.children(id).iter().rev().copied());
            }
        }
    }

    /// Assigns a referent to `id`. Returns `false` if the node and its
    /// subtree are not persisted.
    fn record(&mut self, graph: &mut SceneGraph, id: NodeId) -> bool {
        if !graph.archivable(id) || self.referents.contains_key(&id) {
            return false;
        }
        let Some(node) = graph.node(id) else {
            return false;
        };
        let Some(cached) = self.registry.type_of(node) else {
            log::warn!(
                "Skipping node {id} (`{}`): its type is not registered",
                graph.name(id).unwrap_or_default()
            );
            return false;
        };
        if id != self.root && cached.is_excludable() && !self.options.include_excludable {
            log::trace!("Excluding subtree at {id} (`{}`)", cached.name());
            return false;
        }

        let referent = Referent(self.visited.len() as i32);
        let index = *self.record_index.entry(cached.type_id()).or_insert_with(|| {
            self.records.push(TypeRecord {
                cached,
                referents: Vec::new(),
                nodes: Vec::new(),
            });
            self.records.len() - 1
        });
        let record = &mut self.records[index];
        record.referents.push(referent);
        record.nodes.push(id);
        self.referents.insert(id, referent);
        self.visited.push(id);

        let clone = self.options.clone;
        graph.run_hook(id, clone, |node: &mut dyn Node, ctx, _| {
            node.before_serialize(ctx)
        });

        // Referenced descendants are queued so the children walk keeps
        // sibling order. Once the walk is done, a target whose parent was not
        // recorded lies outside the root or in a skipped subtree; it is
        // written as null.
        for property in cached.serializable_properties() {
            if property.data_type() != DataType::Referent || property.is_parent() {
                continue;
            }
            if let Some(Value::Referent(Some(target))) = property.read(graph, id)
                && !self.referents.contains_key(&target)
            {
                self.pending.push_back(target);
            }
        }
        true
    }

    /// Whether a queued target hangs below a recorded node.
    fn is_reachable(&self, graph: &SceneGraph, target: NodeId) -> bool {
        graph
            .parent(target)
            .is_some_and(|parent| self.referents.contains_key(&parent))
    }

    pub fn records(&self) -> &[TypeRecord<'r>] {
        &self.records
    }

    /// Visited nodes in referent order.
    pub fn visited(&self) -> &[NodeId] {
        &self.visited
    }

    pub fn referent_of(&self, id: NodeId) -> Option<Referent> {
        self.referents.get(&id).copied()
    }

    pub fn total_types(&self) -> usize {
        self.records.len()
    }

    pub fn total_objects(&self) -> usize {
        self.visited.len()
    }
}
