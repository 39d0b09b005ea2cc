//! The node contract.
//!
//! Every object stored in a [`SceneGraph`] implements [`Node`], which
//! carries the optional lifecycle hooks the serializer invokes. Types that
//! take part in serialization additionally implement [`NodeType`], the
//! static registration table consumed by
//! [`RegistryBuilder::register`](crate::RegistryBuilder::register).
//!
//! `NodeType` is usually derived:
//!
//! ```ignore
//! #[derive(Default, NodeType)]
//! #[node(id = 5)]
//! struct Part {
//!     #[property(id = 1)]
//!     size: f32,
//!     #[property(id = 2)]
//!     anchor: Option<NodeId>,
//! }
//!
//! impl Node for Part {}
//! ```

use std::any::{Any, TypeId};

use crate::property::TypeBuilder;
use crate::scene::{NodeId, SceneGraph};

/// Per-call information handed to lifecycle hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookContext {
    /// The node the hook runs on.
    pub node: NodeId,
    /// `true` when the call is part of a clone.
    pub clone: bool,
}

/// A graph element stored in a [`SceneGraph`].
///
/// All hooks default to no-ops. While a hook runs, the node is detached from
/// its slot, so lookups of `ctx.node` through the graph return `None`.
pub trait Node: Any + Send + Sync {
    /// Runs when the node is assigned a referent during serialization.
    fn before_serialize(&mut self, _ctx: &HookContext) {}

    /// Runs on every visited node once the stream has been written.
    fn after_serialize(&mut self, _ctx: &HookContext) {}

    /// Runs on a freshly constructed (or reused) node before any property is applied.
    fn before_deserialize(&mut self, _ctx: &HookContext) {}

    /// Runs on every constructed node, in construction order, after all
    /// properties have been applied.
    fn after_deserialize(&mut self, _ctx: &HookContext, _graph: &SceneGraph) {}

    /// Runs after the node's parent changed.
    ///
    /// During deserialization this fires in the deferred pass, so every
    /// non-deferred property of every loaded node already holds its final
    /// value.
    fn on_parent_changed(&mut self, _node: NodeId, _parent: Option<NodeId>, _graph: &SceneGraph) {
    }
}

/// Returns the concrete Rust type of a node.
pub(crate) fn rust_type_of(node: &dyn Node) -> TypeId {
    let any: &dyn Any = node;
    any.type_id()
}

pub(crate) fn downcast_ref<T: Node>(node: &dyn Node) -> Option<&T> {
    let any: &dyn Any = node;
    any.downcast_ref::<T>()
}

pub(crate) fn downcast_mut<T: Node>(node: &mut dyn Node) -> Option<&mut T> {
    let any: &mut dyn Any = node;
    any.downcast_mut::<T>()
}

/// Whether a node type is part of the public, persisted surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Must declare a type id; missing ids fail the registry build.
    #[default]
    Public,
    /// May omit a type id, in which case the type is not registered.
    Internal,
}

/// Static registration data for a serializable node type.
pub trait NodeType: Node + Default + Sized {
    /// Type name, used in diagnostics and name lookups.
    const NAME: &'static str;

    /// Stable numeric id written to TYPE records. Must be unique and non-zero.
    const TYPE_ID: Option<u16>;

    const VISIBILITY: Visibility = Visibility::Public;

    /// Process-wide singleton: deserialization reuses the graph's existing
    /// instance instead of constructing a new one.
    const SINGLETON: bool = false;

    /// Subtrees rooted at this type are skipped unless
    /// [`SerializeOptions::include_excludable`](crate::SerializeOptions) is set.
    const EXCLUDABLE: bool = false;

    /// Declare the type's properties.
    fn describe(builder: &mut TypeBuilder<Self>);
}
