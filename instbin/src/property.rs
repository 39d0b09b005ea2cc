//! Property descriptors and the builder used to declare them.
//!
//! A [`CachedProperty`] describes one declared property of a node type: its
//! declaring type, optional property id, [`DataType`], accessor and whether
//! it is applied in the deferred pass. Descriptors are produced once per
//! type by [`NodeType::describe`](crate::NodeType::describe) through a
//! [`TypeBuilder`] and cached in the [`Registry`](crate::Registry).
//!
//! ```ignore
//! impl NodeType for Part {
//!     const NAME: &'static str = "Part";
//!     const TYPE_ID: Option<u16> = Some(5);
//!
//!     fn describe(builder: &mut TypeBuilder<Self>) {
//!         builder.property("Size", 1, |p| &p.size, |p| &mut p.size);
//!         builder.property("Anchor", 2, |p| &p.anchor, |p| &mut p.anchor);
//!         builder.untagged("Velocity", |p| &p.velocity, |p| &mut p.velocity);
//!     }
//! }
//! ```

use std::marker::PhantomData;

use crate::error::HierarchyError;
use crate::node::{self, Node, NodeType};
use crate::scene::{NodeId, SceneGraph};
use crate::value::{DataType, PropertyType, Value};

/// Type id reserved for the properties every node carries.
pub const BASE_TYPE_ID: u16 = 0;
/// Name of the reserved base declaration.
pub const BASE_TYPE_NAME: &str = "Instance";
pub const NAME_PROPERTY_ID: u16 = 1;
pub const PARENT_PROPERTY_ID: u16 = 2;

/// Packed property identifier: low 16 bits declaring type id, high 16 bits
/// property id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyKey(u32);

impl PropertyKey {
    pub const fn new(declaring_type: u16, property_id: u16) -> Self {
        Self(((property_id as u32) << 16) | declaring_type as u32)
    }

    pub const fn declaring_type(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    pub const fn property_id(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The key as stored in a PROP record.
    pub const fn to_wire(self) -> i32 {
        self.0 as i32
    }

    pub const fn from_wire(raw: i32) -> Self {
        Self(raw as u32)
    }
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.declaring_type(), self.property_id())
    }
}

type Getter = Box<dyn Fn(&dyn Node) -> Option<Value> + Send + Sync>;
type Setter = Box<dyn Fn(&mut dyn Node, Value) -> bool + Send + Sync>;

pub(crate) enum Accessor {
    /// A field of the node object.
    Field { get: Getter, set: Setter },
    /// Host-level name stored in the scene graph slot.
    Name,
    /// Host-level parent link.
    Parent,
    /// Declared but not readable.
    Opaque,
}

/// Descriptor of a declared property.
pub struct CachedProperty {
    name: &'static str,
    declaring_type: u16,
    property_id: Option<u16>,
    data_type: DataType,
    deferred: bool,
    accessor: Accessor,
}

impl CachedProperty {
    pub(crate) fn base_properties() -> Vec<CachedProperty> {
        vec![
            CachedProperty {
                name: "Name",
                declaring_type: BASE_TYPE_ID,
                property_id: Some(NAME_PROPERTY_ID),
                data_type: DataType::String,
                deferred: false,
                accessor: Accessor::Name,
            },
            CachedProperty {
                name: "Parent",
                declaring_type: BASE_TYPE_ID,
                property_id: Some(PARENT_PROPERTY_ID),
                data_type: DataType::Referent,
                deferred: true,
                accessor: Accessor::Parent,
            },
        ]
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn declaring_type(&self) -> u16 {
        self.declaring_type
    }

    /// Stable per-type id. `None` marks an untagged property.
    pub fn property_id(&self) -> Option<u16> {
        self.property_id
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Applied in the second pass, after every other property of every node.
    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub fn is_parent(&self) -> bool {
        matches!(self.accessor, Accessor::Parent)
    }

    pub fn key(&self) -> Option<PropertyKey> {
        self.property_id
            .map(|id| PropertyKey::new(self.declaring_type, id))
    }

    /// Tagged and of a supported data type.
    pub fn is_serializable(&self) -> bool {
        self.property_id.is_some() && self.data_type.is_serializable()
    }

    /// Reads the current value from a node.
    pub(crate) fn read(&self, graph: &SceneGraph, id: NodeId) -> Option<Value> {
        match &self.accessor {
            Accessor::Field { get, .. } => get(graph.node(id)?),
            Accessor::Name => graph.name(id).map(|name| Value::String(name.to_owned())),
            Accessor::Parent => graph.contains(id).then(|| Value::Referent(graph.parent(id))),
            Accessor::Opaque => None,
        }
    }

    /// Writes a value into a node.
    ///
    /// Returns `Ok(false)` if the value does not fit the property.
    pub(crate) fn apply(
        &self,
        graph: &mut SceneGraph,
        id: NodeId,
        value: Value,
    ) -> Result<bool, HierarchyError> {
        match (&self.accessor, value) {
            (Accessor::Field { set, .. }, value) => {
                Ok(graph.node_mut(id).is_some_and(|node| set(node, value)))
            }
            (Accessor::Name, Value::String(name)) => Ok(graph.set_name(id, name)),
            (Accessor::Parent, Value::Referent(parent)) => {
                graph.set_parent(id, parent)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl std::fmt::Debug for CachedProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedProperty")
            .field("name", &self.name)
            .field("declaring_type", &self.declaring_type)
            .field("property_id", &self.property_id)
            .field("data_type", &self.data_type)
            .field("deferred", &self.deferred)
            .finish()
    }
}

/// Collects the property declarations of node type `N`.
pub struct TypeBuilder<N> {
    type_id: u16,
    properties: Vec<CachedProperty>,
    _marker: PhantomData<fn() -> N>,
}

impl<N: NodeType> TypeBuilder<N> {
    pub(crate) fn new(type_id: u16) -> Self {
        Self {
            type_id,
            properties: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub(crate) fn finish(self) -> Vec<CachedProperty> {
        self.properties
    }

    /// Declares a tagged property backed by a field.
    pub fn property<T: PropertyType>(
        &mut self,
        name: &'static str,
        id: u16,
        get: fn(&N) -> &T,
        set: fn(&mut N) -> &mut T,
    ) -> PropertyDecl<'_> {
        self.push(name, Some(id), get, set)
    }

    /// Declares a property without a tag. It is described but never written.
    pub fn untagged<T: PropertyType>(
        &mut self,
        name: &'static str,
        get: fn(&N) -> &T,
        set: fn(&mut N) -> &mut T,
    ) -> PropertyDecl<'_> {
        self.push(name, None, get, set)
    }

    /// Declares a tagged property whose type has no wire representation.
    pub fn opaque(&mut self, name: &'static str, id: u16) -> PropertyDecl<'_> {
        self.properties.push(CachedProperty {
            name,
            declaring_type: self.type_id,
            property_id: Some(id),
            data_type: DataType::Invalid,
            deferred: false,
            accessor: Accessor::Opaque,
        });
        self.last()
    }

    fn push<T: PropertyType>(
        &mut self,
        name: &'static str,
        id: Option<u16>,
        get: fn(&N) -> &T,
        set: fn(&mut N) -> &mut T,
    ) -> PropertyDecl<'_> {
        let getter: Getter =
            Box::new(move |node: &dyn Node| node::downcast_ref::<N>(node).map(|n| get(n).to_value()));
        let setter: Setter = Box::new(move |node: &mut dyn Node, value: Value| {
            match (node::downcast_mut::<N>(node), T::from_value(value)) {
                (Some(n), Some(v)) => {
                    *set(n) = v;
                    true
                }
                _ => false,
            }
        });
        self.properties.push(CachedProperty {
            name,
            declaring_type: self.type_id,
            property_id: id,
            data_type: T::DATA_TYPE,
            deferred: false,
            accessor: Accessor::Field {
                get: getter,
                set: setter,
            },
        });
        self.last()
    }

    fn last(&mut self) -> PropertyDecl<'_> {
        let index = self.properties.len() - 1;
        PropertyDecl {
            property: &mut self.properties[index],
        }
    }
}

/// Handle returned by [`TypeBuilder`] to refine the declaration just made.
pub struct PropertyDecl<'a> {
    property: &'a mut CachedProperty,
}

impl PropertyDecl<'_> {
    /// Applies the property in the second pass, once every non-deferred
    /// property of every node has been set.
    pub fn deferred(self) -> Self {
        self.property.deferred = true;
        self
    }
}
