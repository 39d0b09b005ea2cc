//! # RedLilium Instbin
//!
//! Binary serialization of polymorphic, cyclic node graphs.
//!
//! A stream stores the subtree under one root: a header, one TYPE record per
//! node type listing that type's session referents, the PROP records holding
//! one column of values per declared property, and an end marker. Loading
//! rebuilds the subtree in two passes so hierarchy links are attached only
//! after every other property of every node is set.
//!
//! ## Core Types
//!
//! - [`SceneGraph`] / [`NodeId`]: Host arena of nodes with parent/children links
//! - [`Node`]: Object contract with optional lifecycle hooks
//! - [`NodeType`]: Static registration data, usually derived
//! - [`Registry`] / [`RegistryBuilder`]: Validated, immutable type table
//! - [`InstanceSerializer`]: Serialize, deserialize and clone entry points
//!
//! ## Values
//!
//! - [`DataType`]: Wire classification of a property
//! - [`PropertyType`]: Field types that map to a [`DataType`]
//! - [`UserData`]: Custom binary value types with a one-byte tag
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_instbin::{InstanceSerializer, Node, NodeType, Registry, SceneGraph};
//!
//! #[derive(Default, NodeType)]
//! #[node(id = 1)]
//! struct Folder;
//! impl Node for Folder {}
//!
//! let registry = Registry::builder().register::<Folder>().build()?;
//! let serializer = InstanceSerializer::new(&registry);
//! let copy = serializer.clone_subtree(&mut graph, root)?;
//! ```

pub mod codec;
mod config;
mod context;
mod error;
mod loader;
mod node;
mod property;
mod registry;
mod scene;
mod serializer;
mod user_data;
mod value;

pub use config::{Compression, ConfigError, InstbinConfig};
pub use context::{Referent, SerializeOptions};
pub use error::{FormatError, HierarchyError, InstbinError, RegistryError, Result, UserDataError};
pub use instbin_macro::NodeType;
pub use loader::DeserializeOptions;
pub use node::{HookContext, Node, NodeType, Visibility};
pub use property::{
    BASE_TYPE_ID, BASE_TYPE_NAME, CachedProperty, NAME_PROPERTY_ID, PARENT_PROPERTY_ID,
    PropertyDecl, PropertyKey, TypeBuilder,
};
pub use registry::{CachedType, Registry, RegistryBuilder};
pub use scene::{NodeId, SceneGraph};
pub use serializer::{InstanceSerializer, SerializeStats, StreamFormat, check_header, peek_format};
pub use user_data::{DynUserData, UserData, take_bytes};
pub use value::{
    Content, DataType, FontFamily, FontStyle, InstanceId, PropertyEnum, PropertyType, Value,
};
