//! Error types for registry construction, stream decoding and hierarchy edits.
//!
//! The categories are:
//!
//! - [`RegistryError`]: produced once by [`RegistryBuilder::build`](crate::RegistryBuilder::build)
//! - [`FormatError`]: fatal stream problems (bad magic, unknown data type, ...)
//! - [`UserDataError`]: bytes rejected by a [`UserData`](crate::UserData) loader
//! - [`HierarchyError`]: invalid [`SceneGraph::set_parent`](crate::SceneGraph::set_parent) calls
//!
//! [`InstbinError`] wraps all of them for the public entry points. Property
//! records that fail to decode are not errors: they are skipped with a
//! warning and the property keeps its default value.

use crate::scene::NodeId;

/// Errors detected while building a [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Two node types declare the same numeric id.
    #[error("duplicate node type id {id}: `{first}` and `{second}`")]
    DuplicateTypeId {
        id: u16,
        first: &'static str,
        second: &'static str,
    },
    /// A public node type declares no id.
    #[error("node type `{name}` has no type id (next free id: {suggested})")]
    MissingTypeId { name: &'static str, suggested: u16 },
    /// Type id 0 is reserved for the base property declarations.
    #[error("node type `{name}` uses type id 0, which is reserved for base properties")]
    ReservedTypeId { name: &'static str },
    /// The same Rust type was registered twice.
    #[error("node type `{name}` is registered more than once")]
    DuplicateType { name: &'static str },
    /// Two properties of one type share a property id.
    #[error("node type `{type_name}` declares property id {property_id} twice (`{first}` and `{second}`)")]
    DuplicatePropertyId {
        type_name: &'static str,
        property_id: u16,
        first: &'static str,
        second: &'static str,
    },
    /// Two user data types share a tag.
    #[error("duplicate user data tag {tag}: `{first}` and `{second}`")]
    DuplicateUserDataTag {
        tag: u8,
        first: &'static str,
        second: &'static str,
    },
    /// User data tag 0 encodes an empty slot on the wire.
    #[error("user data type `{name}` uses tag 0, which is reserved for empty values")]
    ReservedUserDataTag { name: &'static str },
    /// More than one problem was found; all are reported together.
    #[error("registry build failed with {} problems: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<RegistryError>),
}

fn join_errors(errors: &[RegistryError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fatal problems in an instbin stream.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("bad stream magic: expected `INSTBIN`, found `{}`", String::from_utf8_lossy(.found))]
    BadMagic { found: Vec<u8> },
    #[error("unsupported format version `{0}`")]
    UnsupportedVersion(String),
    #[error("bad end marker: expected `END`, found `{}`", String::from_utf8_lossy(.found))]
    BadEndMarker { found: Vec<u8> },
    #[error("bad record magic: expected `{expected}`, found `{}`", String::from_utf8_lossy(.found))]
    BadRecordMagic {
        expected: &'static str,
        found: Vec<u8>,
    },
    #[error("unknown data type byte {0}")]
    UnknownDataType(u8),
    #[error("unknown user data tag {0}")]
    UnknownUserDataTag(u8),
    #[error("unknown node type id {0}")]
    UnknownTypeId(u16),
    #[error("record of {size} bytes exceeds the {limit} byte limit")]
    RecordTooLarge { size: i64, limit: usize },
    #[error("truncated stream while reading {0}")]
    Truncated(&'static str),
    #[error("record decompression failed: {0}")]
    Decompression(String),
    #[error("negative {what} count {count}")]
    NegativeCount { what: &'static str, count: i32 },
    #[error("referent {0} appears more than once")]
    DuplicateReferent(i32),
    #[error("header declares {declared} objects but type records list {found}")]
    ObjectCountMismatch { declared: i32, found: usize },
    #[error("stream contains no objects")]
    Empty,
    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Errors raised by [`UserData::load`](crate::UserData::load).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UserDataError {
    #[error("unexpected end of user data")]
    Truncated,
    #[error("invalid user data: {0}")]
    Invalid(String),
}

/// Errors from [`SceneGraph::set_parent`](crate::SceneGraph::set_parent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),
    #[error("node {0} cannot be its own parent")]
    SelfParent(NodeId),
    #[error("parenting {child} under {parent} would create a cycle")]
    Cycle { child: NodeId, parent: NodeId },
}

/// Top-level error for serialization entry points.
#[derive(Debug, thiserror::Error)]
pub enum InstbinError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),
    #[error("node {node} has a type that is not registered")]
    UnregisteredType { node: NodeId },
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}

pub type Result<T, E = InstbinError> = std::result::Result<T, E>;
