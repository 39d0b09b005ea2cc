//! Stream parsing and the two-pass loader.
//!
//! Loading happens in two stages. [`ReadContext::parse`] reads the whole
//! stream (header, TYPE records, PROP records, END marker) without touching
//! the scene graph, so a fatal format error leaves the graph unchanged.
//! [`ReadContext::materialize`] then creates the nodes and applies
//! properties:
//!
//! 1. every node is constructed (or its singleton fetched) in record order
//!    and `before_deserialize` runs; the first node is the root
//! 2. pass A applies every non-deferred property, type by type
//! 3. pass B applies deferred properties (the parent link) in ascending
//!    referent order, which rebuilds children in their original order
//! 4. `after_deserialize` runs on every node in construction order

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek};

use crate::codec::header::{self, Header};
use crate::codec::record::{self, PROP_MAGIC, TYPE_MAGIC};
use crate::codec::values::{self, Column, NULL_REFERENT};
use crate::codec::wire::ByteReader;
use crate::config::InstbinConfig;
use crate::error::{FormatError, InstbinError, Result};
use crate::node::{Node, rust_type_of};
use crate::property::{CachedProperty, PropertyKey};
use crate::registry::{CachedType, Instance, Registry};
use crate::scene::{NodeId, SceneGraph};
use crate::value::{DataType, Value};

/// Options for a deserialize call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeserializeOptions {
    /// Bind the stream's root onto this existing node instead of creating one.
    pub reuse_root: Option<NodeId>,
    /// The caller already consumed the 7-byte magic.
    pub skip_header_magic: bool,
}

struct ParsedType<'r> {
    cached: &'r CachedType,
    referents: Vec<i32>,
    properties: Vec<ParsedProperty<'r>>,
}

struct ParsedProperty<'r> {
    property: &'r CachedProperty,
    column: Column,
}

/// A fully parsed stream, ready to be materialized into a graph.
pub(crate) struct ReadContext<'r> {
    types: Vec<ParsedType<'r>>,
    total_objects: usize,
    clone: bool,
}

struct DeferredWrite<'r> {
    referent: i32,
    node: NodeId,
    property: &'r CachedProperty,
    value: Value,
}

impl<'r> ReadContext<'r> {
    pub fn parse<R: Read + Seek>(
        registry: &'r Registry,
        config: &InstbinConfig,
        reader: &mut R,
        skip_header_magic: bool,
    ) -> Result<Self> {
        let Header {
            total_types,
            total_objects,
        } = header::read_header(reader, skip_header_magic)?;

        let mut seen = HashSet::new();
        let mut types = Vec::new();
        for _ in 0..total_types {
            let payload = record::read_record(reader, TYPE_MAGIC, config.max_record_size)?;
            let parsed = parse_type(registry, &payload)?;
            for &referent in &parsed.referents {
                if !seen.insert(referent) {
                    return Err(FormatError::DuplicateReferent(referent).into());
                }
            }
            log::trace!(
                "TYPE `{}`: {} objects",
                parsed.cached.name(),
                parsed.referents.len()
            );
            types.push(parsed);
        }

        if seen.len() != total_objects {
            return Err(FormatError::ObjectCountMismatch {
                declared: total_objects as i32,
                found: seen.len(),
            }
            .into());
        }

        for parsed in &mut types {
            let count = record::read_i32(reader, "property count")?;
            if count < 0 {
                return Err(FormatError::NegativeCount {
                    what: "property",
                    count,
                }
                .into());
            }
            for index in 0..count {
                let Some(payload) =
                    record::try_read_record(reader, PROP_MAGIC, config.max_record_size)?
                else {
                    log::warn!(
                        "`{}`: PROP record {index} of {count} missing, ending property list",
                        parsed.cached.name()
                    );
                    break;
                };
                if let Some(property) = parse_property(registry, parsed, &payload)? {
                    parsed.properties.push(property);
                }
            }
        }

        header::read_end(reader)?;

        if total_objects == 0 {
            return Err(FormatError::Empty.into());
        }
        Ok(Self {
            types,
            total_objects,
            clone: false,
        })
    }

    /// Marks the session as part of a clone, for lifecycle hooks.
    pub fn for_clone(mut self, clone: bool) -> Self {
        self.clone = clone;
        self
    }

    pub fn total_objects(&self) -> usize {
        self.total_objects
    }

    /// Creates the nodes in `graph` and returns the root.
    pub fn materialize(self, graph: &mut SceneGraph, reuse_root: Option<NodeId>) -> Result<NodeId> {
        if let Some(existing) = reuse_root
            && !graph.contains(existing)
        {
            return Err(InstbinError::UnknownNode(existing));
        }
        let clone = self.clone;

        // Construction in record order; the first node is the root.
        let mut table: HashMap<i32, NodeId> = HashMap::with_capacity(self.total_objects);
        let mut constructed = Vec::with_capacity(self.total_objects);
        // Nodes that existed before this call: a reused root or a fetched singleton.
        let mut existing_nodes = HashSet::new();
        let mut root = None;
        for parsed in &self.types {
            for &referent in &parsed.referents {
                let instance = match (root, reuse_root) {
                    (None, Some(existing)) => {
                        let matches = graph
                            .node(existing)
                            .is_some_and(|node| rust_type_of(node) == parsed.cached.rust_type());
                        if !matches {
                            log::warn!(
                                "Reused root {existing} is not a `{}`; its fields will keep their values",
                                parsed.cached.name()
                            );
                        }
                        Instance {
                            id: existing,
                            fresh: false,
                        }
                    }
                    _ => parsed.cached.instantiate(graph),
                };
                let id = instance.id;
                if !instance.fresh {
                    existing_nodes.insert(id);
                }
                root.get_or_insert(id);
                table.insert(referent, id);
                constructed.push(id);
                graph.run_hook(id, clone, |node: &mut dyn Node, ctx, _| {
                    node.before_deserialize(ctx)
                });
            }
        }
        let Some(root) = root else {
            return Err(FormatError::Empty.into());
        };

        let resolve = |raw: i32| -> Option<NodeId> {
            if raw == NULL_REFERENT {
                return None;
            }
            let resolved = table.get(&raw).copied();
            if resolved.is_none() {
                log::warn!("Referent {raw} is not part of the stream, using null");
            }
            resolved
        };

        // Pass A: everything but deferred properties.
        let mut deferred = Vec::new();
        for parsed in self.types {
            for ParsedProperty { property, column } in parsed.properties {
                let values: Vec<Value> = match column {
                    Column::Values(values) => values,
                    Column::Referents(ids) => ids
                        .into_iter()
                        .map(|raw| Value::Referent(resolve(raw)))
                        .collect(),
                };
                for (&referent, value) in parsed.referents.iter().zip(values) {
                    let Some(&node) = table.get(&referent) else {
                        continue;
                    };
                    if property.is_deferred() {
                        deferred.push(DeferredWrite {
                            referent,
                            node,
                            property,
                            value,
                        });
                    } else {
                        apply(graph, node, property, value);
                    }
                }
            }
        }

        // Pass B: deferred properties in referent order. Existing nodes keep
        // their parent, and a null parent is never applied.
        deferred.sort_by_key(|write| write.referent);
        for write in deferred {
            if write.property.is_parent()
                && (existing_nodes.contains(&write.node)
                    || matches!(write.value, Value::Referent(None)))
            {
                log::trace!("Keeping the current parent of {}", write.node);
                continue;
            }
            apply(graph, write.node, write.property, write.value);
        }

        for &id in &constructed {
            graph.run_hook(id, clone, |node: &mut dyn Node, ctx, graph| {
                node.after_deserialize(ctx, graph)
            });
        }

        log::debug!(
            "Deserialized {} objects, root {root} (`{}`)",
            constructed.len(),
            graph.name(root).unwrap_or_default()
        );
        Ok(root)
    }
}

fn apply(graph: &mut SceneGraph, node: NodeId, property: &CachedProperty, value: Value) {
    match property.apply(graph, node, value) {
        Ok(true) => {}
        Ok(false) => log::warn!(
            "Could not apply property `{}` to node {node}",
            property.name()
        ),
        Err(err) => log::warn!("Could not apply property `{}`: {err}", property.name()),
    }
}

fn parse_type<'r>(registry: &'r Registry, payload: &[u8]) -> Result<ParsedType<'r>> {
    let mut r = ByteReader::new(payload, "TYPE");
    let type_id = r.read_i16()? as u16;
    let _has_additional_data = r.read_u8()?;
    let count = r.read_count("object")?;
    if count > r.remaining() / 4 {
        return Err(FormatError::Truncated("TYPE").into());
    }
    let mut referents = Vec::with_capacity(count);
    for _ in 0..count {
        let referent = r.read_i32()?;
        if referent < 0 {
            return Err(FormatError::InvalidValue(format!("negative referent {referent}")).into());
        }
        referents.push(referent);
    }
    let cached = registry
        .get(type_id)
        .ok_or(FormatError::UnknownTypeId(type_id))?;
    Ok(ParsedType {
        cached,
        referents,
        properties: Vec::new(),
    })
}

/// Decodes a PROP payload. Returns `Ok(None)` for records that are skipped.
fn parse_property<'r>(
    registry: &Registry,
    parsed: &ParsedType<'r>,
    payload: &[u8],
) -> Result<Option<ParsedProperty<'r>>> {
    let type_name = parsed.cached.name();
    let mut r = ByteReader::new(payload, "PROP");
    let (Ok(raw_key), Ok(type_byte)) = (r.read_i32(), r.read_u8()) else {
        log::warn!("`{type_name}`: PROP record too short, skipping");
        return Ok(None);
    };
    let data_type =
        DataType::from_byte(type_byte).ok_or(FormatError::UnknownDataType(type_byte))?;
    let key = PropertyKey::from_wire(raw_key);

    let Some(property) = parsed.cached.property(key) else {
        log::warn!("`{type_name}`: unknown property key {key}, skipping");
        return Ok(None);
    };
    if property.data_type() != data_type {
        log::warn!(
            "`{type_name}.{}`: stored as {data_type}, declared as {}, skipping",
            property.name(),
            property.data_type()
        );
        return Ok(None);
    }

    let body = &payload[payload.len() - r.remaining()..];
    match values::decode_column(body, data_type, parsed.referents.len(), registry.user_data()) {
        Ok(column) => {
            log::trace!("PROP `{type_name}.{}`: {} values", property.name(), column.len());
            Ok(Some(ParsedProperty { property, column }))
        }
        Err(err @ FormatError::UnknownUserDataTag(_)) => Err(err.into()),
        Err(err) => {
            log::warn!(
                "`{type_name}.{}`: could not decode values ({err}), skipping",
                property.name()
            );
            Ok(None)
        }
    }
}
