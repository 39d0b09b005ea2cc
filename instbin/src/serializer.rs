//! Serialize, deserialize and clone entry points.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use crate::codec::header::{self, FORMAT_VERSION, MAGIC};
use crate::codec::record::{self, PROP_MAGIC, TYPE_MAGIC};
use crate::codec::values::{self, NULL_REFERENT};
use crate::codec::wire::ByteWriter;
use crate::config::InstbinConfig;
use crate::context::{SerializeOptions, WriteContext};
use crate::error::{InstbinError, Result};
use crate::loader::{DeserializeOptions, ReadContext};
use crate::node::Node;
use crate::registry::Registry;
use crate::scene::{NodeId, SceneGraph};

/// Summary of a serialize call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializeStats {
    pub types: usize,
    pub objects: usize,
    pub bytes: usize,
}

/// Reads and writes instbin streams against one [`Registry`].
///
/// Each call builds its own session state, so a serializer can be shared
/// between threads working on different graphs.
///
/// # Example
///
/// ```ignore
/// let serializer = InstanceSerializer::new(&registry);
/// let bytes = serializer.to_bytes(&mut graph, model, SerializeOptions::default())?;
/// let copy = serializer.from_bytes(&mut graph, &bytes, DeserializeOptions::default())?;
/// ```
#[derive(Debug, Clone)]
pub struct InstanceSerializer<'r> {
    registry: &'r Registry,
    config: InstbinConfig,
}

impl<'r> InstanceSerializer<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self::with_config(registry, InstbinConfig::default())
    }

    pub fn with_config(registry: &'r Registry, config: InstbinConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn config(&self) -> &InstbinConfig {
        &self.config
    }

    /// Writes the subtree under `root` to `writer`.
    ///
    /// `after_serialize` runs on every visited node whether or not writing
    /// succeeded.
    pub fn serialize<W: Write>(
        &self,
        graph: &mut SceneGraph,
        root: NodeId,
        writer: &mut W,
        options: SerializeOptions,
    ) -> Result<SerializeStats> {
        let ctx = WriteContext::build(self.registry, graph, root, options)?;
        let written = self.write_stream(graph, &ctx, writer);

        for &id in ctx.visited() {
            graph.run_hook(id, options.clone, |node: &mut dyn Node, hook_ctx, _| {
                node.after_serialize(hook_ctx)
            });
        }

        let stats = SerializeStats {
            types: ctx.total_types(),
            objects: ctx.total_objects(),
            bytes: written?,
        };
        log::debug!(
            "Serialized {root}: {} types, {} objects, {} bytes",
            stats.types,
            stats.objects,
            stats.bytes
        );
        Ok(stats)
    }

    fn write_stream<W: Write>(
        &self,
        graph: &SceneGraph,
        ctx: &WriteContext<'_>,
        writer: &mut W,
    ) -> Result<usize> {
        let compression = self.config.compression;
        let mut bytes = header::write_header(writer, ctx.total_types(), ctx.total_objects())?;

        for record in ctx.records() {
            let mut w = ByteWriter::new();
            w.write_i16(record.cached.type_id() as i16);
            w.write_u8(0);
            w.write_i32(record.referents.len() as i32);
            for referent in &record.referents {
                w.write_i32(referent.0);
            }
            bytes += record::write_record(writer, TYPE_MAGIC, &w.into_inner(), compression)?;
        }

        let referent_of = |target: NodeId| ctx.referent_of(target).map_or(NULL_REFERENT, |r| r.0);
        for record in ctx.records() {
            let properties: Vec<_> = record
                .cached
                .serializable_properties()
                .filter_map(|p| Some((p, p.key()?, p.data_type().to_byte()?)))
                .collect();
            writer.write_all(&(properties.len() as i32).to_le_bytes())?;
            bytes += 4;

            for (property, key, type_byte) in properties {
                let mut w = ByteWriter::new();
                w.write_i32(key.to_wire());
                w.write_u8(type_byte);
                for &node in &record.nodes {
                    let value = property
                        .read(graph, node)
                        .or_else(|| values::default_value(property.data_type()));
                    if let Some(value) = value {
                        values::encode_value(&mut w, &value, &referent_of)?;
                    }
                }
                bytes += record::write_record(writer, PROP_MAGIC, &w.into_inner(), compression)?;
            }
        }

        bytes += header::write_end(writer)?;
        Ok(bytes)
    }

    /// Serializes into a fresh buffer.
    pub fn to_bytes(
        &self,
        graph: &mut SceneGraph,
        root: NodeId,
        options: SerializeOptions,
    ) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.serialize(graph, root, &mut buffer, options)?;
        Ok(buffer)
    }

    /// Reads a stream into `graph` and returns the new root.
    ///
    /// Either every node is created, or an error is returned and the graph is
    /// left as it was.
    pub fn deserialize<R: Read + Seek>(
        &self,
        graph: &mut SceneGraph,
        reader: &mut R,
        options: DeserializeOptions,
    ) -> Result<NodeId> {
        let ctx = ReadContext::parse(self.registry, &self.config, reader, options.skip_header_magic)?;
        log::trace!("Parsed stream with {} objects", ctx.total_objects());
        ctx.materialize(graph, options.reuse_root)
    }

    pub fn from_bytes(
        &self,
        graph: &mut SceneGraph,
        bytes: &[u8],
        options: DeserializeOptions,
    ) -> Result<NodeId> {
        self.deserialize(graph, &mut Cursor::new(bytes), options)
    }

    /// Deep-copies the subtree under `root` into a new, detached subtree.
    ///
    /// References between copied nodes point at the copies; references
    /// leaving the subtree become null. Excludable subtrees are copied too.
    pub fn clone_subtree(&self, graph: &mut SceneGraph, root: NodeId) -> Result<NodeId> {
        let options = SerializeOptions {
            clone: true,
            include_excludable: true,
        };
        let buffer = self.to_bytes(graph, root, options)?;
        let ctx = ReadContext::parse(self.registry, &self.config, &mut Cursor::new(buffer.as_slice()), false)?;
        ctx.for_clone(true).materialize(graph, None)
    }
}

/// Result of sniffing a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    InstBin,
    Unknown,
}

/// Checks whether the stream starts with the instbin magic.
///
/// Streams shorter than the magic are [`StreamFormat::Unknown`]. With
/// `restore_position` unset the magic stays consumed, so the stream can be
/// handed to a deserialize call with
/// [`skip_header_magic`](DeserializeOptions::skip_header_magic).
pub fn peek_format<R: Read + Seek>(reader: &mut R, restore_position: bool) -> Result<StreamFormat> {
    let start = reader.stream_position()?;
    let mut found = [0u8; 7];
    let n = record::read_up_to(reader, &mut found)?;
    if restore_position {
        reader.seek(SeekFrom::Start(start))?;
    }
    Ok(if n == found.len() && &found == MAGIC {
        StreamFormat::InstBin
    } else {
        StreamFormat::Unknown
    })
}

/// Checks the magic and the format version without parsing further.
///
/// Returns `Ok(false)` for foreign or unsupported streams; only I/O failures
/// are errors.
pub fn check_header<R: Read + Seek>(reader: &mut R, restore_position: bool) -> Result<bool> {
    let start = reader.stream_position()?;
    let result = header::read_magic(reader).and_then(|()| header::read_version(reader));
    if restore_position {
        reader.seek(SeekFrom::Start(start))?;
    }
    match result {
        Ok(version) => Ok(version == FORMAT_VERSION),
        Err(InstbinError::Format(err)) => {
            log::debug!("Header check failed: {err}");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}
