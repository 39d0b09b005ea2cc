mod common;

use std::io::{Cursor, Seek, SeekFrom};

use common::*;
use redlilium_instbin::{
    DataType, DeserializeOptions, FormatError, InstanceSerializer, InstbinConfig, InstbinError,
    NodeType, PropertyKey, Registry, RegistryError, SceneGraph, SerializeOptions, StreamFormat,
    check_header, peek_format,
};

// ---------------------------------------------------------------------------
// Hand-built streams (uncompressed records)
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RawStream {
    bytes: Vec<u8>,
}

impl RawStream {
    fn header(types: i32, objects: i32) -> Self {
        let mut stream = Self::default();
        stream.bytes.extend_from_slice(b"INSTBIN");
        stream.i32(3);
        stream.bytes.extend_from_slice(b"1.0");
        stream.i32(types);
        stream.i32(objects);
        stream.bytes.extend_from_slice(&[0; 8]);
        stream
    }

    fn i32(&mut self, v: i32) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn record(&mut self, magic: &[u8; 4], payload: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(magic);
        self.i32(0);
        self.i32(payload.len() as i32);
        self.bytes.extend_from_slice(payload);
        self
    }

    fn type_record(&mut self, type_id: i16, referents: &[i32]) -> &mut Self {
        let mut payload = type_id.to_le_bytes().to_vec();
        payload.push(0);
        payload.extend_from_slice(&(referents.len() as i32).to_le_bytes());
        for r in referents {
            payload.extend_from_slice(&r.to_le_bytes());
        }
        self.record(b"TYPE", &payload)
    }

    fn prop(&mut self, key: PropertyKey, type_byte: u8, values: &[u8]) -> &mut Self {
        let mut payload = key.to_wire().to_le_bytes().to_vec();
        payload.push(type_byte);
        payload.extend_from_slice(values);
        self.record(b"PROP", &payload)
    }

    fn end(&mut self) -> Vec<u8> {
        self.bytes.extend_from_slice(b"END");
        std::mem::take(&mut self.bytes)
    }
}

const PART: i16 = 2;
const COUNT: PropertyKey = PropertyKey::new(2, 14);
const SIZE: PropertyKey = PropertyKey::new(2, 1);
const TAGS: PropertyKey = PropertyKey::new(2, 6);

fn int32(v: i32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

fn load(bytes: &[u8]) -> (SceneGraph, Result<redlilium_instbin::NodeId, InstbinError>) {
    init_logger();
    let registry = registry();
    let serializer = InstanceSerializer::new(&registry);
    let mut graph = SceneGraph::new();
    let result = serializer.from_bytes(&mut graph, bytes, DeserializeOptions::default());
    (graph, result)
}

fn loaded_count(bytes: &[u8]) -> i32 {
    let (graph, result) = load(bytes);
    let root = result.unwrap();
    graph.get::<Part>(root).unwrap().count
}

// ---------------------------------------------------------------------------
// Tolerant decode
// ---------------------------------------------------------------------------

#[test]
fn unknown_property_key_is_skipped() {
    let bytes = RawStream::header(1, 1)
        .type_record(PART, &[0])
        .i32(2)
        .prop(PropertyKey::new(2, 99), 3, &int32(5))
        .prop(COUNT, 3, &int32(7))
        .end();
    assert_eq!(loaded_count(&bytes), 7);
}

#[test]
fn mismatched_data_type_is_skipped() {
    let bytes = RawStream::header(1, 1)
        .type_record(PART, &[0])
        .i32(2)
        .prop(COUNT, DataType::Single.to_byte().unwrap(), &1.5f32.to_le_bytes())
        .prop(SIZE, 5, &2.0f32.to_le_bytes())
        .end();
    let (graph, result) = load(&bytes);
    let part = graph.get::<Part>(result.unwrap()).unwrap();
    assert_eq!(part.count, 0);
    assert_eq!(part.size, 2.0);
}

#[test]
fn undecodable_payload_is_skipped() {
    let bytes = RawStream::header(1, 1)
        .type_record(PART, &[0])
        .i32(2)
        .prop(COUNT, 3, &[1, 2])
        .prop(SIZE, 5, &4.0f32.to_le_bytes())
        .end();
    let (graph, result) = load(&bytes);
    let part = graph.get::<Part>(result.unwrap()).unwrap();
    assert_eq!(part.count, 0);
    assert_eq!(part.size, 4.0);
}

#[test]
fn rejected_user_data_is_skipped() {
    // Known tag, but the second label is cut short.
    let bytes = RawStream::header(1, 1)
        .type_record(PART, &[0])
        .i32(2)
        .prop(TAGS, DataType::UserData.to_byte().unwrap(), &[1, 2, 5, b'a', b'b'])
        .prop(COUNT, 3, &int32(9))
        .end();
    let (graph, result) = load(&bytes);
    let part = graph.get::<Part>(result.unwrap()).unwrap();
    assert_eq!(part.tags, None);
    assert_eq!(part.count, 9);
}

#[test]
fn missing_prop_record_ends_property_list() {
    // The first type announces three PROP records but carries one; the next
    // bytes are the second type's property count.
    let bytes = RawStream::header(2, 2)
        .type_record(PART, &[0])
        .type_record(PART_B, &[1])
        .i32(3)
        .prop(COUNT, 3, &int32(11))
        .i32(0)
        .end();
    assert_eq!(loaded_count(&bytes), 11);

    let bytes = RawStream::header(1, 1)
        .type_record(PART, &[0])
        .i32(3)
        .prop(COUNT, 3, &int32(12))
        .end();
    assert_eq!(loaded_count(&bytes), 12);
}

const PART_B: i16 = 7;

// ---------------------------------------------------------------------------
// Fatal errors leave the graph untouched
// ---------------------------------------------------------------------------

#[test]
fn scenario_c_corrupted_header_creates_nothing() {
    let registry = registry();
    let serializer = InstanceSerializer::new(&registry);
    let mut source = SceneGraph::new();
    let root = source.spawn(Part::default());
    let mut bytes = serializer
        .to_bytes(&mut source, root, SerializeOptions::default())
        .unwrap();
    bytes[..7].copy_from_slice(b"INSTBAD");

    let (graph, result) = load(&bytes);
    assert!(matches!(
        result,
        Err(InstbinError::Format(FormatError::BadMagic { .. }))
    ));
    assert!(graph.is_empty());
}

#[test]
fn unknown_data_type_is_fatal() {
    let bytes = RawStream::header(1, 1)
        .type_record(PART, &[0])
        .i32(1)
        .prop(COUNT, 42, &int32(1))
        .end();
    let (graph, result) = load(&bytes);
    assert!(matches!(
        result,
        Err(InstbinError::Format(FormatError::UnknownDataType(42)))
    ));
    assert!(graph.is_empty());
}

#[test]
fn unknown_user_data_tag_is_fatal() {
    let bytes = RawStream::header(1, 1)
        .type_record(PART, &[0])
        .i32(1)
        .prop(TAGS, DataType::UserData.to_byte().unwrap(), &[200, 0])
        .end();
    let (graph, result) = load(&bytes);
    assert!(matches!(
        result,
        Err(InstbinError::Format(FormatError::UnknownUserDataTag(200)))
    ));
    assert!(graph.is_empty());
}

#[test]
fn unknown_type_id_is_fatal() {
    let bytes = RawStream::header(1, 1).type_record(999, &[0]).i32(0).end();
    let (_, result) = load(&bytes);
    assert!(matches!(
        result,
        Err(InstbinError::Format(FormatError::UnknownTypeId(999)))
    ));
}

#[test]
fn bad_end_marker_is_fatal() {
    let mut bytes = RawStream::header(1, 1)
        .type_record(PART, &[0])
        .i32(0)
        .end();
    let last = bytes.len() - 1;
    bytes[last] = b'X';
    let (graph, result) = load(&bytes);
    assert!(matches!(
        result,
        Err(InstbinError::Format(FormatError::BadEndMarker { .. }))
    ));
    assert!(graph.is_empty());
}

#[test]
fn truncated_stream_is_fatal() {
    let registry = registry();
    let serializer = InstanceSerializer::new(&registry);
    let mut source = SceneGraph::new();
    let root = source.spawn(Part::default());
    let bytes = serializer
        .to_bytes(&mut source, root, SerializeOptions::default())
        .unwrap();

    let (graph, result) = load(&bytes[..bytes.len() / 2]);
    assert!(result.is_err());
    assert!(graph.is_empty());
}

#[test]
fn empty_stream_is_rejected() {
    let bytes = RawStream::header(0, 0).end();
    let (_, result) = load(&bytes);
    assert!(matches!(result, Err(InstbinError::Format(FormatError::Empty))));
}

#[test]
fn duplicate_referent_is_rejected() {
    let bytes = RawStream::header(2, 2)
        .type_record(PART, &[0])
        .type_record(PART_B, &[0])
        .i32(0)
        .i32(0)
        .end();
    let (_, result) = load(&bytes);
    assert!(matches!(
        result,
        Err(InstbinError::Format(FormatError::DuplicateReferent(0)))
    ));
}

#[test]
fn record_size_limit_is_enforced() {
    let registry = registry();
    let mut source = SceneGraph::new();
    let root = source.spawn(Part {
        blob: vec![0x55; 4096],
        ..Default::default()
    });
    let bytes = InstanceSerializer::new(&registry)
        .to_bytes(&mut source, root, SerializeOptions::default())
        .unwrap();

    let config = InstbinConfig {
        max_record_size: 1024,
        ..Default::default()
    };
    let mut graph = SceneGraph::new();
    let result = InstanceSerializer::with_config(&registry, config).from_bytes(
        &mut graph,
        &bytes,
        DeserializeOptions::default(),
    );
    assert!(matches!(
        result,
        Err(InstbinError::Format(FormatError::RecordTooLarge { limit: 1024, .. }))
    ));
}

// ---------------------------------------------------------------------------
// Format sniffing
// ---------------------------------------------------------------------------

fn serialized_part() -> Vec<u8> {
    let registry = registry();
    let mut source = SceneGraph::new();
    let root = source.spawn_named("Sniffed", Part::default());
    InstanceSerializer::new(&registry)
        .to_bytes(&mut source, root, SerializeOptions::default())
        .unwrap()
}

#[test]
fn peek_format_restores_position() {
    let mut reader = Cursor::new(serialized_part());
    reader.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(peek_format(&mut reader, true).unwrap(), StreamFormat::InstBin);
    assert_eq!(reader.position(), 0);

    let mut foreign = Cursor::new(b"glTF\x02\x00\x00\x00".to_vec());
    assert_eq!(peek_format(&mut foreign, true).unwrap(), StreamFormat::Unknown);
    assert_eq!(foreign.position(), 0);

    let mut short = Cursor::new(b"INST".to_vec());
    assert_eq!(peek_format(&mut short, true).unwrap(), StreamFormat::Unknown);
}

#[test]
fn peeked_magic_can_be_skipped_on_load() {
    let registry = registry();
    let serializer = InstanceSerializer::new(&registry);
    let mut reader = Cursor::new(serialized_part());
    assert_eq!(peek_format(&mut reader, false).unwrap(), StreamFormat::InstBin);
    assert_eq!(reader.position(), 7);

    let mut graph = SceneGraph::new();
    let options = DeserializeOptions {
        skip_header_magic: true,
        ..Default::default()
    };
    let root = serializer.deserialize(&mut graph, &mut reader, options).unwrap();
    assert_eq!(graph.name(root), Some("Sniffed"));
}

#[test]
fn check_header_validates_magic_and_version() {
    let bytes = serialized_part();
    let mut reader = Cursor::new(bytes.clone());
    assert!(check_header(&mut reader, true).unwrap());
    assert_eq!(reader.position(), 0);

    let mut wrong_version = bytes.clone();
    wrong_version[11..14].copy_from_slice(b"2.0");
    assert!(!check_header(&mut Cursor::new(wrong_version), true).unwrap());

    let mut wrong_magic = bytes;
    wrong_magic[..7].copy_from_slice(b"INSTBAD");
    let mut reader = Cursor::new(wrong_magic);
    assert!(!check_header(&mut reader, true).unwrap());
    assert_eq!(reader.position(), 0);

    assert!(!check_header(&mut Cursor::new(Vec::new()), false).unwrap());
}

// ---------------------------------------------------------------------------
// Registry validation with derived types
// ---------------------------------------------------------------------------

#[derive(Default, NodeType)]
#[node(id = 2, name = "PartClone")]
struct PartClone;
impl redlilium_instbin::Node for PartClone {}

#[test]
fn derived_types_report_duplicate_ids() {
    let err = Registry::builder()
        .register::<Part>()
        .register::<PartClone>()
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        RegistryError::DuplicateTypeId {
            id: 2,
            first: "Part",
            second: "PartClone",
        }
    );
}

#[test]
fn derived_declarations_match_attributes() {
    let registry = registry();
    let part = registry.get_of::<Part>().unwrap();
    assert_eq!(part.name(), "Part");
    assert_eq!(Part::TYPE_ID, Some(2));

    let names: Vec<_> = part.properties().iter().map(|p| p.name()).collect();
    assert_eq!(&names[..4], ["Name", "Parent", "Size", "Anchored"]);
    assert!(names.contains(&"Velocity"));
    assert!(names.contains(&"Handle"));
    assert!(!names.contains(&"Scratch"));

    let handle = part.properties().iter().find(|p| p.name() == "Handle").unwrap();
    assert_eq!(handle.data_type(), DataType::Invalid);
    assert!(!handle.is_serializable());

    assert!(registry.get_by_name("B").unwrap().property(PropertyKey::new(7, 1)).is_some());
    assert!(registry.get_of::<Gizmo>().is_none());
    assert!(registry.get_of::<Lighting>().unwrap().is_singleton());
    assert!(registry.get_of::<Cache>().unwrap().is_excludable());
    assert!(registry.has_user_data_tag(1));
}
