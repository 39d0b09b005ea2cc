//! Per-value encoding inside PROP payloads.

use super::wire::{ByteReader, ByteWriter};
use crate::error::FormatError;
use crate::scene::NodeId;
use crate::user_data::UserDataTable;
use crate::value::{DataType, FontFamily, FontStyle, InstanceId, Value};

/// Stored id of a null reference.
pub(crate) const NULL_REFERENT: i32 = -1;

/// Decoded values of one PROP record, positionally aligned with the owning
/// type record's referents.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Column {
    Values(Vec<Value>),
    /// Raw referent ids, resolved by the loader.
    Referents(Vec<i32>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Values(values) => values.len(),
            Column::Referents(ids) => ids.len(),
        }
    }
}

/// Value written when a node cannot produce one for a declared property.
pub(crate) fn default_value(data_type: DataType) -> Option<Value> {
    Some(match data_type {
        DataType::String => Value::String(String::new()),
        DataType::Bool => Value::Bool(false),
        DataType::Int16 => Value::Int16(0),
        DataType::Int32 => Value::Int32(0),
        DataType::Int64 => Value::Int64(0),
        DataType::Single => Value::Single(0.0),
        DataType::Double => Value::Double(0.0),
        DataType::Enum => Value::Enum(0),
        DataType::Content => Value::Content(String::new()),
        DataType::Referent => Value::Referent(None),
        DataType::UserData => Value::UserData(None),
        DataType::InstanceId => Value::InstanceId(InstanceId::default()),
        DataType::FontFamily => Value::FontFamily(FontFamily::default()),
        DataType::BinaryData => Value::BinaryData(Vec::new()),
        DataType::Invalid => return None,
    })
}

/// Encodes one value. `referent_of` maps a target node to its stored id.
pub(crate) fn encode_value(
    w: &mut ByteWriter,
    value: &Value,
    referent_of: &dyn Fn(NodeId) -> i32,
) -> Result<(), FormatError> {
    match value {
        Value::String(s) | Value::Content(s) => w.write_string(s)?,
        Value::Bool(b) => w.write_u8(u8::from(*b)),
        Value::Int16(v) => w.write_i16(*v),
        Value::Int32(v) => w.write_i32(*v),
        Value::Int64(v) => w.write_i64(*v),
        Value::Single(v) => w.write_f32(*v),
        Value::Double(v) => w.write_f64(*v),
        Value::Enum(v) => w.write_u32(*v),
        Value::Referent(target) => w.write_i32(target.map_or(NULL_REFERENT, referent_of)),
        Value::UserData(None) => w.write_u8(0),
        Value::UserData(Some(data)) => {
            w.write_u8(data.tag());
            data.save_bytes(w.buffer_mut());
        }
        Value::InstanceId(id) => w.write_bytes(&id.0),
        Value::FontFamily(font) => {
            w.write_string(&font.family)?;
            w.write_u16(font.weight);
            w.write_u8(font.style.to_byte());
        }
        Value::BinaryData(bytes) => w.write_blob(bytes)?,
    }
    Ok(())
}

/// Decodes exactly `count` values of `data_type`; trailing bytes are an error.
pub(crate) fn decode_column(
    payload: &[u8],
    data_type: DataType,
    count: usize,
    user_data: &UserDataTable,
) -> Result<Column, FormatError> {
    let mut r = ByteReader::new(payload, "PROP");

    let column = if data_type == DataType::Referent {
        let mut ids = Vec::with_capacity(count.min(payload.len() / 4));
        for _ in 0..count {
            ids.push(r.read_i32()?);
        }
        Column::Referents(ids)
    } else {
        let mut values = Vec::with_capacity(count.min(payload.len()));
        for _ in 0..count {
            values.push(decode_value(&mut r, data_type, user_data)?);
        }
        Column::Values(values)
    };

    if !r.is_empty() {
        return Err(FormatError::InvalidValue(format!(
            "{} trailing bytes after {count} values",
            r.remaining()
        )));
    }
    Ok(column)
}

fn decode_value(
    r: &mut ByteReader<'_>,
    data_type: DataType,
    user_data: &UserDataTable,
) -> Result<Value, FormatError> {
    Ok(match data_type {
        DataType::String => Value::String(r.read_string()?),
        DataType::Content => Value::Content(r.read_string()?),
        DataType::Bool => Value::Bool(r.read_u8()? != 0),
        DataType::Int16 => Value::Int16(r.read_i16()?),
        DataType::Int32 => Value::Int32(r.read_i32()?),
        DataType::Int64 => Value::Int64(r.read_i64()?),
        DataType::Single => Value::Single(r.read_f32()?),
        DataType::Double => Value::Double(r.read_f64()?),
        DataType::Enum => Value::Enum(r.read_u32()?),
        DataType::Referent => {
            let id = r.read_i32()?;
            return Err(FormatError::InvalidValue(format!(
                "unresolved referent {id} in value column"
            )));
        }
        DataType::UserData => {
            let tag = r.read_u8()?;
            if tag == 0 {
                Value::UserData(None)
            } else {
                let loaded = user_data
                    .load(tag, r.rest_mut())
                    .ok_or(FormatError::UnknownUserDataTag(tag))?
                    .map_err(|err| FormatError::InvalidValue(err.to_string()))?;
                Value::UserData(Some(loaded))
            }
        }
        DataType::InstanceId => {
            let bytes = r.read_bytes(16)?;
            let mut id = [0u8; 16];
            id.copy_from_slice(bytes);
            Value::InstanceId(InstanceId(id))
        }
        DataType::FontFamily => {
            let family = r.read_string()?;
            let weight = r.read_u16()?;
            let style = r.read_u8()?;
            let style = FontStyle::from_byte(style)
                .ok_or_else(|| FormatError::InvalidValue(format!("font style {style}")))?;
            Value::FontFamily(FontFamily {
                family,
                weight,
                style,
            })
        }
        DataType::BinaryData => Value::BinaryData(r.read_blob()?.to_vec()),
        DataType::Invalid => {
            return Err(FormatError::InvalidValue("invalid data type".to_owned()));
        }
    })
}
