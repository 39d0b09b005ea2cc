//! Data-type classification and the dynamic property value.
//!
//! Every serializable property maps to exactly one [`DataType`]. The mapping
//! is static: a Rust field type implements [`PropertyType`], whose
//! `DATA_TYPE` constant is the classification. Types without an impl cannot
//! be declared as tagged properties; they can still be listed through
//! [`TypeBuilder::opaque`](crate::TypeBuilder::opaque), which records them as
//! [`DataType::Invalid`] so they are never written.

use crate::scene::NodeId;
use crate::user_data::{self, DynUserData, UserData};

/// Wire classification of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    String,
    Bool,
    Int16,
    Int32,
    Int64,
    Single,
    Double,
    Enum,
    Content,
    Referent,
    UserData,
    InstanceId,
    FontFamily,
    BinaryData,
    /// Unsupported type. Never written.
    Invalid,
}

impl DataType {
    const WIRE: [DataType; 14] = [
        DataType::String,
        DataType::Bool,
        DataType::Int16,
        DataType::Int32,
        DataType::Int64,
        DataType::Single,
        DataType::Double,
        DataType::Enum,
        DataType::Content,
        DataType::Referent,
        DataType::UserData,
        DataType::InstanceId,
        DataType::FontFamily,
        DataType::BinaryData,
    ];

    /// Wire byte for this data type, or `None` for [`DataType::Invalid`].
    pub fn to_byte(self) -> Option<u8> {
        Self::WIRE
            .iter()
            .position(|&dt| dt == self)
            .map(|index| index as u8)
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::WIRE.get(byte as usize).copied()
    }

    pub fn is_serializable(self) -> bool {
        self != DataType::Invalid
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// 128-bit instance identifier, stored as 16 raw bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct InstanceId(pub [u8; 16]);

/// Reference to an external asset, stored by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Content(pub String);

impl Content {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
}

impl FontStyle {
    pub fn to_byte(self) -> u8 {
        match self {
            FontStyle::Normal => 0,
            FontStyle::Italic => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(FontStyle::Normal),
            1 => Some(FontStyle::Italic),
            _ => None,
        }
    }
}

/// Font face description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FontFamily {
    pub family: String,
    pub weight: u16,
    pub style: FontStyle,
}

impl Default for FontFamily {
    fn default() -> Self {
        Self {
            family: String::new(),
            weight: 400,
            style: FontStyle::Normal,
        }
    }
}

/// A property value read from or written to a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Single(f32),
    Double(f64),
    Enum(u32),
    Content(String),
    Referent(Option<NodeId>),
    UserData(Option<Box<dyn DynUserData>>),
    InstanceId(InstanceId),
    FontFamily(FontFamily),
    BinaryData(Vec<u8>),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::String(_) => DataType::String,
            Value::Bool(_) => DataType::Bool,
            Value::Int16(_) => DataType::Int16,
            Value::Int32(_) => DataType::Int32,
            Value::Int64(_) => DataType::Int64,
            Value::Single(_) => DataType::Single,
            Value::Double(_) => DataType::Double,
            Value::Enum(_) => DataType::Enum,
            Value::Content(_) => DataType::Content,
            Value::Referent(_) => DataType::Referent,
            Value::UserData(_) => DataType::UserData,
            Value::InstanceId(_) => DataType::InstanceId,
            Value::FontFamily(_) => DataType::FontFamily,
            Value::BinaryData(_) => DataType::BinaryData,
        }
    }
}

/// A Rust type that can be stored in a tagged property.
pub trait PropertyType: Sized + 'static {
    const DATA_TYPE: DataType;

    fn to_value(&self) -> Value;

    /// Converts back from a value. Returns `None` on a variant mismatch.
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! impl_property_type {
    ($ty:ty, $variant:ident) => {
        impl PropertyType for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_property_type!(String, String);
impl_property_type!(bool, Bool);
impl_property_type!(i16, Int16);
impl_property_type!(i32, Int32);
impl_property_type!(i64, Int64);
impl_property_type!(f32, Single);
impl_property_type!(f64, Double);
impl_property_type!(Option<NodeId>, Referent);
impl_property_type!(InstanceId, InstanceId);
impl_property_type!(FontFamily, FontFamily);
impl_property_type!(Vec<u8>, BinaryData);

impl PropertyType for Content {
    const DATA_TYPE: DataType = DataType::Content;

    fn to_value(&self) -> Value {
        Value::Content(self.0.clone())
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Content(path) => Some(Content(path)),
            _ => None,
        }
    }
}

impl<U: UserData> PropertyType for Option<U> {
    const DATA_TYPE: DataType = DataType::UserData;

    fn to_value(&self) -> Value {
        Value::UserData(
            self.as_ref()
                .map(|data| Box::new(data.clone()) as Box<dyn DynUserData>),
        )
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::UserData(None) => Some(None),
            Value::UserData(Some(boxed)) => user_data::downcast_user_data::<U>(boxed).map(Some),
            _ => None,
        }
    }
}

/// A fieldless enum stored as a `u32` discriminant.
///
/// Implement it with [`impl_enum_property!`](crate::impl_enum_property), which
/// also provides the [`PropertyType`] impl.
pub trait PropertyEnum: Copy + Sized + 'static {
    fn to_u32(self) -> u32;
    fn from_u32(raw: u32) -> Option<Self>;
}

/// Declares an enum as an `Enum` property type.
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, Default, PartialEq)]
/// enum Material { #[default] Plastic, Wood, Metal }
///
/// impl_enum_property!(Material { Plastic = 0, Wood = 1, Metal = 2 });
/// ```
#[macro_export]
macro_rules! impl_enum_property {
    ($ty:ident { $($variant:ident = $raw:expr),+ $(,)? }) => {
        impl $crate::PropertyEnum for $ty {
            fn to_u32(self) -> u32 {
                match self {
                    $($ty::$variant => $raw,)+
                }
            }

            fn from_u32(raw: u32) -> ::core::option::Option<Self> {
                $(if raw == $raw {
                    return ::core::option::Option::Some($ty::$variant);
                })+
                ::core::option::Option::None
            }
        }

        impl $crate::PropertyType for $ty {
            const DATA_TYPE: $crate::DataType = $crate::DataType::Enum;

            fn to_value(&self) -> $crate::Value {
                $crate::Value::Enum($crate::PropertyEnum::to_u32(*self))
            }

            fn from_value(value: $crate::Value) -> ::core::option::Option<Self> {
                match value {
                    $crate::Value::Enum(raw) => $crate::PropertyEnum::from_u32(raw),
                    _ => ::core::option::Option::None,
                }
            }
        }
    };
}
