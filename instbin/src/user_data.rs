//! Opaque binary value types stored in `UserData` properties.
//!
//! A user data type saves itself to bytes and loads itself back. Each type
//! owns a one-byte tag from a closed, append-only set; tag `0` marks an
//! empty slot on the wire. Tags are registered on the
//! [`RegistryBuilder`](crate::RegistryBuilder) next to node types.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::error::UserDataError;

/// A value type with its own binary encoding.
pub trait UserData: Clone + PartialEq + Debug + Send + Sync + 'static {
    /// Wire tag. Must be non-zero and unique within a registry.
    const TAG: u8;

    /// Name used in registry diagnostics.
    const NAME: &'static str;

    fn save(&self, out: &mut Vec<u8>);

    /// Reads one value, advancing `input` past the consumed bytes.
    fn load(input: &mut &[u8]) -> Result<Self, UserDataError>;
}

/// Object-safe view of a [`UserData`] value, as held in a
/// [`Value::UserData`](crate::Value::UserData).
pub trait DynUserData: Any + Debug + Send + Sync {
    fn tag(&self) -> u8;
    fn save_bytes(&self, out: &mut Vec<u8>);
    fn clone_box(&self) -> Box<dyn DynUserData>;
    fn dyn_eq(&self, other: &dyn DynUserData) -> bool;
}

impl<U: UserData> DynUserData for U {
    fn tag(&self) -> u8 {
        U::TAG
    }

    fn save_bytes(&self, out: &mut Vec<u8>) {
        UserData::save(self, out);
    }

    fn clone_box(&self) -> Box<dyn DynUserData> {
        Box::new(self.clone())
    }

    fn dyn_eq(&self, other: &dyn DynUserData) -> bool {
        let other: &dyn Any = other;
        other.downcast_ref::<U>().is_some_and(|other| other == self)
    }
}

impl Clone for Box<dyn DynUserData> {
    fn clone(&self) -> Self {
        (**self).clone_box()
    }
}

impl PartialEq for dyn DynUserData {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other)
    }
}

/// Downcasts a boxed user data value to its concrete type.
pub(crate) fn downcast_user_data<U: UserData>(value: Box<dyn DynUserData>) -> Option<U> {
    let any: Box<dyn Any> = value;
    any.downcast::<U>().ok().map(|boxed| *boxed)
}

/// Reads exactly `N` bytes from `input`.
///
/// Convenience for [`UserData::load`] implementations.
pub fn take_bytes<const N: usize>(input: &mut &[u8]) -> Result<[u8; N], UserDataError> {
    let data: &[u8] = *input;
    let (head, rest) = data
        .split_first_chunk::<N>()
        .ok_or(UserDataError::Truncated)?;
    *input = rest;
    Ok(*head)
}

type LoadFn = fn(&mut &[u8]) -> Result<Box<dyn DynUserData>, UserDataError>;

fn load_boxed<U: UserData>(input: &mut &[u8]) -> Result<Box<dyn DynUserData>, UserDataError> {
    Ok(Box::new(U::load(input)?))
}

pub(crate) struct UserDataEntry {
    pub name: &'static str,
    load: LoadFn,
}

/// Tag-indexed loaders for every registered user data type.
#[derive(Default)]
pub(crate) struct UserDataTable {
    entries: BTreeMap<u8, UserDataEntry>,
}

impl UserDataTable {
    pub fn entry_for<U: UserData>() -> (u8, UserDataEntry) {
        (
            U::TAG,
            UserDataEntry {
                name: U::NAME,
                load: load_boxed::<U>,
            },
        )
    }

    pub fn insert(&mut self, tag: u8, entry: UserDataEntry) {
        self.entries.insert(tag, entry);
    }

    pub fn contains(&self, tag: u8) -> bool {
        self.entries.contains_key(&tag)
    }

    /// Loads a value of the type registered under `tag`.
    ///
    /// Returns `None` when the tag is unknown.
    pub fn load(
        &self,
        tag: u8,
        input: &mut &[u8],
    ) -> Option<Result<Box<dyn DynUserData>, UserDataError>> {
        self.entries.get(&tag).map(|entry| (entry.load)(input))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
