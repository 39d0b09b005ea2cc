//! The type registry.
//!
//! A [`Registry`] maps stable numeric type ids to [`CachedType`]s: the
//! ordered property descriptors of a node type and the way to create a blank
//! instance of it. It is built once through a [`RegistryBuilder`], validated
//! as a whole, and is immutable afterwards. Serializer calls borrow it, so
//! one registry can back any number of concurrent calls.

use std::any::TypeId;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::RegistryError;
use crate::node::{self, Node, NodeType, Visibility};
use crate::property::{BASE_TYPE_ID, CachedProperty, PropertyKey, TypeBuilder};
use crate::scene::{NodeId, SceneGraph};
use crate::user_data::{UserData, UserDataEntry, UserDataTable};

/// How a node type produces an instance during deserialization.
#[derive(Clone, Copy)]
pub(crate) enum Factory {
    /// Spawns a fresh default instance.
    Construct(fn() -> Box<dyn Node>),
    /// Fetches (or lazily creates) the graph's singleton instance.
    Singleton(fn(&mut SceneGraph) -> Instance),
}

fn construct<N: NodeType>() -> Box<dyn Node> {
    Box::new(N::default())
}

fn fetch_singleton<N: NodeType>(graph: &mut SceneGraph) -> Instance {
    match graph.singleton_id::<N>() {
        Some(id) => Instance { id, fresh: false },
        None => Instance {
            id: graph.singleton::<N>(),
            fresh: true,
        },
    }
}

/// A node produced by [`CachedType::instantiate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Instance {
    pub id: NodeId,
    /// `false` when an existing singleton was fetched.
    pub fresh: bool,
}

fn describe<N: NodeType>(type_id: u16) -> Vec<CachedProperty> {
    let mut builder = TypeBuilder::<N>::new(type_id);
    N::describe(&mut builder);
    builder.finish()
}

/// Registration data for one node type.
pub struct CachedType {
    name: &'static str,
    type_id: u16,
    rust_type: TypeId,
    /// Base properties first, then the type's own, in declaration order.
    properties: Vec<CachedProperty>,
    by_key: HashMap<PropertyKey, usize>,
    factory: Factory,
    excludable: bool,
}

impl CachedType {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> u16 {
        self.type_id
    }

    pub fn rust_type(&self) -> TypeId {
        self.rust_type
    }

    /// All declared properties, including untagged and invalid ones.
    pub fn properties(&self) -> &[CachedProperty] {
        &self.properties
    }

    /// Properties that are written to PROP records, in declaration order.
    pub fn serializable_properties(&self) -> impl Iterator<Item = &CachedProperty> {
        self.properties.iter().filter(|p| p.is_serializable())
    }

    /// Looks up a serializable property by key.
    pub fn property(&self, key: PropertyKey) -> Option<&CachedProperty> {
        self.by_key.get(&key).map(|&index| &self.properties[index])
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self.factory, Factory::Singleton(_))
    }

    pub fn is_excludable(&self) -> bool {
        self.excludable
    }

    /// Creates (or fetches, for singletons) a blank node in `graph`.
    pub(crate) fn instantiate(&self, graph: &mut SceneGraph) -> Instance {
        match self.factory {
            Factory::Construct(construct) => Instance {
                id: graph.spawn_boxed(self.name.to_owned(), construct()),
                fresh: true,
            },
            Factory::Singleton(fetch) => fetch(graph),
        }
    }
}

impl std::fmt::Debug for CachedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedType")
            .field("name", &self.name)
            .field("type_id", &self.type_id)
            .field("properties", &self.properties.len())
            .field("singleton", &self.is_singleton())
            .field("excludable", &self.excludable)
            .finish()
    }
}

struct Candidate {
    name: &'static str,
    type_id: Option<u16>,
    visibility: Visibility,
    rust_type: TypeId,
    factory: Factory,
    excludable: bool,
    describe: fn(u16) -> Vec<CachedProperty>,
}

/// Collects node and user data types, then validates them into a [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    candidates: Vec<Candidate>,
    user_data: Vec<(u8, UserDataEntry)>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node type.
    pub fn register<N: NodeType>(mut self) -> Self {
        let factory = if N::SINGLETON {
            Factory::Singleton(fetch_singleton::<N>)
        } else {
            Factory::Construct(construct::<N>)
        };
        self.candidates.push(Candidate {
            name: N::NAME,
            type_id: N::TYPE_ID,
            visibility: N::VISIBILITY,
            rust_type: TypeId::of::<N>(),
            factory,
            excludable: N::EXCLUDABLE,
            describe: describe::<N>,
        });
        self
    }

    /// Adds a user data type.
    pub fn register_user_data<U: UserData>(mut self) -> Self {
        self.user_data.push(UserDataTable::entry_for::<U>());
        self
    }

    /// Validates all registrations.
    ///
    /// Every problem is collected; a single problem is returned as is, more
    /// than one as [`RegistryError::Multiple`].
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut errors = Vec::new();

        let mut used_ids: BTreeSet<u16> = self.candidates.iter().filter_map(|c| c.type_id).collect();
        used_ids.insert(BASE_TYPE_ID);

        let mut types: BTreeMap<u16, CachedType> = BTreeMap::new();
        let mut by_rust = HashMap::new();
        let mut by_name = HashMap::new();

        for candidate in self.candidates {
            if by_rust.contains_key(&candidate.rust_type) {
                errors.push(RegistryError::DuplicateType {
                    name: candidate.name,
                });
                continue;
            }

            let type_id = match candidate.type_id {
                Some(BASE_TYPE_ID) => {
                    errors.push(RegistryError::ReservedTypeId {
                        name: candidate.name,
                    });
                    continue;
                }
                Some(id) => id,
                None if candidate.visibility == Visibility::Internal => {
                    log::trace!("Skipping internal node type `{}` without id", candidate.name);
                    continue;
                }
                None => {
                    let suggested = next_free_id(&used_ids);
                    used_ids.insert(suggested);
                    errors.push(RegistryError::MissingTypeId {
                        name: candidate.name,
                        suggested,
                    });
                    continue;
                }
            };

            if let Some(existing) = types.get(&type_id) {
                errors.push(RegistryError::DuplicateTypeId {
                    id: type_id,
                    first: existing.name,
                    second: candidate.name,
                });
                continue;
            }

            let own = (candidate.describe)(type_id);
            let mut seen: HashMap<u16, &'static str> = HashMap::new();
            for property in &own {
                let Some(property_id) = property.property_id() else {
                    log::trace!(
                        "Property `{}.{}` has no id and is not serialized",
                        candidate.name,
                        property.name()
                    );
                    continue;
                };
                if !property.data_type().is_serializable() {
                    log::trace!(
                        "Property `{}.{}` has no wire type and is not serialized",
                        candidate.name,
                        property.name()
                    );
                }
                if let Some(first) = seen.insert(property_id, property.name()) {
                    errors.push(RegistryError::DuplicatePropertyId {
                        type_name: candidate.name,
                        property_id,
                        first,
                        second: property.name(),
                    });
                }
            }

            let mut properties = CachedProperty::base_properties();
            properties.extend(own);
            let by_key = properties
                .iter()
                .enumerate()
                .filter(|(_, p)| p.is_serializable())
                .filter_map(|(index, p)| p.key().map(|key| (key, index)))
                .collect();

            by_rust.insert(candidate.rust_type, type_id);
            by_name.insert(candidate.name, type_id);
            types.insert(
                type_id,
                CachedType {
                    name: candidate.name,
                    type_id,
                    rust_type: candidate.rust_type,
                    properties,
                    by_key,
                    factory: candidate.factory,
                    excludable: candidate.excludable,
                },
            );
        }

        let mut user_data = UserDataTable::default();
        let mut tag_names: HashMap<u8, &'static str> = HashMap::new();
        for (tag, entry) in self.user_data {
            if tag == 0 {
                errors.push(RegistryError::ReservedUserDataTag { name: entry.name });
                continue;
            }
            if let Some(&first) = tag_names.get(&tag) {
                errors.push(RegistryError::DuplicateUserDataTag {
                    tag,
                    first,
                    second: entry.name,
                });
                continue;
            }
            tag_names.insert(tag, entry.name);
            user_data.insert(tag, entry);
        }

        match errors.len() {
            0 => {}
            1 => return Err(errors.remove(0)),
            _ => return Err(RegistryError::Multiple(errors)),
        }

        log::debug!(
            "Built instbin registry: {} node types, {} user data types",
            types.len(),
            user_data.len()
        );
        Ok(Registry {
            types,
            by_rust,
            by_name,
            user_data,
        })
    }
}

fn next_free_id(used: &BTreeSet<u16>) -> u16 {
    (1..=u16::MAX).find(|id| !used.contains(id)).unwrap_or(u16::MAX)
}

/// Immutable table of serializable node types.
pub struct Registry {
    types: BTreeMap<u16, CachedType>,
    by_rust: HashMap<TypeId, u16>,
    by_name: HashMap<&'static str, u16>,
    user_data: UserDataTable,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Looks up a type by its numeric id.
    pub fn get(&self, type_id: u16) -> Option<&CachedType> {
        self.types.get(&type_id)
    }

    pub fn get_by_rust_type(&self, rust_type: TypeId) -> Option<&CachedType> {
        self.by_rust.get(&rust_type).and_then(|id| self.types.get(id))
    }

    pub fn get_by_name(&self, name: &str) -> Option<&CachedType> {
        self.by_name.get(name).and_then(|id| self.types.get(id))
    }

    pub fn get_of<N: NodeType>(&self) -> Option<&CachedType> {
        self.get_by_rust_type(TypeId::of::<N>())
    }

    /// Returns the registration of a node's concrete type.
    pub fn type_of(&self, node: &dyn Node) -> Option<&CachedType> {
        self.get_by_rust_type(node::rust_type_of(node))
    }

    /// All registered types in ascending id order.
    pub fn types(&self) -> impl Iterator<Item = &CachedType> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn has_user_data_tag(&self, tag: u8) -> bool {
        self.user_data.contains(tag)
    }

    pub(crate) fn user_data(&self) -> &UserDataTable {
        &self.user_data
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.types.values().collect::<Vec<_>>())
            .field("user_data", &self.user_data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DataType;

    #[derive(Default)]
    struct Model {
        scale: f64,
    }
    impl Node for Model {}
    impl NodeType for Model {
        const NAME: &'static str = "Model";
        const TYPE_ID: Option<u16> = Some(1);
        fn describe(builder: &mut TypeBuilder<Self>) {
            builder.property("Scale", 1, |m| &m.scale, |m| &mut m.scale);
        }
    }

    #[derive(Default)]
    struct Clash;
    impl Node for Clash {}
    impl NodeType for Clash {
        const NAME: &'static str = "Clash";
        const TYPE_ID: Option<u16> = Some(1);
        fn describe(_builder: &mut TypeBuilder<Self>) {}
    }

    #[derive(Default)]
    struct Unnumbered;
    impl Node for Unnumbered {}
    impl NodeType for Unnumbered {
        const NAME: &'static str = "Unnumbered";
        const TYPE_ID: Option<u16> = None;
        fn describe(_builder: &mut TypeBuilder<Self>) {}
    }

    #[derive(Default)]
    struct AlsoUnnumbered;
    impl Node for AlsoUnnumbered {}
    impl NodeType for AlsoUnnumbered {
        const NAME: &'static str = "AlsoUnnumbered";
        const TYPE_ID: Option<u16> = None;
        fn describe(_builder: &mut TypeBuilder<Self>) {}
    }

    #[derive(Default)]
    struct Scratch;
    impl Node for Scratch {}
    impl NodeType for Scratch {
        const NAME: &'static str = "Scratch";
        const TYPE_ID: Option<u16> = None;
        const VISIBILITY: Visibility = Visibility::Internal;
        fn describe(_builder: &mut TypeBuilder<Self>) {}
    }

    #[derive(Default)]
    struct Doubled {
        a: i32,
        b: i32,
    }
    impl Node for Doubled {}
    impl NodeType for Doubled {
        const NAME: &'static str = "Doubled";
        const TYPE_ID: Option<u16> = Some(4);
        fn describe(builder: &mut TypeBuilder<Self>) {
            builder.property("A", 1, |d| &d.a, |d| &mut d.a);
            builder.property("B", 1, |d| &d.b, |d| &mut d.b);
        }
    }

    #[test]
    fn builds_and_looks_up() {
        let registry = Registry::builder()
            .register::<Model>()
            .register::<Scratch>()
            .build()
            .unwrap();
        assert_eq!(registry.len(), 1);

        let model = registry.get(1).unwrap();
        assert_eq!(model.name(), "Model");
        assert!(registry.get_by_name("Model").is_some());
        assert!(registry.get_of::<Model>().is_some());
        assert!(registry.get_of::<Scratch>().is_none());

        let names: Vec<_> = model.properties().iter().map(|p| p.name()).collect();
        assert_eq!(names, ["Name", "Parent", "Scale"]);
        let scale = model.property(PropertyKey::new(1, 1)).unwrap();
        assert_eq!(scale.data_type(), DataType::Double);
        assert!(model.property(PropertyKey::new(0, 2)).unwrap().is_deferred());
    }

    #[test]
    fn type_of_resolves_dyn_node() {
        let registry = Registry::builder().register::<Model>().build().unwrap();
        let boxed: Box<dyn Node> = Box::new(Model::default());
        assert_eq!(registry.type_of(&*boxed).map(|t| t.type_id()), Some(1));
    }

    #[test]
    fn duplicate_type_id_is_rejected() {
        let err = Registry::builder()
            .register::<Model>()
            .register::<Clash>()
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateTypeId {
                id: 1,
                first: "Model",
                second: "Clash",
            }
        );
    }

    #[test]
    fn missing_ids_get_distinct_suggestions() {
        let err = Registry::builder()
            .register::<Model>()
            .register::<Unnumbered>()
            .register::<AlsoUnnumbered>()
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::Multiple(vec![
                RegistryError::MissingTypeId {
                    name: "Unnumbered",
                    suggested: 2,
                },
                RegistryError::MissingTypeId {
                    name: "AlsoUnnumbered",
                    suggested: 3,
                },
            ])
        );
    }

    #[test]
    fn duplicate_property_id_is_rejected() {
        let err = Registry::builder().register::<Doubled>().build().unwrap_err();
        assert!(matches!(
            err,
            RegistryError::DuplicatePropertyId {
                type_name: "Doubled",
                property_id: 1,
                ..
            }
        ));
    }

    #[test]
    fn registering_twice_is_rejected() {
        let err = Registry::builder()
            .register::<Model>()
            .register::<Model>()
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateType { name: "Model" });
    }

    #[test]
    fn registry_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Registry>();
    }
}
