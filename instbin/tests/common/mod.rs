//! Node types and helpers shared by the integration tests.

#![allow(dead_code)]

use redlilium_instbin::{
    Content, FontFamily, HookContext, InstanceId, Node, NodeId, NodeType, Registry, SceneGraph,
    UserData, UserDataError, impl_enum_property, take_bytes,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Value types
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Material {
    #[default]
    Plastic,
    Wood,
    Neon,
}

impl_enum_property!(Material {
    Plastic = 256,
    Wood = 512,
    Neon = 1088,
});

/// Free-form labels attached to a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Tags(pub Vec<String>);

impl UserData for Tags {
    const TAG: u8 = 1;
    const NAME: &'static str = "Tags";

    fn save(&self, out: &mut Vec<u8>) {
        out.push(self.0.len() as u8);
        for tag in &self.0 {
            out.push(tag.len() as u8);
            out.extend_from_slice(tag.as_bytes());
        }
    }

    fn load(input: &mut &[u8]) -> Result<Self, UserDataError> {
        let [count] = take_bytes::<1>(input)?;
        let mut tags = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let [len] = take_bytes::<1>(input)?;
            let data: &[u8] = *input;
            let (bytes, rest) = data
                .split_at_checked(len as usize)
                .ok_or(UserDataError::Truncated)?;
            *input = rest;
            let tag = String::from_utf8(bytes.to_vec())
                .map_err(|err| UserDataError::Invalid(err.to_string()))?;
            tags.push(tag);
        }
        Ok(Tags(tags))
    }
}

// ============================================================================
// Node types
// ============================================================================

#[derive(Debug, Default, NodeType)]
#[node(id = 1)]
pub struct Model {
    #[property(id = 1)]
    pub primary: Option<NodeId>,
}
impl Node for Model {}

#[derive(Debug, Default, NodeType)]
#[node(id = 2)]
pub struct Part {
    #[property(id = 1)]
    pub size: f32,
    #[property(id = 2)]
    pub anchored: bool,
    #[property(id = 3)]
    pub material: Material,
    #[property(id = 4)]
    pub mesh: Content,
    #[property(id = 5)]
    pub target: Option<NodeId>,
    #[property(id = 6)]
    pub tags: Option<Tags>,
    #[property(id = 7)]
    pub font: FontFamily,
    #[property(id = 8)]
    pub guid: InstanceId,
    #[property(id = 9)]
    pub blob: Vec<u8>,
    #[property(id = 10)]
    pub mass: f64,
    #[property(id = 11)]
    pub layer: i16,
    #[property(id = 12)]
    pub seed: i64,
    #[property(id = 13)]
    pub label: String,
    #[property(id = 14)]
    pub count: i32,
    #[property(untagged)]
    pub velocity: f32,
    #[property(id = 15, opaque)]
    pub handle: usize,
    pub scratch: u32,
}
impl Node for Part {}

/// Scenario root type.
#[derive(Debug, Default, NodeType)]
#[node(id = 5, name = "A")]
pub struct TypeA;
impl Node for TypeA {}

/// Scenario child type with one reference property.
#[derive(Debug, Default, NodeType)]
#[node(id = 7, name = "B")]
pub struct TypeB {
    #[property(id = 1, name = "P")]
    pub p: Option<NodeId>,
}
impl Node for TypeB {}

#[derive(Debug, Default, NodeType)]
#[node(id = 20, singleton)]
pub struct Lighting {
    #[property(id = 1)]
    pub brightness: f32,
}
impl Node for Lighting {}

#[derive(Debug, Default, NodeType)]
#[node(id = 21, excludable)]
pub struct Cache;
impl Node for Cache {}

/// Records what it can see of the graph when it gets attached.
#[derive(Debug, Default, NodeType)]
#[node(id = 30)]
pub struct Watcher {
    #[property(id = 1)]
    pub value: i32,
    #[property(id = 2)]
    pub peer: Option<NodeId>,
    pub own_value_at_attach: Option<i32>,
    pub parent_value_at_attach: Option<i32>,
    pub peer_value_at_attach: Option<i32>,
}

impl Node for Watcher {
    fn on_parent_changed(&mut self, _node: NodeId, parent: Option<NodeId>, graph: &SceneGraph) {
        self.own_value_at_attach = Some(self.value);
        self.parent_value_at_attach =
            parent.and_then(|p| graph.get::<Watcher>(p).map(|w| w.value));
        self.peer_value_at_attach = self
            .peer
            .and_then(|p| graph.get::<Watcher>(p).map(|w| w.value));
    }
}

/// Counts lifecycle hook invocations.
#[derive(Debug, Default, NodeType)]
#[node(id = 31)]
pub struct Tracked {
    #[property(id = 1)]
    pub label: String,
    pub before_serialize: u32,
    pub after_serialize: u32,
    pub before_deserialize: u32,
    pub after_deserialize: u32,
    pub label_in_before_deserialize: Option<String>,
    pub children_in_after_deserialize: usize,
    pub saw_clone: bool,
}

impl Node for Tracked {
    fn before_serialize(&mut self, ctx: &HookContext) {
        self.before_serialize += 1;
        self.saw_clone |= ctx.clone;
    }

    fn after_serialize(&mut self, _ctx: &HookContext) {
        self.after_serialize += 1;
    }

    fn before_deserialize(&mut self, ctx: &HookContext) {
        self.before_deserialize += 1;
        self.label_in_before_deserialize = Some(self.label.clone());
        self.saw_clone |= ctx.clone;
    }

    fn after_deserialize(&mut self, ctx: &HookContext, graph: &SceneGraph) {
        self.after_deserialize += 1;
        self.children_in_after_deserialize = graph.children(ctx.node).len();
    }
}

/// Internal helper type without an id; never registered.
#[derive(Debug, Default, NodeType)]
#[node(internal)]
pub struct Gizmo;
impl Node for Gizmo {}

pub fn registry() -> Registry {
    Registry::builder()
        .register::<Model>()
        .register::<Part>()
        .register::<TypeA>()
        .register::<TypeB>()
        .register::<Lighting>()
        .register::<Cache>()
        .register::<Watcher>()
        .register::<Tracked>()
        .register::<Gizmo>()
        .register_user_data::<Tags>()
        .build()
        .expect("test registry is valid")
}

/// Names of `id`'s children, in order.
pub fn child_names(graph: &SceneGraph, id: NodeId) -> Vec<String> {
    graph
        .children(id)
        .iter()
        .map(|&c| graph.name(c).unwrap_or_default().to_owned())
        .collect()
}

/// Finds a direct child by name.
pub fn child_named(graph: &SceneGraph, id: NodeId, name: &str) -> NodeId {
    *graph
        .children(id)
        .iter()
        .find(|&&c| graph.name(c) == Some(name))
        .unwrap_or_else(|| panic!("no child named {name}"))
}

pub fn assert_type<N: NodeType>(graph: &SceneGraph, id: NodeId) {
    assert!(
        graph.get::<N>(id).is_some(),
        "node {id} is not a {}",
        N::NAME
    );
}
