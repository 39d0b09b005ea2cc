use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, LitInt, LitStr, parse_macro_input};

/// Derive the `NodeType` trait, declaring a node type and its properties.
///
/// The struct must also implement `Default` and `Node`.
///
/// # Struct attributes
///
/// - `#[node(id = N)]`: stable type id (required unless `internal`)
/// - `name = "..."`: type name, defaults to the struct name
/// - `singleton`: deserialization reuses the graph's existing instance
/// - `excludable`: subtrees rooted here are skipped unless requested
/// - `internal`: the id may be omitted, the type is then not registered
///
/// # Field attributes
///
/// - `#[property(id = N)]`: tagged property, written to streams
/// - `#[property(id = N, deferred)]`: applied after every other property
/// - `#[property(untagged)]`: declared but never written
/// - `#[property(id = N, opaque)]`: declared with no wire type
/// - `name = "..."`: property name, defaults to the PascalCase field name
///
/// ```ignore
/// #[derive(Default, NodeType)]
/// #[node(id = 5, name = "Part")]
/// struct Part {
///     #[property(id = 1)]
///     size: f32,
///     #[property(id = 2)]
///     anchor: Option<NodeId>,
///     #[property(untagged)]
///     velocity: f32,
///     cache: Vec<u8>,
/// }
/// ```
#[proc_macro_derive(NodeType, attributes(node, property))]
pub fn derive_node_type(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct NodeAttrs {
    id: Option<LitInt>,
    name: Option<LitStr>,
    singleton: bool,
    excludable: bool,
    internal: bool,
}

#[derive(Default)]
struct PropertyAttrs {
    id: Option<LitInt>,
    name: Option<LitStr>,
    deferred: bool,
    untagged: bool,
    opaque: bool,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "NodeType cannot be derived for generic types",
        ));
    }

    let data = match &input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new_spanned(
                ident,
                "NodeType can only be derived for structs",
            ));
        }
    };

    let attrs = parse_node_attrs(input)?;
    if attrs.id.is_none() && !attrs.internal {
        return Err(syn::Error::new_spanned(
            ident,
            "missing `#[node(id = N)]`; only `internal` node types may omit an id",
        ));
    }

    let mut declarations = Vec::new();
    for field in &data.fields {
        let Some(attr) = field.attrs.iter().find(|a| a.path().is_ident("property")) else {
            continue;
        };
        let Some(field_ident) = &field.ident else {
            return Err(syn::Error::new_spanned(
                field,
                "`#[property]` requires a named field",
            ));
        };

        let mut prop = PropertyAttrs::default();
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                prop.id = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("name") {
                prop.name = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("deferred") {
                prop.deferred = true;
            } else if meta.path.is_ident("untagged") {
                prop.untagged = true;
            } else if meta.path.is_ident("opaque") {
                prop.opaque = true;
            } else {
                return Err(meta.error("unknown property attribute"));
            }
            Ok(())
        })?;

        let name = prop
            .name
            .as_ref()
            .map(LitStr::value)
            .unwrap_or_else(|| pascal_case(&field_ident.to_string()));
        let ty = &field.ty;

        let accessors = quote! {
            fn get(node: &#ident) -> &#ty {
                &node.#field_ident
            }
            fn set(node: &mut #ident) -> &mut #ty {
                &mut node.#field_ident
            }
        };
        let deferred = if prop.deferred {
            quote! { .deferred() }
        } else {
            quote! {}
        };

        let declaration = match (&prop.id, prop.untagged, prop.opaque) {
            (Some(_), true, _) => {
                return Err(syn::Error::new_spanned(
                    attr,
                    "an `untagged` property cannot have an id",
                ));
            }
            (None, true, true) | (None, false, true) => {
                return Err(syn::Error::new_spanned(attr, "an `opaque` property needs an id"));
            }
            (None, false, false) => {
                return Err(syn::Error::new_spanned(
                    attr,
                    "missing `id = N`; use `untagged` for properties that are not written",
                ));
            }
            (None, true, false) => quote! {
                {
                    #accessors
                    builder.untagged(#name, get, set)#deferred;
                }
            },
            (Some(id), false, true) => quote! {
                builder.opaque(#name, #id)#deferred;
            },
            (Some(id), false, false) => quote! {
                {
                    #accessors
                    builder.property(#name, #id, get, set)#deferred;
                }
            },
        };
        declarations.push(declaration);
    }

    let type_name = attrs
        .name
        .as_ref()
        .map(LitStr::value)
        .unwrap_or_else(|| ident.to_string());
    let type_id = match &attrs.id {
        Some(id) => quote! { ::core::option::Option::Some(#id) },
        None => quote! { ::core::option::Option::None },
    };
    let visibility = if attrs.internal {
        quote! { ::redlilium_instbin::Visibility::Internal }
    } else {
        quote! { ::redlilium_instbin::Visibility::Public }
    };
    let singleton = attrs.singleton;
    let excludable = attrs.excludable;

    Ok(quote! {
        impl ::redlilium_instbin::NodeType for #ident {
            const NAME: &'static str = #type_name;
            const TYPE_ID: ::core::option::Option<u16> = #type_id;
            const VISIBILITY: ::redlilium_instbin::Visibility = #visibility;
            const SINGLETON: bool = #singleton;
            const EXCLUDABLE: bool = #excludable;

            #[allow(unused_variables)]
            fn describe(builder: &mut ::redlilium_instbin::TypeBuilder<Self>) {
                #(#declarations)*
            }
        }
    })
}

fn parse_node_attrs(input: &DeriveInput) -> syn::Result<NodeAttrs> {
    let mut attrs = NodeAttrs::default();
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("node")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                attrs.id = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("name") {
                attrs.name = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("singleton") {
                attrs.singleton = true;
            } else if meta.path.is_ident("excludable") {
                attrs.excludable = true;
            } else if meta.path.is_ident("internal") {
                attrs.internal = true;
            } else {
                return Err(meta.error("unknown node attribute"));
            }
            Ok(())
        })?;
    }
    if let Some(id) = &attrs.id {
        id.base10_parse::<u16>()?;
    }
    Ok(attrs)
}

/// `max_distance` -> `MaxDistance`.
fn pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
