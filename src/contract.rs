//! Contract Model & Parser
//!
//! A contract declares a component's typed surface independent of any
//! template: data fields, interactive elements, variants, nested or linked
//! sub-contracts, props and URL params. Contracts are JSON documents:
//!
//! ```json
//! { "name": "counter",
//!   "tags": [ { "tag": "count", "type": "data", "dataType": "number" },
//!             { "tag": "add", "type": "interactive", "elementType": "HTMLButtonElement" } ] }
//! ```

use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::expression::{is_enum_literal, parse_enum_literal};
use crate::phase::Phase;
use crate::refs::{element_type_name, Ref, RefType, RefsTree};
use crate::resolver::ContractResolver;
use crate::types::{
    camel_case, pascal_case, AtomicType, EnumType, ImportedType, ObjectType, Type, ROOT_PATH,
};
use crate::validate::{CompilerError, Validations, WithValidations, INV_CONTRACT_FORMAT};

/// Marker for links that point back into the contract being parsed.
pub const SELF_LINK_MARKER: &str = "$/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractTagType {
    Data,
    Interactive,
    Variant,
    SubContract,
}

impl ContractTagType {
    pub fn parse(value: &str) -> Option<ContractTagType> {
        match value.trim() {
            "data" => Some(ContractTagType::Data),
            "interactive" => Some(ContractTagType::Interactive),
            "variant" => Some(ContractTagType::Variant),
            "sub-contract" | "subContract" => Some(ContractTagType::SubContract),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    Atomic(AtomicType),
    Enum(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractTag {
    pub tag: String,
    pub types: Vec<ContractTagType>,
    pub data_type: Option<DataType>,
    pub element_type: Vec<String>,
    pub tags: Option<Vec<ContractTag>>,
    pub link: Option<String>,
    pub repeated: bool,
    pub required: bool,
    pub is_async: bool,
    pub track_by: Option<String>,
    pub phase: Option<Phase>,
    pub description: Option<String>,
}

impl ContractTag {
    pub fn new(tag: &str, types: &[ContractTagType]) -> Self {
        ContractTag {
            tag: tag.to_string(),
            types: types.to_vec(),
            data_type: None,
            element_type: vec![],
            tags: None,
            link: None,
            repeated: false,
            required: false,
            is_async: false,
            track_by: None,
            phase: None,
            description: None,
        }
    }

    pub fn has(&self, tag_type: ContractTagType) -> bool {
        self.types.contains(&tag_type)
    }

    pub fn field_name(&self) -> String {
        camel_case(&self.tag)
    }

    /// Appears in a ViewState type: data and variant tags, and linked sub-contracts.
    pub fn is_view_state_leaf(&self) -> bool {
        self.has(ContractTagType::Data)
            || self.has(ContractTagType::Variant)
            || (self.has(ContractTagType::SubContract) && self.link.is_some() && self.tags.is_none())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractProp {
    pub name: String,
    pub data_type: Option<DataType>,
    pub required: bool,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractParam {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contract {
    pub name: String,
    pub tags: Vec<ContractTag>,
    pub props: Vec<ContractProp>,
    pub params: Vec<ContractParam>,
}

impl Contract {
    pub fn view_state_name(&self) -> String {
        format!("{}ViewState", pascal_case(&self.name))
    }

    pub fn refs_name(&self) -> String {
        format!("{}Refs", pascal_case(&self.name))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSING
// ═══════════════════════════════════════════════════════════════════════════════

fn tag_label(path: &[String]) -> String {
    format!("Tag [{}]", path.join("."))
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .split(|c| c == ',' || c == '|')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .collect(),
        _ => vec![],
    }
}

fn bool_field(map: &serde_json::Map<String, Value>, key: &str) -> bool {
    map.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

pub fn parse_data_type(value: &str) -> Option<DataType> {
    if let Some(atomic) = AtomicType::parse(value) {
        return Some(DataType::Atomic(atomic));
    }
    if is_enum_literal(value) {
        return parse_enum_literal(value).ok().map(DataType::Enum);
    }
    None
}

/// Parses a contract document. Shape problems become validations; only an
/// unreadable document (invalid JSON, not an object, no name) is fatal.
pub fn parse_contract(text: &str, file: &str) -> Result<WithValidations<Contract>, CompilerError> {
    let document: Value = serde_json::from_str(text).map_err(|e| {
        CompilerError::new(
            INV_CONTRACT_FORMAT,
            &format!("Contract is not valid JSON: {}", e),
            file,
        )
    })?;
    let map = document.as_object().ok_or_else(|| {
        CompilerError::new(INV_CONTRACT_FORMAT, "Contract must be an object", file)
    })?;
    let name = map
        .get("name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            CompilerError::with_details(
                INV_CONTRACT_FORMAT,
                "Contract has no name",
                file,
                None,
                vec!["Add a top level \"name\" field".to_string()],
            )
        })?;

    let mut validations = Vec::new();
    let tags = match map.get("tags") {
        Some(Value::Array(items)) => parse_tags(items, &[], &mut validations),
        Some(_) => {
            validations.push("Contract tags must be an array".to_string());
            vec![]
        }
        None => vec![],
    };
    validations.extend(validate_tags(&tags, &[]));

    let props = match map.get("props") {
        Some(Value::Array(items)) => parse_props(items, &mut validations),
        Some(_) => {
            validations.push("Contract props must be an array".to_string());
            vec![]
        }
        None => vec![],
    };
    let params = match map.get("params") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(name) => Some(name.clone()),
                Value::Object(obj) => obj.get("name").and_then(|v| v.as_str()).map(String::from),
                _ => None,
            })
            .map(|name| ContractParam { name })
            .collect(),
        Some(Value::Object(obj)) => obj
            .keys()
            .map(|name| ContractParam { name: name.clone() })
            .collect(),
        _ => vec![],
    };

    debug!(target: "view_compiler::contract", contract = %name, tags = tags.len(), "parsed contract");
    Ok(WithValidations::new(
        Contract {
            name: name.to_string(),
            tags,
            props,
            params,
        },
        validations,
    ))
}

fn parse_props(items: &[Value], validations: &mut Validations) -> Vec<ContractProp> {
    let mut props = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let Some(map) = item.as_object() else {
            validations.push(format!("Prop at index {} must be an object", index));
            continue;
        };
        let Some(name) = map.get("name").and_then(|v| v.as_str()) else {
            validations.push(format!("Prop at index {} has no name", index));
            continue;
        };
        let data_type = match map.get("type").or_else(|| map.get("dataType")).and_then(|v| v.as_str()) {
            Some(raw) => {
                let parsed = parse_data_type(raw);
                if parsed.is_none() {
                    validations.push(format!("Prop [{}] has unknown type [{}]", name, raw));
                }
                parsed
            }
            None => Some(DataType::Atomic(AtomicType::String)),
        };
        props.push(ContractProp {
            name: name.to_string(),
            data_type,
            required: bool_field(map, "required"),
            default: map.get("default").cloned(),
        });
    }
    props
}

fn parse_tags(items: &[Value], parent: &[String], validations: &mut Validations) -> Vec<ContractTag> {
    let mut tags = Vec::new();
    for (index, item) in items.iter().enumerate() {
        if let Some(tag) = parse_tag(item, index, parent, validations) {
            tags.push(tag);
        }
    }
    tags
}

fn parse_tag(
    item: &Value,
    index: usize,
    parent: &[String],
    validations: &mut Validations,
) -> Option<ContractTag> {
    let location = if parent.is_empty() {
        "the contract".to_string()
    } else {
        tag_label(parent)
    };
    let Some(map) = item.as_object() else {
        validations.push(format!("Tag at index {} of {} must be an object", index, location));
        return None;
    };
    let Some(name) = map.get("tag").and_then(|v| v.as_str()) else {
        validations.push(format!("Tag at index {} of {} has no name", index, location));
        return None;
    };

    let mut path = parent.to_vec();
    path.push(name.to_string());
    let label = tag_label(&path);

    let nested = match map.get("tags") {
        Some(Value::Array(children)) => Some(parse_tags(children, &path, validations)),
        Some(_) => {
            validations.push(format!("{} tags must be an array", label));
            None
        }
        None => None,
    };
    let link = map.get("link").and_then(|v| v.as_str()).map(String::from);

    let mut types = Vec::new();
    match map.get("type") {
        // no type: nested tags or a link make a sub-contract, anything else is data
        None => types.push(if nested.is_some() || link.is_some() {
            ContractTagType::SubContract
        } else {
            ContractTagType::Data
        }),
        Some(value) => {
            for raw in string_list(value) {
                match ContractTagType::parse(&raw) {
                    Some(t) if !types.contains(&t) => types.push(t),
                    Some(_) => {}
                    None => validations.push(format!("{} has unknown type [{}]", label, raw)),
                }
            }
            if types.is_empty() {
                types.push(ContractTagType::Data);
            }
        }
    }

    let data_type = match map.get("dataType").and_then(|v| v.as_str()) {
        Some(raw) => {
            let parsed = parse_data_type(raw);
            if parsed.is_none() {
                validations.push(format!("{} has unknown dataType [{}]", label, raw));
            }
            parsed
        }
        None => None,
    };

    let phase = match map.get("phase").and_then(|v| v.as_str()) {
        Some(raw) => {
            let parsed = Phase::parse(raw);
            if parsed.is_none() {
                validations.push(format!(
                    "{} has invalid phase [{}], expected slow, fast or fast+interactive",
                    label, raw
                ));
            }
            parsed
        }
        None => None,
    };

    Some(ContractTag {
        tag: name.to_string(),
        types,
        data_type,
        element_type: map.get("elementType").map(string_list).unwrap_or_default(),
        tags: nested,
        link,
        repeated: bool_field(map, "repeated"),
        required: bool_field(map, "required"),
        is_async: bool_field(map, "async"),
        track_by: map.get("trackBy").and_then(|v| v.as_str()).map(String::from),
        phase,
        description: map
            .get("description")
            .and_then(|v| v.as_str())
            .map(String::from),
    })
}

/// Shape validations, one message per violated rule, never short-circuiting.
pub fn validate_tags(tags: &[ContractTag], parent: &[String]) -> Validations {
    let mut validations = Vec::new();
    let mut seen = HashSet::new();

    for tag in tags {
        let mut path = parent.to_vec();
        path.push(tag.tag.clone());
        let label = tag_label(&path);

        if !seen.insert(tag.field_name()) {
            validations.push(format!("{} is declared more than once", label));
        }

        if tag.has(ContractTagType::SubContract) {
            if tag.types.len() > 1 {
                validations.push(format!(
                    "{} of type sub-contract cannot be combined with other tag types",
                    label
                ));
            }
            if tag.data_type.is_some() {
                validations.push(format!("{} of type sub-contract cannot have a dataType", label));
            }
            if !tag.element_type.is_empty() {
                validations.push(format!("{} of type sub-contract cannot have an elementType", label));
            }
            match (&tag.tags, &tag.link) {
                (None, None) => validations.push(format!(
                    "{} of type sub-contract must have either tags or a link",
                    label
                )),
                (Some(_), Some(_)) => validations.push(format!(
                    "{} of type sub-contract cannot have both tags and a link",
                    label
                )),
                _ => {}
            }
            if tag.repeated {
                match (&tag.track_by, &tag.tags) {
                    (None, _) => validations.push(format!(
                        "{} is a repeated sub-contract and must declare trackBy",
                        label
                    )),
                    (Some(track_by), Some(children)) => {
                        let found = children.iter().any(|c| {
                            c.field_name() == camel_case(track_by)
                                && (c.has(ContractTagType::Data) || c.has(ContractTagType::Variant))
                        });
                        if !found {
                            validations.push(format!(
                                "{} trackBy [{}] does not name a data tag of the repeated item",
                                label, track_by
                            ));
                        }
                    }
                    (Some(_), None) => {}
                }
            }
        } else {
            if tag.tags.is_some() {
                validations.push(format!("{} has nested tags but is not a sub-contract", label));
            }
            if tag.link.is_some() {
                validations.push(format!("{} has a link but is not a sub-contract", label));
            }
        }

        if tag.has(ContractTagType::Variant) && tag.data_type.is_none() {
            validations.push(format!("{} of type variant must have a dataType", label));
        }
        if tag.has(ContractTagType::Interactive) && tag.element_type.is_empty() {
            validations.push(format!("{} of type interactive must have an elementType", label));
        }

        if let Some(children) = &tag.tags {
            validations.extend(validate_tags(children, &path));
        }
    }
    validations
}

// ═══════════════════════════════════════════════════════════════════════════════
// LINKED CONTRACTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedLink {
    /// Self reference, as a canonical recursive path (`$/data/...`).
    Recursive(String),
    External(Box<ResolvedContract>),
    Missing,
}

/// A contract with every `link` resolved, keyed by dotted tag path.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContract {
    pub contract: Contract,
    /// Module specifier generated code imports this contract's types from.
    pub module: String,
    pub links: HashMap<String, ResolvedLink>,
}

/// `./item.contract.json` → `./item.contract`
pub fn module_specifier(link: &str) -> String {
    link.strip_suffix(".json").unwrap_or(link).to_string()
}

/// `$/` → `$/data`, `$/tree/children` → `$/data/tree/children`
pub fn recursive_reference(link: &str) -> String {
    let rest = link.trim_start_matches(SELF_LINK_MARKER).trim_matches('/');
    if rest.is_empty() {
        return ROOT_PATH.to_string();
    }
    let rest = rest.strip_prefix("data").map(|r| r.trim_start_matches('/')).unwrap_or(rest);
    if rest.is_empty() {
        return ROOT_PATH.to_string();
    }
    let segments: Vec<String> = rest.split('/').map(camel_case).collect();
    format!("{}/{}", ROOT_PATH, segments.join("/"))
}

/// Loads every linked contract through `resolver`. Missing files and file
/// level cycles become validations; self links never re-read a file.
pub fn load_linked_contracts(
    contract: Contract,
    path: &str,
    module: &str,
    resolver: &dyn ContractResolver,
) -> WithValidations<ResolvedContract> {
    let mut stack = vec![path.to_string()];
    load_links(contract, path, module, resolver, &mut stack)
}

fn load_links(
    contract: Contract,
    path: &str,
    module: &str,
    resolver: &dyn ContractResolver,
    stack: &mut Vec<String>,
) -> WithValidations<ResolvedContract> {
    let mut validations = Vec::new();
    let mut links = HashMap::new();
    let mut pending = Vec::new();
    collect_links(&contract.tags, "", &mut pending);

    for (tag_path, link) in pending {
        let resolved = if link.starts_with(SELF_LINK_MARKER) {
            ResolvedLink::Recursive(recursive_reference(&link))
        } else {
            match resolver.resolve_link(path, &link) {
                Ok(target) if stack.contains(&target) => {
                    validations.push(format!(
                        "Tag [{}] link [{}] forms a cycle: {} -> {}",
                        tag_path,
                        link,
                        stack.join(" -> "),
                        target
                    ));
                    ResolvedLink::Missing
                }
                Ok(target) => match resolver.load_contract(&target) {
                    Ok(loaded) => {
                        let linked = loaded.collect_into(&mut validations);
                        stack.push(target.clone());
                        let nested = load_links(linked, &target, &module_specifier(&link), resolver, stack)
                            .collect_into(&mut validations);
                        stack.pop();
                        ResolvedLink::External(Box::new(nested))
                    }
                    Err(e) => {
                        validations.push(format!(
                            "Tag [{}] link [{}] could not be loaded: {}",
                            tag_path, link, e
                        ));
                        ResolvedLink::Missing
                    }
                },
                Err(e) => {
                    validations.push(format!(
                        "Tag [{}] link [{}] could not be resolved: {}",
                        tag_path, link, e
                    ));
                    ResolvedLink::Missing
                }
            }
        };
        links.insert(tag_path, resolved);
    }

    WithValidations::new(
        ResolvedContract {
            contract,
            module: module.to_string(),
            links,
        },
        validations,
    )
}

fn collect_links(tags: &[ContractTag], path: &str, out: &mut Vec<(String, String)>) {
    for tag in tags {
        let tag_path = if path.is_empty() {
            tag.tag.clone()
        } else {
            format!("{}.{}", path, tag.tag)
        };
        if let Some(link) = &tag.link {
            out.push((tag_path.clone(), link.clone()));
        }
        if let Some(children) = &tag.tags {
            collect_links(children, &tag_path, out);
        }
    }
}

/// A contract without links, for contracts parsed standalone.
pub fn unlinked(contract: Contract, module: &str) -> ResolvedContract {
    ResolvedContract {
        contract,
        module: module.to_string(),
        links: HashMap::new(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VIEW STATE TYPE
// ═══════════════════════════════════════════════════════════════════════════════

pub fn data_type_to_type(data_type: Option<&DataType>, enum_name: &str) -> Type {
    match data_type {
        Some(DataType::Atomic(atomic)) => Type::Atomic(*atomic),
        Some(DataType::Enum(values)) => Type::Enum(EnumType {
            name: enum_name.to_string(),
            values: values.clone(),
        }),
        None => Type::string(),
    }
}

fn wrap_container(tag: &ContractTag, ty: Type) -> Type {
    let ty = if tag.repeated { Type::array(ty) } else { ty };
    if tag.is_async {
        Type::promise(ty)
    } else {
        ty
    }
}

/// The contract's ViewState type (unresolved recursion; see `TypeModel::new`).
pub fn contract_view_state(resolved: &ResolvedContract) -> Type {
    let object = tags_to_object(
        &resolved.contract.tags,
        &resolved.contract.view_state_name(),
        "",
        resolved,
    );
    Type::Object(object)
}

/// Nested object and enum names: `<Tag>Of<Parent>`.
pub fn nested_type_name(tag: &str, parent: &str) -> String {
    format!("{}Of{}", pascal_case(tag), parent)
}

fn tags_to_object(tags: &[ContractTag], name: &str, path: &str, resolved: &ResolvedContract) -> ObjectType {
    let mut object = ObjectType::new(name);
    for tag in tags {
        let tag_path = if path.is_empty() {
            tag.tag.clone()
        } else {
            format!("{}.{}", path, tag.tag)
        };
        let field = tag.field_name();
        let ty = if tag.has(ContractTagType::SubContract) {
            match (&tag.tags, resolved.links.get(&tag_path)) {
                (Some(children), _) => {
                    let nested = tags_to_object(children, &nested_type_name(&tag.tag, name), &tag_path, resolved);
                    if nested.props.is_empty() {
                        continue;
                    }
                    Some(wrap_container(tag, Type::Object(nested)))
                }
                (None, Some(ResolvedLink::Recursive(reference))) => {
                    Some(wrap_container(tag, Type::recursive(reference)))
                }
                (None, Some(ResolvedLink::External(linked))) => Some(wrap_container(
                    tag,
                    Type::Imported(ImportedType {
                        name: linked.contract.view_state_name(),
                        module: Some(linked.module.clone()),
                        ty: Box::new(contract_view_state(linked)),
                    }),
                )),
                (None, _) => Some(wrap_container(tag, Type::Unknown)),
            }
        } else if tag.has(ContractTagType::Data) || tag.has(ContractTagType::Variant) {
            Some(data_type_to_type(
                tag.data_type.as_ref(),
                &nested_type_name(&tag.tag, name),
            ))
        } else {
            None
        };
        if let Some(ty) = ty {
            if let Some(description) = &tag.description {
                object.docs.insert(field.clone(), description.clone());
            }
            object.props.insert(field, ty);
        }
    }
    object
}

// ═══════════════════════════════════════════════════════════════════════════════
// REFS
// ═══════════════════════════════════════════════════════════════════════════════

/// The refs tree for the contract's interactive tags, mirroring sub-contract nesting.
pub fn contract_refs(resolved: &ResolvedContract) -> RefsTree {
    contract_refs_at(resolved, &[])
}

/// Like [`contract_refs`], with constant names qualified by `prefix` (the
/// mount key of a headless instance, or the path of a linking tag).
pub fn contract_refs_at(resolved: &ResolvedContract, prefix: &[String]) -> RefsTree {
    let mut tree = RefsTree::new(false);
    add_contract_refs(
        &mut tree,
        &resolved.contract.tags,
        &resolved.contract.view_state_name(),
        "",
        prefix,
        false,
        resolved,
    );
    tree
}

fn add_contract_refs(
    tree: &mut RefsTree,
    tags: &[ContractTag],
    view_state: &str,
    path: &str,
    refs_path: &[String],
    repeated: bool,
    resolved: &ResolvedContract,
) {
    for tag in tags {
        let tag_path = if path.is_empty() {
            tag.tag.clone()
        } else {
            format!("{}.{}", path, tag.tag)
        };
        let mut child_refs_path = refs_path.to_vec();
        child_refs_path.push(tag.tag.clone());
        if tag.has(ContractTagType::Interactive) {
            let element_types: BTreeSet<String> = tag
                .element_type
                .iter()
                .map(|t| element_type_name(t))
                .collect();
            tree.refs.push(Ref::new(
                &tag.tag,
                refs_path,
                repeated,
                view_state,
                RefType::Html(element_types),
            ));
        }
        if !tag.has(ContractTagType::SubContract) {
            continue;
        }
        let child_repeated = repeated || tag.repeated;
        let mut child = RefsTree::new(child_repeated);
        match (&tag.tags, resolved.links.get(&tag_path)) {
            (Some(children), _) => add_contract_refs(
                &mut child,
                children,
                &nested_type_name(&tag.tag, view_state),
                &tag_path,
                &child_refs_path,
                child_repeated,
                resolved,
            ),
            (None, Some(ResolvedLink::External(linked))) => {
                let linked_tree = contract_refs_at(linked, &child_refs_path);
                child = linked_tree.mark_dynamic(child_repeated);
                child.imported_refs = Some(pascal_case(&linked.contract.name));
                child.imported_module = Some(linked.module.clone());
            }
            (None, Some(ResolvedLink::Recursive(_))) => {
                child.imported_refs = Some(pascal_case(&resolved.contract.name));
            }
            (None, _) => {}
        }
        if !child.is_empty() || child.imported_refs.is_some() {
            tree.children.insert(tag.field_name(), child);
        }
    }
}
