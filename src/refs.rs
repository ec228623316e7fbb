//! Refs Tree Builder & Optimizer
//!
//! Every ref-bearing element or child component contributes one [`Ref`] to a
//! path-keyed [`RefsTree`] while the template is walked. [`optimize_refs`]
//! merges same-name refs once the whole tree is known.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use std::collections::{BTreeSet, HashMap};

use crate::codegen::{js_string, Imports};
use crate::types::{camel_case, pascal_case};
use crate::validate::{Validations, WithValidations};

lazy_static! {
    static ref HTML_ELEMENT_TYPES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("a", "HTMLAnchorElement");
        m.insert("audio", "HTMLAudioElement");
        m.insert("button", "HTMLButtonElement");
        m.insert("canvas", "HTMLCanvasElement");
        m.insert("div", "HTMLDivElement");
        m.insert("form", "HTMLFormElement");
        m.insert("h1", "HTMLHeadingElement");
        m.insert("h2", "HTMLHeadingElement");
        m.insert("h3", "HTMLHeadingElement");
        m.insert("h4", "HTMLHeadingElement");
        m.insert("h5", "HTMLHeadingElement");
        m.insert("h6", "HTMLHeadingElement");
        m.insert("iframe", "HTMLIFrameElement");
        m.insert("img", "HTMLImageElement");
        m.insert("input", "HTMLInputElement");
        m.insert("label", "HTMLLabelElement");
        m.insert("li", "HTMLLIElement");
        m.insert("ol", "HTMLOListElement");
        m.insert("option", "HTMLOptionElement");
        m.insert("p", "HTMLParagraphElement");
        m.insert("pre", "HTMLPreElement");
        m.insert("select", "HTMLSelectElement");
        m.insert("span", "HTMLSpanElement");
        m.insert("table", "HTMLTableElement");
        m.insert("td", "HTMLTableCellElement");
        m.insert("textarea", "HTMLTextAreaElement");
        m.insert("th", "HTMLTableCellElement");
        m.insert("tr", "HTMLTableRowElement");
        m.insert("ul", "HTMLUListElement");
        m.insert("video", "HTMLVideoElement");
        m
    };
}

/// `button` → `HTMLButtonElement`; DOM interface names pass through.
pub fn element_type_name(tag: &str) -> String {
    let tag = tag.trim();
    if tag.starts_with("HTML") {
        return tag.to_string();
    }
    HTML_ELEMENT_TYPES
        .get(tag.to_ascii_lowercase().as_str())
        .copied()
        .unwrap_or("HTMLElement")
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefType {
    /// DOM interface names, e.g. `HTMLButtonElement`.
    Html(BTreeSet<String>),
    /// Component names, rendered as `ReturnType<typeof X>`.
    Component(BTreeSet<String>),
}

impl RefType {
    pub fn html(tag: &str) -> RefType {
        RefType::Html(BTreeSet::from([element_type_name(tag)]))
    }

    pub fn component(name: &str) -> RefType {
        RefType::Component(BTreeSet::from([name.to_string()]))
    }

    pub fn is_component(&self) -> bool {
        matches!(self, RefType::Component(_))
    }

    fn ts(&self) -> String {
        match self {
            RefType::Html(types) => types.iter().cloned().collect::<Vec<_>>().join(" | "),
            RefType::Component(names) => names
                .iter()
                .map(|n| format!("ReturnType<typeof {}>", n))
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ref {
    pub ref_name: String,
    pub original_name: String,
    pub const_name: String,
    pub dynamic_ref: bool,
    pub auto_ref: bool,
    pub view_state_type: String,
    pub ref_type: RefType,
}

impl Ref {
    pub fn new(
        original_name: &str,
        path: &[String],
        dynamic_ref: bool,
        view_state_type: &str,
        ref_type: RefType,
    ) -> Self {
        let qualified: String = path
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(original_name))
            .map(pascal_case)
            .collect();
        Ref {
            ref_name: camel_case(original_name),
            original_name: original_name.to_string(),
            const_name: format!("ref{}", qualified),
            dynamic_ref,
            auto_ref: false,
            view_state_type: view_state_type.to_string(),
            ref_type,
        }
    }

    /// Synthesized ref for a child component with no explicit `ref`.
    pub fn auto(counter: usize, dynamic_ref: bool, view_state_type: &str, ref_type: RefType) -> Self {
        let mut r = Ref::new(&format!("aR{}", counter), &[], dynamic_ref, view_state_type, ref_type);
        r.auto_ref = true;
        r
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RefsTree {
    pub refs: Vec<Ref>,
    pub children: IndexMap<String, RefsTree>,
    pub repeated: bool,
    /// Refs type base name (`Product` → `ProductRefs`) for linked contracts and
    /// headless instances.
    pub imported_refs: Option<String>,
    pub imported_module: Option<String>,
}

impl RefsTree {
    pub fn new(repeated: bool) -> Self {
        RefsTree {
            repeated,
            ..Default::default()
        }
    }

    pub fn add_ref(&mut self, r: Ref, path: &[String]) {
        match path.split_first() {
            None => self.refs.push(r),
            Some((head, rest)) => self
                .children
                .entry(camel_case(head))
                .or_default()
                .add_ref(r, rest),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty() && self.children.values().all(RefsTree::is_empty)
    }

    /// Marks every ref dynamic when `dynamic` (a linked contract used as a repeated item).
    pub fn mark_dynamic(mut self, dynamic: bool) -> RefsTree {
        self.repeated = self.repeated || dynamic;
        if dynamic {
            for r in &mut self.refs {
                r.dynamic_ref = true;
            }
        }
        self.children = self
            .children
            .into_iter()
            .map(|(k, v)| (k, v.mark_dynamic(dynamic)))
            .collect();
        self
    }

    /// Every ref in the tree, depth first.
    pub fn all_refs(&self) -> Vec<&Ref> {
        let mut out: Vec<&Ref> = self.refs.iter().collect();
        for child in self.children.values() {
            out.extend(child.all_refs());
        }
        out
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIMIZATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Merges same-name refs per node. Runs once, after the whole walk.
pub fn optimize_refs(tree: RefsTree) -> WithValidations<RefsTree> {
    let mut validations = Vec::new();
    let optimized = optimize_node(tree, &mut validations);
    WithValidations::new(optimized, validations)
}

fn optimize_node(tree: RefsTree, validations: &mut Validations) -> RefsTree {
    let mut merged: IndexMap<String, Ref> = IndexMap::new();
    for r in tree.refs {
        match merged.get_mut(&r.ref_name) {
            None => {
                merged.insert(r.ref_name.clone(), r);
            }
            Some(existing) => merge_ref(existing, r, validations),
        }
    }
    RefsTree {
        refs: merged.into_values().collect(),
        children: tree
            .children
            .into_iter()
            .map(|(key, child)| (key, optimize_node(child, validations)))
            .collect(),
        repeated: tree.repeated,
        imported_refs: tree.imported_refs,
        imported_module: tree.imported_module,
    }
}

fn merge_ref(existing: &mut Ref, other: Ref, validations: &mut Validations) {
    if existing.dynamic_ref != other.dynamic_ref {
        validations.push(format!(
            "Ref [{}] is used once with forEach and once without",
            existing.original_name
        ));
        return;
    }
    match (&mut existing.ref_type, other.ref_type) {
        (RefType::Html(types), RefType::Html(more)) => types.extend(more),
        (RefType::Component(names), RefType::Component(more)) => names.extend(more),
        _ => validations.push(format!(
            "Ref [{}] is bound to both an element and a component",
            existing.original_name
        )),
    }
    existing.auto_ref = existing.auto_ref && other.auto_ref;
}

/// Refs from different nodes whose constants would be declared twice in one
/// module, e.g. a root `cartAdd` next to a headless `cart.add`.
pub fn duplicate_const_names(tree: &RefsTree) -> Validations {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    let mut validations = Vec::new();
    for r in tree.all_refs() {
        match owners.get(r.const_name.as_str()) {
            Some(first) => validations.push(format!(
                "Refs [{}] and [{}] both compile to the constant [{}]",
                first, r.original_name, r.const_name
            )),
            None => {
                owners.insert(&r.const_name, &r.original_name);
            }
        }
    }
    validations
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERFACES
// ═══════════════════════════════════════════════════════════════════════════════

fn proxy_type(r: &Ref, collection: bool, imports: &mut Imports) -> String {
    let proxy = match (&r.ref_type, collection) {
        (RefType::Html(_), false) => {
            imports.insert(Imports::HTML_ELEMENT_PROXY);
            "HTMLElementProxy"
        }
        (RefType::Html(_), true) => {
            imports.insert(Imports::HTML_ELEMENT_COLLECTION_PROXY);
            "HTMLElementCollectionProxy"
        }
        (RefType::Component(_), false) => {
            imports.insert(Imports::COMPONENT_PROXY);
            "ComponentProxy"
        }
        (RefType::Component(_), true) => {
            imports.insert(Imports::COMPONENT_COLLECTION_PROXY);
            "ComponentCollectionProxy"
        }
    };
    format!("{}<{}, {}>", proxy, r.view_state_type, r.ref_type.ts())
}

fn interface_members(tree: &RefsTree, collection: bool, depth: usize, imports: &mut Imports) -> String {
    let indent = "    ".repeat(depth);
    let mut out = String::new();
    for r in tree.refs.iter().filter(|r| !r.auto_ref) {
        out.push_str(&format!(
            "{}{}: {};\n",
            indent,
            r.ref_name,
            proxy_type(r, collection || r.dynamic_ref, imports)
        ));
    }
    for (key, child) in &tree.children {
        let repeated = collection || child.repeated;
        match &child.imported_refs {
            Some(base) if repeated => out.push_str(&format!("{}{}: {}RepeatedRefs;\n", indent, key, base)),
            Some(base) => out.push_str(&format!("{}{}: {}Refs;\n", indent, key, base)),
            None => {
                out.push_str(&format!("{}{}: {{\n", indent, key));
                out.push_str(&interface_members(child, repeated, depth + 1, imports));
                out.push_str(&format!("{}}};\n", indent));
            }
        }
    }
    out
}

/// `export interface <name> { ... }`; `collection` renders every ref as a
/// collection proxy (the repeated variant).
pub fn render_refs_interface(tree: &RefsTree, name: &str, collection: bool, imports: &mut Imports) -> String {
    let members = interface_members(tree, collection, 1, imports);
    if members.is_empty() {
        format!("export interface {} {{}}\n", name)
    } else {
        format!("export interface {} {{\n{}}}\n", name, members)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REFERENCE MANAGERS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerKind {
    Element,
    Bridge,
    SandboxRoot,
    Tree,
}

/// Constant declarations creating the reference managers, children first.
/// The root manager is always named `refManager`.
pub fn render_refs_managers(tree: &RefsTree, kind: ManagerKind, imports: &mut Imports) -> Vec<String> {
    let mut lines = Vec::new();
    render_manager(tree, kind, &[], &mut lines, imports);
    lines
}

fn name_list(refs: &[&Ref]) -> String {
    let names: Vec<String> = refs.iter().map(|r| js_string(&r.ref_name)).collect();
    format!("[{}]", names.join(", "))
}

fn manager_var(path: &[String]) -> String {
    if path.is_empty() {
        "refManager".to_string()
    } else {
        format!("{}RefManager", camel_case(&path.join(" ")))
    }
}

fn render_manager(
    tree: &RefsTree,
    kind: ManagerKind,
    path: &[String],
    lines: &mut Vec<String>,
    imports: &mut Imports,
) {
    let is_root = path.is_empty();
    let mut child_vars = Vec::new();
    for (key, child) in &tree.children {
        if child.is_empty() {
            continue;
        }
        let mut child_path = path.to_vec();
        child_path.push(key.clone());
        render_manager(child, kind, &child_path, lines, imports);
        child_vars.push(format!("{}: {}", key, manager_var(&child_path)));
    }

    let pick = |dynamic: bool, component: bool| -> Vec<&Ref> {
        tree.refs
            .iter()
            .filter(|r| r.dynamic_ref == dynamic && r.ref_type.is_component() == component)
            .collect()
    };
    let groups = [pick(false, false), pick(true, false), pick(false, true), pick(true, true)];
    let consts: Vec<&str> = groups
        .iter()
        .flat_map(|g| g.iter().map(|r| r.const_name.as_str()))
        .collect();
    let mut args: Vec<String> = groups.iter().map(|g| name_list(g)).collect();
    if !child_vars.is_empty() {
        args.push(format!("{{{}}}", child_vars.join(", ")));
    }

    let call = match (kind, is_root) {
        (ManagerKind::Element, _) => {
            imports.insert(Imports::REFERENCES_MANAGER);
            format!("ReferencesManager.for(options, {})", args.join(", "))
        }
        (ManagerKind::Bridge, _) | (ManagerKind::SandboxRoot, false) => {
            imports.insert(Imports::SECURE_REFERENCES_MANAGER);
            format!("SecureReferencesManager.forElement({})", args.join(", "))
        }
        (ManagerKind::SandboxRoot, true) => {
            imports.insert(Imports::SECURE_REFERENCES_MANAGER);
            format!("SecureReferencesManager.forSandboxRoot(options, {})", args.join(", "))
        }
        (ManagerKind::Tree, _) => {
            imports.insert(Imports::REFERENCES_MANAGER);
            format!("ReferencesManager.forTree(options, {})", args.join(", "))
        }
    };
    lines.push(format!(
        "const [{}, [{}]] = {};",
        manager_var(path),
        consts.join(", "),
        call
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_type_names() {
        assert_eq!(element_type_name("button"), "HTMLButtonElement");
        assert_eq!(element_type_name("HTMLInputElement"), "HTMLInputElement");
        assert_eq!(element_type_name("section"), "HTMLElement");
    }

    #[test]
    fn const_names_are_path_qualified() {
        let r = Ref::new("remove", &["items".to_string()], true, "ItemVS", RefType::html("button"));
        assert_eq!(r.ref_name, "remove");
        assert_eq!(r.const_name, "refItemsRemove");
    }

    #[test]
    fn add_ref_creates_path() {
        let mut tree = RefsTree::new(false);
        tree.add_ref(
            Ref::new("buy", &["product".to_string()], false, "VS", RefType::html("button")),
            &["product".to_string()],
        );
        assert!(tree.refs.is_empty());
        assert_eq!(tree.children["product"].refs.len(), 1);
        assert!(!tree.is_empty());
    }
}
