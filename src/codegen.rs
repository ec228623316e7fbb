//! Codegen module
//!
//! Target-independent pieces of the generated TypeScript: runtime import sets,
//! string quoting, ViewState type declarations and the module skeleton every
//! target shares. The per-target render bodies live in `target_*.rs`.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use crate::options::CompileOptions;
use crate::types::{Type, TypeModel};
use crate::validate::HeadLink;

// ═══════════════════════════════════════════════════════════════════════════════
// TARGETS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Trusted, same-process element construction.
    #[default]
    Element,
    /// Sandbox worker side: only ref-bearing structure.
    Bridge,
    /// Sandbox root: markup with every child component wrapped for dispatch.
    Sandbox,
    /// Secondary declarative UI tree.
    Tree,
}

impl Target {
    pub const ALL: [Target; 4] = [Target::Element, Target::Bridge, Target::Sandbox, Target::Tree];

    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Element => "element",
            Target::Bridge => "bridge",
            Target::Sandbox => "sandbox",
            Target::Tree => "tree",
        }
    }

    pub fn parse(value: &str) -> Option<Target> {
        Target::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RUNTIME IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

bitflags! {
    /// Runtime symbols a generated module uses.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Imports: u64 {
        const ELEMENT = 1 << 0;
        const DYNAMIC_ELEMENT = 1 << 1;
        const DYNAMIC_TEXT = 1 << 2;
        const DYNAMIC_ATTRIBUTE = 1 << 3;
        const DYNAMIC_PROPERTY = 1 << 4;
        const CONDITIONAL = 1 << 5;
        const FOR_EACH = 1 << 6;
        const SLOW_FOR_EACH_ITEM = 1 << 7;
        const PENDING = 1 << 8;
        const RESOLVED = 1 << 9;
        const REJECTED = 1 << 10;
        const CHILD_COMP = 1 << 11;
        const SECURE_CHILD_COMP = 1 << 12;
        const WITH_DATA = 1 << 13;
        const REFERENCES_MANAGER = 1 << 14;
        const SECURE_REFERENCES_MANAGER = 1 << 15;
        const CONSTRUCT_CONTEXT = 1 << 16;
        const ELEMENT_BRIDGE = 1 << 17;
        const MAIN_ROOT = 1 << 18;
        const TREE_ROOT = 1 << 19;
        const H = 1 << 20;
        const WHEN = 1 << 21;
        const EACH = 1 << 22;
        const AWAITING = 1 << 23;
        const INJECT_HEAD_LINKS = 1 << 24;
        const HTML_ELEMENT_PROXY = 1 << 32;
        const HTML_ELEMENT_COLLECTION_PROXY = 1 << 33;
        const COMPONENT_PROXY = 1 << 34;
        const COMPONENT_COLLECTION_PROXY = 1 << 35;
        const VIEW_ELEMENT = 1 << 36;
        const RENDER_ELEMENT = 1 << 37;
        const RENDER_ELEMENT_OPTIONS = 1 << 38;
        const VIEW_CONTRACT = 1 << 39;
        const URL_PARAMS = 1 << 40;
    }
}

/// Type-only symbols; always imported from the runtime module.
const TYPE_IMPORTS: Imports = Imports::HTML_ELEMENT_PROXY
    .union(Imports::HTML_ELEMENT_COLLECTION_PROXY)
    .union(Imports::COMPONENT_PROXY)
    .union(Imports::COMPONENT_COLLECTION_PROXY)
    .union(Imports::VIEW_ELEMENT)
    .union(Imports::RENDER_ELEMENT)
    .union(Imports::RENDER_ELEMENT_OPTIONS)
    .union(Imports::VIEW_CONTRACT)
    .union(Imports::URL_PARAMS);

const SYMBOLS: &[(Imports, &str)] = &[
    (Imports::ELEMENT, "e"),
    (Imports::DYNAMIC_ELEMENT, "de"),
    (Imports::DYNAMIC_TEXT, "dt"),
    (Imports::DYNAMIC_ATTRIBUTE, "da"),
    (Imports::DYNAMIC_PROPERTY, "dp"),
    (Imports::CONDITIONAL, "c"),
    (Imports::FOR_EACH, "forEach"),
    (Imports::SLOW_FOR_EACH_ITEM, "slowForEachItem"),
    (Imports::PENDING, "pending"),
    (Imports::RESOLVED, "resolved"),
    (Imports::REJECTED, "rejected"),
    (Imports::CHILD_COMP, "childComp"),
    (Imports::SECURE_CHILD_COMP, "secureChildComp"),
    (Imports::WITH_DATA, "withData"),
    (Imports::REFERENCES_MANAGER, "ReferencesManager"),
    (Imports::SECURE_REFERENCES_MANAGER, "SecureReferencesManager"),
    (Imports::CONSTRUCT_CONTEXT, "ConstructContext"),
    (Imports::ELEMENT_BRIDGE, "elementBridge"),
    (Imports::MAIN_ROOT, "mainRoot"),
    (Imports::TREE_ROOT, "treeRoot"),
    (Imports::H, "h"),
    (Imports::WHEN, "when"),
    (Imports::EACH, "each"),
    (Imports::AWAITING, "awaiting"),
    (Imports::INJECT_HEAD_LINKS, "injectHeadLinks"),
    (Imports::HTML_ELEMENT_PROXY, "HTMLElementProxy"),
    (Imports::HTML_ELEMENT_COLLECTION_PROXY, "HTMLElementCollectionProxy"),
    (Imports::COMPONENT_PROXY, "ComponentProxy"),
    (Imports::COMPONENT_COLLECTION_PROXY, "ComponentCollectionProxy"),
    (Imports::VIEW_ELEMENT, "ViewElement"),
    (Imports::RENDER_ELEMENT, "RenderElement"),
    (Imports::RENDER_ELEMENT_OPTIONS, "RenderElementOptions"),
    (Imports::VIEW_CONTRACT, "ViewContract"),
    (Imports::URL_PARAMS, "UrlParams"),
];

/// Module a runtime symbol is imported from for `target`.
fn module_for<'a>(flag: Imports, target: Target, options: &'a CompileOptions) -> &'a str {
    let secure = Imports::SECURE_CHILD_COMP
        | Imports::SECURE_REFERENCES_MANAGER
        | Imports::ELEMENT_BRIDGE
        | Imports::MAIN_ROOT;
    let tree = Imports::H
        | Imports::WHEN
        | Imports::EACH
        | Imports::AWAITING
        | Imports::TREE_ROOT;
    if TYPE_IMPORTS.contains(flag) {
        return &options.runtime_module;
    }
    if secure.contains(flag) {
        return &options.secure_module;
    }
    if tree.contains(flag) {
        return &options.tree_module;
    }
    match target {
        // the bridge builds a mirror of the structure, not elements
        Target::Bridge => &options.secure_module,
        Target::Tree => &options.tree_module,
        Target::Element | Target::Sandbox => &options.runtime_module,
    }
}

impl Imports {
    /// One `import { ... } from '...'` line per module, in module order.
    pub fn render(&self, target: Target, options: &CompileOptions) -> String {
        let mut by_module: BTreeMap<&str, Vec<&'static str>> = BTreeMap::new();
        for (flag, name) in SYMBOLS.iter().filter(|(flag, _)| self.contains(*flag)) {
            by_module
                .entry(module_for(*flag, target, options))
                .or_default()
                .push(*name);
        }
        by_module
            .into_iter()
            .map(|(module, names)| format!("import {{ {} }} from {};\n", names.join(", "), js_string(module)))
            .collect()
    }
}

/// Imports of user modules: component implementations, imported types and
/// linked contract types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalImports {
    modules: BTreeMap<String, BTreeSet<String>>,
}

impl ExternalImports {
    pub fn add(&mut self, module: &str, name: &str) {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(name.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn render(&self) -> String {
        self.modules
            .iter()
            .map(|(module, names)| {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                format!("import {{ {} }} from {};\n", names.join(", "), js_string(module))
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRINGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Single-quoted JavaScript string literal.
pub fn js_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Escapes literal text placed inside a template literal.
pub fn template_literal_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Object literal key, quoted when it is not a plain identifier (`aria-label`).
pub fn object_key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        js_string(name)
    }
}

pub fn indent(text: &str, level: usize) -> String {
    let pad = "    ".repeat(level);
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

const INLINE_WIDTH: usize = 100;

/// `callee(a, b)`, broken over lines once it gets long or an argument spans lines.
pub fn call(callee: &str, args: &[String]) -> String {
    let inline = args.join(", ");
    if !inline.contains('\n') && inline.len() + callee.len() <= INLINE_WIDTH {
        return format!("{}({})", callee, inline);
    }
    format!("{}(\n{},\n)", callee, indent(&args.join(",\n"), 1))
}

/// Array literal, broken over lines the same way as [`call`].
pub fn array(items: &[String]) -> String {
    let inline = items.join(", ");
    if !inline.contains('\n') && inline.len() <= INLINE_WIDTH {
        return format!("[{}]", inline);
    }
    format!("[\n{},\n]", indent(&items.join(",\n"), 1))
}

/// `{a: x, 'b-c': y}`; `{}` when empty.
pub fn object(entries: &[(String, String)]) -> String {
    if entries.is_empty() {
        return "{}".to_string();
    }
    let fields: Vec<String> = entries
        .iter()
        .map(|(key, value)| format!("{}: {}", object_key(key), value))
        .collect();
    let inline = fields.join(", ");
    if !inline.contains('\n') && inline.len() <= INLINE_WIDTH {
        return format!("{{{}}}", inline);
    }
    format!("{{\n{},\n}}", indent(&fields.join(",\n"), 1))
}

/// `(vs: T) => body`
pub fn arrow(view_state: &str, body: &str) -> String {
    format!("(vs: {}) => {}", view_state, body)
}

/// The statement injecting head links when the element renders, if any.
pub fn render_head_links(links: &[HeadLink], imports: &mut Imports) -> Option<String> {
    if links.is_empty() {
        return None;
    }
    imports.insert(Imports::INJECT_HEAD_LINKS);
    let entries: Vec<String> = links
        .iter()
        .map(|link| {
            let mut fields = vec![
                ("rel".to_string(), js_string(&link.rel)),
                ("href".to_string(), js_string(&link.href)),
            ];
            if !link.attributes.is_empty() {
                let attributes: Vec<(String, String)> = link
                    .attributes
                    .iter()
                    .map(|a| (a.name.clone(), js_string(&a.value)))
                    .collect();
                fields.push(("attributes".to_string(), object(&attributes)));
            }
            object(&fields)
        })
        .collect();
    Some(format!("{};", call("injectHeadLinks", &[array(&entries)])))
}

/// What a target backend contributes to the module skeleton.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetOutput {
    pub imports: Imports,
    pub manager_lines: Vec<String>,
    pub regions: Vec<String>,
    pub render_body: String,
    pub takes_options: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TYPE DECLARATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// `export enum` and `export interface` declarations for every named type
/// reachable from the model root. Imported types become external imports.
pub fn render_type_declarations(model: &TypeModel, externals: &mut ExternalImports) -> String {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    declare(model, model.root(), &mut out, &mut seen, externals);
    out.join("\n")
}

fn declare(
    model: &TypeModel,
    ty: &Type,
    out: &mut Vec<String>,
    seen: &mut HashSet<String>,
    externals: &mut ExternalImports,
) {
    match ty {
        Type::Object(object) => {
            if !seen.insert(object.name.clone()) {
                return;
            }
            for field_type in object.props.values() {
                declare(model, field_type, out, seen, externals);
            }
            let mut body = String::new();
            for (field, field_type) in &object.props {
                if let Some(doc) = object.docs.get(field) {
                    body.push_str(&format!("    /** {} */\n", doc));
                }
                body.push_str(&format!("    {}: {};\n", object_key(field), model.ts_type(field_type)));
            }
            out.push(format!("export interface {} {{\n{}}}\n", object.name, body));
        }
        Type::Enum(e) => {
            if !seen.insert(e.name.clone()) {
                return;
            }
            let values: String = e.values.iter().map(|v| format!("    {},\n", v)).collect();
            out.push(format!("export enum {} {{\n{}}}\n", e.name, values));
        }
        Type::Array(inner) | Type::Promise(inner) => declare(model, inner, out, seen, externals),
        Type::Imported(imported) => match &imported.module {
            Some(module) => externals.add(module, &imported.name),
            None => declare(model, &imported.ty, out, seen, externals),
        },
        Type::Atomic(_) | Type::Component(_) | Type::Recursive(_) | Type::Unknown => {}
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MODULE ASSEMBLY
// ═══════════════════════════════════════════════════════════════════════════════

/// The pieces of one generated template module.
#[derive(Debug, Clone, Default)]
pub struct ModuleParts {
    /// PascalCase base name, e.g. `Counter`.
    pub base: String,
    pub view_state: String,
    /// Leading declarations: ViewState types (or re-exports) and refs interfaces.
    pub declarations: String,
    pub manager_lines: Vec<String>,
    /// Hoisted recursive region functions, declared inside `render`.
    pub regions: Vec<String>,
    /// Expression building the element for `viewState`.
    pub render_body: String,
    pub takes_options: bool,
}

impl ModuleParts {
    pub fn element_type(&self) -> String {
        format!("{}Element", self.base)
    }

    pub fn refs_type(&self) -> String {
        format!("{}ElementRefs", self.base)
    }
}

pub fn assemble_module(
    parts: &ModuleParts,
    mut imports: Imports,
    externals: &ExternalImports,
    target: Target,
    options: &CompileOptions,
) -> String {
    imports.insert(Imports::VIEW_ELEMENT | Imports::RENDER_ELEMENT);
    if parts.takes_options {
        imports.insert(Imports::RENDER_ELEMENT_OPTIONS);
    }
    let element = parts.element_type();
    let refs = parts.refs_type();
    let vs = &parts.view_state;

    let mut out = String::new();
    out.push_str(&imports.render(target, options));
    out.push_str(&externals.render());
    out.push('\n');
    out.push_str(&parts.declarations);
    out.push('\n');
    out.push_str(&format!(
        "export type {element} = ViewElement<{vs}, {refs}>;\n\
         export type {element}Render = RenderElement<{vs}, {refs}, {element}>;\n\
         export type {element}PreRender = [{refs}, {element}Render];\n\n"
    ));

    let params = if parts.takes_options {
        "options?: RenderElementOptions"
    } else {
        ""
    };
    out.push_str(&format!("export function render({}): {}PreRender {{\n", params, element));
    for line in &parts.manager_lines {
        out.push_str(&indent(line, 1));
        out.push('\n');
    }
    for region in &parts.regions {
        out.push_str(&indent(region, 1));
        out.push('\n');
    }
    out.push_str(&format!("    const render = (viewState: {}) =>\n", vs));
    out.push_str(&indent(&format!("{} as {};", parts.render_body, element), 2));
    out.push('\n');
    out.push_str(&format!(
        "    return [refManager.getPublicAPI() as {}, render];\n}}\n",
        refs
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EnumType, ObjectType};

    #[test]
    fn quotes_strings() {
        assert_eq!(js_string("it's"), "'it\\'s'");
        assert_eq!(js_string("a\nb"), "'a\\nb'");
        assert_eq!(template_literal_text("`${x}`"), "\\`\\${x}\\`");
    }

    #[test]
    fn object_keys() {
        assert_eq!(object_key("class"), "class");
        assert_eq!(object_key("aria-label"), "'aria-label'");
    }

    #[test]
    fn imports_are_grouped_by_module() {
        let options = CompileOptions::default();
        let imports = Imports::ELEMENT | Imports::SECURE_CHILD_COMP | Imports::VIEW_ELEMENT;
        let rendered = imports.render(Target::Sandbox, &options);
        assert!(rendered.contains("import { e, ViewElement } from '@view/runtime';"));
        assert!(rendered.contains("import { secureChildComp } from '@view/secure';"));
    }

    #[test]
    fn bridge_structure_comes_from_secure_module() {
        let options = CompileOptions::default();
        let rendered = (Imports::ELEMENT | Imports::FOR_EACH).render(Target::Bridge, &options);
        assert_eq!(rendered, "import { e, forEach } from '@view/secure';\n");
    }

    #[test]
    fn head_links_are_injected() {
        let mut imports = Imports::empty();
        assert_eq!(render_head_links(&[], &mut imports), None);
        assert!(imports.is_empty());

        let link = HeadLink {
            rel: "stylesheet".to_string(),
            href: "/main.css".to_string(),
            attributes: vec![crate::validate::AttributeIR {
                name: "media".to_string(),
                value: "print".to_string(),
            }],
        };
        assert_eq!(
            render_head_links(&[link], &mut imports).as_deref(),
            Some("injectHeadLinks([{rel: 'stylesheet', href: '/main.css', attributes: {media: 'print'}}]);")
        );
        assert!(imports.contains(Imports::INJECT_HEAD_LINKS));
    }

    #[test]
    fn declares_nested_types_before_parents() {
        let status = Type::Enum(EnumType {
            name: "StatusOfTodoViewState".to_string(),
            values: vec!["active".to_string(), "done".to_string()],
        });
        let item = Type::Object(
            ObjectType::new("ItemOfTodoViewState")
                .with_prop("title", Type::string())
                .with_prop("status", status),
        );
        let root = Type::Object(ObjectType::new("TodoViewState").with_prop("items", Type::array(item)));
        let model = TypeModel::new(root, "todo").unwrap();
        let mut externals = ExternalImports::default();
        let rendered = render_type_declarations(&model, &mut externals);
        let enum_at = rendered.find("export enum StatusOfTodoViewState").unwrap();
        let item_at = rendered.find("export interface ItemOfTodoViewState").unwrap();
        let root_at = rendered.find("export interface TodoViewState").unwrap();
        assert!(enum_at < item_at && item_at < root_at);
        assert!(rendered.contains("items: Array<ItemOfTodoViewState>;"));
        assert!(externals.is_empty());
    }
}
