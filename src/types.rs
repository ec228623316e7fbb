//! Type Model
//!
//! Algebraic representation of view-state shapes. Recursive types are built
//! as placeholders carrying a reference path and patched in a second pass
//! (see [`TypeModel::new`]), so construction never follows a back-pointer.

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

use crate::validate::{
    CompilerError, INV_MALFORMED_RECURSIVE_PATH, INV_UNRESOLVED_RECURSION,
};

/// Canonical path of the root object. Recursive references are written
/// relative to it (`$/data`, `$/data/children`).
pub const ROOT_PATH: &str = "$/data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicType {
    String,
    Number,
    Boolean,
    Date,
}

impl AtomicType {
    pub fn parse(name: &str) -> Option<AtomicType> {
        match name.trim() {
            "string" => Some(AtomicType::String),
            "number" => Some(AtomicType::Number),
            "boolean" => Some(AtomicType::Boolean),
            "date" | "Date" => Some(AtomicType::Date),
            _ => None,
        }
    }

    pub fn ts_name(&self) -> &'static str {
        match self {
            AtomicType::String => "string",
            AtomicType::Number => "number",
            AtomicType::Boolean => "boolean",
            AtomicType::Date => "Date",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObjectType {
    pub name: String,
    pub props: IndexMap<String, Type>,
    /// Field documentation, emitted as doc comments. Not part of equality.
    pub docs: HashMap<String, String>,
}

impl ObjectType {
    pub fn new(name: &str) -> Self {
        ObjectType {
            name: name.to_string(),
            props: IndexMap::new(),
            docs: HashMap::new(),
        }
    }

    pub fn with_prop(mut self, name: &str, ty: Type) -> Self {
        self.props.insert(name.to_string(), ty);
        self
    }
}

#[derive(Debug, Clone)]
pub struct EnumType {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ImportedType {
    pub name: String,
    /// Module specifier the generated code imports `name` from.
    pub module: Option<String>,
    pub ty: Box<Type>,
}

#[derive(Debug, Clone)]
pub struct ComponentType {
    pub name: String,
    pub api: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RecursiveType {
    pub reference: String,
    /// Canonical path of the target object, set by [`TypeModel::new`].
    pub resolved: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Type {
    Atomic(AtomicType),
    Object(ObjectType),
    Array(Box<Type>),
    Enum(EnumType),
    Promise(Box<Type>),
    Imported(ImportedType),
    Component(ComponentType),
    Recursive(RecursiveType),
    Unknown,
}

static UNKNOWN: Type = Type::Unknown;

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Atomic(a), Type::Atomic(b)) => a == b,
            // IndexMap equality ignores insertion order.
            (Type::Object(a), Type::Object(b)) => a.props == b.props,
            (Type::Array(a), Type::Array(b)) => a == b,
            (Type::Enum(a), Type::Enum(b)) => a.values == b.values,
            (Type::Promise(a), Type::Promise(b)) => a == b,
            (Type::Imported(a), Type::Imported(b)) => a.ty == b.ty,
            (Type::Component(a), Type::Component(b)) => a.name == b.name && a.api == b.api,
            (Type::Recursive(a), Type::Recursive(b)) => {
                a.resolved.is_some() && a.resolved == b.resolved
            }
            (Type::Unknown, Type::Unknown) => true,
            _ => false,
        }
    }
}

impl Type {
    pub fn string() -> Type {
        Type::Atomic(AtomicType::String)
    }

    pub fn number() -> Type {
        Type::Atomic(AtomicType::Number)
    }

    pub fn boolean() -> Type {
        Type::Atomic(AtomicType::Boolean)
    }

    pub fn array(item: Type) -> Type {
        Type::Array(Box::new(item))
    }

    pub fn promise(inner: Type) -> Type {
        Type::Promise(Box::new(inner))
    }

    pub fn recursive(reference: &str) -> Type {
        Type::Recursive(RecursiveType {
            reference: reference.to_string(),
            resolved: None,
        })
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    pub fn as_object(&self) -> Option<&ObjectType> {
        match self {
            Type::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut ObjectType> {
        match self {
            Type::Object(o) => Some(o),
            _ => None,
        }
    }
}

/// The fixed type a `when-rejected` branch narrows its scope to.
pub fn error_type() -> Type {
    Type::Object(
        ObjectType::new("Error")
            .with_prop("name", Type::string())
            .with_prop("message", Type::string()),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// TYPE MODEL (resolved root + object arena)
// ═══════════════════════════════════════════════════════════════════════════════

/// A root type whose recursive placeholders are all resolved, plus an arena of
/// every object reachable from the root addressed by canonical path.
#[derive(Debug, Clone)]
pub struct TypeModel {
    root: Type,
    objects: HashMap<String, Type>,
}

impl TypeModel {
    pub fn new(mut root: Type, file: &str) -> Result<TypeModel, CompilerError> {
        let mut paths = HashSet::new();
        collect_object_paths(&root, ROOT_PATH, &mut paths);
        patch_recursive(&mut root, ROOT_PATH, ROOT_PATH, &paths, file)?;
        let mut objects = HashMap::new();
        index_objects(&root, ROOT_PATH, &mut objects);
        Ok(TypeModel { root, objects })
    }

    pub fn root(&self) -> &Type {
        &self.root
    }

    pub fn object_at(&self, path: &str) -> Option<&Type> {
        self.objects.get(path)
    }

    /// Follows recursive and imported indirections to the defining type.
    pub fn resolve<'a>(&'a self, ty: &'a Type) -> &'a Type {
        let mut current = ty;
        loop {
            match current {
                Type::Recursive(r) => {
                    current = match r.resolved.as_ref().and_then(|p| self.objects.get(p)) {
                        Some(target) => target,
                        None => return &UNKNOWN,
                    }
                }
                Type::Imported(imported) => current = &imported.ty,
                _ => return current,
            }
        }
    }

    /// TypeScript type expression for `ty`.
    pub fn ts_type(&self, ty: &Type) -> String {
        match ty {
            Type::Atomic(atomic) => atomic.ts_name().to_string(),
            Type::Object(object) => object.name.clone(),
            Type::Array(item) => format!("Array<{}>", self.ts_type(item)),
            Type::Enum(e) => e.name.clone(),
            Type::Promise(inner) => format!("Promise<{}>", self.ts_type(inner)),
            Type::Imported(imported) => imported.name.clone(),
            Type::Component(component) => component.name.clone(),
            Type::Recursive(_) => match self.resolve(ty) {
                Type::Object(object) => object.name.clone(),
                _ => "any".to_string(),
            },
            Type::Unknown => "any".to_string(),
        }
    }
}

fn child_path(path: &str, field: &str) -> String {
    format!("{}/{}", path, field)
}

fn collect_object_paths(ty: &Type, path: &str, paths: &mut HashSet<String>) {
    match ty {
        Type::Object(object) => {
            paths.insert(path.to_string());
            for (field, field_type) in &object.props {
                collect_object_paths(field_type, &child_path(path, field), paths);
            }
        }
        Type::Array(inner) | Type::Promise(inner) => collect_object_paths(inner, path, paths),
        Type::Imported(imported) => collect_object_paths(&imported.ty, path, paths),
        _ => {}
    }
}

/// Rewrites `$/data/...` relative to `base`, the path the enclosing root was
/// mounted at (differs from the root path inside imported types).
fn rebase_reference(reference: &str, base: &str) -> Option<String> {
    let rest = reference.strip_prefix(ROOT_PATH)?;
    if !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }
    Some(format!("{}{}", base, rest.trim_end_matches('/')))
}

fn is_ancestor_or_self(ancestor: &str, path: &str) -> bool {
    path == ancestor || path.starts_with(&format!("{}/", ancestor))
}

fn patch_recursive(
    ty: &mut Type,
    path: &str,
    base: &str,
    paths: &HashSet<String>,
    file: &str,
) -> Result<(), CompilerError> {
    match ty {
        Type::Object(object) => {
            for (field, field_type) in object.props.iter_mut() {
                patch_recursive(field_type, &child_path(path, field), base, paths, file)?;
            }
            Ok(())
        }
        Type::Array(inner) | Type::Promise(inner) => {
            patch_recursive(inner, path, base, paths, file)
        }
        Type::Imported(imported) => patch_recursive(&mut imported.ty, path, path, paths, file),
        Type::Recursive(recursive) => {
            let target = rebase_reference(&recursive.reference, base).ok_or_else(|| {
                CompilerError::with_details(
                    INV_MALFORMED_RECURSIVE_PATH,
                    &format!(
                        "Recursive reference [{}] at [{}] must start with {}",
                        recursive.reference, path, ROOT_PATH
                    ),
                    file,
                    None,
                    vec![format!("Use {} or {}/<field>", ROOT_PATH, ROOT_PATH)],
                )
            })?;
            if !paths.contains(&target) || !is_ancestor_or_self(&target, path) {
                return Err(CompilerError::new(
                    INV_UNRESOLVED_RECURSION,
                    &format!(
                        "Recursive reference [{}] at [{}] does not point at an enclosing object",
                        recursive.reference, path
                    ),
                    file,
                ));
            }
            recursive.resolved = Some(target);
            Ok(())
        }
        Type::Atomic(_) | Type::Enum(_) | Type::Component(_) | Type::Unknown => Ok(()),
    }
}

fn index_objects(ty: &Type, path: &str, objects: &mut HashMap<String, Type>) {
    match ty {
        Type::Object(object) => {
            objects.insert(path.to_string(), ty.clone());
            for (field, field_type) in &object.props {
                index_objects(field_type, &child_path(path, field), objects);
            }
        }
        Type::Array(inner) | Type::Promise(inner) => index_objects(inner, path, objects),
        Type::Imported(imported) => index_objects(&imported.ty, path, objects),
        _ => {}
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAMING
// ═══════════════════════════════════════════════════════════════════════════════

fn words(name: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in name.chars() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && prev_lower && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// `todo-item` / `todo item` / `todoItem` → `TodoItem`
pub fn pascal_case(name: &str) -> String {
    words(name).iter().map(|w| capitalize(w)).collect()
}

/// `todo-item` / `Todo Item` → `todoItem`
pub fn camel_case(name: &str) -> String {
    let pascal = pascal_case(name);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_type() -> Type {
        Type::Object(
            ObjectType::new("TreeViewState")
                .with_prop("name", Type::string())
                .with_prop("children", Type::array(Type::recursive("$/data"))),
        )
    }

    #[test]
    fn object_equality_ignores_field_order_and_name() {
        let a = Type::Object(
            ObjectType::new("A")
                .with_prop("x", Type::string())
                .with_prop("y", Type::number()),
        );
        let b = Type::Object(
            ObjectType::new("B")
                .with_prop("y", Type::number())
                .with_prop("x", Type::string()),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn recursive_type_resolves_to_root() {
        let model = TypeModel::new(tree_type(), "tree.view.html").unwrap();
        let root = model.root().as_object().unwrap();
        let children = root.props.get("children").unwrap();
        let Type::Array(item) = children else {
            panic!("expected array")
        };
        let resolved = model.resolve(item);
        assert_eq!(resolved.as_object().unwrap().name, "TreeViewState");
        assert_eq!(model.ts_type(children), "Array<TreeViewState>");
    }

    #[test]
    fn recursive_reference_must_start_with_marker() {
        let ty = Type::Object(ObjectType::new("X").with_prop("self", Type::recursive("data")));
        let err = TypeModel::new(ty, "x").unwrap_err();
        assert_eq!(err.code, INV_MALFORMED_RECURSIVE_PATH);
    }

    #[test]
    fn recursive_reference_must_target_an_ancestor() {
        let ty = Type::Object(
            ObjectType::new("X")
                .with_prop(
                    "a",
                    Type::Object(ObjectType::new("A").with_prop("v", Type::string())),
                )
                .with_prop("b", Type::recursive("$/data/a")),
        );
        let err = TypeModel::new(ty, "x").unwrap_err();
        assert_eq!(err.code, INV_UNRESOLVED_RECURSION);
    }

    #[test]
    fn recursion_inside_imported_type_is_rebased() {
        let imported = Type::Imported(ImportedType {
            name: "TreeViewState".to_string(),
            module: Some("./tree.contract".to_string()),
            ty: Box::new(tree_type()),
        });
        let root = Type::Object(ObjectType::new("PageViewState").with_prop("tree", imported));
        let model = TypeModel::new(root, "page").unwrap();
        assert!(model.object_at("$/data/tree").is_some());
    }

    #[test]
    fn case_conversions() {
        assert_eq!(pascal_case("todo-item"), "TodoItem");
        assert_eq!(pascal_case("counter"), "Counter");
        assert_eq!(camel_case("Add Button"), "addButton");
        assert_eq!(camel_case("todoItem"), "todoItem");
        assert_eq!(pascal_case("fast+interactive"), "FastInteractive");
    }
}
