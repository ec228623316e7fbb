//! Binding scopes.
//!
//! A scope is the view-state type bindings are resolved against. The root
//! scope holds the template's view state; loops and async branches enter child
//! scopes, memoized per (enclosing scope, accessor path, kind) so every visit
//! of the same loop shares one child scope.

use std::collections::HashMap;

use crate::types::{error_type, Type, TypeModel};
use crate::validate::WithValidations;

pub type ScopeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    ForEachItem,
    AsyncResolved,
    AsyncRejected,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub ty: Type,
    pub in_loop: bool,
}

/// A resolved, typed dotted path into a scope. Empty `terms` is the scope itself (`.`).
#[derive(Debug, Clone, PartialEq)]
pub struct Accessor {
    pub terms: Vec<String>,
    pub ty: Type,
}

impl Accessor {
    pub fn path(&self) -> String {
        if self.terms.is_empty() {
            ".".to_string()
        } else {
            self.terms.join(".")
        }
    }

    /// Renders the accessor against the view-state parameter `vs`.
    pub fn render(&self) -> String {
        if self.terms.is_empty() {
            "vs".to_string()
        } else {
            format!("vs.{}", self.terms.join("."))
        }
    }

    pub fn is_self(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Walks `terms` through nested object, imported and recursive types.
///
/// A missing field yields exactly one validation naming the full dotted path
/// and an `Unknown` type; resolving through `Unknown` is silent so one mistake
/// is reported once.
pub fn resolve_accessor(model: &TypeModel, ty: &Type, terms: &[String]) -> WithValidations<Accessor> {
    let mut current = ty.clone();
    for (index, term) in terms.iter().enumerate() {
        let next = match model.resolve(&current) {
            Type::Unknown => return WithValidations::ok(unknown_accessor(terms)),
            Type::Object(object) => object.props.get(term).cloned(),
            _ => None,
        };
        match next {
            Some(field_type) => current = field_type,
            None => {
                let owner = match model.resolve(&current) {
                    Type::Object(object) => object.name.clone(),
                    other => model.ts_type(other),
                };
                let missing = if index + 1 == terms.len() {
                    terms.join(".")
                } else {
                    terms[..=index].join(".")
                };
                return WithValidations::with_validation(
                    unknown_accessor(terms),
                    format!(
                        "the data field [{}] not found in {} (while resolving [{}])",
                        missing,
                        owner,
                        terms.join(".")
                    ),
                );
            }
        }
    }
    WithValidations::ok(Accessor {
        terms: terms.to_vec(),
        ty: current,
    })
}

fn unknown_accessor(terms: &[String]) -> Accessor {
    Accessor {
        terms: terms.to_vec(),
        ty: Type::Unknown,
    }
}

/// Splits `a.b.c` into terms; `.` (or empty) is the scope itself.
pub fn accessor_terms(path: &str) -> Vec<String> {
    let trimmed = path.trim();
    if trimmed == "." || trimmed.is_empty() {
        return vec![];
    }
    trimmed
        .split('.')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Per-compilation arena of scopes.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    memo: HashMap<(ScopeId, ScopeKind, String), ScopeId>,
}

impl ScopeTree {
    pub fn new(root: Type) -> Self {
        ScopeTree {
            scopes: vec![Scope {
                ty: root,
                in_loop: false,
            }],
            memo: HashMap::new(),
        }
    }

    pub fn root(&self) -> ScopeId {
        0
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn resolve_accessor(
        &self,
        model: &TypeModel,
        scope: ScopeId,
        terms: &[String],
    ) -> WithValidations<Accessor> {
        resolve_accessor(model, &self.scopes[scope].ty, terms)
    }

    /// Scope entered by a loop body or an async branch over `accessor`.
    pub fn child_scope_for(
        &mut self,
        model: &TypeModel,
        scope: ScopeId,
        accessor: &Accessor,
        kind: ScopeKind,
    ) -> WithValidations<ScopeId> {
        let key = (scope, kind, accessor.path());
        if let Some(existing) = self.memo.get(&key) {
            return WithValidations::ok(*existing);
        }

        let parent_in_loop = self.scopes[scope].in_loop;
        let (ty, validations) = match (kind, model.resolve(&accessor.ty)) {
            (_, Type::Unknown) => (Type::Unknown, vec![]),
            (ScopeKind::ForEachItem, Type::Array(item)) => ((**item).clone(), vec![]),
            (ScopeKind::ForEachItem, other) => (
                Type::Unknown,
                vec![format!(
                    "forEach accessor [{}] is not an array, found {}",
                    accessor.path(),
                    model.ts_type(other)
                )],
            ),
            (ScopeKind::AsyncResolved, Type::Promise(inner)) => ((**inner).clone(), vec![]),
            (ScopeKind::AsyncRejected, Type::Promise(_)) => (error_type(), vec![]),
            (_, other) => (
                Type::Unknown,
                vec![format!(
                    "async accessor [{}] is not a promise, found {}",
                    accessor.path(),
                    model.ts_type(other)
                )],
            ),
        };

        let id = self.scopes.len();
        self.scopes.push(Scope {
            ty,
            in_loop: parent_in_loop || kind == ScopeKind::ForEachItem,
        });
        self.memo.insert(key, id);
        WithValidations::new(id, validations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectType;

    fn model() -> TypeModel {
        let a = Type::Object(ObjectType::new("AOfRoot").with_prop("b", Type::string()));
        let item = Type::Object(ObjectType::new("ItemsOfRoot").with_prop("id", Type::string()));
        let root = Type::Object(
            ObjectType::new("RootViewState")
                .with_prop("a", a)
                .with_prop("items", Type::array(item))
                .with_prop("user", Type::promise(Type::string())),
        );
        TypeModel::new(root, "root").unwrap()
    }

    #[test]
    fn resolves_nested_path() {
        let model = model();
        let result = resolve_accessor(&model, model.root(), &accessor_terms("a.b"));
        assert!(result.validations.is_empty());
        assert_eq!(result.val.ty, Type::string());
        assert_eq!(result.val.render(), "vs.a.b");
    }

    #[test]
    fn missing_path_reports_once_with_full_path() {
        let model = model();
        let result = resolve_accessor(&model, model.root(), &accessor_terms("a.x"));
        assert_eq!(result.validations.len(), 1);
        assert!(result.validations[0].contains("a.x"));
        assert!(result.val.ty.is_unknown());
    }

    #[test]
    fn resolution_is_idempotent() {
        let model = model();
        let first = resolve_accessor(&model, model.root(), &accessor_terms("a.b"));
        let second = resolve_accessor(&model, model.root(), &accessor_terms("a.b"));
        assert_eq!(first, second);
    }

    #[test]
    fn self_accessor() {
        let model = model();
        let result = resolve_accessor(&model, model.root(), &accessor_terms("."));
        assert!(result.val.is_self());
        assert_eq!(result.val.render(), "vs");
    }

    #[test]
    fn child_scopes_are_memoized() {
        let model = model();
        let mut scopes = ScopeTree::new(model.root().clone());
        let items = scopes
            .resolve_accessor(&model, scopes.root(), &accessor_terms("items"))
            .val;
        let first = scopes.child_scope_for(&model, 0, &items, ScopeKind::ForEachItem);
        let second = scopes.child_scope_for(&model, 0, &items, ScopeKind::ForEachItem);
        assert_eq!(first.val, second.val);
        assert_eq!(scopes.len(), 2);
        assert!(scopes.get(first.val).in_loop);
        assert_eq!(
            scopes.get(first.val).ty.as_object().unwrap().name,
            "ItemsOfRoot"
        );
    }

    #[test]
    fn async_scopes_narrow_types() {
        let model = model();
        let mut scopes = ScopeTree::new(model.root().clone());
        let user = scopes.resolve_accessor(&model, 0, &accessor_terms("user")).val;
        let resolved = scopes.child_scope_for(&model, 0, &user, ScopeKind::AsyncResolved);
        assert_eq!(scopes.get(resolved.val).ty, Type::string());
        let rejected = scopes.child_scope_for(&model, 0, &user, ScopeKind::AsyncRejected);
        assert_eq!(scopes.get(rejected.val).ty, error_type());
    }

    #[test]
    fn loop_over_non_array_is_reported() {
        let model = model();
        let mut scopes = ScopeTree::new(model.root().clone());
        let a = scopes.resolve_accessor(&model, 0, &accessor_terms("a")).val;
        let child = scopes.child_scope_for(&model, 0, &a, ScopeKind::ForEachItem);
        assert_eq!(child.validations.len(), 1);
        assert!(scopes.get(child.val).ty.is_unknown());
    }
}
