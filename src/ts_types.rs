//! Exported types of TypeScript modules
//!
//! Templates import view-state types and components from ordinary TypeScript
//! modules. Only the exported surface is read: interfaces, type aliases,
//! enums and `makeComponent(...)` components.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::contract::nested_type_name;
use crate::types::{AtomicType, ComponentType, EnumType, ObjectType, Type};

lazy_static! {
    static ref ENUM_BODY: Regex = Regex::new(r"\{([^}]*)\}").unwrap();
}

/// A TypeScript type as written, before names are looked up.
#[derive(Debug, Clone, PartialEq)]
enum Shape {
    Atomic(AtomicType),
    Object(Vec<(String, Shape)>),
    Array(Box<Shape>),
    Promise(Box<Shape>),
    Enum(Vec<String>),
    Named(String),
    Unknown,
}

fn span_text(source: &str, span: Span) -> &str {
    source
        .get(span.start as usize..span.end as usize)
        .unwrap_or_default()
}

fn shape_of(ty: &TSType, source: &str) -> Shape {
    match ty {
        TSType::TSStringKeyword(_) => Shape::Atomic(AtomicType::String),
        TSType::TSNumberKeyword(_) => Shape::Atomic(AtomicType::Number),
        TSType::TSBooleanKeyword(_) => Shape::Atomic(AtomicType::Boolean),
        TSType::TSArrayType(array) => Shape::Array(Box::new(shape_of(&array.element_type, source))),
        TSType::TSTypeLiteral(literal) => Shape::Object(members(&literal.members, source)),
        TSType::TSTypeReference(reference) => text_shape(span_text(source, reference.span)),
        _ => Shape::Unknown,
    }
}

/// Shapes of type references, read from their text: `Date`, `Item`,
/// `Array<Item>`, `Promise<User>`, `Item[]`.
fn text_shape(text: &str) -> Shape {
    let text = text.trim();
    if let Some(atomic) = AtomicType::parse(text) {
        return Shape::Atomic(atomic);
    }
    if let Some(item) = text.strip_suffix("[]") {
        return Shape::Array(Box::new(text_shape(item)));
    }
    match text.split_once('<') {
        Some((name, rest)) => {
            let inner = rest.strip_suffix('>').unwrap_or(rest);
            match name.trim() {
                "Array" => Shape::Array(Box::new(text_shape(inner))),
                "Promise" => Shape::Promise(Box::new(text_shape(inner))),
                _ => Shape::Unknown,
            }
        }
        None => Shape::Named(text.to_string()),
    }
}

fn members(signatures: &[TSSignature], source: &str) -> Vec<(String, Shape)> {
    signatures
        .iter()
        .filter_map(|signature| match signature {
            TSSignature::TSPropertySignature(property) => {
                let name = span_text(source, property.key.span())
                    .trim_matches(|c| c == '\'' || c == '"')
                    .to_string();
                let shape = property
                    .type_annotation
                    .as_ref()
                    .map(|annotation| shape_of(&annotation.type_annotation, source))
                    .unwrap_or(Shape::Unknown);
                Some((name, shape))
            }
            _ => None,
        })
        .collect()
}

/// Member names of `enum X { A, B = 2, 'C' }`.
fn enum_members(declaration: &str) -> Vec<String> {
    let Some(body) = ENUM_BODY.captures(declaration).and_then(|c| c.get(1)) else {
        return vec![];
    };
    body.as_str()
        .split(',')
        .filter_map(|member| {
            let name = member.split('=').next()?.trim().trim_matches(|c| c == '\'' || c == '"');
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

struct Declarations {
    shapes: HashMap<String, Shape>,
    exported: Vec<String>,
    components: Vec<String>,
}

fn collect_declaration(declaration: &Declaration, source: &str, exported: bool, out: &mut Declarations) {
    let (name, shape) = match declaration {
        Declaration::TSInterfaceDeclaration(interface) => (
            interface.id.name.to_string(),
            Shape::Object(members(&interface.body.body, source)),
        ),
        Declaration::TSTypeAliasDeclaration(alias) => {
            (alias.id.name.to_string(), shape_of(&alias.type_annotation, source))
        }
        Declaration::TSEnumDeclaration(declaration) => (
            declaration.id.name.to_string(),
            Shape::Enum(enum_members(span_text(source, declaration.span))),
        ),
        Declaration::VariableDeclaration(variables) => {
            for variable in &variables.declarations {
                let BindingPattern::BindingIdentifier(id) = &variable.id else {
                    continue;
                };
                let is_component = matches!(
                    &variable.init,
                    Some(Expression::CallExpression(call))
                        if matches!(&call.callee, Expression::Identifier(callee) if callee.name.as_str() == "makeComponent")
                );
                if exported && is_component {
                    out.components.push(id.name.to_string());
                }
            }
            return;
        }
        _ => return,
    };
    if exported {
        out.exported.push(name.clone());
    }
    out.shapes.insert(name, shape);
}

fn resolve(shape: &Shape, name: &str, table: &HashMap<String, Shape>, visiting: &mut HashSet<String>) -> Type {
    match shape {
        Shape::Atomic(atomic) => Type::Atomic(*atomic),
        Shape::Object(fields) => {
            let mut object = ObjectType::new(name);
            for (field, field_shape) in fields {
                let ty = resolve(field_shape, &nested_type_name(field, name), table, visiting);
                object.props.insert(field.clone(), ty);
            }
            Type::Object(object)
        }
        Shape::Array(item) => Type::array(resolve(item, name, table, visiting)),
        Shape::Promise(inner) => Type::promise(resolve(inner, name, table, visiting)),
        Shape::Enum(values) => Type::Enum(EnumType {
            name: name.to_string(),
            values: values.clone(),
        }),
        Shape::Named(target) => match table.get(target) {
            Some(target_shape) if visiting.insert(target.clone()) => {
                let ty = resolve(target_shape, target, table, visiting);
                visiting.remove(target);
                ty
            }
            _ => Type::Unknown,
        },
        Shape::Unknown => Type::Unknown,
    }
}

/// Exported types and components of a TypeScript module, in declaration order.
pub fn exported_types(source: &str, path: &str) -> Result<Vec<(String, Type)>, String> {
    let allocator = Allocator::default();
    let source_type = SourceType::default()
        .with_module(true)
        .with_typescript(true);
    let ret = Parser::new(&allocator, source, source_type).parse();
    if !ret.errors.is_empty() {
        return Err(format!("{} syntax error(s) in {}", ret.errors.len(), path));
    }

    let mut declarations = Declarations {
        shapes: HashMap::new(),
        exported: vec![],
        components: vec![],
    };
    for statement in &ret.program.body {
        match statement {
            Statement::ExportNamedDeclaration(export) => {
                if let Some(declaration) = &export.declaration {
                    collect_declaration(declaration, source, true, &mut declarations);
                }
            }
            Statement::TSInterfaceDeclaration(_)
            | Statement::TSTypeAliasDeclaration(_)
            | Statement::TSEnumDeclaration(_) => {
                if let Some(declaration) = statement.as_declaration() {
                    collect_declaration(declaration, source, false, &mut declarations);
                }
            }
            _ => {}
        }
    }

    let mut types = Vec::new();
    for name in &declarations.exported {
        let mut visiting = HashSet::from([name.clone()]);
        let ty = resolve(&declarations.shapes[name], name, &declarations.shapes, &mut visiting);
        types.push((name.clone(), ty));
    }
    for name in declarations.components {
        types.push((
            name.clone(),
            Type::Component(ComponentType { name, api: vec![] }),
        ));
    }
    debug!(target: "view_compiler::ts_types", path = %path, exported = types.len(), "module analyzed");
    Ok(types)
}
