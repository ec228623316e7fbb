//! Inline view-data blocks
//!
//! ```json
//! { "title": "string",
//!   "status": "enum (active | done)",
//!   "items": [{ "id": "string", "children": ["$/data/items"] }],
//!   "async user": { "name": "string" },
//!   "product": "ProductViewState" }
//! ```

use serde_json::Value;
use std::collections::HashMap;

use crate::contract::nested_type_name;
use crate::expression::{is_enum_literal, parse_enum_literal};
use crate::types::{camel_case, AtomicType, EnumType, ObjectType, Type, ROOT_PATH};
use crate::validate::{
    CompilerError, Validations, WithValidations, INV_MALFORMED_RECURSIVE_PATH,
};

const ASYNC_PREFIX: &str = "async ";

/// Builds the root view-state type of a template from its data block.
/// `known` maps imported type names to their types.
pub fn data_block_type(
    data: &Value,
    root_name: &str,
    known: &HashMap<String, Type>,
    file: &str,
) -> Result<WithValidations<Type>, CompilerError> {
    let mut validations = Vec::new();
    let ty = match data {
        Value::Object(_) => value_type(data, root_name, "", known, file, &mut validations)?,
        _ => {
            validations.push("view-data block must be an object".to_string());
            Type::Object(ObjectType::new(root_name))
        }
    };
    Ok(WithValidations::new(ty, validations))
}

fn value_type(
    value: &Value,
    name: &str,
    field: &str,
    known: &HashMap<String, Type>,
    file: &str,
    validations: &mut Validations,
) -> Result<Type, CompilerError> {
    match value {
        Value::String(s) => string_type(s, name, field, known, file, validations),
        Value::Object(map) => {
            let mut object = ObjectType::new(name);
            for (key, field_value) in map {
                let (is_async, key) = match key.strip_prefix(ASYNC_PREFIX) {
                    Some(rest) => (true, rest.trim()),
                    None => (false, key.trim()),
                };
                let key = field_name(key);
                let nested = nested_type_name(&key, name);
                let ty = value_type(field_value, &nested, &key, known, file, validations)?;
                object
                    .props
                    .insert(key, if is_async { Type::promise(ty) } else { ty });
            }
            Ok(Type::Object(object))
        }
        Value::Array(items) => match items.as_slice() {
            [item] => Ok(Type::array(value_type(item, name, field, known, file, validations)?)),
            _ => {
                validations.push(format!(
                    "the data field [{}] must be an array with exactly one item type",
                    field
                ));
                Ok(Type::Unknown)
            }
        },
        other => {
            validations.push(format!(
                "the data field [{}] has unsupported declaration [{}]",
                field, other
            ));
            Ok(Type::Unknown)
        }
    }
}

/// Keys that are not plain identifiers (`my-field`) are camel-cased the way
/// contract tags are, so bindings always read `{myField}`.
fn field_name(key: &str) -> String {
    if key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        key.to_string()
    } else {
        camel_case(key)
    }
}

fn string_type(
    s: &str,
    name: &str,
    field: &str,
    known: &HashMap<String, Type>,
    file: &str,
    validations: &mut Validations,
) -> Result<Type, CompilerError> {
    let s = s.trim();
    if let Some(atomic) = AtomicType::parse(s) {
        return Ok(Type::Atomic(atomic));
    }
    if is_enum_literal(s) {
        return Ok(match parse_enum_literal(s) {
            Ok(values) => Type::Enum(EnumType {
                name: name.to_string(),
                values,
            }),
            Err(e) => {
                validations.push(format!("the data field [{}] has an invalid enum: {}", field, e));
                Type::Unknown
            }
        });
    }
    if s.starts_with('$') {
        if s.starts_with(ROOT_PATH) {
            return Ok(Type::recursive(s));
        }
        return Err(CompilerError::with_details(
            INV_MALFORMED_RECURSIVE_PATH,
            &format!("Recursive reference [{}] of field [{}] must start with {}", s, field, ROOT_PATH),
            file,
            None,
            vec![format!("Use {} or {}/<field>", ROOT_PATH, ROOT_PATH)],
        ));
    }
    if let Some(imported) = known.get(s) {
        return Ok(imported.clone());
    }
    validations.push(format!("the data field [{}] has unknown type [{}]", field, s));
    Ok(Type::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeModel;
    use serde_json::json;

    #[test]
    fn builds_nested_types() {
        let data = json!({
            "title": "string",
            "count": "number",
            "status": "enum (active | done)",
            "items": [{"id": "string", "done": "boolean"}],
            "async user": {"name": "string"}
        });
        let result = data_block_type(&data, "TodoViewState", &HashMap::new(), "todo").unwrap();
        assert!(result.validations.is_empty());
        let root = result.val.as_object().unwrap();
        assert_eq!(root.props["count"], Type::number());
        let Type::Enum(status) = &root.props["status"] else {
            panic!("expected enum")
        };
        assert_eq!(status.name, "StatusOfTodoViewState");
        let Type::Array(item) = &root.props["items"] else {
            panic!("expected array")
        };
        assert_eq!(item.as_object().unwrap().name, "ItemsOfTodoViewState");
        assert!(matches!(root.props["user"], Type::Promise(_)));
    }

    #[test]
    fn recursive_reference_resolves() {
        let data = json!({"name": "string", "children": ["$/data"]});
        let ty = data_block_type(&data, "TreeViewState", &HashMap::new(), "tree")
            .unwrap()
            .val;
        assert!(TypeModel::new(ty, "tree").is_ok());
    }

    #[test]
    fn malformed_recursive_reference_is_fatal() {
        let data = json!({"children": ["$/nodes"]});
        let err = data_block_type(&data, "TreeViewState", &HashMap::new(), "tree").unwrap_err();
        assert_eq!(err.code, INV_MALFORMED_RECURSIVE_PATH);
    }

    #[test]
    fn hyphenated_keys_are_camel_cased() {
        let data = json!({"my-field": "string", "async user-info": {"first-name": "string"}, "_id": "string"});
        let result = data_block_type(&data, "VS", &HashMap::new(), "x").unwrap();
        assert!(result.validations.is_empty());
        let root = result.val.as_object().unwrap();
        assert_eq!(root.props["myField"], Type::string());
        assert!(root.props.contains_key("_id"));
        assert!(!root.props.contains_key("my-field"));
        let Type::Promise(info) = &root.props["userInfo"] else {
            panic!("expected promise")
        };
        assert!(info.as_object().unwrap().props.contains_key("firstName"));
    }

    #[test]
    fn unknown_type_is_a_validation() {
        let data = json!({"x": "Widget"});
        let result = data_block_type(&data, "VS", &HashMap::new(), "x").unwrap();
        assert_eq!(result.validations.len(), 1);
        assert!(result.val.as_object().unwrap().props["x"].is_unknown());
    }
}
