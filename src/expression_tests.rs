#[cfg(test)]
mod tests {
    use crate::expression::{escape_braces, is_enum_literal, parse_condition, parse_enum_literal, parse_import_names, BinaryOp, Expr};
    use crate::expression_compiler::*;
    use crate::scope::ScopeTree;
    use crate::types::{EnumType, ObjectType, Type, TypeModel};
    use crate::validate::INV_EXPRESSION_SYNTAX;

    fn todo_model() -> TypeModel {
        let status = Type::Enum(EnumType {
            name: "StatusOfTodoViewState".to_string(),
            values: vec!["active".to_string(), "done".to_string()],
        });
        let user = ObjectType::new("UserOfTodoViewState").with_prop("name", Type::string());
        let item = ObjectType::new("ItemsOfTodoViewState").with_prop("id", Type::string());
        let root = ObjectType::new("TodoViewState")
            .with_prop("title", Type::string())
            .with_prop("count", Type::number())
            .with_prop("done", Type::boolean())
            .with_prop("status", status)
            .with_prop("user", Type::Object(user))
            .with_prop("items", Type::array(Type::Object(item)));
        TypeModel::new(Type::Object(root), "todo.view.html").unwrap()
    }

    fn with_context<R>(f: impl FnOnce(&ExprContext) -> R) -> R {
        let model = todo_model();
        let scopes = ScopeTree::new(model.root().clone());
        let cx = ExprContext {
            model: &model,
            scopes: &scopes,
            scope: scopes.root(),
            file: "todo.view.html",
        };
        f(&cx)
    }

    fn condition(source: &str) -> (String, Vec<String>) {
        with_context(|cx| compile_condition(cx, source).unwrap().into_parts())
    }

    fn text(source: &str) -> CompiledValue {
        with_context(|cx| {
            let compiled = compile_text(cx, source).unwrap();
            assert!(compiled.validations.is_empty(), "{:?}", compiled.validations);
            compiled.val
        })
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse_condition("a || b && c").unwrap();
        let Expr::Binary { op, rhs, .. } = expr else {
            panic!("expected a binary expression");
        };
        assert_eq!(op, BinaryOp::Or);
        assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn test_condition_compiles_against_view_state() {
        let (code, validations) = condition("count > 0 && !done");
        assert_eq!(code, "vs.count > 0 && !vs.done");
        assert!(validations.is_empty());

        let (code, _) = condition("done || count >= 2.5 && title == 'x'");
        assert_eq!(code, "vs.done || vs.count >= 2.5 && vs.title === 'x'");
    }

    #[test]
    fn test_parentheses_are_kept_where_needed() {
        let (code, _) = condition("(done || count > 1) && title");
        assert_eq!(code, "(vs.done || vs.count > 1) && vs.title");
    }

    #[test]
    fn test_enum_comparison_is_qualified() {
        let (code, validations) = condition("status == active");
        assert_eq!(code, "vs.status === StatusOfTodoViewState.active");
        assert!(validations.is_empty());

        let (code, validations) = condition("'done' != status");
        assert_eq!(code, "StatusOfTodoViewState.done !== vs.status");
        assert!(validations.is_empty());
    }

    #[test]
    fn test_unknown_enum_value_is_a_validation() {
        let (code, validations) = condition("status == archived");
        assert_eq!(code, "vs.status === StatusOfTodoViewState.archived");
        assert_eq!(validations.len(), 1);
        assert!(validations[0].contains("archived"));
    }

    #[test]
    fn test_unresolved_field_reports_full_path_once() {
        let (code, validations) = condition("user.email && missing.deep");
        assert_eq!(code, "vs.user.email && vs.missing.deep");
        assert_eq!(validations.len(), 2);
        assert!(validations[0].contains("user.email"));
        assert!(validations[1].contains("missing.deep"));
    }

    #[test]
    fn test_text_interpolation() {
        assert_eq!(
            text("Hello {user.name}!"),
            CompiledValue::Dynamic("`Hello ${vs.user.name}!`".to_string())
        );
        assert_eq!(text("{count}"), CompiledValue::Dynamic("vs.count".to_string()));
        assert_eq!(text("{user}"), CompiledValue::Dynamic("`${vs.user}`".to_string()));
    }

    #[test]
    fn test_static_text_collapses_whitespace() {
        assert_eq!(text("  two\n   words "), CompiledValue::Static(" two words ".to_string()));
    }

    #[test]
    fn test_escaped_braces_are_literal() {
        assert_eq!(text(r"\{count\}"), CompiledValue::Static("{count}".to_string()));
        assert_eq!(
            text(r"a \} b {count}"),
            CompiledValue::Dynamic("`a } b ${vs.count}`".to_string())
        );
        assert_eq!(text(r"C:\\ and C:\dir"), CompiledValue::Static(r"C:\ and C:\dir".to_string()));
        assert_eq!(escape_braces(r"{x} \ }"), r"\{x\} \\ \}");
    }

    #[test]
    fn test_ternary_value() {
        assert_eq!(
            text("{done ? 'yes' : 'no'}"),
            CompiledValue::Dynamic("vs.done ? 'yes' : 'no'".to_string())
        );
    }

    #[test]
    fn test_class_expression() {
        let compiled = with_context(|cx| compile_class(cx, "item {done ? completed : open}").unwrap().val);
        assert_eq!(
            compiled,
            CompiledValue::Dynamic("`item ${vs.done ? 'completed' : 'open'}`".to_string())
        );
        let fixed = with_context(|cx| compile_class(cx, "a  b").unwrap().val);
        assert_eq!(fixed, CompiledValue::Static("a b".to_string()));
    }

    #[test]
    fn test_accessor_types() {
        with_context(|cx| {
            let this = compile_accessor(cx, ".").unwrap().val;
            assert!(this.is_self());
            assert_eq!(this.render(), "vs");

            let items = compile_accessor(cx, "items").unwrap().val;
            assert!(matches!(items.ty, Type::Array(_)));
        });
    }

    #[test]
    fn test_malformed_expression_is_fatal() {
        let err = with_context(|cx| compile_condition(cx, "count >").unwrap_err());
        assert_eq!(err.code, INV_EXPRESSION_SYNTAX);
        assert!(err.message.contains("count >"));
    }

    #[test]
    fn test_hyphen_is_not_part_of_a_name() {
        let err = with_context(|cx| compile_text(cx, "{my-field}").unwrap_err());
        assert_eq!(err.code, INV_EXPRESSION_SYNTAX);
        assert!(err.message.contains("camel-cased"), "{}", err.message);
        let err = with_context(|cx| compile_condition(cx, "my-flag").unwrap_err());
        assert_eq!(err.code, INV_EXPRESSION_SYNTAX);
    }

    #[test]
    fn test_import_names_and_enum_literals() {
        let names = parse_import_names("Counter, Item as TodoItem").unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].local_name(), "Counter");
        assert_eq!(names[1].local_name(), "TodoItem");

        assert!(is_enum_literal("enum (small | large)"));
        assert!(!is_enum_literal("string"));
        assert_eq!(parse_enum_literal("enum (small | large)").unwrap(), vec!["small", "large"]);
    }
}
