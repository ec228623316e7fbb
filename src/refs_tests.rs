#[cfg(test)]
mod tests {
    use crate::codegen::Imports;
    use crate::refs::*;
    use std::collections::BTreeSet;

    fn button(name: &str, dynamic: bool) -> Ref {
        Ref::new(name, &[], dynamic, "TodoViewState", RefType::html("button"))
    }

    #[test]
    fn test_same_name_refs_union_their_element_types() {
        let mut tree = RefsTree::new(false);
        tree.add_ref(button("save", false), &[]);
        tree.add_ref(
            Ref::new("save", &[], false, "TodoViewState", RefType::html("a")),
            &[],
        );

        let (optimized, validations) = optimize_refs(tree).into_parts();
        assert!(validations.is_empty());
        assert_eq!(optimized.refs.len(), 1);
        assert_eq!(
            optimized.refs[0].ref_type,
            RefType::Html(BTreeSet::from([
                "HTMLAnchorElement".to_string(),
                "HTMLButtonElement".to_string()
            ]))
        );
    }

    #[test]
    fn test_colliding_constants_are_reported() {
        let mut tree = RefsTree::new(false);
        tree.add_ref(button("cartAdd", false), &[]);
        tree.add_ref(
            Ref::new("add", &["cart".to_string()], false, "CartViewState", RefType::html("button")),
            &["cart".to_string()],
        );
        tree.add_ref(
            Ref::new("add", &["wishlist".to_string()], false, "WishlistViewState", RefType::html("button")),
            &["wishlist".to_string()],
        );

        let validations = duplicate_const_names(&tree);
        assert_eq!(validations.len(), 1, "{:?}", validations);
        assert!(validations[0].contains("[refCartAdd]"));
    }

    #[test]
    fn test_dynamic_disagreement_is_one_validation() {
        let mut tree = RefsTree::new(false);
        tree.add_ref(button("remove", true), &[]);
        tree.add_ref(button("remove", false), &[]);

        let (optimized, validations) = optimize_refs(tree).into_parts();
        assert_eq!(optimized.refs.len(), 1);
        assert_eq!(validations.len(), 1);
        assert!(validations[0].contains("used once with forEach and once without"));
    }

    #[test]
    fn test_element_and_component_conflict() {
        let mut tree = RefsTree::new(false);
        tree.add_ref(button("card", false), &[]);
        tree.add_ref(
            Ref::new("card", &[], false, "TodoViewState", RefType::component("Card")),
            &[],
        );
        let validations = optimize_refs(tree).validations;
        assert_eq!(validations.len(), 1);
        assert!(validations[0].contains("both an element and a component"));
    }

    #[test]
    fn test_refs_interface() {
        let mut tree = RefsTree::new(false);
        tree.add_ref(
            Ref::new("add", &[], false, "CounterViewState", RefType::html("HTMLButtonElement")),
            &[],
        );
        let mut imports = Imports::empty();
        let rendered = render_refs_interface(&tree, "CounterRefs", false, &mut imports);
        assert_eq!(
            rendered,
            "export interface CounterRefs {\n    add: HTMLElementProxy<CounterViewState, HTMLButtonElement>;\n}\n"
        );
        assert_eq!(imports, Imports::HTML_ELEMENT_PROXY);
    }

    #[test]
    fn test_nested_and_auto_refs() {
        let items = vec!["items".to_string()];
        let mut tree = RefsTree::new(false);
        tree.add_ref(
            Ref::new("remove", &items, true, "ItemsOfTodoViewState", RefType::html("button")),
            &items,
        );
        tree.add_ref(Ref::auto(0, false, "TodoViewState", RefType::component("Footer")), &[]);

        let mut imports = Imports::empty();
        let rendered = render_refs_interface(&tree, "TodoRefs", false, &mut imports);
        assert_eq!(
            rendered,
            "export interface TodoRefs {\n    items: {\n        remove: HTMLElementCollectionProxy<ItemsOfTodoViewState, HTMLButtonElement>;\n    };\n}\n"
        );
    }

    #[test]
    fn test_empty_interface() {
        let mut imports = Imports::empty();
        let rendered = render_refs_interface(&RefsTree::new(false), "EmptyRefs", false, &mut imports);
        assert_eq!(rendered, "export interface EmptyRefs {}\n");
        assert!(imports.is_empty());
    }

    #[test]
    fn test_managers_are_declared_children_first() {
        let items = vec!["items".to_string()];
        let mut tree = RefsTree::new(false);
        tree.add_ref(
            Ref::new("add", &[], false, "TodoViewState", RefType::html("button")),
            &[],
        );
        tree.add_ref(
            Ref::new("remove", &items, true, "ItemsOfTodoViewState", RefType::html("button")),
            &items,
        );

        let mut imports = Imports::empty();
        let lines = render_refs_managers(&tree, ManagerKind::Element, &mut imports);
        assert_eq!(
            lines,
            vec![
                "const [itemsRefManager, [refItemsRemove]] = ReferencesManager.for(options, [], ['remove'], [], []);",
                "const [refManager, [refAdd]] = ReferencesManager.for(options, ['add'], [], [], [], {items: itemsRefManager});",
            ]
        );
        assert!(imports.contains(Imports::REFERENCES_MANAGER));
    }

    #[test]
    fn test_sandbox_root_manager() {
        let mut tree = RefsTree::new(false);
        tree.add_ref(button("add", false), &[]);
        let mut imports = Imports::empty();
        let lines = render_refs_managers(&tree, ManagerKind::SandboxRoot, &mut imports);
        assert_eq!(
            lines,
            vec!["const [refManager, [refAdd]] = SecureReferencesManager.forSandboxRoot(options, ['add'], [], [], []);"]
        );
    }
}
