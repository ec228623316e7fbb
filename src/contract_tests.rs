#[cfg(test)]
mod tests {
    use crate::codegen::Target;
    use crate::contract::*;
    use crate::contract_codegen::compile_contract;
    use crate::options::CompileOptions;
    use crate::resolver::MemoryResolver;
    use crate::types::{AtomicType, Type};
    use crate::validate::INV_CONTRACT_FORMAT;

    const COUNTER: &str = r#"{"name": "counter", "tags": [
        {"tag": "count", "type": "data", "dataType": "number"},
        {"tag": "add", "type": "interactive", "elementType": "HTMLButtonElement"}
    ]}"#;

    fn compile(text: &str, resolver: &MemoryResolver) -> (String, Vec<String>) {
        let options = CompileOptions::for_file("counter.contract.json", Target::Element);
        compile_contract(text, &options, resolver).unwrap().into_parts()
    }

    #[test]
    fn test_counter_contract_module() {
        let (code, validations) = compile(COUNTER, &MemoryResolver::new());
        assert!(validations.is_empty(), "{:?}", validations);
        assert!(code.contains("export interface CounterViewState {\n    count: number;\n}\n"));
        assert!(code.contains(
            "export interface CounterRefs {\n    add: HTMLElementProxy<CounterViewState, HTMLButtonElement>;\n}\n"
        ));
        assert!(code.contains(
            "export interface CounterRepeatedRefs {\n    add: HTMLElementCollectionProxy<CounterViewState, HTMLButtonElement>;\n}\n"
        ));
        assert!(code.contains("export type CounterSlowViewState = Pick<CounterViewState, 'count'>;"));
        assert!(code.contains("export type CounterFastViewState = {};"));
        assert!(code.contains("export type CounterContract = ViewContract<\n    CounterViewState,"));
        assert!(code.starts_with("import { HTMLElementProxy, HTMLElementCollectionProxy, ViewContract } from '@view/runtime';"));
    }

    #[test]
    fn test_field_names_are_camel_cased() {
        let text = r#"{"name": "order-summary", "tags": [
            {"tag": "total price", "dataType": "number"},
            {"tag": "is-paid", "dataType": "boolean"}
        ]}"#;
        let (code, validations) = compile(text, &MemoryResolver::new());
        assert!(validations.is_empty(), "{:?}", validations);
        assert!(code.contains("export interface OrderSummaryViewState {\n    totalPrice: number;\n    isPaid: boolean;\n}\n"));
        assert!(code.contains("export interface OrderSummaryRefs {}\n"));
        assert!(code.contains("    {},\n    {}\n>;"));
    }

    #[test]
    fn test_props_and_params() {
        let text = r#"{"name": "product", "tags": [{"tag": "name"}],
            "props": [{"name": "size", "type": "enum (small | large)", "required": true}, {"name": "label"}],
            "params": ["slug"]}"#;
        let (code, validations) = compile(text, &MemoryResolver::new());
        assert!(validations.is_empty(), "{:?}", validations);
        assert!(code.contains("export enum SizeOfProductProps {\n    small,\n    large,\n}\n"));
        assert!(code.contains("export interface ProductProps {\n    size: SizeOfProductProps;\n    label?: string;\n}\n"));
        assert!(code.contains("export interface ProductParams extends UrlParams {\n    slug: string;\n}\n"));
        assert!(code.contains("    ProductProps,\n    ProductParams\n>;"));
    }

    #[test]
    fn test_invalid_json_is_fatal() {
        let err = parse_contract("{\"name\": ", "bad.contract.json").unwrap_err();
        assert_eq!(err.code, INV_CONTRACT_FORMAT);

        let err = parse_contract("{\"tags\": []}", "bad.contract.json").unwrap_err();
        assert!(err.message.contains("no name"));
    }

    #[test]
    fn test_shape_errors_are_all_reported() {
        let text = r#"{"name": "broken", "tags": [
            {"tag": "items", "type": "sub-contract", "repeated": true, "tags": [{"tag": "title"}]},
            {"tag": "mode", "type": "variant"},
            {"tag": "go", "type": "interactive"},
            {"tag": "title", "phase": "later"}
        ]}"#;
        let (contract, validations) = parse_contract(text, "broken.contract.json").unwrap().into_parts();
        assert_eq!(contract.tags.len(), 4);
        assert_eq!(validations.len(), 4, "{:?}", validations);
        assert!(validations.iter().any(|v| v.contains("must declare trackBy")));
        assert!(validations.iter().any(|v| v.contains("variant must have a dataType")));
        assert!(validations.iter().any(|v| v.contains("interactive must have an elementType")));
        assert!(validations.iter().any(|v| v.contains("invalid phase [later]")));
    }

    #[test]
    fn test_untyped_tags_default_to_data_and_sub_contract() {
        let text = r#"{"name": "shop", "tags": [
            {"tag": "title"},
            {"tag": "owner", "tags": [{"tag": "name"}]}
        ]}"#;
        let contract = parse_contract(text, "shop.contract.json").unwrap().val;
        assert!(contract.tags[0].has(ContractTagType::Data));
        assert!(contract.tags[1].has(ContractTagType::SubContract));

        let view_state = contract_view_state(&unlinked(contract, "./shop.contract"));
        let object = view_state.as_object().unwrap();
        assert!(matches!(object.props["title"], Type::Atomic(AtomicType::String)));
        assert!(matches!(&object.props["owner"], Type::Object(o) if o.name == "OwnerOfShopViewState"));
    }

    #[test]
    fn test_nested_ref_constants_are_path_qualified() {
        let text = r#"{"name": "cart", "tags": [
            {"tag": "remove", "type": "interactive", "elementType": "button"},
            {"tag": "items", "type": "sub-contract", "repeated": true, "trackBy": "id", "tags": [
                {"tag": "id"},
                {"tag": "remove", "type": "interactive", "elementType": "button"}
            ]}
        ]}"#;
        let contract = parse_contract(text, "cart.contract.json").unwrap().val;
        let resolved = unlinked(contract, "./cart.contract");

        let refs = contract_refs(&resolved);
        assert_eq!(refs.refs[0].const_name, "refRemove");
        assert_eq!(refs.children["items"].refs[0].const_name, "refItemsRemove");
        assert!(refs.children["items"].refs[0].dynamic_ref);

        let mounted = contract_refs_at(&resolved, &["cart".to_string()]);
        assert_eq!(mounted.refs[0].const_name, "refCartRemove");
        assert_eq!(mounted.children["items"].refs[0].const_name, "refCartItemsRemove");
    }

    #[test]
    fn test_linked_contract_is_imported() {
        let resolver = MemoryResolver::new().with_file("item.contract.json", r#"{"name": "item", "tags": [
            {"tag": "id"},
            {"tag": "remove", "type": "interactive", "elementType": "button"}
        ]}"#);
        let text = r#"{"name": "cart", "tags": [
            {"tag": "items", "type": "sub-contract", "repeated": true, "trackBy": "id", "link": "./item.contract.json"}
        ]}"#;
        let (code, validations) = compile(text, &resolver);
        assert!(validations.is_empty(), "{:?}", validations);
        assert!(code.contains("import { ItemRepeatedRefs, ItemViewState } from './item.contract';"));
        assert!(code.contains("    items: Array<ItemViewState>;\n"));
        assert!(code.contains("export interface CartRefs {\n    items: ItemRepeatedRefs;\n}\n"));
    }

    #[test]
    fn test_missing_link_is_a_validation() {
        let text = r#"{"name": "cart", "tags": [
            {"tag": "summary", "type": "sub-contract", "link": "./summary.contract.json"}
        ]}"#;
        let (code, validations) = compile(text, &MemoryResolver::new());
        assert_eq!(validations.len(), 1);
        assert!(validations[0].contains("Tag [summary] link [./summary.contract.json]"));
        assert!(code.contains("summary: any;"));
    }

    #[test]
    fn test_self_link_is_recursive() {
        let text = r#"{"name": "tree", "tags": [
            {"tag": "label"},
            {"tag": "children", "type": "sub-contract", "repeated": true, "trackBy": "label", "link": "$/"}
        ]}"#;
        let contract = parse_contract(text, "tree.contract.json").unwrap().val;
        let resolved = load_linked_contracts(contract, "tree.contract.json", "./tree.contract", &MemoryResolver::new());
        assert!(resolved.validations.is_empty());
        assert_eq!(
            resolved.val.links.get("children"),
            Some(&ResolvedLink::Recursive("$/data".to_string()))
        );
    }
}
