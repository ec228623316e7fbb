#[cfg(test)]
mod tests {
    use crate::codegen::Target;
    use crate::contract::{parse_contract, Contract, ContractTag, ContractTagType};
    use crate::contract_codegen::compile_contract;
    use crate::options::CompileOptions;
    use crate::phase::*;
    use crate::resolver::MemoryResolver;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn data(name: &str, phase: Option<Phase>) -> ContractTag {
        let mut tag = ContractTag::new(name, &[ContractTagType::Data]);
        tag.phase = phase;
        tag
    }

    fn container(name: &str, repeated: bool, phase: Option<Phase>, children: Vec<ContractTag>) -> ContractTag {
        let mut tag = ContractTag::new(name, &[ContractTagType::SubContract]);
        tag.repeated = repeated;
        tag.phase = phase;
        tag.tags = Some(children);
        tag
    }

    fn contract(tags: Vec<ContractTag>) -> Contract {
        Contract {
            name: "page".to_string(),
            tags,
            props: vec![],
            params: vec![],
        }
    }

    #[test]
    fn test_phases_are_ordered() {
        assert!(Phase::Slow < Phase::Fast);
        assert!(Phase::Fast < Phase::FastInteractive);
        assert_eq!(Phase::parse("fast+interactive"), Some(Phase::FastInteractive));
        assert_eq!(Phase::parse("eventually"), None);
    }

    #[test]
    fn test_slow_child_of_fast_array_is_rejected() {
        let items = container("items", true, Some(Phase::Fast), vec![data("title", Some(Phase::Slow))]);
        let validations = validate_contract_phases(&contract(vec![items]));
        assert_eq!(validations.len(), 1);
        assert!(validations[0].contains("earlier"));
        assert!(validations[0].contains("items.title"));
    }

    #[test]
    fn test_object_phase_is_only_a_default() {
        let seller = container("seller", false, Some(Phase::Fast), vec![data("name", None), data("rating", Some(Phase::Slow))]);
        let page = contract(vec![seller]);
        assert!(validate_contract_phases(&page).is_empty());

        let phases = phase_map(&page.tags);
        assert_eq!(phases["seller.name"], Phase::Fast);
        assert_eq!(phases["seller.rating"], Phase::Slow);
    }

    #[test]
    fn test_array_phase_is_inherited_by_items() {
        let items = container("items", true, Some(Phase::Fast), vec![data("title", None)]);
        assert!(validate_contract_phases(&contract(vec![items.clone()])).is_empty());
        assert_eq!(phase_map(&[items])["items.title"], Phase::Fast);
    }

    #[test]
    fn test_interactive_tags_are_never_projected() {
        let mut button = ContractTag::new("buy", &[ContractTagType::Interactive]);
        button.element_type = vec!["button".to_string()];
        let tags = vec![data("price", None), button];
        for phase in Phase::ALL {
            let kept = filter_tags_by_phase(&tags, phase);
            assert!(kept.iter().all(|t| t.tag != "buy"));
        }
        assert_eq!(filter_tags_by_phase(&tags, Phase::Slow).len(), 1);
    }

    #[test]
    fn test_empty_containers_are_dropped() {
        let tags = vec![container("stock", false, None, vec![data("count", Some(Phase::Fast))])];
        assert!(filter_tags_by_phase(&tags, Phase::Slow).is_empty());
        let fast = filter_tags_by_phase(&tags, Phase::Fast);
        assert_eq!(fast.len(), 1);
        assert_eq!(fast[0].tags.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_repeated_track_by_contract_reports_one_ordering_problem() {
        let text = r#"{"name": "catalog", "tags": [
            {"tag": "products", "type": "sub-contract", "repeated": true, "trackBy": "id", "phase": "fast", "tags": [
                {"tag": "id", "dataType": "string"},
                {"tag": "name", "dataType": "string", "phase": "slow"},
                {"tag": "price", "dataType": "number"}
            ]}
        ]}"#;
        let options = CompileOptions::for_file("catalog.contract.json", Target::Element);
        let validations = compile_contract(text, &options, &MemoryResolver::new())
            .unwrap()
            .validations;
        assert_eq!(validations.len(), 1, "{:?}", validations);
        assert!(validations[0].contains("earlier"));

        let contract = parse_contract(text, "catalog.contract.json").unwrap().val;
        assert_eq!(phase_map(&contract.tags)["products.price"], Phase::Fast);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PARTITION PROPERTY
    // ═══════════════════════════════════════════════════════════════════════════

    fn arb_phase() -> impl Strategy<Value = Option<Phase>> {
        prop_oneof![
            Just(None),
            Just(Some(Phase::Slow)),
            Just(Some(Phase::Fast)),
            Just(Some(Phase::FastInteractive)),
        ]
    }

    fn arb_types() -> impl Strategy<Value = Vec<ContractTagType>> {
        prop_oneof![
            Just(vec![ContractTagType::Data]),
            Just(vec![ContractTagType::Variant]),
            Just(vec![ContractTagType::Interactive]),
            Just(vec![ContractTagType::Data, ContractTagType::Interactive]),
        ]
    }

    fn arb_tag() -> impl Strategy<Value = ContractTag> {
        let leaf = (arb_types(), arb_phase()).prop_map(|(types, phase)| {
            let mut tag = ContractTag::new("leaf", &types);
            tag.phase = phase;
            tag
        });
        leaf.prop_recursive(3, 32, 4, |inner| {
            (prop::collection::vec(inner, 0..4), any::<bool>(), arb_phase())
                .prop_map(|(children, repeated, phase)| container("group", repeated, phase, children))
        })
    }

    /// Sibling names must be unique for paths to identify a field.
    fn rename(tags: Vec<ContractTag>) -> Vec<ContractTag> {
        tags.into_iter()
            .enumerate()
            .map(|(index, mut tag)| {
                tag.tag = format!("t{}", index);
                tag.tags = tag.tags.map(rename);
                tag
            })
            .collect()
    }

    proptest! {
        #[test]
        fn test_phase_projections_partition_leaves(tags in prop::collection::vec(arb_tag(), 0..5)) {
            let tags = rename(tags);
            let all = leaf_paths(&tags);
            let projections: Vec<BTreeSet<String>> = Phase::ALL
                .iter()
                .map(|phase| leaf_paths(&filter_tags_by_phase(&tags, *phase)))
                .collect();

            let union: BTreeSet<String> = projections.iter().flatten().cloned().collect();
            prop_assert_eq!(union, all);
            for (i, a) in projections.iter().enumerate() {
                for b in projections.iter().skip(i + 1) {
                    prop_assert!(a.is_disjoint(b));
                }
            }
        }
    }
}
