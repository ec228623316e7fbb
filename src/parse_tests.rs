#[cfg(test)]
mod tests {
    use crate::parse::{parse_template, render_view_document};
    use crate::validate::{
        require_data_source, validate_single_root, DataSource, TemplateNode, INV_MISSING_DATA_BLOCK,
        INV_SINGLE_ROOT, INV_TEMPLATE_PARSE,
    };
    use serde_json::json;

    fn root_children(html: &str) -> Vec<TemplateNode> {
        let template = parse_template(html, "page.view.html").unwrap();
        validate_single_root(&template).unwrap().children.clone()
    }

    #[test]
    fn test_inline_data_block() {
        let html = r#"<html><head>
            <script type="application/view-data">{"title": "string", "tags": ["string"]}</script>
        </head><body><h1>{title}</h1></body></html>"#;
        let template = parse_template(html, "page.view.html").unwrap();
        assert_eq!(
            template.data,
            Some(DataSource::Inline {
                data: json!({"title": "string", "tags": ["string"]})
            })
        );
        assert_eq!(template.body.len(), 1);
    }

    #[test]
    fn test_contract_data_block() {
        let html = r#"<html><head>
            <script type="application/view-data" contract="./page.contract.json"></script>
        </head><body><div></div></body></html>"#;
        let template = parse_template(html, "page.view.html").unwrap();
        assert_eq!(
            require_data_source(&template).unwrap(),
            &DataSource::Contract {
                link: "./page.contract.json".to_string()
            }
        );
        assert!(render_view_document(&template)
            .starts_with("<html><head><script type=\"application/view-data\" contract=\"./page.contract.json\"></script></head>"));
    }

    #[test]
    fn test_head_links() {
        let html = r#"<html><head>
            <link rel="import" href="./card" names="Card, Item as Row" sandbox>
            <link rel="headless" href="./cart.contract.json" key="cart">
            <link rel="stylesheet" href="/main.css" media="print">
        </head><body><div></div></body></html>"#;
        let template = parse_template(html, "page.view.html").unwrap();

        assert_eq!(template.imports.len(), 1);
        assert_eq!(template.imports[0].module, "./card");
        assert_eq!(template.imports[0].names, "Card, Item as Row");
        assert!(template.imports[0].sandbox);

        assert_eq!(template.headless.len(), 1);
        assert_eq!(template.headless[0].key, "cart");

        assert_eq!(template.head_links.len(), 1);
        assert_eq!(template.head_links[0].rel, "stylesheet");
        assert_eq!(template.head_links[0].attributes[0].name, "media");
    }

    #[test]
    fn test_component_and_attribute_casing() {
        let children = root_children(
            "<html><body><div><ProductCard product={product} onBuy=\"buy\"/><span>after</span></div></body></html>",
        );
        assert_eq!(children.len(), 2);
        let TemplateNode::Element(card) = &children[0] else {
            panic!("expected an element");
        };
        assert_eq!(card.tag, "ProductCard");
        assert!(card.is_component());
        assert_eq!(card.attr("product"), Some("{product}"));
        assert_eq!(card.attr("onBuy"), Some("buy"));
        assert!(card.children.is_empty());
    }

    #[test]
    fn test_bindings_survive_markup_characters() {
        let children = root_children("<html><body><p>{count > 1 ? 'many <b>' : 'one'}</p></body></html>");
        let TemplateNode::Text(text) = &children[0] else {
            panic!("expected text");
        };
        assert_eq!(text.value, "{count > 1 ? 'many <b>' : 'one'}");
    }

    #[test]
    fn test_directive_attributes_keep_case() {
        let children = root_children(
            "<html><body><ul><li forEach=\"items\" trackBy=\"id\">{name}</li></ul></body></html>",
        );
        let TemplateNode::Element(item) = &children[0] else {
            panic!("expected an element");
        };
        assert_eq!(item.attr("forEach"), Some("items"));
        assert_eq!(item.attr("trackBy"), Some("id"));
    }

    #[test]
    fn test_data_block_errors() {
        let twice = r#"<html><head>
            <script type="application/view-data">{}</script>
            <script type="application/view-data">{}</script>
        </head><body><div></div></body></html>"#;
        assert_eq!(parse_template(twice, "a.view.html").unwrap_err().code, INV_TEMPLATE_PARSE);

        let invalid = r#"<html><head><script type="application/view-data">{title: }</script></head><body><div></div></body></html>"#;
        let err = parse_template(invalid, "a.view.html").unwrap_err();
        assert_eq!(err.code, INV_TEMPLATE_PARSE);
        assert_eq!(err.context.as_deref(), Some("{title: }"));

        let missing = parse_template("<html><body><div></div></body></html>", "a.view.html").unwrap();
        assert_eq!(require_data_source(&missing).unwrap_err().code, INV_MISSING_DATA_BLOCK);
    }

    #[test]
    fn test_single_root_is_required() {
        let two = parse_template("<html><body><div></div><p></p></body></html>", "a.view.html").unwrap();
        let err = validate_single_root(&two).unwrap_err();
        assert_eq!(err.code, INV_SINGLE_ROOT);
        assert!(err.message.contains("found 2"));

        let empty = parse_template("<html><body></body></html>", "a.view.html").unwrap();
        assert_eq!(validate_single_root(&empty).unwrap_err().code, INV_SINGLE_ROOT);
    }
}
