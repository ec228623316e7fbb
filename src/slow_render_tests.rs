#[cfg(test)]
mod tests {
    use crate::codegen::Target;
    use crate::options::CompileOptions;
    use crate::resolver::MemoryResolver;
    use crate::{compile_template, pre_render_template};
    use serde_json::json;

    const PAGE: &str = r#"{"name": "page", "tags": [
        {"tag": "title"},
        {"tag": "description"},
        {"tag": "count", "dataType": "number", "phase": "fast"},
        {"tag": "showBanner", "dataType": "boolean"},
        {"tag": "items", "repeated": true, "trackBy": "id", "tags": [{"tag": "id"}, {"tag": "label"}]}
    ]}"#;

    fn pre_render(body: &str, data: serde_json::Value) -> (String, Vec<String>) {
        let html = format!("<html><head></head><body>{}</body></html>", body);
        pre_render_template(&html, "page.view.html", PAGE, &data)
            .unwrap()
            .into_parts()
    }

    #[test]
    fn test_missing_slow_value_renders_undefined() {
        let (html, validations) = pre_render(
            "<h1>{title}</h1><p>{description}</p>",
            json!({"title": "Hello", "description": null}),
        );
        assert_eq!(validations.len(), 1);
        assert!(validations[0].contains("description"));
        assert!(html.contains("<h1>Hello</h1><p>undefined</p>"));
    }

    #[test]
    fn test_fast_bindings_are_left_for_runtime() {
        let (html, validations) = pre_render("<p>{title}: {count}</p>", json!({"title": "Stock"}));
        assert!(validations.is_empty());
        assert!(html.contains("<p>Stock: {count}</p>"));
    }

    #[test]
    fn test_slow_conditions_are_decided() {
        let body = "<div><span if=\"showBanner\">Sale</span><em if=\"!showBanner\">Regular</em></div>";
        let (html, validations) = pre_render(body, json!({"showBanner": false}));
        assert!(validations.is_empty());
        assert!(html.contains("<div><em>Regular</em></div>"));
    }

    #[test]
    fn test_slow_loops_are_unrolled_with_markers() {
        let body = "<ul><li forEach=\"items\">{label}</li></ul>";
        let data = json!({"items": [{"id": "a", "label": "A"}, {"id": "b", "label": "B"}]});
        let (html, validations) = pre_render(body, data);
        assert!(validations.is_empty());
        assert!(html.contains(
            "<ul><li slowForEach=\"items\" slowIndex=\"0\" slowTrackBy=\"a\">A</li>\
             <li slowForEach=\"items\" slowIndex=\"1\" slowTrackBy=\"b\">B</li></ul>"
        ));
    }

    #[test]
    fn test_non_array_loop_source_is_reported() {
        let (html, validations) = pre_render("<ul><li forEach=\"items\">{label}</li></ul>", json!({"items": 3}));
        assert_eq!(validations.len(), 1);
        assert!(validations[0].contains("[items] is not an array"));
        assert!(html.contains("<ul></ul>"));
    }

    #[test]
    fn test_slow_values_never_become_bindings() {
        let html = r#"<html><head>
            <script type="application/view-data" contract="./page.contract.json"></script>
        </head><body><h1>{title}</h1></body></html>"#;
        let resolver = MemoryResolver::new().with_file("page.contract.json", PAGE);
        let options = CompileOptions::for_file("page.view.html", Target::Element);

        for (title, literal) in [("use {x} here", "'use {x} here'"), ("a } b", "'a } b'"), ("C:\\{dir}", "'C:\\\\{dir}'")] {
            let (rendered, validations) = pre_render_template(html, "page.view.html", PAGE, &json!({ "title": title }))
                .unwrap()
                .into_parts();
            assert!(validations.is_empty(), "{:?}", validations);
            assert!(!rendered.contains("<h1>{"), "{}", rendered);

            let (code, validations) = compile_template(&rendered, &options, &resolver).unwrap().into_parts();
            assert!(validations.is_empty(), "{:?}", validations);
            assert!(code.contains(literal), "{}", code);
            assert!(!code.contains("vs.x"));
        }
    }
}
