//! Template parser
//!
//! HTML5 parsing of view templates with html5ever. Bindings (`{...}`) are
//! swapped for placeholders before parsing so the tokenizer never sees them,
//! and source casing of component tags and attributes is carried through
//! marker attributes because html5ever lowercases names.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;
use std::collections::HashMap;

use crate::validate::{
    AttributeIR, CompilerError, DataSource, ElementNode, HeadLink, HeadlessImport, ImportLink,
    TemplateNode, TextNode, ViewTemplate, INV_TEMPLATE_PARSE,
};

pub const VIEW_DATA_SCRIPT_TYPE: &str = "application/view-data";
const TAG_CASE_MARKER: &str = "data-view-tag";
const ATTR_CASE_MARKER: &str = "data-view-attr-case";

lazy_static! {
    static ref EXPR_PLACEHOLDER_RE: Regex = Regex::new(r"__VIEW_EXPR_(\d+)__").unwrap();

    static ref SCRIPT_RE: Regex = Regex::new(r"(?is)<script\b([^>]*)>([\s\S]*?)</script>").unwrap();

    static ref ATTR_RE: Regex =
        Regex::new(r#"(?i)([a-z0-9_:-]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^>\s]+)))?"#).unwrap();

    static ref SELF_CLOSING_RE: Regex = Regex::new(r"<([A-Za-z][A-Za-z0-9.-]*)(\s[^<>]*?)?\s*/>").unwrap();

    static ref OPEN_TAG_RE: Regex = Regex::new(r"<([A-Za-z][A-Za-z0-9.-]*)([^<>]*)>").unwrap();

    static ref CASED_ATTR_RE: Regex =
        Regex::new(r"(?:^|\s)([A-Za-z_][A-Za-z0-9_.-]*[A-Z][A-Za-z0-9_.-]*)").unwrap();

    static ref VOID_ELEMENTS: std::collections::HashSet<&'static str> = [
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
        "track", "wbr",
    ]
    .into_iter()
    .collect();
}

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(tag.to_ascii_lowercase().as_str())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRE-PASSES
// ═══════════════════════════════════════════════════════════════════════════════

fn script_attributes(attrs: &str) -> HashMap<String, String> {
    ATTR_RE
        .captures_iter(attrs)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            Some((name, value))
        })
        .collect()
}

/// Removes the view-data block from the source and returns what it declared.
fn extract_data_block(html: &str, file_path: &str) -> Result<(String, Option<DataSource>), CompilerError> {
    let mut data = None;
    let mut error = None;
    let stripped = SCRIPT_RE.replace_all(html, |caps: &regex::Captures| {
        let attrs = script_attributes(&caps[1]);
        if attrs.get("type").map(String::as_str) != Some(VIEW_DATA_SCRIPT_TYPE) {
            return caps[0].to_string();
        }
        if data.is_some() {
            error.get_or_insert_with(|| {
                CompilerError::new(INV_TEMPLATE_PARSE, "Template has more than one view-data block", file_path)
            });
            return String::new();
        }
        match attrs.get("contract") {
            Some(link) => data = Some(DataSource::Contract { link: link.clone() }),
            None => match serde_json::from_str(caps[2].trim()) {
                Ok(value) => data = Some(DataSource::Inline { data: value }),
                Err(e) => {
                    error.get_or_insert_with(|| {
                        CompilerError::with_details(
                            INV_TEMPLATE_PARSE,
                            &format!("view-data block is not valid JSON: {}", e),
                            file_path,
                            Some(caps[2].trim().to_string()),
                            vec![],
                        )
                    });
                }
            },
        }
        String::new()
    });
    match error {
        Some(e) => Err(e),
        None => Ok((stripped.to_string(), data)),
    }
}

/// Index after the brace closing the one at `start`, skipping quoted text.
fn find_balanced_brace_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i + 1);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Replaces every `{...}` with a placeholder; returns the bodies by index.
/// Escaped braces (`\{`, `\}`) are left in place.
fn normalize_expressions(html: &str) -> (String, Vec<String>) {
    let chars: Vec<char> = html.chars().collect();
    let mut normalized = String::with_capacity(html.len());
    let mut expressions = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && matches!(chars.get(i + 1), Some('\\' | '{' | '}')) {
            normalized.push(chars[i]);
            normalized.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if chars[i] == '{' {
            if let Some(end) = find_balanced_brace_end(&chars, i) {
                expressions.push(chars[i + 1..end - 1].iter().collect());
                normalized.push_str(&format!("__VIEW_EXPR_{}__", expressions.len() - 1));
                i = end;
                continue;
            }
        }
        normalized.push(chars[i]);
        i += 1;
    }
    (normalized, expressions)
}

fn restore_expressions(text: &str, expressions: &[String]) -> String {
    EXPR_PLACEHOLDER_RE
        .replace_all(text, |caps: &regex::Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| expressions.get(i))
                .map(|expr| format!("{{{}}}", expr))
                .unwrap_or_else(|| caps[0].to_string())
        })
        .to_string()
}

/// `<Counter/>` and `<div/>` become open+close pairs; void elements stay as they are.
fn convert_self_closing(html: &str) -> String {
    SELF_CLOSING_RE
        .replace_all(html, |caps: &regex::Captures| {
            let tag = &caps[1];
            let attrs = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            if is_void_element(tag) {
                format!("<{}{}>", tag, attrs)
            } else {
                format!("<{}{}></{}>", tag, attrs, tag)
            }
        })
        .to_string()
}

/// Records source casing of tags and attributes in marker attributes.
fn mark_casing(html: &str) -> String {
    OPEN_TAG_RE
        .replace_all(html, |caps: &regex::Captures| {
            let tag = &caps[1];
            let attrs = &caps[2];
            let mut marked = format!("<{}", tag);
            if tag.chars().any(|c| c.is_ascii_uppercase()) {
                marked.push_str(&format!(" {}=\"{}\"", TAG_CASE_MARKER, tag));
            }
            let cased: Vec<&str> = CASED_ATTR_RE
                .captures_iter(attrs)
                .filter_map(|c| c.get(1).map(|m| m.as_str()))
                .collect();
            if !cased.is_empty() {
                marked.push_str(&format!(" {}=\"{}\"", ATTR_CASE_MARKER, cased.join(" ")));
            }
            marked.push_str(attrs);
            marked.push('>');
            marked
        })
        .to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// DOM CONVERSION
// ═══════════════════════════════════════════════════════════════════════════════

struct DomAttrs {
    tag: String,
    attributes: Vec<AttributeIR>,
}

fn element_attrs(handle: &Handle, expressions: &[String]) -> Option<DomAttrs> {
    let NodeData::Element { name, attrs, .. } = &handle.data else {
        return None;
    };
    let attrs = attrs.borrow();
    let mut tag = name.local.to_string();
    let mut casing: HashMap<String, String> = HashMap::new();
    for attr in attrs.iter() {
        match &*attr.name.local {
            TAG_CASE_MARKER => tag = attr.value.to_string(),
            ATTR_CASE_MARKER => {
                for original in attr.value.split_whitespace() {
                    casing.insert(original.to_ascii_lowercase(), original.to_string());
                }
            }
            _ => {}
        }
    }
    let attributes = attrs
        .iter()
        .filter(|a| {
            let local = &*a.name.local;
            local != TAG_CASE_MARKER && local != ATTR_CASE_MARKER
        })
        .map(|a| {
            let lower = a.name.local.to_string();
            AttributeIR {
                name: casing.get(&lower).cloned().unwrap_or(lower),
                value: restore_expressions(&a.value, expressions),
            }
        })
        .collect();
    Some(DomAttrs { tag, attributes })
}

fn convert_node(handle: &Handle, expressions: &[String]) -> Option<TemplateNode> {
    match &handle.data {
        NodeData::Text { contents } => {
            let text = contents.borrow().to_string();
            if text.trim().is_empty() {
                return None;
            }
            Some(TemplateNode::Text(TextNode {
                value: restore_expressions(&text, expressions),
            }))
        }
        NodeData::Element { .. } => {
            let DomAttrs { tag, attributes } = element_attrs(handle, expressions)?;
            let children = handle
                .children
                .borrow()
                .iter()
                .filter_map(|child| convert_node(child, expressions))
                .collect();
            Some(TemplateNode::Element(ElementNode {
                tag,
                attributes,
                children,
            }))
        }
        _ => None,
    }
}

fn find_element(handle: &Handle, tag: &str) -> Option<Handle> {
    if let NodeData::Element { name, .. } = &handle.data {
        if &*name.local == tag {
            return Some(handle.clone());
        }
    }
    handle
        .children
        .borrow()
        .iter()
        .find_map(|child| find_element(child, tag))
}

#[derive(Default)]
struct HeadContent {
    imports: Vec<ImportLink>,
    headless: Vec<HeadlessImport>,
    head_links: Vec<HeadLink>,
}

fn collect_head(head: &Handle, expressions: &[String], content: &mut HeadContent) {
    for child in head.children.borrow().iter() {
        let Some(DomAttrs { tag, attributes }) = element_attrs(child, expressions) else {
            continue;
        };
        if !tag.eq_ignore_ascii_case("link") {
            continue;
        }
        let get = |name: &str| {
            attributes
                .iter()
                .find(|a| a.name.eq_ignore_ascii_case(name))
                .map(|a| a.value.clone())
                .unwrap_or_default()
        };
        let rel = get("rel");
        match rel.as_str() {
            "import" => content.imports.push(ImportLink {
                module: get("href"),
                names: get("names"),
                sandbox: attributes.iter().any(|a| a.name == "sandbox"),
            }),
            "headless" => content.headless.push(HeadlessImport {
                contract: get("href"),
                key: get("key"),
            }),
            _ => content.head_links.push(HeadLink {
                href: get("href"),
                attributes: attributes
                    .iter()
                    .filter(|a| a.name != "rel" && a.name != "href")
                    .cloned()
                    .collect(),
                rel,
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN PARSING FUNCTION
// ═══════════════════════════════════════════════════════════════════════════════

pub fn parse_template(html: &str, file_path: &str) -> Result<ViewTemplate, CompilerError> {
    // Step 1: Pull the view-data block out before braces are touched
    let (html, data) = extract_data_block(html, file_path)?;

    // Step 2: Bindings to placeholders
    let (normalized, expressions) = normalize_expressions(&html);

    // Step 3: Self-closing tags and casing markers
    let prepared = mark_casing(&convert_self_closing(&normalized));

    // Step 4: Parse with html5ever
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut prepared.as_bytes())
        .map_err(|e| {
            CompilerError::new(
                INV_TEMPLATE_PARSE,
                &format!("Failed to parse template: {}", e),
                file_path,
            )
        })?;

    // Step 5: Head links and body nodes
    let mut head = HeadContent::default();
    if let Some(head_handle) = find_element(&dom.document, "head") {
        collect_head(&head_handle, &expressions, &mut head);
    }
    let body = match find_element(&dom.document, "body") {
        Some(body) => body
            .children
            .borrow()
            .iter()
            .filter_map(|child| convert_node(child, &expressions))
            .collect(),
        None => vec![],
    };

    Ok(ViewTemplate {
        file_path: file_path.to_string(),
        data,
        imports: head.imports,
        headless: head.headless,
        head_links: head.head_links,
        body,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERIALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

fn render_attributes(attributes: &[AttributeIR]) -> String {
    attributes
        .iter()
        .map(|a| format!(" {}=\"{}\"", a.name, escape_attr(&a.value)))
        .collect()
}

/// Serializes template nodes back to markup, siblings without separators.
pub fn render_template_html(nodes: &[TemplateNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            TemplateNode::Text(text) => out.push_str(&escape_text(&text.value)),
            TemplateNode::Element(el) => {
                out.push_str(&format!("<{}{}>", el.tag, render_attributes(&el.attributes)));
                if is_void_element(&el.tag) && el.children.is_empty() {
                    continue;
                }
                out.push_str(&render_template_html(&el.children));
                out.push_str(&format!("</{}>", el.tag));
            }
        }
    }
    out
}

/// The whole template document: head declarations followed by the body.
pub fn render_view_document(template: &ViewTemplate) -> String {
    let mut head = String::new();
    match &template.data {
        Some(DataSource::Contract { link }) => head.push_str(&format!(
            "<script type=\"{}\" contract=\"{}\"></script>",
            VIEW_DATA_SCRIPT_TYPE,
            escape_attr(link)
        )),
        Some(DataSource::Inline { data }) => head.push_str(&format!(
            "<script type=\"{}\">{}</script>",
            VIEW_DATA_SCRIPT_TYPE, data
        )),
        None => {}
    }
    for import in &template.imports {
        head.push_str(&format!(
            "<link rel=\"import\" href=\"{}\" names=\"{}\"{}>",
            escape_attr(&import.module),
            escape_attr(&import.names),
            if import.sandbox { " sandbox" } else { "" }
        ));
    }
    for headless in &template.headless {
        head.push_str(&format!(
            "<link rel=\"headless\" href=\"{}\" key=\"{}\">",
            escape_attr(&headless.contract),
            escape_attr(&headless.key)
        ));
    }
    for link in &template.head_links {
        head.push_str(&format!(
            "<link rel=\"{}\" href=\"{}\"{}>",
            escape_attr(&link.rel),
            escape_attr(&link.href),
            render_attributes(&link.attributes)
        ));
    }
    format!(
        "<html><head>{}</head><body>{}</body></html>",
        head,
        render_template_html(&template.body)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_and_restores_bindings() {
        let (normalized, exprs) = normalize_expressions("<p title={a > b ? 'x}' : y}>{count}</p>");
        assert_eq!(exprs, vec!["a > b ? 'x}' : y".to_string(), "count".to_string()]);
        assert!(!normalized.contains('{'));
        assert_eq!(restore_expressions("__VIEW_EXPR_1__ items", &exprs), "{count} items");
    }

    #[test]
    fn self_closing_conversion_skips_void_elements() {
        assert_eq!(convert_self_closing("<Counter count={x}/>"), "<Counter count={x}></Counter>");
        assert_eq!(convert_self_closing("<br/>"), "<br>");
    }

    #[test]
    fn casing_markers() {
        let marked = mark_casing("<Item itemCount=\"1\" class=\"x\">");
        assert!(marked.contains("data-view-tag=\"Item\""));
        assert!(marked.contains("data-view-attr-case=\"itemCount\""));
    }

    #[test]
    fn void_elements_serialize_without_close() {
        let nodes = vec![TemplateNode::Element(ElementNode {
            tag: "input".to_string(),
            attributes: vec![AttributeIR {
                name: "value".to_string(),
                value: "a\"b".to_string(),
            }],
            children: vec![],
        })];
        assert_eq!(render_template_html(&nodes), "<input value=\"a&quot;b\">");
    }
}
