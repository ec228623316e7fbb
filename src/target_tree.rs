//! Declarative UI tree target
//!
//! Emits `h(type, props, children, ref?)` nodes for a host that reconciles a
//! tree description. Dynamic values are passed as view-state functions and the
//! host decides when to call them.

use crate::codegen::{array, arrow, call, indent, js_string, object, render_head_links, Imports, TargetOutput};
use crate::expression_compiler::CompiledValue;
use crate::refs::{render_refs_managers, ManagerKind, RefsTree};
use crate::transform::{AttributeValue, RecursiveRegion, RenderNode, RenderTree};

struct TreeWriter {
    imports: Imports,
}

fn value(value: &CompiledValue, view_state: &str) -> String {
    match value {
        CompiledValue::Static(text) => js_string(text),
        CompiledValue::Dynamic(code) => arrow(view_state, code),
    }
}

impl TreeWriter {
    fn node(&mut self, node: &RenderNode) -> String {
        match node {
            RenderNode::Element(element) => {
                self.imports.insert(Imports::H);
                let props: Vec<(String, String)> = element
                    .attributes
                    .iter()
                    .map(|(name, attribute)| {
                        let code = match attribute {
                            AttributeValue::Attribute(v) | AttributeValue::Property(v) => {
                                value(v, &element.view_state)
                            }
                            AttributeValue::Style(v) => object(&[(
                                "cssText".to_string(),
                                value(v, &element.view_state),
                            )]),
                        };
                        (name.clone(), code)
                    })
                    .collect();
                let children: Vec<String> = element.children.iter().map(|child| self.node(child)).collect();
                let mut args = vec![js_string(&element.tag), object(&props), array(&children)];
                if let Some(ref_const) = &element.ref_const {
                    args.push(format!("{}()", ref_const));
                }
                call("h", &args)
            }
            RenderNode::Text { value: text, view_state } => value(text, view_state),
            RenderNode::Component(component) => {
                self.imports.insert(Imports::H);
                let props: Vec<(String, String)> = component
                    .props
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_js()))
                    .collect();
                call(
                    "h",
                    &[
                        component.name.clone(),
                        arrow(&component.view_state, &format!("({})", object(&props))),
                        "[]".to_string(),
                        format!("{}()", component.ref_const),
                    ],
                )
            }
            RenderNode::Conditional {
                condition,
                view_state,
                child,
            } => {
                self.imports.insert(Imports::WHEN);
                let child = self.node(child);
                call("when", &[arrow(view_state, condition), format!("() => {}", child)])
            }
            RenderNode::ForEach {
                accessor,
                view_state,
                item_type,
                track_by,
                child,
            } => {
                self.imports.insert(Imports::EACH);
                let child = self.node(child);
                call(
                    "each",
                    &[
                        arrow(view_state, accessor),
                        arrow(item_type, &child),
                        js_string(track_by),
                    ],
                )
            }
            RenderNode::SlowForEachItem {
                accessor,
                index,
                track_by_value,
                view_state,
                child,
                ..
            } => {
                self.imports.insert(Imports::SLOW_FOR_EACH_ITEM);
                let child = self.node(child);
                call(
                    "slowForEachItem",
                    &[
                        arrow(view_state, accessor),
                        index.to_string(),
                        js_string(track_by_value),
                        format!("() => {}", child),
                    ],
                )
            }
            RenderNode::Async {
                state,
                accessor,
                view_state,
                child,
                ..
            } => {
                self.imports.insert(Imports::AWAITING);
                let child = self.node(child);
                call(
                    "awaiting",
                    &[
                        js_string(state.as_str()),
                        arrow(view_state, accessor),
                        format!("() => {}", child),
                    ],
                )
            }
            RenderNode::RecurseCall {
                region,
                accessor,
                view_state,
            } => match accessor {
                None => format!("{}()", region),
                Some(accessor) => {
                    self.imports.insert(Imports::WITH_DATA);
                    call(
                        "withData",
                        &[arrow(view_state, accessor), format!("() => {}()", region)],
                    )
                }
            },
        }
    }

    fn region(&mut self, region: &RecursiveRegion) -> String {
        let body = self.node(&region.body);
        format!(
            "function {}() {{\n{}\n}}",
            region.fn_name,
            indent(&format!("return {};", body), 1)
        )
    }
}

pub fn render(tree: &RenderTree, refs: &RefsTree) -> TargetOutput {
    let mut writer = TreeWriter {
        imports: Imports::TREE_ROOT,
    };
    let mut manager_lines = render_refs_managers(refs, ManagerKind::Tree, &mut writer.imports);
    manager_lines.extend(render_head_links(&tree.head_links, &mut writer.imports));
    let regions = tree.regions.iter().map(|region| writer.region(region)).collect();
    let body = writer.node(&tree.root);
    TargetOutput {
        render_body: call(
            "treeRoot",
            &["viewState".to_string(), "refManager".to_string(), format!("() => {}", body)],
        ),
        imports: writer.imports,
        manager_lines,
        regions,
        takes_options: true,
    }
}
