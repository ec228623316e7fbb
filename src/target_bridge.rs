//! Sandbox bridge target
//!
//! The worker side of a sandboxed component never builds DOM. It mirrors only
//! the structure that carries refs (elements with a ref, child components and
//! the control flow around them) so events and updates can be routed across
//! the boundary. Plain markup and text are dropped.

use crate::codegen::{array, arrow, call, indent, js_string, object, Imports, TargetOutput};
use crate::refs::{render_refs_managers, ManagerKind, RefsTree};
use crate::transform::{AsyncState, RecursiveRegion, RenderNode, RenderTree};

struct BridgeWriter {
    imports: Imports,
}

impl BridgeWriter {
    /// The bridge entries a node contributes, flattened.
    fn entries(&mut self, node: &RenderNode) -> Vec<String> {
        match node {
            RenderNode::Element(element) => {
                let mut out = Vec::new();
                if let Some(ref_const) = &element.ref_const {
                    self.imports.insert(Imports::ELEMENT);
                    out.push(format!("e({}())", ref_const));
                }
                for child in &element.children {
                    out.extend(self.entries(child));
                }
                out
            }
            RenderNode::Text { .. } => vec![],
            RenderNode::Component(component) => {
                self.imports.insert(Imports::CHILD_COMP);
                let props: Vec<(String, String)> = component
                    .props
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_js()))
                    .collect();
                vec![call(
                    "childComp",
                    &[
                        component.name.clone(),
                        arrow(&component.view_state, &format!("({})", object(&props))),
                        format!("{}()", component.ref_const),
                    ],
                )]
            }
            RenderNode::Conditional {
                condition,
                view_state,
                child,
            } => {
                let inner = self.entries(child);
                if inner.is_empty() {
                    return vec![];
                }
                self.imports.insert(Imports::CONDITIONAL);
                vec![call("c", &[arrow(view_state, condition), format!("() => {}", array(&inner))])]
            }
            RenderNode::ForEach {
                accessor,
                view_state,
                item_type,
                track_by,
                child,
            } => {
                let inner = self.entries(child);
                if inner.is_empty() {
                    return vec![];
                }
                self.imports.insert(Imports::FOR_EACH);
                vec![call(
                    "forEach",
                    &[
                        arrow(view_state, accessor),
                        arrow(item_type, &array(&inner)),
                        js_string(track_by),
                    ],
                )]
            }
            RenderNode::SlowForEachItem {
                accessor,
                index,
                track_by_value,
                view_state,
                child,
                ..
            } => {
                let inner = self.entries(child);
                if inner.is_empty() {
                    return vec![];
                }
                self.imports.insert(Imports::SLOW_FOR_EACH_ITEM);
                vec![call(
                    "slowForEachItem",
                    &[
                        arrow(view_state, accessor),
                        index.to_string(),
                        js_string(track_by_value),
                        format!("() => {}", array(&inner)),
                    ],
                )]
            }
            RenderNode::Async {
                state,
                accessor,
                view_state,
                child,
                ..
            } => {
                let inner = self.entries(child);
                if inner.is_empty() {
                    return vec![];
                }
                self.imports.insert(match state {
                    AsyncState::Pending => Imports::PENDING,
                    AsyncState::Resolved => Imports::RESOLVED,
                    AsyncState::Rejected => Imports::REJECTED,
                });
                vec![call(
                    state.as_str(),
                    &[arrow(view_state, accessor), format!("() => {}", array(&inner))],
                )]
            }
            RenderNode::RecurseCall {
                region,
                accessor,
                view_state,
            } => match accessor {
                None => vec![format!("...{}()", region)],
                Some(accessor) => {
                    self.imports.insert(Imports::WITH_DATA);
                    vec![call(
                        "withData",
                        &[arrow(view_state, accessor), format!("() => {}()", region)],
                    )]
                }
            },
        }
    }

    fn region(&mut self, region: &RecursiveRegion) -> String {
        let entries = self.entries(&region.body);
        format!(
            "function {}() {{\n{}\n}}",
            region.fn_name,
            indent(&format!("return {};", array(&entries)), 1)
        )
    }
}

pub fn render(tree: &RenderTree, refs: &RefsTree) -> TargetOutput {
    let mut writer = BridgeWriter {
        imports: Imports::ELEMENT_BRIDGE,
    };
    let manager_lines = render_refs_managers(refs, ManagerKind::Bridge, &mut writer.imports);
    let regions = tree.regions.iter().map(|region| writer.region(region)).collect();
    let entries = writer.entries(&tree.root);
    TargetOutput {
        render_body: call(
            "elementBridge",
            &[
                "viewState".to_string(),
                "refManager".to_string(),
                format!("() => {}", array(&entries)),
            ],
        ),
        imports: writer.imports,
        manager_lines,
        regions,
        takes_options: false,
    }
}
