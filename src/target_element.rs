//! Trusted element target
//!
//! Renders the IR into the same-process runtime's constructors: `e` / `de`
//! for elements, `dt` / `da` / `dp` for dynamic text, attributes and
//! properties, and the `c`, `forEach`, async and `childComp` combinators.
//! The sandbox root target reuses [`ElementWriter`] with every child component
//! wrapped for cross-boundary dispatch.

use crate::codegen::{array, arrow, call, indent, js_string, object, render_head_links, Imports, TargetOutput};
use crate::expression_compiler::CompiledValue;
use crate::refs::{render_refs_managers, ManagerKind, RefsTree};
use crate::transform::{
    AsyncState, AttributeValue, ComponentRender, ElementRender, RecursiveRegion, RenderNode, RenderTree,
};

pub struct ElementWriter {
    pub imports: Imports,
    secure_components: bool,
}

impl ElementWriter {
    pub fn new(secure_components: bool) -> Self {
        ElementWriter {
            imports: Imports::empty(),
            secure_components,
        }
    }

    pub fn node(&mut self, node: &RenderNode) -> String {
        match node {
            RenderNode::Element(element) => self.element(element),
            RenderNode::Text { value, view_state } => match value {
                CompiledValue::Static(text) => js_string(text),
                CompiledValue::Dynamic(code) => {
                    self.imports.insert(Imports::DYNAMIC_TEXT);
                    call("dt", &[arrow(view_state, code)])
                }
            },
            RenderNode::Component(component) => self.component(component),
            RenderNode::Conditional {
                condition,
                view_state,
                child,
            } => {
                self.imports.insert(Imports::CONDITIONAL);
                let child = self.node(child);
                call("c", &[arrow(view_state, condition), format!("() => {}", child)])
            }
            RenderNode::ForEach {
                accessor,
                view_state,
                item_type,
                track_by,
                child,
            } => {
                self.imports.insert(Imports::FOR_EACH);
                let child = self.node(child);
                call(
                    "forEach",
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
                item_type,
                child,
            } => {
                self.imports.insert(Imports::SLOW_FOR_EACH_ITEM);
                let child = self.node(child);
                call(
                    &format!("slowForEachItem<{}, {}>", view_state, item_type),
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
                value_type,
                child,
            } => {
                let (flag, generics) = match state {
                    AsyncState::Pending => (Imports::PENDING, view_state.clone()),
                    AsyncState::Resolved => (Imports::RESOLVED, format!("{}, {}", view_state, value_type)),
                    AsyncState::Rejected => (Imports::REJECTED, format!("{}, Error", view_state)),
                };
                self.imports.insert(flag);
                let child = self.node(child);
                call(
                    &format!("{}<{}>", state.as_str(), generics),
                    &[arrow(view_state, accessor), format!("() => {}", child)],
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

    fn element(&mut self, element: &ElementRender) -> String {
        let callee = if element.children.iter().any(RenderNode::is_structural) {
            self.imports.insert(Imports::DYNAMIC_ELEMENT);
            "de"
        } else {
            self.imports.insert(Imports::ELEMENT);
            "e"
        };
        let attributes = self.attributes(element);
        let children: Vec<String> = element.children.iter().map(|child| self.node(child)).collect();
        let mut args = vec![js_string(&element.tag), object(&attributes), array(&children)];
        if let Some(ref_const) = &element.ref_const {
            args.push(format!("{}()", ref_const));
        }
        call(callee, &args)
    }

    fn attributes(&mut self, element: &ElementRender) -> Vec<(String, String)> {
        let view_state = &element.view_state;
        element
            .attributes
            .iter()
            .map(|(name, value)| {
                let code = match value {
                    AttributeValue::Attribute(v) => self.binding(v, Imports::DYNAMIC_ATTRIBUTE, "da", view_state),
                    AttributeValue::Property(v) => self.binding(v, Imports::DYNAMIC_PROPERTY, "dp", view_state),
                    AttributeValue::Style(v) => {
                        let css = self.binding(v, Imports::DYNAMIC_ATTRIBUTE, "da", view_state);
                        object(&[("cssText".to_string(), css)])
                    }
                };
                (name.clone(), code)
            })
            .collect()
    }

    fn binding(&mut self, value: &CompiledValue, flag: Imports, callee: &str, view_state: &str) -> String {
        match value {
            CompiledValue::Static(text) => js_string(text),
            CompiledValue::Dynamic(code) => {
                self.imports.insert(flag);
                call(callee, &[arrow(view_state, code)])
            }
        }
    }

    fn component(&mut self, component: &ComponentRender) -> String {
        let callee = if self.secure_components || component.sandboxed {
            self.imports.insert(Imports::SECURE_CHILD_COMP);
            "secureChildComp"
        } else {
            self.imports.insert(Imports::CHILD_COMP);
            "childComp"
        };
        let props: Vec<(String, String)> = component
            .props
            .iter()
            .map(|(name, value)| (name.clone(), value.to_js()))
            .collect();
        call(
            callee,
            &[
                component.name.clone(),
                arrow(&component.view_state, &format!("({})", object(&props))),
                format!("{}()", component.ref_const),
            ],
        )
    }

    /// `function renderRecursiveRegion_<ref>() { return ...; }`
    pub fn region(&mut self, region: &RecursiveRegion) -> String {
        let body = self.node(&region.body);
        format!(
            "function {}() {{\n{}\n}}",
            region.fn_name,
            indent(&format!("return {};", body), 1)
        )
    }
}

pub fn render(tree: &RenderTree, refs: &RefsTree) -> TargetOutput {
    let mut writer = ElementWriter::new(false);
    let mut manager_lines = render_refs_managers(refs, ManagerKind::Element, &mut writer.imports);
    manager_lines.extend(render_head_links(&tree.head_links, &mut writer.imports));
    let regions = tree.regions.iter().map(|region| writer.region(region)).collect();
    let body = writer.node(&tree.root);

    writer.imports.insert(Imports::CONSTRUCT_CONTEXT);
    TargetOutput {
        render_body: call(
            "ConstructContext.withRootContext",
            &["viewState".to_string(), "refManager".to_string(), format!("() => {}", body)],
        ),
        imports: writer.imports,
        manager_lines,
        regions,
        takes_options: true,
    }
}
