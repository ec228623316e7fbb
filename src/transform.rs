//! Template transform
//!
//! The one walk over a parsed template body. Bindings are compiled against
//! their scope, refs are collected into a [`RefsTree`] and recursive regions
//! are hoisted out. The result is a [`RenderTree`]: every target renders it
//! without walking the template again.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::expression::collapse_whitespace;
use crate::expression_compiler::{
    compile_accessor, compile_class, compile_condition, compile_prop, compile_text, CompiledValue,
    ExprContext,
};
use crate::refs::{Ref, RefType, RefsTree};
use crate::scope::{accessor_terms, Accessor, ScopeId, ScopeKind, ScopeTree};
use crate::slow_render::{SLOW_FOR_EACH, SLOW_INDEX, SLOW_TRACK_BY};
use crate::types::{camel_case, Type, TypeModel};
use crate::validate::{
    validate_single_root, CompilerError, ElementNode, HeadLink, TemplateNode, Validations,
    ViewTemplate, WithValidations, INV_RECURSE_WITHOUT_ANCHOR, INV_UNGUARDED_RECURSION,
};
use crate::visitor::{RecurseTargets, TemplateVisitor};

/// Attributes consumed by the walk; never rendered.
const DIRECTIVES: &[&str] = &[
    "if",
    "forEach",
    "trackBy",
    "ref",
    "when-loading",
    "when-resolved",
    "when-rejected",
    SLOW_FOR_EACH,
    SLOW_INDEX,
    SLOW_TRACK_BY,
];

/// Attributes bound as DOM properties when dynamic.
const PROPERTIES: &[&str] = &["value", "checked", "selected", "indeterminate"];

// ═══════════════════════════════════════════════════════════════════════════════
// RENDER IR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncState {
    Pending,
    Resolved,
    Rejected,
}

impl AsyncState {
    pub const ALL: [AsyncState; 3] = [AsyncState::Pending, AsyncState::Resolved, AsyncState::Rejected];

    pub fn attribute(&self) -> &'static str {
        match self {
            AsyncState::Pending => "when-loading",
            AsyncState::Resolved => "when-resolved",
            AsyncState::Rejected => "when-rejected",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AsyncState::Pending => "pending",
            AsyncState::Resolved => "resolved",
            AsyncState::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Attribute(CompiledValue),
    Property(CompiledValue),
    /// `style`, set through `cssText`.
    Style(CompiledValue),
}

impl AttributeValue {
    pub fn is_dynamic(&self) -> bool {
        match self {
            AttributeValue::Attribute(v) | AttributeValue::Property(v) | AttributeValue::Style(v) => {
                v.is_dynamic()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementRender {
    pub tag: String,
    pub attributes: Vec<(String, AttributeValue)>,
    /// View-state type of the element's scope.
    pub view_state: String,
    pub ref_const: Option<String>,
    pub children: Vec<RenderNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRender {
    pub name: String,
    pub props: Vec<(String, CompiledValue)>,
    pub view_state: String,
    pub ref_const: String,
    pub sandboxed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderNode {
    Element(ElementRender),
    Text {
        value: CompiledValue,
        view_state: String,
    },
    Component(ComponentRender),
    Conditional {
        condition: String,
        view_state: String,
        child: Box<RenderNode>,
    },
    ForEach {
        /// Collection code over `vs`, e.g. `vs.items`.
        accessor: String,
        view_state: String,
        item_type: String,
        track_by: String,
        child: Box<RenderNode>,
    },
    /// One pre-rendered item of a slow loop.
    SlowForEachItem {
        accessor: String,
        index: usize,
        track_by_value: String,
        view_state: String,
        item_type: String,
        child: Box<RenderNode>,
    },
    Async {
        state: AsyncState,
        accessor: String,
        view_state: String,
        /// The resolved value type, or `Error` when rejected.
        value_type: String,
        child: Box<RenderNode>,
    },
    /// Call of a hoisted recursive region; through `withData` when `accessor` is set.
    RecurseCall {
        region: String,
        accessor: Option<String>,
        view_state: String,
    },
}

impl RenderNode {
    /// Nodes a static element constructor cannot hold directly.
    pub fn is_structural(&self) -> bool {
        !matches!(
            self,
            RenderNode::Element(_) | RenderNode::Text { .. } | RenderNode::Component(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecursiveRegion {
    pub ref_name: String,
    pub fn_name: String,
    pub view_state: String,
    pub body: RenderNode,
}

/// The walk's output: the render IR plus the (not yet optimized) refs tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTree {
    pub root: RenderNode,
    pub regions: Vec<RecursiveRegion>,
    pub refs: RefsTree,
    pub view_state: String,
    pub head_links: Vec<HeadLink>,
}

/// An imported component, keyed by its local name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentImport {
    pub module: String,
    pub sandboxed: bool,
}

pub fn region_fn_name(ref_name: &str) -> String {
    format!("renderRecursiveRegion_{}", ref_name)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFORM CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// Where in the template the walk is: binding scope, refs path and whether
/// refs found here repeat at runtime.
#[derive(Debug, Clone)]
struct WalkScope {
    scope: ScopeId,
    ref_path: Vec<(String, bool)>,
    dynamic: bool,
}

impl WalkScope {
    fn enter(&self, scope: ScopeId, terms: &[String], repeated: bool) -> WalkScope {
        let mut ref_path = self.ref_path.clone();
        ref_path.extend(terms.iter().map(|t| (t.clone(), repeated)));
        WalkScope {
            scope,
            ref_path,
            dynamic: self.dynamic || repeated,
        }
    }
}

struct Anchor {
    ref_name: String,
    guard_depth: usize,
    scope: ScopeId,
}

/// Per-compilation state. Counters live here, never in globals, so repeated
/// compilations produce identical output.
pub struct TransformContext<'a> {
    model: &'a TypeModel,
    scopes: ScopeTree,
    refs: RefsTree,
    components: &'a HashMap<String, ComponentImport>,
    auto_refs: usize,
    recurse_targets: HashSet<String>,
    anchors: Vec<Anchor>,
    guard_depth: usize,
    regions: Vec<RecursiveRegion>,
    validations: Validations,
    file: &'a str,
}

impl<'a> TransformContext<'a> {
    pub fn new(
        model: &'a TypeModel,
        components: &'a HashMap<String, ComponentImport>,
        file: &'a str,
    ) -> Self {
        TransformContext {
            model,
            scopes: ScopeTree::new(model.root().clone()),
            refs: RefsTree::new(false),
            components,
            auto_refs: 0,
            recurse_targets: HashSet::new(),
            anchors: vec![],
            guard_depth: 0,
            regions: vec![],
            validations: vec![],
            file,
        }
    }

    fn view_state(&self, scope: ScopeId) -> String {
        self.model.ts_type(&self.scopes.get(scope).ty)
    }

    fn accessor(&mut self, scope: ScopeId, source: &str) -> Result<Accessor, CompilerError> {
        let cx = ExprContext {
            model: self.model,
            scopes: &self.scopes,
            scope,
            file: self.file,
        };
        let compiled = compile_accessor(&cx, source)?;
        Ok(compiled.collect_into(&mut self.validations))
    }

    fn condition(&mut self, scope: ScopeId, source: &str) -> Result<String, CompilerError> {
        let cx = ExprContext {
            model: self.model,
            scopes: &self.scopes,
            scope,
            file: self.file,
        };
        let compiled = compile_condition(&cx, source)?;
        Ok(compiled.collect_into(&mut self.validations))
    }

    fn value(
        &mut self,
        scope: ScopeId,
        source: &str,
        compile: fn(&ExprContext, &str) -> Result<WithValidations<CompiledValue>, CompilerError>,
    ) -> Result<CompiledValue, CompilerError> {
        let cx = ExprContext {
            model: self.model,
            scopes: &self.scopes,
            scope,
            file: self.file,
        };
        let compiled = compile(&cx, source)?;
        Ok(compiled.collect_into(&mut self.validations))
    }

    fn child_scope(&mut self, scope: ScopeId, accessor: &Accessor, kind: ScopeKind) -> ScopeId {
        self.scopes
            .child_scope_for(self.model, scope, accessor, kind)
            .collect_into(&mut self.validations)
    }

    fn add_ref(&mut self, r: Ref, at: &WalkScope, extra: &[String]) {
        let mut node = &mut self.refs;
        for (key, repeated) in &at.ref_path {
            node = node.children.entry(camel_case(key)).or_default();
            node.repeated |= *repeated;
        }
        for key in extra {
            node = node.children.entry(camel_case(key)).or_default();
        }
        node.refs.push(r);
    }

    /// Registers the element's `ref` (consuming the attribute) and returns its constant.
    fn take_ref(&mut self, element: &mut ElementNode, at: &WalkScope, ref_type: RefType) -> Option<String> {
        let source = element.remove_attr("ref")?;
        let mut terms = accessor_terms(&source);
        let name = terms.pop()?;
        let mut path: Vec<String> = at.ref_path.iter().map(|(key, _)| key.clone()).collect();
        path.extend(terms.iter().cloned());
        let r = Ref::new(&name, &path, at.dynamic, &self.view_state(at.scope), ref_type);
        let const_name = r.const_name.clone();
        self.add_ref(r, at, &terms);
        Some(const_name)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // WALK
    // ═══════════════════════════════════════════════════════════════════════════

    fn transform_children(&mut self, nodes: &[TemplateNode], at: &WalkScope) -> Result<Vec<RenderNode>, CompilerError> {
        let mut out = Vec::new();
        let last = nodes.len().saturating_sub(1);
        for (index, node) in nodes.iter().enumerate() {
            match node {
                TemplateNode::Element(element) => out.push(self.transform_element(element, at)?),
                TemplateNode::Text(text) => {
                    let mut value = collapse_whitespace(&text.value);
                    if index == 0 {
                        value = value.trim_start().to_string();
                    }
                    if index == last {
                        value = value.trim_end().to_string();
                    }
                    if value.is_empty() {
                        continue;
                    }
                    let compiled = self.value(at.scope, &value, compile_text)?;
                    out.push(RenderNode::Text {
                        value: compiled,
                        view_state: self.view_state(at.scope),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Directives apply outermost first: forEach, slowForEach, if, async,
    /// then the node itself.
    fn transform_element(&mut self, element: &ElementNode, at: &WalkScope) -> Result<RenderNode, CompilerError> {
        let mut element = element.clone();
        if let Some(source) = element.remove_attr("forEach") {
            return self.transform_for_each(element, &source, at);
        }
        if let Some(source) = element.remove_attr(SLOW_FOR_EACH) {
            return self.transform_slow_item(element, &source, at);
        }
        if let Some(source) = element.remove_attr("if") {
            let condition = self.condition(at.scope, &source)?;
            self.guard_depth += 1;
            let child = self.transform_element(&element, at);
            self.guard_depth -= 1;
            return Ok(RenderNode::Conditional {
                condition,
                view_state: self.view_state(at.scope),
                child: Box::new(child?),
            });
        }
        for state in AsyncState::ALL {
            if let Some(source) = element.remove_attr(state.attribute()) {
                return self.transform_async(element, state, &source, at);
            }
        }
        if element.tag == "recurse" {
            return self.transform_recurse(&element, at);
        }
        if element.is_component() {
            return self.transform_component(element, at);
        }
        let anchor = element
            .attr("ref")
            .map(str::trim)
            .filter(|r| self.recurse_targets.contains(*r))
            .map(str::to_string);
        match anchor {
            Some(ref_name) => self.transform_anchor(element, ref_name, at),
            None => Ok(RenderNode::Element(self.render_element(element, at)?)),
        }
    }

    fn transform_for_each(&mut self, mut element: ElementNode, source: &str, at: &WalkScope) -> Result<RenderNode, CompilerError> {
        let track_by = match element.remove_attr("trackBy") {
            Some(key) => key.trim().to_string(),
            None => {
                self.validations.push(format!(
                    "forEach [{}] has no trackBy, items are tracked by [id]",
                    source.trim()
                ));
                "id".to_string()
            }
        };
        let accessor = self.accessor(at.scope, source)?;
        let item_scope = self.child_scope(at.scope, &accessor, ScopeKind::ForEachItem);
        let inner = at.enter(item_scope, &accessor.terms, true);

        self.guard_depth += 1;
        let child = self.transform_element(&element, &inner);
        self.guard_depth -= 1;
        Ok(RenderNode::ForEach {
            accessor: accessor.render(),
            view_state: self.view_state(at.scope),
            item_type: self.view_state(item_scope),
            track_by,
            child: Box::new(child?),
        })
    }

    fn transform_slow_item(&mut self, mut element: ElementNode, source: &str, at: &WalkScope) -> Result<RenderNode, CompilerError> {
        let index = element
            .remove_attr(SLOW_INDEX)
            .and_then(|i| i.trim().parse::<usize>().ok())
            .unwrap_or_default();
        let track_by_value = element.remove_attr(SLOW_TRACK_BY).unwrap_or_default();
        let accessor = self.accessor(at.scope, source)?;
        let item_scope = self.child_scope(at.scope, &accessor, ScopeKind::ForEachItem);
        let inner = at.enter(item_scope, &accessor.terms, true);

        self.guard_depth += 1;
        let child = self.transform_element(&element, &inner);
        self.guard_depth -= 1;
        Ok(RenderNode::SlowForEachItem {
            accessor: accessor.render(),
            index,
            track_by_value,
            view_state: self.view_state(at.scope),
            item_type: self.view_state(item_scope),
            child: Box::new(child?),
        })
    }

    fn transform_async(
        &mut self,
        element: ElementNode,
        state: AsyncState,
        source: &str,
        at: &WalkScope,
    ) -> Result<RenderNode, CompilerError> {
        let accessor = self.accessor(at.scope, source)?;
        let inner = match state {
            AsyncState::Pending => {
                if !matches!(self.model.resolve(&accessor.ty), Type::Promise(_) | Type::Unknown) {
                    self.validations.push(format!(
                        "async accessor [{}] is not a promise, found {}",
                        accessor.path(),
                        self.model.ts_type(&accessor.ty)
                    ));
                }
                at.clone()
            }
            AsyncState::Resolved => {
                let scope = self.child_scope(at.scope, &accessor, ScopeKind::AsyncResolved);
                at.enter(scope, &accessor.terms, false)
            }
            AsyncState::Rejected => {
                let scope = self.child_scope(at.scope, &accessor, ScopeKind::AsyncRejected);
                at.enter(scope, &accessor.terms, false)
            }
        };
        let value_type = match state {
            AsyncState::Rejected => "Error".to_string(),
            AsyncState::Resolved => self.view_state(inner.scope),
            AsyncState::Pending => match self.model.resolve(&accessor.ty) {
                Type::Promise(value) => self.model.ts_type(value),
                _ => "any".to_string(),
            },
        };

        self.guard_depth += 1;
        let child = self.transform_element(&element, &inner);
        self.guard_depth -= 1;
        Ok(RenderNode::Async {
            state,
            accessor: accessor.render(),
            view_state: self.view_state(at.scope),
            value_type,
            child: Box::new(child?),
        })
    }

    fn transform_recurse(&mut self, element: &ElementNode, at: &WalkScope) -> Result<RenderNode, CompilerError> {
        let target = element.attr("ref").unwrap_or_default().trim().to_string();
        let Some(anchor) = self.anchors.iter().rev().find(|a| a.ref_name == target) else {
            return Err(CompilerError::with_details(
                INV_RECURSE_WITHOUT_ANCHOR,
                &format!("<recurse ref=\"{}\"> has no enclosing element with ref [{}]", target, target),
                self.file,
                None,
                vec!["Place the marker inside the element that carries the ref".to_string()],
            ));
        };
        if anchor.guard_depth == self.guard_depth {
            return Err(CompilerError::with_details(
                INV_UNGUARDED_RECURSION,
                &format!(
                    "<recurse ref=\"{}\"> is not inside a forEach, if or async branch of its region",
                    target
                ),
                self.file,
                None,
                vec!["Guard the marker so the recursion can stop".to_string()],
            ));
        }
        let anchor_scope = anchor.scope;

        let accessor = self.accessor(at.scope, element.attr("accessor").unwrap_or("."))?;
        let region_type = self.view_state(anchor_scope);
        let data_type = self.model.ts_type(&accessor.ty);
        if !accessor.ty.is_unknown() && data_type != region_type {
            self.validations.push(format!(
                "recurse accessor [{}] is {} but region [{}] renders {}",
                accessor.path(),
                data_type,
                target,
                region_type
            ));
        }
        Ok(RenderNode::RecurseCall {
            region: region_fn_name(&target),
            accessor: (!accessor.is_self()).then(|| accessor.render()),
            view_state: self.view_state(at.scope),
        })
    }

    /// Hoists the subtree anchored by a recursion target into a region; the
    /// anchor's position becomes a call of it.
    fn transform_anchor(&mut self, element: ElementNode, ref_name: String, at: &WalkScope) -> Result<RenderNode, CompilerError> {
        let fn_name = region_fn_name(&ref_name);
        debug!(target: "view_compiler::transform", region = %fn_name, "hoisting recursive region");
        self.anchors.push(Anchor {
            ref_name: ref_name.clone(),
            guard_depth: self.guard_depth,
            scope: at.scope,
        });
        let inner = WalkScope {
            dynamic: true,
            ..at.clone()
        };
        let body = self.render_element(element, &inner);
        self.anchors.pop();

        let view_state = self.view_state(at.scope);
        if self.regions.iter().any(|r| r.fn_name == fn_name) {
            self.validations
                .push(format!("ref [{}] anchors more than one recursive region", ref_name));
        } else {
            self.regions.push(RecursiveRegion {
                ref_name,
                fn_name: fn_name.clone(),
                view_state: view_state.clone(),
                body: RenderNode::Element(body?),
            });
        }
        Ok(RenderNode::RecurseCall {
            region: fn_name,
            accessor: None,
            view_state,
        })
    }

    fn transform_component(&mut self, mut element: ElementNode, at: &WalkScope) -> Result<RenderNode, CompilerError> {
        let name = element.tag.clone();
        let sandboxed = match self.components.get(&name) {
            Some(import) => import.sandboxed,
            None => {
                self.validations
                    .push(format!("component [{}] is not imported", name));
                false
            }
        };
        let view_state = self.view_state(at.scope);
        let ref_const = match self.take_ref(&mut element, at, RefType::component(&name)) {
            Some(const_name) => const_name,
            None => {
                self.auto_refs += 1;
                let r = Ref::auto(self.auto_refs, at.dynamic, &view_state, RefType::component(&name));
                let const_name = r.const_name.clone();
                self.add_ref(r, at, &[]);
                const_name
            }
        };

        let mut props = Vec::new();
        for attr in &element.attributes {
            if DIRECTIVES.contains(&attr.name.as_str()) {
                continue;
            }
            let value = self.value(at.scope, &attr.value, compile_prop)?;
            props.push((attr.name.clone(), value));
        }
        Ok(RenderNode::Component(ComponentRender {
            name,
            props,
            view_state,
            ref_const,
            sandboxed,
        }))
    }

    fn render_element(&mut self, mut element: ElementNode, at: &WalkScope) -> Result<ElementRender, CompilerError> {
        let ref_type = RefType::html(&element.tag);
        let ref_const = self.take_ref(&mut element, at, ref_type);

        let mut attributes = Vec::new();
        for attr in &element.attributes {
            let name = attr.name.as_str();
            if DIRECTIVES.contains(&name) {
                continue;
            }
            let value = match name {
                "class" => AttributeValue::Attribute(self.value(at.scope, &attr.value, compile_class)?),
                "style" => AttributeValue::Style(self.value(at.scope, &attr.value, compile_text)?),
                _ if PROPERTIES.contains(&name) => match self.value(at.scope, &attr.value, compile_text)? {
                    dynamic @ CompiledValue::Dynamic(_) => AttributeValue::Property(dynamic),
                    literal => AttributeValue::Attribute(literal),
                },
                _ => AttributeValue::Attribute(self.value(at.scope, &attr.value, compile_text)?),
            };
            attributes.push((attr.name.clone(), value));
        }

        let children = self.transform_children(&element.children, at)?;
        Ok(ElementRender {
            tag: element.tag,
            attributes,
            view_state: self.view_state(at.scope),
            ref_const,
            children,
        })
    }

    pub fn finish(self, root: RenderNode, head_links: Vec<HeadLink>) -> WithValidations<RenderTree> {
        let view_state = self.model.ts_type(self.model.root());
        WithValidations::new(
            RenderTree {
                root,
                regions: self.regions,
                refs: self.refs,
                view_state,
                head_links,
            },
            self.validations,
        )
    }
}

/// Walks the template's single root element into a [`RenderTree`].
pub fn transform_template(
    template: &ViewTemplate,
    model: &TypeModel,
    components: &HashMap<String, ComponentImport>,
) -> Result<WithValidations<RenderTree>, CompilerError> {
    let root = validate_single_root(template)?;

    let mut targets = RecurseTargets::default();
    let mut body = template.body.clone();
    targets.visit_children(&mut body);

    let mut cx = TransformContext::new(model, components, &template.file_path);
    cx.recurse_targets = targets.refs;
    let at = WalkScope {
        scope: cx.scopes.root(),
        ref_path: vec![],
        dynamic: false,
    };
    let rendered = cx.transform_element(root, &at)?;
    debug!(
        target: "view_compiler::transform",
        file = %template.file_path,
        scopes = cx.scopes.len(),
        regions = cx.regions.len(),
        "template walked"
    );
    Ok(cx.finish(rendered, template.head_links.clone()))
}
