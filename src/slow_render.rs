//! Slow pre-render transform
//!
//! Inlines slow-phase data into a template ahead of first render: slow
//! bindings become literal text, slow `forEach` loops are unrolled into
//! marked sibling clones and slow `if` conditions are decided. Anything that
//! depends on fast data is left for the runtime.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::contract::{Contract, ContractTag, DataType};
use crate::expression::{escape_braces, parse_condition, parse_value, split_braces, BinaryOp, Expr, Literal};
use crate::expression_compiler::syntax_error;
use crate::phase::{phase_map, Phase};
use crate::static_eval::{display_value, is_truthy, lookup_path, static_eval};
use crate::types::camel_case;
use crate::validate::{
    CompilerError, ElementNode, TemplateNode, TextNode, Validations, ViewTemplate, WithValidations,
};
use crate::visitor::{walk_element, TemplateVisitor};

/// Marker attributes left on unrolled loop items.
pub const SLOW_FOR_EACH: &str = "slowForEach";
pub const SLOW_INDEX: &str = "slowIndex";
pub const SLOW_TRACK_BY: &str = "slowTrackBy";

/// Attributes never treated as bindable text.
const DIRECTIVES: &[&str] = &[
    "if",
    "forEach",
    "trackBy",
    "ref",
    "class",
    "when-loading",
    "when-resolved",
    "when-rejected",
    SLOW_FOR_EACH,
    SLOW_INDEX,
    SLOW_TRACK_BY,
];

fn join(prefix: &str, terms: &[String]) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if !prefix.is_empty() {
        parts.push(prefix);
    }
    parts.extend(terms.iter().map(String::as_str));
    parts.join(".")
}

struct Frame {
    data: Value,
    /// Contract path of the scope, e.g. `items` inside an `items` loop.
    prefix: String,
}

pub struct SlowRenderer<'a> {
    phases: BTreeMap<String, Phase>,
    enums: HashMap<String, Vec<String>>,
    track_by: HashMap<String, String>,
    frames: Vec<Frame>,
    validations: Validations,
    error: Option<CompilerError>,
    file: &'a str,
}

fn collect_contract_facts(
    tags: &[ContractTag],
    path: &str,
    enums: &mut HashMap<String, Vec<String>>,
    track_by: &mut HashMap<String, String>,
) {
    for tag in tags {
        let tag_path = join(path, &[camel_case(&tag.tag)]);
        if let Some(DataType::Enum(values)) = &tag.data_type {
            enums.insert(tag_path.clone(), values.clone());
        }
        if let Some(key) = &tag.track_by {
            track_by.insert(tag_path.clone(), camel_case(key));
        }
        if let Some(children) = &tag.tags {
            collect_contract_facts(children, &tag_path, enums, track_by);
        }
    }
}

impl<'a> SlowRenderer<'a> {
    pub fn new(contract: &Contract, slow_view_state: &Value, file: &'a str) -> Self {
        let mut enums = HashMap::new();
        let mut track_by = HashMap::new();
        collect_contract_facts(&contract.tags, "", &mut enums, &mut track_by);
        SlowRenderer {
            phases: phase_map(&contract.tags),
            enums,
            track_by,
            frames: vec![Frame {
                data: slow_view_state.clone(),
                prefix: String::new(),
            }],
            validations: vec![],
            error: None,
            file,
        }
    }

    fn frame(&self) -> &Frame {
        // the root frame is never popped
        &self.frames[self.frames.len() - 1]
    }

    fn is_slow(&self, path: &str) -> bool {
        self.phases.get(path) == Some(&Phase::Slow)
    }

    fn is_known(&self, path: &str) -> bool {
        self.phases.contains_key(path)
    }

    fn lookup(&self, terms: &[String]) -> Option<Value> {
        let frame = self.frame();
        let path = join(&frame.prefix, terms);
        if terms.is_empty() {
            return (frame.prefix.is_empty() || self.is_slow(&path)).then(|| frame.data.clone());
        }
        if !self.is_slow(&path) {
            return None;
        }
        let value = lookup_path(&frame.data, terms);
        if let (Value::Number(n), Some(values)) = (&value, self.enums.get(&path)) {
            if let Some(name) = n.as_u64().and_then(|i| values.get(i as usize)) {
                return Some(Value::String(name.clone()));
            }
        }
        Some(value)
    }

    /// Bare identifiers compared against a field are enum literals.
    fn qualify_literals(&self, expr: Expr) -> Expr {
        match expr {
            Expr::Binary { op, lhs, rhs } if matches!(op, BinaryOp::Eq | BinaryOp::NotEq) => {
                let prefix = self.frame().prefix.clone();
                let literal = |e: Expr| match e {
                    Expr::Accessor(terms) if terms.len() == 1 && !self.is_known(&join(&prefix, &terms)) => {
                        Expr::Literal(Literal::Str(terms[0].clone()))
                    }
                    other => other,
                };
                Expr::Binary {
                    op,
                    lhs: Box::new(literal(*lhs)),
                    rhs: Box::new(literal(*rhs)),
                }
            }
            Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op,
                lhs: Box::new(self.qualify_literals(*lhs)),
                rhs: Box::new(self.qualify_literals(*rhs)),
            },
            Expr::Not(inner) => Expr::Not(Box::new(self.qualify_literals(*inner))),
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => Expr::Conditional {
                test: Box::new(self.qualify_literals(*test)),
                consequent,
                alternate,
            },
            other => other,
        }
    }

    fn evaluate(&self, expr: &Expr) -> Option<Value> {
        let qualified = self.qualify_literals(expr.clone());
        static_eval(&qualified, &|terms: &[String]| self.lookup(terms))
    }

    fn report_missing(&mut self, expr: &Expr) {
        let prefix = self.frame().prefix.clone();
        let missing: Vec<String> = expr
            .accessors()
            .into_iter()
            .filter(|terms| self.lookup(terms) == Some(Value::Null))
            .map(|terms| join(&prefix, terms))
            .collect();
        if missing.is_empty() {
            self.validations
                .push("a slow binding evaluated to undefined or null".to_string());
        }
        for path in missing {
            self.validations
                .push(format!("the slow data field [{}] is undefined or null", path));
        }
    }

    fn fail(&mut self, error: CompilerError) {
        self.error.get_or_insert(error);
    }

    /// Replaces slow bindings in interpolated text; others stay as written.
    /// Inlined values and literal runs are brace-escaped, so slow data never
    /// reads back as a binding.
    fn substitute(&mut self, text: &str) -> String {
        let parts = match split_braces(text) {
            Ok(parts) => parts,
            Err(e) => {
                self.fail(syntax_error(e, self.file));
                return text.to_string();
            }
        };
        let mut out = String::new();
        for (is_binding, body) in parts {
            if !is_binding {
                out.push_str(&escape_braces(&body));
                continue;
            }
            let expr = match parse_value(&body) {
                Ok(expr) => expr,
                Err(e) => {
                    self.fail(syntax_error(e, self.file));
                    out.push_str(&format!("{{{}}}", body));
                    continue;
                }
            };
            match self.evaluate(&expr) {
                Some(Value::Null) => {
                    self.report_missing(&expr);
                    out.push_str("undefined");
                }
                Some(value) => out.push_str(&escape_braces(&display_value(&value))),
                None => out.push_str(&format!("{{{}}}", body)),
            }
        }
        out
    }

    /// Decides a slow `if`; `None` keeps the element unchanged.
    fn slow_condition(&mut self, source: &str) -> Option<bool> {
        match parse_condition(source) {
            Ok(expr) => self.evaluate(&expr).map(|v| is_truthy(&v)),
            Err(e) => {
                self.fail(syntax_error(e, self.file));
                None
            }
        }
    }

    /// The nodes an element becomes: none, itself, or unrolled clones.
    fn render_element(&mut self, mut element: ElementNode) -> Vec<TemplateNode> {
        if let Some(source) = element.attr("forEach").map(str::to_string) {
            let terms: Vec<String> = source.trim().split('.').map(|t| t.trim().to_string()).collect();
            let path = join(&self.frame().prefix, &terms);
            if !self.is_slow(&path) {
                return vec![TemplateNode::Element(element)];
            }
            let items = match lookup_path(&self.frame().data, &terms) {
                Value::Array(items) => items,
                _ => {
                    self.validations
                        .push(format!("the slow data field [{}] is not an array", path));
                    return vec![];
                }
            };
            let track_by = element
                .remove_attr("trackBy")
                .or_else(|| self.track_by.get(&path).cloned())
                .unwrap_or_else(|| "id".to_string());
            element.remove_attr("forEach");
            debug!(target: "view_compiler::slow_render", path = %path, items = items.len(), "unrolling slow forEach");

            let mut clones = Vec::new();
            for (index, item) in items.into_iter().enumerate() {
                let mut clone = element.clone();
                clone.set_attr(SLOW_FOR_EACH, &source);
                clone.set_attr(SLOW_INDEX, &index.to_string());
                clone.set_attr(SLOW_TRACK_BY, &display_value(&lookup_path(&item, &[track_by.clone()])));
                self.frames.push(Frame {
                    data: item,
                    prefix: path.clone(),
                });
                clones.extend(self.render_in_scope(clone));
                self.frames.pop();
            }
            return clones;
        }
        self.render_in_scope(element)
    }

    fn render_in_scope(&mut self, mut element: ElementNode) -> Vec<TemplateNode> {
        if let Some(source) = element.attr("if").map(str::to_string) {
            match self.slow_condition(&source) {
                Some(false) => return vec![],
                Some(true) => {
                    element.remove_attr("if");
                }
                None => {}
            }
        }
        if element.has_attr("when-loading")
            || element.has_attr("when-resolved")
            || element.has_attr("when-rejected")
        {
            return vec![TemplateNode::Element(element)];
        }
        if !element.is_component() {
            let mut attributes = std::mem::take(&mut element.attributes);
            for attr in attributes.iter_mut() {
                if !DIRECTIVES.contains(&attr.name.as_str()) && attr.value.contains('{') {
                    attr.value = self.substitute(&attr.value);
                }
            }
            element.attributes = attributes;
        }
        walk_element(self, &mut element);
        vec![TemplateNode::Element(element)]
    }

    pub fn finish(self) -> Result<WithValidations<()>, CompilerError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(WithValidations::new((), self.validations)),
        }
    }
}

impl TemplateVisitor for SlowRenderer<'_> {
    fn visit_children(&mut self, children: &mut Vec<TemplateNode>) {
        let mut rendered = Vec::with_capacity(children.len());
        for node in std::mem::take(children) {
            match node {
                TemplateNode::Element(element) => rendered.extend(self.render_element(element)),
                TemplateNode::Text(text) => {
                    let value = if text.value.contains('{') {
                        self.substitute(&text.value)
                    } else {
                        text.value
                    };
                    rendered.push(TemplateNode::Text(TextNode { value }));
                }
            }
        }
        *children = rendered;
    }
}

/// Runs the transform over a template body.
pub fn slow_render_transform(
    mut template: ViewTemplate,
    contract: &Contract,
    slow_view_state: &Value,
) -> Result<WithValidations<ViewTemplate>, CompilerError> {
    let file = template.file_path.clone();
    let mut renderer = SlowRenderer::new(contract, slow_view_state, &file);
    renderer.visit_root(&mut template);
    let (_, validations) = renderer.finish()?.into_parts();
    Ok(WithValidations::new(template, validations))
}
