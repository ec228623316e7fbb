#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// INVARIANT CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const INV_SINGLE_ROOT: &str = "VC001";
pub const INV_MISSING_DATA_BLOCK: &str = "VC002";
pub const INV_EXPRESSION_SYNTAX: &str = "VC003";
pub const INV_UNRESOLVED_RECURSION: &str = "VC004";
pub const INV_MALFORMED_RECURSIVE_PATH: &str = "VC005";
pub const INV_RECURSE_WITHOUT_ANCHOR: &str = "VC006";
pub const INV_UNGUARDED_RECURSION: &str = "VC007";
pub const INV_CONTRACT_FORMAT: &str = "VC008";
pub const INV_TEMPLATE_PARSE: &str = "VC010";

// ═══════════════════════════════════════════════════════════════════════════════
// GUARANTEES
// ═══════════════════════════════════════════════════════════════════════════════

fn get_guarantee(code: &str) -> &'static str {
    match code {
        INV_SINGLE_ROOT => "Every template body renders exactly one root element.",
        INV_MISSING_DATA_BLOCK => {
            "Every template declares its view state, inline or through a contract."
        }
        INV_EXPRESSION_SYNTAX => "Every binding compiles to a typed accessor or condition.",
        INV_UNRESOLVED_RECURSION => {
            "Recursive types always point at an object reachable from the root."
        }
        INV_MALFORMED_RECURSIVE_PATH => "Recursive references start with the `$/` marker.",
        INV_RECURSE_WITHOUT_ANCHOR => {
            "A <recurse> marker always re-enters an enclosing ref-anchored region."
        }
        INV_UNGUARDED_RECURSION => {
            "Recursion always terminates through a loop, conditional or async guard."
        }
        INV_CONTRACT_FORMAT => "Contracts are well-formed documents with a name.",
        INV_TEMPLATE_PARSE => "Templates are parseable markup documents.",
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// A structurally fatal problem. Compilation of the affected module stops and
/// no code is returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct CompilerError {
    pub code: String,
    pub error_type: String,
    pub message: String,
    pub guarantee: String,
    pub file: String,
    pub context: Option<String>,
    pub hints: Vec<String>,
}

impl CompilerError {
    pub fn new(code: &str, message: &str, file: &str) -> Self {
        Self::with_details(code, message, file, None, vec![])
    }

    pub fn with_details(
        code: &str,
        message: &str,
        file: &str,
        context: Option<String>,
        hints: Vec<String>,
    ) -> Self {
        CompilerError {
            code: code.to_string(),
            error_type: "COMPILER_INVARIANT_VIOLATION".to_string(),
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            file: file.to_string(),
            context,
            hints,
        }
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if !self.file.is_empty() {
            write!(f, " ({})", self.file)?;
        }
        if let Some(context) = &self.context {
            write!(f, "\n  context: {}", context)?;
        }
        for hint in &self.hints {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompilerError {}

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Non-fatal problems, reported together with whatever output could be produced.
pub type Validations = Vec<String>;

/// A value paired with the validations raised while producing it.
///
/// Sub-computations return these pairs and callers concatenate the lists, so a
/// single compilation reports every independent problem.
#[derive(Debug, Clone, PartialEq)]
pub struct WithValidations<T> {
    pub val: T,
    pub validations: Validations,
}

impl<T> WithValidations<T> {
    pub fn new(val: T, validations: Validations) -> Self {
        Self { val, validations }
    }

    pub fn ok(val: T) -> Self {
        Self::new(val, vec![])
    }

    pub fn with_validation(val: T, message: impl Into<String>) -> Self {
        Self::new(val, vec![message.into()])
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WithValidations<U> {
        WithValidations::new(f(self.val), self.validations)
    }

    /// Chains a computation, concatenating both validation lists in order.
    pub fn then<U>(self, f: impl FnOnce(T) -> WithValidations<U>) -> WithValidations<U> {
        let WithValidations { val, mut validations } = self;
        let next = f(val);
        validations.extend(next.validations);
        WithValidations::new(next.val, validations)
    }

    /// Moves this value's validations into `sink` and returns the value.
    pub fn collect_into(self, sink: &mut Validations) -> T {
        sink.extend(self.validations);
        self.val
    }

    pub fn into_parts(self) -> (T, Validations) {
        (self.val, self.validations)
    }
}

impl<T> FromIterator<WithValidations<T>> for WithValidations<Vec<T>> {
    fn from_iter<I: IntoIterator<Item = WithValidations<T>>>(iter: I) -> Self {
        let mut values = Vec::new();
        let mut validations = Vec::new();
        for item in iter {
            values.push(item.collect_into(&mut validations));
        }
        WithValidations::new(values, validations)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE IR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TemplateNode {
    Element(ElementNode),
    Text(TextNode),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    pub tag: String,
    pub attributes: Vec<AttributeIR>,
    pub children: Vec<TemplateNode>,
}

impl ElementNode {
    pub fn new(tag: &str) -> Self {
        ElementNode {
            tag: tag.to_string(),
            attributes: vec![],
            children: vec![],
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value.to_string(),
            None => self.attributes.push(AttributeIR {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self.attributes.iter().position(|a| a.name == name)?;
        Some(self.attributes.remove(index).value)
    }

    /// Component tags keep their source casing and start with an uppercase letter.
    pub fn is_component(&self) -> bool {
        self.tag
            .chars()
            .next()
            .map(|c| c.is_ascii_uppercase())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextNode {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttributeIR {
    pub name: String,
    pub value: String,
}

/// Where the template's root view state comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DataSource {
    Inline { data: serde_json::Value },
    Contract { link: String },
}

/// `<link rel="import" href names [sandbox]>`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportLink {
    pub module: String,
    pub names: String,
    pub sandbox: bool,
}

/// `<link rel="headless" href key>`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeadlessImport {
    pub contract: String,
    pub key: String,
}

/// Any other head `<link>`, injected verbatim at render time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeadLink {
    pub rel: String,
    pub href: String,
    pub attributes: Vec<AttributeIR>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewTemplate {
    pub file_path: String,
    pub data: Option<DataSource>,
    pub imports: Vec<ImportLink>,
    pub headless: Vec<HeadlessImport>,
    pub head_links: Vec<HeadLink>,
    pub body: Vec<TemplateNode>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRUCTURAL CHECKS (fatal)
// ═══════════════════════════════════════════════════════════════════════════════

pub fn validate_single_root(template: &ViewTemplate) -> Result<&ElementNode, CompilerError> {
    let elements: Vec<&ElementNode> = template
        .body
        .iter()
        .filter_map(|node| match node {
            TemplateNode::Element(el) => Some(el),
            TemplateNode::Text(_) => None,
        })
        .collect();
    let stray_text = template
        .body
        .iter()
        .any(|node| matches!(node, TemplateNode::Text(t) if !t.value.trim().is_empty()));

    match elements.as_slice() {
        [root] if !stray_text => Ok(root),
        [] => Err(CompilerError::new(
            INV_SINGLE_ROOT,
            "Template body has no root element",
            &template.file_path,
        )),
        _ => Err(CompilerError::with_details(
            INV_SINGLE_ROOT,
            &format!(
                "Template body must have exactly one root element, found {}",
                elements.len()
            ),
            &template.file_path,
            None,
            vec!["Wrap the body content in a single element".to_string()],
        )),
    }
}

pub fn require_data_source(template: &ViewTemplate) -> Result<&DataSource, CompilerError> {
    template.data.as_ref().ok_or_else(|| {
        CompilerError::with_details(
            INV_MISSING_DATA_BLOCK,
            "Template has no view-data block",
            &template.file_path,
            None,
            vec![
                "Add <script type=\"application/view-data\">{ ... }</script> to the head"
                    .to_string(),
                "or reference a contract with <script type=\"application/view-data\" contract=\"./x.contract.json\"></script>"
                    .to_string(),
            ],
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn then_concatenates_validations_in_order() {
        let first = WithValidations::with_validation(1, "first");
        let chained = first.then(|v| WithValidations::with_validation(v + 1, "second"));
        assert_eq!(chained.val, 2);
        assert_eq!(chained.validations, vec!["first", "second"]);
    }

    #[test]
    fn collect_from_iterator() {
        let all: WithValidations<Vec<i32>> = vec![
            WithValidations::ok(1),
            WithValidations::with_validation(2, "two"),
        ]
        .into_iter()
        .collect();
        assert_eq!(all.val, vec![1, 2]);
        assert_eq!(all.validations.len(), 1);
    }

    #[test]
    fn error_carries_guarantee() {
        let err = CompilerError::new(INV_UNGUARDED_RECURSION, "boom", "a.view.html");
        assert!(err.guarantee.contains("terminates"));
        assert!(err.to_string().contains("VC007"));
    }
}
