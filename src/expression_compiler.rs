//! Type-checks parsed bindings against a scope and emits target-neutral code
//! bodies written against the view-state parameter `vs`.

use crate::codegen::{js_string, template_literal_text};
use crate::expression::{
    parse_accessor, parse_class_expression, parse_condition, parse_import_names,
    parse_interpolation, BinaryOp, ClassPart, Expr, ExpressionError, ImportName, Literal,
    Segment,
};
use crate::scope::{resolve_accessor, Accessor, ScopeId, ScopeTree};
use crate::types::{EnumType, Type, TypeModel};
use crate::validate::{CompilerError, WithValidations, INV_EXPRESSION_SYNTAX};

/// Everything a binding is compiled against.
pub struct ExprContext<'a> {
    pub model: &'a TypeModel,
    pub scopes: &'a ScopeTree,
    pub scope: ScopeId,
    pub file: &'a str,
}

impl<'a> ExprContext<'a> {
    fn scope_type(&self) -> &Type {
        &self.scopes.get(self.scope).ty
    }
}

/// A compiled text, attribute, property or prop value.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledValue {
    /// Literal text, not yet quoted.
    Static(String),
    /// A JavaScript expression over `vs`.
    Dynamic(String),
}

impl CompiledValue {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, CompiledValue::Dynamic(_))
    }

    /// As a JavaScript expression: quoted literal or the dynamic body.
    pub fn to_js(&self) -> String {
        match self {
            CompiledValue::Static(text) => js_string(text),
            CompiledValue::Dynamic(code) => code.clone(),
        }
    }
}

pub fn syntax_error(error: ExpressionError, file: &str) -> CompilerError {
    CompilerError::with_details(
        INV_EXPRESSION_SYNTAX,
        &error.to_string(),
        file,
        Some(error.source.clone()),
        vec![],
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Conditional,
    Or,
    And,
    Comparison,
    Unary,
    Primary,
}

fn precedence(expr: &Expr) -> Precedence {
    match expr {
        Expr::Conditional { .. } => Precedence::Conditional,
        Expr::Binary { op: BinaryOp::Or, .. } => Precedence::Or,
        Expr::Binary { op: BinaryOp::And, .. } => Precedence::And,
        Expr::Binary { .. } => Precedence::Comparison,
        Expr::Not(_) => Precedence::Unary,
        Expr::Accessor(_) | Expr::Literal(_) => Precedence::Primary,
    }
}

struct Compiled {
    code: String,
    ty: Type,
}

fn wrap(code: String, inner: &Expr, min: Precedence) -> String {
    if precedence(inner) < min {
        format!("({})", code)
    } else {
        code
    }
}

fn literal_code(literal: &Literal) -> Compiled {
    match literal {
        Literal::Str(s) => Compiled {
            code: js_string(s),
            ty: Type::string(),
        },
        Literal::Number(n) => Compiled {
            code: format!("{}", n),
            ty: Type::number(),
        },
        Literal::Bool(b) => Compiled {
            code: b.to_string(),
            ty: Type::boolean(),
        },
        Literal::Null => Compiled {
            code: "null".to_string(),
            ty: Type::Unknown,
        },
    }
}

/// The bare name an enum comparison operand stands for, if it can be one.
fn enum_operand(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Accessor(terms) if terms.len() == 1 => Some(&terms[0]),
        Expr::Literal(Literal::Str(s)) => Some(s),
        _ => None,
    }
}

fn enum_literal(enum_type: &EnumType, literal: &str) -> WithValidations<String> {
    let code = format!("{}.{}", enum_type.name, literal);
    if enum_type.values.iter().any(|v| v == literal) {
        WithValidations::ok(code)
    } else {
        WithValidations::with_validation(
            code,
            format!(
                "[{}] is not a value of enum {} ({})",
                literal,
                enum_type.name,
                enum_type.values.join(" | ")
            ),
        )
    }
}

fn compile_expr(cx: &ExprContext, expr: &Expr) -> WithValidations<Compiled> {
    match expr {
        Expr::Accessor(terms) => resolve_accessor(cx.model, cx.scope_type(), terms).map(|a| {
            Compiled {
                code: a.render(),
                ty: a.ty,
            }
        }),
        Expr::Literal(literal) => WithValidations::ok(literal_code(literal)),
        Expr::Not(inner) => compile_expr(cx, inner).map(|c| Compiled {
            code: format!("!{}", wrap(c.code, inner, Precedence::Unary)),
            ty: Type::boolean(),
        }),
        Expr::Binary { op, lhs, rhs } => compile_binary(cx, *op, lhs, rhs),
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            let mut validations = vec![];
            let test_code = compile_expr(cx, test).collect_into(&mut validations);
            let then_code = compile_expr(cx, consequent).collect_into(&mut validations);
            let else_code = compile_expr(cx, alternate).collect_into(&mut validations);
            let ty = if then_code.ty == else_code.ty {
                then_code.ty.clone()
            } else {
                Type::Unknown
            };
            WithValidations::new(
                Compiled {
                    code: format!(
                        "{} ? {} : {}",
                        wrap(test_code.code, test, Precedence::Or),
                        wrap(then_code.code, consequent, Precedence::Or),
                        wrap(else_code.code, alternate, Precedence::Or)
                    ),
                    ty,
                },
                validations,
            )
        }
    }
}

/// The enum type `expr` resolves to, if it is an accessor of enum type.
fn enum_of(cx: &ExprContext, expr: &Expr) -> Option<EnumType> {
    let Expr::Accessor(terms) = expr else {
        return None;
    };
    let accessor = resolve_accessor(cx.model, cx.scope_type(), terms).val;
    match cx.model.resolve(&accessor.ty) {
        Type::Enum(e) => Some(e.clone()),
        _ => None,
    }
}

/// Whether `operand` is meant as a literal of `enum_type` rather than a field.
fn is_literal_of(cx: &ExprContext, enum_type: &EnumType, operand: &Expr) -> bool {
    match operand {
        Expr::Literal(Literal::Str(_)) => true,
        Expr::Accessor(terms) if terms.len() == 1 => {
            enum_type.values.contains(&terms[0])
                || !resolve_accessor(cx.model, cx.scope_type(), terms)
                    .validations
                    .is_empty()
        }
        _ => false,
    }
}

fn compile_binary(cx: &ExprContext, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> WithValidations<Compiled> {
    let mut validations = vec![];
    let min = match op {
        BinaryOp::Or => Precedence::Or,
        BinaryOp::And => Precedence::And,
        _ => Precedence::Unary,
    };
    let boolean = |code: String, validations| {
        WithValidations::new(
            Compiled {
                code,
                ty: Type::boolean(),
            },
            validations,
        )
    };

    if matches!(op, BinaryOp::Eq | BinaryOp::NotEq) {
        if let Some(enum_type) = enum_of(cx, lhs).filter(|e| is_literal_of(cx, e, rhs)) {
            let left = compile_expr(cx, lhs).collect_into(&mut validations);
            let literal = enum_operand(rhs).unwrap_or_default();
            let right = enum_literal(&enum_type, literal).collect_into(&mut validations);
            return boolean(format!("{} {} {}", left.code, op.js(), right), validations);
        }
        if let Some(enum_type) = enum_of(cx, rhs).filter(|e| is_literal_of(cx, e, lhs)) {
            let literal = enum_operand(lhs).unwrap_or_default();
            let left = enum_literal(&enum_type, literal).collect_into(&mut validations);
            let right = compile_expr(cx, rhs).collect_into(&mut validations);
            return boolean(format!("{} {} {}", left, op.js(), right.code), validations);
        }
    }

    let left = compile_expr(cx, lhs).collect_into(&mut validations);
    let right = compile_expr(cx, rhs).collect_into(&mut validations);
    boolean(
        format!(
            "{} {} {}",
            wrap(left.code, lhs, min),
            op.js(),
            wrap(right.code, rhs, min)
        ),
        validations,
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// START RULES
// ═══════════════════════════════════════════════════════════════════════════════

pub fn compile_accessor(cx: &ExprContext, source: &str) -> Result<WithValidations<Accessor>, CompilerError> {
    let terms = parse_accessor(source).map_err(|e| syntax_error(e, cx.file))?;
    Ok(resolve_accessor(cx.model, cx.scope_type(), &terms))
}

/// Condition body for `if`, e.g. `vs.count > 0 && !vs.done`.
pub fn compile_condition(cx: &ExprContext, source: &str) -> Result<WithValidations<String>, CompilerError> {
    let expr = parse_condition(source).map_err(|e| syntax_error(e, cx.file))?;
    Ok(compile_expr(cx, &expr).map(|c| c.code))
}

fn compile_segments(cx: &ExprContext, segments: &[Segment], keep_type: bool) -> WithValidations<CompiledValue> {
    let mut validations = vec![];
    if segments.iter().all(|s| matches!(s, Segment::Literal(_))) {
        let text: String = segments
            .iter()
            .map(|s| match s {
                Segment::Literal(text) => text.as_str(),
                Segment::Binding(_) => "",
            })
            .collect();
        return WithValidations::ok(CompiledValue::Static(text));
    }
    if let [Segment::Binding(expr)] = segments {
        let compiled = compile_expr(cx, expr).collect_into(&mut validations);
        let code = if keep_type || matches!(cx.model.resolve(&compiled.ty), Type::Atomic(_) | Type::Enum(_) | Type::Unknown) {
            compiled.code
        } else {
            format!("`${{{}}}`", compiled.code)
        };
        return WithValidations::new(CompiledValue::Dynamic(code), validations);
    }
    let mut literal = String::from("`");
    for segment in segments {
        match segment {
            Segment::Literal(text) => literal.push_str(&template_literal_text(text)),
            Segment::Binding(expr) => {
                let compiled = compile_expr(cx, expr).collect_into(&mut validations);
                literal.push_str(&format!("${{{}}}", compiled.code));
            }
        }
    }
    literal.push('`');
    WithValidations::new(CompiledValue::Dynamic(literal), validations)
}

/// Text content, attribute and property values.
pub fn compile_text(cx: &ExprContext, source: &str) -> Result<WithValidations<CompiledValue>, CompilerError> {
    let interpolation = parse_interpolation(source).map_err(|e| syntax_error(e, cx.file))?;
    Ok(compile_segments(cx, &interpolation.segments, false))
}

/// Component props keep the bound value's type when the value is a single binding.
pub fn compile_prop(cx: &ExprContext, source: &str) -> Result<WithValidations<CompiledValue>, CompilerError> {
    let interpolation = parse_interpolation(source).map_err(|e| syntax_error(e, cx.file))?;
    Ok(compile_segments(cx, &interpolation.segments, true))
}

pub fn compile_class(cx: &ExprContext, source: &str) -> Result<WithValidations<CompiledValue>, CompilerError> {
    let parts = parse_class_expression(source).map_err(|e| syntax_error(e, cx.file))?;
    let mut validations = vec![];
    if parts.iter().all(|p| matches!(p, ClassPart::Static(_))) {
        let classes: Vec<&str> = parts
            .iter()
            .filter_map(|p| match p {
                ClassPart::Static(name) => Some(name.as_str()),
                ClassPart::Conditional { .. } => None,
            })
            .collect();
        return Ok(WithValidations::ok(CompiledValue::Static(classes.join(" "))));
    }

    let mut pieces = Vec::new();
    for part in &parts {
        match part {
            ClassPart::Static(name) => pieces.push(template_literal_text(name)),
            ClassPart::Conditional { test, on, off } => {
                let compiled = compile_expr(cx, test).collect_into(&mut validations);
                pieces.push(format!(
                    "${{{} ? {} : {}}}",
                    wrap(compiled.code, test, Precedence::Or),
                    js_string(on),
                    js_string(off.as_deref().unwrap_or(""))
                ));
            }
        }
    }
    Ok(WithValidations::new(
        CompiledValue::Dynamic(format!("`{}`", pieces.join(" "))),
        validations,
    ))
}

pub fn compile_import_names(source: &str, file: &str) -> Result<Vec<ImportName>, CompilerError> {
    parse_import_names(source).map_err(|e| syntax_error(e, file))
}
