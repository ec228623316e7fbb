//! Binding expression grammar.
//!
//! One lexer and a recursive-descent parser with several start rules:
//! accessors, conditions, interpolated text/attributes/props, class
//! expressions, import-name lists and enum literals. Parsing is untyped; the
//! expression compiler resolves accessors against a scope afterwards.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Number(f64),
    Str(String),
    Dot,
    Bang,
    AndAnd,
    OrOr,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    Question,
    Colon,
    Comma,
    Pipe,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Identifier(name) => write!(f, "identifier `{}`", name),
            TokenKind::Number(n) => write!(f, "number `{}`", n),
            TokenKind::Str(s) => write!(f, "string '{}'", s),
            TokenKind::Dot => write!(f, "`.`"),
            TokenKind::Bang => write!(f, "`!`"),
            TokenKind::AndAnd => write!(f, "`&&`"),
            TokenKind::OrOr => write!(f, "`||`"),
            TokenKind::EqEq => write!(f, "`==`"),
            TokenKind::NotEq => write!(f, "`!=`"),
            TokenKind::Lt => write!(f, "`<`"),
            TokenKind::Le => write!(f, "`<=`"),
            TokenKind::Gt => write!(f, "`>`"),
            TokenKind::Ge => write!(f, "`>=`"),
            TokenKind::LParen => write!(f, "`(`"),
            TokenKind::RParen => write!(f, "`)`"),
            TokenKind::Question => write!(f, "`?`"),
            TokenKind::Colon => write!(f, "`:`"),
            TokenKind::Comma => write!(f, "`,`"),
            TokenKind::Pipe => write!(f, "`|`"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionError {
    pub source: String,
    pub index: usize,
    pub message: String,
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to parse expression [{}]: {} at offset {}",
            self.source, self.message, self.index
        )
    }
}

impl std::error::Error for ExpressionError {}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let error = |index: usize, message: String| ExpressionError {
        source: source.to_string(),
        index,
        message,
    };

    while i < chars.len() {
        let (index, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let (kind, width) = match (c, next) {
            ('&', Some('&')) => (TokenKind::AndAnd, 2),
            ('|', Some('|')) => (TokenKind::OrOr, 2),
            ('|', _) => (TokenKind::Pipe, 1),
            ('=', Some('=')) => {
                // `===` is accepted as an alias of `==`
                let width = if chars.get(i + 2).map(|(_, c)| *c) == Some('=') { 3 } else { 2 };
                (TokenKind::EqEq, width)
            }
            ('!', Some('=')) => {
                let width = if chars.get(i + 2).map(|(_, c)| *c) == Some('=') { 3 } else { 2 };
                (TokenKind::NotEq, width)
            }
            ('!', _) => (TokenKind::Bang, 1),
            ('<', Some('=')) => (TokenKind::Le, 2),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', Some('=')) => (TokenKind::Ge, 2),
            ('>', _) => (TokenKind::Gt, 1),
            ('.', _) => (TokenKind::Dot, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('?', _) => (TokenKind::Question, 1),
            (':', _) => (TokenKind::Colon, 1),
            (',', _) => (TokenKind::Comma, 1),
            ('\'', _) | ('"', _) => {
                let quote = c;
                let mut value = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < chars.len() {
                    let (_, ch) = chars[j];
                    if ch == '\\' && j + 1 < chars.len() {
                        value.push(chars[j + 1].1);
                        j += 2;
                        continue;
                    }
                    if ch == quote {
                        closed = true;
                        break;
                    }
                    value.push(ch);
                    j += 1;
                }
                if !closed {
                    return Err(error(index, "unterminated string literal".to_string()));
                }
                tokens.push(Token {
                    kind: TokenKind::Str(value),
                    index,
                });
                i = j + 1;
                continue;
            }
            (c, _) if c.is_ascii_digit() => {
                let mut j = i;
                while j < chars.len() && (chars[j].1.is_ascii_digit() || chars[j].1 == '.') {
                    j += 1;
                }
                let end = chars.get(j).map(|(idx, _)| *idx).unwrap_or(source.len());
                let text = &source[index..end];
                let value = text
                    .parse::<f64>()
                    .map_err(|_| error(index, format!("invalid number `{}`", text)))?;
                tokens.push(Token {
                    kind: TokenKind::Number(value),
                    index,
                });
                i = j;
                continue;
            }
            (c, _) if is_ident_start(c) => {
                let mut j = i;
                while j < chars.len() && is_ident_part(chars[j].1) {
                    j += 1;
                }
                let end = chars.get(j).map(|(idx, _)| *idx).unwrap_or(source.len());
                tokens.push(Token {
                    kind: TokenKind::Identifier(source[index..end].to_string()),
                    index,
                });
                i = j;
                continue;
            }
            ('-', _) => {
                return Err(error(
                    index,
                    "unexpected character `-`, hyphenated fields are camel-cased".to_string(),
                ))
            }
            (c, _) => return Err(error(index, format!("unexpected character `{}`", c))),
        };

        tokens.push(Token { kind, index });
        i += width;
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        index: source.len(),
    });
    Ok(tokens)
}

// ═══════════════════════════════════════════════════════════════════════════════
// AST
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Number(f64),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn js(&self) -> &'static str {
        match self {
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Eq => "===",
            BinaryOp::NotEq => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Dotted path; empty is the scope itself (`.`).
    Accessor(Vec<String>),
    Literal(Literal),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
}

impl Expr {
    /// Every accessor path the expression reads.
    pub fn accessors(&self) -> Vec<&[String]> {
        let mut out = Vec::new();
        self.collect_accessors(&mut out);
        out
    }

    fn collect_accessors<'a>(&'a self, out: &mut Vec<&'a [String]>) {
        match self {
            Expr::Accessor(terms) => out.push(terms),
            Expr::Literal(_) => {}
            Expr::Not(inner) => inner.collect_accessors(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_accessors(out);
                rhs.collect_accessors(out);
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                test.collect_accessors(out);
                consequent.collect_accessors(out);
                alternate.collect_accessors(out);
            }
        }
    }
}

/// A piece of interpolated text: literal text or a `{...}` binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Binding(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interpolation {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassPart {
    Static(String),
    Conditional {
        test: Expr,
        on: String,
        off: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportName {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportName {
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER
// ═══════════════════════════════════════════════════════════════════════════════

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str) -> Result<Self, ExpressionError> {
        Ok(Parser {
            source,
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn index(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].index
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: String) -> ExpressionError {
        ExpressionError {
            source: self.source.to_string(),
            index: self.index(),
            message,
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ExpressionError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", kind, self.peek())))
        }
    }

    fn expect_end(&mut self) -> Result<(), ExpressionError> {
        match self.peek() {
            TokenKind::Eof => Ok(()),
            other => Err(self.error(format!("unexpected {}", other))),
        }
    }

    fn identifier(&mut self) -> Result<String, ExpressionError> {
        match self.peek().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier, found {}", other))),
        }
    }

    fn accessor(&mut self) -> Result<Vec<String>, ExpressionError> {
        if self.eat(&TokenKind::Dot) {
            return Ok(vec![]);
        }
        let mut terms = vec![self.identifier()?];
        while self.eat(&TokenKind::Dot) {
            terms.push(self.identifier()?);
        }
        Ok(terms)
    }

    // value := conditional
    fn value(&mut self) -> Result<Expr, ExpressionError> {
        let test = self.or()?;
        if self.eat(&TokenKind::Question) {
            let consequent = self.or()?;
            let alternate = if self.eat(&TokenKind::Colon) {
                self.or()?
            } else {
                Expr::Literal(Literal::Str(String::new()))
            };
            return Ok(Expr::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            });
        }
        Ok(test)
    }

    fn or(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.and()?;
        while self.eat(&TokenKind::OrOr) {
            let rhs = self.and()?;
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.comparison()?;
        while self.eat(&TokenKind::AndAnd) {
            let rhs = self.comparison()?;
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr, ExpressionError> {
        let lhs = self.unary()?;
        let op = match self.peek() {
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::NotEq,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.unary()?;
        Ok(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&TokenKind::Bang) {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek().clone() {
            TokenKind::LParen => {
                self.advance();
                let inner = self.value()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Number(n)))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::Str(s)))
            }
            TokenKind::Identifier(name) if name == "true" || name == "false" => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(name == "true")))
            }
            TokenKind::Identifier(name) if name == "null" => {
                self.advance();
                Ok(Expr::Literal(Literal::Null))
            }
            TokenKind::Identifier(_) | TokenKind::Dot => Ok(Expr::Accessor(self.accessor()?)),
            other => Err(self.error(format!("unexpected {}", other))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// START RULES
// ═══════════════════════════════════════════════════════════════════════════════

/// `a.b.c` or `.`
pub fn parse_accessor(source: &str) -> Result<Vec<String>, ExpressionError> {
    let mut parser = Parser::new(source)?;
    let terms = parser.accessor()?;
    parser.expect_end()?;
    Ok(terms)
}

/// Boolean condition: `!`, `&&` (binds tighter than `||`), comparisons, parens.
pub fn parse_condition(source: &str) -> Result<Expr, ExpressionError> {
    let mut parser = Parser::new(source)?;
    let expr = parser.or()?;
    parser.expect_end()?;
    Ok(expr)
}

/// A single binding value, optionally `cond ? a : b`.
pub fn parse_value(source: &str) -> Result<Expr, ExpressionError> {
    let mut parser = Parser::new(source)?;
    let expr = parser.value()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Collapses whitespace runs (line breaks included) to single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

/// Characters a backslash escapes in literal text.
const ESCAPABLE: [char; 3] = ['\\', '{', '}'];

/// Escapes literal text so [`split_braces`] reads it back unchanged and never
/// as a binding.
pub fn escape_braces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if ESCAPABLE.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Splits text into literal runs and `{...}` bodies. `\{`, `\}` and `\\` are
/// literal characters.
pub fn split_braces(source: &str) -> Result<Vec<(bool, String)>, ExpressionError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = source.char_indices().peekable();

    while let Some((index, c)) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(&(_, next)) if ESCAPABLE.contains(&next) => {
                    literal.push(next);
                    chars.next();
                }
                _ => literal.push(c),
            },
            '{' => {
                if !literal.is_empty() {
                    parts.push((false, std::mem::take(&mut literal)));
                }
                let mut body = String::new();
                let mut quote: Option<char> = None;
                let mut closed = false;
                for (_, ch) in chars.by_ref() {
                    match (quote, ch) {
                        (Some(q), ch) if ch == q => {
                            quote = None;
                            body.push(ch);
                        }
                        (Some(_), ch) => body.push(ch),
                        (None, '\'') | (None, '"') => {
                            quote = Some(ch);
                            body.push(ch);
                        }
                        (None, '}') => {
                            closed = true;
                            break;
                        }
                        (None, ch) => body.push(ch),
                    }
                }
                if !closed {
                    return Err(ExpressionError {
                        source: source.to_string(),
                        index,
                        message: "unterminated `{`".to_string(),
                    });
                }
                parts.push((true, body));
            }
            '}' => {
                return Err(ExpressionError {
                    source: source.to_string(),
                    index,
                    message: "unexpected `}`".to_string(),
                })
            }
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        parts.push((false, literal));
    }
    Ok(parts)
}

/// Text, attribute, property and component-prop values: literal text with
/// `{value}` bindings. Literal whitespace is collapsed.
pub fn parse_interpolation(source: &str) -> Result<Interpolation, ExpressionError> {
    let mut segments = Vec::new();
    for (is_binding, text) in split_braces(source)? {
        if is_binding {
            let expr = parse_value(&text).map_err(|e| ExpressionError {
                source: source.to_string(),
                index: e.index,
                message: e.message,
            })?;
            segments.push(Segment::Binding(expr));
        } else {
            segments.push(Segment::Literal(collapse_whitespace(&text)));
        }
    }
    Ok(Interpolation { segments })
}

/// `a b {cond ? on : off} {cond ? on}`
pub fn parse_class_expression(source: &str) -> Result<Vec<ClassPart>, ExpressionError> {
    let mut parts = Vec::new();
    for (is_binding, text) in split_braces(source)? {
        if !is_binding {
            parts.extend(text.split_whitespace().map(|c| ClassPart::Static(c.to_string())));
            continue;
        }
        let (test, rest) = text.split_once('?').ok_or_else(|| ExpressionError {
            source: source.to_string(),
            index: 0,
            message: format!("class binding [{}] must have the form `cond ? class`", text),
        })?;
        let (on, off) = match rest.split_once(':') {
            Some((on, off)) => (on.trim(), Some(off.trim())),
            None => (rest.trim(), None),
        };
        if on.is_empty() {
            return Err(ExpressionError {
                source: source.to_string(),
                index: 0,
                message: format!("class binding [{}] has no class name", text),
            });
        }
        parts.push(ClassPart::Conditional {
            test: parse_condition(test)?,
            on: on.to_string(),
            off: off.filter(|s| !s.is_empty()).map(|s| s.to_string()),
        });
    }
    Ok(parts)
}

/// `Counter, Item as TodoItem`
pub fn parse_import_names(source: &str) -> Result<Vec<ImportName>, ExpressionError> {
    let mut parser = Parser::new(source)?;
    let mut names = Vec::new();
    loop {
        let name = parser.identifier()?;
        let alias = match parser.peek().clone() {
            TokenKind::Identifier(kw) if kw == "as" => {
                parser.advance();
                Some(parser.identifier()?)
            }
            _ => None,
        };
        names.push(ImportName { name, alias });
        if !parser.eat(&TokenKind::Comma) {
            break;
        }
    }
    parser.expect_end()?;
    Ok(names)
}

/// `enum (active | done)`
pub fn parse_enum_literal(source: &str) -> Result<Vec<String>, ExpressionError> {
    let mut parser = Parser::new(source)?;
    match parser.peek().clone() {
        TokenKind::Identifier(kw) if kw == "enum" => {
            parser.advance();
        }
        other => return Err(parser.error(format!("expected `enum`, found {}", other))),
    }
    parser.expect(TokenKind::LParen)?;
    let mut values = vec![parser.identifier()?];
    while parser.eat(&TokenKind::Pipe) {
        values.push(parser.identifier()?);
    }
    parser.expect(TokenKind::RParen)?;
    parser.expect_end()?;
    Ok(values)
}

pub fn is_enum_literal(source: &str) -> bool {
    source.trim_start().starts_with("enum")
        && source.trim_start()[4..].trim_start().starts_with('(')
}
