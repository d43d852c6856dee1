//! Zone scope rules.
//!
//! Zones accept a scope either as a rules string such as
//! `organization in ("o1") and account in ("a1")` or as structured
//! expressions. The backend may rewrite one form into the other, so both
//! are parsed into [`ZoneExpression`]s to decide whether they are equivalent.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// One `field operator value(s)` term of a zone scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneExpression {
    /// Scoped field, e.g. `account` or `organization`.
    pub field: String,
    /// `in`, `notIn`, `=`, `!=`, `contains` or `startsWith`.
    pub operator: String,
    /// Operand of single-value operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Operands of `in` / `notIn`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Operators understood in rules strings.
pub const OPERATORS: &[&str] = &["in", "notIn", "=", "!=", "contains", "startsWith"];

impl ZoneExpression {
    fn is_multi(&self) -> bool {
        matches!(self.operator.as_str(), "in" | "notIn")
    }

    /// Sort multi-value operands so equal expressions compare equal.
    fn normalized(mut self) -> Self {
        if self.is_multi() {
            if let Some(value) = self.value.take() {
                self.values.push(value);
            }
            self.values.sort();
            self.values.dedup();
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Op(String),
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ProviderError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            },
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            },
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            },
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            },
            '=' => {
                chars.next();
                tokens.push(Token::Op("=".into()));
            },
            '!' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err(rules_error(input, "expected '=' after '!'"));
                }
                tokens.push(Token::Op("!=".into()));
            },
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(escaped) => s.push(escaped),
                            None => return Err(rules_error(input, "unterminated string")),
                        },
                        Some(ch) if ch == quote => break,
                        Some(ch) => s.push(ch),
                        None => return Err(rules_error(input, "unterminated string")),
                    }
                }
                tokens.push(Token::Str(s));
            },
            c if is_ident_char(c) => {
                let mut s = String::new();
                while let Some(&ch) = chars.peek() {
                    if !is_ident_char(ch) {
                        break;
                    }
                    s.push(ch);
                    chars.next();
                }
                tokens.push(Token::Ident(s));
            },
            other => {
                return Err(rules_error(input, &format!("unexpected character '{}'", other)));
            },
        }
    }
    Ok(tokens)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '/' | '-' | ':')
}

fn rules_error(input: &str, reason: &str) -> ProviderError {
    ProviderError::Validation(format!("invalid zone rules {:?}: {}", input, reason))
}

/// Parse a rules string into expressions.
///
/// An empty string yields no expressions.
pub fn parse_rules(input: &str) -> Result<Vec<ZoneExpression>, ProviderError> {
    let tokens = tokenize(input)?;
    let mut pos = 0;
    let mut expressions = Vec::new();

    if tokens.is_empty() {
        return Ok(expressions);
    }

    loop {
        let field = match tokens.get(pos) {
            Some(Token::Ident(field)) => field.clone(),
            _ => return Err(rules_error(input, "expected field name")),
        };
        pos += 1;

        let operator = match tokens.get(pos) {
            Some(Token::Op(op)) => op.clone(),
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("not") => {
                match tokens.get(pos + 1) {
                    Some(Token::Ident(next)) if next.eq_ignore_ascii_case("in") => {
                        pos += 1;
                        "notIn".to_string()
                    },
                    _ => return Err(rules_error(input, "expected 'in' after 'not'")),
                }
            },
            Some(Token::Ident(word)) => match OPERATORS.iter().find(|op| op.eq_ignore_ascii_case(word)) {
                Some(op) => op.to_string(),
                None => return Err(rules_error(input, &format!("unknown operator '{}'", word))),
            },
            _ => return Err(rules_error(input, "expected operator")),
        };
        pos += 1;

        let mut expression = ZoneExpression {
            field,
            operator,
            value: None,
            values: Vec::new(),
        };

        match tokens.get(pos) {
            Some(Token::LParen) => {
                pos += 1;
                loop {
                    match tokens.get(pos) {
                        Some(Token::Str(s)) | Some(Token::Ident(s)) => expression.values.push(s.clone()),
                        Some(Token::RParen) if expression.values.is_empty() => break,
                        _ => return Err(rules_error(input, "expected value")),
                    }
                    pos += 1;
                    match tokens.get(pos) {
                        Some(Token::Comma) => pos += 1,
                        Some(Token::RParen) => break,
                        _ => return Err(rules_error(input, "expected ',' or ')'")),
                    }
                }
                pos += 1;
            },
            Some(Token::Str(s)) => {
                expression.value = Some(s.clone());
                pos += 1;
            },
            _ => return Err(rules_error(input, "expected value")),
        }

        if !expression.is_multi() && expression.value.is_none() {
            // `field = ("x")` is accepted for a single operand.
            if expression.values.len() == 1 {
                expression.value = expression.values.pop();
            } else {
                return Err(rules_error(
                    input,
                    &format!("operator '{}' takes a single value", expression.operator),
                ));
            }
        }
        expressions.push(expression);

        match tokens.get(pos) {
            None => break,
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("and") => pos += 1,
            _ => return Err(rules_error(input, "expected 'and'")),
        }
    }

    Ok(expressions)
}

/// Render expressions back into a rules string.
pub fn render_rules(expressions: &[ZoneExpression]) -> String {
    expressions
        .iter()
        .map(|e| {
            if e.is_multi() {
                let mut values: Vec<String> = e.values.iter().map(|v| quote(v)).collect();
                if let Some(value) = &e.value {
                    values.push(quote(value));
                }
                format!("{} {} ({})", e.field, e.operator, values.join(", "))
            } else {
                let value = e.value.as_deref().or(e.values.first().map(String::as_str));
                format!("{} {} {}", e.field, e.operator, quote(value.unwrap_or_default()))
            }
        })
        .collect::<Vec<_>>()
        .join(" and ")
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn canonical(mut expressions: Vec<ZoneExpression>) -> Vec<ZoneExpression> {
    expressions = expressions.into_iter().map(ZoneExpression::normalized).collect();
    expressions.sort_by(|a, b| {
        (&a.field, &a.operator, &a.value, &a.values).cmp(&(&b.field, &b.operator, &b.value, &b.values))
    });
    expressions
}

/// Whether a rules string describes the same scope as `expressions`.
///
/// Term order and operand order are not significant. An unparsable rules
/// string is never equivalent.
pub fn rules_equivalent(rules: &str, expressions: &[ZoneExpression]) -> bool {
    match parse_rules(rules) {
        Ok(parsed) => canonical(parsed) == canonical(expressions.to_vec()),
        Err(_) => false,
    }
}
