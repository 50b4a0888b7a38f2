//! Reference resolution: substitutes `{{ path }}` tokens against a context
//!
//! A token has the form `{{ <path>[<op><number>][: <default>] }}`. The path
//! is navigated through the context mapping; an optional trailing arithmetic
//! suffix is applied to numeric results; an optional default takes over when
//! navigation fails. A token that is the entire scalar substitutes without
//! stringifying, so non-string values survive resolution with their type
//! intact.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{XymlError, MAX_REFERENCE_DEPTH};
use crate::node::Node;
use crate::path::navigate;

use super::{scan_reference_tokens, whole_reference_token, Mode};

lazy_static! {
    // Greedy path group: the *last* operator followed by a trailing numeric
    // literal wins. Operator characters are not supported inside path
    // segments.
    static ref ARITHMETIC_SUFFIX: Regex =
        Regex::new(r"^(.*)([+\-*/])(\d+(?:\.\d+)?)$").expect("valid regex");
}

/// Resolves `{{ ... }}` reference tokens in a document tree
#[derive(Debug, Clone, Copy)]
pub struct ReferenceResolver {
    mode: Mode,
}

impl ReferenceResolver {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    /// Resolve all references in `node`, using the tree itself as the lookup
    /// context.
    pub fn resolve(&self, node: Node) -> Result<Node, XymlError> {
        let context = node.clone();
        self.resolve_with(node, &context)
    }

    /// Resolve all references in `node` against an explicit context mapping
    pub fn resolve_with(&self, node: Node, context: &Node) -> Result<Node, XymlError> {
        self.resolve_node(node, context, 0)
    }

    fn resolve_node(&self, node: Node, context: &Node, depth: usize) -> Result<Node, XymlError> {
        match node {
            Node::Mapping(map) => {
                let mut resolved = indexmap::IndexMap::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key, self.resolve_node(value, context, depth)?);
                }
                Ok(Node::Mapping(resolved))
            }
            Node::Sequence(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    let was_scalar = item.is_scalar();
                    match self.resolve_node(item, context, depth)? {
                        // A scalar that resolved to a sequence splices into
                        // the parent, so a reference inside a list can
                        // produce multiple sibling entries.
                        Node::Sequence(expansion) if was_scalar => resolved.extend(expansion),
                        other => resolved.push(other),
                    }
                }
                Ok(Node::Sequence(resolved))
            }
            Node::String(s) => self.resolve_scalar(&s, context, depth),
            other => Ok(other),
        }
    }

    fn resolve_scalar(&self, value: &str, context: &Node, depth: usize) -> Result<Node, XymlError> {
        if !value.contains("{{") {
            return Ok(Node::String(value.to_string()));
        }
        if depth > MAX_REFERENCE_DEPTH {
            return Err(XymlError::RecursiveReference {
                reference: value.to_string(),
            });
        }

        let tokens = scan_reference_tokens(value);
        if tokens.is_empty() {
            // A dangling `{{` with no balanced match is itself an unresolved
            // reference in strict mode.
            if self.mode.is_strict() {
                return Err(XymlError::ReferenceNotFound {
                    path: value.to_string(),
                    missing: value.to_string(),
                });
            }
            return Ok(Node::String(value.to_string()));
        }

        // Whole-scalar token: substitute without stringifying.
        if let Some(inner) = whole_reference_token(value) {
            return match self.resolve_token(inner, context)? {
                Some(resolved) => {
                    if resolved.as_str() == Some(value) {
                        // Resolved to itself, a direct self-reference
                        return Err(XymlError::RecursiveReference {
                            reference: value.to_string(),
                        });
                    }
                    // The substituted value may carry further references
                    self.resolve_node(resolved, context, depth + 1)
                }
                None => Ok(Node::String(value.to_string())),
            };
        }

        // Embedded tokens: splice stringified values into the host string.
        let mut output = String::with_capacity(value.len());
        let mut cursor = 0;
        let mut changed = false;
        for token in &tokens {
            output.push_str(&value[cursor..token.start]);
            match self.resolve_token(token.inner(value), context)? {
                Some(resolved) => {
                    output.push_str(&resolved.to_embedded_string());
                    changed = true;
                }
                None => output.push_str(token.text(value)),
            }
            cursor = token.end;
        }
        output.push_str(&value[cursor..]);

        if changed {
            // Substituted text may itself contain references
            self.resolve_scalar(&output, context, depth + 1)
        } else {
            Ok(Node::String(output))
        }
    }

    /// Resolve a single token's inner expression.
    ///
    /// `Ok(None)` means the token stays unresolved for a later pass (soft
    /// mode only; strict mode fails instead).
    fn resolve_token(&self, inner: &str, context: &Node) -> Result<Option<Node>, XymlError> {
        let expression = inner.trim();
        let (reference, default) = split_default(expression);
        let reference = reference.trim();

        // Loop directives embedded in scalars belong to the inline-loop
        // pass, never to reference resolution.
        if reference.starts_with("xyml.for") {
            if self.mode.is_strict() {
                return Err(XymlError::ReferenceNotFound {
                    path: expression.to_string(),
                    missing: reference.to_string(),
                });
            }
            return Ok(None);
        }

        let (path, arithmetic) = split_arithmetic(reference);
        match navigate(context, path, true) {
            Ok(resolved) => match arithmetic {
                Some((op, literal)) => Ok(Some(apply_arithmetic(resolved, op, literal, path)?)),
                None => Ok(Some(resolved)),
            },
            Err(failure) => {
                if let Some(default) = default {
                    return Ok(Some(Node::parse_scalar(default.trim())));
                }
                if self.mode.is_strict() {
                    return Err(XymlError::ReferenceNotFound {
                        path: path.to_string(),
                        missing: failure.missing,
                    });
                }
                Ok(None)
            }
        }
    }
}

/// Split `<reference>[: <default>]` at the first colon outside nested braces.
///
/// The default may itself contain a reference, so depth matters.
fn split_default(expression: &str) -> (&str, Option<&str>) {
    let bytes = expression.as_bytes();
    let mut depth = 0i32;
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => depth -= 1,
            b':' if depth == 0 => return (&expression[..i], Some(&expression[i + 1..])),
            _ => {}
        }
    }
    (expression, None)
}

/// Split an optional trailing arithmetic suffix `<op><numeric-literal>` off a
/// reference expression.
fn split_arithmetic(reference: &str) -> (&str, Option<(char, &str)>) {
    if let Some(caps) = ARITHMETIC_SUFFIX.captures(reference) {
        let path = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        if !path.is_empty() {
            let op = caps
                .get(2)
                .and_then(|m| m.as_str().chars().next())
                .unwrap_or('+');
            let literal = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
            return (path, Some((op, literal)));
        }
    }
    (reference, None)
}

enum Number {
    Int(i64),
    Float(f64),
}

fn as_number(node: &Node) -> Option<Number> {
    match node {
        Node::Int(i) => Some(Number::Int(*i)),
        Node::Float(f) => Some(Number::Float(*f)),
        // Numeric strings (environment variables, include parameters) count
        Node::String(s) => match Node::parse_scalar(s.trim()) {
            Node::Int(i) => Some(Number::Int(i)),
            Node::Float(f) => Some(Number::Float(f)),
            _ => None,
        },
        _ => None,
    }
}

fn apply_arithmetic(operand: Node, op: char, literal: &str, path: &str) -> Result<Node, XymlError> {
    let lhs = as_number(&operand).ok_or_else(|| {
        XymlError::Syntax(format!(
            "arithmetic '{}{}' applied to non-numeric value of '{}'",
            op, literal, path
        ))
    })?;
    let rhs = match Node::parse_scalar(literal) {
        Node::Int(i) => Number::Int(i),
        Node::Float(f) => Number::Float(f),
        _ => {
            return Err(XymlError::Syntax(format!(
                "invalid arithmetic literal '{}' in reference '{}'",
                literal, path
            )))
        }
    };

    // Integer arithmetic stays integral except for division
    if let (Number::Int(a), Number::Int(b)) = (&lhs, &rhs) {
        if op != '/' {
            let result = match op {
                '+' => a.checked_add(*b),
                '-' => a.checked_sub(*b),
                '*' => a.checked_mul(*b),
                _ => None,
            };
            if let Some(result) = result {
                return Ok(Node::Int(result));
            }
        }
    }

    let a = match lhs {
        Number::Int(i) => i as f64,
        Number::Float(f) => f,
    };
    let b = match rhs {
        Number::Int(i) => i as f64,
        Number::Float(f) => f,
    };
    let result = match op {
        '+' => a + b,
        '-' => a - b,
        '*' => a * b,
        '/' => a / b,
        _ => {
            return Err(XymlError::Syntax(format!(
                "unsupported arithmetic operator '{}' in reference '{}'",
                op, path
            )))
        }
    };
    Ok(Node::Float(result))
}
