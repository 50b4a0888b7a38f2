//! Resolution passes for the extended-YAML directive families
//!
//! Three resolvers rewrite a [`Node`](crate::node::Node) tree until no
//! directive keys or `{{ }}` reference tokens remain: the include resolver
//! pulls in external fragments, the loop resolver expands `xyml.for`
//! directives, and the reference resolver substitutes `{{ path }}` tokens.
//! All three share the brace-balanced token scanner defined here.

mod include;
mod loops;
mod reference;

pub use include::IncludeResolver;
pub use loops::{InlineLoopResolver, LoopResolver};
pub use reference::ReferenceResolver;

/// Whether an unresolved reference aborts the pass or is left in place for a
/// later pass.
///
/// The orchestrator decides which passes run in which mode; resolvers never
/// make this choice per token (explicit per-token defaults aside).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Unresolved references are fatal
    Strict,
    /// Unresolved references are left untouched for a later pass
    Soft,
}

impl Mode {
    pub fn is_strict(self) -> bool {
        matches!(self, Mode::Strict)
    }
}

/// Byte range of a `{{ ... }}` token inside a scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReferenceToken {
    pub start: usize,
    pub end: usize,
}

impl ReferenceToken {
    /// The token text including the surrounding braces
    pub fn text<'a>(&self, value: &'a str) -> &'a str {
        &value[self.start..self.end]
    }

    /// The token content with the enclosing brace pair stripped
    pub fn inner<'a>(&self, value: &'a str) -> &'a str {
        let text = self.text(value);
        // A balanced token normally ends in "}}"; pathological but balanced
        // inputs may close with a lone brace.
        text.strip_prefix("{{")
            .map(|t| t.strip_suffix("}}").unwrap_or(&t[..t.len() - 1]))
            .unwrap_or(text)
    }
}

/// Scan a scalar for balanced `{{ ... }}` tokens.
///
/// Scanning tracks brace depth explicitly instead of pattern matching,
/// because a default value may itself contain a nested reference
/// (`{{ a : {{ b }} }}`). An unbalanced trailing `{{` yields no token.
pub(crate) fn scan_reference_tokens(value: &str) -> Vec<ReferenceToken> {
    let bytes = value.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'{' {
            let mut depth = 0i32;
            let mut end = None;
            let mut j = i;
            while j < bytes.len() {
                match bytes[j] {
                    b'{' => depth += 1,
                    b'}' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(j + 1);
                            break;
                        }
                    }
                    _ => {}
                }
                j += 1;
            }
            match end {
                Some(end) => {
                    tokens.push(ReferenceToken { start: i, end });
                    i = end;
                }
                // Unbalanced remainder, nothing more to find
                None => break,
            }
        } else {
            i += 1;
        }
    }
    tokens
}

/// If the trimmed scalar is exactly one reference token, return its inner
/// content.
pub(crate) fn whole_reference_token(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    let tokens = scan_reference_tokens(trimmed);
    match tokens.as_slice() {
        [tok] if tok.start == 0 && tok.end == trimmed.len() => Some(tok.inner(trimmed)),
        _ => None,
    }
}
