//! Loop expansion: repeats a template body once per item of a collection
//!
//! A mapping containing `xyml.for` is a loop site. The directive value is a
//! comma-separated list of `iterator:collectionRef` pairs; with more than one
//! pair the expansion is the Cartesian product in outer-major order (the
//! first-listed iterator varies slowest). The body is either the sibling
//! `xyml.content` value (flat form, no other siblings allowed) or the
//! directive mapping itself minus `xyml.for`.
//!
//! Scalars may also embed inline loops of the form
//! `{{ xyml.for:<iterator>:<collection>: <content> }}`, expanded by a
//! separate pass into the surrounding string.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::XymlError;
use crate::node::Node;
use crate::path::navigate;

use super::{scan_reference_tokens, Mode, ReferenceResolver};

/// Reserved mapping key that marks a loop site
pub const LOOP_KEY: &str = "xyml.for";
/// Reserved mapping key selecting the flat-loop body
pub const LOOP_CONTENT_KEY: &str = "xyml.content";

lazy_static! {
    static ref LOOP_PAIR: Regex = Regex::new(r"^([^:\s]+)\s*:\s*(\S+)$").expect("valid regex");
}

/// Resolves `xyml.for` block directives
pub struct LoopResolver {
    ref_resolver: ReferenceResolver,
}

impl LoopResolver {
    pub fn new() -> Self {
        Self {
            // Loop bodies keep unresolved tokens for later passes
            ref_resolver: ReferenceResolver::new(Mode::Soft),
        }
    }

    /// Expand all loop sites in `node`, using the tree itself as the ambient
    /// context.
    pub fn resolve(&self, node: Node) -> Result<Node, XymlError> {
        let context = node.clone();
        self.resolve_value(node, &context)
    }

    fn resolve_value(&self, node: Node, context: &Node) -> Result<Node, XymlError> {
        match node {
            Node::Mapping(map) if map.contains_key(LOOP_KEY) => self.expand_loop(map, context),
            Node::Mapping(map) => {
                let mut resolved = IndexMap::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key, self.resolve_value(value, context)?);
                }
                Ok(Node::Mapping(resolved))
            }
            Node::Sequence(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    let loop_site =
                        matches!(&item, Node::Mapping(m) if m.contains_key(LOOP_KEY));
                    match self.resolve_value(item, context)? {
                        // In-place splicing keeps non-loop siblings in
                        // position around the expansion.
                        Node::Sequence(expansion) if loop_site => resolved.extend(expansion),
                        other => resolved.push(other),
                    }
                }
                Ok(Node::Sequence(resolved))
            }
            other => Ok(other),
        }
    }

    fn expand_loop(
        &self,
        mut site: IndexMap<String, Node>,
        context: &Node,
    ) -> Result<Node, XymlError> {
        let descriptor = site
            .shift_remove(LOOP_KEY)
            .expect("caller checked for loop key");
        let descriptor = descriptor.as_str().ok_or_else(|| {
            XymlError::Syntax(format!("no valid loop statement: '{}'", descriptor))
        })?;
        let iterators = parse_loop_descriptor(descriptor)?;

        let (body, flat) = if let Some(content) = site.shift_remove(LOOP_CONTENT_KEY) {
            if !site.is_empty() {
                return Err(XymlError::Syntax(format!(
                    "flat loop content does not allow other mapping values: '{}'",
                    descriptor
                )));
            }
            (content, true)
        } else {
            (Node::Mapping(site), false)
        };

        // Cartesian extension, left to right: the working list holds
        // (partial body, loop-local context) pairs; each stage multiplies it
        // by one iterator's collection, so the first-listed iterator varies
        // slowest.
        let mut working = vec![(body, context.clone())];
        for (iterator, collection_ref) in &iterators {
            let mut next = Vec::new();
            for (partial, local_context) in working {
                let collection = navigate(&local_context, collection_ref, false)
                    .ok()
                    .and_then(|value| match value {
                        Node::Sequence(items) => Some(items),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        XymlError::Syntax(format!(
                            "'{}' does not reference a sequence in loop '{}'",
                            collection_ref, descriptor
                        ))
                    })?;
                for item in collection {
                    let child_context = bind_iterator(&local_context, iterator, item);
                    let copy = self
                        .ref_resolver
                        .resolve_with(partial.clone(), &child_context)?;
                    next.push((copy, child_context));
                }
            }
            working = next;
        }

        // Nested loops inside each copy see the then-current loop-local
        // context as their ambient context.
        let mut expanded = Vec::with_capacity(working.len());
        for (copy, local_context) in working {
            let copy = self.resolve_value(copy, &local_context)?;
            match copy {
                Node::Sequence(items) if flat => expanded.extend(items),
                other => expanded.push(other),
            }
        }
        Ok(Node::Sequence(expanded))
    }
}

impl Default for LoopResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `iter1:collection1[, iter2:collection2, ...]`
fn parse_loop_descriptor(descriptor: &str) -> Result<Vec<(String, String)>, XymlError> {
    let mut pairs = Vec::new();
    for part in descriptor.split(',') {
        let caps = LOOP_PAIR.captures(part.trim()).ok_or_else(|| {
            XymlError::Syntax(format!("no valid loop statement: '{}'", descriptor))
        })?;
        pairs.push((caps[1].to_string(), caps[2].to_string()));
    }
    if pairs.is_empty() {
        return Err(XymlError::Syntax(format!(
            "no valid loop statement: '{}'",
            descriptor
        )));
    }
    Ok(pairs)
}

/// Chain an iterator binding on top of the ambient context
fn bind_iterator(context: &Node, iterator: &str, item: Node) -> Node {
    let mut bound = match context {
        Node::Mapping(map) => map.clone(),
        _ => IndexMap::new(),
    };
    bound.insert(iterator.to_string(), item);
    Node::Mapping(bound)
}

/// Resolves inline loops embedded in scalar strings
pub struct InlineLoopResolver {
    ref_resolver: ReferenceResolver,
}

impl InlineLoopResolver {
    pub fn new() -> Self {
        Self {
            ref_resolver: ReferenceResolver::new(Mode::Soft),
        }
    }

    /// Expand all inline loops in `node`, using the tree itself as the
    /// ambient context.
    pub fn resolve(&self, node: Node) -> Result<Node, XymlError> {
        let context = node.clone();
        self.resolve_value(node, &context)
    }

    fn resolve_value(&self, node: Node, context: &Node) -> Result<Node, XymlError> {
        match node {
            Node::Mapping(map) => {
                let mut resolved = IndexMap::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key, self.resolve_value(value, context)?);
                }
                Ok(Node::Mapping(resolved))
            }
            Node::Sequence(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    resolved.push(self.resolve_value(item, context)?);
                }
                Ok(Node::Sequence(resolved))
            }
            Node::String(s) => self.resolve_scalar(&s, context),
            other => Ok(other),
        }
    }

    fn resolve_scalar(&self, value: &str, context: &Node) -> Result<Node, XymlError> {
        if !value.contains("{{") {
            return Ok(Node::String(value.to_string()));
        }
        let mut output = String::with_capacity(value.len());
        let mut cursor = 0;
        for token in scan_reference_tokens(value) {
            output.push_str(&value[cursor..token.start]);
            match parse_inline_loop(token.inner(value)) {
                Some((iterator, collection_ref, content)) => {
                    let rendered =
                        self.render_inline(iterator, collection_ref, content, context)?;
                    output.push_str(&rendered);
                }
                None => output.push_str(token.text(value)),
            }
            cursor = token.end;
        }
        output.push_str(&value[cursor..]);
        Ok(Node::String(output))
    }

    fn render_inline(
        &self,
        iterator: &str,
        collection_ref: &str,
        content: &str,
        context: &Node,
    ) -> Result<String, XymlError> {
        let collection = navigate(context, collection_ref, false)
            .ok()
            .and_then(|value| match value {
                Node::Sequence(items) => Some(items),
                _ => None,
            })
            .ok_or_else(|| {
                XymlError::Syntax(format!(
                    "'{}' is not iterable and therefore cannot be used in a loop",
                    collection_ref
                ))
            })?;

        let mut rendered = String::new();
        for item in collection {
            let child_context = bind_iterator(context, iterator, item);
            let resolved = self
                .ref_resolver
                .resolve_with(Node::String(content.to_string()), &child_context)?;
            rendered.push_str(&resolved.to_embedded_string());
        }
        Ok(rendered)
    }
}

impl Default for InlineLoopResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `xyml.for:<iterator>:<collection>:<content>` from a token's inner
/// text. Content keeps its spacing verbatim.
fn parse_inline_loop(inner: &str) -> Option<(&str, &str, &str)> {
    let rest = inner.trim_start().strip_prefix("xyml.for")?;
    let rest = rest.trim_start().strip_prefix(':')?;
    let (iterator, rest) = rest.split_once(':')?;
    let (collection_ref, content) = rest.split_once(':')?;
    let iterator = iterator.trim();
    let collection_ref = collection_ref.trim();
    if iterator.is_empty() || collection_ref.is_empty() {
        return None;
    }
    Some((iterator, collection_ref, content))
}
