//! Dotted-path navigation over document trees
//!
//! A path is a dot-separated list of segments. A segment either names a
//! mapping key or carries an array index suffix (`name[2]`). Navigation is
//! shared by the reference resolver (token paths) and the loop resolver
//! (collection lookups).

use lazy_static::lazy_static;
use regex::Regex;

use crate::node::Node;

lazy_static! {
    static ref ARRAY_SEGMENT: Regex = Regex::new(r"^(.+)\[(\d+)\]$").expect("valid regex");
}

/// A failed navigation, carrying the sub-path that could not be reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError {
    pub missing: String,
}

impl PathError {
    fn new(missing: impl Into<String>) -> Self {
        Self {
            missing: missing.into(),
        }
    }
}

/// Navigate `path` starting from `context`, returning the value it points to.
///
/// If a value encountered mid-navigation is itself an unresolved reference
/// token, the remaining segments are appended to that token's path and the
/// re-wrapped token is returned for a later pass. This affords one layer of
/// indirection through still-pending values (include parameters that are
/// themselves references) without multi-pass logic at every call site.
///
/// With `map_across` enabled, a non-numeric segment applied to a sequence
/// maps the remaining path over every element, collecting successes and
/// silently dropping elements where the path fails. Without it, that case is
/// a navigation failure.
pub fn navigate(context: &Node, path: &str, map_across: bool) -> Result<Node, PathError> {
    let segments: Vec<&str> = path.split('.').collect();
    navigate_segments(context, &segments, map_across)
}

fn navigate_segments(current: &Node, segments: &[&str], map_across: bool) -> Result<Node, PathError> {
    if segments.is_empty() {
        return Ok(current.clone());
    }

    // Indirection through a still-pending reference: re-wrap with the
    // remaining segments appended and let a later pass resolve it.
    if let Node::String(s) = current {
        if let Some(inner) = crate::resolver::whole_reference_token(s) {
            let rewrapped = format!("{{{{{}.{}}}}}", inner.trim(), segments.join("."));
            return Ok(Node::String(rewrapped));
        }
    }

    let segment = segments[0];
    match current {
        Node::Mapping(map) => {
            if let Some(caps) = ARRAY_SEGMENT.captures(segment) {
                let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let index: usize = caps[2].parse().map_err(|_| PathError::new(segment))?;
                let value = map.get(name).ok_or_else(|| PathError::new(name))?;
                match value {
                    Node::Sequence(items) => {
                        let element = items
                            .get(index)
                            .ok_or_else(|| PathError::new(format!("{}[{}]", name, index)))?;
                        navigate_segments(element, &segments[1..], map_across)
                    }
                    // A pending reference behind an index: the key name is
                    // already consumed, so the index applies to the inner
                    // path, with only the rest appended.
                    Node::String(s) => match crate::resolver::whole_reference_token(s) {
                        Some(inner) => {
                            let mut rewrapped = format!("{}[{}]", inner.trim(), index);
                            if segments.len() > 1 {
                                rewrapped.push('.');
                                rewrapped.push_str(&segments[1..].join("."));
                            }
                            Ok(Node::String(format!("{{{{{}}}}}", rewrapped)))
                        }
                        None => Err(PathError::new(format!("{}[{}]", name, index))),
                    },
                    _ => Err(PathError::new(format!("{}[{}]", name, index))),
                }
            } else {
                let value = map.get(segment).ok_or_else(|| PathError::new(segment))?;
                navigate_segments(value, &segments[1..], map_across)
            }
        }
        Node::Sequence(items) if map_across => {
            let collected: Vec<Node> = items
                .iter()
                .filter_map(|element| navigate_segments(element, segments, map_across).ok())
                .collect();
            Ok(Node::Sequence(collected))
        }
        _ => Err(PathError::new(segment)),
    }
}
