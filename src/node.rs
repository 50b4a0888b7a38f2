//! The generic document tree every resolver operates on

use std::fmt;

use indexmap::IndexMap;
use serde::ser::{Serialize, Serializer};

/// A node in a YAML document tree.
///
/// Mappings preserve insertion order, which carries through to the final
/// serialized output (no implicit key sorting).
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Node>),
    Mapping(IndexMap<String, Node>),
}

impl Node {
    /// Whether this node is a scalar (not a sequence or mapping)
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Node::Sequence(_) | Node::Mapping(_))
    }

    /// The string content, if this node is a string scalar
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The mapping content, if this node is a mapping
    pub fn as_mapping(&self) -> Option<&IndexMap<String, Node>> {
        match self {
            Node::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Parse a raw string into the most specific scalar it represents.
    ///
    /// Tries integer, then float, then boolean; anything else stays a string.
    /// This is the coercion applied to reference defaults, include parameters
    /// and caller-supplied overrides.
    pub fn parse_scalar(value: &str) -> Node {
        if let Ok(i) = value.parse::<i64>() {
            return Node::Int(i);
        }
        if let Ok(f) = value.parse::<f64>() {
            return Node::Float(f);
        }
        match value {
            "true" => Node::Bool(true),
            "false" => Node::Bool(false),
            _ => Node::String(value.to_string()),
        }
    }

    /// Render this node for splicing into a surrounding string.
    ///
    /// Sequences are joined with single spaces; mappings use a compact
    /// flow-style rendering.
    pub fn to_embedded_string(&self) -> String {
        match self {
            Node::Null => String::new(),
            Node::Bool(b) => b.to_string(),
            Node::Int(i) => i.to_string(),
            Node::Float(f) => f.to_string(),
            Node::String(s) => s.clone(),
            Node::Sequence(items) => items
                .iter()
                .map(Node::to_embedded_string)
                .collect::<Vec<_>>()
                .join(" "),
            Node::Mapping(map) => {
                let inner = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.to_embedded_string()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{}}}", inner)
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_embedded_string())
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Null => serializer.serialize_unit(),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::Int(i) => serializer.serialize_i64(*i),
            Node::Float(f) => serializer.serialize_f64(*f),
            Node::String(s) => serializer.serialize_str(s),
            Node::Sequence(items) => serializer.collect_seq(items),
            Node::Mapping(map) => serializer.collect_map(map),
        }
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::String(value.to_string())
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Int(value)
    }
}
