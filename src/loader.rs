//! Loading YAML documents from disk into [`Node`] trees
//!
//! The [`DocumentLoader`] trait sits between the include resolver and the
//! filesystem so resolver tests can run against in-memory fixtures. The
//! production implementation is [`FsLoader`], which also handles default
//! extension probing for paths given without one.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::XymlError;
use crate::node::Node;

/// Extensions probed, in order, when a document path carries none
pub const DEFAULT_EXTENSIONS: [&str; 3] = ["yaml", "yml", "xyml"];

/// Source of document fragments for include resolution
pub trait DocumentLoader {
    /// Load and parse the document at `path`
    fn load(&self, path: &Path) -> Result<Node, XymlError>;

    /// Whether a document exists at `path`
    fn exists(&self, path: &Path) -> bool;
}

/// Loads documents from the filesystem.
///
/// A path without an extension is probed with each default extension in
/// order; a path with an extension is used as-is.
pub struct FsLoader;

impl FsLoader {
    /// Resolve `path` to an existing file, probing default extensions when
    /// the path carries none.
    fn locate(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        if path.extension().is_some() {
            return None;
        }
        for ext in DEFAULT_EXTENSIONS {
            let candidate = path.with_extension(ext);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}

impl DocumentLoader for FsLoader {
    fn load(&self, path: &Path) -> Result<Node, XymlError> {
        let file = self.locate(path).ok_or_else(|| XymlError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        log::debug!("loading document '{}'", file.display());
        let text = std::fs::read_to_string(&file).map_err(|source| XymlError::Io {
            path: file.clone(),
            source,
        })?;
        let value: serde_yaml::Value =
            serde_yaml::from_str(&text).map_err(|source| XymlError::Yaml {
                path: file.clone(),
                source,
            })?;
        node_from_value(value)
    }

    fn exists(&self, path: &Path) -> bool {
        self.locate(path).is_some()
    }
}

/// Parse YAML text into a document tree
pub fn node_from_str(text: &str) -> Result<Node, XymlError> {
    let value: serde_yaml::Value = serde_yaml::from_str(text)?;
    node_from_value(value)
}

/// Serialize a resolved document tree back to YAML text
pub fn dump(node: &Node) -> Result<String, XymlError> {
    Ok(serde_yaml::to_string(node)?)
}

fn node_from_value(value: serde_yaml::Value) -> Result<Node, XymlError> {
    Ok(match value {
        serde_yaml::Value::Null => Node::Null,
        serde_yaml::Value::Bool(b) => Node::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Node::Int(i)
            } else {
                // u64 beyond i64 range and actual floats both land here
                Node::Float(n.as_f64().unwrap_or_default())
            }
        }
        serde_yaml::Value::String(s) => Node::String(s),
        serde_yaml::Value::Sequence(items) => Node::Sequence(
            items
                .into_iter()
                .map(node_from_value)
                .collect::<Result<_, _>>()?,
        ),
        serde_yaml::Value::Mapping(map) => {
            let mut entries = IndexMap::with_capacity(map.len());
            for (key, value) in map {
                let key = match key {
                    serde_yaml::Value::String(s) => s,
                    other => {
                        return Err(XymlError::Syntax(format!(
                            "mapping keys must be strings, got '{:?}'",
                            other
                        )))
                    }
                };
                entries.insert(key, node_from_value(value)?);
            }
            Node::Mapping(entries)
        }
        serde_yaml::Value::Tagged(tagged) => node_from_value(tagged.value)?,
    })
}
