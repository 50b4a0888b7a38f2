//! Document orchestration: the full resolution pipeline
//!
//! [`XymlDocument`] wires the individual resolvers into the canonical order:
//! includes first (soft), then block loops (soft), then inline loops, then a
//! final reference pass that is strict unless configured otherwise. Between
//! the loop and reference passes the context is extended with the `xyml.env`
//! and `xyml.param` namespaces, which are visible to references but never
//! appear in the output.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::XymlError;
use crate::loader::{dump, node_from_str, DocumentLoader, FsLoader};
use crate::node::Node;
use crate::resolver::{
    IncludeResolver, InlineLoopResolver, LoopResolver, Mode, ReferenceResolver,
};

/// Options controlling a resolution run
#[derive(Debug, Clone, Default)]
pub struct ResolveConfig {
    include_dirs: Vec<PathBuf>,
    params: Vec<(String, String)>,
    soft: bool,
}

impl ResolveConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory searched for include fragments, after any previously
    /// added ones.
    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    /// Add a caller-supplied parameter, reachable as `{{xyml.param.<key>}}`
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Leave unresolved references in place instead of failing the run
    pub fn soft(mut self) -> Self {
        self.soft = true;
        self
    }
}

/// A fully resolved extended-YAML document
#[derive(Debug, Clone, PartialEq)]
pub struct XymlDocument {
    content: Node,
}

impl XymlDocument {
    /// Load the document at `path` and run the full resolution pipeline.
    ///
    /// The document's own directory is searched for includes before any
    /// configured include directory.
    pub fn load(path: impl AsRef<Path>, config: &ResolveConfig) -> Result<Self, XymlError> {
        let path = path.as_ref();
        let loader = FsLoader;
        let content = loader.load(path)?;

        // Search order: the document's own directory, then the working
        // directory, then configured include directories.
        let mut include_dirs = Vec::with_capacity(config.include_dirs.len() + 2);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            include_dirs.push(dir.to_path_buf());
        }
        if let Ok(cwd) = std::env::current_dir() {
            if !include_dirs.contains(&cwd) {
                include_dirs.push(cwd);
            }
        }
        include_dirs.extend(config.include_dirs.iter().cloned());

        Self::resolve(content, &loader, include_dirs, config)
    }

    /// Parse `text` and run the full resolution pipeline
    pub fn from_str(text: &str, config: &ResolveConfig) -> Result<Self, XymlError> {
        let content = node_from_str(text)?;
        let mut include_dirs = Vec::with_capacity(config.include_dirs.len() + 1);
        if let Ok(cwd) = std::env::current_dir() {
            include_dirs.push(cwd);
        }
        include_dirs.extend(config.include_dirs.iter().cloned());
        Self::resolve(content, &FsLoader, include_dirs, config)
    }

    /// Run the resolution pipeline on an already parsed tree
    pub fn resolve(
        content: Node,
        loader: &dyn DocumentLoader,
        include_dirs: Vec<PathBuf>,
        config: &ResolveConfig,
    ) -> Result<Self, XymlError> {
        let content = IncludeResolver::new(loader, include_dirs, Mode::Soft).resolve(content)?;
        let content = LoopResolver::new().resolve(content)?;
        let content = InlineLoopResolver::new().resolve(content)?;

        let context = extend_context(&content, config);
        let mode = if config.soft { Mode::Soft } else { Mode::Strict };
        let content = ReferenceResolver::new(mode).resolve_with(content, &context)?;

        Ok(Self { content })
    }

    /// The resolved document tree
    pub fn content(&self) -> &Node {
        &self.content
    }

    /// Serialize the resolved document to YAML text
    pub fn to_yaml(&self) -> Result<String, XymlError> {
        dump(&self.content)
    }

    /// Write the resolved document to `path`, creating parent directories as
    /// needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), XymlError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| XymlError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let text = self.to_yaml()?;
        std::fs::write(path, text).map_err(|source| XymlError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Build the reference context: the document itself plus the `xyml.env` and
/// `xyml.param` namespaces.
fn extend_context(content: &Node, config: &ResolveConfig) -> Node {
    let mut context = match content {
        Node::Mapping(map) => map.clone(),
        _ => IndexMap::new(),
    };

    let env: IndexMap<String, Node> = std::env::vars()
        .map(|(key, value)| (key, Node::String(value)))
        .collect();
    let params: IndexMap<String, Node> = config
        .params
        .iter()
        .map(|(key, value)| (key.clone(), Node::parse_scalar(value)))
        .collect();

    let mut namespace = IndexMap::with_capacity(2);
    namespace.insert("env".to_string(), Node::Mapping(env));
    namespace.insert("param".to_string(), Node::Mapping(params));
    context.insert("xyml".to_string(), Node::Mapping(namespace));

    Node::Mapping(context)
}
