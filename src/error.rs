//! Error types for extended-YAML resolution

use std::path::PathBuf;

use thiserror::Error;

/// Maximum depth for reference-to-reference resolution before a cycle is
/// assumed
pub const MAX_REFERENCE_DEPTH: usize = 30;

/// Errors raised while resolving an extended YAML document
#[derive(Debug, Error)]
pub enum XymlError {
    /// A reference token's path could not be navigated, no default was
    /// given, and the resolver runs in strict mode
    #[error("unable to resolve reference '{path}' (missing '{missing}')")]
    ReferenceNotFound { path: String, missing: String },

    /// Reference resolution did not stabilize within the depth bound,
    /// indicating a cycle in the document's cross-references
    #[error(
        "maximum reference depth ({MAX_REFERENCE_DEPTH}) reached while resolving '{reference}', \
         is there a cycle in your configuration?"
    )]
    RecursiveReference { reference: String },

    /// A directive is structurally invalid
    #[error("invalid extended YAML syntax: {0}")]
    Syntax(String),

    /// An include path could not be located in any include directory
    #[error("include file '{path}' not found in any include directory")]
    IncludeNotFound { path: String },

    /// A document path does not exist (after default-extension probing)
    #[error("file '{}' not found", path.display())]
    FileNotFound { path: PathBuf },

    /// Error reading a document file
    #[error("error reading '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A document file is not valid YAML
    #[error("invalid YAML in '{}': {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The resolved tree could not be serialized back to YAML text
    #[error("failed to serialize YAML: {0}")]
    Serialize(#[from] serde_yaml::Error),
}
