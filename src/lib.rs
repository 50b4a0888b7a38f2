//! xyml - An extended YAML resolution engine
//!
//! This library expands extended-YAML documents into plain YAML: `xyml.include`
//! directives pull in external fragments, `xyml.for` directives repeat
//! template bodies over collections, and `{{ path }}` reference tokens
//! substitute values from elsewhere in the document.
//!
//! # Example
//!
//! ```rust
//! use xyml::resolve_str;
//!
//! let yaml = resolve_str("name: demo\ngreeting: \"hello {{name}}\"").unwrap();
//! assert!(yaml.contains("hello demo"));
//! ```

pub mod document;
pub mod error;
pub mod loader;
pub mod node;
pub mod path;
pub mod resolver;

pub use document::{ResolveConfig, XymlDocument};
pub use error::XymlError;
pub use loader::{DocumentLoader, FsLoader};
pub use node::Node;
pub use resolver::{IncludeResolver, InlineLoopResolver, LoopResolver, Mode, ReferenceResolver};

use std::path::Path;

/// Resolve extended-YAML text to plain YAML with default configuration
///
/// This is the main string entry point. Includes are searched relative to the
/// working directory; use [`XymlDocument::from_str`] with a [`ResolveConfig`]
/// for include directories, parameters, or soft mode.
///
/// # Example
///
/// ```rust
/// use xyml::resolve_str;
///
/// let yaml = resolve_str(r#"
/// array_1:
///   - abc
///   - xyz
/// commands:
///   xyml.for: "iterator:array_1"
///   cmd: "sh {{iterator}}"
/// "#).unwrap();
///
/// assert!(yaml.contains("sh abc"));
/// assert!(yaml.contains("sh xyz"));
/// ```
pub fn resolve_str(text: &str) -> Result<String, XymlError> {
    XymlDocument::from_str(text, &ResolveConfig::new())?.to_yaml()
}

/// Resolve the extended-YAML file at `path` to plain YAML text
///
/// The file's own directory is searched for includes; pass a [`ResolveConfig`]
/// to [`XymlDocument::load`] for anything beyond the defaults.
pub fn resolve_file(path: impl AsRef<Path>) -> Result<String, XymlError> {
    XymlDocument::load(path, &ResolveConfig::new())?.to_yaml()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_str_plain_yaml_is_unchanged() {
        let input = "key: value\nlist:\n- 1\n- 2\n";
        let output = resolve_str(input).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_resolve_str_substitutes_references() {
        let yaml = resolve_str("base: /opt\nfull: \"{{base}}/bin\"").unwrap();
        assert!(yaml.contains("full: /opt/bin"));
    }

    #[test]
    fn test_resolve_str_reports_missing_references() {
        let err = resolve_str("value: \"{{nowhere}}\"").unwrap_err();
        assert!(matches!(err, XymlError::ReferenceNotFound { .. }));
    }

    #[test]
    fn test_resolve_file_missing_path() {
        let err = resolve_file("definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, XymlError::FileNotFound { .. }));
    }
}
