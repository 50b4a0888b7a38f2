//! Include resolution: merges external document fragments into the host tree
//!
//! A mapping containing `xyml.include` is an include site. The directive
//! value is one include statement or a list of them, each of the form
//! `<path>[<<k1=v1,k2=v2,...>>]`. Fragments are located through the include
//! directories in priority order, parameter-substituted, recursively resolved
//! relative to their own directory, and merged host-wins into the site.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::XymlError;
use crate::loader::DocumentLoader;
use crate::node::Node;

use super::{Mode, ReferenceResolver};

/// Reserved mapping key that marks an include site
pub const INCLUDE_KEY: &str = "xyml.include";

lazy_static! {
    static ref INCLUDE_STATEMENT: Regex =
        Regex::new(r"^([^<]+?)\s*(?:<<(.*)>>)?\s*$").expect("valid regex");
}

/// Resolves `xyml.include` directives by loading and merging fragments
pub struct IncludeResolver<'a> {
    loader: &'a dyn DocumentLoader,
    include_dirs: Vec<PathBuf>,
    mode: Mode,
}

impl<'a> IncludeResolver<'a> {
    /// Create a resolver searching `include_dirs` in priority order.
    ///
    /// `include_dirs` are the additionally supplied directories; the working
    /// directory is searched before them unless already listed. A caller
    /// wanting higher-priority directories (such as the host document's own)
    /// lists them together with the working directory explicitly.
    pub fn new(loader: &'a dyn DocumentLoader, include_dirs: Vec<PathBuf>, mode: Mode) -> Self {
        let mut include_dirs = include_dirs;
        if let Ok(cwd) = std::env::current_dir() {
            if !include_dirs.contains(&cwd) {
                include_dirs.insert(0, cwd);
            }
        }
        Self {
            loader,
            include_dirs,
            mode,
        }
    }

    /// Resolve all include sites in `node`, using the tree itself as the
    /// reference context for include statements.
    pub fn resolve(&self, node: Node) -> Result<Node, XymlError> {
        let context = node.clone();
        self.resolve_value(node, &context)
    }

    fn resolve_value(&self, node: Node, context: &Node) -> Result<Node, XymlError> {
        match node {
            Node::Mapping(mut map) => {
                if let Some(statement) = map.shift_remove(INCLUDE_KEY) {
                    let fragment = self.resolve_include_statement(statement, context)?;
                    match fragment {
                        Node::Mapping(fragment) => {
                            merge_host_wins(&mut map, fragment);
                        }
                        other => {
                            // A non-mapping fragment replaces the site, which
                            // must then hold nothing but the directive.
                            if !map.is_empty() {
                                return Err(XymlError::Syntax(format!(
                                    "include site with sibling keys {:?} resolved to a \
                                     non-mapping fragment",
                                    map.keys().collect::<Vec<_>>()
                                )));
                            }
                            return Ok(other);
                        }
                    }
                }
                let mut resolved = IndexMap::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key, self.resolve_value(value, context)?);
                }
                Ok(Node::Mapping(resolved))
            }
            Node::Sequence(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    let include_site = matches!(&item, Node::Mapping(m) if m.contains_key(INCLUDE_KEY));
                    match self.resolve_value(item, context)? {
                        // Sequence-valued fragments splice into the
                        // enclosing sequence instead of nesting.
                        Node::Sequence(expansion) if include_site => resolved.extend(expansion),
                        other => resolved.push(other),
                    }
                }
                Ok(Node::Sequence(resolved))
            }
            other => Ok(other),
        }
    }

    /// Resolve one `xyml.include` directive value into the merged fragment
    /// content.
    fn resolve_include_statement(
        &self,
        value: Node,
        context: &Node,
    ) -> Result<Node, XymlError> {
        let statements: Vec<String> = match value {
            Node::String(s) => vec![s],
            Node::Sequence(items) => items
                .into_iter()
                .map(|item| match item {
                    Node::String(s) => Ok(s),
                    other => Err(XymlError::Syntax(format!(
                        "include statement must be a string, got '{}'",
                        other
                    ))),
                })
                .collect::<Result<_, _>>()?,
            other => {
                return Err(XymlError::Syntax(format!(
                    "include directive must hold a string or list of strings, got '{}'",
                    other
                )))
            }
        };

        let statement_resolver = ReferenceResolver::new(self.mode);
        // Fragment contents keep unresolved tokens for later passes, whatever
        // the statement mode.
        let fragment_resolver = ReferenceResolver::new(Mode::Soft);
        let mut merged: Option<Node> = None;
        for statement in statements {
            // The statement itself may contain references (paths and
            // parameter values alike).
            let statement = statement_resolver
                .resolve_with(Node::String(statement), context)?
                .to_embedded_string();
            let caps = INCLUDE_STATEMENT.captures(&statement).ok_or_else(|| {
                XymlError::Syntax(format!("invalid include statement '{}'", statement))
            })?;
            let include_path = caps
                .get(1)
                .map(|m| m.as_str().trim())
                .filter(|p| !p.is_empty())
                .ok_or_else(|| {
                    XymlError::Syntax(format!("invalid include statement '{}'", statement))
                })?;

            log::info!("resolving include '{}'", include_path);
            let (mut fragment, fragment_dir) = self.load_fragment(include_path)?;

            // Parameters act as the context for a soft pass over the freshly
            // loaded fragment, making it a parameterized template.
            if let Some(params) = caps.get(2) {
                let parameters = parse_include_parameters(params.as_str())?;
                fragment = fragment_resolver.resolve_with(fragment, &parameters)?;
            }

            // Nested includes resolve relative to the fragment's own
            // directory first.
            let mut child_dirs = Vec::with_capacity(self.include_dirs.len() + 1);
            if let Some(dir) = fragment_dir {
                child_dirs.push(dir);
            }
            child_dirs.extend(self.include_dirs.iter().cloned());
            let child = IncludeResolver {
                loader: self.loader,
                include_dirs: child_dirs,
                mode: self.mode,
            };
            let fragment = child.resolve_value(fragment, context)?;

            merged = Some(match merged {
                None => fragment,
                Some(accumulated) => combine_fragments(accumulated, fragment)?,
            });
        }
        merged.ok_or_else(|| XymlError::Syntax("empty include directive".to_string()))
    }

    /// Locate and load a fragment, trying each include directory in order
    fn load_fragment(&self, path: &str) -> Result<(Node, Option<PathBuf>), XymlError> {
        let file = Path::new(path);
        if file.is_absolute() {
            if self.loader.exists(file) {
                let dir = file.parent().map(Path::to_path_buf);
                return Ok((self.loader.load(file)?, dir));
            }
        } else {
            for dir in &self.include_dirs {
                let candidate = dir.join(path);
                if self.loader.exists(&candidate) {
                    let parent = candidate.parent().map(Path::to_path_buf);
                    return Ok((self.loader.load(&candidate)?, parent));
                }
            }
        }
        Err(XymlError::IncludeNotFound {
            path: path.to_string(),
        })
    }
}

/// Parse `k1=v1,k2=v2,...` include parameters into a context mapping
fn parse_include_parameters(params: &str) -> Result<Node, XymlError> {
    let mut parameters = IndexMap::new();
    for pair in params.split(',') {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            XymlError::Syntax(format!("invalid include parameter string '{}'", params))
        })?;
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            return Err(XymlError::Syntax(format!(
                "invalid include parameter string '{}'",
                params
            )));
        }
        parameters.insert(key.to_string(), Node::parse_scalar(value));
    }
    Ok(Node::Mapping(parameters))
}

/// Merge a fragment into the host mapping.
///
/// Host-defined values are never overwritten; when both sides hold mappings
/// the merge recurses key by key instead of treating the sub-mapping as a
/// conflict.
fn merge_host_wins(host: &mut IndexMap<String, Node>, fragment: IndexMap<String, Node>) {
    for (key, value) in fragment {
        match host.get_mut(&key) {
            Some(Node::Mapping(existing)) => {
                if let Node::Mapping(incoming) = value {
                    merge_host_wins(existing, incoming);
                }
            }
            Some(_) => {}
            None => {
                host.insert(key, value);
            }
        }
    }
}

/// Combine the content of consecutive include statements in listed order
fn combine_fragments(accumulated: Node, fragment: Node) -> Result<Node, XymlError> {
    match (accumulated, fragment) {
        (Node::Mapping(mut acc), Node::Mapping(incoming)) => {
            merge_host_wins(&mut acc, incoming);
            Ok(Node::Mapping(acc))
        }
        (Node::Sequence(mut acc), Node::Sequence(incoming)) => {
            acc.extend(incoming);
            Ok(Node::Sequence(acc))
        }
        (Node::Sequence(mut acc), fragment @ Node::Mapping(_)) => {
            acc.push(fragment);
            Ok(Node::Sequence(acc))
        }
        (accumulated @ Node::Mapping(_), Node::Sequence(incoming)) => {
            let mut items = vec![accumulated];
            items.extend(incoming);
            Ok(Node::Sequence(items))
        }
        _ => Err(XymlError::Syntax(
            "resolved include content is not of sequence or mapping type".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory loader so resolver tests need no filesystem
    struct FakeLoader {
        files: HashMap<PathBuf, Node>,
    }

    impl FakeLoader {
        fn new(files: Vec<(&str, Node)>) -> Self {
            Self {
                files: files
                    .into_iter()
                    .map(|(p, n)| (PathBuf::from(p), n))
                    .collect(),
            }
        }
    }

    impl DocumentLoader for FakeLoader {
        fn load(&self, path: &Path) -> Result<Node, XymlError> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| XymlError::FileNotFound {
                    path: path.to_path_buf(),
                })
        }

        fn exists(&self, path: &Path) -> bool {
            self.files.contains_key(path)
        }
    }

    fn mapping(entries: Vec<(&str, Node)>) -> Node {
        Node::Mapping(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<IndexMap<_, _>>(),
        )
    }

    fn resolver_with<'a>(loader: &'a FakeLoader, dir: &str) -> IncludeResolver<'a> {
        IncludeResolver {
            loader,
            include_dirs: vec![PathBuf::from(dir)],
            mode: Mode::Soft,
        }
    }

    #[test]
    fn test_basic_include_host_wins() {
        let loader = FakeLoader::new(vec![(
            "/doc/inc.yaml",
            mapping(vec![
                ("subvalue_1", Node::from("xyz")),
                ("subvalue_2", Node::Int(123)),
            ]),
        )]);
        let host = mapping(vec![
            ("subvalue_1", Node::from("abc")),
            ("xyml.include", Node::from("inc.yaml")),
        ]);
        let result = resolver_with(&loader, "/doc")
            .resolve(host)
            .expect("Should resolve");
        assert_eq!(
            result,
            mapping(vec![
                ("subvalue_1", Node::from("abc")),
                ("subvalue_2", Node::Int(123)),
            ])
        );
    }

    #[test]
    fn test_partial_mapping_merge_recurses() {
        let loader = FakeLoader::new(vec![(
            "/doc/inc.yaml",
            mapping(vec![(
                "dict_1",
                mapping(vec![
                    ("subvalue_2", Node::from("overridden")),
                    ("subvalue_3", Node::Int(123)),
                ]),
            )]),
        )]);
        let host = mapping(vec![
            (
                "dict_1",
                mapping(vec![
                    ("subvalue_1", Node::from("abc")),
                    ("subvalue_2", Node::from("xyz")),
                ]),
            ),
            ("xyml.include", Node::from("inc.yaml")),
        ]);
        let result = resolver_with(&loader, "/doc")
            .resolve(host)
            .expect("Should resolve");
        assert_eq!(
            result,
            mapping(vec![(
                "dict_1",
                mapping(vec![
                    ("subvalue_1", Node::from("abc")),
                    ("subvalue_2", Node::from("xyz")),
                    ("subvalue_3", Node::Int(123)),
                ]),
            )])
        );
    }

    #[test]
    fn test_include_list_merges_in_order() {
        let loader = FakeLoader::new(vec![
            ("/doc/inc1.yaml", mapping(vec![("a", Node::Int(1))])),
            ("/doc/inc2.yaml", mapping(vec![("b", Node::Int(2))])),
        ]);
        let host = mapping(vec![(
            "xyml.include",
            Node::Sequence(vec![Node::from("inc1.yaml"), Node::from("inc2.yaml")]),
        )]);
        let result = resolver_with(&loader, "/doc")
            .resolve(host)
            .expect("Should resolve");
        assert_eq!(
            result,
            mapping(vec![("a", Node::Int(1)), ("b", Node::Int(2))])
        );
    }

    #[test]
    fn test_parameterized_include() {
        let loader = FakeLoader::new(vec![(
            "/doc/inc.yaml",
            mapping(vec![
                ("subvalue_2", Node::from("{{subvalue_2}}")),
                ("subvalue_3", Node::Int(123)),
            ]),
        )]);
        let host = mapping(vec![
            ("subvalue_1", Node::from("abc")),
            ("xyml.include", Node::from("inc.yaml<<subvalue_2=xyz>>")),
        ]);
        let result = resolver_with(&loader, "/doc")
            .resolve(host)
            .expect("Should resolve");
        assert_eq!(
            result,
            mapping(vec![
                ("subvalue_1", Node::from("abc")),
                ("subvalue_2", Node::from("xyz")),
                ("subvalue_3", Node::Int(123)),
            ])
        );
    }

    #[test]
    fn test_parameter_values_are_coerced() {
        let loader = FakeLoader::new(vec![(
            "/doc/inc.yaml",
            mapping(vec![("flag", Node::from("{{param_value}}"))]),
        )]);
        let host = mapping(vec![(
            "xyml.include",
            Node::from("inc.yaml<<param_value=true>>"),
        )]);
        let result = resolver_with(&loader, "/doc")
            .resolve(host)
            .expect("Should resolve");
        assert_eq!(result, mapping(vec![("flag", Node::Bool(true))]));
    }

    #[test]
    fn test_reference_in_include_path() {
        let loader = FakeLoader::new(vec![(
            "/doc/special.yaml",
            mapping(vec![("loaded", Node::Bool(true))]),
        )]);
        let host = mapping(vec![
            ("variant", Node::from("special")),
            (
                "dict_1",
                mapping(vec![("xyml.include", Node::from("{{variant}}.yaml"))]),
            ),
        ]);
        let result = resolver_with(&loader, "/doc")
            .resolve(host)
            .expect("Should resolve");
        assert_eq!(
            result,
            mapping(vec![
                ("variant", Node::from("special")),
                ("dict_1", mapping(vec![("loaded", Node::Bool(true))])),
            ])
        );
    }

    #[test]
    fn test_recursive_include() {
        let loader = FakeLoader::new(vec![
            (
                "/doc/inc1.yaml",
                mapping(vec![
                    ("subvalue_2", Node::from("xyz")),
                    ("xyml.include", Node::from("inc2.yaml")),
                ]),
            ),
            ("/doc/inc2.yaml", mapping(vec![("subvalue_3", Node::Int(123))])),
        ]);
        let host = mapping(vec![
            ("subvalue_1", Node::from("abc")),
            ("xyml.include", Node::from("inc1.yaml")),
        ]);
        let result = resolver_with(&loader, "/doc")
            .resolve(host)
            .expect("Should resolve");
        assert_eq!(
            result,
            mapping(vec![
                ("subvalue_1", Node::from("abc")),
                ("subvalue_2", Node::from("xyz")),
                ("subvalue_3", Node::Int(123)),
            ])
        );
    }

    #[test]
    fn test_sequence_fragment_requires_bare_site() {
        let loader = FakeLoader::new(vec![(
            "/doc/inc.yaml",
            Node::Sequence(vec![Node::Int(1), Node::Int(2)]),
        )]);
        let host = mapping(vec![
            ("sibling", Node::from("abc")),
            ("xyml.include", Node::from("inc.yaml")),
        ]);
        let err = resolver_with(&loader, "/doc").resolve(host).unwrap_err();
        assert!(matches!(err, XymlError::Syntax(_)));
    }

    #[test]
    fn test_sequence_fragment_splices_into_parent_sequence() {
        let loader = FakeLoader::new(vec![(
            "/doc/inc.yaml",
            Node::Sequence(vec![Node::Int(2), Node::Int(3)]),
        )]);
        let host = mapping(vec![(
            "array_1",
            Node::Sequence(vec![
                Node::Int(1),
                mapping(vec![("xyml.include", Node::from("inc.yaml"))]),
                Node::Int(4),
            ]),
        )]);
        let result = resolver_with(&loader, "/doc")
            .resolve(host)
            .expect("Should resolve");
        assert_eq!(
            result,
            mapping(vec![(
                "array_1",
                Node::Sequence(vec![
                    Node::Int(1),
                    Node::Int(2),
                    Node::Int(3),
                    Node::Int(4),
                ]),
            )])
        );
    }

    #[test]
    fn test_include_not_found() {
        let loader = FakeLoader::new(vec![]);
        let host = mapping(vec![("xyml.include", Node::from("missing.yaml"))]);
        let err = resolver_with(&loader, "/doc").resolve(host).unwrap_err();
        assert!(matches!(err, XymlError::IncludeNotFound { .. }));
    }

    #[test]
    fn test_include_dir_priority_order() {
        let loader = FakeLoader::new(vec![
            ("/first/inc.yaml", mapping(vec![("from", Node::from("first"))])),
            (
                "/second/inc.yaml",
                mapping(vec![("from", Node::from("second"))]),
            ),
        ]);
        let resolver = IncludeResolver {
            loader: &loader,
            include_dirs: vec![PathBuf::from("/first"), PathBuf::from("/second")],
            mode: Mode::Soft,
        };
        let host = mapping(vec![("xyml.include", Node::from("inc.yaml"))]);
        let result = resolver.resolve(host).expect("Should resolve");
        assert_eq!(result, mapping(vec![("from", Node::from("first"))]));
    }

    #[test]
    fn test_working_directory_beats_supplied_dirs() {
        let cwd = std::env::current_dir().expect("Should know the working directory");
        let loader = FakeLoader {
            files: HashMap::from([
                (
                    cwd.join("inc.yaml"),
                    mapping(vec![("from", Node::from("cwd"))]),
                ),
                (
                    PathBuf::from("/extra/inc.yaml"),
                    mapping(vec![("from", Node::from("extra"))]),
                ),
            ]),
        };
        let resolver = IncludeResolver::new(&loader, vec![PathBuf::from("/extra")], Mode::Soft);
        let host = mapping(vec![("xyml.include", Node::from("inc.yaml"))]);
        let result = resolver.resolve(host).expect("Should resolve");
        assert_eq!(result, mapping(vec![("from", Node::from("cwd"))]));
    }

    #[test]
    fn test_malformed_parameter_string() {
        let loader = FakeLoader::new(vec![("/doc/inc.yaml", mapping(vec![]))]);
        let host = mapping(vec![("xyml.include", Node::from("inc.yaml<<oops>>"))]);
        let err = resolver_with(&loader, "/doc").resolve(host).unwrap_err();
        assert!(matches!(err, XymlError::Syntax(_)));
    }
}
