//! Hierarchical key tree flattening.
//!
//! Backends that expose directories (etcd nodes, nested YAML/JSON/TOML
//! documents) hand a [`Node`] tree to a [`Flattener`], which walks it depth
//! first and emits one flat entry per leaf. Directory nodes carry no payload.
//!
//! Key translation is explicit configuration ([`KeyTranslator`]) owned by each
//! backend, so backends with different conventions coexist safely.

mod value;
pub use value::*;


use serde::Deserialize;
use serde::Serialize;

use crate::constants::MAX_TREE_DEPTH;
use crate::store::FlatMap;
use crate::utils::path;
use crate::FlattenError;

/// Backend-native hierarchical representation. Exists only while a fetch
/// result is being flattened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf { key: String, value: String },
    Dir { key: String, nodes: Vec<Node> },
}

impl Node {
    pub fn leaf(
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Node::Leaf {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn dir(
        key: impl Into<String>,
        nodes: Vec<Node>,
    ) -> Self {
        Node::Dir {
            key: key.into(),
            nodes,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Node::Leaf { key, .. } | Node::Dir { key, .. } => key,
        }
    }
}

/// Case normalization applied after separator translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyCase {
    #[default]
    Preserve,
    Lower,
    Upper,
}

impl KeyCase {
    pub fn apply(
        self,
        key: String,
    ) -> String {
        match self {
            KeyCase::Preserve => key,
            KeyCase::Lower => key.to_lowercase(),
            KeyCase::Upper => key.to_uppercase(),
        }
    }
}

/// Path-to-key translation rule.
///
/// With a separator, `/prefix/nginx/port` under prefix `/prefix` and
/// separator `_` becomes `nginx_port`. Without one the key stays a rooted
/// path with the prefix removed (`/nginx/port`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyTranslator {
    prefix: String,
    separator: Option<String>,
    case: KeyCase,
}

impl KeyTranslator {
    /// Keeps full key paths untouched.
    pub fn path() -> Self {
        Self::default()
    }

    /// Translates paths into flat keys joined by `separator`.
    pub fn flat(separator: impl Into<String>) -> Self {
        Self {
            separator: Some(separator.into()),
            ..Self::default()
        }
    }

    pub fn with_prefix(
        mut self,
        prefix: impl Into<String>,
    ) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_case(
        mut self,
        case: KeyCase,
    ) -> Self {
        self.case = case;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn translate(
        &self,
        key: &str,
    ) -> String {
        let stripped = if self.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(self.prefix.as_str()).unwrap_or(key)
        };

        let translated = match &self.separator {
            None => path::clean(&format!("/{stripped}")),
            Some(sep) => stripped.trim_start_matches('/').replace('/', sep),
        };
        self.case.apply(translated)
    }
}

/// Depth-first tree walker producing [`FlatMap`]s.
#[derive(Debug, Clone)]
pub struct Flattener {
    translator: KeyTranslator,
    max_depth: usize,
}

impl Default for Flattener {
    fn default() -> Self {
        Self::new(KeyTranslator::path())
    }
}

impl Flattener {
    pub fn new(translator: KeyTranslator) -> Self {
        Self {
            translator,
            max_depth: MAX_TREE_DEPTH,
        }
    }

    pub fn with_max_depth(
        mut self,
        max_depth: usize,
    ) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn translator(&self) -> &KeyTranslator {
        &self.translator
    }

    pub fn flatten(
        &self,
        root: &Node,
    ) -> Result<FlatMap, FlattenError> {
        let mut vars = FlatMap::new();
        self.flatten_into(root, &mut vars)?;
        Ok(vars)
    }

    /// Flattens several independent roots into one map.
    pub fn flatten_all<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a Node>,
    ) -> Result<FlatMap, FlattenError> {
        let mut vars = FlatMap::new();
        for root in roots {
            self.flatten_into(root, &mut vars)?;
        }
        Ok(vars)
    }

    pub fn flatten_into(
        &self,
        root: &Node,
        vars: &mut FlatMap,
    ) -> Result<(), FlattenError> {
        self.walk(root, 0, vars)
    }

    fn walk(
        &self,
        node: &Node,
        depth: usize,
        vars: &mut FlatMap,
    ) -> Result<(), FlattenError> {
        if depth > self.max_depth {
            return Err(FlattenError::DepthExceeded {
                key: node.key().to_string(),
                max_depth: self.max_depth,
            });
        }
        match node {
            Node::Leaf { key, value } => {
                vars.insert(self.translator.translate(key), value.clone());
            }
            Node::Dir { nodes, .. } => {
                for child in nodes {
                    self.walk(child, depth + 1, vars)?;
                }
            }
        }
        Ok(())
    }
}
