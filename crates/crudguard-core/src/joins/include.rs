use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::allowlist::AllowedJoinSet;
use crate::errors::Result;

/// Nested "include this relation, and within it include ..." tree
///
/// The root node stands for the entity itself; its children are the
/// relations to load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeTree {
    children: BTreeMap<String, IncludeTree>,
}

impl IncludeTree {
    /// Merge a list of join paths into one tree
    ///
    /// Overlapping prefixes share nodes, so `["posts", "posts.comments"]` and
    /// `["posts.comments"]` produce the same tree.
    pub fn from_join_list<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut root = Self::default();
        for path in paths {
            root.insert_path(path.as_ref());
        }
        root
    }

    /// Pick the inclusion tree for a request
    ///
    /// `None` means the client did not ask, and the server default applies.
    /// `Some(&[])` means "no joins". Otherwise every requested path must be
    /// in the allowlist.
    ///
    /// # Errors
    ///
    /// `JoinNotAllowed` naming the first requested path outside the allowlist.
    pub fn resolve_requested(
        requested: Option<&[String]>,
        allowed: &AllowedJoinSet,
        default_tree: &IncludeTree,
    ) -> Result<IncludeTree> {
        let Some(requested) = requested else {
            return Ok(default_tree.clone());
        };
        for path in requested {
            allowed.require_join(path)?;
        }
        Ok(Self::from_join_list(requested))
    }

    fn insert_path(&mut self, path: &str) {
        let mut node = self;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            node = node.children.entry(segment.to_string()).or_default();
        }
    }

    /// Add a top-level relation if it is not already included
    pub fn with_relation(mut self, name: &str) -> Self {
        self.children.entry(name.to_string()).or_default();
        self
    }

    pub fn child(&self, name: &str) -> Option<&IncludeTree> {
        self.children.get(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = (&str, &IncludeTree)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether the dotted `path` is part of the tree
    pub fn contains_path(&self, path: &str) -> bool {
        let mut node = self;
        for segment in path.split('.') {
            match node.children.get(segment) {
                Some(child) => node = child,
                None => return false,
            }
        }
        true
    }

    /// Flatten back to the list of every included path, prefixes included
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_paths("", &mut out);
        out
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        for (name, child) in &self.children {
            let path = super::join_path(prefix, name);
            out.push(path.clone());
            child.collect_paths(&path, out);
        }
    }

    /// Render in the ORM's nested include shape
    ///
    /// A leaf relation renders as `true`, a relation with nested includes as
    /// `{"include": {...}}`.
    ///
    /// ```
    /// use crudguard_core::joins::IncludeTree;
    /// use serde_json::json;
    ///
    /// let tree = IncludeTree::from_join_list(["posts.comments", "country"]);
    /// assert_eq!(
    ///     tree.to_value(),
    ///     json!({"country": true, "posts": {"include": {"comments": true}}})
    /// );
    /// ```
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (name, child) in &self.children {
            let rendered = if child.is_empty() {
                Value::Bool(true)
            } else {
                let mut nested = Map::new();
                nested.insert("include".to_string(), child.to_value());
                Value::Object(nested)
            };
            map.insert(name.clone(), rendered);
        }
        Value::Object(map)
    }
}
