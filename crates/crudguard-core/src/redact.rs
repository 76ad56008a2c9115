//! Outbound field redaction
//!
//! Client selection (`select.only` / `select.except`) runs first, then the
//! server's forbidden paths. A forbidden field therefore never survives,
//! whatever the selection asked for. Arrays are transparent: a path applies
//! under every element of a list it crosses.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::errors::{CrudError, Result};
use crate::query::SelectSpec;

/// One forbidden field pattern
#[derive(Debug, Clone)]
pub enum FieldPattern {
    /// Exact dotted path, e.g. `posts.author.password`
    Path(Vec<String>),
    /// Regular expression tested against the full dotted path (unanchored:
    /// `password` also matches `passwordHint`; use `(^|\.)password$` to
    /// match the field alone at any depth)
    Regex(Regex),
}

impl FieldPattern {
    pub fn path(path: &str) -> Self {
        FieldPattern::Path(
            path.split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// # Errors
    ///
    /// `InvalidForbiddenPattern` when the expression does not compile.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern).map(FieldPattern::Regex).map_err(|e| {
            CrudError::InvalidForbiddenPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn matches(&self, path: &[String]) -> bool {
        match self {
            FieldPattern::Path(segments) => segments.as_slice() == path,
            FieldPattern::Regex(re) => re.is_match(&path.join(".")),
        }
    }
}

impl PartialEq for FieldPattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldPattern::Path(a), FieldPattern::Path(b)) => a == b,
            (FieldPattern::Regex(a), FieldPattern::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

/// Prune one outbound record in place
///
/// `required_root_fields` survive `select.only` at the root (the record's
/// own id). Missing paths are ignored and pruning twice changes nothing.
pub fn prune(
    record: &mut Value,
    forbidden: &[FieldPattern],
    select: Option<&SelectSpec>,
    required_root_fields: &[&str],
) {
    if let Some(select) = select {
        if let Some(only) = &select.only {
            let trie = SelectTrie::build(only);
            keep_selected(record, &trie, required_root_fields);
        } else if let Some(except) = &select.except {
            let patterns: Vec<FieldPattern> = except.iter().map(|p| FieldPattern::path(p)).collect();
            remove_matching(record, &patterns, &mut Vec::new());
        }
    }
    if !forbidden.is_empty() {
        remove_matching(record, forbidden, &mut Vec::new());
    }
}

fn remove_matching(value: &mut Value, patterns: &[FieldPattern], path: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                remove_matching(item, patterns, path);
            }
        }
        Value::Object(map) => {
            let keys: Vec<String> = map.keys().cloned().collect();
            for key in keys {
                path.push(key);
                if patterns.iter().any(|p| p.matches(path.as_slice())) {
                    map.remove(&path[path.len() - 1]);
                } else if let Some(child) = map.get_mut(&path[path.len() - 1]) {
                    remove_matching(child, patterns, path);
                }
                path.pop();
            }
        }
        _ => {}
    }
}

/// `select.only` paths merged into a tree; a terminal node keeps its whole subtree
#[derive(Debug, Default)]
struct SelectTrie {
    terminal: bool,
    children: BTreeMap<String, SelectTrie>,
}

impl SelectTrie {
    fn build(paths: &[String]) -> Self {
        let mut root = Self::default();
        for path in paths {
            let mut node = &mut root;
            for segment in path.split('.').filter(|s| !s.is_empty()) {
                node = node.children.entry(segment.to_string()).or_default();
            }
            node.terminal = true;
        }
        root
    }
}

fn keep_selected(value: &mut Value, trie: &SelectTrie, required: &[&str]) {
    match value {
        Value::Array(items) => {
            for item in items {
                keep_selected(item, trie, required);
            }
        }
        Value::Object(map) => {
            let kept: Map<String, Value> = std::mem::take(map)
                .into_iter()
                .filter_map(|(key, mut child)| {
                    if required.contains(&key.as_str()) {
                        return Some((key, child));
                    }
                    let node = trie.children.get(&key)?;
                    if !node.terminal {
                        keep_selected(&mut child, node, &[]);
                    }
                    Some((key, child))
                })
                .collect();
            *map = kept;
        }
        _ => {}
    }
}
