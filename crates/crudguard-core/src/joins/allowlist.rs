use std::collections::BTreeSet;

use crate::errors::{CrudError, Result};

/// Extend `current` by one relation segment
pub fn join_path(current: &str, segment: &str) -> String {
    if current.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", current, segment)
    }
}

/// Prefix-closed set of permitted relation paths
///
/// Built once per entity service and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedJoinSet {
    paths: BTreeSet<String>,
}

impl AllowedJoinSet {
    /// Insert every given path together with all of its strict prefixes
    ///
    /// Empty segments are skipped, so `"posts..comments"` and `"posts.comments"`
    /// are the same path.
    ///
    /// ```
    /// use crudguard_core::joins::AllowedJoinSet;
    ///
    /// let set = AllowedJoinSet::build(["posts.comments"]);
    /// assert!(set.contains("posts"));
    /// assert!(set.contains("posts.comments"));
    /// assert!(!set.contains("posts.comments.post"));
    /// ```
    pub fn build<I, S>(allowed_joins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut paths = BTreeSet::new();
        for join in allowed_joins {
            let mut prefix = String::new();
            for segment in join.as_ref().split('.').filter(|s| !s.is_empty()) {
                prefix = join_path(&prefix, segment);
                paths.insert(prefix.clone());
            }
        }
        Self { paths }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Fail with `JoinNotAllowed` unless `path` is permitted
    pub fn require_join(&self, path: &str) -> Result<()> {
        if self.contains(path) {
            Ok(())
        } else {
            Err(CrudError::JoinNotAllowed {
                path: path.to_string(),
            }
            .into())
        }
    }

    /// Fail with `RelationNotAllowed` unless `path` is permitted
    pub fn require_relation(&self, path: &str) -> Result<()> {
        if self.contains(path) {
            Ok(())
        } else {
            Err(CrudError::RelationNotAllowed {
                path: path.to_string(),
            }
            .into())
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Check configured default joins against the allowlist
///
/// Returns the defaults de-duplicated in first-seen order. A default outside
/// the allowlist is a configuration error, raised at construction time.
///
/// # Errors
///
/// `DefaultJoinNotAllowed` naming the first offending path.
pub fn validate_default_joins(
    default_joins: &[String],
    allowed: &AllowedJoinSet,
) -> Result<Vec<String>> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for join in default_joins {
        if !allowed.contains(join) {
            return Err(CrudError::DefaultJoinNotAllowed { path: join.clone() }.into());
        }
        if seen.insert(join.as_str()) {
            out.push(join.clone());
        }
    }
    Ok(out)
}
