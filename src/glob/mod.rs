// src/glob/mod.rs

//! Filter normalization and glob matching.
//!
//! Watch filters arrive in two forms: exact relative paths
//! (`"sub/a.txt"`) and glob patterns (`"**/*.rs"`, `"logs/"`). This module
//! normalizes them to forward-slash relative form, rejects filters that
//! point outside the watched root, and compiles the glob form into a
//! matcher over relative paths.
//!
//! Pattern language: `*` matches within one path segment, `**` crosses
//! segments, `?` matches a single character, a trailing separator means
//! "this directory and everything under it", and `*.*` is a synonym for
//! `*`. Matching is case-insensitive ordinal.

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::errors::Result;

/// A watch filter after normalization, routed to the registry it belongs in.
///
/// A filter containing `*` (or one that ended with a directory separator)
/// is a wildcard; anything else is an exact relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedFilter {
    Exact(String),
    Wildcard(String),
}

/// Normalize a watch filter.
///
/// - `\` becomes `/` so Windows-style input matches POSIX-style events.
/// - Absolute paths and filters that escape the root via `..` yield `None`;
///   callers hand out the no-op token for those.
/// - A trailing separator is expanded to `<dir>/**`.
/// - Any segment equal to `*.*` is rewritten to `*`.
pub fn normalize_filter(filter: &str) -> Option<NormalizedFilter> {
    let slashed = filter.replace('\\', "/");
    if is_absolute_like(&slashed) {
        return None;
    }
    let had_trailing = slashed.ends_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for seg in slashed.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                // Escaping the watched root is not a watchable filter.
                segments.pop()?;
            }
            "*.*" => segments.push("*"),
            other => segments.push(other),
        }
    }

    let normalized = segments.join("/");
    if normalized.is_empty() {
        return if had_trailing {
            Some(NormalizedFilter::Wildcard("**".to_string()))
        } else {
            None
        };
    }
    if had_trailing {
        return Some(NormalizedFilter::Wildcard(format!("{normalized}/**")));
    }
    if normalized.contains('*') {
        return Some(NormalizedFilter::Wildcard(normalized));
    }
    Some(NormalizedFilter::Exact(normalized))
}

/// Clean a provider subpath into a forward-slash relative path.
///
/// Same rejection rules as [`normalize_filter`] but without any wildcard
/// handling: absolute paths and `..` escapes yield `None`. An empty result
/// (e.g. `"."`) maps to `Some("")`, meaning the root itself.
pub fn to_relative_path(subpath: &str) -> Option<String> {
    let slashed = subpath.replace('\\', "/");
    if is_absolute_like(&slashed) {
        return None;
    }
    let mut segments: Vec<&str> = Vec::new();
    for seg in slashed.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    Some(segments.join("/"))
}

fn is_absolute_like(slashed: &str) -> bool {
    if slashed.starts_with('/') {
        return true;
    }
    // Windows drive prefix ("c:/...") on any platform.
    let bytes = slashed.as_bytes();
    bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic()
}

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// First tries a direct `strip_prefix(root)`; if that fails (symlinks,
/// differing absolute prefixes), canonicalizes both sides and tries again.
/// Returns `None` if the path cannot be related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_string_lossy().replace('\\', "/"));
    }

    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(rel.to_string_lossy().replace('\\', "/"));
        }
    }

    None
}

/// Compiled glob matcher over relative slash-separated paths.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    pattern: String,
    set: GlobSet,
}

impl PathMatcher {
    /// Compile a normalized wildcard pattern.
    ///
    /// `literal_separator` keeps `*` and `?` from crossing `/` (only `**`
    /// does); matching is case-insensitive ordinal.
    pub fn new(pattern: &str) -> Result<Self> {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .case_insensitive(true)
            .backslash_escape(false)
            .build()?;
        let mut builder = GlobSetBuilder::new();
        builder.add(glob);
        Ok(Self {
            pattern: pattern.to_string(),
            set: builder.build()?,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Test a relative slash-separated path against the pattern.
    pub fn is_match(&self, rel_path: &str) -> bool {
        self.set.is_match(rel_path)
    }
}
