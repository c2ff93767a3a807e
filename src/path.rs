// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! The `/`-separated path algebra described in spec §4.1.
//!
//! A [`Path`] is immutable once constructed: every derivation (`resolve`,
//! `normalize`, `relativize`, …) returns a new value. Segments never
//! contain `/`; runs of `/` collapse on parse, matching how the real SFTP
//! server is expected to see names (the server, not this crate, validates
//! what characters a segment may contain).

use crate::error::{Error, ErrorKind, Result};
use std::fmt;

/// An immutable, `/`-separated path.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Path {
    absolute: bool,
    segments: Vec<String>,
}

impl Path {
    /// Parse `raw` into a [`Path`], collapsing repeated separators.
    ///
    /// `/a//b/` and `a/b` both parse; the former is absolute, the latter
    /// relative. A trailing separator carries no meaning once parsed back
    /// into segments (it is restored by [`Path::to_string`] only for the
    /// root path itself).
    pub fn parse(raw: &str) -> Path {
        let absolute = raw.starts_with('/');
        let segments = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        Path { absolute, segments }
    }

    /// The single-character root path `/`.
    pub fn root() -> Path {
        Path {
            absolute: true,
            segments: Vec::new(),
        }
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn is_root(&self) -> bool {
        self.absolute && self.segments.is_empty()
    }

    pub fn get_name_count(&self) -> usize {
        self.segments.len()
    }

    /// The `i`-th segment, counting from the root/start, as its own
    /// relative single-segment path.
    pub fn get_name(&self, i: usize) -> Option<Path> {
        self.segments.get(i).map(|s| Path {
            absolute: false,
            segments: vec![s.clone()],
        })
    }

    pub fn get_file_name(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    /// A slice of segments `[begin, end)` as a relative path.
    pub fn subpath(&self, begin: usize, end: usize) -> Path {
        Path {
            absolute: false,
            segments: self.segments[begin.min(self.segments.len())..end.min(self.segments.len())]
                .to_vec(),
        }
    }

    pub fn get_parent(&self) -> Option<Path> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Path {
            absolute: self.absolute,
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn get_root(&self) -> Option<Path> {
        if self.absolute {
            Some(Path::root())
        } else {
            None
        }
    }

    /// Eliminate `.` segments and resolve non-leading `..` segments against
    /// their preceding sibling. A leading `..` on an absolute path is
    /// discarded (you cannot go above `/`); on a relative path it is kept
    /// when there is no preceding normal segment to cancel against.
    pub fn normalize(&self) -> Path {
        let mut out: Vec<String> = Vec::with_capacity(self.segments.len());
        for seg in &self.segments {
            match seg.as_str() {
                "." => continue,
                ".." => match out.last().map(|s| s.as_str()) {
                    Some(last) if last != ".." => {
                        out.pop();
                    }
                    _ => {
                        if self.absolute {
                            // discard: cannot escape the root
                        } else {
                            out.push("..".to_string());
                        }
                    }
                },
                _ => out.push(seg.clone()),
            }
        }
        Path {
            absolute: self.absolute,
            segments: out,
        }
    }

    /// If `other` is absolute, return it unchanged; otherwise concatenate.
    pub fn resolve(&self, other: &Path) -> Path {
        if other.absolute {
            return other.clone();
        }
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Path {
            absolute: self.absolute,
            segments,
        }
    }

    pub fn resolve_str(&self, other: &str) -> Path {
        self.resolve(&Path::parse(other))
    }

    /// Equivalent to `self.parent().resolve(other)`; if `self` has no
    /// parent, returns `other` unchanged.
    pub fn resolve_sibling(&self, other: &Path) -> Path {
        match self.get_parent() {
            Some(parent) => parent.resolve(other),
            None => other.clone(),
        }
    }

    /// The minimal sequence of `..`/name segments that, resolved against
    /// `self`, yields `other`. Both paths must share the same
    /// absolute/relative polarity.
    pub fn relativize(&self, other: &Path) -> Result<Path> {
        if self.absolute != other.absolute {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "cannot relativize paths of differing polarity",
            )
            .with_operation("relativize"));
        }
        let a = self.normalize();
        let b = other.normalize();

        let common = a
            .segments
            .iter()
            .zip(b.segments.iter())
            .take_while(|(x, y)| x == y)
            .count();

        let mut segments = Vec::new();
        for _ in common..a.segments.len() {
            segments.push("..".to_string());
        }
        segments.extend(b.segments[common..].iter().cloned());

        Ok(Path {
            absolute: false,
            segments,
        })
    }

    /// Resolve against `default_directory` when `self` is relative.
    pub fn to_absolute(&self, default_directory: &Path) -> Path {
        if self.absolute {
            self.clone()
        } else {
            default_directory.resolve(self)
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute && self.segments.is_empty() {
            return write!(f, "/");
        }
        if self.absolute {
            write!(f, "/")?;
        }
        write!(f, "{}", self.segments.join("/"))
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path::parse(s)
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Path::parse(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_collapses_repeated_separators() {
        assert_eq!(Path::parse("/a//b///c").to_string(), "/a/b/c");
        assert_eq!(Path::parse("a/b").to_string(), "a/b");
        assert_eq!(Path::parse("").to_string(), "");
        assert_eq!(Path::parse("/").to_string(), "/");
    }

    #[test]
    fn parse_preserves_polarity() {
        assert!(Path::parse("/a/b").is_absolute());
        assert!(!Path::parse("a/b").is_absolute());
    }

    #[test]
    fn normalize_removes_dot_and_resolves_dotdot() {
        assert_eq!(Path::parse("/a/./b/../c").normalize().to_string(), "/a/c");
        assert_eq!(Path::parse("a/../../b").normalize().to_string(), "../b");
        assert_eq!(Path::parse("/../a").normalize().to_string(), "/a");
    }

    #[test]
    fn normalize_is_idempotent() {
        let p = Path::parse("/a/./b/../c/../../d");
        assert_eq!(p.normalize().normalize(), p.normalize());
    }

    #[test]
    fn resolve_absolute_other_wins() {
        let base = Path::parse("/a/b");
        assert_eq!(base.resolve_str("/x").to_string(), "/x");
        assert_eq!(base.resolve_str("x/y").to_string(), "/a/b/x/y");
    }

    #[test]
    fn resolve_then_relativize_is_empty() {
        let p = Path::parse("/a/b");
        let q = Path::parse("c/d");
        let resolved = p.resolve(&q);
        let rel = resolved.relativize(&resolved).unwrap();
        assert_eq!(rel.to_string(), "");
        assert!(!rel.is_absolute());
    }

    #[test]
    fn relativize_produces_dotdot_sequence() {
        let a = Path::parse("/a/b/c");
        let b = Path::parse("/a/x/y");
        let rel = a.relativize(&b).unwrap();
        assert_eq!(rel.to_string(), "../../x/y");
    }

    #[test]
    fn relativize_rejects_mixed_polarity() {
        let a = Path::parse("/a/b");
        let b = Path::parse("c/d");
        let err = a.relativize(&b).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn root_resolve_relative_is_absolute() {
        let root = Path::root();
        let rel = Path::parse("a/b");
        assert!(root.resolve(&rel).is_absolute());
    }

    #[test]
    fn resolve_sibling_uses_parent() {
        let p = Path::parse("/a/b/c");
        assert_eq!(p.resolve_sibling(&Path::parse("d")).to_string(), "/a/b/d");
        let root = Path::parse("/only");
        // `/only` has a parent (the root), exercise the no-parent branch via
        // a single relative segment instead.
        let single = Path::parse("only");
        assert_eq!(single.resolve_sibling(&Path::parse("x")).to_string(), "x");
        let _ = root;
    }

    #[test]
    fn name_and_subpath_accessors() {
        let p = Path::parse("/a/b/c");
        assert_eq!(p.get_name_count(), 3);
        assert_eq!(p.get_name(1).unwrap().to_string(), "b");
        assert_eq!(p.subpath(1, 3).to_string(), "b/c");
        assert_eq!(p.get_file_name(), Some("c"));
        assert_eq!(p.get_parent().unwrap().to_string(), "/a/b");
        assert_eq!(p.get_root().unwrap().to_string(), "/");
    }

    #[test]
    fn to_absolute_resolves_against_default_directory() {
        let default_dir = Path::parse("/home/alice");
        assert_eq!(
            Path::parse("docs/file.txt")
                .to_absolute(&default_dir)
                .to_string(),
            "/home/alice/docs/file.txt"
        );
        assert_eq!(
            Path::parse("/etc/passwd")
                .to_absolute(&default_dir)
                .to_string(),
            "/etc/passwd"
        );
    }
}
