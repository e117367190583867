//! Logical resource identifiers
//!
//! Resources are identified by a logical path (a sequence of name
//! segments rooted at the workspace) plus a kind. Paths are plain values;
//! ancestor walks iterate segments rather than chasing parent pointers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A logical path within the workspace. The root is the empty path; the
/// first segment names a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourcePath {
    segments: Vec<String>,
}

impl ResourcePath {
    /// The workspace root path.
    pub fn root() -> Self {
        ResourcePath::default()
    }

    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ResourcePath {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a `/`-separated path. Empty segments are dropped, so
    /// `"/proj/src"`, `"proj/src"` and `"proj//src/"` are the same path.
    pub fn parse(path: &str) -> Self {
        ResourcePath::new(path.split('/').filter(|s| !s.is_empty()))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments; the root has depth zero.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The last segment, if any.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<ResourcePath> {
        if self.is_root() {
            return None;
        }
        Some(ResourcePath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// The project path (first segment), if this path is below the root.
    pub fn project(&self) -> Option<ResourcePath> {
        self.segments.first().map(|p| ResourcePath::new([p.clone()]))
    }

    pub fn join(&self, name: impl Into<String>) -> ResourcePath {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        ResourcePath { segments }
    }

    /// True if `self` equals `prefix` or lies below it. The root path is
    /// a prefix of every path.
    pub fn starts_with(&self, prefix: &ResourcePath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    File,
    Folder,
    Project,
    Root,
}

/// Tree traversal depth for bulk load operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinite,
}

/// A workspace resource: a logical path plus its kind.
///
/// Container kinds are derived from depth (root, project, folder); files
/// are constructed explicitly since a phantom file's kind cannot be
/// inferred from the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Resource {
    path: ResourcePath,
    kind: ResourceKind,
}

impl Resource {
    pub fn root() -> Self {
        Resource {
            path: ResourcePath::root(),
            kind: ResourceKind::Root,
        }
    }

    /// A file resource at the given path.
    pub fn file(path: ResourcePath) -> Self {
        Resource {
            path,
            kind: ResourceKind::File,
        }
    }

    /// A container resource at the given path; the kind follows depth.
    pub fn folder(path: ResourcePath) -> Self {
        let kind = match path.depth() {
            0 => ResourceKind::Root,
            1 => ResourceKind::Project,
            _ => ResourceKind::Folder,
        };
        Resource { path, kind }
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The resource's leaf name; empty for the root.
    pub fn name(&self) -> &str {
        self.path.name().unwrap_or_default()
    }

    /// The parent container, if any.
    pub fn parent(&self) -> Option<Resource> {
        self.path.parent().map(Resource::folder)
    }

    /// The enclosing project, if the resource is below the root.
    pub fn project(&self) -> Option<Resource> {
        self.path.project().map(Resource::folder)
    }

    pub fn is_container(&self) -> bool {
        !matches!(self.kind, ResourceKind::File)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let path = ResourcePath::parse("/proj/src/main.rs");
        assert_eq!(path.depth(), 3);
        assert_eq!(path.name(), Some("main.rs"));
        assert_eq!(path.to_string(), "/proj/src/main.rs");
        assert_eq!(ResourcePath::root().to_string(), "/");
        assert_eq!(ResourcePath::parse("proj//src/"), ResourcePath::parse("/proj/src"));
    }

    #[test]
    fn ancestry() {
        let path = ResourcePath::parse("/proj/src/main.rs");
        let parent = path.parent().unwrap();
        assert_eq!(parent, ResourcePath::parse("/proj/src"));
        assert_eq!(path.project().unwrap(), ResourcePath::parse("/proj"));
        assert!(path.starts_with(&parent));
        assert!(path.starts_with(&ResourcePath::root()));
        assert!(!parent.starts_with(&path));
        assert!(ResourcePath::root().parent().is_none());
    }

    #[test]
    fn container_kinds_follow_depth() {
        assert_eq!(Resource::folder(ResourcePath::root()).kind(), ResourceKind::Root);
        assert_eq!(
            Resource::folder(ResourcePath::parse("/proj")).kind(),
            ResourceKind::Project
        );
        assert_eq!(
            Resource::folder(ResourcePath::parse("/proj/src")).kind(),
            ResourceKind::Folder
        );
        let file = Resource::file(ResourcePath::parse("/proj/a.txt"));
        assert_eq!(file.kind(), ResourceKind::File);
        assert_eq!(file.parent().unwrap().kind(), ResourceKind::Project);
    }
}
