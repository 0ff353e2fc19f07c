//! Location of a node inside a config tree, used in error messages.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Path from the root of a config tree to one of its nodes.
///
/// Paths are cheap to extend: `key` and `index` return a new path so a
/// recursive walk can hand each child its own location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NodePath {
    segments: Vec<Segment>,
}

impl NodePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Path rooted at a named top-level entry (e.g. a macro name).
    pub fn named(name: impl Into<String>) -> Self {
        Self::root().key(name)
    }

    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.into()));
        Self { segments }
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Self { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "<root>");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{key}")?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_display() {
        assert_eq!(NodePath::root().to_string(), "<root>");
        assert!(NodePath::root().is_root());
    }

    #[test]
    fn nested_display() {
        let path = NodePath::root().key("jobs").index(0).key("optimizer").key("lr");
        assert_eq!(path.to_string(), "jobs[0].optimizer.lr");
        assert_eq!(path.segments().len(), 4);
    }

    #[test]
    fn extending_leaves_parent_untouched() {
        let parent = NodePath::named("paths");
        let _child = parent.key("root");
        assert_eq!(parent.to_string(), "paths");
    }
}
