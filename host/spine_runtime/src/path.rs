use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Structural position of a node: child indices from the root.
///
/// Paths are immutable and cheap to clone. They ride inside outbound
/// messages, so the segments are shared with `Arc`. [`Path::key`] gives the
/// canonical string used wherever a path has to index a lookup table.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Path(Arc<[u32]>);

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, index: u32) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend_from_slice(&self.0);
        segments.push(index);
        Self(segments.into())
    }

    pub fn segments(&self) -> &[u32] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Dot-separated indices, `""` for the root.
    pub fn key(&self) -> String {
        let mut out = String::new();
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            out.push_str(&segment.to_string());
        }
        out
    }
}

impl From<Vec<u32>> for Path {
    fn from(segments: Vec<u32>) -> Self {
        Self(segments.into())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path[{}]", self.key())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.key())
        }
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.segments().serialize(serializer)
    }
}
