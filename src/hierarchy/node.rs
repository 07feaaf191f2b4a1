//! Arena node for the lineage hierarchy.

use core::fmt;

/// A single lineage in the phylogenetic hierarchy.
///
/// Nodes live in a [`LineageTree`](super::LineageTree) arena and refer to
/// each other by dense index (`lindex`), not by reference. The index of a
/// node equals the rank of its name in the sorted set of all names, so the
/// arena doubles as a name-sorted array.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineageNode {
    /// Unique lineage name (e.g. `BA.2.12.1`).
    pub name: String,
    /// Canonical (dealiased) name used for sort order and display.
    pub alias: String,
    /// Arena index of the parent. The root points to itself.
    pub parent: usize,
    /// Arena indices of children, in record order.
    pub children: Vec<usize>,
    /// Dense index of this node; equal to its position in the arena.
    pub lindex: usize,
}

impl LineageNode {
    /// Whether this node is the root (self-parent sentinel).
    pub fn is_root(&self) -> bool {
        self.parent == self.lindex
    }

    /// Whether this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

impl fmt::Display for LineageNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.alias {
            write!(f, "{}[{}]", self.name, self.lindex)
        } else {
            write!(f, "{} ({})[{}]", self.alias, self.name, self.lindex)
        }
    }
}
