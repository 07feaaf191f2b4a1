//! The lineage hierarchy arena and name lookup.
//!
//! The hierarchy is built once from caller-supplied records and is immutable
//! afterwards; every algorithm in this crate shares it by reference. Nodes
//! are identified by a dense integer index (`lindex`) so that per-node state
//! (prevalence, membership flags) can live in flat arrays instead of
//! hash sets of deep structures.
//!
//! A synthetic wildcard root named `*` is always present and adopts every
//! record without a parent. The root is its own parent; that self-loop is
//! the "no parent" sentinel throughout the crate.
//!
//! All traversals here are iterative with explicit stacks. Hierarchy depth
//! is small for real data, but a malformed or adversarial input must not be
//! able to overflow the call stack.

use std::collections::BTreeMap;

use tracing::warn;

use super::node::LineageNode;
use super::validate::validate_records;
use crate::error::{Error, Result};

/// Name of the synthetic wildcard root.
pub const ROOT_NAME: &str = "*";

/// One caller-supplied lineage before arena construction.
///
/// Records with `parent = None` become children of the wildcard root.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineageRecord {
    /// Unique lineage name.
    pub name: String,
    /// Canonical (dealiased) display name.
    pub alias: String,
    /// Parent lineage name, if any.
    pub parent: Option<String>,
}

impl LineageRecord {
    /// Convenience constructor.
    pub fn new(
        name: impl Into<String>,
        alias: impl Into<String>,
        parent: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
            parent: parent.map(str::to_owned),
        }
    }
}

/// An immutable rooted hierarchy of [`LineageNode`]s.
///
/// Node indices (`lindex`) form the contiguous range `[0, len)`. The arena
/// is sorted by name, so name resolution is a binary search.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineageTree {
    nodes: Vec<LineageNode>,
    root: usize,
}

impl LineageTree {
    /// Build a validated hierarchy from lineage records.
    ///
    /// A wildcard `*` root is added and every parentless record is attached
    /// to it. Duplicate names, dangling parent references, self-parented
    /// records, and cycles are rejected with [`Error::InvalidStructure`].
    pub fn from_records(records: &[LineageRecord]) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::EmptyInput);
        }

        let report = validate_records(records);
        if !report.is_healthy() {
            return Err(Error::InvalidStructure { report });
        }

        // lindex = rank of name among sorted names, root included.
        let mut names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        names.push(ROOT_NAME);
        names.sort_unstable();
        let index_of = |name: &str| -> usize {
            // Names validated unique and present.
            names.binary_search(&name).unwrap_or(usize::MAX)
        };

        let root = index_of(ROOT_NAME);
        let mut nodes: Vec<LineageNode> = names
            .iter()
            .enumerate()
            .map(|(i, &name)| LineageNode {
                name: name.to_owned(),
                alias: name.to_owned(),
                parent: if i == root { root } else { usize::MAX },
                children: Vec::new(),
                lindex: i,
            })
            .collect();

        for record in records {
            let child = index_of(&record.name);
            let parent = match record.parent.as_deref() {
                Some(p) => index_of(p),
                None => root,
            };
            nodes[child].alias = record.alias.clone();
            nodes[child].parent = parent;
            nodes[parent].children.push(child);
        }

        let tree = Self { nodes, root };

        // Reachability re-check on the arena itself: a cycle among records
        // leaves nodes unreached even when every parent name resolves.
        let reached = tree.post_order().len();
        if reached != tree.len() {
            let mut report = super::validate::ValidationReport::new();
            report.critical(format!(
                "{} nodes unreachable from the root",
                tree.len() - reached
            ));
            return Err(Error::InvalidStructure { report });
        }

        Ok(tree)
    }

    /// Node by arena index.
    pub fn node(&self, lindex: usize) -> &LineageNode {
        &self.nodes[lindex]
    }

    /// All nodes, in name-sorted (= lindex) order.
    pub fn nodes(&self) -> &[LineageNode] {
        &self.nodes
    }

    /// Number of nodes, wildcard root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty. A built tree never is.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Index of the wildcard root.
    pub fn root(&self) -> usize {
        self.root
    }

    /// Resolve a lineage name to its arena index.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes
            .binary_search_by(|n| n.name.as_str().cmp(name))
            .ok()
    }

    /// Walk parent links from `start` until the self-loop sentinel.
    ///
    /// Handles clustering calls rooted at a sub-tree: the caller's root may
    /// not be the global one.
    pub fn global_root_from(&self, start: usize) -> usize {
        let mut cur = start;
        while self.nodes[cur].parent != cur {
            cur = self.nodes[cur].parent;
        }
        cur
    }

    /// Indices of the whole tree in an order where every node appears after
    /// all of its descendants (reverse preorder).
    pub fn post_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(i) = stack.pop() {
            order.push(i);
            stack.extend_from_slice(&self.nodes[i].children);
        }
        order.reverse();
        order
    }

    /// All strict descendants of `lindex`, preorder.
    pub fn descendants(&self, lindex: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self.nodes[lindex].children.clone();
        while let Some(i) = stack.pop() {
            out.push(i);
            stack.extend_from_slice(&self.nodes[i].children);
        }
        out
    }

    /// Whether any node of the subtree rooted at `lindex` (itself included)
    /// satisfies the membership mask.
    pub(crate) fn subtree_intersects(&self, lindex: usize, member: &[bool]) -> bool {
        let mut stack = vec![lindex];
        while let Some(i) = stack.pop() {
            if member[i] {
                return true;
            }
            stack.extend_from_slice(&self.nodes[i].children);
        }
        false
    }

    /// Build the name → index lookup for this hierarchy.
    pub fn lineage_key(&self) -> LineageKey {
        LineageKey::build(self)
    }
}

/// Ordered mapping from lineage name to arena index.
///
/// Built once per hierarchy snapshot and read-only thereafter. Iteration is
/// in name order.
#[derive(Debug, Clone, Default)]
pub struct LineageKey {
    map: BTreeMap<String, usize>,
}

impl LineageKey {
    /// Build the key by a full traversal of the hierarchy.
    pub fn build(tree: &LineageTree) -> Self {
        let map = tree
            .nodes()
            .iter()
            .map(|n| (n.name.clone(), n.lindex))
            .collect();
        Self { map }
    }

    /// Look up a name.
    pub fn get(&self, name: &str) -> Option<usize> {
        self.map.get(name).copied()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the key is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate `(name, lindex)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.map.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// Descendant-aware name expansion: the names of `name` and every
    /// lineage below it.
    ///
    /// An unknown name cannot be dealiased, so the query degrades to an
    /// exact-name match (the name itself) with a warning rather than an
    /// error.
    pub fn family(&self, tree: &LineageTree, name: &str) -> Vec<String> {
        match self.get(name) {
            Some(idx) => {
                let mut out = vec![tree.node(idx).name.clone()];
                out.extend(
                    tree.descendants(idx)
                        .into_iter()
                        .map(|d| tree.node(d).name.clone()),
                );
                out
            }
            None => {
                warn!(lineage = name, "name not in lineage key; treating as exact match");
                vec![name.to_owned()]
            }
        }
    }
}
