//! The phylogenetic lineage hierarchy.
//!
//! A hierarchy is an immutable rooted tree of named lineages. Instead of a
//! pointer- or hash-based tree, nodes live in an **arena** and carry a dense
//! integer index (`lindex`), so set membership and per-node state are flat
//! array lookups:
//!
//! ```text
//! records                    arena (name-sorted)
//! ───────────────────        ────────────────────────────
//! BA.2    parent BA          0: *      root, parent = 0
//! BA      parent B           1: B      parent = 0
//! B       (top level)        2: BA     parent = 1
//!                            3: BA.2   parent = 2
//! ```
//!
//! - [`LineageTree::from_records`] builds and validates the arena
//! - [`LineageKey`] is the ordered name → index lookup
//! - [`validate_records`] reports structural problems before construction

mod node;
mod tree;
mod validate;

pub use node::LineageNode;
pub use tree::{LineageKey, LineageRecord, LineageTree, ROOT_NAME};
pub use validate::{validate_records, Severity, ValidationIssue, ValidationReport};
