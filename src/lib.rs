//! Memory-bounded BIRCH incremental clustering.
//!
//! This crate summarizes an unbounded stream of points into a bounded
//! tree of additive sufficient statistics. Each point is absorbed into
//! the nearest micro-cluster (a [`Feature`]) or opens a new one; nodes
//! that outgrow the branching factor split; and when an approximate
//! memory estimate crosses a configured budget, the whole tree rebuilds
//! itself from its own leaf features under an enlarged threshold.
//!
//! ## Pipeline
//!
//! 1. **Insert** — descend from the root to a leaf, absorbing or
//!    appending the new point's feature
//! 2. **Split** — overflow propagates upward; the root split grows the
//!    tree by one level
//! 3. **Refine** — optional merging refinement repacks siblings after a
//!    split
//! 4. **Rebuild** — over budget, re-insert every leaf feature into a
//!    fresh tree with a larger absorption threshold
//! 5. **Label** — freeze subcluster ids in leaf-chain order and map
//!    query points to them
//!
//! ## Core Types
//!
//! - [`Feature`] — additive (count, linear sum, sum of squares) summary
//! - [`Node`] — capacity-bounded entry collection, threaded into the
//!   global leaf chain
//! - [`Tree`] — insertion, splitting, labeling, and the rebuild policy
//! - [`Metric`] — the five classic BIRCH distance functions D0–D4
//! - [`MemoryEstimator`] — injectable sizing capability driving rebuilds
mod arena;
mod config;
mod error;
mod feature;
mod memory;
mod metric;
mod node;
mod tests;
mod tree;

pub use arena::*;
pub use config::*;
pub use error::*;
pub use feature::*;
pub use memory::*;
pub use metric::*;
pub use node::*;
pub use tests::*;
pub use tree::*;

/// Point coordinates, sufficient statistics, and distances.
pub type Scalar = f64;
