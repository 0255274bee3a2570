use super::*;

/// Result of inserting a feature into a node.
///
/// A node never restructures itself: when an insertion leaves it over
/// capacity it signals `Split` and the caller (its parent, or the tree
/// for the root) resolves the overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Absorbed,
    Split,
}

/// A capacity-bounded, ordered collection of features.
///
/// Leaf nodes hold subcluster features and are threaded into the global
/// leaf chain via `prev`/`next` arena ids; interior nodes hold
/// aggregate features that each own a child node. Capacity may exceed
/// the branching factor by exactly one entry while an insertion call is
/// in flight, and the caller must resolve that before returning.
///
/// All geometry here is exact: closest/farthest scans are brute force
/// over the node's own entries, with ties going to the first entry in
/// scan order.
#[derive(Debug)]
pub struct Node {
    entries: Vec<Feature>,
    leaf: bool,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

impl Node {
    /// An empty leaf node, not yet threaded into the chain.
    pub fn leaf() -> Self {
        Self::with_leafness(true)
    }

    /// An empty interior node.
    pub fn interior() -> Self {
        Self::with_leafness(false)
    }

    /// An empty node matching the leafness of a node being split.
    pub fn with_leafness(leaf: bool) -> Self {
        Self {
            entries: Vec::new(),
            leaf,
            prev: None,
            next: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.leaf
    }

    pub fn entries(&self) -> &[Feature] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Vec<Feature> {
        &mut self.entries
    }

    pub(crate) fn into_entries(self) -> Vec<Feature> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Previous leaf in the chain; `None` outside the chain.
    pub fn prev(&self) -> Option<NodeId> {
        self.prev
    }

    /// Next leaf in the chain; `None` for the last leaf.
    pub fn next(&self) -> Option<NodeId> {
        self.next
    }

    pub(crate) fn set_prev(&mut self, prev: Option<NodeId>) {
        debug_assert!(self.leaf, "only leaves join the chain");
        self.prev = prev;
    }

    pub(crate) fn set_next(&mut self, next: Option<NodeId>) {
        self.next = next;
    }

    /// Index of the entry nearest to `probe`.
    pub fn closest(&self, probe: &Feature, metric: Metric) -> Option<usize> {
        let mut best = None;
        let mut least = Scalar::INFINITY;
        for (i, entry) in self.entries.iter().enumerate() {
            let d = metric.distance(entry, probe);
            if d < least {
                least = d;
                best = Some(i);
            }
        }
        best
    }

    /// The two entries closest together, in scan order.
    pub fn closest_pair(&self, metric: Metric) -> Option<(usize, usize)> {
        self.scan_pairs(metric, |d, best| d < best, Scalar::INFINITY)
    }

    /// The two entries farthest apart, in scan order.
    pub fn farthest_pair(&self, metric: Metric) -> Option<(usize, usize)> {
        self.scan_pairs(metric, |d, best| d > best, Scalar::NEG_INFINITY)
    }

    /// Exact O(k²) pair scan; first-found wins on ties.
    fn scan_pairs(
        &self,
        metric: Metric,
        better: impl Fn(Scalar, Scalar) -> bool,
        seed: Scalar,
    ) -> Option<(usize, usize)> {
        let mut best = None;
        let mut record = seed;
        for i in 0..self.entries.len() {
            for j in (i + 1)..self.entries.len() {
                let d = metric.distance(&self.entries[i], &self.entries[j]);
                if better(d, record) {
                    record = d;
                    best = Some((i, j));
                }
            }
        }
        best
    }
}
