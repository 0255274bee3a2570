use super::*;

/// Additive sufficient statistics over a set of points.
///
/// A feature is the classic BIRCH triple (n, LS, SS): the number of
/// points absorbed, their componentwise linear sum, and their
/// componentwise sum of squares. Features are additive, so a node can
/// summarize its whole subtree by folding its entries together without
/// ever revisiting raw points.
///
/// A feature is either **interior** (it owns a child node by id) or a
/// **leaf subcluster** (it carries the indices of the points it has
/// absorbed). Never both.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Number of points summarized.
    n: usize,
    /// Componentwise linear sum of all points.
    sum_x: Vec<Scalar>,
    /// Componentwise sum of squares of all points.
    sum_x2: Vec<Scalar>,
    /// Child node in the arena; present only on interior features.
    child: Option<NodeId>,
    /// Indices of absorbed points; populated only at leaves.
    members: Vec<usize>,
    /// Subcluster id assigned by labeling, in leaf-chain order.
    label: Option<usize>,
}

impl Feature {
    /// Summarizes a single point.
    pub fn from_point(point: &[Scalar], index: usize) -> Self {
        Self {
            n: 1,
            sum_x: point.to_vec(),
            sum_x2: point.iter().map(|x| x * x).collect(),
            child: None,
            members: vec![index],
            label: None,
        }
    }

    /// An empty aggregate owning `child`; fold entries in via [`Self::update`].
    pub(crate) fn over(child: NodeId) -> Self {
        Self {
            n: 0,
            sum_x: Vec::new(),
            sum_x2: Vec::new(),
            child: Some(child),
            members: Vec::new(),
            label: None,
        }
    }

    /// Additive merge of `other` into this feature.
    ///
    /// Member lists concatenate only when this feature has no child;
    /// interior features accumulate statistics alone, since the points
    /// themselves live further down the tree.
    pub fn update(&mut self, other: &Feature) {
        if self.n == 0 {
            self.sum_x = other.sum_x.clone();
            self.sum_x2 = other.sum_x2.clone();
        } else {
            debug_assert_eq!(self.dimension(), other.dimension(), "mismatched feature dimensions");
            for (a, b) in self.sum_x.iter_mut().zip(&other.sum_x) {
                *a += b;
            }
            for (a, b) in self.sum_x2.iter_mut().zip(&other.sum_x2) {
                *a += b;
            }
        }
        self.n += other.n;
        if self.child.is_none() {
            self.members.extend_from_slice(&other.members);
        }
    }

    /// Distance to `other` under `metric`.
    pub fn distance(&self, other: &Feature, metric: Metric) -> Scalar {
        metric.distance(self, other)
    }

    /// Whether `other` should be absorbed into this feature.
    ///
    /// A distance of exactly zero always absorbs, even with a zero
    /// threshold, so duplicate centroids can never coexist in a leaf.
    pub fn within(&self, other: &Feature, threshold: Scalar, metric: Metric) -> bool {
        let d = self.distance(other, metric);
        d == 0. || d <= threshold
    }

    /// Number of points summarized.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Dimensionality of the summarized points.
    pub fn dimension(&self) -> usize {
        self.sum_x.len()
    }

    /// Componentwise linear sum.
    pub fn sum_x(&self) -> &[Scalar] {
        &self.sum_x
    }

    /// Componentwise sum of squares.
    pub fn sum_x2(&self) -> &[Scalar] {
        &self.sum_x2
    }

    /// Mean point of the summarized set.
    pub fn centroid(&self) -> Vec<Scalar> {
        assert!(self.n > 0, "centroid of an empty feature");
        let n = self.n as Scalar;
        self.sum_x.iter().map(|x| x / n).collect()
    }

    /// Child node id, present only on interior features.
    pub fn child(&self) -> Option<NodeId> {
        self.child
    }

    /// Indices of the points absorbed into this leaf subcluster.
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    /// Subcluster id, assigned once labeling has run.
    pub fn label(&self) -> Option<usize> {
        self.label
    }

    pub(crate) fn set_label(&mut self, label: usize) {
        self.label = Some(label);
    }
}
