use super::*;

/// Incremental clustering tree.
///
/// Owns the node arena, the root, and the sentinel anchoring the global
/// leaf chain. Insertion descends from the root to a leaf, absorbing
/// the point into its nearest subcluster or opening a new one; overflow
/// propagates back up as node splits, and a root split grows the tree
/// by one level. When automatic rebuilding is enabled, an injectable
/// [`MemoryEstimator`] is consulted periodically and the tree rebuilds
/// itself from its own leaf features under an enlarged threshold once
/// the budget is crossed.
///
/// # Lifecycle
///
/// 1. `insert` points (optionally with explicit indices)
/// 2. `finished_inserting_data` to freeze subcluster ids
/// 3. `map_to_closest_subcluster` / `subcluster_members` to read results
///
/// A single tree is not safe for concurrent mutation; labeled lookups
/// (`map_to_closest_subcluster`, `map_all`) are read-only and may be
/// shared freely.
pub struct Tree {
    config: Config,
    arena: Arena,
    root: NodeId,
    sentinel: NodeId,
    /// Latched by the first insertion; later points must match.
    dimension: Option<usize>,
    inserted: usize,
    limit: Option<usize>,
    auto_rebuild: bool,
    period: usize,
    margin: f64,
    estimator: Box<dyn MemoryEstimator>,
}

impl Tree {
    /// A fresh tree under `config`; validation already happened in
    /// [`Config::new`], so construction cannot fail.
    pub fn new(config: Config) -> Self {
        let mut arena = Arena::default();
        let sentinel = arena.alloc(Node::leaf());
        let root = arena.alloc(Node::leaf());
        arena.node_mut(sentinel).set_next(Some(root));
        arena.node_mut(root).set_prev(Some(sentinel));
        Self {
            config,
            arena,
            root,
            sentinel,
            dimension: None,
            inserted: 0,
            limit: None,
            auto_rebuild: false,
            period: DEFAULT_REBUILD_PERIOD,
            margin: 1.,
            estimator: Box::new(SizeModel),
        }
    }

    // ------------------------------------------------------------------
    // configuration
    // ------------------------------------------------------------------

    /// Memory budget in bytes; crossing it triggers a rebuild when
    /// automatic rebuilding is on.
    pub fn set_memory_limit_bytes(&mut self, bytes: usize) {
        self.limit = Some(bytes);
    }

    /// Memory budget in mebibytes.
    pub fn set_memory_limit_mb(&mut self, mb: usize) {
        self.set_memory_limit_bytes(mb << 20);
    }

    /// Enables or disables the periodic rebuild check.
    pub fn set_auto_rebuild(&mut self, enabled: bool) {
        self.auto_rebuild = enabled;
    }

    /// Insertions between rebuild checks; clamped to at least one.
    pub fn set_rebuild_period(&mut self, period: usize) {
        self.period = period.max(1);
    }

    /// Safety margin applied to the memory limit: the rebuild fires at
    /// `limit × margin` bytes.
    pub fn set_rebuild_margin(&mut self, margin: f64) -> Result<()> {
        if !margin.is_finite() || margin <= 0. {
            return Err(Error::Config(format!(
                "rebuild margin must be finite and positive, got {}",
                margin
            )));
        }
        self.margin = margin;
        Ok(())
    }

    /// Replaces the sizing capability consulted by the rebuild policy.
    pub fn set_estimator<E: MemoryEstimator + 'static>(&mut self, estimator: E) {
        self.estimator = Box::new(estimator);
    }

    /// Current absorption threshold; grows monotonically across rebuilds.
    pub fn threshold(&self) -> Scalar {
        self.config.threshold()
    }

    /// Dimensionality latched by the first insertion.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Total points inserted over the session.
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    // ------------------------------------------------------------------
    // insertion
    // ------------------------------------------------------------------

    /// Inserts `point`, assigning it the next sequential index.
    pub fn insert(&mut self, point: &[Scalar]) -> Result<()> {
        self.insert_with_index(point, self.inserted)
    }

    /// Inserts `point` under a caller-chosen index.
    pub fn insert_with_index(&mut self, point: &[Scalar], index: usize) -> Result<()> {
        self.check_dimension(point)?;
        self.absorb(Feature::from_point(point, index));
        self.inserted += 1;
        if self.auto_rebuild && self.inserted % self.period == 0 {
            self.rebuild_if_over_budget();
        }
        Ok(())
    }

    fn check_dimension(&mut self, point: &[Scalar]) -> Result<()> {
        match self.dimension {
            Some(d) if d == point.len() => Ok(()),
            Some(d) => Err(Error::DimensionMismatch {
                expected: d,
                actual: point.len(),
            }),
            None if point.is_empty() => Err(Error::Config(
                "points must have at least one dimension".to_string(),
            )),
            None => {
                self.dimension = Some(point.len());
                Ok(())
            }
        }
    }

    /// Feature-level insertion entry point, shared by `insert` and the
    /// rebuild re-insertion path.
    fn absorb(&mut self, feature: Feature) {
        if let Outcome::Split = self.insert_at(self.root, feature) {
            self.split_root();
        }
    }

    /// Recursive descent. Returns `Split` exactly when the node at `id`
    /// is left over capacity for the caller to resolve.
    fn insert_at(&mut self, id: NodeId, feature: Feature) -> Outcome {
        let metric = self.config.metric();
        let threshold = self.config.threshold();
        let branching = self.config.branching();
        let Some(closest) = self.arena.node(id).closest(&feature, metric) else {
            self.arena.node_mut(id).entries_mut().push(feature);
            return Outcome::Absorbed;
        };
        match self.arena.node(id).entries()[closest].child() {
            Some(child) => {
                // keep the statistics to fold into the aggregate once
                // the subtree has taken the feature
                let delta = feature.clone();
                match self.insert_at(child, feature) {
                    Outcome::Absorbed => {
                        self.arena.node_mut(id).entries_mut()[closest].update(&delta);
                        Outcome::Absorbed
                    }
                    Outcome::Split => {
                        let (first, second) = self.split_node(child);
                        let pair = (first.child(), second.child());
                        let entries = self.arena.node_mut(id).entries_mut();
                        entries[closest] = first;
                        entries.insert(closest + 1, second);
                        if self.arena.node(id).len() > branching {
                            Outcome::Split
                        } else {
                            if self.config.refinement() {
                                self.merging_refinement(id, pair);
                            }
                            Outcome::Absorbed
                        }
                    }
                }
            }
            None => {
                debug_assert!(self.arena.node(id).is_leaf(), "childless entry outside a leaf");
                let absorbed =
                    self.arena.node(id).entries()[closest].within(&feature, threshold, metric);
                let node = self.arena.node_mut(id);
                if absorbed {
                    node.entries_mut()[closest].update(&feature);
                    Outcome::Absorbed
                } else if node.len() < branching {
                    node.entries_mut().push(feature);
                    Outcome::Absorbed
                } else {
                    // transient overflow by one entry, resolved by the caller
                    node.entries_mut().push(feature);
                    Outcome::Split
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // splitting
    // ------------------------------------------------------------------

    /// Splits the overflowing node at `id` around its farthest pair of
    /// entries, freeing it and returning the two replacement aggregates.
    ///
    /// Redistribution reorders the subtrees, so the chain segment the
    /// old node spanned is re-threaded to follow the new left-to-right
    /// order. Splitting a leaf is the degenerate case: the segment is
    /// just the two fresh leaves.
    fn split_node(&mut self, id: NodeId) -> (Feature, Feature) {
        let metric = self.config.metric();
        let (i, j) = self
            .arena
            .node(id)
            .farthest_pair(metric)
            .expect("split requires at least two entries");
        let leaf = self.arena.node(id).is_leaf();
        let seed_a = self.arena.node(id).entries()[i].clone();
        let seed_b = self.arena.node(id).entries()[j].clone();
        let prev = self
            .arena
            .node(self.leftmost_leaf(id))
            .prev()
            .expect("leaf chain anchored at sentinel");
        let next = self.arena.node(self.rightmost_leaf(id)).next();
        let a = self.arena.alloc(Node::with_leafness(leaf));
        let b = self.arena.alloc(Node::with_leafness(leaf));
        for entry in self.arena.free(id).into_entries() {
            let da = metric.distance(&entry, &seed_a);
            let db = metric.distance(&entry, &seed_b);
            let target = if da <= db { a } else { b };
            self.arena.node_mut(target).entries_mut().push(entry);
        }
        self.rebalance(a, b);
        let mut segment = self.leaves_under(a);
        segment.extend(self.leaves_under(b));
        let tail = self.link_run(prev, &segment);
        self.close_run(tail, next);
        (self.summarize(a), self.summarize(b))
    }

    /// Installs a brand-new root over the split halves of the old one,
    /// growing the tree by one level.
    fn split_root(&mut self) {
        log::debug!(
            "{:<32}{:<32}",
            "splitting root",
            format!("{} entries", self.arena.node(self.root).len())
        );
        let (first, second) = self.split_node(self.root);
        let mut root = Node::interior();
        root.entries_mut().push(first);
        root.entries_mut().push(second);
        self.root = self.arena.alloc(root);
    }

    /// Threads `run` into the chain after `cursor`, returning the new
    /// tail. The run's old links are overwritten, not read.
    fn link_run(&mut self, mut cursor: NodeId, run: &[NodeId]) -> NodeId {
        for &leaf in run {
            self.arena.node_mut(cursor).set_next(Some(leaf));
            self.arena.node_mut(leaf).set_prev(Some(cursor));
            cursor = leaf;
        }
        cursor
    }

    /// Terminates a re-threaded run, reconnecting its tail to `next`.
    fn close_run(&mut self, cursor: NodeId, next: Option<NodeId>) {
        self.arena.node_mut(cursor).set_next(next);
        if let Some(next) = next {
            self.arena.node_mut(next).set_prev(Some(cursor));
        }
    }

    /// Moves the leaf run under `cq` to sit directly after the run
    /// under `cp`, leaving any leaves between the two runs in place.
    fn shift_run(&mut self, cp: NodeId, cq: NodeId) {
        let first = self.leftmost_leaf(cq);
        let last = self.rightmost_leaf(cq);
        let prev = self.arena.node(first).prev().expect("leaf chain anchored at sentinel");
        let next = self.arena.node(last).next();
        self.arena.node_mut(prev).set_next(next);
        if let Some(next) = next {
            self.arena.node_mut(next).set_prev(Some(prev));
        }
        // when the runs are adjacent the excision rewires cp's tail,
        // so its successor must be read after it
        let tail = self.rightmost_leaf(cp);
        let after = self.arena.node(tail).next();
        self.arena.node_mut(tail).set_next(Some(first));
        self.arena.node_mut(first).set_prev(Some(tail));
        self.close_run(last, after);
    }

    /// Drops `id` out of the chain, stitching its neighbors together.
    fn unlink(&mut self, id: NodeId) {
        let prev = self.arena.node(id).prev().expect("leaf chain anchored at sentinel");
        let next = self.arena.node(id).next();
        self.arena.node_mut(prev).set_next(next);
        if let Some(next) = next {
            self.arena.node_mut(next).set_prev(Some(prev));
        }
    }

    /// A degenerate seed pair can capture every entry on one side; keep
    /// both halves populated so no aggregate ever goes empty.
    fn rebalance(&mut self, a: NodeId, b: NodeId) {
        if self.arena.node(b).is_empty() {
            let spare = self.arena.node_mut(a).entries_mut().pop().expect("two entries split");
            self.arena.node_mut(b).entries_mut().push(spare);
        } else if self.arena.node(a).is_empty() {
            let spare = self.arena.node_mut(b).entries_mut().pop().expect("two entries split");
            self.arena.node_mut(a).entries_mut().push(spare);
        }
    }

    /// Aggregate feature over the entries of `id`, owning it as child.
    fn summarize(&self, id: NodeId) -> Feature {
        let mut aggregate = Feature::over(id);
        for entry in self.arena.node(id).entries() {
            aggregate.update(entry);
        }
        aggregate
    }

    // ------------------------------------------------------------------
    // merging refinement
    // ------------------------------------------------------------------

    /// Re-examines the node at `id` after a split: if its globally
    /// closest pair of entries is not the pair the split just produced,
    /// the pair's children either merge into one node (when their
    /// combined entries fit the branching factor) or trade entries by
    /// nearest seed.
    fn merging_refinement(&mut self, id: NodeId, just_split: (Option<NodeId>, Option<NodeId>)) {
        let metric = self.config.metric();
        let branching = self.config.branching();
        let Some((p, q)) = self.arena.node(id).closest_pair(metric) else {
            return;
        };
        let cp = self.arena.node(id).entries()[p].child();
        let cq = self.arena.node(id).entries()[q].child();
        if (cp, cq) == just_split || (cq, cp) == just_split {
            // the split itself was already optimal
            return;
        }
        let (Some(cp), Some(cq)) = (cp, cq) else {
            return;
        };
        if self.arena.node(cp).len() + self.arena.node(cq).len() <= branching {
            self.merge_children(id, p, q, cp, cq);
        } else {
            self.redistribute(id, p, q, cp, cq);
        }
    }

    /// Concatenates the children of entries `p` and `q` into one node.
    /// Leaf children: the merged leaf takes `cp`'s chain position and
    /// `cq` drops out. Interior children: the leaf nodes themselves
    /// survive, so `cq`'s run moves to sit directly after `cp`'s.
    fn merge_children(&mut self, id: NodeId, p: usize, q: usize, cp: NodeId, cq: NodeId) {
        debug_assert!(p < q, "pair scan yields ascending indices");
        let leaf = self.arena.node(cp).is_leaf();
        let merged = self.arena.alloc(Node::with_leafness(leaf));
        if leaf {
            let prev = self.arena.node(cp).prev().expect("leaf chain anchored at sentinel");
            let next = self.arena.node(cp).next();
            self.arena.node_mut(prev).set_next(Some(merged));
            self.arena.node_mut(merged).set_prev(Some(prev));
            self.arena.node_mut(merged).set_next(next);
            if let Some(next) = next {
                self.arena.node_mut(next).set_prev(Some(merged));
            }
            self.unlink(cq);
        } else {
            self.shift_run(cp, cq);
        }
        let mut pool = self.arena.free(cp).into_entries();
        pool.extend(self.arena.free(cq).into_entries());
        self.arena.node_mut(merged).entries_mut().extend(pool);
        let aggregate = self.summarize(merged);
        let entries = self.arena.node_mut(id).entries_mut();
        entries[p] = aggregate;
        entries.remove(q);
    }

    /// Redistributes the pooled entries of `cp` and `cq` by nearest
    /// seed (the pair's old aggregates), capping each side at the
    /// branching factor so neither node ends up over capacity.
    ///
    /// Leaf children need no chain work: the two leaves keep their
    /// positions and only trade features. Interior children move whole
    /// subtrees, so both runs are re-threaded around whatever leaves
    /// sit between them.
    fn redistribute(&mut self, id: NodeId, p: usize, q: usize, cp: NodeId, cq: NodeId) {
        let metric = self.config.metric();
        let branching = self.config.branching();
        let seed_a = self.arena.node(id).entries()[p].clone();
        let seed_b = self.arena.node(id).entries()[q].clone();
        let bounds = (!self.arena.node(cp).is_leaf()).then(|| self.run_bounds(cp, cq));
        let mut pool = std::mem::take(self.arena.node_mut(cp).entries_mut());
        pool.extend(std::mem::take(self.arena.node_mut(cq).entries_mut()));
        for entry in pool {
            let nearer = metric.distance(&entry, &seed_a) <= metric.distance(&entry, &seed_b);
            let target = match (nearer, self.arena.node(cp).len() < branching) {
                (true, true) => cp,
                (true, false) => cq,
                (false, _) if self.arena.node(cq).len() < branching => cq,
                (false, _) => cp,
            };
            self.arena.node_mut(target).entries_mut().push(entry);
        }
        self.rebalance(cp, cq);
        if let Some((prev, mid, next)) = bounds {
            let run_p = self.leaves_under(cp);
            let mut cursor = self.link_run(prev, &run_p);
            if let Some((first, last)) = mid {
                self.arena.node_mut(cursor).set_next(Some(first));
                self.arena.node_mut(first).set_prev(Some(cursor));
                cursor = last;
            }
            let run_q = self.leaves_under(cq);
            let cursor = self.link_run(cursor, &run_q);
            self.close_run(cursor, next);
        }
        let entries = [(p, self.summarize(cp)), (q, self.summarize(cq))];
        for (slot, aggregate) in entries {
            self.arena.node_mut(id).entries_mut()[slot] = aggregate;
        }
    }

    /// Chain anchors around the runs under `cp` and `cq`: the leaf
    /// before `cp`'s run, the untouched run between the two (if any,
    /// as first/last bounds), and the leaf after `cq`'s run.
    fn run_bounds(&self, cp: NodeId, cq: NodeId) -> (NodeId, Option<(NodeId, NodeId)>, Option<NodeId>) {
        let prev = self
            .arena
            .node(self.leftmost_leaf(cp))
            .prev()
            .expect("leaf chain anchored at sentinel");
        let next = self.arena.node(self.rightmost_leaf(cq)).next();
        let first_q = self.leftmost_leaf(cq);
        let mid = match self.arena.node(self.rightmost_leaf(cp)).next() {
            Some(m) if m != first_q => {
                let last = self
                    .arena
                    .node(first_q)
                    .prev()
                    .expect("leaf chain anchored at sentinel");
                Some((m, last))
            }
            _ => None,
        };
        (prev, mid, next)
    }

    // ------------------------------------------------------------------
    // rebuilding
    // ------------------------------------------------------------------

    /// Consults the estimator and rebuilds once if the tree is at or
    /// above its budget. Soft policy: never surfaces to the caller.
    fn rebuild_if_over_budget(&mut self) {
        let Some(limit) = self.limit else {
            return;
        };
        let bytes = self.estimator.estimate(self);
        let budget = (limit as f64 * self.margin) as usize;
        if bytes < budget {
            return;
        }
        self.rebuild(bytes);
    }

    /// Reconstructs the whole tree from its own leaf features under an
    /// enlarged threshold. The old arena stays intact until the new
    /// tree is fully built, then the swap is atomic.
    fn rebuild(&mut self, bytes: usize) {
        let threshold = self.next_threshold();
        log::info!(
            "{:<32}{:<32}",
            "rebuilding tree",
            format!("{} bytes, threshold {:.4}", bytes, threshold)
        );
        let mut next = Tree::new(self.config.with_threshold(threshold));
        next.dimension = self.dimension;
        for feature in self.leaf_features() {
            next.absorb(feature);
        }
        next.inserted = self.inserted;
        next.limit = self.limit;
        next.auto_rebuild = self.auto_rebuild;
        next.period = self.period;
        next.margin = self.margin;
        std::mem::swap(&mut next.estimator, &mut self.estimator);
        *self = next;
    }

    /// The enlarged threshold for the next rebuild: the mean closest-pair
    /// distance over leaves, doubled-threshold fallback when no leaf has
    /// a pair or the mean fails to grow. Growth is strict so repeated
    /// rebuilds always coarsen the tree.
    fn next_threshold(&self) -> Scalar {
        let metric = self.config.metric();
        let current = self.config.threshold();
        let doubled = if current > 0. { current * 2. } else { Scalar::EPSILON };
        let mut sum = 0.;
        let mut count = 0usize;
        for id in self.leaves() {
            let node = self.arena.node(id);
            if let Some((i, j)) = node.closest_pair(metric) {
                sum += metric.distance(&node.entries()[i], &node.entries()[j]);
                count += 1;
            }
        }
        if count == 0 {
            return doubled;
        }
        let mean = sum / count as Scalar;
        if mean > current { mean } else { doubled }
    }

    /// Clones every leaf feature in chain order; aggregated statistics
    /// and member lists survive, raw points are never needed again.
    fn leaf_features(&self) -> Vec<Feature> {
        self.leaves()
            .flat_map(|id| self.arena.node(id).entries().iter().cloned())
            .collect()
    }

    // ------------------------------------------------------------------
    // labeling and lookup
    // ------------------------------------------------------------------

    /// Freezes subcluster ids: every leaf feature is labeled with a
    /// sequential positive integer in leaf-chain order. Deterministic
    /// across repeated calls with no intervening inserts.
    pub fn finished_inserting_data(&mut self) {
        let leaves = self.leaves().collect::<Vec<_>>();
        let mut label = 1usize;
        for id in leaves {
            for entry in self.arena.node_mut(id).entries_mut() {
                entry.set_label(label);
                label += 1;
            }
        }
    }

    /// Descends to the nearest leaf subcluster and returns its id;
    /// `None` before labeling or on an empty tree.
    pub fn map_to_closest_subcluster(&self, point: &[Scalar]) -> Option<usize> {
        let metric = self.config.metric();
        let probe = Feature::from_point(point, 0);
        let mut id = self.root;
        loop {
            let node = self.arena.node(id);
            let closest = node.closest(&probe, metric)?;
            match node.entries()[closest].child() {
                Some(child) => id = child,
                None => return node.entries()[closest].label(),
            }
        }
    }

    /// Labels many points at once; lookups are read-only so they fan
    /// out across the rayon pool.
    pub fn map_all(&self, points: &[Vec<Scalar>]) -> Vec<Option<usize>> {
        use rayon::prelude::*;
        points
            .par_iter()
            .map(|point| self.map_to_closest_subcluster(point))
            .collect()
    }

    /// Member indices of every leaf subcluster, in leaf-chain order.
    pub fn subcluster_members(&self) -> Vec<Vec<usize>> {
        self.leaves()
            .flat_map(|id| {
                self.arena
                    .node(id)
                    .entries()
                    .iter()
                    .map(|entry| entry.members().to_vec())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // diagnostics
    // ------------------------------------------------------------------

    /// Nodes reachable from the root.
    pub fn count_nodes(&self) -> usize {
        self.count_nodes_at(self.root)
    }

    fn count_nodes_at(&self, id: NodeId) -> usize {
        1 + self
            .arena
            .node(id)
            .entries()
            .iter()
            .filter_map(Feature::child)
            .map(|child| self.count_nodes_at(child))
            .sum::<usize>()
    }

    /// Features across every node, interior aggregates included.
    pub fn count_entries(&self) -> usize {
        self.count_entries_at(self.root)
    }

    fn count_entries_at(&self, id: NodeId) -> usize {
        let node = self.arena.node(id);
        node.len()
            + node
                .entries()
                .iter()
                .filter_map(Feature::child)
                .map(|child| self.count_entries_at(child))
                .sum::<usize>()
    }

    /// Leaf subclusters, i.e. the number of micro-clusters formed.
    pub fn count_leaf_entries(&self) -> usize {
        self.leaves().map(|id| self.arena.node(id).len()).sum()
    }

    /// √(Σ |members|²) over leaf subclusters; downstream refinement
    /// clustering uses this as an O(n²) cost estimate.
    pub fn sum_lambda_squared(&self) -> Scalar {
        self.leaves()
            .flat_map(|id| self.arena.node(id).entries())
            .map(|entry| {
                let size = entry.members().len() as Scalar;
                size * size
            })
            .sum::<Scalar>()
            .sqrt()
    }

    /// Leaves in chain order, following `next` links from the sentinel.
    fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.arena.node(self.sentinel).next(), |id| {
            self.arena.node(*id).next()
        })
    }

    /// Leaves under `id` in left-to-right tree order.
    fn leaves_under(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_leaves(id, &mut out);
        out
    }

    /// First leaf in tree order under `id`; `id` itself if a leaf.
    fn leftmost_leaf(&self, id: NodeId) -> NodeId {
        match self.arena.node(id).entries().first().and_then(Feature::child) {
            Some(child) => self.leftmost_leaf(child),
            None => id,
        }
    }

    /// Last leaf in tree order under `id`; `id` itself if a leaf.
    fn rightmost_leaf(&self, id: NodeId) -> NodeId {
        match self.arena.node(id).entries().last().and_then(Feature::child) {
            Some(child) => self.rightmost_leaf(child),
            None => id,
        }
    }

    fn collect_leaves(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let node = self.arena.node(id);
        if node.is_leaf() {
            out.push(id);
            return;
        }
        for entry in node.entries() {
            let child = entry.child().expect("interior entry without child");
            self.collect_leaves(child, out);
        }
    }

    /// Verifies the structural invariants, panicking on violation:
    /// capacity bounds, leaf-chain coherence with tree order, the
    /// child/member exclusivity of every feature, and the consistency
    /// of interior aggregates with their subtrees.
    pub fn audit(&self) {
        let chain = self.leaves().collect::<Vec<_>>();
        let walk = self.leaves_under(self.root);
        assert!(chain == walk, "leaf chain out of sync with tree order");
        self.audit_node(self.root);
    }

    fn audit_node(&self, id: NodeId) {
        let node = self.arena.node(id);
        assert!(node.len() <= self.config.branching(), "node over capacity");
        for entry in node.entries() {
            assert!(entry.n() > 0, "empty feature left in the tree");
            match entry.child() {
                Some(child) => {
                    assert!(!node.is_leaf(), "child entry inside a leaf");
                    assert!(entry.members().is_empty(), "interior feature with members");
                    let below = self
                        .arena
                        .node(child)
                        .entries()
                        .iter()
                        .map(Feature::n)
                        .sum::<usize>();
                    assert!(entry.n() == below, "aggregate out of sync with child");
                    self.audit_node(child);
                }
                None => {
                    assert!(node.is_leaf(), "childless entry outside a leaf");
                    assert!(!entry.members().is_empty(), "leaf feature without members");
                }
            }
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl std::fmt::Display for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "birch tree: {} nodes, {} entries, {} subclusters, threshold {:.4} ({})",
            self.count_nodes(),
            self.count_entries(),
            self.count_leaf_entries(),
            self.threshold(),
            self.config.metric(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(branching: usize, threshold: Scalar) -> Tree {
        Tree::new(Config::new(branching, threshold, Metric::D0, false).unwrap())
    }

    #[test]
    fn first_point_opens_a_subcluster() {
        let mut t = tree(4, 1.);
        t.insert(&[1., 2.]).unwrap();
        assert_eq!(t.count_leaf_entries(), 1);
        assert_eq!(t.count_nodes(), 1);
        assert_eq!(t.inserted(), 1);
        t.audit();
    }

    #[test]
    fn nearby_points_are_absorbed() {
        let mut t = tree(4, 1.);
        t.insert(&[0., 0.]).unwrap();
        t.insert(&[0.5, 0.]).unwrap();
        t.insert(&[10., 0.]).unwrap();
        assert_eq!(t.count_leaf_entries(), 2);
        assert_eq!(t.subcluster_members(), vec![vec![0, 1], vec![2]]);
        t.audit();
    }

    #[test]
    fn overflow_splits_the_root() {
        let mut t = tree(2, 0.1);
        for i in 0..3 {
            t.insert(&[i as Scalar * 10., 0.]).unwrap();
        }
        assert!(t.count_nodes() > 1, "root split should have grown the tree");
        assert_eq!(t.count_leaf_entries(), 3);
        t.audit();
    }

    #[test]
    fn deep_growth_stays_coherent() {
        let mut t = tree(3, 0.5);
        for i in 0..64 {
            t.insert(&[(i % 8) as Scalar * 100., (i / 8) as Scalar * 100.]).unwrap();
        }
        assert_eq!(t.count_leaf_entries(), 64);
        t.audit();
    }

    #[test]
    fn merging_refinement_keeps_invariants() {
        let mut t = Tree::new(Config::new(3, 0.5, Metric::D0, true).unwrap());
        for i in 0..64 {
            t.insert(&[(i % 8) as Scalar * 100., (i / 8) as Scalar * 100.]).unwrap();
        }
        assert_eq!(t.count_leaf_entries(), 64);
        t.audit();
    }

    #[test]
    fn interior_splits_keep_the_chain_ordered() {
        // auditing after every insert catches the first split whose
        // redistribution reorders subtrees without re-threading leaves
        let mut t = tree(2, 0.1);
        for i in 0..32 {
            t.insert(&[(i % 8) as Scalar * 10., (i / 8) as Scalar * 10.]).unwrap();
            t.audit();
        }
        assert_eq!(t.count_leaf_entries(), 32);
    }

    #[test]
    fn refinement_at_depth_keeps_the_chain_ordered() {
        // branching 3 forces splits two levels below the root, so the
        // refinement pass runs with interior children on both the
        // merge and the redistribute path
        let mut t = Tree::new(Config::new(3, 0.5, Metric::D0, true).unwrap());
        for i in 0..96 {
            t.insert(&[(i % 12) as Scalar * 100., (i / 12) as Scalar * 100.]).unwrap();
            t.audit();
        }
        assert_eq!(t.count_leaf_entries(), 96);
    }

    #[test]
    fn rejects_bad_rebuild_margins() {
        let mut t = tree(4, 1.);
        for m in [0., -1., f64::NAN, f64::INFINITY] {
            assert!(matches!(t.set_rebuild_margin(m), Err(Error::Config(_))), "margin {}", m);
        }
        t.set_rebuild_margin(1.5).unwrap();
    }

    #[test]
    fn zero_threshold_still_absorbs_duplicates() {
        let mut t = tree(4, 0.);
        t.insert(&[0., 0.]).unwrap();
        t.insert(&[0., 0.]).unwrap();
        assert_eq!(t.count_leaf_entries(), 1);
        assert_eq!(t.subcluster_members(), vec![vec![0, 1]]);
    }

    #[test]
    fn five_spread_points_force_a_split() {
        let mut t = tree(2, 0.1);
        for p in [[0., 0.], [100., 0.], [0., 100.], [100., 100.], [50., 50.]] {
            t.insert(&p).unwrap();
        }
        assert!(t.count_nodes() > 1);
        assert_eq!(t.count_leaf_entries(), 5);
        t.audit();
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut t = tree(4, 1.);
        t.insert(&[1., 2.]).unwrap();
        let err = t.insert(&[1., 2., 3.]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));
        assert_eq!(t.inserted(), 1, "rejected point must not count");
    }

    #[test]
    fn empty_point_is_rejected() {
        let mut t = tree(4, 1.);
        assert!(matches!(t.insert(&[]), Err(Error::Config(_))));
    }

    #[test]
    fn explicit_indices_flow_into_members() {
        let mut t = tree(4, 10.);
        t.insert_with_index(&[0., 0.], 41).unwrap();
        t.insert_with_index(&[0.1, 0.], 42).unwrap();
        assert_eq!(t.subcluster_members(), vec![vec![41, 42]]);
    }

    #[test]
    fn labels_are_sequential_in_chain_order() {
        let mut t = tree(2, 0.1);
        for i in 0..5 {
            t.insert(&[i as Scalar * 10., 0.]).unwrap();
        }
        t.finished_inserting_data();
        let labels = (0..5)
            .map(|i| t.map_to_closest_subcluster(&[i as Scalar * 10., 0.]).unwrap())
            .collect::<Vec<_>>();
        let mut sorted = labels.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn relabeling_is_deterministic() {
        let mut t = tree(3, 0.5);
        for i in 0..32 {
            t.insert(&[(i % 6) as Scalar * 50., (i / 6) as Scalar * 50.]).unwrap();
        }
        let probes = (0..32)
            .map(|i| vec![(i % 6) as Scalar * 50., (i / 6) as Scalar * 50.])
            .collect::<Vec<_>>();
        t.finished_inserting_data();
        let first = t.map_all(&probes);
        t.finished_inserting_data();
        let second = t.map_all(&probes);
        assert_eq!(first, second);
    }

    #[test]
    fn unlabeled_lookup_is_none() {
        let mut t = tree(4, 1.);
        t.insert(&[1., 1.]).unwrap();
        assert_eq!(t.map_to_closest_subcluster(&[1., 1.]), None);
    }

    #[test]
    fn sum_lambda_squared_counts_membership() {
        let mut t = tree(4, 10.);
        // one subcluster of three points, one of a single point
        t.insert(&[0., 0.]).unwrap();
        t.insert(&[0.1, 0.]).unwrap();
        t.insert(&[0.2, 0.]).unwrap();
        t.insert(&[100., 0.]).unwrap();
        assert_eq!(t.sum_lambda_squared(), (10.0_f64).sqrt());
    }

    #[test]
    fn display_summarizes_shape() {
        let mut t = tree(4, 1.);
        t.insert(&[0., 0.]).unwrap();
        let shown = t.to_string();
        assert!(shown.contains("1 nodes"), "got {}", shown);
        assert!(shown.contains("subclusters"), "got {}", shown);
    }
}
