use super::*;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

/// Test fixture for end-to-end tree verification.
///
/// Generates deterministic Gaussian blobs around well-separated
/// centers with small fixed constants for fast unit testing. Seeded
/// generation keeps every run byte-identical, so scenario assertions
/// can be exact.
const BLOBS: usize = 4;
const PER_BLOB: usize = 64;
const SPREAD: Scalar = 0.2;
const SEED: u64 = 0x0b1bc4;

/// Deterministic blob generator over a seeded [`SmallRng`].
pub struct Dataset {
    rng: SmallRng,
    centers: Vec<[Scalar; 2]>,
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new(SEED)
    }
}

impl Dataset {
    /// Centers sit on a coarse grid so blobs never overlap at the
    /// default spread.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            centers: (0..BLOBS).map(|i| [(i % 2) as Scalar * 10., (i / 2) as Scalar * 10.]).collect(),
        }
    }

    /// All blob points, interleaved round-robin across centers so
    /// insertion order does not present one cluster at a time.
    pub fn points(&mut self) -> Vec<Vec<Scalar>> {
        (0..BLOBS * PER_BLOB)
            .map(|i| self.sample(i % BLOBS))
            .collect()
    }

    /// One point drawn from the blob around center `i`.
    pub fn sample(&mut self, i: usize) -> Vec<Scalar> {
        let center = self.centers[i];
        center.iter().map(|c| c + SPREAD * self.gaussian()).collect()
    }

    /// The blob index a generated point index belongs to.
    pub fn blob_of(&self, index: usize) -> usize {
        index % BLOBS
    }

    /// Standard normal draw via the Box-Muller transform.
    fn gaussian(&mut self) -> Scalar {
        let u1 = 1. - self.rng.random::<Scalar>();
        let u2 = self.rng.random::<Scalar>();
        (-2. * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }
}

#[cfg(test)]
mod scenarios {
    use super::*;

    fn grown(config: Config) -> (Tree, Vec<Vec<Scalar>>) {
        let mut tree = Tree::new(config);
        let points = Dataset::default().points();
        for point in &points {
            tree.insert(point).unwrap();
        }
        (tree, points)
    }

    #[test]
    fn tight_threshold_separates_the_blobs() {
        let (mut tree, points) = grown(Config::new(8, 1., Metric::D0, false).unwrap());
        tree.audit();
        // well-separated blobs at this threshold yield one or a few
        // subclusters each, never a fragment per point
        assert!(tree.count_leaf_entries() >= BLOBS);
        assert!(
            tree.count_leaf_entries() <= BLOBS * 8,
            "over-fragmented: {} subclusters",
            tree.count_leaf_entries()
        );
        tree.finished_inserting_data();
        // every point lands in a subcluster of its own blob: resolve
        // each label to a blob through the members it was built from
        let data = Dataset::default();
        let labels = tree.map_all(&points);
        let members = tree.subcluster_members();
        let total = members.iter().map(Vec::len).sum::<usize>();
        assert_eq!(total, points.len(), "members must partition the input");
        for (i, label) in labels.iter().enumerate() {
            let label = label.expect("labeled after finished_inserting_data");
            let owners = &members[label - 1];
            assert!(
                owners.iter().all(|&m| data.blob_of(m) == data.blob_of(i)),
                "point {} mapped across blobs",
                i
            );
        }
    }

    #[test]
    fn loose_threshold_collapses_each_blob() {
        let (mut tree, _) = grown(Config::new(8, 3., Metric::D0, false).unwrap());
        tree.audit();
        assert_eq!(tree.count_leaf_entries(), BLOBS);
        tree.finished_inserting_data();
        let sizes = tree
            .subcluster_members()
            .iter()
            .map(Vec::len)
            .collect::<Vec<_>>();
        assert_eq!(sizes, vec![PER_BLOB; BLOBS]);
    }

    #[test]
    fn tiny_branching_grows_a_deep_coherent_tree() {
        let (tree, points) = grown(Config::new(2, 0.05, Metric::D0, false).unwrap());
        tree.audit();
        assert!(tree.count_nodes() > tree.count_leaf_entries() / 2);
        assert_eq!(tree.inserted(), points.len());
    }

    #[test]
    fn all_metrics_build_valid_trees() {
        for metric in [Metric::D0, Metric::D1, Metric::D2, Metric::D3, Metric::D4] {
            let (tree, _) = grown(Config::new(8, 1., metric, false).unwrap());
            tree.audit();
            assert!(tree.count_leaf_entries() >= BLOBS, "{} lost a blob", metric);
        }
    }

    #[test]
    fn refinement_preserves_every_member() {
        let (tree, points) = grown(Config::new(4, 0.3, Metric::D0, true).unwrap());
        tree.audit();
        let mut seen = tree
            .subcluster_members()
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        seen.sort_unstable();
        assert_eq!(seen, (0..points.len()).collect::<Vec<_>>());
    }

    #[test]
    fn rebuild_coarsens_under_a_memory_budget() {
        let mut tree = Tree::new(Config::new(8, 0.05, Metric::D0, false).unwrap());
        tree.set_auto_rebuild(true);
        tree.set_rebuild_period(32);
        tree.set_memory_limit_bytes(12_000);
        let before = tree.threshold();
        let points = Dataset::default().points();
        for point in &points {
            tree.insert(point).unwrap();
        }
        tree.audit();
        assert!(tree.threshold() > before, "budget pressure must raise the threshold");
        assert_eq!(tree.inserted(), points.len());
        let mut seen = tree
            .subcluster_members()
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        seen.sort_unstable();
        assert_eq!(seen, (0..points.len()).collect::<Vec<_>>(), "rebuild must not lose points");
    }

    #[test]
    fn injected_estimator_drives_the_rebuild_policy() {
        struct Alarmist;
        impl MemoryEstimator for Alarmist {
            fn estimate(&self, _: &Tree) -> usize {
                usize::MAX
            }
        }
        let mut tree = Tree::new(Config::new(8, 0.1, Metric::D0, false).unwrap());
        tree.set_auto_rebuild(true);
        tree.set_rebuild_period(1);
        tree.set_memory_limit_mb(1);
        tree.set_estimator(Alarmist);
        let before = tree.threshold();
        let mut data = Dataset::default();
        for i in 0..8 {
            let p = data.sample(i % BLOBS);
            tree.insert(&p).unwrap();
        }
        assert!(tree.threshold() > before, "estimator at the limit must force rebuilds");
        tree.audit();
    }

    #[test]
    fn lambda_squared_tracks_cluster_mass() {
        let (tree, points) = grown(Config::new(8, 3., Metric::D0, false).unwrap());
        let expected = ((PER_BLOB * PER_BLOB * BLOBS) as Scalar).sqrt();
        assert_eq!(tree.sum_lambda_squared(), expected);
        assert_eq!(tree.inserted(), points.len());
    }
}
