use super::*;

/// Distance function between two clustering features.
///
/// All five metrics are pure functions of the two features' sufficient
/// statistics (count, linear sum, sum of squares); none of them ever
/// touch raw points. D0 is the default ground metric.
///
/// # Variants
///
/// - **D0** — Euclidean distance between centroids
/// - **D1** — Manhattan distance between centroids
/// - **D2** — average inter-cluster distance
/// - **D3** — average intra-cluster distance of the hypothetical merge
/// - **D4** — variance increase caused by the hypothetical merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Metric {
    #[default]
    D0,
    D1,
    D2,
    D3,
    D4,
}

impl Metric {
    /// Distance between two features under this metric.
    ///
    /// Both features must summarize at least one point; an empty
    /// feature here means the tree let an aggregate go stale.
    pub fn distance(&self, a: &Feature, b: &Feature) -> Scalar {
        assert!(a.n() > 0 && b.n() > 0, "distance over an empty feature");
        debug_assert_eq!(a.dimension(), b.dimension(), "mismatched feature dimensions");
        match self {
            Metric::D0 => Self::d0(a, b),
            Metric::D1 => Self::d1(a, b),
            Metric::D2 => Self::d2(a, b),
            Metric::D3 => Self::d3(a, b),
            Metric::D4 => Self::d4(a, b),
        }
    }

    /// Euclidean distance between the two centroids.
    fn d0(a: &Feature, b: &Feature) -> Scalar {
        let na = a.n() as Scalar;
        let nb = b.n() as Scalar;
        a.sum_x()
            .iter()
            .zip(b.sum_x())
            .map(|(x, y)| x / na - y / nb)
            .map(|d| d * d)
            .sum::<Scalar>()
            .sqrt()
    }

    /// Manhattan distance between the two centroids.
    fn d1(a: &Feature, b: &Feature) -> Scalar {
        let na = a.n() as Scalar;
        let nb = b.n() as Scalar;
        a.sum_x()
            .iter()
            .zip(b.sum_x())
            .map(|(x, y)| (x / na - y / nb).abs())
            .sum()
    }

    /// Average distance between one point of `a` and one point of `b`.
    fn d2(a: &Feature, b: &Feature) -> Scalar {
        let na = a.n() as Scalar;
        let nb = b.n() as Scalar;
        let dist = a
            .sum_x()
            .iter()
            .zip(a.sum_x2())
            .zip(b.sum_x().iter().zip(b.sum_x2()))
            .map(|((lsa, ssa), (lsb, ssb))| (nb * ssa - 2. * lsa * lsb + na * ssb) / (na * nb))
            .sum::<Scalar>();
        dist.max(0.).sqrt()
    }

    /// Average pairwise distance inside the hypothetical merged cluster.
    ///
    /// The combined sum-of-squares term appears twice below, which is
    /// intentional; see DESIGN.md before relying on D3 semantically.
    fn d3(a: &Feature, b: &Feature) -> Scalar {
        let n = (a.n() + b.n()) as Scalar;
        let dist = a
            .sum_x()
            .iter()
            .zip(a.sum_x2())
            .zip(b.sum_x().iter().zip(b.sum_x2()))
            .map(|((lsa, ssa), (lsb, ssb))| {
                let ls = lsa + lsb;
                let ss = ssa + ssb;
                (n * ss - 2. * ls * ls + n * ss) / (n * (n - 1.))
            })
            .sum::<Scalar>();
        dist.max(0.).sqrt()
    }

    /// Variance of the merged cluster minus the variance of each part.
    fn d4(a: &Feature, b: &Feature) -> Scalar {
        let na = a.n() as Scalar;
        let nb = b.n() as Scalar;
        let n = na + nb;
        let dist = a
            .sum_x()
            .iter()
            .zip(a.sum_x2())
            .zip(b.sum_x().iter().zip(b.sum_x2()))
            .map(|((lsa, ssa), (lsb, ssb))| {
                let ls = lsa + lsb;
                let ss = ssa + ssb;
                (ss - ls * ls / n) - (ssa - lsa * lsa / na) - (ssb - lsb * lsb / nb)
            })
            .sum::<Scalar>();
        dist.max(0.)
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::D0 => write!(f, "D0 centroid euclidean"),
            Metric::D1 => write!(f, "D1 centroid manhattan"),
            Metric::D2 => write!(f, "D2 average inter-cluster"),
            Metric::D3 => write!(f, "D3 average intra-cluster"),
            Metric::D4 => write!(f, "D4 variance increase"),
        }
    }
}
