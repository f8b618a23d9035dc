//! Bottleneck distance between persistence diagrams.
//!
//! The bottleneck distance is the smallest `t` such that the generators of
//! the two diagrams admit a matching in which every matched pair is within
//! L∞ distance `t` and every unmatched generator is within `t` of the
//! diagonal. Feasibility at a threshold is a bipartite perfect-matching
//! question on the diagonals-augmented point sets, decided with
//! Hopcroft–Karp; the exact distance is found by binary search over the
//! candidate cost values, the approximate one by bisecting the threshold
//! until the bracket is relatively tight.

use std::collections::VecDeque;

use crate::diagram::PersistenceDiagram;

/// The exact bottleneck distance between two diagrams.
#[must_use]
pub fn bottleneck(a: &PersistenceDiagram, b: &PersistenceDiagram) -> f64 {
    let matcher = Matcher::new(a, b);
    if matcher.n == 0 {
        return 0.0;
    }

    let mut candidates = matcher.candidates();
    candidates.sort_by(f64::total_cmp);
    candidates.dedup();

    // The largest candidate admits every edge, so it is always feasible.
    let (mut lo, mut hi) = (0, candidates.len() - 1);
    while lo < hi {
        let mid = (lo + hi) / 2;
        if matcher.feasible(candidates[mid]) {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    candidates[lo]
}

/// The bottleneck distance to within a relative error of `eps`.
///
/// The returned value `w` satisfies `exact <= w < (1 + eps) * exact`.
///
/// # Panics
///
/// If `eps` is not positive.
#[must_use]
pub fn bottleneck_approx(a: &PersistenceDiagram, b: &PersistenceDiagram, eps: f64) -> f64 {
    assert!(eps > 0.0, "approximation error must be positive");
    let matcher = Matcher::new(a, b);
    if matcher.n == 0 || matcher.feasible(0.0) {
        return 0.0;
    }

    let mut lo = 0.0_f64;
    let mut hi = matcher.candidates().into_iter().fold(0.0_f64, f64::max);
    while hi > (1.0 + eps) * lo {
        let mid = (lo + hi) / 2.0;
        if matcher.feasible(mid) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    hi
}

/// The diagonals-augmented bipartite matching instance for one diagram pair.
///
/// Side U is the generators of `a` followed by one diagonal slot per
/// generator of `b`; side V is the generators of `b` followed by one slot
/// per generator of `a`. Both sides have `n = |a| + |b|` vertices, and the
/// bottleneck question at threshold `t` is whether the edges of cost at most
/// `t` admit a perfect matching.
struct Matcher<'a> {
    /// One diagram.
    a: &'a PersistenceDiagram,
    /// The other diagram.
    b: &'a PersistenceDiagram,
    /// Vertices per side.
    n: usize,
}

impl<'a> Matcher<'a> {
    /// Builds the instance.
    fn new(a: &'a PersistenceDiagram, b: &'a PersistenceDiagram) -> Self {
        Self { a, b, n: a.len() + b.len() }
    }

    /// The matching cost between vertex `u` of side U and `v` of side V.
    ///
    /// A generator matched to any diagonal slot pays its own diagonal
    /// projection cost; two diagonal slots match for free.
    fn cost(&self, u: usize, v: usize) -> f64 {
        match (self.a.generators().get(u), self.b.generators().get(v)) {
            (Some(x), Some(y)) => x.dist(y),
            (Some(x), None) => x.diagonal(),
            (None, Some(y)) => y.diagonal(),
            (None, None) => 0.0,
        }
    }

    /// Every cost value the exact distance could be.
    fn candidates(&self) -> Vec<f64> {
        let mut candidates = vec![0.0];
        candidates.extend(self.a.generators().iter().map(crate::Generator::diagonal));
        candidates.extend(self.b.generators().iter().map(crate::Generator::diagonal));
        for x in self.a.generators() {
            for y in self.b.generators() {
                candidates.push(x.dist(y));
            }
        }
        candidates
    }

    /// Whether the edges of cost at most `t` admit a perfect matching.
    fn feasible(&self, t: f64) -> bool {
        let adjacency: Vec<Vec<usize>> =
            (0..self.n).map(|u| (0..self.n).filter(|&v| self.cost(u, v) <= t).collect()).collect();
        max_matching(self.n, &adjacency) == self.n
    }
}

/// Size of a maximum bipartite matching, by Hopcroft–Karp.
fn max_matching(n: usize, adjacency: &[Vec<usize>]) -> usize {
    const FREE: usize = usize::MAX;
    let mut match_u = vec![FREE; n];
    let mut match_v = vec![FREE; n];
    let mut matched = 0;

    loop {
        // Layer the graph from the free U vertices.
        let mut layer = vec![FREE; n];
        let mut queue: VecDeque<usize> = (0..n).filter(|&u| match_u[u] == FREE).collect();
        for &u in &queue {
            layer[u] = 0;
        }
        let mut reachable_free_v = false;
        while let Some(u) = queue.pop_front() {
            for &v in &adjacency[u] {
                let w = match_v[v];
                if w == FREE {
                    reachable_free_v = true;
                } else if layer[w] == FREE {
                    layer[w] = layer[u] + 1;
                    queue.push_back(w);
                }
            }
        }
        if !reachable_free_v {
            return matched;
        }

        // Augment along the layered graph.
        for u in 0..n {
            if match_u[u] == FREE && augment(u, adjacency, &mut match_u, &mut match_v, &mut layer) {
                matched += 1;
            }
        }
    }
}

/// Tries to extend one augmenting path from `u`; layers are consumed as the
/// path claims them.
fn augment(u: usize, adjacency: &[Vec<usize>], match_u: &mut [usize], match_v: &mut [usize], layer: &mut [usize]) -> bool {
    const FREE: usize = usize::MAX;
    for &v in &adjacency[u] {
        let w = match_v[v];
        if w == FREE || (layer[w] == layer[u].wrapping_add(1) && augment(w, adjacency, match_u, match_v, layer)) {
            match_u[u] = v;
            match_v[v] = u;
            return true;
        }
    }
    layer[u] = FREE;
    false
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;

    use crate::diagram::Generator;

    use super::*;

    fn diagram(pairs: &[(f64, f64)]) -> PersistenceDiagram {
        let mut pd = PersistenceDiagram::new();
        for &(birth, death) in pairs {
            pd.push(Generator::new(birth, death));
        }
        pd
    }

    #[test]
    fn empty_diagrams_are_identical() {
        assert_eq!(bottleneck(&diagram(&[]), &diagram(&[])), 0.0);
    }

    #[test]
    fn single_generator_against_empty() {
        // The lone generator must go to the diagonal.
        let d = bottleneck(&diagram(&[(0.0, 4.0)]), &diagram(&[]));
        assert!(approx_eq!(f64, d, 2.0, ulps = 2));
    }

    #[test]
    fn matched_pair_beats_diagonal() {
        // Matching (0,10) to (1,10) costs 1; both-to-diagonal costs 5.
        let d = bottleneck(&diagram(&[(0.0, 10.0)]), &diagram(&[(1.0, 10.0)]));
        assert!(approx_eq!(f64, d, 1.0, ulps = 2));
    }

    #[test]
    fn diagonal_beats_far_match() {
        // Matching (0,1) to (100,101) costs 100; both-to-diagonal costs 0.5.
        let d = bottleneck(&diagram(&[(0.0, 1.0)]), &diagram(&[(100.0, 101.0)]));
        assert!(approx_eq!(f64, d, 0.5, ulps = 2));
    }

    #[test]
    fn identical_diagrams_are_at_distance_zero() {
        let pd = diagram(&[(0.0, 3.0), (1.0, 5.0), (2.0, 2.5)]);
        assert_eq!(bottleneck(&pd, &pd), 0.0);
    }

    #[test]
    fn mixed_matching() {
        // (0,6) matches (0.5,6) for 0.5; (10,10.4) goes to the diagonal
        // for 0.2; the bottleneck is the max, 0.5.
        let a = diagram(&[(0.0, 6.0), (10.0, 10.4)]);
        let b = diagram(&[(0.5, 6.0)]);
        let d = bottleneck(&a, &b);
        assert!(approx_eq!(f64, d, 0.5, ulps = 2));
    }

    #[test]
    fn approx_brackets_exact() {
        let a = diagram(&[(0.0, 6.0), (1.0, 3.0), (4.0, 9.0)]);
        let b = diagram(&[(0.25, 6.5), (1.5, 3.0)]);
        let exact = bottleneck(&a, &b);
        for eps in [0.5, 0.1, 0.01] {
            let approx = bottleneck_approx(&a, &b, eps);
            assert!(approx >= exact - 1e-12, "approx {approx} below exact {exact}");
            assert!(approx < (1.0 + eps) * exact + 1e-12, "approx {approx} too far above exact {exact}");
        }
    }
}
