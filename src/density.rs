//! # Density-based clustering without a fixed cluster count
//!
//! Hierarchical density clustering in the HDBSCAN family:
//!
//! 1. **Core distances**: distance to the `min_samples`-th nearest point
//!    (the point itself counts as the first).
//! 2. **Mutual reachability**: `max(core(a), core(b), d(a, b))`, which pushes
//!    sparse points away from everything while leaving dense regions intact.
//! 3. **Minimum spanning tree** of the mutual reachability graph (dense Prim,
//!    `O(N²)`), then single-linkage merges in ascending weight.
//! 4. **Condensed tree**: walking the dendrogram top-down with `λ = 1 / d`,
//!    a split only creates two clusters when both sides hold at least
//!    `min_cluster_size` points; smaller sides "fall out" of their parent.
//! 5. **Excess of mass**: a cluster is selected when its stability beats the
//!    summed stability of its selected descendants. The root is never
//!    selected, so data without density structure yields no cluster at all.
//!
//! Points not covered by a selected cluster are noise. Everything is
//! deterministic: ties in Prim's step and in the merge order resolve by
//! index.

use log::{debug, info, trace};

use crate::clustering::DistanceMatrix;

/// λ assigned to zero-distance merges (duplicate points).
const LAMBDA_MAX: f64 = 1e12;

#[derive(Clone, Copy, Debug)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

#[derive(Clone, Debug)]
struct CondensedCluster {
    parent: Option<usize>,
    birth: f64,
    size: usize,
    children: Vec<usize>,
    /// Points leaving this cluster and the λ at which they leave.
    points: Vec<(usize, f64)>,
}

/// Labels produced by [`DensityClusterer::fit`].
#[derive(Clone, Debug, PartialEq)]
pub struct DensityResult {
    /// Cluster per point, `None` for noise.
    pub labels: Vec<Option<usize>>,
    /// Membership strength in [0, 1]; 0 for noise.
    pub probabilities: Vec<f64>,
    pub n_clusters: usize,
}

impl DensityResult {
    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|l| l.is_none()).count()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DensityClusterer {
    min_cluster_size: usize,
    min_samples: usize,
}

impl DensityClusterer {
    pub fn new(min_cluster_size: usize, min_samples: Option<usize>) -> Self {
        let min_cluster_size = min_cluster_size.max(2);
        Self {
            min_cluster_size,
            min_samples: min_samples.unwrap_or(min_cluster_size).max(1),
        }
    }

    pub fn fit(&self, distances: &DistanceMatrix) -> DensityResult {
        let n = distances.len();
        info!(
            "Running density clustering on {} points: min_cluster_size={}, min_samples={}",
            n, self.min_cluster_size, self.min_samples
        );
        if n < 2 || n < self.min_cluster_size {
            return DensityResult {
                labels: vec![None; n],
                probabilities: vec![0.0; n],
                n_clusters: 0,
            };
        }

        let core = self.core_distances(distances);
        let mst = minimum_spanning_tree(distances, &core);
        let merges = single_linkage(&mst, n);
        let clusters = self.condense(&merges, n);
        let selected = select_clusters(&clusters);
        let result = label_points(&clusters, &selected, n);

        info!(
            "Density clustering found {} clusters, {} noise points",
            result.n_clusters,
            result.noise_count()
        );
        result
    }

    fn core_distances(&self, distances: &DistanceMatrix) -> Vec<f64> {
        let n = distances.len();
        let kth = (self.min_samples - 1).min(n - 1);
        (0..n)
            .map(|i| {
                let mut row = distances.row(i).to_vec();
                row.select_nth_unstable_by(kth, |a, b| a.total_cmp(b));
                row[kth]
            })
            .collect()
    }

    fn condense(&self, merges: &[Merge], n: usize) -> Vec<CondensedCluster> {
        let size_of = |node: usize| if node < n { 1 } else { merges[node - n].size };

        let mut clusters = vec![CondensedCluster {
            parent: None,
            birth: 0.0,
            size: n,
            children: Vec::new(),
            points: Vec::new(),
        }];
        let root = n + merges.len() - 1;
        let mut stack = vec![(root, 0usize)];

        while let Some((node, cid)) = stack.pop() {
            let merge = merges[node - n];
            let lambda = lambda_of(merge.distance);
            let sides = [merge.left, merge.right];
            let big: Vec<bool> = sides
                .iter()
                .map(|&s| size_of(s) >= self.min_cluster_size)
                .collect();

            if big[0] && big[1] {
                for &side in &sides {
                    let id = clusters.len();
                    clusters.push(CondensedCluster {
                        parent: Some(cid),
                        birth: lambda,
                        size: size_of(side),
                        children: Vec::new(),
                        points: Vec::new(),
                    });
                    clusters[cid].children.push(id);
                    stack.push((side, id));
                }
                trace!("split of cluster {} at lambda {:.4}", cid, lambda);
                continue;
            }

            for (&side, &is_big) in sides.iter().zip(&big) {
                if is_big && side >= n {
                    stack.push((side, cid));
                } else {
                    for p in leaves(merges, side, n) {
                        clusters[cid].points.push((p, lambda));
                    }
                }
            }
        }
        debug!("Condensed tree has {} clusters", clusters.len());
        clusters
    }
}

fn lambda_of(distance: f64) -> f64 {
    if distance > 1.0 / LAMBDA_MAX {
        1.0 / distance
    } else {
        LAMBDA_MAX
    }
}

/// Dense Prim over mutual reachability distances; returns `(a, b, weight)`.
fn minimum_spanning_tree(distances: &DistanceMatrix, core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = distances.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let mr = distances.get(current, j).max(core[current]).max(core[j]);
            if mr < best[j] {
                best[j] = mr;
                from[j] = current;
            }
        }
        let mut next = usize::MAX;
        for j in 0..n {
            if !in_tree[j] && (next == usize::MAX || best[j] < best[next]) {
                next = j;
            }
        }
        in_tree[next] = true;
        edges.push((from[next], next, best[next]));
        current = next;
    }

    edges.sort_by(|a, b| a.2.total_cmp(&b.2));
    edges
}

/// Union-find over MST edges; merge `i` creates dendrogram node `n + i`.
fn single_linkage(mst: &[(usize, usize, f64)], n: usize) -> Vec<Merge> {
    let mut parent: Vec<usize> = (0..2 * n - 1).collect();
    let mut size = vec![1usize; 2 * n - 1];

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        let mut root = x;
        while parent[root] != root {
            root = parent[root];
        }
        while parent[x] != root {
            let next = parent[x];
            parent[x] = root;
            x = next;
        }
        root
    }

    let mut merges = Vec::with_capacity(n - 1);
    for (i, &(a, b, w)) in mst.iter().enumerate() {
        let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
        let label = n + i;
        size[label] = size[ra] + size[rb];
        parent[ra] = label;
        parent[rb] = label;
        merges.push(Merge {
            left: ra,
            right: rb,
            distance: w,
            size: size[label],
        });
    }
    merges
}

/// Original points below a dendrogram node.
fn leaves(merges: &[Merge], node: usize, n: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(x) = stack.pop() {
        if x < n {
            out.push(x);
        } else {
            let m = merges[x - n];
            stack.push(m.right);
            stack.push(m.left);
        }
    }
    out
}

fn stability(clusters: &[CondensedCluster], c: usize) -> f64 {
    let cl = &clusters[c];
    let from_points: f64 = cl.points.iter().map(|(_, l)| l - cl.birth).sum();
    let from_children: f64 = cl
        .children
        .iter()
        .map(|&ch| (clusters[ch].birth - cl.birth) * clusters[ch].size as f64)
        .sum();
    from_points + from_children
}

/// Excess-of-mass selection, root excluded.
fn select_clusters(clusters: &[CondensedCluster]) -> Vec<bool> {
    let nc = clusters.len();
    let mut selected = vec![false; nc];
    let mut subtree = vec![0.0; nc];

    // children always carry larger ids than their parent
    for c in (1..nc).rev() {
        let own = stability(clusters, c);
        let children = &clusters[c].children;
        let child_sum: f64 = children.iter().map(|&ch| subtree[ch]).sum();
        if children.is_empty() || own >= child_sum {
            selected[c] = true;
            subtree[c] = own;
            let mut stack = children.clone();
            while let Some(d) = stack.pop() {
                selected[d] = false;
                stack.extend(clusters[d].children.iter().copied());
            }
        } else {
            subtree[c] = child_sum;
        }
    }
    selected
}

fn label_points(clusters: &[CondensedCluster], selected: &[bool], n: usize) -> DensityResult {
    let mut label_of = vec![None; clusters.len()];
    let mut n_clusters = 0;
    for (c, &sel) in selected.iter().enumerate() {
        if sel {
            label_of[c] = Some(n_clusters);
            n_clusters += 1;
        }
    }

    let mut labels = vec![None; n];
    let mut exit_lambda = vec![0.0; n];
    for (c, cl) in clusters.iter().enumerate() {
        for &(p, lambda) in &cl.points {
            exit_lambda[p] = lambda;
            let mut cursor = Some(c);
            while let Some(x) = cursor {
                if selected[x] {
                    labels[p] = label_of[x];
                    break;
                }
                cursor = clusters[x].parent;
            }
        }
    }

    let mut max_lambda = vec![0.0f64; n_clusters];
    for p in 0..n {
        if let Some(l) = labels[p] {
            max_lambda[l] = max_lambda[l].max(exit_lambda[p]);
        }
    }
    let probabilities = (0..n)
        .map(|p| match labels[p] {
            Some(l) if max_lambda[l] > 0.0 => exit_lambda[p].min(max_lambda[l]) / max_lambda[l],
            Some(_) => 1.0,
            None => 0.0,
        })
        .collect();

    DensityResult {
        labels,
        probabilities,
        n_clusters,
    }
}
