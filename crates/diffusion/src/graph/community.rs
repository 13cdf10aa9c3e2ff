//! Louvain community detection on the co-citation projection
//!
//! Classic two-phase Louvain: greedy local moving by modularity gain, then
//! aggregation of communities into super-nodes, repeated until no node moves.
//! Adjacency uses ordered maps and nodes are visited in index order, so the
//! partition is deterministic for a given graph.

use super::CoCitationProjection;
use std::collections::BTreeMap;

const MAX_PASSES: usize = 100;
const MAX_LEVELS: usize = 32;
const MIN_GAIN: f64 = 1e-12;

type Adjacency = Vec<BTreeMap<usize, f64>>;

/// Partition projection indices into communities.
///
/// Communities are ordered by size (largest first), then by lowest member.
pub fn louvain(projection: &CoCitationProjection) -> Vec<Vec<usize>> {
    let n = projection.len();
    if n == 0 {
        return Vec::new();
    }

    // membership[original node] = node index at the current level
    let mut membership: Vec<usize> = (0..n).collect();
    let mut adjacency: Adjacency = (0..n).map(|i| projection.neighbours(i).clone()).collect();

    for _ in 0..MAX_LEVELS {
        let (community, moved) = local_moving(&adjacency);
        if !moved {
            break;
        }

        let (dense, count) = relabel(&community);
        for node in membership.iter_mut() {
            *node = dense[*node];
        }
        adjacency = aggregate(&adjacency, &dense, count);

        if count == 1 {
            break;
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (node, &group) in membership.iter().enumerate() {
        groups.entry(group).or_default().push(node);
    }

    let mut communities: Vec<Vec<usize>> = groups.into_values().collect();
    communities.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));
    communities
}

/// Weighted degree; self-loops count twice
fn degree(adjacency: &Adjacency, node: usize) -> f64 {
    adjacency[node]
        .iter()
        .map(|(&other, &w)| if other == node { 2.0 * w } else { w })
        .sum()
}

/// Greedy moving phase. Returns each node's community and whether any node moved.
fn local_moving(adjacency: &Adjacency) -> (Vec<usize>, bool) {
    let n = adjacency.len();
    let degrees: Vec<f64> = (0..n).map(|i| degree(adjacency, i)).collect();
    let total_weight: f64 = degrees.iter().sum();

    let mut community: Vec<usize> = (0..n).collect();
    if total_weight <= 0.0 {
        return (community, false);
    }

    let mut totals = degrees.clone();
    let mut moved_any = false;

    for _ in 0..MAX_PASSES {
        let mut moved = false;

        for node in 0..n {
            let current = community[node];
            let k = degrees[node];

            let mut links: BTreeMap<usize, f64> = BTreeMap::new();
            for (&other, &w) in &adjacency[node] {
                if other != node {
                    *links.entry(community[other]).or_insert(0.0) += w;
                }
            }

            totals[current] -= k;

            let gain = |target: usize, weight_to: f64| weight_to - totals[target] * k / total_weight;
            let mut best = current;
            let mut best_gain = gain(current, links.get(&current).copied().unwrap_or(0.0));
            for (&target, &weight_to) in &links {
                let candidate = gain(target, weight_to);
                if candidate > best_gain + MIN_GAIN {
                    best = target;
                    best_gain = candidate;
                }
            }

            totals[best] += k;
            if best != current {
                community[node] = best;
                moved = true;
                moved_any = true;
            }
        }

        if !moved {
            break;
        }
    }

    (community, moved_any)
}

/// Map community labels onto 0..count in order of first appearance
fn relabel(community: &[usize]) -> (Vec<usize>, usize) {
    let mut labels: BTreeMap<usize, usize> = BTreeMap::new();
    let mut dense = Vec::with_capacity(community.len());
    for &label in community {
        let next = labels.len();
        dense.push(*labels.entry(label).or_insert(next));
    }
    (dense, labels.len())
}

/// Collapse each community into one node. Internal links become self-loops.
fn aggregate(adjacency: &Adjacency, dense: &[usize], count: usize) -> Adjacency {
    let mut collapsed: Adjacency = vec![BTreeMap::new(); count];
    for (node, links) in adjacency.iter().enumerate() {
        let from = dense[node];
        for (&other, &w) in links {
            let to = dense[other];
            let weight = if other == node {
                w
            } else if from == to {
                // Seen once from each endpoint
                w / 2.0
            } else {
                w
            };
            *collapsed[from].entry(to).or_insert(0.0) += weight;
        }
    }
    collapsed
}
