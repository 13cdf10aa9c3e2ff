//! Betweenness centrality (Brandes) on the co-citation projection.
//! Unweighted: every co-citation link counts as one hop.

use super::CoCitationProjection;
use std::collections::VecDeque;

/// Betweenness score per projection index
pub fn betweenness(projection: &CoCitationProjection) -> Vec<f64> {
    let n = projection.len();
    let mut centrality = vec![0.0; n];

    for source in 0..n {
        let mut stack = Vec::with_capacity(n);
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        let mut distance = vec![-1i64; n];
        sigma[source] = 1.0;
        distance[source] = 0;

        let mut queue = VecDeque::new();
        queue.push_back(source);
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for &w in projection.neighbours(v).keys() {
                if distance[w] < 0 {
                    distance[w] = distance[v] + 1;
                    queue.push_back(w);
                }
                if distance[w] == distance[v] + 1 {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
            }
        }

        let mut delta = vec![0.0f64; n];
        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != source {
                centrality[w] += delta[w];
            }
        }
    }

    // Each undirected pair was counted from both ends
    for value in centrality.iter_mut() {
        *value /= 2.0;
    }
    centrality
}
