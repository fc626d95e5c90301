//! Damped PageRank over a directed weighted graph of ranked candidates.
//!
//! Nodes are dense indexes into the candidate list; edges carry positive
//! weights. Iteration distributes `d·PR(j)·w/Wj` from every source j with
//! outgoing weight, on top of the `(1-d)/n` base, until the L1 change drops
//! below tolerance.

pub const PAGERANK_TOLERANCE: f32 = 1e-6;

pub struct DirectedGraph {
    edges: Vec<Vec<(usize, f32)>>,
}

impl DirectedGraph {
    pub fn new(node_count: usize) -> Self {
        Self {
            edges: vec![Vec::new(); node_count],
        }
    }

    /// Zero and negative weights are ignored: an edge that carries no
    /// voting power must not exist.
    pub fn add_edge(&mut self, source: usize, target: usize, weight: f32) {
        if weight > 0.0 && source < self.edges.len() && target < self.edges.len() {
            self.edges[source].push((target, weight));
        }
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(Vec::len).sum()
    }

    /// Run PageRank seeded from `initial` (normalized internally; uniform
    /// when the total is zero).
    pub fn pagerank(&self, initial: &[f32], damping: f32, max_iterations: usize) -> Vec<f32> {
        let n = self.edges.len();
        if n == 0 {
            return Vec::new();
        }

        let total: f32 = initial.iter().sum();
        let mut rank: Vec<f32> = if total > 0.0 {
            initial.iter().map(|w| w / total).collect()
        } else {
            vec![1.0 / n as f32; n]
        };

        let out_weights: Vec<f32> = self
            .edges
            .iter()
            .map(|edges| edges.iter().map(|(_, w)| w).sum())
            .collect();

        let base = (1.0 - damping) / n as f32;

        for iteration in 0..max_iterations {
            let mut next = vec![base; n];

            for source in 0..n {
                if rank[source] == 0.0 || out_weights[source] == 0.0 {
                    continue;
                }
                let contribution_per_weight = damping * rank[source] / out_weights[source];
                for (target, weight) in &self.edges[source] {
                    next[*target] += contribution_per_weight * weight;
                }
            }

            let diff: f32 = next
                .iter()
                .zip(rank.iter())
                .map(|(a, b)| (a - b).abs())
                .sum();
            rank = next;

            if diff < PAGERANK_TOLERANCE {
                tracing::debug!(iteration = iteration + 1, diff, "pagerank converged");
                break;
            }
        }

        rank
    }
}
