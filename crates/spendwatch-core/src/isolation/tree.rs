//! A single isolation tree
//!
//! Nodes live in a flat arena and refer to their children by index. The tree
//! is grown with an explicit work stack, so neither construction nor queries
//! recurse.

use rand::Rng;

use super::average_path_length;
use crate::features::{Feature, FeatureVector};

/// Index of a node in its tree's arena
pub type NodeId = usize;

const ROOT: NodeId = 0;

/// Node in an isolation tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Split: values `< threshold` go left, the rest go right
    Internal {
        feature: Feature,
        threshold: f64,
        left: NodeId,
        right: NodeId,
    },
    /// Unsplit remainder of the sample
    Leaf { size: usize, depth: usize },
}

/// Randomized binary partition tree over a sample of feature vectors
#[derive(Debug, Clone)]
pub struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    /// Grow a tree over `data`
    ///
    /// A node becomes a leaf when it holds at most one point, sits at
    /// `max_depth`, or its randomly chosen feature is constant across the
    /// node's points.
    pub fn build<R: Rng + ?Sized>(data: &[FeatureVector], max_depth: usize, rng: &mut R) -> Self {
        let mut nodes = vec![Node::Leaf { size: 0, depth: 0 }];
        let mut pending: Vec<(NodeId, Vec<usize>, usize)> =
            vec![(ROOT, (0..data.len()).collect(), 0)];

        while let Some((slot, members, depth)) = pending.pop() {
            if members.len() <= 1 || depth >= max_depth {
                nodes[slot] = Node::Leaf {
                    size: members.len(),
                    depth,
                };
                continue;
            }

            let feature = Feature::ALL[rng.gen_range(0..Feature::COUNT)];
            let column = feature.index();

            let (min, max) = members
                .iter()
                .map(|&i| data[i][column])
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });

            // Constant feature: no split can separate these points
            if max <= min {
                nodes[slot] = Node::Leaf {
                    size: members.len(),
                    depth,
                };
                continue;
            }

            let threshold = rng.gen_range(min..=max);
            let (left_members, right_members): (Vec<usize>, Vec<usize>) =
                members.into_iter().partition(|&i| data[i][column] < threshold);

            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf { size: 0, depth: 0 });
            nodes.push(Node::Leaf { size: 0, depth: 0 });
            nodes[slot] = Node::Internal {
                feature,
                threshold,
                left,
                right,
            };

            pending.push((right, right_members, depth + 1));
            pending.push((left, left_members, depth + 1));
        }

        Self { nodes }
    }

    /// Depth of the leaf `point` lands in, plus `c(leaf size)` for the
    /// points that leaf never separated
    pub fn path_length(&self, point: &FeatureVector) -> f64 {
        let mut id = ROOT;
        let mut depth = 0usize;

        loop {
            match &self.nodes[id] {
                Node::Internal {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if point[feature.index()] < *threshold {
                        *left
                    } else {
                        *right
                    };
                    depth += 1;
                }
                Node::Leaf { size, .. } => {
                    return depth as f64 + average_path_length(*size);
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Deepest leaf depth
    pub fn height(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                Node::Leaf { depth, .. } => Some(*depth),
                Node::Internal { .. } => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Points held across all leaves (equals the sample size it was built on)
    pub fn leaf_population(&self) -> usize {
        self.nodes
            .iter()
            .map(|node| match node {
                Node::Leaf { size, .. } => *size,
                Node::Internal { .. } => 0,
            })
            .sum()
    }

    pub fn root(&self) -> &Node {
        &self.nodes[ROOT]
    }
}
