//! Classification tree used by the random forest

use ndarray::{Array2, ArrayView1};
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Tree node; leaves hold the positive-class proportion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Gini impurity of a node with `pos` positives out of `n`
fn gini(pos: f64, n: f64) -> f64 {
    if n == 0.0 {
        return 0.0;
    }
    let p = pos / n;
    2.0 * p * (1.0 - p)
}

/// A binary classification tree grown with random feature subsets per node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    /// Features sampled at each split
    pub mtry: usize,
    /// Nodes smaller than this are not split
    pub min_n: usize,
}

impl DecisionTree {
    pub fn new(mtry: usize, min_n: usize) -> Self {
        Self {
            root: None,
            mtry: mtry.max(1),
            min_n: min_n.max(2),
        }
    }

    /// Grow the tree on rows `indices` of `x` with 0/1 outcome `y`
    pub fn fit<R: Rng>(&mut self, x: &Array2<f64>, y: &[f64], indices: &[usize], rng: &mut R) {
        self.root = Some(self.build_tree(x, y, indices, rng));
    }

    fn leaf(y: &[f64], indices: &[usize]) -> TreeNode {
        let pos: f64 = indices.iter().map(|&i| y[i]).sum();
        TreeNode::Leaf {
            value: if indices.is_empty() {
                0.0
            } else {
                pos / indices.len() as f64
            },
            n_samples: indices.len(),
        }
    }

    fn build_tree<R: Rng>(
        &self,
        x: &Array2<f64>,
        y: &[f64],
        indices: &[usize],
        rng: &mut R,
    ) -> TreeNode {
        let n_samples = indices.len();
        let pos: f64 = indices.iter().map(|&i| y[i]).sum();
        let pure = pos == 0.0 || pos == n_samples as f64;

        if n_samples < self.min_n || pure {
            return Self::leaf(y, indices);
        }

        match self.find_best_split(x, y, indices, rng) {
            Some((feature_idx, threshold)) => {
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| x[[i, feature_idx]] <= threshold);
                if left_idx.is_empty() || right_idx.is_empty() {
                    return Self::leaf(y, indices);
                }
                let left = Box::new(self.build_tree(x, y, &left_idx, rng));
                let right = Box::new(self.build_tree(x, y, &right_idx, rng));
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    n_samples,
                }
            }
            None => Self::leaf(y, indices),
        }
    }

    /// Best `(feature, threshold)` by Gini decrease among `mtry` random
    /// features. Earlier-sampled features win exact ties.
    fn find_best_split<R: Rng>(
        &self,
        x: &Array2<f64>,
        y: &[f64],
        indices: &[usize],
        rng: &mut R,
    ) -> Option<(usize, f64)> {
        let n_features = x.ncols();
        let n = indices.len() as f64;
        let total_pos: f64 = indices.iter().map(|&i| y[i]).sum();
        let parent = gini(total_pos, n);

        let candidates = sample(rng, n_features, self.mtry.min(n_features));
        let mut best: Option<(usize, f64, f64)> = None;
        let mut order: Vec<usize> = indices.to_vec();

        for feature_idx in candidates.iter() {
            let column = x.column(feature_idx);
            order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));

            let mut left_n = 0.0;
            let mut left_pos = 0.0;
            for w in 0..order.len() - 1 {
                let i = order[w];
                left_n += 1.0;
                left_pos += y[i];

                let (lo, hi) = (column[i], column[order[w + 1]]);
                if lo == hi || !lo.is_finite() || !hi.is_finite() {
                    continue;
                }
                let right_n = n - left_n;
                let weighted = (left_n * gini(left_pos, left_n)
                    + right_n * gini(total_pos - left_pos, right_n))
                    / n;
                let gain = parent - weighted;
                if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature_idx, (lo + hi) / 2.0, gain));
                }
            }
        }

        best.map(|(f, t, _)| (f, t))
    }

    fn predict_sample(node: &TreeNode, sample: ArrayView1<f64>) -> f64 {
        match node {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
                ..
            } => {
                if sample[*feature_idx] <= *threshold {
                    Self::predict_sample(left, sample)
                } else {
                    Self::predict_sample(right, sample)
                }
            }
        }
    }

    /// Positive-class proportion of the leaf `sample` falls into
    pub fn predict_one(&self, sample: ArrayView1<f64>) -> f64 {
        self.root
            .as_ref()
            .map(|root| Self::predict_sample(root, sample))
            .unwrap_or(0.0)
    }

    pub fn n_leaves(&self) -> usize {
        fn count(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => count(left) + count(right),
            }
        }
        self.root.as_ref().map(count).unwrap_or(0)
    }
}
