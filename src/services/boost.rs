use serde::{Deserialize, Serialize};

/// Maximum split thresholds evaluated per feature at one node.
const MAX_THRESHOLDS: usize = 16;

/// Hyperparameters for one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostParams {
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub rounds: usize,
    pub early_stopping_rounds: usize,
}

impl BoostParams {
    /// Parameters adapted to dataset size: small datasets get shallower
    /// trees, a slower learning rate, and tighter stopping.
    pub fn for_dataset(rows: usize) -> Self {
        if rows < 100 {
            Self {
                learning_rate: 0.03,
                max_depth: 3,
                min_samples_leaf: 3,
                rounds: 50,
                early_stopping_rounds: 5,
            }
        } else {
            Self {
                learning_rate: 0.05,
                max_depth: 5,
                min_samples_leaf: 10,
                rounds: 200,
                early_stopping_rounds: 20,
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf(f64),
}

/// A single regression tree stored as a flat node arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn predict(&self, features: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if features.get(*feature).copied().unwrap_or(0.0) <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// Gradient-boosted regression trees minimizing squared error.
///
/// Each round fits one tree to the current residuals and adds it scaled by
/// the learning rate. Split gains accumulate per feature into
/// `feature_gain`, the importance signal the explanation layer consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    base_prediction: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
    pub feature_gain: Vec<f64>,
    pub validation_rmse: Option<f64>,
}

impl GradientBoostedTrees {
    /// Fits a model on the training split, early-stopping on validation
    /// RMSE when a validation split is supplied.
    pub fn fit(
        train_x: &[Vec<f64>],
        train_y: &[f64],
        val_x: &[Vec<f64>],
        val_y: &[f64],
        params: &BoostParams,
    ) -> Result<Self, String> {
        if train_x.is_empty() || train_x.len() != train_y.len() {
            return Err("training data is empty or misaligned".to_string());
        }
        let feature_count = train_x[0].len();
        if train_x.iter().any(|row| row.len() != feature_count) {
            return Err("inconsistent feature vector lengths".to_string());
        }

        let base_prediction = train_y.iter().sum::<f64>() / train_y.len() as f64;
        let mut model = Self {
            base_prediction,
            learning_rate: params.learning_rate,
            trees: Vec::new(),
            feature_gain: vec![0.0; feature_count],
            validation_rmse: None,
        };

        let mut predictions = vec![base_prediction; train_x.len()];
        let mut best_rmse = f64::INFINITY;
        let mut best_round = 0usize;
        let mut stale_rounds = 0usize;

        for round in 0..params.rounds {
            let residuals: Vec<f64> = train_y
                .iter()
                .zip(&predictions)
                .map(|(y, p)| y - p)
                .collect();

            let mut builder = TreeBuilder {
                features: train_x,
                targets: &residuals,
                params,
                nodes: Vec::new(),
                feature_gain: vec![0.0; feature_count],
            };
            let indices: Vec<usize> = (0..train_x.len()).collect();
            builder.build(&indices, 0);
            let tree = RegressionTree {
                nodes: builder.nodes,
            };

            for (gain, acc) in builder.feature_gain.iter().zip(model.feature_gain.iter_mut()) {
                *acc += gain;
            }

            for (prediction, row) in predictions.iter_mut().zip(train_x) {
                *prediction += params.learning_rate * tree.predict(row);
            }
            model.trees.push(tree);

            if !val_x.is_empty() {
                let rmse = rmse(&model, val_x, val_y);
                if rmse + 1e-9 < best_rmse {
                    best_rmse = rmse;
                    best_round = round + 1;
                    stale_rounds = 0;
                } else {
                    stale_rounds += 1;
                    if stale_rounds >= params.early_stopping_rounds {
                        break;
                    }
                }
            }
        }

        if !val_x.is_empty() {
            model.trees.truncate(best_round.max(1));
            model.validation_rmse = Some(rmse(&model, val_x, val_y));
        }

        Ok(model)
    }

    /// Raw additive prediction; callers clamp to the score range.
    pub fn predict(&self, features: &[f64]) -> f64 {
        self.base_prediction
            + self
                .trees
                .iter()
                .map(|t| self.learning_rate * t.predict(features))
                .sum::<f64>()
    }
}

fn rmse(model: &GradientBoostedTrees, xs: &[Vec<f64>], ys: &[f64]) -> f64 {
    let sse: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| {
            let d = model.predict(x) - y;
            d * d
        })
        .sum();
    (sse / xs.len() as f64).sqrt()
}

struct TreeBuilder<'a> {
    features: &'a [Vec<f64>],
    targets: &'a [f64],
    params: &'a BoostParams,
    nodes: Vec<Node>,
    feature_gain: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl<'a> TreeBuilder<'a> {
    /// Builds the subtree over `indices`, returning its node index.
    fn build(&mut self, indices: &[usize], depth: usize) -> usize {
        let mean = self.mean(indices);

        if depth >= self.params.max_depth
            || indices.len() < 2 * self.params.min_samples_leaf
        {
            return self.push(Node::Leaf(mean));
        }

        let Some(split) = self.best_split(indices) else {
            return self.push(Node::Leaf(mean));
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|i| self.features[*i][split.feature] <= split.threshold);

        self.feature_gain[split.feature] += split.gain;

        // Reserve the split slot before recursing so child indices are known.
        let node_index = self.push(Node::Leaf(mean));
        let left = self.build(&left_idx, depth + 1);
        let right = self.build(&right_idx, depth + 1);
        self.nodes[node_index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_index
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn mean(&self, indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        indices.iter().map(|i| self.targets[*i]).sum::<f64>() / indices.len() as f64
    }

    fn sse(&self, indices: &[usize]) -> f64 {
        let mean = self.mean(indices);
        indices
            .iter()
            .map(|i| {
                let d = self.targets[*i] - mean;
                d * d
            })
            .sum()
    }

    /// Greedy variance-reduction split search over quantile thresholds.
    fn best_split(&self, indices: &[usize]) -> Option<BestSplit> {
        let parent_sse = self.sse(indices);
        if parent_sse <= 1e-12 {
            return None;
        }

        let feature_count = self.features[indices[0]].len();
        let mut best: Option<BestSplit> = None;

        for feature in 0..feature_count {
            let mut values: Vec<f64> = indices
                .iter()
                .map(|i| self.features[*i][feature])
                .collect();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            values.dedup();
            if values.len() < 2 {
                continue;
            }

            let step = (values.len() / MAX_THRESHOLDS).max(1);
            for pair in values.windows(2).step_by(step) {
                let threshold = (pair[0] + pair[1]) / 2.0;
                let (left, right): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .copied()
                    .partition(|i| self.features[*i][feature] <= threshold);
                if left.len() < self.params.min_samples_leaf
                    || right.len() < self.params.min_samples_leaf
                {
                    continue;
                }
                let gain = parent_sse - self.sse(&left) - self.sse(&right);
                if gain > best.as_ref().map_or(1e-9, |b| b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = 1 when x0 > 0.5, else 0, with a noise feature.
    fn step_dataset(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for i in 0..n {
            let x0 = i as f64 / n as f64;
            let noise = ((i * 7919) % 100) as f64 / 100.0;
            xs.push(vec![x0, noise]);
            ys.push(if x0 > 0.5 { 1.0 } else { 0.0 });
        }
        (xs, ys)
    }

    #[test]
    fn test_fit_learns_a_step_function() {
        let (xs, ys) = step_dataset(200);
        let params = BoostParams::for_dataset(xs.len());
        let model = GradientBoostedTrees::fit(&xs, &ys, &xs, &ys, &params).unwrap();

        assert!(model.predict(&[0.9, 0.3]) > 0.7);
        assert!(model.predict(&[0.1, 0.3]) < 0.3);
        assert!(model.validation_rmse.unwrap() < 0.2);
    }

    #[test]
    fn test_informative_feature_dominates_gain() {
        let (xs, ys) = step_dataset(200);
        let params = BoostParams::for_dataset(xs.len());
        let model = GradientBoostedTrees::fit(&xs, &ys, &[], &[], &params).unwrap();
        assert!(model.feature_gain[0] > model.feature_gain[1] * 10.0);
    }

    #[test]
    fn test_constant_targets_yield_base_prediction() {
        let xs = vec![vec![0.1], vec![0.5], vec![0.9]];
        let ys = vec![0.7, 0.7, 0.7];
        let params = BoostParams::for_dataset(3);
        let model = GradientBoostedTrees::fit(&xs, &ys, &[], &[], &params).unwrap();
        assert!((model.predict(&[0.3]) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_small_dataset_params_are_conservative() {
        let small = BoostParams::for_dataset(20);
        let large = BoostParams::for_dataset(500);
        assert!(small.max_depth < large.max_depth);
        assert!(small.learning_rate < large.learning_rate);
        assert!(small.rounds < large.rounds);
    }

    #[test]
    fn test_empty_training_data_is_an_error() {
        let params = BoostParams::for_dataset(0);
        assert!(GradientBoostedTrees::fit(&[], &[], &[], &[], &params).is_err());
    }

    #[test]
    fn test_early_stopping_bounds_tree_count() {
        let (xs, ys) = step_dataset(200);
        let params = BoostParams {
            rounds: 200,
            early_stopping_rounds: 3,
            ..BoostParams::for_dataset(200)
        };
        let model = GradientBoostedTrees::fit(&xs, &ys, &xs, &ys, &params).unwrap();
        assert!(model.trees.len() <= 200);
        // Serialization round-trip keeps predictions identical.
        let json = serde_json::to_string(&model).unwrap();
        let restored: GradientBoostedTrees = serde_json::from_str(&json).unwrap();
        assert_eq!(model.predict(&[0.8, 0.1]), restored.predict(&[0.8, 0.1]));
    }
}
