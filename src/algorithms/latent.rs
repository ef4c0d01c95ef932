use crate::config::TrainingConfig;
use crate::models::{MovieId, Rating, UserId};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tracing::info;

/// Biased matrix factorization fit on explicit ratings: a rating estimate is
/// the global mean plus user and item biases plus the latent interaction.
///
/// The model is immutable after `fit`; retraining means a fresh fit over the
/// full dataset. `predict` never fails: users or items absent from training
/// fall back to the mean terms that are available, and every estimate is
/// clipped into the configured rating scale.
#[derive(Debug, Clone)]
pub struct LatentFactorModel {
    global_mean: f32,
    scale: (f32, f32),
    user_index: HashMap<UserId, usize>,
    item_index: HashMap<MovieId, usize>,
    user_factors: Vec<DVector<f32>>,
    item_factors: Vec<DVector<f32>>,
    user_bias: Vec<f32>,
    item_bias: Vec<f32>,
    test_rmse: Option<f32>,
}

impl LatentFactorModel {
    /// Train with SGD on a seeded train/test split. The fixed seed makes the
    /// split and the factor initialization reproducible for evaluation;
    /// inference does not depend on it.
    pub fn fit(ratings: &[Rating], config: &TrainingConfig, scale: (f32, f32)) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);

        let mut shuffled: Vec<Rating> = ratings.to_vec();
        shuffled.shuffle(&mut rng);
        let test_len = (shuffled.len() as f32 * config.test_fraction) as usize;
        let (test, train) = shuffled.split_at(test_len);

        let global_mean = if train.is_empty() {
            (scale.0 + scale.1) / 2.0
        } else {
            train.iter().map(|r| r.score).sum::<f32>() / train.len() as f32
        };

        // Entity indexes cover the train split only; everything else is a
        // cold-start entity by definition.
        let mut user_index = HashMap::new();
        let mut item_index = HashMap::new();
        for rating in train {
            let next = user_index.len();
            user_index.entry(rating.user_id).or_insert(next);
            let next = item_index.len();
            item_index.entry(rating.movie_id).or_insert(next);
        }

        let init = |rng: &mut StdRng| -> DVector<f32> {
            DVector::from_iterator(
                config.factors,
                (0..config.factors).map(|_| (rng.gen::<f32>() - 0.5) * 0.1),
            )
        };
        let mut user_factors: Vec<DVector<f32>> =
            (0..user_index.len()).map(|_| init(&mut rng)).collect();
        let mut item_factors: Vec<DVector<f32>> =
            (0..item_index.len()).map(|_| init(&mut rng)).collect();
        let mut user_bias = vec![0.0f32; user_index.len()];
        let mut item_bias = vec![0.0f32; item_index.len()];

        let lr = config.learning_rate;
        let reg = config.regularization;
        for epoch in 0..config.epochs {
            let mut sq_err = 0.0f64;
            for rating in train {
                let u = user_index[&rating.user_id];
                let i = item_index[&rating.movie_id];

                let pred =
                    global_mean + user_bias[u] + item_bias[i] + user_factors[u].dot(&item_factors[i]);
                let err = rating.score - pred;
                sq_err += (err * err) as f64;

                user_bias[u] += lr * (err - reg * user_bias[u]);
                item_bias[i] += lr * (err - reg * item_bias[i]);

                let user_step = (&item_factors[i] * err) - (&user_factors[u] * reg);
                let item_step = (&user_factors[u] * err) - (&item_factors[i] * reg);
                user_factors[u] += user_step * lr;
                item_factors[i] += item_step * lr;
            }
            if !train.is_empty() && (epoch + 1) % 5 == 0 {
                let rmse = (sq_err / train.len() as f64).sqrt();
                info!("Epoch {}: train RMSE {:.4}", epoch + 1, rmse);
            }
        }

        let mut model = Self {
            global_mean,
            scale,
            user_index,
            item_index,
            user_factors,
            item_factors,
            user_bias,
            item_bias,
            test_rmse: None,
        };

        if !test.is_empty() {
            let sq_err: f64 = test
                .iter()
                .map(|r| {
                    let err = r.score - model.predict(r.user_id, r.movie_id);
                    (err * err) as f64
                })
                .sum();
            let rmse = (sq_err / test.len() as f64).sqrt() as f32;
            info!(
                "Trained latent factor model on {} ratings, test RMSE {:.4} on {} held out",
                train.len(),
                rmse,
                test.len()
            );
            model.test_rmse = Some(rmse);
        }

        model
    }

    /// Rating estimate for any (user, movie) pair, always finite and inside
    /// the configured scale. Unseen users or items degrade to the mean terms
    /// that are known instead of erroring.
    pub fn predict(&self, user_id: UserId, movie_id: MovieId) -> f32 {
        let user = self.user_index.get(&user_id).copied();
        let item = self.item_index.get(&movie_id).copied();

        let mut estimate = self.global_mean;
        if let Some(u) = user {
            estimate += self.user_bias[u];
        }
        if let Some(i) = item {
            estimate += self.item_bias[i];
        }
        if let (Some(u), Some(i)) = (user, item) {
            estimate += self.user_factors[u].dot(&self.item_factors[i]);
        }

        estimate.clamp(self.scale.0, self.scale.1)
    }

    pub fn knows_user(&self, user_id: UserId) -> bool {
        self.user_index.contains_key(&user_id)
    }

    pub fn knows_item(&self, movie_id: MovieId) -> bool {
        self.item_index.contains_key(&movie_id)
    }

    pub fn global_mean(&self) -> f32 {
        self.global_mean
    }

    /// RMSE on the held-out split, when one was configured.
    pub fn test_rmse(&self) -> Option<f32> {
        self.test_rmse
    }

    pub fn scale(&self) -> (f32, f32) {
        self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCALE: (f32, f32) = (0.5, 5.0);

    fn fast_config() -> TrainingConfig {
        TrainingConfig {
            factors: 8,
            epochs: 200,
            learning_rate: 0.05,
            regularization: 0.02,
            test_fraction: 0.0,
            seed: 42,
        }
    }

    fn polarized_ratings() -> Vec<Rating> {
        // User 1 loves items 1..=3 and hates 4..=6; user 2 is the opposite.
        let mut ratings = Vec::new();
        for movie_id in 1..=3 {
            ratings.push(Rating { user_id: 1, movie_id, score: 5.0 });
            ratings.push(Rating { user_id: 2, movie_id, score: 1.0 });
        }
        for movie_id in 4..=6 {
            ratings.push(Rating { user_id: 1, movie_id, score: 1.0 });
            ratings.push(Rating { user_id: 2, movie_id, score: 5.0 });
        }
        ratings
    }

    #[test]
    fn test_predictions_stay_in_scale() {
        let model = LatentFactorModel::fit(&polarized_ratings(), &fast_config(), SCALE);

        for user_id in [1, 2, 99] {
            for movie_id in [1, 4, 999] {
                let pred = model.predict(user_id, movie_id);
                assert!(pred.is_finite());
                assert!((SCALE.0..=SCALE.1).contains(&pred), "pred {} out of scale", pred);
            }
        }
    }

    #[test]
    fn test_model_learns_preferences() {
        let model = LatentFactorModel::fit(&polarized_ratings(), &fast_config(), SCALE);

        assert!(model.predict(1, 2) > model.predict(1, 5));
        assert!(model.predict(2, 5) > model.predict(2, 2));
    }

    #[test]
    fn test_cold_start_falls_back_to_means() {
        let model = LatentFactorModel::fit(&polarized_ratings(), &fast_config(), SCALE);

        // Unknown user and item: plain global mean, clipped.
        let both_unknown = model.predict(99, 999);
        assert_eq!(
            both_unknown,
            model.global_mean().clamp(SCALE.0, SCALE.1)
        );
        assert!(!model.knows_user(99));
        assert!(!model.knows_item(999));
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let a = LatentFactorModel::fit(&polarized_ratings(), &fast_config(), SCALE);
        let b = LatentFactorModel::fit(&polarized_ratings(), &fast_config(), SCALE);
        assert_eq!(a.predict(1, 2), b.predict(1, 2));
        assert_eq!(a.predict(2, 6), b.predict(2, 6));
    }

    #[test]
    fn test_empty_ratings_yield_midpoint() {
        let model = LatentFactorModel::fit(&[], &fast_config(), SCALE);
        assert_eq!(model.predict(1, 1), (SCALE.0 + SCALE.1) / 2.0);
    }

    #[test]
    fn test_holdout_rmse_is_reported() {
        let config = TrainingConfig {
            test_fraction: 0.2,
            ..fast_config()
        };
        let model = LatentFactorModel::fit(&polarized_ratings(), &config, SCALE);
        let rmse = model.test_rmse().unwrap();
        assert!(rmse.is_finite() && rmse >= 0.0);
    }
}
