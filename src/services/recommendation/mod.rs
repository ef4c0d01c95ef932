use crate::algorithms::{LatentFactorModel, SimilarityIndex};
use crate::config::RecommendationConfig;
use crate::error::EngineError;
use crate::models::{
    normalize_title, Catalog, Movie, MovieId, RecommendationResponse, RecommendationStatus,
    RecommendedMovie, SimilarMovie, SwipeAction, SwipeEvent, UserId,
};
use crate::services::feedback::FeedbackStore;
use crate::services::poster::PosterClient;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// State-free hybrid orchestrator. Each call derives the user's positive
/// signals from the feedback store, expands them through the similarity
/// index, ranks the surviving candidates with the latent factor model, and
/// enriches the final list with posters after ranking is done.
pub struct RecommenderService {
    catalog: Arc<Catalog>,
    similarity: Arc<SimilarityIndex>,
    model: Arc<LatentFactorModel>,
    feedback: Arc<dyn FeedbackStore>,
    poster: Arc<PosterClient>,
    config: RecommendationConfig,
}

impl RecommenderService {
    pub fn new(
        catalog: Arc<Catalog>,
        similarity: Arc<SimilarityIndex>,
        model: Arc<LatentFactorModel>,
        feedback: Arc<dyn FeedbackStore>,
        poster: Arc<PosterClient>,
        config: RecommendationConfig,
    ) -> Self {
        Self {
            catalog,
            similarity,
            model,
            feedback,
            poster,
            config,
        }
    }

    /// Produce up to `top_n` ranked recommendations for a user.
    ///
    /// `seed` pins the fallback sample for deterministic tests; production
    /// callers leave it unset and get a fresh sample per request.
    pub async fn recommend(
        &self,
        user_id: UserId,
        top_n: Option<usize>,
        seed: Option<u64>,
    ) -> Result<RecommendationResponse, EngineError> {
        let top_n = top_n.unwrap_or(self.config.top_n);
        let events = self.feedback.list_for(user_id).await?;

        // Positive signal set: liked titles resolved against the catalog.
        // Titles with no catalog match are dropped silently.
        let liked_titles: Vec<&str> = events
            .iter()
            .filter(|e| e.action == SwipeAction::Like)
            .map(|e| e.movie_title.as_str())
            .collect();
        let mut seen = HashSet::new();
        let liked_ids: Vec<MovieId> = liked_titles
            .iter()
            .filter_map(|title| self.catalog.match_title(title))
            .map(|movie| movie.id)
            .filter(|id| seen.insert(*id))
            .collect();

        if liked_ids.is_empty() {
            // No usable positive signal, either because the user never liked
            // anything or because no liked title matched the catalog.
            let matched_none = !liked_titles.is_empty();
            return Ok(self.sample_fallback(user_id, top_n, seed, matched_none));
        }

        // Union of each liked movie's nearest neighbors, deduplicated by id.
        // A liked movie missing from the index is skipped, not fatal.
        let mut candidate_ids: HashSet<MovieId> = HashSet::new();
        for &movie_id in &liked_ids {
            match self
                .similarity
                .top_similar(movie_id, self.config.neighbors_per_like, &HashSet::new())
            {
                Ok(neighbors) => candidate_ids.extend(neighbors.into_iter().map(|(id, _)| id)),
                Err(EngineError::InvalidInput(id)) => {
                    debug!("Liked movie {} absent from similarity index, skipping", id);
                }
                Err(e) => return Err(e),
            }
        }

        // Anything the user already swiped, liked or disliked, never
        // resurfaces.
        let swiped: HashSet<String> = events
            .iter()
            .map(|e| normalize_title(&e.movie_title))
            .collect();

        // Candidates in catalog order so that the stable rating sort breaks
        // ties deterministically.
        let mut ordered: Vec<(usize, &Movie)> = candidate_ids
            .into_iter()
            .filter_map(|id| {
                let pos = self.catalog.position_of(id)?;
                Some((pos, self.catalog.by_position(pos)?))
            })
            .filter(|(_, movie)| !swiped.contains(&movie.normalized_title()))
            .collect();
        ordered.sort_by_key(|&(pos, _)| pos);

        let mut ranked: Vec<(&Movie, f32)> = ordered
            .into_iter()
            .map(|(_, movie)| (movie, self.model.predict(user_id, movie.id)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_n);

        // Poster enrichment happens after ranking so a slow or failing
        // external service can only delay, never reorder or fail, and each
        // lookup is bounded by the client timeout.
        let posters = join_all(
            ranked
                .iter()
                .map(|(movie, _)| self.poster.poster_url(movie.imdb_id.as_deref())),
        )
        .await;

        let items = ranked
            .into_iter()
            .zip(posters)
            .map(|((movie, rating), poster)| RecommendedMovie {
                title: movie.title.clone(),
                genre: movie.genres.join("|"),
                year: movie.year(),
                predicted_rating: Some(round2(rating)),
                poster,
            })
            .collect();

        // A user the model never trained on still gets a ranked list, but
        // the degraded predictions are flagged distinctly.
        let (status, note) = if self.model.knows_user(user_id) {
            (
                RecommendationStatus::Ok,
                "Recommendations generated from your swipes",
            )
        } else {
            (
                RecommendationStatus::ColdStart,
                "Recommendations generated from your swipes; no rating history, scores are catalog means",
            )
        };

        Ok(RecommendationResponse {
            user_id,
            items,
            status,
            note: note.to_string(),
        })
    }

    /// Uniform random sample of catalog movies, used when no positive signal
    /// is available. Not triggered by an empty candidate set after
    /// exclusion filtering; that case returns an empty ranked list instead.
    fn sample_fallback(
        &self,
        user_id: UserId,
        top_n: usize,
        seed: Option<u64>,
        matched_none: bool,
    ) -> RecommendationResponse {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let items = self
            .catalog
            .movies()
            .choose_multiple(&mut rng, top_n)
            .map(|movie| RecommendedMovie {
                title: movie.title.clone(),
                genre: movie.genres.join("|"),
                year: None,
                predicted_rating: None,
                poster: Some(self.poster.placeholder().to_string()),
            })
            .collect();

        let note = if matched_none {
            "Fallback used: no liked movies matched the catalog"
        } else {
            "Fallback used: no swipe history yet"
        };

        RecommendationResponse {
            user_id,
            items,
            status: RecommendationStatus::Fallback,
            note: note.to_string(),
        }
    }

    /// Nearest neighbors for one movie. Unlike the recommend path, an
    /// unknown id here is the caller's error.
    pub fn similar_items(&self, movie_id: MovieId, k: usize) -> Result<Vec<SimilarMovie>, EngineError> {
        Ok(self
            .similarity
            .top_similar(movie_id, k, &HashSet::new())?
            .into_iter()
            .map(|(movie_id, score)| SimilarMovie { movie_id, score })
            .collect())
    }

    pub async fn record_feedback(
        &self,
        user_id: UserId,
        movie_title: &str,
        action: SwipeAction,
    ) -> Result<(), EngineError> {
        self.feedback
            .append(user_id, SwipeEvent::new(movie_title, action))
            .await?;
        Ok(())
    }

    pub async fn feedback_history(&self, user_id: UserId) -> Result<Vec<SwipeEvent>, EngineError> {
        Ok(self.feedback.list_for(user_id).await?)
    }

    pub async fn reset_feedback(&self, user_id: UserId) -> Result<(), EngineError> {
        self.feedback.reset(user_id).await?;
        Ok(())
    }
}
