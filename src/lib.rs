pub mod algorithms;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{EngineError, StoreError};
pub use models::*;

use algorithms::{LatentFactorModel, SimilarityIndex, TfidfVectorizer};
use anyhow::Result;
use services::feedback::{FeedbackStore, FileFeedbackStore};
use services::poster::PosterClient;
use services::recommendation::RecommenderService;
use std::sync::Arc;
use tracing::info;

/// Application context built once at startup and injected everywhere.
/// Construction is the "ready" gate: no recommendation can be served against
/// a partially built index or model because the state does not exist until
/// everything below finished.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
    pub similarity: Arc<SimilarityIndex>,
    pub model: Arc<LatentFactorModel>,
    pub feedback_store: Arc<dyn FeedbackStore>,
    pub recommender: Arc<RecommenderService>,
}

impl AppState {
    /// Heavy one-time initialization: metadata vectorization, similarity
    /// matrix construction and model training all block here. Movies and
    /// ratings arrive pre-loaded; parsing the raw catalog files belongs to
    /// the ingestion collaborator.
    pub async fn new(config: Config, movies: Vec<Movie>, ratings: Vec<Rating>) -> Result<Self> {
        let config = Arc::new(config);

        let catalog = Arc::new(Catalog::new(movies));
        info!("Catalog loaded with {} movies", catalog.len());

        let documents: Vec<String> = catalog
            .movies()
            .iter()
            .map(|m| m.metadata_text())
            .collect();
        let (vectorizer, vectors) = TfidfVectorizer::fit_transform(&documents);
        info!(
            "Vectorized {} metadata documents over {} terms",
            documents.len(),
            vectorizer.vocabulary_size()
        );

        let ids: Vec<MovieId> = catalog.movies().iter().map(|m| m.id).collect();
        let similarity = Arc::new(SimilarityIndex::build(ids, &vectors));

        let model = Arc::new(LatentFactorModel::fit(
            &ratings,
            &config.training,
            config.recommendation.rating_scale(),
        ));

        let feedback_store: Arc<dyn FeedbackStore> =
            Arc::new(FileFeedbackStore::open(&config.store.path).await?);
        let poster = Arc::new(PosterClient::new(config.poster.clone())?);

        let recommender = Arc::new(RecommenderService::new(
            catalog.clone(),
            similarity.clone(),
            model.clone(),
            feedback_store.clone(),
            poster,
            config.recommendation.clone(),
        ));

        Ok(Self {
            config,
            catalog,
            similarity,
            model,
            feedback_store,
            recommender,
        })
    }
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
