use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use cinematch::{
    init_tracing, AppState, Config, EngineError, Movie, Rating, RecommendationResponse,
    SimilarMovie, SwipeAction, SwipeEvent,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Pre-ingested catalog (JSON array of movies).
    #[arg(long, default_value = "data/movies.json")]
    movies: String,

    /// Pre-ingested explicit ratings (JSON array).
    #[arg(long, default_value = "data/ratings.json")]
    ratings: String,
}

/// Requests arriving before initialization completes see the cell empty and
/// get a distinct 503 so clients retry instead of treating it as "no
/// recommendations".
type SharedState = Arc<OnceCell<AppState>>;

#[derive(Debug, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: "Success".to_string(),
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message,
        }
    }
}

fn status_for(e: &EngineError) -> StatusCode {
    match e {
        EngineError::InvalidInput(_) => StatusCode::NOT_FOUND,
        EngineError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::ExternalService(_) => StatusCode::BAD_GATEWAY,
        EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn ready(shared: &SharedState) -> Result<&AppState, (StatusCode, Json<ApiResponse<()>>)> {
    shared.get().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error(
                EngineError::ModelUnavailable.to_string(),
            )),
        )
    })
}

async fn health_check(State(shared): State<SharedState>) -> Json<ApiResponse<HashMap<String, String>>> {
    let mut status = HashMap::new();
    status.insert("service".to_string(), "cinematch".to_string());
    status.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());
    status.insert(
        "status".to_string(),
        if shared.get().is_some() {
            "ready".to_string()
        } else {
            "initializing".to_string()
        },
    );

    Json(ApiResponse::success(status))
}

#[derive(Debug, Deserialize)]
struct RecommendQuery {
    top_n: Option<usize>,
}

async fn get_recommendations(
    State(shared): State<SharedState>,
    Path(user_id): Path<i64>,
    Query(params): Query<RecommendQuery>,
) -> Result<Json<ApiResponse<RecommendationResponse>>, (StatusCode, Json<ApiResponse<()>>)> {
    let state = ready(&shared)?;

    match state
        .recommender
        .recommend(user_id, params.top_n, None)
        .await
    {
        Ok(response) => Ok(Json(ApiResponse::success(response))),
        Err(e) => {
            error!("Failed to recommend for user {}: {}", user_id, e);
            Err((status_for(&e), Json(ApiResponse::error(e.to_string()))))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SwipeRequest {
    user_id: i64,
    movie_title: String,
    action: SwipeAction,
}

async fn record_swipe(
    State(shared): State<SharedState>,
    Json(swipe): Json<SwipeRequest>,
) -> Result<Json<ApiResponse<String>>, (StatusCode, Json<ApiResponse<()>>)> {
    let state = ready(&shared)?;

    match state
        .recommender
        .record_feedback(swipe.user_id, &swipe.movie_title, swipe.action)
        .await
    {
        Ok(()) => Ok(Json(ApiResponse::success("Swipe saved".to_string()))),
        Err(e) => {
            error!("Failed to record swipe: {}", e);
            Err((status_for(&e), Json(ApiResponse::error(e.to_string()))))
        }
    }
}

async fn get_swipe_history(
    State(shared): State<SharedState>,
    Path(user_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<SwipeEvent>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let state = ready(&shared)?;

    match state.recommender.feedback_history(user_id).await {
        Ok(events) => Ok(Json(ApiResponse::success(events))),
        Err(e) => {
            error!("Failed to read swipe history for user {}: {}", user_id, e);
            Err((status_for(&e), Json(ApiResponse::error(e.to_string()))))
        }
    }
}

async fn reset_history(
    State(shared): State<SharedState>,
    Path(user_id): Path<i64>,
) -> Result<Json<ApiResponse<String>>, (StatusCode, Json<ApiResponse<()>>)> {
    let state = ready(&shared)?;

    match state.recommender.reset_feedback(user_id).await {
        Ok(()) => Ok(Json(ApiResponse::success(
            "History reset successfully".to_string(),
        ))),
        Err(e) => {
            error!("Failed to reset history for user {}: {}", user_id, e);
            Err((status_for(&e), Json(ApiResponse::error(e.to_string()))))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SimilarQuery {
    k: Option<usize>,
}

async fn get_similar_movies(
    State(shared): State<SharedState>,
    Path(movie_id): Path<u32>,
    Query(params): Query<SimilarQuery>,
) -> Result<Json<ApiResponse<Vec<SimilarMovie>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let state = ready(&shared)?;
    let k = params.k.unwrap_or(state.config.recommendation.top_n);

    match state.recommender.similar_items(movie_id, k) {
        Ok(similar) => Ok(Json(ApiResponse::success(similar))),
        Err(e) => Err((status_for(&e), Json(ApiResponse::error(e.to_string())))),
    }
}

fn create_router(shared: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/recommend/:user_id", get(get_recommendations))
        .route("/swipe", post(record_swipe))
        .route("/swipe-history/:user_id", get(get_swipe_history))
        .route("/reset-history/:user_id", delete(reset_history))
        .route("/similar/:movie_id", get(get_similar_movies))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(shared)
}

async fn load_json<T: serde::de::DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using default configuration");
        Config::default()
    };

    let shared: SharedState = Arc::new(OnceCell::new());
    let addr = config.server.socket_addr();

    // Serve immediately; the heavy initialization runs in the background and
    // flips the ready gate when done.
    let init_cell = shared.clone();
    tokio::spawn(async move {
        let movies: Vec<Movie> = match load_json(&args.movies).await {
            Ok(movies) => movies,
            Err(e) => {
                error!("Failed to load catalog from {}: {}", args.movies, e);
                return;
            }
        };
        let ratings: Vec<Rating> = match load_json(&args.ratings).await {
            Ok(ratings) => ratings,
            Err(e) => {
                error!("Failed to load ratings from {}: {}", args.ratings, e);
                return;
            }
        };

        match AppState::new(config, movies, ratings).await {
            Ok(state) => {
                let _ = init_cell.set(state);
                info!("Initialization complete, recommendations available");
            }
            Err(e) => error!("Initialization failed: {}", e),
        }
    });

    let app = create_router(shared);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("cinematch server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
