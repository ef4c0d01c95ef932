use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub recommendation: RecommendationConfig,
    pub training: TrainingConfig,
    pub store: StoreConfig,
    pub poster: PosterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("server host/port must form a valid socket address")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// Default result size for a recommendation request.
    pub top_n: usize,
    /// Neighbors pulled from the similarity index per liked movie.
    pub neighbors_per_like: usize,
    pub scale_min: f32,
    pub scale_max: f32,
}

impl RecommendationConfig {
    pub fn rating_scale(&self) -> (f32, f32) {
        (self.scale_min, self.scale_max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub factors: usize,
    pub epochs: usize,
    pub learning_rate: f32,
    pub regularization: f32,
    /// Fraction of ratings held out for RMSE evaluation.
    pub test_fraction: f32,
    /// Seed for the split shuffle and factor initialization.
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the whole-document swipe log.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosterConfig {
    /// OMDb API key. Lookups are skipped entirely when empty.
    pub api_key: String,
    pub base_url: String,
    pub timeout_ms: u64,
    /// Poster reference attached to fallback recommendations.
    pub placeholder_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                workers: num_cpus::get(),
            },
            recommendation: RecommendationConfig {
                top_n: 10,
                neighbors_per_like: 19,
                scale_min: 0.5,
                scale_max: 5.0,
            },
            training: TrainingConfig {
                factors: 20,
                epochs: 20,
                learning_rate: 0.007,
                regularization: 0.02,
                test_fraction: 0.2,
                seed: 42,
            },
            store: StoreConfig {
                path: "swipes.json".to_string(),
            },
            poster: PosterConfig {
                api_key: String::new(),
                base_url: "http://www.omdbapi.com/".to_string(),
                timeout_ms: 2000,
                placeholder_url: "https://via.placeholder.com/300x450?text=Movie".to_string(),
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CINEMATCH"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
