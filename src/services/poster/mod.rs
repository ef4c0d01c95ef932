use crate::config::PosterConfig;
use crate::error::EngineError;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// OMDb poster lookup, keyed by the seven-digit IMDb id. Lookups are bounded
/// by the configured timeout and any failure degrades to a missing poster;
/// the recommendation path never waits on or fails because of this service.
pub struct PosterClient {
    http: reqwest::Client,
    config: PosterConfig,
}

#[derive(Debug, Deserialize)]
struct OmdbResponse {
    #[serde(rename = "Poster")]
    poster: Option<String>,
}

impl PosterClient {
    pub fn new(config: PosterConfig) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| EngineError::ExternalService(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Poster URL for a movie, or `None` when the movie has no IMDb id, no
    /// key is configured, OMDb reports no poster, or the lookup fails.
    pub async fn poster_url(&self, imdb_id: Option<&str>) -> Option<String> {
        let imdb_id = imdb_id?;
        if self.config.api_key.is_empty() {
            return None;
        }

        match self.lookup(imdb_id).await {
            Ok(url) => url,
            Err(e) => {
                warn!("Poster lookup failed for imdb id {}: {}", imdb_id, e);
                None
            }
        }
    }

    async fn lookup(&self, imdb_id: &str) -> Result<Option<String>, EngineError> {
        // OMDb expects tt-prefixed, zero-padded seven-digit ids.
        let padded = format!("tt{:0>7}", imdb_id);
        let response = self
            .http
            .get(&self.config.base_url)
            .query(&[("apikey", self.config.api_key.as_str()), ("i", &padded)])
            .send()
            .await
            .map_err(|e| EngineError::ExternalService(e.to_string()))?;

        let data: OmdbResponse = response
            .json()
            .await
            .map_err(|e| EngineError::ExternalService(e.to_string()))?;

        Ok(data.poster.filter(|p| p != "N/A"))
    }

    /// Poster reference attached to fallback recommendations.
    pub fn placeholder(&self) -> &str {
        &self.config.placeholder_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled_client() -> PosterClient {
        PosterClient::new(PosterConfig {
            api_key: String::new(),
            base_url: "http://www.omdbapi.com/".to_string(),
            timeout_ms: 100,
            placeholder_url: "https://example.com/placeholder".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_imdb_id_degrades_to_none() {
        assert_eq!(disabled_client().poster_url(None).await, None);
    }

    #[tokio::test]
    async fn test_missing_api_key_skips_lookup() {
        assert_eq!(disabled_client().poster_url(Some("0114709")).await, None);
    }
}
