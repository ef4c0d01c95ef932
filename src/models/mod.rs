use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type MovieId = u32;
pub type UserId = i64;

/// One catalog entry. Immutable once the catalog is built for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    pub genres: Vec<String>,
    /// Free-form tag text, space separated. Empty when the movie has no tags.
    #[serde(default)]
    pub tags: String,
    /// Seven-digit IMDb identifier used for poster lookup.
    #[serde(default)]
    pub imdb_id: Option<String>,
}

impl Movie {
    pub fn new(id: MovieId, title: impl Into<String>, genres: Vec<String>) -> Self {
        Self {
            id,
            title: title.into(),
            genres,
            tags: String::new(),
            imdb_id: None,
        }
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }

    pub fn with_imdb_id(mut self, imdb_id: impl Into<String>) -> Self {
        self.imdb_id = Some(imdb_id.into());
        self
    }

    /// Text fed to the metadata vectorizer: genre tokens followed by tag text.
    pub fn metadata_text(&self) -> String {
        let genres = self.genres.join(" ");
        if self.tags.is_empty() {
            genres
        } else {
            format!("{} {}", genres, self.tags)
        }
    }

    /// Release year embedded in the title suffix, e.g. "Heat (1995)".
    pub fn year(&self) -> Option<String> {
        let open = self.title.rfind('(')?;
        let rest = &self.title[open + 1..];
        let close = rest.find(')')?;
        let year = rest[..close].trim();
        if year.is_empty() {
            None
        } else {
            Some(year.to_string())
        }
    }

    pub fn normalized_title(&self) -> String {
        normalize_title(&self.title)
    }
}

/// Case-insensitive, trimmed form used for all title matching.
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Explicit rating, the training signal for the latent factor model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeAction {
    Like,
    Dislike,
}

/// One implicit feedback record. Events reference movies by display title
/// because that is what the swipe UI knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeEvent {
    pub movie_title: String,
    pub action: SwipeAction,
}

impl SwipeEvent {
    pub fn new(movie_title: impl Into<String>, action: SwipeAction) -> Self {
        Self {
            movie_title: movie_title.into(),
            action,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    /// Ranked from the user's liked movies by a model that knows the user.
    Ok,
    /// No usable positive signal; a uniform random sample was returned.
    Fallback,
    /// Ranked results, but the user was absent from training so predictions
    /// degraded to mean-based estimates.
    ColdStart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedMovie {
    pub title: String,
    pub genre: String,
    pub year: Option<String>,
    /// Absent on fallback items, which are sampled rather than scored.
    pub predicted_rating: Option<f32>,
    pub poster: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub user_id: UserId,
    pub items: Vec<RecommendedMovie>,
    pub status: RecommendationStatus,
    pub note: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimilarMovie {
    pub movie_id: MovieId,
    pub score: f32,
}

/// The loaded movie catalog with lookup indexes. Positions are the original
/// load order, which is also the tie-breaking order everywhere in the engine.
#[derive(Debug, Clone)]
pub struct Catalog {
    movies: Vec<Movie>,
    id_index: HashMap<MovieId, usize>,
    title_index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(movies: Vec<Movie>) -> Self {
        let id_index = movies
            .iter()
            .enumerate()
            .map(|(pos, m)| (m.id, pos))
            .collect();
        let mut title_index = HashMap::with_capacity(movies.len());
        for (pos, movie) in movies.iter().enumerate() {
            // First occurrence wins for duplicate titles.
            title_index.entry(movie.normalized_title()).or_insert(pos);
        }
        Self {
            movies,
            id_index,
            title_index,
        }
    }

    pub fn len(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }

    pub fn movies(&self) -> &[Movie] {
        &self.movies
    }

    pub fn get(&self, movie_id: MovieId) -> Option<&Movie> {
        self.id_index.get(&movie_id).map(|&pos| &self.movies[pos])
    }

    /// Catalog position for a movie id, the stable ordering key.
    pub fn position_of(&self, movie_id: MovieId) -> Option<usize> {
        self.id_index.get(&movie_id).copied()
    }

    pub fn by_position(&self, pos: usize) -> Option<&Movie> {
        self.movies.get(pos)
    }

    /// Resolve a display title from a swipe event against the catalog.
    pub fn match_title(&self, title: &str) -> Option<&Movie> {
        self.title_index
            .get(&normalize_title(title))
            .map(|&pos| &self.movies[pos])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_extraction() {
        let movie = Movie::new(1, "Toy Story (1995)", vec!["Animation".into()]);
        assert_eq!(movie.year(), Some("1995".to_string()));

        let no_year = Movie::new(2, "Cosmos", vec![]);
        assert_eq!(no_year.year(), None);

        let nested = Movie::new(3, "Twelve Monkeys (a.k.a. 12 Monkeys) (1995)", vec![]);
        assert_eq!(nested.year(), Some("1995".to_string()));
    }

    #[test]
    fn test_metadata_text() {
        let movie = Movie::new(1, "Heat (1995)", vec!["Action".into(), "Crime".into()])
            .with_tags("heist pacino");
        assert_eq!(movie.metadata_text(), "Action Crime heist pacino");

        let untagged = Movie::new(2, "Sabrina (1995)", vec!["Comedy".into()]);
        assert_eq!(untagged.metadata_text(), "Comedy");
    }

    #[test]
    fn test_catalog_title_matching() {
        let catalog = Catalog::new(vec![
            Movie::new(10, "Toy Story (1995)", vec![]),
            Movie::new(20, "Jumanji (1995)", vec![]),
        ]);

        assert_eq!(catalog.match_title("  toy story (1995) ").unwrap().id, 10);
        assert_eq!(catalog.match_title("JUMANJI (1995)").unwrap().id, 20);
        assert!(catalog.match_title("Unknown Movie").is_none());
        assert_eq!(catalog.position_of(20), Some(1));
    }
}
