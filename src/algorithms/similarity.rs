use crate::algorithms::vectorizer::SparseVector;
use crate::error::EngineError;
use crate::models::MovieId;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Pairwise cosine similarity over all item metadata vectors. Built once at
/// startup and immutable afterwards; adding movies requires a full rebuild.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    ids: Vec<MovieId>,
    index_of: HashMap<MovieId, usize>,
    matrix: Vec<Vec<f32>>,
}

impl SimilarityIndex {
    /// Construction is O(n^2) in the number of movies; rows are filled in
    /// parallel. Vectors are already L2-normalized, so cosine is a dot.
    pub fn build(ids: Vec<MovieId>, vectors: &[SparseVector]) -> Self {
        assert_eq!(ids.len(), vectors.len(), "one vector per movie id");
        let n = ids.len();

        let matrix: Vec<Vec<f32>> = (0..n)
            .into_par_iter()
            .map(|i| {
                (0..n)
                    .map(|j| {
                        if i == j {
                            1.0
                        } else {
                            vectors[i].dot(&vectors[j]).clamp(0.0, 1.0)
                        }
                    })
                    .collect()
            })
            .collect();

        let index_of = ids.iter().enumerate().map(|(pos, &id)| (id, pos)).collect();
        info!("Built similarity index over {} movies", n);

        Self {
            ids,
            index_of,
            matrix,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, movie_id: MovieId) -> bool {
        self.index_of.contains_key(&movie_id)
    }

    pub fn similarity(&self, a: MovieId, b: MovieId) -> Option<f32> {
        let i = *self.index_of.get(&a)?;
        let j = *self.index_of.get(&b)?;
        Some(self.matrix[i][j])
    }

    /// Up to `k` most similar movies, descending by similarity, excluding the
    /// query movie itself and any id in `exclude`. Ties keep the original
    /// catalog order: the sort is stable over a row scanned in that order.
    pub fn top_similar(
        &self,
        movie_id: MovieId,
        k: usize,
        exclude: &HashSet<MovieId>,
    ) -> Result<Vec<(MovieId, f32)>, EngineError> {
        let row_idx = *self
            .index_of
            .get(&movie_id)
            .ok_or(EngineError::InvalidInput(movie_id))?;

        let mut scored: Vec<(MovieId, f32)> = self.matrix[row_idx]
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != row_idx)
            .map(|(j, &score)| (self.ids[j], score))
            .filter(|(id, _)| !exclude.contains(id))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::vectorizer::TfidfVectorizer;

    fn build_index(docs: &[&str]) -> SimilarityIndex {
        let docs: Vec<String> = docs.iter().map(|d| d.to_string()).collect();
        let (_, vectors) = TfidfVectorizer::fit_transform(&docs);
        let ids = (0..docs.len() as MovieId).map(|i| i * 10).collect();
        SimilarityIndex::build(ids, &vectors)
    }

    #[test]
    fn test_symmetry_and_unit_diagonal() {
        let index = build_index(&[
            "action crime heist",
            "action crime",
            "comedy romance",
            "documentary nature",
        ]);

        for &a in &[0, 10, 20, 30] {
            assert_eq!(index.similarity(a, a), Some(1.0));
            for &b in &[0, 10, 20, 30] {
                let ab = index.similarity(a, b).unwrap();
                let ba = index.similarity(b, a).unwrap();
                assert_eq!(ab, ba);
                assert!((0.0..=1.0).contains(&ab));
            }
        }
    }

    #[test]
    fn test_top_similar_excludes_query_and_ranks_descending() {
        let index = build_index(&[
            "action crime heist",
            "action crime",
            "comedy romance",
            "action heist",
        ]);

        let results = index.top_similar(0, 3, &HashSet::new()).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|&(id, _)| id != 0));
        for pair in results.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
        // The pure-comedy movie shares nothing with the query.
        assert_eq!(results.last().unwrap().0, 20);
    }

    #[test]
    fn test_ties_keep_catalog_order() {
        // Two identical documents tie exactly against the query.
        let index = build_index(&["western duel", "western", "western"]);
        let results = index.top_similar(0, 2, &HashSet::new()).unwrap();
        assert_eq!(results[0].0, 10);
        assert_eq!(results[1].0, 20);
        assert_eq!(results[0].1, results[1].1);
    }

    #[test]
    fn test_exclusion_set_is_honored() {
        let index = build_index(&["action", "action", "action"]);
        let exclude: HashSet<MovieId> = [10].into_iter().collect();
        let results = index.top_similar(0, 5, &exclude).unwrap();
        assert_eq!(results.iter().map(|&(id, _)| id).collect::<Vec<_>>(), vec![20]);
    }

    #[test]
    fn test_unknown_id_is_invalid_input() {
        let index = build_index(&["action"]);
        assert!(matches!(
            index.top_similar(999, 5, &HashSet::new()),
            Err(EngineError::InvalidInput(999))
        ));
    }
}
