pub mod latent;
pub mod similarity;
pub mod vectorizer;

pub use latent::LatentFactorModel;
pub use similarity::SimilarityIndex;
pub use vectorizer::{SparseVector, TfidfVectorizer};
