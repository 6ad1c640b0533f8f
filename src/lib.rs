pub mod backfill;
pub mod config;
pub mod database;
pub mod error;
pub mod grouping;
pub mod normalizer;
pub mod question_loader;
pub mod record;
pub mod service;
pub mod vector;
pub mod vectorizer;

pub use error::{GroupingError, ServiceError};
pub use grouping::{
    group_by_similarity, group_checked, SimilarityGroup, DEFAULT_GROUPING_THRESHOLD,
    STRICT_GROUPING_THRESHOLD,
};
pub use record::TextRecord;
pub use vector::{cosine_similarity, euclidean_distance, is_normalized};
pub use vectorizer::{embed, HashingEmbedder, TextEmbedder, EMBEDDING_DIMENSION};
