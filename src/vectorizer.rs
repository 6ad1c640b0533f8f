use crate::normalizer::{self, TermFrequencyMap};
use crate::vector;
use log::debug;

pub const EMBEDDING_DIMENSION: usize = 1536;

const ACTIVATIONS_PER_TERM: i64 = 16;
const CHAR_SUM_MULTIPLIER: i64 = 7919;
const LENGTH_MULTIPLIER: i64 = 6271;
const SPREAD_MULTIPLIER: i64 = 1009;
const ACTIVATION_SCALE: f64 = 8.0;

/// Anything that turns text into a fixed-length vector.
///
/// Grouping and backfill only rely on this trait, so a model-backed source
/// can stand in for the hashing one as long as it keeps its dimension fixed.
pub trait TextEmbedder: Send + Sync {
    fn name(&self) -> &'static str;

    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Vec<f64>;

    /// Missing text embeds to the zero sentinel.
    fn embed_optional(&self, text: Option<&str>) -> Vec<f64> {
        match text {
            Some(text) => self.embed(text),
            None => vec![0.0; self.dimension()],
        }
    }
}

/// Deterministic feature-hashing embedder.
///
/// Every stemmed term lights up 16 slots spread across the vector, so texts
/// sharing terms overlap in exactly those slots.
#[derive(Debug, Default, Clone)]
pub struct HashingEmbedder;

impl HashingEmbedder {
    pub fn new() -> Self {
        Self
    }

    pub fn encode_terms(&self, terms: &TermFrequencyMap) -> Vec<f64> {
        let mut embedding = vec![0.0f64; EMBEDDING_DIMENSION];
        if terms.is_empty() {
            return embedding;
        }

        let total: usize = terms.values().sum();
        for (term, &count) in terms {
            let weight = term_weight(term, count, total);
            for dim in term_dimensions(term) {
                embedding[dim] += weight * ACTIVATION_SCALE;
            }
        }

        if !vector::normalize_in_place(&mut embedding) {
            return vec![0.0; EMBEDDING_DIMENSION];
        }
        embedding
    }
}

impl TextEmbedder for HashingEmbedder {
    fn name(&self) -> &'static str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    fn embed(&self, text: &str) -> Vec<f64> {
        if text.trim().is_empty() {
            return vec![0.0; EMBEDDING_DIMENSION];
        }

        let terms = normalizer::normalize(text);
        if terms.is_empty() {
            return vec![0.0; EMBEDDING_DIMENSION];
        }

        debug!(
            "Extracted {} terms: {}",
            terms.len(),
            terms.keys().take(10).cloned().collect::<Vec<_>>().join(", ")
        );

        self.encode_terms(&terms)
    }
}

/// Embeds `text` with the default hashing embedder.
pub fn embed(text: &str) -> Vec<f64> {
    HashingEmbedder::new().embed(text)
}

/// Relative frequency scaled up for longer, more specific terms.
fn term_weight(term: &str, count: usize, total: usize) -> f64 {
    let len = term.chars().count() as f64;
    let specificity_boost = 1.0 + (len - 3.0) * 0.2;
    (count as f64 / total as f64) * specificity_boost
}

fn term_dimensions(term: &str) -> impl Iterator<Item = usize> {
    let char_sum: i64 = term.chars().map(|c| c as i64).sum();
    let len = term.chars().count() as i64;
    let base = char_sum * CHAR_SUM_MULTIPLIER + len * LENGTH_MULTIPLIER;

    (0..ACTIVATIONS_PER_TERM).map(move |i| {
        ((base + i * SPREAD_MULTIPLIER) % EMBEDDING_DIMENSION as i64).unsigned_abs() as usize
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{cosine_similarity, is_normalized, is_zero};

    fn similarity(a: &str, b: &str) -> f64 {
        cosine_similarity(&embed(a), &embed(b)).unwrap()
    }

    #[test]
    fn same_text_gives_identical_bits() {
        let text = "How to implement polymorphism with abstract interfaces?";
        let first = embed(text);
        let second = embed(text);
        let first_bits: Vec<u64> = first.iter().map(|v| v.to_bits()).collect();
        let second_bits: Vec<u64> = second.iter().map(|v| v.to_bits()).collect();
        assert_eq!(first_bits, second_bits);
    }

    #[test]
    fn empty_and_missing_text_give_zero_sentinel() {
        let embedder = HashingEmbedder::new();
        for vector in [
            embedder.embed(""),
            embedder.embed("   "),
            embedder.embed_optional(None),
            embedder.embed("the and of"),
        ] {
            assert_eq!(vector.len(), EMBEDDING_DIMENSION);
            assert!(is_zero(&vector));
        }
    }

    #[test]
    fn non_zero_embedding_has_unit_length() {
        let vector = embed("How to implement a singleton pattern in Java?");
        assert_eq!(vector.len(), EMBEDDING_DIMENSION);
        assert!(is_normalized(&vector, 1e-3));
    }

    #[test]
    fn identical_questions_have_similarity_one() {
        let sim = similarity(
            "How to implement polymorphism in Java?",
            "How to implement polymorphism in Java?",
        );
        assert!((sim - 1.0).abs() < 1e-4);
    }

    #[test]
    fn overlapping_questions_are_similar() {
        let sim = similarity(
            "How does Java inheritance work for classes?",
            "Java inheritance explained - how does class inheritance work?",
        );
        assert!(sim > 0.3, "expected > 0.3, got {}", sim);
    }

    #[test]
    fn unrelated_questions_are_dissimilar() {
        let sim = similarity(
            "How does Java OOP inheritance work?",
            "Best pizza toppings for parties?",
        );
        assert!(sim < 0.3, "expected < 0.3, got {}", sim);
    }

    #[test]
    fn shared_terms_outweigh_unrelated_text() {
        let shared = similarity(
            "What are the causes of climate change?",
            "How does climate change affect weather?",
        );
        let unrelated = similarity(
            "What are the causes of climate change?",
            "Best pizza toppings for parties?",
        );
        assert!(shared > unrelated);
    }

    #[test]
    fn each_term_activates_sixteen_slots() {
        let dims: Vec<usize> = term_dimensions("inheritance").collect();
        assert_eq!(dims.len(), 16);
        assert!(dims.iter().all(|d| *d < EMBEDDING_DIMENSION));

        // 1009 and 1536 are coprime, so the 16 slots never coincide
        let mut unique = dims.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 16);
    }

    #[test]
    fn longer_terms_weigh_more() {
        assert!((term_weight("oop", 1, 1) - 1.0).abs() < 1e-12);
        assert!((term_weight("inheritance", 1, 1) - 2.6).abs() < 1e-12);
        assert!((term_weight("inheritance", 1, 4) - 0.65).abs() < 1e-12);
    }
}
