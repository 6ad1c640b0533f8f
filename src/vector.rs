use crate::error::{GroupingError, GroupingResult};

fn check_pair(a: &[f64], b: &[f64]) -> GroupingResult<()> {
    if a.is_empty() || b.is_empty() {
        return Err(GroupingError::InvalidInput("vectors cannot be empty"));
    }
    if a.len() != b.len() {
        return Err(GroupingError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(())
}

pub fn norm(vector: &[f64]) -> f64 {
    vector.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Cosine of the angle between `a` and `b`, in `[-1, 1]`.
///
/// A zero-norm operand yields `0.0` rather than an error, so the zero
/// sentinel embedding never matches anything.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> GroupingResult<f64> {
    check_pair(a, b)?;

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

pub fn euclidean_distance(a: &[f64], b: &[f64]) -> GroupingResult<f64> {
    check_pair(a, b)?;

    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum();

    Ok(sum.sqrt())
}

/// True when the Euclidean norm of `vector` is within `tolerance` of 1.
pub fn is_normalized(vector: &[f64], tolerance: f64) -> bool {
    if vector.is_empty() {
        return false;
    }
    (norm(vector) - 1.0).abs() < tolerance
}

pub fn is_zero(vector: &[f64]) -> bool {
    vector.iter().all(|v| *v == 0.0)
}

pub fn is_finite(vector: &[f64]) -> bool {
    vector.iter().all(|v| v.is_finite())
}

/// Rejects embedder output that cannot be stored or compared: a length other
/// than `dimension`, or any NaN/infinite component.
pub fn check_embedding(vector: &[f64], dimension: usize) -> GroupingResult<()> {
    if vector.len() != dimension {
        return Err(GroupingError::DimensionMismatch {
            left: vector.len(),
            right: dimension,
        });
    }
    if !is_finite(vector) {
        return Err(GroupingError::InvalidInput(
            "embedding has non-finite components",
        ));
    }
    Ok(())
}

/// Scales `vector` to unit length in place. Returns `false` and leaves the
/// vector untouched when its norm is zero.
pub fn normalize_in_place(vector: &mut [f64]) -> bool {
    let magnitude = norm(vector);
    if magnitude == 0.0 {
        return false;
    }
    for v in vector.iter_mut() {
        *v /= magnitude;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-4;

    #[test]
    fn embedding_check_rejects_wrong_length_and_non_finite() {
        assert!(check_embedding(&[0.6, 0.8], 2).is_ok());
        assert_eq!(
            check_embedding(&[0.6, 0.8], 3),
            Err(GroupingError::DimensionMismatch { left: 2, right: 3 })
        );
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                check_embedding(&[bad, 0.0], 2),
                Err(GroupingError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = [1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < EPS);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        assert!(sim.abs() < EPS);
    }

    #[test]
    fn opposite_vectors_have_similarity_minus_one() {
        let sim = cosine_similarity(&[1.0, 2.0, 3.0], &[-1.0, -2.0, -3.0]).unwrap();
        assert!((sim + 1.0).abs() < EPS);
    }

    #[test]
    fn nearby_vectors_are_highly_similar() {
        let sim = cosine_similarity(&[1.0, 2.0, 3.0], &[1.1, 2.1, 2.9]).unwrap();
        assert!(sim > 0.95);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = [0.3, -1.2, 4.0, 0.0];
        let b = [2.5, 0.7, -0.1, 9.0];
        assert_eq!(
            cosine_similarity(&a, &b).unwrap(),
            cosine_similarity(&b, &a).unwrap()
        );
    }

    #[test]
    fn zero_vector_similarity_is_zero() {
        let sim = cosine_similarity(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let err = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0]).unwrap_err();
        assert_eq!(err, GroupingError::DimensionMismatch { left: 3, right: 2 });

        let err = euclidean_distance(&[1.0, 2.0, 3.0], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, GroupingError::DimensionMismatch { .. }));
    }

    #[test]
    fn empty_vectors_are_invalid_input() {
        assert!(matches!(
            cosine_similarity(&[], &[1.0]),
            Err(GroupingError::InvalidInput(_))
        ));
        assert!(matches!(
            euclidean_distance(&[1.0], &[]),
            Err(GroupingError::InvalidInput(_))
        ));
    }

    #[test]
    fn normalization_check() {
        assert!(is_normalized(&[1.0, 0.0, 0.0], 1e-6));
        assert!(is_normalized(&[0.6, 0.8, 0.0], 1e-6));
        assert!(!is_normalized(&[1.0, 2.0, 3.0], 1e-6));
        assert!(!is_normalized(&[], 1e-6));
    }

    #[test]
    fn euclidean_distance_known_values() {
        assert!(euclidean_distance(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap() < EPS);
        let d = euclidean_distance(&[0.0, 0.0, 0.0], &[3.0, 4.0, 0.0]).unwrap();
        assert!((d - 5.0).abs() < EPS);
    }

    #[test]
    fn normalize_in_place_skips_zero_vectors() {
        let mut zero = vec![0.0; 4];
        assert!(!normalize_in_place(&mut zero));
        assert!(is_zero(&zero));

        let mut v = vec![3.0, 4.0];
        assert!(normalize_in_place(&mut v));
        assert!(is_normalized(&v, 1e-9));
    }
}
