//! Cosine-similarity kernels shared by the vector indexes and the ranking
//! pipeline. Norms are computed once per call; the batched variant walks the
//! target matrix a single time.

/// Cosine similarity of two vectors, clamped to [0, 1].
///
/// Mismatched lengths and zero-norm vectors score 0.0 rather than erroring;
/// a single bad stored vector must not fail a whole batch.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= 1e-8 {
        return 0.0;
    }

    (dot / denom).clamp(0.0, 1.0)
}

/// Cosine similarity of one query against many targets.
///
/// The query norm is computed once; each target contributes one fused pass
/// for dot product and norm. Targets with mismatched dimensions score 0.0.
pub fn batch_cosine(query: &[f32], targets: &[Vec<f32>]) -> Vec<f32> {
    if targets.is_empty() {
        return Vec::new();
    }

    let query_norm = query.iter().map(|x| x * x).sum::<f32>().sqrt();
    if query.is_empty() || query_norm <= 1e-8 {
        return vec![0.0; targets.len()];
    }

    targets
        .iter()
        .map(|target| {
            if target.len() != query.len() {
                return 0.0;
            }
            let mut dot = 0.0f32;
            let mut norm = 0.0f32;
            for (x, y) in query.iter().zip(target.iter()) {
                dot += x * y;
                norm += y * y;
            }
            let denom = norm.sqrt() * query_norm;
            if denom <= 1e-8 {
                0.0
            } else {
                (dot / denom).clamp(0.0, 1.0)
            }
        })
        .collect()
}

/// True when the vector is non-empty and free of NaN/Inf.
pub fn is_valid_vector(vector: &[f32]) -> bool {
    !vector.is_empty() && vector.iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors_is_one() {
        let v = vec![0.3, 0.5, 0.2];
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors_is_zero() {
        assert_eq!(cosine(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_handles_zero_norm_and_mismatch() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn batch_cosine_matches_scalar_kernel() {
        let query = vec![1.0, 0.0, 0.5];
        let targets = vec![
            vec![1.0, 0.0, 0.5],
            vec![0.0, 1.0, 0.0],
            vec![0.5, 0.5, 0.5],
        ];

        let batch = batch_cosine(&query, &targets);
        for (target, got) in targets.iter().zip(batch.iter()) {
            assert!((cosine(&query, target) - got).abs() < 1e-6);
        }
    }

    #[test]
    fn is_valid_vector_rejects_nan() {
        assert!(is_valid_vector(&[0.1, 0.2]));
        assert!(!is_valid_vector(&[0.1, f32::NAN]));
        assert!(!is_valid_vector(&[]));
    }
}
