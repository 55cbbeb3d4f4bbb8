//! Vector helpers shared by the embedding service and vector search.
//!
//! The backing store receives query vectors as a bracketed, comma-separated
//! literal (`"[0.01,-0.23,...]"`), which is also the JSON array encoding.

use blueprint_types::error::EmbeddingError;

/// Format an embedding as the literal the store's vector type expects.
pub fn format_vector_literal(vector: &[f32]) -> String {
    let mut out = String::with_capacity(vector.len() * 10 + 2);
    out.push('[');
    for (i, component) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&component.to_string());
    }
    out.push(']');
    out
}

/// Parse a bracketed vector literal back into components.
pub fn parse_vector_literal(literal: &str) -> Result<Vec<f32>, EmbeddingError> {
    let inner = literal
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| {
            EmbeddingError::InvalidResponse(format!("vector literal must be bracketed: '{literal}'"))
        })?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    EmbeddingError::InvalidResponse(format!("invalid vector component '{part}'"))
                })
        })
        .collect()
}

/// A zero vector of the given dimension (the degraded-mode embedding).
pub fn zero_vector(dimensions: usize) -> Vec<f32> {
    vec![0.0; dimensions]
}

/// Whether every component is exactly zero.
pub fn is_zero_vector(vector: &[f32]) -> bool {
    vector.iter().all(|v| *v == 0.0)
}

/// L2-normalize a vector. Zero vectors are returned unchanged.
pub fn l2_normalize(vector: &[f32]) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter().map(|v| v / norm).collect()
    } else {
        vector.to_vec()
    }
}

/// Convert a cosine distance into a display percentage.
///
/// `clamp(100 - distance * 100, 0, 100)` rounded to one decimal. Meaningful
/// only for distances in `[0, 1]`; anything past 1 reads as 0%. Display only,
/// never used for ordering.
pub fn similarity_percentage(distance: f64) -> f64 {
    if distance.is_nan() {
        return 0.0;
    }
    let pct = (100.0 - distance * 100.0).clamp(0.0, 100.0);
    (pct * 10.0).round() / 10.0
}
