use crate::core::errors::ApiError;

/// Cosine similarity in `[-1, 1]`. A zero-norm operand yields `0.0`.
pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> Result<f32, ApiError> {
    if query.is_empty() || candidate.is_empty() {
        return Err(ApiError::BadRequest(
            "Vectors must not be empty".to_string(),
        ));
    }
    if query.len() != candidate.len() {
        return Err(ApiError::BadRequest(format!(
            "Vector length mismatch: {} != {}",
            query.len(),
            candidate.len()
        )));
    }

    let mut dot = 0.0f64;
    let mut query_norm = 0.0f64;
    let mut candidate_norm = 0.0f64;
    for (q, c) in query.iter().zip(candidate) {
        let (q, c) = (f64::from(*q), f64::from(*c));
        dot += q * c;
        query_norm += q * q;
        candidate_norm += c * c;
    }

    let denom = query_norm.sqrt() * candidate_norm.sqrt();
    if denom <= f64::EPSILON {
        return Ok(0.0);
    }

    Ok((dot / denom).clamp(-1.0, 1.0) as f32)
}

/// `1 - cosine similarity`: 0 for identical direction, up to 2 for opposite.
pub fn cosine_distance(query: &[f32], candidate: &[f32]) -> Result<f32, ApiError> {
    Ok(1.0 - cosine_similarity(query, candidate)?)
}
