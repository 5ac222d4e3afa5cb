//! Unit-length rescaling of embedding vectors.
//!
//! Each vector is divided by its Euclidean norm plus [`NORM_EPSILON`], so an all-zero
//! vector stays all-zero instead of turning into NaNs.

/// Added to every norm before dividing.
pub const NORM_EPSILON: f32 = 1e-12;

/// Euclidean length of `v`.
pub fn l2_norm(v: &[f32]) -> f32 {
    norm_f64(v) as f32
}

// Squares are summed in f64 so components past ~1.8e19 do not overflow to inf.
fn norm_f64(v: &[f32]) -> f64 {
    v.iter().map(|&x| f64::from(x).powi(2)).sum::<f64>().sqrt()
}

/// Dot product of two equal-length vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Rescale `v` in place to unit length.
pub fn normalize(v: &mut [f32]) {
    let denom = norm_f64(v) + f64::from(NORM_EPSILON);
    v.iter_mut().for_each(|x| *x = (f64::from(*x) / denom) as f32);
}

/// Rescale every vector of a batch to unit length. The batch keeps its shape.
pub fn normalize_rows(mut rows: Vec<Vec<f32>>) -> Vec<Vec<f32>> {
    rows.iter_mut().for_each(|row| normalize(row));
    rows
}
