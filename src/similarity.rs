use rayon::prelude::*;

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn l2_norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Unit vector in the direction of `v`; `None` when `v` has no direction.
pub fn normalized(v: &[f32]) -> Option<Vec<f32>> {
    let n = l2_norm(v);
    if n == 0.0 || !n.is_finite() {
        return None;
    }
    Some(v.iter().map(|x| x / n).collect())
}

/// Column-wise sum of a set of vectors of equal dimension.
pub fn vector_sum(vectors: &[Vec<f32>]) -> Vec<f32> {
    let dim = vectors.first().map(Vec::len).unwrap_or(0);
    let mut out = vec![0.0f32; dim];
    for v in vectors {
        for (o, x) in out.iter_mut().zip(v) {
            *o += x;
        }
    }
    out
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let denom = l2_norm(a) * l2_norm(b);
    if denom == 0.0 {
        0.0
    } else {
        dot(a, b) / denom
    }
}

/// Full `|a| x |b|` cosine similarity matrix. Rows are computed in parallel and
/// returned in row order.
pub fn cosine_matrix(a: &[Vec<f32>], b: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let unit = |v: &Vec<f32>| normalized(v).unwrap_or_else(|| vec![0.0; v.len()]);
    let a_unit: Vec<Vec<f32>> = a.iter().map(unit).collect();
    let b_unit: Vec<Vec<f32>> = b.iter().map(unit).collect();

    a_unit
        .par_iter()
        .map(|row| b_unit.iter().map(|col| dot(row, col)).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        assert!((cosine(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn zero_vector_has_no_direction() {
        assert!(normalized(&[0.0, 0.0]).is_none());
        let n = normalized(&[3.0, 4.0]).unwrap();
        assert!((n[0] - 0.6).abs() < 1e-6 && (n[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn matrix_shape_and_values() {
        let a = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let b = vec![vec![1.0, 0.0], vec![1.0, 1.0], vec![0.0, -1.0]];
        let m = cosine_matrix(&a, &b);
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].len(), 3);
        assert!((m[0][0] - 1.0).abs() < 1e-6);
        assert!((m[1][2] + 1.0).abs() < 1e-6);
        assert!((m[0][1] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }
}
