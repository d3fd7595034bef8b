//! uint8 scalar quantization for stored chunk embeddings.

use ndarray::Array1;

/// An embedding packed into one byte per dimension.
///
/// `value ≈ byte * scale + offset`
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedEmbedding {
    pub bytes: Vec<u8>,
    pub scale: f32,
    pub offset: f32,
}

impl QuantizedEmbedding {
    /// Map the vector's `[min, max]` range linearly onto `[0, 255]`.
    pub fn encode(vector: &Array1<f32>) -> Self {
        let (min, max) = vector
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        if vector.is_empty() {
            return Self { bytes: Vec::new(), scale: 0.0, offset: 0.0 };
        }
        if max - min < 1e-9 {
            return Self { bytes: vec![0; vector.len()], scale: 0.0, offset: min };
        }

        let scale = (max - min) / 255.0;
        let bytes = vector
            .iter()
            .map(|&v| ((v - min) / scale).round().clamp(0.0, 255.0) as u8)
            .collect();
        Self { bytes, scale, offset: min }
    }

    pub fn decode(&self) -> Array1<f32> {
        self.bytes
            .iter()
            .map(|&b| b as f32 * self.scale + self.offset)
            .collect()
    }
}

/// Cosine similarity; zero when either side has no magnitude.
pub fn cosine_similarity(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let norms = a.dot(a).sqrt() * b.dot(b).sqrt();
    if norms < 1e-9 {
        return 0.0;
    }
    a.dot(b) / norms
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_decode_is_close() {
        let original = array![0.1, 0.5, -0.3, 0.8, -0.1];
        let restored = QuantizedEmbedding::encode(&original).decode();
        for (a, b) in original.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 0.01, "Values differ: {} vs {}", a, b);
        }
    }

    #[test]
    fn test_constant_vector() {
        let q = QuantizedEmbedding::encode(&array![0.5, 0.5, 0.5]);
        assert_eq!(q.scale, 0.0);
        assert_eq!(q.offset, 0.5);
        assert!(q.bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_cosine() {
        let a = array![1.0, 0.0];
        assert!((cosine_similarity(&a, &array![2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &array![0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &array![0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&a, &array![1.0, 0.0, 0.0]), 0.0);
    }
}
