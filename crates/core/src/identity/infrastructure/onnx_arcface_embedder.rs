/// ArcFace identity embedder using ONNX Runtime.
///
/// Produces L2-normalized embeddings from face crops resized to 112x112.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::domain::detector::BoxError;
use crate::detection::infrastructure::onnx_session::{load_session, model_name};
use crate::identity::domain::face_embedder::FaceEmbedder;
use crate::shared::frame::Frame;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct OnnxArcFaceEmbedder {
    session: Mutex<ort::session::Session>,
    name: String,
}

impl OnnxArcFaceEmbedder {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;
        Ok(Self {
            session: Mutex::new(session),
            name: model_name(model_path, "arcface"),
        })
    }
}

impl FaceEmbedder for OnnxArcFaceEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn embed(&self, crop: &Frame) -> Result<Vec<f32>, BoxError> {
        if crop.width() == 0 || crop.height() == 0 {
            return Err("cannot embed an empty crop".into());
        }
        let tensor = preprocess(crop);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?;

        let mut embedding = embedding_slice.to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

/// Nearest-neighbour resize to 112x112, normalize to [-1, 1], NCHW layout.
fn preprocess(crop: &Frame) -> ndarray::Array4<f32> {
    let src_w = crop.width() as usize;
    let src_h = crop.height() as usize;
    let channels = crop.channels() as usize;
    let data = crop.data();

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            let offset = (src_y * src_w + src_x) * channels;
            for c in 0..channels.min(3) {
                tensor[[0, c, y, x]] = (data[offset + c] as f32 - NORM_MEAN) / NORM_STD;
            }
        }
    }

    tensor
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product of L2-normalized vectors equals cosine similarity.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_l2_normalize_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert_abs_diff_eq!(v[0], 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(v[1], 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_is_untouched() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_cosine_similarity_identical_and_orthogonal() {
        let a = vec![0.6, 0.8];
        assert_abs_diff_eq!(cosine_similarity(&a, &a), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_preprocess_shape_from_small_crop() {
        let crop = Frame::new(vec![128u8; 7 * 5 * 3], 7, 5, 3);
        assert_eq!(preprocess(&crop).shape(), &[1, 3, 112, 112]);
    }

    #[test]
    fn test_preprocess_normalization_range() {
        let white = Frame::new(vec![255u8; 10 * 10 * 3], 10, 10, 3);
        let black = Frame::new(vec![0u8; 10 * 10 * 3], 10, 10, 3);
        assert_abs_diff_eq!(preprocess(&white)[[0, 2, 50, 50]], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(preprocess(&black)[[0, 0, 0, 0]], -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_preprocess_keeps_channel_order() {
        let mut data = Vec::new();
        for _ in 0..4 {
            data.extend_from_slice(&[255, 0, 128]);
        }
        let tensor = preprocess(&Frame::new(data, 2, 2, 3));
        assert_abs_diff_eq!(tensor[[0, 0, 10, 10]], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(tensor[[0, 1, 10, 10]], -1.0, epsilon = 1e-6);
    }
}
