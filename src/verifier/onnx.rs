//! Local verification with ONNX embedding models run through tract.
//!
//! No face detection happens here: the whole image is resized to the model
//! input and embedded, which is what a detector-backed pipeline does when
//! detection enforcement is off and no face is found.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use tract_onnx::prelude::*;
use tracing::info;

use crate::error::VerifyError;
use crate::models::{ModelId, Verification};
use crate::storage::open_image;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// Per-model pixel normalization applied before inference.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Normalization {
    /// `(x - mean) / std` on raw 0..255 values.
    Symmetric { mean: f32, std: f32 },
    /// Per-image standardization: zero mean, unit variance.
    Standardize,
    /// Subtract a per-channel RGB mean from raw values.
    MeanSubtract([f32; 3]),
    /// Scale to 0..1.
    Unit,
}

fn normalization_for(model: ModelId) -> Normalization {
    match model {
        ModelId::ArcFace => Normalization::Symmetric {
            mean: 127.5,
            std: 128.0,
        },
        ModelId::Facenet => Normalization::Standardize,
        ModelId::VggFace => Normalization::MeanSubtract([129.1863, 104.7624, 93.5940]),
        ModelId::OpenFace | ModelId::DeepFace => Normalization::Unit,
    }
}

/// Loaded values keyed by model. The lock only guards the map: loading runs
/// unlocked, so a slow first load of one model never stalls requests for
/// models that are already cached. Two racing loads of the same model both
/// run and the first one inserted is kept.
struct ModelCache<T> {
    entries: Mutex<HashMap<ModelId, Arc<T>>>,
}

impl<T> ModelCache<T> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<ModelId, Arc<T>>>, VerifyError> {
        self.entries
            .lock()
            .map_err(|_| VerifyError::Inference("model cache lock poisoned".to_string()))
    }

    fn get_or_load(
        &self,
        model: ModelId,
        load: impl FnOnce() -> Result<T, VerifyError>,
    ) -> Result<Arc<T>, VerifyError> {
        if let Some(hit) = self.lock()?.get(&model) {
            return Ok(Arc::clone(hit));
        }

        let loaded = Arc::new(load()?);
        let mut entries = self.lock()?;
        Ok(Arc::clone(entries.entry(model).or_insert(loaded)))
    }
}

pub struct OnnxVerifier {
    model_dir: PathBuf,
    plans: ModelCache<Plan>,
}

impl OnnxVerifier {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            plans: ModelCache::new(),
        }
    }

    pub fn model_path(&self, model: ModelId) -> PathBuf {
        self.model_dir.join(model.file_name())
    }

    /// Loaded once per model and shared by every later request. A failed load
    /// is not cached, so a model file added later is picked up.
    fn plan(&self, model: ModelId) -> Result<Arc<Plan>, VerifyError> {
        self.plans.get_or_load(model, || self.load_plan(model))
    }

    fn load_plan(&self, model: ModelId) -> Result<Plan, VerifyError> {
        let path = self.model_path(model);
        if !path.exists() {
            return Err(VerifyError::ModelNotFound(path));
        }

        let size = model.input_size() as usize;
        let load_error = |e: anyhow::Error| VerifyError::ModelLoad {
            model,
            message: format!("{e:#}"),
        };
        let plan = tract_onnx::onnx()
            .model_for_path(&path)
            .map_err(load_error)?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .map_err(load_error)?
            .into_optimized()
            .map_err(load_error)?
            .into_runnable()
            .map_err(load_error)?;

        info!(%model, path = %path.display(), "loaded ONNX model");
        Ok(plan)
    }

    fn embed(&self, plan: &Plan, path: &Path, model: ModelId) -> Result<Vec<f32>, VerifyError> {
        let img = load_rgb(path)?;

        let input = preprocess(&img, model.input_size(), normalization_for(model));
        let shape = input.shape().to_vec();
        let tensor = tract_ndarray::Array::from_shape_vec(shape, input.into_raw_vec())
            .map_err(|e| VerifyError::Inference(format!("input tensor: {e}")))?
            .into_tensor();

        let result = plan
            .run(tvec!(tensor.into()))
            .map_err(|e| VerifyError::Inference(format!("{e:#}")))?;

        let output = result
            .first()
            .ok_or_else(|| VerifyError::Inference("model produced no output".to_string()))?
            .to_array_view::<f32>()
            .map_err(|e| VerifyError::Inference(format!("embedding extraction: {e:#}")))?;

        Ok(output.iter().copied().collect())
    }
}

impl super::FaceVerifier for OnnxVerifier {
    fn verify(
        &self,
        first: &Path,
        second: &Path,
        model: ModelId,
    ) -> Result<Verification, VerifyError> {
        let plan = self.plan(model)?;
        let a = self.embed(&plan, first, model)?;
        let b = self.embed(&plan, second, model)?;

        if a.len() != b.len() || a.is_empty() {
            return Err(VerifyError::Inference(format!(
                "embedding size mismatch: {} vs {}",
                a.len(),
                b.len()
            )));
        }

        let threshold = model.cosine_threshold();
        let distance = cosine_distance(&a, &b);
        Ok(Verification {
            verified: distance <= threshold,
            distance,
            threshold: Some(threshold),
        })
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}

fn load_rgb(path: &Path) -> Result<RgbImage, VerifyError> {
    let img = open_image(path)
        .and_then(|reader| reader.decode())
        .map_err(|source| VerifyError::Image {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(img.to_rgb8())
}

/// Resize to `size`x`size` and lay out as an NCHW RGB float tensor.
fn preprocess(img: &RgbImage, size: u32, normalization: Normalization) -> Array4<f32> {
    let resized = image::imageops::resize(img, size, size, FilterType::Triangle);
    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32;
        }
    }

    match normalization {
        Normalization::Symmetric { mean, std } => tensor.mapv_inplace(|v| (v - mean) / std),
        Normalization::Unit => tensor.mapv_inplace(|v| v / 255.0),
        Normalization::MeanSubtract(means) => {
            for (c, mean) in means.iter().enumerate() {
                tensor
                    .slice_mut(ndarray::s![0, c, .., ..])
                    .mapv_inplace(|v| v - mean);
            }
        }
        Normalization::Standardize => {
            let n = tensor.len() as f32;
            let mean = tensor.sum() / n;
            let var = tensor.mapv(|v| (v - mean).powi(2)).sum() / n;
            // Same floor as tf.image.per_image_standardization.
            let std = var.sqrt().max(1.0 / n.sqrt());
            tensor.mapv_inplace(|v| (v - mean) / std);
        }
    }

    tensor
}

/// `1 - cos(a, b)`, in [0, 2]. A zero vector is treated as orthogonal.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    let similarity = if denom > 0.0 { dot / denom } else { 0.0 };
    1.0 - similarity
}
