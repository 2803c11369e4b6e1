//! Face-verification backends and the adapter that turns their failures
//! into indeterminate verdicts.

pub mod onnx;
pub mod remote;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{AppConfig, Backend};
use crate::error::VerifyError;
use crate::models::{ModelId, ModelVerdict, Verification};

pub use onnx::OnnxVerifier;
pub use remote::DeepFaceApiVerifier;

/// Compares the faces in two image files with one recognition model.
///
/// Implementations must not fail just because no face was detected: they
/// fall back to comparing the whole image.
pub trait FaceVerifier: Send + Sync {
    fn verify(
        &self,
        first: &Path,
        second: &Path,
        model: ModelId,
    ) -> Result<Verification, VerifyError>;

    fn name(&self) -> &'static str;
}

/// Runs one model and absorbs any failure into an indeterminate verdict.
pub fn verify(
    verifier: &dyn FaceVerifier,
    first: &Path,
    second: &Path,
    model: ModelId,
) -> ModelVerdict {
    match verifier.verify(first, second, model) {
        Ok(verification) => {
            debug!(
                %model,
                verified = verification.verified,
                distance = verification.distance,
                "model verdict"
            );
            ModelVerdict::determined(model, verification)
        }
        Err(e) => {
            warn!(%model, backend = verifier.name(), error = %e, "verification failed");
            ModelVerdict::indeterminate(model, e.to_string())
        }
    }
}

pub fn build(config: &AppConfig) -> Result<Arc<dyn FaceVerifier>, VerifyError> {
    match config.backend {
        Backend::Onnx => Ok(Arc::new(OnnxVerifier::new(&config.model_dir))),
        Backend::DeepfaceApi => {
            let url = config
                .api_url
                .as_deref()
                .ok_or_else(|| VerifyError::Misconfigured("no api_url configured".to_string()))?;
            let verifier = DeepFaceApiVerifier::new(
                url,
                Duration::from_secs(config.request_timeout_secs),
            )?;
            Ok(Arc::new(verifier))
        }
    }
}
