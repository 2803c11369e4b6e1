#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use face_vote::{AppConfig, AppState, FaceVerifier, ModelId, Verification, VerifyError};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use tempfile::TempDir;

pub const BOUNDARY: &str = "----face-vote-test-boundary";

/// Answers from a per-model table; models without an entry fail.
pub struct ScriptedVerifier {
    answers: HashMap<ModelId, bool>,
}

impl ScriptedVerifier {
    pub fn new(answers: &[(ModelId, bool)]) -> Self {
        Self {
            answers: answers.iter().copied().collect(),
        }
    }

    pub fn failing() -> Self {
        Self::new(&[])
    }
}

impl FaceVerifier for ScriptedVerifier {
    fn verify(&self, first: &Path, second: &Path, model: ModelId) -> Result<Verification, VerifyError> {
        assert!(first.exists(), "first upload missing at {}", first.display());
        assert!(second.exists(), "second upload missing at {}", second.display());
        match self.answers.get(&model) {
            Some(verified) => Ok(Verification {
                verified: *verified,
                distance: if *verified { 0.2 } else { 0.8 },
                threshold: Some(model.cosine_threshold()),
            }),
            None => Err(VerifyError::Inference(format!("{model} crashed"))),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub fn state(upload_dir: &TempDir, verifier: ScriptedVerifier) -> AppState {
    let config = AppConfig {
        upload_dir: upload_dir.path().to_path_buf(),
        ..AppConfig::default()
    };
    AppState::new(config, Arc::new(verifier))
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .unwrap();
    bytes
}

/// Multipart body with one file part per `(field, filename, bytes)`.
pub fn multipart_body(parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, filename, bytes) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// In-memory sink for formatted log lines.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Subscriber that writes plain-text lines into this capture.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        let sink = self.clone();
        tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
