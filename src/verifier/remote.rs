//! Client for a DeepFace REST service (`POST /verify`).

use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{multipart, Client};
use serde::Deserialize;

use crate::error::VerifyError;
use crate::models::{ModelId, Verification};

#[derive(Debug, Deserialize)]
struct VerifyReply {
    verified: bool,
    distance: f64,
    #[serde(default)]
    threshold: Option<f64>,
}

pub struct DeepFaceApiVerifier {
    client: Client,
    endpoint: String,
}

impl DeepFaceApiVerifier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, VerifyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: verify_endpoint(base_url),
        })
    }
}

fn verify_endpoint(base_url: &str) -> String {
    format!("{}/verify", base_url.trim_end_matches('/'))
}

fn attach(form: multipart::Form, field: &'static str, path: &Path) -> Result<multipart::Form, VerifyError> {
    form.file(field, path).map_err(|source| VerifyError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl super::FaceVerifier for DeepFaceApiVerifier {
    fn verify(
        &self,
        first: &Path,
        second: &Path,
        model: ModelId,
    ) -> Result<Verification, VerifyError> {
        let form = multipart::Form::new()
            .text("model_name", model.as_str())
            .text("enforce_detection", "false");
        let form = attach(form, "img1", first)?;
        let form = attach(form, "img2", second)?;

        let response = self.client.post(&self.endpoint).multipart(form).send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(VerifyError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let reply: VerifyReply = response.json()?;
        Ok(reply.into())
    }

    fn name(&self) -> &'static str {
        "deepface-api"
    }
}

impl From<VerifyReply> for Verification {
    fn from(reply: VerifyReply) -> Self {
        Verification {
            verified: reply.verified,
            distance: reply.distance,
            threshold: reply.threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::FaceVerifier;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// Accepts one connection, answers it with `status` and a JSON `body`,
    /// and hands back the raw request text.
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (base_url, handle)
    }

    fn read_request(stream: &mut impl Read) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                return buf;
            }
            buf.extend_from_slice(&chunk[..n]);

            let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok());
            let complete = match content_length {
                Some(len) => buf.len() >= head_end + 4 + len,
                None => buf.ends_with(b"\r\n0\r\n\r\n"),
            };
            if complete {
                return buf;
            }
        }
    }

    fn image_pair(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let first = dir.join("a.png");
        let second = dir.join("b.png");
        std::fs::write(&first, b"first image bytes").unwrap();
        std::fs::write(&second, b"second image bytes").unwrap();
        (first, second)
    }

    #[test]
    fn posts_both_images_without_enforcing_detection() {
        let dir = tempfile::tempdir().unwrap();
        let (first, second) = image_pair(dir.path());
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"verified": true, "distance": 0.25, "threshold": 0.4}"#,
        );

        let verifier = DeepFaceApiVerifier::new(&base_url, Duration::from_secs(5)).unwrap();
        let verification = verifier.verify(&first, &second, ModelId::VggFace).unwrap();
        assert!(verification.verified);
        assert_eq!(verification.distance, 0.25);
        assert_eq!(verification.threshold, Some(0.4));

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /verify "), "{request}");
        assert!(request.contains("name=\"model_name\"\r\n\r\nVGG-Face"));
        assert!(request.contains("name=\"enforce_detection\"\r\n\r\nfalse"));
        assert!(request.contains("name=\"img1\""));
        assert!(request.contains("name=\"img2\""));
        assert!(request.contains("first image bytes"));
        assert!(request.contains("second image bytes"));
    }

    #[test]
    fn server_error_status_is_reported_with_body() {
        let dir = tempfile::tempdir().unwrap();
        let (first, second) = image_pair(dir.path());
        let (base_url, server) =
            serve_once("500 Internal Server Error", r#"{"error": "Face could not be detected"}"#);

        let verifier = DeepFaceApiVerifier::new(&base_url, Duration::from_secs(5)).unwrap();
        let err = verifier.verify(&first, &second, ModelId::ArcFace).unwrap_err();
        match err {
            VerifyError::Service { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("Face could not be detected"));
            }
            other => panic!("expected a service error, got {other:?}"),
        }
        server.join().unwrap();
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(verify_endpoint("http://localhost:5005"), "http://localhost:5005/verify");
        assert_eq!(verify_endpoint("http://localhost:5005/"), "http://localhost:5005/verify");
    }

    #[test]
    fn reply_keeps_verdict_and_distance() {
        let reply: VerifyReply = serde_json::from_str(
            r#"{"verified": true, "distance": 0.31, "threshold": 0.68, "model": "ArcFace", "time": 1.2}"#,
        )
        .unwrap();
        let verification = Verification::from(reply);
        assert!(verification.verified);
        assert_eq!(verification.distance, 0.31);
        assert_eq!(verification.threshold, Some(0.68));
    }

    #[test]
    fn reply_without_threshold_still_parses() {
        let reply: VerifyReply =
            serde_json::from_str(r#"{"verified": false, "distance": 0.9}"#).unwrap();
        assert_eq!(reply.threshold, None);
    }

    #[test]
    fn missing_upload_is_an_io_error() {
        let err = attach(multipart::Form::new(), "img1", Path::new("/nonexistent/a.png")).unwrap_err();
        assert!(matches!(err, VerifyError::Io { .. }));
    }
}
