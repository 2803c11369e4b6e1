use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Pre-trained face-recognition models the service can vote with.
///
/// Serialized under its display name; deserialized as loosely as [`FromStr`]
/// parses, so config files and environment variables accept the same names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum ModelId {
    ArcFace,
    VggFace,
    Facenet,
    OpenFace,
    DeepFace,
}

impl ModelId {
    /// Default voting order.
    pub const ALL: [ModelId; 5] = [
        ModelId::ArcFace,
        ModelId::VggFace,
        ModelId::Facenet,
        ModelId::OpenFace,
        ModelId::DeepFace,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelId::ArcFace => "ArcFace",
            ModelId::VggFace => "VGG-Face",
            ModelId::Facenet => "Facenet",
            ModelId::OpenFace => "OpenFace",
            ModelId::DeepFace => "DeepFace",
        }
    }

    /// Square input edge expected by the model, in pixels.
    pub fn input_size(self) -> u32 {
        match self {
            ModelId::ArcFace => 112,
            ModelId::VggFace => 224,
            ModelId::Facenet => 160,
            ModelId::OpenFace => 96,
            ModelId::DeepFace => 152,
        }
    }

    /// Cosine distance at or below which two embeddings count as the same person.
    pub fn cosine_threshold(self) -> f64 {
        match self {
            ModelId::ArcFace => 0.68,
            ModelId::VggFace => 0.68,
            ModelId::Facenet => 0.40,
            ModelId::OpenFace => 0.10,
            ModelId::DeepFace => 0.23,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ModelId::ArcFace => "arcface.onnx",
            ModelId::VggFace => "vgg_face.onnx",
            ModelId::Facenet => "facenet.onnx",
            ModelId::OpenFace => "openface.onnx",
            ModelId::DeepFace => "deepface.onnx",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "arcface" => Ok(ModelId::ArcFace),
            "vggface" => Ok(ModelId::VggFace),
            "facenet" => Ok(ModelId::Facenet),
            "openface" => Ok(ModelId::OpenFace),
            "deepface" => Ok(ModelId::DeepFace),
            _ => Err(format!("unknown model '{}'", s.trim())),
        }
    }
}

impl TryFrom<String> for ModelId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ModelId> for &'static str {
    fn from(model: ModelId) -> Self {
        model.as_str()
    }
}

/// Raw answer of a verification backend for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verification {
    pub verified: bool,
    pub distance: f64,
    pub threshold: Option<f64>,
}

/// Either a usable verdict or the reason the model could not produce one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Determined {
        verified: bool,
        distance: f64,
        threshold: Option<f64>,
    },
    Indeterminate {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelVerdict {
    pub model: ModelId,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ModelVerdict {
    pub fn determined(model: ModelId, verification: Verification) -> Self {
        Self {
            model,
            outcome: Outcome::Determined {
                verified: verification.verified,
                distance: verification.distance,
                threshold: verification.threshold,
            },
        }
    }

    pub fn indeterminate(model: ModelId, reason: impl Into<String>) -> Self {
        Self {
            model,
            outcome: Outcome::Indeterminate {
                reason: reason.into(),
            },
        }
    }

    /// `None` when the model failed; such verdicts never count as a vote.
    pub fn verified(&self) -> Option<bool> {
        match self.outcome {
            Outcome::Determined { verified, .. } => Some(verified),
            Outcome::Indeterminate { .. } => None,
        }
    }

    pub fn distance(&self) -> Option<f64> {
        match self.outcome {
            Outcome::Determined { distance, .. } => Some(distance),
            Outcome::Indeterminate { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPair {
    pub first: StoredImage,
    pub second: StoredImage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    /// Majority of the determined verdicts; `None` when every model failed.
    pub majority: Option<bool>,
    pub low_resolution: bool,
    pub image1: String,
    pub image2: String,
    pub verdicts: Vec<ModelVerdict>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_model_names_loosely() {
        assert_eq!("VGG-Face".parse::<ModelId>().unwrap(), ModelId::VggFace);
        assert_eq!("vgg_face".parse::<ModelId>().unwrap(), ModelId::VggFace);
        assert_eq!(" arcface ".parse::<ModelId>().unwrap(), ModelId::ArcFace);
        assert!("Dlib".parse::<ModelId>().is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for model in ModelId::ALL {
            assert_eq!(model.to_string().parse::<ModelId>().unwrap(), model);
        }
    }

    #[test]
    fn serde_accepts_the_same_spellings_as_from_str() {
        let models: Vec<ModelId> =
            serde_json::from_str(r#"["vgg_face", "ARCFACE", "Open-Face", "VGG-Face"]"#).unwrap();
        assert_eq!(
            models,
            [ModelId::VggFace, ModelId::ArcFace, ModelId::OpenFace, ModelId::VggFace]
        );
        assert!(serde_json::from_str::<ModelId>(r#""Dlib""#).is_err());
        assert_eq!(serde_json::to_string(&ModelId::VggFace).unwrap(), r#""VGG-Face""#);
    }

    #[test]
    fn verdict_serializes_flat_with_status_tag() {
        let verdict = ModelVerdict::determined(
            ModelId::Facenet,
            Verification {
                verified: true,
                distance: 0.25,
                threshold: Some(0.4),
            },
        );
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["model"], "Facenet");
        assert_eq!(json["status"], "determined");
        assert_eq!(json["verified"], true);

        let failed = ModelVerdict::indeterminate(ModelId::OpenFace, "boom");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "indeterminate");
        assert_eq!(json["reason"], "boom");
        assert_eq!(failed.verified(), None);
        assert_eq!(failed.distance(), None);
    }
}
