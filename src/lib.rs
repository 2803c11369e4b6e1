//! Web front-end that decides whether two uploaded photos show the same
//! person by majority vote over several face-recognition models.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod render;
pub mod resolution;
pub mod server;
pub mod storage;
pub mod verifier;

pub use config::{AppConfig, Backend};
pub use error::{AppError, ConfigError, StoreError, VerifyError};
pub use handlers::AppState;
pub use models::{AggregateResult, ModelId, ModelVerdict, Outcome, Verification};
pub use verifier::FaceVerifier;
