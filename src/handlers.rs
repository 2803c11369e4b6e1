use std::io::Write;
use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{http::header, web, HttpResponse, Result};
use futures_util::StreamExt;
use serde_json::json;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use crate::aggregate;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::{AggregateResult, StoredImage, UploadPair};
use crate::render;
use crate::storage::{self, ImageStore};
use crate::verifier::FaceVerifier;

/// Shared by every worker; built once at startup.
pub struct AppState {
    pub config: AppConfig,
    pub store: ImageStore,
    pub verifier: Arc<dyn FaceVerifier>,
}

impl AppState {
    pub fn new(config: AppConfig, verifier: Arc<dyn FaceVerifier>) -> Self {
        let store = ImageStore::new(config.upload_dir.clone());
        Self {
            config,
            store,
            verifier,
        }
    }
}

pub async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(render::index_page())
}

pub async fn compare(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let result = receive_and_compare(state, payload).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(render::result_page(&result)))
}

pub async fn api_compare(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let result = receive_and_compare(state, payload).await?;
    Ok(HttpResponse::Ok().json(result))
}

pub async fn uploaded_file(
    state: web::Data<AppState>,
    filename: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let name = filename.into_inner();
    let store = state.store.clone();
    let lookup = name.clone();
    let bytes = web::block(move || store.read(&lookup)).await??;

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, storage::content_type_for(&name)))
        .body(bytes))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

async fn receive_and_compare(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<AggregateResult, AppError> {
    let span = info_span!("compare", request_id = %Uuid::new_v4());

    async move {
        let pair = receive_pair(&state, payload).await?;

        // The blocking pool does not inherit the task's span.
        let span = tracing::Span::current();
        let state = state.into_inner();
        let result = web::block(move || {
            let _guard = span.enter();
            aggregate::compare(
                state.verifier.as_ref(),
                &pair,
                &state.config.models,
                state.config.low_res_threshold,
            )
        })
        .await?;

        Ok::<_, AppError>(result)
    }
    .instrument(span)
    .await
}

/// Stores the `image1` and `image2` parts; any other part is drained and ignored.
async fn receive_pair(state: &AppState, mut payload: Multipart) -> Result<UploadPair, AppError> {
    let mut first: Option<StoredImage> = None;
    let mut second: Option<StoredImage> = None;

    while let Some(item) = payload.next().await {
        let mut field = item?;
        let disposition = field.content_disposition().clone();
        let slot = match disposition.get_name() {
            Some("image1") => &mut first,
            Some("image2") => &mut second,
            other => {
                warn!(field = ?other, "ignoring unexpected form field");
                while let Some(chunk) = field.next().await {
                    chunk?;
                }
                continue;
            }
        };
        let filename = disposition
            .get_filename()
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        let Some(filename) = filename else {
            // An empty file input is sent as a part with an empty file name.
            while let Some(chunk) = field.next().await {
                chunk?;
            }
            continue;
        };
        storage::validate_file_name(&filename)?;

        *slot = Some(save_field(state, &mut field, filename).await?);
    }

    let first = first.ok_or(AppError::MissingField("image1"))?;
    let second = second.ok_or(AppError::MissingField("image2"))?;
    Ok(UploadPair { first, second })
}

async fn save_field(
    state: &AppState,
    field: &mut actix_multipart::Field,
    filename: String,
) -> Result<StoredImage, AppError> {
    let limit = state.config.max_upload_bytes;
    let store = state.store.clone();

    let mut f = web::block(move || store.create_temp()).await??;
    let mut written = 0usize;

    while let Some(chunk) = field.next().await {
        let data = chunk?;
        written += data.len();
        if written > limit {
            return Err(AppError::PayloadTooLarge(limit));
        }
        f = web::block(move || f.write_all(&data).map(|_| f))
            .await?
            .map_err(|e| AppError::Internal(format!("could not write upload: {e}")))?;
    }

    let store = state.store.clone();
    let stored = web::block(move || store.persist(f, &filename)).await??;
    Ok(stored)
}
