use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use visionlink_core::identity::infrastructure::gallery_recognizer::GalleryError;

use crate::protocol::{
    BatchOut, EnrollIn, EnrollOut, ErrorOut, FrameIn, HealthOut, IdentitiesOut, ModelInfoOut,
};
use crate::state::AppState;
use crate::ws::ws_handler;

/// Room for the JSON wrapper around an image envelope.
const BODY_OVERHEAD: usize = 4096;

type ApiError = (StatusCode, Json<ErrorOut>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorOut::new(message)))
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.pipeline.config().max_payload_bytes + BODY_OVERHEAD;
    Router::new()
        .route("/health", get(health))
        .route("/model-info", get(model_info))
        .route("/identities", get(identities))
        .route("/detect", post(detect))
        .route("/enroll", post(enroll))
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthOut> {
    let mut models: Vec<String> = state
        .pipeline
        .detectors()
        .iter()
        .map(|d| d.name().to_string())
        .collect();
    if let Some(name) = state.pipeline.recognizer_name() {
        models.push(name.to_string());
    }
    Json(HealthOut {
        status: "active".into(),
        mode: "websocket".into(),
        models,
        sessions: state.active_sessions(),
    })
}

async fn model_info(State(state): State<AppState>) -> Json<ModelInfoOut> {
    let threshold = state.gallery.as_ref().map(|g| g.threshold());
    Json(ModelInfoOut::describe(&state.pipeline, threshold))
}

/// Single-frame detection outside any streaming session.
async fn detect(
    State(state): State<AppState>,
    Json(frame): Json<FrameIn>,
) -> Result<Json<BatchOut>, ApiError> {
    let image = frame
        .image
        .ok_or_else(|| api_error(StatusCode::UNPROCESSABLE_ENTITY, "missing image"))?;
    let pipeline = state.pipeline.clone();
    let batch = tokio::task::spawn_blocking(move || pipeline.detect_once(&image))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    Ok(Json(BatchOut::from(&batch)))
}

async fn identities(State(state): State<AppState>) -> Result<Json<IdentitiesOut>, ApiError> {
    let Some(gallery) = state.gallery else {
        return Ok(Json(IdentitiesOut { identities: vec![] }));
    };
    let identities = tokio::task::spawn_blocking(move || gallery.names())
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(IdentitiesOut { identities }))
}

/// Stores a reference image and makes it visible to the next recognition.
async fn enroll(
    State(state): State<AppState>,
    Json(request): Json<EnrollIn>,
) -> Result<Json<EnrollOut>, ApiError> {
    let Some(gallery) = state.gallery.clone() else {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "recognition is not enabled",
        ));
    };
    let pipeline = state.pipeline.clone();
    let name = tokio::task::spawn_blocking(move || {
        let frame = pipeline
            .decoder()
            .decode(&request.image)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("invalid image: {e}")))?;
        gallery.enroll(&request.name, &frame).map_err(|e| {
            let status = match e {
                GalleryError::InvalidName | GalleryError::InvalidImage => StatusCode::BAD_REQUEST,
                GalleryError::Encode(_) | GalleryError::Io(_) => {
                    log::error!("Enrollment failed: {e}");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            api_error(status, e.to_string())
        })
    })
    .await
    .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;

    Ok(Json(EnrollOut {
        status: "success".into(),
        name,
    }))
}
