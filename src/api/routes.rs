use axum::{
    routing::{get, post},
    Router,
    extract::{DefaultBodyLimit, Json, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use std::time::Instant;

use crate::error::{Result, AppError};
use crate::api::models::{
    AnalysisResult, ImageAnalysisRequest, ModelCheckResponse, RecommendationRequest,
    RecommendationResponse,
};
use crate::api::response;
use crate::llm::{ImagePayload, mask_api_key};
use crate::parse::{parse_json, sanitize};
use crate::prompt::{build_image_analysis_prompt, build_recommendation_prompt};
use crate::rate_limit::client_id;
use crate::recommendation::{RecommendationItem, into_recommendations};
use crate::AppState;

/// Upper bound on request bodies; base64 images inflate by a third.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const CHECK_PROMPT: &str = "Hello, world!";

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/recommendations", post(recommendations_handler))
        .route("/image-analysis", post(image_analysis_handler))
        .route("/test-gemini", get(model_check_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

fn invalid_body(rejection: JsonRejection) -> AppError {
    tracing::warn!(error = %rejection, "request parsing error");
    AppError::Validation("Invalid request format".to_string())
}

async fn recommendations_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<RecommendationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RecommendationResponse>)> {
    let client_id = client_id(&headers);
    let Json(req) = payload.map_err(invalid_body)?;

    let prompt = req
        .prompt
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Prompt is required".to_string()))?;

    if !state.recommendation_limiter.check(&client_id, state.clock.as_ref()) {
        tracing::warn!(%client_id, "recommendation rate limit exceeded");
        return Err(AppError::RateLimited);
    }

    let start_time = Instant::now();
    let recommendations = get_recommendations(&state, &prompt, req.category.as_deref()).await?;
    tracing::info!(
        %client_id,
        category = req.category.as_deref().unwrap_or("none"),
        count = recommendations.len(),
        elapsed = ?start_time.elapsed(),
        "recommendations generated"
    );

    Ok(response::success(RecommendationResponse { recommendations }))
}

async fn get_recommendations(
    state: &AppState,
    prompt: &str,
    category: Option<&str>,
) -> Result<Vec<RecommendationItem>> {
    let structured_prompt = build_recommendation_prompt(prompt, category);
    tracing::debug!(length = structured_prompt.len(), "built recommendation prompt");

    let raw = state.model.generate(&structured_prompt, None).await.map_err(|e| {
        tracing::error!(error = %e, model = state.model.model_name(false), "model call failed");
        AppError::Model(e)
    })?;

    let recommendations = parse_json(&raw)
        .map(sanitize)
        .and_then(into_recommendations)
        .map_err(|e| {
            tracing::warn!(error = %e, raw_response = %raw, "unusable model response");
            AppError::Parse(e)
        })?;

    Ok(recommendations)
}

async fn image_analysis_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<ImageAnalysisRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AnalysisResult>)> {
    let client_id = client_id(&headers);
    let Json(req) = payload.map_err(invalid_body)?;

    let image = req
        .image
        .filter(|image| !image.is_empty())
        .ok_or_else(|| AppError::Validation("Image is required".to_string()))?;
    let image = ImagePayload::from_data_url(&image)
        .ok_or_else(|| AppError::Validation("Invalid image format".to_string()))?;

    // Validation comes first so malformed requests never use up quota
    if !state.image_limiter.check(&client_id, state.clock.as_ref()) {
        tracing::warn!(%client_id, "image analysis rate limit exceeded");
        return Err(AppError::RateLimited);
    }

    let start_time = Instant::now();
    let analysis_prompt = build_image_analysis_prompt(req.prompt.as_deref(), req.category.as_deref());
    let analysis = state
        .model
        .generate(&analysis_prompt, Some(&image))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, model = state.model.model_name(true), "image analysis failed");
            AppError::ImageAnalysis(e)
        })?;

    tracing::info!(
        %client_id,
        mime_type = %image.mime_type,
        elapsed = ?start_time.elapsed(),
        "image analysed"
    );
    Ok(response::success(AnalysisResult { analysis }))
}

async fn model_check_handler(State(state): State<AppState>) -> impl IntoResponse {
    let api_key = state.model.api_key();
    let api_key_available = api_key.is_some();
    let masked_key = mask_api_key(api_key);

    match state.model.generate(CHECK_PROMPT, None).await {
        Ok(text) => response::success(ModelCheckResponse {
            success: true,
            api_key_available,
            masked_key,
            response_text: Some(text),
            error: None,
        }),
        Err(e) => {
            tracing::error!(error = %e, "model connectivity check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ModelCheckResponse {
                    success: false,
                    api_key_available,
                    masked_key,
                    response_text: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}
