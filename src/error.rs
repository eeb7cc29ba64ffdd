use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};

use crate::api::response;
use crate::llm::ModelError;
use crate::parse::ParseError;

pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please try again later.";
pub const API_KEY_MESSAGE: &str = "API key configuration error";
pub const RECOMMENDATIONS_FAILED_MESSAGE: &str = "Failed to get recommendations from AI service";
pub const IMAGE_FAILED_MESSAGE: &str = "Failed to process image";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{}", RATE_LIMIT_MESSAGE)]
    RateLimited,

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Model failure while analysing an image; reported with a details field.
    #[error("Image analysis error: {0}")]
    ImageAnalysis(ModelError),

    #[error("Error parsing model response: {0}")]
    Parse(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Model(ModelError::Quota(_)) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Model(_)
            | AppError::ImageAnalysis(_)
            | AppError::Parse(_)
            | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            AppError::Validation(msg) => response::error(status, msg, None),
            AppError::RateLimited => response::error(status, RATE_LIMIT_MESSAGE.to_string(), None),
            AppError::Model(err) => {
                let msg = if err.is_api_key_problem() {
                    API_KEY_MESSAGE.to_string()
                } else if matches!(err, ModelError::Quota(_)) {
                    RATE_LIMIT_MESSAGE.to_string()
                } else {
                    err.to_string()
                };
                response::error(status, msg, None)
            }
            AppError::ImageAnalysis(err) => {
                response::error(status, IMAGE_FAILED_MESSAGE.to_string(), Some(err.to_string()))
            }
            // The raw model text is logged by the handler and never echoed back
            AppError::Parse(_) => {
                response::error(status, RECOMMENDATIONS_FAILED_MESSAGE.to_string(), None)
            }
            AppError::Config(msg) => response::error(status, msg, None),
        }
        .into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
