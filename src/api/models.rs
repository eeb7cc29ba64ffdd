use serde::{Deserialize, Serialize};

use crate::recommendation::RecommendationItem;

#[derive(Debug, Default, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub recommendations: Vec<RecommendationItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ImageAnalysisRequest {
    /// `data:` URL carrying the base64 image.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResult {
    pub analysis: String,
}

/// Outcome of the model connectivity check.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCheckResponse {
    pub success: bool,
    pub api_key_available: bool,
    pub masked_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
