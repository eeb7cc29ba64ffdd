pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod parse;
pub mod prompt;
pub mod rate_limit;
pub mod recommendation;
pub mod retry;

use std::sync::Arc;
use config::Config;
use llm::ModelClient;
use rate_limit::{Clock, RateLimiter, SystemClock};

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<dyn ModelClient>,
    pub recommendation_limiter: Arc<RateLimiter>,
    pub image_limiter: Arc<RateLimiter>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(config: &Config, model: Arc<dyn ModelClient>) -> Self {
        let recommendation_limiter =
            RateLimiter::new(config.rate_limit_window, config.recommendations_max_requests);
        let image_limiter =
            RateLimiter::new(config.rate_limit_window, config.image_analysis_max_requests);

        AppState {
            model,
            recommendation_limiter: Arc::new(recommendation_limiter),
            image_limiter: Arc::new(image_limiter),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
