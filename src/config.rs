use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use crate::error::{AppError, Result};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub text_model: String,
    pub vision_model: String,
    pub model_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub rate_limit_window: Duration,
    pub recommendations_max_requests: usize,
    pub image_analysis_max_requests: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
            gemini_api_key: None,
            gemini_api_base: DEFAULT_API_BASE.to_string(),
            text_model: DEFAULT_MODEL.to_string(),
            vision_model: DEFAULT_MODEL.to_string(),
            model_timeout: Duration::from_secs(30),
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            rate_limit_window: Duration::from_secs(60),
            recommendations_max_requests: 5,
            image_analysis_max_requests: 3,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();
        let defaults = Config::default();

        let gemini_api_key = env::var("GEMINI_API_KEY").ok().filter(|key| !key.trim().is_empty());
        if gemini_api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set; model calls will fail");
        }

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = parse_var("PORT", 3000)?;
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::Config(format!("Invalid host address: {}", e)))?;

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            gemini_api_key,
            gemini_api_base: env::var("GEMINI_API_BASE").unwrap_or(defaults.gemini_api_base),
            text_model: env::var("GEMINI_TEXT_MODEL").unwrap_or(defaults.text_model),
            vision_model: env::var("GEMINI_VISION_MODEL").unwrap_or(defaults.vision_model),
            model_timeout: Duration::from_secs(parse_var("MODEL_TIMEOUT_SECS", 30)?),
            retry_attempts: parse_var("MODEL_RETRY_ATTEMPTS", defaults.retry_attempts)?,
            retry_base_delay: Duration::from_millis(parse_var("MODEL_RETRY_BASE_DELAY_MS", 500)?),
            rate_limit_window: Duration::from_secs(parse_var("RATE_LIMIT_WINDOW_SECS", 60)?),
            recommendations_max_requests: parse_var(
                "RECOMMENDATIONS_MAX_REQUESTS",
                defaults.recommendations_max_requests,
            )?,
            image_analysis_max_requests: parse_var(
                "IMAGE_ANALYSIS_MAX_REQUESTS",
                defaults.image_analysis_max_requests,
            )?,
        })
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}
