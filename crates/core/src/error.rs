use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("rate limit reached: {0}")]
    RateLimited(String),

    #[error("Max retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },

    #[error("Missing API key for {provider}: set {env_var} or run `vidsum config set-key`")]
    MissingApiKey {
        provider: String,
        env_var: String,
    },

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl LlmError {
    /// Whether this failure should be retried with backoff.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited(_))
            || self.to_string().to_lowercase().contains("rate limit")
    }
}

#[derive(Error, Debug)]
pub enum VidsumError {
    #[error("Unsupported platform for URL: {url}. Supported: YouTube (youtube.com, youtu.be), Bilibili (bilibili.com, BV/AV ids)")]
    UnsupportedPlatform { url: String },

    #[error("Invalid {platform} URL: {url}. {reason}")]
    InvalidVideoUrl {
        platform: String,
        url: String,
        reason: String,
    },

    #[error("Fetching video data failed for {video_id}: {reason}")]
    FetchFailed { video_id: String, reason: String },

    #[error("{tool} failed: {reason}")]
    ExternalTool { tool: String, reason: String },

    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Config error at {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("Pipeline stage `{stage}` ran before its input was ready")]
    StageOrder { stage: &'static str },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDeError(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error("HTTP request failed: {0}")]
    ApiError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, VidsumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_detected_by_variant_and_message() {
        assert!(LlmError::RateLimited("429".into()).is_rate_limit());
        assert!(
            LlmError::Api {
                status: 400,
                body: "Rate limit exceeded for model".into()
            }
            .is_rate_limit()
        );
        assert!(!LlmError::InvalidResponse("empty".into()).is_rate_limit());
        assert!(!LlmError::MaxRetriesExceeded { attempts: 3 }.is_rate_limit());
    }
}
