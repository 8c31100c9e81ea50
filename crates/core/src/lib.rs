pub mod aggregate;
pub mod config;
pub mod error;
pub mod format;
pub mod llm;
pub mod obsidian;
pub mod output;
pub mod pipeline;
pub mod platform;
pub mod provider;
pub mod rate_limiter;
pub mod segmentation;
pub mod source;
pub mod summarize;
pub mod timing;
pub mod types;
pub mod usage;

pub use aggregate::parse_overall_summary;
pub use config::AppConfig;
pub use error::{LlmError, Result, VidsumError};
pub use format::{format_duration_human, format_timestamp, render_markdown};
pub use llm::{ChatCompletionsClient, LlmClient, LlmUsage, UsageObserver};
pub use obsidian::{ObsidianConfig, ObsidianTemplate};
pub use pipeline::{RunContext, RunOptions, RunOutputs, run_pipeline};
pub use platform::{PlatformInfo, VideoPlatform};
pub use provider::{Provider, ProviderConfig};
pub use rate_limiter::{RateLimitPreset, RateLimitStatus, RateLimiter, call_llm_with_retry};
pub use segmentation::{SegmentationConfig, detect_topic_change, smart_segmentation};
pub use source::{PlatformFetcher, VideoFetcher};
pub use summarize::{SummarizeOptions, summarize_segments};
pub use timing::normalize_captions;
pub use types::{CaptionFragment, OverallSummary, ProcessedSegment, SegmentGroup, VideoData, VideoReport};
pub use usage::TokenMonitor;
