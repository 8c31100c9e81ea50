//! Platform adapters that turn a resolved URL into [`VideoData`].

mod bilibili;
mod youtube;

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::{
    error::Result,
    platform::{PlatformInfo, VideoPlatform},
    types::VideoData,
};

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko)";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Retrieves title, duration and caption fragments for a video.
#[async_trait]
pub trait VideoFetcher: Send + Sync {
    async fn fetch(&self, info: &PlatformInfo) -> Result<VideoData>;
}

/// Fetcher backed by the real platforms: `yt-dlp` for YouTube, the public
/// web API for Bilibili.
pub struct PlatformFetcher {
    http: reqwest::Client,
    languages: Vec<String>,
}

impl PlatformFetcher {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            languages: ["zh-Hans", "zh-CN", "zh", "en"]
                .iter()
                .map(|l| l.to_string())
                .collect(),
        }
    }

    /// Caption languages to try first, most preferred first.
    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }
}

impl Default for PlatformFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoFetcher for PlatformFetcher {
    async fn fetch(&self, info: &PlatformInfo) -> Result<VideoData> {
        let data = match info.platform {
            VideoPlatform::YouTube => {
                youtube::fetch(&self.http, &info.video_id, &self.languages).await?
            }
            VideoPlatform::Bilibili => bilibili::fetch(&self.http, &info.video_id).await?,
        };

        info!(
            platform = %data.platform,
            title = %data.title,
            duration = ?data.duration,
            fragments = data.fragments.len(),
            "video data fetched"
        );
        Ok(data)
    }
}
