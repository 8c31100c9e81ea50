use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VidsumError};

static YOUTUBE_ID: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:youtube\.com/watch\?v=|youtu\.be/)([^&\n?#]+)",
        r"youtube\.com/embed/([^&\n?#]+)",
        r"youtube\.com/v/([^&\n?#]+)",
        r"youtube\.com/watch\?.*&v=([^&\n?#]+)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

static BILIBILI_HOST: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"bilibili\.com|b23\.tv").ok());
static BARE_BV: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^BV[0-9A-Za-z]+$").ok());
static BARE_AV: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)^AV\d+$").ok());
static PATH_BV: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"/video/(BV[0-9A-Za-z]+)").ok());
static PATH_AV: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)/video/(av\d+)").ok());

fn matches(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

fn capture(re: &LazyLock<Option<Regex>>, text: &str) -> Option<String> {
    re.as_ref()?
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoPlatform {
    YouTube,
    Bilibili,
}

/// Result of resolving a user-supplied URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    pub platform: VideoPlatform,
    pub video_id: String,
    pub original_url: String,
}

impl VideoPlatform {
    pub const ALL: [VideoPlatform; 2] = [VideoPlatform::YouTube, VideoPlatform::Bilibili];

    pub fn name(&self) -> &'static str {
        match self {
            VideoPlatform::YouTube => "YouTube",
            VideoPlatform::Bilibili => "Bilibili",
        }
    }

    pub fn can_handle(&self, url: &str) -> bool {
        let url = url.trim();
        match self {
            VideoPlatform::YouTube => YOUTUBE_ID.iter().any(|re| re.is_match(url)),
            VideoPlatform::Bilibili => {
                matches(&BILIBILI_HOST, url) || matches(&BARE_BV, url) || matches(&BARE_AV, url)
            }
        }
    }

    pub fn detect(url: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|platform| platform.can_handle(url))
            .ok_or_else(|| VidsumError::UnsupportedPlatform {
                url: url.to_string(),
            })
    }

    pub fn extract_video_id(&self, url: &str) -> Result<String> {
        let url = url.trim();
        let invalid = |reason: &str| VidsumError::InvalidVideoUrl {
            platform: self.name().to_string(),
            url: url.to_string(),
            reason: reason.to_string(),
        };

        match self {
            VideoPlatform::YouTube => YOUTUBE_ID
                .iter()
                .find_map(|re| {
                    re.captures(url)
                        .and_then(|caps| caps.get(1))
                        .map(|m| m.as_str().to_string())
                })
                .ok_or_else(|| invalid("No video id found")),
            VideoPlatform::Bilibili => {
                if matches(&BARE_BV, url) {
                    return Ok(url.to_string());
                }
                if matches(&BARE_AV, url) {
                    return Ok(url.to_uppercase());
                }
                if url.contains("b23.tv") {
                    return Err(invalid(
                        "Short links are not supported, use the full video link or the BV id",
                    ));
                }
                if let Some(bv) = capture(&PATH_BV, url) {
                    return Ok(bv);
                }
                capture(&PATH_AV, url)
                    .map(|av| av.to_uppercase())
                    .ok_or_else(|| invalid("No BV or AV id found"))
            }
        }
    }

    pub fn watch_url(&self, video_id: &str) -> String {
        match self {
            VideoPlatform::YouTube => format!("https://www.youtube.com/watch?v={video_id}"),
            VideoPlatform::Bilibili => format!("https://www.bilibili.com/video/{video_id}"),
        }
    }

    /// Link that opens the video at `seconds`.
    pub fn timestamp_url(&self, video_id: &str, seconds: f64) -> String {
        let t = seconds.max(0.0).floor() as u64;
        match self {
            VideoPlatform::YouTube => format!("{}&t={t}s", self.watch_url(video_id)),
            VideoPlatform::Bilibili => format!("{}?t={t}", self.watch_url(video_id)),
        }
    }

    /// Static cover image. Bilibili covers need an API round trip, so none.
    pub fn thumbnail_url(&self, video_id: &str) -> Option<String> {
        match self {
            VideoPlatform::YouTube => Some(format!(
                "https://img.youtube.com/vi/{video_id}/maxresdefault.jpg"
            )),
            VideoPlatform::Bilibili => None,
        }
    }
}

impl fmt::Display for VideoPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolve a URL to its platform and video id.
pub fn detect_platform(url: &str) -> Result<PlatformInfo> {
    let platform = VideoPlatform::detect(url)?;
    let video_id = platform.extract_video_id(url)?;
    Ok(PlatformInfo {
        platform,
        video_id,
        original_url: url.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_url_shapes() {
        for (url, id) in [
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://youtu.be/dQw4w9WgXcQ?si=abc", "dQw4w9WgXcQ"),
            ("https://www.youtube.com/embed/dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://www.youtube.com/v/dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            (
                "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
                "dQw4w9WgXcQ",
            ),
        ] {
            let info = detect_platform(url).unwrap();
            assert_eq!(info.platform, VideoPlatform::YouTube);
            assert_eq!(info.video_id, id, "{url}");
        }
    }

    #[test]
    fn bilibili_url_shapes() {
        let info = detect_platform("https://www.bilibili.com/video/BV1xx411c7mD/?p=1").unwrap();
        assert_eq!(info.platform, VideoPlatform::Bilibili);
        assert_eq!(info.video_id, "BV1xx411c7mD");

        assert_eq!(detect_platform("BV1xx411c7mD").unwrap().video_id, "BV1xx411c7mD");
        assert_eq!(detect_platform("av170001").unwrap().video_id, "AV170001");
        assert_eq!(
            detect_platform("https://www.bilibili.com/video/av170001")
                .unwrap()
                .video_id,
            "AV170001"
        );
    }

    #[test]
    fn unsupported_and_invalid_urls() {
        assert!(matches!(
            detect_platform("https://vimeo.com/123"),
            Err(VidsumError::UnsupportedPlatform { .. })
        ));
        assert!(matches!(
            detect_platform("https://b23.tv/abc123"),
            Err(VidsumError::InvalidVideoUrl { .. })
        ));
        assert!(matches!(
            detect_platform("https://www.bilibili.com/anime/"),
            Err(VidsumError::InvalidVideoUrl { .. })
        ));
    }

    #[test]
    fn links_and_thumbnails() {
        let yt = VideoPlatform::YouTube;
        assert_eq!(
            yt.timestamp_url("abc", 75.9),
            "https://www.youtube.com/watch?v=abc&t=75s"
        );
        assert!(yt.thumbnail_url("abc").unwrap().contains("/vi/abc/"));

        let bili = VideoPlatform::Bilibili;
        assert_eq!(
            bili.timestamp_url("BV1", 12.0),
            "https://www.bilibili.com/video/BV1?t=12"
        );
        assert_eq!(bili.thumbnail_url("BV1"), None);
    }
}
