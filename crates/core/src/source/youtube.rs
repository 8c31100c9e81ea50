use serde_json::{Value, json};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{REQUEST_TIMEOUT, USER_AGENT};
use crate::{
    error::{Result, VidsumError},
    platform::VideoPlatform,
    timing::normalize_captions,
    types::VideoData,
};

async fn video_info(url: &str) -> Result<Value> {
    let output = Command::new("yt-dlp")
        .arg("-J")
        .arg("--skip-download")
        .arg("--no-warnings")
        .arg(url)
        .output()
        .await
        .map_err(|e| VidsumError::ExternalTool {
            tool: "yt-dlp".to_string(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(VidsumError::ExternalTool {
            tool: "yt-dlp".to_string(),
            reason: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(serde_json::from_slice(&output.stdout)?)
}

fn json3_url(tracks: &Value, lang: &str) -> Option<String> {
    tracks[lang]
        .as_array()?
        .iter()
        .find(|track| track["ext"] == "json3")
        .and_then(|track| track["url"].as_str())
        .map(str::to_string)
}

/// Pick a json3 caption track: manual before automatic, preferred
/// languages before anything else.
fn pick_caption_track(info: &Value, languages: &[String]) -> Option<(String, String)> {
    let manual = &info["subtitles"];
    let automatic = &info["automatic_captions"];

    for tracks in [manual, automatic] {
        for lang in languages {
            if let Some(url) = json3_url(tracks, lang) {
                return Some((lang.clone(), url));
            }
        }
    }

    let any_manual = manual.as_object().and_then(|langs| {
        langs
            .keys()
            .find_map(|lang| json3_url(manual, lang).map(|url| (lang.clone(), url)))
    });
    any_manual.or_else(|| {
        automatic.as_object().and_then(|langs| {
            langs
                .keys()
                .filter(|lang| lang.ends_with("-orig"))
                .find_map(|lang| json3_url(automatic, lang).map(|url| (lang.clone(), url)))
        })
    })
}

/// Flatten json3 events into raw caption records.
fn json3_records(track: &Value) -> Vec<Value> {
    let Some(events) = track["events"].as_array() else {
        return Vec::new();
    };

    events
        .iter()
        .filter_map(|event| {
            let segs = event["segs"].as_array()?;
            let text: String = segs
                .iter()
                .filter_map(|seg| seg["utf8"].as_str())
                .collect::<String>()
                .replace('\n', " ");
            Some(json!({
                "tStartMs": event["tStartMs"],
                "dDurationMs": event["dDurationMs"],
                "text": text,
            }))
        })
        .collect()
}

pub(super) async fn fetch(
    http: &reqwest::Client,
    video_id: &str,
    languages: &[String],
) -> Result<VideoData> {
    let platform = VideoPlatform::YouTube;
    let info = video_info(&platform.watch_url(video_id)).await?;

    let title = info["title"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| format!("YouTube video {video_id}"));
    let duration = info["duration"].as_f64().filter(|d| *d > 0.0);

    let Some((lang, track_url)) = pick_caption_track(&info, languages) else {
        warn!(video_id, "no json3 caption track available");
        return Ok(VideoData {
            platform,
            video_id: video_id.to_string(),
            title,
            duration,
            fragments: Vec::new(),
        });
    };
    debug!(video_id, lang, "downloading caption track");

    let track = http
        .get(&track_url)
        .header("User-Agent", USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .json::<Value>()
        .await
        .map_err(|e| VidsumError::FetchFailed {
            video_id: video_id.to_string(),
            reason: format!("caption track is not valid json3: {e}"),
        })?;

    let records = json3_records(&track);
    let fragments = normalize_captions(&records, duration);

    Ok(VideoData {
        platform,
        video_id: video_id.to_string(),
        title,
        duration,
        fragments,
    })
}
