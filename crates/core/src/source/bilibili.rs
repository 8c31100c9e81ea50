use serde_json::Value;
use tracing::{debug, info, warn};

use super::{REQUEST_TIMEOUT, USER_AGENT};
use crate::{
    error::{Result, VidsumError},
    platform::VideoPlatform,
    timing::normalize_captions,
    types::VideoData,
};

const VIEW_API: &str = "https://api.bilibili.com/x/web-interface/view";
const PLAYER_API: &str = "https://api.bilibili.com/x/player/v2";
const REFERER: &str = "https://www.bilibili.com/";

#[derive(Debug, PartialEq)]
struct ViewInfo {
    title: String,
    duration: Option<f64>,
    aid: u64,
    cid: u64,
}

fn view_query(video_id: &str) -> Result<(&'static str, String)> {
    if video_id.starts_with("BV") {
        Ok(("bvid", video_id.to_string()))
    } else if let Some(aid) = video_id.strip_prefix("AV") {
        Ok(("aid", aid.to_string()))
    } else {
        Err(VidsumError::FetchFailed {
            video_id: video_id.to_string(),
            reason: "unsupported id format, expected BV or AV".to_string(),
        })
    }
}

fn parse_view(body: &Value, video_id: &str) -> Result<ViewInfo> {
    let failed = |reason: String| VidsumError::FetchFailed {
        video_id: video_id.to_string(),
        reason,
    };

    if body["code"].as_i64() != Some(0) {
        return Err(failed(format!(
            "view API returned an error: {}",
            body["message"].as_str().unwrap_or("unknown error")
        )));
    }

    let data = &body["data"];
    let cid = data["pages"][0]["cid"]
        .as_u64()
        .ok_or_else(|| failed("video has no pages".to_string()))?;
    let aid = data["aid"]
        .as_u64()
        .ok_or_else(|| failed("view API returned no aid".to_string()))?;

    Ok(ViewInfo {
        title: data["title"]
            .as_str()
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Bilibili video {video_id}")),
        duration: data["duration"].as_f64().filter(|d| *d > 0.0),
        aid,
        cid,
    })
}

fn subtitle_url(player: &Value) -> Option<String> {
    if player["code"].as_i64() != Some(0) {
        return None;
    }
    let first = &player["data"]["subtitle"]["subtitles"][0];
    let url = first["subtitle_url"].as_str().filter(|u| !u.is_empty())?;
    debug!(lang = first["lan"].as_str().unwrap_or("?"), "subtitle track found");

    Some(if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.to_string()
    })
}

async fn get_json(http: &reqwest::Client, url: &str, query: &[(&str, String)]) -> Result<Value> {
    Ok(http
        .get(url)
        .query(query)
        .header("User-Agent", USER_AGENT)
        .header("Referer", REFERER)
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .json::<Value>()
        .await?)
}

async fn subtitle_records(http: &reqwest::Client, view: &ViewInfo) -> Result<Vec<Value>> {
    let player = get_json(
        http,
        PLAYER_API,
        &[("aid", view.aid.to_string()), ("cid", view.cid.to_string())],
    )
    .await?;

    let Some(url) = subtitle_url(&player) else {
        info!("video has no subtitles, segments will be time based");
        return Ok(Vec::new());
    };

    let content = get_json(http, &url, &[]).await?;
    Ok(content["body"].as_array().cloned().unwrap_or_default())
}

pub(super) async fn fetch(http: &reqwest::Client, video_id: &str) -> Result<VideoData> {
    let query = view_query(video_id)?;
    let body = get_json(http, VIEW_API, &[(query.0, query.1)]).await?;
    let view = parse_view(&body, video_id)?;

    let records = match subtitle_records(http, &view).await {
        Ok(records) => records,
        Err(e) => {
            warn!(video_id, error = %e, "subtitle download failed, continuing without captions");
            Vec::new()
        }
    };
    let fragments = normalize_captions(&records, view.duration);

    Ok(VideoData {
        platform: VideoPlatform::Bilibili,
        video_id: video_id.to_string(),
        title: view.title,
        duration: view.duration,
        fragments,
    })
}
