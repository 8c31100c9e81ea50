use serde::{Deserialize, Serialize};

use crate::platform::VideoPlatform;

/// A single timed piece of subtitle text, after timing repair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionFragment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl CaptionFragment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// A contiguous run of fragments grouped for one summarization call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentGroup {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub subtitle_count: usize,
}

impl SegmentGroup {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Synthetic segments carry no captions, only a note about the time range.
    pub fn is_placeholder(&self) -> bool {
        self.subtitle_count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub original_text: String,
    pub detailed_summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallSummary {
    pub main_theme: String,
    pub key_points: Vec<String>,
    pub full_summary: String,
    pub conclusion: String,
}

/// Everything the core needs from a platform adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoData {
    pub platform: VideoPlatform,
    pub video_id: String,
    pub title: String,
    pub duration: Option<f64>,
    pub fragments: Vec<CaptionFragment>,
}

/// Input of the markdown and Obsidian renderers.
#[derive(Debug, Clone, Serialize)]
pub struct VideoReport {
    pub title: String,
    pub platform: VideoPlatform,
    pub video_id: String,
    pub url: String,
    pub duration: Option<f64>,
    pub segments: Vec<ProcessedSegment>,
    pub overall: OverallSummary,
    pub generated_at: chrono::DateTime<chrono::Local>,
}
