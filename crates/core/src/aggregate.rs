//! Whole-video synthesis from the per-segment summaries.

use tracing::{info, warn};

use crate::{
    error::LlmError,
    format::{format_duration_human, time_range},
    llm::LlmClient,
    rate_limiter::{DEFAULT_MAX_RETRIES, call_llm_with_retry},
    types::{OverallSummary, ProcessedSegment},
};

pub const THEME_HEADER: &str = "【主要主题】";
pub const KEY_POINTS_HEADER: &str = "【关键要点】";
pub const SUMMARY_HEADER: &str = "【完整总结】";
pub const CONCLUSION_HEADER: &str = "【核心结论】";

pub const DEFAULT_THEME: &str = "Failed to generate main theme";
pub const DEFAULT_KEY_POINT: &str = "Failed to extract key points";
pub const DEFAULT_SUMMARY: &str = "Failed to generate full summary";
pub const DEFAULT_CONCLUSION: &str = "Failed to generate conclusion";

fn response_format() -> String {
    format!(
        "Return the result in exactly this format:\n\n\
         {THEME_HEADER}\n\
         One sentence stating the main theme of the video\n\n\
         {KEY_POINTS_HEADER}\n\
         - Point 1\n\
         - Point 2\n\
         - Point 3\n\
         - Point 4\n\
         - Point 5\n\n\
         {SUMMARY_HEADER}\n\
         A complete summary of 300-500 characters covering the main content, clearly structured and coherent\n\n\
         {CONCLUSION_HEADER}\n\
         Two or three sentences on the core value of the video\n\n\
         Keep the bracketed headers exactly as shown and add nothing else:"
    )
}

pub fn overall_prompt(
    title: &str,
    duration: f64,
    segments: &[ProcessedSegment],
    language: &str,
) -> String {
    let summaries = segments
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "Segment {} ({}): {}",
                i + 1,
                time_range(s.start_time, s.end_time),
                s.detailed_summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Based on the segment summaries below, write a complete summary report of the video in {language}.\n\n\
         Video title: {title}\n\
         Video length: {}\n\n\
         Segment summaries:\n{summaries}\n\n{}",
        format_duration_human(duration),
        response_format()
    )
}

/// Prompt for videos without any segment content.
pub fn title_only_prompt(title: &str, duration: f64, language: &str) -> String {
    format!(
        "No subtitles or transcript are available for this video, only its metadata.\n\n\
         Video title: {title}\n\
         Video length: {}\n\n\
         Based on the title alone, write a cautious summary report in {language}. \
         Make clear that every statement is inferred from the title and not from the video content.\n\n{}",
        format_duration_human(duration),
        response_format()
    )
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Theme,
    KeyPoints,
    Summary,
    Conclusion,
}

fn join_or(lines: Vec<&str>, default: &str) -> String {
    if lines.is_empty() {
        default.to_string()
    } else {
        lines.join(" ")
    }
}

/// Lenient parse of the four bracketed sections. Never fails: anything
/// missing falls back to a default, and key points are never empty.
pub fn parse_overall_summary(response: &str) -> OverallSummary {
    let headers = [
        (THEME_HEADER, Section::Theme),
        (KEY_POINTS_HEADER, Section::KeyPoints),
        (SUMMARY_HEADER, Section::Summary),
        (CONCLUSION_HEADER, Section::Conclusion),
    ];

    let mut current = Section::None;
    let mut theme = Vec::new();
    let mut key_points: Vec<String> = Vec::new();
    let mut summary = Vec::new();
    let mut conclusion = Vec::new();

    for line in response.lines() {
        let mut line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some((header, section)) = headers.iter().find(|(h, _)| line.contains(h)) {
            current = *section;
            // content may follow the header on the same line
            line = line
                .split_once(header)
                .map(|(_, rest)| rest.trim())
                .unwrap_or("");
            if line.is_empty() {
                continue;
            }
        }

        match current {
            Section::Theme => theme.push(line),
            Section::KeyPoints => {
                if let Some(point) = line.strip_prefix('-') {
                    let point = point.trim();
                    if !point.is_empty() {
                        key_points.push(point.to_string());
                    }
                }
            }
            Section::Summary => summary.push(line),
            Section::Conclusion => conclusion.push(line),
            Section::None => {}
        }
    }

    if key_points.is_empty() {
        key_points.push(DEFAULT_KEY_POINT.to_string());
    }

    OverallSummary {
        main_theme: join_or(theme, DEFAULT_THEME),
        key_points,
        full_summary: join_or(summary, DEFAULT_SUMMARY),
        conclusion: join_or(conclusion, DEFAULT_CONCLUSION),
    }
}

/// Produce the overall summary with one LLM call.
///
/// With no processed segments the prompt is built from title and duration only.
pub async fn aggregate(
    title: &str,
    duration: f64,
    segments: &[ProcessedSegment],
    llm: &dyn LlmClient,
    model: &str,
    language: &str,
) -> Result<OverallSummary, LlmError> {
    let prompt = if segments.is_empty() {
        warn!(title, "no segment summaries, aggregating from title only");
        title_only_prompt(title, duration, language)
    } else {
        overall_prompt(title, duration, segments, language)
    };

    let response = call_llm_with_retry(
        move |prompt: String| async move { llm.complete(&prompt, model).await },
        prompt,
        DEFAULT_MAX_RETRIES,
    )
    .await?;

    let overall = parse_overall_summary(&response);
    info!(
        theme = %overall.main_theme,
        key_points = overall.key_points.len(),
        summary_chars = overall.full_summary.chars().count(),
        "overall summary ready"
    );
    Ok(overall)
}
