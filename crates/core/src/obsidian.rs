//! Export of a finished report into an Obsidian vault.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::{Result, VidsumError},
    format::{format_duration_human, format_timestamp, time_range},
    output::{sanitize_file_name, write_text},
    types::VideoReport,
};

pub const DEFAULT_FOLDER: &str = "Video Notes";
const TITLE_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObsidianTemplate {
    #[default]
    Standard,
    Minimal,
    Timeline,
}

#[derive(Debug, Clone)]
pub struct ObsidianConfig {
    pub vault_path: PathBuf,
    pub folder_name: String,
    pub tags: Vec<String>,
    pub template: ObsidianTemplate,
}

impl ObsidianConfig {
    pub fn new(vault_path: impl Into<PathBuf>) -> Self {
        Self {
            vault_path: vault_path.into(),
            folder_name: DEFAULT_FOLDER.to_string(),
            tags: vec!["video-summary".to_string()],
            template: ObsidianTemplate::default(),
        }
    }
}

/// A vault is a directory holding an `.obsidian` folder.
pub fn is_obsidian_vault(path: &Path) -> bool {
    path.join(".obsidian").is_dir()
}

fn front_matter(report: &VideoReport, tags: &[String]) -> String {
    let mut tags = tags.to_vec();
    let platform_tag = report.platform.name().to_lowercase();
    if !tags.contains(&platform_tag) {
        tags.insert(0, platform_tag);
    }

    let mut output = String::from("---\n");
    output.push_str(&format!("title: \"{}\"\n", report.title.replace('"', "\\\"")));
    output.push_str("type: video-summary\n");
    output.push_str(&format!("video_id: {}\n", report.video_id));
    output.push_str(&format!("source: {}\n", report.url));
    output.push_str(&format!(
        "created: {}\n",
        report.generated_at.format("%Y-%m-%d")
    ));
    if let Some(duration) = report.duration {
        output.push_str(&format!("duration: {}\n", format_timestamp(duration)));
    }
    output.push_str(&format!("tags: [{}]\n", tags.join(", ")));
    output.push_str("---\n\n");
    output
}

fn time_link(report: &VideoReport, start: f64) -> String {
    format!(
        "[▶]({})",
        report.platform.timestamp_url(&report.video_id, start)
    )
}

fn standard(report: &VideoReport) -> String {
    let overall = &report.overall;
    let mut output = format!("# {}\n\n", report.title);
    output.push_str(&format!("**[Watch video]({})**\n\n", report.url));
    if let Some(duration) = report.duration {
        output.push_str(&format!("**Duration:** {}\n\n", format_duration_human(duration)));
    }

    output.push_str("## Summary\n\n");
    output.push_str(&format!("### Theme\n{}\n\n", overall.main_theme));
    output.push_str("### Key points\n");
    for point in &overall.key_points {
        output.push_str(&format!("- {}\n", point));
    }
    output.push('\n');
    output.push_str(&format!("### Full summary\n{}\n\n", overall.full_summary));
    if !overall.conclusion.is_empty() {
        output.push_str(&format!("### Conclusion\n{}\n\n", overall.conclusion));
    }

    output.push_str("## Timeline\n\n");
    for segment in &report.segments {
        output.push_str(&format!(
            "### {}\n{}\n\n{}\n\n---\n\n",
            time_range(segment.start_time, segment.end_time),
            time_link(report, segment.start_time),
            segment.detailed_summary.trim()
        ));
    }
    output
}

fn minimal(report: &VideoReport) -> String {
    let mut output = format!("# {}\n\n[Watch video]({})\n\n", report.title, report.url);
    output.push_str(&format!("## Summary\n{}\n\n", report.overall.full_summary));
    output.push_str("## Key points\n");
    for point in &report.overall.key_points {
        output.push_str(&format!("- {}\n", point));
    }
    output.push('\n');
    output
}

fn timeline(report: &VideoReport) -> String {
    let mut output = format!("# {}\n\n[Watch video]({})\n\n", report.title, report.url);
    output.push_str(&format!("## Overview\n{}\n\n", report.overall.full_summary));
    output.push_str("## Timeline\n\n");
    for segment in &report.segments {
        output.push_str(&format!(
            "**{}** {} - {}\n\n",
            format_timestamp(segment.start_time),
            time_link(report, segment.start_time),
            segment.detailed_summary.trim()
        ));
    }
    output
}

pub fn render_obsidian(report: &VideoReport, config: &ObsidianConfig) -> String {
    let body = match config.template {
        ObsidianTemplate::Standard => standard(report),
        ObsidianTemplate::Minimal => minimal(report),
        ObsidianTemplate::Timeline => timeline(report),
    };
    front_matter(report, &config.tags) + &body
}

/// Write the note to `<vault>/<folder>/<title>.md` and return its path.
pub async fn export_to_obsidian(report: &VideoReport, config: &ObsidianConfig) -> Result<PathBuf> {
    if !config.vault_path.is_dir() {
        return Err(VidsumError::Config {
            path: config.vault_path.clone(),
            reason: "Obsidian vault directory does not exist".to_string(),
        });
    }
    if !is_obsidian_vault(&config.vault_path) {
        warn!(vault = %config.vault_path.display(), "directory has no .obsidian folder");
    }

    let title: String = report.title.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut name: String = sanitize_file_name(&title)
        .chars()
        .take(TITLE_MAX_CHARS)
        .collect();
    if name.is_empty() {
        name = sanitize_file_name(&report.video_id);
    }

    let path = config
        .vault_path
        .join(&config.folder_name)
        .join(format!("{name}.md"));
    write_text(&path, &render_obsidian(report, config)).await?;
    info!(path = %path.display(), template = ?config.template, "exported to Obsidian");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use chrono::Local;

    use super::*;
    use crate::{
        platform::VideoPlatform,
        types::{OverallSummary, ProcessedSegment},
    };

    fn report() -> VideoReport {
        VideoReport {
            title: "Tokio \"internals\"".to_string(),
            platform: VideoPlatform::Bilibili,
            video_id: "BV1abc".to_string(),
            url: "https://www.bilibili.com/video/BV1abc".to_string(),
            duration: Some(125.0),
            segments: vec![ProcessedSegment {
                start_time: 65.0,
                end_time: 125.0,
                original_text: String::new(),
                detailed_summary: "The scheduler.".to_string(),
            }],
            overall: OverallSummary {
                main_theme: "Runtime design".to_string(),
                key_points: vec!["Work stealing".to_string()],
                full_summary: "How tokio schedules tasks.".to_string(),
                conclusion: String::new(),
            },
            generated_at: Local::now(),
        }
    }

    #[test]
    fn front_matter_and_templates() {
        let mut config = ObsidianConfig::new("/vault");

        let standard = render_obsidian(&report(), &config);
        assert!(standard.starts_with("---\ntitle: \"Tokio \\\"internals\\\"\"\n"));
        assert!(standard.contains("duration: 02:05\n"));
        assert!(standard.contains("tags: [bilibili, video-summary]\n"));
        assert!(standard.contains("- Work stealing\n"));
        assert!(standard.contains("[▶](https://www.bilibili.com/video/BV1abc?t=65)"));
        assert!(!standard.contains("### Conclusion"));

        config.template = ObsidianTemplate::Minimal;
        let minimal = render_obsidian(&report(), &config);
        assert!(!minimal.contains("## Timeline"));

        config.template = ObsidianTemplate::Timeline;
        let timeline = render_obsidian(&report(), &config);
        assert!(timeline.contains("**01:05** [▶]"));
    }

    #[tokio::test]
    async fn export_writes_into_the_vault_folder() {
        let vault = tempfile::tempdir().unwrap();
        std::fs::create_dir(vault.path().join(".obsidian")).unwrap();
        let config = ObsidianConfig::new(vault.path());

        let path = export_to_obsidian(&report(), &config).await.unwrap();
        assert_eq!(
            path,
            vault.path().join(DEFAULT_FOLDER).join("Tokio _internals_.md")
        );
        assert!(std::fs::read_to_string(&path).unwrap().contains("# Tokio"));
    }

    #[tokio::test]
    async fn long_cjk_titles_fit_the_file_name_limit() {
        let vault = tempfile::tempdir().unwrap();
        let config = ObsidianConfig::new(vault.path());
        let mut report = report();
        report.title = "视频".repeat(50);

        let path = export_to_obsidian(&report, &config).await.unwrap();
        let file_name = path.file_name().unwrap().to_str().unwrap();
        assert!(file_name.len() <= 255, "{} bytes", file_name.len());
        assert!(file_name.ends_with(".md"));
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn missing_vault_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ObsidianConfig::new(dir.path().join("nope"));
        assert!(export_to_obsidian(&report(), &config).await.is_err());
    }
}
