//! The summarization run as a fixed sequence of stages over one context.
//!
//! Each stage reads what earlier stages left in [`RunContext`] and adds its
//! own result. [`run_pipeline`] runs them all; callers that want progress
//! per stage can call them one by one in the same order.

use std::{path::PathBuf, time::Duration};

use chrono::Local;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    aggregate::aggregate as aggregate_summaries,
    config::{
        DEFAULT_MAX_SEGMENT_MINUTES, DEFAULT_MIN_SEGMENT_MINUTES, DEFAULT_OUTPUT_DIR,
        DEFAULT_REPORT_LANG,
    },
    error::{Result, VidsumError},
    format::render_markdown,
    llm::LlmClient,
    obsidian::{ObsidianConfig, export_to_obsidian},
    output::{create_output_structure, write_text},
    platform::{self, PlatformInfo},
    rate_limiter::{RateLimitPreset, RateLimiter},
    segmentation::{SegmentationConfig, smart_segmentation, validate_segments},
    source::VideoFetcher,
    summarize::{BATCH_DELAY, BATCH_SIZE, SummarizeOptions, summarize_segments},
    types::{OverallSummary, ProcessedSegment, SegmentGroup, VideoData, VideoReport},
    usage::TokenMonitor,
};

/// Words per segment used by full runs; larger than the segmenter's default.
pub const PIPELINE_MAX_WORDS_PER_SEGMENT: usize = 2000;

const SUSPICIOUS_CAPTION_SPAN: f64 = 7200.0;
const FALLBACK_CAPTION_SPAN: f64 = 3600.0;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    pub min_segment_minutes: f64,
    pub max_segment_minutes: f64,
    pub max_words_per_segment: usize,
    pub model: String,
    pub language: String,
    pub rate_limit: RateLimitPreset,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub obsidian: Option<ObsidianConfig>,
    pub save_token_stats: bool,
}

impl RunOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            min_segment_minutes: DEFAULT_MIN_SEGMENT_MINUTES,
            max_segment_minutes: DEFAULT_MAX_SEGMENT_MINUTES,
            max_words_per_segment: PIPELINE_MAX_WORDS_PER_SEGMENT,
            model: model.into(),
            language: DEFAULT_REPORT_LANG.to_string(),
            rate_limit: RateLimitPreset::DEFAULT,
            batch_size: BATCH_SIZE,
            batch_delay: BATCH_DELAY,
            obsidian: None,
            save_token_stats: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOutputs {
    pub output_dir: PathBuf,
    pub markdown_path: PathBuf,
    pub obsidian_path: Option<PathBuf>,
    pub token_stats_path: Option<PathBuf>,
}

/// State shared by the stages of one run.
pub struct RunContext {
    pub run_id: Uuid,
    pub url: String,
    pub options: RunOptions,
    pub platform: Option<PlatformInfo>,
    pub video: Option<VideoData>,
    pub segments: Vec<SegmentGroup>,
    pub processed: Vec<ProcessedSegment>,
    pub overall: Option<OverallSummary>,
    pub outputs: Option<RunOutputs>,
}

impl RunContext {
    pub fn new(url: impl Into<String>, options: RunOptions) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            url: url.into(),
            options,
            platform: None,
            video: None,
            segments: Vec::new(),
            processed: Vec::new(),
            overall: None,
            outputs: None,
        }
    }

    fn video(&self, stage: &'static str) -> Result<&VideoData> {
        self.video.as_ref().ok_or(VidsumError::StageOrder { stage })
    }

    /// Duration used for segmenting and reporting. See [`effective_duration`].
    pub fn duration(&self) -> Option<f64> {
        self.video.as_ref().and_then(effective_duration)
    }
}

/// The platform's duration when known, else where the captions end.
///
/// Caption spans beyond two hours are assumed broken and clamped to one hour.
pub fn effective_duration(video: &VideoData) -> Option<f64> {
    if let Some(duration) = video.duration.filter(|d| *d > 0.0) {
        return Some(duration);
    }

    let span = video.fragments.last().map(|f| f.end).filter(|e| *e > 0.0)?;
    if span > SUSPICIOUS_CAPTION_SPAN {
        warn!(span, "caption span looks wrong, clamping");
        return Some(span.min(FALLBACK_CAPTION_SPAN));
    }
    Some(span)
}

pub fn detect_platform(ctx: &mut RunContext) -> Result<()> {
    let info = platform::detect_platform(&ctx.url)?;
    info!(
        run_id = %ctx.run_id,
        platform = %info.platform,
        video_id = %info.video_id,
        "platform detected"
    );
    ctx.platform = Some(info);
    Ok(())
}

pub async fn fetch_video(ctx: &mut RunContext, fetcher: &dyn VideoFetcher) -> Result<()> {
    let info = ctx
        .platform
        .as_ref()
        .ok_or(VidsumError::StageOrder {
            stage: "fetch_video",
        })?;
    let video = fetcher.fetch(info).await?;
    ctx.video = Some(video);
    Ok(())
}

pub fn segment_video(ctx: &mut RunContext) -> Result<()> {
    let video = ctx.video("segment_video")?;
    let config = SegmentationConfig {
        min_segment_minutes: ctx.options.min_segment_minutes,
        max_segment_minutes: ctx.options.max_segment_minutes,
        max_words_per_segment: ctx.options.max_words_per_segment,
        video_duration: effective_duration(video),
    };

    let segments = smart_segmentation(&video.fragments, &config);
    for problem in validate_segments(&segments) {
        warn!(run_id = %ctx.run_id, "{problem}");
    }
    ctx.segments = segments;
    Ok(())
}

pub async fn summarize(ctx: &mut RunContext, llm: &dyn LlmClient) -> Result<()> {
    ctx.video("summarize")?;
    let limiter = RateLimiter::from_preset(ctx.options.rate_limit);
    let options = SummarizeOptions::new(&ctx.options.model, &ctx.options.language)
        .with_batching(ctx.options.batch_size, ctx.options.batch_delay);

    ctx.processed = summarize_segments(&ctx.segments, llm, &limiter, &options).await?;
    Ok(())
}

pub async fn aggregate(ctx: &mut RunContext, llm: &dyn LlmClient) -> Result<()> {
    let video = ctx.video("aggregate")?;
    let duration = effective_duration(video).unwrap_or(0.0);

    let overall = aggregate_summaries(
        &video.title,
        duration,
        &ctx.processed,
        llm,
        &ctx.options.model,
        &ctx.options.language,
    )
    .await?;
    ctx.overall = Some(overall);
    Ok(())
}

pub fn build_report(ctx: &RunContext) -> Result<VideoReport> {
    let video = ctx.video("write_output")?;
    let overall = ctx
        .overall
        .clone()
        .ok_or(VidsumError::StageOrder {
            stage: "write_output",
        })?;

    Ok(VideoReport {
        title: video.title.clone(),
        platform: video.platform,
        video_id: video.video_id.clone(),
        url: video.platform.watch_url(&video.video_id),
        duration: effective_duration(video),
        segments: ctx.processed.clone(),
        overall,
        generated_at: Local::now(),
    })
}

/// Write the markdown report, then the optional Obsidian note and token stats.
pub async fn write_output(ctx: &mut RunContext, monitor: Option<&TokenMonitor>) -> Result<()> {
    let report = build_report(ctx)?;
    let paths =
        create_output_structure(&ctx.options.output_dir, &report.title, &report.video_id).await?;
    write_text(&paths.markdown_path, &render_markdown(&report)).await?;

    let mut outputs = RunOutputs {
        output_dir: paths.output_dir,
        markdown_path: paths.markdown_path,
        ..RunOutputs::default()
    };

    if let Some(obsidian) = &ctx.options.obsidian {
        match export_to_obsidian(&report, obsidian).await {
            Ok(path) => outputs.obsidian_path = Some(path),
            Err(e) => warn!(error = %e, "Obsidian export failed, continuing"),
        }
    }

    if ctx.options.save_token_stats {
        if let Some(monitor) = monitor {
            let path = outputs.output_dir.join(format!(
                "token-stats-{}.json",
                report.generated_at.format("%Y%m%d-%H%M%S")
            ));
            write_text(&path, &monitor.to_json()?).await?;
            outputs.token_stats_path = Some(path);
        }
    }

    info!(
        run_id = %ctx.run_id,
        markdown = %outputs.markdown_path.display(),
        "run finished"
    );
    ctx.outputs = Some(outputs);
    Ok(())
}

/// Run every stage in order.
pub async fn run_pipeline(
    url: &str,
    options: RunOptions,
    fetcher: &dyn VideoFetcher,
    llm: &dyn LlmClient,
    monitor: Option<&TokenMonitor>,
) -> Result<RunContext> {
    let mut ctx = RunContext::new(url, options);

    detect_platform(&mut ctx)?;
    fetch_video(&mut ctx, fetcher).await?;
    segment_video(&mut ctx)?;
    summarize(&mut ctx, llm).await?;
    aggregate(&mut ctx, llm).await?;
    write_output(&mut ctx, monitor).await?;

    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{platform::VideoPlatform, types::CaptionFragment};

    fn video(duration: Option<f64>, last_end: Option<f64>) -> VideoData {
        VideoData {
            platform: VideoPlatform::YouTube,
            video_id: "abc".into(),
            title: "t".into(),
            duration,
            fragments: last_end
                .map(|end| vec![CaptionFragment::new(0.0, end, "x")])
                .unwrap_or_default(),
        }
    }

    #[test]
    fn effective_duration_prefers_platform_value() {
        assert_eq!(effective_duration(&video(Some(930.0), Some(10.0))), Some(930.0));
        assert_eq!(effective_duration(&video(None, Some(610.0))), Some(610.0));
        assert_eq!(effective_duration(&video(None, Some(9000.0))), Some(3600.0));
        assert_eq!(effective_duration(&video(Some(0.0), None)), None);
    }

    #[test]
    fn stages_refuse_to_run_out_of_order() {
        let mut ctx = RunContext::new("https://youtu.be/abc", RunOptions::new("m"));
        assert!(matches!(
            segment_video(&mut ctx),
            Err(VidsumError::StageOrder {
                stage: "segment_video"
            })
        ));
        assert!(build_report(&ctx).is_err());

        detect_platform(&mut ctx).unwrap();
        assert_eq!(ctx.platform.as_ref().unwrap().video_id, "abc");
    }
}
