//! Batched per-segment summarization.

use std::time::Duration;

use futures::future::try_join_all;
use tracing::{debug, info};

use crate::{
    error::LlmError,
    format::{format_timestamp, time_range},
    llm::LlmClient,
    rate_limiter::{DEFAULT_MAX_RETRIES, RateLimiter, call_llm_with_retry},
    types::{ProcessedSegment, SegmentGroup},
};

pub const BATCH_SIZE: usize = 3;
pub const BATCH_DELAY: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone)]
pub struct SummarizeOptions {
    pub model: String,
    /// Language the summaries are written in, e.g. `Chinese`.
    pub language: String,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub max_retries: u32,
}

impl SummarizeOptions {
    pub fn new(model: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            language: language.into(),
            batch_size: BATCH_SIZE,
            batch_delay: BATCH_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_batching(mut self, batch_size: usize, batch_delay: Duration) -> Self {
        self.batch_size = batch_size.max(1);
        self.batch_delay = batch_delay;
        self
    }
}

pub fn segment_prompt(segment: &SegmentGroup, language: &str) -> String {
    if segment.is_placeholder() {
        return format!(
            "This part of a video ({}) has no subtitles. \
             Write one or two sentences in {language} noting the time range \
             and that no spoken content is available. Do not invent content.",
            time_range(segment.start, segment.end)
        );
    }

    format!(
        "Summarize the following video excerpt in {language}.\n\n\
         Requirements:\n\
         1. Be detailed and complete, highlighting the core content and key points of this excerpt\n\
         2. Write clearly in {language}, even if the excerpt is in another language\n\
         3. Keep the summary between 300 and 500 characters\n\
         4. Stay objective and accurate, do not add personal opinions\n\
         5. Record concrete data, names, numbers and dates exactly\n\n\
         Video excerpt:\n{}\n\n\
         Return only the summary, without any extra formatting or explanation:",
        segment.text.trim()
    )
}

async fn summarize_one(
    index: usize,
    segment: &SegmentGroup,
    llm: &dyn LlmClient,
    limiter: &RateLimiter,
    options: &SummarizeOptions,
) -> Result<ProcessedSegment, LlmError> {
    let model = options.model.as_str();
    debug!(
        segment = index + 1,
        start = %format_timestamp(segment.start),
        end = %format_timestamp(segment.end),
        placeholder = segment.is_placeholder(),
        "summarizing segment"
    );

    let summary = limiter
        .execute(|| {
            call_llm_with_retry(
                move |prompt: String| async move { llm.complete(&prompt, model).await },
                segment_prompt(segment, &options.language),
                options.max_retries,
            )
        })
        .await?;

    Ok(ProcessedSegment {
        start_time: segment.start,
        end_time: segment.end,
        original_text: segment.text.trim().to_string(),
        detailed_summary: summary.trim().to_string(),
    })
}

/// Summarize every segment, `batch_size` at a time.
///
/// Calls inside a batch run concurrently behind `limiter`. A failed call
/// fails the whole run and no later batch is started. Output order matches
/// `segments`.
pub async fn summarize_segments(
    segments: &[SegmentGroup],
    llm: &dyn LlmClient,
    limiter: &RateLimiter,
    options: &SummarizeOptions,
) -> Result<Vec<ProcessedSegment>, LlmError> {
    if segments.is_empty() {
        info!("no segments, skipping segment summaries");
        return Ok(Vec::new());
    }

    let batch_size = options.batch_size.max(1);
    let total_batches = segments.len().div_ceil(batch_size);
    let mut processed = Vec::with_capacity(segments.len());

    for (batch_index, batch) in segments.chunks(batch_size).enumerate() {
        if batch_index > 0 {
            tokio::time::sleep(options.batch_delay).await;
        }
        info!(
            batch = batch_index + 1,
            total_batches,
            size = batch.len(),
            "processing batch"
        );

        let offset = batch_index * batch_size;
        let results = try_join_all(batch.iter().enumerate().map(|(i, segment)| {
            summarize_one(offset + i, segment, llm, limiter, options)
        }))
        .await?;
        processed.extend(results);
    }

    info!(count = processed.len(), "segment summaries finished");
    Ok(processed)
}
