use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use vidsum_core::{
    CaptionFragment, LlmClient, LlmError, LlmUsage, ObsidianConfig, PlatformInfo, RateLimitPreset,
    Result, RunOptions, TokenMonitor, UsageObserver, VideoData, VideoFetcher, VidsumError,
    run_pipeline,
};

const OVERALL_REPLY: &str = "\
【主要主题】
Ownership in Rust
【关键要点】
- Values have one owner
- Borrows are checked
【完整总结】
A walk through moves and borrows.
【核心结论】
The compiler keeps memory safe.";

struct StubFetcher {
    title: String,
    duration: Option<f64>,
    fragments: Vec<CaptionFragment>,
    calls: AtomicUsize,
}

impl StubFetcher {
    fn new(duration: Option<f64>, fragments: Vec<CaptionFragment>) -> Self {
        Self {
            title: "Rust Ownership Explained".to_string(),
            duration,
            fragments,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VideoFetcher for StubFetcher {
    async fn fetch(&self, info: &PlatformInfo) -> Result<VideoData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(VideoData {
            platform: info.platform,
            video_id: info.video_id.clone(),
            title: self.title.clone(),
            duration: self.duration,
            fragments: self.fragments.clone(),
        })
    }
}

/// Replies to segment prompts with a fixed summary and to the overall
/// prompt with a well-formed four-section answer.
struct ScriptedLlm {
    prompts: Mutex<Vec<String>>,
    fail_segments: bool,
    monitor: Option<Arc<TokenMonitor>>,
}

impl ScriptedLlm {
    fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            fail_segments: false,
            monitor: None,
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, prompt: &str, model: &str) -> std::result::Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(monitor) = &self.monitor {
            monitor.record(
                &LlmUsage {
                    model: model.to_string(),
                    prompt_tokens: 100,
                    completion_tokens: 50,
                    total_tokens: 150,
                    cost: 0.0,
                },
                prompt,
            );
        }

        if prompt.contains("【主要主题】") {
            return Ok(OVERALL_REPLY.to_string());
        }
        if self.fail_segments {
            return Err(LlmError::Api {
                status: 401,
                body: "invalid api key".to_string(),
            });
        }
        Ok("This segment explains borrowing.".to_string())
    }
}

fn options(output_dir: &std::path::Path) -> RunOptions {
    let mut options = RunOptions::new("test-model");
    options.output_dir = output_dir.to_path_buf();
    options.language = "English".to_string();
    options.batch_delay = Duration::ZERO;
    options.rate_limit = RateLimitPreset {
        max_concurrent: 3,
        delay_ms: 0,
    };
    options
}

fn uniform_captions(count: usize, step: f64) -> Vec<CaptionFragment> {
    (0..count)
        .map(|i| {
            CaptionFragment::new(
                i as f64 * step,
                (i + 1) as f64 * step,
                "rust compiler checks every borrow carefully",
            )
        })
        .collect()
}

#[tokio::test]
async fn full_run_writes_report_and_token_stats() {
    let out = tempfile::tempdir().unwrap();
    let fetcher = StubFetcher::new(Some(600.0), uniform_captions(10, 60.0));
    let monitor = Arc::new(TokenMonitor::new());
    let llm = ScriptedLlm {
        monitor: Some(monitor.clone()),
        ..ScriptedLlm::new()
    };
    let mut opts = options(out.path());
    opts.save_token_stats = true;

    let ctx = run_pipeline(
        "https://www.youtube.com/watch?v=abc123",
        opts,
        &fetcher,
        &llm,
        Some(&monitor),
    )
    .await
    .unwrap();

    assert_eq!(ctx.segments.len(), 1);
    assert_eq!(ctx.segments[0].subtitle_count, 10);
    assert_eq!(ctx.processed.len(), ctx.segments.len());
    let overall = ctx.overall.as_ref().unwrap();
    assert_eq!(overall.main_theme, "Ownership in Rust");
    assert_eq!(overall.key_points.len(), 2);

    let outputs = ctx.outputs.as_ref().unwrap();
    assert_eq!(
        outputs.output_dir,
        out.path().join("Rust Ownership Explained")
    );
    let markdown = std::fs::read_to_string(&outputs.markdown_path).unwrap();
    assert!(markdown.contains("# Rust Ownership Explained"));
    assert!(markdown.contains("This segment explains borrowing."));
    assert!(markdown.contains("https://www.youtube.com/watch?v=abc123&t=0s"));

    let stats_path = outputs.token_stats_path.as_ref().unwrap();
    let stats = std::fs::read_to_string(stats_path).unwrap();
    assert!(stats.contains("\"totalCalls\": 2"));
    assert_eq!(monitor.snapshot().total_calls, 2);
}

#[tokio::test]
async fn missing_captions_and_duration_aggregate_from_title() {
    let out = tempfile::tempdir().unwrap();
    let fetcher = StubFetcher::new(None, Vec::new());
    let llm = ScriptedLlm::new();

    let ctx = run_pipeline("BV1xx411c7mD", options(out.path()), &fetcher, &llm, None)
        .await
        .unwrap();

    assert!(ctx.segments.is_empty());
    assert!(ctx.processed.is_empty());
    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("No subtitles or transcript"));
    assert!(ctx.outputs.unwrap().markdown_path.exists());
}

#[tokio::test]
async fn missing_captions_with_duration_use_placeholders() {
    let out = tempfile::tempdir().unwrap();
    let fetcher = StubFetcher::new(Some(930.0), Vec::new());
    let llm = ScriptedLlm::new();

    let ctx = run_pipeline(
        "https://www.bilibili.com/video/BV1xx411c7mD",
        options(out.path()),
        &fetcher,
        &llm,
        None,
    )
    .await
    .unwrap();

    assert_eq!(ctx.segments.len(), 2);
    assert!(ctx.segments.iter().all(|s| s.subtitle_count == 0));
    assert_eq!(ctx.segments[1].end, 930.0);
    assert_eq!(ctx.processed.len(), 2);

    let prompts = llm.prompts();
    let placeholder_prompts = prompts
        .iter()
        .filter(|p| p.contains("has no subtitles"))
        .count();
    assert_eq!(placeholder_prompts, 2);
}

#[tokio::test]
async fn failed_segment_call_aborts_before_writing() {
    let out = tempfile::tempdir().unwrap();
    let fetcher = StubFetcher::new(Some(600.0), uniform_captions(10, 60.0));
    let llm = ScriptedLlm {
        fail_segments: true,
        ..ScriptedLlm::new()
    };

    let result = run_pipeline(
        "https://youtu.be/abc123",
        options(out.path()),
        &fetcher,
        &llm,
        None,
    )
    .await;

    assert!(matches!(
        result,
        Err(VidsumError::Llm(LlmError::Api { status: 401, .. }))
    ));
    assert!(llm.prompts().iter().all(|p| !p.contains("【主要主题】")));
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn obsidian_failure_does_not_fail_the_run() {
    let out = tempfile::tempdir().unwrap();
    let fetcher = StubFetcher::new(Some(600.0), uniform_captions(10, 60.0));
    let llm = ScriptedLlm::new();
    let mut opts = options(out.path());
    opts.obsidian = Some(ObsidianConfig::new(out.path().join("no-such-vault")));

    let ctx = run_pipeline("https://youtu.be/abc123", opts, &fetcher, &llm, None)
        .await
        .unwrap();

    let outputs = ctx.outputs.unwrap();
    assert!(outputs.markdown_path.exists());
    assert!(outputs.obsidian_path.is_none());
}

#[tokio::test]
async fn obsidian_note_is_written_when_vault_exists() {
    let out = tempfile::tempdir().unwrap();
    let vault = tempfile::tempdir().unwrap();
    let fetcher = StubFetcher::new(Some(600.0), uniform_captions(10, 60.0));
    let llm = ScriptedLlm::new();
    let mut opts = options(out.path());
    opts.obsidian = Some(ObsidianConfig::new(vault.path()));

    let ctx = run_pipeline("https://youtu.be/abc123", opts, &fetcher, &llm, None)
        .await
        .unwrap();

    let note = ctx.outputs.unwrap().obsidian_path.unwrap();
    assert!(note.starts_with(vault.path()));
    assert!(
        std::fs::read_to_string(note)
            .unwrap()
            .starts_with("---\ntitle: \"Rust Ownership Explained\"")
    );
}

#[tokio::test]
async fn unsupported_url_never_reaches_the_fetcher() {
    let out = tempfile::tempdir().unwrap();
    let fetcher = StubFetcher::new(None, Vec::new());
    let llm = ScriptedLlm::new();

    let result = run_pipeline(
        "https://vimeo.com/42",
        options(out.path()),
        &fetcher,
        &llm,
        None,
    )
    .await;

    assert!(matches!(
        result,
        Err(VidsumError::UnsupportedPlatform { .. })
    ));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    assert!(llm.prompts().is_empty());
}
