//! Groups caption fragments into summarizable segments.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::{
    format::format_timestamp,
    types::{CaptionFragment, SegmentGroup},
};

pub const DEFAULT_MAX_WORDS_PER_SEGMENT: usize = 800;

// Tuned by hand; changing them changes where segments split.
const TOPIC_WINDOW_CHARS: usize = 200;
const TOPIC_MIN_WORD_CHARS: usize = 3;
const TOPIC_MIN_OVERLAP: f64 = 0.3;

const TRANSITION_SIGNALS: &[&str] = &[
    "now",
    "next",
    "let me",
    "moving on",
    "another",
    "also",
    "furthermore",
    "however",
    "but",
    "on the other hand",
    "meanwhile",
    "in contrast",
    "so",
    "therefore",
    "as a result",
    "consequently",
    "first",
    "second",
    "third",
    "finally",
    "lastly",
    "现在",
    "接下来",
    "然后",
    "另外",
    "此外",
    "但是",
    "然而",
    "同时",
    "因此",
    "所以",
    "首先",
    "其次",
    "第一",
    "第二",
    "第三",
    "最后",
    "总之",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationConfig {
    pub min_segment_minutes: f64,
    pub max_segment_minutes: f64,
    pub max_words_per_segment: usize,
    /// Platform-reported length, used when captions are missing.
    pub video_duration: Option<f64>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            min_segment_minutes: 4.0,
            max_segment_minutes: 15.0,
            max_words_per_segment: DEFAULT_MAX_WORDS_PER_SEGMENT,
            video_duration: None,
        }
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    let skip = count - n;
    let (idx, _) = text.char_indices().nth(skip).unwrap_or((0, ' '));
    &text[idx..]
}

fn long_words(text: &str) -> HashSet<&str> {
    text.split_whitespace()
        .filter(|w| w.chars().count() > TOPIC_MIN_WORD_CHARS)
        .collect()
}

/// Lexical guess at whether `incoming` starts a new topic.
///
/// Fires on any transition marker in the incoming text, otherwise when fewer
/// than 30% of the recent long words reappear in it.
pub fn detect_topic_change(accumulated: &str, incoming: &str) -> bool {
    let recent = tail_chars(accumulated, TOPIC_WINDOW_CHARS).to_lowercase();
    let incoming = incoming.to_lowercase();

    if TRANSITION_SIGNALS
        .iter()
        .any(|signal| incoming.contains(signal))
    {
        return true;
    }

    let recent_words = long_words(&recent);
    let incoming_words = long_words(&incoming);
    let shared = recent_words.intersection(&incoming_words).count();
    let overlap = shared as f64 / recent_words.len().max(1) as f64;

    overlap < TOPIC_MIN_OVERLAP
}

fn placeholder_text(start: f64, end: f64) -> String {
    format!(
        "Video segment {} - {} (no subtitles)",
        format_timestamp(start),
        format_timestamp(end)
    )
}

fn time_only_segments(duration: f64, config: &SegmentationConfig) -> Vec<SegmentGroup> {
    let step = (config.min_segment_minutes + config.max_segment_minutes) / 2.0 * 60.0;
    let mut segments = Vec::new();
    if step <= 0.0 {
        return segments;
    }

    let mut start = 0.0;
    while start < duration {
        let end = (start + step).min(duration);
        segments.push(SegmentGroup {
            start,
            end,
            text: placeholder_text(start, end),
            subtitle_count: 0,
        });
        start = end;
    }
    segments
}

struct OpenSegment {
    start: f64,
    end: f64,
    text: String,
    subtitle_count: usize,
}

impl OpenSegment {
    fn new(fragment: &CaptionFragment) -> Self {
        Self {
            start: fragment.start,
            end: fragment.end,
            text: fragment.text.trim().to_string(),
            subtitle_count: 1,
        }
    }

    fn push(&mut self, fragment: &CaptionFragment) {
        self.text.push(' ');
        self.text.push_str(fragment.text.trim());
        self.end = fragment.end;
        self.subtitle_count += 1;
    }

    fn close(self) -> SegmentGroup {
        SegmentGroup {
            start: self.start,
            end: self.end,
            text: self.text,
            subtitle_count: self.subtitle_count,
        }
    }
}

/// Partition fragments into segments bounded by time and word count, cutting
/// at topic changes once a segment is long enough.
///
/// Pure: identical input and config always yield identical output.
pub fn smart_segmentation(
    fragments: &[CaptionFragment],
    config: &SegmentationConfig,
) -> Vec<SegmentGroup> {
    let known_duration = config.video_duration.filter(|d| *d > 0.0);

    if fragments.is_empty() {
        return match known_duration {
            Some(duration) => {
                let segments = time_only_segments(duration, config);
                info!(
                    count = segments.len(),
                    "no subtitles, created time-based segments"
                );
                segments
            }
            None => {
                warn!("no subtitles and no known duration, nothing to segment");
                Vec::new()
            }
        };
    }

    let Some(first_index) = fragments.iter().position(CaptionFragment::has_text) else {
        let extent = fragments
            .iter()
            .map(|f| f.end)
            .fold(known_duration.unwrap_or(0.0), f64::max);
        warn!(extent, "subtitles carry no text, using one placeholder segment");
        if extent > 0.0 {
            return vec![SegmentGroup {
                start: 0.0,
                end: extent,
                text: placeholder_text(0.0, extent),
                subtitle_count: 0,
            }];
        }
        return Vec::new();
    };

    let min_seconds = config.min_segment_minutes * 60.0;
    let max_seconds = config.max_segment_minutes * 60.0;
    debug!(
        min_seconds,
        max_seconds,
        max_words = config.max_words_per_segment,
        "segmenting"
    );

    let mut segments = Vec::new();
    let mut current = OpenSegment::new(&fragments[first_index]);

    for fragment in fragments[first_index + 1..].iter().filter(|f| f.has_text()) {
        let duration = current.end - current.start;
        let words = word_count(&current.text);

        let boundary = duration >= max_seconds
            || words >= config.max_words_per_segment
            || (duration >= min_seconds && detect_topic_change(&current.text, &fragment.text));

        if boundary {
            debug!(
                start = %format_timestamp(current.start),
                end = %format_timestamp(current.end),
                duration,
                words,
                "closing segment"
            );
            let closed = std::mem::replace(&mut current, OpenSegment::new(fragment));
            segments.push(closed.close());
        } else {
            current.push(fragment);
        }
    }

    if !current.text.trim().is_empty() {
        segments.push(current.close());
    }

    if segments.is_empty() {
        warn!("segmentation produced nothing, forcing a single segment");
        let texts: Vec<&str> = fragments
            .iter()
            .filter(|f| f.has_text())
            .map(|f| f.text.trim())
            .collect();
        if let (Some(first), Some(last)) = (fragments.first(), fragments.last()) {
            if !texts.is_empty() {
                segments.push(SegmentGroup {
                    start: first.start,
                    end: last.end,
                    text: texts.join(" "),
                    subtitle_count: texts.len(),
                });
            }
        }
    }

    info!(count = segments.len(), "segmentation finished");
    segments
}

/// Fixed-length grouping without topic detection.
pub fn time_based_segmentation(
    fragments: &[CaptionFragment],
    segment_minutes: f64,
) -> Vec<SegmentGroup> {
    let Some(first) = fragments.first() else {
        return Vec::new();
    };
    let segment_seconds = segment_minutes * 60.0;

    let mut segments = Vec::new();
    let mut current = OpenSegment::new(first);

    for fragment in &fragments[1..] {
        if fragment.start >= current.start + segment_seconds {
            let closed = std::mem::replace(&mut current, OpenSegment::new(fragment));
            segments.push(closed.close());
        } else {
            current.push(fragment);
        }
    }

    if !current.text.trim().is_empty() {
        segments.push(current.close());
    }
    segments
}

/// Report problems without touching the segments.
pub fn validate_segments(segments: &[SegmentGroup]) -> Vec<String> {
    let mut problems = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        let n = i + 1;
        if segment.start < 0.0 {
            problems.push(format!("segment {n}: start time is negative"));
        }
        if segment.end <= segment.start {
            problems.push(format!("segment {n}: end time must be after start time"));
        }
        if segment.text.trim().is_empty() {
            problems.push(format!("segment {n}: text is empty"));
        }
        if segment.subtitle_count == 0 {
            problems.push(format!("segment {n}: has no subtitles"));
        }
    }

    for (i, pair) in segments.windows(2).enumerate() {
        if pair[0].end > pair[1].start {
            problems.push(format!("segments {} and {}: time ranges overlap", i + 1, i + 2));
        }
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEUTRAL: &str = "rust compiler checks every borrow carefully";

    fn config(min: f64, max: f64, words: usize) -> SegmentationConfig {
        SegmentationConfig {
            min_segment_minutes: min,
            max_segment_minutes: max,
            max_words_per_segment: words,
            video_duration: None,
        }
    }

    fn evenly_spaced(count: usize, step: f64, text: impl Fn(usize) -> String) -> Vec<CaptionFragment> {
        (0..count)
            .map(|i| CaptionFragment::new(i as f64 * step, (i + 1) as f64 * step, text(i)))
            .collect()
    }

    #[test]
    fn short_uniform_video_stays_one_segment() {
        let fragments = evenly_spaced(10, 60.0, |_| NEUTRAL.to_string());
        let segments = smart_segmentation(&fragments, &config(4.0, 15.0, 2000));

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[0].end, 600.0);
        assert_eq!(segments[0].subtitle_count, 10);
    }

    #[test]
    fn transition_word_after_min_duration_splits() {
        let fragments = evenly_spaced(70, 20.0, |i| {
            if i == 40 {
                "however the compiler rejects this program".to_string()
            } else {
                NEUTRAL.to_string()
            }
        });
        let segments = smart_segmentation(&fragments, &config(4.0, 15.0, 2000));

        assert!(segments.len() >= 2);
        assert_eq!(segments[0].end, 800.0);
        assert_eq!(segments[1].start, 800.0);
        assert_eq!(segments[0].subtitle_count, 40);
        assert_eq!(segments[1].subtitle_count, 30);
    }

    #[test]
    fn missing_captions_with_duration_get_placeholders() {
        let cfg = SegmentationConfig {
            video_duration: Some(930.0),
            ..config(4.0, 15.0, 800)
        };
        let segments = smart_segmentation(&[], &cfg);

        assert_eq!(segments.len(), 2);
        assert_eq!((segments[0].start, segments[0].end), (0.0, 570.0));
        assert_eq!((segments[1].start, segments[1].end), (570.0, 930.0));
        assert!(segments.iter().all(SegmentGroup::is_placeholder));
        assert!(segments[0].text.contains("no subtitles"));
    }

    #[test]
    fn missing_captions_without_duration_is_empty() {
        assert!(smart_segmentation(&[], &SegmentationConfig::default()).is_empty());
    }

    #[test]
    fn textless_fragments_become_one_placeholder() {
        let fragments = vec![
            CaptionFragment::new(0.0, 5.0, " "),
            CaptionFragment::new(5.0, 12.0, ""),
        ];
        let segments = smart_segmentation(&fragments, &SegmentationConfig::default());

        assert_eq!(segments.len(), 1);
        assert_eq!((segments[0].start, segments[0].end), (0.0, 12.0));
        assert_eq!(segments[0].subtitle_count, 0);
    }

    #[test]
    fn leading_blanks_are_skipped_and_not_counted() {
        let mut fragments = vec![CaptionFragment::new(0.0, 3.0, "")];
        fragments.extend(evenly_spaced(3, 3.0, |_| NEUTRAL.to_string()).into_iter().map(|mut f| {
            f.start += 3.0;
            f.end += 3.0;
            f
        }));
        let segments = smart_segmentation(&fragments, &SegmentationConfig::default());

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, 3.0);
        assert_eq!(segments[0].subtitle_count, 3);
    }

    #[test]
    fn hard_caps_close_segments() {
        let fragments = evenly_spaced(6, 100.0, |_| NEUTRAL.to_string());
        let by_time = smart_segmentation(&fragments, &config(10.0, 3.0, 10_000));
        assert_eq!(by_time.len(), 3);
        assert!(by_time.iter().all(|s| s.duration() == 200.0));

        let by_words = smart_segmentation(&fragments, &config(60.0, 60.0, 12));
        // six words per fragment: the cap is reached after two fragments
        assert_eq!(by_words.len(), 3);
        assert!(by_words.iter().all(|s| s.subtitle_count == 2));
    }

    #[test]
    fn segments_are_contiguous_and_deterministic() {
        let fragments = evenly_spaced(120, 15.0, |i| match i % 7 {
            0 => "next we look at another topic".to_string(),
            _ => format!("{NEUTRAL} number{i}"),
        });
        let cfg = config(2.0, 6.0, 500);
        let first = smart_segmentation(&fragments, &cfg);
        let second = smart_segmentation(&fragments, &cfg);

        assert_eq!(first, second);
        assert!(validate_segments(&first).is_empty());
        for pair in first.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        let total: usize = first.iter().map(|s| s.subtitle_count).sum();
        assert_eq!(total, 120);
    }

    #[test]
    fn topic_change_on_signal_or_low_overlap() {
        assert!(detect_topic_change(NEUTRAL, "Now for something else"));
        assert!(detect_topic_change("讲解内存模型", "接下来我们看并发"));
        assert!(!detect_topic_change(NEUTRAL, NEUTRAL));
        assert!(detect_topic_change(NEUTRAL, "entirely different vocabulary here"));
        // only the last 200 characters of context count
        let padded = format!("{NEUTRAL} {}", "padding ".repeat(40));
        assert!(detect_topic_change(&padded, NEUTRAL));
    }

    #[test]
    fn time_based_grouping() {
        let fragments = evenly_spaced(10, 30.0, |_| NEUTRAL.to_string());
        let segments = time_based_segmentation(&fragments, 2.0);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].start, 120.0);
        assert!(time_based_segmentation(&[], 2.0).is_empty());
    }

    #[test]
    fn validation_flags_problems() {
        let segments = vec![
            SegmentGroup {
                start: -1.0,
                end: 10.0,
                text: "a".into(),
                subtitle_count: 1,
            },
            SegmentGroup {
                start: 5.0,
                end: 5.0,
                text: " ".into(),
                subtitle_count: 0,
            },
        ];
        let problems = validate_segments(&segments);
        assert_eq!(problems.len(), 5);
        assert!(problems.iter().any(|p| p.contains("overlap")));
    }
}
