//! Repairs raw caption timing into an ordered, overlap-free fragment list.
//!
//! Caption sources disagree on field names and units, so every timing field
//! is probed from an ordered list of `(name, unit)` candidates against a
//! generic JSON record. Nothing outside this module sees the raw shape.

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::CaptionFragment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeUnit {
    Seconds,
    Millis,
}

impl TimeUnit {
    fn to_seconds(self, value: f64) -> f64 {
        match self {
            TimeUnit::Seconds => value,
            TimeUnit::Millis => value / 1000.0,
        }
    }
}

const START_FIELDS: &[(&str, TimeUnit)] = &[
    ("start_ms", TimeUnit::Millis),
    ("startMs", TimeUnit::Millis),
    ("start_time_ms", TimeUnit::Millis),
    ("startTimeMs", TimeUnit::Millis),
    ("tStartMs", TimeUnit::Millis),
    ("start", TimeUnit::Seconds),
    ("startTime", TimeUnit::Seconds),
    ("start_offset_ms", TimeUnit::Millis),
    ("startOffsetMs", TimeUnit::Millis),
    ("begin_time_ms", TimeUnit::Millis),
    ("beginTimeMs", TimeUnit::Millis),
    ("from", TimeUnit::Seconds),
    ("offset", TimeUnit::Seconds),
    ("time", TimeUnit::Seconds),
];

const END_FIELDS: &[(&str, TimeUnit)] = &[
    ("end_ms", TimeUnit::Millis),
    ("endMs", TimeUnit::Millis),
    ("end_time_ms", TimeUnit::Millis),
    ("endTimeMs", TimeUnit::Millis),
    ("end", TimeUnit::Seconds),
    ("endTime", TimeUnit::Seconds),
    ("end_offset_ms", TimeUnit::Millis),
    ("endOffsetMs", TimeUnit::Millis),
    ("to", TimeUnit::Seconds),
];

const DURATION_FIELDS: &[(&str, TimeUnit)] = &[
    ("duration_ms", TimeUnit::Millis),
    ("durationMs", TimeUnit::Millis),
    ("dDurationMs", TimeUnit::Millis),
    ("duration", TimeUnit::Seconds),
    ("dur", TimeUnit::Seconds),
];

const MIN_ESTIMATED_SECONDS: f64 = 2.0;
const MAX_ESTIMATED_SECONDS: f64 = 10.0;
const SECONDS_PER_CHAR: f64 = 0.05;
const UNKNOWN_DURATION_CEILING: f64 = 7200.0;
const CEILING_FACTOR: f64 = 1.5;
const FALLBACK_SPACING: f64 = 3.0;

/// Parse `SS.sss`, `MM:SS.sss` or `HH:MM:SS.sss`. Anything else is `0`.
pub fn parse_time_string(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ':' || *c == '.')
        .collect();
    let parts: Vec<&str> = cleaned.split(':').collect();

    let secs = |s: &str| s.parse::<f64>().unwrap_or(0.0);
    let whole = |s: &str| s.split('.').next().unwrap_or("").parse::<f64>().unwrap_or(0.0);

    match parts.as_slice() {
        [s] => secs(s),
        [m, s] => whole(m) * 60.0 + secs(s),
        [h, m, s] => whole(h) * 3600.0 + whole(m) * 60.0 + secs(s),
        _ => 0.0,
    }
}

fn probe(record: &Value, candidates: &[(&str, TimeUnit)], accept_strings: bool) -> Option<f64> {
    for (field, unit) in candidates {
        match record.get(field) {
            Some(Value::Number(n)) => {
                if let Some(v) = n.as_f64().filter(|v| v.is_finite()) {
                    return Some(unit.to_seconds(v));
                }
            }
            Some(Value::String(s)) if accept_strings => {
                // Bare numbers keep the field's unit; clock strings are always seconds.
                let value = match s.trim().parse::<f64>() {
                    Ok(v) if v.is_finite() => unit.to_seconds(v),
                    _ => parse_time_string(s),
                };
                if value > 0.0 {
                    return Some(value);
                }
            }
            _ => {}
        }
    }
    None
}

fn extract_text(record: &Value) -> Option<&str> {
    if let Some(s) = record.as_str() {
        return Some(s);
    }
    record
        .pointer("/snippet/text")
        .or_else(|| record.get("text"))
        .or_else(|| record.get("content"))
        .or_else(|| record.pointer("/transcript_segment/snippet/text"))
        .and_then(Value::as_str)
}

fn estimate_duration(text: &str) -> f64 {
    (text.chars().count() as f64 * SECONDS_PER_CHAR).clamp(MIN_ESTIMATED_SECONDS, MAX_ESTIMATED_SECONDS)
}

/// Turn heterogeneous caption records into clean fragments.
///
/// `true_duration` is the platform-reported video length, when known. It
/// bounds runaway cumulative time and rescales timestamps that overshoot it.
/// Records without any text are dropped; malformed timing is never an error.
pub fn normalize_captions(records: &[Value], true_duration: Option<f64>) -> Vec<CaptionFragment> {
    let true_duration = true_duration.filter(|d| *d > 0.0);
    let ceiling = true_duration
        .map(|d| d * CEILING_FACTOR)
        .unwrap_or(UNKNOWN_DURATION_CEILING);
    let total = records.len();

    let mut cumulative = 0.0_f64;
    let mut fragments: Vec<CaptionFragment> = Vec::with_capacity(total);

    for (index, record) in records.iter().enumerate() {
        let text = extract_text(record).unwrap_or("");

        let mut start = probe(record, START_FIELDS, true)
            .map(|s| s.max(0.0))
            .unwrap_or(cumulative);
        let mut end = match probe(record, END_FIELDS, true) {
            Some(end) => end,
            None => match probe(record, DURATION_FIELDS, false) {
                Some(duration) => start + duration,
                None => start + estimate_duration(text),
            },
        };

        cumulative = cumulative.max(end);
        if cumulative > ceiling {
            debug!(
                index,
                cumulative, ceiling, "cumulative caption time out of range, re-anchoring"
            );
            match true_duration {
                Some(duration) => {
                    let spacing = duration / total as f64;
                    start = index as f64 * spacing;
                    end = start + spacing;
                }
                None => {
                    start = index as f64 * FALLBACK_SPACING;
                    end = start + MIN_ESTIMATED_SECONDS;
                }
            }
            cumulative = end;
        }

        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        fragments.push(CaptionFragment::new(start, end, text));
    }

    if let (Some(duration), Some(last)) = (true_duration, fragments.last()) {
        if last.end > duration {
            let scale = duration / last.end;
            warn!(
                caption_end = last.end,
                duration, scale, "captions overshoot the video length, rescaling"
            );
            for fragment in &mut fragments {
                fragment.start *= scale;
                fragment.end *= scale;
            }
        }
    }

    repair_overlaps(&mut fragments);
    fragments
}

/// Sort by start, clamp each start to the previous end and keep `end > start`.
pub fn repair_overlaps(fragments: &mut [CaptionFragment]) {
    fragments.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut previous_end: Option<f64> = None;
    for fragment in fragments.iter_mut() {
        if let Some(prev) = previous_end {
            if fragment.start < prev {
                fragment.start = prev;
            }
        }
        if fragment.end <= fragment.start {
            fragment.end = fragment.start + 1.0;
        }
        previous_end = Some(fragment.end);
    }
}
