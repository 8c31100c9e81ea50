use crate::types::VideoReport;

/// Format seconds as MM:SS, or H:MM:SS past the hour
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}

/// Format seconds as e.g. `15m 30s` or `1h 02m`
pub fn format_duration_human(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{}h {:02}m", hours, mins)
    } else {
        format!("{}m {:02}s", mins, secs)
    }
}

pub fn time_range(start: f64, end: f64) -> String {
    format!("{} - {}", format_timestamp(start), format_timestamp(end))
}

pub fn render_markdown(report: &VideoReport) -> String {
    let mut output = String::new();
    output.push_str(&format!("# {}\n\n", report.title));
    output.push_str(&format!("**Video:** [{}]({})\n\n", report.url, report.url));
    output.push_str(&format!(
        "**Video ID:** `{}` | **Platform:** {}\n\n",
        report.video_id, report.platform
    ));
    output.push_str(&format!(
        "**Generated:** {}\n\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    if let Some(duration) = report.duration {
        output.push_str(&format!(
            "**Duration:** {}\n\n",
            format_duration_human(duration)
        ));
    }
    output.push_str(&format!("**Segments:** {}\n\n", report.segments.len()));

    let overall = &report.overall;
    output.push_str("## Overview\n\n");
    output.push_str(&format!("### Main theme\n\n{}\n\n", overall.main_theme));
    output.push_str("### Key points\n\n");
    for (i, point) in overall.key_points.iter().enumerate() {
        output.push_str(&format!("{}. {}\n", i + 1, point));
    }
    output.push('\n');
    output.push_str(&format!("### Summary\n\n{}\n\n", overall.full_summary));
    output.push_str(&format!("### Conclusion\n\n{}\n\n", overall.conclusion));

    if report.segments.is_empty() {
        return output;
    }

    output.push_str("## Contents\n\n");
    for (i, segment) in report.segments.iter().enumerate() {
        output.push_str(&format!(
            "{}. [{}](#segment-{})\n",
            i + 1,
            time_range(segment.start_time, segment.end_time),
            i + 1
        ));
    }
    output.push('\n');

    output.push_str("## Segments\n\n");
    for (i, segment) in report.segments.iter().enumerate() {
        let link = report
            .platform
            .timestamp_url(&report.video_id, segment.start_time);
        output.push_str(&format!("### Segment {}\n\n", i + 1));
        output.push_str(&format!(
            "**Time:** [{}]({})\n\n",
            time_range(segment.start_time, segment.end_time),
            link
        ));
        output.push_str(&format!("{}\n\n", segment.detailed_summary.trim()));
        output.push_str("---\n\n");
    }

    output
}
