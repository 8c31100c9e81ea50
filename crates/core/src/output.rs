use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use tokio::fs;
use tracing::info;

use crate::error::Result;

const THEME_MAX_CHARS: usize = 30;
/// Byte budget for a file name stem, leaving room for suffixes such as
/// `_summary.md` under the usual 255-byte file name limit.
pub const FILE_STEM_MAX_BYTES: usize = 200;

/// Patterns stripped from a title before it becomes a folder name, with
/// their replacement.
static THEME_NOISE: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"【.*?】", ""),
        (r"\[.*?\]", ""),
        (r"\(.*?\)", ""),
        (r"第\d+期", ""),
        (r"(?i)S\d+E\d+", ""),
        (r"(?i)EP\d+", ""),
        (r"\d{4}年\d{1,2}月\d{1,2}日", ""),
        (r"\d{4}-\d{1,2}-\d{1,2}", ""),
        (r"\d{1,2}:\d{2}:\d{2}", ""),
        (r"[|｜：:，,]", " "),
        (r"\s+", " "),
    ]
    .into_iter()
    .filter_map(|(pattern, with)| Regex::new(pattern).ok().map(|re| (re, with)))
    .collect()
});

pub struct OutputPaths {
    pub output_dir: PathBuf,
    pub markdown_path: PathBuf,
}

/// Replace characters that are invalid in file names on common platforms.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string();
    truncate_to_bytes(&cleaned, FILE_STEM_MAX_BYTES).trim_end().to_string()
}

/// Longest prefix of `text` that fits in `max_bytes` without splitting a char.
pub fn truncate_to_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Short folder-friendly theme derived from a video title.
pub fn extract_video_theme(title: &str) -> String {
    let mut theme = title.to_string();
    for (re, with) in THEME_NOISE.iter() {
        theme = re.replace_all(&theme, *with).into_owned();
    }
    let mut theme = theme.trim().to_string();

    if theme.chars().count() < 5 {
        theme = title.trim().to_string();
    }

    if theme.chars().count() > THEME_MAX_CHARS {
        let cut: String = theme.chars().take(THEME_MAX_CHARS).collect();
        theme = match cut.rsplit_once(' ') {
            // drop the word the cut went through
            Some((head, _)) if !head.trim().is_empty() => head.to_string(),
            _ => cut,
        };
    }

    theme.trim().to_string()
}

/// Create `<base>/<theme>/` and return where the summary goes inside it.
pub async fn create_output_structure(
    base_dir: &Path,
    title: &str,
    video_id: &str,
) -> Result<OutputPaths> {
    let mut folder = sanitize_file_name(&extract_video_theme(title));
    if folder.chars().count() < 3 {
        folder = sanitize_file_name(video_id);
    }

    let output_dir = base_dir.join(folder);
    let markdown_path = output_dir.join(format!("{}_summary.md", sanitize_file_name(title)));
    fs::create_dir_all(&output_dir).await?;

    Ok(OutputPaths {
        output_dir,
        markdown_path,
    })
}

pub async fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, content).await?;
    info!(path = %path.display(), "file written");
    Ok(())
}
