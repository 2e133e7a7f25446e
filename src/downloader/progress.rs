use regex::Regex;

/// Prefix yt-dlp puts in front of download progress lines.
pub const PROGRESS_TAG: &str = "[download]";

const REJECTED_TITLE_PREFIXES: [&str; 3] = ["http", "www.", "Destination"];
const REJECTED_TITLE_SUFFIXES: [&str; 4] = [".m4a", ".mp4", ".mp3", ".webm"];

lazy_static::lazy_static! {
    static ref PERCENT_RE: Regex = Regex::new(r"\s*(\d+(?:\.\d+)?)%").unwrap();
    // Tried in order; the first acceptable capture wins.
    static ref TITLE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"\[download\] Downloading video: (.+)").unwrap(),
        Regex::new(r"\[download\] (.+?)(?:\s+\[|$)").unwrap(),
        Regex::new(r"Downloading: (.+?)(?:\s+\[|$)").unwrap(),
        Regex::new(r"\[info\] (.+?):").unwrap(),
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    Progress(f32),
    Info(String),
}

/// Classifies one line of yt-dlp output. Never fails: anything that is not a
/// recognisable progress line is informational.
pub fn classify(line: &str) -> LineKind {
    if let Some(rest) = line.strip_prefix(PROGRESS_TAG) {
        if let Some(percent) = PERCENT_RE
            .captures(rest)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f32>().ok())
        {
            return LineKind::Progress(percent.clamp(0.0, 100.0));
        }
    }
    LineKind::Info(line.to_string())
}

/// Best-effort title extraction from an informational line.
pub fn infer_title(line: &str) -> Option<String> {
    TITLE_PATTERNS
        .iter()
        .filter_map(|re| re.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim()))
        .find(|candidate| is_acceptable_title(candidate))
        .map(str::to_string)
}

fn is_acceptable_title(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.chars().count() > 5
        && !REJECTED_TITLE_PREFIXES.iter().any(|p| candidate.starts_with(p))
        && !REJECTED_TITLE_SUFFIXES.iter().any(|s| candidate.ends_with(s))
}
