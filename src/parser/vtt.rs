use std::sync::LazyLock;

use regex::Regex;

static CUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)(\d{2}:\d{2}:\d{2}\.\d{3})\s*-->\s*(\d{2}:\d{2}:\d{2}\.\d{3})\n(.+?)(?:\n\n|\n?$)",
    )
    .unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// One timed caption interval, in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Parse a WebVTT track into cues, in source order.
///
/// The track may still carry the `\n` / `\\` escapes of the JS payload it was
/// lifted from; those are undone first. Markup inside cue text is dropped.
pub fn parse_vtt(vtt: &str) -> Vec<Cue> {
    if vtt.is_empty() {
        return Vec::new();
    }

    let text = vtt.replace("\\n", "\n").replace("\\\\", "\\");

    CUE_RE
        .captures_iter(&text)
        .filter_map(|caps| {
            let start = timestamp_to_seconds(&caps[1])?;
            let end = timestamp_to_seconds(&caps[2])?;
            let caption = TAG_RE.replace_all(&caps[3], "").trim().to_string();
            Some(Cue {
                start,
                end,
                text: caption,
            })
        })
        .collect()
}

/// `HH:MM:SS.mmm` to seconds.
fn timestamp_to_seconds(ts: &str) -> Option<f64> {
    let mut parts = ts.splitn(3, ':');
    let h: u32 = parts.next()?.parse().ok()?;
    let m: u32 = parts.next()?.parse().ok()?;
    let s: f64 = parts.next()?.parse().ok()?;
    Some(f64::from(h) * 3600.0 + f64::from(m) * 60.0 + s)
}

// ── Tests ──
