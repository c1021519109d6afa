//! Slug extraction from a map's listing page.
//!
//! The listing embeds its data as escaped JSON inside RSC push chunks, so in the
//! raw markup every quote is a literal `\"`. Both extractors match that text
//! shape directly; a change in the site's serialization silently yields fewer
//! (or no) slugs rather than an error.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static RECOMMENDED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\\"id\\":\\"nade_[a-f0-9]+\\",\\"slug\\":\\"([a-z0-9-]+)\\""#).unwrap()
});
static BEGINNER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\\"slug\\":\\"([a-z0-9-]+)\\".*?\\"beginner\\":(true|false)"#).unwrap()
});

/// Every nade slug on the page, first-seen order, no duplicates.
pub fn extract_recommended_slugs(html: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    RECOMMENDED_RE
        .captures_iter(html)
        .map(|caps| caps[1].to_string())
        .filter(|slug| seen.insert(slug.clone()))
        .collect()
}

/// Slugs flagged `beginner: true`, first-seen order, no duplicates.
///
/// Map objects carry a `slug` too; any slug equal to a known map name is dropped.
pub fn extract_beginner_smoke_slugs(html: &str, known_maps: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    BEGINNER_RE
        .captures_iter(html)
        .filter(|caps| &caps[2] == "true")
        .map(|caps| caps[1].to_string())
        .filter(|slug| !known_maps.iter().any(|m| m == slug))
        .filter(|slug| seen.insert(slug.clone()))
        .collect()
}

// ── Tests ──
