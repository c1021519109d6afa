use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;

use super::vtt::{parse_vtt, Cue};
use crate::config::Settings;
use crate::store::NadeRecord;

static CANONICAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<link[^>]+rel="canonical"[^>]+href="([^"]+)""#).unwrap());
static POSTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"poster="([^"]+)/thumbnail"#).unwrap());
static VTT_SRC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"src="data:text/vtt[^,"]*,([^"]+)""#).unwrap());

pub const TOOLTIP_TEAM: &str = "metadata-team";
pub const TOOLTIP_TECHNIQUE: &str = "metadata-technique";
pub const TOOLTIP_MOVEMENT: &str = "metadata-movement";
pub const TOOLTIP_CONSOLE: &str = "copy-console";

/// A detail page's fields plus the raw cues that later drive frame selection.
#[derive(Debug, Clone)]
pub struct NadeDetail {
    pub record: NadeRecord,
    pub cues: Vec<Cue>,
}

impl NadeDetail {
    /// Drop cue timings, keeping only caption text.
    pub fn into_record(self) -> NadeRecord {
        let mut record = self.record;
        record.captions = self.cues.into_iter().map(|c| c.text).collect();
        record
    }
}

pub struct DetailExtractor {
    settings: Settings,
    asset_prefix: String,
    title_re: Regex,
    team_re: Regex,
    technique_re: Regex,
    movement_re: Regex,
    console_re: Regex,
}

impl DetailExtractor {
    pub fn new(settings: &Settings) -> Result<Self, regex::Error> {
        let title_re = Regex::new(&format!(
            r"<title>(\w+)\s+(.+?)\s+from\s+(.+?)\s+\w+\s*-\s*{}",
            regex::escape(&settings.site_title_marker)
        ))?;
        Ok(DetailExtractor {
            settings: settings.clone(),
            asset_prefix: format!("{}/nades/", settings.asset_base_url),
            title_re,
            team_re: tooltip_regex(TOOLTIP_TEAM)?,
            technique_re: tooltip_regex(TOOLTIP_TECHNIQUE)?,
            movement_re: tooltip_regex(TOOLTIP_MOVEMENT)?,
            console_re: tooltip_regex(TOOLTIP_CONSOLE)?,
        })
    }

    /// Extract one nade from a detail page.
    ///
    /// Only the canonical link is required; without it map, type and slug are
    /// unknown and the page yields `None`. Every other field is optional.
    pub fn extract_nade_from_html(&self, html: &str) -> Option<NadeDetail> {
        let (map, type_plural, slug) = self.canonical_parts(html)?;
        let nade_type = type_plural
            .strip_suffix('s')
            .unwrap_or(type_plural)
            .to_string();

        let asset_id = self.asset_id(html);

        let cues = VTT_SRC_RE
            .captures(html)
            .map(|caps| parse_vtt(&percent_decode_str(&caps[1]).decode_utf8_lossy()))
            .unwrap_or_default();

        let (title_to, title_from) = match self.title_re.captures(html) {
            Some(caps) => (Some(caps[2].to_string()), Some(caps[3].to_string())),
            None => (None, None),
        };

        let record = NadeRecord {
            slug: slug.to_string(),
            map: map.to_string(),
            team: tooltip(html, &self.team_re),
            title_from,
            title_to,
            technique: tooltip(html, &self.technique_re),
            movement: tooltip(html, &self.movement_re),
            console: tooltip(html, &self.console_re),
            video_url: asset_id.as_deref().map(|id| self.settings.video_url(id)),
            lineup_url: asset_id.as_deref().map(|id| self.settings.lineup_url(id)),
            source_url: self.settings.source_url(map, &nade_type, slug),
            asset_id,
            nade_type,
            captions: Vec::new(),
        };

        Some(NadeDetail { record, cues })
    }

    /// `{base}/{map}/{typePlural}/{slug}` from the canonical link.
    fn canonical_parts<'a>(&self, html: &'a str) -> Option<(&'a str, &'a str, &'a str)> {
        let href = CANONICAL_RE.captures(html)?.get(1)?.as_str();
        let path = href
            .strip_prefix(self.settings.base_url.as_str())?
            .strip_prefix('/')?;
        let mut parts = path.splitn(3, '/');
        let map = parts.next().filter(|s| !s.is_empty())?;
        let type_plural = parts.next().filter(|s| !s.is_empty())?;
        let slug = parts.next().filter(|s| !s.is_empty())?;
        Some((map, type_plural, slug))
    }

    /// First video poster hosted on the asset host; its directory is the asset id.
    fn asset_id(&self, html: &str) -> Option<String> {
        POSTER_RE.captures_iter(html).find_map(|caps| {
            let id = caps.get(1)?.as_str().strip_prefix(&self.asset_prefix)?;
            (!id.is_empty() && !id.contains('/')).then(|| id.to_string())
        })
    }
}

/// Matches the `data-tooltip-content` of the element tagged with `tooltip_id`.
fn tooltip_regex(tooltip_id: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r#"data-tooltip-id="{}"[^>]*data-tooltip-content="([^"]*)""#,
        regex::escape(tooltip_id)
    ))
}

fn tooltip(html: &str, re: &Regex) -> Option<String> {
    re.captures(html).map(|caps| caps[1].to_string())
}

// ── Tests ──
