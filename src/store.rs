use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::Settings;

pub const NADES_FILE: &str = "nades.json";

/// One scraped lineup, as persisted in `nades.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NadeRecord {
    pub slug: String,
    pub map: String,
    pub team: Option<String>,
    #[serde(rename = "type")]
    pub nade_type: String,
    #[serde(rename = "titleFrom")]
    pub title_from: Option<String>,
    #[serde(rename = "titleTo")]
    pub title_to: Option<String>,
    pub technique: Option<String>,
    pub movement: Option<String>,
    pub console: Option<String>,
    pub asset_id: Option<String>,
    pub video_url: Option<String>,
    pub lineup_url: Option<String>,
    pub source_url: String,
    #[serde(default)]
    pub captions: Vec<String>,
}

/// `(map, slug)`: slugs are only unique within a map.
pub type NadeKey = (String, String);

impl NadeRecord {
    pub fn key(&self) -> NadeKey {
        (self.map.clone(), self.slug.clone())
    }

    /// Directory holding this nade's stills, clips and lineup image.
    pub fn media_dir(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.map).join(&self.slug)
    }
}

pub fn nades_path(data_dir: &Path) -> PathBuf {
    data_dir.join(NADES_FILE)
}

/// Load the persisted records. A missing file is an empty store.
pub fn load(path: &Path) -> Result<Vec<NadeRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let records = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(records)
}

/// Overwrite `path` with the full record list.
pub fn save(path: &Path, records: &[NadeRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.flush()?;
    Ok(())
}

pub fn known_keys(records: &[NadeRecord]) -> HashSet<NadeKey> {
    records.iter().map(NadeRecord::key).collect()
}

/// Slugs already scraped for one map.
pub fn known_slugs_for_map(keys: &HashSet<NadeKey>, map: &str) -> HashSet<String> {
    keys.iter()
        .filter(|(m, _)| m == map)
        .map(|(_, slug)| slug.clone())
        .collect()
}

/// Append records whose key is not yet present. Returns how many were added.
pub fn merge(all: &mut Vec<NadeRecord>, new: Vec<NadeRecord>) -> usize {
    let mut keys = known_keys(all);
    let mut added = 0;
    for record in new {
        if keys.insert(record.key()) {
            all.push(record);
            added += 1;
        }
    }
    added
}

// ── Stats ──

#[derive(Debug, Default)]
pub struct Stats {
    pub total: usize,
    pub by_map: BTreeMap<String, usize>,
    pub t_side: usize,
    pub ct_side: usize,
    pub with_media: usize,
}

/// Maps outside the configured list are grouped under `unknown`.
pub fn map_bucket<'a>(map: &'a str, settings: &Settings) -> &'a str {
    if settings.is_known_map(map) {
        map
    } else {
        "unknown"
    }
}

pub fn get_stats(records: &[NadeRecord], settings: &Settings) -> Stats {
    let mut stats = Stats {
        total: records.len(),
        ..Default::default()
    };
    for r in records {
        *stats
            .by_map
            .entry(map_bucket(&r.map, settings).to_string())
            .or_default() += 1;
        match r.team.as_deref() {
            Some("t") => stats.t_side += 1,
            Some("ct") => stats.ct_side += 1,
            _ => {}
        }
        if r.asset_id.is_some() {
            stats.with_media += 1;
        }
    }
    stats
}

// ── Tests ──
