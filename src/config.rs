use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Optional settings file, read from the working directory. Always TOML, so a
/// `nades.json` data file next to it is never mistaken for settings.
pub const SETTINGS_FILE: &str = "nades.toml";

/// Runtime settings. Loaded once in `main` and handed to every component.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub asset_base_url: String,
    pub site_title_marker: String,
    pub maps: Vec<String>,
    pub request_delay_ms: u64,
    pub http_timeout_secs: u64,
    pub min_nades_per_map: usize,
    pub user_agent: String,
    pub ffmpeg: String,
    pub thumb_width: u32,
    pub result_offset_secs: f64,
    pub clip_lead_secs: f64,
    pub clip_duration_secs: f64,
}

pub const ACTIVE_DUTY_MAPS: &[&str] = &[
    "mirage", "dust2", "inferno", "overpass", "ancient", "anubis", "nuke",
];

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_url: "https://csnades.gg".to_string(),
            asset_base_url: "https://assets.csnades.gg".to_string(),
            site_title_marker: "CSNADES".to_string(),
            maps: ACTIVE_DUTY_MAPS.iter().map(|m| m.to_string()).collect(),
            request_delay_ms: 1000,
            http_timeout_secs: 30,
            min_nades_per_map: 8,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            ffmpeg: "ffmpeg".to_string(),
            thumb_width: 400,
            result_offset_secs: 2.0,
            clip_lead_secs: 2.0,
            clip_duration_secs: 3.0,
        }
    }
}

impl Settings {
    /// Defaults, then optional `nades.toml`, then `NADES_*` environment variables.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(SETTINGS_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::File::new(&path.to_string_lossy(), config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("NADES")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("maps"),
            )
            .build()
            .context("Failed to read settings")?;

        let mut settings: Settings = settings
            .try_deserialize()
            .context("Invalid settings")?;
        settings.base_url = settings.base_url.trim_end_matches('/').to_string();
        settings.asset_base_url = settings.asset_base_url.trim_end_matches('/').to_string();
        Ok(settings)
    }

    pub fn listing_url(&self, map: &str) -> String {
        format!("{}/{}?recommended=true", self.base_url, map)
    }

    pub fn detail_url(&self, map: &str, slug: &str) -> String {
        format!("{}/{}/smokes/{}", self.base_url, map, slug)
    }

    pub fn source_url(&self, map: &str, nade_type: &str, slug: &str) -> String {
        format!("{}/{}/{}s/{}", self.base_url, map, nade_type, slug)
    }

    pub fn video_url(&self, asset_id: &str) -> String {
        format!("{}/nades/{}/hq.mp4", self.asset_base_url, asset_id)
    }

    pub fn lineup_url(&self, asset_id: &str) -> String {
        format!("{}/nades/{}/lineup.webp", self.asset_base_url, asset_id)
    }

    /// Position of `map` in the configured map order; unknown maps sort last.
    pub fn map_rank(&self, map: &str) -> usize {
        self.maps.iter().position(|m| m == map).unwrap_or(99)
    }

    pub fn is_known_map(&self, map: &str) -> bool {
        self.maps.iter().any(|m| m == map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_urls() {
        let s = Settings::default();
        assert_eq!(s.listing_url("mirage"), "https://csnades.gg/mirage?recommended=true");
        assert_eq!(
            s.detail_url("mirage", "ticket-booth-from-tetris"),
            "https://csnades.gg/mirage/smokes/ticket-booth-from-tetris"
        );
        assert_eq!(
            s.video_url("mirage-smoke-EHvVQ0Ebqm"),
            "https://assets.csnades.gg/nades/mirage-smoke-EHvVQ0Ebqm/hq.mp4"
        );
        assert_eq!(
            s.lineup_url("abc"),
            "https://assets.csnades.gg/nades/abc/lineup.webp"
        );
    }

    fn scratch(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("nade-config-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn data_file_is_not_read_as_settings() {
        let dir = scratch("json");
        std::fs::write(
            dir.join("nades.json"),
            r#"[{"slug":"a","map":"mirage","type":"smoke","source_url":"x"}]"#,
        )
        .unwrap();

        let s = Settings::load_from(&dir.join(SETTINGS_FILE)).unwrap();
        assert_eq!(s.min_nades_per_map, 8);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn toml_overrides_defaults() {
        let dir = scratch("toml");
        let path = dir.join(SETTINGS_FILE);
        std::fs::write(
            &path,
            "min_nades_per_map = 3\nbase_url = \"http://localhost:8080/\"\n",
        )
        .unwrap();

        let s = Settings::load_from(&path).unwrap();
        assert_eq!(s.min_nades_per_map, 3);
        assert_eq!(s.base_url, "http://localhost:8080");
        assert_eq!(s.thumb_width, 400);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unknown_maps_rank_last() {
        let s = Settings::default();
        assert_eq!(s.map_rank("mirage"), 0);
        assert_eq!(s.map_rank("nuke"), 6);
        assert_eq!(s.map_rank("cache"), 99);
        assert!(!s.is_known_map("cache"));
    }
}
