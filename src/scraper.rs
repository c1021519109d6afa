use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::fetch::Fetcher;
use crate::media::{MediaExtractor, MediaOutcome};
use crate::parser::{
    extract_beginner_smoke_slugs, extract_recommended_slugs, DetailExtractor, NadeDetail,
};
use crate::store::{self, NadeRecord};

/// Per-map run inputs. Built by the orchestrator, not persisted.
pub struct MapScrapeConfig {
    pub map: String,
    pub output_dir: PathBuf,
    pub existing_slugs: HashSet<String>,
}

/// Counts for one map, returned with its records.
#[derive(Debug, Default)]
pub struct ScrapeStats {
    pub total: usize,
    pub ok: usize,
    pub skipped_existing: usize,
    pub errors: usize,
}

pub struct MapScrapeResult {
    pub map: String,
    pub records: Vec<NadeRecord>,
    pub stats: ScrapeStats,
}

/// Beginner slugs first; below `min_count`, backfill from the full list in order.
pub fn select_slugs(beginner: &[String], all: &[String], min_count: usize) -> Vec<String> {
    if beginner.len() >= min_count {
        return beginner.to_vec();
    }

    let mut selected = beginner.to_vec();
    let mut seen: HashSet<&str> = beginner.iter().map(String::as_str).collect();
    for slug in all {
        if selected.len() >= min_count {
            break;
        }
        if seen.insert(slug.as_str()) {
            selected.push(slug.clone());
        }
    }
    selected
}

/// Owns everything one map worker needs. Nothing is shared with other workers.
pub struct MapScraper {
    settings: Arc<Settings>,
    fetcher: Fetcher,
    detail: DetailExtractor,
    media: MediaExtractor,
}

impl MapScraper {
    pub fn new(settings: Arc<Settings>) -> Result<Self> {
        let fetcher = Fetcher::new(&settings)?;
        let detail = DetailExtractor::new(&settings)?;
        let media = MediaExtractor::new(&settings);
        Ok(MapScraper {
            settings,
            fetcher,
            detail,
            media,
        })
    }

    /// Scrape one map sequentially. Only the listing fetch can fail the map;
    /// per-slug failures are logged and skipped.
    pub async fn scrape_map(&self, cfg: MapScrapeConfig) -> Result<MapScrapeResult> {
        let map = cfg.map.as_str();
        info!("Scraping {} (beginner-recommended smokes)", map);

        let list_url = self.settings.listing_url(map);
        info!("  Fetching {}", list_url);
        let html = self
            .fetcher
            .fetch_html(&list_url)
            .await
            .with_context(|| format!("Failed to fetch listing for {}", map))?;

        let beginner = extract_beginner_smoke_slugs(&html, &self.settings.maps);
        let all = extract_recommended_slugs(&html);
        let slugs = select_slugs(&beginner, &all, self.settings.min_nades_per_map);

        if beginner.len() < slugs.len() {
            info!(
                "  Found {} beginner smokes, filled to {} with recommended",
                beginner.len(),
                slugs.len()
            );
        } else {
            info!("  Found {} beginner-recommended smokes", slugs.len());
        }

        let mut stats = ScrapeStats {
            total: slugs.len(),
            ..Default::default()
        };
        let mut records = Vec::new();
        let delay = Duration::from_millis(self.settings.request_delay_ms);

        for (i, slug) in slugs.iter().enumerate() {
            let n = format!("[{}/{}]", i + 1, slugs.len());
            if cfg.existing_slugs.contains(slug) {
                info!("  {} {} -- already scraped, skipping", n, slug);
                stats.skipped_existing += 1;
                continue;
            }

            info!("  {} {}", n, slug);
            tokio::time::sleep(delay).await;

            match self.scrape_nade(map, slug, &cfg.output_dir).await {
                Ok(Some(record)) => {
                    stats.ok += 1;
                    records.push(record);
                }
                Ok(None) => stats.errors += 1,
                Err(e) => {
                    error!("    {} {}: {:#}", map, slug, e);
                    stats.errors += 1;
                }
            }
        }

        info!(
            "{}: {} slugs, {} new, {} already scraped, {} skipped",
            map, stats.total, stats.ok, stats.skipped_existing, stats.errors
        );
        Ok(MapScrapeResult {
            map: cfg.map.clone(),
            records,
            stats,
        })
    }

    /// FETCH_DETAIL -> EXTRACT -> FETCH_MEDIA -> ASSEMBLE for one slug.
    /// `Ok(None)` is a soft skip that has already been logged.
    async fn scrape_nade(
        &self,
        map: &str,
        slug: &str,
        output_dir: &Path,
    ) -> Result<Option<NadeRecord>> {
        let detail_url = self.settings.detail_url(map, slug);
        let html = self
            .fetcher
            .fetch_html(&detail_url)
            .await
            .context("fetching detail page")?;

        let Some(nade) = self.detail.extract_nade_from_html(&html) else {
            warn!("    could not extract nade data from {}", detail_url);
            return Ok(None);
        };
        if nade.cues.len() < 2 {
            warn!(
                "    {} caption cues on {}, need at least 2",
                nade.cues.len(),
                detail_url
            );
            return Ok(None);
        }

        let nade_dir = nade.record.media_dir(output_dir);
        if !self.fetch_media(&nade, &nade_dir).await? {
            return Ok(None);
        }

        Ok(Some(nade.into_record()))
    }

    /// Stills and clip from the video, then the lineup diagram. Returns
    /// `false` when the caption track is too short to place the frames.
    async fn fetch_media(&self, nade: &NadeDetail, nade_dir: &Path) -> Result<bool> {
        if let Some(video_url) = nade.record.video_url.as_deref() {
            let outcome = self
                .media
                .extract_lineup_frames(&self.fetcher, video_url, &nade.cues, nade_dir)
                .await
                .context("extracting frames")?;
            match outcome {
                MediaOutcome::Extracted(files) => info!(
                    "    wrote {} stills, {} thumbnails, {} and {}",
                    files.stills.len(),
                    files.thumbs.len(),
                    files.clip.display(),
                    files.clip_thumb.display()
                ),
                MediaOutcome::InsufficientCues(n) => {
                    warn!("    only {} caption cues, need at least 2", n);
                    return Ok(false);
                }
            }
        }

        if let Some(lineup_url) = nade.record.lineup_url.as_deref() {
            tokio::fs::create_dir_all(nade_dir).await?;
            if let Err(e) = self
                .fetcher
                .download_file(lineup_url, &nade_dir.join("lineup.webp"))
                .await
            {
                warn!("    could not download lineup diagram: {}", e);
            }
        }

        Ok(true)
    }
}

/// Scrape `maps` concurrently (one task per map), merge with the existing
/// `nades.json` under `output_dir`, and write it back.
pub async fn scrape_all(
    settings: Arc<Settings>,
    output_dir: &Path,
    maps: &[String],
) -> Result<Vec<NadeRecord>> {
    let nades_file = store::nades_path(output_dir);
    let mut all = store::load(&nades_file)?;
    let known = store::known_keys(&all);
    info!("Existing nades: {}", known.len());

    let pb = ProgressBar::new(maps.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} maps {msg}")?
            .progress_chars("=> "),
    );

    // Channel: map workers send results, this loop merges them
    let (tx, mut rx) =
        tokio::sync::mpsc::channel::<(String, Result<MapScrapeResult>)>(maps.len().max(1));

    for map in maps {
        let cfg = MapScrapeConfig {
            map: map.clone(),
            output_dir: output_dir.to_path_buf(),
            existing_slugs: store::known_slugs_for_map(&known, map),
        };
        let settings = Arc::clone(&settings);
        let tx = tx.clone();

        tokio::spawn(async move {
            let map = cfg.map.clone();
            let result = match MapScraper::new(settings) {
                Ok(scraper) => scraper.scrape_map(cfg).await,
                Err(e) => Err(e),
            };
            let _ = tx.send((map, result)).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut finished = HashSet::new();
    let mut added = 0usize;
    while let Some((map, result)) = rx.recv().await {
        match result {
            Ok(res) => {
                added += store::merge(&mut all, res.records);
                pb.set_message(format!(
                    "{} done ({} new, {} errors)",
                    res.map, res.stats.ok, res.stats.errors
                ));
            }
            Err(e) => {
                error!("Error scraping {}: {:#}", map, e);
                pb.set_message(format!("{} failed", map));
            }
        }
        finished.insert(map);
        pb.inc(1);
    }
    pb.finish_and_clear();

    for map in maps.iter().filter(|m| !finished.contains(*m)) {
        error!("Worker for {} ended without a result", map);
    }

    store::save(&nades_file, &all)?;
    info!("Added {} new nades", added);
    println!("Total nades: {} (saved to {})", all.len(), nades_file.display());
    Ok(all)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal origin on 127.0.0.1: serves the pages `routes` builds for its
    /// base URL by request path, 404 otherwise, and records every path asked for.
    async fn serve(
        routes: impl FnOnce(&str) -> HashMap<String, String>,
    ) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(Mutex::new(Vec::new()));
        let pages = Arc::new(routes(&base));

        let log = Arc::clone(&hits);
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let pages = Arc::clone(&pages);
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let n = sock.read(&mut buf).await.unwrap_or(0);
                    let req = String::from_utf8_lossy(&buf[..n]).into_owned();
                    let path = req.split_whitespace().nth(1).unwrap_or("/").to_string();
                    log.lock().unwrap().push(path.clone());

                    let (status, body) = match pages.get(&path) {
                        Some(body) => ("200 OK", body.clone()),
                        None => ("404 Not Found", String::new()),
                    };
                    let resp = format!(
                        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = sock.write_all(resp.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        (base, hits)
    }

    /// Escaped RSC listing that flags every slug as beginner.
    fn listing(slugs: &[&str]) -> String {
        slugs
            .iter()
            .enumerate()
            .map(|(i, slug)| {
                format!(
                    r#"{{\"id\":\"nade_{:02x}\",\"slug\":\"{}\",\"beginner\":true}}"#,
                    i, slug
                )
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The detail fixture re-homed on `base` under `slug`.
    fn detail_page(base: &str, slug: &str) -> String {
        std::fs::read_to_string("tests/fixtures/detail.html")
            .unwrap()
            .replace("https://csnades.gg", base)
            .replace("ticket-booth-from-tetris", slug)
    }

    fn names(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}-{}", prefix, i)).collect()
    }

    #[test]
    fn backfills_to_minimum() {
        let beginner = names("b", 5);
        let mut all = beginner.clone();
        all.extend(names("r", 15));
        assert_eq!(all.len(), 20);

        let selected = select_slugs(&beginner, &all, 8);
        assert_eq!(selected.len(), 8);
        assert_eq!(&selected[..5], &beginner[..]);
        assert_eq!(&selected[5..], &["r-0", "r-1", "r-2"]);
    }

    #[test]
    fn backfill_skips_overlaps_in_any_position() {
        let beginner = vec!["c".to_string(), "a".to_string()];
        let all: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        assert_eq!(select_slugs(&beginner, &all, 3), vec!["c", "a", "b"]);
    }

    #[test]
    fn enough_beginners_are_kept_as_is() {
        let beginner = names("b", 9);
        let selected = select_slugs(&beginner, &names("r", 20), 8);
        assert_eq!(selected, beginner);
    }

    #[test]
    fn exhausted_list_stays_short() {
        let beginner = names("b", 2);
        let all = vec!["b-0".to_string(), "x".to_string()];
        assert_eq!(select_slugs(&beginner, &all, 8), vec!["b-0", "b-1", "x"]);
    }

    #[tokio::test]
    async fn per_slug_outcomes() {
        let slugs = [
            "known",
            "ticket-booth-from-tetris",
            "broken",
            "no-canonical",
            "one-cue",
            "window-from-t-spawn",
        ];
        let (base, hits) = serve(|base| {
            let mut pages = HashMap::new();
            pages.insert("/mirage?recommended=true".to_string(), listing(&slugs));
            for slug in ["ticket-booth-from-tetris", "window-from-t-spawn"] {
                pages.insert(format!("/mirage/smokes/{}", slug), detail_page(base, slug));
            }
            pages.insert(
                "/mirage/smokes/no-canonical".to_string(),
                "<html><title>Nothing here</title></html>".to_string(),
            );
            pages.insert(
                "/mirage/smokes/one-cue".to_string(),
                format!(
                    r#"<link rel="canonical" href="{}/mirage/smokes/one-cue"><track src="data:text/vtt,WEBVTT%0A%0A00:00:00.500 --> 00:00:02.500%0AStand here">"#,
                    base
                ),
            );
            pages
        })
        .await;

        // Poster URLs in the fixture point at another host, so no asset id
        // is found and nothing is downloaded.
        let settings = Arc::new(Settings {
            base_url: base.clone(),
            asset_base_url: format!("{}/assets", base),
            request_delay_ms: 0,
            http_timeout_secs: 5,
            ..Settings::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let scraper = MapScraper::new(settings).unwrap();
        let result = scraper
            .scrape_map(MapScrapeConfig {
                map: "mirage".to_string(),
                output_dir: dir.path().to_path_buf(),
                existing_slugs: HashSet::from(["known".to_string()]),
            })
            .await
            .unwrap();

        let got: Vec<&str> = result.records.iter().map(|r| r.slug.as_str()).collect();
        assert_eq!(got, vec!["ticket-booth-from-tetris", "window-from-t-spawn"]);
        assert_eq!(result.stats.total, 6);
        assert_eq!(result.stats.ok, 2);
        assert_eq!(result.stats.skipped_existing, 1);
        assert_eq!(result.stats.errors, 3);

        let first = &result.records[0];
        assert_eq!(first.asset_id, None);
        assert_eq!(first.video_url, None);
        assert_eq!(first.lineup_url, None);
        assert_eq!(first.title_to.as_deref(), Some("Ticket Booth"));
        assert_eq!(first.captions.len(), 3);
        assert_eq!(
            result.records[1].source_url,
            format!("{}/mirage/smokes/window-from-t-spawn", base)
        );

        let hits = hits.lock().unwrap();
        assert!(!hits.iter().any(|p| p.contains("/known")));
        assert!(hits.iter().any(|p| p == "/mirage/smokes/broken"));
        assert!(!dir.path().join("mirage").exists());
    }

    #[tokio::test]
    async fn unreachable_origin_keeps_existing_records() {
        let dir = std::env::temp_dir().join(format!("nade-scrape-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let existing = vec![store::tests::record("mirage", "window")];
        store::save(&store::nades_path(&dir), &existing).unwrap();

        let settings = Arc::new(Settings {
            base_url: "http://127.0.0.1:9".to_string(),
            request_delay_ms: 0,
            http_timeout_secs: 2,
            ..Settings::default()
        });
        let maps = vec!["mirage".to_string(), "nuke".to_string()];
        let all = scrape_all(settings, &dir, &maps).await.unwrap();

        assert_eq!(all, existing);
        assert_eq!(store::load(&store::nades_path(&dir)).unwrap(), existing);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
