//! Static gallery page: one self-contained HTML file over `nades.json`.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use html_escape::{encode_quoted_attribute as attr, encode_text as text};
use tracing::info;

use crate::config::Settings;
use crate::store::{self, NadeRecord};

const SIDES: &[&str] = &["t", "ct"];

fn technique_label(technique: &str) -> &str {
    match technique {
        "left" => "Left Click",
        "right" => "Right Click",
        "left_jump" => "Jump Throw",
        "right_jump" => "Right + Jump",
        "left_right" => "Left + Right",
        "run_left" => "Run + Left",
        "run_right" => "Run + Right",
        "run_left_jump" => "Run + Jump",
        other => other,
    }
}

fn side_label(side: &str) -> &'static str {
    match side {
        "t" => "T",
        "ct" => "CT",
        _ => "?",
    }
}

/// How the page refers to the data directory: relative to the page when the
/// data directory sits under it, otherwise as given.
fn media_prefix(data_dir: &Path, output: &Path) -> String {
    let rel = match output.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => data_dir.strip_prefix(parent).unwrap_or(data_dir),
        None => data_dir,
    };
    let s = rel.to_string_lossy().replace('\\', "/");
    s.trim_end_matches('/').to_string()
}

/// Sort by map order (unknown maps last), then destination, then origin.
pub fn sort_nades(nades: &mut [NadeRecord], settings: &Settings) {
    nades.sort_by(|a, b| {
        let key = |n: &NadeRecord| {
            (
                settings.map_rank(&n.map),
                n.title_to.clone().unwrap_or_default(),
                n.title_from.clone().unwrap_or_default(),
            )
        };
        key(a).cmp(&key(b))
    });
}

pub fn build_card_html(n: &NadeRecord, prefix: &str) -> String {
    let side = n.team.as_deref().unwrap_or("");
    let title = format!(
        "{} from {}",
        n.title_to.as_deref().unwrap_or("?"),
        n.title_from.as_deref().unwrap_or("?")
    );
    let base = attr(&format!("{}/{}/{}", prefix, n.map, n.slug)).into_owned();

    let technique_tag = match n.technique.as_deref() {
        Some(t) if !t.is_empty() => {
            format!(r#"<span class="tag">{}</span>"#, text(technique_label(t)))
        }
        _ => String::new(),
    };
    let movement_tag = match n.movement.as_deref() {
        Some(m) if !m.is_empty() && m != "stationary" => {
            format!(r#"<span class="tag">{}</span>"#, text(m))
        }
        _ => String::new(),
    };
    let console_block = match n.console.as_deref() {
        Some(cmd) if !cmd.is_empty() => format!(
            r#"<code class="console-cmd" title="Click to copy">{}</code>"#,
            text(cmd)
        ),
        _ => String::new(),
    };

    let caption = |i: usize, fallback: &str| {
        text(n.captions.get(i).map(String::as_str).unwrap_or(fallback)).into_owned()
    };
    let frame = |name: &str, label: String| {
        format!(
            r#"<div class="frame">
        <img src="{base}/{name}_thumb.jpg" data-full="{base}/{name}.jpg" alt="{name}" loading="lazy"
             onerror="this.onerror=null;this.src=this.dataset.full">
        <p>{label}</p>
      </div>"#
        )
    };

    format!(
        r#"<div class="nade-card" data-map="{map_attr}" data-side="{side_attr}">
  <div class="card-header" onclick="toggleCard(this)">
    <img class="card-thumb" src="{base}/lineup.webp" alt="{title_attr}" loading="lazy"
         onerror="this.onerror=null;this.src='{base}/aim.jpg'">
    <div class="card-info">
      <h3>{title_text}</h3>
      <span class="tag map-{map_attr}">{map_text}</span>
      <span class="tag side-{side_attr}">{side_label}</span>
      {technique_tag}
      {movement_tag}
    </div>
    <span class="card-chevron">&#9660;</span>
  </div>
  <div class="card-detail" style="display:none">
    <div class="frames">
      {position}
      {aim}
      {result}
      <div class="frame">
        <video class="clip" src="{base}/result_thumb.mp4" data-full="{base}/result.mp4" muted loop playsinline preload="none"></video>
        <p>Result clip</p>
      </div>
    </div>
    {console_block}
    <a class="source-link" href="{source}" target="_blank" rel="noopener">View source &#8599;</a>
  </div>
</div>"#,
        map_attr = attr(&n.map),
        map_text = text(&n.map),
        side_attr = attr(side),
        side_label = side_label(side),
        title_attr = attr(&title),
        title_text = text(&title),
        position = frame("position", caption(0, "Position")),
        aim = frame("aim", caption(1, "Aim")),
        result = frame("result", "Result".to_string()),
        source = attr(&n.source_url),
    )
}

pub fn build_page(nades: &[NadeRecord], settings: &Settings, prefix: &str) -> String {
    let mut maps_present: Vec<&str> = nades.iter().map(|n| n.map.as_str()).collect();
    maps_present.sort_by_key(|m| (settings.map_rank(m), *m));
    maps_present.dedup();

    let mut map_buttons = String::new();
    for m in &maps_present {
        let _ = writeln!(
            map_buttons,
            r#"  <button class="filter-btn" data-filter-map="{a}" onclick="toggleFilter(this, 'map', '{a}')">{t}</button>"#,
            a = attr(m),
            t = text(m),
        );
    }
    let mut side_buttons = String::new();
    for s in SIDES {
        let _ = writeln!(
            side_buttons,
            r#"  <button class="filter-btn" data-filter-side="{s}" onclick="toggleFilter(this, 'side', '{s}')">{}</button>"#,
            side_label(s)
        );
    }

    let cards = nades
        .iter()
        .map(|n| build_card_html(n, prefix))
        .collect::<Vec<_>>()
        .join("\n");
    let total = nades.len();
    let origin_attr = attr(&settings.base_url);
    let origin_text = text(&settings.base_url);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<meta name="robots" content="noindex, nofollow">
<title>CS2 Grenade Lineups</title>
<style>
{STYLE}
</style>
</head>
<body>

<h1>CS2 Grenade Lineups</h1>
<p class="subtitle">Recommended lineups scraped from <a href="{origin_attr}">{origin_text}</a></p>

<div class="filters">
  <span class="filter-label">Map:</span>
{map_buttons}  <div class="filter-sep"></div>
  <span class="filter-label">Side:</span>
{side_buttons}</div>

<p class="count"><span id="visible-count">{total}</span> / {total} lineups</p>

<div id="cards">
{cards}
</div>

<div id="modal" class="modal hidden" onclick="closeModal()">
  <img id="modal-img" alt="">
  <video id="modal-video" controls loop playsinline></video>
</div>

<script>
{SCRIPT}
</script>
</body>
</html>
"#
    )
}

/// Read `{data_dir}/nades.json` and write the gallery to `output`.
pub fn build_html(data_dir: &Path, output: &Path, settings: &Settings) -> Result<usize> {
    let nades_file = store::nades_path(data_dir);
    if !nades_file.exists() {
        anyhow::bail!("{} not found; run `scrape` first", nades_file.display());
    }
    let mut nades = store::load(&nades_file)?;
    sort_nades(&mut nades, settings);

    let html = build_page(&nades, settings, &media_prefix(data_dir, output));

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(output, html)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!("Generated {} with {} lineups", output.display(), nades.len());
    Ok(nades.len())
}

const STYLE: &str = r#"* { margin: 0; padding: 0; box-sizing: border-box; }
body { background: #0d1117; color: #e6edf3; font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Helvetica, Arial, sans-serif; padding: 1.5rem; max-width: 1200px; margin: 0 auto; }
h1 { font-size: 1.6rem; margin-bottom: 0.3rem; }
.subtitle { color: #8b949e; margin-bottom: 1.5rem; font-size: 0.9rem; }
.subtitle a { color: #58a6ff; text-decoration: none; }
.filters { margin-bottom: 1rem; display: flex; flex-wrap: wrap; gap: 0.5rem; align-items: center; }
.filter-label { color: #8b949e; font-size: 0.85rem; margin-right: 0.25rem; }
.filter-btn { background: #21262d; border: 1px solid #30363d; color: #e6edf3; padding: 0.3rem 0.75rem; border-radius: 1rem; cursor: pointer; font-size: 0.8rem; text-transform: capitalize; }
.filter-btn:hover { border-color: #58a6ff; }
.filter-btn.active { background: #1f6feb; border-color: #1f6feb; }
.filter-sep { width: 1px; height: 1.5rem; background: #30363d; margin: 0 0.25rem; }
.count { color: #8b949e; font-size: 0.85rem; margin-bottom: 1rem; }
.nade-card { background: #161b22; border: 1px solid #21262d; border-radius: 0.5rem; margin-bottom: 0.5rem; overflow: hidden; }
.nade-card.hidden { display: none; }
.card-header { display: flex; align-items: center; gap: 1rem; padding: 0.75rem; cursor: pointer; }
.card-header:hover { background: #1c2128; }
.card-thumb { width: 80px; height: 60px; object-fit: cover; border-radius: 0.25rem; flex-shrink: 0; }
.card-info { flex: 1; }
.card-info h3 { font-size: 0.95rem; margin-bottom: 0.3rem; }
.tag { display: inline-block; font-size: 0.7rem; padding: 0.15rem 0.5rem; border-radius: 1rem; background: #21262d; color: #8b949e; margin-right: 0.25rem; text-transform: capitalize; }
.side-t { background: #3d1f00; color: #f0883e; }
.side-ct { background: #0c2d6b; color: #58a6ff; }
.card-chevron { color: #484f58; font-size: 0.75rem; transition: transform 0.2s; flex-shrink: 0; }
.card-header.expanded .card-chevron { transform: rotate(180deg); }
.card-detail { padding: 1rem; border-top: 1px solid #21262d; }
.frames { display: grid; grid-template-columns: repeat(4, 1fr); gap: 0.75rem; margin-bottom: 0.75rem; }
.frame img, .frame video { width: 100%; border-radius: 0.25rem; cursor: zoom-in; }
.frame p { font-size: 0.8rem; color: #8b949e; margin-top: 0.25rem; text-align: center; }
.console-cmd { display: block; background: #0d1117; border: 1px solid #21262d; padding: 0.5rem; border-radius: 0.25rem; font-size: 0.75rem; color: #8b949e; word-break: break-all; margin-bottom: 0.5rem; cursor: pointer; }
.console-cmd:hover { color: #e6edf3; }
.source-link { font-size: 0.8rem; color: #58a6ff; text-decoration: none; }
.modal { position: fixed; inset: 0; background: rgba(0, 0, 0, 0.85); display: flex; align-items: center; justify-content: center; z-index: 10; cursor: zoom-out; }
.modal.hidden { display: none; }
.modal img, .modal video { max-width: 95vw; max-height: 90vh; border-radius: 0.25rem; }
@media (max-width: 600px) {
  .frames { grid-template-columns: 1fr 1fr; }
  .card-thumb { width: 60px; height: 45px; }
}"#;

const SCRIPT: &str = r#"const activeFilters = { map: new Set(), side: new Set() };

function toggleFilter(btn, type, value) {
  btn.classList.toggle("active");
  if (activeFilters[type].has(value)) {
    activeFilters[type].delete(value);
  } else {
    activeFilters[type].add(value);
  }
  applyFilters();
}

function applyFilters() {
  let visible = 0;
  document.querySelectorAll(".nade-card").forEach(card => {
    const mapMatch = activeFilters.map.size === 0 || activeFilters.map.has(card.dataset.map);
    const sideMatch = activeFilters.side.size === 0 || activeFilters.side.has(card.dataset.side);
    const show = mapMatch && sideMatch;
    card.classList.toggle("hidden", !show);
    if (show) visible++;
  });
  document.getElementById("visible-count").textContent = visible;
}

function toggleCard(header) {
  const detail = header.nextElementSibling;
  const isHidden = detail.style.display === "none";
  detail.style.display = isHidden ? "block" : "none";
  header.classList.toggle("expanded", isHidden);
  detail.querySelectorAll("video.clip").forEach(v => isHidden ? v.play() : v.pause());
}

const modal = document.getElementById("modal");
const modalImg = document.getElementById("modal-img");
const modalVideo = document.getElementById("modal-video");

function openModal(src, isVideo) {
  modalImg.style.display = isVideo ? "none" : "block";
  modalVideo.style.display = isVideo ? "block" : "none";
  if (isVideo) {
    modalVideo.src = src;
    modalVideo.play();
  } else {
    modalImg.src = src;
  }
  modal.classList.remove("hidden");
}

function closeModal() {
  modalVideo.pause();
  modalVideo.removeAttribute("src");
  modal.classList.add("hidden");
}

document.addEventListener("keydown", e => {
  if (e.key === "Escape") closeModal();
});

document.querySelectorAll(".frame img, .frame video").forEach(el => {
  el.addEventListener("click", e => {
    e.stopPropagation();
    openModal(el.dataset.full, el.tagName === "VIDEO");
  });
});

document.querySelectorAll(".console-cmd").forEach(el => {
  el.addEventListener("click", e => {
    e.stopPropagation();
    navigator.clipboard.writeText(el.textContent).then(() => {
      const orig = el.textContent;
      el.textContent = "Copied!";
      setTimeout(() => el.textContent = orig, 1500);
    });
  });
});"#;

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::record;

    #[test]
    fn card_escapes_markup() {
        let mut n = record("mirage", "a");
        n.title_to = Some(r#"<b>"A" & 'B'</b>"#.into());
        n.console = Some("echo <x>".into());
        n.captions = vec!["Stand 'here' & wait".into()];
        let html = build_card_html(&n, "data");

        assert!(!html.contains("<b>"));
        assert!(html.contains("&lt;b&gt;"));
        assert!(html.contains("echo &lt;x&gt;"));
        // attribute values cannot be closed early by either quote
        let alt = html
            .split(r#"alt=""#)
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap();
        assert!(alt.contains("&amp;"));
        assert!(!alt.contains('\''));
        assert!(html.contains("Stand 'here' &amp; wait"));
    }

    #[test]
    fn sorts_by_map_then_titles() {
        let settings = Settings::default();
        let mut a = record("nuke", "a");
        a.title_to = Some("Outside".into());
        let mut b = record("mirage", "b");
        b.title_to = Some("Window".into());
        let mut c = record("mirage", "c");
        c.title_to = Some("Jungle".into());
        let d = record("cache", "d");

        let mut nades = vec![a, b, c, d];
        sort_nades(&mut nades, &settings);
        let order: Vec<&str> = nades.iter().map(|n| n.slug.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "a", "d"]);
    }

    #[test]
    fn card_contents() {
        let mut n = record("mirage", "ticket-booth-from-tetris");
        n.title_from = Some("Tetris <roof>".into());
        let html = build_card_html(&n, "data");

        assert!(html.contains(r#"data-map="mirage""#));
        assert!(html.contains(r#"data-side="t""#));
        assert!(html.contains("Ticket Booth from Tetris &lt;roof&gt;"));
        assert!(html.contains("Jump Throw"));
        assert!(html.contains("data/mirage/ticket-booth-from-tetris/position_thumb.jpg"));
        assert!(html.contains("data/mirage/ticket-booth-from-tetris/result.mp4"));
        assert!(html.contains("console-cmd"));
        // stationary is not shown as a tag
        assert!(!html.contains(">stationary<"));
    }

    #[test]
    fn movement_tag_shown_when_moving() {
        let mut n = record("mirage", "a");
        n.movement = Some("walk".into());
        n.console = None;
        let html = build_card_html(&n, "data");
        assert!(html.contains(r#"<span class="tag">walk</span>"#));
        assert!(!html.contains("console-cmd"));
    }

    #[test]
    fn prefix_relative_to_page() {
        assert_eq!(media_prefix(Path::new("data"), Path::new("index.html")), "data");
        assert_eq!(media_prefix(Path::new("site/data"), Path::new("site/index.html")), "data");
        assert_eq!(media_prefix(Path::new("/srv/data"), Path::new("out/index.html")), "/srv/data");
    }

    #[test]
    fn build_writes_page() {
        let dir = std::env::temp_dir().join(format!("nade-page-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let data = dir.join("data");
        store::save(
            &store::nades_path(&data),
            &[record("mirage", "a"), record("nuke", "b")],
        )
        .unwrap();

        let out = dir.join("index.html");
        let count = build_html(&data, &out, &Settings::default()).unwrap();
        assert_eq!(count, 2);

        let html = std::fs::read_to_string(&out).unwrap();
        assert!(html.contains(r#"<span id="visible-count">2</span> / 2 lineups"#));
        assert!(html.contains(r#"data-filter-map="mirage""#));
        assert!(html.contains(r#"data-filter-map="nuke""#));
        assert!(!html.contains(r#"data-filter-map="dust2""#));
        assert!(html.contains(r#"src="data/mirage/a/lineup.webp""#));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn build_without_store_fails() {
        let dir = std::env::temp_dir().join(format!("nade-page-empty-{}", std::process::id()));
        assert!(build_html(&dir, &dir.join("index.html"), &Settings::default()).is_err());
    }
}
