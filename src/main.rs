mod config;
mod fetch;
mod media;
mod page;
mod parser;
mod scraper;
mod store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::warn;

use config::Settings;

#[derive(Parser)]
#[command(name = "nade_scraper", about = "CS2 grenade lineup scraper and gallery builder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape recommended smokes per map into the data directory
    Scrape {
        /// Maps to scrape (default: the configured active-duty list)
        #[arg(long, num_args = 1..)]
        maps: Option<Vec<String>>,
        /// Output directory for nades.json and media
        #[arg(long, default_value = "data")]
        outdir: PathBuf,
    },
    /// Render the static gallery page from scraped data
    Build {
        /// Directory containing nades.json
        #[arg(long, default_value = "data")]
        data: PathBuf,
        /// Output HTML file
        #[arg(long, default_value = "index.html")]
        out: PathBuf,
    },
    /// Show counts per map and side
    Stats {
        /// Directory containing nades.json
        #[arg(long, default_value = "data")]
        data: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = match cli.command {
        Commands::Scrape { maps, outdir } => {
            let maps = maps.unwrap_or_else(|| settings.maps.clone());
            for m in maps.iter().filter(|m| !settings.is_known_map(m)) {
                warn!("{} is not in the configured map list", m);
            }
            println!("Scraping {} maps into {}...", maps.len(), outdir.display());
            scraper::scrape_all(Arc::new(settings), &outdir, &maps)
                .await
                .map(|_| ())
        }
        Commands::Build { data, out } => {
            let count = page::build_html(&data, &out, &settings)?;
            println!("Wrote {} ({} lineups)", out.display(), count);
            Ok(())
        }
        Commands::Stats { data } => {
            let records = store::load(&store::nades_path(&data))?;
            if records.is_empty() {
                println!("No nades in {}. Run 'scrape' first.", data.display());
                return Ok(());
            }
            let s = store::get_stats(&records, &settings);
            println!("Total:      {}", s.total);
            for (map, count) in &s.by_map {
                println!("  {:<10} {}", map, count);
            }
            println!("T side:     {}", s.t_side);
            println!("CT side:    {}", s.ct_side);
            println!("With media: {}", s.with_media);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

// ── Tests ──
