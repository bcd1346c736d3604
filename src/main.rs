use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use release_tracker::config::Config;
use release_tracker::discover::{is_valid_nickname, Discovery};
use release_tracker::fetch::HttpFetcher;
use release_tracker::models::{ReleaseDenorm, ReleaseSummary};
use release_tracker::progress::format_duration;
use release_tracker::query::{default_since_date, releases_since};
use release_tracker::safety::validate_store_path;
use release_tracker::store::{canonical_nickname, Store};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "release-tracker")]
#[command(about = "Track new releases from followed Bandcamp artists")]
struct Args {
    /// TOML config file; flags below override its values
    #[arg(long, env = "RELEASE_TRACKER_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite store (.db, .sqlite or .sqlite3)
    #[arg(long, env = "RELEASE_TRACKER_DB")]
    db: Option<PathBuf>,

    /// Platform domain hosting artist subdomains
    #[arg(long)]
    domain: Option<String>,

    /// Release pages fetched concurrently per artist
    #[arg(long)]
    workers: Option<usize>,

    /// Hide progress bars (for cron and log files)
    #[arg(long)]
    log_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check every followed artist for new releases
    Update,

    /// Check a single artist, registering it if needed
    Discover { nickname: String },

    /// List releases dated on or after a day (default: this week's Monday)
    New {
        /// Date in format YYYYMMDD
        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Manage followed artists
    #[command(subcommand)]
    Artists(ArtistsCommand),
}

#[derive(Subcommand)]
enum ArtistsCommand {
    List {
        #[arg(long)]
        json: bool,
    },
    Add {
        nickname: String,
    },
    Remove {
        id: i64,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(db) = &args.db {
        config.store_location = db.clone();
    }
    if let Some(domain) = &args.domain {
        config.platform_domain = domain.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if args.log_only {
        config.progress = false;
    }
    Ok(config)
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_summaries(rows: &[ReleaseSummary]) {
    println!("{:<12} {:<24} {:<40} Link", "Released", "Artist", "Title");
    println!("{:-<120}", "");
    for row in rows {
        let date = row
            .release_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<12} {:<24} {:<40} {}", date, row.artist, row.title, row.link);
    }
    if rows.is_empty() {
        println!("No releases found.");
    }
}

fn print_new_releases(releases: &[ReleaseDenorm]) {
    for release in releases {
        let date = release
            .release_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown date".to_string());
        println!("{} - {} ({})", release.artist, release.title, date);
        println!("  {}", release.link);
        for track in &release.tracks {
            println!("  {:>3}. {} [{}]", track.number, track.title, track.duration);
        }
    }
    println!("{} new releases", releases.len());
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_tracing(&config.log_level);

    validate_store_path(&config.store_location)?;
    let store = Store::open(&config.store_location)
        .with_context(|| format!("Failed to open store {}", config.store_location.display()))?;
    store.ensure_schema().context("Failed to create store schema")?;

    match args.command {
        Command::Update => {
            let start = Instant::now();
            let fetcher = HttpFetcher::new(&config).context("Failed to build HTTP client")?;
            let mut discovery = Discovery::new(config, store, fetcher)?;
            let summary = discovery.update_all_known_artists()?;

            println!("\n{:=<60}", "");
            println!("Update complete!");
            println!("  Artists: {}", summary.artists);
            println!("  New releases: {}", summary.new_releases);
            if !summary.failed.is_empty() {
                println!("  Failed: {}", summary.failed.join(", "));
            }
            println!("  Elapsed: {}", format_duration(start.elapsed()));
            println!("{:=<60}", "");
        }
        Command::Discover { nickname } => {
            let fetcher = HttpFetcher::new(&config).context("Failed to build HTTP client")?;
            let mut discovery = Discovery::new(config, store, fetcher)?;
            let added = discovery
                .discover(&nickname)
                .with_context(|| format!("Discovery failed for {}", nickname))?;
            print_new_releases(&added);
        }
        Command::New { date, json } => {
            let date = date.unwrap_or_else(|| default_since_date(Local::now().date_naive()));
            let rows = releases_since(&store, &date)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("Releases since {}", date);
                print_summaries(&rows);
            }
        }
        Command::Artists(ArtistsCommand::List { json }) => {
            let artists = store.list_artists()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&artists)?);
            } else {
                for artist in &artists {
                    let checked = artist
                        .last_checked
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string());
                    println!("{} - {} ({})", artist.id, artist.nickname, checked);
                }
            }
        }
        Command::Artists(ArtistsCommand::Add { nickname }) => {
            let nickname = canonical_nickname(&nickname);
            if !is_valid_nickname(&nickname) {
                bail!("Invalid artist nickname '{}'", nickname);
            }
            let artist = store.add_artist(&nickname)?;
            println!("Artist '{}' added (id: {})", artist.nickname, artist.id);
        }
        Command::Artists(ArtistsCommand::Remove { id }) => {
            let name = store.get_artist(id)?.map(|a| a.nickname);
            if store.delete_artist(id)? {
                println!("Artist '{}' (id: {}) deleted", name.unwrap_or_default(), id);
            } else {
                bail!("Artist {} not found", id);
            }
        }
    }

    Ok(())
}
