mod config;
mod db;
mod fetch;
mod parser;
mod pipeline;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::error;

use crate::config::Settings;
use crate::db::{Batch, RecordSink, SnapshotRow};
use crate::fetch::{Fetcher, PageSource};
use crate::parser::schema::PositionCodes;
use crate::parser::Extraction;
use crate::pipeline::{RunContext, Target};

#[derive(Parser)]
#[command(name = "ligue1_scraper", about = "Ligue 1 standings, scorers, assists and palmarès scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Season label records are stored under (e.g. "2025/2026")
    #[arg(long, global = true)]
    season: Option<String>,
    /// SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Minimum records per table page; below it nothing is written
    #[arg(long, global = true)]
    min_yield: Option<usize>,
    /// Settings file (default: ./ligue1.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Only known position codes end a player name
    #[arg(long, global = true)]
    strict_positions: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Fetch, extract and store standings, scorers, assists and palmarès
    Run {
        /// Continue with the remaining pages after a failure
        #[arg(long)]
        keep_going: bool,
        /// Only this page (standings, scorers, assists, palmares)
        #[arg(short, long)]
        target: Option<Target>,
    },
    /// Fetch one page and keep it as a snapshot without extracting
    Scrape { target: Target },
    /// Re-extract the latest snapshot of a page and store the records
    Process { target: Target },
    /// Extract saved pages offline and print the records
    Parse {
        target: Target,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show stored records for the season
    Show {
        target: Target,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show row counts
    Stats,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        error!("{err}");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(season) = cli.season {
        settings.season = season;
    }
    if let Some(db) = cli.db {
        settings.db_path = db;
    }
    if let Some(min_yield) = cli.min_yield {
        settings.override_min_yield(min_yield);
    }
    if cli.strict_positions {
        settings.strict_positions = true;
    }
    let rule = if settings.strict_positions {
        PositionCodes::strict()
    } else {
        PositionCodes::default()
    };
    let ctx = RunContext { settings: &settings, rule: &rule };

    match cli.command {
        Commands::Init => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            println!("Schema ready at {}", settings.db_path.display());
            Ok(())
        }
        Commands::Run { keep_going, target } => {
            let mut conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let fetcher = Fetcher::from_env(Duration::from_secs(settings.fetch_timeout_secs))?;
            let targets = match target {
                Some(t) => vec![t],
                None => Target::ALL.to_vec(),
            };

            println!("Season {}: {} page(s)", settings.season, targets.len());
            let reports = pipeline::run_all(&fetcher, &mut conn, &ctx, &targets, keep_going).await;
            for r in &reports {
                match &r.error {
                    None => println!("  {:<10} ok      {} records", r.target.label(), r.records),
                    Some(e) => println!("  {:<10} FAILED  {}", r.target.label(), truncate(e, 100)),
                }
            }
            let failed = reports.iter().filter(|r| !r.ok()).count();
            let skipped = targets.len() - reports.len();
            if skipped > 0 {
                println!("  {} page(s) skipped (use --keep-going to continue past failures)", skipped);
            }
            if failed > 0 {
                bail!("{} of {} page(s) failed", failed, targets.len());
            }
            Ok(())
        }
        Commands::Scrape { target } => {
            let mut conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let fetcher = Fetcher::from_env(Duration::from_secs(settings.fetch_timeout_secs))?;
            let request = target.request(&settings);
            let page = fetcher.fetch(&request).await?;
            conn.save_snapshot(&SnapshotRow {
                target: target.label().to_string(),
                season: settings.season.clone(),
                url: page.url.clone(),
                content: Some(page.content),
                error: None,
                latency_ms: Some(page.latency_ms),
            })?;
            println!(
                "Saved {} snapshot ({} ms{})",
                target,
                page.latency_ms,
                if page.marker_found { "" } else { ", marker missing" }
            );
            Ok(())
        }
        Commands::Process { target } => {
            let mut conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let Some((url, content)) = db::latest_snapshot(&conn, target.label(), &settings.season)? else {
                println!("No {} snapshot for {}. Run 'scrape {}' first.", target, settings.season, target);
                return Ok(());
            };
            println!("Processing {} ({})", target, url);
            let result = pipeline::process_content(&mut conn, &ctx, target, &content);
            let error = result.as_ref().err().map(|e| format!("{e:#}"));
            conn.record_run(
                target.label(),
                &settings.season,
                *result.as_ref().unwrap_or(&0),
                error.as_deref(),
            )?;
            let records = result?;
            println!("Stored {} {} records", records, target);
            Ok(())
        }
        Commands::Parse { target, files, json } => parse_files(&ctx, target, &files, json),
        Commands::Show { target, limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            show(&conn, target, &settings.season, limit)
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn, &settings.season)?;
            println!("Season:      {}", settings.season);
            println!("Standings:   {}", s.standings);
            println!("Scorers:     {}", s.scorers);
            println!("Assists:     {}", s.assists);
            println!("Clubs:       {}", s.clubs);
            println!("History:     {}", s.history);
            println!("Snapshots:   {}", s.snapshots);
            println!("Failed runs: {}", s.failed_runs);
            Ok(())
        }
    }
}

/// Extract every file in parallel; nothing is stored.
fn parse_files(ctx: &RunContext<'_>, target: Target, files: &[PathBuf], json: bool) -> anyhow::Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let results: Vec<(&PathBuf, anyhow::Result<Parsed>)> = files
        .par_iter()
        .map(|path| {
            let batch = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))
                .and_then(|content| extract_offline(ctx, target, &content));
            pb.inc(1);
            (path, batch)
        })
        .collect();
    pb.finish_and_clear();

    let mut failed = 0;
    for (path, result) in results {
        match result {
            Ok(parsed) if json => println!("{}", parsed.to_json()?),
            Ok(parsed) => {
                let batch = parsed.batch();
                println!("{}: {} records", path.display(), batch.len());
                print_batch(batch, usize::MAX);
            }
            Err(e) => {
                failed += 1;
                error!(file = %path.display(), error = %format!("{e:#}"), "extraction failed");
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} file(s) failed", failed, files.len());
    }
    Ok(())
}

/// Offline result; table pages keep their anchor and counters for `--json`.
enum Parsed {
    Table(Extraction<Batch>),
    Palmares(Batch),
}

impl Parsed {
    fn batch(&self) -> &Batch {
        match self {
            Parsed::Table(ex) => &ex.records,
            Parsed::Palmares(batch) => batch,
        }
    }

    fn to_json(&self) -> serde_json::Result<String> {
        match self {
            Parsed::Table(ex) => serde_json::to_string_pretty(ex),
            Parsed::Palmares(batch) => serde_json::to_string_pretty(batch),
        }
    }
}

fn extract_offline(ctx: &RunContext<'_>, target: Target, content: &str) -> anyhow::Result<Parsed> {
    let settings = ctx.settings;
    Ok(match target {
        Target::Table(kind) => Parsed::Table(parser::extract_batch(
            kind,
            content,
            &settings.season,
            settings.min_yield_for(kind),
            ctx.rule,
            &settings.site_base,
        )?),
        Target::Palmares => Parsed::Palmares(parser::palmares::extract(content, &settings.site_base)?),
    })
}

fn show(conn: &rusqlite::Connection, target: Target, season: &str, limit: usize) -> anyhow::Result<()> {
    use crate::parser::schema::Kind;

    let batch = match target {
        Target::Table(Kind::Standings) => Batch::Standings(db::load_standings(conn, season)?),
        Target::Table(Kind::Scorers) => Batch::Scorers(db::load_scorers(conn, season)?),
        Target::Table(Kind::Assists) => Batch::Assists(db::load_assists(conn, season)?),
        Target::Palmares => Batch::Palmares {
            clubs: db::load_club_titles(conn)?,
            history: db::load_season_history(conn)?,
        },
    };
    if batch.is_empty() {
        println!("No {} records for {}.", target, season);
        return Ok(());
    }
    print_batch(&batch, limit);
    Ok(())
}

fn print_batch(batch: &Batch, limit: usize) {
    match batch {
        Batch::Standings(rows) => {
            println!(
                "{:>3} | {:<26} | {:>3} | {:>2} | {:>2} | {:>2} | {:>2} | {:>3} | {:>3} | {:>4}",
                "#", "Team", "Pts", "J", "G", "N", "D", "BP", "BC", "Dif"
            );
            println!("{}", "-".repeat(76));
            for r in rows.iter().take(limit) {
                println!(
                    "{:>3} | {:<26} | {:>3} | {:>2} | {:>2} | {:>2} | {:>2} | {:>3} | {:>3} | {:>+4}",
                    r.rank, truncate(&r.team, 26), r.points, r.played, r.wins, r.draws,
                    r.losses, r.goals_for, r.goals_against, r.goal_diff
                );
            }
        }
        Batch::Scorers(rows) => {
            println!("{:>3} | {:<28} | {:>5} | {:>4}", "#", "Player", "Goals", "Pen");
            println!("{}", "-".repeat(50));
            for r in rows.iter().take(limit) {
                println!(
                    "{:>3} | {:<28} | {:>5} | {:>4}",
                    r.rank, truncate(&r.player_name, 28), r.goals, r.penalties
                );
            }
        }
        Batch::Assists(rows) => {
            println!("{:>3} | {:<28} | {:>7}", "#", "Player", "Assists");
            println!("{}", "-".repeat(44));
            for r in rows.iter().take(limit) {
                println!("{:>3} | {:<28} | {:>7}", r.rank, truncate(&r.player_name, 28), r.assists);
            }
        }
        Batch::Palmares { clubs, history } => {
            println!("--- Titles ---");
            for c in clubs.iter().take(limit) {
                println!("{:>3}  {}", c.titles, c.team);
            }
            println!("\n--- History ---");
            for h in history.iter().take(limit) {
                println!("{:<10} {:<26} {}", h.season, truncate(&h.winner, 26), h.runner_up);
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
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
