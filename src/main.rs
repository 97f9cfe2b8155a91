use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};
use tracing::{debug, info};

use hrzones::batch::{ActivityRef, ZoneProcessor};
use hrzones::config::AppConfig;
use hrzones::export::{export_zone_totals, ExportFormat};
use hrzones::logging::init_logging;
use hrzones::models::{ActivityId, ZoneTotals};
use hrzones::report::{Reporter, VolumeReport};
use hrzones::store::{ActivityDatabase, ActivityMetadataReader, DetailStore};
use hrzones::sync::{check_store_integrity, ExportDirSource, SyncJob};

/// hrzones - Heart rate time-in-zone for recorded activities
///
/// Computes per-activity heart rate zone distributions from raw sample
/// detail, persists them next to the activity metadata, and reports zone
/// and volume totals over date ranges.
#[derive(Parser)]
#[command(name = "hrzones")]
#[command(version)]
#[command(about = "Heart rate zone distribution CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute and store zone totals
    Compute {
        /// Only these activity ids (default: every activity with heart rate)
        #[arg(long = "id", value_name = "ACTIVITY_ID")]
        ids: Vec<ActivityId>,

        /// Worker threads
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Copy new activities from a platform export into the stores
    Sync {
        /// Export directory holding activities.json and details/
        #[arg(short, long)]
        from: PathBuf,
    },

    /// Aggregate stored activities over a date range
    Report {
        #[command(subcommand)]
        kind: ReportKind,
    },

    /// List stored activities as calendar entries
    Activities {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Verify the metadata and detail stores hold the same activities
    Check,

    /// Export per-activity zone totals
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (csv, json)
        #[arg(short = 'f', long, default_value = "csv")]
        format: String,
    },

    /// Show or initialise the configuration file
    Config {
        /// Write the current settings to the config file
        #[arg(long)]
        init: bool,
    },
}

#[derive(Subcommand)]
enum ReportKind {
    /// Time in each heart rate zone
    Zones {
        /// Range start (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)
        #[arg(short, long)]
        start: String,

        /// Range end, inclusive; compared as text with the local start time
        #[arg(short, long)]
        end: String,

        #[arg(long)]
        json: bool,
    },

    /// Count, distance, duration and elevation gain
    Volume {
        #[arg(short, long)]
        start: String,

        #[arg(short, long)]
        end: String,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Tabled)]
struct ZoneRow {
    #[tabled(rename = "Zone")]
    zone: String,
    #[tabled(rename = "Value")]
    value: u64,
}

#[derive(Tabled)]
struct CalendarRow {
    #[tabled(rename = "ID")]
    id: ActivityId,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Sport")]
    title: String,
    #[tabled(rename = "Distance (m)")]
    distance: String,
    #[tabled(rename = "Duration (min)")]
    duration_min: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_config_path);
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;

    let mut log_config = config.logging.clone();
    log_config.level = log_config.level.raised_by(cli.verbose);
    init_logging(&log_config)?;
    debug!("Using configuration at {}", config_path.display());

    match cli.command {
        Commands::Compute { ids, threads, no_progress } => {
            if threads.is_some() {
                config.batch.num_threads = threads;
            }
            if no_progress {
                config.batch.show_progress = false;
            }
            run_compute(&config, &ids)
        }
        Commands::Sync { from } => run_sync(&config, &from),
        Commands::Report { kind } => run_report(&config, kind),
        Commands::Activities { json } => run_activities(&config, json),
        Commands::Check => run_check(&config),
        Commands::Export { output, format } => run_export(&config, &output, &format),
        Commands::Config { init } => run_config(&mut config, &config_path, init),
    }
}

fn open_database(config: &AppConfig) -> Result<ActivityDatabase> {
    let path = &config.storage.database_path;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
    }
    ActivityDatabase::new(path).with_context(|| format!("Failed to open database: {}", path.display()))
}

fn open_details(config: &AppConfig) -> Result<DetailStore> {
    let dir = &config.storage.detail_dir;
    DetailStore::new(dir, config.storage.compress_details)
        .with_context(|| format!("Failed to open detail store: {}", dir.display()))
}

fn run_compute(config: &AppConfig, ids: &[ActivityId]) -> Result<()> {
    let database = open_database(config)?;
    let details = open_details(config)?;
    let processor = ZoneProcessor::with_config(&details, &database, config.batch_config());

    println!("{}", "Computing heart rate zones...".blue().bold());
    let summary = if ids.is_empty() {
        processor.process_store(&database)?
    } else {
        let mut selected = Vec::with_capacity(ids.len());
        for id in ids {
            match database.load_activity(*id)? {
                Some(activity) => selected.push(ActivityRef::from(&activity)),
                None => eprintln!("{}", format!("Activity {} is not in the metadata store", id).yellow()),
            }
        }
        processor.process(&selected)
    };

    println!("{}", summary.to_string_pretty());
    if summary.failed > 0 {
        anyhow::bail!("{} of {} activities failed", summary.failed, summary.total);
    }
    println!("{}", format!("✓ {} activities updated", summary.succeeded).green());
    Ok(())
}

fn run_sync(config: &AppConfig, from: &Path) -> Result<()> {
    let database = open_database(config)?;
    let details = open_details(config)?;

    println!("{}", "Syncing activities...".cyan().bold());
    let job = SyncJob::new(ExportDirSource::new(from), &database, &details).with_chunk_size(config.sync.chunk_size);
    let report = job.run()?;

    println!("  Listed by source: {}", report.remote);
    println!("  Already stored:   {}", report.already_stored);
    println!("  Added:            {}", report.added.len());
    println!("  Detail written:   {}", report.detail_written);
    if !report.skipped.is_empty() {
        println!(
            "{}",
            format!("  Skipped (no detail at source): {:?}", report.skipped).yellow()
        );
    }
    println!("{}", "✓ Sync completed".cyan());
    Ok(())
}

fn run_report(config: &AppConfig, kind: ReportKind) -> Result<()> {
    let reporter = Reporter::new(open_database(config)?);

    match kind {
        ReportKind::Zones { start, end, json } => {
            validate_bound(&start)?;
            validate_bound(&end)?;
            let totals = reporter.zones_between(&start, &end)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&totals)?);
            } else {
                print_zone_table(&totals);
            }
        }
        ReportKind::Volume { start, end, json } => {
            validate_bound(&start)?;
            validate_bound(&end)?;
            let volume = reporter.volume_between(&start, &end)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&volume)?);
            } else {
                print_volume(&volume);
            }
        }
    }
    Ok(())
}

fn run_activities(config: &AppConfig, json: bool) -> Result<()> {
    let events = Reporter::new(open_database(config)?).calendar()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    let rows: Vec<CalendarRow> = events
        .into_iter()
        .map(|e| CalendarRow {
            id: e.id,
            date: e.start,
            title: e.title,
            distance: e.distance.map(|d| d.round_dp(0).to_string()).unwrap_or_default(),
            duration_min: e.duration_min,
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
    Ok(())
}

fn run_check(config: &AppConfig) -> Result<()> {
    let database = open_database(config)?;
    let details = open_details(config)?;

    let ids = check_store_integrity(&database, &details)?;
    let stats = database.get_stats()?;
    println!("{}", "✓ Metadata and detail stores match".green());
    println!("  Activities:       {}", ids.len());
    println!("  With zone totals: {}", stats.with_zone_totals);
    Ok(())
}

fn run_export(config: &AppConfig, output: &Path, format: &str) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let activities = open_database(config)?.all_activities()?;

    let written = export_zone_totals(&activities, format, output)
        .with_context(|| format!("Failed to export to {}", output.display()))?;
    println!("{}", format!("✓ Exported {} activities to {}", written, output.display()).yellow());
    Ok(())
}

fn run_config(config: &mut AppConfig, path: &Path, init: bool) -> Result<()> {
    if init {
        config.save_to_file(path)?;
        info!("Configuration written to {}", path.display());
        println!("{}", format!("✓ Configuration written to {}", path.display()).white());
    } else {
        println!("# {}", path.display().to_string().dimmed());
        println!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}

/// Range bounds are compared as text, so only reject strings that are not dates
fn validate_bound(bound: &str) -> Result<()> {
    let is_date = NaiveDate::parse_from_str(bound, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(bound, "%Y-%m-%d %H:%M:%S").is_ok();
    if !is_date {
        anyhow::bail!("Invalid date '{}', expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS", bound);
    }
    Ok(())
}

fn print_zone_table(totals: &ZoneTotals) {
    let rows: Vec<ZoneRow> = totals
        .entries()
        .into_iter()
        .map(|(zone, value)| ZoneRow {
            zone: zone.to_string(),
            value,
        })
        .collect();

    println!("{}", "Time in heart rate zones (s)".bold());
    println!("{}", Table::new(rows).with(Style::rounded()));
}

fn print_volume(volume: &VolumeReport) {
    println!("{}", "Training volume".bold());
    println!("  Activities: {}", volume.total_activities);
    println!("  Distance:   {} km", volume.total_distance_km);
    println!("  Duration:   {}", volume.total_duration);
    println!("  Elevation:  {} m", volume.total_elevation_gain);
}
