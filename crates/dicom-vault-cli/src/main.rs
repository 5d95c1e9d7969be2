mod commands;
mod logging;
mod progress;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, ConfigAction, RuleAction, SeriesArgs};
use dicom_vault_core::storage::models::{ScanRun, ScanStatus, ScheduleKind, SeriesQuery};
use dicom_vault_core::storage::Database;
use dicom_vault_core::{AppConfig, ScanEngine};
use dotenv::dotenv;
use progress::CliReporter;
use std::process;
use tracing::{error, info, warn};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match dicom_vault_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Config { action }) => run_config(&config, action),
        Some(Commands::Scan { config_id }) => run_scan(&config, config_id),
        Some(Commands::ScanPath { path, no_recursive }) => {
            run_scan_path(&config, &path, !no_recursive)
        }
        Some(Commands::Scans { page, page_size }) => run_list_scans(&config, page, page_size),
        Some(Commands::Series(args)) => run_list_series(&config, args),
        Some(Commands::Show { series_id }) => run_show(&config, &series_id),
        Some(Commands::Remove { series_id }) => run_remove(&config, &series_id),
        Some(Commands::Rule { action }) => run_rule(&config, action),
        Some(Commands::Export {
            target_dir,
            series_ids,
        }) => run_export(&config, &target_dir, &series_ids),
        Some(Commands::Stats) => run_stats(&config),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }
    Ok(())
}

fn open_db(config: &AppConfig) -> anyhow::Result<Database> {
    Database::open(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path))
}

fn offset_for(page: i64, page_size: i64) -> i64 {
    (page.max(1) - 1) * page_size
}

fn run_config(config: &AppConfig, action: ConfigAction) -> anyhow::Result<()> {
    let db = open_db(config)?;
    match action {
        ConfigAction::Add {
            path,
            description,
            schedule,
            no_recursive,
        } => {
            let schedule: ScheduleKind = schedule.parse().map_err(anyhow::Error::msg)?;
            let id = db.create_scan_config(&path, description.as_deref(), schedule, !no_recursive)?;
            info!("Added scan config {} for {}", format!("{}", id).cyan(), path);
        }
        ConfigAction::List => {
            for c in db.list_scan_configs()? {
                println!(
                    "{:>4}  {:<8} {:<5} {}  last scan: {}",
                    c.id,
                    c.schedule_type,
                    if c.recursive { "rec" } else { "flat" },
                    c.scan_path.bold(),
                    c.last_scan_at.as_deref().unwrap_or("never"),
                );
            }
        }
        ConfigAction::Remove { id } => {
            if !db.delete_scan_config(id)? {
                bail!("scan config {} not found", id);
            }
            info!("Removed scan config {}", id);
        }
    }
    Ok(())
}

fn run_scan(config: &AppConfig, config_id: i64) -> anyhow::Result<()> {
    let engine = ScanEngine::new(config.clone());
    let reporter = CliReporter::new();
    let run = engine.run_scan(config_id, &reporter)?;
    print_run_summary(&run);
    Ok(())
}

fn run_scan_path(config: &AppConfig, path: &str, recursive: bool) -> anyhow::Result<()> {
    let engine = ScanEngine::new(config.clone());
    let reporter = CliReporter::new();
    let run = engine.scan_path(path, ScheduleKind::Manual, recursive, &reporter)?;
    print_run_summary(&run);
    Ok(())
}

fn print_run_summary(run: &ScanRun) {
    println!();
    match run.status {
        ScanStatus::Completed => info!("Scan {} {}", run.id, "completed".green()),
        _ => warn!(
            "Scan {} {}: {}",
            run.id,
            run.status.to_string().red(),
            run.error.as_deref().unwrap_or("unknown error")
        ),
    }
    info!(
        "{} files, {} series: {} new, {} duplicated, {} rejected, {} failed",
        run.files_found,
        run.series_found,
        format!("{}", run.series_new).green(),
        format!("{}", run.series_duplicated).yellow(),
        format!("{}", run.series_rejected).red(),
        format!("{}", run.series_failed).red(),
    );
}

fn run_list_scans(config: &AppConfig, page: i64, page_size: i64) -> anyhow::Result<()> {
    let db = open_db(config)?;
    let (runs, total) = db.list_scan_runs(offset_for(page, page_size), page_size)?;
    for run in &runs {
        println!(
            "{}  {:<9} {:<6} {}  new {} dup {} rej {}",
            run.id.cyan(),
            run.status,
            run.trigger,
            run.started_at,
            run.series_new,
            run.series_duplicated,
            run.series_rejected,
        );
    }
    println!("{} of {} runs", runs.len(), total);
    Ok(())
}

fn run_list_series(config: &AppConfig, args: SeriesArgs) -> anyhow::Result<()> {
    let db = open_db(config)?;
    let query = SeriesQuery {
        patient_id: args.patient_id,
        patient_name: args.patient_name,
        modality: args.modality,
        protocol_name: args.protocol,
        study_date_from: args.date_from,
        study_date_to: args.date_to,
        include_inactive: args.include_inactive,
    };
    let total = db.count_series(&query)?;
    let series = db.list_series(&query, offset_for(args.page, args.page_size), args.page_size)?;
    for s in &series {
        println!(
            "{}  {:<4} {:<12} {:<20} {:>5} files  {}",
            s.id.cyan(),
            s.modality,
            s.patient_id,
            s.patient_name,
            s.file_count,
            s.series_description.as_deref().unwrap_or(""),
        );
    }
    println!("page {}: {} of {} series", args.page, series.len(), total);
    Ok(())
}

fn run_show(config: &AppConfig, series_id: &str) -> anyhow::Result<()> {
    let db = open_db(config)?;
    let Some(record) = db.get_series(series_id)? else {
        bail!("series {} not found", series_id);
    };
    println!("{}", serde_json::to_string_pretty(&record)?);
    println!("{}", "Paths:".bold());
    println!("  {}", record.file_path);
    for path in db.series_paths(series_id)? {
        println!("  {}", path.file_path);
    }
    Ok(())
}

fn run_remove(config: &AppConfig, series_id: &str) -> anyhow::Result<()> {
    let db = open_db(config)?;
    if !db.soft_delete_series(series_id)? {
        bail!("series {} not found", series_id);
    }
    info!("Series {} marked inactive", series_id);
    Ok(())
}

fn run_rule(config: &AppConfig, action: RuleAction) -> anyhow::Result<()> {
    let db = open_db(config)?;
    match action {
        RuleAction::Set {
            modality,
            max_slice_thickness,
            min_image_count,
        } => {
            let rule = db.upsert_filter_rule(&modality, max_slice_thickness, min_image_count)?;
            info!("Rule {} saved for {}", rule.id, rule.modality.bold());
        }
        RuleAction::List => {
            for rule in db.list_filter_rules()? {
                println!(
                    "{:>4}  {:<4} max thickness {:<6} min images {:<6} {}",
                    rule.id,
                    rule.modality,
                    fmt_opt(rule.max_slice_thickness),
                    fmt_opt(rule.min_image_count),
                    if rule.is_active {
                        "active".green()
                    } else {
                        "inactive".dimmed()
                    },
                );
            }
        }
        RuleAction::Toggle { id, off } => {
            if !db.set_filter_rule_active(id, !off)? {
                bail!("filter rule {} not found", id);
            }
            info!("Rule {} {}", id, if off { "disabled" } else { "enabled" });
        }
        RuleAction::Remove { id } => {
            if !db.delete_filter_rule(id)? {
                bail!("filter rule {} not found", id);
            }
            info!("Removed filter rule {}", id);
        }
    }
    Ok(())
}

fn fmt_opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn run_export(config: &AppConfig, target_dir: &str, series_ids: &[String]) -> anyhow::Result<()> {
    let engine = ScanEngine::new(config.clone());
    let reporter = CliReporter::new();
    let result = engine.export(series_ids, target_dir, &reporter)?;

    println!();
    info!(
        "{} series exported to {}, {} failed",
        format!("{}", result.exported_count).green(),
        result.target_dir,
        format!("{}", result.failed_count).red(),
    );
    if !result.failed_ids.is_empty() {
        warn!("Unknown series: {}", result.failed_ids.join(", "));
    }
    Ok(())
}

fn run_stats(config: &AppConfig) -> anyhow::Result<()> {
    let db = open_db(config)?;
    println!("{}", "By modality".bold());
    for m in db.modality_stats()? {
        println!("  {:<6} {}", m.modality, m.count);
    }
    println!("{}", "By study date".bold());
    for d in db.study_date_stats(30)? {
        println!("  {:<10} {}", d.date, d.count);
    }
    Ok(())
}
