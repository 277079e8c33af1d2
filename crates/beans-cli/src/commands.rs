//! CLI command implementations

use crate::{DoctorArgs, DoctorCheck};
use anyhow::{Result, bail};
use beans_core::maintenance::stale::threshold_days;
use beans_core::{
    Config, MaintenanceOptions, StaleReport, TombstoneReport, backend_and_data_dir,
    expired_tombstones_with, run_all, stale_closed_issues_with,
};
use chrono::Duration;
use colored::Colorize;
use std::path::Path;

pub fn info(path: &Path, json: bool) -> Result<()> {
    let (backend, data_dir) = backend_and_data_dir(path)?;
    let exists = data_dir.is_dir();

    if json {
        println!(
            "{}",
            serde_json::to_string(&serde_json::json!({
                "data_dir": data_dir,
                "backend": backend,
                "exists": exists,
            }))?
        );
    } else {
        println!("Data directory: {}", data_dir.display().to_string().cyan());
        println!("Backend:        {}", backend.to_string().blue());
        if !exists {
            println!("{} Data directory does not exist", "!".yellow());
        }
    }

    Ok(())
}

fn options(args: &DoctorArgs) -> MaintenanceOptions {
    MaintenanceOptions {
        stale_after: args.stale_days.map(|d| Duration::days(i64::from(d))),
        tombstone_ttl: args.tombstone_ttl_days.map(|d| Duration::days(i64::from(d))),
        stale_label: args.label.clone(),
        dry_run: !args.fix,
        ..Default::default()
    }
}

pub fn doctor(args: &DoctorArgs, check: Option<DoctorCheck>, json: bool) -> Result<()> {
    let opts = options(args);
    let root = args.path.as_path();
    tracing::debug!(root = %root.display(), dry_run = opts.dry_run, "Running doctor");

    let (stale, tombstones) = match check {
        Some(DoctorCheck::StaleClosed) => (Some(stale_closed_issues_with(root, &opts)), None),
        Some(DoctorCheck::Tombstones) => (None, Some(expired_tombstones_with(root, &opts))),
        None => {
            let (stale, tombstones) = run_all(root, &opts);
            (Some(stale), Some(tombstones))
        }
    };

    let mut failed = Vec::new();
    let stale = match stale {
        Some(Ok(report)) => Some(report),
        Some(Err(e)) => {
            failed.push(format!("stale closed issues: {}", e));
            None
        }
        None => None,
    };
    let tombstones = match tombstones {
        Some(Ok(report)) => Some(report),
        Some(Err(e)) => {
            failed.push(format!("expired tombstones: {}", e));
            None
        }
        None => None,
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "stale_closed_issues": stale,
                "expired_tombstones": tombstones,
                "errors": failed,
            }))?
        );
    } else {
        if let Some(ref report) = stale {
            print_stale(report, &opts, root);
        }
        if let Some(ref report) = tombstones {
            print_tombstones(report);
        }
        for error in &failed {
            println!("{} {}", "✗".red(), error);
        }
    }

    if !failed.is_empty() {
        bail!("doctor found {} failing check(s)", failed.len());
    }
    Ok(())
}

fn print_stale(report: &StaleReport, opts: &MaintenanceOptions, root: &Path) {
    if !report.initialized {
        println!(
            "{} Stale closed issues: no {} database, nothing to check",
            "✓".green(),
            report.backend
        );
        return;
    }

    let days = threshold_days(opts, &report.data_dir);

    if report.stale.is_empty() {
        println!(
            "{} Stale closed issues: none of {} closed issue(s) older than {} days",
            "✓".green(),
            report.scanned,
            days
        );
    } else if report.dry_run {
        println!(
            "{} Stale closed issues: {} older than {} days",
            "!".yellow(),
            report.stale.len(),
            days
        );
        for id in &report.stale {
            println!("  {}", id.cyan());
        }
        println!(
            "  Run 'beans doctor --path {} --fix stale-closed' to flag them",
            root.display()
        );
    } else {
        println!(
            "{} Stale closed issues: flagged {}, {} already flagged",
            "✓".green(),
            report.flagged.len(),
            report.already_flagged.len()
        );
        for id in &report.flagged {
            println!("  {}", id.cyan());
        }
    }

    if report.skipped > 0 {
        println!("  {} closed issue(s) have no close time", report.skipped);
    }
    for failure in &report.failures {
        println!("  {} {}", "!".yellow(), failure);
    }
}

fn print_tombstones(report: &TombstoneReport) {
    if !report.log_present {
        println!("{} Expired tombstones: no issues.jsonl, nothing to prune", "✓".green());
        return;
    }

    if report.expired.is_empty() {
        println!(
            "{} Expired tombstones: none among {} tombstone(s)",
            "✓".green(),
            report.tombstones
        );
    } else if report.rewritten {
        println!(
            "{} Expired tombstones: pruned {} from {}",
            "✓".green(),
            report.expired.len(),
            report.log_path.display()
        );
    } else {
        println!(
            "{} Expired tombstones: {} eligible for pruning",
            "!".yellow(),
            report.expired.len()
        );
        for id in &report.expired {
            println!("  {}", id.cyan());
        }
    }

    if !report.malformed.is_empty() {
        println!(
            "  {} {} unparsable line(s) kept as-is:",
            "!".yellow(),
            report.malformed.len()
        );
        for failure in &report.malformed {
            println!("    {}", failure);
        }
    }
}

pub fn config_show(path: &Path, json: bool) -> Result<()> {
    let (_, data_dir) = backend_and_data_dir(path)?;
    let config = Config::load_or_default(&data_dir);

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{}", "Current configuration:".bold());
        println!();
        println!("backend = \"{}\"", config.backend);
        println!();
        println!("[maintenance]");
        println!("stale_closed_days = {}", config.maintenance.stale_closed_days);
        println!("tombstone_ttl_days = {}", config.maintenance.tombstone_ttl_days);
        println!("stale_label = \"{}\"", config.maintenance.stale_label);
    }

    Ok(())
}

/// Reset configuration to defaults
pub fn config_reset(path: &Path) -> Result<()> {
    let (_, data_dir) = backend_and_data_dir(path)?;
    if !data_dir.is_dir() {
        bail!("Data directory not found: {}", data_dir.display());
    }

    Config::write_default(&data_dir)?;

    println!("{} Configuration reset to defaults", "✓".green());
    Ok(())
}
