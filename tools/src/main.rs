//! report-runner: headless report generator for the Gratia accounting store.
//!
//! Usage:
//!   report-runner --report site-storage --db gratia.db --date 2012-04-05
//!   report-runner --report se-consistency --db gratia.db --html
//!   report-runner --report ce-consistency --registry-file ce.xml
//!   report-runner --report overflow --log-dir /var/log/xrootd --json

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use gratia_core::{
    clock::ReportClock,
    config::ReportConfig,
    reconcile::Domain,
    registry::{HttpRegistry, RegistrySource, StaticRegistry},
    report::{
        consistency::ConsistencyReport,
        overflow::{load_transfer_log, OverflowReport},
        storage::SiteStorageReport,
        Report,
    },
    store::ReportStore,
};
use serde::Serialize;
use std::env;

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Plain,
    Html,
    Json,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let report = flag_value(&args, "--report").unwrap_or("site-storage");
    let db = flag_value(&args, "--db").unwrap_or("gratia.db");
    let config_path = flag_value(&args, "--config").unwrap_or("./data/report_config.json");
    let format = if args.iter().any(|a| a == "--json") {
        OutputFormat::Json
    } else if args.iter().any(|a| a == "--html") {
        OutputFormat::Html
    } else {
        OutputFormat::Plain
    };

    let mut config = ReportConfig::load(config_path)?;
    if let Some(dir) = flag_value(&args, "--log-dir") {
        config.overflow.log_dir = dir.to_string();
    }
    let date = match flag_value(&args, "--date") {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d").with_context(|| format!("Bad --date {d}"))?,
        None => Utc::now().date_naive(),
    };
    let clock = match flag_value(&args, "--now") {
        Some(now) => ReportClock::fixed(
            DateTime::parse_from_rfc3339(now)
                .with_context(|| format!("Bad --now {now}"))?
                .with_timezone(&Utc),
        ),
        None => ReportClock::system(),
    };

    log::info!("report-runner: report={report} db={db} date={date}");
    let store = ReportStore::open(db)?;
    store.migrate()?;

    match report {
        "site-storage" => {
            let r = SiteStorageReport::build(&store, &config.storage, date)?;
            emit(&r, format)
        }
        "se-consistency" | "ce-consistency" => {
            let (domain, url) = if report == "se-consistency" {
                (Domain::Storage, config.registry.se_url.as_str())
            } else {
                (Domain::Compute, config.registry.ce_url.as_str())
            };
            let registry: Box<dyn RegistrySource> = match flag_value(&args, "--registry-file") {
                Some(path) => Box::new(StaticRegistry::new(
                    std::fs::read_to_string(path).with_context(|| format!("Cannot read {path}"))?,
                )),
                None => Box::new(HttpRegistry::new(url, config.registry.timeout_secs)?),
            };
            let cutoff = date.and_hms_opt(0, 0, 0).context("midnight is always valid")?.and_utc();
            let r = ConsistencyReport::build(
                &store,
                registry.as_ref(),
                domain,
                cutoff,
                config.storage.recent_window_days,
            )?;
            emit(&r, format)
        }
        "overflow" => {
            let mut transfer_log = load_transfer_log(&config.overflow)?;
            let r = OverflowReport::build(&store, &config.overflow, date, &mut transfer_log, &clock)?;
            emit(&r, format)
        }
        other => bail!("Unknown --report {other}; expected site-storage, se-consistency, ce-consistency or overflow"),
    }
}

fn emit<R: Report + Serialize>(report: &R, format: OutputFormat) -> Result<()> {
    log::info!("{}: {}", report.name(), report.subject());
    match format {
        OutputFormat::Plain => print!("{}", report.generate_plain()),
        OutputFormat::Html => print!("{}", report.generate_html()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}
