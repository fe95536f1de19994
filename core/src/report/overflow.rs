//! Overflow jobs report: overflow versus normal job statistics, then the
//! retry-exhausted overflow jobs that the transfer log can explain.

use super::Report;
use crate::{
    clock::{report_window, ReportClock, ReportWindow},
    config::OverflowConfig,
    correlator::{correlate_all, CorrelationCounts, MatchWindow, OverflowMatches},
    error::ReportResult,
    overflow::{summarize, JobFilter, OverflowSummary, SiteScope},
    store::ReportStore,
    transfer_log::{Denylist, LogLineParser, TransferLog},
};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct OverflowReport {
    date: NaiveDate,
    window: ReportWindow,
    filter: JobFilter,
    summaries: Vec<OverflowSummary>,
    matches: OverflowMatches,
    counts: CorrelationCounts,
}

impl OverflowReport {
    /// Statistics for the window closing on `date`, plus correlation of
    /// that window's retry-exhausted jobs against `transfer_log`.
    pub fn build(
        store: &ReportStore,
        config: &OverflowConfig,
        date: NaiveDate,
        transfer_log: &mut TransferLog,
        clock: &ReportClock,
    ) -> ReportResult<Self> {
        let window = report_window(date, &config.site_tz()?, config.cutoff_hour)?;
        log::info!("Overflow window {} -- {}", window.earliest, window.latest);
        let filter = JobFilter::from_config(config);

        let summaries = vec![
            summarize(store, &filter, &window, SiteScope::AllSites)?,
            summarize(store, &filter, &window, SiteScope::focus(config))?,
        ];

        let jobs = store.retry_exhausted_jobs(&filter, &window)?;
        let match_window = MatchWindow {
            window_secs: config.match_window_secs,
            open_grace_secs: config.open_connection_grace_secs,
        };
        let (matches, counts) = correlate_all(&jobs, transfer_log, match_window, clock);

        Ok(Self {
            date,
            window,
            filter,
            summaries,
            matches,
            counts,
        })
    }

    pub fn summaries(&self) -> &[OverflowSummary] {
        &self.summaries
    }

    pub fn matches(&self) -> &OverflowMatches {
        &self.matches
    }

    pub fn counts(&self) -> CorrelationCounts {
        self.counts
    }
}

impl Report for OverflowReport {
    fn name(&self) -> &'static str {
        "overflow_jobs"
    }

    fn subject(&self) -> String {
        format!(
            "Overflow Jobs Report for {} ({} possible overflow jobs)",
            self.date.format("%Y-%m-%d"),
            self.matches.len()
        )
    }

    fn generate_plain(&self) -> String {
        let mut text = String::new();
        for summary in &self.summaries {
            text += &summary.render(&self.filter);
        }
        let codes = self
            .filter
            .retry_exhausted_exit_codes
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(" or ");
        text += &format!("\nPossible Overflow Jobs with Exit Code {codes} based on xrootd log\n");
        text += &self.matches.render();
        text
    }
}

/// Scan the configured log directory with the configured denylists.
pub fn load_transfer_log(config: &OverflowConfig) -> ReportResult<TransferLog> {
    let denylist = Denylist {
        hosts: config.hostname_denylist.clone(),
        paths: config.filename_denylist.clone(),
    };
    let mut transfer_log = TransferLog::new(config.log_offset()?, denylist);
    let parser = LogLineParser::new()?;
    let applied = transfer_log.ingest_dir(&parser, Path::new(&config.log_dir), &config.log_prefix)?;
    log::info!("{applied} transfer-log lines applied, {} connections", transfer_log.len());
    Ok(transfer_log)
}
