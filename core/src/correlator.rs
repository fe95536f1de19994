//! Approximate event correlator: matches retry-exhausted accounting jobs
//! to transfer-log connections.
//!
//! Per job, a small state machine:
//!
//!   Unmatched ──exact pass──▶ Matched(Exact)
//!       │
//!       └─▶ ExactAttempted ──fuzzy scan──▶ FuzzyAttempted ──▶ Matched(Fuzzy)
//!                                                      └──▶ Unresolved
//!
//! The exact pass accepts every candidate indexed under the job's hostname
//! that passes the time test; all of them are reported. The fuzzy pass
//! scans every record and reports only a unique candidate. Ambiguity is
//! never broken by picking one.

use crate::{
    clock::ReportClock,
    transfer_log::{CorrelationRecord, TransferLog},
    types::EpochSecs,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Site label for connections that were never redirected.
pub const NO_SITE: &str = "no site";

/// Domains that make a hostname comparable by suffix.
const RECOGNIZED_DOMAINS: [&str; 4] = [".edu", ".gov", ".org", ".com"];

/// An accounting-side job that needs a transfer-log explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountingJob {
    pub local_job_id: String,
    /// Certificate common name of the submitting user.
    pub user: String,
    /// Execution host; may carry qualifiers after a space.
    pub host: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub application: Option<String>,
}

impl AccountingJob {
    /// Host with any space-separated qualifiers stripped.
    pub fn plain_hostname(&self) -> &str {
        self.host.split(' ').next().unwrap_or_default()
    }
}

/// Time test shared by both passes. Both bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchWindow {
    pub window_secs: i64,
    /// Added to "now" for connections that never logged a disconnect.
    pub open_grace_secs: i64,
}

impl MatchWindow {
    pub fn accepts(&self, record: &CorrelationRecord, job_start: EpochSecs, job_end: EpochSecs, now: EpochSecs) -> bool {
        let login = record.login_time.unwrap_or(0);
        let disconnect = record
            .disconnection_time
            .unwrap_or(now + self.open_grace_secs);
        (job_start..=job_start + self.window_secs).contains(&login)
            && (job_end..=job_end + self.window_secs).contains(&disconnect)
    }
}

/// Whether a log-side connection key could come from the accounting host.
///
/// Purdue connections must come through a `nat` host, whatever the
/// accounting host. Otherwise a log key without a recognized domain is
/// compatible with anything; one with a domain must contain the accounting
/// host's domain (from its first dot), if the accounting host has one.
pub fn hostnames_compatible(log_key: &str, accounting_host: &str) -> bool {
    if log_key.contains(".purdue.") && !log_key.contains("@nat") {
        return false;
    }
    if !has_recognized_domain(log_key) {
        return true;
    }
    match accounting_host.find('.') {
        Some(dot) => log_key.contains(&accounting_host[dot..]),
        None => true,
    }
}

pub fn has_recognized_domain(host: &str) -> bool {
    RECOGNIZED_DOMAINS.iter().any(|d| host.contains(d))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchPass {
    Exact,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchState {
    Unmatched,
    ExactAttempted,
    FuzzyAttempted { candidates: Vec<String> },
    Matched { pass: MatchPass, accepted: usize },
    Unresolved { candidates: usize },
}

impl MatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Matched { .. } | Self::Unresolved { .. })
    }
}

/// One reported job/connection pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrelationLine {
    pub log_key: String,
    /// The connection's matched accounting hostnames at acceptance time.
    pub accounting_hostnames: Vec<String>,
    pub local_job_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub application: Option<String>,
    pub filename: Option<String>,
}

impl CorrelationLine {
    pub fn render(&self) -> String {
        let fmt = "%Y-%m-%d %H:%M:%S GMT";
        let application = self
            .application
            .as_deref()
            .map(|a| format!("{a},\n          "))
            .unwrap_or_default();
        format!(
            "{}(XROOTD hostname), {}(GRATIA hostname),\n        {}, {}--{},\n          {}{}",
            self.log_key,
            self.accounting_hostnames.join(" "),
            self.local_job_id,
            self.start.format(fmt),
            self.end.format(fmt),
            application,
            self.filename.as_deref().unwrap_or_default(),
        )
    }
}

/// Accepted pairings grouped by redirection site, then by user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverflowMatches {
    by_site: BTreeMap<String, BTreeMap<String, Vec<CorrelationLine>>>,
}

impl OverflowMatches {
    pub fn record(&mut self, site: &str, user: &str, line: CorrelationLine) {
        self.by_site
            .entry(site.to_string())
            .or_default()
            .entry(user.to_string())
            .or_default()
            .push(line);
    }

    pub fn is_empty(&self) -> bool {
        self.by_site.is_empty()
    }

    /// Total number of reported lines.
    pub fn len(&self) -> usize {
        self.by_site.values().flat_map(|u| u.values()).map(Vec::len).sum()
    }

    pub fn sites(&self) -> impl Iterator<Item = &String> {
        self.by_site.keys()
    }

    pub fn lines(&self, site: &str, user: &str) -> &[CorrelationLine] {
        self.by_site
            .get(site)
            .and_then(|u| u.get(user))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn render(&self) -> String {
        let mut text = String::new();
        for (site, users) in &self.by_site {
            text.push_str(&format!("\nfor {site}:\n"));
            for (user, lines) in users {
                text.push_str(&format!("    for {user}:\n"));
                for line in lines {
                    text.push_str(&format!("        {}\n", line.render()));
                }
            }
        }
        text
    }
}

/// Matches jobs against one run's transfer log. "Now" comes from the
/// injected clock so results are reproducible.
pub struct Correlator<'a> {
    log: &'a mut TransferLog,
    window: MatchWindow,
    now: EpochSecs,
}

impl<'a> Correlator<'a> {
    pub fn new(log: &'a mut TransferLog, window: MatchWindow, clock: &ReportClock) -> Self {
        Self {
            log,
            window,
            now: clock.now_epoch(),
        }
    }

    /// Drive one job to a terminal state, recording accepted pairings.
    pub fn correlate(&mut self, job: &AccountingJob, out: &mut OverflowMatches) -> MatchState {
        let mut state = MatchState::Unmatched;
        while !state.is_terminal() {
            let next = self.step(state.clone(), job, out);
            log::debug!("job {}: {state:?} -> {next:?}", job.local_job_id);
            state = next;
        }
        state
    }

    fn step(&mut self, state: MatchState, job: &AccountingJob, out: &mut OverflowMatches) -> MatchState {
        match state {
            // A job with no execution host can never be attributed a transfer.
            MatchState::Unmatched if job.plain_hostname().is_empty() => MatchState::Unresolved { candidates: 0 },
            MatchState::Unmatched => match self.exact_pass(job, out) {
                0 => MatchState::ExactAttempted,
                accepted => MatchState::Matched {
                    pass: MatchPass::Exact,
                    accepted,
                },
            },
            MatchState::ExactAttempted => MatchState::FuzzyAttempted {
                candidates: self.fuzzy_candidates(job),
            },
            MatchState::FuzzyAttempted { candidates } => match candidates.as_slice() {
                [unique] => {
                    self.accept(unique, job, out);
                    MatchState::Matched {
                        pass: MatchPass::Fuzzy,
                        accepted: 1,
                    }
                }
                _ => MatchState::Unresolved {
                    candidates: candidates.len(),
                },
            },
            terminal => terminal,
        }
    }

    fn exact_pass(&mut self, job: &AccountingJob, out: &mut OverflowMatches) -> usize {
        let host = job.plain_hostname();
        let mut keys = self.log.keys_for_host(host).to_vec();
        if keys.is_empty() {
            // red-mon.unl.edu may be logged as plain red-mon
            let short = host.split('.').next().unwrap_or(host);
            keys = self.log.keys_for_host(short).to_vec();
        }

        let (start, end) = (job.start.timestamp(), job.end.timestamp());
        let mut accepted = 0;
        for key in keys {
            let in_window = self
                .log
                .record(&key)
                .map_or(false, |r| self.window.accepts(r, start, end, self.now));
            if in_window {
                self.accept(&key, job, out);
                accepted += 1;
            }
        }
        accepted
    }

    fn fuzzy_candidates(&self, job: &AccountingJob) -> Vec<String> {
        let host = job.plain_hostname();
        let (start, end) = (job.start.timestamp(), job.end.timestamp());
        self.log
            .records()
            .filter(|(key, record)| {
                hostnames_compatible(key, host) && self.window.accepts(record, start, end, self.now)
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn accept(&mut self, key: &str, job: &AccountingJob, out: &mut OverflowMatches) {
        let Some(record) = self.log.record_mut(key) else {
            return;
        };
        record.matched_hostnames.insert(job.plain_hostname().to_string());
        let site = record.redirection_site.as_deref().unwrap_or(NO_SITE).to_string();
        let line = CorrelationLine {
            log_key: key.to_string(),
            accounting_hostnames: record.matched_hostnames.iter().cloned().collect(),
            local_job_id: job.local_job_id.clone(),
            start: job.start,
            end: job.end,
            application: job.application.clone(),
            filename: record.filename.clone(),
        };
        out.record(&site, &job.user, line);
    }
}

/// Outcome counts for one batch of jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorrelationCounts {
    pub exact: usize,
    pub fuzzy: usize,
    pub unresolved: usize,
}

/// Correlate every job in order against `log`.
pub fn correlate_all(
    jobs: &[AccountingJob],
    transfer_log: &mut TransferLog,
    window: MatchWindow,
    clock: &ReportClock,
) -> (OverflowMatches, CorrelationCounts) {
    let mut correlator = Correlator::new(transfer_log, window, clock);
    let mut matches = OverflowMatches::default();
    let mut counts = CorrelationCounts::default();
    for job in jobs {
        match correlator.correlate(job, &mut matches) {
            MatchState::Matched { pass: MatchPass::Exact, .. } => counts.exact += 1,
            MatchState::Matched { pass: MatchPass::Fuzzy, .. } => counts.fuzzy += 1,
            _ => counts.unresolved += 1,
        }
    }
    log::info!(
        "correlated {} jobs: {} exact, {} fuzzy, {} unresolved",
        jobs.len(),
        counts.exact,
        counts.fuzzy,
        counts.unresolved
    );
    (matches, counts)
}
