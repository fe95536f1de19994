//! Approximate event correlator.
//!
//! Verifies:
//! 1. The exact pass reports every in-window connection from the job's host
//! 2. Hosts logged without their domain are still found
//! 3. The fuzzy pass reports only a unique candidate; ambiguity is never broken
//! 4. Connections without a disconnect are judged against the injected clock
//! 5. Accepting a connection widens its matched hostname set
//! 6. Output groups by redirection site, with "no site" for direct reads
//! 7. Jobs without an execution host are never matched

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use gratia_core::{
    clock::ReportClock,
    correlator::{
        correlate_all, hostnames_compatible, AccountingJob, CorrelationCounts, Correlator, MatchPass, MatchState,
        MatchWindow, OverflowMatches, NO_SITE,
    },
    transfer_log::{Denylist, LogLineParser, TransferLog},
};
use std::io::Cursor;

const KEY: &str = "cmsuser.1234:45@red-w1.unl.edu";
const USER: &str = "/DC=org/DC=doegrids/OU=People/CN=Some User";

/// Job start. Log lines below are written in CST, six hours behind.
fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2012, 4, 5, 20, 3, 15).unwrap()
}

fn window() -> MatchWindow {
    MatchWindow {
        window_secs: 600,
        open_grace_secs: 0,
    }
}

fn clock() -> ReportClock {
    ReportClock::fixed(Utc.with_ymd_and_hms(2012, 4, 6, 0, 0, 0).unwrap())
}

fn log_from(text: &str) -> TransferLog {
    let mut log = TransferLog::new(FixedOffset::west_opt(6 * 3600).unwrap(), Denylist::default());
    log.ingest_reader(&LogLineParser::new().unwrap(), Cursor::new(text.to_string())).unwrap();
    log
}

fn job(id: &str, host: &str) -> AccountingJob {
    AccountingJob {
        local_job_id: id.into(),
        user: USER.into(),
        host: host.into(),
        start: t0(),
        end: t0() + Duration::seconds(600),
        application: Some("cmsRun".into()),
    }
}

/// Login at T+5 and disconnect at T+605.
fn session(key: &str) -> String {
    format!(
        "120405 14:03:20 1 XrootdXeq: {key} login as cmsuser\n\
         120405 14:13:20 1 XrootdXeq: {key} disc 0:10:00\n"
    )
}

// ── Exact pass ───────────────────────────────────────────────────

#[test]
fn exact_pass_accepts_connection_in_window() {
    let mut log = log_from(&format!(
        "{}120405 14:03:21 1 Decode xrootd redirects {KEY} to cmssrv32.fnal.gov:1094 /store/mc/file.root\n",
        session(KEY)
    ));
    let mut out = OverflowMatches::default();
    let state = Correlator::new(&mut log, window(), &clock()).correlate(&job("101", "red-w1.unl.edu"), &mut out);

    assert_eq!(
        state,
        MatchState::Matched {
            pass: MatchPass::Exact,
            accepted: 1
        }
    );
    let lines = out.lines("cmssrv32.fnal.gov:1094", USER);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].filename.as_deref(), Some("/store/mc/file.root"));
    assert_eq!(
        lines[0].render(),
        "cmsuser.1234:45@red-w1.unl.edu(XROOTD hostname), red-w1.unl.edu(GRATIA hostname),\n        \
         101, 2012-04-05 20:03:15 GMT--2012-04-05 20:13:15 GMT,\n          cmsRun,\n          /store/mc/file.root"
    );
}

#[test]
fn late_disconnect_is_rejected() {
    // Disconnect at T+1300, past the end of the window.
    let mut log = log_from(&format!(
        "120405 14:03:20 1 XrootdXeq: {KEY} login as cmsuser\n\
         120405 14:24:55 1 XrootdXeq: {KEY} disc 0:21:35\n"
    ));
    let mut out = OverflowMatches::default();
    let state = Correlator::new(&mut log, window(), &clock()).correlate(&job("101", "red-w1.unl.edu"), &mut out);

    assert_eq!(state, MatchState::Unresolved { candidates: 0 });
    assert!(out.is_empty());
}

#[test]
fn window_bounds_are_inclusive() {
    let log = log_from(&session(KEY));
    let record = log.record(KEY).unwrap();
    let login = record.login_time.unwrap();
    let disc = record.disconnection_time.unwrap();
    let w = window();
    let now = clock().now_epoch();

    assert!(w.accepts(record, login, disc - 600, now), "login == start, disconnect == end + 600");
    assert!(w.accepts(record, login - 600, disc, now), "login == start + 600, disconnect == end");
    assert!(!w.accepts(record, login - 601, disc, now));
    assert!(!w.accepts(record, login, disc + 1, now), "disconnect before job end");
}

#[test]
fn abbreviated_log_host_is_found() {
    let mut log = log_from(&session("cmsuser.1:2@red-w1"));
    let mut out = OverflowMatches::default();
    let state = Correlator::new(&mut log, window(), &clock()).correlate(&job("101", "red-w1.unl.edu extra"), &mut out);

    assert!(matches!(state, MatchState::Matched { pass: MatchPass::Exact, .. }));
    assert_eq!(out.lines(NO_SITE, USER)[0].accounting_hostnames, vec!["red-w1.unl.edu"]);
}

#[test]
fn every_exact_candidate_is_reported() {
    let second = "cmsuser.1234:46@red-w1.unl.edu";
    let mut log = log_from(&format!("{}{}", session(KEY), session(second)));
    let mut out = OverflowMatches::default();
    let state = Correlator::new(&mut log, window(), &clock()).correlate(&job("101", "red-w1.unl.edu"), &mut out);

    assert_eq!(
        state,
        MatchState::Matched {
            pass: MatchPass::Exact,
            accepted: 2
        }
    );
    assert_eq!(out.len(), 2);
}

// ── Fuzzy pass ───────────────────────────────────────────────────

#[test]
fn unique_fuzzy_candidate_is_accepted() {
    let mut log = log_from(&session("cmsuser.1:2@red-gw.unl.edu"));
    let mut out = OverflowMatches::default();
    let state = Correlator::new(&mut log, window(), &clock()).correlate(&job("102", "node7.unl.edu"), &mut out);

    assert_eq!(
        state,
        MatchState::Matched {
            pass: MatchPass::Fuzzy,
            accepted: 1
        }
    );
    assert_eq!(out.len(), 1);
}

#[test]
fn ambiguous_fuzzy_candidates_emit_nothing() {
    let mut log = log_from(&format!(
        "{}{}",
        session("cmsuser.1:2@red-gw1.unl.edu"),
        session("cmsuser.1:3@red-gw2.unl.edu")
    ));
    let mut out = OverflowMatches::default();
    let state = Correlator::new(&mut log, window(), &clock()).correlate(&job("102", "node7.unl.edu"), &mut out);

    assert_eq!(state, MatchState::Unresolved { candidates: 2 });
    assert!(out.is_empty(), "neither candidate may be picked");
    assert!(log.record("cmsuser.1:2@red-gw1.unl.edu").unwrap().matched_hostnames.is_empty());
}

#[test]
fn fuzzy_pass_respects_domains() {
    let mut log = log_from(&session("cmsuser.1:2@node.ucsd.edu"));
    let mut out = OverflowMatches::default();
    let state = Correlator::new(&mut log, window(), &clock()).correlate(&job("102", "node7.unl.edu"), &mut out);
    assert_eq!(state, MatchState::Unresolved { candidates: 0 });
}

#[test]
fn hostname_compatibility_rules() {
    assert!(hostnames_compatible("u.1:2@red-gw.unl.edu", "node7.unl.edu"));
    assert!(!hostnames_compatible("u.1:2@node.ucsd.edu", "node7.unl.edu"));
    assert!(hostnames_compatible("u.1:2@worker", "node7.unl.edu"), "undomained keys are not compared");
    assert!(hostnames_compatible("u.1:2@node.ucsd.edu", "node7"), "undomained hosts are not compared");

    assert!(!hostnames_compatible("u.1:2@cms-b.rcac.purdue.edu", "cms-a.rcac.purdue.edu"));
    assert!(hostnames_compatible("u.1:2@nat-1.rcac.purdue.edu", "cms-a.rcac.purdue.edu"));
}

#[test]
fn purdue_keys_need_nat_whatever_the_accounting_host() {
    assert!(!hostnames_compatible("cmsprod7.1:2@cms-147.rcac.purdue.edu", "rossmann-a097"));
    assert!(hostnames_compatible("cmsprod7.1:2@nat-3.rcac.purdue.edu", "rossmann-a097"));

    let mut log = log_from(&session("cmsprod7.1:2@cms-147.rcac.purdue.edu"));
    let mut out = OverflowMatches::default();
    let state = Correlator::new(&mut log, window(), &clock()).correlate(&job("104", "rossmann-a097"), &mut out);
    assert_eq!(state, MatchState::Unresolved { candidates: 0 });
}

// ── Clock and state ──────────────────────────────────────────────

#[test]
fn hostless_job_never_consumes_a_connection() {
    let key = "cmsuser.1:2@node.ucsd.edu";
    let mut log = log_from(&session(key));

    let (matches, counts) = correlate_all(&[job("401", "")], &mut log, window(), &clock());

    assert_eq!(
        counts,
        CorrelationCounts {
            exact: 0,
            fuzzy: 0,
            unresolved: 1
        }
    );
    assert!(matches.is_empty());
    assert!(log.record(key).unwrap().matched_hostnames.is_empty());
}

#[test]
fn open_connection_uses_injected_now() {
    let text = format!("120405 14:03:20 1 XrootdXeq: {KEY} login as cmsuser\n");
    let j = job("103", "red-w1.unl.edu");

    let soon = ReportClock::fixed(t0() + Duration::seconds(700));
    let mut log = log_from(&text);
    let mut out = OverflowMatches::default();
    let state = Correlator::new(&mut log, window(), &soon).correlate(&j, &mut out);
    assert!(matches!(state, MatchState::Matched { .. }), "still open at T+700");

    let later = ReportClock::fixed(t0() + Duration::seconds(5_000));
    let mut log = log_from(&text);
    let mut out = OverflowMatches::default();
    let state = Correlator::new(&mut log, window(), &later).correlate(&j, &mut out);
    assert_eq!(state, MatchState::Unresolved { candidates: 0 });
}

#[test]
fn acceptance_widens_matched_hostnames() {
    let mut log = log_from(&session(KEY));
    let jobs = [job("201", "red-w1.unl.edu"), job("202", "red-w9.unl.edu")];

    let (matches, counts) = correlate_all(&jobs, &mut log, window(), &clock());

    assert_eq!(counts.exact, 1);
    assert_eq!(counts.fuzzy, 1);
    assert_eq!(counts.unresolved, 0);
    let lines = matches.lines(NO_SITE, USER);
    assert_eq!(lines[0].accounting_hostnames, vec!["red-w1.unl.edu"]);
    assert_eq!(lines[1].accounting_hostnames, vec!["red-w1.unl.edu", "red-w9.unl.edu"]);
    assert_eq!(log.record(KEY).unwrap().matched_hostnames.len(), 2);
}

#[test]
fn output_groups_by_site_then_user() {
    let redirected = "cmsuser.9:1@red-w1.unl.edu";
    let mut log = log_from(&format!(
        "{}{}120405 14:03:21 1 Decode xrootd redirects {redirected} to cmssrv32.fnal.gov:1094 /store/a.root\n",
        session(KEY),
        session(redirected)
    ));
    let (matches, _) = correlate_all(&[job("301", "red-w1.unl.edu")], &mut log, window(), &clock());

    assert_eq!(matches.sites().collect::<Vec<_>>(), ["cmssrv32.fnal.gov:1094", NO_SITE]);
    let text = matches.render();
    assert!(text.starts_with("\nfor cmssrv32.fnal.gov:1094:\n    for /DC=org"), "{text}");
    assert!(text.contains("\nfor no site:\n"), "{text}");
}
