//! Transfer-log ingestion: scans xrootd logs line by line and accumulates
//! one `CorrelationRecord` per connection key (`user.pid:fd@host`).
//!
//! Lines are consumed in file order and line order. Each recognized line
//! updates its record's fields; records are created lazily and never removed.

use crate::{clock::log_time_to_epoch, error::ReportResult, types::EpochSecs};
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One recognized log line. A line matches at most one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    Login { key: String, at: NaiveDateTime },
    Disconnect { key: String, at: NaiveDateTime },
    Redirect { key: String, site: String, filename: String },
    OpenFile { key: String, filename: String },
}

impl LogLine {
    pub fn key(&self) -> &str {
        match self {
            Self::Login { key, .. }
            | Self::Disconnect { key, .. }
            | Self::Redirect { key, .. }
            | Self::OpenFile { key, .. } => key,
        }
    }
}

pub struct LogLineParser {
    login: Regex,
    disconnect: Regex,
    redirect: Regex,
    open_file: Regex,
}

impl LogLineParser {
    pub fn new() -> ReportResult<Self> {
        Ok(Self {
            login: Regex::new(r"^(\d{2})(\d{2})(\d{2}) (\d{2}:\d{2}:\d{2}) \d+ XrootdXeq: (\S+) login")?,
            disconnect: Regex::new(
                r"^(\d{2})(\d{2})(\d{2}) (\d{1,2}:\d{2}:\d{2}) \d+ XrootdXeq: (\S+) disc \d{1,2}:\d{2}:\d{2}$",
            )?,
            redirect: Regex::new(r"^\d{6} \d{1,2}:\d{2}:\d{2} \d+ Decode xrootd redirects (\S+) to (\S+) (\S+)$")?,
            open_file: Regex::new(r"^\d{6} \d{1,2}:\d{2}:\d{2} \d+ (\S+) ofs_open: \d+-\d+ fn=(\S+)$")?,
        })
    }

    pub fn parse(&self, line: &str) -> Option<LogLine> {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(c) = self.login.captures(line) {
            let at = log_timestamp(&c[1], &c[2], &c[3], &c[4])?;
            return Some(LogLine::Login { key: c[5].to_string(), at });
        }
        if let Some(c) = self.disconnect.captures(line) {
            let at = log_timestamp(&c[1], &c[2], &c[3], &c[4])?;
            return Some(LogLine::Disconnect { key: c[5].to_string(), at });
        }
        if let Some(c) = self.redirect.captures(line) {
            return Some(LogLine::Redirect {
                key: c[1].to_string(),
                site: c[2].to_string(),
                filename: c[3].to_string(),
            });
        }
        if let Some(c) = self.open_file.captures(line) {
            return Some(LogLine::OpenFile {
                key: c[1].to_string(),
                filename: c[2].to_string(),
            });
        }
        None
    }
}

/// `YYMMDD HH:MM:SS`, years in the 2000s.
fn log_timestamp(yy: &str, mm: &str, dd: &str, hms: &str) -> Option<NaiveDateTime> {
    let date = NaiveDate::from_ymd_opt(
        2000 + yy.parse::<i32>().ok()?,
        mm.parse().ok()?,
        dd.parse().ok()?,
    )?;
    let time = NaiveTime::parse_from_str(hms, "%H:%M:%S").ok()?;
    Some(date.and_time(time))
}

/// What the log says about one connection. Every field stays `None` until
/// a line supplies it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationRecord {
    /// Accounting-side hostnames this connection was matched to.
    pub matched_hostnames: BTreeSet<String>,
    pub login_time: Option<EpochSecs>,
    pub disconnection_time: Option<EpochSecs>,
    pub filename: Option<String>,
    pub redirection_site: Option<String>,
}

/// Host fragments and path fragments whose lines are dropped outright.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Denylist {
    pub hosts: Vec<String>,
    pub paths: Vec<String>,
}

impl Denylist {
    pub fn blocks_key(&self, key: &str) -> bool {
        self.hosts.iter().any(|h| key.contains(h.as_str()))
    }

    pub fn blocks_path(&self, filename: &str) -> bool {
        self.paths.iter().any(|p| filename.contains(p.as_str()))
    }
}

/// The accumulated state of every scanned log, owned by one report run.
#[derive(Debug, Clone)]
pub struct TransferLog {
    offset: FixedOffset,
    denylist: Denylist,
    records: BTreeMap<String, CorrelationRecord>,
    /// Log-side hostname (after `@`) → connection keys, in first-login order.
    host_index: BTreeMap<String, Vec<String>>,
}

impl TransferLog {
    /// `offset` is the log clock's standard-time offset from UTC.
    pub fn new(offset: FixedOffset, denylist: Denylist) -> Self {
        Self {
            offset,
            denylist,
            records: BTreeMap::new(),
            host_index: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, key: &str) -> Option<&CorrelationRecord> {
        self.records.get(key)
    }

    pub(crate) fn record_mut(&mut self, key: &str) -> Option<&mut CorrelationRecord> {
        self.records.get_mut(key)
    }

    pub fn records(&self) -> impl Iterator<Item = (&String, &CorrelationRecord)> {
        self.records.iter()
    }

    /// Connection keys that logged in from `host`.
    pub fn keys_for_host(&self, host: &str) -> &[String] {
        self.host_index.get(host).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Apply one parsed line. Returns false when the line was denylisted.
    pub fn apply(&mut self, line: LogLine) -> bool {
        if self.denylist.blocks_key(line.key()) {
            return false;
        }
        match line {
            LogLine::Login { key, at } => {
                let at = log_time_to_epoch(at, self.offset);
                self.records.entry(key.clone()).or_default().login_time = Some(at);
                self.index_host(&key);
            }
            LogLine::Disconnect { key, at } => {
                let at = log_time_to_epoch(at, self.offset);
                self.records.entry(key).or_default().disconnection_time = Some(at);
            }
            LogLine::Redirect { key, site, filename } => {
                if self.denylist.blocks_path(&filename) {
                    return false;
                }
                let record = self.records.entry(key).or_default();
                record.filename = Some(filename);
                record.redirection_site = Some(site);
            }
            LogLine::OpenFile { key, filename } => {
                if self.denylist.blocks_path(&filename) {
                    return false;
                }
                let record = self.records.entry(key).or_default();
                // An explicit redirect already named the file.
                if record.filename.is_none() {
                    record.filename = Some(filename);
                }
            }
        }
        true
    }

    fn index_host(&mut self, key: &str) {
        let Some((_, host)) = key.split_once('@') else {
            log::debug!("connection key {key} has no host part; not indexed");
            return;
        };
        let keys = self.host_index.entry(host.to_string()).or_default();
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }

    /// Scan every line of `reader`. Returns the number of lines applied.
    pub fn ingest_reader<R: BufRead>(&mut self, parser: &LogLineParser, reader: R) -> ReportResult<usize> {
        let mut applied = 0;
        for line in reader.lines() {
            let line = line?;
            if let Some(parsed) = parser.parse(&line) {
                if self.apply(parsed) {
                    applied += 1;
                }
            }
        }
        Ok(applied)
    }

    pub fn ingest_file(&mut self, parser: &LogLineParser, path: &Path) -> ReportResult<usize> {
        let file = File::open(path)?;
        let applied = self.ingest_reader(parser, BufReader::new(file))?;
        log::info!("Scanned {}: {applied} lines applied", path.display());
        Ok(applied)
    }

    /// Scan every file in `dir` whose name starts with `prefix`, in name order.
    pub fn ingest_dir(&mut self, parser: &LogLineParser, dir: &Path, prefix: &str) -> ReportResult<usize> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| n.starts_with(prefix))
            })
            .collect();
        paths.sort();

        let mut applied = 0;
        for path in &paths {
            applied += self.ingest_file(parser, path)?;
        }
        Ok(applied)
    }
}
