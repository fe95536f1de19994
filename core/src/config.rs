use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageReportConfig {
    /// Root storage element name; must match exactly one SE per day.
    pub se_name: String,
    /// Days back for each comparison column ("1 Day Change", "7 Day Change").
    pub comparison_days: Vec<i64>,
    /// Trailing window used to decide whether an internal entity is still reporting.
    pub recent_window_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub se_url: String,
    pub ce_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverflowConfig {
    pub probe_name: String,
    pub resource_type: String,
    pub overflow_host_suffix: String,
    pub retry_exhausted_exit_codes: Vec<i64>,
    pub focus_sites: Vec<String>,
    /// Heading for the focus-site scope; the joined site names when empty.
    #[serde(default)]
    pub focus_label: String,
    pub efficiency_threshold: f64,
    /// IANA zone name of the site whose morning closes the report day.
    pub site_timezone: String,
    pub cutoff_hour: u32,
    pub log_dir: String,
    pub log_prefix: String,
    /// Standard-time offset of the transfer-log clock, seconds east of UTC.
    pub log_utc_offset_secs: i32,
    pub match_window_secs: i64,
    pub open_connection_grace_secs: i64,
    pub hostname_denylist: Vec<String>,
    pub filename_denylist: Vec<String>,
}

impl OverflowConfig {
    pub fn log_offset(&self) -> anyhow::Result<FixedOffset> {
        FixedOffset::east_opt(self.log_utc_offset_secs).ok_or_else(|| {
            anyhow::anyhow!("log_utc_offset_secs out of range: {}", self.log_utc_offset_secs)
        })
    }

    pub fn site_tz(&self) -> anyhow::Result<chrono_tz::Tz> {
        self.site_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| anyhow::anyhow!("Unknown site_timezone {}: {e}", self.site_timezone))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub storage: StorageReportConfig,
    pub registry: RegistryConfig,
    pub overflow: OverflowConfig,
}

impl ReportConfig {
    /// Load from a JSON file (see data/report_config.json).
    /// In tests, use ReportConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: ReportConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.overflow.log_offset()?;
        config.overflow.site_tz()?;
        Ok(config)
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            storage: StorageReportConfig {
                se_name: "srm.unl.edu".into(),
                comparison_days: vec![1, 7],
                recent_window_days: 7,
            },
            registry: RegistryConfig {
                se_url: "http://localhost/rgsummary/se.xml".into(),
                ce_url: "http://localhost/rgsummary/ce.xml".into(),
                timeout_secs: 30,
            },
            overflow: OverflowConfig {
                probe_name: "condor:glidein-2.t2.ucsd.edu".into(),
                resource_type: "BatchPilot".into(),
                overflow_host_suffix: "-overflow".into(),
                retry_exhausted_exit_codes: vec![84, 85],
                focus_sites: vec![
                    "Nebraska".into(),
                    "UCSD".into(),
                    "Purdue".into(),
                    "GLOW".into(),
                ],
                focus_label: "UCSD+Nebraska+Wisconsin+Purdue".into(),
                efficiency_threshold: 0.8,
                site_timezone: "US/Pacific".into(),
                cutoff_hour: 6,
                log_dir: "/var/log/xrootd".into(),
                log_prefix: "xrootd.log".into(),
                log_utc_offset_secs: -6 * 3600,
                match_window_secs: 600,
                open_connection_grace_secs: 100,
                hostname_denylist: vec!["red-mon".into()],
                filename_denylist: vec!["/store/test/xrootd".into()],
            },
        }
    }
}
