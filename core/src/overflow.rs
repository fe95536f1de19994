//! Overflow job statistics: how overflow jobs compare with normal jobs
//! over one report window.
//!
//! RULE: every ratio is a `Stat`. A class with no jobs or no wall time
//! yields UNKNOWN for its ratios, never 0%.

use crate::{
    clock::ReportWindow,
    config::OverflowConfig,
    delta::{share, Stat},
    error::ReportResult,
    store::ReportStore,
};
use serde::Serialize;

/// Which accounting jobs the statistics cover.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobFilter {
    pub probe_name: String,
    pub resource_type: String,
    /// Host descriptions ending with this mark an overflow job.
    pub overflow_host_suffix: String,
    /// Exit codes meaning the file open and every fallback failed.
    pub retry_exhausted_exit_codes: Vec<i64>,
    /// CPU/wall ratio above which a job counts as efficient.
    pub efficiency_threshold: f64,
}

impl JobFilter {
    pub fn from_config(config: &OverflowConfig) -> Self {
        Self {
            probe_name: config.probe_name.clone(),
            resource_type: config.resource_type.clone(),
            overflow_host_suffix: config.overflow_host_suffix.clone(),
            retry_exhausted_exit_codes: config.retry_exhausted_exit_codes.clone(),
            efficiency_threshold: config.efficiency_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobClass {
    Overflow,
    Normal,
}

/// Sites matched by substring of the job's host description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SiteScope {
    AllSites,
    /// `label` is the human name of the group; `sites` are the substrings.
    Sites { label: String, sites: Vec<String> },
}

impl SiteScope {
    /// The focus group from config, labelled by its own sites when no
    /// label is configured.
    pub fn focus(config: &OverflowConfig) -> Self {
        let label = if config.focus_label.is_empty() {
            config.focus_sites.join("+")
        } else {
            config.focus_label.clone()
        };
        Self::Sites {
            label,
            sites: config.focus_sites.clone(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::AllSites => "All sites".into(),
            Self::Sites { label, .. } => format!("Only {label}"),
        }
    }
}

/// Raw sums for one job class in one scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct JobClassTotals {
    pub jobs: u64,
    pub wall: f64,
    /// User plus system CPU time.
    pub cpu: f64,
    pub exit_zero_jobs: u64,
    pub exit_zero_wall: f64,
    pub retry_exhausted_jobs: u64,
    pub retry_exhausted_wall: f64,
    pub efficient_jobs: u64,
}

impl JobClassTotals {
    pub fn exit_zero_share(&self) -> Stat {
        share(self.exit_zero_jobs as f64, self.jobs as f64)
    }

    pub fn exit_zero_wall_share(&self) -> Stat {
        share(self.exit_zero_wall, self.wall)
    }

    pub fn retry_exhausted_share(&self) -> Stat {
        share(self.retry_exhausted_jobs as f64, self.jobs as f64)
    }

    pub fn retry_exhausted_wall_share(&self) -> Stat {
        share(self.retry_exhausted_wall, self.wall)
    }

    /// CPU time as a percentage of wall time.
    pub fn efficiency(&self) -> Stat {
        share(self.cpu, self.wall)
    }

    pub fn efficient_share(&self) -> Stat {
        share(self.efficient_jobs as f64, self.jobs as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverflowSummary {
    pub scope: SiteScope,
    pub overflow: JobClassTotals,
    pub normal: JobClassTotals,
}

impl OverflowSummary {
    pub fn overflow_share(&self) -> Stat {
        share(self.overflow.jobs as f64, (self.overflow.jobs + self.normal.jobs) as f64)
    }

    pub fn overflow_wall_share(&self) -> Stat {
        share(self.overflow.wall, self.overflow.wall + self.normal.wall)
    }

    pub fn render(&self, filter: &JobFilter) -> String {
        let pct = |s: Stat| s.render_percent_aligned(5, 2);
        let (o, n) = (&self.overflow, &self.normal);
        let codes = filter
            .retry_exhausted_exit_codes
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(" or ");

        let mut text = format!("\n{}\n\n", self.scope.label());
        text += &format!(
            "{:>15} {} ({} wall {}) {:>15}{}\n",
            "Overflow:",
            o.jobs,
            pct(self.overflow_share()),
            pct(self.overflow_wall_share()),
            "Normal:",
            n.jobs
        );
        text += &format!(
            "{:>15} {} (vs {}) wall {}\n",
            "Exit 0:",
            pct(o.exit_zero_share()),
            pct(n.exit_zero_share()),
            pct(o.exit_zero_wall_share())
        );
        text += &format!(
            "{:>15} {} (vs {}) wall {}\n",
            format!("Exit {codes}:"),
            pct(o.retry_exhausted_share()),
            pct(n.retry_exhausted_share()),
            pct(o.retry_exhausted_wall_share())
        );
        text += &format!(
            "{:>15} {} (vs {})\n",
            "Efficiency:",
            pct(o.efficiency()),
            pct(n.efficiency())
        );
        text += &format!(
            "{:>15} {} (vs {})\n",
            format!("Eff >{:.0}%:", filter.efficiency_threshold * 100.0),
            pct(o.efficient_share()),
            pct(n.efficient_share())
        );
        text
    }
}

/// Both job classes for one scope over `window`.
pub fn summarize(
    store: &ReportStore,
    filter: &JobFilter,
    window: &ReportWindow,
    scope: SiteScope,
) -> ReportResult<OverflowSummary> {
    let overflow = store.job_class_totals(filter, window, JobClass::Overflow, &scope)?;
    let normal = store.job_class_totals(filter, window, JobClass::Normal, &scope)?;
    log::info!(
        "{}: {} overflow jobs, {} normal jobs",
        scope.label(),
        overflow.jobs,
        normal.jobs
    );
    Ok(OverflowSummary { scope, overflow, normal })
}
