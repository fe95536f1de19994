//! Delta & aggregate engine: day-over-day and week-over-week changes,
//! remaining-quota figures, percentages, and population statistics.
//!
//! RULES:
//!   - A missing operand yields Unknown. It is never treated as zero.
//!   - Every division checks its denominator first; a zero denominator
//!     yields Unknown, never inf, NaN, or a panic.
//!   - "No quota" is its own outcome and is never confused with Unknown.

use crate::{
    inventory::InventoryTree,
    measurement::MeasurementSnapshot,
    types::{gb, EntityId},
};
use serde::Serialize;
use std::collections::BTreeSet;

/// Outcome of comparing two integer metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeltaResult {
    /// Signed, unclamped difference (or remaining amount).
    Value(i64),
    /// No limit was ever set, so there is nothing to compute against.
    NoQuota,
    Unknown,
}

impl DeltaResult {
    pub fn value(&self) -> Option<i64> {
        match self {
            Self::Value(v) => Some(*v),
            _ => None,
        }
    }

    /// Render a byte figure in whole GB.
    pub fn render_gb(&self) -> String {
        match self {
            Self::Value(v) => gb(*v).to_string(),
            Self::NoQuota => "NO QUOTA".into(),
            Self::Unknown => "UNKNOWN".into(),
        }
    }

    pub fn render_count(&self) -> String {
        match self {
            Self::Value(v) => v.to_string(),
            Self::NoQuota => "NO QUOTA".into(),
            Self::Unknown => "UNKNOWN".into(),
        }
    }
}

/// `current - prior`, or Unknown when either side is missing.
pub fn delta(current: Option<u64>, prior: Option<u64>) -> DeltaResult {
    match (current, prior) {
        (Some(c), Some(p)) => DeltaResult::Value(c as i64 - p as i64),
        _ => DeltaResult::Unknown,
    }
}

/// Files left under a file quota. A limit that is absent or not positive is NoQuota.
pub fn files_remaining(limit: Option<u64>, count: Option<u64>) -> DeltaResult {
    match (limit, count) {
        (Some(limit), Some(count)) if limit > 0 => DeltaResult::Value(limit as i64 - count as i64),
        (Some(limit), None) if limit > 0 => DeltaResult::Unknown,
        _ => DeltaResult::NoQuota,
    }
}

/// Space left under a space quota, as reported free space.
pub fn space_remaining(free: Option<u64>) -> DeltaResult {
    free.map_or(DeltaResult::NoQuota, |f| DeltaResult::Value(f as i64))
}

/// A derived real-valued figure that may be unknown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Stat {
    Value(f64),
    Unknown,
}

impl Stat {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Unknown => None,
        }
    }

    /// `"{v:.prec$}%"` or `UNKNOWN`.
    pub fn render_percent(&self, prec: usize) -> String {
        match self {
            Self::Value(v) => format!("{v:.prec$}%"),
            Self::Unknown => "UNKNOWN".into(),
        }
    }

    /// `render_percent` with the number right-aligned in `width` columns.
    pub fn render_percent_aligned(&self, width: usize, prec: usize) -> String {
        match self {
            Self::Value(v) => format!("{v:>width$.prec$}%"),
            Self::Unknown => format!("{:>width$}", "UNKNOWN"),
        }
    }

    pub fn render_rounded(&self) -> String {
        match self {
            Self::Value(v) => format!("{}", v.round() as i64),
            Self::Unknown => "UNKNOWN".into(),
        }
    }
}

/// `part / total * 100`. Unknown when an operand is missing or `total` is zero.
pub fn percentage(part: Option<f64>, total: Option<f64>) -> Stat {
    match (part, total) {
        (Some(p), Some(t)) if t != 0.0 => Stat::Value(p / t * 100.0),
        _ => Stat::Unknown,
    }
}

/// Percentage of two known quantities.
pub fn share(part: f64, total: f64) -> Stat {
    percentage(Some(part), Some(total))
}

pub fn used_percent(used: Option<u64>, total: Option<u64>) -> Stat {
    percentage(used.map(|u| u as f64), total.map(|t| t as f64))
}

// ── Population aggregates ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PopulationStats {
    /// Production entities.
    pub alive: usize,
    /// Entities in any other status; excluded from mean and stddev.
    pub offline: usize,
    pub mean: Stat,
    pub stddev: Stat,
}

/// Mean and population standard deviation of `metric` over Production
/// entities. Entities whose metric is unknown are counted but not sampled.
pub fn population_stats<'a, F>(
    entities: impl IntoIterator<Item = &'a MeasurementSnapshot>,
    metric: F,
) -> PopulationStats
where
    F: Fn(&MeasurementSnapshot) -> Stat,
{
    let mut alive = 0;
    let mut offline = 0;
    let mut samples = Vec::new();
    for e in entities {
        if !e.is_production() {
            offline += 1;
            continue;
        }
        alive += 1;
        if let Stat::Value(v) = metric(e) {
            samples.push(v);
        }
    }

    let (mean, stddev) = mean_stddev(&samples);
    PopulationStats { alive, offline, mean, stddev }
}

fn mean_stddev(samples: &[f64]) -> (Stat, Stat) {
    if samples.is_empty() {
        return (Stat::Unknown, Stat::Unknown);
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (Stat::Value(mean), Stat::Value(var.sqrt()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PopulationChanges {
    /// Production pool names alive now but not in the prior snapshot.
    pub new: BTreeSet<String>,
    /// Production pool names alive in the prior snapshot but not now.
    pub dead: BTreeSet<String>,
}

/// Compare alive pools by *name*: ids can change when a pool is re-registered.
pub fn population_changes(today: &InventoryTree, prior: &InventoryTree) -> PopulationChanges {
    let alive = |t: &InventoryTree| -> BTreeSet<String> {
        t.pools()
            .into_iter()
            .filter(|p| p.is_production())
            .map(|p| p.name.clone())
            .collect()
    };
    let now = alive(today);
    let before = alive(prior);
    PopulationChanges {
        new: now.difference(&before).cloned().collect(),
        dead: before.difference(&now).cloned().collect(),
    }
}

// ── Per-path deltas ───────────────────────────────────────────────

/// One row of a path table: today's usage plus its changes versus each
/// comparison day, and what is left under any quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathDeltas {
    pub entity_id: EntityId,
    pub name: String,
    pub used_space: Option<u64>,
    pub used_changes: Vec<DeltaResult>,
    pub space_remaining: DeltaResult,
    pub file_count: Option<u64>,
    pub file_changes: Vec<DeltaResult>,
    pub files_remaining: DeltaResult,
}

/// Deltas for every path under `se_id/area_id` in `today`, one change per
/// comparison tree. A path absent from a comparison day changes by Unknown.
pub fn path_deltas(
    today: &InventoryTree,
    comparisons: &[&InventoryTree],
    se_id: &str,
    area_id: &str,
) -> Vec<PathDeltas> {
    today
        .paths(se_id, area_id)
        .into_iter()
        .map(|path| {
            let priors: Vec<Option<&MeasurementSnapshot>> = comparisons
                .iter()
                .map(|tree| {
                    tree.paths(se_id, area_id)
                        .into_iter()
                        .find(|p| p.entity_id == path.entity_id)
                })
                .collect();
            PathDeltas {
                entity_id: path.entity_id.clone(),
                name: path.name.clone(),
                used_space: path.used_space,
                used_changes: priors
                    .iter()
                    .map(|p| delta(path.used_space, p.and_then(|p| p.used_space)))
                    .collect(),
                space_remaining: space_remaining(path.free_space),
                file_count: path.file_count,
                file_changes: priors
                    .iter()
                    .map(|p| delta(path.file_count, p.and_then(|p| p.file_count)))
                    .collect(),
                files_remaining: files_remaining(path.file_count_limit, path.file_count),
            }
        })
        .collect()
}

/// Root-SE capacity across the target and comparison days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacitySummary {
    pub total: Vec<Option<u64>>,
    pub free: Vec<Option<u64>>,
    pub used: Vec<Option<u64>>,
    pub used_percent: Vec<Stat>,
}

/// A day whose tree lacks the SE contributes Unknown for every figure.
pub fn capacity_summary(trees: &[&InventoryTree], se_id: &str) -> CapacitySummary {
    let se: Vec<Option<&MeasurementSnapshot>> = trees.iter().map(|t| t.get(se_id)).collect();
    CapacitySummary {
        total: se.iter().map(|s| s.and_then(|s| s.total_space)).collect(),
        free: se.iter().map(|s| s.and_then(|s| s.free_space)).collect(),
        used: se.iter().map(|s| s.and_then(|s| s.used_space)).collect(),
        used_percent: se
            .iter()
            .map(|s| match s {
                Some(s) => used_percent(s.used_space, s.total_space),
                None => Stat::Unknown,
            })
            .collect(),
    }
}
