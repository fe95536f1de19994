//! Registry reconciliation: diffs the accounting store's view of the grid
//! topology against the external registry.
//!
//! Absence is measured against two different snapshots:
//!   - only-in-external compares against the *immediate* internal snapshot,
//!     measuring long-term absence from accounting;
//!   - only-in-internal compares the *trailing window* of internal reports,
//!     so an entity that skipped one day's report is not flagged.
//! The external registry is authoritative: its label is listed first.

use crate::{registry::RegistryResource, types::Hostname};
use serde::Serialize;
use std::collections::BTreeMap;

/// Hostname → label, ordered so every rendered diff is stable.
pub type HostMap = BTreeMap<Hostname, String>;

/// Which registry service family a consistency report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Domain {
    Storage,
    Compute,
}

impl Domain {
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Storage => "SE",
            Self::Compute => "CE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconciliationEntry {
    Inconsistent {
        key: Hostname,
        external: String,
        internal: String,
    },
    OnlyInExternal {
        key: Hostname,
        name: String,
    },
    OnlyInInternal {
        key: Hostname,
        name: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub inconsistent: Vec<ReconciliationEntry>,
    pub only_in_external: Vec<ReconciliationEntry>,
    pub only_in_internal: Vec<ReconciliationEntry>,
}

impl Reconciliation {
    /// Issues that need action: mislabelled or unregistered internal entities.
    pub fn issue_count(&self) -> usize {
        self.inconsistent.len() + self.only_in_internal.len()
    }
}

pub fn reconcile(internal: &HostMap, recent_internal: &HostMap, external: &HostMap) -> Reconciliation {
    let mut out = Reconciliation::default();

    for (key, external_label) in external {
        match internal.get(key) {
            Some(internal_label) if internal_label != external_label => {
                out.inconsistent.push(ReconciliationEntry::Inconsistent {
                    key: key.clone(),
                    external: external_label.clone(),
                    internal: internal_label.clone(),
                });
            }
            Some(_) => {}
            None => out.only_in_external.push(ReconciliationEntry::OnlyInExternal {
                key: key.clone(),
                name: external_label.clone(),
            }),
        }
    }

    for (key, label) in recent_internal {
        if !external.contains_key(key) {
            out.only_in_internal.push(ReconciliationEntry::OnlyInInternal {
                key: key.clone(),
                name: label.clone(),
            });
        }
    }

    log::info!(
        "reconciliation: {} inconsistent, {} only external, {} only internal",
        out.inconsistent.len(),
        out.only_in_external.len(),
        out.only_in_internal.len()
    );
    out
}

// ── Map builders ──────────────────────────────────────────────────

/// Storage implementations that never publish an SRM endpoint.
const EXCLUDED_STORAGE_IMPLEMENTATIONS: [&str; 3] = ["classic", "disk", "un"];

/// Case-insensitive substring match against the excluded implementations.
pub fn is_excluded_storage_implementation(implementation: &str) -> bool {
    let lower = implementation.to_lowercase();
    EXCLUDED_STORAGE_IMPLEMENTATIONS.iter().any(|x| lower.contains(x))
}

/// One internal topology row as the store returns it: an SE UniqueID and
/// name, or a CE host and site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyRow {
    pub key: String,
    pub label: String,
    pub implementation: Option<String>,
}

/// Build the internal map for `domain`.
///
/// Storage rows are keyed by endpoint (UniqueID up to the first `:`) and
/// labelled by SE name up to the first `:`; excluded implementations are
/// dropped. Compute rows are keyed by host and labelled by site as-is.
pub fn internal_map(domain: Domain, rows: &[TopologyRow]) -> HostMap {
    rows.iter()
        .filter(|r| match domain {
            Domain::Storage => !r
                .implementation
                .as_deref()
                .map_or(false, is_excluded_storage_implementation),
            Domain::Compute => true,
        })
        .map(|r| match domain {
            Domain::Storage => (before_colon(&r.key), before_colon(&r.label)),
            Domain::Compute => (r.key.clone(), r.label.clone()),
        })
        .collect()
}

/// Build the external map for `domain`. Hidden resources and resources
/// without an FQDN or label are skipped.
pub fn external_map(domain: Domain, resources: &[RegistryResource]) -> HostMap {
    resources
        .iter()
        .filter(|r| !r.hidden)
        .filter_map(|r| {
            let fqdn = r.fqdn.clone()?;
            let label = match domain {
                Domain::Storage => r.name.clone()?,
                Domain::Compute => r.group_name.clone()?,
            };
            Some((fqdn, label))
        })
        .collect()
}

fn before_colon(s: &str) -> String {
    s.split(':').next().unwrap_or(s).to_string()
}
