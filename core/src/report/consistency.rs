//! SE and CE consistency reports: the accounting store's published
//! topology against the registry.

use super::{table::Table, Report};
use crate::{
    error::ReportResult,
    reconcile::{external_map, internal_map, reconcile, Domain, Reconciliation, ReconciliationEntry},
    registry::{parse_registry, RegistrySource},
    store::ReportStore,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    domain: Domain,
    date: NaiveDate,
    reconciliation: Reconciliation,
}

impl ConsistencyReport {
    /// Compare the topology published at or before `cutoff`, and reported
    /// within `recent_days` before it, with the registry document.
    pub fn build(
        store: &ReportStore,
        registry: &dyn RegistrySource,
        domain: Domain,
        cutoff: DateTime<Utc>,
        recent_days: i64,
    ) -> ReportResult<Self> {
        let (rows, recent_rows) = match domain {
            Domain::Storage => (
                store.storage_endpoints_at(cutoff)?,
                store.recent_storage_endpoints(cutoff, recent_days)?,
            ),
            Domain::Compute => (
                store.compute_hosts_at(cutoff)?,
                store.recent_compute_hosts(cutoff, recent_days)?,
            ),
        };
        let internal = internal_map(domain, &rows);
        let recent_internal = internal_map(domain, &recent_rows);
        let resources = parse_registry(&registry.fetch_xml()?)?;
        let external = external_map(domain, &resources);

        Ok(Self::from_reconciliation(
            domain,
            cutoff.date_naive(),
            reconcile(&internal, &recent_internal, &external),
        ))
    }

    pub fn from_reconciliation(domain: Domain, date: NaiveDate, reconciliation: Reconciliation) -> Self {
        Self { domain, date, reconciliation }
    }

    pub fn reconciliation(&self) -> &Reconciliation {
        &self.reconciliation
    }

    fn wording(&self) -> Wording {
        match self.domain {
            Domain::Storage => Wording {
                noun: "SRM endpoints",
                inconsistent_what: "names",
                key_header: "Endpoint",
                external_header: "OIM Resource Name",
                internal_header: "GIP SE Name",
            },
            Domain::Compute => Wording {
                noun: "CE endpoints",
                inconsistent_what: "site names",
                key_header: "CE",
                external_header: "OIM Resource Group Name",
                internal_header: "GIP Site Name",
            },
        }
    }
}

struct Wording {
    noun: &'static str,
    inconsistent_what: &'static str,
    key_header: &'static str,
    external_header: &'static str,
    internal_header: &'static str,
}

fn cells(entry: &ReconciliationEntry) -> Vec<String> {
    match entry {
        ReconciliationEntry::Inconsistent { key, external, internal } => {
            vec![key.clone(), external.clone(), internal.clone()]
        }
        ReconciliationEntry::OnlyInExternal { key, name } | ReconciliationEntry::OnlyInInternal { key, name } => {
            vec![key.clone(), name.clone()]
        }
    }
}

impl Report for ConsistencyReport {
    fn name(&self) -> &'static str {
        match self.domain {
            Domain::Storage => "se_consistency",
            Domain::Compute => "ce_consistency",
        }
    }

    fn subject(&self) -> String {
        format!(
            "{} Consistency Report for {} ({} Issues)",
            self.domain.short_name(),
            self.date.format("%Y-%m-%d"),
            self.reconciliation.issue_count()
        )
    }

    fn generate_plain(&self) -> String {
        let w = self.wording();
        let r = &self.reconciliation;
        let mut text = format!("{}\n", self.subject());

        text += &format!(
            "\nThe following {} have inconsistent {} between GIP and OIM:\n",
            w.noun, w.inconsistent_what
        );
        let mut inconsistent = Table::new(&[w.key_header, w.external_header, w.internal_header]).numbered_from(1);
        r.inconsistent.iter().for_each(|e| inconsistent.add_row(cells(e)));
        text += &inconsistent.plain_text();

        text += &format!("\nThe following {} are in GIP but not OIM:\n", w.noun);
        let mut only_internal =
            Table::new(&["Endpoint", w.internal_header]).numbered_from(inconsistent.next_row_number());
        r.only_in_internal.iter().for_each(|e| only_internal.add_row(cells(e)));
        text += &only_internal.plain_text();

        text += &format!("\nThe following {} are in OIM but not GIP:\n", w.noun);
        let mut only_external =
            Table::new(&["Endpoint", w.external_header]).numbered_from(only_internal.next_row_number());
        r.only_in_external.iter().for_each(|e| only_external.add_row(cells(e)));
        text += &only_external.plain_text();

        text
    }
}
