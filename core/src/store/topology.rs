use super::{format_timestamp, ComputeElementRow, ReportStore};
use crate::{error::ReportResult, reconcile::TopologyRow};
use chrono::{DateTime, Duration, Utc};
use rusqlite::params;

impl ReportStore {
    pub fn insert_compute_element(&self, row: &ComputeElementRow) -> ReportResult<()> {
        self.conn.execute(
            "INSERT INTO compute_element (unique_id, host_name, site_name, probe_name, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.unique_id,
                row.host_name,
                row.site_name,
                row.probe_name,
                format_timestamp(row.timestamp),
            ],
        )?;
        Ok(())
    }

    /// A compute element reported in: one status record at `at`.
    pub fn insert_compute_record(&self, unique_id: &str, probe_name: &str, at: DateTime<Utc>) -> ReportResult<()> {
        self.conn.execute(
            "INSERT INTO compute_element_record (unique_id, probe_name, timestamp)
             VALUES (?1, ?2, ?3)",
            params![unique_id, probe_name, format_timestamp(at)],
        )?;
        Ok(())
    }

    // ── Published topology ─────────────────────────────────────

    /// Latest GIP-published SE row per UniqueID at or before `cutoff`.
    pub fn storage_endpoints_at(&self, cutoff: DateTime<Utc>) -> ReportResult<Vec<TopologyRow>> {
        self.timed("storage_endpoints_at", |conn| {
            let mut stmt = conn.prepare(
                "SELECT unique_id, name, implementation, MAX(timestamp)
                 FROM storage_element
                 WHERE space_type = 'SE' AND probe_name LIKE 'gip%' AND timestamp <= ?1
                 GROUP BY unique_id
                 ORDER BY unique_id",
            )?;
            let rows = stmt
                .query_map(params![format_timestamp(cutoff)], |row| {
                    Ok(TopologyRow {
                        key: row.get(0)?,
                        label: row.get(1)?,
                        implementation: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// SEs with a space record in `(cutoff - days, cutoff]`, labelled by
    /// their latest topology row.
    pub fn recent_storage_endpoints(&self, cutoff: DateTime<Utc>, days: i64) -> ReportResult<Vec<TopologyRow>> {
        let since = format_timestamp(cutoff - Duration::days(days));
        self.timed("recent_storage_endpoints", |conn| {
            let mut stmt = conn.prepare(
                "SELECT se.unique_id, se.name, se.implementation
                 FROM (SELECT unique_id, name, implementation, MAX(timestamp) AS ts
                       FROM storage_element
                       WHERE space_type = 'SE' AND probe_name LIKE 'gip%' AND timestamp <= ?2
                       GROUP BY unique_id) AS se
                 WHERE se.unique_id IN (SELECT unique_id FROM storage_element_record
                                        WHERE timestamp > ?1 AND timestamp <= ?2)
                 ORDER BY se.unique_id",
            )?;
            let rows = stmt
                .query_map(params![since, format_timestamp(cutoff)], |row| {
                    Ok(TopologyRow {
                        key: row.get(0)?,
                        label: row.get(1)?,
                        implementation: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Latest GIP-published CE row per host at or before `cutoff`.
    pub fn compute_hosts_at(&self, cutoff: DateTime<Utc>) -> ReportResult<Vec<TopologyRow>> {
        self.timed("compute_hosts_at", |conn| {
            let mut stmt = conn.prepare(
                "SELECT host_name, site_name, MAX(timestamp)
                 FROM compute_element
                 WHERE probe_name LIKE 'gip%' AND timestamp <= ?1
                 GROUP BY host_name
                 ORDER BY host_name",
            )?;
            let rows = stmt
                .query_map(params![format_timestamp(cutoff)], |row| {
                    Ok(TopologyRow {
                        key: row.get(0)?,
                        label: row.get(1)?,
                        implementation: None,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// CE hosts with a status record in `(cutoff - days, cutoff]`.
    pub fn recent_compute_hosts(&self, cutoff: DateTime<Utc>, days: i64) -> ReportResult<Vec<TopologyRow>> {
        let since = format_timestamp(cutoff - Duration::days(days));
        self.timed("recent_compute_hosts", |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT ce.host_name, ce.site_name
                 FROM (SELECT unique_id, host_name, site_name, MAX(timestamp) AS ts
                       FROM compute_element
                       WHERE probe_name LIKE 'gip%' AND timestamp <= ?2
                       GROUP BY host_name) AS ce
                 JOIN compute_element_record cer ON cer.unique_id = ce.unique_id
                 WHERE cer.timestamp > ?1 AND cer.timestamp <= ?2
                 ORDER BY ce.host_name",
            )?;
            let rows = stmt
                .query_map(params![since, format_timestamp(cutoff)], |row| {
                    Ok(TopologyRow {
                        key: row.get(0)?,
                        label: row.get(1)?,
                        implementation: None,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
