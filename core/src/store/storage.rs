use super::{
    day_bounds, format_timestamp, metric, parse_timestamp, CustomCommandRow, ReportStore, SpaceRecordRow,
    StorageElementRow,
};
use crate::{
    error::ReportResult,
    inventory::ParentLookup,
    measurement::{MeasurementSnapshot, MeasurementType, SpaceKind, Status},
    types::EntityId,
};
use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Row};

impl ReportStore {
    // ── Inserts ────────────────────────────────────────────────

    pub fn insert_storage_element(&self, row: &StorageElementRow) -> ReportResult<()> {
        self.conn.execute(
            "INSERT INTO storage_element
             (unique_id, parent_id, name, se, space_type, implementation, version,
              site_name, status, probe_name, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                row.unique_id,
                row.parent_id,
                row.name,
                row.se,
                row.space_type,
                row.implementation,
                row.version,
                row.site_name,
                row.status,
                row.probe_name,
                row.timestamp.map(format_timestamp),
            ],
        )?;
        Ok(())
    }

    pub fn insert_space_record(&self, row: &SpaceRecordRow) -> ReportResult<()> {
        self.conn.execute(
            "INSERT INTO storage_element_record
             (unique_id, measurement_type, total_space, free_space, used_space,
              file_count, file_count_limit, probe_name, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.unique_id,
                row.measurement_type,
                row.total_space,
                row.free_space,
                row.used_space,
                row.file_count,
                row.file_count_limit,
                row.probe_name,
                format_timestamp(row.timestamp),
            ],
        )?;
        Ok(())
    }

    pub fn insert_custom_command(&self, row: &CustomCommandRow) -> ReportResult<()> {
        self.conn.execute(
            "INSERT INTO custom_command (job_name, se_unique_id, tag_name, extra_xml, end_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.job_name,
                row.se_unique_id,
                row.tag_name,
                row.extra_xml,
                format_timestamp(row.end_time),
            ],
        )?;
        Ok(())
    }

    // ── Day snapshots ──────────────────────────────────────────

    /// Latest measurement per `(entity, measurement type)` recorded on `day`
    /// for entities of root SE `se_name`, joined with each entity's latest
    /// topology row as of that day. Unknown space types are dropped.
    pub fn measurements_for_day(&self, se_name: &str, day: NaiveDate) -> ReportResult<Vec<MeasurementSnapshot>> {
        let (start, end) = day_bounds(day);
        self.timed("measurements_for_day", |conn| {
            let mut stmt = conn.prepare(
                "SELECT se.unique_id, se.parent_id, se.name, se.space_type, se.implementation,
                        se.version, se.site_name, se.status,
                        ser.measurement_type, ser.total_space, ser.free_space, ser.used_space,
                        ser.file_count, ser.file_count_limit
                 FROM (SELECT unique_id, measurement_type, total_space, free_space, used_space,
                              file_count, file_count_limit, MAX(timestamp) AS ts
                       FROM storage_element_record
                       WHERE timestamp >= ?1 AND timestamp < ?2
                       GROUP BY unique_id, measurement_type) AS ser
                 JOIN (SELECT unique_id, parent_id, name, space_type, implementation, version,
                              site_name, status, MAX(timestamp) AS ts
                       FROM storage_element
                       WHERE timestamp < ?2 AND se = ?3
                       GROUP BY unique_id) AS se
                   ON se.unique_id = ser.unique_id
                 ORDER BY se.unique_id, ser.measurement_type",
            )?;
            let rows = stmt
                .query_map(params![start, end, se_name], |row| {
                    let Some(mut snapshot) = topology_from_row(row)? else {
                        return Ok(None);
                    };
                    snapshot.measurement_type =
                        row.get::<_, Option<String>>(8)?.as_deref().and_then(MeasurementType::parse);
                    snapshot.total_space = metric(row.get(9)?);
                    snapshot.free_space = metric(row.get(10)?);
                    snapshot.used_space = metric(row.get(11)?);
                    snapshot.file_count = metric(row.get(12)?);
                    snapshot.file_count_limit = metric(row.get(13)?);
                    Ok(Some(snapshot))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().flatten().collect())
        })
    }

    /// Command outputs captured for `se_unique_id` on `day`, latest per name.
    pub fn custom_commands(&self, se_unique_id: &str, day: NaiveDate) -> ReportResult<Vec<CustomCommandRow>> {
        let (start, end) = day_bounds(day);
        self.timed("custom_commands", |conn| {
            let mut stmt = conn.prepare(
                "SELECT job_name, se_unique_id, tag_name, extra_xml, MAX(end_time)
                 FROM custom_command
                 WHERE end_time >= ?1 AND end_time < ?2 AND se_unique_id = ?3
                 GROUP BY job_name
                 ORDER BY job_name",
            )?;
            let raw = stmt
                .query_map(params![start, end, se_unique_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            raw.into_iter()
                .map(|(job_name, se_unique_id, tag_name, extra_xml, end)| {
                    Ok(CustomCommandRow {
                        job_name,
                        se_unique_id,
                        tag_name,
                        extra_xml,
                        end_time: parse_timestamp(&end)?,
                    })
                })
                .collect()
        })
    }
}

impl ParentLookup for ReportStore {
    /// One query for the whole batch: the ancestor chain is walked inside
    /// SQLite. Untimestamped topology rows count as older than any dated row.
    fn latest_at_or_before(&self, ids: &[EntityId], cutoff: NaiveDate) -> ReportResult<Vec<MeasurementSnapshot>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let (_, end) = day_bounds(cutoff);
        let placeholders = (0..ids.len()).map(|i| format!("?{}", i + 2)).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "WITH RECURSIVE
             latest AS (
                 SELECT unique_id, parent_id, name, space_type, implementation, version, site_name, status,
                        MAX(COALESCE(timestamp, '1970-01-01 00:00:00')) AS ts
                 FROM storage_element
                 WHERE timestamp < ?1 OR timestamp IS NULL
                 GROUP BY unique_id
             ),
             chain(unique_id) AS (
                 SELECT unique_id FROM latest WHERE unique_id IN ({placeholders})
                 UNION
                 SELECT latest.parent_id
                 FROM latest JOIN chain ON latest.unique_id = chain.unique_id
                 WHERE latest.parent_id IS NOT NULL
             )
             SELECT l.unique_id, l.parent_id, l.name, l.space_type, l.implementation, l.version,
                    l.site_name, l.status, l.ts
             FROM latest l JOIN chain c ON l.unique_id = c.unique_id
             ORDER BY l.unique_id"
        );
        self.timed("parent_lookup", |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let args = std::iter::once(end.as_str()).chain(ids.iter().map(String::as_str));
            let rows = stmt
                .query_map(params_from_iter(args), topology_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().flatten().collect())
        })
    }
}

/// Columns 0..=7: unique_id, parent_id, name, space_type, implementation,
/// version, site_name, status.
fn topology_from_row(row: &Row<'_>) -> rusqlite::Result<Option<MeasurementSnapshot>> {
    let unique_id: String = row.get(0)?;
    let space_type: String = row.get(3)?;
    let Some(kind) = SpaceKind::parse(&space_type) else {
        log::debug!("skipping {unique_id}: unrecognised space type {space_type}");
        return Ok(None);
    };
    let parent_id: Option<String> = row.get(1)?;
    let name: String = row.get(2)?;
    let mut snapshot = MeasurementSnapshot::topology(&unique_id, parent_id.as_deref(), &name, kind);
    snapshot.implementation = row.get(4)?;
    snapshot.version = row.get(5)?;
    snapshot.site_name = row.get(6)?;
    snapshot.status = Status::parse(&row.get::<_, String>(7)?);
    Ok(Some(snapshot))
}
