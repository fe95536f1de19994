use super::{format_timestamp, parse_timestamp, JobRow, ReportStore};
use crate::{
    clock::ReportWindow,
    correlator::AccountingJob,
    error::ReportResult,
    overflow::{JobClass, JobClassTotals, JobFilter, SiteScope},
};
use rusqlite::{params, params_from_iter, types::Value};

impl ReportStore {
    pub fn insert_job(&self, job: &JobRow) -> ReportResult<()> {
        self.conn.execute(
            "INSERT INTO job_usage_record
             (local_job_id, common_name, host, host_description, resource_type, probe_name,
              start_time, end_time, wall_duration, cpu_user_duration, cpu_system_duration,
              exit_code, app_info)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                job.local_job_id,
                job.common_name,
                job.host,
                job.host_description,
                job.resource_type,
                job.probe_name,
                format_timestamp(job.start_time),
                format_timestamp(job.end_time),
                job.wall_duration,
                job.cpu_user_duration,
                job.cpu_system_duration,
                job.exit_code,
                job.app_info,
            ],
        )?;
        Ok(())
    }

    /// Sums for one job class and scope over jobs ending in `window`.
    /// Jobs that never reported an exit code are not counted.
    pub fn job_class_totals(
        &self,
        filter: &JobFilter,
        window: &ReportWindow,
        class: JobClass,
        scope: &SiteScope,
    ) -> ReportResult<JobClassTotals> {
        let mut args: Vec<Value> = vec![
            Value::Text(format_timestamp(window.earliest)),
            Value::Text(format_timestamp(window.latest)),
            Value::Text(filter.resource_type.clone()),
            Value::Text(filter.probe_name.clone()),
            Value::Text(format!("%{}", filter.overflow_host_suffix)),
            Value::Real(filter.efficiency_threshold),
        ];
        let class_clause = match class {
            JobClass::Overflow => "host_description LIKE ?5",
            JobClass::Normal => "host_description NOT LIKE ?5",
        };
        let scope_clause = match scope {
            SiteScope::AllSites => String::new(),
            SiteScope::Sites { sites, .. } => {
                let mut terms = Vec::new();
                for site in sites {
                    args.push(Value::Text(format!("%{site}%")));
                    terms.push(format!("host_description LIKE ?{}", args.len()));
                }
                format!("AND ({})", terms.join(" OR "))
            }
        };
        let codes = exit_code_list(&filter.retry_exhausted_exit_codes);

        let sql = format!(
            "SELECT COUNT(*),
                    COALESCE(SUM(wall_duration), 0),
                    COALESCE(SUM(cpu_user_duration + cpu_system_duration), 0),
                    COALESCE(SUM(CASE WHEN exit_code = 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN exit_code = 0 THEN wall_duration ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN exit_code IN ({codes}) THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN exit_code IN ({codes}) THEN wall_duration ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN wall_duration > 0
                                       AND (cpu_user_duration + cpu_system_duration) / wall_duration > ?6
                                      THEN 1 ELSE 0 END), 0)
             FROM job_usage_record
             WHERE end_time >= ?1 AND end_time < ?2
               AND resource_type = ?3 AND probe_name = ?4
               AND exit_code IS NOT NULL
               AND {class_clause}
               {scope_clause}"
        );

        self.timed("job_class_totals", |conn| {
            let totals = conn.query_row(&sql, params_from_iter(args.iter()), |row| {
                Ok(JobClassTotals {
                    jobs: row.get::<_, i64>(0)?.max(0) as u64,
                    wall: row.get(1)?,
                    cpu: row.get(2)?,
                    exit_zero_jobs: row.get::<_, i64>(3)?.max(0) as u64,
                    exit_zero_wall: row.get(4)?,
                    retry_exhausted_jobs: row.get::<_, i64>(5)?.max(0) as u64,
                    retry_exhausted_wall: row.get(6)?,
                    efficient_jobs: row.get::<_, i64>(7)?.max(0) as u64,
                })
            })?;
            Ok(totals)
        })
    }

    /// Overflow jobs ending in `window` whose exit code says every
    /// fallback failed. These are the jobs the correlator explains; jobs
    /// without an execution host are left out.
    pub fn retry_exhausted_jobs(&self, filter: &JobFilter, window: &ReportWindow) -> ReportResult<Vec<AccountingJob>> {
        let codes = exit_code_list(&filter.retry_exhausted_exit_codes);
        let sql = format!(
            "SELECT local_job_id, COALESCE(common_name, ''), host,
                    start_time, end_time, app_info
             FROM job_usage_record
             WHERE end_time >= ?1 AND end_time < ?2
               AND resource_type = ?3
               AND host IS NOT NULL AND host <> ''
               AND exit_code IN ({codes})
               AND host_description LIKE ?4
             ORDER BY end_time, local_job_id"
        );
        self.timed("retry_exhausted_jobs", |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let raw = stmt
                .query_map(
                    params![
                        format_timestamp(window.earliest),
                        format_timestamp(window.latest),
                        filter.resource_type,
                        format!("%{}", filter.overflow_host_suffix),
                    ],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, Option<String>>(5)?,
                        ))
                    },
                )?
                .collect::<Result<Vec<_>, _>>()?;
            raw.into_iter()
                .map(|(local_job_id, user, host, start, end, application)| {
                    Ok(AccountingJob {
                        local_job_id,
                        user,
                        host,
                        start: parse_timestamp(&start)?,
                        end: parse_timestamp(&end)?,
                        application,
                    })
                })
                .collect()
        })
    }
}

/// Integer literals for an `IN (...)` list; never empty.
fn exit_code_list(codes: &[i64]) -> String {
    if codes.is_empty() {
        return "NULL".into();
    }
    codes.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")
}
