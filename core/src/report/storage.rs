//! Site storage report ("The {implementation} Chronicle"): capacity of one
//! storage element today against prior days, usage per path, pool health,
//! and site-defined command output.

use super::{section_header, table::Table, Report};
use crate::{
    clock::comparison_days,
    config::StorageReportConfig,
    delta::{
        capacity_summary, path_deltas, population_changes, population_stats, used_percent, CapacitySummary,
        PathDeltas, PopulationChanges, PopulationStats, Stat,
    },
    error::ReportResult,
    inventory::{InventoryTree, QuotaColumns},
    measurement::MeasurementSnapshot,
    store::{CustomCommandRow, ReportStore},
    types::gb,
};
use chrono::NaiveDate;
use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize)]
pub struct AreaSection {
    pub entity_id: String,
    pub name: String,
    pub columns: QuotaColumns,
    pub rows: Vec<PathDeltas>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolSection {
    pub stats: PopulationStats,
    /// `None` when there is no prior day to compare with.
    pub changes: Option<PopulationChanges>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    pub name: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteStorageReport {
    date: NaiveDate,
    comparison_days: Vec<i64>,
    se: MeasurementSnapshot,
    capacity: CapacitySummary,
    areas: Vec<AreaSection>,
    pools: Option<PoolSection>,
    commands: Vec<CommandOutput>,
    unresolved_parents: BTreeSet<String>,
}

impl SiteStorageReport {
    /// Resolve today's and each comparison day's inventory, then derive
    /// every figure the report shows. Fails when `se_name` does not name
    /// exactly one root storage element today.
    pub fn build(store: &ReportStore, config: &StorageReportConfig, date: NaiveDate) -> ReportResult<Self> {
        let trees = comparison_days(date, &config.comparison_days)
            .into_iter()
            .map(|day| {
                let measurements = store.measurements_for_day(&config.se_name, day)?;
                InventoryTree::resolve(day, measurements, store)
            })
            .collect::<ReportResult<Vec<_>>>()?;
        let commands = store.custom_commands(&format!("{0}:SE:{0}", config.se_name), date)?;
        Self::from_trees(&trees, &config.comparison_days, &config.se_name, &commands)
    }

    /// `trees[0]` is the report day; the rest follow `comparison_days`.
    pub fn from_trees(
        trees: &[InventoryTree],
        comparison_days: &[i64],
        se_name: &str,
        commands: &[CustomCommandRow],
    ) -> ReportResult<Self> {
        let Some((today, earlier)) = trees.split_first() else {
            return Err(anyhow::anyhow!("no inventory for the report day").into());
        };
        let se = today.sole_storage_element(se_name)?.clone();
        let all: Vec<&InventoryTree> = trees.iter().collect();
        let comparisons: Vec<&InventoryTree> = earlier.iter().collect();

        let mut area_nodes = today.areas(&se.entity_id);
        area_nodes.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        let areas = area_nodes
            .into_iter()
            .map(|area| AreaSection {
                entity_id: area.entity_id.clone(),
                name: area.name.clone(),
                columns: QuotaColumns::for_paths(today.paths(&se.entity_id, &area.entity_id)),
                rows: path_deltas(today, &comparisons, &se.entity_id, &area.entity_id),
            })
            .collect();

        let pool_nodes = today.pools();
        let pools = (!pool_nodes.is_empty()).then(|| PoolSection {
            stats: population_stats(pool_nodes.iter().copied(), |p| used_percent(p.used_space, p.total_space)),
            changes: comparisons.first().map(|prior| population_changes(today, prior)),
        });

        let commands = commands
            .iter()
            .filter_map(|c| match command_output(&c.extra_xml, &c.tag_name) {
                Ok(Some(output)) => Some(CommandOutput {
                    name: c.job_name.clone(),
                    output,
                }),
                Ok(None) => {
                    log::warn!("command {} has no <{}> output; skipped", c.job_name, c.tag_name);
                    None
                }
                Err(e) => {
                    log::warn!("command {} output is not valid XML ({e}); skipped", c.job_name);
                    None
                }
            })
            .collect();

        Ok(Self {
            date: today.day(),
            comparison_days: comparison_days.to_vec(),
            capacity: capacity_summary(&all, &se.entity_id),
            se,
            areas,
            pools,
            commands,
            unresolved_parents: today.unresolved_parents().clone(),
        })
    }

    pub fn areas(&self) -> &[AreaSection] {
        &self.areas
    }

    pub fn pools(&self) -> Option<&PoolSection> {
        self.pools.as_ref()
    }

    pub fn commands(&self) -> &[CommandOutput] {
        &self.commands
    }

    pub fn capacity(&self) -> &CapacitySummary {
        &self.capacity
    }

    fn render_global(&self) -> String {
        let mut headers = vec!["".to_string(), "Today".to_string()];
        headers.extend(self.comparison_days.iter().map(|d| day_label(*d)));
        let header_refs: Vec<&str> = headers.iter().map(String::as_str).collect();
        let mut table = Table::new(&header_refs);

        let c = &self.capacity;
        let gb_row = |label: &str, values: &[Option<u64>]| -> Vec<String> {
            std::iter::once(label.to_string()).chain(values.iter().map(|v| gb_cell(*v))).collect()
        };
        table.add_row(gb_row("Total Space (GB)", &c.total));
        table.add_row(gb_row("Free Space (GB)", &c.free));
        table.add_row(gb_row("Used Space (GB)", &c.used));
        table.add_row(
            std::iter::once("Used Percentage".to_string())
                .chain(c.used_percent.iter().map(|s| rounded_percent(*s)))
                .collect(),
        );
        format!("{}{}\n", section_header("Global Storage"), table.plain_text())
    }

    fn render_area(&self, area: &AreaSection) -> String {
        let changes: Vec<String> = self.comparison_days.iter().map(|d| format!("{d} Day Change")).collect();
        let mut headers = vec!["Path".to_string(), "Size(GB)".to_string()];
        headers.extend(changes.iter().cloned());
        if area.columns.space_remaining {
            headers.push("Remaining".into());
        }
        headers.push("# Files".into());
        headers.extend(changes.iter().cloned());
        if area.columns.files_remaining {
            headers.push("Remaining".into());
        }
        let header_refs: Vec<&str> = headers.iter().map(String::as_str).collect();
        let mut table = Table::new(&header_refs);

        for row in &area.rows {
            let mut cells = vec![row.name.clone(), gb_cell(row.used_space)];
            cells.extend(row.used_changes.iter().map(|d| d.render_gb()));
            if area.columns.space_remaining {
                cells.push(row.space_remaining.render_gb());
            }
            cells.push(row.file_count.map_or_else(|| "UNKNOWN".into(), |n| n.to_string()));
            cells.extend(row.file_changes.iter().map(|d| d.render_count()));
            if area.columns.files_remaining {
                cells.push(row.files_remaining.render_count());
            }
            table.add_row(cells);
        }
        format!("{}{}\n", section_header(&area.name), table.plain_text())
    }

    fn render_pools(&self, pools: &PoolSection) -> String {
        let names = |set: &BTreeSet<String>| {
            if set.is_empty() {
                "none".to_string()
            } else {
                set.iter().cloned().collect::<Vec<_>>().join(", ")
            }
        };
        let mut text = section_header("Pools");
        text += &format!("Alive: {}  Offline: {}\n", pools.stats.alive, pools.stats.offline);
        text += &format!(
            "Used percentage: mean {}, std dev {}\n",
            pools.stats.mean.render_percent(1),
            pools.stats.stddev.render_percent(1)
        );
        if let Some(changes) = &pools.changes {
            text += &format!("New pools: {}\n", names(&changes.new));
            text += &format!("Dead pools: {}\n", names(&changes.dead));
        }
        text + "\n"
    }
}

impl Report for SiteStorageReport {
    fn name(&self) -> &'static str {
        "site_storage_report"
    }

    fn subject(&self) -> String {
        format!(
            "The {} Chronicle | {} % | {}",
            self.se.implementation.as_deref().unwrap_or("UNKNOWN"),
            used_percent(self.se.used_space, self.se.total_space).render_rounded(),
            self.date.format("%Y-%m-%d")
        )
    }

    fn generate_plain(&self) -> String {
        let rule = "=".repeat(60);
        let mut text = format!("{rule}\n  {}\n{rule}\n\n", self.subject());
        text += &self.render_global();
        for area in &self.areas {
            text += &self.render_area(area);
        }
        if let Some(pools) = &self.pools {
            text += &self.render_pools(pools);
        }
        for command in &self.commands {
            let header = section_header(&command.name);
            let dashes = header.lines().next().unwrap_or_default();
            text += &format!("{header}{dashes}\n{}\n", command.output);
        }
        if !self.unresolved_parents.is_empty() {
            let ids: Vec<&str> = self.unresolved_parents.iter().map(String::as_str).collect();
            text += &format!("\nUnresolved parents: {}\n", ids.join(", "));
        }
        log::info!("\n{text}");
        text
    }
}

fn day_label(days_back: i64) -> String {
    match days_back {
        1 => "Yesterday".into(),
        7 => "One Week".into(),
        d => format!("{d} Days Ago"),
    }
}

fn gb_cell(bytes: Option<u64>) -> String {
    bytes.map_or_else(|| "UNKNOWN".into(), |b| gb(b as i64).to_string())
}

fn rounded_percent(s: Stat) -> String {
    match s {
        Stat::Value(_) => format!("{}%", s.render_rounded()),
        Stat::Unknown => "UNKNOWN".into(),
    }
}

/// Text of the first `<tag>` element in a command's XML payload.
pub fn command_output(xml: &str, tag: &str) -> ReportResult<Option<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut inside = false;
    loop {
        match reader.read_event()? {
            XmlEvent::Start(e) if e.name().as_ref() == tag.as_bytes() => inside = true,
            XmlEvent::Text(t) if inside => {
                return Ok(Some(t.unescape()?.into_owned()));
            }
            XmlEvent::CData(c) if inside => {
                return Ok(Some(String::from_utf8_lossy(c.as_ref()).into_owned()));
            }
            XmlEvent::End(e) if inside && e.name().as_ref() == tag.as_bytes() => return Ok(None),
            XmlEvent::Eof => return Ok(None),
            _ => {}
        }
    }
}
