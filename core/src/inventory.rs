//! Hierarchical inventory resolver: rebuilds one day's storage forest
//! (SE → area → directory/quota, SE → pool) from that day's measurements.
//!
//! Design:
//!   - Logical SE rows are dropped before anything else.
//!   - Parents missing from the day's measurements are fetched from the most
//!     recent prior topology record, together with their ancestors, in ONE
//!     batched lookup. Never one lookup per missing parent or per level.
//!   - A fetched parent keeps the attributes of its last real appearance;
//!     nothing is invented. Parents found nowhere are reported as unresolved.
//!   - The tree is immutable once built.

use crate::{
    error::{ReportError, ReportResult},
    measurement::{MeasurementSnapshot, MeasurementType, Origin, SpaceKind},
    types::EntityId,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{btree_map::Entry, BTreeMap, BTreeSet};

/// Fallback source for parents absent from a day's snapshot.
pub trait ParentLookup {
    /// Most recent topology record at or before `cutoff` for every id in
    /// `ids` and for every ancestor reachable from those records. Ids
    /// without any record are simply absent from the result.
    fn latest_at_or_before(
        &self,
        ids: &[EntityId],
        cutoff: NaiveDate,
    ) -> ReportResult<Vec<MeasurementSnapshot>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventoryTree {
    day: NaiveDate,
    nodes: BTreeMap<EntityId, MeasurementSnapshot>,
    unresolved: BTreeSet<EntityId>,
}

/// Which optional "Remaining" columns a path table needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QuotaColumns {
    pub space_remaining: bool,
    pub files_remaining: bool,
}

impl QuotaColumns {
    pub fn for_paths<'a>(paths: impl IntoIterator<Item = &'a MeasurementSnapshot>) -> Self {
        paths.into_iter().fold(Self::default(), |acc, p| Self {
            space_remaining: acc.space_remaining || p.is_space_quota_bearing(),
            files_remaining: acc.files_remaining || p.is_file_quota_bearing(),
        })
    }
}

impl InventoryTree {
    pub fn resolve(
        day: NaiveDate,
        measurements: Vec<MeasurementSnapshot>,
        lookup: &dyn ParentLookup,
    ) -> ReportResult<Self> {
        let mut nodes: BTreeMap<EntityId, MeasurementSnapshot> = BTreeMap::new();
        for m in measurements {
            if m.is_logical_rollup() {
                log::debug!("day={day} skipping logical SE rollup {}", m.entity_id);
                continue;
            }
            match nodes.entry(m.entity_id.clone()) {
                Entry::Vacant(e) => {
                    e.insert(m);
                }
                Entry::Occupied(mut e) => {
                    if outranks(&m, e.get()) {
                        e.insert(m);
                    }
                }
            }
        }

        let missing: Vec<EntityId> = missing_parents(&nodes).into_iter().collect();
        if !missing.is_empty() {
            log::debug!(
                "day={day} fetching {} missing parents and their ancestors from prior snapshots",
                missing.len()
            );
            for mut parent in lookup.latest_at_or_before(&missing, day)? {
                parent.origin = Origin::PriorSnapshot;
                nodes.entry(parent.entity_id.clone()).or_insert(parent);
            }
        }

        let unresolved = missing_parents(&nodes);
        for id in &unresolved {
            log::warn!("day={day} parent {id} has no record at or before this day");
        }

        Ok(Self { day, nodes, unresolved })
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&MeasurementSnapshot> {
        self.nodes.get(id)
    }

    /// All nodes in entity-id order.
    pub fn nodes(&self) -> impl Iterator<Item = &MeasurementSnapshot> {
        self.nodes.values()
    }

    /// Parent ids referenced in the tree but found in no snapshot.
    pub fn unresolved_parents(&self) -> &BTreeSet<EntityId> {
        &self.unresolved
    }

    /// Root storage elements: SE nodes whose id is `{name}:SE:{name}`.
    pub fn storage_elements(&self) -> Vec<&MeasurementSnapshot> {
        self.nodes
            .values()
            .filter(|n| n.kind == SpaceKind::Se && n.entity_id == format!("{0}:SE:{0}", n.name))
            .collect()
    }

    /// The single root SE a report is about. Zero or several is fatal.
    pub fn sole_storage_element(&self, se_name: &str) -> ReportResult<&MeasurementSnapshot> {
        let ses = self.storage_elements();
        match ses.as_slice() {
            [se] => Ok(*se),
            [] => Err(ReportError::NoMatchingStorageElement {
                name: se_name.to_string(),
            }),
            many => Err(ReportError::MultipleStorageElements {
                name: se_name.to_string(),
                count: many.len(),
            }),
        }
    }

    pub fn areas(&self, se_id: &str) -> Vec<&MeasurementSnapshot> {
        let areas: Vec<_> = self
            .nodes
            .values()
            .filter(|n| n.kind == SpaceKind::Area && n.parent_id.as_deref() == Some(se_id))
            .collect();
        log::info!(
            "Areas we have recorded for SE {se_id}: {}",
            areas.iter().map(|a| a.entity_id.as_str()).collect::<Vec<_>>().join(", ")
        );
        areas
    }

    /// Directories and quotas directly under `area_id`, itself under `se_id`.
    pub fn paths(&self, se_id: &str, area_id: &str) -> Vec<&MeasurementSnapshot> {
        let area_under_se = self
            .nodes
            .get(area_id)
            .map_or(false, |a| a.parent_id.as_deref() == Some(se_id));
        if !area_under_se {
            return Vec::new();
        }
        self.nodes
            .values()
            .filter(|n| n.kind.is_path() && n.parent_id.as_deref() == Some(area_id))
            .collect()
    }

    pub fn pools(&self) -> Vec<&MeasurementSnapshot> {
        self.nodes
            .values()
            .filter(|n| n.kind == SpaceKind::Pool)
            .collect()
    }
}

/// Parent ids referenced by some node but not present themselves.
fn missing_parents(nodes: &BTreeMap<EntityId, MeasurementSnapshot>) -> BTreeSet<EntityId> {
    nodes
        .values()
        .filter_map(|n| n.parent_id.as_ref())
        .filter(|p| !nodes.contains_key(*p))
        .cloned()
        .collect()
}

/// A physical measurement replaces a logical one for the same entity.
fn outranks(candidate: &MeasurementSnapshot, current: &MeasurementSnapshot) -> bool {
    current.measurement_type == Some(MeasurementType::Logical)
        && candidate.measurement_type != Some(MeasurementType::Logical)
}
