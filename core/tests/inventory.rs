//! Hierarchical inventory resolver.
//!
//! Verifies:
//! 1. All missing parents, and their ancestors, are fetched in a single lookup call
//! 2. Fetched parents keep their prior attributes and are marked as such
//! 3. Parents found nowhere are reported, not invented
//! 4. Logical SE rollups never enter the tree
//! 5. The root SE must be unique; zero or several is a configuration error
//! 6. Quota columns appear only when some path carries a quota

use chrono::NaiveDate;
use gratia_core::{
    error::{ReportError, ReportResult},
    inventory::{InventoryTree, ParentLookup, QuotaColumns},
    measurement::{MeasurementSnapshot, MeasurementType, Origin, SpaceKind},
    types::EntityId,
};
use std::cell::RefCell;

/// Serves prior topology from a fixed list, walking up the parent chain
/// like the store does, and records every call.
struct CountingLookup {
    prior: Vec<MeasurementSnapshot>,
    calls: RefCell<Vec<Vec<EntityId>>>,
}

impl CountingLookup {
    fn new(prior: Vec<MeasurementSnapshot>) -> Self {
        Self {
            prior,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl ParentLookup for CountingLookup {
    fn latest_at_or_before(&self, ids: &[EntityId], _cutoff: NaiveDate) -> ReportResult<Vec<MeasurementSnapshot>> {
        self.calls.borrow_mut().push(ids.to_vec());
        let mut wanted: Vec<EntityId> = ids.to_vec();
        let mut found: Vec<MeasurementSnapshot> = Vec::new();
        while let Some(id) = wanted.pop() {
            if found.iter().any(|f| f.entity_id == id) {
                continue;
            }
            if let Some(p) = self.prior.iter().find(|p| p.entity_id == id) {
                wanted.extend(p.parent_id.clone());
                found.push(p.clone());
            }
        }
        found.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Ok(found)
    }
}

const SE_ID: &str = "srm.unl.edu:SE:srm.unl.edu";

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2012, 4, 5).unwrap()
}

fn node(id: &str, parent: Option<&str>, kind: SpaceKind) -> MeasurementSnapshot {
    MeasurementSnapshot::topology(id, parent, id, kind)
}

fn root_se() -> MeasurementSnapshot {
    let mut se = MeasurementSnapshot::topology(SE_ID, None, "srm.unl.edu", SpaceKind::Se);
    se.measurement_type = Some(MeasurementType::Raw);
    se.total_space = Some(1_000);
    se.used_space = Some(400);
    se
}

#[test]
fn missing_parents_are_fetched_in_one_call() {
    let measurements = vec![
        root_se(),
        node("dir-1", Some("area-1"), SpaceKind::Directory),
        node("dir-2", Some("area-2"), SpaceKind::Directory),
        node("dir-3", Some("area-3"), SpaceKind::Directory),
        node("dir-4", Some("area-1"), SpaceKind::Quota),
    ];
    let lookup = CountingLookup::new(vec![
        node("area-1", Some(SE_ID), SpaceKind::Area),
        node("area-2", Some(SE_ID), SpaceKind::Area),
        node("area-3", Some(SE_ID), SpaceKind::Area),
    ]);

    let tree = InventoryTree::resolve(day(), measurements, &lookup).unwrap();

    assert_eq!(lookup.call_count(), 1, "three missing parents must be one batched lookup");
    assert_eq!(lookup.calls.borrow()[0], vec!["area-1", "area-2", "area-3"]);
    assert_eq!(tree.len(), 8);
    assert!(tree.unresolved_parents().is_empty());
}

#[test]
fn missing_ancestors_come_in_the_same_call() {
    // Today only has leaves; both areas and the SE come from prior days.
    let measurements = vec![
        node("dir-1", Some("area-1"), SpaceKind::Directory),
        node("dir-2", Some("area-2"), SpaceKind::Directory),
    ];
    let lookup = CountingLookup::new(vec![
        node("area-1", Some(SE_ID), SpaceKind::Area),
        node("area-2", Some(SE_ID), SpaceKind::Area),
        root_se(),
    ]);

    let tree = InventoryTree::resolve(day(), measurements, &lookup).unwrap();

    assert_eq!(lookup.call_count(), 1, "areas and the shared SE in one call");
    assert_eq!(lookup.calls.borrow()[0], vec!["area-1", "area-2"]);
    assert_eq!(tree.get(SE_ID).unwrap().origin, Origin::PriorSnapshot);
    assert_eq!(tree.get("area-2").unwrap().origin, Origin::PriorSnapshot);
    assert!(tree.unresolved_parents().is_empty());
}

#[test]
fn measured_nodes_win_over_fetched_ancestors() {
    let lookup = CountingLookup::new(vec![
        node("area-1", Some(SE_ID), SpaceKind::Area),
        MeasurementSnapshot::topology(SE_ID, None, "srm.unl.edu", SpaceKind::Se),
    ]);
    let tree = InventoryTree::resolve(
        day(),
        vec![root_se(), node("dir-1", Some("area-1"), SpaceKind::Directory)],
        &lookup,
    )
    .unwrap();

    assert_eq!(lookup.call_count(), 1);
    let se = tree.get(SE_ID).unwrap();
    assert_eq!(se.origin, Origin::Measured);
    assert_eq!(se.used_space, Some(400));
}

#[test]
fn fetched_parents_keep_prior_attributes() {
    let mut prior_area = node("area-1", Some(SE_ID), SpaceKind::Area);
    prior_area.name = "/store".into();
    prior_area.version = Some("0.20".into());
    let lookup = CountingLookup::new(vec![prior_area]);

    let tree = InventoryTree::resolve(
        day(),
        vec![root_se(), node("dir-1", Some("area-1"), SpaceKind::Directory)],
        &lookup,
    )
    .unwrap();

    let area = tree.get("area-1").expect("area resolved from prior snapshot");
    assert_eq!(area.origin, Origin::PriorSnapshot);
    assert_eq!(area.name, "/store");
    assert_eq!(area.version.as_deref(), Some("0.20"));
    assert_eq!(area.used_space, None, "no metrics are invented for fetched parents");
    assert_eq!(tree.get("dir-1").unwrap().origin, Origin::Measured);
}

#[test]
fn unknown_parents_are_reported() {
    let lookup = CountingLookup::new(Vec::new());
    let tree = InventoryTree::resolve(
        day(),
        vec![root_se(), node("dir-1", Some("ghost"), SpaceKind::Directory)],
        &lookup,
    )
    .unwrap();

    assert_eq!(lookup.call_count(), 1, "an unresolvable parent is not retried");
    assert!(tree.unresolved_parents().contains("ghost"));
    assert!(tree.get("ghost").is_none());
}

#[test]
fn logical_se_rows_are_dropped() {
    let mut logical = root_se();
    logical.measurement_type = Some(MeasurementType::Logical);
    logical.used_space = Some(999);

    let tree = InventoryTree::resolve(day(), vec![logical.clone(), root_se()], &CountingLookup::new(vec![])).unwrap();
    assert_eq!(tree.get(SE_ID).unwrap().used_space, Some(400), "raw row wins");

    let only_logical = InventoryTree::resolve(day(), vec![logical], &CountingLookup::new(vec![])).unwrap();
    assert!(only_logical.is_empty());
}

#[test]
fn root_se_must_be_unique() {
    let lookup = CountingLookup::new(vec![]);
    let none = InventoryTree::resolve(day(), vec![node("area-1", None, SpaceKind::Area)], &lookup).unwrap();
    assert!(matches!(
        none.sole_storage_element("srm.unl.edu"),
        Err(ReportError::NoMatchingStorageElement { .. })
    ));

    let mut other = MeasurementSnapshot::topology("b.edu:SE:b.edu", None, "b.edu", SpaceKind::Se);
    other.measurement_type = Some(MeasurementType::Raw);
    let two = InventoryTree::resolve(day(), vec![root_se(), other], &lookup).unwrap();
    assert!(matches!(
        two.sole_storage_element("srm.unl.edu"),
        Err(ReportError::MultipleStorageElements { count: 2, .. })
    ));

    let one = InventoryTree::resolve(day(), vec![root_se()], &lookup).unwrap();
    assert_eq!(one.sole_storage_element("srm.unl.edu").unwrap().entity_id, SE_ID);
}

#[test]
fn paths_require_area_under_the_se() {
    let lookup = CountingLookup::new(vec![]);
    let tree = InventoryTree::resolve(
        day(),
        vec![
            root_se(),
            node("area-1", Some(SE_ID), SpaceKind::Area),
            node("stray-area", Some("elsewhere"), SpaceKind::Area),
            node("dir-1", Some("area-1"), SpaceKind::Directory),
            node("dir-2", Some("stray-area"), SpaceKind::Directory),
            node("pool-1", Some("area-1"), SpaceKind::Pool),
        ],
        &lookup,
    )
    .unwrap();

    let paths: Vec<_> = tree.paths(SE_ID, "area-1").iter().map(|p| p.entity_id.clone()).collect();
    assert_eq!(paths, vec!["dir-1"], "pools are not paths");
    assert!(tree.paths(SE_ID, "stray-area").is_empty());
    assert_eq!(tree.areas(SE_ID).len(), 1);
}

#[test]
fn quota_columns_follow_quota_signals() {
    let mut plain = node("dir-1", Some("area-1"), SpaceKind::Directory);
    plain.file_count_limit = Some(0);
    let mut space_quota = node("dir-2", Some("area-1"), SpaceKind::Quota);
    space_quota.free_space = Some(10);
    let mut file_quota = node("dir-3", Some("area-1"), SpaceKind::Quota);
    file_quota.file_count_limit = Some(1_000);

    assert_eq!(QuotaColumns::for_paths([&plain]), QuotaColumns::default());
    assert_eq!(
        QuotaColumns::for_paths([&plain, &space_quota]),
        QuotaColumns {
            space_remaining: true,
            files_remaining: false
        }
    );
    assert_eq!(
        QuotaColumns::for_paths([&plain, &file_quota]),
        QuotaColumns {
            space_remaining: false,
            files_remaining: true
        }
    );
}
