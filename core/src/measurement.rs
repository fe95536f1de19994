//! Measurement snapshots: one storage entity's state as of a timestamp.
//!
//! Every capacity metric is an `Option`: `None` is UNKNOWN and is never
//! coerced to zero anywhere downstream.

use crate::types::EntityId;
use serde::{Deserialize, Serialize};

/// Position of an entity in the storage hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SpaceKind {
    /// Site-level storage element (Gratia SpaceType `SE`).
    Se,
    Area,
    Pool,
    Directory,
    Quota,
}

impl SpaceKind {
    /// Parse a Gratia SpaceType. Unknown types are not part of any inventory.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SE" => Some(Self::Se),
            "Area" => Some(Self::Area),
            "Pool" => Some(Self::Pool),
            "Directory" => Some(Self::Directory),
            "Quota" => Some(Self::Quota),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Se => "SE",
            Self::Area => "Area",
            Self::Pool => "Pool",
            Self::Directory => "Directory",
            Self::Quota => "Quota",
        }
    }

    /// Directories and quotas are the leaves that carry per-path usage.
    pub fn is_path(&self) -> bool {
        matches!(self, Self::Directory | Self::Quota)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasurementType {
    Raw,
    Logical,
}

impl MeasurementType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Some(Self::Raw),
            "logical" => Some(Self::Logical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Logical => "logical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Production,
    Other,
}

impl Status {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("production") {
            Self::Production
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "Production",
            Self::Other => "Other",
        }
    }
}

/// Where a node's attributes came from when it entered an inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// Measured on the inventory's own day.
    Measured,
    /// Topology-only record from the most recent prior appearance.
    PriorSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSnapshot {
    pub entity_id: EntityId,
    /// `None` means no known parent as of this snapshot.
    pub parent_id: Option<EntityId>,
    pub name: String,
    pub kind: SpaceKind,
    pub measurement_type: Option<MeasurementType>,
    pub total_space: Option<u64>,
    pub free_space: Option<u64>,
    pub used_space: Option<u64>,
    pub file_count: Option<u64>,
    pub file_count_limit: Option<u64>,
    pub status: Status,
    pub implementation: Option<String>,
    pub version: Option<String>,
    pub site_name: Option<String>,
    pub origin: Origin,
}

impl MeasurementSnapshot {
    /// A topology-only snapshot: identity and placement, no metrics.
    pub fn topology(entity_id: &str, parent_id: Option<&str>, name: &str, kind: SpaceKind) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            parent_id: parent_id.map(str::to_string),
            name: name.to_string(),
            kind,
            measurement_type: None,
            total_space: None,
            free_space: None,
            used_space: None,
            file_count: None,
            file_count_limit: None,
            status: Status::Production,
            implementation: None,
            version: None,
            site_name: None,
            origin: Origin::Measured,
        }
    }

    /// Logical SE rows are rollups of a physical SE and would double count.
    pub fn is_logical_rollup(&self) -> bool {
        self.kind == SpaceKind::Se && self.measurement_type == Some(MeasurementType::Logical)
    }

    /// A remaining-space figure is meaningful only when free space was reported.
    pub fn is_space_quota_bearing(&self) -> bool {
        self.free_space.is_some()
    }

    /// File quotas are enforced only with a positive limit.
    pub fn is_file_quota_bearing(&self) -> bool {
        matches!(self.file_count_limit, Some(limit) if limit > 0)
    }

    pub fn is_production(&self) -> bool {
        self.status == Status::Production
    }
}
