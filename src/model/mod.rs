//! Typed row models for the record container and the joined event tables.
//!
//! Every table in the container maps to exactly one row struct here, and
//! every event kind to one [`EventKind`] variant. Table and column names are
//! an explicit enumerated mapping validated at load time, never looked up by
//! dynamic name.

use std::sync::Arc;

use chrono::NaiveDate;

/// Person identifier, shared across the population and event tables
pub type PersonId = u64;
/// Area identifier, the finest geography level
pub type AreaId = u64;
/// Location group identifier referenced by `{spec}_ids` event columns
pub type GroupId = u64;
/// Resolved region name; reference-counted because every joined event
/// carries one
pub type RegionName = Arc<str>;

/// One person from the `population` table. Immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub id: PersonId,
    pub age: u32,
    pub area_id: AreaId,
}

/// One row of the `areas` table
#[derive(Debug, Clone)]
pub struct AreaRow {
    pub id: AreaId,
    pub name: String,
    pub super_area_id: u64,
}

/// One row of the `super_areas` table
#[derive(Debug, Clone)]
pub struct SuperAreaRow {
    pub id: u64,
    pub name: String,
    pub region_id: u64,
}

/// One row of the `regions` table
#[derive(Debug, Clone)]
pub struct RegionRow {
    pub id: u64,
    pub name: String,
}

/// One row of the `locations` table
#[derive(Debug, Clone)]
pub struct LocationRow {
    pub id: u64,
    pub group_id: GroupId,
    pub spec: String,
}

/// One raw event row, before any join. The timestamp is carried as the
/// container's text value and parsed during the population join.
#[derive(Debug, Clone)]
pub struct EventRow {
    pub person_id: PersonId,
    pub timestamp: String,
    /// Location spec carried directly on the event (infections, deaths)
    pub location_spec: Option<String>,
    /// Location group reference from a `{spec}_ids` column
    pub group_id: Option<GroupId>,
}

/// An event enriched with population attributes and resolved geography
#[derive(Debug, Clone)]
pub struct JoinedEvent {
    pub person_id: PersonId,
    pub date: NaiveDate,
    pub age: u32,
    pub region: RegionName,
    pub location_spec: Option<String>,
    /// Location group reference, kept so location-scoped kinds can join
    /// location metadata after the geography join
    pub group_id: Option<GroupId>,
}

/// The event kinds recorded in the container, each mapping to exactly one
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Infections,
    Deaths,
    HospitalAdmissions,
    IcuAdmissions,
    Discharges,
    Recoveries,
}

impl EventKind {
    /// All event kinds, in pipeline processing order
    pub const ALL: [Self; 6] = [
        Self::Infections,
        Self::Deaths,
        Self::HospitalAdmissions,
        Self::IcuAdmissions,
        Self::Discharges,
        Self::Recoveries,
    ];

    /// Name of the container table holding this event kind
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Infections => "infections",
            Self::Deaths => "deaths",
            Self::HospitalAdmissions => "hospital_admissions",
            Self::IcuAdmissions => "icu_admissions",
            Self::Discharges => "discharges",
            Self::Recoveries => "recoveries",
        }
    }

    /// Name of the column holding the person id for this event kind
    #[must_use]
    pub const fn person_column(self) -> &'static str {
        match self {
            Self::Infections => "infected_ids",
            Self::Deaths => "dead_person_ids",
            Self::HospitalAdmissions | Self::IcuAdmissions | Self::Discharges => "patient_ids",
            Self::Recoveries => "recovered_person_ids",
        }
    }

    /// Column carrying a location spec directly on the event, if any
    #[must_use]
    pub const fn location_spec_column(self) -> Option<&'static str> {
        match self {
            Self::Infections | Self::Deaths => Some("location_specs"),
            _ => None,
        }
    }

    /// Column referencing a location group id, if this kind is
    /// location-scoped. The column is named `{spec}_ids` after the location
    /// spec the kind is scoped to.
    #[must_use]
    pub const fn group_column(self) -> Option<&'static str> {
        match self {
            Self::HospitalAdmissions | Self::IcuAdmissions | Self::Discharges => {
                Some("hospital_ids")
            }
            _ => None,
        }
    }

    /// Location spec the kind is scoped to, if any
    #[must_use]
    pub const fn location_scope(self) -> Option<&'static str> {
        match self {
            Self::HospitalAdmissions | Self::IcuAdmissions | Self::Discharges => Some("hospital"),
            _ => None,
        }
    }

    /// Output column prefix for this kind's flow series
    #[must_use]
    pub const fn metric_name(self) -> &'static str {
        match self {
            Self::Infections => "infected",
            Self::Deaths => "deaths",
            Self::HospitalAdmissions => "hospital_admissions",
            Self::IcuAdmissions => "icu_admissions",
            Self::Discharges => "discharges",
            Self::Recoveries => "recovered",
        }
    }
}

/// Aggregation and gap-fill policy for an output series.
///
/// Declared where each series is defined, never inferred from its name:
/// flow series aggregate by sum and zero-fill calendar gaps, stock series
/// aggregate by mean and carry values forward (then back) across gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    /// Per-day event count, e.g. new infections
    Flow,
    /// Per-day count of entities currently in a state, e.g. currently
    /// hospitalized
    Stock,
}
