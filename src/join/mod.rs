//! Joining raw event tables against population, geography and location
//! metadata.
//!
//! All joins are inner joins: rows with unresolved references are dropped,
//! never defaulted. Every join returns a [`JoinReport`] so the drop counts
//! are reported rather than lost.

use std::sync::Arc;

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::error::{PipelineError, Result};
use crate::geography::GeographyIndex;
use crate::model::{AreaId, EventRow, GroupId, JoinedEvent, LocationRow, Person, PersonId};

/// Row accounting for one join stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinReport {
    pub input_rows: usize,
    pub joined_rows: usize,
    pub dropped_rows: usize,
}

impl JoinReport {
    fn new(input_rows: usize, joined_rows: usize) -> Self {
        Self {
            input_rows,
            joined_rows,
            dropped_rows: input_rows - joined_rows,
        }
    }

    /// Log the report; dropped rows are a warning, clean joins a debug line
    pub fn log(&self, stage: &str) {
        if self.dropped_rows > 0 {
            log::warn!(
                "{stage}: dropped {} of {} rows with unresolved references",
                self.dropped_rows,
                self.input_rows
            );
        } else {
            log::debug!("{stage}: joined {} rows", self.joined_rows);
        }
    }
}

/// An event joined with population attributes but not yet with geography
#[derive(Debug, Clone)]
pub struct PersonEvent {
    pub person_id: PersonId,
    pub date: NaiveDate,
    pub age: u32,
    pub area_id: AreaId,
    pub location_spec: Option<String>,
    pub group_id: Option<GroupId>,
}

/// Index the population table by person id for the event joins
#[must_use]
pub fn index_people(people: &[Person]) -> FxHashMap<PersonId, &Person> {
    people.iter().map(|p| (p.id, p)).collect()
}

/// Parse a container timestamp into a calendar date.
///
/// Accepts plain dates and datetime strings; the time-of-day part is
/// discarded.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt.date());
        }
    }
    Err(PipelineError::DateParse {
        value: value.to_string(),
    })
}

/// Inner-join events with the population, attaching age and area and
/// parsing the timestamp.
///
/// # Errors
/// Returns a date-parse error for an unparseable timestamp; unresolved
/// person references are dropped and counted, not errors.
pub fn with_population(
    events: Vec<EventRow>,
    people: &FxHashMap<PersonId, &Person>,
) -> Result<(Vec<PersonEvent>, JoinReport)> {
    let input_rows = events.len();
    let mut joined = Vec::with_capacity(input_rows);
    for event in events {
        let Some(person) = people.get(&event.person_id) else {
            continue;
        };
        joined.push(PersonEvent {
            person_id: event.person_id,
            date: parse_date(&event.timestamp)?,
            age: person.age,
            area_id: person.area_id,
            location_spec: event.location_spec,
            group_id: event.group_id,
        });
    }
    let report = JoinReport::new(input_rows, joined.len());
    Ok((joined, report))
}

/// Inner-join person events with resolved geography, attaching the region.
/// Events in unresolved areas are dropped and counted.
#[must_use]
pub fn with_geography(
    events: Vec<PersonEvent>,
    geography: &GeographyIndex,
) -> (Vec<JoinedEvent>, JoinReport) {
    let input_rows = events.len();
    let mut joined = Vec::with_capacity(input_rows);
    for event in events {
        let Some(region) = geography.region_of(event.area_id) else {
            continue;
        };
        joined.push(JoinedEvent {
            person_id: event.person_id,
            date: event.date,
            age: event.age,
            region: Arc::clone(region),
            location_spec: event.location_spec,
            group_id: event.group_id,
        });
    }
    let report = JoinReport::new(input_rows, joined.len());
    (joined, report)
}

/// Join location-scoped events against the `locations` table.
///
/// Filters locations to the given spec, indexes them by group id, and keeps
/// only events whose group reference resolves; survivors are tagged with the
/// location's spec.
#[must_use]
pub fn with_location(
    events: Vec<JoinedEvent>,
    locations: &[LocationRow],
    spec: &str,
) -> (Vec<JoinedEvent>, JoinReport) {
    let by_group: FxHashMap<GroupId, &LocationRow> = locations
        .iter()
        .filter(|l| l.spec == spec)
        .map(|l| (l.group_id, l))
        .collect();

    let input_rows = events.len();
    let mut joined = Vec::with_capacity(input_rows);
    for mut event in events {
        let Some(location) = event.group_id.and_then(|g| by_group.get(&g)) else {
            continue;
        };
        event.location_spec = Some(location.spec.clone());
        joined.push(event);
    }
    let report = JoinReport::new(input_rows, joined.len());
    (joined, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AreaRow, RegionRow, SuperAreaRow};

    fn person(id: PersonId, age: u32, area_id: AreaId) -> Person {
        Person { id, age, area_id }
    }

    fn event(person_id: PersonId, timestamp: &str) -> EventRow {
        EventRow {
            person_id,
            timestamp: timestamp.to_string(),
            location_spec: None,
            group_id: None,
        }
    }

    fn geography() -> GeographyIndex {
        GeographyIndex::resolve(
            &[AreaRow {
                id: 1,
                name: "A1".into(),
                super_area_id: 10,
            }],
            &[SuperAreaRow {
                id: 10,
                name: "S1".into(),
                region_id: 100,
            }],
            &[RegionRow {
                id: 100,
                name: "R1".into(),
            }],
        )
    }

    #[test]
    fn test_population_join_attaches_age_and_area() {
        let people = [person(7, 42, 1)];
        let index = index_people(&people);
        let (joined, report) =
            with_population(vec![event(7, "2020-05-01")], &index).unwrap();
        assert_eq!(report.dropped_rows, 0);
        assert_eq!(joined[0].age, 42);
        assert_eq!(joined[0].area_id, 1);
        assert_eq!(
            joined[0].date,
            NaiveDate::from_ymd_opt(2020, 5, 1).unwrap()
        );
    }

    #[test]
    fn test_population_join_drops_unknown_person() {
        let people = [person(7, 42, 1)];
        let index = index_people(&people);
        let (joined, report) =
            with_population(vec![event(7, "2020-05-01"), event(8, "2020-05-01")], &index)
                .unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(report.dropped_rows, 1);
    }

    #[test]
    fn test_geography_join_drops_unresolved_area() {
        let people = [person(7, 42, 1), person(8, 30, 99)];
        let index = index_people(&people);
        let (pop_joined, _) = with_population(
            vec![event(7, "2020-05-01"), event(8, "2020-05-01")],
            &index,
        )
        .unwrap();
        let (joined, report) = with_geography(pop_joined, &geography());
        assert_eq!(joined.len(), 1);
        assert_eq!(report.dropped_rows, 1);
        assert_eq!(joined[0].region.as_ref(), "R1");
    }

    #[test]
    fn test_location_join_filters_by_spec() {
        let locations = vec![
            LocationRow {
                id: 1,
                group_id: 5,
                spec: "hospital".into(),
            },
            LocationRow {
                id: 2,
                group_id: 6,
                spec: "school".into(),
            },
        ];
        let people = [person(7, 42, 1), person(8, 30, 1)];
        let index = index_people(&people);
        let mut hospital_event = event(7, "2020-05-01");
        hospital_event.group_id = Some(5);
        let mut school_event = event(8, "2020-05-01");
        school_event.group_id = Some(6);
        let (pop_joined, _) =
            with_population(vec![hospital_event, school_event], &index).unwrap();
        let (geo_joined, _) = with_geography(pop_joined, &geography());
        let (joined, report) = with_location(geo_joined, &locations, "hospital");
        assert_eq!(joined.len(), 1);
        assert_eq!(report.dropped_rows, 1);
        assert_eq!(joined[0].location_spec.as_deref(), Some("hospital"));
    }

    #[test]
    fn test_parse_date_accepts_datetime() {
        assert_eq!(
            parse_date("2020-05-01 12:00:00").unwrap(),
            NaiveDate::from_ymd_opt(2020, 5, 1).unwrap()
        );
        assert!(parse_date("not-a-date").is_err());
    }
}
