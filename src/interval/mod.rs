//! Interval expansion: reconstructing occupancy from start/end event pairs.
//!
//! This is the dominant cost of the pipeline: the expanded output is
//! proportional to total person-days, which can be orders of magnitude
//! larger than the event count. Expansion is therefore exposed as a rayon
//! parallel iterator that downstream aggregation folds directly into
//! per-day counts; the per-person-day rows are never materialized as a
//! whole.

use chrono::{Days, NaiveDate};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::model::{JoinedEvent, PersonId, RegionName};

/// One day of one person's presence in a state
#[derive(Debug, Clone)]
pub struct OccupancyDay {
    pub day: NaiveDate,
    pub age: u32,
    pub region: RegionName,
}

/// A person's presence interval, joined and measured but not yet expanded
#[derive(Debug, Clone)]
struct PresenceInterval {
    start: NaiveDate,
    /// Number of occupancy days to emit; at least 1
    days: u64,
    age: u32,
    region: RegionName,
}

/// The joined start/end intervals, ready for per-day expansion
#[derive(Debug)]
pub struct Expansion {
    intervals: Vec<PresenceInterval>,
    ends_without_start: usize,
}

impl Expansion {
    /// Outer-join start events against an end series on person id.
    ///
    /// A start with no end gets `duration_days = 0`; where a person has
    /// several end events the earliest wins. An end with no start should not
    /// occur and is dropped, but counted. A duration of 0 still emits one
    /// occupancy day at the start (single-day presence).
    #[must_use]
    pub fn join(starts: &[JoinedEvent], ends: &[(PersonId, NaiveDate)]) -> Self {
        let mut end_by_person: FxHashMap<PersonId, NaiveDate> = FxHashMap::default();
        for &(person_id, date) in ends {
            end_by_person
                .entry(person_id)
                .and_modify(|d| *d = (*d).min(date))
                .or_insert(date);
        }

        let started: FxHashSet<PersonId> = starts.iter().map(|s| s.person_id).collect();
        let ends_without_start = end_by_person
            .keys()
            .filter(|p| !started.contains(p))
            .count();
        if ends_without_start > 0 {
            log::warn!("{ends_without_start} end events without a matching start were dropped");
        }

        let intervals = starts
            .iter()
            .map(|start| {
                let duration = end_by_person
                    .get(&start.person_id)
                    .map_or(0, |end| (*end - start.date).num_days().max(0) as u64);
                PresenceInterval {
                    start: start.date,
                    days: duration.max(1),
                    age: start.age,
                    region: RegionName::clone(&start.region),
                }
            })
            .collect();

        Self {
            intervals,
            ends_without_start,
        }
    }

    /// End events that matched no start
    #[must_use]
    pub fn ends_without_start(&self) -> usize {
        self.ends_without_start
    }

    /// Total person-days the expansion will produce
    #[must_use]
    pub fn person_days(&self) -> u64 {
        self.intervals.iter().map(|iv| iv.days).sum()
    }

    /// Stream one occupancy row per person per day in
    /// `[start, start + duration)` (end-exclusive; duration 0 emits the
    /// start day alone), parallel across persons.
    pub fn occupancy_days(&self) -> impl ParallelIterator<Item = OccupancyDay> + '_ {
        self.intervals.par_iter().flat_map_iter(|iv| {
            (0..iv.days).map(move |offset| OccupancyDay {
                day: iv.start + Days::new(offset),
                age: iv.age,
                region: RegionName::clone(&iv.region),
            })
        })
    }

    /// Sequential fallback over the same rows, for callers that want to
    /// consume region-sized chunks without a rayon pool
    pub fn occupancy_days_seq(&self) -> impl Iterator<Item = OccupancyDay> + '_ {
        self.intervals.iter().flat_map(|iv| {
            (0..iv.days).map(move |offset| OccupancyDay {
                day: iv.start + Days::new(offset),
                age: iv.age,
                region: RegionName::clone(&iv.region),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn start(person_id: PersonId, day: NaiveDate) -> JoinedEvent {
        JoinedEvent {
            person_id,
            date: day,
            age: 30,
            region: Arc::from("R1"),
            location_spec: None,
            group_id: None,
        }
    }

    fn collect_days(expansion: &Expansion) -> Vec<NaiveDate> {
        let mut days: Vec<_> = expansion.occupancy_days_seq().map(|o| o.day).collect();
        days.sort_unstable();
        days
    }

    #[test]
    fn test_three_day_stay_is_end_exclusive() {
        let starts = [start(1, date(2020, 1, 1))];
        let ends = [(1, date(2020, 1, 4))];
        let expansion = Expansion::join(&starts, &ends);
        assert_eq!(
            collect_days(&expansion),
            vec![date(2020, 1, 1), date(2020, 1, 2), date(2020, 1, 3)]
        );
        assert_eq!(expansion.person_days(), 3);
    }

    #[test]
    fn test_start_without_end_is_single_day() {
        let starts = [start(1, date(2020, 1, 1))];
        let expansion = Expansion::join(&starts, &[]);
        assert_eq!(collect_days(&expansion), vec![date(2020, 1, 1)]);
    }

    #[test]
    fn test_same_day_end_is_single_day() {
        let starts = [start(1, date(2020, 1, 1))];
        let ends = [(1, date(2020, 1, 1))];
        let expansion = Expansion::join(&starts, &ends);
        assert_eq!(collect_days(&expansion), vec![date(2020, 1, 1)]);
    }

    #[test]
    fn test_earliest_end_wins() {
        let starts = [start(1, date(2020, 1, 1))];
        let ends = [(1, date(2020, 1, 10)), (1, date(2020, 1, 3))];
        let expansion = Expansion::join(&starts, &ends);
        assert_eq!(expansion.person_days(), 2);
    }

    #[test]
    fn test_end_without_start_is_dropped_and_counted() {
        let starts = [start(1, date(2020, 1, 1))];
        let ends = [(1, date(2020, 1, 2)), (2, date(2020, 1, 2))];
        let expansion = Expansion::join(&starts, &ends);
        assert_eq!(expansion.ends_without_start(), 1);
        assert_eq!(expansion.person_days(), 1);
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let starts = [
            start(1, date(2020, 1, 1)),
            start(2, date(2020, 1, 2)),
            start(3, date(2020, 1, 5)),
        ];
        let ends = [(1, date(2020, 1, 4)), (2, date(2020, 1, 3))];
        let expansion = Expansion::join(&starts, &ends);
        let mut par: Vec<_> = expansion.occupancy_days().map(|o| o.day).collect();
        par.sort_unstable();
        assert_eq!(par, collect_days(&expansion));
    }
}
