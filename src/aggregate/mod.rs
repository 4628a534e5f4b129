//! Regional aggregation: reducing joined event tables into
//! (region, date)-indexed integer count tables.

mod table;

pub use table::RegionalTable;

use itertools::Itertools;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::age::{AgeBands, bin_by};
use crate::error::{PipelineError, Result};
use crate::interval::Expansion;
use crate::model::{JoinedEvent, RegionName};
use chrono::NaiveDate;

/// Check the stratification invariant: for every (region, date) cell the sum
/// of the age-banded columns must equal the unstratified total.
///
/// # Errors
/// Returns a validation error scoped to `metric` naming the first failing
/// cell.
fn check_banded_totals(table: &RegionalTable, metric: &str, n_bands: usize) -> Result<()> {
    for ((region, date), values) in table.rows() {
        let total = values[0];
        let banded: i64 = values[1..=n_bands].iter().sum();
        if total != banded {
            return Err(PipelineError::validation(
                metric,
                format!("age-banded sum {banded} != total {total} at ({region}, {date})"),
            ));
        }
    }
    Ok(())
}

/// Aggregate a joined event table into a flow series: one unstratified daily
/// count per region plus one column per age band.
///
/// Events whose age falls outside the band partition are excluded from both
/// the total and the banded counts, and their number is logged.
///
/// # Errors
/// Returns a metric-scoped validation error if the banded columns do not sum
/// to the total.
pub fn aggregate_flow(
    events: &[JoinedEvent],
    bands: &AgeBands,
    metric: &str,
) -> Result<RegionalTable> {
    // Unstratified counts, grouped directly
    let mut totals: FxHashMap<(RegionName, chrono::NaiveDate), i64> =
        FxHashMap::default();
    for event in events.iter().filter(|e| bands.band_of(e.age).is_some()) {
        *totals
            .entry((RegionName::clone(&event.region), event.date))
            .or_insert(0) += 1;
    }

    // Age-banded counts through the binner, independently of the totals
    let banded = bin_by(
        events.iter(),
        bands,
        |e| (RegionName::clone(&e.region), e.date),
        |e| e.age,
    );
    if banded.dropped > 0 {
        log::warn!(
            "{metric}: {} events outside the age-band partition were excluded",
            banded.dropped
        );
    }

    let mut columns = vec![metric.to_string()];
    columns.extend(bands.column_names(metric));
    let mut table = RegionalTable::with_columns(columns)?;
    for ((region, date), band_counts) in banded.counts {
        let total = totals.get(&(region.clone(), date)).copied().unwrap_or(0);
        let mut values = Vec::with_capacity(bands.len() + 1);
        values.push(total);
        values.extend(band_counts);
        table.set_row(region, date, values);
    }

    check_banded_totals(&table, metric, bands.len())?;
    Ok(table)
}

/// Aggregate an interval expansion into a stock series, folding the streamed
/// occupancy days directly into per-(region, date) counts without
/// materializing the person-day rows.
///
/// # Errors
/// Returns a metric-scoped validation error if the banded columns do not sum
/// to the total.
pub fn aggregate_occupancy(
    expansion: &Expansion,
    bands: &AgeBands,
    metric: &str,
) -> Result<RegionalTable> {
    type CellMap = FxHashMap<(RegionName, chrono::NaiveDate), Vec<i64>>;

    let (cells, dropped) = expansion
        .occupancy_days()
        .fold(
            || (CellMap::default(), 0usize),
            |(mut cells, mut dropped), day| {
                match bands.band_of(day.age) {
                    Some(band) => {
                        let values = cells
                            .entry((day.region, day.day))
                            .or_insert_with(|| vec![0; bands.len() + 1]);
                        values[0] += 1;
                        values[band + 1] += 1;
                    }
                    None => dropped += 1,
                }
                (cells, dropped)
            },
        )
        .reduce(
            || (CellMap::default(), 0usize),
            |(mut left, left_dropped), (right, right_dropped)| {
                for (key, values) in right {
                    match left.entry(key) {
                        std::collections::hash_map::Entry::Occupied(mut e) => {
                            for (a, b) in e.get_mut().iter_mut().zip(values) {
                                *a += b;
                            }
                        }
                        std::collections::hash_map::Entry::Vacant(e) => {
                            e.insert(values);
                        }
                    }
                }
                (left, left_dropped + right_dropped)
            },
        );
    if dropped > 0 {
        log::warn!("{metric}: {dropped} occupancy days outside the age-band partition were excluded");
    }

    let mut columns = vec![metric.to_string()];
    columns.extend(bands.column_names(metric));
    let mut table = RegionalTable::with_columns(columns)?;
    for ((region, date), values) in cells {
        table.set_row(region, date, values);
    }

    check_banded_totals(&table, metric, bands.len())?;
    Ok(table)
}

/// Per-location infection breakdown: one `n_infections_in_{spec}` column per
/// location spec observed, counted per (region, date).
///
/// Events without a location spec are excluded and logged; the orchestrator
/// cross-checks the column sums against the unstratified infection count.
pub fn infection_locations(events: &[JoinedEvent]) -> Result<RegionalTable> {
    let specs: Vec<String> = events
        .iter()
        .filter_map(|e| e.location_spec.as_deref())
        .unique()
        .sorted_unstable()
        .map(str::to_string)
        .collect();
    let spec_index: FxHashMap<&str, usize> =
        specs.iter().enumerate().map(|(i, s)| (s.as_str(), i)).collect();

    let mut cells: FxHashMap<(RegionName, chrono::NaiveDate), Vec<i64>> =
        FxHashMap::default();
    let mut unlocated = 0usize;
    for event in events {
        let Some(spec) = event.location_spec.as_deref() else {
            unlocated += 1;
            continue;
        };
        let values = cells
            .entry((RegionName::clone(&event.region), event.date))
            .or_insert_with(|| vec![0; specs.len()]);
        values[spec_index[spec]] += 1;
    }
    if unlocated > 0 {
        log::warn!("{unlocated} infection events without a location spec were excluded");
    }

    let columns: Vec<String> = specs
        .iter()
        .map(|s| format!("n_infections_in_{s}"))
        .collect();
    let mut table = RegionalTable::with_columns(columns)?;
    for ((region, date), values) in cells {
        table.set_row(region, date, values);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, d).unwrap()
    }

    fn event(person_id: u64, age: u32, region: &str, day: u32) -> JoinedEvent {
        JoinedEvent {
            person_id,
            date: date(day),
            age,
            region: Arc::from(region),
            location_spec: None,
            group_id: None,
        }
    }

    /// 10 synthetic people across 2 regions and 3 age bands, one infection
    /// event each.
    fn fixture() -> Vec<JoinedEvent> {
        let ages = [5u32, 15, 70, 8, 20, 75, 30, 40, 50, 60];
        ages.iter()
            .enumerate()
            .map(|(i, &age)| {
                let region = if i % 2 == 0 { "north" } else { "south" };
                event(i as u64, age, region, 1 + (i as u32 % 3))
            })
            .collect()
    }

    #[test]
    fn test_banded_sums_equal_total() {
        let bands = AgeBands::new(&[0, 12, 65, 101]).unwrap();
        let events = fixture();
        let table = aggregate_flow(&events, &bands, "infected").unwrap();
        let n_bands = bands.len();
        let mut grand_total = 0i64;
        for (_, values) in table.rows() {
            assert_eq!(values[0], values[1..=n_bands].iter().sum::<i64>());
            grand_total += values[0];
        }
        assert_eq!(grand_total, 10);
    }

    #[test]
    fn test_flow_counts_by_region_and_date() {
        let bands = AgeBands::new(&[0, 50, 101]).unwrap();
        let events = vec![
            event(1, 10, "north", 1),
            event(2, 60, "north", 1),
            event(3, 10, "south", 2),
        ];
        let table = aggregate_flow(&events, &bands, "deaths").unwrap();
        assert_eq!(table.get("north", date(1), "deaths"), Some(2));
        assert_eq!(table.get("north", date(1), "deaths_0_50"), Some(1));
        assert_eq!(table.get("north", date(1), "deaths_50+"), Some(1));
        assert_eq!(table.get("south", date(2), "deaths"), Some(1));
        assert_eq!(table.get("south", date(1), "deaths"), None);
    }

    #[test]
    fn test_empty_events_yield_empty_table() {
        let bands = AgeBands::new(&[0, 50, 101]).unwrap();
        let table = aggregate_flow(&[], &bands, "infected").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_occupancy_aggregation_counts_person_days() {
        let bands = AgeBands::new(&[0, 50, 101]).unwrap();
        let starts = [event(1, 10, "north", 1)];
        let ends = [(1u64, date(4))];
        let expansion = Expansion::join(&starts, &ends);
        let table = aggregate_occupancy(&expansion, &bands, "currently_in_hospital").unwrap();
        for d in 1..=3 {
            assert_eq!(
                table.get("north", date(d), "currently_in_hospital"),
                Some(1)
            );
            assert_eq!(
                table.get("north", date(d), "currently_in_hospital_0_50"),
                Some(1)
            );
        }
        assert_eq!(table.get("north", date(4), "currently_in_hospital"), None);
    }

    #[test]
    fn test_infection_locations_breakdown() {
        let mut a = event(1, 10, "north", 1);
        a.location_spec = Some("household".into());
        let mut b = event(2, 20, "north", 1);
        b.location_spec = Some("pub".into());
        let mut c = event(3, 30, "north", 1);
        c.location_spec = Some("household".into());
        let table = infection_locations(&[a, b, c]).unwrap();
        assert_eq!(
            table.columns(),
            ["n_infections_in_household", "n_infections_in_pub"]
        );
        assert_eq!(
            table.get("north", date(1), "n_infections_in_household"),
            Some(2)
        );
        assert_eq!(table.get("north", date(1), "n_infections_in_pub"), Some(1));
    }
}
