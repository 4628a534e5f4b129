//! The pipeline orchestrator: sequences table reads, joins, aggregation and
//! the derived series into one output table.

use chrono::NaiveDate;
use log::info;
use rustc_hash::FxHashMap;

use crate::age::{AgeBands, bin_by};
use crate::aggregate::{
    RegionalTable, aggregate_flow, aggregate_occupancy, infection_locations,
};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::geography::GeographyIndex;
use crate::interval::Expansion;
use crate::join;
use crate::model::{EventKind, JoinedEvent, Person, PersonId, RegionName, SeriesKind};
use crate::store::TableStore;
use crate::summary::{RegionalSummary, read_summary_file};

/// One fully joined event table per event kind
struct JoinedTables {
    infections: Vec<JoinedEvent>,
    deaths: Vec<JoinedEvent>,
    hospital_admissions: Vec<JoinedEvent>,
    icu_admissions: Vec<JoinedEvent>,
    discharges: Vec<JoinedEvent>,
    recoveries: Vec<JoinedEvent>,
}

/// Runs the whole aggregation pipeline over one record container.
///
/// A validation failure in any stage aborts the run; no partial output is
/// produced once a correctness check has failed.
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run every stage and return the (region, date)-indexed output table.
    pub fn run(&self) -> Result<RegionalTable> {
        let bands = AgeBands::new(&self.config.age_bins)?;
        let store = TableStore::open(&self.config.record_dir)?;

        info!("loading population");
        let people = store.population()?;
        info!("loading geography");
        let geography = store.geography()?;
        info!("loading locations");
        let locations = store.locations()?;

        let joined = self.load_joined_tables(&store, &people, &geography, &locations)?;

        info!("aggregating infection locations");
        let location_breakdown = infection_locations(&joined.infections)?;
        info!("aggregating regional infections");
        let regional_infections = aggregate_flow(
            &joined.infections,
            &bands,
            EventKind::Infections.metric_name(),
        )?;
        check_location_totals(&location_breakdown, &regional_infections)?;

        info!("aggregating regional deaths");
        let regional_deaths =
            aggregate_flow(&joined.deaths, &bands, EventKind::Deaths.metric_name())?;
        info!("aggregating regional hospital admissions");
        let regional_admissions = aggregate_flow(
            &joined.hospital_admissions,
            &bands,
            EventKind::HospitalAdmissions.metric_name(),
        )?;
        info!("aggregating regional ICU admissions");
        let regional_icu_admissions = aggregate_flow(
            &joined.icu_admissions,
            &bands,
            EventKind::IcuAdmissions.metric_name(),
        )?;
        info!("aggregating regional recoveries");
        let regional_recovered =
            aggregate_flow(&joined.recoveries, &bands, EventKind::Recoveries.metric_name())?;

        info!("reconstructing hospital occupancy");
        let hospital_ends: Vec<(PersonId, NaiveDate)> = joined
            .deaths
            .iter()
            .filter(|d| d.location_spec.as_deref() == Some("hospital"))
            .chain(joined.discharges.iter())
            .map(|e| (e.person_id, e.date))
            .collect();
        let hospital_expansion = Expansion::join(&joined.hospital_admissions, &hospital_ends);
        info!(
            "expanding {} hospital person-days",
            hospital_expansion.person_days()
        );
        let current_in_hospital =
            aggregate_occupancy(&hospital_expansion, &bands, "currently_in_hospital")?;

        info!("reconstructing infection occupancy");
        let infection_ends: Vec<(PersonId, NaiveDate)> = joined
            .deaths
            .iter()
            .chain(joined.recoveries.iter())
            .map(|e| (e.person_id, e.date))
            .collect();
        let infection_expansion = Expansion::join(&joined.infections, &infection_ends);
        info!(
            "expanding {} infection person-days",
            infection_expansion.person_days()
        );
        let current_infected =
            aggregate_occupancy(&infection_expansion, &bands, "currently_infected")?;

        info!("deriving susceptible series");
        let population_bands = population_by_band(&people, &geography, &bands);
        let current_susceptible = susceptible_series(
            &population_bands,
            &regional_infections,
            &bands,
            self.config.min_date,
            self.config.max_date,
        )?;

        info!("concatenating output series");
        let output = RegionalTable::concat([
            location_breakdown,
            regional_infections,
            regional_deaths,
            regional_admissions,
            regional_icu_admissions,
            current_in_hospital,
            current_infected,
            regional_recovered,
            current_susceptible,
        ])?;
        info!(
            "output table: {} rows x {} columns",
            output.len(),
            output.columns().len()
        );
        Ok(output)
    }

    /// Aggregate the configured per-region-per-day summary CSV, if one is
    /// attached. This is the lighter path: it never touches the record
    /// container.
    pub fn run_summary(
        &self,
        policies: &FxHashMap<String, SeriesKind>,
    ) -> Result<Option<RegionalSummary>> {
        let Some(path) = &self.config.summary_csv else {
            return Ok(None);
        };
        info!("aggregating summary CSV {}", path.display());
        read_summary_file(path, policies).map(Some)
    }

    /// Load every event table and run it through the join chain; the
    /// population and geography indexes are loaded once and reused.
    fn load_joined_tables(
        &self,
        store: &TableStore,
        people: &[Person],
        geography: &GeographyIndex,
        locations: &[crate::model::LocationRow],
    ) -> Result<JoinedTables> {
        let people_index = join::index_people(people);
        let mut tables: FxHashMap<EventKind, Vec<JoinedEvent>> = FxHashMap::default();
        for kind in EventKind::ALL {
            let table_name = kind.table_name();
            info!("loading {table_name}");
            let events = store.events(kind)?;
            let (pop_joined, report) = join::with_population(events, &people_index)?;
            report.log(&format!("{table_name}: population join"));
            let (geo_joined, report) = join::with_geography(pop_joined, geography);
            report.log(&format!("{table_name}: geography join"));
            let rows = match kind.location_scope() {
                Some(scope) => {
                    let (located, report) = join::with_location(geo_joined, locations, scope);
                    report.log(&format!("{table_name}: location join"));
                    located
                }
                None => geo_joined,
            };
            tables.insert(kind, rows);
        }
        let mut take = |kind| tables.remove(&kind).unwrap_or_default();
        Ok(JoinedTables {
            infections: take(EventKind::Infections),
            deaths: take(EventKind::Deaths),
            hospital_admissions: take(EventKind::HospitalAdmissions),
            icu_admissions: take(EventKind::IcuAdmissions),
            discharges: take(EventKind::Discharges),
            recoveries: take(EventKind::Recoveries),
        })
    }
}

/// Cross-check the per-location breakdown against the unstratified
/// infection count: the location columns must sum to the total per cell.
fn check_location_totals(
    breakdown: &RegionalTable,
    regional_infections: &RegionalTable,
) -> Result<()> {
    let mut by_location: FxHashMap<(RegionName, NaiveDate), i64> = breakdown
        .rows()
        .map(|((region, date), values)| {
            ((RegionName::clone(region), *date), values.iter().sum())
        })
        .collect();
    for ((region, date), values) in regional_infections.rows() {
        let located = by_location
            .remove(&(RegionName::clone(region), *date))
            .unwrap_or(0);
        let total = values[0];
        if located != total {
            return Err(PipelineError::validation(
                "n_infections",
                format!(
                    "per-location sum {located} != infection total {total} at ({region}, {date})"
                ),
            ));
        }
    }
    if let Some(((region, date), located)) = by_location.into_iter().find(|&(_, sum)| sum != 0) {
        return Err(PipelineError::validation(
            "n_infections",
            format!("per-location sum {located} has no infection total at ({region}, {date})"),
        ));
    }
    Ok(())
}

/// Regional population per age band, geography-joined; people in
/// unresolved areas are dropped by the inner join.
fn population_by_band(
    people: &[Person],
    geography: &GeographyIndex,
    bands: &AgeBands,
) -> FxHashMap<RegionName, Vec<i64>> {
    let resolved = people
        .iter()
        .filter_map(|p| geography.region_of(p.area_id).map(|r| (r, p.age)));
    let binned = bin_by(resolved, bands, |&(r, _)| RegionName::clone(r), |&(_, age)| age);
    if binned.dropped > 0 {
        log::warn!(
            "population: {} people outside the age-band partition were excluded",
            binned.dropped
        );
    }
    binned.counts
}

/// Derive the susceptible stock series: per region and band, the banded
/// population minus the cumulative banded infections up to each date,
/// reindexed onto the full calendar with stock fill semantics, plus a total
/// column summing the bands.
fn susceptible_series(
    population_bands: &FxHashMap<RegionName, Vec<i64>>,
    regional_infections: &RegionalTable,
    bands: &AgeBands,
    min_date: NaiveDate,
    max_date: NaiveDate,
) -> Result<RegionalTable> {
    // Cumulative banded infections at every observed (region, date)
    let mut infected_bands =
        RegionalTable::with_columns(bands.column_names("currently_susceptible"))?;
    for ((region, date), values) in regional_infections.rows() {
        infected_bands.set_row(
            RegionName::clone(region),
            *date,
            values[1..=bands.len()].to_vec(),
        );
    }
    let cumulative_infected = infected_bands.cumulative_per_region();

    let mut susceptible =
        RegionalTable::with_columns(bands.column_names("currently_susceptible"))?;
    for ((region, date), cumulative) in cumulative_infected.rows() {
        let Some(population) = population_bands.get(region) else {
            continue;
        };
        let values = population
            .iter()
            .zip(cumulative)
            .map(|(pop, inf)| pop - inf)
            .collect();
        susceptible.set_row(RegionName::clone(region), *date, values);
    }

    // Regions with population but no observed infections hold their full
    // population across the whole calendar
    let covered: Vec<RegionName> = susceptible.region_names();
    for (region, population) in population_bands {
        if !covered.contains(region) {
            susceptible.set_row(RegionName::clone(region), min_date, population.clone());
        }
    }

    let mut reindexed = susceptible.calendar_reindex(min_date, max_date, SeriesKind::Stock);
    reindexed.append_row_sum_column("currently_susceptible")?;
    Ok(reindexed)
}
