//! The lighter aggregation path over a per-region-per-day summary CSV.
//!
//! Each numeric column carries an explicit [`SeriesKind`] policy supplied by
//! the caller: flow columns aggregate by sum, stock columns by mean. The
//! policy is never inferred from column names.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::error::{PipelineError, Result};
use crate::join::parse_date;
use crate::model::SeriesKind;

/// Aggregated per-region-per-day summary values
#[derive(Debug, Clone)]
pub struct RegionalSummary {
    columns: Vec<String>,
    policies: Vec<SeriesKind>,
    rows: BTreeMap<(String, NaiveDate), Vec<f64>>,
}

impl RegionalSummary {
    /// Numeric column names, in file order
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Value of one cell
    #[must_use]
    pub fn get(&self, region: &str, date: NaiveDate, column: &str) -> Option<f64> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows
            .get(&(region.to_string(), date))
            .map(|values| values[col])
    }

    /// Iterate rows in deterministic order
    pub fn rows(&self) -> impl Iterator<Item = (&(String, NaiveDate), &[f64])> {
        self.rows.iter().map(|(key, values)| (key, values.as_slice()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Collapse the region dimension, aggregating every column across
    /// regions per day by its declared policy.
    #[must_use]
    pub fn world(&self) -> BTreeMap<NaiveDate, Vec<f64>> {
        let mut grouped: BTreeMap<NaiveDate, Vec<Vec<f64>>> = BTreeMap::new();
        for ((_, date), values) in &self.rows {
            grouped.entry(*date).or_default().push(values.clone());
        }
        grouped
            .into_iter()
            .map(|(date, rows)| (date, aggregate_rows(&rows, &self.policies)))
            .collect()
    }
}

fn aggregate_rows(rows: &[Vec<f64>], policies: &[SeriesKind]) -> Vec<f64> {
    policies
        .iter()
        .enumerate()
        .map(|(col, kind)| {
            let sum: f64 = rows.iter().map(|r| r[col]).sum();
            match kind {
                SeriesKind::Flow => sum,
                SeriesKind::Stock => sum / rows.len() as f64,
            }
        })
        .collect()
}

/// Read and aggregate a regional summary CSV.
///
/// The file must carry `time_stamp` and `region` columns; every other
/// column is numeric and must have a policy in `policies`. Rows sharing a
/// (region, day) key are aggregated by each column's policy.
///
/// # Errors
/// Returns a config error for a numeric column with no declared policy, a
/// missing index column, or unparseable values.
pub fn read_summary<R: Read>(
    reader: R,
    policies: &FxHashMap<String, SeriesKind>,
) -> Result<RegionalSummary> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let time_col = headers
        .iter()
        .position(|h| h == "time_stamp")
        .ok_or_else(|| PipelineError::Config("summary CSV has no 'time_stamp' column".into()))?;
    let region_col = headers
        .iter()
        .position(|h| h == "region")
        .ok_or_else(|| PipelineError::Config("summary CSV has no 'region' column".into()))?;

    let mut columns = Vec::new();
    let mut column_policies = Vec::new();
    let mut value_cols = Vec::new();
    for (i, header) in headers.iter().enumerate() {
        if i == time_col || i == region_col || header.is_empty() {
            continue;
        }
        let policy = policies.get(header).copied().ok_or_else(|| {
            PipelineError::Config(format!("no series policy declared for summary column '{header}'"))
        })?;
        columns.push(header.to_string());
        column_policies.push(policy);
        value_cols.push(i);
    }

    let mut grouped: BTreeMap<(String, NaiveDate), Vec<Vec<f64>>> = BTreeMap::new();
    for record in csv_reader.records() {
        let record = record?;
        let date = parse_date(&record[time_col])?;
        let region = record[region_col].to_string();
        let values: Vec<f64> = value_cols
            .iter()
            .map(|&i| {
                record[i].parse::<f64>().map_err(|_| {
                    PipelineError::Config(format!(
                        "summary column '{}' has non-numeric value '{}'",
                        headers[i].to_string(),
                        &record[i]
                    ))
                })
            })
            .collect::<Result<_>>()?;
        grouped.entry((region, date)).or_default().push(values);
    }

    let rows = grouped
        .into_iter()
        .map(|(key, rows)| {
            let aggregated = aggregate_rows(&rows, &column_policies);
            (key, aggregated)
        })
        .collect();

    Ok(RegionalSummary {
        columns,
        policies: column_policies,
        rows,
    })
}

/// Read and aggregate a regional summary CSV file
pub fn read_summary_file(
    path: impl AsRef<Path>,
    policies: &FxHashMap<String, SeriesKind>,
) -> Result<RegionalSummary> {
    let file = std::fs::File::open(path.as_ref())?;
    read_summary(file, policies)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, d).unwrap()
    }

    fn policies() -> FxHashMap<String, SeriesKind> {
        [
            ("daily_infections".to_string(), SeriesKind::Flow),
            ("current_infected".to_string(), SeriesKind::Stock),
        ]
        .into_iter()
        .collect()
    }

    const CSV: &str = "\
time_stamp,region,daily_infections,current_infected
2020-01-01,north,3,10
2020-01-01,north,5,20
2020-01-01,south,1,4
2020-01-02,north,2,8
";

    #[test]
    fn test_flow_sums_and_stock_means() {
        let summary = read_summary(CSV.as_bytes(), &policies()).unwrap();
        assert_eq!(summary.get("north", date(1), "daily_infections"), Some(8.0));
        assert_eq!(summary.get("north", date(1), "current_infected"), Some(15.0));
        assert_eq!(summary.get("south", date(1), "daily_infections"), Some(1.0));
    }

    #[test]
    fn test_world_summary_drops_region() {
        let summary = read_summary(CSV.as_bytes(), &policies()).unwrap();
        let world = summary.world();
        // day 1: flow 8 + 1 summed, stock mean of the two regional values
        assert_eq!(world[&date(1)], vec![9.0, 9.5]);
        assert_eq!(world[&date(2)], vec![2.0, 8.0]);
    }

    #[test]
    fn test_missing_policy_is_an_error() {
        let err = read_summary(CSV.as_bytes(), &FxHashMap::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_missing_index_column_is_an_error() {
        let err = read_summary("region,x\nnorth,1\n".as_bytes(), &policies()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
