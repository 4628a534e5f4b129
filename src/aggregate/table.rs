//! The (region, date)-indexed output table.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use rustc_hash::FxHashMap;

use crate::error::{PipelineError, Result};
use crate::model::{RegionName, SeriesKind};

/// An integer table indexed by (region, date) with ordered named columns.
///
/// Rows are kept in a `BTreeMap`, so iteration is deterministic: regions in
/// lexical order, dates ascending within a region.
#[derive(Debug, Clone, Default)]
pub struct RegionalTable {
    columns: Vec<String>,
    column_index: FxHashMap<String, usize>,
    rows: BTreeMap<(RegionName, NaiveDate), Vec<i64>>,
}

impl RegionalTable {
    /// Create a table with the given column names.
    ///
    /// # Errors
    /// Returns a config error on duplicate column names.
    pub fn with_columns(columns: Vec<String>) -> Result<Self> {
        let mut column_index = FxHashMap::default();
        for (i, name) in columns.iter().enumerate() {
            if column_index.insert(name.clone(), i).is_some() {
                return Err(PipelineError::Config(format!(
                    "duplicate output column '{name}'"
                )));
            }
        }
        Ok(Self {
            columns,
            column_index,
            rows: BTreeMap::new(),
        })
    }

    /// Column names, in output order
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Set the full value vector of one row. `values` must match the column
    /// count.
    pub fn set_row(&mut self, region: RegionName, date: NaiveDate, values: Vec<i64>) {
        assert_eq!(values.len(), self.columns.len(), "row width mismatch");
        self.rows.insert((region, date), values);
    }

    /// Value of one cell, if the row exists
    #[must_use]
    pub fn get(&self, region: &str, date: NaiveDate, column: &str) -> Option<i64> {
        let col = *self.column_index.get(column)?;
        self.rows
            .get(&(Arc::from(region), date))
            .map(|values| values[col])
    }

    /// Iterate rows in deterministic order
    pub fn rows(&self) -> impl Iterator<Item = (&(RegionName, NaiveDate), &[i64])> {
        self.rows.iter().map(|(key, values)| (key, values.as_slice()))
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct regions, in lexical order
    #[must_use]
    pub fn region_names(&self) -> Vec<RegionName> {
        let mut names: Vec<RegionName> =
            self.rows.keys().map(|(r, _)| RegionName::clone(r)).collect();
        names.dedup();
        names
    }

    /// Distinct dates, ascending
    #[must_use]
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.rows.keys().map(|&(_, d)| d).collect();
        dates.sort_unstable();
        dates.dedup();
        dates
    }

    /// Minimum and maximum of one column over all rows
    #[must_use]
    pub fn column_range(&self, column: &str) -> Option<(i64, i64)> {
        let col = *self.column_index.get(column)?;
        let mut range: Option<(i64, i64)> = None;
        for values in self.rows.values() {
            let v = values[col];
            range = Some(match range {
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
                None => (v, v),
            });
        }
        range
    }

    /// Concatenate tables column-wise on the (region, date) index.
    ///
    /// The output index is the union of the input indexes; cells a table has
    /// no row for are filled with 0. Column order follows the input order.
    ///
    /// # Errors
    /// Returns a config error if two tables share a column name.
    pub fn concat(tables: impl IntoIterator<Item = Self>) -> Result<Self> {
        let tables: Vec<Self> = tables.into_iter().collect();
        let columns: Vec<String> = tables
            .iter()
            .flat_map(|t| t.columns.iter().cloned())
            .collect();
        let mut out = Self::with_columns(columns)?;
        let total_width = out.columns.len();

        let mut offset = 0usize;
        for table in tables {
            let width = table.columns.len();
            for ((region, date), values) in table.rows {
                let row = out
                    .rows
                    .entry((region, date))
                    .or_insert_with(|| vec![0; total_width]);
                row[offset..offset + width].copy_from_slice(&values);
            }
            offset += width;
        }
        Ok(out)
    }

    /// Reindex every region onto the regular calendar `[min_date, max_date]`
    /// and apply the series kind's fill policy once: zero-fill for flow
    /// series, carry-forward then back-fill for stock series. Dates outside
    /// the calendar are dropped.
    #[must_use]
    pub fn calendar_reindex(
        &self,
        min_date: NaiveDate,
        max_date: NaiveDate,
        kind: SeriesKind,
    ) -> Self {
        let width = self.columns.len();
        let mut out = Self {
            columns: self.columns.clone(),
            column_index: self.column_index.clone(),
            rows: BTreeMap::new(),
        };

        for region in self.region_names() {
            let observed: BTreeMap<NaiveDate, &Vec<i64>> = self
                .rows
                .range((RegionName::clone(&region), NaiveDate::MIN)..)
                .take_while(|((r, _), _)| *r == region)
                .map(|((_, d), v)| (*d, v))
                .collect();

            // For stock series, leading gaps take the first observed value
            let mut carried: Option<Vec<i64>> = match kind {
                SeriesKind::Stock => observed.values().next().map(|v| (*v).clone()),
                SeriesKind::Flow => None,
            };

            let mut date = min_date;
            while date <= max_date {
                let values = match observed.get(&date) {
                    Some(v) => {
                        if kind == SeriesKind::Stock {
                            carried = Some((*v).clone());
                        }
                        (*v).clone()
                    }
                    None => match kind {
                        SeriesKind::Flow => vec![0; width],
                        SeriesKind::Stock => {
                            carried.clone().unwrap_or_else(|| vec![0; width])
                        }
                    },
                };
                out.rows.insert((RegionName::clone(&region), date), values);
                date = date + Days::new(1);
            }
        }
        out
    }

    /// Per-region cumulative sums over every column, in date order
    #[must_use]
    pub fn cumulative_per_region(&self) -> Self {
        let mut out = Self {
            columns: self.columns.clone(),
            column_index: self.column_index.clone(),
            rows: BTreeMap::new(),
        };
        let mut current_region: Option<RegionName> = None;
        let mut running = vec![0i64; self.columns.len()];
        for ((region, date), values) in &self.rows {
            if current_region.as_ref() != Some(region) {
                current_region = Some(RegionName::clone(region));
                running.fill(0);
            }
            for (acc, v) in running.iter_mut().zip(values) {
                *acc += v;
            }
            out.rows
                .insert((RegionName::clone(region), *date), running.clone());
        }
        out
    }

    /// Append a column holding the per-row sum of all existing columns.
    ///
    /// # Errors
    /// Returns a config error if the name collides with an existing column.
    pub fn append_row_sum_column(&mut self, name: &str) -> Result<()> {
        if self.column_index.contains_key(name) {
            return Err(PipelineError::Config(format!(
                "duplicate output column '{name}'"
            )));
        }
        self.column_index
            .insert(name.to_string(), self.columns.len());
        self.columns.push(name.to_string());
        for values in self.rows.values_mut() {
            let total: i64 = values.iter().sum();
            values.push(total);
        }
        Ok(())
    }

    /// Write the table as CSV with a `region,timestamp` index prefix
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        let mut header = vec!["region".to_string(), "timestamp".to_string()];
        header.extend(self.columns.iter().cloned());
        csv_writer.write_record(&header)?;
        for ((region, date), values) in &self.rows {
            let mut record = vec![region.to_string(), date.to_string()];
            record.extend(values.iter().map(ToString::to_string));
            csv_writer.write_record(&record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Write the table as a CSV file
    pub fn write_csv_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        self.write_csv(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, d).unwrap()
    }

    fn table(columns: &[&str]) -> RegionalTable {
        RegionalTable::with_columns(columns.iter().map(|c| (*c).to_string()).collect()).unwrap()
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        assert!(RegionalTable::with_columns(vec!["a".into(), "a".into()]).is_err());
    }

    #[test]
    fn test_concat_zero_fills_disjoint_indexes() {
        // Two non-overlapping 1-region series over 3 days each
        let mut left = table(&["infected"]);
        left.set_row(Arc::from("north"), date(1), vec![3]);
        left.set_row(Arc::from("north"), date(2), vec![1]);
        left.set_row(Arc::from("north"), date(3), vec![2]);
        let mut right = table(&["deaths"]);
        right.set_row(Arc::from("south"), date(1), vec![1]);
        right.set_row(Arc::from("south"), date(2), vec![0]);
        right.set_row(Arc::from("south"), date(3), vec![4]);

        let combined = RegionalTable::concat([left, right]).unwrap();
        assert_eq!(combined.columns(), ["infected", "deaths"]);
        assert_eq!(combined.len(), 6);
        // cells absent from a source table are integer zero, never fractional
        assert_eq!(combined.get("north", date(1), "deaths"), Some(0));
        assert_eq!(combined.get("south", date(2), "infected"), Some(0));
        assert_eq!(combined.get("north", date(3), "infected"), Some(2));
    }

    #[test]
    fn test_concat_rejects_column_collision() {
        let left = table(&["infected"]);
        let right = table(&["infected"]);
        assert!(RegionalTable::concat([left, right]).is_err());
    }

    #[test]
    fn test_flow_reindex_zero_fills() {
        let mut t = table(&["infected"]);
        t.set_row(Arc::from("north"), date(2), vec![5]);
        let reindexed = t.calendar_reindex(date(1), date(4), SeriesKind::Flow);
        assert_eq!(reindexed.get("north", date(1), "infected"), Some(0));
        assert_eq!(reindexed.get("north", date(2), "infected"), Some(5));
        assert_eq!(reindexed.get("north", date(3), "infected"), Some(0));
        assert_eq!(reindexed.len(), 4);
    }

    #[test]
    fn test_stock_reindex_carries_forward_and_back() {
        let mut t = table(&["currently_infected"]);
        t.set_row(Arc::from("north"), date(2), vec![5]);
        t.set_row(Arc::from("north"), date(4), vec![3]);
        let reindexed = t.calendar_reindex(date(1), date(5), SeriesKind::Stock);
        // leading gap back-fills from the first observation
        assert_eq!(reindexed.get("north", date(1), "currently_infected"), Some(5));
        assert_eq!(reindexed.get("north", date(3), "currently_infected"), Some(5));
        assert_eq!(reindexed.get("north", date(5), "currently_infected"), Some(3));
    }

    #[test]
    fn test_reindex_drops_dates_outside_calendar() {
        let mut t = table(&["infected"]);
        t.set_row(Arc::from("north"), date(1), vec![9]);
        t.set_row(Arc::from("north"), date(8), vec![9]);
        let reindexed = t.calendar_reindex(date(2), date(4), SeriesKind::Flow);
        assert_eq!(reindexed.len(), 3);
        assert_eq!(reindexed.get("north", date(1), "infected"), None);
    }

    #[test]
    fn test_cumulative_per_region_resets_between_regions() {
        let mut t = table(&["infected"]);
        t.set_row(Arc::from("north"), date(1), vec![1]);
        t.set_row(Arc::from("north"), date(2), vec![2]);
        t.set_row(Arc::from("south"), date(1), vec![4]);
        let cumulative = t.cumulative_per_region();
        assert_eq!(cumulative.get("north", date(2), "infected"), Some(3));
        assert_eq!(cumulative.get("south", date(1), "infected"), Some(4));
    }

    #[test]
    fn test_row_sum_column() {
        let mut t = table(&["a", "b"]);
        t.set_row(Arc::from("north"), date(1), vec![2, 3]);
        t.append_row_sum_column("total").unwrap();
        assert_eq!(t.get("north", date(1), "total"), Some(5));
        assert_eq!(t.columns(), ["a", "b", "total"]);
    }

    #[test]
    fn test_csv_round_trip_shape() {
        let mut t = table(&["infected"]);
        t.set_row(Arc::from("north"), date(1), vec![7]);
        let mut buffer = Vec::new();
        t.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("region,timestamp,infected"));
        assert!(text.contains("north,2020-01-01,7"));
    }

    #[test]
    fn test_column_range() {
        let mut t = table(&["infected"]);
        t.set_row(Arc::from("north"), date(1), vec![7]);
        t.set_row(Arc::from("north"), date(2), vec![2]);
        assert_eq!(t.column_range("infected"), Some((2, 7)));
        assert_eq!(t.column_range("missing"), None);
    }
}
