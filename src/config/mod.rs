//! Configuration for the aggregation pipeline.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::{PipelineError, Result};

/// Default age-bin boundaries. The final boundary is treated as open-ended,
/// so the last band is `65+`.
pub const DEFAULT_AGE_BINS: [u32; 5] = [0, 12, 25, 65, 101];

/// Configuration for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory containing one Parquet file per record table
    pub record_dir: PathBuf,
    /// Age-bin boundaries, strictly ascending; the last band is open-ended
    pub age_bins: Vec<u32>,
    /// First day of the output calendar
    pub min_date: NaiveDate,
    /// Last day of the output calendar (inclusive)
    pub max_date: NaiveDate,
    /// Optional per-region-per-day summary CSV for the lighter aggregation path
    pub summary_csv: Option<PathBuf>,
}

impl PipelineConfig {
    /// Create a validated configuration.
    ///
    /// # Errors
    /// Returns a config error if fewer than two bin boundaries are given,
    /// the boundaries are not strictly ascending, or the date range is
    /// inverted.
    pub fn new(
        record_dir: impl AsRef<Path>,
        age_bins: &[u32],
        min_date: NaiveDate,
        max_date: NaiveDate,
    ) -> Result<Self> {
        if age_bins.len() < 2 {
            return Err(PipelineError::Config(format!(
                "need at least two age-bin boundaries, got {}",
                age_bins.len()
            )));
        }
        if !age_bins.windows(2).all(|w| w[0] < w[1]) {
            return Err(PipelineError::Config(format!(
                "age-bin boundaries must be strictly ascending: {age_bins:?}"
            )));
        }
        if min_date > max_date {
            return Err(PipelineError::Config(format!(
                "min_date {min_date} is after max_date {max_date}"
            )));
        }
        Ok(Self {
            record_dir: record_dir.as_ref().to_path_buf(),
            age_bins: age_bins.to_vec(),
            min_date,
            max_date,
            summary_csv: None,
        })
    }

    /// Attach an optional regional summary CSV
    #[must_use]
    pub fn with_summary_csv(mut self, path: impl AsRef<Path>) -> Self {
        self.summary_csv = Some(path.as_ref().to_path_buf());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_valid_config() {
        let cfg = PipelineConfig::new(
            "/tmp/records",
            &DEFAULT_AGE_BINS,
            date(2020, 5, 1),
            date(2020, 12, 31),
        )
        .unwrap();
        assert_eq!(cfg.age_bins, vec![0, 12, 25, 65, 101]);
        assert!(cfg.summary_csv.is_none());
    }

    #[test]
    fn test_rejects_unsorted_bins() {
        let err = PipelineConfig::new(
            "/tmp/records",
            &[0, 25, 12],
            date(2020, 5, 1),
            date(2020, 12, 31),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_rejects_single_boundary() {
        let err =
            PipelineConfig::new("/tmp/records", &[0], date(2020, 5, 1), date(2020, 12, 31))
                .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_rejects_inverted_date_range() {
        let err = PipelineConfig::new(
            "/tmp/records",
            &DEFAULT_AGE_BINS,
            date(2020, 12, 31),
            date(2020, 5, 1),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
