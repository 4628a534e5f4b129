//! Age stratification into fixed, right-open bands.

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::error::{PipelineError, Result};

/// A fixed, ordered partition of the age domain into right-open bands.
///
/// Boundaries `[0, 12, 25, 65, 101]` produce the bands `[0, 12)`, `[12, 25)`,
/// `[25, 65)` and `65+`: the final boundary is treated as open-ended, so the
/// last band has no upper limit. Every age at or above the first boundary is
/// assigned exactly one band; ages below it fall outside the partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeBands {
    edges: Vec<u32>,
}

impl AgeBands {
    /// Build a band partition from strictly ascending boundaries.
    ///
    /// # Errors
    /// Returns a config error for fewer than two boundaries or
    /// non-ascending boundaries.
    pub fn new(edges: &[u32]) -> Result<Self> {
        if edges.len() < 2 {
            return Err(PipelineError::Config(format!(
                "need at least two age-bin boundaries, got {}",
                edges.len()
            )));
        }
        if !edges.windows(2).all(|w| w[0] < w[1]) {
            return Err(PipelineError::Config(format!(
                "age-bin boundaries must be strictly ascending: {edges:?}"
            )));
        }
        Ok(Self {
            edges: edges.to_vec(),
        })
    }

    /// Number of bands
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len() - 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Band index for an age, or `None` if the age lies below the first
    /// boundary. The last band is open-ended.
    #[must_use]
    pub fn band_of(&self, age: u32) -> Option<usize> {
        if age < self.edges[0] {
            return None;
        }
        let last = self.len() - 1;
        if age >= self.edges[last] {
            return Some(last);
        }
        // edges is sorted, so the partition point is the band upper edge
        Some(self.edges.partition_point(|&e| e <= age) - 1)
    }

    /// Output column name for one band of a series.
    ///
    /// A pure function of the prefix and the boundaries: `{prefix}_{lo}_{hi}`
    /// for interior bands, `{prefix}_{lo}+` for the open-ended last band.
    #[must_use]
    pub fn column_name(&self, prefix: &str, band: usize) -> String {
        let lo = self.edges[band];
        if band == self.len() - 1 {
            format!("{prefix}_{lo}+")
        } else {
            format!("{prefix}_{}_{}", lo, self.edges[band + 1])
        }
    }

    /// Column names for every band of a series, in band order
    #[must_use]
    pub fn column_names(&self, prefix: &str) -> Vec<String> {
        (0..self.len()).map(|b| self.column_name(prefix, b)).collect()
    }
}

/// Per-group banded counts produced by [`bin_by`], with the number of
/// records whose age fell outside the partition.
#[derive(Debug)]
pub struct BandedCounts<K> {
    /// One count vector per group, aligned to the band order
    pub counts: FxHashMap<K, Vec<i64>>,
    /// Records excluded because their age lies below the first boundary
    pub dropped: usize,
}

/// Group records by a caller-supplied key plus age band and count them.
///
/// Absent band/group combinations stay at 0 in the per-group vector, so the
/// widened columns are always dense.
pub fn bin_by<T, K, FK, FA>(
    records: impl IntoIterator<Item = T>,
    bands: &AgeBands,
    key_fn: FK,
    age_fn: FA,
) -> BandedCounts<K>
where
    K: Eq + Hash,
    FK: Fn(&T) -> K,
    FA: Fn(&T) -> u32,
{
    let mut counts: FxHashMap<K, Vec<i64>> = FxHashMap::default();
    let mut dropped = 0usize;
    for record in records {
        match bands.band_of(age_fn(&record)) {
            Some(band) => {
                counts
                    .entry(key_fn(&record))
                    .or_insert_with(|| vec![0; bands.len()])[band] += 1;
            }
            None => dropped += 1,
        }
    }
    BandedCounts { counts, dropped }
}
