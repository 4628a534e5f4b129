//! The companion metadata document for a pipeline output table.
//!
//! Downstream tooling reads this document instead of scanning the output:
//! it records the regions and dates observed, the full field list, and
//! min/max statistics per numeric field. The index fields (`region`,
//! `timestamp`) are the only string fields; every series column is
//! numerical.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::aggregate::RegionalTable;
use crate::error::Result;

/// Min/max statistics for one numeric field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRange {
    pub min: i64,
    pub max: i64,
}

/// Schema description of one pipeline output table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputMetadata {
    /// Regions observed, sorted
    pub all_regions: Vec<String>,
    /// Dates observed as ISO strings, sorted
    pub all_timestamps: Vec<String>,
    /// Every field including the string index fields, sorted
    pub all_fields: Vec<String>,
    /// Min/max per numeric field
    pub field_statistics: BTreeMap<String, FieldRange>,
}

impl OutputMetadata {
    /// Describe an output table
    #[must_use]
    pub fn describe(table: &RegionalTable) -> Self {
        let all_regions = table
            .region_names()
            .iter()
            .map(|r| r.to_string())
            .collect();
        let all_timestamps = table.dates().iter().map(ToString::to_string).collect();

        let mut all_fields: Vec<String> = table.columns().to_vec();
        all_fields.push("region".to_string());
        all_fields.push("timestamp".to_string());
        all_fields.sort_unstable();

        let field_statistics = table
            .columns()
            .iter()
            .filter_map(|column| {
                table
                    .column_range(column)
                    .map(|(min, max)| (column.clone(), FieldRange { min, max }))
            })
            .collect();

        Self {
            all_regions,
            all_timestamps,
            all_fields,
            field_statistics,
        }
    }

    /// Serialize as JSON
    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// Serialize as a JSON file
    pub fn write_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        self.write_json(file)
    }
}
