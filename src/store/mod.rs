//! Reading the record container.
//!
//! The container is a directory holding one Parquet file per named table.
//! Each read opens the file, drains it into record batches, and closes it
//! before returning; the handle is never held across pipeline stages.

pub mod decode;

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::error::{PipelineError, Result};
use crate::geography::GeographyIndex;
use crate::model::{AreaRow, EventKind, EventRow, LocationRow, Person, RegionRow, SuperAreaRow};

/// A handle to the record container directory.
///
/// Holds only the directory path; files are opened per table read.
#[derive(Debug, Clone)]
pub struct TableStore {
    dir: PathBuf,
}

impl TableStore {
    /// Open a record container.
    ///
    /// # Errors
    /// Returns an IO error if the path does not exist or is not a directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() || !dir.is_dir() {
            return Err(PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("record container directory does not exist: {}", dir.display()),
            )));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Read every batch of a named table. An empty table is valid input.
    fn read_table(&self, table: &'static str) -> Result<Vec<RecordBatch>> {
        let path = self.dir.join(format!("{table}.parquet"));
        if !path.is_file() {
            return Err(PipelineError::MissingTable {
                table,
                path: self.dir.clone(),
            });
        }
        log::debug!("reading table '{table}' from {}", path.display());
        let file = File::open(&path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(batches)
    }

    /// Read the `population` table
    pub fn population(&self) -> Result<Vec<Person>> {
        const TABLE: &str = "population";
        let mut people = Vec::new();
        for batch in self.read_table(TABLE)? {
            let ids = decode::u64_column(&batch, TABLE, "id")?;
            let ages = decode::u32_column(&batch, TABLE, "age")?;
            let area_ids = decode::u64_column(&batch, TABLE, "area_id")?;
            for ((id, age), area_id) in ids.into_iter().zip(ages).zip(area_ids) {
                people.push(Person { id, age, area_id });
            }
        }
        Ok(people)
    }

    /// Read the `areas` table
    pub fn areas(&self) -> Result<Vec<AreaRow>> {
        const TABLE: &str = "areas";
        let mut rows = Vec::new();
        for batch in self.read_table(TABLE)? {
            let ids = decode::u64_column(&batch, TABLE, "id")?;
            let names = decode::string_column(&batch, TABLE, "name")?;
            let super_area_ids = decode::u64_column(&batch, TABLE, "super_area_id")?;
            for ((id, name), super_area_id) in ids.into_iter().zip(names).zip(super_area_ids) {
                rows.push(AreaRow {
                    id,
                    name,
                    super_area_id,
                });
            }
        }
        Ok(rows)
    }

    /// Read the `super_areas` table
    pub fn super_areas(&self) -> Result<Vec<SuperAreaRow>> {
        const TABLE: &str = "super_areas";
        let mut rows = Vec::new();
        for batch in self.read_table(TABLE)? {
            let ids = decode::u64_column(&batch, TABLE, "id")?;
            let names = decode::string_column(&batch, TABLE, "name")?;
            let region_ids = decode::u64_column(&batch, TABLE, "region_id")?;
            for ((id, name), region_id) in ids.into_iter().zip(names).zip(region_ids) {
                rows.push(SuperAreaRow {
                    id,
                    name,
                    region_id,
                });
            }
        }
        Ok(rows)
    }

    /// Read the `regions` table
    pub fn regions(&self) -> Result<Vec<RegionRow>> {
        const TABLE: &str = "regions";
        let mut rows = Vec::new();
        for batch in self.read_table(TABLE)? {
            let ids = decode::u64_column(&batch, TABLE, "id")?;
            let names = decode::string_column(&batch, TABLE, "name")?;
            for (id, name) in ids.into_iter().zip(names) {
                rows.push(RegionRow { id, name });
            }
        }
        Ok(rows)
    }

    /// Read the `locations` table
    pub fn locations(&self) -> Result<Vec<LocationRow>> {
        const TABLE: &str = "locations";
        let mut rows = Vec::new();
        for batch in self.read_table(TABLE)? {
            let ids = decode::u64_column(&batch, TABLE, "id")?;
            let group_ids = decode::u64_column(&batch, TABLE, "group_id")?;
            let specs = decode::string_column(&batch, TABLE, "spec")?;
            for ((id, group_id), spec) in ids.into_iter().zip(group_ids).zip(specs) {
                rows.push(LocationRow {
                    id,
                    group_id,
                    spec,
                });
            }
        }
        Ok(rows)
    }

    /// Read one event table. The person-id and optional location columns are
    /// determined by the event kind's enumerated column mapping.
    pub fn events(&self, kind: EventKind) -> Result<Vec<EventRow>> {
        let table = kind.table_name();
        let mut rows = Vec::new();
        for batch in self.read_table(table)? {
            let person_ids = decode::u64_column(&batch, table, kind.person_column())?;
            let timestamps = decode::string_column(&batch, table, "timestamp")?;
            let specs = match kind.location_spec_column() {
                Some(column) => decode::opt_string_column(&batch, table, column)?,
                None => None,
            };
            let group_ids = match kind.group_column() {
                Some(column) => decode::opt_u64_column(&batch, table, column)?,
                None => None,
            };
            for (row, (person_id, timestamp)) in
                person_ids.into_iter().zip(timestamps).enumerate()
            {
                rows.push(EventRow {
                    person_id,
                    timestamp,
                    location_spec: specs.as_ref().map(|s| s[row].clone()),
                    group_id: group_ids.as_ref().map(|g| g[row]),
                });
            }
        }
        Ok(rows)
    }

    /// Read the three geography tables and resolve the area → super-area →
    /// region chain in one step.
    pub fn geography(&self) -> Result<GeographyIndex> {
        let areas = self.areas()?;
        let super_areas = self.super_areas()?;
        let regions = self.regions()?;
        Ok(GeographyIndex::resolve(&areas, &super_areas, &regions))
    }
}
