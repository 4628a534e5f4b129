//! Typed column extraction from Arrow record batches.
//!
//! Text columns may arrive as Utf8 or as raw byte arrays (the container's
//! byte-encoded text); both decode to `String` here. Integer columns are
//! cast to a common width before extraction so the container may use any
//! integer type for ids and ages.

use arrow::array::{Array, BinaryArray, Int64Array, LargeBinaryArray, LargeStringArray, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

use crate::error::{PipelineError, Result};

fn column<'a>(
    batch: &'a RecordBatch,
    table: &'static str,
    name: &str,
) -> Result<&'a arrow::array::ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| PipelineError::MissingColumn {
            table,
            column: name.to_string(),
        })
}

/// Extract an unsigned integer column, accepting any Arrow integer type.
///
/// # Errors
/// Returns a decode error on nulls, negative values, or a non-integer
/// column type; a missing-column error if the column is absent.
pub fn u64_column(batch: &RecordBatch, table: &'static str, name: &str) -> Result<Vec<u64>> {
    let array = column(batch, table, name)?;
    let cast_array = cast(array, &DataType::Int64)
        .map_err(|e| PipelineError::decode(table, name, format!("not an integer column: {e}")))?;
    let values = cast_array
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| PipelineError::decode(table, name, "expected integer values"))?;
    let mut out = Vec::with_capacity(values.len());
    for row in 0..values.len() {
        if values.is_null(row) {
            return Err(PipelineError::decode(table, name, format!("null value at row {row}")));
        }
        let v = values.value(row);
        if v < 0 {
            return Err(PipelineError::decode(
                table,
                name,
                format!("negative value {v} at row {row}"),
            ));
        }
        out.push(v as u64);
    }
    Ok(out)
}

/// Extract an unsigned integer column narrowed to `u32` (ages, small ids)
pub fn u32_column(batch: &RecordBatch, table: &'static str, name: &str) -> Result<Vec<u32>> {
    let wide = u64_column(batch, table, name)?;
    wide.into_iter()
        .map(|v| {
            u32::try_from(v)
                .map_err(|_| PipelineError::decode(table, name, format!("value {v} exceeds u32")))
        })
        .collect()
}

/// Extract a text column, decoding byte-encoded columns as UTF-8.
///
/// # Errors
/// Returns a decode error on nulls, invalid UTF-8 in a byte column, or a
/// non-text column type.
pub fn string_column(batch: &RecordBatch, table: &'static str, name: &str) -> Result<Vec<String>> {
    let array = column(batch, table, name)?;
    let len = array.len();
    let mut out = Vec::with_capacity(len);
    for row in 0..len {
        if array.is_null(row) {
            return Err(PipelineError::decode(table, name, format!("null value at row {row}")));
        }
        let value = match array.data_type() {
            DataType::Utf8 => {
                let a = downcast::<StringArray>(array, table, name)?;
                a.value(row).to_string()
            }
            DataType::LargeUtf8 => {
                let a = downcast::<LargeStringArray>(array, table, name)?;
                a.value(row).to_string()
            }
            DataType::Binary => {
                let a = downcast::<BinaryArray>(array, table, name)?;
                decode_bytes(table, name, row, a.value(row))?
            }
            DataType::LargeBinary => {
                let a = downcast::<LargeBinaryArray>(array, table, name)?;
                decode_bytes(table, name, row, a.value(row))?
            }
            other => {
                return Err(PipelineError::decode(
                    table,
                    name,
                    format!("expected a text column, found {other}"),
                ));
            }
        };
        out.push(value);
    }
    Ok(out)
}

fn downcast<'a, T: 'static>(
    array: &'a arrow::array::ArrayRef,
    table: &'static str,
    name: &str,
) -> Result<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| PipelineError::decode(table, name, "unexpected array type"))
}

fn decode_bytes(table: &'static str, name: &str, row: usize, bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| PipelineError::decode(table, name, format!("invalid UTF-8 at row {row}")))
}

/// Extract a text column that may be absent from the table entirely
pub fn opt_string_column(
    batch: &RecordBatch,
    table: &'static str,
    name: &str,
) -> Result<Option<Vec<String>>> {
    if batch.column_by_name(name).is_none() {
        return Ok(None);
    }
    string_column(batch, table, name).map(Some)
}

/// Extract an integer column that may be absent from the table entirely
pub fn opt_u64_column(
    batch: &RecordBatch,
    table: &'static str,
    name: &str,
) -> Result<Option<Vec<u64>>> {
    if batch.column_by_name(name).is_none() {
        return Ok(None);
    }
    u64_column(batch, table, name).map(Some)
}
