use std::ops::Range;

use datafusion::arrow::array::{RecordBatch, UInt32Array};
use datafusion::arrow::compute::{lexsort_to_indices, SortColumn, SortOptions};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{DatagenError, DatagenResult};

/// Splits `rows` rows into contiguous ranges for at most `partitions` partitions.
///
/// The range sizes differ by at most one row, with the larger ranges first.
/// No range is empty unless there are no rows, in which case a single empty
/// range is returned so that the dataset still has a file carrying the schema.
pub fn partition_ranges(rows: usize, partitions: usize) -> DatagenResult<Vec<Range<usize>>> {
    if partitions == 0 {
        return Err(DatagenError::invalid("partition count must be positive"));
    }
    if rows == 0 {
        return Ok(vec![0..0]);
    }
    let partitions = partitions.min(rows);
    let base = rows / partitions;
    let remainder = rows % partitions;
    let mut ranges = Vec::with_capacity(partitions);
    let mut start = 0;
    for i in 0..partitions {
        let size = base + usize::from(i < remainder);
        ranges.push(start..start + size);
        start += size;
    }
    Ok(ranges)
}

/// Returns a uniformly random permutation of the row indices.
pub fn shuffled_indices<R: Rng>(rows: usize, rng: &mut R) -> DatagenResult<UInt32Array> {
    let mut indices = (0..index_bound(rows)?).collect::<Vec<u32>>();
    indices.shuffle(rng);
    Ok(UInt32Array::from(indices))
}

/// Returns the row indices in ascending order of the sort columns.
///
/// The first column is the primary key; the remaining columns break ties,
/// so the resulting order is total when the last column is unique.
pub fn sorted_indices(batch: &RecordBatch, columns: &[&str]) -> DatagenResult<UInt32Array> {
    index_bound(batch.num_rows())?;
    let sort_columns = columns
        .iter()
        .map(|name| {
            let values = batch
                .column_by_name(name)
                .ok_or_else(|| DatagenError::invalid(format!("missing sort column: {name}")))?;
            Ok(SortColumn {
                values: values.clone(),
                options: Some(SortOptions {
                    descending: false,
                    nulls_first: true,
                }),
            })
        })
        .collect::<DatagenResult<Vec<_>>>()?;
    Ok(lexsort_to_indices(&sort_columns, None)?)
}

fn index_bound(rows: usize) -> DatagenResult<u32> {
    u32::try_from(rows).map_err(|_| {
        DatagenError::invalid(format!("too many rows for a single layout pass: {rows}"))
    })
}
