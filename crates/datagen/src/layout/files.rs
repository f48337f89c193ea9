//! File conventions of a materialized dataset directory.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use datafusion::arrow::array::RecordBatch;
use datafusion::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use datafusion::parquet::arrow::{ArrowWriter, ProjectionMask};
use datafusion::parquet::basic::Compression;
use datafusion::parquet::file::properties::WriterProperties;
use datagen_common::datetime::format_timestamp;

use crate::error::{DatagenError, DatagenResult};

/// The empty file marking a dataset directory whose partitions are all written.
pub const SUCCESS_FILE_NAME: &str = "_SUCCESS";
/// The directory under the output root where datasets are staged before publication.
pub const TEMPORARY_DIR_NAME: &str = "_temporary";
pub const CONFIRMATION_FILE_NAME: &str = "SORTED_CONFIRMATION.txt";

const PARTITION_FILE_PREFIX: &str = "part-";
const PARTITION_FILE_SUFFIX: &str = ".parquet";

pub fn partition_file_name(index: usize, job_id: &str) -> String {
    format!("{PARTITION_FILE_PREFIX}{index:05}-{job_id}{PARTITION_FILE_SUFFIX}")
}

/// Lists the partition files of a dataset directory in partition order.
pub fn list_partition_files(dir: &Path) -> DatagenResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| DatagenError::io(dir, e))?;
    let mut files = vec![];
    for entry in entries {
        let entry = entry.map_err(|e| DatagenError::io(dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(PARTITION_FILE_PREFIX) && name.ends_with(PARTITION_FILE_SUFFIX) {
            files.push(entry.path());
        }
    }
    // Partition indices are zero-padded, so name order is partition order.
    files.sort();
    Ok(files)
}

pub fn write_partition_file(
    path: &Path,
    batch: &RecordBatch,
    max_row_group_size: usize,
) -> DatagenResult<u64> {
    let file = File::create(path).map_err(|e| DatagenError::io(path, e))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_size(max_row_group_size)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    let metadata = writer.close()?;
    Ok(metadata.num_rows as u64)
}

/// Returns the number of rows recorded in the file footer.
pub fn read_row_count(path: &Path) -> DatagenResult<u64> {
    let file = File::open(path).map_err(|e| DatagenError::io(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let rows = builder.metadata().file_metadata().num_rows();
    u64::try_from(rows).map_err(|_| DatagenError::internal(format!("invalid row count: {rows}")))
}

/// Reads a single column of a partition file as record batches.
pub fn read_column(
    path: &Path,
    column: &str,
) -> DatagenResult<impl Iterator<Item = DatagenResult<RecordBatch>>> {
    let file = File::open(path).map_err(|e| DatagenError::io(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let Some((index, _)) = builder.schema().column_with_name(column) else {
        return Err(DatagenError::invalid(format!(
            "column {column} not found in {}",
            path.display()
        )));
    };
    // The schema is flat, so the Arrow field index is the Parquet root column index.
    let mask = ProjectionMask::roots(builder.parquet_schema(), [index]);
    let reader = builder.with_projection(mask).build()?;
    Ok(reader.map(|batch| batch.map_err(DatagenError::from)))
}

pub fn write_success_marker(dir: &Path) -> DatagenResult<()> {
    let path = dir.join(SUCCESS_FILE_NAME);
    File::create(&path).map_err(|e| DatagenError::io(&path, e))?;
    Ok(())
}

pub fn has_success_marker(dir: &Path) -> bool {
    dir.join(SUCCESS_FILE_NAME).is_file()
}

/// Writes the informational marker recording that the sorted datasets are
/// globally sorted, together with the generation time.
pub fn write_confirmation<Tz: TimeZone>(
    root: &Path,
    key: &str,
    time: &DateTime<Tz>,
) -> DatagenResult<PathBuf>
where
    Tz::Offset: std::fmt::Display,
{
    let path = root.join(CONFIRMATION_FILE_NAME);
    let mut file = File::create(&path).map_err(|e| DatagenError::io(&path, e))?;
    let content = format!(
        "Datasets were generated with guaranteed global sorting on {key}.\n\
         Generation timestamp: {}\n",
        format_timestamp(time)
    );
    file.write_all(content.as_bytes())
        .map_err(|e| DatagenError::io(&path, e))?;
    Ok(path)
}
