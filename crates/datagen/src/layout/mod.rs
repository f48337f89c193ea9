//! Physical layout of the materialized datasets.
//!
//! Each dataset is written twice. The unsorted layout is a random permutation
//! of all rows split into many partitions. The sorted layout is a total sort by
//! the join key split into fewer contiguous ranges, so that reading the
//! partitions in file order yields a globally sorted sequence. Reducing the
//! partition count of separately sorted partitions would only sort rows locally.

pub mod files;
pub mod partition;

use std::fs;
use std::path::{Path, PathBuf};

use datafusion::arrow::array::{RecordBatch, UInt32Array};
use datafusion::arrow::compute::take_record_batch;
use log::{debug, info, warn};
use rand::Rng;
use uuid::Uuid;

use crate::error::{DatagenError, DatagenResult};
use crate::layout::files::{
    partition_file_name, write_partition_file, write_success_marker, TEMPORARY_DIR_NAME,
};
use crate::layout::partition::{partition_ranges, shuffled_indices, sorted_indices};
use crate::schema::{DatasetId, EntityKind, Layout};

#[derive(Debug, Clone)]
pub struct LayoutWriterOptions {
    pub max_row_group_size: usize,
}

impl Default for LayoutWriterOptions {
    fn default() -> Self {
        Self {
            max_row_group_size: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub id: DatasetId,
    pub path: PathBuf,
    pub rows: u64,
    pub partitions: usize,
}

/// Materializes one dataset under the output root.
///
/// A dataset is staged under `_temporary` and only moved to its final
/// directory after all partitions and the `_SUCCESS` marker are written.
/// A failed write removes the staged files and leaves no dataset directory.
#[derive(Debug, Clone)]
pub struct LayoutWriter {
    root: PathBuf,
    entity: EntityKind,
    name: String,
    options: LayoutWriterOptions,
}

impl LayoutWriter {
    pub fn try_new(
        root: impl Into<PathBuf>,
        entity: EntityKind,
        name: impl Into<String>,
        options: LayoutWriterOptions,
    ) -> DatagenResult<Self> {
        if options.max_row_group_size == 0 {
            return Err(DatagenError::invalid("the maximum row group size must be positive"));
        }
        Ok(Self {
            root: root.into(),
            entity,
            name: name.into(),
            options,
        })
    }

    pub fn dataset_id(&self, layout: Layout) -> DatasetId {
        DatasetId::new(self.entity, layout, &self.name)
    }

    pub fn write_unsorted<R: Rng>(
        &self,
        batch: &RecordBatch,
        partitions: usize,
        rng: &mut R,
    ) -> DatagenResult<DatasetSummary> {
        let indices = shuffled_indices(batch.num_rows(), rng)?;
        self.write(Layout::Unsorted, batch, &indices, partitions)
    }

    pub fn write_sorted(
        &self,
        batch: &RecordBatch,
        partitions: usize,
    ) -> DatagenResult<DatasetSummary> {
        let key = self.entity.join_key();
        let row_id = self.entity.row_id();
        let columns = if key == row_id {
            vec![key]
        } else {
            vec![key, row_id]
        };
        let indices = sorted_indices(batch, &columns)?;
        self.write(Layout::Sorted, batch, &indices, partitions)
    }

    fn write(
        &self,
        layout: Layout,
        batch: &RecordBatch,
        indices: &UInt32Array,
        partitions: usize,
    ) -> DatagenResult<DatasetSummary> {
        let max_row_group_size = self.options.max_row_group_size;
        self.write_with(layout, batch, indices, partitions, |path, part| {
            write_partition_file(path, part, max_row_group_size)
        })
    }

    /// Writes a dataset using `write_file` to write each partition file.
    fn write_with<F>(
        &self,
        layout: Layout,
        batch: &RecordBatch,
        indices: &UInt32Array,
        partitions: usize,
        write_file: F,
    ) -> DatagenResult<DatasetSummary>
    where
        F: FnMut(&Path, &RecordBatch) -> DatagenResult<u64>,
    {
        let id = self.dataset_id(layout);
        let target = self.root.join(id.dir_name());
        if target.exists() {
            return Err(DatagenError::invalid(format!(
                "dataset already exists: {}",
                target.display()
            )));
        }
        let temporary = self.root.join(TEMPORARY_DIR_NAME);
        let staging = temporary.join(id.dir_name());
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| DatagenError::io(&staging, e))?;
        }
        fs::create_dir_all(&staging).map_err(|e| DatagenError::io(&staging, e))?;

        let published = self
            .write_partitions(&staging, batch, indices, partitions, write_file)
            .and_then(|x| {
                fs::rename(&staging, &target).map_err(|e| DatagenError::io(&target, e))?;
                Ok(x)
            });
        let (rows, files) = match published {
            Ok(x) => x,
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&staging) {
                    warn!("failed to remove {}: {cleanup}", staging.display());
                }
                remove_if_empty(&temporary);
                return Err(e);
            }
        };
        remove_if_empty(&temporary);
        info!(
            "Wrote {rows} rows to {} in {files} partition(s)",
            target.display()
        );
        Ok(DatasetSummary {
            id,
            path: target,
            rows,
            partitions: files,
        })
    }

    fn write_partitions<F>(
        &self,
        dir: &Path,
        batch: &RecordBatch,
        indices: &UInt32Array,
        partitions: usize,
        mut write_file: F,
    ) -> DatagenResult<(u64, usize)>
    where
        F: FnMut(&Path, &RecordBatch) -> DatagenResult<u64>,
    {
        let job_id = Uuid::new_v4().to_string();
        let ranges = partition_ranges(indices.len(), partitions)?;
        let mut rows = 0;
        for (i, range) in ranges.iter().enumerate() {
            let part = take_record_batch(batch, &indices.slice(range.start, range.len()))?;
            rows += write_file(&dir.join(partition_file_name(i, &job_id)), &part)?;
        }
        if rows != batch.num_rows() as u64 {
            return Err(DatagenError::internal(format!(
                "wrote {rows} rows for a batch of {} rows",
                batch.num_rows()
            )));
        }
        write_success_marker(dir)?;
        Ok((rows, ranges.len()))
    }
}

/// Removes the staging area once no other dataset is staged in it.
fn remove_if_empty(dir: &Path) {
    if fs::remove_dir(dir).is_err() {
        debug!("{} is not empty", dir.display());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use datafusion::arrow::array::AsArray;
    use datafusion::arrow::compute::concat_batches;
    use datafusion::arrow::datatypes::Int64Type;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::generation::{FactGenerator, HotSet, RecordGenerator, SkewedReferenceSampler};
    use crate::layout::files::{has_success_marker, list_partition_files, read_column};
    use crate::schema::FactColumn;

    fn fact_batch(rows: u64, rng: &mut StdRng) -> DatagenResult<RecordBatch> {
        let hot = HotSet::sample(0..100, 0.1, 50, rng)?;
        let sampler = SkewedReferenceSampler::try_new(hot, 100, 0.8)?;
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
        let generator = FactGenerator::try_new(rows, sampler, 1000, date)?;
        let batches = generator
            .batches(128, rng)?
            .collect::<DatagenResult<Vec<_>>>()?;
        Ok(concat_batches(&generator.schema(), &batches)?)
    }

    fn writer(root: &Path) -> DatagenResult<LayoutWriter> {
        LayoutWriter::try_new(
            root,
            EntityKind::Fact,
            "transactions",
            LayoutWriterOptions::default(),
        )
    }

    fn read_keys(dir: &Path, column: &str) -> DatagenResult<Vec<Vec<i64>>> {
        list_partition_files(dir)?
            .iter()
            .map(|path| {
                let mut keys = vec![];
                for batch in read_column(path, column)? {
                    keys.extend(batch?.column(0).as_primitive::<Int64Type>().values().iter());
                }
                Ok(keys)
            })
            .collect()
    }

    #[test]
    fn test_sorted_layout_is_globally_sorted() -> DatagenResult<()> {
        let mut rng = StdRng::seed_from_u64(17);
        let batch = fact_batch(1000, &mut rng)?;
        for partitions in [1, 4, 20, 1000] {
            let root = tempfile::tempdir().map_err(|e| DatagenError::io("tempdir", e))?;
            let writer = writer(root.path())?;
            let summary = writer.write_sorted(&batch, partitions)?;
            assert_eq!(summary.rows, 1000);
            assert_eq!(summary.partitions, partitions);
            assert!(has_success_marker(&summary.path));

            let parts = read_keys(&summary.path, FactColumn::PRODUCT_ID)?;
            assert_eq!(parts.len(), partitions);
            let keys = parts.concat();
            assert_eq!(keys.len(), 1000);
            assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        }
        Ok(())
    }

    #[test]
    fn test_unsorted_layout_conserves_rows() -> DatagenResult<()> {
        let mut rng = StdRng::seed_from_u64(5);
        let batch = fact_batch(1000, &mut rng)?;
        let root = tempfile::tempdir().map_err(|e| DatagenError::io("tempdir", e))?;
        let writer = writer(root.path())?;
        let summary = writer.write_unsorted(&batch, 200, &mut rng)?;
        assert_eq!(summary.rows, 1000);
        assert_eq!(summary.partitions, 200);
        assert_eq!(summary.path, root.path().join("unsorted_transactions"));

        let ids = read_keys(&summary.path, FactColumn::TRANSACTION_ID)?.concat();
        assert_eq!(ids.len(), 1000);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 1000);
        assert!(!ids.windows(2).all(|w| w[0] <= w[1]));
        assert!(!root.path().join(TEMPORARY_DIR_NAME).exists());
        Ok(())
    }

    #[test]
    fn test_failed_write_leaves_no_dataset() -> DatagenResult<()> {
        let mut rng = StdRng::seed_from_u64(5);
        let batch = fact_batch(10, &mut rng)?;
        let root = tempfile::tempdir().map_err(|e| DatagenError::io("tempdir", e))?;
        // a file in place of the staging directory makes the write fail
        let blocker = root.path().join(TEMPORARY_DIR_NAME);
        fs::write(&blocker, b"").map_err(|e| DatagenError::io(&blocker, e))?;
        let writer = writer(root.path())?;
        let result = writer.write_sorted(&batch, 4);
        assert!(matches!(result, Err(DatagenError::IoError { .. })));
        assert!(!root.path().join("sorted_transactions").exists());
        Ok(())
    }

    #[test]
    fn test_empty_dataset_has_one_partition() -> DatagenResult<()> {
        let mut rng = StdRng::seed_from_u64(5);
        let batch = fact_batch(0, &mut rng)?;
        let root = tempfile::tempdir().map_err(|e| DatagenError::io("tempdir", e))?;
        let writer = writer(root.path())?;
        let summary = writer.write_sorted(&batch, 20)?;
        assert_eq!(summary.rows, 0);
        assert_eq!(list_partition_files(&summary.path)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_failed_partition_write_removes_staging() -> DatagenResult<()> {
        let mut rng = StdRng::seed_from_u64(5);
        let batch = fact_batch(100, &mut rng)?;
        let root = tempfile::tempdir().map_err(|e| DatagenError::io("tempdir", e))?;
        let writer = writer(root.path())?;
        let indices = sorted_indices(&batch, &[FactColumn::PRODUCT_ID])?;
        let mut written = vec![];
        let result = writer.write_with(Layout::Sorted, &batch, &indices, 4, |path, part| {
            if written.len() == 2 {
                return Err(DatagenError::internal("no space left on device"));
            }
            let rows = write_partition_file(path, part, 1024)?;
            written.push(path.to_path_buf());
            Ok(rows)
        });
        assert!(matches!(result, Err(DatagenError::InternalError(_))));
        assert_eq!(written.len(), 2);
        assert!(written.iter().all(|x| !x.exists()));
        let temporary = root.path().join(TEMPORARY_DIR_NAME);
        assert!(!temporary.join("sorted_transactions").exists());
        assert!(!temporary.exists());
        assert!(!root.path().join("sorted_transactions").exists());
        Ok(())
    }

    #[test]
    fn test_failed_rename_removes_staging() -> DatagenResult<()> {
        let mut rng = StdRng::seed_from_u64(5);
        let batch = fact_batch(100, &mut rng)?;
        let root = tempfile::tempdir().map_err(|e| DatagenError::io("tempdir", e))?;
        let writer = writer(root.path())?;
        let indices = sorted_indices(&batch, &[FactColumn::PRODUCT_ID])?;
        let target = root.path().join("sorted_transactions");
        let blocker = target.join("blocker");
        // a non-empty directory appearing at the target makes the rename fail
        let result = writer.write_with(Layout::Sorted, &batch, &indices, 4, |path, part| {
            if !blocker.exists() {
                fs::create_dir_all(&target).map_err(|e| DatagenError::io(&target, e))?;
                fs::write(&blocker, b"").map_err(|e| DatagenError::io(&blocker, e))?;
            }
            write_partition_file(path, part, 1024)
        });
        assert!(matches!(result, Err(DatagenError::IoError { .. })));
        let temporary = root.path().join(TEMPORARY_DIR_NAME);
        assert!(!temporary.exists());
        assert!(list_partition_files(&target)?.is_empty());
        assert!(!has_success_marker(&target));
        Ok(())
    }

    #[test]
    fn test_zero_row_group_size_is_rejected() {
        let result = LayoutWriter::try_new(
            "data",
            EntityKind::Fact,
            "transactions",
            LayoutWriterOptions {
                max_row_group_size: 0,
            },
        );
        assert!(matches!(result, Err(DatagenError::InvalidArgument(_))));
    }
}
