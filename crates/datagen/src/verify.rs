//! Read-back verification of the materialized datasets.
//!
//! Missing and incomplete dataset directories are reported rather than
//! treated as errors, so the verifier can run against a partial output set.
//! I/O errors while reading an existing dataset are propagated.

use std::fmt;
use std::path::{Path, PathBuf};

use comfy_table::{Cell, CellAlignment, Table};
use datafusion::arrow::array::AsArray;
use datafusion::arrow::datatypes::Int64Type;
use log::{info, warn};

use crate::error::{DatagenError, DatagenResult};
use crate::layout::files::{has_success_marker, list_partition_files, read_column, read_row_count};
use crate::schema::{DatasetId, Layout};

#[derive(Debug, Clone)]
pub struct VerifyTarget {
    pub id: DatasetId,
    /// The number of rows the dataset must contain, if known.
    pub expected_rows: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortCheck {
    pub checked_rows: u64,
    pub sorted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetStatus {
    NotFound,
    /// The directory exists but has no `_SUCCESS` marker.
    Incomplete,
    Found {
        rows: u64,
        partitions: usize,
        sort_check: Option<SortCheck>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    NotFound,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
            Verdict::NotFound => write!(f, "NOT FOUND"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatasetReport {
    pub id: DatasetId,
    pub path: PathBuf,
    pub expected_rows: Option<u64>,
    pub status: DatasetStatus,
}

impl DatasetReport {
    pub fn verdict(&self) -> Verdict {
        match &self.status {
            DatasetStatus::NotFound => Verdict::NotFound,
            DatasetStatus::Incomplete => Verdict::Fail,
            DatasetStatus::Found {
                rows, sort_check, ..
            } => {
                let count_ok = self.expected_rows.is_none_or(|x| x == *rows);
                let sort_ok = sort_check.as_ref().is_none_or(|x| x.sorted);
                if count_ok && sort_ok {
                    Verdict::Pass
                } else {
                    Verdict::Fail
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatasetVerifier {
    root: PathBuf,
    sample_rows: usize,
    full_scan: bool,
}

impl DatasetVerifier {
    pub fn new(root: impl Into<PathBuf>, sample_rows: usize) -> Self {
        Self {
            root: root.into(),
            sample_rows,
            full_scan: false,
        }
    }

    /// Checks the ordering of every row instead of the leading sample.
    pub fn with_full_scan(mut self, full_scan: bool) -> Self {
        self.full_scan = full_scan;
        self
    }

    pub fn verify(&self, targets: &[VerifyTarget]) -> DatagenResult<Vec<DatasetReport>> {
        info!("Verifying datasets in {}", self.root.display());
        targets.iter().map(|x| self.verify_dataset(x)).collect()
    }

    pub fn verify_dataset(&self, target: &VerifyTarget) -> DatagenResult<DatasetReport> {
        let path = self.root.join(target.id.dir_name());
        let status = self.dataset_status(&target.id, &path)?;
        let report = DatasetReport {
            id: target.id.clone(),
            path,
            expected_rows: target.expected_rows,
            status,
        };
        match &report.status {
            DatasetStatus::NotFound => info!("{}: directory not found", report.id),
            DatasetStatus::Incomplete => warn!("{}: dataset is incomplete", report.id),
            DatasetStatus::Found {
                rows, sort_check, ..
            } => {
                info!("{}: {rows} rows", report.id);
                if let Some(check) = sort_check {
                    info!(
                        "{}: sorting check on {} rows {}",
                        report.id,
                        check.checked_rows,
                        if check.sorted { "PASSED" } else { "FAILED" }
                    );
                }
            }
        }
        Ok(report)
    }

    fn dataset_status(&self, id: &DatasetId, path: &Path) -> DatagenResult<DatasetStatus> {
        if !path.exists() {
            return Ok(DatasetStatus::NotFound);
        }
        if !path.is_dir() {
            return Err(DatagenError::invalid(format!(
                "dataset path is not a directory: {}",
                path.display()
            )));
        }
        if !has_success_marker(path) {
            return Ok(DatasetStatus::Incomplete);
        }
        let files = list_partition_files(path)?;
        let rows = files
            .iter()
            .map(|x| read_row_count(x))
            .sum::<DatagenResult<u64>>()?;
        let sort_check = match id.layout {
            Layout::Sorted => Some(self.check_sorted(&files, id.entity.join_key())?),
            Layout::Unsorted => None,
        };
        Ok(DatasetStatus::Found {
            rows,
            partitions: files.len(),
            sort_check,
        })
    }

    /// Reads the key column in partition order and checks that the values are
    /// non-decreasing, including across partition boundaries.
    fn check_sorted(&self, files: &[PathBuf], column: &str) -> DatagenResult<SortCheck> {
        let limit = if self.full_scan {
            u64::MAX
        } else {
            self.sample_rows as u64
        };
        let mut previous: Option<i64> = None;
        let mut checked_rows = 0u64;
        for file in files {
            for batch in read_column(file, column)? {
                let batch = batch?;
                let values = batch.column(0).as_primitive_opt::<Int64Type>().ok_or_else(|| {
                    DatagenError::invalid(format!(
                        "column {column} in {} is not a 64-bit integer column",
                        file.display()
                    ))
                })?;
                for value in values.iter() {
                    if checked_rows >= limit {
                        return Ok(SortCheck {
                            checked_rows,
                            sorted: true,
                        });
                    }
                    checked_rows += 1;
                    let sorted = match (previous, value) {
                        (_, None) => false,
                        (None, Some(_)) => true,
                        (Some(p), Some(v)) => p <= v,
                    };
                    if !sorted {
                        return Ok(SortCheck {
                            checked_rows,
                            sorted: false,
                        });
                    }
                    previous = value;
                }
            }
        }
        Ok(SortCheck {
            checked_rows,
            sorted: true,
        })
    }
}

/// Renders the verification result as a table with one row per dataset.
pub fn render_reports(reports: &[DatasetReport]) -> Table {
    let mut table = Table::new();
    table.load_preset("||--+-++|    ++++++");
    table.set_header(vec!["Dataset", "Rows", "Partitions", "Sort check", "Result"]);
    for report in reports {
        let (rows, partitions, sort_check) = match &report.status {
            DatasetStatus::NotFound => ("-".to_string(), "-".to_string(), "-".to_string()),
            DatasetStatus::Incomplete => {
                ("-".to_string(), "-".to_string(), "incomplete".to_string())
            }
            DatasetStatus::Found {
                rows,
                partitions,
                sort_check,
            } => (
                rows.to_string(),
                partitions.to_string(),
                match sort_check {
                    Some(x) if x.sorted => format!("passed ({} rows)", x.checked_rows),
                    Some(x) => format!("failed at row {}", x.checked_rows),
                    None => "-".to_string(),
                },
            ),
        };
        table.add_row(vec![
            Cell::new(report.id.dir_name()),
            Cell::new(rows),
            Cell::new(partitions),
            Cell::new(sort_check),
            Cell::new(report.verdict()),
        ]);
    }
    for index in [1, 2] {
        if let Some(column) = table.column_mut(index) {
            column.set_cell_alignment(CellAlignment::Right);
        }
    }
    table
}
