//! Row generators for the dimension and fact datasets.
//!
//! Rows are independent of each other: each row is a function of its id and a
//! random source, so generation can be split into contiguous id ranges.

mod dimension;
mod fact;
mod sampler;

use std::ops::Range;

use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::datatypes::SchemaRef;
use rand::Rng;

pub use dimension::{category_for, product_name, DimensionGenerator, DimensionRecord, CATEGORIES};
pub use fact::{FactGenerator, FactRecord, EVENT_WINDOW_DAYS};
pub use sampler::{HotSet, SkewedReferenceSampler};

use crate::error::{DatagenError, DatagenResult};

pub trait RecordGenerator {
    type Record;

    fn num_rows(&self) -> i64;

    fn schema(&self) -> SchemaRef;

    fn record<R: Rng>(&self, id: i64, rng: &mut R) -> Self::Record;

    fn to_batch(&self, records: &[Self::Record]) -> DatagenResult<RecordBatch>;

    /// Generates the records for a contiguous range of ids as a single batch.
    fn generate_batch<R: Rng>(&self, ids: Range<i64>, rng: &mut R) -> DatagenResult<RecordBatch> {
        let records = ids.map(|id| self.record(id, rng)).collect::<Vec<_>>();
        self.to_batch(&records)
    }

    /// Returns a lazy sequence of all records in ascending id order.
    fn records<'a, R: Rng>(&'a self, rng: &'a mut R) -> Records<'a, Self, R>
    where
        Self: Sized,
    {
        Records {
            generator: self,
            rng,
            next: 0,
        }
    }

    /// Returns a lazy sequence of record batches with at most `batch_size` rows each.
    fn batches<'a, R: Rng>(
        &'a self,
        batch_size: usize,
        rng: &'a mut R,
    ) -> DatagenResult<RecordBatches<'a, Self, R>>
    where
        Self: Sized,
    {
        let batch_size = i64::try_from(batch_size)
            .ok()
            .filter(|x| *x > 0)
            .ok_or_else(|| DatagenError::invalid(format!("invalid batch size: {batch_size}")))?;
        Ok(RecordBatches {
            generator: self,
            rng,
            batch_size,
            next: 0,
        })
    }
}

pub struct Records<'a, G, R> {
    generator: &'a G,
    rng: &'a mut R,
    next: i64,
}

impl<G: RecordGenerator, R: Rng> Iterator for Records<'_, G, R> {
    type Item = G::Record;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.generator.num_rows() {
            return None;
        }
        let record = self.generator.record(self.next, self.rng);
        self.next += 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.generator.num_rows() - self.next).unwrap_or(0);
        (remaining, Some(remaining))
    }
}

pub struct RecordBatches<'a, G, R> {
    generator: &'a G,
    rng: &'a mut R,
    batch_size: i64,
    next: i64,
}

impl<G: RecordGenerator, R: Rng> Iterator for RecordBatches<'_, G, R> {
    type Item = DatagenResult<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let end = self.generator.num_rows();
        if self.next >= end {
            return None;
        }
        let start = self.next;
        self.next = start.saturating_add(self.batch_size).min(end);
        Some(self.generator.generate_batch(start..self.next, self.rng))
    }
}

fn row_count(rows: u64) -> DatagenResult<i64> {
    i64::try_from(rows).map_err(|_| DatagenError::invalid(format!("row count too large: {rows}")))
}
