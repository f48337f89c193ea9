use std::sync::Arc;

use chrono::{Days, NaiveDate};
use datafusion::arrow::array::{
    ArrayRef, Date32Array, Float64Array, Int32Array, Int64Array, RecordBatch,
};
use datafusion::arrow::datatypes::SchemaRef;
use datagen_common::datetime::{date_to_date32, days_before};
use rand::Rng;

use crate::error::{DatagenError, DatagenResult};
use crate::generation::{row_count, RecordGenerator, SkewedReferenceSampler};
use crate::schema::EntityKind;

/// Event dates fall within this many days up to and including the reference date.
pub const EVENT_WINDOW_DAYS: u64 = 365;

const MIN_QUANTITY: i32 = 1;
const MAX_QUANTITY: i32 = 5;
const MIN_AMOUNT: f64 = 10.0;
const MAX_AMOUNT: f64 = 510.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FactRecord {
    pub id: i64,
    pub owner_id: i32,
    pub referenced_id: i64,
    pub event_date: NaiveDate,
    pub quantity: i32,
    pub amount: f64,
}

/// Generates transactions referencing the product catalog.
///
/// The event dates are relative to an explicit reference date rather than the
/// current date, so the output only depends on the random source.
#[derive(Debug, Clone)]
pub struct FactGenerator {
    rows: i64,
    sampler: SkewedReferenceSampler,
    owner_range: i32,
    reference_date: NaiveDate,
}

impl FactGenerator {
    pub fn try_new(
        rows: u64,
        sampler: SkewedReferenceSampler,
        owner_range: u32,
        reference_date: NaiveDate,
    ) -> DatagenResult<Self> {
        let owner_range = i32::try_from(owner_range)
            .ok()
            .filter(|x| *x > 0)
            .ok_or_else(|| DatagenError::invalid(format!("invalid owner range: {owner_range}")))?;
        days_before(reference_date, EVENT_WINDOW_DAYS - 1)?;
        Ok(Self {
            rows: row_count(rows)?,
            sampler,
            owner_range,
            reference_date,
        })
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }
}

impl RecordGenerator for FactGenerator {
    type Record = FactRecord;

    fn num_rows(&self) -> i64 {
        self.rows
    }

    fn schema(&self) -> SchemaRef {
        EntityKind::Fact.schema()
    }

    fn record<R: Rng>(&self, id: i64, rng: &mut R) -> FactRecord {
        let owner_id = rng.random_range(0..self.owner_range);
        let referenced_id = self.sampler.sample(rng);
        let offset = rng.random_range(0..EVENT_WINDOW_DAYS);
        FactRecord {
            id,
            owner_id,
            referenced_id,
            // the window is checked when the generator is created
            event_date: self.reference_date - Days::new(offset),
            quantity: rng.random_range(MIN_QUANTITY..=MAX_QUANTITY),
            amount: rng.random_range(MIN_AMOUNT..MAX_AMOUNT),
        }
    }

    fn to_batch(&self, records: &[FactRecord]) -> DatagenResult<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.id))),
            Arc::new(Int32Array::from_iter_values(records.iter().map(|r| r.owner_id))),
            Arc::new(Int64Array::from_iter_values(
                records.iter().map(|r| r.referenced_id),
            )),
            Arc::new(Date32Array::from_iter_values(
                records.iter().map(|r| date_to_date32(r.event_date)),
            )),
            Arc::new(Int32Array::from_iter_values(records.iter().map(|r| r.quantity))),
            Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.amount))),
        ];
        Ok(RecordBatch::try_new(self.schema(), columns)?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use datafusion::arrow::array::AsArray;
    use datafusion::arrow::datatypes::Date32Type;
    use datagen_common::datetime::date32_to_date;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::generation::HotSet;
    use crate::schema::FactColumn;

    fn reference_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap_or_default()
    }

    fn generator(rows: u64, rng: &mut StdRng) -> DatagenResult<FactGenerator> {
        let hot = HotSet::sample(0..100, 0.1, 50, rng)?;
        let sampler = SkewedReferenceSampler::try_new(hot, 100, 0.8)?;
        FactGenerator::try_new(rows, sampler, 500, reference_date())
    }

    #[test]
    fn test_record_fields() -> DatagenResult<()> {
        let mut rng = StdRng::seed_from_u64(9);
        let generator = generator(2000, &mut rng)?;
        let earliest = reference_date() - Days::new(EVENT_WINDOW_DAYS - 1);
        let records = generator.records(&mut rng).collect::<Vec<_>>();
        assert_eq!(records.len(), 2000);
        let ids = records.iter().map(|r| r.id).collect::<HashSet<_>>();
        assert_eq!(ids.len(), 2000);
        for record in &records {
            assert!((0..500).contains(&record.owner_id));
            assert!((0..100).contains(&record.referenced_id));
            assert!(record.event_date <= reference_date());
            assert!(record.event_date >= earliest);
            assert!((1..=5).contains(&record.quantity));
            assert!((10.0..510.0).contains(&record.amount));
        }
        Ok(())
    }

    #[test]
    fn test_same_seed_same_output() -> DatagenResult<()> {
        let run = |seed| -> DatagenResult<Vec<FactRecord>> {
            let mut rng = StdRng::seed_from_u64(seed);
            let generator = generator(100, &mut rng)?;
            Ok(generator.records(&mut rng).collect())
        };
        assert_eq!(run(1)?, run(1)?);
        Ok(())
    }

    #[test]
    fn test_batch_schema() -> DatagenResult<()> {
        let mut rng = StdRng::seed_from_u64(9);
        let generator = generator(10, &mut rng)?;
        let batch = generator.generate_batch(0..10, &mut rng)?;
        assert_eq!(batch.num_rows(), 10);
        assert_eq!(batch.schema(), EntityKind::Fact.schema());
        let dates = batch
            .column_by_name(FactColumn::TRANSACTION_DATE)
            .map(|x| x.as_primitive::<Date32Type>().values().to_vec())
            .unwrap_or_default();
        assert_eq!(dates.len(), 10);
        for days in dates {
            let date = date32_to_date(days)?;
            assert!(date <= generator.reference_date());
        }
        Ok(())
    }

    #[test]
    fn test_invalid_owner_range() -> DatagenResult<()> {
        let hot = HotSet::from_keys(vec![0])?;
        let sampler = SkewedReferenceSampler::try_new(hot, 1, 0.8)?;
        let result = FactGenerator::try_new(1, sampler, 0, reference_date());
        assert!(matches!(result, Err(DatagenError::InvalidArgument(_))));
        Ok(())
    }
}
