use std::sync::Arc;

use datafusion::arrow::array::{
    ArrayRef, Float64Array, Int32Array, Int64Array, RecordBatch, StringArray,
};
use datafusion::arrow::datatypes::SchemaRef;
use rand::Rng;

use crate::error::DatagenResult;
use crate::generation::{row_count, RecordGenerator};
use crate::schema::EntityKind;

/// Product categories, indexed by `id mod 10`.
pub const CATEGORIES: [&str; 10] = [
    "Electronics",
    "Clothing",
    "Home",
    "Beauty",
    "Sports",
    "Books",
    "Food",
    "Toys",
    "Health",
    "Automotive",
];

const MIN_PRICE: f64 = 10.0;
const MAX_PRICE: f64 = 1000.0;
const MAX_STOCK_QUANTITY: i32 = 1000;

pub fn category_for(id: i64) -> &'static str {
    CATEGORIES[id.rem_euclid(CATEGORIES.len() as i64) as usize]
}

pub fn product_name(id: i64) -> String {
    format!("Product_{id}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimensionRecord {
    pub id: i64,
    pub name: String,
    pub category: &'static str,
    pub price: f64,
    pub stock_quantity: i32,
}

/// Generates the product catalog with dense ids `0..rows`.
#[derive(Debug, Clone)]
pub struct DimensionGenerator {
    rows: i64,
}

impl DimensionGenerator {
    pub fn try_new(rows: u64) -> DatagenResult<Self> {
        Ok(Self {
            rows: row_count(rows)?,
        })
    }
}

impl RecordGenerator for DimensionGenerator {
    type Record = DimensionRecord;

    fn num_rows(&self) -> i64 {
        self.rows
    }

    fn schema(&self) -> SchemaRef {
        EntityKind::Dimension.schema()
    }

    fn record<R: Rng>(&self, id: i64, rng: &mut R) -> DimensionRecord {
        DimensionRecord {
            id,
            name: product_name(id),
            category: category_for(id),
            price: rng.random_range(MIN_PRICE..MAX_PRICE),
            stock_quantity: rng.random_range(0..MAX_STOCK_QUANTITY),
        }
    }

    fn to_batch(&self, records: &[DimensionRecord]) -> DatagenResult<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.id))),
            Arc::new(StringArray::from_iter_values(records.iter().map(|r| &r.name))),
            Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.category))),
            Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.price))),
            Arc::new(Int32Array::from_iter_values(
                records.iter().map(|r| r.stock_quantity),
            )),
        ];
        Ok(RecordBatch::try_new(self.schema(), columns)?)
    }
}
