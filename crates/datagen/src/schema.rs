use std::fmt;
use std::sync::{Arc, LazyLock};

use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use datagen_common::config::OutputConfig;

/// Column names of the dimension (product catalog) dataset.
pub struct DimensionColumn;

impl DimensionColumn {
    pub const PRODUCT_ID: &'static str = "product_id";
    pub const PRODUCT_NAME: &'static str = "product_name";
    pub const CATEGORY: &'static str = "category";
    pub const PRICE: &'static str = "price";
    pub const STOCK_QUANTITY: &'static str = "stock_quantity";
}

/// Column names of the fact (transaction) dataset.
pub struct FactColumn;

impl FactColumn {
    pub const TRANSACTION_ID: &'static str = "transaction_id";
    pub const CUSTOMER_ID: &'static str = "customer_id";
    pub const PRODUCT_ID: &'static str = "product_id";
    pub const TRANSACTION_DATE: &'static str = "transaction_date";
    pub const QUANTITY: &'static str = "quantity";
    pub const TOTAL_AMOUNT: &'static str = "total_amount";
}

static DIMENSION_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new(DimensionColumn::PRODUCT_ID, DataType::Int64, false),
        Field::new(DimensionColumn::PRODUCT_NAME, DataType::Utf8, false),
        Field::new(DimensionColumn::CATEGORY, DataType::Utf8, false),
        Field::new(DimensionColumn::PRICE, DataType::Float64, false),
        Field::new(DimensionColumn::STOCK_QUANTITY, DataType::Int32, false),
    ]))
});

static FACT_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new(FactColumn::TRANSACTION_ID, DataType::Int64, false),
        Field::new(FactColumn::CUSTOMER_ID, DataType::Int32, false),
        Field::new(FactColumn::PRODUCT_ID, DataType::Int64, false),
        Field::new(FactColumn::TRANSACTION_DATE, DataType::Date32, false),
        Field::new(FactColumn::QUANTITY, DataType::Int32, false),
        Field::new(FactColumn::TOTAL_AMOUNT, DataType::Float64, false),
    ]))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Dimension,
    Fact,
}

impl EntityKind {
    pub fn schema(&self) -> SchemaRef {
        match self {
            EntityKind::Dimension => Arc::clone(&DIMENSION_SCHEMA),
            EntityKind::Fact => Arc::clone(&FACT_SCHEMA),
        }
    }

    /// The column both datasets are joined on.
    pub fn join_key(&self) -> &'static str {
        match self {
            EntityKind::Dimension => DimensionColumn::PRODUCT_ID,
            EntityKind::Fact => FactColumn::PRODUCT_ID,
        }
    }

    /// The unique row identifier, used to break ties when sorting by the join key.
    pub fn row_id(&self) -> &'static str {
        match self {
            EntityKind::Dimension => DimensionColumn::PRODUCT_ID,
            EntityKind::Fact => FactColumn::TRANSACTION_ID,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Rows in random order.
    Unsorted,
    /// Rows in ascending join key order across all partitions in file order.
    Sorted,
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Unsorted => write!(f, "unsorted"),
            Layout::Sorted => write!(f, "sorted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetId {
    pub entity: EntityKind,
    pub layout: Layout,
    pub name: String,
}

impl DatasetId {
    pub fn new(entity: EntityKind, layout: Layout, name: impl Into<String>) -> Self {
        Self {
            entity,
            layout,
            name: name.into(),
        }
    }

    /// The directory name of the dataset under the output root.
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.layout, self.name)
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// Returns the four datasets of a run in the order they are reported.
pub fn dataset_ids(output: &OutputConfig) -> Vec<DatasetId> {
    [Layout::Unsorted, Layout::Sorted]
        .into_iter()
        .flat_map(|layout| {
            [
                DatasetId::new(EntityKind::Dimension, layout, &output.dimension_name),
                DatasetId::new(EntityKind::Fact, layout, &output.fact_name),
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_dataset_dir_names() {
        let output = OutputConfig {
            root: PathBuf::from("data"),
            dimension_name: "products".to_string(),
            fact_name: "transactions".to_string(),
        };
        let names = dataset_ids(&output)
            .iter()
            .map(|x| x.dir_name())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "unsorted_products",
                "unsorted_transactions",
                "sorted_products",
                "sorted_transactions",
            ]
        );
    }

    #[test]
    fn test_join_key_is_shared() {
        assert_eq!(
            EntityKind::Dimension.join_key(),
            EntityKind::Fact.join_key()
        );
        for entity in [EntityKind::Dimension, EntityKind::Fact] {
            let schema = entity.schema();
            assert!(schema.field_with_name(entity.join_key()).is_ok());
            assert!(schema.field_with_name(entity.row_id()).is_ok());
        }
    }
}
