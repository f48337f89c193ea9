//! Generation of skewed relational datasets for join strategy benchmarks.
//!
//! A run produces a bounded dimension dataset and a much larger fact dataset
//! referencing it with a popularity skew. Each dataset is materialized twice:
//! shuffled across many partitions, and globally sorted by the join key across
//! fewer partitions. A verification pass reads the outputs back.

pub mod context;
pub mod error;
pub mod generation;
pub mod layout;
pub mod pipeline;
pub mod schema;
pub mod verify;
