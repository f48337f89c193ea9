use chrono::{DateTime, Local};
use datafusion::arrow::array::{AsArray, RecordBatch};
use datafusion::arrow::compute::concat_batches;
use datafusion::arrow::datatypes::Int64Type;
use datagen_common::config::AppConfig;
use log::info;

use crate::context::{RunContext, RunStage};
use crate::error::{DatagenError, DatagenResult};
use crate::generation::{
    DimensionGenerator, FactGenerator, HotSet, RecordGenerator, SkewedReferenceSampler,
};
use crate::layout::files::write_confirmation;
use crate::layout::{DatasetSummary, LayoutWriter, LayoutWriterOptions};
use crate::schema::{dataset_ids, EntityKind};
use crate::verify::{DatasetReport, DatasetVerifier, Verdict, VerifyTarget};

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub dimension_rows: u64,
    pub fact_rows: u64,
    pub datasets: Vec<DatasetSummary>,
    pub reports: Vec<DatasetReport>,
}

impl RunSummary {
    pub fn all_passed(&self) -> bool {
        self.reports.iter().all(|x| x.verdict() == Verdict::Pass)
    }
}

/// Runs generation, materialization, and verification end to end.
///
/// The reference time determines the transaction date window. The confirmation
/// marker records the wall-clock time at which the sorted datasets were written.
pub fn run(config: AppConfig, reference_time: DateTime<Local>) -> DatagenResult<RunSummary> {
    let mut ctx = RunContext::create(config, reference_time)?;
    let result = run_stages(&mut ctx);
    let released = ctx.release();
    let summary = result?;
    released?;
    Ok(summary)
}

fn run_stages(ctx: &mut RunContext) -> DatagenResult<RunSummary> {
    info!("Generating product data...");
    let dimension =
        generate_dimension(ctx).map_err(|e| e.in_stage(RunStage::DimensionGenerated))?;
    ctx.advance(RunStage::DimensionGenerated)?;

    info!("Generating transaction data...");
    let fact = generate_fact(ctx, &dimension).map_err(|e| e.in_stage(RunStage::FactGenerated))?;
    ctx.advance(RunStage::FactGenerated)?;
    let dimension_rows = dimension.num_rows() as u64;
    let fact_rows = fact.num_rows() as u64;
    info!("Generated {dimension_rows} products");
    info!("Generated {fact_rows} transactions");

    info!("Saving unsorted datasets...");
    let mut datasets = write_unsorted(ctx, &dimension, &fact)
        .map_err(|e| e.in_stage(RunStage::UnsortedWritten))?;
    ctx.advance(RunStage::UnsortedWritten)?;

    info!("Saving sorted datasets with guaranteed global sorting...");
    datasets.extend(
        write_sorted(ctx, &dimension, &fact).map_err(|e| e.in_stage(RunStage::SortedWritten))?,
    );
    ctx.advance(RunStage::SortedWritten)?;

    let reports =
        verify(ctx, dimension_rows, fact_rows).map_err(|e| e.in_stage(RunStage::Verified))?;
    ctx.advance(RunStage::Verified)?;

    info!("Data generation complete. Data saved to {}", ctx.root().display());
    Ok(RunSummary {
        dimension_rows,
        fact_rows,
        datasets,
        reports,
    })
}

fn generate_dimension(ctx: &mut RunContext) -> DatagenResult<RecordBatch> {
    let generation = ctx.config().generation.clone();
    let generator = DimensionGenerator::try_new(generation.dimension_rows)?;
    let batches = generator
        .batches(generation.batch_size, ctx.rng())?
        .collect::<DatagenResult<Vec<_>>>()?;
    Ok(concat_batches(&generator.schema(), &batches)?)
}

fn generate_fact(ctx: &mut RunContext, dimension: &RecordBatch) -> DatagenResult<RecordBatch> {
    let generation = ctx.config().generation.clone();
    let reference_date = ctx.reference_date();
    let key = EntityKind::Dimension.join_key();
    let keys = dimension
        .column_by_name(key)
        .and_then(|x| x.as_primitive_opt::<Int64Type>())
        .ok_or_else(|| DatagenError::internal(format!("missing dimension key column: {key}")))?;
    let hot = HotSet::sample(
        keys.values().iter().copied(),
        generation.hot_sample_fraction,
        generation.hot_set_cap,
        ctx.rng(),
    )?;
    info!("Selected {} popular products", hot.len());
    let sampler =
        SkewedReferenceSampler::try_new(hot, keys.len() as u64, generation.hot_fraction)?;
    let generator = FactGenerator::try_new(
        generation.fact_rows,
        sampler,
        generation.owner_range,
        reference_date,
    )?;
    let batches = generator
        .batches(generation.batch_size, ctx.rng())?
        .collect::<DatagenResult<Vec<_>>>()?;
    Ok(concat_batches(&generator.schema(), &batches)?)
}

fn writers(ctx: &RunContext) -> DatagenResult<(LayoutWriter, LayoutWriter)> {
    let output = &ctx.config().output;
    let options = LayoutWriterOptions {
        max_row_group_size: ctx.config().layout.max_row_group_size,
    };
    Ok((
        LayoutWriter::try_new(
            ctx.root(),
            EntityKind::Dimension,
            &output.dimension_name,
            options.clone(),
        )?,
        LayoutWriter::try_new(ctx.root(), EntityKind::Fact, &output.fact_name, options)?,
    ))
}

fn write_unsorted(
    ctx: &mut RunContext,
    dimension: &RecordBatch,
    fact: &RecordBatch,
) -> DatagenResult<Vec<DatasetSummary>> {
    let (dimension_writer, fact_writer) = writers(ctx)?;
    let partitions = ctx.config().layout.unsorted_partitions;
    Ok(vec![
        dimension_writer.write_unsorted(dimension, partitions, ctx.rng())?,
        fact_writer.write_unsorted(fact, partitions, ctx.rng())?,
    ])
}

fn write_sorted(
    ctx: &mut RunContext,
    dimension: &RecordBatch,
    fact: &RecordBatch,
) -> DatagenResult<Vec<DatasetSummary>> {
    let (dimension_writer, fact_writer) = writers(ctx)?;
    let partitions = ctx.config().layout.sorted_partitions;
    info!("Sorting products dataset...");
    let dimension = dimension_writer.write_sorted(dimension, partitions)?;
    info!("Sorting transactions dataset...");
    let fact = fact_writer.write_sorted(fact, partitions)?;
    let marker = write_confirmation(ctx.root(), EntityKind::Fact.join_key(), &Local::now())?;
    info!("Wrote {}", marker.display());
    Ok(vec![dimension, fact])
}

fn verify(
    ctx: &RunContext,
    dimension_rows: u64,
    fact_rows: u64,
) -> DatagenResult<Vec<DatasetReport>> {
    let config = ctx.config();
    let targets = dataset_ids(&config.output)
        .into_iter()
        .map(|id| {
            let expected_rows = match id.entity {
                EntityKind::Dimension => dimension_rows,
                EntityKind::Fact => fact_rows,
            };
            VerifyTarget {
                id,
                expected_rows: Some(expected_rows),
            }
        })
        .collect::<Vec<_>>();
    DatasetVerifier::new(ctx.root(), config.verify.sample_rows)
        .with_full_scan(config.verify.full_scan)
        .verify(&targets)
}
