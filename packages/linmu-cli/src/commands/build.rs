use crate::cli::BuildArgs;
use crate::exit_codes;
use crate::output;
use crate::settings;
use chrono::{DateTime, Utc};
use linmu_rs::{
    load_data_with_report, DataSources, Dataset, DatasetSummary, EpochKey, LinmuError,
    PipelineConfig, TextStore,
};
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

/// One finished build, as reported on the command line
#[derive(Debug, Serialize)]
pub struct BuildRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub elapsed_ms: f64,
    #[serde(flatten)]
    pub summary: DatasetSummary,
}

/// Build one epoch from the configured animal directories
pub fn build_epoch(
    epoch_key: &EpochKey,
    config: &PipelineConfig,
) -> Result<(Dataset, BuildRecord), LinmuError> {
    let start = Instant::now();
    let store = TextStore::new().with_bin_width(config.position_step);
    let (dataset, report) =
        load_data_with_report(epoch_key, config, &DataSources::from_store(&store))?;
    let record = BuildRecord {
        id: Uuid::new_v4().to_string(),
        created_at: Utc::now(),
        elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        summary: DatasetSummary::new(&dataset, &report),
    };
    Ok((dataset, record))
}

pub fn execute(args: BuildArgs) -> i32 {
    let mut config = match settings::load_config(&args.source) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::CONFIG_ERROR;
        }
    };
    settings::apply_decoder(&mut config, args.decoder);

    if !args.quiet {
        eprintln!(
            "Building {} ({:?})...",
            args.epoch, config.linearization.decoder
        );
    }

    let (dataset, record) = match build_epoch(&args.epoch, &config) {
        Ok(built) => built,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };

    if !args.quiet {
        eprintln!(
            "Built {}: {} samples ({} dropped), {} multiunit groups, {:.1}ms",
            args.epoch,
            record.summary.samples,
            record.summary.dropped_samples,
            record.summary.multiunit_groups,
            record.elapsed_ms
        );
    }

    let written = if args.summary {
        output::emit(&record, args.compact, args.output.as_deref())
    } else {
        output::emit(&dataset, args.compact, args.output.as_deref())
    };
    if written {
        exit_codes::SUCCESS
    } else {
        exit_codes::EXECUTION_ERROR
    }
}
