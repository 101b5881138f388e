use crate::cli::BatchArgs;
use crate::commands::build::{build_epoch, BuildRecord};
use crate::exit_codes;
use crate::output;
use crate::settings;
use linmu_rs::{EpochKey, PipelineConfig, TextStore};
use rayon::prelude::*;
use std::path::Path;
use std::time::Instant;

pub fn execute(args: BatchArgs) -> i32 {
    let mut config = match settings::load_config(&args.source) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::CONFIG_ERROR;
        }
    };
    settings::apply_decoder(&mut config, args.decoder);

    let epochs = match resolve_epochs(&args, &config) {
        Ok(e) => e,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if epochs.is_empty() {
        eprintln!("Error: No epochs found");
        return exit_codes::INPUT_ERROR;
    }

    // Dry-run mode: print epoch list and exit
    if args.dry_run {
        for key in &epochs {
            println!("{}", key);
        }
        if !args.quiet {
            eprintln!("Found {} epoch(s)", epochs.len());
        }
        return exit_codes::SUCCESS;
    }

    if let Some(ref dir) = args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "Error: Failed to create output directory '{}': {}",
                dir.display(),
                e
            );
            return exit_codes::EXECUTION_ERROR;
        }
    }

    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs.unwrap_or(0))
        .build()
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: Failed to start worker threads: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    let total = epochs.len();
    let start_time = Instant::now();
    if !args.quiet {
        eprintln!(
            "Building {} epoch(s) on {} thread(s)...",
            total,
            pool.current_num_threads()
        );
    }

    let output_dir = args.output_dir.as_deref();
    let results: Vec<(EpochKey, Result<BuildRecord, String>)> = if args.continue_on_error {
        pool.install(|| {
            epochs
                .par_iter()
                .map(|key| (key.clone(), run_one(key, &config, output_dir)))
                .collect()
        })
    } else {
        // stop scheduling new epochs after the first failure
        pool.install(|| {
            let mut results = Vec::with_capacity(total);
            let outcome: Result<Vec<(EpochKey, BuildRecord)>, (EpochKey, String)> = epochs
                .par_iter()
                .map(|key| {
                    run_one(key, &config, output_dir)
                        .map(|record| (key.clone(), record))
                        .map_err(|e| (key.clone(), e))
                })
                .collect();
            match outcome {
                Ok(records) => results.extend(records.into_iter().map(|(k, r)| (k, Ok(r)))),
                Err((key, e)) => results.push((key, Err(e))),
            }
            results
        })
    };

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    for (key, result) in &results {
        match result {
            Ok(record) => {
                succeeded += 1;
                if output_dir.is_none() && !output::emit(record, true, None) {
                    failed += 1;
                    succeeded -= 1;
                }
            }
            Err(e) => {
                eprintln!("  {}: {}", key, e);
                failed += 1;
            }
        }
    }

    let elapsed = start_time.elapsed();

    if !args.quiet {
        eprintln!(
            "Batch complete: {}/{} succeeded, {}/{} failed, {:.1}s",
            succeeded,
            total,
            failed,
            total,
            elapsed.as_secs_f64()
        );
    }

    if failed == 0 && succeeded == total {
        exit_codes::SUCCESS
    } else if succeeded > 0 {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::EXECUTION_ERROR
    }
}

fn run_one(
    key: &EpochKey,
    config: &PipelineConfig,
    output_dir: Option<&Path>,
) -> Result<BuildRecord, String> {
    let (dataset, record) = build_epoch(key, config).map_err(|e| e.to_string())?;
    if let Some(dir) = output_dir {
        let path = dir.join(dataset_file_name(key));
        let json = output::to_json(&dataset, true)?;
        output::write_output(&json, Some(path.as_path()))?;
        log::info!("Wrote {}", path.display());
    }
    Ok(record)
}

fn dataset_file_name(key: &EpochKey) -> String {
    format!("{}_{:02}_{:02}.json", key.animal, key.day, key.epoch)
}

fn resolve_epochs(args: &BatchArgs, config: &PipelineConfig) -> Result<Vec<EpochKey>, String> {
    if let Some(ref epochs) = args.epochs {
        return Ok(epochs.clone());
    }

    let names: Vec<String> = match args.animals {
        Some(ref names) => names.clone(),
        None => config.animals.iter().map(|(name, _)| name.clone()).collect(),
    };

    let store = TextStore::new();
    let mut epochs = Vec::new();
    for name in names {
        let animal = config.animals.get(&name).map_err(|e| e.to_string())?;
        let found = store.epochs(animal).map_err(|e| e.to_string())?;
        if found.is_empty() {
            log::warn!("No epochs found for {} in {}", name, animal.directory.display());
        }
        epochs.extend(
            found
                .into_iter()
                .map(|(day, epoch)| EpochKey::new(name.clone(), day, epoch)),
        );
    }
    Ok(epochs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ConfigSource;
    use linmu_rs::{Animal, AnimalRegistry};
    use std::fs;

    fn make_batch_args() -> BatchArgs {
        BatchArgs {
            epochs: None,
            animals: None,
            source: ConfigSource::default(),
            decoder: None,
            output_dir: None,
            jobs: None,
            continue_on_error: false,
            dry_run: false,
            quiet: false,
        }
    }

    fn config_with(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            animals: AnimalRegistry::new()
                .with("a", Animal::new(dir.join("a"), "a"))
                .with("b", Animal::new(dir.join("b"), "b")),
            ..Default::default()
        }
    }

    #[test]
    fn test_explicit_epochs_are_kept() {
        let mut args = make_batch_args();
        args.epochs = Some(vec![EpochKey::new("x", 1, 2)]);
        let epochs = resolve_epochs(&args, &PipelineConfig::default()).unwrap();
        assert_eq!(epochs, vec![EpochKey::new("x", 1, 2)]);
    }

    #[test]
    fn test_epochs_discovered_per_animal() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("a")).unwrap();
        fs::create_dir_all(tmp.path().join("b")).unwrap();
        fs::write(tmp.path().join("a/apos01-02.txt"), "").unwrap();
        fs::write(tmp.path().join("a/apos02-01.txt"), "").unwrap();
        fs::write(tmp.path().join("b/bpos03-04.txt"), "").unwrap();
        fs::write(tmp.path().join("b/bmarks03-04-01.txt"), "").unwrap();

        let config = config_with(tmp.path());
        let epochs = resolve_epochs(&make_batch_args(), &config).unwrap();
        assert_eq!(
            epochs,
            vec![
                EpochKey::new("a", 1, 2),
                EpochKey::new("a", 2, 1),
                EpochKey::new("b", 3, 4)
            ]
        );

        let mut args = make_batch_args();
        args.animals = Some(vec!["b".to_string()]);
        assert_eq!(resolve_epochs(&args, &config).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_animal_is_rejected() {
        let mut args = make_batch_args();
        args.animals = Some(vec!["nobody".to_string()]);
        let result = resolve_epochs(&args, &PipelineConfig::default());
        assert!(result.unwrap_err().contains("nobody"));
    }

    #[test]
    fn test_dataset_file_name() {
        assert_eq!(dataset_file_name(&EpochKey::new("CH6", 3, 1)), "CH6_03_01.json");
    }
}
