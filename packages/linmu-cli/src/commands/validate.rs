use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::output;
use linmu_rs::PipelineConfig;
use serde::Serialize;

#[derive(Serialize)]
struct ValidateOutput {
    file: String,
    exists: bool,
    valid: bool,
    animals: Option<usize>,
    track_nodes: Option<usize>,
    track_edges: Option<usize>,
    error: Option<String>,
}

pub fn execute(args: ValidateArgs) -> i32 {
    let exists = args.file.is_file();

    let checked = if exists {
        PipelineConfig::from_json_file(&args.file).and_then(|config| {
            config.validate()?;
            Ok(config)
        })
    } else {
        Err(linmu_rs::LinmuError::Config(format!(
            "File not found: {}",
            args.file.display()
        )))
    };

    let result = ValidateOutput {
        file: args.file.display().to_string(),
        exists,
        valid: checked.is_ok(),
        animals: checked.as_ref().ok().map(|c| c.animals.len()),
        track_nodes: checked.as_ref().ok().map(|c| c.track.node_positions.len()),
        track_edges: checked.as_ref().ok().map(|c| c.track.edges.len()),
        error: checked.as_ref().err().map(|e| e.to_string()),
    };

    if args.json {
        if !output::emit(&result, false, None) {
            return exit_codes::EXECUTION_ERROR;
        }
    } else if let Some(ref err) = result.error {
        eprintln!("Error: {}", err);
    } else {
        println!(
            "Configuration '{}' is valid ({} animals, {} nodes, {} edges)",
            result.file,
            result.animals.unwrap_or(0),
            result.track_nodes.unwrap_or(0),
            result.track_edges.unwrap_or(0)
        );
    }

    match checked {
        Ok(_) => exit_codes::SUCCESS,
        Err(_) if !exists => exit_codes::INPUT_ERROR,
        Err(_) => exit_codes::CONFIG_ERROR,
    }
}
