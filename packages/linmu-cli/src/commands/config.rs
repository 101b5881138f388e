use crate::cli::ConfigArgs;
use crate::exit_codes;
use crate::settings;
use linmu_rs::PipelineConfig;

pub fn execute(args: ConfigArgs) -> i32 {
    let config = if args.defaults {
        PipelineConfig::default()
    } else {
        match settings::load_config(&args.source) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::CONFIG_ERROR;
            }
        }
    };

    let json = match config.to_json_pretty() {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };
    match crate::output::write_output(&json, args.output.as_deref()) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    }
}
