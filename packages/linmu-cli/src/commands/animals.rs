use crate::cli::AnimalsArgs;
use crate::exit_codes;
use crate::output;
use crate::settings;
use serde::Serialize;

#[derive(Serialize)]
struct AnimalInfo {
    name: String,
    short_name: String,
    directory: String,
    available: bool,
}

pub fn execute(args: AnimalsArgs) -> i32 {
    let config = match settings::load_config(&args.source) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::CONFIG_ERROR;
        }
    };

    let animals: Vec<AnimalInfo> = config
        .animals
        .iter()
        .map(|(name, animal)| AnimalInfo {
            name: name.clone(),
            short_name: animal.short_name.clone(),
            directory: animal.directory.display().to_string(),
            available: animal.directory.is_dir(),
        })
        .collect();

    if args.json {
        if !output::emit(&animals, false, None) {
            return exit_codes::EXECUTION_ERROR;
        }
    } else {
        println!("Configured animals:\n");
        println!("  {:<12} {:<12} {:<10} {}", "Name", "Short name", "Available", "Directory");
        println!("  {}", "-".repeat(72));
        for a in &animals {
            println!(
                "  {:<12} {:<12} {:<10} {}",
                a.name,
                a.short_name,
                if a.available { "yes" } else { "no" },
                a.directory
            );
        }
    }

    exit_codes::SUCCESS
}
