use clap::Parser;

mod cli;
mod commands;
mod exit_codes;
mod output;
mod settings;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let exit_code = match cli.command {
        cli::Command::Build(args) => commands::build::execute(args),
        cli::Command::Batch(args) => commands::batch::execute(args),
        cli::Command::Graph(args) => commands::graph::execute(args),
        cli::Command::Animals(args) => commands::animals::execute(args),
        cli::Command::Config(args) => commands::config::execute(args),
        cli::Command::Validate(args) => commands::validate::execute(args),
    };

    std::process::exit(exit_code);
}
