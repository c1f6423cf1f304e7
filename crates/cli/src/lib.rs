pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "fabmarket",
    about = "Fabmarket operator CLI",
    long_about = "Apply migrations, load demo data, inspect configuration and run the pricing engine against stored records.",
    after_help = "Examples:\n  fabmarket migrate\n  fabmarket seed\n  fabmarket price --design design-demo-001 --manufacturer mfr-demo-001"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo marketplace (idempotent)")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Price a stored design for a stored manufacturer profile")]
    Price {
        #[arg(long, help = "Design id")]
        design: String,
        #[arg(long, help = "Manufacturer actor id")]
        manufacturer: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => commands::config::run(),
        Command::Price { design, manufacturer } => commands::price::run(&design, &manufacturer),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
