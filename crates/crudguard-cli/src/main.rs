//! crudguard CLI
//!
//! Offline checks for entity configurations and query descriptors

use clap::{Parser, Subcommand};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "crudguard")]
#[command(about = "crudguard - policy-constrained CRUD query planning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate an entity configuration file
    CheckConfig(commands::check_config::CheckConfigArgs),
    /// Show how a query descriptor would be executed
    Plan(commands::plan::PlanArgs),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::CheckConfig(args) => commands::check_config::execute(args),
        Commands::Plan(args) => commands::plan::execute(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
