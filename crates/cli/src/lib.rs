pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "dentalfly",
    about = "DentalFly quote engine operator CLI",
    long_about = "Inspect configuration, prepare the quote database, load the demo catalog and price quotes from the command line.",
    after_help = "Examples:\n  dentalfly doctor --json\n  dentalfly seed\n  dentalfly quote --package pkg-001 --promo SUMMER15\n  dentalfly quote -t implant:2 -t crown --offer offer-spring-smile --save"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo clinic catalog (treatments, packages, offers, promo codes)")]
    Seed {
        #[arg(long, help = "Remove the demo rows instead of loading them")]
        clean: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database schema, catalog presence and API reachability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Build and price a quote from catalog items and discounts")]
    Quote(QuoteArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct QuoteArgs {
    #[arg(
        short = 't',
        long = "treatment",
        value_name = "ID[:QTY]",
        help = "Treatment to add; repeat for several"
    )]
    pub treatments: Vec<String>,
    #[arg(long, value_name = "PACKAGE_ID", help = "Package to select before adding treatments")]
    pub package: Option<String>,
    #[arg(long, value_name = "OFFER_ID", help = "Special offer to apply")]
    pub offer: Option<String>,
    #[arg(long, value_name = "CODE", help = "Promo code to validate and apply")]
    pub promo: Option<String>,
    #[arg(long, help = "Persist the quote as saved")]
    pub save: bool,
    #[arg(long, conflicts_with = "save", help = "Persist the quote as submitted")]
    pub submit: bool,
    #[arg(long, help = "Use the configured quote API instead of the local database")]
    pub remote: bool,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { clean } => commands::seed::run(clean),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Quote(args) => commands::quote::run(&args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
