use clap::Parser;
use switchboard::Settings;
use switchboard::cli::commands::{init, run};
use switchboard::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let loaded = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let mut settings = loaded.unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        eprintln!("Using default configuration for now.");
        Settings::default()
    });

    switchboard::logging::init_with_config(&settings.logging, cli.verbose);

    match &cli.command {
        Commands::Init { force } => init::run_init(*force),
        Commands::Config => init::run_config(&settings),
        Commands::Run(args) => {
            args.apply(&mut settings);
            run::run_switchboard(&settings).await?;
        }
    }

    Ok(())
}
