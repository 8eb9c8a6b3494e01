//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::config::Settings;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Reference-counted log producers for watched unit files
#[derive(Parser, Debug)]
#[command(
    name = "switchboard",
    version = env!("CARGO_PKG_VERSION"),
    about = "Pump logs into unit files while someone is reading them",
    long_about = "Keeps one file per unit, watches open/close activity on those files \
                  and runs a log producer for each file while it has readers.",
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Raise the default log level to debug
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Set up .switchboard directory with default configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// Run the switchboard until interrupted
    #[command(
        after_help = "Examples:\n  switchboard run\n  switchboard run --units 3 --tick-ms 250\n  switchboard run --base-dir /tmp/units --no-reader"
    )]
    Run(RunArgs),
}

/// Overrides for the `run` command.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Directory holding one file per unit (overrides config)
    #[arg(long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Number of units to register at startup (overrides config)
    #[arg(long, value_name = "N")]
    pub units: Option<usize>,

    /// Producer record interval in milliseconds (overrides config)
    #[arg(long, value_name = "MS")]
    pub tick_ms: Option<u64>,

    /// Do not start the simulated reader
    #[arg(long)]
    pub no_reader: bool,

    /// Make the simulated reader always tail this unit
    #[arg(long, value_name = "UNIT")]
    pub reader_unit: Option<String>,
}

impl RunArgs {
    /// Apply CLI overrides on top of loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(dir) = &self.base_dir {
            settings.base_dir = dir.clone();
        }
        if let Some(units) = self.units {
            settings.unit_count = units;
        }
        if let Some(tick_ms) = self.tick_ms {
            settings.producer.tick_ms = tick_ms;
        }
        if self.no_reader {
            settings.reader.enabled = false;
        }
        if let Some(unit) = &self.reader_unit {
            settings.reader.unit = Some(unit.clone());
        }
    }
}
