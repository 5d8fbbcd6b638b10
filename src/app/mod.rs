//! Command dispatch and runtime wiring for the binary.

mod commands;
mod exit_handler;
mod output;
mod progress;
mod terminal;

use anyhow::Result;
use clap::{ArgMatches, CommandFactory, FromArgMatches, parser::ValueSource};
use mixhound_core::Configuration;
use tracing::{debug, info};

use crate::ProcessExit;
use crate::cli::{Cli, Command};

/// Which global flags were typed on the command line rather than defaulted.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) concurrency: bool,
    pub(crate) verbose: bool,
    pub(crate) quiet: bool,
}

pub(crate) async fn run_mixhound() -> Result<ProcessExit> {
    let (cli, sources) = parse_cli_with_sources();

    let default_level = resolve_default_log_level(&cli);
    terminal::init_tracing(default_level, sources.verbose || sources.quiet);
    debug!(?cli, "CLI arguments parsed");

    let loaded = Configuration::load()?;
    if loaded.loaded_from_file
        && let Some(path) = &loaded.path
    {
        info!(path = %path.display(), "Loaded config file");
    }
    let config = apply_cli_overrides(loaded.config.clone(), &cli, sources);

    match &cli.command {
        Command::Recommend(args) => commands::recommend(&config, args, cli.quiet).await,
        Command::Search(args) => commands::search(&config, args, cli.quiet).await,
        Command::Providers => commands::providers(&config).await,
        Command::Cache { action } => commands::cache(&config, action),
        Command::Config(args) => commands::config(&loaded, args),
    }
}

fn parse_cli_with_sources() -> (Cli, CliValueSources) {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    let sources = CliValueSources {
        concurrency: is_commandline_value(&matches, "concurrency"),
        verbose: is_commandline_value(&matches, "verbose"),
        quiet: is_commandline_value(&matches, "quiet"),
    };
    (cli, sources)
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Priority: `RUST_LOG` > `--quiet` > `-v`/`-vv` > info.
fn resolve_default_log_level(cli: &Cli) -> &'static str {
    if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Applies flags typed on the command line over file and default values.
fn apply_cli_overrides(
    mut config: Configuration,
    cli: &Cli,
    sources: CliValueSources,
) -> Configuration {
    if let Some(dir) = &cli.music_dir {
        config.music_dir.clone_from(dir);
    }
    if sources.concurrency {
        config.concurrency = usize::from(cli.concurrency);
    }
    config
}
