//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use mixhound_core::download::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY};

/// Turn a mood into music.
///
/// Mixhound asks a language model for songs matching a mood or genre,
/// finds each one online and optionally downloads the audio.
#[derive(Parser, Debug)]
#[command(name = "mixhound")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory downloads are written to
    #[arg(long, value_name = "DIR", global = true)]
    pub music_dir: Option<PathBuf>,

    /// Maximum concurrent downloads (1-8)
    #[arg(
        short = 'c',
        long,
        global = true,
        default_value_t = DEFAULT_CONCURRENCY as u8,
        value_parser = clap::value_parser!(u8).range(1..=MAX_CONCURRENCY as i64)
    )]
    pub concurrency: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Recommend songs for a mood or genre
    Recommend(RecommendArgs),

    /// Search for tracks directly
    Search(SearchArgs),

    /// List recommendation providers and how to enable them
    Providers,

    /// Manage the response cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },

    /// Show configuration file location
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct RecommendArgs {
    /// Mood, genre or activity, e.g. "rainy sunday folk"
    #[arg(required = true, value_name = "MOOD")]
    pub mood: Vec<String>,

    /// Maximum number of recommendations to resolve (1-20)
    #[arg(short = 'n', long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..=20))]
    pub limit: u8,

    /// Download the resolved tracks
    #[arg(short, long)]
    pub download: bool,

    /// Use only this provider (e.g. openai, ollama)
    #[arg(short, long, value_name = "NAME")]
    pub provider: Option<String>,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search text
    #[arg(required = true, value_name = "QUERY")]
    pub query: Vec<String>,

    /// Maximum number of results (1-50)
    #[arg(short, long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..=50))]
    pub max: u8,

    /// Send the query as typed, without the "music audio" suffix
    #[arg(long)]
    pub unfiltered: bool,

    /// Download the results
    #[arg(short, long)]
    pub download: bool,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Drop expired entries and shrink the cache below a size bound
    Clean {
        /// Size bound in MiB (defaults to the configured bound)
        #[arg(long, value_name = "MB", value_parser = clap::value_parser!(u64).range(1..))]
        max_mb: Option<u64>,
    },

    /// Delete every cache entry
    Clear,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Print an example config file instead of the path
    #[arg(long)]
    pub example: bool,
}

impl RecommendArgs {
    /// Returns the request text sent to providers.
    pub fn request(&self) -> String {
        self.mood.join(" ")
    }
}

impl SearchArgs {
    /// Returns the query text.
    pub fn query_text(&self) -> String {
        self.query.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_recommend_parses_mood_words() {
        let cli = Cli::try_parse_from(["mixhound", "recommend", "rainy", "sunday", "folk"]).unwrap();
        let Command::Recommend(args) = cli.command else {
            panic!("expected recommend");
        };
        assert_eq!(args.request(), "rainy sunday folk");
        assert_eq!(args.limit, 5);
        assert!(!args.download);
        assert!(args.provider.is_none());
    }

    #[test]
    fn test_cli_recommend_requires_mood() {
        let err = Cli::try_parse_from(["mixhound", "recommend"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_recommend_flags() {
        let cli = Cli::try_parse_from([
            "mixhound", "recommend", "jazz", "-n", "10", "--download", "--provider", "ollama",
        ])
        .unwrap();
        let Command::Recommend(args) = cli.command else {
            panic!("expected recommend");
        };
        assert_eq!(args.limit, 10);
        assert!(args.download);
        assert_eq!(args.provider.as_deref(), Some("ollama"));
    }

    #[test]
    fn test_cli_search_flags() {
        let cli = Cli::try_parse_from(["mixhound", "search", "nick", "drake", "--max", "3", "--unfiltered"])
            .unwrap();
        let Command::Search(args) = cli.command else {
            panic!("expected search");
        };
        assert_eq!(args.query_text(), "nick drake");
        assert_eq!(args.max, 3);
        assert!(args.unfiltered);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["mixhound", "providers", "-vv", "-c", "8", "--music-dir", "/tmp/m"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.concurrency, 8);
        assert_eq!(cli.music_dir, Some(PathBuf::from("/tmp/m")));
        assert!(matches!(cli.command, Command::Providers));
    }

    #[test]
    fn test_cli_concurrency_default_and_bounds() {
        let cli = Cli::try_parse_from(["mixhound", "providers"]).unwrap();
        assert_eq!(usize::from(cli.concurrency), DEFAULT_CONCURRENCY);

        let err = Cli::try_parse_from(["mixhound", "providers", "-c", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        let err = Cli::try_parse_from(["mixhound", "providers", "-c", "9"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_cache_subcommands() {
        let cli = Cli::try_parse_from(["mixhound", "cache", "clean", "--max-mb", "50"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Cache {
                action: CacheCommand::Clean { max_mb: Some(50) }
            }
        ));
        let cli = Cli::try_parse_from(["mixhound", "cache", "clear"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Cache {
                action: CacheCommand::Clear
            }
        ));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Cli::try_parse_from(["mixhound", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Cli::try_parse_from(["mixhound", "providers", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }
}
