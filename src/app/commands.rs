//! Subcommand handlers.

use anyhow::{Result, bail};
use mixhound_core::config::{EXAMPLE_CONFIG, LoadedConfig};
use mixhound_core::provider::build_default_orchestrator;
use mixhound_core::search::{TierState, build_default_resolver};
use mixhound_core::{Cache, Configuration, DiscoveryPipeline, ResolvedTrack};
use tracing::info;

use super::{exit_handler, output, progress, terminal};
use crate::ProcessExit;
use crate::cli::{CacheCommand, ConfigArgs, RecommendArgs, SearchArgs};

const BYTES_PER_MIB: u64 = 1024 * 1024;

pub(crate) async fn recommend(
    config: &Configuration,
    args: &RecommendArgs,
    quiet: bool,
) -> Result<ProcessExit> {
    let mut pipeline = DiscoveryPipeline::from_config(config, args.download)?;
    if let Some(name) = &args.provider
        && !pipeline.orchestrator_mut().retain_only(name)
    {
        let known: Vec<&str> = pipeline.orchestrator().provider_names().collect();
        bail!(
            "Unknown provider '{name}'\n  Suggestion: Use one of: {}",
            known.join(", ")
        );
    }

    let discovery = pipeline
        .discover(&args.request(), Some(usize::from(args.limit)))
        .await?;
    output::print_tracks(&discovery.tracks);
    output::print_unresolved(&discovery.unresolved);

    if discovery.tracks.is_empty() {
        println!("No playable tracks found for \"{}\".", args.request());
        return Ok(ProcessExit::Failure);
    }
    if args.download {
        return download(&pipeline, discovery.tracks, quiet).await;
    }
    Ok(ProcessExit::Success)
}

pub(crate) async fn search(
    config: &Configuration,
    args: &SearchArgs,
    quiet: bool,
) -> Result<ProcessExit> {
    let pipeline = DiscoveryPipeline::from_config(config, args.download)?;
    let tracks = pipeline
        .search(&args.query_text(), usize::from(args.max), args.unfiltered)
        .await?;
    if tracks.is_empty() {
        println!("No results for \"{}\".", args.query_text());
        return Ok(ProcessExit::Success);
    }
    output::print_tracks(&tracks);
    if args.download {
        return download(&pipeline, tracks, quiet).await;
    }
    Ok(ProcessExit::Success)
}

async fn download(
    pipeline: &DiscoveryPipeline,
    tracks: Vec<ResolvedTrack>,
    quiet: bool,
) -> Result<ProcessExit> {
    let already = tracks.len() - pipeline.new_tracks(&tracks).len();
    if already > 0 {
        info!(already, "Some tracks are already in the music folder");
    }
    println!();

    let bar = progress::download_bar(tracks.len(), terminal::progress_bar_enabled(quiet));
    let reports = pipeline
        .acquire(tracks, |report| progress::record(&bar, report))
        .await?;
    bar.finish_and_clear();

    let tally = output::print_download_summary(&reports);
    Ok(exit_handler::determine_exit_outcome(
        tally.downloaded + tally.already_present,
        tally.failed,
    ))
}

pub(crate) async fn providers(config: &Configuration) -> Result<ProcessExit> {
    let orchestrator = build_default_orchestrator(config, None);
    let descriptors = orchestrator.descriptors().await;

    println!("Recommendation providers (in fallback order):");
    for descriptor in &descriptors {
        println!("  {}", output::format_provider(descriptor));
    }

    let search_tier = match build_default_resolver(config, None).tier_state() {
        TierState::Available => "YouTube Data API, then yt-dlp",
        TierState::NotConfigured | TierState::DisabledForProcess => {
            "yt-dlp only (set YOUTUBE_API_KEY to enable the YouTube Data API)"
        }
    };
    println!("\nSearch: {search_tier}");

    if descriptors.iter().any(|descriptor| descriptor.available) {
        Ok(ProcessExit::Success)
    } else {
        println!("\nNo provider is usable. Configure at least one of the above.");
        Ok(ProcessExit::Failure)
    }
}

pub(crate) fn cache(config: &Configuration, action: &CacheCommand) -> Result<ProcessExit> {
    let cache = Cache::open(&config.cache_dir, config.cache_max_age);
    match action {
        CacheCommand::Clean { max_mb } => {
            let max_bytes = max_mb.map_or(config.cache_max_bytes, |mb| mb.saturating_mul(BYTES_PER_MIB));
            let expired = cache.purge_expired();
            let evicted = cache.cleanup(max_bytes);
            println!(
                "Removed {expired} expired and {evicted} oversize entries; {} entries ({}) remain in {}",
                cache.len(),
                output::format_bytes(cache.total_bytes()),
                cache.dir().display()
            );
        }
        CacheCommand::Clear => {
            let removed = cache.len();
            cache.clear();
            println!("Removed {removed} entries from {}", cache.dir().display());
        }
    }
    Ok(ProcessExit::Success)
}

pub(crate) fn config(loaded: &LoadedConfig, args: &ConfigArgs) -> Result<ProcessExit> {
    if args.example {
        print!("{EXAMPLE_CONFIG}");
        return Ok(ProcessExit::Success);
    }
    match &loaded.path {
        Some(path) if loaded.loaded_from_file => println!("{} (loaded)", path.display()),
        Some(path) => println!("{} (not found; using defaults)", path.display()),
        None => println!("No config location: set HOME or XDG_CONFIG_HOME"),
    }
    println!("music_dir = {}", loaded.config.music_dir.display());
    println!("cache_dir = {}", loaded.config.cache_dir.display());
    Ok(ProcessExit::Success)
}
