mod logging;

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use dialoguer::{Select, theme::ColorfulTheme};
use tokio_util::sync::CancellationToken;
use tunebridge_cache::{MemoryCacheStore, SnapshotCache};
use tunebridge_config::{
    DEFAULT_FAILURE_BACKOFF_SECS, DEFAULT_QUEUE_CAPACITY, DEFAULT_RETENTION_SECS,
    DEFAULT_SYNC_INTERVAL_SECS, DEFAULT_TRACK_TTL_SECS, TuneConfigData, get_config_value,
    load_config, open_in_editor, resolve_default_target, resolve_log_level, resolve_webhook_url,
    resolve_workers, set_config_value,
};
use tunebridge_core::{
    LinkInfo, PlaylistConversion, TARGET_ALL, TrackConversion, TuneError, TuneResult,
};
use tunebridge_follow::{
    DedupStrategy, FollowRequest, FollowService, MemoryFollowStore, MemoryNotificationStore,
    MemoryTaskQueue, SubscriberId, SyncScheduler, SyncSettings,
};
use tunebridge_music::events::EVENT_PLAYLIST_UPDATED;
use tunebridge_music::{
    BroadcastNotifier, Catalog, CatalogPlatform, Conversion, Converter, FanoutNotifier,
    LogNotifier, NotifierEvent, PlatformRegistry, PoolConfig, UrlLinkResolver, WebhookNotifier,
    canonical_platform, display_name,
};

use crate::logging::{LogFormat, init_logging};

const CLI_APP: &str = "tunebridge-cli";
const CLI_DEVELOPER: &str = "local";

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert track or playlist links to another platform
    Convert {
        #[arg(value_name = "URL")]
        urls: Vec<String>,
        /// Target platform key, or `all` for tracks
        #[arg(long)]
        to: Option<String>,
        /// Read additional URLs from a file, one per line
        #[arg(long)]
        input: Option<String>,
        /// JSON catalog standing in for the platform APIs
        #[arg(long)]
        catalog: PathBuf,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Follow playlists and run sync passes, printing subscriber notifications
    Watch {
        #[arg(value_name = "URL", required = true)]
        urls: Vec<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        catalog: PathBuf,
        /// Subscriber uuid; repeat for several
        #[arg(long = "subscriber", required = true)]
        subscribers: Vec<String>,
        /// Seconds between sync passes
        #[arg(long)]
        interval: Option<u64>,
        /// Stop after this many passes
        #[arg(long)]
        passes: Option<usize>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Open config file in editor
    Edit,
}

#[derive(Debug, Parser)]
#[command(name = "tunebridge")]
#[command(version, about = "Cross-platform track and playlist converter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Config { action } => {
            if let Err(err) = handle_config_command(action) {
                fail(err);
            }
            return;
        }
        command => command,
    };

    let config = load_config().unwrap_or_else(|err| fail(err));
    let format = config
        .log
        .format
        .as_deref()
        .map(str::parse::<LogFormat>)
        .transpose()
        .unwrap_or_else(|err| fail(err))
        .unwrap_or_default();
    if let Err(err) = init_logging(&resolve_log_level(&config), format) {
        eprintln!("{} {err}", style("Warning:").yellow());
    }

    let result = match command {
        Commands::Convert {
            urls,
            to,
            input,
            catalog,
            json,
        } => run_convert(&config, urls, to, input, &catalog, json).await,
        Commands::Watch {
            urls,
            to,
            catalog,
            subscribers,
            interval,
            passes,
        } => run_watch(&config, urls, to, &catalog, subscribers, interval, passes).await,
        Commands::Config { .. } => Ok(()),
    };

    if let Err(err) = result {
        fail(err);
    }
}

fn fail(err: TuneError) -> ! {
    eprintln!("{} {err}", style("Error:").red());
    std::process::exit(1);
}

struct Engine {
    converter: Converter,
    resolver: UrlLinkResolver,
    bus: BroadcastNotifier,
}

async fn build_engine(config: &TuneConfigData, catalog: &Path) -> TuneResult<Engine> {
    let keys = Catalog::load(catalog).await?.platform_keys();
    if keys.is_empty() {
        return Err(TuneError::Configuration(format!(
            "catalog {} defines no platforms",
            catalog.display()
        )));
    }
    let mut registry = PlatformRegistry::new();
    for key in keys {
        registry.register(Arc::new(CatalogPlatform::from_file(key, catalog)));
    }

    let bus = BroadcastNotifier::default();
    let mut notifier = FanoutNotifier::new()
        .with(Arc::new(LogNotifier))
        .with(Arc::new(bus.clone()));
    if let Some(url) = resolve_webhook_url(config) {
        let webhook = WebhookNotifier::new(url)
            .map_err(|err| TuneError::Configuration(format!("webhook notifier: {err}")))?;
        notifier = notifier.with(Arc::new(webhook));
    }

    let track_ttl = config.cache.track_ttl_secs.unwrap_or(DEFAULT_TRACK_TTL_SECS);
    let cache = SnapshotCache::new(Arc::new(MemoryCacheStore::new()))
        .with_track_ttl(Duration::from_secs(track_ttl));
    let pool = PoolConfig::default()
        .with_workers(resolve_workers(config))
        .with_queue_capacity(config.matching.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY));

    let converter = Converter::new(Arc::new(registry), cache, Arc::new(notifier))
        .with_pool_config(pool)
        .with_timeout(config.matching.timeout_secs.map(Duration::from_secs));

    Ok(Engine {
        converter,
        resolver: UrlLinkResolver,
        bus,
    })
}

fn gather_inputs(urls: Vec<String>, input: Option<&str>) -> TuneResult<Vec<String>> {
    let mut urls = urls;

    if let Some(path) = input {
        let content = fs::read_to_string(path)
            .map_err(|err| TuneError::InvalidInput(format!("failed to read input file: {err}")))?;
        urls.extend(parse_lines(&content));
    }

    if urls.is_empty() && !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|err| TuneError::InvalidInput(format!("failed to read stdin: {err}")))?;
        urls.extend(parse_lines(&buffer));
    }

    Ok(urls)
}

fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.to_string())
        .collect()
}

fn resolve_target(
    config: &TuneConfigData,
    explicit: Option<String>,
    registry: &PlatformRegistry,
    allow_all: bool,
) -> TuneResult<String> {
    if let Some(target) = explicit.or_else(|| resolve_default_target(config)) {
        let target = target.trim().to_lowercase();
        let target = canonical_platform(&target)
            .map(str::to_string)
            .unwrap_or(target);
        if target == TARGET_ALL {
            if !allow_all {
                return Err(TuneError::InvalidInput(
                    "playlists follow a single target platform".to_string(),
                ));
            }
            return Ok(target);
        }
        if !registry.contains(&target) {
            return Err(TuneError::UnsupportedPlatform(target));
        }
        return Ok(target);
    }

    if !io::stdin().is_terminal() {
        return Err(TuneError::Configuration(
            "no target platform: pass --to or set default.target".to_string(),
        ));
    }
    prompt_target(registry, allow_all)
}

fn prompt_target(registry: &PlatformRegistry, allow_all: bool) -> TuneResult<String> {
    let keys = registry.keys();
    let mut labels: Vec<String> = keys.iter().map(|key| display_name(key).to_string()).collect();
    if allow_all {
        labels.push("All platforms".to_string());
    }

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select target platform")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(|err| TuneError::InvalidInput(format!("selection failed: {err}")))?;

    Ok(keys
        .get(selection)
        .cloned()
        .unwrap_or_else(|| TARGET_ALL.to_string()))
}

async fn run_convert(
    config: &TuneConfigData,
    urls: Vec<String>,
    to: Option<String>,
    input: Option<String>,
    catalog: &Path,
    json: bool,
) -> TuneResult<()> {
    let urls = gather_inputs(urls, input.as_deref())?;
    if urls.is_empty() {
        return Err(TuneError::InvalidInput("no input URLs provided".to_string()));
    }

    let engine = build_engine(config, catalog).await?;
    let target = resolve_target(config, to, engine.converter.registry(), true)?;

    let mut success = 0usize;
    let mut failed = 0usize;
    for url in &urls {
        match convert_url(&engine, url, &target).await {
            Ok(conversion) => {
                success += 1;
                if json {
                    let rendered = serde_json::to_string_pretty(&conversion)?;
                    println!("{rendered}");
                } else {
                    print_conversion(&conversion);
                }
            }
            Err(err) => {
                failed += 1;
                eprintln!("{} {url}: {err}", style("Failed").red());
            }
        }
    }

    if !json {
        print_summary(success + failed, success, failed);
    }
    Ok(())
}

async fn convert_url(engine: &Engine, url: &str, target: &str) -> TuneResult<Conversion> {
    let info = engine
        .resolver
        .resolve_sync(url)?
        .with_target(target)
        .with_app(CLI_APP);
    engine.converter.convert(&info).await
}

fn print_conversion(conversion: &Conversion) {
    match conversion {
        Conversion::Track(track) => print_track(track),
        Conversion::Playlist(playlist) => print_playlist(playlist),
    }
    println!();
}

fn print_track(conversion: &TrackConversion) {
    let mut platforms: Vec<_> = conversion.platforms.iter().collect();
    platforms.sort_by(|a, b| a.0.cmp(b.0));
    for (platform, track) in platforms {
        println!(
            "{} {} / {}",
            style(format!("{}:", display_name(platform))).cyan(),
            track.title,
            track.artists.join(", ")
        );
        println!("  {} {}", style("URL:").dim(), track.url);
    }
}

fn print_playlist(conversion: &PlaylistConversion) {
    let meta = &conversion.meta;
    println!(
        "{} {} ({} tracks, {})",
        style("Playlist:").cyan(),
        meta.title,
        meta.nb_tracks,
        meta.length
    );

    let mut platforms: Vec<_> = conversion.platforms.iter().collect();
    platforms.sort_by(|a, b| a.0.cmp(b.0));
    for (platform, tracks) in platforms {
        println!(
            "{} {} matched, {}",
            style(format!("{}:", display_name(platform))).green(),
            tracks.tracks.len(),
            tracks.length
        );
        for (position, track) in tracks.tracks.iter().enumerate() {
            println!(
                "  {:>3}. {} / {}  {}",
                position + 1,
                track.title,
                track.artists.join(", "),
                style(&track.url).dim()
            );
        }
    }

    for omitted in &conversion.omitted_tracks {
        println!(
            "{} #{} {} / {}",
            style("Omitted").yellow(),
            omitted.index,
            omitted.title,
            omitted.artists.join(", ")
        );
    }
}

fn print_summary(total: usize, success: usize, failed: usize) {
    println!(
        "{} Total: {} | Success: {} | Failed: {}",
        style("Summary:").bold(),
        total,
        success,
        failed
    );
}

async fn run_watch(
    config: &TuneConfigData,
    urls: Vec<String>,
    to: Option<String>,
    catalog: &Path,
    subscribers: Vec<String>,
    interval: Option<u64>,
    passes: Option<usize>,
) -> TuneResult<()> {
    let subscribers = subscribers
        .iter()
        .map(|id| id.parse::<SubscriberId>())
        .collect::<TuneResult<Vec<_>>>()?;

    let engine = build_engine(config, catalog).await?;
    let target = resolve_target(config, to, engine.converter.registry(), false)?;

    let dedup = config
        .sync
        .dedup
        .as_deref()
        .map(str::parse::<DedupStrategy>)
        .transpose()?
        .unwrap_or_default();
    let settings = SyncSettings::from_secs(
        config
            .sync
            .failure_backoff_secs
            .unwrap_or(DEFAULT_FAILURE_BACKOFF_SECS),
        dedup,
    );
    let retention = config.sync.retention_secs.unwrap_or(DEFAULT_RETENTION_SECS);

    let follows = Arc::new(MemoryFollowStore::new());
    let notifications = Arc::new(MemoryNotificationStore::new());
    let service = FollowService::new(follows.clone());

    for url in &urls {
        let info: LinkInfo = engine
            .resolver
            .resolve_sync(url)?
            .with_target(target.as_str())
            .with_app(CLI_APP);
        let request = FollowRequest::new(
            CLI_DEVELOPER,
            CLI_APP,
            url.as_str(),
            info,
            subscribers.iter().copied(),
        )?;
        match service.follow_playlist(request).await {
            Ok(record) => println!(
                "{} {} ({} subscribers)",
                style("Following").green(),
                url,
                record.subscribers.len()
            ),
            Err(TuneError::AlreadyFollowing { entity_id }) => {
                println!("{} {entity_id}", style("Already following").yellow())
            }
            Err(err) => return Err(err),
        }
    }

    let scheduler = SyncScheduler::new(
        follows,
        notifications.clone(),
        Arc::new(MemoryTaskQueue::with_retention_secs(retention)),
        engine.converter.clone(),
    )
    .with_settings(settings);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let every = Duration::from_secs(
        interval
            .or(config.sync.interval_secs)
            .unwrap_or(DEFAULT_SYNC_INTERVAL_SECS)
            .max(1),
    );
    let mut events = engine.bus.subscribe();
    let mut printed = 0usize;
    let mut pass = 0usize;

    loop {
        pass += 1;
        let (report, drained) = scheduler.run_once(&cancel).await?;
        println!(
            "{} pass {pass}: {} eligible, {} enqueued, {} first, {} unchanged, {} updated, {} failed",
            style("Sync").bold(),
            report.eligible,
            report.enqueued,
            drained.first_conversions,
            drained.unchanged,
            drained.updated,
            drained.failed
        );

        while let Ok(event) = events.try_recv() {
            if let NotifierEvent::Custom { event_type, payload, .. } = event {
                if event_type == EVENT_PLAYLIST_UPDATED {
                    println!("  {} {payload}", style("Updated").green());
                }
            }
        }

        let rows = notifications.all().await;
        for row in rows.iter().skip(printed) {
            let summary = serde_json::from_str::<PlaylistConversion>(&row.data)
                .map(|conversion| {
                    format!(
                        "{} ({} omitted)",
                        conversion.meta.title,
                        conversion.omitted_tracks.len()
                    )
                })
                .unwrap_or_else(|_| "playlist updated".to_string());
            println!(
                "  {} {} {}",
                style("Notify").cyan(),
                row.subscriber,
                summary
            );
        }
        printed = rows.len();

        if passes.is_some_and(|limit| pass >= limit) || cancel.is_cancelled() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(every) => {}
            _ = cancel.cancelled() => break,
        }
    }
    Ok(())
}

fn handle_config_command(action: ConfigAction) -> TuneResult<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = load_config()?;
            match get_config_value(&config, &key) {
                Some(v) => println!("{} = {}", key, v),
                None => println!("{} = <null>", key),
            }
            Ok(())
        }
        ConfigAction::Set { key, value } => {
            set_config_value(&key, &value)?;
            println!("{} Set {} = {}", style("✓").green(), key, value);
            Ok(())
        }
        ConfigAction::List => {
            let config = load_config()?;
            println!("Current configuration:");
            for (section, keys) in CONFIG_KEYS {
                println!("\n[{section}]");
                for key in *keys {
                    let value = get_config_value(&config, &format!("{section}.{key}"));
                    println!("{key} = {}", value.as_deref().unwrap_or("<null>"));
                }
            }
            Ok(())
        }
        ConfigAction::Edit => {
            open_in_editor()?;
            Ok(())
        }
    }
}

const CONFIG_KEYS: &[(&str, &[&str])] = &[
    ("default", &["target"]),
    ("matching", &["workers", "queue_capacity", "timeout_secs"]),
    ("cache", &["track_ttl_secs"]),
    ("sync", &["failure_backoff_secs", "retention_secs", "dedup", "interval_secs"]),
    ("notify", &["webhook_url"]),
    ("log", &["level", "format"]),
];
