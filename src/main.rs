use reelpool::cli::Args;
use reelpool::core::event_bus::{BoxedEvent, downcast_event};
use reelpool::core::{
    DiskCache, EventBus, HttpBackend, MediaBackend, PlaybackState, PlayerEvent, PlayerEventKind,
    PlayerPool, PoolEvent, SyntheticBackend,
};
use reelpool::feed::{self, FeedPager};
use reelpool::paths::{self, PathConfig};
use reelpool::settings::{PoolSettings, SETTINGS_FILE};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Playback clock step of the simulated feed screen
const TICK: Duration = Duration::from_millis(20);

/// Items generated when running synthetic without a feed file
const SYNTHETIC_ITEMS: usize = 12;

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| paths::data_file("reelpool.log", path_config));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("reqwest", log::LevelFilter::Info)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(log_level.as_str().to_lowercase()),
        )
        .filter_module("reqwest", log::LevelFilter::Info)
        .format_timestamp_millis()
        .init();
    }
    Ok(())
}

fn build_backend(args: &Args, settings: &PoolSettings, path_config: &PathConfig) -> Result<Arc<dyn MediaBackend>> {
    if args.synthetic {
        info!("Using synthetic media backend");
        return Ok(Arc::new(
            SyntheticBackend::new(Duration::from_secs(20)).with_delay(Duration::from_millis(5)),
        ));
    }

    let cache_dir = settings.cache_dir(path_config);
    let cache = DiskCache::open(&cache_dir, settings.cache.max_bytes)
        .with_context(|| format!("Failed to open media cache: {}", cache_dir.display()))?;
    info!("Media cache: {} ({} KB cached)", cache_dir.display(), cache.total_bytes() / 1024);

    let backend = HttpBackend::new(settings.http.clone(), Arc::new(cache))?;
    Ok(Arc::new(backend))
}

/// Per-page summary of queued pool and player events
#[derive(Debug, Default)]
struct PageEvents {
    evicted: Vec<String>,
    failed: usize,
}

fn drain_events(queued: Vec<BoxedEvent>) -> PageEvents {
    let mut page = PageEvents::default();
    for event in &queued {
        if let Some(PoolEvent::Evicted { url }) = downcast_event::<PoolEvent>(event) {
            page.evicted.push(url.to_string());
        } else if let Some(e) = downcast_event::<PlayerEvent>(event)
            && let PlayerEventKind::StateChanged { to: PlaybackState::Error(msg), .. } = &e.kind
        {
            warn!("{} failed: {}", e.url, msg);
            page.failed += 1;
        }
    }
    page
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = paths::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }

    init_logging(&args, &path_config)?;
    debug!("Command-line args: {:?}", args);

    let mut settings = PoolSettings::load_or_default(&path_config)?;
    if let Some(capacity) = args.capacity {
        settings.max_capacity = capacity;
    }

    if args.write_config {
        let path = paths::config_file(SETTINGS_FILE, &path_config);
        settings.to_json(&path)?;
        println!("Settings written to {}", path.display());
        return Ok(());
    }

    let items = match (&args.feed, args.synthetic) {
        (Some(path), _) => feed::load_feed(path)?,
        (None, true) => (0..SYNTHETIC_ITEMS)
            .map(|i| format!("synthetic://shorts/{}", i))
            .collect(),
        (None, false) => {
            use clap::CommandFactory;
            Args::command().print_help()?;
            println!();
            return Ok(());
        }
    };
    if items.is_empty() {
        warn!("Feed is empty, nothing to play");
        return Ok(());
    }

    let events = EventBus::with_queue();
    events.subscribe::<PlayerEvent, _>(|e| {
        if let PlayerEventKind::StateChanged { from, to } = &e.kind {
            debug!("{} [{}]: {:?} -> {:?}", e.url, e.session, from, to);
        }
    });
    events.subscribe::<PoolEvent, _>(|e| debug!("Pool: {:?}", e));

    let backend = build_backend(&args, &settings, &path_config)?;
    let pool = PlayerPool::new(
        settings.max_capacity,
        settings.load_control.clone(),
        backend,
        settings.workers_override,
        events.clone(),
    )
    .context("Failed to start loader threads")?;
    let stats = pool.stats();

    let mut pager = FeedPager::new(
        items,
        pool,
        settings.preload_offsets.clone(),
        settings.preload_delay_ms,
    );

    let pages = feed::page_range(pager.len(), args.start_page, args.pages);
    let dwell = Duration::from_millis(args.dwell_ms);

    println!("Scrolling pages {:?} ({} ms per page)", pages, args.dwell_ms);
    let mut failures = 0;
    for page in pages {
        if pager.set_page(page).is_none() {
            break;
        }

        let shown = Instant::now();
        let mut last = shown;
        while shown.elapsed() < dwell {
            std::thread::sleep(TICK);
            let now = Instant::now();
            pager.tick(now - last);
            last = now;
        }

        if let Some(player) = pager.current_player() {
            println!(
                "[{:>3}] {:<48} {:<12} pos={:>6} ms  buffered={:>6} ms  pool={}/{}",
                page,
                player.url(),
                format!("{:?}", player.state()),
                player.position().as_millis(),
                player.buffered_ahead().as_millis(),
                pager.pool().len(),
                pager.pool().capacity()
            );
        }

        let summary = drain_events(events.poll());
        if !summary.evicted.is_empty() {
            println!("      evicted: {}", summary.evicted.join(", "));
        }
        failures += summary.failed;
    }

    pager.dismiss();

    println!(
        "Players created={} reused={} evicted={} released={} preload-hits={} (reuse {:.0}%)",
        stats.created(),
        stats.reused(),
        stats.evicted(),
        stats.released(),
        stats.preload_hits(),
        stats.reuse_rate() * 100.0
    );
    if failures > 0 {
        println!("{} player(s) failed to load", failures);
    }
    Ok(())
}
