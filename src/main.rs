//! Scenehost demo - drives the coordinator and token cache over an in-memory streamer

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use scenehost::config::HostConfig;
use scenehost::core::{logging, FrameClock};
use scenehost::host::EngineHost;
use scenehost::scene::{InMemoryStreamer, LoadMode, LoadOutcome, LoadRequest, StreamEvent};

const FRAME: Duration = Duration::from_millis(16);

fn parse_config_arg(args: &[String]) -> Option<PathBuf> {
    args.iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

fn load_config(path: Option<&PathBuf>) -> HostConfig {
    let Some(path) = path else {
        return HostConfig::default();
    };
    match HostConfig::load_sync(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Ignoring config {}: {}", path.display(), e);
            HostConfig::default()
        }
    }
}

async fn run(config: HostConfig) -> scenehost::core::Result<()> {
    let streamer = Arc::new(
        InMemoryStreamer::new(["Boot", "Menu", "Level1", "Level2", "Hud"])
            .with_loaded(["Boot"])
            .with_latency(Duration::from_millis(120), Duration::from_millis(60)),
    );
    let clock = Arc::new(FrameClock::new());
    let host = EngineHost::start(streamer.clone(), clock.clone(), &config)?;

    // Frame loop stand-in
    let ticker = {
        let clock = clock.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(FRAME).await;
                clock.tick();
            }
        })
    };

    let coordinator = host.coordinator().clone();
    let fired = Arc::new(AtomicUsize::new(0));
    let callback = |tag: &'static str| {
        let fired = Arc::clone(&fired);
        move || {
            fired.fetch_add(1, Ordering::SeqCst);
            log::info!("Completion callback '{}' fired", tag);
        }
    };

    log::info!("Requesting Menu three times concurrently");
    let (a, b, c) = tokio::join!(
        coordinator.request_load(LoadRequest::new("Menu").on_completed(callback("menu-a"))),
        coordinator.request_load(LoadRequest::new("Menu").on_completed(callback("menu-b"))),
        coordinator.request_load(
            LoadRequest::new("Menu").on_completed(callback("menu-c")).try_load(true)
        ),
    );
    log::info!("Outcomes: {:?} / {:?} / {:?}", a, b, c);

    coordinator.load("Hud", LoadMode::Additive).await;

    log::info!("Swapping to Level1, keeping Hud");
    let outcome = coordinator
        .swap_to(
            LoadRequest::new("Level1")
                .mode(LoadMode::Additive)
                .on_completed(callback("level1")),
            ["Hud"],
        )
        .await;
    if !outcome.is_success() {
        log::warn!("Swap did not complete: {:?}", outcome);
    }

    let wait = host.waits().wait_for_seconds(0.25);
    wait.wait(clock.as_ref(), FRAME).await;

    match coordinator.reload_active(Some(Box::new(callback("reload")))).await {
        LoadOutcome::Loaded => log::info!("Active scene reloaded"),
        other => log::warn!("Reload outcome: {:?}", other),
    }

    for event in streamer.journal() {
        match event {
            StreamEvent::LoadFailed(name) | StreamEvent::UnloadFailed(name) => {
                log::warn!("  failed: {}", name)
            }
            other => log::info!("  {:?}", other),
        }
    }
    log::info!(
        "Loaded scenes: {:?}; callbacks fired: {}; token cache: {:?}",
        streamer.loaded_scenes(),
        fired.load(Ordering::SeqCst),
        host.waits().stats()
    );

    ticker.abort();
    host.shutdown().await;
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let config = load_config(parse_config_arg(&args).as_ref());
    logging::init_with_filter(&config.log_filter);
    log::info!("Scenehost demo starting...");

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(run(config)) {
        log::error!("Demo failed: {}", e);
        std::process::exit(1);
    }
}
