use anyhow::Context;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use feedwall_host::app::{spawn_stdin_forwarder, App, Input};
use feedwall_host::bridge::MemoryBridge;
use feedwall_host::config::Config;
use feedwall_host::display::{DisplaySurface, TerminalSurface};
use feedwall_host::layout::FixedViewport;
use feedwall_host::resources::Resources;
use feedwall_host::session::SessionController;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // stdout carries the rendered grid; logs go to stderr.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let resources = Resources::new(config.resources.clone());

    let wasm = resources
        .fetch(&config.module)
        .await
        .with_context(|| format!("loading feed module {}", config.module))?;
    let bridge = MemoryBridge::init(&wasm).context("instantiating feed module")?;

    let people = resources
        .load_roster(&config.roster)
        .await
        .with_context(|| format!("loading roster {}", config.roster))?;
    let mut surface = TerminalSurface::new(std::io::stdout());
    if config.preload {
        surface = surface.with_avatars(resources.preload_avatars(&people).await);
    }

    let mut controller = SessionController::new(bridge, surface);
    let seed = controller
        .seed_description()
        .context("reading seed description")?;
    tracing::info!(seed = %seed, "feed module seeded");
    controller.surface_mut().show_seed(&seed);

    let (tx, rx) = mpsc::channel(16);
    spawn_stdin_forwarder(tx.clone()).context("starting stdin reader")?;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(Input::Quit).await;
        }
    });

    tracing::info!("ready: 1/2/3 select a layout, enter or s stops, q quits");
    App::new(
        controller,
        people,
        FixedViewport(config.viewport_width),
        config.tick_interval,
    )
    .run(rx)
    .await?;
    Ok(())
}
