use anyhow::Context as _;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

use explorer_pro::config::Config;
use explorer_pro::context::AppContext;
use explorer_pro::settings::Settings;
use explorer_pro::window::host::HeadlessHost;
use explorer_pro::window::Rect;

const VERSION: &str = concat!(
    env!("EXPLORER_BUILD_VERSION"),
    " (",
    compile_time::datetime_str!(),
    ")",
);

/// ExplorerPro: tabbed, multi-window file explorer core
#[derive(Parser, Debug)]
#[command(
    version = VERSION,
    about,
    long_about = "ExplorerPro: tabbed, multi-window file explorer core\n\n\
        Runs a headless session: opens one window with a tab per path,\n\
        prints the resulting windows and tabs as JSON, then shuts down\n\
        and remembers the window frame for the next start.",
    after_long_help = "Examples:\n\
        \x20 explorer-pro                     Open a window with a blank tab\n\
        \x20 explorer-pro ~/src ~/docs        Open two tabs\n\
        \x20 explorer-pro --config cfg.json   Use a specific config file"
)]
struct Cli {
    /// Directories or files to open as tabs
    #[arg()]
    paths: Vec<PathBuf>,

    /// Config file (default: <config dir>/explorer-pro/config.json)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

const DEFAULT_LOGLEVEL: &str = if cfg!(debug_assertions) {
    "debug"
} else {
    "info"
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments first (before any other initialization)
    let cli = Cli::parse();

    // Load environment variables from .env file
    if let Ok(dotenv) = dotenvy::dotenv() {
        println!("Loaded .env file from: {}", dotenv.display());
    }
    init_tracing();

    let config = Config::load(cli.config.as_deref());
    let screen = Rect::new(
        0.0,
        0.0,
        config.window_position.screen_width,
        config.window_position.screen_height,
    );
    let host = HeadlessHost::new(screen);
    let settings = Settings::load(Settings::default_path());
    let context = AppContext::new(config, host, settings).context("Failed to start the UI thread")?;

    let paths: Vec<PathBuf> = cli.paths.into_iter().filter_map(validate_path).collect();
    context
        .open_window(paths)
        .context("Failed to open the initial window")?;

    let snapshot = serde_json::to_string_pretty(&context.snapshot())?;
    println!("{snapshot}");

    context.shutdown().await;
    Ok(())
}

/// Canonicalize a CLI path, skipping ones that do not exist
fn validate_path(path: PathBuf) -> Option<PathBuf> {
    match path.canonicalize() {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::warn!(path = %path.display(), %e, "Skipping path that cannot be opened");
            None
        }
    }
}

fn init_tracing() {
    let env_filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOGLEVEL));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .without_time()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter_layer)
        .with(fmt_layer)
        .init();
}
