use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use plant_watch::comm::HttpFetcher;
use plant_watch::common::logging::{init_logger, LogLevel};
use plant_watch::data::PlantStore;
use plant_watch::model::WatchConfig;
use plant_watch::watcher::PlantWatcher;

#[derive(Parser, Debug)]
#[command(about = "Polls a solar plant controller and stores its readings in SQLite")]
struct Args {
    /// JSON file with `host` and optionally `poll_time`
    config_file: Option<std::path::PathBuf>,
    /// Controller host[:port], overrides the config file
    #[arg(long = "host", short = 'H')]
    host: Option<String>,
    /// Poll period such as "60s" or "2m", overrides the config file
    #[arg(long = "poll-time", value_parser = humantime::parse_duration)]
    poll_time: Option<Duration>,
    #[arg(long = "db", default_value = "plant-watch.db3")]
    db_file: std::path::PathBuf,
    #[arg(long = "log-level", value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
    #[arg(long = "log-file", default_value = "")]
    log_file: String,
    /// Create the database tables and exit
    #[arg(long = "init-db")]
    init_db: bool,
}

fn load_config(args: &Args) -> Result<WatchConfig> {
    let mut config = match &args.config_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path).context("Couldn't read config file")?;
            WatchConfig::from_json(&raw).context("Couldn't parse config file")?
        }
        None => {
            let host = args
                .host
                .clone()
                .ok_or_else(|| anyhow!("No config file or --host was provided"))?;
            WatchConfig::new(host)
        }
    };

    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(poll_time) = args.poll_time {
        config.poll_time = poll_time;
    }

    config
        .validate()
        .map_err(|e| anyhow!("Wrong config:\n{}", e))?;

    Ok(config)
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
                return;
            }
            Err(err) => warn!("Couldn't listen for SIGTERM: {}", err),
        }
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Couldn't listen for Ctrl+C: {}", err);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    //We have to keep the worker_guard alive
    let _worker_guard = init_logger(args.log_level, &args.log_file);

    if args.init_db {
        warn!("Initialising the database {}", args.db_file.display());
        if let Err(e) = PlantStore::initialise(&args.db_file) {
            error!("Couldn't init db: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let config = load_config(&args).unwrap_or_else(|e| {
        error!("{:#}", e);
        std::process::exit(1);
    });

    let store = PlantStore::open(&args.db_file).unwrap_or_else(|e| {
        error!("Couldn't open db: {}", e);
        std::process::exit(1);
    });

    let fetcher = HttpFetcher::from_config(&config).unwrap_or_else(|e| {
        error!("Couldn't build http client: {}", e);
        std::process::exit(1);
    });

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("polling interrupted by user, stopping process");
        signal_token.cancel();
    });

    let watcher = PlantWatcher::new(fetcher, store, config.poll_time);

    if let Err(e) = watcher.run(shutdown).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
