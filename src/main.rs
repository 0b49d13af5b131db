mod capture;
mod cli;
mod config;
mod feed;
mod record;
mod recordings;
mod resolve;
mod schedule;
mod server;
mod state;
mod template;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use cli::{Args, Command};
use config::Config;
use schedule::Programs;
use server::Server;
use state::State;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

fn set_up_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_regex(false)
                .with_default_directive(Level::INFO.into())
                .with_env_var("RADIOCAST_LOG")
                .from_env_lossy(),
        )
        .init();
}

fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => info!("Loaded environment variables from `{}`", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Could not load the `.env` file: {e}"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    set_up_logging();
    load_dotenv();

    match start(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,

        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let config_paths = args
        .config_path
        .clone()
        .into_iter()
        .chain(["./radiocast.toml".into(), "/etc/radiocast.toml".into()])
        .collect::<Vec<_>>();
    let mut config = config::load(&config_paths)?;
    config.update(args);

    Ok(config)
}

async fn start(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let current_dir = || PathBuf::from(".");

    match args.command {
        Command::Record(record_args) => record::run(&config, record_args).await,
        Command::Serve => serve(config).await,

        Command::RenameLegacy { dir } => {
            recordings::rename_legacy(dir.unwrap_or_else(current_dir))?;

            Ok(())
        }

        Command::Retime { dir } => {
            recordings::retime(dir.unwrap_or_else(current_dir), config.timezone)?;

            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Recordings directory: {}", config.recordings_dir.display());
    info!(
        "Authentication: {}",
        if config.secret.is_some() {
            "enabled"
        } else {
            "disabled (no secret)"
        }
    );
    info!("Route prefix: `{}`", config.route_prefix());
    info!(
        "Feed cache TTL: {}s",
        std::time::Duration::from(config.cache_ttl).as_secs()
    );

    if let Err(e) = std::fs::create_dir_all(&config.recordings_dir) {
        warn!(
            "Could not create the recordings directory `{}`: {e}",
            config.recordings_dir.display()
        );
    }

    let programs = Programs::from_env();
    let state = State::new(config, programs)?;
    let server = Server::new(state).await?;

    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();

        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => cancel.cancel(),
                Err(e) => error!("Could not listen for the shutdown signal: {e}"),
            }
        }
    });

    server.serve(cancel).await
}
