use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::BufReader;
use tokio::sync::mpsc;

use feedbridge::background::{self, Background, Envelope};
use feedbridge::bridge::{self, StdioHost};
use feedbridge::config::Config;
use feedbridge::oauth::{DropboxClient, OAuthCoordinator};
use feedbridge::storage::{FileStore, SessionRegistry};

/// Get the config directory path (~/.config/feedbridge/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedbridge"))
}

#[derive(Parser, Debug)]
#[command(
    name = "feedbridge",
    about = "Background coordinator for the feed reader extension (JSON lines on stdin/stdout)"
)]
struct Args {
    /// Config file (default: ~/.config/feedbridge/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// State file (overrides the config file)
    #[arg(long, value_name = "FILE")]
    state_file: Option<PathBuf>,

    /// Keep the tab records of the previous run
    #[arg(long)]
    resume: bool,

    /// Delete the state file, including any stored token, before starting
    #[arg(long)]
    reset_state: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // stdout carries bridge commands, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let state_path = args
        .state_file
        .clone()
        .or_else(|| config.state_file.clone())
        .unwrap_or_else(|| config_dir.join("state.json"));

    if args.reset_state && state_path.exists() {
        std::fs::remove_file(&state_path).context("Failed to delete state file")?;
        tracing::info!(path = %state_path.display(), "State reset");
    }

    let store = FileStore::new(&state_path);
    let registry = if args.resume || config.resume_session {
        SessionRegistry::resume(store)
    } else {
        SessionRegistry::new(store)
    };

    let http = reqwest::Client::builder()
        .user_agent(concat!("feedbridge/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let provider =
        DropboxClient::new(http, &config.provider).context("Invalid provider configuration")?;
    let oauth = OAuthCoordinator::new(provider, config.provider.redirect_uri.clone());

    let application_page = config
        .application_page()
        .context("No application page configured")?
        .to_string();

    let host = StdioHost::new(std::io::stdout());
    let (envelope_tx, envelope_rx) = mpsc::channel::<Envelope>(64);
    let reader = tokio::spawn(bridge::read_frames(
        BufReader::new(tokio::io::stdin()),
        host.pending_replies(),
        envelope_tx,
    ));

    let background = Background::new(
        registry,
        host,
        config.application_urls(),
        application_page,
        oauth,
    );

    tracing::info!(
        state = %state_path.display(),
        provider = %config.provider.name,
        "Background started"
    );
    background::run(&background, envelope_rx).await;

    reader
        .await
        .context("Frame reader task failed")?
        .context("Failed to read from stdin")?;

    tracing::info!("Background stopped");
    Ok(())
}
