//! `trackfeed` - CLI for the trackfeed service
//!
//! This binary runs the HTTP server and change notifier, and offers a few
//! maintenance commands that work directly on the database.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use trackfeed::api::{create_router, AppState};
use trackfeed::cli::{Cli, Command, ConfigCommand, ServeCommand, TracksCommand};
use trackfeed::notifier::ChangeNotifier;
use trackfeed::source::{HttpTrackSource, TrackSource};
use trackfeed::webhook::HttpTransport;
use trackfeed::{init_logging, Config, Database, NewTrack, TrackRecord};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    match cli.command {
        Command::Serve(serve_cmd) => serve(Config::load_from(cli.config)?, &serve_cmd).await,
        Command::Status(status_cmd) => {
            handle_status(&Config::load_from(cli.config)?, status_cmd.json)
        }
        Command::Tracks(tracks_cmd) => {
            handle_tracks(&Config::load_from(cli.config)?, tracks_cmd).await
        }
        // Loads the configuration itself so a broken file can be reported
        Command::Config(config_cmd) => handle_config(cli.config, config_cmd),
    }
}

async fn serve(mut config: Config, cmd: &ServeCommand) -> anyhow::Result<()> {
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    let addr = config.bind_address()?;

    let db = Database::open(config.database_path())?;
    let source: Arc<dyn TrackSource> = Arc::new(HttpTrackSource::new(
        config.fetch_timeout(),
        config.fetch.max_bytes,
    )?);

    let notifier = if config.notifier.enabled && !cmd.no_notifier {
        let transport = Arc::new(HttpTransport::new(config.notifier_request_timeout())?);
        Some(ChangeNotifier::new(db.clone(), transport, config.notifier_interval())?.spawn())
    } else {
        info!("Change notifier disabled");
        None
    };

    let state = AppState::new(&db, source, config.ticker.page_size);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(handle) = notifier {
        let state = handle.shutdown().await?;
        info!("Notifier stopped at {} tracks", state.last_seen());
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let db_path = config.database_path();
    let stats = Database::open(&db_path)?.stats()?;

    if json {
        let status = serde_json::json!({
            "database_path": db_path,
            "total_tracks": stats.total_tracks,
            "total_webhooks": stats.total_webhooks,
            "last_track_id": stats.last_track_id,
            "last_webhook_id": stats.last_webhook_id,
            "newest_arrival": stats.newest_arrival,
            "db_size_bytes": stats.db_size_bytes,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("trackfeed status");
        println!("----------------");
        println!("Database:      {}", db_path.display());
        println!("Tracks:        {}", stats.total_tracks);
        println!("Webhooks:      {}", stats.total_webhooks);
        println!("Last track id: {}", stats.last_track_id);
        match stats.newest_arrival {
            Some(at) => println!("Newest track:  {}", at.to_rfc3339()),
            None => println!("Newest track:  -"),
        }
        println!("Size:          {} bytes", stats.db_size_bytes);
    }
    Ok(())
}

fn print_track(track: &TrackRecord) {
    println!("Track {}", track.id);
    println!("  Pilot:     {}", track.pilot);
    println!("  Glider:    {} ({})", track.glider, track.glider_id);
    println!("  Length:    {:.2} km", track.distance);
    if let Some(date) = track.date {
        println!("  Date:      {date}");
    }
    println!("  Source:    {}", track.source_url);
    println!("  Arrived:   {}", track.arrival_timestamp);
}

async fn handle_tracks(config: &Config, cmd: TracksCommand) -> anyhow::Result<()> {
    let tracks = Database::open(config.database_path())?.tracks();

    match cmd {
        TracksCommand::List { json } => {
            let all = tracks.get_all()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&all)?);
            } else if all.is_empty() {
                println!("No tracks stored.");
            } else {
                for track in &all {
                    println!(
                        "{:>6}  {:<24}  {:>9.2} km  {}",
                        track.id, track.pilot, track.distance, track.source_url
                    );
                }
            }
        }
        TracksCommand::Show { id } => match tracks.get(id)? {
            Some(track) => print_track(&track),
            None => bail!("track {id} not found"),
        },
        TracksCommand::Add { url } => {
            let source = HttpTrackSource::new(config.fetch_timeout(), config.fetch.max_bytes)?;
            let parsed = source.fetch(&url).await?;
            let outcome = tracks.add(&NewTrack::new(url.trim(), parsed))?;
            if outcome.is_inserted() {
                println!("Added track {}", outcome.id());
            } else {
                println!("Already stored as track {}", outcome.id());
            }
        }
        TracksCommand::Purge { yes } => {
            if yes {
                let removed = tracks.delete_all()?;
                println!("Deleted {removed} tracks.");
            } else {
                println!("This will delete all {} stored tracks.", tracks.count()?);
                println!("Use --yes to confirm.");
            }
        }
    }
    Ok(())
}

fn handle_config(path: Option<std::path::PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Bind address:       {}:{}", config.server.host, config.server.port);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Ticker]");
                println!("  Page size:          {}", config.ticker.page_size);
                println!();
                println!("[Notifier]");
                println!("  Enabled:            {}", config.notifier.enabled);
                println!("  Interval (secs):    {}", config.notifier.interval_secs);
                println!(
                    "  Request timeout:    {}s",
                    config.notifier.request_timeout_secs
                );
                println!();
                println!("[Fetch]");
                println!("  Timeout (secs):     {}", config.fetch.timeout_secs);
                println!("  Max bytes:          {}", config.fetch.max_bytes);
            }
        }
        ConfigCommand::Path => {
            println!("{}", path.unwrap_or_else(Config::default_config_path).display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
