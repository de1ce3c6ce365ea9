//! pulse: runs one presence session from the terminal.
//!
//! Stdin lines stand in for host events (interaction, visibility) so the
//! presence core can be driven by hand or by a script. Status changes of
//! watched users are logged as they arrive.

mod backend;
mod cli;
mod commands;

use std::path::Path;
use std::process::ExitCode;

use pulse_config::PulseConfig;
use pulse_presence::{PresenceSession, Subscription};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::commands::Command;

fn load_config(path: Option<&str>) -> pulse_common::Result<PulseConfig> {
    match path {
        Some(path) => Ok(pulse_config::load_config_from(Path::new(path))?),
        None => Ok(pulse_config::load_config()?),
    }
}

fn init_logging(directive: &str) {
    let fallback = "pulse=info";
    let directive = directive.parse().or_else(|_| fallback.parse());
    let filter = match directive {
        Ok(d) => EnvFilter::from_default_env().add_directive(d),
        Err(_) => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> ExitCode {
    // `.env` in the working directory or a parent; real env vars win.
    let dotenv = dotenvy::dotenv();
    let args = cli::parse();

    let (config, config_error) = match load_config(args.config.as_deref()) {
        Ok(config) => (config, None),
        Err(e) if args.config.is_some() => {
            eprintln!("pulse: {e}");
            return ExitCode::FAILURE;
        }
        Err(e) => (PulseConfig::default(), Some(e)),
    };

    let directive = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.directive().to_string());
    init_logging(&directive);

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env"),
    }
    if let Some(e) = config_error {
        tracing::warn!("Config load failed, using defaults: {e}");
    }
    if let Some(ref path) = args.config {
        tracing::info!("Using config override: {path}");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: cli::Args, config: PulseConfig) -> pulse_common::Result<()> {
    tracing::info!("Pulse v{} starting...", env!("CARGO_PKG_VERSION"));

    let backends = backend::build(&config, args.memory)?;
    tracing::info!(backend = backends.kind, "Store ready");

    let session_config = backend::session_config(&config, &args.watch);
    let session = PresenceSession::start(
        args.user_id.clone(),
        backends.store,
        backends.feed,
        session_config,
    );

    let mut watched: Vec<&String> = args.watch.iter().collect();
    watched.push(&args.user_id);
    let _subscriptions: Vec<Subscription> = watched
        .into_iter()
        .map(|id| {
            session.subscribe(id, |record| {
                tracing::info!(
                    user_id = %record.user_id,
                    status = %record.status,
                    last_seen = %record.last_seen,
                    "status change"
                );
            })
        })
        .collect();

    println!("{}", commands::HELP);
    command_loop(&session).await;

    session.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Feed stdin lines to the session until quit, EOF or Ctrl-C.
async fn command_loop(session: &PresenceSession) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let line = tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                return;
            }
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                return;
            }
        };

        let Some(command) = commands::parse(&line) else {
            continue;
        };
        match command {
            Command::Interaction(kind) => session.notify_interaction(kind),
            Command::PointerMove => tracing::debug!("pointer movement is not activity"),
            Command::Visibility(visible) => session.notify_visibility_change(visible),
            Command::Status(id) => println!("{id}: {}", session.current_status(&id)),
            Command::State => print_state(session).await,
            Command::Help => println!("{}", commands::HELP),
            Command::Quit => return,
            Command::Unknown(text) => println!("unknown command: {text}\n{}", commands::HELP),
        }
    }
}

async fn print_state(session: &PresenceSession) {
    let transport = session.transport_state();
    println!(
        "session {} | transport {} ({} failures)",
        session.session_id().short(),
        transport.health,
        transport.consecutive_failures
    );
    match session.local_state().await {
        Some(local) => println!(
            "local active={} hidden={} last_published={}",
            local.is_active,
            local.is_hidden,
            local
                .last_published_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".into())
        ),
        None => println!("local loop stopped"),
    }
}
