//! macfetch - verified downloads of macOS installer and recovery images
//!
//! This is the command line front end. It loads configuration, starts
//! operations through the ops crate and renders their events; all protocol
//! and integrity logic lives in the library crates.

mod cli;
mod display;
mod error;
mod events;
mod logging;

use crate::cli::{Cli, Commands, GlobalArgs};
use crate::display::OutputRenderer;
use crate::error::CliError;
use crate::events::EventHandler;
use clap::Parser;
use macfetch_config::{constants, Config};
use macfetch_events::EventReceiver;
use macfetch_ops::{InstallerRequest, OpsCtx, RecoveryRequest, TaskManager, TaskRequest};
use macfetch_types::BoardSelection;
use std::future::Future;
use std::pin::pin;
use std::process;
use tokio::select;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    let debug_enabled = init_tracing(cli.global.debug);

    if let Err(e) = run(cli, debug_enabled).await {
        let kind = e.kind();
        error!(%kind, "{e}");
        if json_mode {
            println!(
                "{}",
                serde_json::json!({ "error": kind.as_str(), "message": e.to_string() })
            );
        } else {
            eprintln!("Error [{kind}]: {e}");
        }
        process::exit(e.exit_code());
    }
}

/// Main application logic
async fn run(cli: Cli, debug_enabled: bool) -> Result<(), CliError> {
    info!("Starting macfetch v{}", env!("CARGO_PKG_VERSION"));

    // Precedence: file (or defaults), then environment, then flags
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;
    apply_cli_config(&mut config, &cli.global);

    let (event_sender, event_receiver) = macfetch_events::channel();
    let ctx = OpsCtx::from_config(config, event_sender).await?;

    let renderer = OutputRenderer::new(cli.global.json);
    let mut event_handler = EventHandler::new(debug_enabled, cli.global.json);

    match cli.command {
        Commands::Boards { board_id } => {
            renderer.render_boards(&ctx, board_id.as_deref())?;
        }

        Commands::Verify { chunklist, payload } => {
            let cancel = CancellationToken::new();
            let report = execute_with_events(
                macfetch_ops::verify_download(&ctx, &chunklist, &payload, &cancel),
                event_receiver,
                &mut event_handler,
                || cancel.cancel(),
            )
            .await?;
            renderer.render_file_report(&payload, &report)?;
        }

        command => {
            let request = task_request(command)?;
            let manager = TaskManager::new(ctx);
            let handle = manager.start(request)?;
            let task_id = handle.id();
            let report = execute_with_events(
                handle.wait(),
                event_receiver,
                &mut event_handler,
                || {
                    if let Err(e) = manager.cancel_id(task_id) {
                        tracing::debug!(error = %e, "task already finished");
                    }
                },
            )
            .await?;
            renderer.render_task_report(&report)?;
        }
    }

    info!("Command completed successfully");
    Ok(())
}

/// Drive `operation` while rendering events; Ctrl-C calls `interrupt` once.
async fn execute_with_events<T, F>(
    operation: F,
    mut event_receiver: EventReceiver,
    event_handler: &mut EventHandler,
    interrupt: impl Fn(),
) -> Result<T, CliError>
where
    F: Future<Output = Result<T, macfetch_errors::Error>>,
{
    let mut operation = pin!(operation);
    let mut events_open = true;
    let mut interrupted = false;

    loop {
        select! {
            result = &mut operation => {
                while let Ok(message) = event_receiver.try_recv() {
                    event_handler.handle_event(message);
                }
                return result.map_err(CliError::from);
            }

            message = event_receiver.recv(), if events_open => match message {
                Ok(message) => event_handler.handle_event(message),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event consumer lagged");
                }
                Err(RecvError::Closed) => events_open = false,
            },

            signal = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                if signal.is_ok() {
                    event_handler.notice("interrupted, stopping; partial data is kept for resume");
                    interrupt();
                }
            }
        }
    }
}

/// Translate a download command into a task request
fn task_request(command: Commands) -> Result<TaskRequest, CliError> {
    match command {
        Commands::Recovery {
            board_id,
            os,
            mlb,
            client_id,
            diagnostics,
            allow_unknown_board,
        } => {
            if let Some(id) = &client_id {
                if id.len() != 16 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(CliError::InvalidArguments(format!(
                        "client id '{id}' must be 16 hex digits"
                    )));
                }
            }
            let mut selection = BoardSelection::new(board_id);
            selection.os_type = os;
            selection.mlb = mlb;
            selection.client_id = client_id.map(|id| id.to_ascii_uppercase());
            selection.diagnostics = diagnostics;
            selection.manual_override = allow_unknown_board;
            Ok(RecoveryRequest::new(selection).into())
        }

        Commands::Download {
            url,
            chunklist_url,
            product,
            os_version,
            file_name,
        } => {
            let mut request = InstallerRequest::new(url, product, os_version);
            if let Some(chunklist_url) = chunklist_url {
                request = request.with_chunklist(chunklist_url);
            }
            if let Some(file_name) = file_name {
                request = request.with_file_name(file_name);
            }
            Ok(request.into())
        }

        Commands::Verify { .. } | Commands::Boards { .. } => Err(CliError::InvalidArguments(
            "command does not start a download".to_string(),
        )),
    }
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, global: &GlobalArgs) {
    if let Some(dir) = &global.output_dir {
        config.paths.download_root = Some(dir.clone());
    }
}

/// Initialize tracing/logging; returns whether debug logging is on
fn init_tracing(debug_flag: bool) -> bool {
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_flag;

    if debug_enabled {
        // Debug mode: structured JSON logs to file
        let log_dir = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(constants::APP_DIR)
            .join("logs");
        if let Err(e) = std::fs::create_dir_all(&log_dir) {
            eprintln!("Warning: Failed to create log directory: {e}");
        }

        let log_file = log_dir.join(format!(
            "macfetch-{}.log",
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        ));

        match std::fs::File::create(&log_file) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .json()
                    .with_writer(file)
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                            |_| tracing_subscriber::EnvFilter::new("info,macfetch=debug"),
                        ),
                    )
                    .init();

                eprintln!("Debug logging enabled: {}", log_file.display());
            }
            Err(e) => {
                eprintln!("Warning: Failed to create log file: {e}");
                tracing_subscriber::fmt()
                    .with_writer(std::io::stderr)
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env()
                            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                    )
                    .init();
            }
        }
    } else {
        // Normal mode: library warnings reach the user as rendered events
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(tracing_subscriber::EnvFilter::new("warn,macfetch=error"))
            .init();
    }

    debug_enabled
}
