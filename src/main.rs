use std::sync::atomic::Ordering;

use anyhow::Result;
use clap::Parser;
use cubbystore::cli::{self, Cli, Commands};
use cubbystore::{constants, logging};
use logging::LogLevel;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = Cli::parse();

    let log_level = LogLevel::parse(&cli_args.loglevel).unwrap_or(LogLevel::Info);
    let is_serve = matches!(cli_args.command, Commands::Serve);

    let cancel_token = CancellationToken::new();
    let cancel_clone = cancel_token.clone();

    // First CTRL-C: graceful shutdown via the cancellation token. Second
    // CTRL-C: force exit, in case `serve`'s shutdown path is itself stuck.
    ctrlc::set_handler(move || {
        if constants::SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            eprintln!("\nforce shutdown");
            std::process::exit(130);
        }
        eprintln!("\nshutting down (press Ctrl-C again to force)");
        constants::SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        cancel_clone.cancel();
    })
    .expect("failed to set CTRL-C handler");

    // `serve` logs to a rolling file as well as the console; the guard must
    // stay alive for the process lifetime or the background writer flushes
    // nothing on drop. Short-lived commands get console-only logging.
    let _guard;
    if !cli_args.quiet {
        if is_serve {
            let config = cubbystore::Config::from_env();
            let root = config.resolve_root().unwrap_or_else(|_| std::env::temp_dir());
            _guard = logging::init_with_file(&root, log_level).ok();
        } else {
            logging::init_console(log_level);
            _guard = None;
        }
        info!("cubby v{} (loglevel: {})", env!("CARGO_PKG_VERSION"), log_level.as_str());
    } else {
        _guard = None;
    }

    cli::run(cli_args, cancel_token).await
}
