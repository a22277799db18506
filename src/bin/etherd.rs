//! `etherd` - the remote memory daemon.
//!
//! Prints a `$ready` line on stdout once listening and a `$stats` line
//! after Ctrl-C. Logs go to stderr.

use std::future::Future;

use clap::Parser;
use tracing::Level;

use ether::control::{build_ready_message, build_stats_message, write_stdout_line};
use ether::handle::DEFAULT_MAX_HANDLES;
use ether::protocol::DEFAULT_PORT;
use ether::Server;

#[derive(Parser, Debug)]
#[command(name = "etherd", version, about = "Serve memory blocks over TCP")]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// TCP port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum number of live handles
    #[arg(long, default_value_t = DEFAULT_MAX_HANDLES)]
    max_handles: usize,

    /// Cap on outstanding bytes (unlimited if omitted)
    #[arg(long)]
    memory_limit: Option<usize>,

    /// Enable per-request debug logging
    #[arg(short, long)]
    debug: bool,
}

/// Resolve once `signal` fires.
///
/// If the signal cannot be installed the daemon keeps serving instead of
/// stopping right after `$ready`; SIGTERM still ends the process.
async fn shutdown_signal<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ether::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut server = Server::builder()
        .bind(format!("{}:{}", cli.host, cli.port))
        .max_handles(cli.max_handles)
        .memory_limit(cli.memory_limit)
        .build()
        .await?;

    let ready = build_ready_message(server.local_addr()?, server.config())?;
    write_stdout_line(&ready)?;

    server
        .run_until(shutdown_signal(tokio::signal::ctrl_c()))
        .await?;

    let stats = server.shutdown();
    write_stdout_line(&build_stats_message(&stats)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_signal_fires() {
        let result =
            tokio::time::timeout(Duration::from_secs(1), shutdown_signal(async { Ok(()) })).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_signal_failure_keeps_running() {
        let failing = async {
            Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "signal handler unavailable",
            ))
        };
        let result = tokio::time::timeout(Duration::from_millis(50), shutdown_signal(failing)).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["etherd"]);
        assert_eq!(cli.host, "127.0.0.1");
        assert_eq!(cli.port, DEFAULT_PORT);
        assert_eq!(cli.max_handles, DEFAULT_MAX_HANDLES);
        assert!(cli.memory_limit.is_none());
        assert!(!cli.debug);
    }
}
