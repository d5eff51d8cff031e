mod cli;
mod model;
mod orchestrator;
mod sessions;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::Layer;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_logging(&args)?;

    std::process::exit(exit_code(cli::run(args).await))
}

/// Map the command's outcome to a process exit code. Errors are reported
/// once, through the log, and exit with 1.
fn exit_code(result: Result<i32>) -> i32 {
    result.unwrap_or_else(|e| {
        tracing::error!(error = %format!("{e:#}"), "command failed");
        1
    })
}

/// Logs go to stderr; stdout is reserved for encoder output and reports.
fn init_logging(args: &cli::Cli) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if args.quiet {
        EnvFilter::new("error")
    } else {
        let default_level = match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let fmt_layer = match args.log_format {
        cli::LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true)
            .boxed(),
        cli::LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
        cli::LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_errors_map_to_exit_code_one() {
        assert_eq!(exit_code(Ok(0)), 0);
        assert_eq!(exit_code(Ok(130)), 130);
        assert_eq!(exit_code(Err(anyhow::anyhow!("Invalid client IP address."))), 1);
    }
}
