use crate::model::{ControlSession, EncoderOptions, PipelineConfig};
use crate::orchestrator::TwpingPipeline;
use crate::sessions;
use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Exit code reported when the run was interrupted with Ctrl-C.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "twping-json",
    version,
    about = "Run a TWAMP client test with JSON encoded output, or show TWAMP server sessions"
)]
pub struct Cli {
    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format (logs always go to stderr)
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TWPING_JSON_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Commands {
    /// Run twping and stream its output through the JSON encoder
    Run(RunArgs),

    /// Show TWAMP server session information
    Sessions(SessionsArgs),
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Only print JSON encoded lines (errors are still printed)
    #[arg(long)]
    pub json_only: bool,

    /// Accumulate statistics over the whole test
    #[arg(long)]
    pub accumulate: bool,

    /// Path to the twping output encoder
    #[arg(long, env = "TWPING_JSON_ENCODER")]
    pub encoder: Option<PathBuf>,

    /// JSON file with pipeline settings; flags given here take precedence
    #[arg(long, env = "TWPING_JSON_CONFIG")]
    pub config: Option<PathBuf>,

    /// How long the processes may take to exit once output has ended
    #[arg(long)]
    pub settle_timeout: Option<humantime::Duration>,

    /// Kill a process that is still alive this long after SIGTERM
    #[arg(long, conflicts_with = "no_kill")]
    pub kill_after: Option<humantime::Duration>,

    /// Never escalate to SIGKILL; wait for processes to honour SIGTERM
    #[arg(long)]
    pub no_kill: bool,

    /// twping program and its arguments
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "TWPING"
    )]
    pub probe: Vec<OsString>,
}

#[derive(Debug, Args, Clone)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["all", "summary", "client"])
))]
pub struct SessionsArgs {
    /// Show detailed information for all sessions
    #[arg(long)]
    pub all: bool,

    /// Show summary information for all sessions
    #[arg(long)]
    pub summary: bool,

    /// Show session information for a particular client IP address
    #[arg(long, value_name = "IP")]
    pub client: Option<String>,

    /// Show sessions of this routing instance instead of the default one
    #[arg(long, value_name = "INSTANCE", default_value = sessions::DEFAULT_ROUTING_INSTANCE)]
    pub routing_instance: String,

    /// Base directory the TWAMP server writes session files to
    #[arg(long, env = "TWPING_SESSIONS_DIR", default_value = sessions::SESSION_FILES_DIR)]
    pub sessions_dir: PathBuf,

    /// Print the sessions as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the selected command and return the process exit code.
pub async fn run(args: Cli) -> Result<i32> {
    match args.command {
        Commands::Run(run_args) => run_pipeline(run_args).await,
        Commands::Sessions(session_args) => run_sessions(&session_args),
    }
}

/// Build a `PipelineConfig`: config file (if any), then CLI/env overrides.
pub fn build_config(args: &RunArgs) -> Result<PipelineConfig> {
    let mut cfg = match args.config.as_deref() {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(encoder) = &args.encoder {
        cfg.encoder_bin = encoder.clone();
    }
    if let Some(settle) = args.settle_timeout {
        cfg.settle_timeout = Duration::from(settle);
    }
    if let Some(kill_after) = args.kill_after {
        cfg.kill_after = Some(Duration::from(kill_after));
    }
    if args.no_kill {
        cfg.kill_after = None;
    }
    Ok(cfg)
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse config file {}", path.display()))
}

async fn run_pipeline(args: RunArgs) -> Result<i32> {
    let cfg = build_config(&args)?;
    let options = EncoderOptions {
        json_only: args.json_only,
        accumulate: args.accumulate,
    };
    tracing::debug!(?cfg, ?options, probe = ?args.probe, "starting pipeline");

    let pipeline = Arc::new(TwpingPipeline::new(args.probe, cfg));
    let worker = Arc::clone(&pipeline);
    let mut handle = tokio::task::spawn_blocking(move || worker.run(options, None));

    tokio::select! {
        joined = &mut handle => {
            let ok = joined.context("pipeline task failed")??;
            Ok(if ok { 0 } else { 1 })
        }
        sig = tokio::signal::ctrl_c() => {
            sig.context("failed to listen for Ctrl-C")?;
            tracing::info!(running = pipeline.running(), "interrupted, stopping pipeline");
            let stopper = Arc::clone(&pipeline);
            tokio::task::spawn_blocking(move || stopper.terminate())
                .await
                .context("terminate task failed")?;
            // The run task now sees end-of-stream and returns on its own.
            handle.await.context("pipeline task failed")??;
            Ok(EXIT_INTERRUPTED)
        }
    }
}

fn run_sessions(args: &SessionsArgs) -> Result<i32> {
    if let Some(ip) = args.client.as_deref() {
        sessions::validate_client(ip)?;
    }
    sessions::validate_routing_instance(&args.routing_instance)?;

    let chvrf_exists = Path::new(sessions::CHVRF).exists();
    if args.routing_instance != sessions::DEFAULT_ROUTING_INSTANCE && !chvrf_exists {
        bail!("No support for routing instances!");
    }

    let dir = sessions::sessions_dir(&args.sessions_dir, &args.routing_instance);
    if !dir.exists() {
        println!("No TWAMP session details are available");
        return Ok(1);
    }
    let all = sessions::load_sessions(&dir)?;
    tracing::debug!(dir = %dir.display(), count = all.len(), "loaded control sessions");

    if args.json {
        let shown: Vec<ControlSession> = match args.client.as_deref() {
            Some(ip) => all.into_iter().filter(|s| s.initiated_by(ip)).collect(),
            None => all,
        };
        let report = sessions::SessionReport::new(&args.routing_instance, &shown);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(0);
    }

    if all.is_empty() {
        println!(
            "{}",
            sessions::empty_message(&args.routing_instance, chvrf_exists)
        );
        return Ok(0);
    }

    let text = match args.client.as_deref() {
        Some(ip) => sessions::render_client(&all, ip),
        None if args.summary => sessions::render_summary(&all),
        None => sessions::render_all(&all),
    };
    print!("{text}");
    Ok(0)
}
