// # smart-ipv6-rotator
//
// Thin command-line layer over `ipv6-rotator-core`.
//
// The binary is responsible for:
// 1. Parsing the command line and reading environment overrides
// 2. Initializing logging and the runtime
// 3. Checking privileges and the legacy state file
// 4. Wiring the netlink, HTTP and file-store implementations into a `Rotator`
// 5. Mapping the outcome to an exit code
//
// All rotation and cleanup logic lives in `ipv6-rotator-core`.
//
// ## Configuration
//
// Command-line flags win over environment variables:
//
// - `SMART_IPV6_ROTATOR_STATE_PATH`: rotation record file
//   (default `/tmp/smart-ipv6-rotator.json`)
// - `SMART_IPV6_ROTATOR_LOG_LEVEL`: trace, debug, info, warn, error (default `info`)
//
// ## Example
//
// ```bash
// smart-ipv6-rotator run --ipv6range 2407:7000:9827:4100::/64
// smart-ipv6-rotator clean --services google
// smart-ipv6-rotator clean-all
// ```

mod cli;

use anyhow::Result;
use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use cli::{Cli, Command};
use ipv6_rotator_core::privilege::ensure_root;
use ipv6_rotator_core::{
    CleanupOutcome, Error, FileRecordStore, InterfaceOverride, RotationRequest, Rotator,
    RotatorConfig,
};
use ipv6_rotator_http::HttpVerifier;
use ipv6_rotator_netlink::NetlinkNetwork;

/// Exit codes for different termination scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RotatorExitCode {
    /// The command completed
    Success = 0,
    /// Bad input, configuration or missing privileges
    UsageError = 1,
    /// The system or the network failed
    RuntimeError = 2,
}

impl From<RotatorExitCode> for ExitCode {
    fn from(code: RotatorExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

impl RotatorExitCode {
    fn for_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<Error>() {
            Some(e) if e.is_usage_error() => Self::UsageError,
            _ => Self::RuntimeError,
        }
    }
}

/// Exit code after clap stops parsing
///
/// Help and version requests succeed only if they were actually printed.
fn parse_failure_code(is_error: bool, printed: bool) -> RotatorExitCode {
    if is_error || !printed {
        RotatorExitCode::UsageError
    } else {
        RotatorExitCode::Success
    }
}

/// Settings taken from the environment
#[derive(Debug, Default)]
struct EnvConfig {
    state_path: Option<PathBuf>,
    log_level: Option<String>,
}

impl EnvConfig {
    /// Load overrides from environment variables
    fn from_env() -> Self {
        Self {
            state_path: env::var("SMART_IPV6_ROTATOR_STATE_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            log_level: env::var("SMART_IPV6_ROTATOR_LOG_LEVEL")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "Log level '{}' is not valid. Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

/// Build the rotator configuration, flags first, then environment
fn rotator_config(cli: &Cli, env: &EnvConfig) -> Result<RotatorConfig> {
    let mut config = RotatorConfig::new();
    if let Some(path) = cli.state_file.clone().or_else(|| env.state_path.clone()) {
        config = config.with_state_path(path);
    }
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            return parse_failure_code(e.use_stderr(), e.print().is_ok()).into();
        }
    };
    let env = EnvConfig::from_env();

    let log_level = cli
        .log_level
        .clone()
        .or_else(|| env.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    let log_level = match parse_log_level(&log_level) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return RotatorExitCode::UsageError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return RotatorExitCode::UsageError.into();
    }

    let config = match rotator_config(&cli, &env) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return RotatorExitCode::UsageError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return RotatorExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match execute(cli.command, config).await {
            Ok(()) => RotatorExitCode::Success,
            Err(e) => {
                error!("{}", e);
                RotatorExitCode::for_error(&e)
            }
        }
    });

    code.into()
}

/// Run one subcommand
async fn execute(command: Command, config: RotatorConfig) -> Result<()> {
    match command {
        Command::Run(args) => {
            ensure_root(args.privilege.skip_root)?;
            config.check_legacy_state()?;

            let interface_override = InterfaceOverride::from_parts(args.interface, args.gateway)?;
            let request = RotationRequest::new(args.ipv6range, args.selection.selection())
                .with_interface_override(interface_override)
                .with_skip_verification(args.cron);

            let rotator = build_rotator(config).await?;
            let record = rotator.rotate(&request).await?;
            info!(
                "Rotated to {} on {} for {}",
                record.assigned_address, record.interface_name, record.ranges
            );
        }
        Command::Clean(args) => {
            ensure_root(args.privilege.skip_root)?;
            let ranges = args.selection.selection().resolve()?;

            let rotator = build_rotator(config).await?;
            if let CleanupOutcome::Cleaned { record, failures } = rotator.clean(&ranges).await? {
                info!(
                    "Cleaned rotation of {} ({} step(s) failed)",
                    record.assigned_address,
                    failures.len()
                );
            }
        }
        Command::CleanAll(args) => {
            ensure_root(args.skip_root)?;

            let rotator = build_rotator(config).await?;
            let cleaned = rotator.clean_all().await?;
            info!("Cleaned {} rotation(s)", cleaned);
        }
    }
    Ok(())
}

/// Wire the system implementations into a rotator
async fn build_rotator(config: RotatorConfig) -> Result<Rotator> {
    let store = FileRecordStore::new(&config.state_path).await?;
    let network = NetlinkNetwork::open()?;
    let verifier = HttpVerifier::new(&config.verification)?;

    Ok(Rotator::new(
        Box::new(network),
        Box::new(verifier),
        Box::new(store),
        config,
    )?)
}
