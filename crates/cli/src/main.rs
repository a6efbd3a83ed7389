use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shuttle_core::{
    create_notifier, load_config, validate_config, ConfigError, ErrorKind, Notifier,
    NotifyError, OrchestratorError, RunLock, RunOutcome, SanitizedConfig, SftpTransferClient,
    SqliteSubmissionStore, Stage, StageRunner, StageRunnerConfig, StoreError, SubmissionStore,
    TransferClient,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE: &str = "usage: shuttle <upload|publish>\n       shuttle status <submission>";

/// What a single invocation does.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    /// Advance at most one submission through a stage.
    Run(Stage),
    /// Print a stored submission as JSON.
    Status(String),
}

impl Command {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
        let command = match (args.next().as_deref(), args.next()) {
            (Some("status"), Some(name)) => Command::Status(name),
            (Some("status"), None) => return Err("status requires a submission name".into()),
            (Some(stage), None) => Command::Run(stage.parse()?),
            (Some(other), Some(_)) => return Err(format!("unexpected arguments after {}", other)),
            (None, _) => return Err("missing command".into()),
        };
        match args.next() {
            Some(extra) => Err(format!("unexpected argument: {}", extra)),
            None => Ok(command),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let command = match Command::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{}\n{}", message, USAGE);
            return ExitCode::from(ErrorKind::Config.exit_code());
        }
    };

    match run(command).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

/// Maps a failed invocation to its process exit code.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<OrchestratorError>() {
        e.exit_code()
    } else if err.downcast_ref::<ConfigError>().is_some()
        || err.downcast_ref::<NotifyError>().is_some()
    {
        ErrorKind::Config.exit_code()
    } else if err.downcast_ref::<StoreError>().is_some() {
        ErrorKind::Store.exit_code()
    } else {
        ErrorKind::Internal.exit_code()
    }
}

async fn run(command: Command) -> Result<u8> {
    // Determine config path
    let config_path = std::env::var("SHUTTLE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("shuttle.toml"));

    // Load configuration
    info!(version = VERSION, "Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = SanitizedConfig::from(&config);
    info!(
        config = %serde_json::to_string(&sanitized).unwrap_or_default(),
        "Configuration loaded successfully"
    );

    let store = Arc::new(
        SqliteSubmissionStore::new(&config.database.path)
            .context("Failed to open submission store")?,
    );
    info!("Submission store initialized at {:?}", config.database.path);

    let stage = match command {
        Command::Status(name) => {
            let submission = store
                .get(&name)?
                .ok_or_else(|| StoreError::NotFound(name.clone()))?;
            println!("{}", serde_json::to_string_pretty(&submission)?);
            return Ok(0);
        }
        Command::Run(stage) => stage,
    };

    let client: Arc<dyn TransferClient> = Arc::new(SftpTransferClient::from_config(&config.sftp));
    info!("Using transfer client: {}", client.describe());

    let notifier: Arc<dyn Notifier> = Arc::from(
        create_notifier(&config.notifier).context("Failed to create notifier")?,
    );
    info!("Using notifier: {}", notifier.name());

    let lock = RunLock::new(&config.paths.lock_dir)
        .with_stale_detection(config.lock.stale_detection);

    let runner = StageRunner::new(
        stage,
        StageRunnerConfig::from_config(&config),
        lock,
        store,
        client,
        notifier,
    );

    let outcome = runner.run().await?;
    match &outcome {
        RunOutcome::Advanced {
            submission,
            from,
            to,
            files,
        } => info!(
            stage = %stage,
            submission = %submission,
            files = files,
            "Advanced {} -> {}",
            from,
            to
        ),
        RunOutcome::NothingToDo => info!(stage = %stage, "Nothing to do"),
        RunOutcome::LockContention { path, owner_pid } => warn!(
            stage = %stage,
            owner_pid = ?owner_pid,
            "Another run holds {:?}, exiting",
            path
        ),
    }

    Ok(outcome.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command, String> {
        Command::parse(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn test_parse_stages() {
        assert_eq!(parse(&["upload"]).unwrap(), Command::Run(Stage::Upload));
        assert_eq!(parse(&["publish"]).unwrap(), Command::Run(Stage::Publish));
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(
            parse(&["status", "S1"]).unwrap(),
            Command::Status("S1".to_string())
        );
        assert!(parse(&["status"]).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["download"]).is_err());
        assert!(parse(&["upload", "extra"]).is_err());
        assert!(parse(&["status", "S1", "extra"]).is_err());
    }

    #[test]
    fn test_exit_code_mapping() {
        let config = anyhow::Error::new(ConfigError::ValidationError("x".into()))
            .context("Configuration validation failed");
        assert_eq!(exit_code_for(&config), 2);

        let store = anyhow::Error::new(StoreError::NotFound("S1".into()));
        assert_eq!(exit_code_for(&store), 8);

        let internal = anyhow::anyhow!("boom");
        assert_eq!(exit_code_for(&internal), 1);
    }
}
