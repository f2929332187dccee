//! `rusty-archival` command-line entry point.
//!
//! Each invocation builds one storage task and runs it to completion. The
//! exit code is non-zero when the task fails.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rusty_archival_common::TaskLogger;
use rusty_archival_engine::{
    EngineConfig, RemotePath, StorageAction, StorageEngine, StorageTask, SystemSpaceProbe,
};
use rusty_archival_storage::AwsCredentials;
use rusty_archival_storage_crt::CrtStorageClient;

#[derive(Parser, Debug)]
#[command(
    name = "rusty-archival",
    version,
    about = "Bag, archive and transfer directories to S3-compatible object storage"
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file
    #[arg(short = 'C', long, global = true)]
    config: Option<PathBuf>,

    /// Access key id
    #[arg(short = 'A', long, env = "AWS_ACCESS_KEY_ID", global = true)]
    access_key: Option<String>,

    /// Secret access key
    #[arg(
        short = 'S',
        long,
        env = "AWS_SECRET_ACCESS_KEY",
        hide_env_values = true,
        global = true
    )]
    secret_key: Option<String>,

    /// Endpoint URL of an S3-compatible service
    #[arg(short = 'E', long, env = "RUSTY_ARCHIVAL_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Region
    #[arg(short = 'R', long, env = "AWS_REGION", global = true)]
    region: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file, or a directory as a bagged archive
    Upload {
        local: PathBuf,
        bucket: String,
        /// Key, or prefix ending in `/`; defaults to the bucket root
        key: Option<String>,
    },
    /// Download an object, or every object under a prefix ending in `/`
    Download {
        bucket: String,
        key: String,
        local: PathBuf,
    },
    /// Delete an object, or every object under a prefix ending in `/`
    Delete { bucket: String, key: String },
    /// List buckets, or the objects under a bucket and prefix
    List {
        bucket: Option<String>,
        prefix: Option<String>,
    },
    /// Run a storage task described in a JSON file
    Run { task: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli: Cli = Cli::parse();
    init_logging(cli.verbose);

    let config: EngineConfig = load_config(&cli)?;
    let logger: TaskLogger = TaskLogger::new("rusty-archival");
    let client: CrtStorageClient = CrtStorageClient::new(config.storage.clone())
        .await
        .context("failed to create storage client")?;
    let engine: StorageEngine<CrtStorageClient, SystemSpaceProbe> =
        StorageEngine::new(client, SystemSpaceProbe::new(), config, &logger)?;

    if let Command::List { bucket, prefix } = &cli.cmd {
        let remote: Option<RemotePath> = bucket
            .as_ref()
            .map(|b| RemotePath::new(b.as_str(), prefix.clone().unwrap_or_default()));
        for entry in engine.list(remote.as_ref()).await? {
            println!("{}", entry);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let task: StorageTask = build_task(&cli.cmd)?;
    if engine.run(&task).await {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn init_logging(verbose: bool) {
    let filter: EnvFilter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Config file, then environment and flags on top.
fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config: EngineConfig = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    if let Some(region) = &cli.region {
        config.storage.region = region.clone();
    }
    if let Some(endpoint) = &cli.endpoint {
        config.storage.endpoint_url = Some(endpoint.clone());
    }
    match (&cli.access_key, &cli.secret_key) {
        (Some(access_key_id), Some(secret_access_key)) => {
            config.storage.credentials = Some(AwsCredentials {
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                session_token: None,
            });
        }
        (None, None) => {}
        _ => bail!("access key and secret key must be given together"),
    }

    tracing::debug!(region = %config.storage.region, endpoint = ?config.storage.endpoint_url, "configuration loaded");
    Ok(config)
}

fn build_task(cmd: &Command) -> anyhow::Result<StorageTask> {
    let task: StorageTask = match cmd {
        Command::Upload { local, bucket, key } => StorageTask::new(
            "cli",
            "upload",
            StorageAction::Upload,
            Some(local.clone()),
            Some(&remote_string(bucket, key.as_deref().unwrap_or(""))),
        )?,
        Command::Download { bucket, key, local } => StorageTask::new(
            "cli",
            "download",
            StorageAction::Download,
            Some(local.clone()),
            Some(&remote_string(bucket, key)),
        )?,
        Command::Delete { bucket, key } => StorageTask::new(
            "cli",
            "delete",
            StorageAction::Delete,
            None,
            Some(&remote_string(bucket, key)),
        )?,
        Command::List { bucket, prefix } => StorageTask::new(
            "cli",
            "list",
            StorageAction::List,
            None,
            bucket
                .as_deref()
                .map(|b| remote_string(b, prefix.as_deref().unwrap_or("")))
                .as_deref(),
        )?,
        Command::Run { task } => read_task(task)?,
    };
    Ok(task)
}

fn read_task(path: &Path) -> anyhow::Result<StorageTask> {
    let json: String = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read task file {}", path.display()))?;
    Ok(StorageTask::from_json(&json)?)
}

fn remote_string(bucket: &str, key: &str) -> String {
    format!("s3://{}/{}", bucket, key.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_upload() {
        let cli: Cli = Cli::try_parse_from([
            "rusty-archival",
            "-v",
            "upload",
            "/data/run-1",
            "archive",
            "runs/",
        ])
        .unwrap();
        assert!(cli.verbose);

        let task: StorageTask = build_task(&cli.cmd).unwrap();
        assert_eq!(task.action, StorageAction::Upload);
        assert_eq!(task.remote_path, Some(RemotePath::new("archive", "runs/")));
    }

    #[test]
    fn test_build_list_without_bucket() {
        let task: StorageTask = build_task(&Command::List {
            bucket: None,
            prefix: None,
        })
        .unwrap();
        assert!(task.remote_path.is_none());
    }

    #[test]
    fn test_mismatched_credentials_rejected() {
        let cli: Cli = Cli::try_parse_from([
            "rusty-archival",
            "-A",
            "AKIDEXAMPLE",
            "delete",
            "archive",
            "x",
        ])
        .unwrap();
        if cli.secret_key.is_none() {
            assert!(load_config(&cli).is_err());
        }
    }
}
