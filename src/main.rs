use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use topic_push::{
    backend::BackendClient, endpoint, headless::HeadlessPlatform, ClientConfig, ClientError,
    ClientSnapshot, Os, PushLifecycle, RuntimeEnvironment, Topic, TopicMessage,
};

#[derive(Debug, Parser)]
#[command(name = "topic-push", version, about = "Topic push notification client")]
struct Cli {
    /// JSON config file; defaults apply when absent.
    #[arg(long, env = "PUSH_CONFIG")]
    config: Option<PathBuf>,

    /// Development tunnel host, e.g. `10.0.0.5:8081`.
    #[arg(long, env = "PUSH_TUNNEL_HOST")]
    tunnel_host: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Probe the backend's /health route.
    Health,
    /// Ask the backend to push a message to every subscriber of a topic.
    Send {
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        /// Extra payload entries as key=value, repeatable.
        #[arg(long = "data", value_parser = parse_key_value)]
        data: Vec<(String, String)>,
    },
    /// Run a full session on the headless platform. Stdin takes JSON event
    /// lines or the commands :subscribe, :unsubscribe, :test, :send.
    Run {
        #[arg(long, env = "PUSH_DEVICE_TOKEN")]
        token: Option<String>,
        #[arg(long, value_enum, default_value_t = OsArg::Android)]
        os: OsArg,
        /// Behave like an emulator: registration fails.
        #[arg(long)]
        simulator: bool,
        /// Decline the permission prompt.
        #[arg(long)]
        deny_permission: bool,
        /// Include the full device token in printed snapshots.
        #[arg(long)]
        show_token: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OsArg {
    Android,
    Ios,
    Other,
}

impl From<OsArg> for Os {
    fn from(value: OsArg) -> Self {
        match value {
            OsArg::Android => Os::Android,
            OsArg::Ios => Os::Ios,
            OsArg::Other => Os::Other,
        }
    }
}

fn parse_key_value(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{input}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("data key must not be empty".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ClientError> {
    let config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };

    match cli.command {
        Command::Health => {
            let backend = backend_for(&config, cli.tunnel_host)?;
            let message = backend.health().await?;
            println!("{message}");
            Ok(())
        }
        Command::Send {
            topic,
            title,
            body,
            data,
        } => {
            let backend = backend_for(&config, cli.tunnel_host)?;
            let message = TopicMessage {
                topic: topic.map(Topic::new).unwrap_or_else(|| config.default_topic()),
                title,
                body,
                data: data
                    .into_iter()
                    .map(|(key, value)| (key, Value::String(value)))
                    .collect::<Map<_, _>>(),
            };
            let id = backend.send_to_topic(&message).await?;
            println!("sent to '{}' id={}", message.topic, id.as_deref().unwrap_or("n/a"));
            Ok(())
        }
        Command::Run {
            token,
            os,
            simulator,
            deny_permission,
            show_token,
        } => {
            let os = Os::from(os);
            let mut env = RuntimeEnvironment::new(os, !simulator);
            env.tunnel_host = cli.tunnel_host;

            let mut platform = HeadlessPlatform::new(os)
                .with_permission(topic_push::PermissionStatus::Undetermined, !deny_permission);
            if let Some(token) = token {
                platform = platform.with_token(token);
            }
            run_session(config, env, Arc::new(platform), show_token).await
        }
    }
}

fn backend_for(
    config: &ClientConfig,
    tunnel_host: Option<String>,
) -> Result<BackendClient, ClientError> {
    let mut env = RuntimeEnvironment::new(Os::current(), true);
    env.tunnel_host = tunnel_host;
    let resolution = endpoint::resolve(config, &env);
    BackendClient::new(
        resolution.endpoint,
        config.request_timeout_secs.map(Duration::from_secs),
    )
}

async fn run_session(
    config: ClientConfig,
    env: RuntimeEnvironment,
    platform: Arc<HeadlessPlatform>,
    show_token: bool,
) -> Result<(), ClientError> {
    let lifecycle = Arc::new(PushLifecycle::new(config, env, platform.clone())?);

    let printer = {
        let lifecycle = lifecycle.clone();
        let mut changes = lifecycle.changes();
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                print_snapshot(lifecycle.snapshot(), show_token);
            }
        })
    };

    let phase = lifecycle.start().await;
    info!(?phase, endpoint = %lifecycle.endpoint(), "session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        let outcome = match line {
            ":subscribe" => lifecycle.subscribe(None).await.map(|_| ()),
            ":unsubscribe" => lifecycle.unsubscribe(None).await.map(|_| ()),
            ":test" => lifecycle.test_connection().await.map(|_| ()),
            ":send" => lifecycle.send_test_notification().await.map(|_| ()),
            _ => {
                if let Err(error) = platform.dispatch_line(line) {
                    warn!("{error}");
                }
                Ok(())
            }
        };
        // Failures are already surfaced as notices and telemetry.
        if let Err(error) = outcome {
            warn!("{error}");
        }
    }

    lifecycle.shutdown().await;
    printer.abort();
    print_snapshot(lifecycle.snapshot(), show_token);
    Ok(())
}

/// Prints the snapshot as one JSON line. The full token is dropped unless
/// `show_token` is set; `tokenPreview` is always present.
fn print_snapshot(snapshot: ClientSnapshot, show_token: bool) {
    match serde_json::to_string(&redact(snapshot, show_token)) {
        Ok(json) => println!("{json}"),
        Err(error) => warn!("failed to serialize snapshot: {error}"),
    }
}

fn redact(mut snapshot: ClientSnapshot, show_token: bool) -> ClientSnapshot {
    if !show_token {
        snapshot.token = None;
    }
    snapshot
}
