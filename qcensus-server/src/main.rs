use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use qcensus_config::{Config, ConfigLoad, ConfigLoader};
use qcensus_server::{
    InvocationEvent, Invoker, create_router,
    telemetry::{init_tracing, log_config_warnings},
};
use std::{net::SocketAddr, path::PathBuf, process::ExitCode, sync::Arc};
use tracing::info;

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "qcensus", version)]
#[command(
    about = "Discover queues across tenant vhosts and report them to a sink"
)]
struct Cli {
    /// Path to a qcensus.toml configuration file
    #[arg(long, global = true, env = "QCENSUS_CONFIG")]
    config: Option<PathBuf>,

    /// Path to a .env file (defaults to ./.env)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run once and print the invocation response (default)
    Run(RunArgs),
    /// Serve invocations over HTTP
    Serve(ServeArgs),
    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[derive(ClapArgs, Debug, Clone, Default)]
struct RunArgs {
    /// Invocation event JSON, e.g. '[{"debug_sleep": 3}]'
    #[arg(long)]
    event: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "QCENSUS_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind
    #[arg(short, long, env = "QCENSUS_PORT", default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run_once(&config, args).await,
        Command::Serve(args) => serve(&config, args).await,
        Command::CheckConfig => {
            println!(
                "configuration ok: broker {}:{}, core vhost {}, template {}",
                config.broker.host,
                config.broker.port,
                config.vhosts.core,
                config.vhosts.template.as_str(),
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path);
    }

    let ConfigLoad { config, warnings } =
        loader.load().context("failed to load configuration")?;

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "loaded configuration file");
    }
    log_config_warnings(&warnings);

    Ok(config)
}

async fn run_once(config: &Config, args: RunArgs) -> anyhow::Result<ExitCode> {
    let event = args
        .event
        .as_deref()
        .map(serde_json::from_str::<InvocationEvent>)
        .transpose()
        .context("invalid --event JSON")?;

    let invoker = Invoker::from_config(config)?;
    let response = invoker.invoke(event.as_ref()).await;

    println!(
        "{}",
        serde_json::to_string(&response)
            .context("failed to encode invocation response")?
    );

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn serve(config: &Config, args: ServeArgs) -> anyhow::Result<ExitCode> {
    let invoker = Arc::new(Invoker::from_config(config)?);
    let router = create_router(invoker);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| {
            format!("invalid listen address {}:{}", args.host, args.port)
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Starting qcensus invoke endpoint on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
