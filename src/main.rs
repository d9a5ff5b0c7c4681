//! rowshard CLI entry point

use anyhow::{Context, Result};
use rowshard::config::cli::{Cli, ExecutionMode};
use rowshard::config::{self, validator, Config};
use rowshard::distributed::{spawn_local_workers, Coordinator, NodeService};
use rowshard::logging::init_logging;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{info, warn};

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);
    cli.validate()?;

    match cli.mode {
        ExecutionMode::Local => run_local(cli),
        ExecutionMode::Service => run_service(cli),
        ExecutionMode::Coordinator => run_coordinator(cli),
    }
}

/// Load and validate configuration before any worker is started or contacted
fn load_config(cli: &Cli) -> Result<Config> {
    let config = config::toml::build_config(cli).context("Configuration error")?;
    validator::validate_config(&config, cli.mode).context("Configuration validation failed")?;
    Ok(config)
}

/// Run coordinator and workers in this process
fn run_local(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let layout = config.layout(config.cluster.workers)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        let (streams, workers) = spawn_local_workers(&layout);
        let mut coordinator = Coordinator::handshake(layout, streams)
            .await
            .context("Failed to start local workers")?;

        let input = open_commands(&cli).await?;
        coordinator
            .run_session(input, &mut std::io::stdout(), config.output.format)
            .await?;

        for worker in workers {
            match worker.await {
                Ok(Ok(rank)) => info!(rank, "worker stopped"),
                Ok(Err(e)) => warn!("worker failed: {:#}", e),
                Err(e) => warn!("worker task panicked: {}", e),
            }
        }

        Ok(())
    })
}

/// Run one worker in service mode
fn run_service(cli: Cli) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        let service = NodeService::new(cli.listen_port).context("Failed to create node service")?;

        service.run().await
    })
}

/// Run the coordinator against workers in service mode
fn run_coordinator(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let addresses = config.host_addresses();

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        let mut coordinator = Coordinator::connect(config.matrix.rows, config.matrix.cols, &addresses)
            .await
            .context("Failed to connect to workers")?;

        let input = open_commands(&cli).await?;
        coordinator
            .run_session(input, &mut std::io::stdout(), config.output.format)
            .await
    })
}

/// Command source: the COMMANDS file when given, standard input otherwise
async fn open_commands(cli: &Cli) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match cli.commands {
        Some(ref path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open commands file: {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}
