//! SiNE command-line interface.
//!
//! Exit codes: 0 success, 1 usage or configuration error, 2 deploy failed
//! (topology rolled back), 3 external dependency unreachable.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sine_orchestrator::deploy::{self, DeployError};
use sine_orchestrator::model::Topology;
use sine_orchestrator::render;

#[derive(Parser, Debug)]
#[command(name = "sine", about = "Wireless network emulation over container-lab and tc", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy a topology: containers, bridge, and initial tc programs.
    Deploy {
        topology: PathBuf,
        /// Override the channel server URL from the topology settings.
        #[arg(long)]
        channel_url: Option<String>,
    },
    /// Tear down a deployed topology (idempotent).
    Destroy { topology: PathBuf },
    /// Run the reference free-space channel server in the foreground.
    ChannelServer {
        #[arg(long, default_value = "0.0.0.0:8081")]
        listen: SocketAddr,
    },
    /// Serve the mobility API against a deployed topology.
    MobilityServer {
        topology: PathBuf,
        #[arg(long)]
        listen: Option<SocketAddr>,
        #[arg(long)]
        channel_url: Option<String>,
    },
    /// Show nodes and positions of a running mobility server.
    Status {
        #[arg(long, default_value = "http://127.0.0.1:8001")]
        api_url: String,
    },
    /// Render the topology plan view as SVG.
    Render {
        topology: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to start runtime");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn exit_code_for(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<DeployError>() {
        Some(DeployError::Config(_)) => 1,
        Some(DeployError::Failed(_)) => 2,
        Some(DeployError::External(_)) => 3,
        None => 1,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Deploy {
            topology,
            channel_url,
        } => {
            let topo = load(&topology)?;
            let summary = deploy::deploy(topo, channel_url).await?;
            println!("{}", summary.render());
            Ok(())
        }
        Command::Destroy { topology } => {
            let topo = load(&topology)?;
            deploy::destroy(topo).await
        }
        Command::ChannelServer { listen } => sine_channel::server::serve(listen).await,
        Command::MobilityServer {
            topology,
            listen,
            channel_url,
        } => {
            let topo = load(&topology)?;
            deploy::mobility_server(topo, listen, channel_url).await
        }
        Command::Status { api_url } => {
            let table = deploy::status(&api_url)
                .await
                .map_err(|e| DeployError::External(e.to_string()))?;
            println!("{table}");
            Ok(())
        }
        Command::Render { topology, output } => {
            let topo = load(&topology)?;
            std::fs::write(&output, render::render_svg(&topo))?;
            tracing::info!(output = %output.display(), "plan view written");
            Ok(())
        }
    }
}

fn load(path: &Path) -> Result<Topology, DeployError> {
    Ok(Topology::load(path)?)
}
