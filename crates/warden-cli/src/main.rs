//! Warden CLI - security-first execution host for autonomous agents.

mod adapters;
mod host;

use anyhow::Result;
use clap::Parser;

use warden_core::HostConfig;
use warden_sandbox::BackendKind;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Warden - sandboxed execution host for LLM agents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start the host: gateway, dispatcher, scheduler, credential proxy
    Start {
        /// Gateway unix socket path (default: <home>/data/gateway.sock)
        #[arg(long)]
        socket: Option<std::path::PathBuf>,

        /// Serve on loopback TCP instead (requires --bearer-token)
        #[arg(long)]
        port: Option<u16>,

        /// Bearer token for TCP mode
        #[arg(long, env = "WARDEN_GATEWAY_TOKEN")]
        bearer_token: Option<String>,

        /// Agent identity directory name
        #[arg(long, default_value = "main")]
        agent: String,

        /// Command run inside each sandbox (program plus args)
        #[arg(long = "agent-cmd", num_args = 1.., default_values_t = [String::from("warden-agent")])]
        agent_command: Vec<String>,

        /// Force a sandbox backend instead of probing
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
    },
    /// Validate configuration and probe the sandbox backend
    Check,
    /// Show host status
    Status,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum BackendArg {
    Namespace,
    Seatbelt,
    Container,
    Subprocess,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Namespace => BackendKind::Namespace,
            BackendArg::Seatbelt => BackendKind::Seatbelt,
            BackendArg::Container => BackendKind::Container,
            BackendArg::Subprocess => BackendKind::Subprocess,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warden=info".into()),
        )
        .init();

    let config = HostConfig::from_env()?;

    match cli.command {
        Some(Commands::Start {
            socket,
            port,
            bearer_token,
            agent,
            agent_command,
            backend,
        }) => {
            host::run(
                config,
                host::StartOptions {
                    socket,
                    port,
                    bearer_token,
                    agent,
                    agent_command,
                    backend: backend.map(BackendKind::from),
                },
            )
            .await
        }
        Some(Commands::Check) => host::check(&config),
        Some(Commands::Status) => {
            let layout = config.layout();
            let gateway_socket = layout.data_dir().join("gateway.sock");
            let proxy_socket = layout.data_dir().join("proxy.sock");
            println!(
                "gateway: {}",
                if gateway_socket.exists() { "listening" } else { "down" }
            );
            println!(
                "proxy:   {}",
                if proxy_socket.exists() { "listening" } else { "down" }
            );
            Ok(())
        }
        None => {
            println!("warden {} - use --help for commands", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
