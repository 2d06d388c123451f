use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sixtun")]
#[command(about = "sixtun: tunnel gateway for constrained 6LoWPAN endpoints", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config.json.
    Init {
        /// Config file path (default: SIXTUN_CONFIG_PATH or ~/.sixtun/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the gateway: node-facing and remote-facing listeners plus the control endpoint.
    Gateway {
        /// Config file path (default: SIXTUN_CONFIG_PATH or ~/.sixtun/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Port constrained nodes send frames to (default from config or 9000)
        #[arg(long)]
        node_port: Option<u16>,

        /// Port remote replies arrive on (default from config or 9001)
        #[arg(long)]
        remote_port: Option<u16>,

        /// Fixed upstream peer, host:port (SIXTUN_UPSTREAM env still takes precedence). Without one, frames go to their own peer address.
        #[arg(long, value_name = "HOST:PORT")]
        upstream: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("sixtun {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway {
            config,
            node_port,
            remote_port,
            upstream,
        }) => {
            if let Err(e) = run_gateway(config, node_port, remote_port, upstream).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(sixtun::config::default_config_path);
    let dir = sixtun::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    node_port: Option<u16>,
    remote_port: Option<u16>,
    upstream: Option<String>,
) -> anyhow::Result<()> {
    let (mut config, path) = sixtun::config::load_config(config_path)?;
    if let Some(p) = node_port {
        config.gateway.node_port = p;
    }
    if let Some(p) = remote_port {
        config.gateway.remote_port = p;
    }
    if upstream.is_some() {
        config.gateway.upstream = upstream;
    }
    log::info!(
        "starting gateway on {} (node port {}, remote port {}, config {})",
        config.gateway.bind,
        config.gateway.node_port,
        config.gateway.remote_port,
        path.display()
    );
    sixtun::gateway::run_gateway(config).await
}
