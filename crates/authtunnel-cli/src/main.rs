use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use authtunnel_browser::cdp::CdpDriver;
use authtunnel_core::config::ServerConfig;
use authtunnel_gateway::ServerState;
use authtunnel_verify::VerifyRequest;

#[derive(Parser)]
#[command(
    name = "authtunnel",
    about = "Gated remote-browser tunnel for manual authentication and session capture",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the tunnel server
    Serve {
        /// Port to listen on (default: 19191)
        #[arg(long)]
        port: Option<u16>,

        /// Bind host (default: 127.0.0.1)
        #[arg(long)]
        host: Option<String>,

        /// Access token (default: $AUTHTUNNEL_TOKEN, else random)
        #[arg(long)]
        token: Option<String>,

        /// Session artifact path (default: session.json)
        #[arg(long)]
        session_file: Option<String>,

        /// Browser executable path
        #[arg(long)]
        executable: Option<String>,

        /// Upstream proxy for the operator-driven browser
        #[arg(long)]
        proxy: Option<String>,
    },

    /// Check a captured session against a live page
    Verify {
        /// Session artifact path
        session_file: String,

        /// Target URL to open with the captured cookies
        url: String,

        /// String the rendered page must contain (case-insensitive)
        search: String,

        /// Browser executable path
        #[arg(long)]
        executable: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(Path::new(path))?,
        None => ServerConfig::default(),
    };

    match cli.command {
        Commands::Serve {
            port,
            host,
            token,
            session_file,
            executable,
            proxy,
        } => {
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(token) = token {
                config.access_token = Some(token);
            }
            if let Some(session_file) = session_file {
                config.session_file = session_file;
            }
            if let Some(executable) = executable {
                config.executable_path = Some(executable);
            }
            if let Some(proxy) = proxy {
                config.upstream_proxy = Some(proxy);
            }

            tracing::info!("Starting authtunnel server on port {}", config.port);
            let access_token = config.resolve_access_token();
            let state = Arc::new(ServerState::new(config, access_token, Arc::new(CdpDriver)));
            authtunnel_gateway::start_server(state).await?;
        }

        Commands::Verify {
            session_file,
            url,
            search,
            executable,
        } => {
            let request = VerifyRequest::new(session_file, url, search);
            let executable = executable.map(PathBuf::from).or_else(|| config.executable());

            match authtunnel_verify::verify_session(&CdpDriver, executable, &request).await {
                Ok(true) => println!("SUCCESS"),
                Ok(false) => {
                    println!("FAILURE");
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("{e}");
                    println!("FAILURE");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
