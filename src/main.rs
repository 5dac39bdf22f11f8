use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dirshare::{AppState, Config};

#[derive(Parser, Debug)]
#[command(name = "dirshare")]
#[command(about = "Password-protected directory browser with on-demand zip archives")]
#[command(version)]
struct Cli {
    /// Directory to browse and archive
    #[arg(short, long, env = "DIRSHARE_SOURCE", default_value = ".")]
    source: PathBuf,

    /// Directory where archives are written and downloaded from
    #[arg(short, long, env = "DIRSHARE_TARGET", default_value = "archives")]
    target: PathBuf,

    /// Port to listen on
    #[arg(short, long, env = "DIRSHARE_PORT", default_value = "8080")]
    port: u16,

    /// Address to bind to
    #[arg(short, long, env = "DIRSHARE_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Config file path (optional)
    #[arg(short, long, env = "DIRSHARE_CONFIG")]
    config: Option<PathBuf>,

    /// Username to accept, replacing the configured credentials
    #[arg(short, long, env = "DIRSHARE_USERNAME", requires = "password")]
    username: Option<String>,

    /// Password for --username
    #[arg(long, env = "DIRSHARE_PASSWORD", requires = "username", hide_env_values = true)]
    password: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, env = "DIRSHARE_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "dirshare=debug,tower_http=debug"
    } else {
        "dirshare=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config from file if provided, otherwise use defaults
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    if let (Some(username), Some(password)) = (cli.username, cli.password) {
        config = config.with_credential(username, password);
    }
    config.validate()?;

    if config.uses_default_credentials() {
        warn!("Using the built-in default credentials; pass --username/--password or a config file");
    }

    let source_root = cli.source.canonicalize().map_err(|e| {
        format!("Source directory {} is not usable: {}", cli.source.display(), e)
    })?;

    if !source_root.is_dir() {
        return Err(format!("Source path is not a directory: {}", source_root.display()).into());
    }

    std::fs::create_dir_all(&cli.target).map_err(|e| {
        format!("Cannot create target directory {}: {}", cli.target.display(), e)
    })?;
    let target_root = cli.target.canonicalize()?;

    if target_root == source_root {
        return Err("Target directory must differ from the source directory".into());
    }
    if target_root.starts_with(&source_root) {
        warn!(
            "Target directory {} is inside the source; it is left out of every archive",
            target_root.display()
        );
    }

    info!("Browsing files from: {}", source_root.display());
    info!("Writing archives to: {}", target_root.display());

    let state = AppState::with_config(source_root, target_root, config);

    let app = dirshare::router(state).layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;
    info!("Starting dirshare on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
