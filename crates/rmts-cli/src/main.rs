//! rmts CLI - component middleware over TCP
//!
//! # Configuration
//!
//! Configuration is loaded from multiple sources with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`RMTS_*`)
//! 3. Explicit config file (`--config`)
//! 4. Project config (`.rmts/config.toml` under `-C`, default current directory)
//! 5. Global config (`~/.rmts/config.toml`)
//! 6. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `RMTS_PROXY_BIND`: Listen address of `rmts serve`
//! - `RMTS_HEARTBEAT_MS`: Heartbeat period pushed to clients
//! - `RMTS_REQUEST_TIMEOUT_MS`: Reply timeout on both ends
//! - `RMTS_MAILBOX_SIZE`: Entries per clone mailbox
//! - `RUST_LOG`: Log filter when `--debug` is not given

mod demo;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rmts_core::{ComponentManager, ConfigLoader, RuntimeConfig};
use rmts_proxy::{ProxyClient, ProxyServer};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// rmts CLI - serve, discover and call robot components over TCP
#[derive(Parser, Debug)]
#[command(name = "rmts")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Project root directory (defaults to current directory)
    #[arg(short = 'C', long, global = true)]
    project: Option<PathBuf>,

    /// Config file applied over global and project config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Host the demo robot behind a proxy server
    Serve {
        /// Listen address (defaults to proxy.bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print the provided interfaces of remote components
    Discover {
        /// Server address (defaults to proxy.bind)
        #[arg(long)]
        addr: Option<String>,

        /// Component to describe (all components if omitted)
        component: Option<String>,
    },

    /// Execute one command on a remote component
    Call {
        /// Server address (defaults to proxy.bind)
        #[arg(long)]
        addr: Option<String>,

        #[arg(long)]
        component: String,

        #[arg(long)]
        interface: String,

        #[arg(long)]
        command: String,

        /// JSON argument for Write, QualifiedRead and WriteReturn commands
        #[arg(long, default_value = "")]
        payload: String,

        /// Name of the remote stand-in used for queued commands
        #[arg(long, default_value = "rmts-cli")]
        caller: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.debug, matches!(args.command, Command::Serve { .. }));

    let config = load_config(&args)?;
    debug!(bind = %config.proxy.bind, "Config loaded");

    match args.command {
        Command::Serve { bind } => serve(&config, bind.as_deref()),
        Command::Discover { addr, component } => {
            discover(&config, addr.as_deref(), component.as_deref())
        }
        Command::Call {
            addr,
            component,
            interface,
            command,
            payload,
            caller,
        } => call(
            &config,
            addr.as_deref(),
            &CallTarget {
                component: &component,
                interface: &interface,
                command: &command,
                caller: &caller,
            },
            &payload,
        ),
    }
}

fn init_tracing(debug: bool, serving: bool) {
    let fallback = if serving { "info" } else { "warn" };
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();
}

fn load_config(args: &Args) -> Result<RuntimeConfig> {
    let project_root = match &args.project {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("resolving current directory")?,
    };
    let mut loader = ConfigLoader::new().with_project_root(project_root);
    if let Some(file) = &args.config {
        loader = loader.with_file(file);
    }
    loader.load().map_err(|e| anyhow!("Config error: {e}"))
}

fn serve(config: &RuntimeConfig, bind: Option<&str>) -> Result<()> {
    serve_until(config, bind, shutdown_signal())
}

/// Hosts the demo robot until `shutdown` resolves, then stops the server
/// and every component.
fn serve_until(
    config: &RuntimeConfig,
    bind: Option<&str>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let manager = Arc::new(ComponentManager::with_config(config));
    manager.add_component(demo::robot(config.task.default_period())?)?;
    manager.start_all()?;

    let bind = bind.unwrap_or(config.proxy.bind.as_str());
    let server = ProxyServer::new(Arc::clone(&manager))
        .spawn(bind)
        .with_context(|| format!("binding {bind}"))?;
    info!(addr = %server.local_addr(), "Serving");
    println!(
        "rmts v{} serving '{}' on {}",
        env!("CARGO_PKG_VERSION"),
        demo::COMPONENT,
        server.local_addr()
    );

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?
        .block_on(shutdown);

    server.shutdown();
    manager.stop_all()?;
    info!("Stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}

fn open(config: &RuntimeConfig, addr: Option<&str>) -> Result<ProxyClient> {
    let addr = addr.unwrap_or(config.proxy.bind.as_str());
    let mut client =
        ProxyClient::connect(addr, &config.proxy).with_context(|| format!("connecting to {addr}"))?;
    let client_id = client.hello("rmts-cli")?;
    debug!(%client_id, addr, "Registered");
    Ok(client)
}

fn discover(config: &RuntimeConfig, addr: Option<&str>, component: Option<&str>) -> Result<()> {
    let mut client = open(config, addr)?;
    let components = match component {
        Some(name) => vec![name.to_string()],
        None => client.list_components()?,
    };

    let mut listing = serde_json::Map::new();
    for name in components {
        let interfaces = client.discover(&name)?;
        listing.insert(name, serde_json::to_value(interfaces)?);
    }
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

struct CallTarget<'a> {
    component: &'a str,
    interface: &'a str,
    command: &'a str,
    caller: &'a str,
}

fn call(
    config: &RuntimeConfig,
    addr: Option<&str>,
    target: &CallTarget<'_>,
    payload: &str,
) -> Result<()> {
    let mut client = open(config, addr)?;
    let interfaces = client.discover(target.component)?;
    let iface = interfaces
        .iter()
        .find(|i| i.interface_name == target.interface)
        .ok_or_else(|| {
            anyhow!(
                "component '{}' has no interface '{}'",
                target.component,
                target.interface
            )
        })?;
    let (kind, descriptor) = iface.find(target.command).ok_or_else(|| {
        anyhow!(
            "interface '{}' has no command '{}'",
            target.interface,
            target.command
        )
    })?;

    // Queueable kinds go through an end-user clone.
    if kind.is_queueable() {
        let end_user = client.remote_connect(
            target.caller,
            target.interface,
            target.component,
            target.interface,
        )?;
        debug!(%end_user, "Connected");
    }

    match client.execute(kind, descriptor.handle, payload)? {
        Some(value) => println!("{value}"),
        None => println!("ok"),
    }
    Ok(())
}
