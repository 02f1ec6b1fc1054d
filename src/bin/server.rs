//! scenelink server binary.
//!
//! Hosts the demo scene headlessly behind the command endpoint: resolves
//! configuration, starts the listener when auto-start is on, and hands the
//! main thread to the keep-alive loop until a shutdown command or signal
//! arrives. The `clap` crate is used to parse arguments.

use scenelink::{Config, DemoHost, Endpoint};

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> scenelink::Result<()> {
    let cli = Cli::parse();

    // Defaults, then the persisted document, then the environment. Flags
    // win over all three.
    let mut config = Config::load();
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.start_now {
        config.auto_start = true;
    }

    set_up_logging(&config)?;

    let mut host = DemoHost::new();
    let mut endpoint = Endpoint::new(config)?;
    endpoint.install_signal_watcher();

    if endpoint.config().auto_start {
        endpoint.start()?;
    } else {
        info!("auto-start disabled; endpoint idle until started");
    }

    // This call owns the main thread until the process is asked to exit.
    let reason = endpoint.run(&mut host);
    info!(?reason, "endpoint exited");

    Ok(())
}

#[derive(Parser, Debug)]
#[clap(
    name = "scenelink-server",
    version,
    author,
    about = "Host-side command endpoint over the demo scene"
)]
struct Cli {
    /// Listen on this port instead of the configured one.
    #[clap(long)]
    port: Option<u16>,

    /// Start listening immediately, regardless of configuration.
    #[clap(long)]
    start_now: bool,
}

fn set_up_logging(config: &Config) -> scenelink::Result<()> {
    // `RUST_LOG` wins; the configured level is the fallback.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).try_init()?;
    Ok(())
}
