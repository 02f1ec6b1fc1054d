//! scenelink client CLI.
//!
//! Issues one command per invocation against a running endpoint and
//! prints the result.

use scenelink::{Client, DEFAULT_PORT};

use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser, Debug)]
#[clap(
    name = "scenelink-cli",
    version,
    author,
    about = "Issue commands to a running endpoint"
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    #[clap(name = "hostname", long, default_value = "127.0.0.1")]
    host: String,

    #[clap(long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize the open scene.
    SceneInfo,
    /// Inspect one object by name.
    ObjectInfo {
        /// Exact object name.
        name: String,
    },
    /// Execute a source fragment and print its captured output.
    Exec {
        /// The fragment to run.
        code: String,
    },
    /// Capture the viewport.
    Screenshot {
        /// Write the image here instead of returning it inline.
        filepath: Option<String>,

        /// Bound on the larger image edge.
        #[clap(long)]
        max_size: Option<u32>,

        /// Image format, png by default.
        #[clap(long)]
        format: Option<String>,
    },
    /// Ask the host process to shut down.
    Shutdown,
}

/// A current-thread runtime is plenty for a one-shot CLI call and avoids
/// spawning background threads.
#[tokio::main(flavor = "current_thread")]
async fn main() -> scenelink::Result<()> {
    tracing_subscriber::fmt::try_init()?;

    let cli = Cli::parse();
    let client = Client::new(format!("{}:{}", cli.host, cli.port));

    match cli.command {
        Command::SceneInfo => print_value(&client.scene_info().await?),
        Command::ObjectInfo { name } => print_value(&client.object_info(&name).await?),
        Command::Exec { code } => {
            let result = client.execute_code(&code).await?;
            // The captured output already carries its trailing newline.
            match result.get("result").and_then(Value::as_str) {
                Some(output) => print!("{}", output),
                None => print_value(&result),
            }
        }
        Command::Screenshot {
            filepath,
            max_size,
            format,
        } => {
            let result = client
                .screenshot(max_size, filepath.as_deref(), format.as_deref())
                .await?;
            print_value(&result);
        }
        Command::Shutdown => print_value(&client.shutdown().await?),
    }

    Ok(())
}

fn print_value(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(pretty) => println!("{}", pretty),
        Err(_) => println!("{}", value),
    }
}
