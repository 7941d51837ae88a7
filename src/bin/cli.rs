//! pathstore CLI
//!
//! Command-line interface for inspecting and editing a store.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use pathstore::provider::{Provider, SledOptions, SledProvider};
use pathstore::Value;

/// pathstore CLI
#[derive(Parser, Debug)]
#[command(name = "pathstore-cli")]
#[command(about = "CLI for the pathstore document store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./pathstore_data")]
    data_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read the value at a path
    Get {
        /// The path to read
        path: String,
    },

    /// Store a value at a path
    Set {
        /// The path to write
        path: String,

        /// The value, parsed as JSON; non-JSON input stores as a string
        value: String,
    },

    /// Remove a path and everything under it
    Del {
        /// The path to remove
        path: String,
    },

    /// Check whether a path exists
    Has {
        /// The path to check
        path: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,pathstore=info"));

    fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();

    let provider = SledProvider::new(SledOptions {
        root: args.data_dir.clone().into(),
        path: Some("sled".into()),
        fail_if_missing: false,
    });
    if let Err(e) = provider.init().await {
        tracing::error!("failed to open store: {}", e);
        std::process::exit(1);
    }

    let outcome = run(&provider, args.command).await;

    if let Err(e) = provider.flush().await {
        tracing::error!("failed to flush store: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = outcome {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(provider: &SledProvider, command: Commands) -> pathstore::Result<()> {
    match command {
        Commands::Get { path } => {
            match provider.read(&path).await? {
                Some(value) => println!("{}", value),
                None => println!("(not set)"),
            }
        }
        Commands::Set { path, value } => {
            let value = serde_json::from_str::<serde_json::Value>(&value)
                .map(Value::from)
                .unwrap_or(Value::String(value));
            provider.store(&path, &value).await?;
            println!("ok");
        }
        Commands::Del { path } => {
            let removed = provider.remove(&path).await?;
            println!("{}", if removed { "removed" } else { "(not set)" });
        }
        Commands::Has { path } => {
            println!("{}", provider.has(&path).await?);
        }
    }
    Ok(())
}
