//! Client CLI for airlock.

mod api_client;
mod uploader;

use airlock_core::DEFAULT_CHUNK_SIZE;
use anyhow::Result;
use api_client::ApiClient;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use uploader::UploadOptions;

#[derive(Parser)]
#[command(name = "airlockctl")]
#[command(about = "Upload airgap bundles to an airlock server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ApiArgs {
    /// Server API URL
    #[arg(long, env = "AIRLOCK_SERVER", default_value = "http://127.0.0.1:3030")]
    server: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a bundle in resumable chunks and trigger processing
    Push {
        /// Path to the bundle archive (gzip+tar)
        file: PathBuf,
        /// Bundle id (defaults to the file stem)
        #[arg(long)]
        id: Option<String>,
        /// Chunk size in bytes (clamped to the server's maximum)
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Show a bundle's session state
    Status {
        /// Bundle id
        id: String,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Check server health
    Health {
        #[command(flatten)]
        api: ApiArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Push {
            file,
            id,
            chunk_size,
            api,
        } => push(file, id, chunk_size, &api).await,
        Commands::Status { id, api } => status(&id, &api).await,
        Commands::Health { api } => health(&api).await,
    }
}

async fn push(file: PathBuf, id: Option<String>, chunk_size: u64, api: &ApiArgs) -> Result<()> {
    let bundle_id = match id {
        Some(id) => id,
        None => file
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.replace('.', "-"))
            .ok_or_else(|| anyhow::anyhow!("cannot derive a bundle id from the file name"))?,
    };

    let client = ApiClient::new(&api.server)?;
    let capabilities = client.get_capabilities().await?;
    let options = UploadOptions {
        chunk_size: chunk_size.min(capabilities.max_chunk_size),
        max_parallel: capabilities.max_parallel_chunks as usize,
    };

    let report = uploader::push_bundle(&client, &bundle_id, &file, &options).await?;
    println!(
        "pushed {} ({} of {} chunks transferred)",
        bundle_id, report.uploaded_chunks, report.total_chunks
    );
    if report.process.already_processed {
        println!("bundle was already processed ({} images)", report.process.image_count);
    } else {
        println!("processed: {} images resolved", report.process.image_count);
    }
    Ok(())
}

async fn status(id: &str, api: &ApiArgs) -> Result<()> {
    let client = ApiClient::new(&api.server)?;
    let bundle = client.get_bundle(id).await?;
    println!("state: {:?}", bundle.state);
    println!("received chunks: {}", bundle.received_chunks);
    Ok(())
}

async fn health(api: &ApiArgs) -> Result<()> {
    let client = ApiClient::new(&api.server)?;
    client.ping().await?;
    println!("server is healthy");
    Ok(())
}
