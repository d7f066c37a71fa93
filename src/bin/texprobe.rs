//! Texture probe - load a file through mipforge and print what the GPU got

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mipforge::format::ColorSpace;
use mipforge::gpu::list_gpus;
use mipforge::{DeviceConfig, LoaderConfig, TextureClient, TextureOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "texprobe")]
#[command(version)]
#[command(about = "Load textures through mipforge and report the result")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// GPU adapter index (see `texprobe gpus`)
    #[arg(long, global = true, env = "MIPFORGE_GPU")]
    gpu: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available GPUs
    Gpus,

    /// Load a texture file and print its GPU metadata
    Load {
        /// Path or URL of the texture
        path: PathBuf,

        /// Skip mip generation
        #[arg(long)]
        no_mipmaps: bool,

        /// Treat color data as sRGB
        #[arg(long)]
        srgb: bool,

        /// Override the detected MIME type
        #[arg(long)]
        mime: Option<String>,

        /// Maximum transcoding workers
        #[arg(short, long)]
        workers: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only initialize logging if verbose or RUST_LOG is set
    if cli.verbose || std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(if cli.verbose { "mipforge=debug".parse()? } else { "mipforge=warn".parse()? }),
            )
            .init();
    }

    let device_config = DeviceConfig {
        gpu_index: cli.gpu,
        ..DeviceConfig::default()
    };

    match cli.command {
        Commands::Gpus => {
            let gpus = list_gpus(device_config.backends);
            if gpus.is_empty() {
                println!("No GPUs found");
            }
            for gpu in &gpus {
                println!("[{}] {}", gpu.adapter_index, gpu);
            }
        }

        Commands::Load {
            path,
            no_mipmaps,
            srgb,
            mime,
            workers,
        } => {
            let mut config = LoaderConfig::default();
            if let Some(workers) = workers {
                config = config.with_max_workers(workers);
            }

            let client = TextureClient::with_wgpu(&device_config, config)
                .context("Failed to create texture client")?;
            println!("GPU: {}", client.device().info());

            let mut options = TextureOptions::default();
            if no_mipmaps {
                options = options.without_mipmaps();
            }
            if srgb {
                options = options.with_color_space(ColorSpace::Srgb);
            }
            if let Some(mime) = mime {
                options = options.with_mime_type(mime);
            }

            let source = path.to_string_lossy();
            let texture = client
                .from_url(&source, &options)
                .await
                .with_context(|| format!("Failed to load {}", source))?;

            println!("=== Texture ===");
            println!("Format:     {}", texture.format);
            println!("Size:       {}x{}", texture.width, texture.height);
            println!("Layers:     {}", texture.depth);
            println!("Mip levels: {}", texture.mip_level_count);
            println!(
                "Pipelines:  {}",
                client.mipmap_generator().cached_pipelines()
            );

            client.destroy();
        }
    }

    Ok(())
}
