use clap::{Parser, Subcommand, ValueEnum};
use glam::DVec3;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use voxstream_common::CHUNK_SIZE;
use voxstream_mesh::{CpuMeshBackend, MeshBackend};
use voxstream_render_wgpu::{WgpuMeshBackend, request_headless_device};
use voxstream_stream::{MAX_SCAN_RADIUS, StreamConfig, TerrainStreamer, footprint};
use voxstream_tools::TerrainInspector;
use voxstream_world::{HeightmapGenerator, TerrainParams};

#[derive(Parser)]
#[command(name = "voxstream-cli", about = "CLI tool for voxstream terrain streaming")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Stream config (JSON); defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions and the effective config
    Info,
    /// Print the chunk offsets one scan pass visits
    Scan {
        /// Scan radius in chunks; falls back to the config
        #[arg(short, long)]
        radius: Option<u32>,
    },
    /// Stream terrain headlessly while the viewer moves along +X
    Simulate {
        /// Number of frames to run
        #[arg(short, long, default_value = "600")]
        frames: u64,
        /// Viewer speed in world units per frame
        #[arg(short, long, default_value = "0.5")]
        speed: f64,
        /// Terrain seed
        #[arg(long, default_value = "42")]
        seed: u64,
        /// Where meshes are uploaded
        #[arg(short, long, value_enum, default_value = "cpu")]
        backend: Backend,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Cpu,
    Wgpu,
}

const FRAME: Duration = Duration::from_millis(16);

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = match &cli.config {
        Some(path) => StreamConfig::load(path)?,
        None => StreamConfig::default(),
    };

    match cli.command {
        Commands::Info => {
            println!("voxstream-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", voxstream_common::crate_info());
            println!("world: {}", voxstream_world::crate_info());
            println!("mesh: {}", voxstream_mesh::crate_info());
            println!("render-wgpu: {}", voxstream_render_wgpu::crate_info());
            println!("stream: {}", voxstream_stream::crate_info());
            println!("tools: {}", voxstream_tools::crate_info());
            println!("config: {}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Scan { radius } => {
            let radius = radius.unwrap_or(config.radius);
            anyhow::ensure!(
                (1..=MAX_SCAN_RADIUS).contains(&radius),
                "radius must be between 1 and {MAX_SCAN_RADIUS}"
            );
            let offsets = footprint(radius);
            println!("Scan footprint: radius={radius}, offsets={}", offsets.len());
            for row in offsets.chunks(8) {
                let line: Vec<String> = row
                    .iter()
                    .map(|(x, z)| format!("({x:>3},{z:>3})"))
                    .collect();
                println!("  {}", line.join(" "));
            }
        }
        Commands::Simulate {
            frames,
            speed,
            seed,
            backend,
        } => {
            let generator = Arc::new(HeightmapGenerator::new(TerrainParams {
                seed,
                ..TerrainParams::default()
            }));
            match backend {
                Backend::Cpu => {
                    simulate(CpuMeshBackend::new(), generator, &config, frames, speed)?
                }
                Backend::Wgpu => {
                    let gpu = request_headless_device()?;
                    println!("GPU adapter: {}", gpu.adapter_info.name);
                    let backend = WgpuMeshBackend::new(Arc::new(gpu.device));
                    simulate(backend, generator, &config, frames, speed)?;
                }
            }
        }
    }

    Ok(())
}

fn simulate<B: MeshBackend + 'static>(
    backend: B,
    generator: Arc<HeightmapGenerator>,
    config: &StreamConfig,
    frames: u64,
    speed: f64,
) -> anyhow::Result<()> {
    println!("Simulate: frames={frames}, speed={speed}, radius={}", config.radius);

    let mut streamer = TerrainStreamer::new(generator, backend, config)?;
    for frame in 0..frames {
        let viewpoint = DVec3::new(frame as f64 * speed, 0.0, 0.0);
        let stats = streamer.frame(viewpoint, FRAME);
        if frame % 120 == 0 {
            tracing::info!(
                frame,
                chunk_x = (viewpoint.x / CHUNK_SIZE as f64).floor(),
                resident = stats.resident_chunks,
                in_flight = stats.in_flight_chunks,
                blocks = stats.pool_blocks,
                "streaming"
            );
        }
    }

    if !streamer.registry().wait_idle(Duration::from_secs(10)) {
        tracing::warn!(
            in_flight = streamer.registry().in_flight_count(),
            "generation still in flight"
        );
    }

    let stats = streamer.stats();
    println!(
        "Frames: {} passes={} avg_frame={:?} max_frame={:?}",
        stats.frames,
        stats.scan_passes,
        streamer.timer().average(),
        streamer.timer().max()
    );
    println!("{}", TerrainInspector::summary(streamer.registry()));
    for bucket in TerrainInspector::bucket_report(streamer.terrain()) {
        println!("  {bucket}");
    }

    TerrainInspector::verify(streamer.registry())?;
    println!("Conservation: OK");
    Ok(())
}
