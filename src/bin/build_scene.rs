//! Scene builder binary: voxelizes the configured terrain and packs every
//! chunk octree into the arena, then prints a summary.
//!
//! Usage: cargo run --release --bin build_scene -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>      JSON builder config (defaults used when omitted)
//!   --backend <cpu|gpu>  Build device (default: gpu)
//!   --resolution <N>     Voxels per chunk edge, power of two
//!   --chunks <X,Y,Z>     Chunk grid dimensions
//!   --seed <SEED>        Terrain seed

use std::process::ExitCode;
use std::time::Instant;

use svo_builder::core::{BuilderConfig, Result};
use svo_builder::gpu::GpuBackend;
use svo_builder::scene::{ChunkBackend, CpuBackend, SceneBuilder, SceneStats};

fn main() -> ExitCode {
    svo_builder::core::logging::init();

    let args: Vec<String> = std::env::args().collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<()> {
    let mut config = match parse_str_arg(args, "--config") {
        Some(path) => BuilderConfig::load(path)?,
        None => BuilderConfig::default(),
    };
    if let Some(resolution) = parse_u32_arg(args, "--resolution") {
        config.chunk_voxel_dim = resolution;
    }
    if let Some(chunks) = parse_dims_arg(args, "--chunks") {
        config.chunk_dim = chunks;
    }
    if let Some(seed) = parse_u32_arg(args, "--seed") {
        config.terrain.seed = seed;
    }
    config.validate()?;

    let backend = parse_str_arg(args, "--backend").unwrap_or_else(|| "gpu".to_string());

    println!("=== SVO Scene Builder ===");
    println!("Backend:    {}", backend);
    println!("Chunks:     {:?} ({} total)", config.chunk_dim, config.chunk_count());
    println!("Resolution: {}^3 ({} levels)", config.chunk_voxel_dim, config.level_count());
    println!("Seed:       {}", config.terrain.seed);
    println!();

    match backend.as_str() {
        "cpu" => {
            let cpu = CpuBackend::with_terrain(&config)?;
            build(config, cpu)
        }
        "gpu" => {
            let gpu = GpuBackend::new(&config)?;
            build(config, gpu)
        }
        other => Err(svo_builder::core::Error::Config(format!(
            "unknown backend '{}', expected cpu or gpu",
            other
        ))),
    }
}

fn build<B: ChunkBackend>(config: BuilderConfig, backend: B) -> Result<()> {
    let mut builder = SceneBuilder::new(config, backend)?;

    let start = Instant::now();
    let stats = builder.build_scene()?;
    let elapsed = start.elapsed();

    print_summary(&stats);
    println!("Total time: {:.2}s", elapsed.as_secs_f64());
    Ok(())
}

fn print_summary(stats: &SceneStats) {
    println!();
    println!("=== Build Complete ===");
    println!(
        "Chunks:     {} non-empty / {}",
        stats.non_empty_chunks, stats.chunk_count
    );
    println!("Fragments:  {}", stats.total_fragments);
    println!(
        "Arena:      {:.2}MB / {:.2}MB ({:.1}%)",
        svo_builder::core::logging::mib(stats.arena.used_bytes),
        svo_builder::core::logging::mib(stats.arena.capacity),
        stats.arena.utilization() * 100.0
    );
    println!(
        "Chunk time: min {:.2}ms, max {:.2}ms, avg {:.2}ms",
        stats.timings.min().as_secs_f64() * 1000.0,
        stats.timings.max().as_secs_f64() * 1000.0,
        stats.timings.average().as_secs_f64() * 1000.0
    );
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

/// Parses `X,Y,Z`
fn parse_dims_arg(args: &[String], flag: &str) -> Option<[u32; 3]> {
    let value = parse_str_arg(args, flag)?;
    let parts: Vec<u32> = value.split(',').map(|s| s.trim().parse().ok()).collect::<Option<_>>()?;
    parts.try_into().ok()
}
