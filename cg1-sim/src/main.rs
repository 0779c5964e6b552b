// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! cg1-sim: replays a MetaStream trace through the CG1 behavior model and
//! writes the resolved frames as PNG files.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use cg1_gpu::metastream::TraceReader;
use cg1_gpu::{Cg1BehaviorModel, GpuBehaviorModel, PngFrameSink};

#[derive(Parser, Debug)]
#[command(name = "cg1-sim", about = "CG1 GPU behavior model")]
struct Args {
    /// MetaStream trace file to replay
    #[arg(long)]
    trace: PathBuf,

    /// Simulator INI configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for frames, dumps and snapshots
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// First frame to render; earlier frames only update state
    #[arg(long)]
    start_frame: Option<u32>,

    /// Number of frames to render (0 runs to the end of the trace)
    #[arg(long)]
    frames: Option<u32>,

    /// Process draw calls as no-ops
    #[arg(long)]
    skip_batches: bool,

    /// Record per-draw validation logs
    #[arg(long)]
    validation: bool,

    /// Save a snapshot into the output directory when the run ends
    #[arg(long)]
    snapshot_save: bool,

    /// Restore the snapshot in the output directory before the run
    #[arg(long)]
    snapshot_load: bool,

    /// Trace every vertex and fragment of this batch
    #[arg(long, value_name = "N")]
    trace_batch: Option<u32>,

    /// Trace this vertex index
    #[arg(long, value_name = "N")]
    trace_vertex: Option<u32>,

    /// Trace fragments at this pixel
    #[arg(long, value_name = "X,Y", value_parser = parse_pixel)]
    trace_pixel: Option<(i32, i32)>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_pixel(s: &str) -> std::result::Result<(i32, i32), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got {:?}", s))?;
    let x = x.trim().parse().map_err(|e| format!("bad x: {}", e))?;
    let y = y.trim().parse().map_err(|e| format!("bad y: {}", e))?;
    Ok((x, y))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("cg1-sim v{}", env!("CARGO_PKG_VERSION"));

    let mut sim_config = config::load_config(args.config.as_deref());
    if let Some(start) = args.start_frame {
        sim_config.sim.start_frame = start;
    }
    if let Some(frames) = args.frames {
        sim_config.sim.simulated_frames = frames;
    }
    sim_config.sim.skip_batches |= args.skip_batches;
    sim_config.sim.validation |= args.validation;

    std::fs::create_dir_all(&args.output_dir).with_context(|| {
        format!("Failed to create output directory {}", args.output_dir.display())
    })?;

    let mut model = Cg1BehaviorModel::new(&sim_config, PngFrameSink::new(&args.output_dir));
    {
        let gpu = model.gpu_mut();
        gpu.set_dump_dir(&args.output_dir);
        gpu.set_validation_mode(sim_config.sim.validation);
        if let Some(batch) = args.trace_batch {
            gpu.set_batch_trace_log(true, batch);
        }
        if let Some(index) = args.trace_vertex {
            gpu.set_vertex_trace_log(true, index);
        }
        if let Some((x, y)) = args.trace_pixel {
            gpu.set_pixel_trace_log(true, x, y);
        }
    }

    if args.snapshot_load {
        model
            .load_snapshot(&args.output_dir)
            .context("Failed to load snapshot")?;
    }

    let mut reader = TraceReader::open(&args.trace)
        .with_context(|| format!("Failed to open trace {}", args.trace.display()))?;
    let summary = model.run_loop(&mut reader).context("Simulation failed")?;

    info!(
        "Simulation finished: {} transactions, {} frames, {} triangles{}",
        summary.transactions,
        summary.frames,
        summary.triangles,
        if summary.aborted { " (aborted)" } else { "" }
    );
    let stats = summary.stats;
    info!(
        "Pipeline: {} vertices shaded, {} triangles culled, {} stamps, {} fragments shaded, {} shader instructions, {} texture requests",
        stats.vertices_shaded,
        stats.triangles_culled,
        stats.stamps,
        stats.fragments_shaded,
        stats.shader_instructions,
        stats.texture_requests
    );

    if args.snapshot_save {
        model
            .save_snapshot(&args.output_dir)
            .context("Failed to save snapshot")?;
    }

    Ok(())
}
