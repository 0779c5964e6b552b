// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Behavior model driver loop.
//!
//! Pulls transactions from a [`TraceSource`] into [`GpuTop`] until the
//! trace ends, the configured frame range is done, or the run is aborted.
//! Resolved frames go to a [`FrameSink`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cg1_common::settings::SimConfig;
use cg1_common::GpuResult;

use crate::dump::FrameImage;
use crate::gpu_top::{GpuTop, PipelineStats};
use crate::metastream::TraceSource;

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub transactions: u64,
    pub frames: u32,
    pub triangles: u64,
    pub aborted: bool,
    pub stats: PipelineStats,
}

/// A replayable GPU model.
pub trait GpuBehaviorModel {
    fn run_loop(&mut self, source: &mut dyn TraceSource) -> GpuResult<RunSummary>;

    /// Request the running loop to stop before its next transaction.
    fn abort(&self);

    fn save_snapshot(&self, dir: &Path) -> GpuResult<()>;

    fn load_snapshot(&mut self, dir: &Path) -> GpuResult<()>;
}

// ── Frame sinks ─────────────────────────────────────────────────────────────

/// Consumer of the frames resolved at swap buffers.
pub trait FrameSink {
    fn frame(&mut self, frame: u32, image: FrameImage) -> GpuResult<()>;
}

/// Writes `frameNNNN.png` files into a directory.
#[derive(Debug, Clone)]
pub struct PngFrameSink {
    dir: PathBuf,
}

impl PngFrameSink {
    pub fn new(dir: &Path) -> Self {
        Self { dir: dir.to_path_buf() }
    }

    pub fn file_name(frame: u32) -> String {
        format!("frame{:04}.png", frame)
    }
}

impl FrameSink for PngFrameSink {
    fn frame(&mut self, frame: u32, image: FrameImage) -> GpuResult<()> {
        let path = self.dir.join(Self::file_name(frame));
        image.save_png(&path)?;
        log::info!("Model: frame {} written to {}", frame, path.display());
        Ok(())
    }
}

/// Keeps frames in memory.
impl FrameSink for Vec<(u32, FrameImage)> {
    fn frame(&mut self, frame: u32, image: FrameImage) -> GpuResult<()> {
        self.push((frame, image));
        Ok(())
    }
}

// ── Model ───────────────────────────────────────────────────────────────────

pub struct Cg1BehaviorModel<S: FrameSink> {
    gpu: GpuTop,
    sink: S,
    start_frame: u32,
    simulated_frames: u32,
    skip_batches: bool,
    abort: Arc<AtomicBool>,
    /// Registers and memory came from a snapshot; do not reset them.
    restored: bool,
}

impl<S: FrameSink> Cg1BehaviorModel<S> {
    pub fn new(config: &SimConfig, sink: S) -> Self {
        Self {
            gpu: GpuTop::new(config),
            sink,
            start_frame: config.sim.start_frame,
            simulated_frames: config.sim.simulated_frames,
            skip_batches: config.sim.skip_batches,
            abort: Arc::new(AtomicBool::new(false)),
            restored: false,
        }
    }

    pub fn gpu(&self) -> &GpuTop {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut GpuTop {
        &mut self.gpu
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Flag shared with other threads that want to stop the run.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Frames before the start frame update state without rendering.
    fn fast_forwarding(&self, frame: u32) -> bool {
        frame < self.start_frame
    }

    fn range_done(&self, frame: u32) -> bool {
        self.simulated_frames > 0 && frame >= self.start_frame.saturating_add(self.simulated_frames)
    }
}

impl<S: FrameSink> GpuBehaviorModel for Cg1BehaviorModel<S> {
    fn run_loop(&mut self, source: &mut dyn TraceSource) -> GpuResult<RunSummary> {
        if !self.restored {
            self.gpu.state_mut().reset();
        }
        let mut summary = RunSummary::default();
        log::info!(
            "Model: simulating {} frames from frame {}",
            self.simulated_frames,
            self.start_frame
        );

        loop {
            if self.abort.load(Ordering::Relaxed) {
                log::warn!("Model: aborted after {} transactions", summary.transactions);
                summary.aborted = true;
                break;
            }
            let (frame, _, _) = self.gpu.get_counters();
            if self.range_done(frame) {
                log::info!("Model: frame range complete");
                break;
            }
            self.gpu
                .set_skip_batch(self.skip_batches || self.fast_forwarding(frame));

            let Some(transaction) = source.next_transaction()? else {
                log::info!("Model: end of trace");
                break;
            };
            self.gpu.emulate_command_processor(transaction)?;
            summary.transactions += 1;

            if let Some(image) = self.gpu.take_frame() {
                if !self.fast_forwarding(frame) {
                    self.sink.frame(frame, image)?;
                    summary.frames += 1;
                }
            }
        }

        let (_, _, triangles) = self.gpu.get_counters();
        summary.triangles = triangles;
        summary.stats = self.gpu.stats();
        Ok(summary)
    }

    fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    fn save_snapshot(&self, dir: &Path) -> GpuResult<()> {
        self.gpu.save_snapshot(dir)
    }

    fn load_snapshot(&mut self, dir: &Path) -> GpuResult<()> {
        self.gpu.load_snapshot(dir)?;
        self.restored = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metastream::{GpuCommand, QueueSource, Transaction};
    use crate::regs::{GpuRegister, RegData};
    use cg1_common::settings::MemoryConfig;

    fn config(start_frame: u32, simulated_frames: u32) -> SimConfig {
        let mut config = SimConfig {
            memory: MemoryConfig {
                gpu_memory_mb: 1,
                mapped_memory_mb: 1,
            },
            ..Default::default()
        };
        config.sim.start_frame = start_frame;
        config.sim.simulated_frames = simulated_frames;
        config
    }

    fn frames(count: usize) -> QueueSource {
        let mut q = QueueSource::new();
        q.push(Transaction::reg(GpuRegister::DisplayXRes, 0, RegData::from_u32(2)));
        q.push(Transaction::reg(GpuRegister::DisplayYRes, 0, RegData::from_u32(2)));
        for _ in 0..count {
            q.push(Transaction::Command(GpuCommand::SwapBuffers));
        }
        q
    }

    #[test]
    fn test_frame_range() {
        let mut model = Cg1BehaviorModel::new(&config(1, 2), Vec::new());
        let summary = model.run_loop(&mut frames(5)).unwrap();
        assert_eq!(summary.frames, 2);
        let numbers: Vec<u32> = model.sink().iter().map(|(f, _)| *f).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert!(!summary.aborted);
    }

    #[test]
    fn test_unbounded_range_runs_to_end_of_trace() {
        let mut model = Cg1BehaviorModel::new(&config(0, 0), Vec::new());
        let summary = model.run_loop(&mut frames(3)).unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.transactions, 5);
    }

    #[test]
    fn test_abort_stops_before_next_transaction() {
        let mut model = Cg1BehaviorModel::new(&config(0, 0), Vec::new());
        model.abort();
        let summary = model.run_loop(&mut frames(3)).unwrap();
        assert!(summary.aborted);
        assert_eq!(summary.transactions, 0);
    }

    #[test]
    fn test_png_sink_names() {
        assert_eq!(PngFrameSink::file_name(7), "frame0007.png");
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngFrameSink::new(dir.path());
        sink.frame(3, FrameImage::new(1, 1, vec![1, 2, 3, 255]).unwrap())
            .unwrap();
        assert!(dir.path().join("frame0003.png").exists());
    }
}
