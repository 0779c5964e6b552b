// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! CG1 GPU behavior model.
//!
//! Replays MetaStream traces against an emulated register file and memory,
//! running vertex shading, rasterization, texturing, fragment shading and
//! the per-fragment tests in software to produce bit-exact buffers.

pub mod clipper;
pub mod decompress;
pub mod dump;
pub mod fixed_point;
pub mod fragment_ops;
pub mod gpu_top;
pub mod math;
pub mod memory;
pub mod metastream;
pub mod model;
pub mod pixel_mapper;
pub mod rasterizer;
pub mod regs;
pub mod shader;
pub mod snapshot;
pub mod state;
pub mod texel_cache;
pub mod texture;

pub use gpu_top::GpuTop;
pub use model::{Cg1BehaviorModel, FrameSink, GpuBehaviorModel, PngFrameSink, RunSummary};
