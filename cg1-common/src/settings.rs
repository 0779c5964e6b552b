// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

/// Simulator configuration, populated from the INI file by the driver.
#[derive(Debug, Clone, Default)]
pub struct SimConfig {
    pub memory: MemoryConfig,
    pub raster: RasterConfig,
    pub texture: TextureConfig,
    pub shader: ShaderConfig,
    pub sim: SimulationConfig,
}

/// Sizes of the two emulated memory spaces.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// GPU-local memory in MiB.
    pub gpu_memory_mb: u32,
    /// System (mapped) memory in MiB.
    pub mapped_memory_mb: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            gpu_memory_mb: 64,
            mapped_memory_mb: 16,
        }
    }
}

impl MemoryConfig {
    pub fn gpu_memory_bytes(&self) -> usize {
        self.gpu_memory_mb as usize * 1024 * 1024
    }

    pub fn mapped_memory_bytes(&self) -> usize {
        self.mapped_memory_mb as usize * 1024 * 1024
    }
}

/// Rasterizer tiling parameters. Tile sizes are in pixels.
#[derive(Debug, Clone)]
pub struct RasterConfig {
    pub stamp_width: u32,
    pub stamp_height: u32,
    pub gen_tile_width: u32,
    pub gen_tile_height: u32,
    pub scan_tile_width: u32,
    pub scan_tile_height: u32,
    /// Over-scan tile size in scan tiles.
    pub over_tile_width: u32,
    pub over_tile_height: u32,
    /// Subpixel precision for vertex snapping.
    pub subpixel_bits: u32,
    /// Restrict the top-level tile walk to the triangle bounding box.
    pub bounding_box_opt: bool,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            stamp_width: 2,
            stamp_height: 2,
            gen_tile_width: 8,
            gen_tile_height: 8,
            scan_tile_width: 32,
            scan_tile_height: 32,
            over_tile_width: 4,
            over_tile_height: 4,
            subpixel_bits: 8,
            bounding_box_opt: true,
        }
    }
}

/// Texture unit parameters.
#[derive(Debug, Clone)]
pub struct TextureConfig {
    /// log2 of the Morton block dimension in texels.
    pub block_dim_log2: u32,
    /// log2 of the superblock dimension in blocks.
    pub superblock_dim_log2: u32,
    pub aniso_algorithm: AnisoAlgorithm,
    pub force_max_anisotropy: bool,
    pub max_anisotropy: u32,
    /// Fractional bits kept for the trilinear weight.
    pub trilinear_precision: u32,
    /// Trilinear weights below this (or above 1 - this) snap to bilinear.
    pub brilinear_threshold: f32,
    pub aniso_rounding_precision: u32,
    pub aniso_rounding_threshold: f32,
    /// Blocks held by each compressed texel cache before a full flush.
    pub compressed_cache_blocks: u32,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            block_dim_log2: 2,
            superblock_dim_log2: 4,
            aniso_algorithm: AnisoAlgorithm::Ewa,
            force_max_anisotropy: false,
            max_anisotropy: 16,
            trilinear_precision: 8,
            brilinear_threshold: 0.0,
            aniso_rounding_precision: 8,
            aniso_rounding_threshold: 0.375,
            compressed_cache_blocks: 256,
        }
    }
}

/// Anisotropy estimation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnisoAlgorithm {
    /// Ratio of the major to minor axis of the pixel footprint.
    Ewa,
    /// Ratio of the footprint edges projected onto x/y.
    Axis,
}

impl AnisoAlgorithm {
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "0" | "ewa" => Self::Ewa,
            "1" | "axis" => Self::Axis,
            _ => Self::Ewa,
        }
    }
}

/// Shader interpreter parameters.
#[derive(Debug, Clone)]
pub struct ShaderConfig {
    /// Instruction memory size, in instructions.
    pub instruction_memory_size: u32,
    /// Fractional bits of the fixed-point operands.
    pub fxp_dec_bits: u32,
    pub vertex_threads: u32,
    pub fragment_stamps: u32,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            instruction_memory_size: 4096,
            fxp_dec_bits: 16,
            vertex_threads: 1,
            fragment_stamps: 1,
        }
    }
}

/// Frame range and debug modes.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub start_frame: u32,
    pub simulated_frames: u32,
    pub skip_batches: bool,
    pub validation: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_frame: 0,
            simulated_frames: 1,
            skip_batches: false,
            validation: false,
        }
    }
}
