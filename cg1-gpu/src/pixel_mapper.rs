// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tiled framebuffer addressing.
//!
//! Maps a pixel `(x, y)` to the byte offset of its first sample inside a
//! color or Z/stencil buffer. The layout nests, from outermost:
//!
//! 1. over-scan tiles in row order across the display;
//! 2. MSAA scan sub-tiles (one per sample group);
//! 3. scan tiles in Morton order inside the over tile;
//! 4. generation tiles in row order;
//! 5. stamps in row order;
//! 6. pixels in row order;
//! 7. samples, then bytes.

use cg1_common::settings::RasterConfig;
use cg1_common::{FatalError, GpuResult};

/// Interleave the low 16 bits of `x` (even bits) and `y` (odd bits).
#[inline]
pub fn morton(x: u32, y: u32) -> u32 {
    fn spread(mut v: u32) -> u32 {
        v &= 0x0000_FFFF;
        v = (v | (v << 8)) & 0x00FF_00FF;
        v = (v | (v << 4)) & 0x0F0F_0F0F;
        v = (v | (v << 2)) & 0x3333_3333;
        v = (v | (v << 1)) & 0x5555_5555;
        v
    }
    spread(x) | (spread(y) << 1)
}

/// Morton index of `(i, j)` inside a `2^size x 2^size` tile.
#[inline]
pub fn map_morton(size: u32, i: u32, j: u32) -> u32 {
    let mask = if size >= 16 { u32::MAX } else { (1u32 << size) - 1 };
    morton(i & mask, j & mask)
}

/// Texel offset (in texels) under the block/superblock Morton layout.
///
/// `block_dim` and `sblock_dim` are log2 dimensions; `width_log2` is the
/// log2 width of the mip level.
pub fn texel2morton_address(i: u32, j: u32, block_dim: u32, sblock_dim: u32, width_log2: u32) -> u64 {
    let texel_addr = map_morton(block_dim, i, j) as u64;
    let block_addr = map_morton(sblock_dim, i >> block_dim, j >> block_dim) as u64;
    let shift = sblock_dim + block_dim;
    let row_shift = width_log2.saturating_sub(shift);
    let sblock_addr = (((j >> shift) as u64) << row_shift) + (i >> shift) as u64;
    (((sblock_addr << (2 * sblock_dim)) + block_addr) << (2 * block_dim)) + texel_addr
}

/// Framebuffer tiling state for one display configuration.
#[derive(Debug, Clone)]
pub struct PixelMapper {
    // Tile dimensions, each level in units of the level below.
    stamp_w: u32,
    stamp_h: u32,
    gen_w: u32,
    gen_h: u32,
    scan_w: u32,
    scan_h: u32,
    over_w: u32,
    over_h: u32,

    h_res: u32,
    v_res: u32,
    samples: u32,
    bytes_sample: u32,

    over_px_w: u32,
    over_px_h: u32,
    over_row_width: u32,
    over_rows: u32,
    scan_px_w: u32,
    scan_px_h: u32,

    sub_w: u32,
    sub_h: u32,
    sub_px_w: u32,
    sub_px_h: u32,
    gen_adj_w: u32,
    gen_adj_h: u32,
    gen_adj_px_w: u32,
    gen_adj_px_h: u32,
}

impl PixelMapper {
    /// Build a mapper from the pixel-sized tile configuration.
    pub fn new(config: &RasterConfig) -> Self {
        let stamp_w = config.stamp_width.max(1);
        let stamp_h = config.stamp_height.max(1);
        let gen_w = (config.gen_tile_width / stamp_w).max(1);
        let gen_h = (config.gen_tile_height / stamp_h).max(1);
        let scan_w = (config.scan_tile_width / (gen_w * stamp_w)).max(1);
        let scan_h = (config.scan_tile_height / (gen_h * stamp_h)).max(1);
        let mut mapper = Self {
            stamp_w,
            stamp_h,
            gen_w,
            gen_h,
            scan_w,
            scan_h,
            over_w: config.over_tile_width.max(1),
            over_h: config.over_tile_height.max(1),
            h_res: 0,
            v_res: 0,
            samples: 1,
            bytes_sample: 4,
            over_px_w: 0,
            over_px_h: 0,
            over_row_width: 0,
            over_rows: 0,
            scan_px_w: 0,
            scan_px_h: 0,
            sub_w: 1,
            sub_h: 1,
            sub_px_w: 0,
            sub_px_h: 0,
            gen_adj_w: gen_w,
            gen_adj_h: gen_h,
            gen_adj_px_w: 0,
            gen_adj_px_h: 0,
        };
        mapper.recompute_extents();
        mapper
    }

    /// Configure resolution, samples per pixel and bytes per sample.
    pub fn setup_display(&mut self, h_res: u32, v_res: u32, samples: u32, bytes_sample: u32) -> GpuResult<()> {
        self.h_res = h_res;
        self.v_res = v_res;
        self.samples = samples;
        self.bytes_sample = bytes_sample;

        self.sub_w = 1;
        self.sub_h = 1;
        self.gen_adj_w = self.gen_w;
        self.gen_adj_h = self.gen_h;

        let (sub_w, sub_h) = match samples {
            1 => (1, 1),
            2 => (2, 1),
            4 => (2, 2),
            // Six samples share the eight-sample layout.
            6 | 8 => (4, 2),
            _ => return Err(FatalError::domain("PixelMapper samples", samples)),
        };
        self.split_gen_tile(sub_w, sub_h)?;
        if bytes_sample == 8 {
            self.split_gen_tile(1, 2)?;
        }
        self.recompute_extents();
        log::debug!(
            "PixelMapper: {}x{} samples {} bpp {} -> {} bytes",
            h_res,
            v_res,
            samples,
            bytes_sample,
            self.frame_buffer_size()
        );
        Ok(())
    }

    fn split_gen_tile(&mut self, w: u32, h: u32) -> GpuResult<()> {
        if self.gen_adj_w < w || self.gen_adj_h < h {
            return Err(FatalError::Invariant(format!(
                "generation tile {}x{} stamps too small for a {}x{} sub-tile split",
                self.gen_adj_w, self.gen_adj_h, w, h
            )));
        }
        self.gen_adj_w /= w;
        self.gen_adj_h /= h;
        self.sub_w *= w;
        self.sub_h *= h;
        Ok(())
    }

    fn recompute_extents(&mut self) {
        self.over_px_w = self.over_w * self.scan_w * self.gen_w * self.stamp_w;
        self.over_px_h = self.over_h * self.scan_h * self.gen_h * self.stamp_h;
        self.over_row_width = self.h_res.div_ceil(self.over_px_w);
        self.over_rows = self.v_res.div_ceil(self.over_px_h);
        self.scan_px_w = self.scan_w * self.gen_w * self.stamp_w;
        self.scan_px_h = self.scan_h * self.gen_h * self.stamp_h;
        self.sub_px_w = self.scan_w * self.gen_adj_w * self.stamp_w;
        self.sub_px_h = self.scan_h * self.gen_adj_h * self.stamp_h;
        self.gen_adj_px_w = self.gen_adj_w * self.stamp_w;
        self.gen_adj_px_h = self.gen_adj_h * self.stamp_h;
    }

    /// Only the resolution changes; tile and sample layout stay.
    pub fn change_resolution(&mut self, h_res: u32, v_res: u32) {
        self.h_res = h_res;
        self.v_res = v_res;
        self.recompute_extents();
    }

    /// Byte offset of the first sample of pixel `(x, y)`.
    pub fn compute_address(&self, x: u32, y: u32) -> u32 {
        let x_over = x / self.over_px_w;
        let y_over = y / self.over_px_h;
        let mut address = y_over * self.over_row_width + x_over;

        let x_scan = (x / self.scan_px_w) % self.over_w;
        let y_scan = (y / self.scan_px_h) % self.over_h;

        let x_sub = (x / self.sub_px_w) % self.sub_w;
        let y_sub = (y / self.sub_px_h) % self.sub_h;
        address = address * (self.sub_w * self.sub_h) + y_sub * self.sub_w + x_sub;

        address = address * (self.over_w * self.over_h) + morton(x_scan, y_scan);

        let x_gen = (x / self.gen_adj_px_w) % self.scan_w;
        let y_gen = (y / self.gen_adj_px_h) % self.scan_h;
        address = address * (self.scan_w * self.scan_h) + y_gen * self.scan_w + x_gen;

        let x_stamp = (x / self.stamp_w) % self.gen_adj_w;
        let y_stamp = (y / self.stamp_h) % self.gen_adj_h;
        address = address * (self.gen_adj_w * self.gen_adj_h) + y_stamp * self.gen_adj_w + x_stamp;

        let x_pixel = x % self.stamp_w;
        let y_pixel = y % self.stamp_h;
        address = address * (self.stamp_w * self.stamp_h) + y_pixel * self.stamp_w + x_pixel;

        address * self.samples * self.bytes_sample
    }

    /// Size in bytes of a buffer covering the display.
    pub fn frame_buffer_size(&self) -> u32 {
        self.over_row_width * self.over_rows * self.over_px_w * self.over_px_h * self.samples * self.bytes_sample
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.h_res, self.v_res)
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn bytes_per_sample(&self) -> u32 {
        self.bytes_sample
    }
}
