// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Whole-buffer operations: clears, blits, resolves and dumps.

use cg1_common::{FatalError, GpuAddr, GpuResult, Vec4};

use super::GpuTop;
use crate::dump::{depth_to_rgba, dump_file_name, stencil_to_rgba, DumpKind, FrameImage};
use crate::fragment_ops::{DEPTH_MASK_24, STENCIL_SHIFT};
use crate::math::{
    color_r32f_to_rgba32f, color_rg16f_to_rgba32f, color_rgba16_to_rgba32f, color_rgba16f_to_rgba32f,
    color_rgba32f_to_r32f, color_rgba32f_to_rg16f, color_rgba32f_to_rgba16, color_rgba32f_to_rgba16f,
    color_rgba32f_to_rgba8, color_rgba8_to_rgba32f,
};
use crate::pixel_mapper::{texel2morton_address, PixelMapper};
use crate::state::{ColorFormat, TextureBlocking, TextureFormat};

// ── Color codecs ────────────────────────────────────────────────────────────

/// Decode one stored color to RGBA32F.
pub fn decode_color(format: ColorFormat, bytes: &[u8]) -> Vec4 {
    match format {
        ColorFormat::Rgba8888 => color_rgba8_to_rgba32f(bytes),
        ColorFormat::Rgba16F => color_rgba16f_to_rgba32f(bytes),
        ColorFormat::Rg16F => color_rg16f_to_rgba32f(bytes),
        ColorFormat::R32F => color_r32f_to_rgba32f(bytes),
        ColorFormat::Rgba16 => color_rgba16_to_rgba32f(bytes),
    }
}

/// Encode RGBA32F into the storage format.
pub fn encode_color(format: ColorFormat, color: Vec4, out: &mut [u8]) {
    match format {
        ColorFormat::Rgba8888 => color_rgba32f_to_rgba8(color, out),
        ColorFormat::Rgba16F => color_rgba32f_to_rgba16f(color, out),
        ColorFormat::Rg16F => color_rgba32f_to_rg16f(color, out),
        ColorFormat::R32F => color_rgba32f_to_r32f(color, out),
        ColorFormat::Rgba16 => color_rgba32f_to_rgba16(color, out),
    }
}

/// Channels actually stored by a format, in RGBA order.
pub fn stored_channels(format: ColorFormat) -> usize {
    match format {
        ColorFormat::Rgba8888 | ColorFormat::Rgba16F | ColorFormat::Rgba16 => 4,
        ColorFormat::Rg16F => 2,
        ColorFormat::R32F => 1,
    }
}

/// Per-byte write enables for one pixel under an RGBA color mask.
pub fn byte_write_mask(format: ColorFormat, mask: [bool; 4]) -> Vec<bool> {
    let channels = stored_channels(format);
    let per_channel = format.bytes_per_pixel() as usize / channels;
    (0..channels)
        .flat_map(|c| std::iter::repeat(mask[c]).take(per_channel))
        .collect()
}

/// Color buffer rows are stored bottom-up unless D3D9 pixel coordinates
/// are in use.
fn image_row(y: u32, height: u32, top_down: bool) -> u32 {
    if top_down {
        y
    } else {
        height - 1 - y
    }
}

fn offset_address(base: GpuAddr, offset: u32) -> GpuResult<GpuAddr> {
    base.checked_add(offset)
        .ok_or_else(|| FatalError::Invariant(format!("buffer offset 0x{:X} from 0x{:08X} overflows", offset, base)))
}

impl GpuTop {
    /// Lay the color and Z mappers out for the current resolution and
    /// sample count.
    pub(super) fn update_mappers(&mut self) -> GpuResult<()> {
        let (w, h) = (self.state.display_x_res, self.state.display_y_res);
        let samples = self.state.samples();
        if self.mapper4.resolution() != (w, h) || self.mapper4.samples() != samples {
            self.mapper4.setup_display(w, h, samples, 4)?;
            self.mapper8.setup_display(w, h, samples, 8)?;
            self.scratch.resize(w as usize * h as usize * 4, 0);
            log::debug!("GpuTop: buffers laid out for {}x{} with {} samples", w, h, samples);
        }
        Ok(())
    }

    pub(super) fn mapper(&self, bytes: u32) -> &PixelMapper {
        if bytes == 8 {
            &self.mapper8
        } else {
            &self.mapper4
        }
    }

    // ── Clears ──────────────────────────────────────────────────────────────

    pub(super) fn clear_color_buffer(&mut self) -> GpuResult<()> {
        self.update_mappers()?;
        let format = self.state.render_targets[0].format;
        let mut pattern = vec![0u8; format.bytes_per_pixel() as usize];
        encode_color(format, self.state.color_buffer_clear, &mut pattern);
        let size = self.mapper(format.bytes_per_pixel()).frame_buffer_size() as usize;
        let address = self.state.back_buffer_addr;
        log::debug!(
            "GpuTop: clear color buffer 0x{:08X} ({} bytes) to {:?}",
            address,
            size,
            self.state.color_buffer_clear
        );
        self.memory.fill(address, size, &pattern)
    }

    fn z_stencil_clear_word(&self) -> u32 {
        ((self.state.stencil_buffer_clear & 0xFF) << STENCIL_SHIFT) | (self.state.z_buffer_clear & DEPTH_MASK_24)
    }

    /// Clear depth and, when `stencil` is set, stencil too.
    pub(super) fn clear_z_stencil_buffer(&mut self, stencil: bool) -> GpuResult<()> {
        self.update_mappers()?;
        let word = self.z_stencil_clear_word();
        let size = self.mapper4.frame_buffer_size() as usize;
        let address = self.state.zstencil_buffer_addr;
        log::debug!(
            "GpuTop: clear z{} buffer 0x{:08X} to 0x{:08X}",
            if stencil { "/stencil" } else { "" },
            address,
            word
        );
        if stencil {
            return self.memory.fill(address, size, &word.to_le_bytes());
        }
        let buffer = self.memory.slice_mut(address, size)?;
        for chunk in buffer.chunks_exact_mut(4) {
            let old = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let new = (old & !DEPTH_MASK_24) | (word & DEPTH_MASK_24);
            chunk.copy_from_slice(&new.to_le_bytes());
        }
        Ok(())
    }

    // ── Resolve ─────────────────────────────────────────────────────────────

    /// Average the samples of a render target into an RGBA8 image.
    pub(super) fn resolve_render_target(&mut self, rt: usize) -> GpuResult<FrameImage> {
        self.update_mappers()?;
        let target = self.state.render_targets[rt];
        let bytes = target.format.bytes_per_pixel();
        let samples = self.state.samples();
        let (w, h) = (self.state.display_x_res, self.state.display_y_res);
        let top_down = self.state.d3d9_pixel_coordinates;

        for y in 0..h {
            let row = image_row(y, h, top_down);
            for x in 0..w {
                let address = offset_address(target.address, self.mapper(bytes).compute_address(x, y))?;
                let data = self.memory.slice(address, (bytes * samples) as usize)?;
                let mut sum = [0.0f32; 4];
                for sample in data.chunks_exact(bytes as usize) {
                    let c = decode_color(target.format, sample);
                    for k in 0..4 {
                        sum[k] += c[k];
                    }
                }
                let avg = sum.map(|v| v / samples as f32);
                let i = (row as usize * w as usize + x as usize) * 4;
                color_rgba32f_to_rgba8(avg, &mut self.scratch[i..i + 4]);
            }
        }
        FrameImage::new(w, h, self.scratch.clone())
    }

    // ── Dumps ───────────────────────────────────────────────────────────────

    pub(super) fn dump_color(&mut self) -> GpuResult<()> {
        for rt in 0..self.state.render_targets.len() {
            if !self.state.render_targets[rt].enable {
                continue;
            }
            let image = self.resolve_render_target(rt)?;
            let path = self.dump_dir.join(dump_file_name(self.frame, self.batch, DumpKind::Color(rt)));
            image.save_png(&path)?;
        }
        Ok(())
    }

    pub(super) fn dump_z_stencil(&mut self, kind: DumpKind) -> GpuResult<()> {
        if self.state.multisampling {
            return Err(FatalError::NotImplemented("depth and stencil dumps under MSAA"));
        }
        self.update_mappers()?;
        let (w, h) = (self.state.display_x_res, self.state.display_y_res);
        let top_down = self.state.d3d9_pixel_coordinates;
        for y in 0..h {
            let row = image_row(y, h, top_down);
            for x in 0..w {
                let address = offset_address(self.state.zstencil_buffer_addr, self.mapper4.compute_address(x, y))?;
                let word = self.memory.read_u32(address)?;
                let rgba = match kind {
                    DumpKind::Stencil => stencil_to_rgba(word),
                    _ => depth_to_rgba(word),
                };
                let i = (row as usize * w as usize + x as usize) * 4;
                self.scratch[i..i + 4].copy_from_slice(&rgba);
            }
        }
        let image = FrameImage::new(w, h, self.scratch.clone())?;
        let path = self.dump_dir.join(dump_file_name(self.frame, self.batch, kind));
        image.save_png(&path)
    }

    // ── Blitter ─────────────────────────────────────────────────────────────

    /// Copy a rectangle of the RGBA8 back buffer into a texture.
    pub(super) fn blit(&mut self) -> GpuResult<()> {
        self.update_mappers()?;
        let s = &self.state;
        if s.render_targets[0].format != ColorFormat::Rgba8888 {
            return Err(FatalError::NotImplemented("blit from a non RGBA8888 color buffer"));
        }
        if s.blit_dst_tx_format != TextureFormat::Rgba8888 {
            return Err(FatalError::NotImplemented("blit to a non RGBA8888 texture"));
        }
        let (src_x, src_y) = (s.blit_ini_x, s.blit_ini_y);
        let (dst_x, dst_y) = (s.blit_x_offset, s.blit_y_offset);
        let (width, height) = (s.blit_width, s.blit_height);
        let (res_x, res_y) = (s.display_x_res, s.display_y_res);
        if src_x.saturating_add(width) > res_x || src_y.saturating_add(height) > res_y {
            return Err(FatalError::domain("BLIT rectangle", format!("{}x{}+{}+{}", width, height, src_x, src_y)));
        }
        let width2 = s.blit_dst_tx_width2;
        let blocking = s.blit_dst_tx_block;
        let dst_base = s.blit_dst_address;
        let src_base = s.back_buffer_addr;
        let samples = s.samples() as usize;
        let block_dim = self.config.texture.block_dim_log2;
        let sblock_dim = self.config.texture.superblock_dim_log2;

        let dst_mapper = match blocking {
            TextureBlocking::Framebuffer => {
                let mut m = PixelMapper::new(&self.config.raster);
                m.setup_display(1 << width2.min(12), dst_y + height, 1, 4)?;
                Some(m)
            }
            TextureBlocking::Texture => None,
        };

        log::debug!(
            "GpuTop: blit {}x{} from ({}, {}) to 0x{:08X} at ({}, {}) {:?}",
            width,
            height,
            src_x,
            src_y,
            dst_base,
            dst_x,
            dst_y,
            blocking
        );

        for y in 0..height {
            for x in 0..width {
                let src = offset_address(src_base, self.mapper4.compute_address(src_x + x, src_y + y))?;
                let data = self.memory.slice(src, 4 * samples)?;
                let mut texel = [0u8; 4];
                if samples == 1 {
                    texel.copy_from_slice(&data[..4]);
                } else {
                    let mut sum = [0.0f32; 4];
                    for sample in data.chunks_exact(4) {
                        let c = color_rgba8_to_rgba32f(sample);
                        (0..4).for_each(|k| sum[k] += c[k]);
                    }
                    color_rgba32f_to_rgba8(sum.map(|v| v / samples as f32), &mut texel);
                }

                let (i, j) = (dst_x + x, dst_y + y);
                let offset = match &dst_mapper {
                    Some(m) => m.compute_address(i, j) as u64,
                    None => texel2morton_address(i, j, block_dim, sblock_dim, width2) * 4,
                };
                let offset = u32::try_from(offset)
                    .map_err(|_| FatalError::Invariant(format!("blit texel offset 0x{:X} overflows", offset)))?;
                let dst = offset_address(dst_base, offset)?;
                self.memory.write(dst, &texel)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codecs_match_storage_size() {
        for format in [
            ColorFormat::Rgba8888,
            ColorFormat::Rgba16F,
            ColorFormat::Rg16F,
            ColorFormat::R32F,
            ColorFormat::Rgba16,
        ] {
            let mut out = vec![0u8; format.bytes_per_pixel() as usize];
            encode_color(format, [1.0, 0.5, 0.25, 1.0], &mut out);
            let back = decode_color(format, &out);
            assert_eq!(back[0], 1.0, "{:?}", format);
            assert_eq!(byte_write_mask(format, [true; 4]).len(), out.len());
        }
    }

    #[test]
    fn test_byte_write_mask_per_channel() {
        assert_eq!(
            byte_write_mask(ColorFormat::Rgba8888, [true, false, true, false]),
            vec![true, false, true, false]
        );
        assert_eq!(
            byte_write_mask(ColorFormat::Rg16F, [false, true, true, true]),
            vec![false, false, true, true]
        );
        assert_eq!(byte_write_mask(ColorFormat::R32F, [true, false, false, false]), vec![true; 4]);
    }

    #[test]
    fn test_image_rows_flip_unless_top_down() {
        assert_eq!(image_row(0, 4, false), 3);
        assert_eq!(image_row(3, 4, false), 0);
        assert_eq!(image_row(1, 4, true), 1);
    }
}
