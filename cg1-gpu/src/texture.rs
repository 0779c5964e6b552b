// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Texture unit.
//!
//! A stamp-wide [`TextureAccess`] is planned by [`TextureUnit::generate_access`]
//! (LOD, anisotropy, mip levels, wrapped texel coordinates and addresses)
//! and then resolved by [`TextureUnit::fill_access`] (texel reads, format
//! conversion, shadow compare and filtering). [`TextureContext`] ties both
//! halves to the register state and memory so the shader interpreter can
//! treat the whole unit as a synchronous [`TextureSampler`].

use byteorder::{ByteOrder, LittleEndian};
use half::f16;

use cg1_common::error::MemorySpaceKind;
use cg1_common::settings::{AnisoAlgorithm, RasterConfig, TextureConfig};
use cg1_common::{
    FatalError, GpuAddr, GpuResult, TexelAddr, Vec4, BLACK_TEXEL_ADDRESS, STAMP_FRAGMENTS,
    TEXTURE_ADDRESS_SPACE_MASK,
};

use crate::decompress::Decompressor;
use crate::fragment_ops::compare;
use crate::gpu_top::streamer::read_attribute;
use crate::memory::MemorySpace;
use crate::pixel_mapper::{texel2morton_address, PixelMapper};
use crate::shader::interpreter::TRACE_TARGET;
use crate::shader::{TextureOp, TextureRequest, TextureSampler};
use crate::state::{
    ClampMode, FilterMode, GpuState, TextureBlocking, TextureFormat, TextureMode, TextureUnitState,
};
use crate::texel_cache::CompressedCaches;

/// Block dimension (log2) of the 4x4 compressed blocks.
const COMPRESSED_BLOCK_DIM: u32 = 2;

// ── Access records ──────────────────────────────────────────────────────────

/// One texel read planned for an access.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexelFetch {
    pub address: TexelAddr,
    /// Texel outside the texture under a border wrap mode.
    pub border: bool,
    /// Bilinear/trilinear weight inside its aniso sample.
    pub weight: f32,
    pub value: Vec4,
}

/// One footprint sample along the anisotropy axis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnisoSample {
    pub weight: f32,
    pub texels: Vec<TexelFetch>,
}

/// Stamp-wide texture request with its planned texels and results.
#[derive(Debug, Clone)]
pub struct TextureAccess {
    pub op: TextureOp,
    pub unit: u32,
    pub lanes: usize,
    pub coords: [Vec4; STAMP_FRAGMENTS],
    /// LOD bias (TXB) or explicit LOD (TXL).
    pub parameter: [f32; STAMP_FRAGMENTS],
    /// Shadow compare reference.
    pub reference: [f32; STAMP_FRAGMENTS],
    pub lod: [f32; STAMP_FRAGMENTS],
    pub aniso_samples: u32,
    pub samples: [Vec<AnisoSample>; STAMP_FRAGMENTS],
    pub result: [Vec4; STAMP_FRAGMENTS],
}

impl TextureAccess {
    pub fn new(request: &TextureRequest) -> Self {
        Self {
            op: request.op,
            unit: request.unit,
            lanes: request.lanes.clamp(1, STAMP_FRAGMENTS),
            coords: request.coords,
            parameter: request.parameter,
            reference: [0.0; STAMP_FRAGMENTS],
            lod: [0.0; STAMP_FRAGMENTS],
            aniso_samples: 1,
            samples: Default::default(),
            result: [[0.0; 4]; STAMP_FRAGMENTS],
        }
    }
}

// ── Coordinate helpers ──────────────────────────────────────────────────────

/// Pick the cube face for a direction and project it to face `(s, t)`.
pub fn select_cube_face(coord: Vec4) -> (usize, f32, f32) {
    let [rx, ry, rz, _] = coord;
    let (ax, ay, az) = (rx.abs(), ry.abs(), rz.abs());
    let (face, sc, tc, ma) = if ax >= ay && ax >= az {
        if rx >= 0.0 {
            (0, -rz, -ry, ax)
        } else {
            (1, rz, -ry, ax)
        }
    } else if ay >= az {
        if ry >= 0.0 {
            (2, rx, rz, ay)
        } else {
            (3, rx, -rz, ay)
        }
    } else if rz >= 0.0 {
        (4, rx, -ry, az)
    } else {
        (5, -rx, -ry, az)
    };
    if ma == 0.0 {
        return (face, 0.5, 0.5);
    }
    (face, (sc / ma + 1.0) * 0.5, (tc / ma + 1.0) * 0.5)
}

/// Wrap an integer texel coordinate. `None` selects the border color.
pub fn wrap_texel(mode: ClampMode, i: i64, size: u32, linear: bool) -> Option<u32> {
    let size = size.max(1) as i64;
    match mode {
        ClampMode::Repeat => Some(i.rem_euclid(size) as u32),
        ClampMode::MirroredRepeat => {
            let m = i.rem_euclid(2 * size);
            Some(if m >= size { 2 * size - 1 - m } else { m } as u32)
        }
        ClampMode::ClampToEdge => Some(i.clamp(0, size - 1) as u32),
        ClampMode::Clamp => {
            if (0..size).contains(&i) {
                Some(i as u32)
            } else if linear {
                None
            } else {
                Some(i.clamp(0, size - 1) as u32)
            }
        }
        ClampMode::ClampToBorder => (0..size).contains(&i).then_some(i as u32),
    }
}

/// Clamp the normalized coordinate for the clamping wrap modes.
fn wrap_coord(mode: ClampMode, s: f32) -> f32 {
    match mode {
        ClampMode::Clamp | ClampMode::ClampToEdge => s.clamp(0.0, 1.0),
        _ => s,
    }
}

fn mip_size(size: u32, level: u32) -> u32 {
    (size >> level.min(31)).max(1)
}

fn quantize(value: f32, bits: u32) -> f32 {
    let scale = (1u64 << bits.min(24)) as f32;
    (value * scale).floor() / scale
}

// ── Format conversion ───────────────────────────────────────────────────────

fn unorm(v: u32, bits: u32) -> f32 {
    v as f32 / ((1u32 << bits) - 1) as f32
}

fn snorm8(v: u8) -> f32 {
    (v as i8 as f32 / 127.0).max(-1.0)
}

/// Decode one texel (decompressed layout for compressed formats) to RGBA32F.
pub fn convert_texel(format: TextureFormat, data: &[u8]) -> Vec4 {
    let u16_at = |k: usize| LittleEndian::read_u16(&data[k..]) as u32;
    let u32_at = |k: usize| LittleEndian::read_u32(&data[k..]);
    let f16_at = |k: usize| f16::from_bits(LittleEndian::read_u16(&data[k..])).to_f32();
    let f32_at = |k: usize| LittleEndian::read_f32(&data[k..]);
    let b = |k: usize| data[k] as u32;

    match format {
        TextureFormat::Rgb888 => [unorm(b(0), 8), unorm(b(1), 8), unorm(b(2), 8), 1.0],
        TextureFormat::Rgba8888
        | TextureFormat::Dxt1Rgb
        | TextureFormat::Dxt1Rgba
        | TextureFormat::Dxt3Rgba
        | TextureFormat::Dxt5Rgba => [unorm(b(0), 8), unorm(b(1), 8), unorm(b(2), 8), unorm(b(3), 8)],
        TextureFormat::Rgb565 => {
            let v = u16_at(0);
            [unorm(v >> 11, 5), unorm((v >> 5) & 0x3F, 6), unorm(v & 0x1F, 5), 1.0]
        }
        TextureFormat::Rgb555 => {
            let v = u16_at(0);
            [unorm((v >> 10) & 0x1F, 5), unorm((v >> 5) & 0x1F, 5), unorm(v & 0x1F, 5), 1.0]
        }
        TextureFormat::Rgb444 => {
            let v = u16_at(0);
            [unorm((v >> 8) & 0xF, 4), unorm((v >> 4) & 0xF, 4), unorm(v & 0xF, 4), 1.0]
        }
        TextureFormat::Rgb332 => {
            let v = b(0);
            [unorm(v >> 5, 3), unorm((v >> 2) & 0x7, 3), unorm(v & 0x3, 2), 1.0]
        }
        TextureFormat::Rgba5551 => {
            let v = u16_at(0);
            [
                unorm(v >> 11, 5),
                unorm((v >> 6) & 0x1F, 5),
                unorm((v >> 1) & 0x1F, 5),
                (v & 1) as f32,
            ]
        }
        TextureFormat::Rgba4444 => {
            let v = u16_at(0);
            [
                unorm(v >> 12, 4),
                unorm((v >> 8) & 0xF, 4),
                unorm((v >> 4) & 0xF, 4),
                unorm(v & 0xF, 4),
            ]
        }
        TextureFormat::Rgba2222 => {
            let v = b(0);
            [
                unorm(v >> 6, 2),
                unorm((v >> 4) & 0x3, 2),
                unorm((v >> 2) & 0x3, 2),
                unorm(v & 0x3, 2),
            ]
        }
        TextureFormat::Rgb101010 => {
            let v = u32_at(0);
            [unorm(v & 0x3FF, 10), unorm((v >> 10) & 0x3FF, 10), unorm((v >> 20) & 0x3FF, 10), 1.0]
        }
        TextureFormat::Rgba1010102 => {
            let v = u32_at(0);
            [
                unorm(v & 0x3FF, 10),
                unorm((v >> 10) & 0x3FF, 10),
                unorm((v >> 20) & 0x3FF, 10),
                unorm(v >> 30, 2),
            ]
        }
        TextureFormat::Rgb121212 => [
            unorm(u16_at(0) & 0xFFF, 12),
            unorm(u16_at(2) & 0xFFF, 12),
            unorm(u16_at(4) & 0xFFF, 12),
            1.0,
        ],
        TextureFormat::Luminance8 | TextureFormat::Latc1 => {
            let l = unorm(b(0), 8);
            [l, l, l, 1.0]
        }
        TextureFormat::Luminance12 => {
            let l = unorm(u16_at(0) & 0xFFF, 12);
            [l, l, l, 1.0]
        }
        TextureFormat::Luminance16 => {
            let l = unorm(u16_at(0), 16);
            [l, l, l, 1.0]
        }
        TextureFormat::Luminance4Alpha4 => {
            let l = unorm(b(0) >> 4, 4);
            [l, l, l, unorm(b(0) & 0xF, 4)]
        }
        TextureFormat::Luminance8Alpha8 | TextureFormat::Latc2 => {
            let l = unorm(b(0), 8);
            [l, l, l, unorm(b(1), 8)]
        }
        TextureFormat::Intensity8 => [unorm(b(0), 8); 4],
        TextureFormat::Intensity12 => [unorm(u16_at(0) & 0xFFF, 12); 4],
        TextureFormat::Intensity16 => [unorm(u16_at(0), 16); 4],
        TextureFormat::Alpha8 => [0.0, 0.0, 0.0, unorm(b(0), 8)],
        TextureFormat::Alpha12 => [0.0, 0.0, 0.0, unorm(u16_at(0) & 0xFFF, 12)],
        TextureFormat::Alpha16 => [0.0, 0.0, 0.0, unorm(u16_at(0), 16)],
        TextureFormat::Luminance8Signed | TextureFormat::Latc1Signed => {
            let l = snorm8(data[0]);
            [l, l, l, 1.0]
        }
        TextureFormat::Latc2Signed => {
            let l = snorm8(data[0]);
            [l, l, l, snorm8(data[1])]
        }
        TextureFormat::Rgba16F => [f16_at(0), f16_at(2), f16_at(4), f16_at(6)],
        TextureFormat::Rgba32F => [f32_at(0), f32_at(4), f32_at(8), f32_at(12)],
        TextureFormat::Rg16F => [f16_at(0), f16_at(2), 0.0, 1.0],
        TextureFormat::R32F => [f32_at(0), 0.0, 0.0, 1.0],
        TextureFormat::DepthComponent24 => {
            let d = (u32_at(0) & 0x00FF_FFFF) as f32 / 16_777_215.0;
            [d, d, d, 1.0]
        }
    }
}

/// Apply the D3D9 BGRA swap, then the component reversal.
fn reorder_components(tex: &TextureUnitState, mut color: Vec4) -> Vec4 {
    if tex.d3d9_color_conv {
        color.swap(0, 2);
    }
    if tex.reverse {
        color.reverse();
    }
    color
}

// ── Texture unit ────────────────────────────────────────────────────────────

/// Footprint of one quad in base-level texel units.
#[derive(Debug, Clone, Copy, Default)]
struct Footprint {
    /// Size used for the LOD.
    scale: f32,
    samples: u32,
    /// Anisotropy axis (texels), full length of the footprint.
    axis: [f32; 2],
}

/// Level to read and its trilinear weight.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LevelWeight {
    level: u32,
    weight: f32,
}

pub struct TextureUnit {
    config: TextureConfig,
    raster: RasterConfig,
    /// Framebuffer-blocked layout for the last `(width, height, bytes)` seen.
    fb_mapper: Option<((u32, u32, u32), PixelMapper)>,
    requests: u64,
}

impl TextureUnit {
    pub fn new(config: &TextureConfig, raster: &RasterConfig) -> Self {
        Self {
            config: config.clone(),
            raster: raster.clone(),
            fb_mapper: None,
            requests: 0,
        }
    }

    /// Accesses planned since construction.
    pub fn requests(&self) -> u64 {
        self.requests
    }

    fn max_anisotropy(&self, tex: &TextureUnitState) -> u32 {
        let max = self.config.max_anisotropy.max(1);
        if self.config.force_max_anisotropy {
            max
        } else {
            tex.max_anisotropy.clamp(1, max)
        }
    }

    fn aniso_sample_count(&self, ratio: f32, max_aniso: u32) -> u32 {
        let q = quantize(ratio.clamp(1.0, max_aniso as f32), self.config.aniso_rounding_precision);
        let n = q.floor() as u32 + u32::from(q.fract() > self.config.aniso_rounding_threshold);
        n.clamp(1, max_aniso)
    }

    /// Quad footprint from the lane coordinate differences.
    fn footprint(&self, tex: &TextureUnitState, st: &[[f32; 3]; STAMP_FRAGMENTS], lanes: usize) -> Footprint {
        if lanes < STAMP_FRAGMENTS {
            return Footprint {
                scale: 1.0,
                samples: 1,
                axis: [0.0; 2],
            };
        }
        let w = tex.width.max(1) as f32;
        let h = tex.height.max(1) as f32;
        let d = tex.depth.max(1) as f32;
        let dx = [(st[1][0] - st[0][0]) * w, (st[1][1] - st[0][1]) * h, (st[1][2] - st[0][2]) * d];
        let dy = [(st[2][0] - st[0][0]) * w, (st[2][1] - st[0][1]) * h, (st[2][2] - st[0][2]) * d];

        match tex.mode {
            TextureMode::Texture1D => Footprint {
                scale: dx[0].abs().max(dy[0].abs()),
                samples: 1,
                axis: [0.0; 2],
            },
            TextureMode::Texture3D => {
                let len = |v: [f32; 3]| (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
                Footprint {
                    scale: len(dx).max(len(dy)),
                    samples: 1,
                    axis: [0.0; 2],
                }
            }
            TextureMode::Texture2D | TextureMode::CubeMap => self.footprint_2d([dx[0], dx[1]], [dy[0], dy[1]], tex),
        }
    }

    fn footprint_2d(&self, dx: [f32; 2], dy: [f32; 2], tex: &TextureUnitState) -> Footprint {
        let len_x = dx[0].hypot(dx[1]);
        let len_y = dy[0].hypot(dy[1]);
        let (longer, major_axis) = if len_x >= len_y { (dx, len_x) } else { (dy, len_y) };

        let max_aniso = self.max_anisotropy(tex);
        if max_aniso <= 1 {
            return Footprint {
                scale: major_axis,
                samples: 1,
                axis: [0.0; 2],
            };
        }

        let (major, minor) = match self.config.aniso_algorithm {
            AnisoAlgorithm::Axis => (major_axis, len_x.min(len_y)),
            AnisoAlgorithm::Ewa => {
                let a = dx[1] * dx[1] + dy[1] * dy[1];
                let b = -2.0 * (dx[0] * dx[1] + dy[0] * dy[1]);
                let c = dx[0] * dx[0] + dy[0] * dy[0];
                let f = (dx[0] * dy[1] - dy[0] * dx[1]).powi(2);
                let root = ((a - c) * (a - c) + b * b).sqrt();
                if f <= 0.0 || a + c - root <= 0.0 {
                    (major_axis, len_x.min(len_y))
                } else {
                    ((2.0 * f / (a + c - root)).sqrt(), (2.0 * f / (a + c + root)).sqrt())
                }
            }
        };

        let ratio = if minor > 0.0 { major / minor } else { max_aniso as f32 };
        let samples = self.aniso_sample_count(ratio, max_aniso);
        let axis = if major_axis > 0.0 {
            [longer[0] / major_axis * major, longer[1] / major_axis * major]
        } else {
            [0.0; 2]
        };
        Footprint {
            scale: major / samples as f32,
            samples,
            axis,
        }
    }

    /// Mip levels and weights for one lane.
    fn select_levels(&self, tex: &TextureUnitState, lod: f32) -> (FilterMode, Vec<LevelWeight>) {
        let dims_top = match tex.mode {
            TextureMode::Texture3D => tex.width2.max(tex.height2).max(tex.depth2),
            TextureMode::Texture1D => tex.width2,
            _ => tex.width2.max(tex.height2),
        };
        let base = tex.min_level;
        let top = tex.max_level.min(dims_top).max(base);

        if lod <= 0.0 || !tex.min_filter.uses_mipmaps() {
            let filter = if lod <= 0.0 { tex.mag_filter } else { tex.min_filter };
            return (filter, vec![LevelWeight { level: base, weight: 1.0 }]);
        }

        let filter = tex.min_filter;
        if !filter.is_trilinear() {
            let level = (base + (lod + 0.5).floor() as u32).min(top);
            return (filter, vec![LevelWeight { level, weight: 1.0 }]);
        }

        let l0 = base + lod.floor() as u32;
        if l0 >= top {
            return (filter, vec![LevelWeight { level: top, weight: 1.0 }]);
        }
        let mut frac = quantize(lod.fract(), self.config.trilinear_precision);
        let threshold = self.config.brilinear_threshold;
        if threshold > 0.0 {
            if frac < threshold {
                frac = 0.0;
            } else if frac > 1.0 - threshold {
                frac = 1.0;
            }
        }
        let mut levels = Vec::with_capacity(2);
        if frac < 1.0 {
            levels.push(LevelWeight {
                level: l0,
                weight: 1.0 - frac,
            });
        }
        if frac > 0.0 {
            levels.push(LevelWeight {
                level: l0 + 1,
                weight: frac,
            });
        }
        (filter, levels)
    }

    /// Plan LOD, levels, texel coordinates and addresses for every lane.
    pub fn generate_access(&mut self, tex: &TextureUnitState, access: &mut TextureAccess) -> GpuResult<()> {
        self.requests += 1;

        // Per-lane face and normalized coordinates.
        let mut faces = [0usize; STAMP_FRAGMENTS];
        let mut st = [[0.0f32; 3]; STAMP_FRAGMENTS];
        for lane in 0..STAMP_FRAGMENTS {
            let c = access.coords[lane];
            match tex.mode {
                TextureMode::CubeMap => {
                    let (face, s, t) = select_cube_face(c);
                    faces[lane] = face;
                    st[lane] = [s, t, 0.0];
                    access.reference[lane] = c[3];
                }
                _ => {
                    let t = if tex.d3d9_v_inv { 1.0 - c[1] } else { c[1] };
                    st[lane] = [c[0], t, c[2]];
                    access.reference[lane] = c[2];
                }
            }
        }

        let fp = self.footprint(tex, &st, access.lanes);
        access.aniso_samples = fp.samples;
        let base_lod = if fp.scale > 0.0 { fp.scale.log2() } else { f32::NEG_INFINITY };

        for lane in 0..access.lanes {
            let lod = match access.op {
                TextureOp::ReadWithLod => access.parameter[lane] + tex.lod_bias + tex.unit_lod_bias,
                _ => base_lod + access.parameter[lane] + tex.lod_bias + tex.unit_lod_bias,
            };
            let lod = lod.clamp(tex.min_lod, tex.max_lod);
            access.lod[lane] = lod;

            let (filter, levels) = self.select_levels(tex, lod);
            let n = fp.samples;
            let mut samples = Vec::with_capacity(n as usize);
            for k in 0..n {
                let offset = (k as f32 + 0.5) / n as f32 - 0.5;
                let s = st[lane][0] + offset * fp.axis[0] / tex.width.max(1) as f32;
                let t = st[lane][1] + offset * fp.axis[1] / tex.height.max(1) as f32;
                let mut sample = AnisoSample {
                    weight: 1.0 / n as f32,
                    texels: Vec::new(),
                };
                for lw in &levels {
                    self.level_texels(tex, faces[lane], lw, filter.is_linear(), [s, t, st[lane][2]], &mut sample.texels)?;
                }
                samples.push(sample);
            }
            access.samples[lane] = samples;
        }
        Ok(())
    }

    fn level_texels(
        &mut self,
        tex: &TextureUnitState,
        face: usize,
        lw: &LevelWeight,
        linear: bool,
        coord: [f32; 3],
        out: &mut Vec<TexelFetch>,
    ) -> GpuResult<()> {
        let dims = [
            mip_size(tex.width, lw.level),
            if tex.mode == TextureMode::Texture1D { 1 } else { mip_size(tex.height, lw.level) },
            if tex.mode == TextureMode::Texture3D { mip_size(tex.depth, lw.level) } else { 1 },
        ];
        let axes = match tex.mode {
            TextureMode::Texture1D => 1,
            TextureMode::Texture3D => 3,
            _ => 2,
        };
        // Cube faces always clamp to the edge.
        let wraps = if tex.mode == TextureMode::CubeMap {
            [ClampMode::ClampToEdge; 3]
        } else {
            [tex.wrap_s, tex.wrap_t, tex.wrap_r]
        };

        // Per axis: (texel a, texel b, weight of b).
        let mut taps = [(Some(0u32), Some(0u32), 0.0f32); 3];
        for a in 0..axes {
            let u = wrap_coord(wraps[a], coord[a]) * dims[a] as f32;
            taps[a] = if linear {
                let u = u - 0.5;
                let i0 = u.floor();
                (
                    wrap_texel(wraps[a], i0 as i64, dims[a], true),
                    wrap_texel(wraps[a], i0 as i64 + 1, dims[a], true),
                    u - i0,
                )
            } else {
                let i = wrap_texel(wraps[a], u.floor() as i64, dims[a], false);
                (i, i, 0.0)
            };
        }

        let corners = if linear { 1usize << axes } else { 1 };
        for corner in 0..corners {
            let mut weight = lw.weight;
            let mut index = [0u32; 3];
            let mut border = false;
            for a in 0..axes {
                let (ia, ib, frac) = taps[a];
                let pick_b = corner & (1 << a) != 0;
                let (texel, w) = if pick_b { (ib, frac) } else { (ia, 1.0 - frac) };
                weight *= if linear { w } else { 1.0 };
                match texel {
                    Some(i) => index[a] = i,
                    None => border = true,
                }
            }
            if weight == 0.0 && linear {
                continue;
            }
            let address = if border {
                BLACK_TEXEL_ADDRESS
            } else {
                self.texel_address(tex, lw.level, face, index)?
            };
            out.push(TexelFetch {
                address,
                border,
                weight,
                value: [0.0; 4],
            });
        }
        Ok(())
    }

    /// Texel address of `(i, j, k)` in mip `level` of cube face `face`.
    pub fn texel_address(&mut self, tex: &TextureUnitState, level: u32, face: usize, index: [u32; 3]) -> GpuResult<TexelAddr> {
        let level_idx = level as usize;
        let face = if tex.mode == TextureMode::CubeMap { face } else { 0 };
        let base = tex
            .address
            .get(level_idx)
            .map(|faces| faces[face])
            .ok_or_else(|| FatalError::Invariant(format!("texture level {} out of range", level)))?;
        let texel_size = tex.format.texel_size() as u64;
        let [i, j, k] = index;

        let offset = match tex.blocking {
            TextureBlocking::Texture => {
                let block_dim = if tex.format.is_compressed() {
                    COMPRESSED_BLOCK_DIM
                } else {
                    self.config.block_dim_log2
                };
                let sblock_dim = self.config.superblock_dim_log2;
                let w_log2 = tex.width2.saturating_sub(level);
                let h_log2 = tex.height2.saturating_sub(level);
                let mut texel = texel2morton_address(i, j, block_dim, sblock_dim, w_log2);
                if k > 0 {
                    let shift = block_dim + sblock_dim;
                    let slice = (1u64 << h_log2.saturating_sub(shift)) << w_log2.saturating_sub(shift) << (2 * shift);
                    texel += k as u64 * slice;
                }
                texel * texel_size
            }
            TextureBlocking::Framebuffer => {
                if tex.format.is_compressed() {
                    return Err(FatalError::NotImplemented("framebuffer blocking for compressed textures"));
                }
                let key = (mip_size(tex.width, level), mip_size(tex.height, level), texel_size as u32);
                let stale = self.fb_mapper.as_ref().map_or(true, |(k, _)| *k != key);
                if stale {
                    let mut mapper = PixelMapper::new(&self.raster);
                    mapper.setup_display(key.0, key.1, 1, key.2)?;
                    self.fb_mapper = Some((key, mapper));
                }
                match &self.fb_mapper {
                    Some((_, mapper)) => mapper.compute_address(i, j) as u64,
                    None => 0,
                }
            }
        };

        match Decompressor::for_compression(tex.format.compression()) {
            Some(d) => Ok(d.space() | (((base as u64) << d.ratio_shift()) + offset)),
            None => Ok(base as u64 + offset),
        }
    }

    /// Read, convert, compare and filter every planned texel.
    pub fn fill_access(
        &self,
        tex: &TextureUnitState,
        memory: &MemorySpace,
        caches: &mut CompressedCaches,
        access: &mut TextureAccess,
    ) -> GpuResult<()> {
        let texel_size = tex.format.texel_size() as usize;
        let mut buffer = [0u8; 16];

        for lane in 0..access.lanes {
            let reference = access.reference[lane];
            let mut result = [0.0f32; 4];
            for sample in access.samples[lane].iter_mut() {
                let mut filtered = [0.0f32; 4];
                for texel in sample.texels.iter_mut() {
                    texel.value = if texel.border {
                        tex.border_color
                    } else if texel.address == BLACK_TEXEL_ADDRESS {
                        [0.0; 4]
                    } else {
                        let data = &mut buffer[..texel_size];
                        if texel.address & TEXTURE_ADDRESS_SPACE_MASK != 0 {
                            caches.read_data(memory, texel.address, data)?;
                        } else {
                            let address = GpuAddr::try_from(texel.address).map_err(|_| FatalError::AddressOverflow {
                                address: texel.address,
                                size: texel_size,
                                space: MemorySpaceKind::Unknown,
                            })?;
                            memory.read(address, data)?;
                        }
                        reorder_components(tex, convert_texel(tex.format, data))
                    };
                    if tex.enable_comparison {
                        let pass = compare(tex.comparison_function, reference, texel.value[0]);
                        let v = if pass { 1.0 } else { 0.0 };
                        texel.value = [v, v, v, 1.0];
                    }
                    for c in 0..4 {
                        filtered[c] += texel.weight * texel.value[c];
                    }
                }
                for c in 0..4 {
                    result[c] += sample.weight * filtered[c];
                }
            }
            access.result[lane] = result;
        }
        Ok(())
    }
}

// ── Sampler glue ────────────────────────────────────────────────────────────

/// Texture unit bound to the state and memory of one shading pass.
pub struct TextureContext<'a> {
    pub unit: &'a mut TextureUnit,
    pub state: &'a GpuState,
    pub memory: &'a MemorySpace,
    pub caches: &'a mut CompressedCaches,
    pub trace: bool,
}

impl TextureSampler for TextureContext<'_> {
    fn sample(&mut self, request: &TextureRequest) -> GpuResult<[Vec4; STAMP_FRAGMENTS]> {
        let mut access = TextureAccess::new(request);
        let unit = request.unit as usize;

        if request.op == TextureOp::AttributeRead {
            let stream = self
                .state
                .streams
                .get(unit)
                .ok_or_else(|| FatalError::Invariant(format!("attribute load from stream {}", unit)))?;
            for lane in 0..access.lanes {
                let element = access.coords[lane][0].max(0.0).floor() as u32;
                access.result[lane] = read_attribute(self.memory, stream, element)?;
            }
            return Ok(access.result);
        }

        let tex = self
            .state
            .textures
            .get(unit)
            .ok_or_else(|| FatalError::Invariant(format!("texture unit {} out of range", unit)))?;
        if !tex.enable {
            return Err(FatalError::Invariant(format!("sampling disabled texture unit {}", unit)));
        }
        self.unit.generate_access(tex, &mut access)?;
        self.unit.fill_access(tex, self.memory, self.caches, &mut access)?;
        if self.trace {
            log::debug!(
                target: TRACE_TARGET,
                "  Texture: unit {} {:?} lod {:?} aniso {}",
                unit,
                tex.format,
                &access.lod[..access.lanes],
                access.aniso_samples
            );
        }
        Ok(access.result)
    }
}
