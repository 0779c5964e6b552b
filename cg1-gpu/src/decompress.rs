// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! S3TC (DXT1/DXT3/DXT5) and LATC block decompression.
//!
//! Blocks decode to 16 texels stored in Morton order, so that a decompressed
//! block lines up with the texture unit's Morton texel addressing. DXT
//! formats expand to RGBA8, LATC1 to one byte per texel and LATC2 to two
//! (luminance, alpha).

use cg1_common::{
    FatalError, GpuResult, DXT1_RGBA_SPACE, DXT1_RGB_SPACE, DXT3_RGBA_SPACE, DXT5_RGBA_SPACE,
    LATC1_SIGNED_SPACE, LATC1_SPACE, LATC2_SIGNED_SPACE, LATC2_SPACE,
};

use crate::pixel_mapper::morton;
use crate::state::TextureCompression;

/// Texels in a compression block.
pub const BLOCK_TEXELS: usize = 16;

/// Decompression function for one compressed address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decompressor {
    Dxt1Rgb,
    Dxt1Rgba,
    Dxt3Rgba,
    Dxt5Rgba,
    Latc1,
    Latc1Signed,
    Latc2,
    Latc2Signed,
}

pub const ALL_DECOMPRESSORS: [Decompressor; 8] = [
    Decompressor::Dxt1Rgb,
    Decompressor::Dxt1Rgba,
    Decompressor::Dxt3Rgba,
    Decompressor::Dxt5Rgba,
    Decompressor::Latc1,
    Decompressor::Latc1Signed,
    Decompressor::Latc2,
    Decompressor::Latc2Signed,
];

impl Decompressor {
    /// Texel address space served by this format.
    pub fn space(self) -> u64 {
        match self {
            Self::Dxt1Rgb => DXT1_RGB_SPACE,
            Self::Dxt1Rgba => DXT1_RGBA_SPACE,
            Self::Dxt3Rgba => DXT3_RGBA_SPACE,
            Self::Dxt5Rgba => DXT5_RGBA_SPACE,
            Self::Latc1 => LATC1_SPACE,
            Self::Latc1Signed => LATC1_SIGNED_SPACE,
            Self::Latc2 => LATC2_SPACE,
            Self::Latc2Signed => LATC2_SIGNED_SPACE,
        }
    }

    pub fn for_space(space: u64) -> Option<Self> {
        ALL_DECOMPRESSORS.into_iter().find(|d| d.space() == space)
    }

    /// Decompressor for a texture compression mode, `None` if uncompressed.
    pub fn for_compression(compression: TextureCompression) -> Option<Self> {
        match compression {
            TextureCompression::None => None,
            TextureCompression::Dxt1Rgb => Some(Self::Dxt1Rgb),
            TextureCompression::Dxt1Rgba => Some(Self::Dxt1Rgba),
            TextureCompression::Dxt3Rgba => Some(Self::Dxt3Rgba),
            TextureCompression::Dxt5Rgba => Some(Self::Dxt5Rgba),
            TextureCompression::Latc1 => Some(Self::Latc1),
            TextureCompression::Latc1Signed => Some(Self::Latc1Signed),
            TextureCompression::Latc2 => Some(Self::Latc2),
            TextureCompression::Latc2Signed => Some(Self::Latc2Signed),
        }
    }

    /// Bytes of one compressed 4x4 block.
    pub fn block_bytes(self) -> usize {
        match self {
            Self::Dxt1Rgb | Self::Dxt1Rgba | Self::Latc1 | Self::Latc1Signed => 8,
            Self::Dxt3Rgba | Self::Dxt5Rgba | Self::Latc2 | Self::Latc2Signed => 16,
        }
    }

    /// Bytes of one decompressed texel.
    pub fn texel_bytes(self) -> usize {
        match self {
            Self::Dxt1Rgb | Self::Dxt1Rgba | Self::Dxt3Rgba | Self::Dxt5Rgba => 4,
            Self::Latc1 | Self::Latc1Signed => 1,
            Self::Latc2 | Self::Latc2Signed => 2,
        }
    }

    /// log2 of the decompressed to compressed size ratio.
    pub fn ratio_shift(self) -> u32 {
        match self {
            Self::Dxt1Rgb | Self::Dxt1Rgba => 3,
            Self::Dxt3Rgba | Self::Dxt5Rgba => 2,
            Self::Latc1 | Self::Latc1Signed | Self::Latc2 | Self::Latc2Signed => 1,
        }
    }

    /// Decompress `compressed_bytes` of `src` into `dst`.
    pub fn decode(self, src: &[u8], dst: &mut [u8], compressed_bytes: usize) -> GpuResult<()> {
        let block = self.block_bytes();
        let out_block = BLOCK_TEXELS * self.texel_bytes();
        let blocks = compressed_bytes / block;
        if compressed_bytes % block != 0 || src.len() < compressed_bytes || dst.len() < blocks * out_block {
            return Err(FatalError::Invariant(format!(
                "{:?} decode of {} bytes with src {} dst {}",
                self,
                compressed_bytes,
                src.len(),
                dst.len()
            )));
        }
        for (input, output) in src[..compressed_bytes]
            .chunks_exact(block)
            .zip(dst.chunks_exact_mut(out_block))
        {
            match self {
                Self::Dxt1Rgb => decode_dxt1(input, output, false),
                Self::Dxt1Rgba => decode_dxt1(input, output, true),
                Self::Dxt3Rgba => decode_dxt3(input, output),
                Self::Dxt5Rgba => decode_dxt5(input, output),
                Self::Latc1 => decode_latc_channel(&input[..8], output, 1, 0, false),
                Self::Latc1Signed => decode_latc_channel(&input[..8], output, 1, 0, true),
                Self::Latc2 | Self::Latc2Signed => {
                    let signed = self == Self::Latc2Signed;
                    decode_latc_channel(&input[..8], output, 2, 0, signed);
                    decode_latc_channel(&input[8..16], output, 2, 1, signed);
                }
            }
        }
        Ok(())
    }
}

/// Destination slot of texel `i` (row-major in the block) in Morton order.
#[inline]
fn morton_slot(i: usize) -> usize {
    morton((i % 4) as u32, (i / 4) as u32) as usize
}

fn rgb565(c: u16) -> [u8; 3] {
    let r = ((c >> 11) & 0x1F) as u8;
    let g = ((c >> 5) & 0x3F) as u8;
    let b = (c & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

fn lerp(a: u8, b: u8, num: u32, den: u32) -> u8 {
    ((a as u32 * (den - num) + b as u32 * num) / den) as u8
}

fn lerp_signed(a: i8, b: i8, num: i32, den: i32) -> i8 {
    ((a as i32 * (den - num) + b as i32 * num) / den) as i8
}

/// Color palette of a DXT color block. `punch_through` enables the
/// three-color mode with transparent black when color0 <= color1.
fn color_palette(block: &[u8], punch_through: bool) -> [[u8; 4]; 4] {
    let c0 = u16::from_le_bytes([block[0], block[1]]);
    let c1 = u16::from_le_bytes([block[2], block[3]]);
    let (a, b) = (rgb565(c0), rgb565(c1));
    let mix = |num, den| [lerp(a[0], b[0], num, den), lerp(a[1], b[1], num, den), lerp(a[2], b[2], num, den), 255];
    if c0 > c1 || !punch_through {
        [[a[0], a[1], a[2], 255], [b[0], b[1], b[2], 255], mix(1, 3), mix(2, 3)]
    } else {
        [[a[0], a[1], a[2], 255], [b[0], b[1], b[2], 255], mix(1, 2), [0, 0, 0, 0]]
    }
}

fn color_indices(block: &[u8]) -> u32 {
    u32::from_le_bytes([block[4], block[5], block[6], block[7]])
}

fn decode_dxt1(block: &[u8], out: &mut [u8], alpha: bool) {
    let palette = color_palette(block, true);
    let indices = color_indices(block);
    for i in 0..BLOCK_TEXELS {
        let mut texel = palette[((indices >> (2 * i)) & 0x3) as usize];
        if !alpha {
            texel[3] = 255;
        }
        let slot = morton_slot(i) * 4;
        out[slot..slot + 4].copy_from_slice(&texel);
    }
}

fn decode_dxt3(block: &[u8], out: &mut [u8]) {
    let mut alpha_bytes = [0u8; 8];
    alpha_bytes.copy_from_slice(&block[..8]);
    let alphas = u64::from_le_bytes(alpha_bytes);
    let palette = color_palette(&block[8..], false);
    let indices = color_indices(&block[8..]);
    for i in 0..BLOCK_TEXELS {
        let mut texel = palette[((indices >> (2 * i)) & 0x3) as usize];
        texel[3] = ((alphas >> (4 * i)) & 0xF) as u8 * 17;
        let slot = morton_slot(i) * 4;
        out[slot..slot + 4].copy_from_slice(&texel);
    }
}

fn alpha_palette(a0: u8, a1: u8) -> [u8; 8] {
    let mut p = [a0, a1, 0, 0, 0, 0, 0, 0];
    if a0 > a1 {
        for k in 1..7 {
            p[k + 1] = lerp(a0, a1, k as u32, 7);
        }
    } else {
        for k in 1..5 {
            p[k + 1] = lerp(a0, a1, k as u32, 5);
        }
        p[6] = 0;
        p[7] = 255;
    }
    p
}

fn alpha_palette_signed(a0: i8, a1: i8) -> [i8; 8] {
    let mut p = [a0, a1, 0, 0, 0, 0, 0, 0];
    if a0 > a1 {
        for k in 1..7 {
            p[k + 1] = lerp_signed(a0, a1, k as i32, 7);
        }
    } else {
        for k in 1..5 {
            p[k + 1] = lerp_signed(a0, a1, k as i32, 5);
        }
        p[6] = -127;
        p[7] = 127;
    }
    p
}

/// 48-bit little-endian index field of an alpha block.
fn alpha_indices(block: &[u8]) -> u64 {
    block[2..8]
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, &b)| acc | (b as u64) << (8 * i))
}

fn decode_dxt5(block: &[u8], out: &mut [u8]) {
    let alphas = alpha_palette(block[0], block[1]);
    let a_idx = alpha_indices(block);
    let palette = color_palette(&block[8..], false);
    let indices = color_indices(&block[8..]);
    for i in 0..BLOCK_TEXELS {
        let mut texel = palette[((indices >> (2 * i)) & 0x3) as usize];
        texel[3] = alphas[((a_idx >> (3 * i)) & 0x7) as usize];
        let slot = morton_slot(i) * 4;
        out[slot..slot + 4].copy_from_slice(&texel);
    }
}

/// One LATC channel (same encoding as a DXT5 alpha block) written to
/// byte `channel` of each `stride`-byte texel.
fn decode_latc_channel(block: &[u8], out: &mut [u8], stride: usize, channel: usize, signed: bool) {
    let indices = alpha_indices(block);
    let palette: [u8; 8] = if signed {
        alpha_palette_signed(block[0] as i8, block[1] as i8).map(|v| v as u8)
    } else {
        alpha_palette(block[0], block[1])
    };
    for i in 0..BLOCK_TEXELS {
        out[morton_slot(i) * stride + channel] = palette[((indices >> (3 * i)) & 0x7) as usize];
    }
}
