// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

/// Four-component float vector (x, y, z, w / r, g, b, a).
pub type Vec4 = [f32; 4];

/// Four-component integer vector (address registers).
pub type IVec4 = [i32; 4];

/// 32-bit GPU bus address carrying a memory space tag.
pub type GpuAddr = u32;

/// 64-bit texel address carrying a compressed address space tag.
pub type TexelAddr = u64;

// ── Memory address spaces ───────────────────────────────────────────────────

/// Bits selecting the memory space of a bus address.
pub const ADDRESS_SPACE_MASK: u32 = 0xC000_0000;
/// GPU-local memory space tag.
pub const GPU_ADDRESS_SPACE: u32 = 0x0000_0000;
/// System (mapped) memory space tag.
pub const SYSTEM_ADDRESS_SPACE: u32 = 0x8000_0000;
/// Offset bits inside a memory space.
pub const SPACE_OFFSET_MASK: u32 = 0x3FFF_FFFF;

// ── Compressed texture address spaces ───────────────────────────────────────

pub const TEXTURE_ADDRESS_SPACE_MASK: u64 = 0xFF00_0000_0000_0000;
pub const UNCOMPRESSED_TEXTURE_SPACE: u64 = 0x0000_0000_0000_0000;
pub const DXT1_RGB_SPACE: u64 = 0x1000_0000_0000_0000;
pub const DXT1_RGBA_SPACE: u64 = 0x2000_0000_0000_0000;
pub const DXT3_RGBA_SPACE: u64 = 0x3000_0000_0000_0000;
pub const DXT5_RGBA_SPACE: u64 = 0x4000_0000_0000_0000;
pub const LATC1_SPACE: u64 = 0x5000_0000_0000_0000;
pub const LATC1_SIGNED_SPACE: u64 = 0x6000_0000_0000_0000;
pub const LATC2_SPACE: u64 = 0x7000_0000_0000_0000;
pub const LATC2_SIGNED_SPACE: u64 = 0x8000_0000_0000_0000;
/// Sentinel address for texels outside the texture (reads as zero).
pub const BLACK_TEXEL_ADDRESS: u64 = 0x00FF_FFFF_FFFF_FFFF;

// ── Architectural limits ────────────────────────────────────────────────────

pub const MAX_VERTEX_ATTRIBUTES: usize = 16;
pub const MAX_FRAGMENT_ATTRIBUTES: usize = 16;
pub const MAX_STREAM_BUFFERS: usize = 16;
pub const MAX_TEXTURES: usize = 16;
pub const MAX_RENDER_TARGETS: usize = 8;
pub const MAX_USER_CLIP_PLANES: usize = 6;
/// Constant bank size (PARAM covers the first 256, PARAM2 the rest).
pub const MAX_SHADER_CONSTANTS: usize = 512;
pub const MAX_TEMPORARIES: usize = 32;
pub const MAX_ADDRESS_REGISTERS: usize = 4;
pub const MAX_PREDICATE_REGISTERS: usize = 32;
pub const MAX_SHADER_OUTPUTS: usize = 16;
pub const MAX_MSAA_SAMPLES: usize = 8;
pub const MAX_DISPLAY_RES: u32 = 4096;
/// Fragments per stamp (2x2 quad).
pub const STAMP_FRAGMENTS: usize = 4;
/// Attribute map value marking an unused vertex input.
pub const ST_INACTIVE_ATTRIBUTE: u32 = 255;

// ── Well-known attribute slots ──────────────────────────────────────────────

pub const POSITION_ATTRIBUTE: usize = 0;
pub const COLOR_ATTRIBUTE: usize = 1;

/// Size of one native shader instruction in bytes.
pub const SHADER_INSTRUCTION_SIZE: usize = 16;

/// Bytes in a mebibyte.
pub const MIB: usize = 1024 * 1024;

/// Clamp every component of a vector to [0, 1].
#[inline]
pub fn saturate(v: Vec4) -> Vec4 {
    [
        v[0].clamp(0.0, 1.0),
        v[1].clamp(0.0, 1.0),
        v[2].clamp(0.0, 1.0),
        v[3].clamp(0.0, 1.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_tags_disjoint() {
        assert_eq!(GPU_ADDRESS_SPACE & SPACE_OFFSET_MASK, 0);
        assert_eq!(SYSTEM_ADDRESS_SPACE & SPACE_OFFSET_MASK, 0);
        assert_eq!(SYSTEM_ADDRESS_SPACE & ADDRESS_SPACE_MASK, SYSTEM_ADDRESS_SPACE);
    }

    #[test]
    fn test_black_texel_has_no_space_tag() {
        assert_eq!(BLACK_TEXEL_ADDRESS & TEXTURE_ADDRESS_SPACE_MASK, 0);
    }

    #[test]
    fn test_saturate() {
        assert_eq!(saturate([-1.0, 0.5, 2.0, 1.0]), [0.0, 0.5, 1.0, 1.0]);
    }
}
