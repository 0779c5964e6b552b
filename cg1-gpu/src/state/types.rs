// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Enum-valued register domains.
//!
//! Every enum decodes from its raw register value with `from_raw`, which
//! fails with [`FatalError::UnsupportedEnum`] on values outside the domain.

use cg1_common::{FatalError, GpuResult};

macro_rules! raw_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $what:expr, {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            pub fn from_raw(value: u32) -> GpuResult<Self> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    _ => Err(FatalError::unsupported($what, value)),
                }
            }

            pub fn raw(self) -> u32 {
                self as u32
            }
        }
    };
}

// ── Geometry ────────────────────────────────────────────────────────────────

raw_enum!(
    /// Primitive topology of a draw.
    PrimitiveMode, "PRIMITIVE", {
        Triangle = 0,
        TriangleStrip = 1,
        TriangleFan = 2,
        Quad = 3,
        QuadStrip = 4,
        Point = 5,
        Line = 6,
        LineStrip = 7,
        LineFan = 8,
    }
);

raw_enum!(
    CullingMode, "CULLING", {
        None = 0,
        Front = 1,
        Back = 2,
        FrontAndBack = 3,
    }
);

raw_enum!(
    /// Winding that counts as front facing.
    FaceMode, "FACEMODE", {
        Cw = 0,
        Ccw = 1,
    }
);

// ── Per-fragment tests ──────────────────────────────────────────────────────

raw_enum!(
    /// Comparison function for depth, stencil and shadow tests.
    CompareMode, "compare function", {
        Never = 0,
        Less = 1,
        Equal = 2,
        LEqual = 3,
        Greater = 4,
        NotEqual = 5,
        GEqual = 6,
        Always = 7,
    }
);

raw_enum!(
    StencilUpdate, "stencil update function", {
        Keep = 0,
        Zero = 1,
        Replace = 2,
        Incr = 3,
        Decr = 4,
        Invert = 5,
        IncrWrap = 6,
        DecrWrap = 7,
    }
);

// ── Blending ────────────────────────────────────────────────────────────────

raw_enum!(
    BlendEquation, "BLEND_EQUATION", {
        Add = 0,
        Subtract = 1,
        ReverseSubtract = 2,
        Min = 3,
        Max = 4,
    }
);

raw_enum!(
    BlendFactor, "blend function", {
        Zero = 0,
        One = 1,
        SrcColor = 2,
        OneMinusSrcColor = 3,
        DstColor = 4,
        OneMinusDstColor = 5,
        SrcAlpha = 6,
        OneMinusSrcAlpha = 7,
        DstAlpha = 8,
        OneMinusDstAlpha = 9,
        ConstantColor = 10,
        OneMinusConstantColor = 11,
        ConstantAlpha = 12,
        OneMinusConstantAlpha = 13,
        SrcAlphaSaturate = 14,
    }
);

raw_enum!(
    LogicOpMode, "LOGICOP_FUNCTION", {
        Clear = 0,
        And = 1,
        AndReverse = 2,
        Copy = 3,
        AndInverted = 4,
        Noop = 5,
        Xor = 6,
        Or = 7,
        Nor = 8,
        Equiv = 9,
        Invert = 10,
        OrReverse = 11,
        CopyInverted = 12,
        OrInverted = 13,
        Nand = 14,
        Set = 15,
    }
);

// ── Render targets ──────────────────────────────────────────────────────────

raw_enum!(
    /// Render target storage format.
    ColorFormat, "color buffer format", {
        Rgba8888 = 0,
        Rgba16F = 1,
        Rg16F = 2,
        R32F = 3,
        Rgba16 = 4,
    }
);

impl ColorFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Rgba8888 | Self::Rg16F | Self::R32F => 4,
            Self::Rgba16F | Self::Rgba16 => 8,
        }
    }
}

// ── Vertex streams ──────────────────────────────────────────────────────────

raw_enum!(
    /// Element type of a vertex or index stream.
    StreamData, "STREAM_DATA", {
        Unorm8 = 0,
        Snorm8 = 1,
        Unorm16 = 2,
        Snorm16 = 3,
        Unorm32 = 4,
        Snorm32 = 5,
        Float16 = 6,
        Float32 = 7,
        Uint8 = 8,
        Sint8 = 9,
        Uint16 = 10,
        Sint16 = 11,
        Uint32 = 12,
        Sint32 = 13,
    }
);

impl StreamData {
    pub fn size(self) -> u32 {
        match self {
            Self::Unorm8 | Self::Snorm8 | Self::Uint8 | Self::Sint8 => 1,
            Self::Unorm16 | Self::Snorm16 | Self::Float16 | Self::Uint16 | Self::Sint16 => 2,
            Self::Unorm32 | Self::Snorm32 | Self::Float32 | Self::Uint32 | Self::Sint32 => 4,
        }
    }
}

// ── Textures ────────────────────────────────────────────────────────────────

raw_enum!(
    TextureMode, "TEXTURE_MODE", {
        Texture1D = 0,
        Texture2D = 1,
        Texture3D = 2,
        CubeMap = 3,
    }
);

raw_enum!(
    TextureFormat, "TEXTURE_FORMAT", {
        Rgb888 = 0,
        Rgba8888 = 1,
        Rgb565 = 2,
        Rgb555 = 3,
        Rgb444 = 4,
        Rgb332 = 5,
        Rgba5551 = 6,
        Rgba4444 = 7,
        Rgba2222 = 8,
        Rgb101010 = 9,
        Rgba1010102 = 10,
        Rgb121212 = 11,
        Luminance8 = 12,
        Luminance12 = 13,
        Luminance16 = 14,
        Luminance4Alpha4 = 15,
        Luminance8Alpha8 = 16,
        Intensity8 = 17,
        Intensity12 = 18,
        Intensity16 = 19,
        Alpha8 = 20,
        Alpha12 = 21,
        Alpha16 = 22,
        Luminance8Signed = 23,
        Rgba16F = 24,
        Rgba32F = 25,
        Rg16F = 26,
        R32F = 27,
        DepthComponent24 = 28,
        Dxt1Rgb = 29,
        Dxt1Rgba = 30,
        Dxt3Rgba = 31,
        Dxt5Rgba = 32,
        Latc1 = 33,
        Latc1Signed = 34,
        Latc2 = 35,
        Latc2Signed = 36,
    }
);

impl TextureFormat {
    /// Bytes per texel as laid out in memory. Compressed formats report the
    /// size of a decompressed texel.
    pub fn texel_size(self) -> u32 {
        match self {
            Self::Rgb332
            | Self::Rgba2222
            | Self::Luminance8
            | Self::Luminance4Alpha4
            | Self::Intensity8
            | Self::Alpha8
            | Self::Luminance8Signed
            | Self::Latc1
            | Self::Latc1Signed => 1,
            Self::Rgb565
            | Self::Rgb555
            | Self::Rgb444
            | Self::Rgba5551
            | Self::Rgba4444
            | Self::Luminance12
            | Self::Luminance16
            | Self::Luminance8Alpha8
            | Self::Intensity12
            | Self::Intensity16
            | Self::Alpha12
            | Self::Alpha16
            | Self::Latc2
            | Self::Latc2Signed => 2,
            Self::Rgb888
            | Self::Rgba8888
            | Self::Rgb101010
            | Self::Rgba1010102
            | Self::Rg16F
            | Self::R32F
            | Self::DepthComponent24
            | Self::Dxt1Rgb
            | Self::Dxt1Rgba
            | Self::Dxt3Rgba
            | Self::Dxt5Rgba => 4,
            Self::Rgb121212 | Self::Rgba16F => 8,
            Self::Rgba32F => 16,
        }
    }

    pub fn is_compressed(self) -> bool {
        self.compression() != TextureCompression::None
    }

    /// Compression scheme implied by the format.
    pub fn compression(self) -> TextureCompression {
        match self {
            Self::Dxt1Rgb => TextureCompression::Dxt1Rgb,
            Self::Dxt1Rgba => TextureCompression::Dxt1Rgba,
            Self::Dxt3Rgba => TextureCompression::Dxt3Rgba,
            Self::Dxt5Rgba => TextureCompression::Dxt5Rgba,
            Self::Latc1 => TextureCompression::Latc1,
            Self::Latc1Signed => TextureCompression::Latc1Signed,
            Self::Latc2 => TextureCompression::Latc2,
            Self::Latc2Signed => TextureCompression::Latc2Signed,
            _ => TextureCompression::None,
        }
    }
}

raw_enum!(
    TextureCompression, "TEXTURE_COMPRESSION", {
        None = 0,
        Dxt1Rgb = 1,
        Dxt1Rgba = 2,
        Dxt3Rgba = 3,
        Dxt5Rgba = 4,
        Latc1 = 5,
        Latc1Signed = 6,
        Latc2 = 7,
        Latc2Signed = 8,
    }
);

raw_enum!(
    /// Texel layout in memory.
    TextureBlocking, "TEXTURE_BLOCKING", {
        /// Morton order over blocks and superblocks.
        Texture = 0,
        /// Framebuffer tiling (render-to-texture).
        Framebuffer = 1,
    }
);

raw_enum!(
    ClampMode, "texture wrap mode", {
        Clamp = 0,
        ClampToEdge = 1,
        Repeat = 2,
        ClampToBorder = 3,
        MirroredRepeat = 4,
    }
);

raw_enum!(
    FilterMode, "texture filter", {
        Nearest = 0,
        Linear = 1,
        NearestMipmapNearest = 2,
        NearestMipmapLinear = 3,
        LinearMipmapNearest = 4,
        LinearMipmapLinear = 5,
    }
);

impl FilterMode {
    /// Bilinear within a mip level.
    pub fn is_linear(self) -> bool {
        matches!(self, Self::Linear | Self::LinearMipmapNearest | Self::LinearMipmapLinear)
    }

    pub fn uses_mipmaps(self) -> bool {
        !matches!(self, Self::Nearest | Self::Linear)
    }

    /// Blend between two mip levels.
    pub fn is_trilinear(self) -> bool {
        matches!(self, Self::NearestMipmapLinear | Self::LinearMipmapLinear)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_round_trip() {
        assert_eq!(CullingMode::from_raw(2).unwrap(), CullingMode::Back);
        assert_eq!(CullingMode::Back.raw(), 2);
        assert_eq!(BlendFactor::from_raw(14).unwrap(), BlendFactor::SrcAlphaSaturate);
        assert_eq!(LogicOpMode::from_raw(15).unwrap(), LogicOpMode::Set);
    }

    #[test]
    fn test_unknown_values_are_fatal() {
        assert!(matches!(
            CullingMode::from_raw(4),
            Err(FatalError::UnsupportedEnum { what: "CULLING", value: 4 })
        ));
        assert!(PrimitiveMode::from_raw(9).is_err());
        assert!(TextureFormat::from_raw(37).is_err());
        assert!(ClampMode::from_raw(5).is_err());
    }

    #[test]
    fn test_stream_data_sizes() {
        let sizes: Vec<u32> = (0..14).map(|v| StreamData::from_raw(v).unwrap().size()).collect();
        assert_eq!(sizes, vec![1, 1, 2, 2, 4, 4, 2, 4, 1, 1, 2, 2, 4, 4]);
    }

    #[test]
    fn test_compressed_formats() {
        assert!(TextureFormat::Dxt5Rgba.is_compressed());
        assert_eq!(TextureFormat::Latc2Signed.compression(), TextureCompression::Latc2Signed);
        assert!(!TextureFormat::Rgba8888.is_compressed());
        assert_eq!(TextureFormat::Dxt1Rgb.texel_size(), 4);
        assert_eq!(TextureFormat::Latc1.texel_size(), 1);
    }

    #[test]
    fn test_filter_predicates() {
        assert!(FilterMode::LinearMipmapLinear.is_trilinear());
        assert!(FilterMode::LinearMipmapNearest.is_linear());
        assert!(!FilterMode::Linear.uses_mipmaps());
    }
}
