// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! GPU register identifiers and the 16-byte register payload.
//!
//! A register write carries a `(GpuRegister, sub-index)` pair and a
//! [`RegData`]. Array registers (constants, streams, texture units, render
//! targets) use the sub-index to select the element; scalar registers only
//! accept sub-index 0.

use cg1_common::{
    FatalError, GpuResult, Vec4, MAX_RENDER_TARGETS, MAX_SHADER_CONSTANTS, MAX_STREAM_BUFFERS,
    MAX_TEXTURES, MAX_USER_CLIP_PLANES, MAX_VERTEX_ATTRIBUTES, MAX_FRAGMENT_ATTRIBUTES,
};

/// Vertex and fragment targets of the unified shader registers.
pub const SHADER_TARGETS: usize = 2;
/// Cube map faces.
pub const CUBEMAP_FACES: usize = 6;
/// Mip levels per texture (4096 texels at level 0).
pub const MAX_TEXTURE_LEVELS: usize = 13;
/// TEXTURE_ADDRESS slots per unit (level x face).
pub const TEXTURE_ADDRESS_PER_UNIT: usize = MAX_TEXTURE_LEVELS * CUBEMAP_FACES;
pub const TEXTURE_ADDRESS_SLOTS: usize = MAX_TEXTURES * TEXTURE_ADDRESS_PER_UNIT;

/// Sub-index of TEXTURE_ADDRESS for a unit, mip level and cube face.
#[inline]
pub fn texture_address_sub(unit: usize, level: usize, face: usize) -> usize {
    unit * TEXTURE_ADDRESS_PER_UNIT + level * CUBEMAP_FACES + face
}

// ── Register payload ────────────────────────────────────────────────────────

/// Raw register value: four little-endian 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegData(pub [u32; 4]);

impl RegData {
    pub const SIZE: usize = 16;

    pub fn from_u32(value: u32) -> Self {
        Self([value, 0, 0, 0])
    }

    pub fn from_i32(value: i32) -> Self {
        Self([value as u32, 0, 0, 0])
    }

    pub fn from_f32(value: f32) -> Self {
        Self([value.to_bits(), 0, 0, 0])
    }

    pub fn from_bool(value: bool) -> Self {
        Self([value as u32, 0, 0, 0])
    }

    pub fn from_vec4(v: Vec4) -> Self {
        Self([v[0].to_bits(), v[1].to_bits(), v[2].to_bits(), v[3].to_bits()])
    }

    pub fn as_u32(&self) -> u32 {
        self.0[0]
    }

    pub fn as_i32(&self) -> i32 {
        self.0[0] as i32
    }

    pub fn as_f32(&self) -> f32 {
        f32::from_bits(self.0[0])
    }

    pub fn as_bool(&self) -> bool {
        self.0[0] != 0
    }

    pub fn as_vec4(&self) -> Vec4 {
        [
            f32::from_bits(self.0[0]),
            f32::from_bits(self.0[1]),
            f32::from_bits(self.0[2]),
            f32::from_bits(self.0[3]),
        ]
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        for (i, w) in self.0.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let mut words = [0u32; 4];
        for (i, w) in words.iter_mut().enumerate() {
            *w = u32::from_le_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]]);
        }
        Self(words)
    }
}

// ── Register identifiers ────────────────────────────────────────────────────

/// Configuration registers, in wire-id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum GpuRegister {
    DisplayXRes = 0,
    DisplayYRes = 1,
    FrontBufferAddr = 2,
    BackBufferAddr = 3,
    ZStencilBufferAddr = 4,
    TextureMemAddr = 5,
    ProgramMemAddr = 6,
    VertexProgram = 7,
    VertexProgramPc = 8,
    VertexProgramSize = 9,
    VertexConstant = 10,
    VertexThreadResources = 11,
    VertexOutputAttribute = 12,
    VertexAttributeMap = 13,
    VertexAttributeDefaultValue = 14,
    StreamAddress = 15,
    StreamStride = 16,
    StreamData = 17,
    StreamElements = 18,
    StreamFrequency = 19,
    StreamStart = 20,
    StreamCount = 21,
    StreamInstances = 22,
    IndexMode = 23,
    IndexStream = 24,
    D3d9ColorStream = 25,
    Primitive = 26,
    FrustumClipping = 27,
    UserClip = 28,
    UserClipPlane = 29,
    FaceMode = 30,
    Culling = 31,
    HierarchicalZ = 32,
    EarlyZ = 33,
    D3d9PixelCoordinates = 34,
    ViewportIniX = 35,
    ViewportIniY = 36,
    ViewportWidth = 37,
    ViewportHeight = 38,
    ScissorTest = 39,
    ScissorIniX = 40,
    ScissorIniY = 41,
    ScissorWidth = 42,
    ScissorHeight = 43,
    DepthRangeNear = 44,
    DepthRangeFar = 45,
    DepthSlopeFactor = 46,
    DepthUnitOffset = 47,
    ZBufferBitPrecission = 48,
    D3d9DepthRange = 49,
    D3d9RasterizationRules = 50,
    TwoSidedLighting = 51,
    Multisampling = 52,
    MsaaSamples = 53,
    Interpolation = 54,
    FragmentInputAttributes = 55,
    FragmentProgram = 56,
    FragmentProgramPc = 57,
    FragmentProgramSize = 58,
    FragmentConstant = 59,
    FragmentThreadResources = 60,
    ModifyFragmentDepth = 61,
    ShaderProgramAddress = 62,
    ShaderProgramSize = 63,
    ShaderProgramLoadPc = 64,
    ShaderProgramPc = 65,
    ShaderThreadResources = 66,
    TextureEnable = 67,
    TextureMode = 68,
    TextureAddress = 69,
    TextureWidth = 70,
    TextureHeight = 71,
    TextureDepth = 72,
    TextureWidth2 = 73,
    TextureHeight2 = 74,
    TextureDepth2 = 75,
    TextureBorder = 76,
    TextureFormat = 77,
    TextureReverse = 78,
    TextureD3d9ColorConv = 79,
    TextureD3d9VInv = 80,
    TextureCompression = 81,
    TextureBlocking = 82,
    TextureBorderColor = 83,
    TextureWrapS = 84,
    TextureWrapT = 85,
    TextureWrapR = 86,
    TextureMinFilter = 87,
    TextureMagFilter = 88,
    TextureEnableComparison = 89,
    TextureComparisonFunction = 90,
    TextureMinLod = 91,
    TextureMaxLod = 92,
    TextureLodBias = 93,
    TextureMinLevel = 94,
    TextureMaxLevel = 95,
    TextUnitLodBias = 96,
    TextureMaxAnisotropy = 97,
    ColorBufferFormat = 98,
    ColorCompression = 99,
    ColorSrgbWrite = 100,
    RenderTargetEnable = 101,
    RenderTargetFormat = 102,
    RenderTargetAddress = 103,
    ZBufferClear = 104,
    StencilBufferClear = 105,
    ZStencilStateBufferMemAddr = 106,
    StencilTest = 107,
    StencilFunction = 108,
    StencilReference = 109,
    StencilCompareMask = 110,
    StencilUpdateMask = 111,
    StencilFailUpdate = 112,
    DepthFailUpdate = 113,
    DepthPassUpdate = 114,
    DepthTest = 115,
    DepthFunction = 116,
    DepthMask = 117,
    ZStencilCompression = 118,
    ColorBufferClear = 119,
    ColorStateBufferMemAddr = 120,
    ColorBlend = 121,
    BlendEquation = 122,
    BlendSrcRgb = 123,
    BlendDstRgb = 124,
    BlendSrcAlpha = 125,
    BlendDstAlpha = 126,
    BlendColor = 127,
    ColorMaskR = 128,
    ColorMaskG = 129,
    ColorMaskB = 130,
    ColorMaskA = 131,
    LogicalOperation = 132,
    LogicOpFunction = 133,
    BlitIniX = 134,
    BlitIniY = 135,
    BlitXOffset = 136,
    BlitYOffset = 137,
    BlitWidth = 138,
    BlitHeight = 139,
    BlitDstAddress = 140,
    BlitDstTxWidth2 = 141,
    BlitDstTxFormat = 142,
    BlitDstTxBlock = 143,
}

/// Every register, in declaration (and wire id) order.
pub const ALL_REGISTERS: [GpuRegister; 144] = [
    GpuRegister::DisplayXRes,
    GpuRegister::DisplayYRes,
    GpuRegister::FrontBufferAddr,
    GpuRegister::BackBufferAddr,
    GpuRegister::ZStencilBufferAddr,
    GpuRegister::TextureMemAddr,
    GpuRegister::ProgramMemAddr,
    GpuRegister::VertexProgram,
    GpuRegister::VertexProgramPc,
    GpuRegister::VertexProgramSize,
    GpuRegister::VertexConstant,
    GpuRegister::VertexThreadResources,
    GpuRegister::VertexOutputAttribute,
    GpuRegister::VertexAttributeMap,
    GpuRegister::VertexAttributeDefaultValue,
    GpuRegister::StreamAddress,
    GpuRegister::StreamStride,
    GpuRegister::StreamData,
    GpuRegister::StreamElements,
    GpuRegister::StreamFrequency,
    GpuRegister::StreamStart,
    GpuRegister::StreamCount,
    GpuRegister::StreamInstances,
    GpuRegister::IndexMode,
    GpuRegister::IndexStream,
    GpuRegister::D3d9ColorStream,
    GpuRegister::Primitive,
    GpuRegister::FrustumClipping,
    GpuRegister::UserClip,
    GpuRegister::UserClipPlane,
    GpuRegister::FaceMode,
    GpuRegister::Culling,
    GpuRegister::HierarchicalZ,
    GpuRegister::EarlyZ,
    GpuRegister::D3d9PixelCoordinates,
    GpuRegister::ViewportIniX,
    GpuRegister::ViewportIniY,
    GpuRegister::ViewportWidth,
    GpuRegister::ViewportHeight,
    GpuRegister::ScissorTest,
    GpuRegister::ScissorIniX,
    GpuRegister::ScissorIniY,
    GpuRegister::ScissorWidth,
    GpuRegister::ScissorHeight,
    GpuRegister::DepthRangeNear,
    GpuRegister::DepthRangeFar,
    GpuRegister::DepthSlopeFactor,
    GpuRegister::DepthUnitOffset,
    GpuRegister::ZBufferBitPrecission,
    GpuRegister::D3d9DepthRange,
    GpuRegister::D3d9RasterizationRules,
    GpuRegister::TwoSidedLighting,
    GpuRegister::Multisampling,
    GpuRegister::MsaaSamples,
    GpuRegister::Interpolation,
    GpuRegister::FragmentInputAttributes,
    GpuRegister::FragmentProgram,
    GpuRegister::FragmentProgramPc,
    GpuRegister::FragmentProgramSize,
    GpuRegister::FragmentConstant,
    GpuRegister::FragmentThreadResources,
    GpuRegister::ModifyFragmentDepth,
    GpuRegister::ShaderProgramAddress,
    GpuRegister::ShaderProgramSize,
    GpuRegister::ShaderProgramLoadPc,
    GpuRegister::ShaderProgramPc,
    GpuRegister::ShaderThreadResources,
    GpuRegister::TextureEnable,
    GpuRegister::TextureMode,
    GpuRegister::TextureAddress,
    GpuRegister::TextureWidth,
    GpuRegister::TextureHeight,
    GpuRegister::TextureDepth,
    GpuRegister::TextureWidth2,
    GpuRegister::TextureHeight2,
    GpuRegister::TextureDepth2,
    GpuRegister::TextureBorder,
    GpuRegister::TextureFormat,
    GpuRegister::TextureReverse,
    GpuRegister::TextureD3d9ColorConv,
    GpuRegister::TextureD3d9VInv,
    GpuRegister::TextureCompression,
    GpuRegister::TextureBlocking,
    GpuRegister::TextureBorderColor,
    GpuRegister::TextureWrapS,
    GpuRegister::TextureWrapT,
    GpuRegister::TextureWrapR,
    GpuRegister::TextureMinFilter,
    GpuRegister::TextureMagFilter,
    GpuRegister::TextureEnableComparison,
    GpuRegister::TextureComparisonFunction,
    GpuRegister::TextureMinLod,
    GpuRegister::TextureMaxLod,
    GpuRegister::TextureLodBias,
    GpuRegister::TextureMinLevel,
    GpuRegister::TextureMaxLevel,
    GpuRegister::TextUnitLodBias,
    GpuRegister::TextureMaxAnisotropy,
    GpuRegister::ColorBufferFormat,
    GpuRegister::ColorCompression,
    GpuRegister::ColorSrgbWrite,
    GpuRegister::RenderTargetEnable,
    GpuRegister::RenderTargetFormat,
    GpuRegister::RenderTargetAddress,
    GpuRegister::ZBufferClear,
    GpuRegister::StencilBufferClear,
    GpuRegister::ZStencilStateBufferMemAddr,
    GpuRegister::StencilTest,
    GpuRegister::StencilFunction,
    GpuRegister::StencilReference,
    GpuRegister::StencilCompareMask,
    GpuRegister::StencilUpdateMask,
    GpuRegister::StencilFailUpdate,
    GpuRegister::DepthFailUpdate,
    GpuRegister::DepthPassUpdate,
    GpuRegister::DepthTest,
    GpuRegister::DepthFunction,
    GpuRegister::DepthMask,
    GpuRegister::ZStencilCompression,
    GpuRegister::ColorBufferClear,
    GpuRegister::ColorStateBufferMemAddr,
    GpuRegister::ColorBlend,
    GpuRegister::BlendEquation,
    GpuRegister::BlendSrcRgb,
    GpuRegister::BlendDstRgb,
    GpuRegister::BlendSrcAlpha,
    GpuRegister::BlendDstAlpha,
    GpuRegister::BlendColor,
    GpuRegister::ColorMaskR,
    GpuRegister::ColorMaskG,
    GpuRegister::ColorMaskB,
    GpuRegister::ColorMaskA,
    GpuRegister::LogicalOperation,
    GpuRegister::LogicOpFunction,
    GpuRegister::BlitIniX,
    GpuRegister::BlitIniY,
    GpuRegister::BlitXOffset,
    GpuRegister::BlitYOffset,
    GpuRegister::BlitWidth,
    GpuRegister::BlitHeight,
    GpuRegister::BlitDstAddress,
    GpuRegister::BlitDstTxWidth2,
    GpuRegister::BlitDstTxFormat,
    GpuRegister::BlitDstTxBlock,
];

impl GpuRegister {
    /// Decode a register id from the trace.
    pub fn from_raw(value: u32) -> GpuResult<Self> {
        ALL_REGISTERS
            .get(value as usize)
            .copied()
            .ok_or_else(|| FatalError::MalformedTrace(format!("unknown register id {value}")))
    }

    /// Number of sub-registers (array length) of this register.
    pub fn sub_count(self) -> usize {
        match self {
            Self::VertexConstant
            | Self::FragmentConstant => MAX_SHADER_CONSTANTS,
            Self::VertexOutputAttribute
            | Self::VertexAttributeMap
            | Self::VertexAttributeDefaultValue => MAX_VERTEX_ATTRIBUTES,
            Self::StreamAddress
            | Self::StreamStride
            | Self::StreamData
            | Self::StreamElements
            | Self::StreamFrequency
            | Self::D3d9ColorStream => MAX_STREAM_BUFFERS,
            Self::UserClip => MAX_USER_CLIP_PLANES,
            Self::Interpolation
            | Self::FragmentInputAttributes => MAX_FRAGMENT_ATTRIBUTES,
            Self::ShaderProgramPc
            | Self::ShaderThreadResources => SHADER_TARGETS,
            Self::TextureEnable
            | Self::TextureMode
            | Self::TextureWidth
            | Self::TextureHeight
            | Self::TextureDepth
            | Self::TextureWidth2
            | Self::TextureHeight2
            | Self::TextureDepth2
            | Self::TextureBorder
            | Self::TextureFormat
            | Self::TextureReverse
            | Self::TextureD3d9ColorConv
            | Self::TextureD3d9VInv
            | Self::TextureCompression
            | Self::TextureBlocking
            | Self::TextureBorderColor
            | Self::TextureWrapS
            | Self::TextureWrapT
            | Self::TextureWrapR
            | Self::TextureMinFilter
            | Self::TextureMagFilter
            | Self::TextureEnableComparison
            | Self::TextureComparisonFunction
            | Self::TextureMinLod
            | Self::TextureMaxLod
            | Self::TextureLodBias
            | Self::TextureMinLevel
            | Self::TextureMaxLevel
            | Self::TextUnitLodBias
            | Self::TextureMaxAnisotropy => MAX_TEXTURES,
            Self::TextureAddress => TEXTURE_ADDRESS_SLOTS,
            Self::RenderTargetEnable
            | Self::RenderTargetFormat
            | Self::RenderTargetAddress
            | Self::ColorBlend
            | Self::BlendEquation
            | Self::BlendSrcRgb
            | Self::BlendDstRgb
            | Self::BlendSrcAlpha
            | Self::BlendDstAlpha
            | Self::ColorMaskR
            | Self::ColorMaskG
            | Self::ColorMaskB
            | Self::ColorMaskA => MAX_RENDER_TARGETS,
            _ => 1,
        }
    }

    /// Hardware name, as printed in traces and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::DisplayXRes => "DISPLAY_X_RES",
            Self::DisplayYRes => "DISPLAY_Y_RES",
            Self::FrontBufferAddr => "FRONTBUFFER_ADDR",
            Self::BackBufferAddr => "BACKBUFFER_ADDR",
            Self::ZStencilBufferAddr => "ZSTENCILBUFFER_ADDR",
            Self::TextureMemAddr => "TEXTURE_MEM_ADDR",
            Self::ProgramMemAddr => "PROGRAM_MEM_ADDR",
            Self::VertexProgram => "VERTEX_PROGRAM",
            Self::VertexProgramPc => "VERTEX_PROGRAM_PC",
            Self::VertexProgramSize => "VERTEX_PROGRAM_SIZE",
            Self::VertexConstant => "VERTEX_CONSTANT",
            Self::VertexThreadResources => "VERTEX_THREAD_RESOURCES",
            Self::VertexOutputAttribute => "VERTEX_OUTPUT_ATTRIBUTE",
            Self::VertexAttributeMap => "VERTEX_ATTRIBUTE_MAP",
            Self::VertexAttributeDefaultValue => "VERTEX_ATTRIBUTE_DEFAULT_VALUE",
            Self::StreamAddress => "STREAM_ADDRESS",
            Self::StreamStride => "STREAM_STRIDE",
            Self::StreamData => "STREAM_DATA",
            Self::StreamElements => "STREAM_ELEMENTS",
            Self::StreamFrequency => "STREAM_FREQUENCY",
            Self::StreamStart => "STREAM_START",
            Self::StreamCount => "STREAM_COUNT",
            Self::StreamInstances => "STREAM_INSTANCES",
            Self::IndexMode => "INDEX_MODE",
            Self::IndexStream => "INDEX_STREAM",
            Self::D3d9ColorStream => "D3D9_COLOR_STREAM",
            Self::Primitive => "PRIMITIVE",
            Self::FrustumClipping => "FRUSTUM_CLIPPING",
            Self::UserClip => "USER_CLIP",
            Self::UserClipPlane => "USER_CLIP_PLANE",
            Self::FaceMode => "FACEMODE",
            Self::Culling => "CULLING",
            Self::HierarchicalZ => "HIERARCHICALZ",
            Self::EarlyZ => "EARLYZ",
            Self::D3d9PixelCoordinates => "D3D9_PIXEL_COORDINATES",
            Self::ViewportIniX => "VIEWPORT_INI_X",
            Self::ViewportIniY => "VIEWPORT_INI_Y",
            Self::ViewportWidth => "VIEWPORT_WIDTH",
            Self::ViewportHeight => "VIEWPORT_HEIGHT",
            Self::ScissorTest => "SCISSOR_TEST",
            Self::ScissorIniX => "SCISSOR_INI_X",
            Self::ScissorIniY => "SCISSOR_INI_Y",
            Self::ScissorWidth => "SCISSOR_WIDTH",
            Self::ScissorHeight => "SCISSOR_HEIGHT",
            Self::DepthRangeNear => "DEPTH_RANGE_NEAR",
            Self::DepthRangeFar => "DEPTH_RANGE_FAR",
            Self::DepthSlopeFactor => "DEPTH_SLOPE_FACTOR",
            Self::DepthUnitOffset => "DEPTH_UNIT_OFFSET",
            Self::ZBufferBitPrecission => "Z_BUFFER_BIT_PRECISSION",
            Self::D3d9DepthRange => "D3D9_DEPTH_RANGE",
            Self::D3d9RasterizationRules => "D3D9_RASTERIZATION_RULES",
            Self::TwoSidedLighting => "TWOSIDED_LIGHTING",
            Self::Multisampling => "MULTISAMPLING",
            Self::MsaaSamples => "MSAA_SAMPLES",
            Self::Interpolation => "INTERPOLATION",
            Self::FragmentInputAttributes => "FRAGMENT_INPUT_ATTRIBUTES",
            Self::FragmentProgram => "FRAGMENT_PROGRAM",
            Self::FragmentProgramPc => "FRAGMENT_PROGRAM_PC",
            Self::FragmentProgramSize => "FRAGMENT_PROGRAM_SIZE",
            Self::FragmentConstant => "FRAGMENT_CONSTANT",
            Self::FragmentThreadResources => "FRAGMENT_THREAD_RESOURCES",
            Self::ModifyFragmentDepth => "MODIFY_FRAGMENT_DEPTH",
            Self::ShaderProgramAddress => "SHADER_PROGRAM_ADDRESS",
            Self::ShaderProgramSize => "SHADER_PROGRAM_SIZE",
            Self::ShaderProgramLoadPc => "SHADER_PROGRAM_LOAD_PC",
            Self::ShaderProgramPc => "SHADER_PROGRAM_PC",
            Self::ShaderThreadResources => "SHADER_THREAD_RESOURCES",
            Self::TextureEnable => "TEXTURE_ENABLE",
            Self::TextureMode => "TEXTURE_MODE",
            Self::TextureAddress => "TEXTURE_ADDRESS",
            Self::TextureWidth => "TEXTURE_WIDTH",
            Self::TextureHeight => "TEXTURE_HEIGHT",
            Self::TextureDepth => "TEXTURE_DEPTH",
            Self::TextureWidth2 => "TEXTURE_WIDTH2",
            Self::TextureHeight2 => "TEXTURE_HEIGHT2",
            Self::TextureDepth2 => "TEXTURE_DEPTH2",
            Self::TextureBorder => "TEXTURE_BORDER",
            Self::TextureFormat => "TEXTURE_FORMAT",
            Self::TextureReverse => "TEXTURE_REVERSE",
            Self::TextureD3d9ColorConv => "TEXTURE_D3D9_COLOR_CONV",
            Self::TextureD3d9VInv => "TEXTURE_D3D9_V_INV",
            Self::TextureCompression => "TEXTURE_COMPRESSION",
            Self::TextureBlocking => "TEXTURE_BLOCKING",
            Self::TextureBorderColor => "TEXTURE_BORDER_COLOR",
            Self::TextureWrapS => "TEXTURE_WRAP_S",
            Self::TextureWrapT => "TEXTURE_WRAP_T",
            Self::TextureWrapR => "TEXTURE_WRAP_R",
            Self::TextureMinFilter => "TEXTURE_MIN_FILTER",
            Self::TextureMagFilter => "TEXTURE_MAG_FILTER",
            Self::TextureEnableComparison => "TEXTURE_ENABLE_COMPARISON",
            Self::TextureComparisonFunction => "TEXTURE_COMPARISON_FUNCTION",
            Self::TextureMinLod => "TEXTURE_MIN_LOD",
            Self::TextureMaxLod => "TEXTURE_MAX_LOD",
            Self::TextureLodBias => "TEXTURE_LOD_BIAS",
            Self::TextureMinLevel => "TEXTURE_MIN_LEVEL",
            Self::TextureMaxLevel => "TEXTURE_MAX_LEVEL",
            Self::TextUnitLodBias => "TEXT_UNIT_LOD_BIAS",
            Self::TextureMaxAnisotropy => "TEXTURE_MAX_ANISOTROPY",
            Self::ColorBufferFormat => "COLOR_BUFFER_FORMAT",
            Self::ColorCompression => "COLOR_COMPRESSION",
            Self::ColorSrgbWrite => "COLOR_SRGB_WRITE",
            Self::RenderTargetEnable => "RENDER_TARGET_ENABLE",
            Self::RenderTargetFormat => "RENDER_TARGET_FORMAT",
            Self::RenderTargetAddress => "RENDER_TARGET_ADDRESS",
            Self::ZBufferClear => "Z_BUFFER_CLEAR",
            Self::StencilBufferClear => "STENCIL_BUFFER_CLEAR",
            Self::ZStencilStateBufferMemAddr => "ZSTENCIL_STATE_BUFFER_MEM_ADDR",
            Self::StencilTest => "STENCIL_TEST",
            Self::StencilFunction => "STENCIL_FUNCTION",
            Self::StencilReference => "STENCIL_REFERENCE",
            Self::StencilCompareMask => "STENCIL_COMPARE_MASK",
            Self::StencilUpdateMask => "STENCIL_UPDATE_MASK",
            Self::StencilFailUpdate => "STENCIL_FAIL_UPDATE",
            Self::DepthFailUpdate => "DEPTH_FAIL_UPDATE",
            Self::DepthPassUpdate => "DEPTH_PASS_UPDATE",
            Self::DepthTest => "DEPTH_TEST",
            Self::DepthFunction => "DEPTH_FUNCTION",
            Self::DepthMask => "DEPTH_MASK",
            Self::ZStencilCompression => "ZSTENCIL_COMPRESSION",
            Self::ColorBufferClear => "COLOR_BUFFER_CLEAR",
            Self::ColorStateBufferMemAddr => "COLOR_STATE_BUFFER_MEM_ADDR",
            Self::ColorBlend => "COLOR_BLEND",
            Self::BlendEquation => "BLEND_EQUATION",
            Self::BlendSrcRgb => "BLEND_SRC_RGB",
            Self::BlendDstRgb => "BLEND_DST_RGB",
            Self::BlendSrcAlpha => "BLEND_SRC_ALPHA",
            Self::BlendDstAlpha => "BLEND_DST_ALPHA",
            Self::BlendColor => "BLEND_COLOR",
            Self::ColorMaskR => "COLOR_MASK_R",
            Self::ColorMaskG => "COLOR_MASK_G",
            Self::ColorMaskB => "COLOR_MASK_B",
            Self::ColorMaskA => "COLOR_MASK_A",
            Self::LogicalOperation => "LOGICAL_OPERATION",
            Self::LogicOpFunction => "LOGICOP_FUNCTION",
            Self::BlitIniX => "BLIT_INI_X",
            Self::BlitIniY => "BLIT_INI_Y",
            Self::BlitXOffset => "BLIT_X_OFFSET",
            Self::BlitYOffset => "BLIT_Y_OFFSET",
            Self::BlitWidth => "BLIT_WIDTH",
            Self::BlitHeight => "BLIT_HEIGHT",
            Self::BlitDstAddress => "BLIT_DST_ADDRESS",
            Self::BlitDstTxWidth2 => "BLIT_DST_TX_WIDTH2",
            Self::BlitDstTxFormat => "BLIT_DST_TX_FORMAT",
            Self::BlitDstTxBlock => "BLIT_DST_TX_BLOCK",
        }
    }
}

impl std::fmt::Display for GpuRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Check a sub-index against the register's array length.
pub fn check_sub(reg: GpuRegister, sub: u32) -> GpuResult<usize> {
    let sub = sub as usize;
    if sub >= reg.sub_count() {
        return Err(FatalError::domain(
            reg.name(),
            format!("sub-register {} (limit {})", sub, reg.sub_count()),
        ));
    }
    Ok(sub)
}

/// Iterate every `(register, sub)` pair in declaration order.
pub fn all_register_slots() -> impl Iterator<Item = (GpuRegister, usize)> {
    ALL_REGISTERS
        .iter()
        .flat_map(|&reg| (0..reg.sub_count()).map(move |sub| (reg, sub)))
}
