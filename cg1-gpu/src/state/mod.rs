// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! GPU register state.
//!
//! One aggregate of typed fields addressed by `(GpuRegister, sub-index)`.
//! Register writes are validated against each register's domain; a value
//! outside it is fatal. Render target 0 aliases the back buffer address and
//! the color buffer format.

pub mod types;

pub use types::*;

use crate::regs::{
    check_sub, GpuRegister, RegData, CUBEMAP_FACES, MAX_TEXTURE_LEVELS, TEXTURE_ADDRESS_PER_UNIT,
};
use cg1_common::{
    FatalError, GpuAddr, GpuResult, Vec4, MAX_DISPLAY_RES, MAX_FRAGMENT_ATTRIBUTES,
    MAX_RENDER_TARGETS, MAX_SHADER_CONSTANTS, MAX_STREAM_BUFFERS, MAX_TEXTURES,
    MAX_USER_CLIP_PLANES, MAX_VERTEX_ATTRIBUTES, ST_INACTIVE_ATTRIBUTE,
};

/// Largest mip level index (log2 of the maximum texture dimension).
pub const MAX_TEXTURE_LEVEL: u32 = MAX_TEXTURE_LEVELS as u32 - 1;
/// Largest anisotropy ratio a texture unit accepts.
pub const MAX_ANISOTROPY: u32 = 16;

// ── Per-unit state ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamState {
    pub address: GpuAddr,
    pub stride: u32,
    pub data: StreamData,
    /// Components per element (0 disables the stream).
    pub elements: u32,
    /// 0 reads by index; N > 0 advances once every N instances.
    pub frequency: u32,
    /// D3D9 color order (BGRA) swap.
    pub d3d9_color: bool,
}

impl Default for StreamState {
    fn default() -> Self {
        Self {
            address: 0,
            stride: 0,
            data: StreamData::Float32,
            elements: 0,
            frequency: 0,
            d3d9_color: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureUnitState {
    pub enable: bool,
    pub mode: TextureMode,
    /// Base address per mip level and cube face.
    pub address: [[GpuAddr; CUBEMAP_FACES]; MAX_TEXTURE_LEVELS],
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub width2: u32,
    pub height2: u32,
    pub depth2: u32,
    pub border: u32,
    pub format: TextureFormat,
    pub reverse: bool,
    pub d3d9_color_conv: bool,
    pub d3d9_v_inv: bool,
    pub compression: TextureCompression,
    pub blocking: TextureBlocking,
    pub border_color: Vec4,
    pub wrap_s: ClampMode,
    pub wrap_t: ClampMode,
    pub wrap_r: ClampMode,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub enable_comparison: bool,
    pub comparison_function: CompareMode,
    pub min_lod: f32,
    pub max_lod: f32,
    pub lod_bias: f32,
    pub min_level: u32,
    pub max_level: u32,
    pub unit_lod_bias: f32,
    pub max_anisotropy: u32,
}

impl Default for TextureUnitState {
    fn default() -> Self {
        Self {
            enable: false,
            mode: TextureMode::Texture2D,
            address: [[0; CUBEMAP_FACES]; MAX_TEXTURE_LEVELS],
            width: 0,
            height: 0,
            depth: 0,
            width2: 0,
            height2: 0,
            depth2: 0,
            border: 0,
            format: TextureFormat::Rgba8888,
            reverse: false,
            d3d9_color_conv: false,
            d3d9_v_inv: false,
            compression: TextureCompression::None,
            blocking: TextureBlocking::Texture,
            border_color: [0.0, 0.0, 0.0, 0.0],
            wrap_s: ClampMode::Repeat,
            wrap_t: ClampMode::Repeat,
            wrap_r: ClampMode::Repeat,
            min_filter: FilterMode::NearestMipmapLinear,
            mag_filter: FilterMode::Linear,
            enable_comparison: false,
            comparison_function: CompareMode::LEqual,
            min_lod: -1000.0,
            max_lod: 1000.0,
            lod_bias: 0.0,
            min_level: 0,
            max_level: MAX_TEXTURE_LEVEL,
            unit_lod_bias: 0.0,
            max_anisotropy: 1,
        }
    }
}

/// Render target binding plus its blend and mask state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTargetState {
    pub enable: bool,
    pub format: ColorFormat,
    pub address: GpuAddr,
    pub blend: bool,
    pub equation: BlendEquation,
    pub src_rgb: BlendFactor,
    pub dst_rgb: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    /// R, G, B, A write enables.
    pub color_mask: [bool; 4],
}

impl Default for RenderTargetState {
    fn default() -> Self {
        Self {
            enable: false,
            format: ColorFormat::Rgba8888,
            address: 0,
            blend: false,
            equation: BlendEquation::Add,
            src_rgb: BlendFactor::One,
            dst_rgb: BlendFactor::Zero,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            color_mask: [true; 4],
        }
    }
}

// ── Register aggregate ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct GpuState {
    // Display and buffers.
    pub display_x_res: u32,
    pub display_y_res: u32,
    pub front_buffer_addr: GpuAddr,
    pub back_buffer_addr: GpuAddr,
    pub zstencil_buffer_addr: GpuAddr,
    pub texture_mem_addr: GpuAddr,
    pub program_mem_addr: GpuAddr,

    // Vertex program.
    pub vertex_program_addr: GpuAddr,
    pub vertex_program_pc: u32,
    pub vertex_program_size: u32,
    pub vertex_constants: Vec<Vec4>,
    pub vertex_thread_resources: u32,
    pub vertex_output_attribute: [bool; MAX_VERTEX_ATTRIBUTES],
    pub vertex_attribute_map: [u32; MAX_VERTEX_ATTRIBUTES],
    pub vertex_attribute_default: [Vec4; MAX_VERTEX_ATTRIBUTES],

    // Streams.
    pub streams: [StreamState; MAX_STREAM_BUFFERS],
    pub stream_start: u32,
    pub stream_count: u32,
    pub stream_instances: u32,
    pub index_mode: bool,
    pub index_stream: u32,

    // Primitive and clipping.
    pub primitive: PrimitiveMode,
    pub frustum_clipping: bool,
    pub user_clip: [Vec4; MAX_USER_CLIP_PLANES],
    pub user_clip_planes: bool,

    // Rasterization.
    pub face_mode: FaceMode,
    pub culling: CullingMode,
    pub hierarchical_z: bool,
    pub early_z: bool,
    pub d3d9_pixel_coordinates: bool,
    pub viewport_ini_x: i32,
    pub viewport_ini_y: i32,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub scissor_test: bool,
    pub scissor_ini_x: i32,
    pub scissor_ini_y: i32,
    pub scissor_width: u32,
    pub scissor_height: u32,
    pub depth_range_near: f32,
    pub depth_range_far: f32,
    pub depth_slope_factor: f32,
    pub depth_unit_offset: f32,
    pub z_buffer_bit_precission: u32,
    pub d3d9_depth_range: bool,
    pub d3d9_rasterization_rules: bool,
    pub two_sided_lighting: bool,
    pub multisampling: bool,
    pub msaa_samples: u32,
    pub interpolation: [bool; MAX_FRAGMENT_ATTRIBUTES],
    pub fragment_input_attributes: [bool; MAX_FRAGMENT_ATTRIBUTES],

    // Fragment program.
    pub fragment_program_addr: GpuAddr,
    pub fragment_program_pc: u32,
    pub fragment_program_size: u32,
    pub fragment_constants: Vec<Vec4>,
    pub fragment_thread_resources: u32,
    pub modify_fragment_depth: bool,

    // Unified program load.
    pub shader_program_addr: GpuAddr,
    pub shader_program_size: u32,
    pub shader_program_load_pc: u32,

    pub textures: Vec<TextureUnitState>,

    // Color buffer and render targets.
    pub color_buffer_format: ColorFormat,
    pub color_compression: bool,
    pub color_srgb_write: bool,
    pub render_targets: [RenderTargetState; MAX_RENDER_TARGETS],

    // Z/stencil.
    pub z_buffer_clear: u32,
    pub stencil_buffer_clear: u32,
    pub zstencil_state_buffer_addr: GpuAddr,
    pub stencil_test: bool,
    pub stencil_function: CompareMode,
    pub stencil_reference: u32,
    pub stencil_compare_mask: u32,
    pub stencil_update_mask: u32,
    pub stencil_fail_update: StencilUpdate,
    pub depth_fail_update: StencilUpdate,
    pub depth_pass_update: StencilUpdate,
    pub depth_test: bool,
    pub depth_function: CompareMode,
    pub depth_mask: bool,
    pub zstencil_compression: bool,

    // Color state.
    pub color_buffer_clear: Vec4,
    pub color_state_buffer_addr: GpuAddr,
    pub blend_color: Vec4,
    pub logical_operation: bool,
    pub logic_op_function: LogicOpMode,

    // Blitter.
    pub blit_ini_x: u32,
    pub blit_ini_y: u32,
    pub blit_x_offset: u32,
    pub blit_y_offset: u32,
    pub blit_width: u32,
    pub blit_height: u32,
    pub blit_dst_address: GpuAddr,
    pub blit_dst_tx_width2: u32,
    pub blit_dst_tx_format: TextureFormat,
    pub blit_dst_tx_block: TextureBlocking,
}

impl Default for GpuState {
    fn default() -> Self {
        Self::new()
    }
}

fn check_range<T: PartialOrd + std::fmt::Display>(
    reg: GpuRegister,
    value: T,
    lo: T,
    hi: T,
) -> GpuResult<T> {
    if value < lo || value > hi {
        return Err(FatalError::domain(reg.name(), value));
    }
    Ok(value)
}

fn check_unit_f32(reg: GpuRegister, value: f32) -> GpuResult<f32> {
    if value.is_nan() {
        return Err(FatalError::domain(reg.name(), value));
    }
    Ok(value.clamp(0.0, 1.0))
}

impl GpuState {
    /// State with every register at its reset value.
    pub fn new() -> Self {
        let mut render_targets = [RenderTargetState::default(); MAX_RENDER_TARGETS];
        render_targets[0].enable = true;

        let mut vertex_output_attribute = [false; MAX_VERTEX_ATTRIBUTES];
        vertex_output_attribute[0] = true;
        let mut fragment_input_attributes = [false; MAX_FRAGMENT_ATTRIBUTES];
        fragment_input_attributes[0] = true;

        Self {
            display_x_res: 400,
            display_y_res: 400,
            front_buffer_addr: 0,
            back_buffer_addr: 0,
            zstencil_buffer_addr: 0,
            texture_mem_addr: 0,
            program_mem_addr: 0,

            vertex_program_addr: 0,
            vertex_program_pc: 0,
            vertex_program_size: 0,
            vertex_constants: vec![[0.0; 4]; MAX_SHADER_CONSTANTS],
            vertex_thread_resources: 1,
            vertex_output_attribute,
            vertex_attribute_map: [ST_INACTIVE_ATTRIBUTE; MAX_VERTEX_ATTRIBUTES],
            vertex_attribute_default: [[0.0, 0.0, 0.0, 1.0]; MAX_VERTEX_ATTRIBUTES],

            streams: [StreamState::default(); MAX_STREAM_BUFFERS],
            stream_start: 0,
            stream_count: 0,
            stream_instances: 1,
            index_mode: false,
            index_stream: 0,

            primitive: PrimitiveMode::Triangle,
            frustum_clipping: true,
            user_clip: [[0.0; 4]; MAX_USER_CLIP_PLANES],
            user_clip_planes: false,

            face_mode: FaceMode::Ccw,
            culling: CullingMode::Back,
            hierarchical_z: false,
            early_z: true,
            d3d9_pixel_coordinates: false,
            viewport_ini_x: 0,
            viewport_ini_y: 0,
            viewport_width: 400,
            viewport_height: 400,
            scissor_test: false,
            scissor_ini_x: 0,
            scissor_ini_y: 0,
            scissor_width: 400,
            scissor_height: 400,
            depth_range_near: 0.0,
            depth_range_far: 1.0,
            depth_slope_factor: 0.0,
            depth_unit_offset: 0.0,
            z_buffer_bit_precission: 24,
            d3d9_depth_range: false,
            d3d9_rasterization_rules: false,
            two_sided_lighting: false,
            multisampling: false,
            msaa_samples: 2,
            interpolation: [true; MAX_FRAGMENT_ATTRIBUTES],
            fragment_input_attributes,

            fragment_program_addr: 0,
            fragment_program_pc: 0,
            fragment_program_size: 0,
            fragment_constants: vec![[0.0; 4]; MAX_SHADER_CONSTANTS],
            fragment_thread_resources: 1,
            modify_fragment_depth: false,

            shader_program_addr: 0,
            shader_program_size: 0,
            shader_program_load_pc: 0,

            textures: vec![TextureUnitState::default(); MAX_TEXTURES],

            color_buffer_format: ColorFormat::Rgba8888,
            color_compression: false,
            color_srgb_write: false,
            render_targets,

            z_buffer_clear: 0x00FF_FFFF,
            stencil_buffer_clear: 0,
            zstencil_state_buffer_addr: 0,
            stencil_test: false,
            stencil_function: CompareMode::Always,
            stencil_reference: 0,
            stencil_compare_mask: 0xFF,
            stencil_update_mask: 0xFF,
            stencil_fail_update: StencilUpdate::Keep,
            depth_fail_update: StencilUpdate::Keep,
            depth_pass_update: StencilUpdate::Keep,
            depth_test: false,
            depth_function: CompareMode::Less,
            depth_mask: true,
            zstencil_compression: false,

            color_buffer_clear: [0.0, 0.0, 0.0, 1.0],
            color_state_buffer_addr: 0,
            blend_color: [0.0; 4],
            logical_operation: false,
            logic_op_function: LogicOpMode::Copy,

            blit_ini_x: 0,
            blit_ini_y: 0,
            blit_x_offset: 0,
            blit_y_offset: 0,
            blit_width: 0,
            blit_height: 0,
            blit_dst_address: 0,
            blit_dst_tx_width2: 0,
            blit_dst_tx_format: TextureFormat::Rgba8888,
            blit_dst_tx_block: TextureBlocking::Texture,
        }
    }

    /// Return every register to its reset value.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Samples per pixel actually rendered.
    pub fn samples(&self) -> u32 {
        if self.multisampling {
            self.msaa_samples
        } else {
            1
        }
    }

    // ── Register access ─────────────────────────────────────────────────────

    /// Validated register write, as issued by the command processor.
    pub fn write_register(&mut self, reg: GpuRegister, sub: u32, data: RegData) -> GpuResult<()> {
        log::trace!("GpuState: {}[{}] <- {:08X?}", reg, sub, data.0);
        self.apply(reg, sub, data, true)
    }

    /// Write without domain checks. Enum values must still decode.
    pub fn restore_register(&mut self, reg: GpuRegister, sub: u32, data: RegData) -> GpuResult<()> {
        self.apply(reg, sub, data, false)
    }

    fn apply(
        &mut self,
        reg: GpuRegister,
        sub: u32,
        data: RegData,
        validate: bool,
    ) -> GpuResult<()> {
        use GpuRegister as R;

        let s = check_sub(reg, sub)?;
        let range_u32 = |lo: u32, hi: u32| -> GpuResult<u32> {
            if validate {
                check_range(reg, data.as_u32(), lo, hi)
            } else {
                Ok(data.as_u32())
            }
        };
        let range_i32 = |lo: i32, hi: i32| -> GpuResult<i32> {
            if validate {
                check_range(reg, data.as_i32(), lo, hi)
            } else {
                Ok(data.as_i32())
            }
        };
        let unit_f32 = || -> GpuResult<f32> {
            if validate {
                check_unit_f32(reg, data.as_f32())
            } else {
                Ok(data.as_f32())
            }
        };
        let unit_vec4 = || -> GpuResult<Vec4> {
            let v = data.as_vec4();
            if !validate {
                return Ok(v);
            }
            Ok([
                check_unit_f32(reg, v[0])?,
                check_unit_f32(reg, v[1])?,
                check_unit_f32(reg, v[2])?,
                check_unit_f32(reg, v[3])?,
            ])
        };
        let max_res = MAX_DISPLAY_RES as i32;

        match reg {
            R::DisplayXRes => self.display_x_res = range_u32(1, MAX_DISPLAY_RES)?,
            R::DisplayYRes => self.display_y_res = range_u32(1, MAX_DISPLAY_RES)?,
            R::FrontBufferAddr => self.front_buffer_addr = data.as_u32(),
            R::BackBufferAddr => {
                self.back_buffer_addr = data.as_u32();
                self.render_targets[0].address = data.as_u32();
            }
            R::ZStencilBufferAddr => self.zstencil_buffer_addr = data.as_u32(),
            R::TextureMemAddr => self.texture_mem_addr = data.as_u32(),
            R::ProgramMemAddr => self.program_mem_addr = data.as_u32(),

            R::VertexProgram => self.vertex_program_addr = data.as_u32(),
            R::VertexProgramPc => self.vertex_program_pc = data.as_u32(),
            R::VertexProgramSize => self.vertex_program_size = data.as_u32(),
            R::VertexConstant => self.vertex_constants[s] = data.as_vec4(),
            R::VertexThreadResources => self.vertex_thread_resources = data.as_u32(),
            R::VertexOutputAttribute => self.vertex_output_attribute[s] = data.as_bool(),
            R::VertexAttributeMap => {
                let stream = data.as_u32();
                if validate
                    && stream != ST_INACTIVE_ATTRIBUTE
                    && stream as usize >= MAX_STREAM_BUFFERS
                {
                    return Err(FatalError::domain(reg.name(), stream));
                }
                self.vertex_attribute_map[s] = stream;
            }
            R::VertexAttributeDefaultValue => self.vertex_attribute_default[s] = data.as_vec4(),

            R::StreamAddress => self.streams[s].address = data.as_u32(),
            R::StreamStride => self.streams[s].stride = data.as_u32(),
            R::StreamData => self.streams[s].data = StreamData::from_raw(data.as_u32())?,
            R::StreamElements => self.streams[s].elements = range_u32(0, 4)?,
            R::StreamFrequency => self.streams[s].frequency = data.as_u32(),
            R::StreamStart => self.stream_start = data.as_u32(),
            R::StreamCount => self.stream_count = data.as_u32(),
            R::StreamInstances => self.stream_instances = data.as_u32(),
            R::IndexMode => self.index_mode = data.as_bool(),
            R::IndexStream => self.index_stream = range_u32(0, MAX_STREAM_BUFFERS as u32 - 1)?,
            R::D3d9ColorStream => self.streams[s].d3d9_color = data.as_bool(),

            R::Primitive => self.primitive = PrimitiveMode::from_raw(data.as_u32())?,
            R::FrustumClipping => self.frustum_clipping = data.as_bool(),
            R::UserClip => self.user_clip[s] = data.as_vec4(),
            R::UserClipPlane => self.user_clip_planes = data.as_bool(),

            R::FaceMode => self.face_mode = FaceMode::from_raw(data.as_u32())?,
            R::Culling => self.culling = CullingMode::from_raw(data.as_u32())?,
            R::HierarchicalZ => self.hierarchical_z = data.as_bool(),
            R::EarlyZ => self.early_z = data.as_bool(),
            R::D3d9PixelCoordinates => self.d3d9_pixel_coordinates = data.as_bool(),
            R::ViewportIniX => self.viewport_ini_x = range_i32(-max_res, max_res)?,
            R::ViewportIniY => self.viewport_ini_y = range_i32(-max_res, max_res)?,
            R::ViewportWidth => self.viewport_width = range_u32(0, MAX_DISPLAY_RES)?,
            R::ViewportHeight => self.viewport_height = range_u32(0, MAX_DISPLAY_RES)?,
            R::ScissorTest => self.scissor_test = data.as_bool(),
            R::ScissorIniX => self.scissor_ini_x = range_i32(-max_res, max_res)?,
            R::ScissorIniY => self.scissor_ini_y = range_i32(-max_res, max_res)?,
            R::ScissorWidth => self.scissor_width = range_u32(0, MAX_DISPLAY_RES)?,
            R::ScissorHeight => self.scissor_height = range_u32(0, MAX_DISPLAY_RES)?,
            R::DepthRangeNear => self.depth_range_near = unit_f32()?,
            R::DepthRangeFar => self.depth_range_far = unit_f32()?,
            R::DepthSlopeFactor => self.depth_slope_factor = data.as_f32(),
            R::DepthUnitOffset => self.depth_unit_offset = data.as_f32(),
            R::ZBufferBitPrecission => {
                let bits = data.as_u32();
                if validate && bits != 16 && bits != 24 {
                    return Err(FatalError::domain(reg.name(), bits));
                }
                self.z_buffer_bit_precission = bits;
            }
            R::D3d9DepthRange => self.d3d9_depth_range = data.as_bool(),
            R::D3d9RasterizationRules => self.d3d9_rasterization_rules = data.as_bool(),
            R::TwoSidedLighting => self.two_sided_lighting = data.as_bool(),
            R::Multisampling => self.multisampling = data.as_bool(),
            R::MsaaSamples => {
                let samples = data.as_u32();
                if validate && !matches!(samples, 2 | 4 | 6 | 8) {
                    return Err(FatalError::domain(reg.name(), samples));
                }
                self.msaa_samples = samples;
            }
            R::Interpolation => self.interpolation[s] = data.as_bool(),
            R::FragmentInputAttributes => self.fragment_input_attributes[s] = data.as_bool(),

            R::FragmentProgram => self.fragment_program_addr = data.as_u32(),
            R::FragmentProgramPc => self.fragment_program_pc = data.as_u32(),
            R::FragmentProgramSize => self.fragment_program_size = data.as_u32(),
            R::FragmentConstant => self.fragment_constants[s] = data.as_vec4(),
            R::FragmentThreadResources => self.fragment_thread_resources = data.as_u32(),
            R::ModifyFragmentDepth => self.modify_fragment_depth = data.as_bool(),

            R::ShaderProgramAddress => self.shader_program_addr = data.as_u32(),
            R::ShaderProgramSize => self.shader_program_size = data.as_u32(),
            R::ShaderProgramLoadPc => self.shader_program_load_pc = data.as_u32(),
            // Unified targets alias the per-stage registers: 0 vertex, 1 fragment.
            R::ShaderProgramPc => match s {
                0 => self.vertex_program_pc = data.as_u32(),
                _ => self.fragment_program_pc = data.as_u32(),
            },
            R::ShaderThreadResources => match s {
                0 => self.vertex_thread_resources = data.as_u32(),
                _ => self.fragment_thread_resources = data.as_u32(),
            },

            R::TextureAddress => {
                let unit = s / TEXTURE_ADDRESS_PER_UNIT;
                let rem = s % TEXTURE_ADDRESS_PER_UNIT;
                let (level, face) = (rem / CUBEMAP_FACES, rem % CUBEMAP_FACES);
                self.textures[unit].address[level][face] = data.as_u32();
            }
            R::TextureEnable
            | R::TextureMode
            | R::TextureWidth
            | R::TextureHeight
            | R::TextureDepth
            | R::TextureWidth2
            | R::TextureHeight2
            | R::TextureDepth2
            | R::TextureBorder
            | R::TextureFormat
            | R::TextureReverse
            | R::TextureD3d9ColorConv
            | R::TextureD3d9VInv
            | R::TextureCompression
            | R::TextureBlocking
            | R::TextureBorderColor
            | R::TextureWrapS
            | R::TextureWrapT
            | R::TextureWrapR
            | R::TextureMinFilter
            | R::TextureMagFilter
            | R::TextureEnableComparison
            | R::TextureComparisonFunction
            | R::TextureMinLod
            | R::TextureMaxLod
            | R::TextureLodBias
            | R::TextureMinLevel
            | R::TextureMaxLevel
            | R::TextUnitLodBias
            | R::TextureMaxAnisotropy => self.apply_texture(reg, s, data, validate)?,

            R::ColorBufferFormat => {
                let format = ColorFormat::from_raw(data.as_u32())?;
                self.color_buffer_format = format;
                self.render_targets[0].format = format;
            }
            R::ColorCompression => self.color_compression = data.as_bool(),
            R::ColorSrgbWrite => self.color_srgb_write = data.as_bool(),
            R::RenderTargetEnable => self.render_targets[s].enable = data.as_bool(),
            R::RenderTargetFormat => {
                let format = ColorFormat::from_raw(data.as_u32())?;
                self.render_targets[s].format = format;
                if s == 0 {
                    self.color_buffer_format = format;
                }
            }
            R::RenderTargetAddress => {
                self.render_targets[s].address = data.as_u32();
                if s == 0 {
                    self.back_buffer_addr = data.as_u32();
                }
            }

            R::ZBufferClear => self.z_buffer_clear = range_u32(0, 0x00FF_FFFF)?,
            R::StencilBufferClear => self.stencil_buffer_clear = range_u32(0, 0xFF)?,
            R::ZStencilStateBufferMemAddr => self.zstencil_state_buffer_addr = data.as_u32(),
            R::StencilTest => self.stencil_test = data.as_bool(),
            R::StencilFunction => self.stencil_function = CompareMode::from_raw(data.as_u32())?,
            R::StencilReference => self.stencil_reference = range_u32(0, 0xFF)?,
            R::StencilCompareMask => self.stencil_compare_mask = range_u32(0, 0xFF)?,
            R::StencilUpdateMask => self.stencil_update_mask = range_u32(0, 0xFF)?,
            R::StencilFailUpdate => {
                self.stencil_fail_update = StencilUpdate::from_raw(data.as_u32())?
            }
            R::DepthFailUpdate => self.depth_fail_update = StencilUpdate::from_raw(data.as_u32())?,
            R::DepthPassUpdate => self.depth_pass_update = StencilUpdate::from_raw(data.as_u32())?,
            R::DepthTest => self.depth_test = data.as_bool(),
            R::DepthFunction => self.depth_function = CompareMode::from_raw(data.as_u32())?,
            R::DepthMask => self.depth_mask = data.as_bool(),
            R::ZStencilCompression => self.zstencil_compression = data.as_bool(),

            R::ColorBufferClear => self.color_buffer_clear = unit_vec4()?,
            R::ColorStateBufferMemAddr => self.color_state_buffer_addr = data.as_u32(),
            R::ColorBlend => self.render_targets[s].blend = data.as_bool(),
            R::BlendEquation => {
                self.render_targets[s].equation = BlendEquation::from_raw(data.as_u32())?
            }
            R::BlendSrcRgb => {
                self.render_targets[s].src_rgb = BlendFactor::from_raw(data.as_u32())?
            }
            R::BlendDstRgb => {
                self.render_targets[s].dst_rgb = BlendFactor::from_raw(data.as_u32())?
            }
            R::BlendSrcAlpha => {
                self.render_targets[s].src_alpha = BlendFactor::from_raw(data.as_u32())?
            }
            R::BlendDstAlpha => {
                self.render_targets[s].dst_alpha = BlendFactor::from_raw(data.as_u32())?
            }
            R::BlendColor => self.blend_color = unit_vec4()?,
            R::ColorMaskR => self.render_targets[s].color_mask[0] = data.as_bool(),
            R::ColorMaskG => self.render_targets[s].color_mask[1] = data.as_bool(),
            R::ColorMaskB => self.render_targets[s].color_mask[2] = data.as_bool(),
            R::ColorMaskA => self.render_targets[s].color_mask[3] = data.as_bool(),
            R::LogicalOperation => self.logical_operation = data.as_bool(),
            R::LogicOpFunction => self.logic_op_function = LogicOpMode::from_raw(data.as_u32())?,

            R::BlitIniX => self.blit_ini_x = range_u32(0, MAX_DISPLAY_RES)?,
            R::BlitIniY => self.blit_ini_y = range_u32(0, MAX_DISPLAY_RES)?,
            R::BlitXOffset => self.blit_x_offset = data.as_u32(),
            R::BlitYOffset => self.blit_y_offset = data.as_u32(),
            R::BlitWidth => self.blit_width = range_u32(0, MAX_DISPLAY_RES)?,
            R::BlitHeight => self.blit_height = range_u32(0, MAX_DISPLAY_RES)?,
            R::BlitDstAddress => self.blit_dst_address = data.as_u32(),
            R::BlitDstTxWidth2 => self.blit_dst_tx_width2 = range_u32(0, MAX_TEXTURE_LEVEL)?,
            R::BlitDstTxFormat => self.blit_dst_tx_format = TextureFormat::from_raw(data.as_u32())?,
            R::BlitDstTxBlock => self.blit_dst_tx_block = TextureBlocking::from_raw(data.as_u32())?,
        }
        Ok(())
    }

    fn apply_texture(
        &mut self,
        reg: GpuRegister,
        unit: usize,
        data: RegData,
        validate: bool,
    ) -> GpuResult<()> {
        use GpuRegister as R;

        let log2 = |value: u32| -> GpuResult<u32> {
            if validate {
                check_range(reg, value, 0, MAX_TEXTURE_LEVEL)
            } else {
                Ok(value)
            }
        };
        let tex = &mut self.textures[unit];
        match reg {
            R::TextureEnable => tex.enable = data.as_bool(),
            R::TextureMode => tex.mode = TextureMode::from_raw(data.as_u32())?,
            R::TextureWidth => tex.width = data.as_u32(),
            R::TextureHeight => tex.height = data.as_u32(),
            R::TextureDepth => tex.depth = data.as_u32(),
            R::TextureWidth2 => tex.width2 = log2(data.as_u32())?,
            R::TextureHeight2 => tex.height2 = log2(data.as_u32())?,
            R::TextureDepth2 => tex.depth2 = log2(data.as_u32())?,
            R::TextureBorder => tex.border = data.as_u32(),
            R::TextureFormat => tex.format = TextureFormat::from_raw(data.as_u32())?,
            R::TextureReverse => tex.reverse = data.as_bool(),
            R::TextureD3d9ColorConv => tex.d3d9_color_conv = data.as_bool(),
            R::TextureD3d9VInv => tex.d3d9_v_inv = data.as_bool(),
            R::TextureCompression => tex.compression = TextureCompression::from_raw(data.as_u32())?,
            R::TextureBlocking => tex.blocking = TextureBlocking::from_raw(data.as_u32())?,
            R::TextureBorderColor => tex.border_color = data.as_vec4(),
            R::TextureWrapS => tex.wrap_s = ClampMode::from_raw(data.as_u32())?,
            R::TextureWrapT => tex.wrap_t = ClampMode::from_raw(data.as_u32())?,
            R::TextureWrapR => tex.wrap_r = ClampMode::from_raw(data.as_u32())?,
            R::TextureMinFilter => tex.min_filter = FilterMode::from_raw(data.as_u32())?,
            R::TextureMagFilter => {
                let filter = FilterMode::from_raw(data.as_u32())?;
                if validate && filter.uses_mipmaps() {
                    return Err(FatalError::unsupported(reg.name(), data.as_u32()));
                }
                tex.mag_filter = filter;
            }
            R::TextureEnableComparison => tex.enable_comparison = data.as_bool(),
            R::TextureComparisonFunction => {
                tex.comparison_function = CompareMode::from_raw(data.as_u32())?
            }
            R::TextureMinLod => tex.min_lod = data.as_f32(),
            R::TextureMaxLod => tex.max_lod = data.as_f32(),
            R::TextureLodBias => tex.lod_bias = data.as_f32(),
            R::TextureMinLevel => tex.min_level = log2(data.as_u32())?,
            R::TextureMaxLevel => tex.max_level = log2(data.as_u32())?,
            R::TextUnitLodBias => tex.unit_lod_bias = data.as_f32(),
            R::TextureMaxAnisotropy => {
                let aniso = data.as_u32();
                if validate && !(1..=MAX_ANISOTROPY).contains(&aniso) {
                    return Err(FatalError::domain(reg.name(), aniso));
                }
                tex.max_anisotropy = aniso;
            }
            _ => return Err(FatalError::Invariant(format!("{} is not a texture register", reg))),
        }
        Ok(())
    }

    /// Current value of a register, as a REG_READ or a snapshot sees it.
    pub fn read_register(&self, reg: GpuRegister, sub: u32) -> GpuResult<RegData> {
        use GpuRegister as R;

        let s = check_sub(reg, sub)?;
        let u = RegData::from_u32;
        let b = RegData::from_bool;
        let f = RegData::from_f32;
        let v = RegData::from_vec4;
        let tex = &self.textures[s.min(MAX_TEXTURES - 1)];
        let rt = &self.render_targets[s.min(MAX_RENDER_TARGETS - 1)];
        let stream = &self.streams[s.min(MAX_STREAM_BUFFERS - 1)];

        let data = match reg {
            R::DisplayXRes => u(self.display_x_res),
            R::DisplayYRes => u(self.display_y_res),
            R::FrontBufferAddr => u(self.front_buffer_addr),
            R::BackBufferAddr => u(self.back_buffer_addr),
            R::ZStencilBufferAddr => u(self.zstencil_buffer_addr),
            R::TextureMemAddr => u(self.texture_mem_addr),
            R::ProgramMemAddr => u(self.program_mem_addr),

            R::VertexProgram => u(self.vertex_program_addr),
            R::VertexProgramPc => u(self.vertex_program_pc),
            R::VertexProgramSize => u(self.vertex_program_size),
            R::VertexConstant => v(self.vertex_constants[s]),
            R::VertexThreadResources => u(self.vertex_thread_resources),
            R::VertexOutputAttribute => b(self.vertex_output_attribute[s]),
            R::VertexAttributeMap => u(self.vertex_attribute_map[s]),
            R::VertexAttributeDefaultValue => v(self.vertex_attribute_default[s]),

            R::StreamAddress => u(stream.address),
            R::StreamStride => u(stream.stride),
            R::StreamData => u(stream.data.raw()),
            R::StreamElements => u(stream.elements),
            R::StreamFrequency => u(stream.frequency),
            R::StreamStart => u(self.stream_start),
            R::StreamCount => u(self.stream_count),
            R::StreamInstances => u(self.stream_instances),
            R::IndexMode => b(self.index_mode),
            R::IndexStream => u(self.index_stream),
            R::D3d9ColorStream => b(stream.d3d9_color),

            R::Primitive => u(self.primitive.raw()),
            R::FrustumClipping => b(self.frustum_clipping),
            R::UserClip => v(self.user_clip[s]),
            R::UserClipPlane => b(self.user_clip_planes),

            R::FaceMode => u(self.face_mode.raw()),
            R::Culling => u(self.culling.raw()),
            R::HierarchicalZ => b(self.hierarchical_z),
            R::EarlyZ => b(self.early_z),
            R::D3d9PixelCoordinates => b(self.d3d9_pixel_coordinates),
            R::ViewportIniX => RegData::from_i32(self.viewport_ini_x),
            R::ViewportIniY => RegData::from_i32(self.viewport_ini_y),
            R::ViewportWidth => u(self.viewport_width),
            R::ViewportHeight => u(self.viewport_height),
            R::ScissorTest => b(self.scissor_test),
            R::ScissorIniX => RegData::from_i32(self.scissor_ini_x),
            R::ScissorIniY => RegData::from_i32(self.scissor_ini_y),
            R::ScissorWidth => u(self.scissor_width),
            R::ScissorHeight => u(self.scissor_height),
            R::DepthRangeNear => f(self.depth_range_near),
            R::DepthRangeFar => f(self.depth_range_far),
            R::DepthSlopeFactor => f(self.depth_slope_factor),
            R::DepthUnitOffset => f(self.depth_unit_offset),
            R::ZBufferBitPrecission => u(self.z_buffer_bit_precission),
            R::D3d9DepthRange => b(self.d3d9_depth_range),
            R::D3d9RasterizationRules => b(self.d3d9_rasterization_rules),
            R::TwoSidedLighting => b(self.two_sided_lighting),
            R::Multisampling => b(self.multisampling),
            R::MsaaSamples => u(self.msaa_samples),
            R::Interpolation => b(self.interpolation[s]),
            R::FragmentInputAttributes => b(self.fragment_input_attributes[s]),

            R::FragmentProgram => u(self.fragment_program_addr),
            R::FragmentProgramPc => u(self.fragment_program_pc),
            R::FragmentProgramSize => u(self.fragment_program_size),
            R::FragmentConstant => v(self.fragment_constants[s]),
            R::FragmentThreadResources => u(self.fragment_thread_resources),
            R::ModifyFragmentDepth => b(self.modify_fragment_depth),

            R::ShaderProgramAddress => u(self.shader_program_addr),
            R::ShaderProgramSize => u(self.shader_program_size),
            R::ShaderProgramLoadPc => u(self.shader_program_load_pc),
            R::ShaderProgramPc => u(if s == 0 {
                self.vertex_program_pc
            } else {
                self.fragment_program_pc
            }),
            R::ShaderThreadResources => u(if s == 0 {
                self.vertex_thread_resources
            } else {
                self.fragment_thread_resources
            }),

            R::TextureAddress => {
                let unit = s / TEXTURE_ADDRESS_PER_UNIT;
                let rem = s % TEXTURE_ADDRESS_PER_UNIT;
                u(self.textures[unit].address[rem / CUBEMAP_FACES][rem % CUBEMAP_FACES])
            }
            R::TextureEnable => b(tex.enable),
            R::TextureMode => u(tex.mode.raw()),
            R::TextureWidth => u(tex.width),
            R::TextureHeight => u(tex.height),
            R::TextureDepth => u(tex.depth),
            R::TextureWidth2 => u(tex.width2),
            R::TextureHeight2 => u(tex.height2),
            R::TextureDepth2 => u(tex.depth2),
            R::TextureBorder => u(tex.border),
            R::TextureFormat => u(tex.format.raw()),
            R::TextureReverse => b(tex.reverse),
            R::TextureD3d9ColorConv => b(tex.d3d9_color_conv),
            R::TextureD3d9VInv => b(tex.d3d9_v_inv),
            R::TextureCompression => u(tex.compression.raw()),
            R::TextureBlocking => u(tex.blocking.raw()),
            R::TextureBorderColor => v(tex.border_color),
            R::TextureWrapS => u(tex.wrap_s.raw()),
            R::TextureWrapT => u(tex.wrap_t.raw()),
            R::TextureWrapR => u(tex.wrap_r.raw()),
            R::TextureMinFilter => u(tex.min_filter.raw()),
            R::TextureMagFilter => u(tex.mag_filter.raw()),
            R::TextureEnableComparison => b(tex.enable_comparison),
            R::TextureComparisonFunction => u(tex.comparison_function.raw()),
            R::TextureMinLod => f(tex.min_lod),
            R::TextureMaxLod => f(tex.max_lod),
            R::TextureLodBias => f(tex.lod_bias),
            R::TextureMinLevel => u(tex.min_level),
            R::TextureMaxLevel => u(tex.max_level),
            R::TextUnitLodBias => f(tex.unit_lod_bias),
            R::TextureMaxAnisotropy => u(tex.max_anisotropy),

            R::ColorBufferFormat => u(self.color_buffer_format.raw()),
            R::ColorCompression => b(self.color_compression),
            R::ColorSrgbWrite => b(self.color_srgb_write),
            R::RenderTargetEnable => b(rt.enable),
            R::RenderTargetFormat => u(rt.format.raw()),
            R::RenderTargetAddress => u(rt.address),

            R::ZBufferClear => u(self.z_buffer_clear),
            R::StencilBufferClear => u(self.stencil_buffer_clear),
            R::ZStencilStateBufferMemAddr => u(self.zstencil_state_buffer_addr),
            R::StencilTest => b(self.stencil_test),
            R::StencilFunction => u(self.stencil_function.raw()),
            R::StencilReference => u(self.stencil_reference),
            R::StencilCompareMask => u(self.stencil_compare_mask),
            R::StencilUpdateMask => u(self.stencil_update_mask),
            R::StencilFailUpdate => u(self.stencil_fail_update.raw()),
            R::DepthFailUpdate => u(self.depth_fail_update.raw()),
            R::DepthPassUpdate => u(self.depth_pass_update.raw()),
            R::DepthTest => b(self.depth_test),
            R::DepthFunction => u(self.depth_function.raw()),
            R::DepthMask => b(self.depth_mask),
            R::ZStencilCompression => b(self.zstencil_compression),

            R::ColorBufferClear => v(self.color_buffer_clear),
            R::ColorStateBufferMemAddr => u(self.color_state_buffer_addr),
            R::ColorBlend => b(rt.blend),
            R::BlendEquation => u(rt.equation.raw()),
            R::BlendSrcRgb => u(rt.src_rgb.raw()),
            R::BlendDstRgb => u(rt.dst_rgb.raw()),
            R::BlendSrcAlpha => u(rt.src_alpha.raw()),
            R::BlendDstAlpha => u(rt.dst_alpha.raw()),
            R::BlendColor => v(self.blend_color),
            R::ColorMaskR => b(rt.color_mask[0]),
            R::ColorMaskG => b(rt.color_mask[1]),
            R::ColorMaskB => b(rt.color_mask[2]),
            R::ColorMaskA => b(rt.color_mask[3]),
            R::LogicalOperation => b(self.logical_operation),
            R::LogicOpFunction => u(self.logic_op_function.raw()),

            R::BlitIniX => u(self.blit_ini_x),
            R::BlitIniY => u(self.blit_ini_y),
            R::BlitXOffset => u(self.blit_x_offset),
            R::BlitYOffset => u(self.blit_y_offset),
            R::BlitWidth => u(self.blit_width),
            R::BlitHeight => u(self.blit_height),
            R::BlitDstAddress => u(self.blit_dst_address),
            R::BlitDstTxWidth2 => u(self.blit_dst_tx_width2),
            R::BlitDstTxFormat => u(self.blit_dst_tx_format.raw()),
            R::BlitDstTxBlock => u(self.blit_dst_tx_block.raw()),
        };
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::{all_register_slots, texture_address_sub};

    #[test]
    fn test_reset_values() {
        let s = GpuState::new();
        assert_eq!(s.culling, CullingMode::Back);
        assert_eq!(s.face_mode, FaceMode::Ccw);
        assert_eq!(s.depth_function, CompareMode::Less);
        assert_eq!(s.z_buffer_clear, 0x00FF_FFFF);
        assert_eq!(s.color_buffer_clear, [0.0, 0.0, 0.0, 1.0]);
        assert!(s.render_targets[0].enable);
        assert!(!s.render_targets[1].enable);
        assert!(!s.render_targets[0].blend);
        assert!(s.render_targets[3].color_mask.iter().all(|&m| m));
        assert_eq!((s.depth_range_near, s.depth_range_far), (0.0, 1.0));
        assert_eq!(s.stream_instances, 1);
    }

    #[test]
    fn test_render_target_zero_aliases() {
        let mut s = GpuState::new();
        s.write_register(GpuRegister::BackBufferAddr, 0, RegData::from_u32(0x1000)).unwrap();
        assert_eq!(s.render_targets[0].address, 0x1000);
        s.write_register(GpuRegister::RenderTargetAddress, 0, RegData::from_u32(0x2000)).unwrap();
        assert_eq!(s.back_buffer_addr, 0x2000);
        let rgba16f = RegData::from_u32(ColorFormat::Rgba16F.raw());
        s.write_register(GpuRegister::RenderTargetFormat, 0, rgba16f).unwrap();
        assert_eq!(s.color_buffer_format, ColorFormat::Rgba16F);
        let r32f = RegData::from_u32(ColorFormat::R32F.raw());
        s.write_register(GpuRegister::ColorBufferFormat, 0, r32f).unwrap();
        assert_eq!(s.render_targets[0].format, ColorFormat::R32F);
        // Other targets are independent.
        s.write_register(GpuRegister::RenderTargetAddress, 1, RegData::from_u32(0x3000)).unwrap();
        assert_eq!(s.back_buffer_addr, 0x2000);
    }

    #[test]
    fn test_domain_violations_are_fatal() {
        let mut s = GpuState::new();
        assert!(s.write_register(GpuRegister::DisplayXRes, 0, RegData::from_u32(0)).is_err());
        assert!(s.write_register(GpuRegister::DisplayXRes, 0, RegData::from_u32(4097)).is_err());
        assert!(s.write_register(GpuRegister::DisplayXRes, 0, RegData::from_u32(4096)).is_ok());
        assert!(s.write_register(GpuRegister::MsaaSamples, 0, RegData::from_u32(3)).is_err());
        assert!(s.write_register(GpuRegister::MsaaSamples, 0, RegData::from_u32(6)).is_ok());
        assert!(s.write_register(GpuRegister::StreamElements, 2, RegData::from_u32(5)).is_err());
        assert!(s.write_register(GpuRegister::Culling, 0, RegData::from_u32(7)).is_err());
        assert!(s.write_register(GpuRegister::VertexConstant, 512, RegData::default()).is_err());
        assert!(s
            .write_register(GpuRegister::TextureMaxAnisotropy, 0, RegData::from_u32(0))
            .is_err());
    }

    #[test]
    fn test_unit_range_registers_clamp() {
        let mut s = GpuState::new();
        s.write_register(GpuRegister::DepthRangeFar, 0, RegData::from_f32(2.0)).unwrap();
        assert_eq!(s.depth_range_far, 1.0);
        let clear = RegData::from_vec4([1.5, -1.0, 0.5, 1.0]);
        s.write_register(GpuRegister::ColorBufferClear, 0, clear).unwrap();
        assert_eq!(s.color_buffer_clear, [1.0, 0.0, 0.5, 1.0]);
        let nan = RegData::from_vec4([f32::NAN, 0.0, 0.0, 0.0]);
        assert!(s.write_register(GpuRegister::BlendColor, 0, nan).is_err());
    }

    #[test]
    fn test_texture_address_slots() {
        let mut s = GpuState::new();
        let sub = texture_address_sub(3, 2, 5) as u32;
        s.write_register(GpuRegister::TextureAddress, sub, RegData::from_u32(0xABC0)).unwrap();
        assert_eq!(s.textures[3].address[2][5], 0xABC0);
        assert_eq!(s.read_register(GpuRegister::TextureAddress, sub).unwrap().as_u32(), 0xABC0);
    }

    #[test]
    fn test_read_back_every_slot_restores_identically() {
        let mut src = GpuState::new();
        src.write_register(GpuRegister::Culling, 0, RegData::from_u32(0)).unwrap();
        let constant = RegData::from_vec4([1.0, 2.0, 3.0, 4.0]);
        src.write_register(GpuRegister::FragmentConstant, 7, constant).unwrap();
        let factor = RegData::from_u32(BlendFactor::SrcAlpha.raw());
        src.write_register(GpuRegister::BlendSrcRgb, 5, factor).unwrap();
        let wrap = RegData::from_u32(ClampMode::MirroredRepeat.raw());
        src.write_register(GpuRegister::TextureWrapT, 9, wrap).unwrap();

        let mut dst = GpuState::new();
        dst.write_register(GpuRegister::DisplayXRes, 0, RegData::from_u32(17)).unwrap();
        for (reg, sub) in all_register_slots() {
            let data = src.read_register(reg, sub as u32).unwrap();
            dst.restore_register(reg, sub as u32, data).unwrap();
        }
        assert_eq!(dst, src);
    }
}
