// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Pipeline orchestrator.
//!
//! `GpuTop` owns the register state, both memory spaces and every
//! sub-engine for its whole lifetime. Transactions are processed strictly in
//! arrival order; a draw runs to completion before the next transaction is
//! looked at.

pub mod assembly;
mod buffers;
mod draw;
pub mod streamer;
pub mod validation;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cg1_common::settings::SimConfig;
use cg1_common::{GpuAddr, GpuResult};

use crate::dump::{DumpKind, FrameImage};
use crate::fragment_ops::FragmentOperator;
use crate::memory::MemorySpace;
use crate::metastream::{GpuCommand, GpuEvent, Transaction};
use crate::pixel_mapper::PixelMapper;
use crate::rasterizer::{Attributes, Rasterizer};
use crate::regs::{GpuRegister, RegData};
use crate::shader::ShaderInterpreter;
use crate::state::GpuState;
use crate::texel_cache::CompressedCaches;
use crate::texture::TextureUnit;

pub use buffers::{byte_write_mask, decode_color, encode_color};
pub use validation::{TraceControls, ValidationLog};

/// Data returned to the driver by READ and REG_READ transactions.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadBack {
    Memory { address: GpuAddr, data: Vec<u8> },
    Register { reg: GpuRegister, sub: u32, data: RegData },
}

/// Work counters, accumulated over the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub vertices_shaded: u64,
    pub triangles_culled: u64,
    pub stamps: u64,
    pub fragments_shaded: u64,
    pub shader_instructions: u64,
    pub texture_requests: u64,
}

pub struct GpuTop {
    config: SimConfig,
    state: GpuState,
    memory: MemorySpace,
    shader: ShaderInterpreter,
    texture: TextureUnit,
    caches: CompressedCaches,
    /// Reconfigured into a working copy at every draw.
    rasterizer: Rasterizer,
    fragment_ops: FragmentOperator,
    /// Color and Z/stencil layout for 32-bit samples.
    mapper4: PixelMapper,
    /// Color layout for 64-bit samples.
    mapper8: PixelMapper,

    /// Shaded vertices of the current draw and instance, by index.
    vertex_cache: HashMap<u32, Attributes>,

    frame: u32,
    batch: u32,
    triangles: u64,
    stats: PipelineStats,

    skip_batch: bool,
    validation_mode: bool,
    validation: ValidationLog,
    trace: TraceControls,

    frame_image: Option<FrameImage>,
    read_log: Vec<ReadBack>,
    scratch: Vec<u8>,
    dump_dir: PathBuf,
}

impl GpuTop {
    pub fn new(config: &SimConfig) -> Self {
        log::info!(
            "GpuTop: {} MiB gpu memory, {} MiB mapped memory",
            config.memory.gpu_memory_mb,
            config.memory.mapped_memory_mb
        );
        Self {
            config: config.clone(),
            state: GpuState::new(),
            memory: MemorySpace::new(&config.memory),
            shader: ShaderInterpreter::new(&config.shader),
            texture: TextureUnit::new(&config.texture, &config.raster),
            caches: CompressedCaches::new(config.texture.compressed_cache_blocks),
            rasterizer: Rasterizer::new(&config.raster),
            fragment_ops: FragmentOperator::new(),
            mapper4: PixelMapper::new(&config.raster),
            mapper8: PixelMapper::new(&config.raster),
            vertex_cache: HashMap::new(),
            frame: 0,
            batch: 0,
            triangles: 0,
            stats: PipelineStats::default(),
            skip_batch: config.sim.skip_batches,
            validation_mode: config.sim.validation,
            validation: ValidationLog::default(),
            trace: TraceControls::default(),
            frame_image: None,
            read_log: Vec::new(),
            scratch: Vec::new(),
            dump_dir: PathBuf::from("."),
        }
    }

    // ── Command processor ───────────────────────────────────────────────────

    /// Apply one transaction.
    pub fn emulate_command_processor(&mut self, transaction: Transaction) -> GpuResult<()> {
        match transaction {
            Transaction::Write {
                address,
                data,
                preload,
                ..
            } => {
                log::trace!(
                    "GpuTop: {} {} bytes at 0x{:08X}",
                    if preload { "preload" } else { "write" },
                    data.len(),
                    address
                );
                self.memory.write(address, &data)
            }
            Transaction::Read { address, size } => {
                let data = self.memory.slice(address, size as usize)?.to_vec();
                log::trace!("GpuTop: read {} bytes at 0x{:08X}", size, address);
                self.read_log.push(ReadBack::Memory { address, data });
                Ok(())
            }
            Transaction::RegWrite { reg, sub, data, .. } => self.state.write_register(reg, sub, data),
            Transaction::RegRead { reg, sub } => {
                let data = self.state.read_register(reg, sub)?;
                self.read_log.push(ReadBack::Register { reg, sub, data });
                Ok(())
            }
            Transaction::Command(command) => self.process_command(command),
            Transaction::InitEnd => {
                log::debug!("GpuTop: end of initialization");
                Ok(())
            }
            Transaction::Event { event, message } => {
                match event {
                    GpuEvent::EndOfFrame => log::debug!("GpuTop: end of frame event {}", message),
                    GpuEvent::Unnamed => log::debug!("GpuTop: event {}", message),
                }
                Ok(())
            }
        }
    }

    fn process_command(&mut self, command: GpuCommand) -> GpuResult<()> {
        log::debug!("GpuTop: {:?} (frame {} batch {})", command, self.frame, self.batch);
        match command {
            GpuCommand::Reset => {
                self.state.reset();
                self.caches.clear();
                self.vertex_cache.clear();
                Ok(())
            }
            GpuCommand::Draw => self.draw(),
            GpuCommand::SwapBuffers => self.swap_buffers(),
            GpuCommand::DumpColor => self.dump_color(),
            GpuCommand::DumpDepth => self.dump_z_stencil(DumpKind::Depth),
            GpuCommand::DumpStencil => self.dump_z_stencil(DumpKind::Stencil),
            GpuCommand::Blit => self.blit(),
            GpuCommand::ClearBuffers => {
                self.clear_color_buffer()?;
                self.clear_z_stencil_buffer(true)
            }
            GpuCommand::ClearZBuffer => self.clear_z_stencil_buffer(false),
            GpuCommand::ClearZStencilBuffer => self.clear_z_stencil_buffer(true),
            GpuCommand::ClearColorBuffer => self.clear_color_buffer(),
            GpuCommand::LoadVertexProgram => {
                let s = &self.state;
                let (addr, pc, size) = (s.vertex_program_addr, s.vertex_program_pc, s.vertex_program_size);
                self.load_program("vertex", addr, pc, size)
            }
            GpuCommand::LoadFragmentProgram => {
                let s = &self.state;
                let (addr, pc, size) = (s.fragment_program_addr, s.fragment_program_pc, s.fragment_program_size);
                self.load_program("fragment", addr, pc, size)
            }
            GpuCommand::LoadShaderProgram => {
                let s = &self.state;
                let (addr, pc, size) = (s.shader_program_addr, s.shader_program_load_pc, s.shader_program_size);
                self.load_program("shader", addr, pc, size)
            }
            GpuCommand::FlushZStencil
            | GpuCommand::FlushColor
            | GpuCommand::SaveColorState
            | GpuCommand::RestoreColorState
            | GpuCommand::SaveZStencilState
            | GpuCommand::RestoreZStencilState
            | GpuCommand::ResetColorState
            | GpuCommand::ResetZStencilState => {
                log::trace!("GpuTop: {:?} has no effect on buffer contents", command);
                Ok(())
            }
        }
    }

    /// Copy `size` bytes of program code from memory into instruction
    /// memory at `pc`.
    fn load_program(&mut self, target: &str, address: GpuAddr, pc: u32, size: u32) -> GpuResult<()> {
        let code = self.memory.slice(address, size as usize)?;
        let count = self.shader.load_program(pc, code)?;
        log::debug!(
            "GpuTop: loaded {} {} program instructions from 0x{:08X} at pc {}",
            count,
            target,
            address,
            pc
        );
        Ok(())
    }

    fn swap_buffers(&mut self) -> GpuResult<()> {
        let image = self.resolve_render_target(0)?;
        log::info!(
            "GpuTop: end of frame {} ({} batches, {} triangles so far)",
            self.frame,
            self.batch,
            self.triangles
        );
        self.frame_image = Some(image);
        self.frame += 1;
        self.batch = 0;
        self.caches.clear();
        Ok(())
    }

    // ── Accessors and controls ──────────────────────────────────────────────

    /// `(frame, batch, triangles)`.
    pub fn get_counters(&self) -> (u32, u32, u64) {
        (self.frame, self.batch, self.triangles)
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// The image resolved by the last swap, if not taken yet.
    pub fn take_frame(&mut self) -> Option<FrameImage> {
        self.frame_image.take()
    }

    /// Data produced by READ and REG_READ since the last call.
    pub fn take_reads(&mut self) -> Vec<ReadBack> {
        std::mem::take(&mut self.read_log)
    }

    pub fn state(&self) -> &GpuState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut GpuState {
        &mut self.state
    }

    pub fn memory(&self) -> &MemorySpace {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemorySpace {
        &mut self.memory
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn validation(&self) -> &ValidationLog {
        &self.validation
    }

    pub fn set_validation_mode(&mut self, enable: bool) {
        self.validation_mode = enable;
    }

    pub fn set_skip_batch(&mut self, enable: bool) {
        self.skip_batch = enable;
    }

    pub fn set_full_trace_log(&mut self, enable: bool) {
        self.trace.full = enable;
    }

    pub fn set_batch_trace_log(&mut self, enable: bool, batch: u32) {
        self.trace.batch = enable.then_some(batch);
    }

    pub fn set_vertex_trace_log(&mut self, enable: bool, index: u32) {
        self.trace.vertex = enable.then_some(index);
    }

    pub fn set_pixel_trace_log(&mut self, enable: bool, x: i32, y: i32) {
        self.trace.pixel = enable.then_some((x, y));
    }

    /// Directory for DUMPCOLOR/DUMPDEPTH/DUMPSTENCIL images.
    pub fn set_dump_dir(&mut self, dir: &Path) {
        self.dump_dir = dir.to_path_buf();
    }
}

impl std::fmt::Debug for GpuTop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuTop")
            .field("frame", &self.frame)
            .field("batch", &self.batch)
            .field("triangles", &self.triangles)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg1_common::settings::MemoryConfig;
    use cg1_common::FatalError;

    fn small_config() -> SimConfig {
        SimConfig {
            memory: MemoryConfig {
                gpu_memory_mb: 1,
                mapped_memory_mb: 1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_memory_write_then_read_back() {
        let mut gpu = GpuTop::new(&small_config());
        gpu.emulate_command_processor(Transaction::write(0x40, vec![1, 2, 3])).unwrap();
        gpu.emulate_command_processor(Transaction::Read { address: 0x40, size: 3 })
            .unwrap();
        assert_eq!(
            gpu.take_reads(),
            vec![ReadBack::Memory {
                address: 0x40,
                data: vec![1, 2, 3]
            }]
        );
        assert!(gpu.take_reads().is_empty());
    }

    #[test]
    fn test_out_of_range_write_is_fatal() {
        let mut gpu = GpuTop::new(&small_config());
        let result = gpu.emulate_command_processor(Transaction::write(0x000F_FFFE, vec![0; 4]));
        assert!(matches!(result, Err(FatalError::AddressOverflow { .. })));
    }

    #[test]
    fn test_register_write_and_read() {
        let mut gpu = GpuTop::new(&small_config());
        gpu.emulate_command_processor(Transaction::reg(GpuRegister::DisplayXRes, 0, RegData::from_u32(64)))
            .unwrap();
        gpu.emulate_command_processor(Transaction::RegRead {
            reg: GpuRegister::DisplayXRes,
            sub: 0,
        })
        .unwrap();
        assert_eq!(gpu.state().display_x_res, 64);
        assert_eq!(
            gpu.take_reads(),
            vec![ReadBack::Register {
                reg: GpuRegister::DisplayXRes,
                sub: 0,
                data: RegData::from_u32(64)
            }]
        );
    }

    #[test]
    fn test_reset_restores_registers() {
        let mut gpu = GpuTop::new(&small_config());
        gpu.state_mut().display_x_res = 17;
        gpu.emulate_command_processor(Transaction::Command(GpuCommand::Reset)).unwrap();
        assert_eq!(gpu.state(), &GpuState::new());
    }

    #[test]
    fn test_reset_keeps_instruction_memory() {
        use crate::shader::isa::assemble;
        use crate::shader::{Bank, InstructionBuilder, Opcode};

        let mut gpu = GpuTop::new(&small_config());
        let code = assemble(&[InstructionBuilder::new(Opcode::MOV)
            .op(1, Bank::Input, 0)
            .result(Bank::Output, 0)
            .end()
            .build()]);
        gpu.emulate_command_processor(Transaction::write(0x100, code.clone()))
            .unwrap();
        gpu.state_mut().vertex_program_addr = 0x100;
        gpu.state_mut().vertex_program_pc = 5;
        gpu.state_mut().vertex_program_size = code.len() as u32;
        gpu.emulate_command_processor(Transaction::Command(GpuCommand::LoadVertexProgram))
            .unwrap();

        gpu.emulate_command_processor(Transaction::Command(GpuCommand::Reset)).unwrap();
        assert!(gpu.shader.memory().fetch(5).unwrap().is_end());
    }

    #[test]
    fn test_clear_z_keeps_stencil() {
        let mut gpu = GpuTop::new(&small_config());
        {
            let s = gpu.state_mut();
            s.display_x_res = 8;
            s.display_y_res = 8;
            s.zstencil_buffer_addr = 0x1000;
            s.z_buffer_clear = 0x123456;
            s.stencil_buffer_clear = 0x7F;
        }
        gpu.emulate_command_processor(Transaction::Command(GpuCommand::ClearZStencilBuffer))
            .unwrap();
        assert_eq!(gpu.memory().read_u32(0x1000).unwrap(), 0x7F12_3456);

        gpu.state_mut().z_buffer_clear = 0xABCDEF;
        gpu.state_mut().stencil_buffer_clear = 0;
        gpu.emulate_command_processor(Transaction::Command(GpuCommand::ClearZBuffer))
            .unwrap();
        assert_eq!(gpu.memory().read_u32(0x1000).unwrap(), 0x7FAB_CDEF);
    }

    #[test]
    fn test_swap_counts_frames_and_resets_batch() {
        let mut gpu = GpuTop::new(&small_config());
        gpu.state_mut().display_x_res = 4;
        gpu.state_mut().display_y_res = 4;
        gpu.set_skip_batch(true);
        gpu.emulate_command_processor(Transaction::Command(GpuCommand::Draw)).unwrap();
        gpu.emulate_command_processor(Transaction::Command(GpuCommand::Draw)).unwrap();
        assert_eq!(gpu.get_counters(), (0, 2, 0));

        gpu.emulate_command_processor(Transaction::Command(GpuCommand::SwapBuffers))
            .unwrap();
        assert_eq!(gpu.get_counters(), (1, 0, 0));
        let frame = gpu.take_frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (4, 4));
        assert!(gpu.take_frame().is_none());
    }

    #[test]
    fn test_compression_commands_are_no_ops() {
        let mut gpu = GpuTop::new(&small_config());
        for command in [
            GpuCommand::FlushColor,
            GpuCommand::FlushZStencil,
            GpuCommand::SaveColorState,
            GpuCommand::RestoreZStencilState,
            GpuCommand::ResetColorState,
        ] {
            gpu.emulate_command_processor(Transaction::Command(command)).unwrap();
        }
        assert_eq!(gpu.get_counters(), (0, 0, 0));
    }

    #[test]
    fn test_trace_controls() {
        let mut gpu = GpuTop::new(&small_config());
        gpu.set_batch_trace_log(true, 4);
        gpu.set_pixel_trace_log(true, 1, 2);
        assert_eq!(gpu.trace.batch, Some(4));
        assert_eq!(gpu.trace.pixel, Some((1, 2)));
        gpu.set_batch_trace_log(false, 4);
        assert_eq!(gpu.trace.batch, None);
    }
}
