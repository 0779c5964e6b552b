// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Unified shader: instruction memory, per-thread register banks and the
//! interpreter.
//!
//! Texture instructions round-trip synchronously through a
//! [`TextureSampler`]: the interpreter builds one [`TextureRequest`] for the
//! whole thread group, blocks on `sample`, writes the results and only then
//! fetches the next instruction. At most one request is ever outstanding.

pub mod interpreter;
pub mod isa;

pub use interpreter::{ExecutionStats, ShaderInterpreter};
pub use isa::{Bank, Instruction, InstructionBuilder, Opcode, WriteMask};

use cg1_common::{
    FatalError, GpuResult, IVec4, Vec4, MAX_ADDRESS_REGISTERS, MAX_MSAA_SAMPLES, MAX_PREDICATE_REGISTERS,
    MAX_SHADER_OUTPUTS, MAX_TEMPORARIES, MAX_VERTEX_ATTRIBUTES, SHADER_INSTRUCTION_SIZE, STAMP_FRAGMENTS,
};

use crate::fixed_point::FixedPoint;

/// Input registers per thread.
pub const MAX_SHADER_INPUTS: usize = MAX_VERTEX_ATTRIBUTES;

// ── Texture round trip ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureOp {
    /// Implicit LOD from the quad derivatives, plus optional bias.
    Read,
    /// Explicit LOD in the parameter.
    ReadWithLod,
    /// Vertex attribute load (LDA).
    AttributeRead,
}

/// One texture instruction's request for a whole thread group.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureRequest {
    pub op: TextureOp,
    /// Texture unit (or stream for attribute reads).
    pub unit: u32,
    pub coords: [Vec4; STAMP_FRAGMENTS],
    /// LOD bias (TXB) or explicit LOD (TXL) per lane.
    pub parameter: [f32; STAMP_FRAGMENTS],
    /// Valid lanes: 4 for a fragment stamp, 1 for a vertex.
    pub lanes: usize,
}

/// Resolves texture requests. Implemented by the texture unit.
pub trait TextureSampler {
    fn sample(&mut self, request: &TextureRequest) -> GpuResult<[Vec4; STAMP_FRAGMENTS]>;
}

// ── Thread state ─────────────────────────────────────────────────────────────

/// Register banks of one shader thread (a vertex or a stamp fragment).
#[derive(Debug, Clone)]
pub struct ThreadState {
    pub input: [Vec4; MAX_SHADER_INPUTS],
    pub output: [Vec4; MAX_SHADER_OUTPUTS],
    pub temp: [Vec4; MAX_TEMPORARIES],
    pub address: [IVec4; MAX_ADDRESS_REGISTERS],
    pub predicate: [bool; MAX_PREDICATE_REGISTERS],
    pub accumulator: [FixedPoint; 4],
    /// Kill flag per MSAA sample; sample 0 kills the whole fragment.
    pub kill: [bool; MAX_MSAA_SAMPLES],
    /// Exported depth per sample (ZXP/ZXS).
    pub z_export: [f32; MAX_MSAA_SAMPLES],
    /// Sample targeted by KIL/CMPKIL (advanced by CHS).
    pub sample_index: usize,
}

impl ThreadState {
    pub fn new(fxp_dec_bits: u32) -> Self {
        Self {
            input: [[0.0; 4]; MAX_SHADER_INPUTS],
            output: [[0.0; 4]; MAX_SHADER_OUTPUTS],
            temp: [[0.0; 4]; MAX_TEMPORARIES],
            address: [[0; 4]; MAX_ADDRESS_REGISTERS],
            predicate: [false; MAX_PREDICATE_REGISTERS],
            accumulator: [FixedPoint::zero(32, 2 * fxp_dec_bits); 4],
            kill: [false; MAX_MSAA_SAMPLES],
            z_export: [0.0; MAX_MSAA_SAMPLES],
            sample_index: 0,
        }
    }

    /// Fragment discarded by a kill instruction.
    pub fn killed(&self) -> bool {
        self.kill[0]
    }
}

// ── Instruction memory ───────────────────────────────────────────────────────

/// Unified instruction memory shared by the vertex and fragment targets.
#[derive(Debug, Clone)]
pub struct InstructionMemory {
    slots: Vec<Option<Instruction>>,
}

impl InstructionMemory {
    pub fn new(size: u32) -> Self {
        Self {
            slots: vec![None; size as usize],
        }
    }

    pub fn size(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Decode and store `code` starting at instruction slot `pc`.
    pub fn load(&mut self, pc: u32, code: &[u8]) -> GpuResult<u32> {
        if code.len() % SHADER_INSTRUCTION_SIZE != 0 {
            return Err(FatalError::MalformedProgram {
                pc,
                reason: format!("program size {} is not a multiple of {}", code.len(), SHADER_INSTRUCTION_SIZE),
            });
        }
        let count = (code.len() / SHADER_INSTRUCTION_SIZE) as u32;
        if pc as u64 + count as u64 > self.size() as u64 {
            return Err(FatalError::MalformedProgram {
                pc,
                reason: format!("{} instructions overflow instruction memory of {}", count, self.size()),
            });
        }
        for (i, chunk) in code.chunks_exact(SHADER_INSTRUCTION_SIZE).enumerate() {
            let mut bytes = [0u8; SHADER_INSTRUCTION_SIZE];
            bytes.copy_from_slice(chunk);
            let slot = pc + i as u32;
            let instr = Instruction::from_bytes(&bytes);
            instr.validate(slot)?;
            self.slots[slot as usize] = Some(instr);
        }
        log::debug!("Shader: loaded {} instructions at pc {}", count, pc);
        Ok(count)
    }

    /// Fetch the instruction at `pc`. Unloaded or out-of-range slots mean
    /// execution ran past the end of the program.
    pub fn fetch(&self, pc: u32) -> GpuResult<&Instruction> {
        self.slots
            .get(pc as usize)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| FatalError::MalformedProgram {
                pc,
                reason: "fetch past program end without an end flag".into(),
            })
    }
}
