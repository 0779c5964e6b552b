// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Fetch-decode-execute loop over native shader instructions.
//!
//! A thread group is one vertex or one 2x2 fragment stamp. All lanes share
//! the PC: jumps are taken only when the condition holds in every lane.
//! Registers are stored as floats; integer instructions operate on the bit
//! pattern, as the hardware register file is untyped.

use cg1_common::settings::ShaderConfig;
use cg1_common::{FatalError, GpuResult, IVec4, Vec4, MAX_MSAA_SAMPLES, STAMP_FRAGMENTS};

use super::isa::{apply_swizzle, Bank, Instruction, Opcode};
use super::{InstructionMemory, TextureOp, TextureRequest, TextureSampler, ThreadState};
use crate::fixed_point::FixedPoint;

/// Log target of the instruction-level trace.
pub const TRACE_TARGET: &str = "cg1_gpu::trace";

/// Offset of the PARAM2 bank inside the constant bank.
const PARAM2_BASE: i64 = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub instructions: u64,
    pub texture_requests: u64,
}

impl std::ops::AddAssign for ExecutionStats {
    fn add_assign(&mut self, rhs: Self) {
        self.instructions += rhs.instructions;
        self.texture_requests += rhs.texture_requests;
    }
}

pub struct ShaderInterpreter {
    memory: InstructionMemory,
    fxp_dec_bits: u32,
}

fn malformed(pc: u32, reason: impl Into<String>) -> FatalError {
    FatalError::MalformedProgram {
        pc,
        reason: reason.into(),
    }
}

impl ShaderInterpreter {
    pub fn new(config: &ShaderConfig) -> Self {
        Self {
            memory: InstructionMemory::new(config.instruction_memory_size),
            fxp_dec_bits: config.fxp_dec_bits,
        }
    }

    pub fn load_program(&mut self, pc: u32, code: &[u8]) -> GpuResult<u32> {
        self.memory.load(pc, code)
    }

    pub fn memory(&self) -> &InstructionMemory {
        &self.memory
    }

    /// Fresh register banks for one thread.
    pub fn new_thread(&self) -> ThreadState {
        ThreadState::new(self.fxp_dec_bits)
    }

    /// Whether the program starting at `start_pc` can kill fragments or
    /// export depth (disables early Z).
    pub fn program_kills(&self, start_pc: u32) -> GpuResult<bool> {
        let mut pc = start_pc;
        loop {
            let instr = self.memory.fetch(pc)?;
            if instr.opcode().is_some_and(Opcode::kills_or_exports) {
                return Ok(true);
            }
            if instr.is_end() {
                return Ok(false);
            }
            pc += 1;
        }
    }

    /// Run the program at `start_pc` for a thread group until an end
    /// instruction retires or every lane is killed.
    pub fn execute(
        &self,
        start_pc: u32,
        constants: &[Vec4],
        threads: &mut [ThreadState],
        sampler: &mut dyn TextureSampler,
        trace: bool,
    ) -> GpuResult<ExecutionStats> {
        let lanes = threads.len();
        if lanes == 0 || lanes > STAMP_FRAGMENTS {
            return Err(FatalError::Invariant(format!("thread group of {} lanes", lanes)));
        }

        let mut stats = ExecutionStats::default();
        let mut pc = start_pc;
        loop {
            let instr = *self.memory.fetch(pc)?;
            let opcode = instr
                .opcode()
                .ok_or_else(|| malformed(pc, "invalid opcode"))?;
            stats.instructions += 1;
            if trace {
                log::debug!(target: TRACE_TARGET, "pc {:04}: {}", pc, instr.disassemble());
            }

            let mut next_pc = pc as i64 + 1;
            match opcode {
                Opcode::JMP => {
                    let mut jump = true;
                    for t in threads.iter() {
                        jump &= read_bool(&instr, 1, t, constants, pc)?;
                    }
                    if jump {
                        next_pc = pc as i64 + instr.jump_offset() as i64;
                    }
                    if trace {
                        let taken = if jump { "taken" } else { "not taken" };
                        log::debug!(target: TRACE_TARGET, "  jump {} -> {}", taken, next_pc);
                    }
                }
                op if op.is_texture() => {
                    self.texture(&instr, op, threads, constants, sampler, pc, trace)?;
                    stats.texture_requests += 1;
                }
                Opcode::DDX | Opcode::DDY => derivative(&instr, opcode, threads, constants, pc)?,
                _ => {
                    for t in threads.iter_mut() {
                        if lanes > 1 && t.killed() {
                            continue;
                        }
                        self.execute_lane(&instr, opcode, t, constants, pc)?;
                    }
                }
            }

            if trace {
                for (lane, t) in threads.iter().enumerate() {
                    if let (Some(bank), false) = (instr.result_bank(), opcode.writes_predicate()) {
                        let result = read_register_bits(bank, instr.result_reg(), t, constants, pc);
                        if let Ok(value) = result {
                            log::debug!(
                                target: TRACE_TARGET,
                                "  lane {} {}{} = {:?}",
                                lane,
                                bank.prefix(),
                                instr.result_reg(),
                                value.map(f32::from_bits)
                            );
                        }
                    }
                }
            }

            if instr.is_end() || opcode == Opcode::END {
                break;
            }
            if lanes > 1 && threads.iter().all(ThreadState::killed) {
                break;
            }
            if next_pc < 0 || next_pc > u32::MAX as i64 {
                return Err(malformed(pc, format!("jump target {} out of range", next_pc)));
            }
            pc = next_pc as u32;
        }
        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    fn texture(
        &self,
        instr: &Instruction,
        opcode: Opcode,
        threads: &mut [ThreadState],
        constants: &[Vec4],
        sampler: &mut dyn TextureSampler,
        pc: u32,
        trace: bool,
    ) -> GpuResult<()> {
        let op = match opcode {
            Opcode::TXL => TextureOp::ReadWithLod,
            Opcode::LDA => TextureOp::AttributeRead,
            _ => TextureOp::Read,
        };
        let mut request = TextureRequest {
            op,
            unit: instr.operand(2).reg,
            coords: [[0.0; 4]; STAMP_FRAGMENTS],
            parameter: [0.0; STAMP_FRAGMENTS],
            lanes: threads.len(),
        };
        for (lane, t) in threads.iter().enumerate() {
            let mut coord = read_vec(instr, 1, t, constants, pc)?;
            match opcode {
                Opcode::TXP => {
                    coord[0] /= coord[3];
                    coord[1] /= coord[3];
                    coord[2] /= coord[3];
                }
                Opcode::TXB | Opcode::TXL => request.parameter[lane] = coord[3],
                _ => {}
            }
            request.coords[lane] = coord;
        }

        let samples = sampler.sample(&request)?;
        if trace {
            log::debug!(
                target: TRACE_TARGET,
                "  texture {:?} unit {} coords {:?} -> {:?}",
                op,
                request.unit,
                &request.coords[..request.lanes],
                &samples[..request.lanes]
            );
        }

        let lanes = threads.len();
        for (lane, t) in threads.iter_mut().enumerate() {
            if lanes > 1 && t.killed() {
                continue;
            }
            write_float(instr, t, samples[lane], pc)?;
        }
        Ok(())
    }

    fn fxp(&self, value: f32) -> FixedPoint {
        FixedPoint::from_f32(value, 16, self.fxp_dec_bits)
    }

    fn fxp_one(&self) -> FixedPoint {
        FixedPoint::from_f32(1.0, 32, 2 * self.fxp_dec_bits)
    }

    fn execute_lane(
        &self,
        instr: &Instruction,
        opcode: Opcode,
        t: &mut ThreadState,
        constants: &[Vec4],
        pc: u32,
    ) -> GpuResult<()> {
        use Opcode::*;

        let vec = |n: u32, t: &ThreadState| read_vec(instr, n, t, constants, pc);
        let scalar = |n: u32, t: &ThreadState| read_scalar(instr, n, t, constants, pc);
        let splat = |v: f32| [v; 4];

        match opcode {
            NOP | NOP2 | NOP3 | END | JMP => {}
            ADD => {
                let (a, b) = (vec(1, t)?, vec(2, t)?);
                write_float(instr, t, zip(a, b, |x, y| x + y), pc)?;
            }
            MUL => {
                let (a, b) = (vec(1, t)?, vec(2, t)?);
                write_float(instr, t, zip(a, b, |x, y| x * y), pc)?;
            }
            MAD => {
                let (a, b, c) = (vec(1, t)?, vec(2, t)?, vec(3, t)?);
                let r = std::array::from_fn(|k| a[k] * b[k] + c[k]);
                write_float(instr, t, r, pc)?;
            }
            MAX => {
                let (a, b) = (vec(1, t)?, vec(2, t)?);
                write_float(instr, t, zip(a, b, |x, y| if x > y { x } else { y }), pc)?;
            }
            MIN => {
                let (a, b) = (vec(1, t)?, vec(2, t)?);
                write_float(instr, t, zip(a, b, |x, y| if x < y { x } else { y }), pc)?;
            }
            MOV => {
                let a = vec(1, t)?;
                write_float(instr, t, a, pc)?;
            }
            DP3 => {
                let (a, b) = (vec(1, t)?, vec(2, t)?);
                write_float(instr, t, splat(a[0] * b[0] + a[1] * b[1] + a[2] * b[2]), pc)?;
            }
            DP4 => {
                let (a, b) = (vec(1, t)?, vec(2, t)?);
                let dot = a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3];
                write_float(instr, t, splat(dot), pc)?;
            }
            DPH => {
                let (a, b) = (vec(1, t)?, vec(2, t)?);
                write_float(instr, t, splat(a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + b[3]), pc)?;
            }
            DST => {
                let (a, b) = (vec(1, t)?, vec(2, t)?);
                write_float(instr, t, [1.0, a[1] * b[1], a[2], b[3]], pc)?;
            }
            SGE => {
                let (a, b) = (vec(1, t)?, vec(2, t)?);
                write_float(instr, t, zip(a, b, |x, y| if x >= y { 1.0 } else { 0.0 }), pc)?;
            }
            SLT => {
                let (a, b) = (vec(1, t)?, vec(2, t)?);
                write_float(instr, t, zip(a, b, |x, y| if x < y { 1.0 } else { 0.0 }), pc)?;
            }
            CMP | CMPKIL => {
                let (a, b, c) = (vec(1, t)?, vec(2, t)?, vec(3, t)?);
                let r = [
                    if a[0] < 0.0 { b[0] } else { c[0] },
                    if a[1] < 0.0 { b[1] } else { c[1] },
                    if a[2] < 0.0 { b[2] } else { c[2] },
                    if a[3] < 0.0 { b[3] } else { c[3] },
                ];
                write_float(instr, t, r, pc)?;
                if opcode == CMPKIL && predicate_allows(instr, t) {
                    let mask = instr.write_mask().components();
                    if (0..4).any(|c| mask[c] && r[c] < 0.0) {
                        let sample = t.sample_index;
                        t.kill[sample] = true;
                    }
                }
            }
            FLR => {
                let a = vec(1, t)?;
                write_float(instr, t, a.map(f32::floor), pc)?;
            }
            FRC => {
                let a = vec(1, t)?;
                write_float(instr, t, a.map(|x| x - x.floor()), pc)?;
            }
            LIT => {
                let a = vec(1, t)?;
                let x = if a[0] < 0.0 { 0.0 } else { a[0] };
                let y = if a[1] < 0.0 { 0.0 } else { a[1] };
                let w = a[3].clamp(-128.0, 128.0);
                let specular = if x > 0.0 { (y as f64).powf(w as f64) as f32 } else { 0.0 };
                write_float(instr, t, [1.0, x, specular, 1.0], pc)?;
            }
            ARL => {
                let a = vec(1, t)?;
                if predicate_allows(instr, t) {
                    let reg = instr.result_reg() as usize;
                    let slot = t
                        .address
                        .get_mut(reg)
                        .ok_or_else(|| {
                            malformed(pc, format!("address register a{} out of range", reg))
                        })?;
                    *slot = a.map(|x| x.floor() as i32);
                }
            }
            COS => {
                let x = scalar(1, t)?;
                write_float(instr, t, splat(x.cos()), pc)?;
            }
            SIN => {
                let x = scalar(1, t)?;
                write_float(instr, t, splat(x.sin()), pc)?;
            }
            EX2 => {
                let x = scalar(1, t)?;
                write_float(instr, t, splat(x.exp2()), pc)?;
            }
            LG2 => {
                let x = scalar(1, t)?;
                write_float(instr, t, splat(x.log2()), pc)?;
            }
            RCP => {
                let x = scalar(1, t)?;
                write_float(instr, t, splat(1.0 / x), pc)?;
            }
            RSQ => {
                let x = scalar(1, t)?;
                write_float(instr, t, splat((1.0 / x.abs()).sqrt()), pc)?;
            }
            EXP => {
                let x = scalar(1, t)?;
                let fl = x.floor();
                write_float(instr, t, [fl.exp2(), x - fl, x.exp2(), 1.0], pc)?;
            }
            LOG => {
                let x = scalar(1, t)?;
                let e = x.abs().log2().floor();
                write_float(instr, t, [e, x.abs() / e.exp2(), x.abs().log2(), 1.0], pc)?;
            }
            SETPEQ | SETPGT | SETPLT => {
                let (a, b) = (scalar(1, t)?, scalar(2, t)?);
                let r = match opcode {
                    SETPEQ => a == b,
                    SETPGT => a > b,
                    _ => a < b,
                };
                write_predicate(instr, t, r, pc)?;
            }
            STPEQI | STPGTI | STPLTI => {
                let a = read_iscalar(instr, 1, t, constants, pc)?;
                let b = read_iscalar(instr, 2, t, constants, pc)?;
                let r = match opcode {
                    STPEQI => a == b,
                    STPGTI => a > b,
                    _ => a < b,
                };
                write_predicate(instr, t, r, pc)?;
            }
            ANDP => {
                let a = read_bool(instr, 1, t, constants, pc)?;
                let b = read_bool(instr, 2, t, constants, pc)?;
                write_predicate(instr, t, a && b, pc)?;
            }
            ADDI | MULI => {
                let a = read_ivec(instr, 1, t, constants, pc)?;
                let b = read_ivec(instr, 2, t, constants, pc)?;
                let r: IVec4 = if opcode == ADDI {
                    std::array::from_fn(|k| a[k].wrapping_add(b[k]))
                } else {
                    std::array::from_fn(|k| a[k].wrapping_mul(b[k]))
                };
                write_bits(instr, t, r.map(|x| x as u32), pc)?;
            }
            KIL => {
                let a = vec(1, t)?;
                if predicate_allows(instr, t) && a.iter().any(|&x| x < 0.0) {
                    let sample = t.sample_index;
                    t.kill[sample] = true;
                }
            }
            KLS => {
                let a = vec(1, t)?;
                let sample = instr.operand(2).reg as usize;
                if sample >= MAX_MSAA_SAMPLES {
                    return Err(malformed(pc, format!("KLS sample {} out of range", sample)));
                }
                if predicate_allows(instr, t) && a.iter().any(|&x| x < 0.0) {
                    t.kill[sample] = true;
                }
            }
            ZXP => {
                let a = vec(1, t)?;
                // One depth for every sample; ZXS overrides per sample.
                if predicate_allows(instr, t) {
                    t.z_export = [a[0]; MAX_MSAA_SAMPLES];
                }
            }
            ZXS => {
                let a = vec(1, t)?;
                let base = instr.operand(2).reg as usize * 4;
                if predicate_allows(instr, t) {
                    for (i, &z) in a.iter().enumerate() {
                        if let Some(slot) = t.z_export.get_mut(base + i) {
                            *slot = z;
                        }
                    }
                }
            }
            CHS => {
                if predicate_allows(instr, t) {
                    t.sample_index = (t.sample_index + 1).min(MAX_MSAA_SAMPLES - 1);
                }
            }
            FXMUL => {
                let (a, b) = (vec(1, t)?, vec(2, t)?);
                let mut r = t.accumulator;
                for c in 0..4 {
                    r[c] = self.fxp_one() * self.fxp(a[c]) * self.fxp(b[c]);
                }
                write_accumulator(instr, t, r);
            }
            FXMAD => {
                let (a, b) = (vec(1, t)?, vec(2, t)?);
                let mut r = [0.0f32; 4];
                for c in 0..4 {
                    let product = self.fxp_one() * self.fxp(a[c]) * self.fxp(b[c]);
                    r[c] = (product + t.accumulator[c]).to_f32();
                }
                write_float(instr, t, r, pc)?;
            }
            FXMAD2 => {
                let (a, b, d) = (vec(1, t)?, vec(2, t)?, vec(3, t)?);
                let mut r = t.accumulator;
                for c in 0..4 {
                    r[c] = self.fxp_one() * self.fxp(a[c]) * self.fxp(b[c]) + self.fxp(d[c]);
                }
                write_accumulator(instr, t, r);
            }
            TEX | TXB | TXP | TXL | LDA | DDX | DDY => {
                return Err(FatalError::Invariant(format!(
                    "{} executed outside its group path",
                    opcode.mnemonic()
                )));
            }
        }
        Ok(())
    }
}

// ── Operand access ───────────────────────────────────────────────────────────

fn zip(a: Vec4, b: Vec4, f: impl Fn(f32, f32) -> f32) -> Vec4 {
    [f(a[0], b[0]), f(a[1], b[1]), f(a[2], b[2]), f(a[3], b[3])]
}

fn bank_slot<T>(bank: &[T], reg: u32, name: &str, pc: u32) -> GpuResult<usize> {
    if (reg as usize) < bank.len() {
        Ok(reg as usize)
    } else {
        Err(malformed(pc, format!("{} register {} out of range", name, reg)))
    }
}

fn constant_index(
    instr: &Instruction,
    bank: Bank,
    reg: u32,
    t: &ThreadState,
    constants: &[Vec4],
    pc: u32,
) -> GpuResult<usize> {
    let mut index = reg as i64;
    if bank == Bank::Param2 {
        index += PARAM2_BASE;
    }
    if instr.relative_mode() {
        let a = t
            .address
            .get(instr.relative_addr_reg())
            .ok_or_else(|| malformed(pc, "relative address register out of range"))?;
        index += a[instr.relative_component()] as i64 + instr.relative_offset() as i64;
    }
    if index < 0 || index as usize >= constants.len() {
        return Err(malformed(pc, format!("constant index {} out of range", index)));
    }
    Ok(index as usize)
}

/// Raw bits of a register before swizzle and modifiers.
fn read_register_bits(
    bank: Bank,
    reg: u32,
    t: &ThreadState,
    constants: &[Vec4],
    pc: u32,
) -> GpuResult<[u32; 4]> {
    let bits = |v: &Vec4| v.map(f32::to_bits);
    Ok(match bank {
        Bank::Input => bits(&t.input[bank_slot(&t.input, reg, "input", pc)?]),
        Bank::Output => bits(&t.output[bank_slot(&t.output, reg, "output", pc)?]),
        Bank::Temp => bits(&t.temp[bank_slot(&t.temp, reg, "temporary", pc)?]),
        Bank::Address => t.address[bank_slot(&t.address, reg, "address", pc)?].map(|x| x as u32),
        Bank::Param | Bank::Param2 => {
            let index = reg as usize + if bank == Bank::Param2 { PARAM2_BASE as usize } else { 0 };
            bits(&constants[bank_slot(constants, index as u32, "constant", pc)?])
        }
        Bank::Immediate => return Err(malformed(pc, "immediate used as a register")),
    })
}

fn operand_bits(
    instr: &Instruction,
    n: u32,
    t: &ThreadState,
    constants: &[Vec4],
    pc: u32,
) -> GpuResult<[u32; 4]> {
    if n == 2 && instr.has_immediate() {
        return Ok([instr.immediate(); 4]);
    }
    let op = instr.operand(n);
    match op.bank {
        Bank::Param | Bank::Param2 => {
            let index = constant_index(instr, op.bank, op.reg, t, constants, pc)?;
            Ok(constants[index].map(f32::to_bits))
        }
        bank => read_register_bits(bank, op.reg, t, constants, pc),
    }
}

fn read_vec(
    instr: &Instruction,
    n: u32,
    t: &ThreadState,
    constants: &[Vec4],
    pc: u32,
) -> GpuResult<Vec4> {
    let op = instr.operand(n);
    let raw = operand_bits(instr, n, t, constants, pc)?.map(f32::from_bits);
    let mut v = if n == 2 && instr.has_immediate() { raw } else { apply_swizzle(op.swizzle, raw) };
    if op.absolute {
        v = v.map(f32::abs);
    }
    if op.negate {
        v = v.map(|x| -x);
    }
    Ok(v)
}

fn read_ivec(
    instr: &Instruction,
    n: u32,
    t: &ThreadState,
    constants: &[Vec4],
    pc: u32,
) -> GpuResult<IVec4> {
    let op = instr.operand(n);
    let raw = operand_bits(instr, n, t, constants, pc)?.map(|x| x as i32);
    let mut v = if n == 2 && instr.has_immediate() { raw } else { apply_swizzle(op.swizzle, raw) };
    if op.absolute {
        v = v.map(i32::wrapping_abs);
    }
    if op.negate {
        v = v.map(i32::wrapping_neg);
    }
    Ok(v)
}

/// Scalar operands take the component named by the low swizzle selector.
fn read_scalar(
    instr: &Instruction,
    n: u32,
    t: &ThreadState,
    constants: &[Vec4],
    pc: u32,
) -> GpuResult<f32> {
    let op = instr.operand(n);
    let raw = operand_bits(instr, n, t, constants, pc)?;
    let mut x = f32::from_bits(raw[(op.swizzle & 0x03) as usize]);
    if op.absolute {
        x = x.abs();
    }
    if op.negate {
        x = -x;
    }
    Ok(x)
}

fn read_iscalar(
    instr: &Instruction,
    n: u32,
    t: &ThreadState,
    constants: &[Vec4],
    pc: u32,
) -> GpuResult<i32> {
    let op = instr.operand(n);
    let raw = operand_bits(instr, n, t, constants, pc)?;
    let mut x = raw[(op.swizzle & 0x03) as usize] as i32;
    if op.absolute {
        x = x.wrapping_abs();
    }
    if op.negate {
        x = x.wrapping_neg();
    }
    Ok(x)
}

/// Boolean operand: the absolute flag selects an implicit constant carried
/// in the negate flag; constant banks read a component; any other bank
/// names a predicate register. Negate inverts.
fn read_bool(
    instr: &Instruction,
    n: u32,
    t: &ThreadState,
    constants: &[Vec4],
    pc: u32,
) -> GpuResult<bool> {
    let op = instr.operand(n);
    if op.absolute {
        return Ok(op.negate);
    }
    let value = match op.bank {
        Bank::Param | Bank::Param2 => {
            let index = constant_index(instr, op.bank, op.reg, t, constants, pc)?;
            constants[index][(op.swizzle & 0x03) as usize].to_bits() != 0
        }
        Bank::Immediate => instr.immediate() != 0,
        _ => {
            let slot = bank_slot(&t.predicate, op.reg, "predicate", pc)?;
            t.predicate[slot]
        }
    };
    Ok(value ^ op.negate)
}

// ── Result write ─────────────────────────────────────────────────────────────

fn predicate_allows(instr: &Instruction, t: &ThreadState) -> bool {
    if !instr.predicated() {
        return true;
    }
    let p = t.predicate.get(instr.predicate_reg() as usize).copied().unwrap_or(false);
    p != instr.invert_predicate()
}

fn write_float(instr: &Instruction, t: &mut ThreadState, value: Vec4, pc: u32) -> GpuResult<()> {
    let value = if instr.saturate() { cg1_common::saturate(value) } else { value };
    write_bits(instr, t, value.map(f32::to_bits), pc)
}

fn write_bits(instr: &Instruction, t: &mut ThreadState, bits: [u32; 4], pc: u32) -> GpuResult<()> {
    if !predicate_allows(instr, t) {
        return Ok(());
    }
    let mask = instr.write_mask().components();
    let reg = instr.result_reg();
    match instr.result_bank() {
        Some(Bank::Output) => {
            let slot = bank_slot(&t.output, reg, "output", pc)?;
            masked_store(&mut t.output[slot], bits, mask);
        }
        Some(Bank::Temp) => {
            let slot = bank_slot(&t.temp, reg, "temporary", pc)?;
            masked_store(&mut t.temp[slot], bits, mask);
        }
        Some(Bank::Address) => {
            let slot = bank_slot(&t.address, reg, "address", pc)?;
            for c in 0..4 {
                if mask[c] {
                    t.address[slot][c] = bits[c] as i32;
                }
            }
        }
        other => return Err(malformed(pc, format!("result written to read-only bank {:?}", other))),
    }
    Ok(())
}

fn masked_store(dst: &mut Vec4, bits: [u32; 4], mask: [bool; 4]) {
    for c in 0..4 {
        if mask[c] {
            dst[c] = f32::from_bits(bits[c]);
        }
    }
}

/// Predicate results: the saturate flag inverts the result.
fn write_predicate(
    instr: &Instruction,
    t: &mut ThreadState,
    value: bool,
    pc: u32,
) -> GpuResult<()> {
    if !predicate_allows(instr, t) {
        return Ok(());
    }
    let slot = bank_slot(&t.predicate, instr.result_reg(), "predicate", pc)?;
    t.predicate[slot] = value != instr.saturate();
    Ok(())
}

fn write_accumulator(instr: &Instruction, t: &mut ThreadState, value: [FixedPoint; 4]) {
    if !predicate_allows(instr, t) {
        return;
    }
    let mask = instr.write_mask().components();
    for c in 0..4 {
        if mask[c] {
            t.accumulator[c] = value[c];
        }
    }
}

/// Quad differences. Lanes are laid out (0,0) (1,0) (0,1) (1,1).
fn derivative(
    instr: &Instruction,
    opcode: Opcode,
    threads: &mut [ThreadState],
    constants: &[Vec4],
    pc: u32,
) -> GpuResult<()> {
    let lanes = threads.len();
    if lanes != STAMP_FRAGMENTS {
        for t in threads.iter_mut() {
            write_float(instr, t, [0.0; 4], pc)?;
        }
        return Ok(());
    }
    let mut input = [[0.0f32; 4]; STAMP_FRAGMENTS];
    for (lane, t) in threads.iter().enumerate() {
        input[lane] = read_vec(instr, 1, t, constants, pc)?;
    }
    let diff = |a: usize, b: usize| zip(input[a], input[b], |x, y| x - y);
    let out = if opcode == Opcode::DDX {
        [diff(1, 0), diff(1, 0), diff(3, 2), diff(3, 2)]
    } else {
        [diff(2, 0), diff(3, 1), diff(2, 0), diff(3, 1)]
    };
    for (lane, t) in threads.iter_mut().enumerate() {
        if t.killed() {
            continue;
        }
        write_float(instr, t, out[lane], pc)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::isa::{assemble, swizzle_replicate, InstructionBuilder, WriteMask};
    use super::*;

    /// Returns each lane's coordinate as its sample and counts requests.
    struct EchoSampler {
        requests: Vec<TextureRequest>,
    }

    impl TextureSampler for EchoSampler {
        fn sample(&mut self, request: &TextureRequest) -> GpuResult<[Vec4; STAMP_FRAGMENTS]> {
            self.requests.push(request.clone());
            Ok(request.coords)
        }
    }

    fn encode_instruction(op: Opcode) -> InstructionBuilder {
        InstructionBuilder::new(op)
    }

    fn interpreter(program: &[Instruction]) -> ShaderInterpreter {
        let mut shader = ShaderInterpreter::new(&ShaderConfig {
            instruction_memory_size: 64,
            ..ShaderConfig::default()
        });
        shader.load_program(0, &assemble(program)).unwrap();
        shader
    }

    fn run(
        shader: &ShaderInterpreter,
        constants: &[Vec4],
        threads: &mut [ThreadState],
    ) -> ExecutionStats {
        let mut sampler = EchoSampler { requests: Vec::new() };
        shader.execute(0, constants, threads, &mut sampler, false).unwrap()
    }

    fn constants() -> Vec<Vec4> {
        vec![[0.0; 4]; 512]
    }

    #[test]
    fn test_mad_with_constants_and_modifiers() {
        let program = [encode_instruction(Opcode::MAD)
            .op(1, Bank::Input, 0)
            .op(2, Bank::Param, 1)
            .op(3, Bank::Param2, 0)
            .negate(3)
            .result(Bank::Output, 0)
            .end()
            .build()];
        let shader = interpreter(&program);
        let mut c = constants();
        c[1] = [2.0, 2.0, 2.0, 2.0];
        c[256] = [1.0, 1.0, 1.0, 1.0];
        let mut t = [shader.new_thread()];
        t[0].input[0] = [1.0, 2.0, 3.0, 4.0];
        let stats = run(&shader, &c, &mut t);
        assert_eq!(t[0].output[0], [1.0, 3.0, 5.0, 7.0]);
        assert_eq!(stats.instructions, 1);
    }

    #[test]
    fn test_write_mask_swizzle_and_saturate() {
        let program = [
            encode_instruction(Opcode::MOV)
                .op(1, Bank::Input, 0)
                .swizzle(1, 0b11_10_01_00)
                .mask(WriteMask::X | WriteMask::Y)
                .saturate()
                .result(Bank::Temp, 2)
                .build(),
            encode_instruction(Opcode::MOV)
                .op(1, Bank::Temp, 2)
                .result(Bank::Output, 1)
                .end()
                .build(),
        ];
        let shader = interpreter(&program);
        let mut t = [shader.new_thread()];
        t[0].input[0] = [0.25, 0.5, -3.0, 7.0];
        run(&shader, &constants(), &mut t);
        assert_eq!(t[0].output[1], [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_predicated_write_commits_only_when_predicate_holds() {
        // p0 = i0.x < c0.x ; (p0) o0 = i1 ; (!p0) o1 = i1
        let program = [
            encode_instruction(Opcode::SETPLT)
                .op(1, Bank::Input, 0)
                .swizzle(1, swizzle_replicate(0))
                .op(2, Bank::Param, 0)
                .swizzle(2, swizzle_replicate(0))
                .result(Bank::Temp, 0)
                .build(),
            encode_instruction(Opcode::MOV)
                .op(1, Bank::Input, 1)
                .result(Bank::Output, 0)
                .predicate(0, false)
                .build(),
            encode_instruction(Opcode::MOV)
                .op(1, Bank::Input, 1)
                .result(Bank::Output, 1)
                .predicate(0, true)
                .end()
                .build(),
        ];
        let shader = interpreter(&program);
        let mut c = constants();
        c[0] = [5.0; 4];
        let mut t = [shader.new_thread()];
        t[0].input[0] = [1.0; 4];
        t[0].input[1] = [9.0; 4];
        run(&shader, &c, &mut t);
        assert!(t[0].predicate[0]);
        assert_eq!(t[0].output[0], [9.0; 4]);
        assert_eq!(t[0].output[1], [0.0; 4]);
    }

    #[test]
    fn test_jump_loop_with_integer_counter() {
        // r0 += 1 (int) ; p1 = r0.x < 3 ; (p1) jmp -2 ; o0 = r0
        let program = [
            encode_instruction(Opcode::ADDI)
                .op(1, Bank::Temp, 0)
                .immediate(1)
                .result(Bank::Temp, 0)
                .build(),
            encode_instruction(Opcode::STPLTI)
                .op(1, Bank::Temp, 0)
                .swizzle(1, swizzle_replicate(0))
                .immediate(3)
                .result(Bank::Temp, 1)
                .build(),
            encode_instruction(Opcode::JMP).op(1, Bank::Temp, 1).immediate((-2i32) as u32).build(),
            encode_instruction(Opcode::MOV)
                .op(1, Bank::Temp, 0)
                .result(Bank::Output, 0)
                .end()
                .build(),
        ];
        let shader = interpreter(&program);
        let mut t = [shader.new_thread()];
        let stats = run(&shader, &constants(), &mut t);
        assert_eq!(t[0].output[0][0].to_bits(), 3);
        assert_eq!(stats.instructions, 3 * 3 + 1);
    }

    #[test]
    fn test_jump_requires_every_lane() {
        let program = [
            encode_instruction(Opcode::JMP).op(1, Bank::Temp, 0).immediate(2).build(),
            encode_instruction(Opcode::MOV).op(1, Bank::Input, 0).result(Bank::Output, 0).build(),
            encode_instruction(Opcode::NOP).end().build(),
        ];
        let shader = interpreter(&program);
        let mut threads: Vec<ThreadState> = (0..4).map(|_| shader.new_thread()).collect();
        for t in threads.iter_mut() {
            t.input[0] = [1.0; 4];
            t.predicate[0] = true;
        }
        threads[3].predicate[0] = false;
        run(&shader, &constants(), &mut threads);
        assert!(threads.iter().all(|t| t.output[0] == [1.0; 4]));
    }

    #[test]
    fn test_kill_stops_commits_for_killed_lane() {
        let program = [
            encode_instruction(Opcode::KIL).op(1, Bank::Input, 0).build(),
            encode_instruction(Opcode::MOV)
                .op(1, Bank::Input, 1)
                .result(Bank::Output, 1)
                .end()
                .build(),
        ];
        let shader = interpreter(&program);
        let mut threads: Vec<ThreadState> = (0..4).map(|_| shader.new_thread()).collect();
        for t in threads.iter_mut() {
            t.input[1] = [0.5; 4];
        }
        threads[2].input[0] = [0.0, -1.0, 0.0, 0.0];
        run(&shader, &constants(), &mut threads);
        assert!(threads[2].killed());
        assert_eq!(threads[2].output[1], [0.0; 4]);
        assert_eq!(threads[0].output[1], [0.5; 4]);
        assert!(shader.program_kills(0).unwrap());
    }

    #[test]
    fn test_all_lanes_killed_ends_group() {
        let program = [
            encode_instruction(Opcode::KIL).op(1, Bank::Param, 0).negate(1).build(),
            encode_instruction(Opcode::NOP).build(),
        ];
        let shader = interpreter(&program);
        let mut c = constants();
        c[0] = [1.0; 4];
        let mut threads: Vec<ThreadState> = (0..4).map(|_| shader.new_thread()).collect();
        let stats = run(&shader, &c, &mut threads);
        assert_eq!(stats.instructions, 1);
    }

    #[test]
    fn test_texture_round_trip_once_per_instruction() {
        let program = [
            encode_instruction(Opcode::TXP)
                .op(1, Bank::Input, 1)
                .op(2, Bank::Input, 3)
                .result(Bank::Temp, 0)
                .build(),
            encode_instruction(Opcode::TXB)
                .op(1, Bank::Input, 1)
                .op(2, Bank::Input, 3)
                .result(Bank::Output, 1)
                .end()
                .build(),
        ];
        let shader = interpreter(&program);
        let mut threads: Vec<ThreadState> = (0..4).map(|_| shader.new_thread()).collect();
        for (i, t) in threads.iter_mut().enumerate() {
            t.input[1] = [i as f32 * 2.0, 4.0, 2.0, 2.0];
        }
        let mut sampler = EchoSampler { requests: Vec::new() };
        let stats = shader.execute(0, &constants(), &mut threads, &mut sampler, false).unwrap();
        assert_eq!(stats.texture_requests, 2);
        assert_eq!(sampler.requests.len(), 2);
        assert_eq!(sampler.requests[0].unit, 3);
        assert_eq!(sampler.requests[0].lanes, 4);
        assert_eq!(threads[1].temp[0], [1.0, 2.0, 1.0, 2.0]);
        assert_eq!(sampler.requests[1].parameter, [2.0; 4]);
        assert_eq!(sampler.requests[1].op, TextureOp::Read);
    }

    #[test]
    fn test_derivatives_over_quad() {
        let program = [
            encode_instruction(Opcode::DDX).op(1, Bank::Input, 0).result(Bank::Output, 1).build(),
            encode_instruction(Opcode::DDY)
                .op(1, Bank::Input, 0)
                .result(Bank::Output, 2)
                .end()
                .build(),
        ];
        let shader = interpreter(&program);
        let mut threads: Vec<ThreadState> = (0..4).map(|_| shader.new_thread()).collect();
        let positions = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)];
        for (t, (x, y)) in threads.iter_mut().zip(positions) {
            t.input[0] = [3.0 * x + y, 5.0 * y, 0.0, 0.0];
        }
        run(&shader, &constants(), &mut threads);
        for t in &threads {
            assert_eq!(t.output[1], [3.0, 0.0, 0.0, 0.0]);
            assert_eq!(t.output[2], [1.0, 5.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn test_fixed_point_accumulate() {
        let program = [
            encode_instruction(Opcode::FXMUL).op(1, Bank::Input, 0).op(2, Bank::Input, 1).build(),
            encode_instruction(Opcode::FXMAD)
                .op(1, Bank::Input, 0)
                .op(2, Bank::Input, 1)
                .result(Bank::Output, 0)
                .end()
                .build(),
        ];
        let shader = interpreter(&program);
        let mut t = [shader.new_thread()];
        t[0].input[0] = [1.5, 2.0, -1.0, 0.0];
        t[0].input[1] = [2.0, 0.25, 3.0, 8.0];
        run(&shader, &constants(), &mut t);
        assert_eq!(t[0].output[0], [6.0, 1.0, -6.0, 0.0]);
    }

    #[test]
    fn test_relative_constant_addressing() {
        let program = [
            encode_instruction(Opcode::ARL).op(1, Bank::Input, 0).result(Bank::Address, 0).build(),
            encode_instruction(Opcode::MOV)
                .op(1, Bank::Param, 2)
                .relative(0, 1, -1)
                .result(Bank::Output, 0)
                .end()
                .build(),
        ];
        let shader = interpreter(&program);
        let mut c = constants();
        c[4] = [7.0; 4];
        let mut t = [shader.new_thread()];
        t[0].input[0] = [0.0, 3.7, 0.0, 0.0];
        run(&shader, &c, &mut t);
        assert_eq!(t[0].address[0], [0, 3, 0, 0]);
        assert_eq!(t[0].output[0], [7.0; 4]);
    }

    #[test]
    fn test_lit_and_dst() {
        let program = [
            encode_instruction(Opcode::LIT).op(1, Bank::Input, 0).result(Bank::Output, 0).build(),
            encode_instruction(Opcode::DST)
                .op(1, Bank::Input, 1)
                .op(2, Bank::Input, 2)
                .result(Bank::Output, 1)
                .end()
                .build(),
        ];
        let shader = interpreter(&program);
        let mut t = [shader.new_thread()];
        t[0].input[0] = [0.5, 2.0, 0.0, 3.0];
        t[0].input[1] = [9.0, 2.0, 3.0, 9.0];
        t[0].input[2] = [9.0, 4.0, 9.0, 5.0];
        run(&shader, &constants(), &mut t);
        assert_eq!(t[0].output[0], [1.0, 0.5, 8.0, 1.0]);
        assert_eq!(t[0].output[1], [1.0, 8.0, 3.0, 5.0]);
    }

    #[test]
    fn test_depth_export_and_sample_change() {
        let mut program = vec![
            encode_instruction(Opcode::ZXP).op(1, Bank::Param, 0).build(),
            encode_instruction(Opcode::ZXS).op(1, Bank::Param, 1).op(2, Bank::Param, 1).build(),
        ];
        for _ in 0..MAX_MSAA_SAMPLES {
            program.push(encode_instruction(Opcode::CHS).build());
        }
        program.push(encode_instruction(Opcode::CHS).end().build());
        let shader = interpreter(&program);
        let mut c = constants();
        c[0] = [0.25; 4];
        c[1] = [0.1, 0.2, 0.3, 0.4];
        let mut threads: Vec<ThreadState> = (0..4).map(|_| shader.new_thread()).collect();
        run(&shader, &c, &mut threads);

        // ZXP fills every sample, ZXS then overrides samples 4..8.
        assert_eq!(threads[0].z_export, [0.25, 0.25, 0.25, 0.25, 0.1, 0.2, 0.3, 0.4]);
        assert_eq!(threads[3].sample_index, MAX_MSAA_SAMPLES - 1);
        assert!(shader.program_kills(0).unwrap());
    }

    #[test]
    fn test_fetch_past_end_is_fatal() {
        let program = [encode_instruction(Opcode::NOP).build()];
        let shader = interpreter(&program);
        let mut t = [shader.new_thread()];
        let mut sampler = EchoSampler { requests: Vec::new() };
        let err = shader.execute(0, &constants(), &mut t, &mut sampler, false).unwrap_err();
        assert!(matches!(err, FatalError::MalformedProgram { pc: 1, .. }));
    }

    #[test]
    fn test_write_to_input_bank_is_fatal() {
        let program = [encode_instruction(Opcode::MOV).result(Bank::Input, 0).end().build()];
        let shader = interpreter(&program);
        let mut t = [shader.new_thread()];
        let mut sampler = EchoSampler { requests: Vec::new() };
        assert!(shader.execute(0, &constants(), &mut t, &mut sampler, false).is_err());
    }
}
