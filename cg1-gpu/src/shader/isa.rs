// SPDX-FileCopyrightText: 2025 cg1 contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Native shader instruction encoding.
//!
//! Each instruction is 16 bytes: a `lo` word with opcode, flags, banks,
//! modifiers, relative addressing and result control, and a `hi` word with
//! operand registers and swizzles (or a 32-bit immediate when the second
//! operand bank is IMM).

use bitflags::bitflags;
use cg1_common::{FatalError, GpuResult, SHADER_INSTRUCTION_SIZE};

// ── Opcodes ──────────────────────────────────────────────────────────────────

macro_rules! opcodes {
    ($($name:ident = $value:literal),+ $(,)?) => {
        /// Shader opcode (bits[7:0] of the low word).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($name = $value),+
        }

        impl Opcode {
            pub fn from_raw(value: u8) -> Option<Self> {
                match value {
                    $($value => Some(Self::$name),)+
                    _ => None,
                }
            }

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)+
                }
            }
        }
    };
}

opcodes! {
    NOP = 0x00,
    ADD = 0x01,
    ADDI = 0x02,
    ARL = 0x03,
    ANDP = 0x04,
    NOP2 = 0x06,
    COS = 0x07,
    DP3 = 0x08,
    DP4 = 0x09,
    DPH = 0x0A,
    DST = 0x0B,
    EX2 = 0x0C,
    EXP = 0x0D,
    FLR = 0x0E,
    FRC = 0x0F,
    LG2 = 0x10,
    LIT = 0x11,
    LOG = 0x12,
    MAD = 0x13,
    MAX = 0x14,
    MIN = 0x15,
    MOV = 0x16,
    MUL = 0x17,
    MULI = 0x18,
    RCP = 0x19,
    NOP3 = 0x1A,
    RSQ = 0x1B,
    SETPEQ = 0x1C,
    SETPGT = 0x1D,
    SGE = 0x1E,
    SETPLT = 0x1F,
    SIN = 0x20,
    STPEQI = 0x21,
    SLT = 0x22,
    STPGTI = 0x23,
    STPLTI = 0x24,
    TXL = 0x25,
    TEX = 0x26,
    TXB = 0x27,
    TXP = 0x28,
    KIL = 0x29,
    KLS = 0x2A,
    ZXP = 0x2B,
    ZXS = 0x2C,
    CMP = 0x2D,
    CMPKIL = 0x2E,
    CHS = 0x2F,
    LDA = 0x30,
    FXMUL = 0x31,
    FXMAD = 0x32,
    FXMAD2 = 0x33,
    DDX = 0x34,
    DDY = 0x35,
    JMP = 0x36,
    END = 0x37,
}

impl Opcode {
    /// Texture unit round trip (including attribute loads).
    pub fn is_texture(self) -> bool {
        matches!(self, Self::TEX | Self::TXB | Self::TXP | Self::TXL | Self::LDA)
    }

    /// Writes the predicate bank instead of a register.
    pub fn writes_predicate(self) -> bool {
        matches!(
            self,
            Self::SETPEQ | Self::SETPGT | Self::SETPLT | Self::STPEQI | Self::STPGTI | Self::STPLTI | Self::ANDP
        )
    }

    /// Writes the fixed-point accumulator.
    pub fn writes_accumulator(self) -> bool {
        matches!(self, Self::FXMUL | Self::FXMAD2)
    }

    /// May discard the fragment or replace its depth.
    pub fn kills_or_exports(self) -> bool {
        matches!(self, Self::KIL | Self::KLS | Self::CMPKIL | Self::ZXP | Self::ZXS)
    }

    /// Operates on the integer view of the registers.
    pub fn is_integer(self) -> bool {
        matches!(self, Self::ADDI | Self::MULI)
    }

    /// Reads a single component and replicates the result.
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            Self::COS | Self::SIN | Self::EX2 | Self::LG2 | Self::RCP | Self::RSQ | Self::EXP | Self::LOG
        )
    }

    /// Number of register operands read.
    pub fn operands(self) -> u32 {
        match self {
            Self::NOP | Self::NOP2 | Self::NOP3 | Self::END | Self::CHS => 0,
            Self::ARL
            | Self::COS
            | Self::SIN
            | Self::EX2
            | Self::EXP
            | Self::FLR
            | Self::FRC
            | Self::LG2
            | Self::LIT
            | Self::LOG
            | Self::MOV
            | Self::RCP
            | Self::RSQ
            | Self::TEX
            | Self::TXB
            | Self::TXP
            | Self::TXL
            | Self::LDA
            | Self::KIL
            | Self::KLS
            | Self::ZXP
            | Self::ZXS
            | Self::DDX
            | Self::DDY
            | Self::JMP => 1,
            Self::MAD | Self::CMP | Self::CMPKIL | Self::FXMAD2 => 3,
            _ => 2,
        }
    }
}

// ── Banks ────────────────────────────────────────────────────────────────────

/// Register bank of an operand or result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bank {
    Input,
    Output,
    Param,
    Temp,
    Address,
    /// Upper half of the constant bank (PARAM + 256).
    Param2,
    Immediate,
}

impl Bank {
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Input),
            1 => Some(Self::Output),
            2 => Some(Self::Param),
            3 => Some(Self::Temp),
            4 => Some(Self::Address),
            5 => Some(Self::Param2),
            6 => Some(Self::Immediate),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Self::Input => 0,
            Self::Output => 1,
            Self::Param => 2,
            Self::Temp => 3,
            Self::Address => 4,
            Self::Param2 => 5,
            Self::Immediate => 6,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Input => "i",
            Self::Output => "o",
            Self::Param | Self::Param2 => "c",
            Self::Temp => "r",
            Self::Address => "a",
            Self::Immediate => "#",
        }
    }
}

bitflags! {
    /// Result component write mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WriteMask: u8 {
        const X = 0b1000;
        const Y = 0b0100;
        const Z = 0b0010;
        const W = 0b0001;

        const XYZW = Self::X.bits() | Self::Y.bits() | Self::Z.bits() | Self::W.bits();
    }
}

impl WriteMask {
    /// Per-component enables, in x, y, z, w order.
    pub fn components(self) -> [bool; 4] {
        [
            self.contains(Self::X),
            self.contains(Self::Y),
            self.contains(Self::Z),
            self.contains(Self::W),
        ]
    }
}

/// Identity swizzle (`.xyzw`).
pub const SWIZZLE_XYZW: u8 = 0b00_01_10_11;

/// Swizzle replicating one component.
pub const fn swizzle_replicate(component: u8) -> u8 {
    let c = component & 0x03;
    (c << 6) | (c << 4) | (c << 2) | c
}

/// Apply a packed swizzle (X selector in the high bits).
pub fn apply_swizzle<T: Copy>(mode: u8, v: [T; 4]) -> [T; 4] {
    [
        v[((mode >> 6) & 0x03) as usize],
        v[((mode >> 4) & 0x03) as usize],
        v[((mode >> 2) & 0x03) as usize],
        v[(mode & 0x03) as usize],
    ]
}

// ── Instruction ──────────────────────────────────────────────────────────────

/// Operand descriptor as decoded from the instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub bank: Bank,
    pub reg: u32,
    pub swizzle: u8,
    pub negate: bool,
    pub absolute: bool,
}

/// One raw 128-bit shader instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub lo: u64,
    pub hi: u64,
}

#[inline]
fn field(word: u64, shift: u32, bits: u32) -> u64 {
    (word >> shift) & ((1u64 << bits) - 1)
}

impl Instruction {
    pub fn from_bytes(bytes: &[u8; SHADER_INSTRUCTION_SIZE]) -> Self {
        let mut lo = [0u8; 8];
        let mut hi = [0u8; 8];
        lo.copy_from_slice(&bytes[..8]);
        hi.copy_from_slice(&bytes[8..]);
        Self {
            lo: u64::from_le_bytes(lo),
            hi: u64::from_le_bytes(hi),
        }
    }

    pub fn to_bytes(&self) -> [u8; SHADER_INSTRUCTION_SIZE] {
        let mut out = [0u8; SHADER_INSTRUCTION_SIZE];
        out[..8].copy_from_slice(&self.lo.to_le_bytes());
        out[8..].copy_from_slice(&self.hi.to_le_bytes());
        out
    }

    /// Check opcode and banks. `pc` is only used for the diagnostic.
    pub fn validate(&self, pc: u32) -> GpuResult<()> {
        let bad = |reason: String| FatalError::MalformedProgram { pc, reason };
        let opcode = self
            .opcode()
            .ok_or_else(|| bad(format!("invalid opcode 0x{:02X}", self.raw_opcode())))?;
        let used = opcode.operands();
        for (i, raw) in [self.raw_bank(17), self.raw_bank(20), self.raw_bank(23)].into_iter().enumerate() {
            if (i as u32) < used && Bank::from_raw(raw).is_none() {
                return Err(bad(format!("{} operand {} uses invalid bank {}", opcode.mnemonic(), i + 1, raw)));
            }
        }
        if !opcode.writes_predicate()
            && !opcode.writes_accumulator()
            && Bank::from_raw(self.raw_bank(46)).is_none()
        {
            return Err(bad(format!("{} result uses invalid bank {}", opcode.mnemonic(), self.raw_bank(46))));
        }
        Ok(())
    }

    fn raw_opcode(&self) -> u8 {
        field(self.lo, 0, 8) as u8
    }

    fn raw_bank(&self, shift: u32) -> u8 {
        field(self.lo, shift, 3) as u8
    }

    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_raw(self.raw_opcode())
    }

    /// Last instruction of the program.
    pub fn is_end(&self) -> bool {
        field(self.lo, 8, 1) != 0
    }

    pub fn wait_point(&self) -> bool {
        field(self.lo, 9, 1) != 0
    }

    pub fn predicated(&self) -> bool {
        field(self.lo, 10, 1) != 0
    }

    pub fn invert_predicate(&self) -> bool {
        field(self.lo, 11, 1) != 0
    }

    pub fn predicate_reg(&self) -> u32 {
        field(self.lo, 12, 5) as u32
    }

    pub fn relative_mode(&self) -> bool {
        field(self.lo, 32, 1) != 0
    }

    pub fn relative_addr_reg(&self) -> usize {
        field(self.lo, 33, 2) as usize
    }

    pub fn relative_component(&self) -> usize {
        field(self.lo, 35, 2) as usize
    }

    /// Signed 9-bit relative offset.
    pub fn relative_offset(&self) -> i32 {
        let raw = field(self.lo, 37, 9) as i32;
        (raw << 23) >> 23
    }

    pub fn result_bank(&self) -> Option<Bank> {
        Bank::from_raw(self.raw_bank(46))
    }

    pub fn saturate(&self) -> bool {
        field(self.lo, 49, 1) != 0
    }

    pub fn write_mask(&self) -> WriteMask {
        WriteMask::from_bits_truncate(field(self.lo, 50, 4) as u8)
    }

    /// Operand `n` (1..=3). Banks are validated at load time.
    pub fn operand(&self, n: u32) -> Operand {
        let (bank_shift, mod_shift) = match n {
            1 => (17, 26),
            2 => (20, 28),
            _ => (23, 30),
        };
        let (reg, swizzle) = match n {
            1 => (field(self.hi, 0, 8), field(self.hi, 8, 8)),
            2 => (field(self.hi, 16, 8), field(self.hi, 24, 8)),
            _ => (field(self.hi, 32, 8), field(self.hi, 40, 8)),
        };
        Operand {
            bank: Bank::from_raw(self.raw_bank(bank_shift)).unwrap_or(Bank::Temp),
            reg: reg as u32,
            swizzle: swizzle as u8,
            negate: field(self.lo, mod_shift, 1) != 0,
            absolute: field(self.lo, mod_shift + 1, 1) != 0,
        }
    }

    /// Second operand is an inline immediate.
    pub fn has_immediate(&self) -> bool {
        self.raw_bank(20) == Bank::Immediate.raw()
    }

    pub fn immediate(&self) -> u32 {
        field(self.hi, 16, 32) as u32
    }

    /// Jump displacement in instructions.
    pub fn jump_offset(&self) -> i32 {
        self.immediate() as i32
    }

    pub fn result_reg(&self) -> u32 {
        field(self.hi, 48, 8) as u32
    }

    /// Disassembly used by the instruction trace.
    pub fn disassemble(&self) -> String {
        let Some(opcode) = self.opcode() else {
            return format!("<invalid 0x{:02X}>", self.raw_opcode());
        };
        let mut text = String::new();
        if self.predicated() {
            text.push_str(&format!("({}p{}) ", if self.invert_predicate() { "!" } else { "" }, self.predicate_reg()));
        }
        text.push_str(opcode.mnemonic());
        if self.saturate() {
            text.push_str("_SAT");
        }
        if opcode.writes_predicate() {
            text.push_str(&format!(" p{}", self.result_reg()));
        } else if opcode.operands() > 0 && !matches!(opcode, Opcode::JMP | Opcode::KIL | Opcode::KLS) {
            if let Some(bank) = self.result_bank() {
                text.push_str(&format!(" {}{}", bank.prefix(), self.result_reg()));
            }
        }
        for n in 1..=opcode.operands() {
            if n == 2 && self.has_immediate() {
                text.push_str(&format!(", #{}", self.immediate() as i32));
                continue;
            }
            let op = self.operand(n);
            text.push_str(&format!(
                ", {}{}{}{}.{:02X}",
                if op.negate { "-" } else { "" },
                if op.absolute { "|" } else { "" },
                op.bank.prefix(),
                op.reg,
                op.swizzle
            ));
        }
        if self.is_end() {
            text.push_str(" [end]");
        }
        text
    }
}

// ── Encoder ──────────────────────────────────────────────────────────────────

/// Builder for native instructions (used by tests and tooling that
/// synthesizes programs).
#[derive(Debug, Clone, Copy)]
pub struct InstructionBuilder {
    lo: u64,
    hi: u64,
}

impl InstructionBuilder {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            lo: opcode as u64 | ((Bank::Temp.raw() as u64) << 46) | ((WriteMask::XYZW.bits() as u64) << 50),
            hi: 0,
        }
        .swizzles_identity()
    }

    fn swizzles_identity(mut self) -> Self {
        let s = SWIZZLE_XYZW as u64;
        self.hi |= (s << 8) | (s << 24) | (s << 40);
        self
    }

    fn set_lo(mut self, shift: u32, bits: u32, value: u64) -> Self {
        let mask = ((1u64 << bits) - 1) << shift;
        self.lo = (self.lo & !mask) | ((value << shift) & mask);
        self
    }

    fn set_hi(mut self, shift: u32, bits: u32, value: u64) -> Self {
        let mask = ((1u64 << bits) - 1) << shift;
        self.hi = (self.hi & !mask) | ((value << shift) & mask);
        self
    }

    pub fn end(self) -> Self {
        self.set_lo(8, 1, 1)
    }

    pub fn predicate(self, reg: u32, invert: bool) -> Self {
        self.set_lo(10, 1, 1).set_lo(11, 1, invert as u64).set_lo(12, 5, reg as u64)
    }

    pub fn result(self, bank: Bank, reg: u32) -> Self {
        self.set_lo(46, 3, bank.raw() as u64).set_hi(48, 8, reg as u64)
    }

    pub fn mask(self, mask: WriteMask) -> Self {
        self.set_lo(50, 4, mask.bits() as u64)
    }

    pub fn saturate(self) -> Self {
        self.set_lo(49, 1, 1)
    }

    pub fn op(self, n: u32, bank: Bank, reg: u32) -> Self {
        let (bank_shift, reg_shift) = match n {
            1 => (17, 0),
            2 => (20, 16),
            _ => (23, 32),
        };
        self.set_lo(bank_shift, 3, bank.raw() as u64).set_hi(reg_shift, 8, reg as u64)
    }

    pub fn swizzle(self, n: u32, swizzle: u8) -> Self {
        let shift = match n {
            1 => 8,
            2 => 24,
            _ => 40,
        };
        self.set_hi(shift, 8, swizzle as u64)
    }

    pub fn negate(self, n: u32) -> Self {
        self.set_lo(26 + 2 * (n - 1), 1, 1)
    }

    pub fn absolute(self, n: u32) -> Self {
        self.set_lo(27 + 2 * (n - 1), 1, 1)
    }

    /// Inline immediate as the second operand.
    pub fn immediate(self, value: u32) -> Self {
        self.set_lo(20, 3, Bank::Immediate.raw() as u64).set_hi(16, 32, value as u64)
    }

    pub fn relative(self, addr_reg: u32, component: u32, offset: i32) -> Self {
        self.set_lo(32, 1, 1)
            .set_lo(33, 2, addr_reg as u64)
            .set_lo(35, 2, component as u64)
            .set_lo(37, 9, (offset as u32 & 0x1FF) as u64)
    }

    pub fn build(self) -> Instruction {
        Instruction { lo: self.lo, hi: self.hi }
    }
}

/// Serialize a program into its in-memory byte form.
pub fn assemble(program: &[Instruction]) -> Vec<u8> {
    program.iter().flat_map(|i| i.to_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_table() {
        assert_eq!(Opcode::from_raw(0x05), None);
        assert_eq!(Opcode::from_raw(0x13), Some(Opcode::MAD));
        assert_eq!(Opcode::from_raw(0x37), Some(Opcode::END));
        assert_eq!(Opcode::from_raw(0x38), None);
        assert_eq!(Opcode::from_raw(0xFF), None);
    }

    #[test]
    fn test_field_layout() {
        let instr = InstructionBuilder::new(Opcode::MAD)
            .op(1, Bank::Input, 3)
            .op(2, Bank::Param, 7)
            .op(3, Bank::Temp, 1)
            .negate(2)
            .absolute(3)
            .result(Bank::Output, 5)
            .mask(WriteMask::X | WriteMask::W)
            .predicate(4, true)
            .saturate()
            .end()
            .build();

        assert_eq!(instr.opcode(), Some(Opcode::MAD));
        assert!(instr.is_end());
        assert!(instr.predicated());
        assert!(instr.invert_predicate());
        assert_eq!(instr.predicate_reg(), 4);
        assert!(instr.saturate());
        assert_eq!(instr.result_bank(), Some(Bank::Output));
        assert_eq!(instr.result_reg(), 5);
        assert_eq!(instr.write_mask().components(), [true, false, false, true]);

        let op2 = instr.operand(2);
        assert_eq!((op2.bank, op2.reg, op2.negate, op2.absolute), (Bank::Param, 7, true, false));
        let op3 = instr.operand(3);
        assert_eq!((op3.bank, op3.reg, op3.negate, op3.absolute), (Bank::Temp, 1, false, true));
        assert_eq!(instr.operand(1).swizzle, SWIZZLE_XYZW);
    }

    #[test]
    fn test_mask_and_opcode_bits() {
        let instr = InstructionBuilder::new(Opcode::MOV).mask(WriteMask::X).build();
        assert_eq!(instr.lo & 0xFF, 0x16);
        assert_eq!((instr.lo >> 50) & 0xF, 0x8);
    }

    #[test]
    fn test_immediate_and_relative_offset() {
        let instr = InstructionBuilder::new(Opcode::JMP).immediate((-3i32) as u32).build();
        assert!(instr.has_immediate());
        assert_eq!(instr.jump_offset(), -3);

        let rel = InstructionBuilder::new(Opcode::MOV).relative(1, 2, -256).build();
        assert!(rel.relative_mode());
        assert_eq!(rel.relative_addr_reg(), 1);
        assert_eq!(rel.relative_component(), 2);
        assert_eq!(rel.relative_offset(), -256);
    }

    #[test]
    fn test_swizzle() {
        assert_eq!(apply_swizzle(SWIZZLE_XYZW, [1, 2, 3, 4]), [1, 2, 3, 4]);
        assert_eq!(apply_swizzle(0b11_10_01_00, [1, 2, 3, 4]), [4, 3, 2, 1]);
        assert_eq!(apply_swizzle(swizzle_replicate(1), [1, 2, 3, 4]), [2, 2, 2, 2]);
    }

    #[test]
    fn test_validate_rejects_bad_opcode_and_bank() {
        let bad_op = Instruction { lo: 0x05, hi: 0 };
        assert!(matches!(bad_op.validate(3), Err(FatalError::MalformedProgram { pc: 3, .. })));

        let bad_bank = InstructionBuilder::new(Opcode::ADD).build();
        let bad_bank = Instruction {
            lo: bad_bank.lo | (7u64 << 20),
            hi: bad_bank.hi,
        };
        assert!(bad_bank.validate(0).is_err());

        let ok = InstructionBuilder::new(Opcode::ADD).op(2, Bank::Param, 0).build();
        assert!(ok.validate(0).is_ok());
    }

    #[test]
    fn test_bytes_round_trip() {
        let instr = InstructionBuilder::new(Opcode::DP4).op(2, Bank::Param, 2).end().build();
        assert_eq!(Instruction::from_bytes(&instr.to_bytes()), instr);
        assert_eq!(assemble(&[instr, instr]).len(), 32);
    }

    #[test]
    fn test_disassemble() {
        let instr = InstructionBuilder::new(Opcode::ADD)
            .op(1, Bank::Input, 1)
            .op(2, Bank::Param, 0)
            .result(Bank::Output, 1)
            .end()
            .build();
        let text = instr.disassemble();
        assert!(text.starts_with("ADD o1, i1"));
        assert!(text.ends_with("[end]"));
    }
}
