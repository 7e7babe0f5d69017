//! MIPS R5900 Instruction Decoder
//!
//! Decodes 32-bit Emotion Engine instruction words into a structured form:
//! an opcode tag plus an ordered operand list. Decoding never fails; words
//! outside the supported integer subset (COP1, COP2/VU, most MMI) decode to
//! [`Opcode::Unknown`] and are kept so later stages can emit a placeholder.
//!
//! # Memory Optimizations
//! - `Opcode` uses `#[repr(u8)]` (one byte per instruction)
//! - Operands live in a `SmallVec<[Operand; 4]>`; no instruction has more than three
//! - Register indices are `u8`
//!
//! # Decoding Algorithm
//! 1. Primary opcode (bits 26-31)
//! 2. SPECIAL (0x00) and MMI (0x1C) select on `funct` (bits 0-5),
//!    REGIMM (0x01) on `rt` (bits 16-20), COP0 (0x10) on `rs` (bits 21-25)
//! 3. Operands are extracted per instruction format (see [`Opcode`] groups)
//!
//! # Operand Layouts
//! | Format                         | Operands                          |
//! |--------------------------------|-----------------------------------|
//! | three-register ALU, movz/movn  | `rd, rs, rt`                      |
//! | variable shifts (`sllv`, ...)  | `rd, rt, rs`                      |
//! | immediate shifts               | `rd, rt, sa`                      |
//! | immediate ALU                  | `rt, rs, imm`                     |
//! | `lui`                          | `rt, imm`                         |
//! | loads / stores                 | `rt, offset(base)`                |
//! | `cache` / `pref`               | `op, offset(base)`                |
//! | two-register branches          | `rs, rt, offset`                  |
//! | one-register branches          | `rs, offset`                      |
//! | `j` / `jal`                    | `index`                           |
//! | `jr` / `jalr`                  | `rs` / `rd, rs`                   |
//! | multiply / multiply-add        | `rd, rs, rt`                      |
//! | divide, register traps         | `rs, rt`                          |
//! | immediate traps, `mtsab/h`     | `rs, imm`                         |
//! | `mf*` / `mt*` HI/LO/SA         | `rd` / `rs`                       |
//! | `mfc0` / `mtc0`                | `rt, cop0_rd`                     |
//! | `syscall` / `break`            | `code`                            |

use crate::recompiler::config::Endianness;
use smallvec::SmallVec;
use std::fmt;

/// Conventional MIPS register names, indexed by register number.
pub const REGISTER_NAMES: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6",
    "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp",
    "fp", "ra",
];

/// Return address register.
pub const RA: u8 = 31;

/// R5900 integer instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // SPECIAL
    Sll,
    Srl,
    Sra,
    Sllv,
    Srlv,
    Srav,
    Jr,
    Jalr,
    Movz,
    Movn,
    Syscall,
    Break,
    Sync,
    Mfhi,
    Mthi,
    Mflo,
    Mtlo,
    Dsllv,
    Dsrlv,
    Dsrav,
    Mult,
    Multu,
    Div,
    Divu,
    Add,
    Addu,
    Sub,
    Subu,
    And,
    Or,
    Xor,
    Nor,
    Mfsa,
    Mtsa,
    Slt,
    Sltu,
    Dadd,
    Daddu,
    Dsub,
    Dsubu,
    Tge,
    Tgeu,
    Tlt,
    Tltu,
    Teq,
    Tne,
    Dsll,
    Dsrl,
    Dsra,
    Dsll32,
    Dsrl32,
    Dsra32,
    // REGIMM
    Bltz,
    Bgez,
    Bltzl,
    Bgezl,
    Tgei,
    Tgeiu,
    Tlti,
    Tltiu,
    Teqi,
    Tnei,
    Bltzal,
    Bgezal,
    Bltzall,
    Bgezall,
    Mtsab,
    Mtsah,
    // Primary opcodes
    J,
    Jal,
    Beq,
    Bne,
    Blez,
    Bgtz,
    Addi,
    Addiu,
    Slti,
    Sltiu,
    Andi,
    Ori,
    Xori,
    Lui,
    Beql,
    Bnel,
    Blezl,
    Bgtzl,
    Daddi,
    Daddiu,
    Ldl,
    Ldr,
    Lq,
    Sq,
    Lb,
    Lh,
    Lwl,
    Lw,
    Lbu,
    Lhu,
    Lwr,
    Lwu,
    Sb,
    Sh,
    Swl,
    Sw,
    Sdl,
    Sdr,
    Swr,
    Cache,
    Pref,
    Ld,
    Sd,
    // MMI
    Madd,
    Maddu,
    Mfhi1,
    Mthi1,
    Mflo1,
    Mtlo1,
    Mult1,
    Multu1,
    Div1,
    Divu1,
    Madd1,
    Maddu1,
    // COP0
    Mfc0,
    Mtc0,
    /// All-zero word
    Nop,
    /// Anything outside the supported subset
    Unknown,
}

impl Opcode {
    /// Assembler mnemonic.
    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Sll => "sll",
            Srl => "srl",
            Sra => "sra",
            Sllv => "sllv",
            Srlv => "srlv",
            Srav => "srav",
            Jr => "jr",
            Jalr => "jalr",
            Movz => "movz",
            Movn => "movn",
            Syscall => "syscall",
            Break => "break",
            Sync => "sync",
            Mfhi => "mfhi",
            Mthi => "mthi",
            Mflo => "mflo",
            Mtlo => "mtlo",
            Dsllv => "dsllv",
            Dsrlv => "dsrlv",
            Dsrav => "dsrav",
            Mult => "mult",
            Multu => "multu",
            Div => "div",
            Divu => "divu",
            Add => "add",
            Addu => "addu",
            Sub => "sub",
            Subu => "subu",
            And => "and",
            Or => "or",
            Xor => "xor",
            Nor => "nor",
            Mfsa => "mfsa",
            Mtsa => "mtsa",
            Slt => "slt",
            Sltu => "sltu",
            Dadd => "dadd",
            Daddu => "daddu",
            Dsub => "dsub",
            Dsubu => "dsubu",
            Tge => "tge",
            Tgeu => "tgeu",
            Tlt => "tlt",
            Tltu => "tltu",
            Teq => "teq",
            Tne => "tne",
            Dsll => "dsll",
            Dsrl => "dsrl",
            Dsra => "dsra",
            Dsll32 => "dsll32",
            Dsrl32 => "dsrl32",
            Dsra32 => "dsra32",
            Bltz => "bltz",
            Bgez => "bgez",
            Bltzl => "bltzl",
            Bgezl => "bgezl",
            Tgei => "tgei",
            Tgeiu => "tgeiu",
            Tlti => "tlti",
            Tltiu => "tltiu",
            Teqi => "teqi",
            Tnei => "tnei",
            Bltzal => "bltzal",
            Bgezal => "bgezal",
            Bltzall => "bltzall",
            Bgezall => "bgezall",
            Mtsab => "mtsab",
            Mtsah => "mtsah",
            J => "j",
            Jal => "jal",
            Beq => "beq",
            Bne => "bne",
            Blez => "blez",
            Bgtz => "bgtz",
            Addi => "addi",
            Addiu => "addiu",
            Slti => "slti",
            Sltiu => "sltiu",
            Andi => "andi",
            Ori => "ori",
            Xori => "xori",
            Lui => "lui",
            Beql => "beql",
            Bnel => "bnel",
            Blezl => "blezl",
            Bgtzl => "bgtzl",
            Daddi => "daddi",
            Daddiu => "daddiu",
            Ldl => "ldl",
            Ldr => "ldr",
            Lq => "lq",
            Sq => "sq",
            Lb => "lb",
            Lh => "lh",
            Lwl => "lwl",
            Lw => "lw",
            Lbu => "lbu",
            Lhu => "lhu",
            Lwr => "lwr",
            Lwu => "lwu",
            Sb => "sb",
            Sh => "sh",
            Swl => "swl",
            Sw => "sw",
            Sdl => "sdl",
            Sdr => "sdr",
            Swr => "swr",
            Cache => "cache",
            Pref => "pref",
            Ld => "ld",
            Sd => "sd",
            Madd => "madd",
            Maddu => "maddu",
            Mfhi1 => "mfhi1",
            Mthi1 => "mthi1",
            Mflo1 => "mflo1",
            Mtlo1 => "mtlo1",
            Mult1 => "mult1",
            Multu1 => "multu1",
            Div1 => "div1",
            Divu1 => "divu1",
            Madd1 => "madd1",
            Maddu1 => "maddu1",
            Mfc0 => "mfc0",
            Mtc0 => "mtc0",
            Nop => "nop",
            Unknown => "unknown",
        }
    }
}

/// Instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// General-purpose register (0-31)
    Register(u8),
    /// 16-bit immediate, already sign- or zero-extended per opcode
    Immediate(i32),
    /// 5-bit shift amount
    ShiftAmount(u8),
    /// Raw 26-bit `j`/`jal` index field
    JumpIndex(u32),
    /// `offset(base)` memory operand
    Memory { base: u8, offset: i16 },
    /// Coprocessor 0 register (0-31)
    Cop0Register(u8),
    /// `syscall`/`break` code or `cache`/`pref` operation field
    Code(u32),
}

/// Decoded instruction: opcode and operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: SmallVec<[Operand; 4]>,
}

/// Decoded instruction with its raw word and address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub instruction: Instruction,
    /// Raw 32-bit instruction word
    pub raw: u32,
    /// Virtual address of the instruction
    pub address: u32,
}

#[inline(always)]
fn rs(word: u32) -> u8 {
    ((word >> 21) & 0x1F) as u8
}

#[inline(always)]
fn rt(word: u32) -> u8 {
    ((word >> 16) & 0x1F) as u8
}

#[inline(always)]
fn rd(word: u32) -> u8 {
    ((word >> 11) & 0x1F) as u8
}

#[inline(always)]
fn sa(word: u32) -> u8 {
    ((word >> 6) & 0x1F) as u8
}

#[inline(always)]
fn simm(word: u32) -> i32 {
    (word & 0xFFFF) as i16 as i32
}

#[inline(always)]
fn uimm(word: u32) -> i32 {
    (word & 0xFFFF) as i32
}

type Operands = SmallVec<[Operand; 4]>;

fn regs3(a: u8, b: u8, c: u8) -> Operands {
    SmallVec::from_slice(&[Operand::Register(a), Operand::Register(b), Operand::Register(c)])
}

fn regs2(a: u8, b: u8) -> Operands {
    SmallVec::from_slice(&[Operand::Register(a), Operand::Register(b)])
}

fn reg1(a: u8) -> Operands {
    SmallVec::from_slice(&[Operand::Register(a)])
}

fn reg_imm(a: u8, imm: i32) -> Operands {
    SmallVec::from_slice(&[Operand::Register(a), Operand::Immediate(imm)])
}

fn regs2_imm(a: u8, b: u8, imm: i32) -> Operands {
    SmallVec::from_slice(&[Operand::Register(a), Operand::Register(b), Operand::Immediate(imm)])
}

fn memory(word: u32) -> Operands {
    SmallVec::from_slice(&[
        Operand::Register(rt(word)),
        Operand::Memory {
            base: rs(word),
            offset: (word & 0xFFFF) as i16,
        },
    ])
}

impl Instruction {
    /// Decode one instruction word located at `address`.
    #[inline] // Hot path - called for every instruction
    pub fn decode(word: u32, address: u32) -> DecodedInstruction {
        let (opcode, operands): (Opcode, Operands) = if word == 0 {
            (Opcode::Nop, SmallVec::new())
        } else {
            match word >> 26 {
                0x00 => Self::decode_special(word),
                0x01 => Self::decode_regimm(word),
                0x02 => (Opcode::J, SmallVec::from_slice(&[Operand::JumpIndex(word & 0x03FF_FFFF)])),
                0x03 => (Opcode::Jal, SmallVec::from_slice(&[Operand::JumpIndex(word & 0x03FF_FFFF)])),
                0x04 => (Opcode::Beq, regs2_imm(rs(word), rt(word), simm(word))),
                0x05 => (Opcode::Bne, regs2_imm(rs(word), rt(word), simm(word))),
                0x06 => (Opcode::Blez, reg_imm(rs(word), simm(word))),
                0x07 => (Opcode::Bgtz, reg_imm(rs(word), simm(word))),
                0x08 => (Opcode::Addi, regs2_imm(rt(word), rs(word), simm(word))),
                0x09 => (Opcode::Addiu, regs2_imm(rt(word), rs(word), simm(word))),
                0x0A => (Opcode::Slti, regs2_imm(rt(word), rs(word), simm(word))),
                0x0B => (Opcode::Sltiu, regs2_imm(rt(word), rs(word), simm(word))),
                0x0C => (Opcode::Andi, regs2_imm(rt(word), rs(word), uimm(word))),
                0x0D => (Opcode::Ori, regs2_imm(rt(word), rs(word), uimm(word))),
                0x0E => (Opcode::Xori, regs2_imm(rt(word), rs(word), uimm(word))),
                0x0F => (Opcode::Lui, reg_imm(rt(word), uimm(word))),
                0x10 => Self::decode_cop0(word),
                0x14 => (Opcode::Beql, regs2_imm(rs(word), rt(word), simm(word))),
                0x15 => (Opcode::Bnel, regs2_imm(rs(word), rt(word), simm(word))),
                0x16 => (Opcode::Blezl, reg_imm(rs(word), simm(word))),
                0x17 => (Opcode::Bgtzl, reg_imm(rs(word), simm(word))),
                0x18 => (Opcode::Daddi, regs2_imm(rt(word), rs(word), simm(word))),
                0x19 => (Opcode::Daddiu, regs2_imm(rt(word), rs(word), simm(word))),
                0x1A => (Opcode::Ldl, memory(word)),
                0x1B => (Opcode::Ldr, memory(word)),
                0x1C => Self::decode_mmi(word),
                0x1E => (Opcode::Lq, memory(word)),
                0x1F => (Opcode::Sq, memory(word)),
                0x20 => (Opcode::Lb, memory(word)),
                0x21 => (Opcode::Lh, memory(word)),
                0x22 => (Opcode::Lwl, memory(word)),
                0x23 => (Opcode::Lw, memory(word)),
                0x24 => (Opcode::Lbu, memory(word)),
                0x25 => (Opcode::Lhu, memory(word)),
                0x26 => (Opcode::Lwr, memory(word)),
                0x27 => (Opcode::Lwu, memory(word)),
                0x28 => (Opcode::Sb, memory(word)),
                0x29 => (Opcode::Sh, memory(word)),
                0x2A => (Opcode::Swl, memory(word)),
                0x2B => (Opcode::Sw, memory(word)),
                0x2C => (Opcode::Sdl, memory(word)),
                0x2D => (Opcode::Sdr, memory(word)),
                0x2E => (Opcode::Swr, memory(word)),
                0x2F => (Opcode::Cache, Self::code_memory(word)),
                0x33 => (Opcode::Pref, Self::code_memory(word)),
                0x37 => (Opcode::Ld, memory(word)),
                0x3F => (Opcode::Sd, memory(word)),
                _ => (Opcode::Unknown, SmallVec::new()),
            }
        };

        if opcode == Opcode::Unknown {
            log::debug!("Unknown instruction 0x{:08X} at 0x{:08X}", word, address);
        }

        DecodedInstruction {
            instruction: Instruction { opcode, operands },
            raw: word,
            address,
        }
    }

    fn code_memory(word: u32) -> Operands {
        SmallVec::from_slice(&[
            Operand::Code(rt(word) as u32),
            Operand::Memory {
                base: rs(word),
                offset: (word & 0xFFFF) as i16,
            },
        ])
    }

    fn decode_special(word: u32) -> (Opcode, Operands) {
        let (d, s, t) = (rd(word), rs(word), rt(word));
        let shift = |op: Opcode| -> (Opcode, Operands) {
            (
                op,
                SmallVec::from_slice(&[
                    Operand::Register(d),
                    Operand::Register(t),
                    Operand::ShiftAmount(sa(word)),
                ]),
            )
        };
        match word & 0x3F {
            0x00 => shift(Opcode::Sll),
            0x02 => shift(Opcode::Srl),
            0x03 => shift(Opcode::Sra),
            0x04 => (Opcode::Sllv, regs3(d, t, s)),
            0x06 => (Opcode::Srlv, regs3(d, t, s)),
            0x07 => (Opcode::Srav, regs3(d, t, s)),
            0x08 => (Opcode::Jr, reg1(s)),
            0x09 => (Opcode::Jalr, regs2(d, s)),
            0x0A => (Opcode::Movz, regs3(d, s, t)),
            0x0B => (Opcode::Movn, regs3(d, s, t)),
            0x0C => (Opcode::Syscall, SmallVec::from_slice(&[Operand::Code((word >> 6) & 0xF_FFFF)])),
            0x0D => (Opcode::Break, SmallVec::from_slice(&[Operand::Code((word >> 6) & 0xF_FFFF)])),
            0x0F => (Opcode::Sync, SmallVec::new()),
            0x10 => (Opcode::Mfhi, reg1(d)),
            0x11 => (Opcode::Mthi, reg1(s)),
            0x12 => (Opcode::Mflo, reg1(d)),
            0x13 => (Opcode::Mtlo, reg1(s)),
            0x14 => (Opcode::Dsllv, regs3(d, t, s)),
            0x16 => (Opcode::Dsrlv, regs3(d, t, s)),
            0x17 => (Opcode::Dsrav, regs3(d, t, s)),
            0x18 => (Opcode::Mult, regs3(d, s, t)),
            0x19 => (Opcode::Multu, regs3(d, s, t)),
            0x1A => (Opcode::Div, regs2(s, t)),
            0x1B => (Opcode::Divu, regs2(s, t)),
            0x20 => (Opcode::Add, regs3(d, s, t)),
            0x21 => (Opcode::Addu, regs3(d, s, t)),
            0x22 => (Opcode::Sub, regs3(d, s, t)),
            0x23 => (Opcode::Subu, regs3(d, s, t)),
            0x24 => (Opcode::And, regs3(d, s, t)),
            0x25 => (Opcode::Or, regs3(d, s, t)),
            0x26 => (Opcode::Xor, regs3(d, s, t)),
            0x27 => (Opcode::Nor, regs3(d, s, t)),
            0x28 => (Opcode::Mfsa, reg1(d)),
            0x29 => (Opcode::Mtsa, reg1(s)),
            0x2A => (Opcode::Slt, regs3(d, s, t)),
            0x2B => (Opcode::Sltu, regs3(d, s, t)),
            0x2C => (Opcode::Dadd, regs3(d, s, t)),
            0x2D => (Opcode::Daddu, regs3(d, s, t)),
            0x2E => (Opcode::Dsub, regs3(d, s, t)),
            0x2F => (Opcode::Dsubu, regs3(d, s, t)),
            0x30 => (Opcode::Tge, regs2(s, t)),
            0x31 => (Opcode::Tgeu, regs2(s, t)),
            0x32 => (Opcode::Tlt, regs2(s, t)),
            0x33 => (Opcode::Tltu, regs2(s, t)),
            0x34 => (Opcode::Teq, regs2(s, t)),
            0x36 => (Opcode::Tne, regs2(s, t)),
            0x38 => shift(Opcode::Dsll),
            0x3A => shift(Opcode::Dsrl),
            0x3B => shift(Opcode::Dsra),
            0x3C => shift(Opcode::Dsll32),
            0x3E => shift(Opcode::Dsrl32),
            0x3F => shift(Opcode::Dsra32),
            _ => (Opcode::Unknown, SmallVec::new()),
        }
    }

    fn decode_regimm(word: u32) -> (Opcode, Operands) {
        let s: u8 = rs(word);
        let opcode: Opcode = match rt(word) {
            0x00 => Opcode::Bltz,
            0x01 => Opcode::Bgez,
            0x02 => Opcode::Bltzl,
            0x03 => Opcode::Bgezl,
            0x08 => Opcode::Tgei,
            0x09 => Opcode::Tgeiu,
            0x0A => Opcode::Tlti,
            0x0B => Opcode::Tltiu,
            0x0C => Opcode::Teqi,
            0x0E => Opcode::Tnei,
            0x10 => Opcode::Bltzal,
            0x11 => Opcode::Bgezal,
            0x12 => Opcode::Bltzall,
            0x13 => Opcode::Bgezall,
            0x18 => Opcode::Mtsab,
            0x19 => Opcode::Mtsah,
            _ => return (Opcode::Unknown, SmallVec::new()),
        };
        (opcode, reg_imm(s, simm(word)))
    }

    fn decode_mmi(word: u32) -> (Opcode, Operands) {
        let (d, s, t) = (rd(word), rs(word), rt(word));
        match word & 0x3F {
            0x00 => (Opcode::Madd, regs3(d, s, t)),
            0x01 => (Opcode::Maddu, regs3(d, s, t)),
            0x10 => (Opcode::Mfhi1, reg1(d)),
            0x11 => (Opcode::Mthi1, reg1(s)),
            0x12 => (Opcode::Mflo1, reg1(d)),
            0x13 => (Opcode::Mtlo1, reg1(s)),
            0x18 => (Opcode::Mult1, regs3(d, s, t)),
            0x19 => (Opcode::Multu1, regs3(d, s, t)),
            0x1A => (Opcode::Div1, regs2(s, t)),
            0x1B => (Opcode::Divu1, regs2(s, t)),
            0x20 => (Opcode::Madd1, regs3(d, s, t)),
            0x21 => (Opcode::Maddu1, regs3(d, s, t)),
            // MMI0-3 sub-tables and the remaining MMI ops are vector operations
            _ => (Opcode::Unknown, SmallVec::new()),
        }
    }

    fn decode_cop0(word: u32) -> (Opcode, Operands) {
        let operands: Operands =
            SmallVec::from_slice(&[Operand::Register(rt(word)), Operand::Cop0Register(rd(word))]);
        match rs(word) {
            0x00 => (Opcode::Mfc0, operands),
            0x04 => (Opcode::Mtc0, operands),
            // BC0, TLB ops, eret, ei/di
            _ => (Opcode::Unknown, SmallVec::new()),
        }
    }
}

impl DecodedInstruction {
    #[inline(always)]
    pub fn opcode(&self) -> Opcode {
        self.instruction.opcode
    }

    #[inline]
    pub fn mnemonic(&self) -> &'static str {
        self.instruction.opcode.mnemonic()
    }

    #[inline]
    pub fn operands(&self) -> &[Operand] {
        &self.instruction.operands
    }

    /// Register operand at `index` (0 when the operand is not a register).
    #[inline]
    pub fn register(&self, index: usize) -> u8 {
        match self.instruction.operands.get(index) {
            Some(Operand::Register(r)) | Some(Operand::Cop0Register(r)) => *r,
            _ => 0,
        }
    }

    /// Immediate-like operand at `index` (0 when absent).
    #[inline]
    pub fn immediate(&self, index: usize) -> i32 {
        match self.instruction.operands.get(index) {
            Some(Operand::Immediate(v)) => *v,
            Some(Operand::ShiftAmount(v)) => *v as i32,
            Some(Operand::Code(v)) => *v as i32,
            Some(Operand::JumpIndex(v)) => *v as i32,
            _ => 0,
        }
    }

    /// The `offset(base)` operand, if the instruction accesses memory.
    #[inline]
    pub fn memory(&self) -> Option<(u8, i16)> {
        self.instruction.operands.iter().find_map(|op| match op {
            Operand::Memory { base, offset } => Some((*base, *offset)),
            _ => None,
        })
    }

    /// PC-relative conditional branch (including likely and linking forms).
    pub fn is_branch(&self) -> bool {
        use Opcode::*;
        matches!(
            self.opcode(),
            Beq | Bne | Blez | Bgtz | Beql | Bnel | Blezl | Bgtzl | Bltz | Bgez | Bltzl | Bgezl
                | Bltzal | Bgezal | Bltzall | Bgezall
        )
    }

    /// Absolute or register jump.
    pub fn is_jump(&self) -> bool {
        matches!(self.opcode(), Opcode::J | Opcode::Jal | Opcode::Jr | Opcode::Jalr)
    }

    /// Every branch and jump is followed by a delay slot.
    #[inline]
    pub fn has_delay_slot(&self) -> bool {
        self.is_branch() || self.is_jump()
    }

    /// Branches that nullify their delay slot when not taken.
    pub fn is_branch_likely(&self) -> bool {
        use Opcode::*;
        matches!(
            self.opcode(),
            Beql | Bnel | Blezl | Bgtzl | Bltzl | Bgezl | Bltzall | Bgezall
        )
    }

    /// Control transfers that write a return address.
    pub fn is_link(&self) -> bool {
        use Opcode::*;
        matches!(self.opcode(), Jal | Jalr | Bltzal | Bgezal | Bltzall | Bgezall)
    }

    pub fn is_register_jump(&self) -> bool {
        matches!(self.opcode(), Opcode::Jr | Opcode::Jalr)
    }

    /// `jr $ra`.
    pub fn is_return(&self) -> bool {
        self.opcode() == Opcode::Jr && self.register(0) == RA
    }

    /// `jr` through any register other than `$ra`: a computed goto.
    pub fn is_jumptable_jump(&self) -> bool {
        self.opcode() == Opcode::Jr && self.register(0) != RA
    }

    /// Branches whose condition is statically true (`b`, `bal`).
    pub fn is_unconditional_branch(&self) -> bool {
        use Opcode::*;
        match self.opcode() {
            Beq | Beql => self.register(0) == self.register(1),
            Bgez | Bgezl | Blez | Blezl | Bgezal | Bgezall => self.register(0) == 0,
            _ => false,
        }
    }

    /// Control leaves the block without a fall-through path.
    pub fn ends_without_fallthrough(&self) -> bool {
        match self.opcode() {
            Opcode::J | Opcode::Jr => true,
            _ => self.is_unconditional_branch() && !self.is_link(),
        }
    }

    /// `address + 4 + (offset << 2)` for PC-relative branches.
    pub fn branch_target(&self) -> Option<u32> {
        if !self.is_branch() {
            return None;
        }
        let offset: i32 = self.immediate(self.instruction.operands.len() - 1);
        Some(
            self.address
                .wrapping_add(4)
                .wrapping_add((offset << 2) as u32),
        )
    }

    /// `(address & 0xF000_0000) | (index << 2)` for `j`/`jal`.
    pub fn jump_target(&self) -> Option<u32> {
        match self.opcode() {
            Opcode::J | Opcode::Jal => {
                let index: u32 = self.immediate(0) as u32;
                Some((self.address & 0xF000_0000) | (index << 2))
            }
            _ => None,
        }
    }

    /// Statically known control-transfer target.
    #[inline]
    pub fn target(&self) -> Option<u32> {
        self.branch_target().or_else(|| self.jump_target())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(r) => write!(f, "${}", REGISTER_NAMES[(*r & 0x1F) as usize]),
            Operand::Immediate(v) => write!(f, "{}", v),
            Operand::ShiftAmount(v) => write!(f, "{}", v),
            Operand::JumpIndex(v) => write!(f, "0x{:07X}", v),
            Operand::Memory { base, offset } => {
                write!(f, "{}(${})", offset, REGISTER_NAMES[(*base & 0x1F) as usize])
            }
            Operand::Cop0Register(r) => write!(f, "${}", r),
            Operand::Code(v) => write!(f, "0x{:X}", v),
        }
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.opcode() == Opcode::Unknown {
            return write!(f, ".word 0x{:08X}", self.raw);
        }
        f.write_str(self.mnemonic())?;
        let target: Option<u32> = self.target();
        let operands: &[Operand] = self.operands();
        for (i, operand) in operands.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            // Show resolved targets instead of raw offsets
            match (target, i + 1 == operands.len()) {
                (Some(t), true) => write!(f, "0x{:08X}", t)?,
                _ => write!(f, "{}", operand)?,
            }
        }
        Ok(())
    }
}

/// Decode a section. A trailing partial word ends decoding silently.
pub fn decode_section(bytes: &[u8], base: u32, endianness: Endianness) -> Vec<DecodedInstruction> {
    let chunks = bytes.chunks_exact(4);
    if !chunks.remainder().is_empty() {
        log::warn!(
            "Ignoring {} trailing byte(s) at 0x{:08X}",
            chunks.remainder().len(),
            base.wrapping_add((bytes.len() - chunks.remainder().len()) as u32)
        );
    }
    chunks
        .enumerate()
        .map(|(i, chunk)| {
            let word: u32 = endianness.word([chunk[0], chunk[1], chunk[2], chunk[3]]);
            Instruction::decode(word, base.wrapping_add((i * 4) as u32))
        })
        .collect()
}
