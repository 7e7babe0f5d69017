//! Operation IR
//!
//! The translator lowers each MIPS instruction to a short list of
//! [`Operation`]s. Operations are plain data: the Rust renderer turns them
//! into source text and the interpreter evaluates them, and both give an
//! operation the same meaning.
//!
//! # Memory Optimizations
//! - Small enums (`AluOp`, `CmpOp`, `MemOp`, `MulDivOp`) use `#[repr(u8)]`
//! - Register indices are `u8`
//!
//! # Control Transfers
//! A branch lowers to `LatchCondition`, an optional `Link`, the delay-slot
//! operations, then `Branch { taken, not_taken }` whose arms end in `SetPc`.
//! The condition is evaluated by `LatchCondition` *before* the delay slot
//! runs; `Branch` only reads the latched value. Register jumps latch their
//! target the same way with `LatchTarget`.

/// Source operand: a register's 64-bit value or a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Reg(u8),
    /// Constant, already extended to 64 bits
    Imm(u64),
}

/// Binary ALU operation on 64-bit register values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AluOp {
    /// 32-bit add, result sign-extended (`addu`, `addiu`)
    Add32 = 0,
    /// 32-bit subtract, result sign-extended (`subu`)
    Sub32 = 1,
    /// 64-bit add (`daddu`, `daddiu`)
    Add64 = 2,
    /// 64-bit subtract (`dsubu`)
    Sub64 = 3,
    And = 4,
    Or = 5,
    Xor = 6,
    Nor = 7,
    /// Signed 64-bit set-less-than
    Slt = 8,
    /// Unsigned 64-bit set-less-than
    Sltu = 9,
    /// Word shifts: shift amount masked to 5 bits, result sign-extended
    Sll32 = 10,
    Srl32 = 11,
    Sra32 = 12,
    /// Doubleword shifts: shift amount masked to 6 bits
    Sll64 = 13,
    Srl64 = 14,
    Sra64 = 15,
}

impl AluOp {
    /// Evaluate on 64-bit operands.
    #[inline]
    pub fn apply(self, a: u64, b: u64) -> u64 {
        #[inline(always)]
        fn sext32(value: u32) -> u64 {
            value as i32 as i64 as u64
        }
        match self {
            AluOp::Add32 => sext32((a as u32).wrapping_add(b as u32)),
            AluOp::Sub32 => sext32((a as u32).wrapping_sub(b as u32)),
            AluOp::Add64 => a.wrapping_add(b),
            AluOp::Sub64 => a.wrapping_sub(b),
            AluOp::And => a & b,
            AluOp::Or => a | b,
            AluOp::Xor => a ^ b,
            AluOp::Nor => !(a | b),
            AluOp::Slt => ((a as i64) < (b as i64)) as u64,
            AluOp::Sltu => (a < b) as u64,
            AluOp::Sll32 => sext32((a as u32) << (b & 31)),
            AluOp::Srl32 => sext32((a as u32) >> (b & 31)),
            AluOp::Sra32 => sext32(((a as u32 as i32) >> (b & 31)) as u32),
            AluOp::Sll64 => a << (b & 63),
            AluOp::Srl64 => a >> (b & 63),
            AluOp::Sra64 => ((a as i64) >> (b & 63)) as u64,
        }
    }
}

/// Comparison used by branches and traps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CmpOp {
    Eq = 0,
    Ne = 1,
    /// Signed comparisons
    Lt = 2,
    Le = 3,
    Gt = 4,
    Ge = 5,
    /// Unsigned comparisons
    Ltu = 6,
    Geu = 7,
}

impl CmpOp {
    #[inline]
    pub fn compare(self, a: u64, b: u64) -> bool {
        match self {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => (a as i64) < (b as i64),
            CmpOp::Le => (a as i64) <= (b as i64),
            CmpOp::Gt => (a as i64) > (b as i64),
            CmpOp::Ge => (a as i64) >= (b as i64),
            CmpOp::Ltu => a < b,
            CmpOp::Geu => a >= b,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt | CmpOp::Ltu => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge | CmpOp::Geu => ">=",
        }
    }

    #[inline]
    pub fn is_signed(self) -> bool {
        matches!(self, CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge)
    }
}

/// `GPR[lhs] <op> rhs` over the 64-bit register view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition {
    pub op: CmpOp,
    pub lhs: u8,
    pub rhs: Value,
}

impl Condition {
    pub fn new(op: CmpOp, lhs: u8, rhs: Value) -> Self {
        Self { op, lhs, rhs }
    }
}

/// Overflow-trapping arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CheckedOp {
    /// `add`, `addi`
    Add = 0,
    /// `sub`
    Sub = 1,
    /// `dadd`, `daddi`
    Dadd = 2,
    /// `dsub`
    Dsub = 3,
}

/// Memory access, named after the instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MemOp {
    Lb,
    Lbu,
    Lh,
    Lhu,
    Lw,
    Lwu,
    Ld,
    Lq,
    Lwl,
    Lwr,
    Ldl,
    Ldr,
    Sb,
    Sh,
    Sw,
    Sd,
    Sq,
    Swl,
    Swr,
    Sdl,
    Sdr,
}

impl MemOp {
    /// Name of the `runtime::ops` helper implementing the access.
    pub fn helper(self) -> &'static str {
        match self {
            MemOp::Lb => "lb",
            MemOp::Lbu => "lbu",
            MemOp::Lh => "lh",
            MemOp::Lhu => "lhu",
            MemOp::Lw => "lw",
            MemOp::Lwu => "lwu",
            MemOp::Ld => "ld",
            MemOp::Lq => "lq",
            MemOp::Lwl => "lwl",
            MemOp::Lwr => "lwr",
            MemOp::Ldl => "ldl",
            MemOp::Ldr => "ldr",
            MemOp::Sb => "sb",
            MemOp::Sh => "sh",
            MemOp::Sw => "sw",
            MemOp::Sd => "sd",
            MemOp::Sq => "sq",
            MemOp::Swl => "swl",
            MemOp::Swr => "swr",
            MemOp::Sdl => "sdl",
            MemOp::Sdr => "sdr",
        }
    }

    #[inline]
    pub fn is_store(self) -> bool {
        matches!(
            self,
            MemOp::Sb
                | MemOp::Sh
                | MemOp::Sw
                | MemOp::Sd
                | MemOp::Sq
                | MemOp::Swl
                | MemOp::Swr
                | MemOp::Sdl
                | MemOp::Sdr
        )
    }
}

/// Multiply / divide unit operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MulDivOp {
    Mult = 0,
    Multu = 1,
    Div = 2,
    Divu = 3,
    Madd = 4,
    Maddu = 5,
}

impl MulDivOp {
    /// Name of the `runtime::ops` helper.
    pub fn helper(self) -> &'static str {
        match self {
            MulDivOp::Mult => "mult",
            MulDivOp::Multu => "multu",
            MulDivOp::Div => "div",
            MulDivOp::Divu => "divu",
            MulDivOp::Madd => "madd",
            MulDivOp::Maddu => "maddu",
        }
    }

    /// Divides do not write a destination register.
    #[inline]
    pub fn writes_rd(self) -> bool {
        !matches!(self, MulDivOp::Div | MulDivOp::Divu)
    }
}

/// HI or LO half of the multiply unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HiLo {
    Hi = 0,
    Lo = 1,
}

/// New program counter for `SetPc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcTarget {
    Const(u32),
    /// Value captured by the preceding `LatchTarget`
    Latched,
}

/// One effect on the emulated CPU state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// `GPR[dst] = op(GPR[lhs] or const, rhs)`
    Alu { op: AluOp, dst: u8, lhs: Value, rhs: Value },
    /// `GPR[dst] = src` (64-bit)
    Move { dst: u8, src: Value },
    /// `movz`/`movn`: `if (GPR[test] == 0) == on_zero { GPR[dst] = GPR[src] }`
    CondMove { dst: u8, src: u8, test: u8, on_zero: bool },
    /// Overflow-trapping add/subtract; faults at `pc` without writing `dst`
    Checked { op: CheckedOp, pc: u32, dst: u8, lhs: u8, rhs: Value },
    /// Load or store through `offset(base)`
    Memory { op: MemOp, rt: u8, base: u8, offset: i16 },
    /// Multiply/divide on pipeline 0 (HI/LO) or 1 (HI1/LO1)
    MulDiv { op: MulDivOp, pipeline: u8, rd: u8, rs: u8, rt: u8 },
    /// `mfhi`/`mflo` (and pipeline-1 forms)
    MoveFromHiLo { dst: u8, which: HiLo, pipeline: u8 },
    /// `mthi`/`mtlo` (and pipeline-1 forms)
    MoveToHiLo { src: u8, which: HiLo, pipeline: u8 },
    /// `mfsa`
    MoveFromSa { dst: u8 },
    /// `mtsa`
    MoveToSa { src: u8 },
    /// `mtsab` (`halfword == false`) / `mtsah`
    SetSa { src: u8, imm: i16, halfword: bool },
    /// `mfc0`: COP0 register into GPR, sign-extended
    MoveFromCop0 { rt: u8, rd: u8 },
    /// `mtc0`
    MoveToCop0 { rt: u8, rd: u8 },
    /// Trap instruction: faults when the condition holds
    Trap { pc: u32, condition: Condition },
    /// `syscall` at `pc`
    Syscall { pc: u32 },
    /// `break`
    Break { pc: u32, code: u32 },
    /// Instruction the translator does not handle
    Placeholder { address: u32, raw: u32 },
    /// Evaluate a branch condition before the delay slot
    LatchCondition(Condition),
    /// Capture `GPR[reg]` as the jump target before the delay slot
    LatchTarget(u8),
    /// Write the return address
    Link { reg: u8, return_address: u32 },
    /// Choose an arm using the latched condition
    Branch { taken: Vec<Operation>, not_taken: Vec<Operation> },
    /// Leave the current block
    SetPc(PcTarget),
}

impl Operation {
    /// Does executing this operation leave the current block?
    pub fn is_terminator(&self) -> bool {
        matches!(self, Operation::SetPc(_) | Operation::Branch { .. })
    }

    /// Visit this operation and every nested one in program order.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Operation)) {
        visit(self);
        if let Operation::Branch { taken, not_taken } = self {
            for op in taken.iter().chain(not_taken.iter()) {
                op.walk(visit);
            }
        }
    }
}

/// Result of translating one instruction (plus its delay slot).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Translation {
    pub operations: Vec<Operation>,
    /// Instructions consumed from the stream: 1, or 2 with a delay slot
    pub consumed: usize,
}

impl Translation {
    pub fn new(operations: Vec<Operation>, consumed: usize) -> Self {
        Self {
            operations,
            consumed,
        }
    }

    /// Does the translation end the block?
    pub fn ends_block(&self) -> bool {
        self.operations.last().is_some_and(Operation::is_terminator)
    }
}
