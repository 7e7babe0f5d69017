//! Instruction Translator
//!
//! Lowers decoded R5900 instructions to [`Operation`] lists.
//!
//! # Conversion Strategy
//! - **Word ALU ops** (`addu`, `sll`, `lui`, ...): 32-bit result sign-extended to 64 bits
//! - **Logical and doubleword ops**: full 64-bit values
//! - **Trapping arithmetic** (`add`, `sub`, `dadd`, `daddi`, ...): `Checked`, which
//!   faults without writing the destination
//! - **Memory**: one `Memory` operation per access; alignment and the
//!   unaligned merge rules live in the runtime helpers
//! - **Branches and jumps**: translated together with their delay slot
//!   ([`translate_control_transfer`])
//! - **Unknown opcodes**: `Placeholder`, never an error
//!
//! Translation is pure: no I/O, no shared state. The emission driver owns
//! sequencing.

use crate::recompiler::analysis::{BasicBlock, Function};
use crate::recompiler::decoder::{DecodedInstruction, Opcode, RA};
use crate::recompiler::ir::instruction::{
    AluOp, CheckedOp, CmpOp, Condition, HiLo, MemOp, MulDivOp, Operation, PcTarget, Translation,
    Value,
};

/// Translate one instruction. Branches and jumps also consume `delay_slot`.
#[inline]
pub fn translate(instr: &DecodedInstruction, delay_slot: Option<&DecodedInstruction>) -> Translation {
    if instr.has_delay_slot() {
        translate_control_transfer(instr, delay_slot)
    } else {
        translate_simple(instr)
    }
}

/// Translate a non-control-transfer instruction (consumes 1).
pub fn translate_simple(instr: &DecodedInstruction) -> Translation {
    Translation::new(simple_operations(instr), 1)
}

/// Translate a branch or jump together with its delay slot.
///
/// Consumes 2 instructions, or 1 when there is no delay-slot instruction
/// (end of data); a missing delay slot behaves like a `nop`.
pub fn translate_control_transfer(
    branch: &DecodedInstruction,
    delay_slot: Option<&DecodedInstruction>,
) -> Translation {
    let address: u32 = branch.address;
    let return_address: u32 = address.wrapping_add(8);
    let consumed: usize = if delay_slot.is_some() { 2 } else { 1 };
    let delay_ops: Vec<Operation> = delay_slot.map(delay_operations).unwrap_or_default();
    let mut ops: Vec<Operation> = Vec::with_capacity(delay_ops.len() + 4);

    match branch.opcode() {
        Opcode::J | Opcode::Jal => {
            let target: u32 = branch.jump_target().unwrap_or(return_address);
            if branch.opcode() == Opcode::Jal {
                ops.push(Operation::Link {
                    reg: RA,
                    return_address,
                });
            }
            ops.extend(delay_ops);
            ops.push(Operation::SetPc(PcTarget::Const(target)));
        }
        Opcode::Jr | Opcode::Jalr => {
            let (link, rs): (Option<u8>, u8) = if branch.opcode() == Opcode::Jalr {
                (Some(branch.register(0)), branch.register(1))
            } else {
                (None, branch.register(0))
            };
            ops.push(Operation::LatchTarget(rs));
            if let Some(reg) = link {
                ops.push(Operation::Link {
                    reg,
                    return_address,
                });
            }
            ops.extend(delay_ops);
            ops.push(Operation::SetPc(PcTarget::Latched));
        }
        _ => {
            let (condition, target) = match (branch_condition(branch), branch.branch_target()) {
                (Some(condition), Some(target)) => (condition, target),
                _ => {
                    return Translation::new(vec![placeholder(branch)], 1);
                }
            };
            ops.push(Operation::LatchCondition(condition));
            if branch.is_link() {
                ops.push(Operation::Link {
                    reg: RA,
                    return_address,
                });
            }
            let not_taken: Vec<Operation> = vec![Operation::SetPc(PcTarget::Const(return_address))];
            if branch.is_branch_likely() {
                // The delay slot is nullified when the branch is not taken
                let mut taken: Vec<Operation> = delay_ops;
                taken.push(Operation::SetPc(PcTarget::Const(target)));
                ops.push(Operation::Branch { taken, not_taken });
            } else {
                ops.extend(delay_ops);
                ops.push(Operation::Branch {
                    taken: vec![Operation::SetPc(PcTarget::Const(target))],
                    not_taken,
                });
            }
        }
    }

    Translation::new(ops, consumed)
}

/// Translate every instruction of `block` in order.
///
/// A delay slot that starts the next block is fetched from `function`, so
/// it is translated inline here and again at the head of its own block.
pub fn translate_block<'a>(
    function: &'a Function,
    block: &'a BasicBlock,
) -> Vec<(&'a DecodedInstruction, Translation)> {
    let mut translations = Vec::with_capacity(block.instructions.len());
    let mut i: usize = 0;
    while i < block.instructions.len() {
        let instr: &DecodedInstruction = &block.instructions[i];
        let delay_slot: Option<&DecodedInstruction> = if instr.has_delay_slot() {
            block
                .instructions
                .get(i + 1)
                .or_else(|| function.instruction_at(instr.address.wrapping_add(4)))
        } else {
            None
        };
        let translation: Translation = translate(instr, delay_slot);
        i += translation.consumed;
        translations.push((instr, translation));
    }
    translations
}

/// Delay slots may not hold another control transfer.
fn delay_operations(instr: &DecodedInstruction) -> Vec<Operation> {
    if instr.has_delay_slot() {
        log::warn!(
            "Control transfer in delay slot at 0x{:08X}: {}",
            instr.address,
            instr
        );
        return vec![placeholder(instr)];
    }
    simple_operations(instr)
}

fn placeholder(instr: &DecodedInstruction) -> Operation {
    Operation::Placeholder {
        address: instr.address,
        raw: instr.raw,
    }
}

/// Condition tested by a conditional branch.
fn branch_condition(instr: &DecodedInstruction) -> Option<Condition> {
    use Opcode::*;
    let rs: u8 = instr.register(0);
    let zero: Value = Value::Imm(0);
    let condition: Condition = match instr.opcode() {
        Beq | Beql => Condition::new(CmpOp::Eq, rs, Value::Reg(instr.register(1))),
        Bne | Bnel => Condition::new(CmpOp::Ne, rs, Value::Reg(instr.register(1))),
        Blez | Blezl => Condition::new(CmpOp::Le, rs, zero),
        Bgtz | Bgtzl => Condition::new(CmpOp::Gt, rs, zero),
        Bltz | Bltzl | Bltzal | Bltzall => Condition::new(CmpOp::Lt, rs, zero),
        Bgez | Bgezl | Bgezal | Bgezall => Condition::new(CmpOp::Ge, rs, zero),
        _ => return None,
    };
    Some(condition)
}

#[inline(always)]
fn simm(instr: &DecodedInstruction, index: usize) -> Value {
    Value::Imm(instr.immediate(index) as i64 as u64)
}

fn alu(op: AluOp, dst: u8, lhs: Value, rhs: Value) -> Vec<Operation> {
    vec![Operation::Alu { op, dst, lhs, rhs }]
}

fn memory(instr: &DecodedInstruction, op: MemOp) -> Vec<Operation> {
    let (base, offset): (u8, i16) = instr.memory().unwrap_or((0, 0));
    vec![Operation::Memory {
        op,
        rt: instr.register(0),
        base,
        offset,
    }]
}

fn muldiv(instr: &DecodedInstruction, op: MulDivOp, pipeline: u8) -> Vec<Operation> {
    let (rd, rs, rt) = if op.writes_rd() {
        (instr.register(0), instr.register(1), instr.register(2))
    } else {
        (0, instr.register(0), instr.register(1))
    };
    vec![Operation::MulDiv {
        op,
        pipeline,
        rd,
        rs,
        rt,
    }]
}

fn trap(instr: &DecodedInstruction, op: CmpOp, immediate: bool) -> Vec<Operation> {
    let rhs: Value = if immediate {
        simm(instr, 1)
    } else {
        Value::Reg(instr.register(1))
    };
    vec![Operation::Trap {
        pc: instr.address,
        condition: Condition::new(op, instr.register(0), rhs),
    }]
}

fn checked(instr: &DecodedInstruction, op: CheckedOp, immediate: bool) -> Vec<Operation> {
    let rhs: Value = if immediate {
        simm(instr, 2)
    } else {
        Value::Reg(instr.register(2))
    };
    vec![Operation::Checked {
        op,
        pc: instr.address,
        dst: instr.register(0),
        lhs: instr.register(1),
        rhs,
    }]
}

fn simple_operations(instr: &DecodedInstruction) -> Vec<Operation> {
    use Opcode::*;
    let r = |i: usize| instr.register(i);
    let reg = |i: usize| Value::Reg(instr.register(i));
    // Immediate shifts: rd, rt, sa
    let shift_imm = |op: AluOp, extra: u64| {
        alu(op, r(0), reg(1), Value::Imm(instr.immediate(2) as u64 + extra))
    };

    match instr.opcode() {
        Nop | Sync | Cache | Pref => Vec::new(),

        // Shifts
        Sll => shift_imm(AluOp::Sll32, 0),
        Srl => shift_imm(AluOp::Srl32, 0),
        Sra => shift_imm(AluOp::Sra32, 0),
        Dsll => shift_imm(AluOp::Sll64, 0),
        Dsrl => shift_imm(AluOp::Srl64, 0),
        Dsra => shift_imm(AluOp::Sra64, 0),
        Dsll32 => shift_imm(AluOp::Sll64, 32),
        Dsrl32 => shift_imm(AluOp::Srl64, 32),
        Dsra32 => shift_imm(AluOp::Sra64, 32),
        // Variable shifts: rd, rt, rs
        Sllv => alu(AluOp::Sll32, r(0), reg(1), reg(2)),
        Srlv => alu(AluOp::Srl32, r(0), reg(1), reg(2)),
        Srav => alu(AluOp::Sra32, r(0), reg(1), reg(2)),
        Dsllv => alu(AluOp::Sll64, r(0), reg(1), reg(2)),
        Dsrlv => alu(AluOp::Srl64, r(0), reg(1), reg(2)),
        Dsrav => alu(AluOp::Sra64, r(0), reg(1), reg(2)),

        // Three-register ALU: rd, rs, rt
        Addu => alu(AluOp::Add32, r(0), reg(1), reg(2)),
        Subu => alu(AluOp::Sub32, r(0), reg(1), reg(2)),
        Daddu => alu(AluOp::Add64, r(0), reg(1), reg(2)),
        Dsubu => alu(AluOp::Sub64, r(0), reg(1), reg(2)),
        And => alu(AluOp::And, r(0), reg(1), reg(2)),
        Or => alu(AluOp::Or, r(0), reg(1), reg(2)),
        Xor => alu(AluOp::Xor, r(0), reg(1), reg(2)),
        Nor => alu(AluOp::Nor, r(0), reg(1), reg(2)),
        Slt => alu(AluOp::Slt, r(0), reg(1), reg(2)),
        Sltu => alu(AluOp::Sltu, r(0), reg(1), reg(2)),
        Add => checked(instr, CheckedOp::Add, false),
        Sub => checked(instr, CheckedOp::Sub, false),
        Dadd => checked(instr, CheckedOp::Dadd, false),
        Dsub => checked(instr, CheckedOp::Dsub, false),

        // Immediate ALU: rt, rs, imm
        Addiu => alu(AluOp::Add32, r(0), reg(1), simm(instr, 2)),
        Daddiu => alu(AluOp::Add64, r(0), reg(1), simm(instr, 2)),
        Slti => alu(AluOp::Slt, r(0), reg(1), simm(instr, 2)),
        Sltiu => alu(AluOp::Sltu, r(0), reg(1), simm(instr, 2)),
        // zero-extended by the decoder
        Andi => alu(AluOp::And, r(0), reg(1), simm(instr, 2)),
        Ori => alu(AluOp::Or, r(0), reg(1), simm(instr, 2)),
        Xori => alu(AluOp::Xor, r(0), reg(1), simm(instr, 2)),
        Addi => checked(instr, CheckedOp::Add, true),
        Daddi => checked(instr, CheckedOp::Dadd, true),
        Lui => vec![Operation::Move {
            dst: r(0),
            src: Value::Imm(((instr.immediate(1) as u32) << 16) as i32 as i64 as u64),
        }],

        Movz => vec![Operation::CondMove {
            dst: r(0),
            src: r(1),
            test: r(2),
            on_zero: true,
        }],
        Movn => vec![Operation::CondMove {
            dst: r(0),
            src: r(1),
            test: r(2),
            on_zero: false,
        }],

        // HI/LO
        Mfhi => vec![Operation::MoveFromHiLo { dst: r(0), which: HiLo::Hi, pipeline: 0 }],
        Mflo => vec![Operation::MoveFromHiLo { dst: r(0), which: HiLo::Lo, pipeline: 0 }],
        Mthi => vec![Operation::MoveToHiLo { src: r(0), which: HiLo::Hi, pipeline: 0 }],
        Mtlo => vec![Operation::MoveToHiLo { src: r(0), which: HiLo::Lo, pipeline: 0 }],
        Mfhi1 => vec![Operation::MoveFromHiLo { dst: r(0), which: HiLo::Hi, pipeline: 1 }],
        Mflo1 => vec![Operation::MoveFromHiLo { dst: r(0), which: HiLo::Lo, pipeline: 1 }],
        Mthi1 => vec![Operation::MoveToHiLo { src: r(0), which: HiLo::Hi, pipeline: 1 }],
        Mtlo1 => vec![Operation::MoveToHiLo { src: r(0), which: HiLo::Lo, pipeline: 1 }],
        Mult => muldiv(instr, MulDivOp::Mult, 0),
        Multu => muldiv(instr, MulDivOp::Multu, 0),
        Div => muldiv(instr, MulDivOp::Div, 0),
        Divu => muldiv(instr, MulDivOp::Divu, 0),
        Madd => muldiv(instr, MulDivOp::Madd, 0),
        Maddu => muldiv(instr, MulDivOp::Maddu, 0),
        Mult1 => muldiv(instr, MulDivOp::Mult, 1),
        Multu1 => muldiv(instr, MulDivOp::Multu, 1),
        Div1 => muldiv(instr, MulDivOp::Div, 1),
        Divu1 => muldiv(instr, MulDivOp::Divu, 1),
        Madd1 => muldiv(instr, MulDivOp::Madd, 1),
        Maddu1 => muldiv(instr, MulDivOp::Maddu, 1),

        // Shift amount register
        Mfsa => vec![Operation::MoveFromSa { dst: r(0) }],
        Mtsa => vec![Operation::MoveToSa { src: r(0) }],
        Mtsab => vec![Operation::SetSa { src: r(0), imm: instr.immediate(1) as i16, halfword: false }],
        Mtsah => vec![Operation::SetSa { src: r(0), imm: instr.immediate(1) as i16, halfword: true }],

        // Traps
        Tge => trap(instr, CmpOp::Ge, false),
        Tgeu => trap(instr, CmpOp::Geu, false),
        Tlt => trap(instr, CmpOp::Lt, false),
        Tltu => trap(instr, CmpOp::Ltu, false),
        Teq => trap(instr, CmpOp::Eq, false),
        Tne => trap(instr, CmpOp::Ne, false),
        Tgei => trap(instr, CmpOp::Ge, true),
        Tgeiu => trap(instr, CmpOp::Geu, true),
        Tlti => trap(instr, CmpOp::Lt, true),
        Tltiu => trap(instr, CmpOp::Ltu, true),
        Teqi => trap(instr, CmpOp::Eq, true),
        Tnei => trap(instr, CmpOp::Ne, true),

        // Memory
        Lb => memory(instr, MemOp::Lb),
        Lbu => memory(instr, MemOp::Lbu),
        Lh => memory(instr, MemOp::Lh),
        Lhu => memory(instr, MemOp::Lhu),
        Lw => memory(instr, MemOp::Lw),
        Lwu => memory(instr, MemOp::Lwu),
        Ld => memory(instr, MemOp::Ld),
        Lq => memory(instr, MemOp::Lq),
        Lwl => memory(instr, MemOp::Lwl),
        Lwr => memory(instr, MemOp::Lwr),
        Ldl => memory(instr, MemOp::Ldl),
        Ldr => memory(instr, MemOp::Ldr),
        Sb => memory(instr, MemOp::Sb),
        Sh => memory(instr, MemOp::Sh),
        Sw => memory(instr, MemOp::Sw),
        Sd => memory(instr, MemOp::Sd),
        Sq => memory(instr, MemOp::Sq),
        Swl => memory(instr, MemOp::Swl),
        Swr => memory(instr, MemOp::Swr),
        Sdl => memory(instr, MemOp::Sdl),
        Sdr => memory(instr, MemOp::Sdr),

        // COP0 and exceptions
        Mfc0 => vec![Operation::MoveFromCop0 { rt: r(0), rd: r(1) }],
        Mtc0 => vec![Operation::MoveToCop0 { rt: r(0), rd: r(1) }],
        Syscall => vec![Operation::Syscall { pc: instr.address }],
        Break => vec![Operation::Break {
            pc: instr.address,
            code: instr.immediate(0) as u32,
        }],

        // Control transfers are handled with their delay slot
        Beq | Bne | Blez | Bgtz | Beql | Bnel | Blezl | Bgtzl | Bltz | Bgez | Bltzl | Bgezl
        | Bltzal | Bgezal | Bltzall | Bgezall | J | Jal | Jr | Jalr => {
            vec![placeholder(instr)]
        }

        Unknown => {
            log::warn!(
                "Unknown instruction 0x{:08X} at 0x{:08X}, emitting placeholder",
                instr.raw,
                instr.address
            );
            vec![placeholder(instr)]
        }
    }
}
