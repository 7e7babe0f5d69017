//! Operation Interpreter
//!
//! Evaluates operation lists directly against a [`CpuContext`], with the same
//! meaning the Rust renderer gives them. Memory, trapping and multiply/divide
//! operations go through the `runtime::ops` helpers that recompiled code
//! calls, so the two paths cannot drift apart.
//!
//! Mainly used by tests to check translated semantics without compiling the
//! generated source.

use crate::recompiler::analysis::Function;
use crate::recompiler::ir::builder::translate_block;
use crate::recompiler::ir::instruction::{
    CheckedOp, Condition, HiLo, MemOp, MulDivOp, Operation, PcTarget, Value,
};
use crate::runtime::context::CpuContext;
use crate::runtime::error::RuntimeResult;
use crate::runtime::memory::MemoryManager;
use crate::runtime::ops;

/// Interpreter state carried between the operations of one control transfer.
#[derive(Debug, Default, Clone)]
pub struct Interpreter {
    branch_taken: bool,
    jump_target: u32,
    jumped: bool,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Did the last [`execute`](Self::execute) leave the block through `SetPc`?
    #[inline]
    pub fn jumped(&self) -> bool {
        self.jumped
    }

    /// Execute `operations` in order.
    ///
    /// Stops after the first `SetPc`, which updates `ctx.pc`.
    pub fn execute(
        &mut self,
        operations: &[Operation],
        ctx: &mut CpuContext,
        memory: &mut MemoryManager,
    ) -> RuntimeResult<()> {
        self.jumped = false;
        for op in operations {
            self.step(op, ctx, memory)?;
            if self.jumped {
                break;
            }
        }
        Ok(())
    }

    fn step(
        &mut self,
        op: &Operation,
        ctx: &mut CpuContext,
        memory: &mut MemoryManager,
    ) -> RuntimeResult<()> {
        match op {
            Operation::Alu { op, dst, lhs, rhs } => {
                let value: u64 = op.apply(read(ctx, *lhs), read(ctx, *rhs));
                ctx.set_gpr_u64(*dst, value);
            }
            Operation::Move { dst, src } => {
                let value: u64 = read(ctx, *src);
                ctx.set_gpr_u64(*dst, value);
            }
            Operation::CondMove {
                dst,
                src,
                test,
                on_zero,
            } => {
                if (ctx.gpr_u64(*test) == 0) == *on_zero {
                    let value: u64 = ctx.gpr_u64(*src);
                    ctx.set_gpr_u64(*dst, value);
                }
            }
            Operation::Checked {
                op,
                pc,
                dst,
                lhs,
                rhs,
            } => match (op, rhs) {
                (CheckedOp::Add, Value::Reg(r)) => ops::add(ctx, *pc, *dst, *lhs, *r)?,
                (CheckedOp::Sub, Value::Reg(r)) => ops::sub(ctx, *pc, *dst, *lhs, *r)?,
                (CheckedOp::Dadd, Value::Reg(r)) => ops::dadd(ctx, *pc, *dst, *lhs, *r)?,
                (CheckedOp::Dsub, Value::Reg(r)) => ops::dsub(ctx, *pc, *dst, *lhs, *r)?,
                (CheckedOp::Add, Value::Imm(imm)) => {
                    ops::addi(ctx, *pc, *dst, *lhs, *imm as i64 as i16)?
                }
                (CheckedOp::Dadd, Value::Imm(imm)) => {
                    ops::daddi(ctx, *pc, *dst, *lhs, *imm as i64 as i16)?
                }
                (CheckedOp::Sub, Value::Imm(imm)) => {
                    ops::addi(ctx, *pc, *dst, *lhs, imm.wrapping_neg() as i64 as i16)?
                }
                (CheckedOp::Dsub, Value::Imm(imm)) => {
                    ops::daddi(ctx, *pc, *dst, *lhs, imm.wrapping_neg() as i64 as i16)?
                }
            },
            Operation::Memory {
                op,
                rt,
                base,
                offset,
            } => memory_op(*op, ctx, memory, *rt, *base, *offset)?,
            Operation::MulDiv {
                op,
                pipeline,
                rd,
                rs,
                rt,
            } => match op {
                MulDivOp::Mult => ops::mult(ctx, *pipeline, *rd, *rs, *rt),
                MulDivOp::Multu => ops::multu(ctx, *pipeline, *rd, *rs, *rt),
                MulDivOp::Madd => ops::madd(ctx, *pipeline, *rd, *rs, *rt),
                MulDivOp::Maddu => ops::maddu(ctx, *pipeline, *rd, *rs, *rt),
                MulDivOp::Div => ops::div(ctx, *pipeline, *rs, *rt),
                MulDivOp::Divu => ops::divu(ctx, *pipeline, *rs, *rt),
            },
            Operation::MoveFromHiLo {
                dst,
                which,
                pipeline,
            } => {
                let value: u64 = match (which, pipeline) {
                    (HiLo::Hi, 0) => ctx.hi_u64(),
                    (HiLo::Lo, 0) => ctx.lo_u64(),
                    (HiLo::Hi, _) => ctx.hi1_u64(),
                    (HiLo::Lo, _) => ctx.lo1_u64(),
                };
                ctx.set_gpr_u64(*dst, value);
            }
            Operation::MoveToHiLo {
                src,
                which,
                pipeline,
            } => {
                let value: u64 = ctx.gpr_u64(*src);
                match (which, pipeline) {
                    (HiLo::Hi, 0) => ctx.set_hi_u64(value),
                    (HiLo::Lo, 0) => ctx.set_lo_u64(value),
                    (HiLo::Hi, _) => ctx.set_hi1_u64(value),
                    (HiLo::Lo, _) => ctx.set_lo1_u64(value),
                }
            }
            Operation::MoveFromSa { dst } => {
                let value: u64 = ctx.sa as u64;
                ctx.set_gpr_u64(*dst, value);
            }
            Operation::MoveToSa { src } => ctx.sa = ctx.gpr_u32(*src),
            Operation::SetSa { src, imm, halfword } => {
                if *halfword {
                    ops::mtsah(ctx, *src, *imm);
                } else {
                    ops::mtsab(ctx, *src, *imm);
                }
            }
            Operation::MoveFromCop0 { rt, rd } => ops::mfc0(ctx, *rt, *rd),
            Operation::MoveToCop0 { rt, rd } => ops::mtc0(ctx, *rt, *rd),
            Operation::Trap { pc, condition } => ops::trap_if(evaluate(ctx, condition), *pc)?,
            Operation::Syscall { pc } => ops::syscall(ctx, memory, *pc)?,
            Operation::Break { pc, code } => ops::breakpoint(*pc, *code)?,
            Operation::Placeholder { address, raw } => {
                log::trace!("Skipping placeholder 0x{:08X} at 0x{:08X}", raw, address);
            }
            Operation::LatchCondition(condition) => {
                self.branch_taken = evaluate(ctx, condition);
            }
            Operation::LatchTarget(reg) => {
                self.jump_target = ctx.gpr_u32(*reg);
            }
            Operation::Link {
                reg,
                return_address,
            } => ctx.set_gpr_u64(*reg, *return_address as i32 as i64 as u64),
            Operation::Branch { taken, not_taken } => {
                let arm: &[Operation] = if self.branch_taken {
                    taken.as_slice()
                } else {
                    not_taken.as_slice()
                };
                for op in arm {
                    self.step(op, ctx, memory)?;
                    if self.jumped {
                        break;
                    }
                }
            }
            Operation::SetPc(target) => {
                ctx.pc = match target {
                    PcTarget::Const(address) => *address,
                    PcTarget::Latched => self.jump_target,
                };
                self.jumped = true;
            }
        }
        Ok(())
    }

    /// Run `function` from `ctx.pc` until control leaves its blocks.
    ///
    /// Mirrors the dispatch loop of generated code: returns `Ok(())` as soon
    /// as `ctx.pc` is not the start of one of the function's blocks.
    pub fn run_function(
        function: &Function,
        ctx: &mut CpuContext,
        memory: &mut MemoryManager,
    ) -> RuntimeResult<()> {
        let mut interpreter: Interpreter = Interpreter::new();
        loop {
            let block = match function
                .blocks
                .binary_search_by_key(&ctx.pc, |b| b.start_address)
            {
                Ok(index) => &function.blocks[index],
                Err(_) => return Ok(()),
            };
            let mut left_block: bool = false;
            for (_, translation) in translate_block(function, block) {
                interpreter.execute(&translation.operations, ctx, memory)?;
                if interpreter.jumped() {
                    left_block = true;
                    break;
                }
            }
            if !left_block {
                // fall through
                ctx.pc = block.end_address;
            }
        }
    }
}

#[inline]
fn read(ctx: &CpuContext, value: Value) -> u64 {
    match value {
        Value::Reg(r) => ctx.gpr_u64(r),
        Value::Imm(imm) => imm,
    }
}

#[inline]
fn evaluate(ctx: &CpuContext, condition: &Condition) -> bool {
    condition
        .op
        .compare(ctx.gpr_u64(condition.lhs), read(ctx, condition.rhs))
}

fn memory_op(
    op: MemOp,
    ctx: &mut CpuContext,
    memory: &mut MemoryManager,
    rt: u8,
    base: u8,
    offset: i16,
) -> RuntimeResult<()> {
    match op {
        MemOp::Lb => ops::lb(ctx, memory, rt, base, offset),
        MemOp::Lbu => ops::lbu(ctx, memory, rt, base, offset),
        MemOp::Lh => ops::lh(ctx, memory, rt, base, offset),
        MemOp::Lhu => ops::lhu(ctx, memory, rt, base, offset),
        MemOp::Lw => ops::lw(ctx, memory, rt, base, offset),
        MemOp::Lwu => ops::lwu(ctx, memory, rt, base, offset),
        MemOp::Ld => ops::ld(ctx, memory, rt, base, offset),
        MemOp::Lq => ops::lq(ctx, memory, rt, base, offset),
        MemOp::Lwl => ops::lwl(ctx, memory, rt, base, offset),
        MemOp::Lwr => ops::lwr(ctx, memory, rt, base, offset),
        MemOp::Ldl => ops::ldl(ctx, memory, rt, base, offset),
        MemOp::Ldr => ops::ldr(ctx, memory, rt, base, offset),
        MemOp::Sb => ops::sb(ctx, memory, rt, base, offset),
        MemOp::Sh => ops::sh(ctx, memory, rt, base, offset),
        MemOp::Sw => ops::sw(ctx, memory, rt, base, offset),
        MemOp::Sd => ops::sd(ctx, memory, rt, base, offset),
        MemOp::Sq => ops::sq(ctx, memory, rt, base, offset),
        MemOp::Swl => ops::swl(ctx, memory, rt, base, offset),
        MemOp::Swr => ops::swr(ctx, memory, rt, base, offset),
        MemOp::Sdl => ops::sdl(ctx, memory, rt, base, offset),
        MemOp::Sdr => ops::sdr(ctx, memory, rt, base, offset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recompiler::ir::instruction::{AluOp, CmpOp};
    use crate::runtime::context::reg;
    use crate::runtime::error::RuntimeError;

    fn setup() -> (Interpreter, CpuContext, MemoryManager) {
        (Interpreter::new(), CpuContext::new(), MemoryManager::with_size(0x1000))
    }

    #[test]
    fn test_latched_condition_survives_delay_slot() {
        let (mut interp, mut ctx, mut mem) = setup();
        ctx.set_gpr_u64(reg::A0, 0);
        let ops = vec![
            Operation::LatchCondition(Condition::new(CmpOp::Eq, reg::A0, Value::Reg(0))),
            // delay slot clobbers the compared register
            Operation::Move { dst: reg::A0, src: Value::Imm(7) },
            Operation::Branch {
                taken: vec![Operation::SetPc(PcTarget::Const(0x100))],
                not_taken: vec![Operation::SetPc(PcTarget::Const(0x200))],
            },
        ];
        interp.execute(&ops, &mut ctx, &mut mem).unwrap();
        assert!(interp.jumped());
        assert_eq!(ctx.pc, 0x100);
        assert_eq!(ctx.gpr_u64(reg::A0), 7);
    }

    #[test]
    fn test_likely_not_taken_skips_delay_slot() {
        let (mut interp, mut ctx, mut mem) = setup();
        ctx.set_gpr_u64(reg::A0, 1);
        let ops = vec![
            Operation::LatchCondition(Condition::new(CmpOp::Eq, reg::A0, Value::Reg(0))),
            Operation::Branch {
                taken: vec![
                    Operation::Move { dst: reg::V0, src: Value::Imm(9) },
                    Operation::SetPc(PcTarget::Const(0x100)),
                ],
                not_taken: vec![Operation::SetPc(PcTarget::Const(0x200))],
            },
        ];
        interp.execute(&ops, &mut ctx, &mut mem).unwrap();
        assert_eq!(ctx.pc, 0x200);
        assert_eq!(ctx.gpr_u64(reg::V0), 0);
    }

    #[test]
    fn test_zero_register_is_never_written() {
        let (mut interp, mut ctx, mut mem) = setup();
        let ops = vec![Operation::Alu {
            op: AluOp::Add64,
            dst: reg::ZERO,
            lhs: Value::Imm(5),
            rhs: Value::Imm(5),
        }];
        interp.execute(&ops, &mut ctx, &mut mem).unwrap();
        assert_eq!(ctx.gpr_u64(reg::ZERO), 0);
        assert!(!interp.jumped());
    }

    #[test]
    fn test_trap_fires() {
        let (mut interp, mut ctx, mut mem) = setup();
        let ops = vec![Operation::Trap {
            pc: 0x40,
            condition: Condition::new(CmpOp::Eq, reg::ZERO, Value::Imm(0)),
        }];
        assert_eq!(
            interp.execute(&ops, &mut ctx, &mut mem),
            Err(RuntimeError::Trap { pc: 0x40 })
        );
    }

    #[test]
    fn test_link_sign_extends_return_address() {
        let (mut interp, mut ctx, mut mem) = setup();
        let ops = vec![Operation::Link { reg: reg::RA, return_address: 0x8000_0010 }];
        interp.execute(&ops, &mut ctx, &mut mem).unwrap();
        assert_eq!(ctx.gpr_u64(reg::RA), 0xFFFF_FFFF_8000_0010);
        assert_eq!(ctx.gpr_u32(reg::RA), 0x8000_0010);
    }
}
