//! Operation to Rust Translation
//!
//! Renders [`Operation`] lists as Rust statements for the body of a
//! recompiled block.
//!
//! # Translation Strategy
//! - **Register reads**: `ctx.gpr_u64(r)` / `ctx.gpr_u32(r)`
//! - **Register writes**: `ctx.set_gpr_u64` / `ctx.set_gpr_s32` (writes to `$zero`
//!   are dropped by the context)
//! - **Trapping, memory and multiply/divide ops**: calls into `ops::*`, the
//!   same helpers the interpreter uses
//! - **Control flow**: `ctx.pc = ...; continue;` back into the function's
//!   dispatch loop
//!
//! Generated code expects `ctx: &mut CpuContext` and
//! `memory: &mut MemoryManager` in scope and the `ops` module imported.

use crate::recompiler::ir::instruction::{
    AluOp, CheckedOp, CmpOp, Condition, HiLo, MulDivOp, Operation, PcTarget, Value,
};
use std::fmt::{self, Write};

/// Rust source renderer for operations.
pub struct RustRenderer;

impl RustRenderer {
    /// Render `operations` into `out`, one statement per line, each prefixed
    /// by `indent` levels of four spaces.
    pub fn render(operations: &[Operation], indent: usize, out: &mut String) -> fmt::Result {
        for op in operations {
            Self::render_operation(op, indent, out)?;
        }
        Ok(())
    }

    /// Render operations into a fresh string.
    pub fn render_to_string(operations: &[Operation], indent: usize) -> Result<String, fmt::Error> {
        let mut out: String = String::with_capacity(operations.len() * 48);
        Self::render(operations, indent, &mut out)?;
        Ok(out)
    }

    fn render_operation(op: &Operation, indent: usize, out: &mut String) -> fmt::Result {
        let pad: String = "    ".repeat(indent);
        match op {
            Operation::Alu { op, dst, lhs, rhs } => {
                writeln!(out, "{}{}", pad, alu_statement(*op, *dst, *lhs, *rhs))
            }
            Operation::Move { dst, src } => {
                writeln!(out, "{}ctx.set_gpr_u64({}, {});", pad, dst, value64(*src))
            }
            Operation::CondMove {
                dst,
                src,
                test,
                on_zero,
            } => writeln!(
                out,
                "{}if ctx.gpr_u64({}) {} 0 {{ ctx.set_gpr_u64({}, ctx.gpr_u64({})); }}",
                pad,
                test,
                if *on_zero { "==" } else { "!=" },
                dst,
                src
            ),
            Operation::Checked {
                op,
                pc,
                dst,
                lhs,
                rhs,
            } => {
                let (helper, operand): (&str, String) = match (op, rhs) {
                    (CheckedOp::Add, Value::Imm(imm)) => ("addi", imm16(*imm)),
                    (CheckedOp::Dadd, Value::Imm(imm)) => ("daddi", imm16(*imm)),
                    (CheckedOp::Add, Value::Reg(r)) => ("add", r.to_string()),
                    (CheckedOp::Dadd, Value::Reg(r)) => ("dadd", r.to_string()),
                    (CheckedOp::Sub, Value::Reg(r)) => ("sub", r.to_string()),
                    (CheckedOp::Dsub, Value::Reg(r)) => ("dsub", r.to_string()),
                    // Never produced: subtract-immediate does not exist
                    (CheckedOp::Sub, Value::Imm(imm)) => ("addi", imm16(imm.wrapping_neg())),
                    (CheckedOp::Dsub, Value::Imm(imm)) => ("daddi", imm16(imm.wrapping_neg())),
                };
                writeln!(
                    out,
                    "{}ops::{}(ctx, 0x{:08X}, {}, {}, {})?;",
                    pad, helper, pc, dst, lhs, operand
                )
            }
            Operation::Memory {
                op,
                rt,
                base,
                offset,
            } => writeln!(
                out,
                "{}ops::{}(ctx, memory, {}, {}, {})?;",
                pad,
                op.helper(),
                rt,
                base,
                offset
            ),
            Operation::MulDiv {
                op,
                pipeline,
                rd,
                rs,
                rt,
            } => match op {
                MulDivOp::Div | MulDivOp::Divu => writeln!(
                    out,
                    "{}ops::{}(ctx, {}, {}, {});",
                    pad,
                    op.helper(),
                    pipeline,
                    rs,
                    rt
                ),
                _ => writeln!(
                    out,
                    "{}ops::{}(ctx, {}, {}, {}, {});",
                    pad,
                    op.helper(),
                    pipeline,
                    rd,
                    rs,
                    rt
                ),
            },
            Operation::MoveFromHiLo {
                dst,
                which,
                pipeline,
            } => writeln!(
                out,
                "{}ctx.set_gpr_u64({}, ctx.{}_u64());",
                pad,
                dst,
                hilo_name(*which, *pipeline)
            ),
            Operation::MoveToHiLo {
                src,
                which,
                pipeline,
            } => writeln!(
                out,
                "{}ctx.set_{}_u64(ctx.gpr_u64({}));",
                pad,
                hilo_name(*which, *pipeline),
                src
            ),
            Operation::MoveFromSa { dst } => {
                writeln!(out, "{}ctx.set_gpr_u64({}, ctx.sa as u64);", pad, dst)
            }
            Operation::MoveToSa { src } => writeln!(out, "{}ctx.sa = ctx.gpr_u32({});", pad, src),
            Operation::SetSa { src, imm, halfword } => writeln!(
                out,
                "{}ops::{}(ctx, {}, {});",
                pad,
                if *halfword { "mtsah" } else { "mtsab" },
                src,
                imm
            ),
            Operation::MoveFromCop0 { rt, rd } => {
                writeln!(out, "{}ops::mfc0(ctx, {}, {});", pad, rt, rd)
            }
            Operation::MoveToCop0 { rt, rd } => {
                writeln!(out, "{}ops::mtc0(ctx, {}, {});", pad, rt, rd)
            }
            Operation::Trap { pc, condition } => writeln!(
                out,
                "{}ops::trap_if({}, 0x{:08X})?;",
                pad,
                condition_expr(condition),
                pc
            ),
            Operation::Syscall { pc } => {
                writeln!(out, "{}ops::syscall(ctx, memory, 0x{:08X})?;", pad, pc)
            }
            Operation::Break { pc, code } => {
                writeln!(out, "{}ops::breakpoint(0x{:08X}, 0x{:X})?;", pad, pc, code)
            }
            Operation::Placeholder { address, raw } => writeln!(
                out,
                "{}// UNIMPLEMENTED 0x{:08X}: .word 0x{:08X}",
                pad, address, raw
            ),
            Operation::LatchCondition(condition) => writeln!(
                out,
                "{}let branch_taken: bool = {};",
                pad,
                condition_expr(condition)
            ),
            Operation::LatchTarget(reg) => {
                writeln!(out, "{}let jump_target: u32 = ctx.gpr_u32({});", pad, reg)
            }
            Operation::Link {
                reg,
                return_address,
            } => writeln!(
                out,
                "{}ctx.set_gpr_u64({}, 0x{:X}u64);",
                pad,
                reg,
                *return_address as i32 as i64 as u64
            ),
            Operation::Branch { taken, not_taken } => {
                writeln!(out, "{}if branch_taken {{", pad)?;
                Self::render(taken, indent + 1, out)?;
                writeln!(out, "{}}} else {{", pad)?;
                Self::render(not_taken, indent + 1, out)?;
                writeln!(out, "{}}}", pad)
            }
            Operation::SetPc(PcTarget::Const(target)) => {
                writeln!(out, "{}ctx.pc = 0x{:08X};", pad, target)?;
                writeln!(out, "{}continue;", pad)
            }
            Operation::SetPc(PcTarget::Latched) => {
                writeln!(out, "{}ctx.pc = jump_target;", pad)?;
                writeln!(out, "{}continue;", pad)
            }
        }
    }
}

fn hilo_name(which: HiLo, pipeline: u8) -> &'static str {
    match (which, pipeline) {
        (HiLo::Hi, 0) => "hi",
        (HiLo::Lo, 0) => "lo",
        (HiLo::Hi, _) => "hi1",
        (HiLo::Lo, _) => "lo1",
    }
}

/// Sign-extended immediate back to its 16-bit source form.
fn imm16(imm: u64) -> String {
    (imm as i64 as i16).to_string()
}

fn value64(value: Value) -> String {
    match value {
        Value::Reg(r) => format!("ctx.gpr_u64({})", r),
        Value::Imm(imm) => format!("0x{:X}u64", imm),
    }
}

fn value32(value: Value) -> String {
    match value {
        Value::Reg(r) => format!("ctx.gpr_u32({})", r),
        Value::Imm(imm) => format!("0x{:X}u32", imm as u32),
    }
}

fn shift_amount(value: Value, mask: u64) -> String {
    match (value, mask) {
        (Value::Imm(imm), _) => (imm & mask).to_string(),
        (Value::Reg(r), 31) => format!("(ctx.gpr_u32({}) & 31)", r),
        (Value::Reg(r), _) => format!("(ctx.gpr_u64({}) & 63)", r),
    }
}

fn alu_statement(op: AluOp, dst: u8, lhs: Value, rhs: Value) -> String {
    let expr: String = match op {
        AluOp::Add32 => {
            return format!(
                "ctx.set_gpr_s32({}, {}.wrapping_add({}));",
                dst,
                value32(lhs),
                value32(rhs)
            )
        }
        AluOp::Sub32 => {
            return format!(
                "ctx.set_gpr_s32({}, {}.wrapping_sub({}));",
                dst,
                value32(lhs),
                value32(rhs)
            )
        }
        AluOp::Sll32 => {
            return format!(
                "ctx.set_gpr_s32({}, {} << {});",
                dst,
                value32(lhs),
                shift_amount(rhs, 31)
            )
        }
        AluOp::Srl32 => {
            return format!(
                "ctx.set_gpr_s32({}, {} >> {});",
                dst,
                value32(lhs),
                shift_amount(rhs, 31)
            )
        }
        AluOp::Sra32 => {
            return format!(
                "ctx.set_gpr_s32({}, (({} as i32) >> {}) as u32);",
                dst,
                value32(lhs),
                shift_amount(rhs, 31)
            )
        }
        AluOp::Add64 => format!("{}.wrapping_add({})", value64(lhs), value64(rhs)),
        AluOp::Sub64 => format!("{}.wrapping_sub({})", value64(lhs), value64(rhs)),
        AluOp::And => format!("{} & {}", value64(lhs), value64(rhs)),
        AluOp::Or => format!("{} | {}", value64(lhs), value64(rhs)),
        AluOp::Xor => format!("{} ^ {}", value64(lhs), value64(rhs)),
        AluOp::Nor => format!("!({} | {})", value64(lhs), value64(rhs)),
        AluOp::Slt => format!(
            "(({} as i64) < ({} as i64)) as u64",
            value64(lhs),
            value64(rhs)
        ),
        AluOp::Sltu => format!("({} < {}) as u64", value64(lhs), value64(rhs)),
        AluOp::Sll64 => format!("{} << {}", value64(lhs), shift_amount(rhs, 63)),
        AluOp::Srl64 => format!("{} >> {}", value64(lhs), shift_amount(rhs, 63)),
        AluOp::Sra64 => format!(
            "(({} as i64) >> {}) as u64",
            value64(lhs),
            shift_amount(rhs, 63)
        ),
    };
    format!("ctx.set_gpr_u64({}, {});", dst, expr)
}

/// Boolean expression for `GPR[lhs] <op> rhs`.
pub fn condition_expr(condition: &Condition) -> String {
    let lhs: String = format!("ctx.gpr_u64({})", condition.lhs);
    let rhs: String = value64(condition.rhs);
    match condition.op {
        CmpOp::Eq | CmpOp::Ne | CmpOp::Ltu | CmpOp::Geu => {
            format!("{} {} {}", lhs, condition.op.symbol(), rhs)
        }
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => format!(
            "({} as i64) {} ({} as i64)",
            lhs,
            condition.op.symbol(),
            rhs
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recompiler::ir::instruction::MemOp;

    fn render(ops: &[Operation]) -> String {
        RustRenderer::render_to_string(ops, 0).unwrap()
    }

    #[test]
    fn test_render_alu() {
        let code = render(&[Operation::Alu {
            op: AluOp::Add32,
            dst: 4,
            lhs: Value::Reg(4),
            rhs: Value::Imm(1),
        }]);
        assert_eq!(code, "ctx.set_gpr_s32(4, ctx.gpr_u32(4).wrapping_add(0x1u32));\n");
    }

    #[test]
    fn test_render_signed_compare() {
        let condition = Condition::new(CmpOp::Lt, 4, Value::Imm(0));
        assert_eq!(
            condition_expr(&condition),
            "(ctx.gpr_u64(4) as i64) < (0x0u64 as i64)"
        );
    }

    #[test]
    fn test_render_memory_and_checked() {
        let code = render(&[
            Operation::Memory {
                op: MemOp::Lw,
                rt: 8,
                base: 29,
                offset: -16,
            },
            Operation::Checked {
                op: CheckedOp::Add,
                pc: 0x1000,
                dst: 2,
                lhs: 4,
                rhs: Value::Imm((-1i64) as u64),
            },
        ]);
        assert!(code.contains("ops::lw(ctx, memory, 8, 29, -16)?;"));
        assert!(code.contains("ops::addi(ctx, 0x00001000, 2, 4, -1)?;"));
    }

    #[test]
    fn test_render_branch() {
        let code = render(&[
            Operation::LatchCondition(Condition::new(CmpOp::Eq, 4, Value::Reg(0))),
            Operation::Branch {
                taken: vec![Operation::SetPc(PcTarget::Const(0x100C))],
                not_taken: vec![Operation::SetPc(PcTarget::Const(0x1008))],
            },
        ]);
        assert_eq!(
            code,
            "let branch_taken: bool = ctx.gpr_u64(4) == ctx.gpr_u64(0);\n\
             if branch_taken {\n    ctx.pc = 0x0000100C;\n    continue;\n\
             } else {\n    ctx.pc = 0x00001008;\n    continue;\n}\n"
        );
    }

    #[test]
    fn test_render_link_sign_extends() {
        let code = render(&[Operation::Link {
            reg: 31,
            return_address: 0x8000_0008,
        }]);
        assert_eq!(code, "ctx.set_gpr_u64(31, 0xFFFFFFFF80000008u64);\n");
    }

    #[test]
    fn test_render_placeholder_is_comment() {
        let code = render(&[Operation::Placeholder {
            address: 0x40,
            raw: 0x4600_0000,
        }]);
        assert!(code.trim_start().starts_with("//"));
    }
}
