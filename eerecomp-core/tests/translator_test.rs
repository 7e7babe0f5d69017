//! Translator ordering tests

mod utils;

use eerecomp_core::recompiler::decoder::Instruction;
use eerecomp_core::recompiler::ir::instruction::{CmpOp, Condition, Operation, PcTarget, Value};
use eerecomp_core::recompiler::ir::{translate, translate_simple};
use proptest::prelude::*;
use utils::*;

const ADDRESS: u32 = 0x0010_0100;

fn branch_word(kind: u8, rs: u8, rt: u8, offset: i16) -> u32 {
    match kind {
        0 => beq(rs, rt, offset),
        1 => bne(rs, rt, offset),
        2 => beql(rs, rt, offset),
        _ => bnel(rs, rt, offset),
    }
}

proptest! {
    #[test]
    fn prop_branch_latches_before_delay_slot(
        kind in 0u8..4,
        rs in 1u8..32,
        rt in 0u8..32,
        offset in -0x800i16..0x800,
        dst in 1u8..32,
        imm in any::<i16>(),
    ) {
        let branch = Instruction::decode(branch_word(kind, rs, rt, offset), ADDRESS);
        let slot = Instruction::decode(addiu(dst, rs, imm), ADDRESS + 4);
        let slot_ops = translate_simple(&slot).operations;
        let translation = translate(&branch, Some(&slot));
        let ops = &translation.operations;
        let target = branch.branch_target().unwrap();
        let likely = kind >= 2;

        prop_assert_eq!(translation.consumed, 2);
        let expected_op = if kind % 2 == 0 { CmpOp::Eq } else { CmpOp::Ne };
        prop_assert_eq!(
            &ops[0],
            &Operation::LatchCondition(Condition::new(expected_op, rs, Value::Reg(rt)))
        );

        let Some(Operation::Branch { taken, not_taken }) = ops.last() else {
            panic!("translation does not end in a branch: {:?}", ops);
        };
        prop_assert_eq!(not_taken, &vec![Operation::SetPc(PcTarget::Const(ADDRESS + 8))]);
        if likely {
            // nullified delay slot: only the taken path runs it
            prop_assert_eq!(ops.len(), 2);
            let mut expected_taken = slot_ops.clone();
            expected_taken.push(Operation::SetPc(PcTarget::Const(target)));
            prop_assert_eq!(taken, &expected_taken);
        } else {
            prop_assert_eq!(&ops[1..ops.len() - 1], slot_ops.as_slice());
            prop_assert_eq!(taken, &vec![Operation::SetPc(PcTarget::Const(target))]);
        }
        prop_assert!(translation.ends_block());
    }

    #[test]
    fn prop_jal_links_then_runs_delay_slot(
        word_index in 0u32..0x0010_0000,
        dst in 1u8..32,
        imm in any::<i16>(),
    ) {
        let target = word_index << 2;
        let call = Instruction::decode(jal(target), ADDRESS);
        let slot = Instruction::decode(addiu(dst, 0, imm), ADDRESS + 4);
        let ops = translate(&call, Some(&slot)).operations;

        prop_assert_eq!(
            &ops[0],
            &Operation::Link { reg: 31, return_address: ADDRESS + 8 }
        );
        let slot_ops = translate_simple(&slot).operations;
        prop_assert_eq!(&ops[1..ops.len() - 1], slot_ops.as_slice());
        prop_assert_eq!(ops.last(), Some(&Operation::SetPc(PcTarget::Const(target))));
    }
}

#[test]
fn test_jr_target_is_read_before_delay_slot() {
    // jr $t0 ; addiu $t0, $t0, 4
    let jump = Instruction::decode(jr(8), ADDRESS);
    let slot = Instruction::decode(addiu(8, 8, 4), ADDRESS + 4);
    let ops = translate(&jump, Some(&slot)).operations;
    assert_eq!(ops[0], Operation::LatchTarget(8));
    assert_eq!(ops.last(), Some(&Operation::SetPc(PcTarget::Latched)));
}

#[test]
fn test_jalr_links_custom_register() {
    let jump = Instruction::decode(jalr(16, 9), ADDRESS);
    let ops = translate(&jump, Some(&Instruction::decode(nop(), ADDRESS + 4))).operations;
    assert_eq!(ops[0], Operation::LatchTarget(9));
    assert_eq!(
        ops[1],
        Operation::Link {
            reg: 16,
            return_address: ADDRESS + 8
        }
    );
}

#[test]
fn test_branch_reads_register_written_by_delay_slot() {
    // beq $a0, $zero, +4 ; addiu $a0, $zero, 1
    // The condition sees the old $a0.
    let branch = Instruction::decode(beq(4, 0, 4), ADDRESS);
    let slot = Instruction::decode(addiu(4, 0, 1), ADDRESS + 4);
    let ops = translate(&branch, Some(&slot)).operations;
    let latch = ops
        .iter()
        .position(|op| matches!(op, Operation::LatchCondition(_)))
        .unwrap();
    let write = ops
        .iter()
        .position(|op| *op == translate_simple(&slot).operations[0])
        .unwrap();
    assert!(latch < write);
}

#[test]
fn test_non_branch_consumes_one() {
    let translation = translate(&Instruction::decode(addu(2, 4, 5), ADDRESS), None);
    assert_eq!(translation.consumed, 1);
    assert!(!translation.ends_block());
}
