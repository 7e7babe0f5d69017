//! Decoder tests against hand-assembled words

mod utils;

use eerecomp_core::recompiler::config::Endianness;
use eerecomp_core::recompiler::decoder::{decode_section, Instruction, Opcode};
use utils::*;

#[test]
fn test_beq_target() {
    let instr = Instruction::decode(beq(4, 0, 2), 0x1000);
    assert_eq!(instr.opcode(), Opcode::Beq);
    assert_eq!(instr.branch_target(), Some(0x100C));
}

#[test]
fn test_bne_negative_offset() {
    let instr = Instruction::decode(bne(4, 5, -3), 0x1010);
    assert_eq!(instr.branch_target(), Some(0x1008));
}

#[test]
fn test_jal_target() {
    let instr = Instruction::decode((0x03 << 26) | 0x40100, 0x1000);
    assert_eq!(instr.opcode(), Opcode::Jal);
    assert_eq!(instr.jump_target(), Some(0x0010_0400));
    // the segment bits of the jump's own address are kept
    let high = Instruction::decode(j(0x0000_0400), 0x9000_0000);
    assert_eq!(high.jump_target(), Some(0x9000_0400));
}

#[test]
fn test_display() {
    assert_eq!(
        Instruction::decode(addiu(4, 4, 1), 0).to_string(),
        "addiu $a0, $a0, 1"
    );
    assert_eq!(Instruction::decode(lw(8, -16, 29), 0).to_string(), "lw $t0, -16($sp)");
    assert_eq!(Instruction::decode(jr(31), 0).to_string(), "jr $ra");
    assert_eq!(
        Instruction::decode(beq(4, 0, 2), 0x1000).to_string(),
        "beq $a0, $zero, 0x0000100C"
    );
    assert_eq!(Instruction::decode(0x4600_0000, 0).to_string(), ".word 0x46000000");
}

#[test]
fn test_classification() {
    let likely = [beql(1, 2, 1), bnel(1, 2, 1)];
    for word in likely {
        let instr = Instruction::decode(word, 0);
        assert!(instr.is_branch_likely());
        assert!(instr.has_delay_slot());
    }
    let call = Instruction::decode(jalr(31, 25), 0);
    assert!(call.is_link() && call.is_register_jump());
    assert!(!call.is_return());
    assert!(Instruction::decode(jr(31), 0).is_return());
    assert!(Instruction::decode(jr(2), 0).is_jumptable_jump());
    assert!(!Instruction::decode(syscall(), 0).has_delay_slot());
}

#[test]
fn test_big_endian_section() {
    let bytes: Vec<u8> = [addiu(4, 4, 1), jr(31)]
        .iter()
        .flat_map(|w| w.to_be_bytes())
        .collect();
    let decoded = decode_section(&bytes, 0x2000, Endianness::Big);
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[0].opcode(), Opcode::Addiu);
    assert_eq!(decoded[1].address, 0x2004);
    assert!(decoded[1].is_return());
}

#[test]
fn test_truncated_word_ends_decoding() {
    let mut bytes = words_to_bytes(&[addiu(4, 4, 1)]);
    bytes.extend_from_slice(&[0xAA, 0xBB]);
    let decoded = decode_section(&bytes, 0, Endianness::Little);
    assert_eq!(decoded.len(), 1);
}
