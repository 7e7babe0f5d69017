//! Control Flow Recovery
//!
//! Splits a function's instruction stream into basic blocks and links them.
//!
//! # Memory Optimizations
//! - Leaders are tracked in a `BitVec` with one bit per instruction word
//! - Block successors use `Option<u32>` indices instead of address maps
//! - `successors()` returns a `SmallVec<[u32; 2]>` (a block has at most two)
//!
//! # Algorithm (two-pass leader method)
//! 1. **Leader discovery**: scan from the entry. Every branch or jump marks the
//!    word after its delay slot (`address + 8`) and its static target as leaders.
//!    A `jr` ends the scan after its delay slot unless a leader discovered
//!    earlier lies beyond it (a forward branch jumped over the return), in
//!    which case scanning continues.
//! 2. **Block formation**: sorted leaders inside the scanned extent split it
//!    into blocks `[L[i], L[i+1])`; the last block runs to the end of the extent.
//!    Empty blocks are dropped and the function is cut at the first gap.
//! 3. **Linking**: taken successors come from static targets, fall-through
//!    successors from the block that starts where the current one ends.

use crate::recompiler::config::Endianness;
use crate::recompiler::decoder::{decode_section, DecodedInstruction, Opcode};
use bitvec::prelude::*;
use smallvec::SmallVec;

/// A section decoded into instructions, addressed by virtual address.
#[derive(Debug, Clone)]
pub struct DecodedSection {
    pub name: String,
    pub base: u32,
    pub instructions: Vec<DecodedInstruction>,
}

impl DecodedSection {
    pub fn new(name: impl Into<String>, bytes: &[u8], base: u32, endianness: Endianness) -> Self {
        Self {
            name: name.into(),
            base,
            instructions: decode_section(bytes, base, endianness),
        }
    }

    /// One past the last decoded instruction.
    #[inline]
    pub fn end_address(&self) -> u32 {
        self.base
            .wrapping_add((self.instructions.len() as u32).wrapping_mul(4))
    }

    #[inline]
    pub fn contains(&self, address: u32) -> bool {
        address >= self.base && address < self.end_address() && address & 3 == 0
    }

    /// Instruction at `address`, if it lies in the section.
    #[inline]
    pub fn get(&self, address: u32) -> Option<&DecodedInstruction> {
        if address < self.base || address & 3 != 0 {
            return None;
        }
        self.instructions
            .get(((address - self.base) / 4) as usize)
    }
}

/// Maximal straight-line run of instructions.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Index in the owning function's block list
    pub id: u32,
    pub start_address: u32,
    /// Exclusive end address
    pub end_address: u32,
    /// Instructions in execution order
    pub instructions: Vec<DecodedInstruction>,
    /// Index of the block starting at the static branch/jump target
    pub taken_successor: Option<u32>,
    /// Index of the block starting at `end_address`, when control can fall through
    pub fallthrough_successor: Option<u32>,
}

impl BasicBlock {
    /// The branch or jump that ends this block, if any.
    ///
    /// Normally the second-to-last instruction (the last is its delay slot);
    /// the last one when the delay slot starts the next block.
    pub fn control_transfer(&self) -> Option<&DecodedInstruction> {
        let n: usize = self.instructions.len();
        self.instructions[n.saturating_sub(2)..]
            .iter()
            .find(|instr| instr.has_delay_slot())
    }

    pub fn successors(&self) -> SmallVec<[u32; 2]> {
        let mut successors: SmallVec<[u32; 2]> = SmallVec::new();
        if let Some(taken) = self.taken_successor {
            successors.push(taken);
        }
        if let Some(next) = self.fallthrough_successor {
            if !successors.contains(&next) {
                successors.push(next);
            }
        }
        successors
    }
}

/// One analyzed routine.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    /// Entry address
    pub base_address: u32,
    /// Highest block end minus base (0 when no block was recovered)
    pub size: u32,
    /// Blocks sorted by start address
    pub blocks: Vec<BasicBlock>,
    /// Non-call branch/jump targets that leave the function (tail jumps)
    pub external_targets: Vec<u32>,
    /// Targets of `jal`/`bal`-style calls
    pub call_targets: Vec<u32>,
}

impl Function {
    /// Recover the blocks of the function entered at `entry`, scanning no
    /// further than `limit` (the next known entry, or the section end).
    pub fn analyze(code: &DecodedSection, entry: u32, limit: u32) -> Function {
        let limit: u32 = limit.min(code.end_address());
        let mut function = Function {
            name: format!("func_{:08X}", entry),
            base_address: entry,
            size: 0,
            blocks: Vec::new(),
            external_targets: Vec::new(),
            call_targets: Vec::new(),
        };
        if !code.contains(entry) || limit.saturating_sub(entry) < 4 {
            log::warn!("No code at function entry 0x{:08X}", entry);
            return function;
        }

        // Whole words only
        let limit: u32 = entry + ((limit - entry) & !3);

        // First pass: leaders and extent
        let words: usize = ((limit - entry) / 4) as usize;
        let index = |address: u32| -> usize { ((address - entry) / 4) as usize };
        let mut leaders: BitVec<u32> = bitvec![u32, Lsb0; 0; words];
        leaders.set(0, true);

        let mut extent_end: u32 = limit;
        let mut address: u32 = entry;
        while address < limit {
            let instr: &DecodedInstruction = match code.get(address) {
                Some(instr) => instr,
                None => {
                    extent_end = address;
                    break;
                }
            };
            if instr.has_delay_slot() {
                if let Some(target) = instr.target() {
                    if target >= entry && target < limit && target & 3 == 0 {
                        leaders.set(index(target), true);
                    }
                }
                let continuation: u32 = address.wrapping_add(8);
                if continuation > limit {
                    log::warn!(
                        "Branch at 0x{:08X} has no delay slot before 0x{:08X}",
                        address,
                        limit
                    );
                }
                if instr.opcode() == Opcode::Jr {
                    // Continue only if an earlier branch targets code past this jr
                    let pending: bool = continuation < limit
                        && leaders[index(continuation)..].any();
                    if !pending {
                        extent_end = continuation.min(limit);
                        break;
                    }
                }
                if continuation < limit {
                    leaders.set(index(continuation), true);
                }
            }
            address = address.wrapping_add(4);
        }

        // Second pass: blocks
        let starts: Vec<u32> = leaders
            .iter_ones()
            .map(|i| entry + (i as u32) * 4)
            .filter(|&start| start < extent_end)
            .collect();
        let mut blocks: Vec<BasicBlock> = Vec::with_capacity(starts.len());
        for (i, &start) in starts.iter().enumerate() {
            let end: u32 = starts.get(i + 1).copied().unwrap_or(extent_end);
            let instructions: Vec<DecodedInstruction> = (start..end)
                .step_by(4)
                .map_while(|a| code.get(a).cloned())
                .collect();
            if instructions.is_empty() {
                continue;
            }
            let end_address: u32 = start + (instructions.len() as u32) * 4;
            // Blocks must tile the function; stop at the first hole
            if let Some(previous) = blocks.last() {
                if previous.end_address != start {
                    log::debug!(
                        "Function 0x{:08X} truncated at gap 0x{:08X}..0x{:08X}",
                        entry,
                        previous.end_address,
                        start
                    );
                    break;
                }
            }
            blocks.push(BasicBlock {
                id: blocks.len() as u32,
                start_address: start,
                end_address,
                instructions,
                taken_successor: None,
                fallthrough_successor: None,
            });
        }

        function.size = blocks
            .iter()
            .map(|b| b.end_address - entry)
            .max()
            .unwrap_or(0);
        function.blocks = blocks;
        function.link_blocks();

        log::debug!(
            "Function 0x{:08X}: {} blocks, 0x{:X} bytes",
            entry,
            function.blocks.len(),
            function.size
        );
        function
    }

    /// Fill in successors and collect targets that leave the function.
    fn link_blocks(&mut self) {
        let mut external: Vec<u32> = Vec::new();
        let mut calls: Vec<u32> = Vec::new();
        let mut links: Vec<(Option<u32>, Option<u32>)> = Vec::with_capacity(self.blocks.len());

        for block in self.blocks.iter() {
            let next: Option<u32> = self.block_starting_at(block.end_address);
            let link = match block.control_transfer() {
                Some(cti) => {
                    let target: Option<u32> = cti.target();
                    let taken: Option<u32> = target.and_then(|t| self.block_starting_at(t));
                    if let Some(t) = target {
                        if cti.is_link() {
                            calls.push(t);
                        } else if !self.contains(t) {
                            external.push(t);
                        }
                    }
                    let fallthrough: Option<u32> = if cti.ends_without_fallthrough() {
                        None
                    } else {
                        next
                    };
                    // Calls return to the fall-through; the callee is not a successor
                    if cti.is_link() {
                        (None, fallthrough)
                    } else {
                        (taken, fallthrough)
                    }
                }
                None => (None, next),
            };
            links.push(link);
        }

        for (block, (taken, fallthrough)) in self.blocks.iter_mut().zip(links) {
            block.taken_successor = taken;
            block.fallthrough_successor = fallthrough;
        }
        external.sort_unstable();
        external.dedup();
        calls.sort_unstable();
        calls.dedup();
        self.external_targets = external;
        self.call_targets = calls;
    }

    /// Does `address` lie inside the recovered body?
    #[inline]
    pub fn contains(&self, address: u32) -> bool {
        address >= self.base_address && address - self.base_address < self.size
    }

    /// Exclusive end address.
    #[inline]
    pub fn end_address(&self) -> u32 {
        self.base_address + self.size
    }

    fn block_starting_at(&self, address: u32) -> Option<u32> {
        self.blocks
            .binary_search_by_key(&address, |b| b.start_address)
            .ok()
            .map(|i| i as u32)
    }

    /// Index of the block containing `address`.
    pub fn search_block(&self, address: u32) -> Option<usize> {
        let index: usize = match self
            .blocks
            .binary_search_by_key(&address, |b| b.start_address)
        {
            Ok(i) => return Some(i),
            Err(0) => return None,
            Err(i) => i - 1,
        };
        (address < self.blocks[index].end_address).then_some(index)
    }

    /// Instruction at `address` inside this function.
    pub fn instruction_at(&self, address: u32) -> Option<&DecodedInstruction> {
        let block: &BasicBlock = &self.blocks[self.search_block(address)?];
        block
            .instructions
            .get(((address - block.start_address) / 4) as usize)
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }
}
