//! Function Discovery
//!
//! Partitions a code section into functions.
//!
//! # Algorithm
//! 1. Seed entries: the section start, configured addresses, function symbols
//!    and every direct call (`jal`, `bal`, ...) target inside the section
//! 2. Visit entries in address order; each function is analyzed up to the next
//!    known entry ([`Function::analyze`])
//! 3. When a function ends before the next entry, skip zero-word padding; any
//!    code left before that entry becomes a new function
//! 4. Call targets found while analyzing become entries as well

use crate::recompiler::analysis::control_flow::{DecodedSection, Function};
use crate::recompiler::decoder::Opcode;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Section-wide function discovery.
pub struct FunctionDiscovery<'a> {
    code: &'a DecodedSection,
    /// Entry address → symbol name (if known)
    entries: BTreeMap<u32, Option<String>>,
}

impl<'a> FunctionDiscovery<'a> {
    /// Start discovery with the section start as the only entry.
    pub fn new(code: &'a DecodedSection) -> Self {
        let mut entries: BTreeMap<u32, Option<String>> = BTreeMap::new();
        if !code.instructions.is_empty() {
            entries.insert(code.base, None);
        }
        Self { code, entries }
    }

    /// Add an entry point. Addresses outside the section are ignored.
    /// A name replaces an anonymous entry at the same address.
    pub fn add_seed(&mut self, address: u32, name: Option<String>) -> bool {
        if !self.code.contains(address) {
            return false;
        }
        let slot = self.entries.entry(address).or_insert(None);
        if slot.is_none() {
            *slot = name;
        }
        true
    }

    /// Seed every direct call target in the section.
    pub fn add_call_targets(&mut self) -> usize {
        let targets: Vec<u32> = self
            .code
            .instructions
            .iter()
            .filter(|instr| instr.is_link() && instr.opcode() != Opcode::Jalr)
            .filter_map(|instr| instr.target())
            .collect();
        targets
            .into_iter()
            .filter(|&target| self.add_seed(target, None))
            .count()
    }

    /// Number of entries currently known.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Run discovery. Functions come back in address order; unnamed ones are
    /// called `<prefix>XXXXXXXX`.
    pub fn discover(mut self, prefix: &str) -> Vec<Function> {
        let section_end: u32 = self.code.end_address();
        let mut functions: Vec<Function> = Vec::with_capacity(self.entries.len());
        let mut cursor: Bound<u32> = Bound::Unbounded;

        loop {
            let (entry, name): (u32, Option<String>) =
                match self.entries.range((cursor, Bound::Unbounded)).next() {
                    Some((&entry, name)) => (entry, name.clone()),
                    None => break,
                };
            cursor = Bound::Excluded(entry);
            let limit: u32 = self
                .entries
                .range((Bound::Excluded(entry), Bound::Unbounded))
                .next()
                .map(|(&next, _)| next)
                .unwrap_or(section_end);

            let mut function: Function = Function::analyze(self.code, entry, limit);
            function.name = name.unwrap_or_else(|| format!("{}{:08X}", prefix, entry));

            // Leftover code between this function and the next entry
            let mut next: u32 = entry + function.size.max(4);
            while next < limit && self.code.get(next).map(|i| i.raw) == Some(0) {
                next += 4;
            }
            if next < limit {
                log::debug!("Orphan code at 0x{:08X} becomes a function", next);
                self.entries.insert(next, None);
            }

            for &target in function.call_targets.iter() {
                if target >= function.end_address() && self.code.contains(target) {
                    self.entries.entry(target).or_insert(None);
                }
            }

            if function.blocks.is_empty() {
                log::warn!("Skipping empty function at 0x{:08X}", entry);
            } else {
                functions.push(function);
            }
        }

        log::info!(
            "Discovered {} functions in {} (0x{:08X}..0x{:08X})",
            functions.len(),
            self.code.name,
            self.code.base,
            section_end
        );
        functions
    }
}
