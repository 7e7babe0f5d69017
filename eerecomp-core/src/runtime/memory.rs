//! Memory Manager
//!
//! Flat emulated RAM for recompiled Emotion Engine code.
//!
//! # Memory Map
//! The EE sees its 32MB of main RAM at several virtual windows:
//! - **0x00000000 - 0x01FFFFFF**: user segment (direct)
//! - **0x80000000 - 0x81FFFFFF**: kseg0 (cached mirror)
//! - **0xA0000000 - 0xA1FFFFFF**: kseg1 (uncached mirror)
//!
//! kseg0/kseg1 addresses are folded onto the physical offset by clearing the
//! top three bits. Everything that does not land inside RAM is an
//! [`RuntimeError::OutOfBounds`] fault.
//!
//! # Byte Order
//! The R5900 runs little-endian; all multi-byte accessors use little-endian
//! byte order.
//!
//! Accessors only check bounds. Alignment is the caller's concern: the
//! instruction helpers in [`crate::runtime::ops`] decide which instructions
//! fault on misalignment.

use crate::runtime::error::{AccessWidth, RuntimeError, RuntimeResult};

/// Size of EE main RAM (32MB).
pub const RAM_SIZE: usize = 32usize * 1024usize * 1024usize;

/// Memory manager for emulated EE RAM.
#[derive(Debug, Clone)]
pub struct MemoryManager {
    ram: Vec<u8>,
}

impl MemoryManager {
    /// Create a zero-filled 32MB RAM.
    pub fn new() -> Self {
        Self::with_size(RAM_SIZE)
    }

    /// Create a RAM of a custom size. Tests use small sizes to exercise the
    /// bounds checks cheaply.
    pub fn with_size(size: usize) -> Self {
        Self { ram: vec![0u8; size] }
    }

    /// Size of RAM in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.ram.len()
    }

    /// Translate a virtual address to a RAM offset, checking that the whole
    /// access of `width` bytes fits.
    #[inline(always)]
    fn translate(&self, address: u32, width: AccessWidth) -> RuntimeResult<usize> {
        let physical: u32 = match address >> 29 {
            // kseg0 / kseg1
            0b100 | 0b101 => address & 0x1FFF_FFFF,
            _ => address,
        };
        let offset: usize = physical as usize;
        let end: usize = offset.saturating_add(width.bytes() as usize);
        if end > self.ram.len() {
            return Err(RuntimeError::OutOfBounds {
                address,
                width,
                size: self.ram.len() as u32,
            });
        }
        Ok(offset)
    }

    #[inline]
    fn load<const N: usize>(&self, address: u32, width: AccessWidth) -> RuntimeResult<[u8; N]> {
        let offset: usize = self.translate(address, width)?;
        let mut bytes: [u8; N] = [0u8; N];
        bytes.copy_from_slice(&self.ram[offset..offset + N]);
        Ok(bytes)
    }

    #[inline]
    fn store<const N: usize>(&mut self, address: u32, width: AccessWidth, bytes: [u8; N]) -> RuntimeResult<()> {
        let offset: usize = self.translate(address, width)?;
        self.ram[offset..offset + N].copy_from_slice(&bytes);
        Ok(())
    }

    /// Read a byte.
    #[inline]
    pub fn read_u8(&self, address: u32) -> RuntimeResult<u8> {
        Ok(self.load::<1>(address, AccessWidth::Byte)?[0])
    }

    /// Read a little-endian halfword.
    #[inline]
    pub fn read_u16(&self, address: u32) -> RuntimeResult<u16> {
        Ok(u16::from_le_bytes(self.load(address, AccessWidth::Half)?))
    }

    /// Read a little-endian word.
    #[inline]
    pub fn read_u32(&self, address: u32) -> RuntimeResult<u32> {
        Ok(u32::from_le_bytes(self.load(address, AccessWidth::Word)?))
    }

    /// Read a little-endian doubleword.
    #[inline]
    pub fn read_u64(&self, address: u32) -> RuntimeResult<u64> {
        Ok(u64::from_le_bytes(self.load(address, AccessWidth::Double)?))
    }

    /// Read a little-endian quadword.
    #[inline]
    pub fn read_u128(&self, address: u32) -> RuntimeResult<u128> {
        Ok(u128::from_le_bytes(self.load(address, AccessWidth::Quad)?))
    }

    /// Write a byte.
    #[inline]
    pub fn write_u8(&mut self, address: u32, value: u8) -> RuntimeResult<()> {
        self.store(address, AccessWidth::Byte, [value])
    }

    /// Write a little-endian halfword.
    #[inline]
    pub fn write_u16(&mut self, address: u32, value: u16) -> RuntimeResult<()> {
        self.store(address, AccessWidth::Half, value.to_le_bytes())
    }

    /// Write a little-endian word.
    #[inline]
    pub fn write_u32(&mut self, address: u32, value: u32) -> RuntimeResult<()> {
        self.store(address, AccessWidth::Word, value.to_le_bytes())
    }

    /// Write a little-endian doubleword.
    #[inline]
    pub fn write_u64(&mut self, address: u32, value: u64) -> RuntimeResult<()> {
        self.store(address, AccessWidth::Double, value.to_le_bytes())
    }

    /// Write a little-endian quadword.
    #[inline]
    pub fn write_u128(&mut self, address: u32, value: u128) -> RuntimeResult<()> {
        self.store(address, AccessWidth::Quad, value.to_le_bytes())
    }

    /// Read `len` bytes starting at `address`.
    pub fn read_bytes(&self, address: u32, len: usize) -> RuntimeResult<&[u8]> {
        let offset: usize = self.translate(address, AccessWidth::Byte)?;
        match offset.checked_add(len) {
            Some(end) if end <= self.ram.len() => Ok(&self.ram[offset..end]),
            _ => Err(RuntimeError::OutOfBounds {
                address,
                width: AccessWidth::Byte,
                size: self.ram.len() as u32,
            }),
        }
    }

    /// Copy `data` into RAM starting at `address`.
    pub fn write_bytes(&mut self, address: u32, data: &[u8]) -> RuntimeResult<()> {
        let offset: usize = self.translate(address, AccessWidth::Byte)?;
        match offset.checked_add(data.len()) {
            Some(end) if end <= self.ram.len() => {
                self.ram[offset..end].copy_from_slice(data);
                Ok(())
            }
            _ => Err(RuntimeError::OutOfBounds {
                address,
                width: AccessWidth::Byte,
                size: self.ram.len() as u32,
            }),
        }
    }

    /// Load a section image (e.g. `.data`) at its virtual address.
    pub fn load_section(&mut self, address: u32, data: &[u8]) -> RuntimeResult<()> {
        log::debug!("Loading {} bytes at 0x{:08X}", data.len(), address);
        self.write_bytes(address, data)
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_round_trip() {
        let mut memory = MemoryManager::with_size(0x100);
        memory.write_u32(0x10, 0x1122_3344).unwrap();
        assert_eq!(memory.read_u8(0x10).unwrap(), 0x44);
        assert_eq!(memory.read_u16(0x12).unwrap(), 0x1122);
        assert_eq!(memory.read_u32(0x10).unwrap(), 0x1122_3344);
    }

    #[test]
    fn test_kseg_mirrors() {
        let mut memory = MemoryManager::with_size(0x100);
        memory.write_u8(0x8000_0020, 0xAB).unwrap();
        assert_eq!(memory.read_u8(0x20).unwrap(), 0xAB);
        assert_eq!(memory.read_u8(0xA000_0020).unwrap(), 0xAB);
    }

    #[test]
    fn test_out_of_bounds_reports_range() {
        let memory = MemoryManager::with_size(0x100);
        let err = memory.read_u32(0xFE).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::OutOfBounds {
                address: 0xFE,
                width: AccessWidth::Word,
                size: 0x100,
            }
        );
        let message = err.to_string();
        assert!(message.contains("0x000000FE"));
        assert!(message.contains("0x000000FF"));
    }

    #[test]
    fn test_bulk_access_bounds() {
        let mut memory = MemoryManager::with_size(0x10);
        memory.write_bytes(0x8, &[1, 2, 3, 4]).unwrap();
        assert_eq!(memory.read_bytes(0x8, 4).unwrap(), &[1, 2, 3, 4]);
        assert!(memory.write_bytes(0xE, &[0; 4]).is_err());
    }
}
